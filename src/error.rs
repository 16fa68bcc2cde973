//! # Error Types
//!
//! Error handling for the relay server.
//!
//! Every failure that can reach a connection task is a [`RelayError`]. The
//! connection loop uses [`RelayError::is_fatal`] to decide whether the
//! connection survives:
//!
//! ## Error Categories
//! - **I/O Errors**: socket failures, clean EOF
//! - **Protocol Violations**: oversized frames, malformed headers or bodies,
//!   unexpected message types before login. Always fatal.
//! - **Disconnect Rules**: access-list blocks, version mismatch, repeated login.
//!   Fatal after the explanatory message has been sent.
//! - **Rejections**: business-rule failures (wrong password, lobby full,
//!   not a member). Logged, reported to the caller, connection stays open.
//!
//! ## Example Usage
//! ```rust
//! use lobby_relay::error::{RelayError, Rejection};
//!
//! let err = RelayError::Rejected(Rejection::LobbyFull);
//! assert!(!err.is_fatal());
//! assert!(RelayError::OversizedFrame(5000).is_fatal());
//! ```

use std::io;
use thiserror::Error;

use crate::protocol::types::{LobbyId, UserId};

/// Business-rule failures. Reported back to the client, never fatal.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum Rejection {
    #[error("lobby {0} not found")]
    LobbyNotFound(LobbyId),

    #[error("lobby is full")]
    LobbyFull,

    #[error("user is not a member of lobby {0}")]
    NotAMember(LobbyId),

    #[error("user is already in lobby {0}")]
    AlreadyInLobby(LobbyId),

    #[error("wrong lobby password")]
    WrongPassword,

    #[error("user is not in a lobby")]
    NotInLobby,

    #[error("user {0} is not connected")]
    UnknownUser(UserId),
}

/// RelayError is the primary error type for all relay operations
#[derive(Error, Debug)]
pub enum RelayError {
    #[error("I/O error: {0}")]
    Io(#[from] io::Error),

    #[error("Serialization error: {0}")]
    Serialization(#[from] bincode::Error),

    #[error("Connection closed")]
    ConnectionClosed,

    #[error("Invalid frame header")]
    InvalidHeader,

    #[error("Frame too large: {0} bytes")]
    OversizedFrame(usize),

    #[error("Unexpected message type {0} before login")]
    UnexpectedMessage(u16),

    #[error("Login twice is not allowed")]
    LoginTwice,

    #[error("Identity 0 is reserved")]
    NullIdentity,

    #[error("User {user} is blocked: {reason}")]
    AccessDenied { user: UserId, reason: String },

    #[error("Protocol version mismatch: client {client}, server {server}")]
    VersionMismatch { client: u32, server: u32 },

    #[error("Admin session has been closed")]
    AdminSessionClosed,

    #[error("Rejected: {0}")]
    Rejected(#[from] Rejection),

    #[error("Configuration error: {0}")]
    ConfigError(String),

    #[error("Custom error: {0}")]
    Custom(String),
}

impl RelayError {
    /// Whether the owning connection must be torn down.
    pub fn is_fatal(&self) -> bool {
        !matches!(self, RelayError::Rejected(_))
    }

    /// Whether this error is an ordinary end of stream rather than a failure.
    pub fn is_disconnect(&self) -> bool {
        match self {
            RelayError::ConnectionClosed => true,
            RelayError::Io(e) => matches!(
                e.kind(),
                io::ErrorKind::UnexpectedEof
                    | io::ErrorKind::ConnectionReset
                    | io::ErrorKind::ConnectionAborted
                    | io::ErrorKind::BrokenPipe
            ),
            _ => false,
        }
    }
}

/// Type alias for Results using RelayError
pub type Result<T> = std::result::Result<T, RelayError>;
