//! # Lobby Relay
//!
//! Rendezvous and relay server for a small-lobby multiplayer protocol.
//!
//! ## Architecture
//! - **core**: length-prefixed frame format and its tokio codec
//! - **protocol**: message catalogue and identity types
//! - **service**: sessions, lobbies, peer relay, admin console, sweeper
//! - **transport**: TCP control channel and UDP rendezvous listeners
//! - **server**: lifecycle of a running relay
//! - **client**: async client for the control channel
//! - **config**: TOML, environment, and default configuration
//! - **utils**: logging, metrics, time helpers

pub mod client;
pub mod config;
pub mod core;
pub mod error;
pub mod protocol;
pub mod server;
pub mod service;
pub mod transport;
pub mod utils;

pub use client::RelayClient;
pub use config::RelayConfig;
pub use error::{RelayError, Rejection, Result};
pub use server::{RelayServer, ServerHandle};
