//! # Peer
//!
//! The write side of one control connection, shared between its own task and
//! every task that delivers to it.
//!
//! All writes go through a [`SendPermit`], which holds the connection's write
//! lock. A framed message is written under one permit, and a peer relay keeps
//! its permit for the whole transfer, so byte streams from different senders
//! never interleave.

use std::io;
use std::net::SocketAddr;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, OnceLock};

use bytes::BytesMut;
use serde::Serialize;
use tokio::io::{AsyncWrite, AsyncWriteExt};
use tokio::sync::{Mutex, MutexGuard, Notify};
use tracing::debug;

use crate::core::frame::Frame;
use crate::error::{RelayError, Result};
use crate::protocol::message::ResponseType;
use crate::protocol::types::{Language, LobbyId, UserId};
use crate::utils::metrics::Metrics;

/// Type-erased write half of a connection.
pub type BoxedWriter = Box<dyn AsyncWrite + Send + Unpin>;

/// Identity fixed at login.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Profile {
    pub user_id: UserId,
    pub name: String,
    pub language: Language,
}

pub struct Peer {
    addr: SocketAddr,
    profile: OnceLock<Profile>,
    /// Lobby the owning session is in, for observers such as the admin console
    lobby: AtomicU64,
    writer: Mutex<BoxedWriter>,
    closed: AtomicBool,
    kicked: Notify,
    metrics: Arc<Metrics>,
}

impl Peer {
    pub fn new(addr: SocketAddr, writer: BoxedWriter, metrics: Arc<Metrics>) -> Self {
        Self {
            addr,
            profile: OnceLock::new(),
            lobby: AtomicU64::new(LobbyId::NONE.0),
            writer: Mutex::new(writer),
            closed: AtomicBool::new(false),
            kicked: Notify::new(),
            metrics,
        }
    }

    pub fn addr(&self) -> SocketAddr {
        self.addr
    }

    pub fn profile(&self) -> Option<&Profile> {
        self.profile.get()
    }

    /// Fix the identity. Returns false if one was already set.
    pub(crate) fn bind_profile(&self, profile: Profile) -> bool {
        self.profile.set(profile).is_ok()
    }

    pub fn user_id(&self) -> UserId {
        self.profile().map(|p| p.user_id).unwrap_or(UserId::NONE)
    }

    pub fn name(&self) -> &str {
        self.profile().map(|p| p.name.as_str()).unwrap_or("")
    }

    pub fn language(&self) -> Language {
        self.profile().map(|p| p.language).unwrap_or_default()
    }

    pub fn current_lobby(&self) -> LobbyId {
        LobbyId(self.lobby.load(Ordering::Relaxed))
    }

    pub(crate) fn set_current_lobby(&self, lobby: LobbyId) {
        self.lobby.store(lobby.0, Ordering::Relaxed);
    }

    /// False once a write has failed or the connection was shut down.
    pub fn is_usable(&self) -> bool {
        !self.closed.load(Ordering::Acquire)
    }

    pub fn mark_closed(&self) {
        self.closed.store(true, Ordering::Release);
    }

    /// Ask the owning task to drop the connection.
    pub fn kick(&self) {
        self.mark_closed();
        self.kicked.notify_one();
    }

    /// Resolves once [`kick`](Self::kick) has been called.
    pub async fn kicked(&self) {
        self.kicked.notified().await
    }

    /// Wait for exclusive write access.
    pub async fn permit(&self) -> SendPermit<'_> {
        SendPermit {
            peer: self,
            writer: self.writer.lock().await,
        }
    }

    /// Send one framed message.
    pub async fn send<T: Serialize>(&self, kind: ResponseType, hold_value: i32, body: &T) -> Result<()> {
        self.permit().await.send(kind, hold_value, body).await
    }

    /// Send an already built frame.
    pub async fn send_frame(&self, frame: &Frame) -> Result<()> {
        self.permit().await.send_frame(frame).await
    }

    /// Close the write half. Later sends fail with `ConnectionClosed`.
    pub async fn shutdown(&self) {
        let mut writer = self.writer.lock().await;
        self.mark_closed();
        if let Err(e) = writer.shutdown().await {
            debug!(peer = %self.addr, error = %e, "Error shutting down writer");
        }
    }
}

impl std::fmt::Debug for Peer {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Peer")
            .field("addr", &self.addr)
            .field("profile", &self.profile.get())
            .field("closed", &!self.is_usable())
            .finish()
    }
}

/// Exclusive write access to one peer.
pub struct SendPermit<'a> {
    peer: &'a Peer,
    writer: MutexGuard<'a, BoxedWriter>,
}

impl SendPermit<'_> {
    pub fn peer(&self) -> &Peer {
        self.peer
    }

    /// Encode and write one frame, then flush.
    ///
    /// Nothing is written if the body does not fit in a frame. A failed
    /// write leaves the stream mid-frame, so the peer is marked closed.
    pub async fn send<T: Serialize>(&mut self, kind: ResponseType, hold_value: i32, body: &T) -> Result<()> {
        let frame = Frame::new(kind.as_u16(), hold_value, body)?;
        self.send_frame(&frame).await
    }

    pub async fn send_frame(&mut self, frame: &Frame) -> Result<()> {
        if !self.peer.is_usable() {
            return Err(RelayError::ConnectionClosed);
        }
        let mut buf = BytesMut::new();
        frame.encode_into(&mut buf)?;

        let written = async {
            self.writer.write_all(&buf).await?;
            self.writer.flush().await
        }
        .await;
        if let Err(e) = written {
            self.peer.mark_closed();
            return Err(e.into());
        }
        self.peer.metrics.frame_sent();
        Ok(())
    }

    /// A single write call. Connection-ending errors mark the peer closed;
    /// others leave it usable.
    pub async fn write_some(&mut self, buf: &[u8]) -> io::Result<usize> {
        if !self.peer.is_usable() {
            return Err(io::Error::new(io::ErrorKind::NotConnected, "peer is closed"));
        }
        match self.writer.write(buf).await {
            Ok(0) if !buf.is_empty() => {
                self.peer.mark_closed();
                Err(io::Error::new(io::ErrorKind::WriteZero, "peer accepted no bytes"))
            }
            Ok(n) => Ok(n),
            Err(e) => {
                if ends_connection(&e) {
                    self.peer.mark_closed();
                }
                Err(e)
            }
        }
    }

    /// Write all of `buf` as raw bytes, outside any frame.
    pub async fn write_raw(&mut self, mut buf: &[u8]) -> io::Result<()> {
        while !buf.is_empty() {
            let n = self.write_some(buf).await?;
            buf = &buf[n..];
        }
        Ok(())
    }

    pub async fn flush(&mut self) -> io::Result<()> {
        self.writer.flush().await
    }
}

fn ends_connection(e: &io::Error) -> bool {
    matches!(
        e.kind(),
        io::ErrorKind::BrokenPipe
            | io::ErrorKind::ConnectionReset
            | io::ErrorKind::ConnectionAborted
            | io::ErrorKind::NotConnected
            | io::ErrorKind::UnexpectedEof
            | io::ErrorKind::WriteZero
    )
}
