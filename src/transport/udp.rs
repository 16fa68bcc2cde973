//! # UDP Rendezvous
//!
//! One socket serves token binding, member-to-member forwarding, and
//! keepalive pings.
//!
//! ## Datagram kinds
//! The high nibble of the first byte selects the kind; for forwarded kinds
//! the low two bits name the target slot.
//!
//! | Nibble | Kind                       |
//! |--------|----------------------------|
//! | `0x0_` | forward or yours           |
//! | `0x1_` | forward or yours + channel |
//! | `0x2_` | ensure package             |
//! | `0x3_` | ping-pong                  |
//!
//! A datagram shorter than [`MAX_TOKEN_DATAGRAM`] is also tried as a UDP
//! token; a hit binds the sender's address to the token's slot.
//!
//! The receive loop awaits only the socket and lobby locks. Control-channel
//! notices are written from spawned tasks.

use std::net::SocketAddr;
use std::sync::Arc;

use tokio::net::UdpSocket;
use tokio::sync::broadcast;
use tracing::{debug, info, warn};

use crate::error::Result;
use crate::protocol::message::{ResponseType, UserUdpAddr};
use crate::protocol::types::{Slot, SlotRef, UserId};
use crate::service::context::ServerContext;

/// Receive buffer size.
pub const MAX_DATAGRAM_SIZE: usize = 1024 * 1024;

/// Datagrams at least this long are never treated as tokens.
pub const MAX_TOKEN_DATAGRAM: usize = 100;

/// Payload of the ping-pong reply.
pub const PING_PONG: u8 = 0x30;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DatagramKind {
    ForwardOrYours,
    ForwardOrYoursAndChannel,
    EnsurePackage,
    PingPong,
}

impl DatagramKind {
    pub fn classify(first: u8) -> Option<Self> {
        match first & 0xF0 {
            0x00 => Some(Self::ForwardOrYours),
            0x10 => Some(Self::ForwardOrYoursAndChannel),
            0x20 => Some(Self::EnsurePackage),
            0x30 => Some(Self::PingPong),
            _ => None,
        }
    }
}

/// Slot addressed by a forwarded datagram.
pub fn target_slot(first: u8) -> Slot {
    (first & 0x03) as Slot
}

pub struct UdpRelay {
    socket: Arc<UdpSocket>,
    ctx: Arc<ServerContext>,
}

impl UdpRelay {
    pub fn new(socket: Arc<UdpSocket>, ctx: Arc<ServerContext>) -> Self {
        Self { socket, ctx }
    }

    pub async fn run(self, mut shutdown: broadcast::Receiver<()>) -> Result<()> {
        info!(addr = ?self.socket.local_addr().ok(), "UDP rendezvous listening");
        let mut buf = vec![0u8; MAX_DATAGRAM_SIZE];
        loop {
            tokio::select! {
                _ = shutdown.recv() => {
                    debug!("UDP rendezvous stopping");
                    return Ok(());
                }
                received = self.socket.recv_from(&mut buf) => {
                    match received {
                        Ok((len, from)) => self.handle_datagram(&buf[..len], from).await,
                        Err(e) => debug!(error = %e, "UDP receive failed"),
                    }
                }
            }
        }
    }

    pub async fn handle_datagram(&self, payload: &[u8], from: SocketAddr) {
        if let Some(slot) = self.ctx.endpoints.get(from).await {
            self.dispatch(slot, payload, from).await;
        }
        if payload.len() < MAX_TOKEN_DATAGRAM {
            self.try_bind(payload, from).await;
        }
    }

    async fn dispatch(&self, origin: SlotRef, payload: &[u8], from: SocketAddr) {
        let Some(&first) = payload.first() else {
            return;
        };
        match DatagramKind::classify(first) {
            Some(DatagramKind::PingPong) => self.send(&[PING_PONG], from).await,
            Some(_) => {
                let Some(shared) = self.ctx.lobbies.get(origin.lobby).await else {
                    return;
                };
                let target = shared.lock().await.udp_endpoint(target_slot(first));
                if let Some(target) = target {
                    self.send(payload, target).await;
                    self.ctx.metrics.datagram_forwarded();
                }
            }
            None => {}
        }
    }

    async fn try_bind(&self, payload: &[u8], from: SocketAddr) {
        let Ok(token) = std::str::from_utf8(payload) else {
            return;
        };
        let Some(slot_ref) = self.ctx.tokens.take(token).await else {
            return;
        };
        let Some(shared) = self.ctx.lobbies.get(slot_ref.lobby).await else {
            return;
        };

        let members = {
            let mut lobby = shared.lock().await;
            if lobby.is_closed() || lobby.members()[slot_ref.slot].is_none() {
                return;
            }
            if let Some(previous) = lobby.bind_udp(slot_ref.slot, from) {
                if previous != from {
                    self.ctx.endpoints.remove_if(previous, slot_ref).await;
                }
            }
            self.ctx.endpoints.bind(from, slot_ref).await;
            lobby.members()
        };

        self.ctx.metrics.udp_bound();
        info!(
            lobby = %slot_ref.lobby,
            slot = slot_ref.slot,
            addr = %from,
            "UDP endpoint bound"
        );
        self.send(&[PING_PONG], from).await;

        // Member sockets may be busy with a peer relay; this loop never waits on them.
        let ctx = self.ctx.clone();
        let update = UserUdpAddr {
            slot: slot_ref.slot as u32,
            addr: from,
        };
        tokio::spawn(async move {
            ctx.broadcast(&members, UserId::NONE, ResponseType::UpdateUserUdpAddr, &update)
                .await;
        });
    }

    async fn send(&self, payload: &[u8], to: SocketAddr) {
        if let Err(e) = self.socket.send_to(payload, to).await {
            warn!(to = %to, error = %e, "UDP send failed");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_classify_high_nibble() {
        assert_eq!(DatagramKind::classify(0x03), Some(DatagramKind::ForwardOrYours));
        assert_eq!(DatagramKind::classify(0x12), Some(DatagramKind::ForwardOrYoursAndChannel));
        assert_eq!(DatagramKind::classify(0x21), Some(DatagramKind::EnsurePackage));
        assert_eq!(DatagramKind::classify(0x3F), Some(DatagramKind::PingPong));
        assert_eq!(DatagramKind::classify(0x40), None);
        assert_eq!(DatagramKind::classify(PING_PONG), Some(DatagramKind::PingPong));
    }

    #[test]
    fn test_target_slot_uses_low_bits() {
        assert_eq!(target_slot(0x02), 2);
        assert_eq!(target_slot(0x17), 3);
        assert_eq!(target_slot(0x2C), 0);
    }
}
