//! # Peer Relay
//!
//! Streams an announced payload from one control connection to another.
//!
//! ## Destination stream
//! ```text
//! [HasNewPeerData frame][payload bytes][0x01]         delivered
//! [HasNewPeerData frame][partial][zero padding][0x00] truncated
//! ```
//! The notice, payload, padding, and status byte are written under one send
//! permit. The source is always drained of exactly `size` bytes unless
//! reading it fails, which ends the source connection.

use std::sync::Arc;

use tokio::io::{AsyncRead, AsyncReadExt};
use tokio_util::codec::FramedRead;
use tracing::{debug, warn};

use crate::core::codec::{take_buffered, FrameCodec};
use crate::error::Result;
use crate::protocol::message::{PeerDataNotice, ResponseType};
use crate::protocol::types::UserId;
use crate::service::peer::{Peer, SendPermit};

/// Largest chunk read from the source at a time.
pub const RELAY_BLOCK_SIZE: usize = 1024 * 1024;

/// Trailing status byte after a complete payload.
pub const RELAY_SUCCESS: u8 = 0x01;

/// Trailing status byte after a zero-padded payload.
pub const RELAY_FAILURE: u8 = 0x00;

const ZERO_CHUNK: usize = 64 * 1024;

/// How a relay ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RelayOutcome {
    /// Payload bytes that reached the destination
    pub forwarded: u64,
    /// The destination received everything and the success byte
    pub delivered: bool,
}

/// Relay one announced payload.
///
/// `destination` is `None` when the target is not logged in; the source is
/// still drained. Returns an error only when the source cannot be read.
pub async fn relay_payload<R>(
    source: &mut FramedRead<R, FrameCodec>,
    source_id: UserId,
    destination: Option<&Arc<Peer>>,
    size: u32,
    channel: i32,
) -> Result<RelayOutcome>
where
    R: AsyncRead + Unpin,
{
    let total = u64::from(size);
    let mut outcome = RelayOutcome {
        forwarded: 0,
        delivered: false,
    };
    if total == 0 {
        return Ok(outcome);
    }

    let block_cap = RELAY_BLOCK_SIZE.min(total as usize);
    let mut buffer = vec![0u8; block_cap];
    let mut drained: u64 = 0;
    let mut permit: Option<SendPermit<'_>> = None;
    let mut failed = destination.is_none();

    while drained < total {
        let block = ((total - drained) as usize).min(block_cap);
        if let Err(e) = read_source(source, &mut buffer[..block]).await {
            warn!(source = %source_id, drained, total, error = %e, "Relay source read failed");
            if let Some(permit) = permit.as_mut() {
                finish_truncated(permit, total - outcome.forwarded).await;
            }
            return Err(e.into());
        }
        drained += block as u64;

        if failed {
            continue;
        }
        let Some(dest) = destination else {
            continue;
        };

        if permit.is_none() {
            let mut acquired = dest.permit().await;
            let notice = PeerDataNotice {
                source: source_id,
                size,
                channel,
            };
            if let Err(e) = acquired.send(ResponseType::HasNewPeerData, 0, &notice).await {
                debug!(target_user = %dest.user_id(), error = %e, "Relay notice failed");
                failed = true;
                continue;
            }
            permit = Some(acquired);
        }

        if let Some(permit) = permit.as_mut() {
            if let Err(e) = forward(permit, &buffer[..block], &mut outcome.forwarded).await {
                debug!(target_user = %dest.user_id(), forwarded = outcome.forwarded, error = %e, "Relay write failed");
                failed = true;
            }
        }
    }

    if let Some(mut permit) = permit {
        if failed {
            finish_truncated(&mut permit, total - outcome.forwarded).await;
        } else {
            let done = async {
                permit.write_raw(&[RELAY_SUCCESS]).await?;
                permit.flush().await
            }
            .await;
            outcome.delivered = done.is_ok();
        }
    }

    Ok(outcome)
}

async fn read_source<R>(source: &mut FramedRead<R, FrameCodec>, dst: &mut [u8]) -> std::io::Result<()>
where
    R: AsyncRead + Unpin,
{
    let buffered = take_buffered(source.read_buffer_mut(), dst);
    if buffered < dst.len() {
        source.get_mut().read_exact(&mut dst[buffered..]).await?;
    }
    Ok(())
}

async fn forward(permit: &mut SendPermit<'_>, mut buf: &[u8], forwarded: &mut u64) -> std::io::Result<()> {
    while !buf.is_empty() {
        let n = permit.write_some(buf).await?;
        *forwarded += n as u64;
        buf = &buf[n..];
    }
    Ok(())
}

/// Pad the promised length with zeros and append the failure byte, as long
/// as the destination still accepts writes.
async fn finish_truncated(permit: &mut SendPermit<'_>, missing: u64) {
    if !permit.peer().is_usable() {
        return;
    }
    let zeros = vec![0u8; ZERO_CHUNK.min(missing as usize)];
    let mut remaining = missing;
    while remaining > 0 {
        let chunk = (remaining as usize).min(zeros.len());
        if permit.write_raw(&zeros[..chunk]).await.is_err() {
            return;
        }
        remaining -= chunk as u64;
    }
    if permit.write_raw(&[RELAY_FAILURE]).await.is_ok() {
        let _ = permit.flush().await;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::utils::metrics::Metrics;
    use futures::StreamExt;
    use std::net::SocketAddr;
    use tokio::io::AsyncWriteExt;

    fn dest_peer(writer: tokio::io::DuplexStream) -> Arc<Peer> {
        let addr: SocketAddr = "127.0.0.1:9001".parse().unwrap_or_else(|e| panic!("{e}"));
        Arc::new(Peer::new(addr, Box::new(writer), Arc::new(Metrics::new())))
    }

    #[tokio::test]
    async fn test_payload_followed_by_success_byte() {
        let payload: Vec<u8> = (0..10_000u32).map(|i| (i % 251) as u8).collect();
        let (mut src_client, src_server) = tokio::io::duplex(64 * 1024);
        let (dst_client, dst_server) = tokio::io::duplex(64 * 1024);
        let dest = dest_peer(dst_server);

        src_client
            .write_all(&payload)
            .await
            .unwrap_or_else(|e| panic!("{e}"));
        let mut source = FramedRead::new(src_server, FrameCodec);

        let outcome = relay_payload(&mut source, UserId(1), Some(&dest), payload.len() as u32, 3)
            .await
            .unwrap_or_else(|e| panic!("{e}"));
        assert!(outcome.delivered);
        assert_eq!(outcome.forwarded, payload.len() as u64);

        let mut reader = FramedRead::new(dst_client, FrameCodec);
        let notice = reader
            .next()
            .await
            .and_then(|r| r.ok())
            .unwrap_or_else(|| panic!("no notice"));
        let notice: PeerDataNotice = notice.decode_body().unwrap_or_else(|e| panic!("{e}"));
        assert_eq!(notice.source, UserId(1));
        assert_eq!(notice.channel, 3);

        let mut received = vec![0u8; payload.len() + 1];
        read_source(&mut reader, &mut received)
            .await
            .unwrap_or_else(|e| panic!("{e}"));
        assert_eq!(&received[..payload.len()], payload.as_slice());
        assert_eq!(received[payload.len()], RELAY_SUCCESS);
    }

    #[tokio::test]
    async fn test_missing_destination_still_drains_source() {
        let (mut src_client, src_server) = tokio::io::duplex(4096);
        src_client
            .write_all(&[7u8; 300])
            .await
            .unwrap_or_else(|e| panic!("{e}"));
        src_client
            .write_all(b"next")
            .await
            .unwrap_or_else(|e| panic!("{e}"));
        let mut source = FramedRead::new(src_server, FrameCodec);

        let outcome = relay_payload(&mut source, UserId(1), None, 300, 0)
            .await
            .unwrap_or_else(|e| panic!("{e}"));
        assert!(!outcome.delivered);

        let mut rest = [0u8; 4];
        read_source(&mut source, &mut rest)
            .await
            .unwrap_or_else(|e| panic!("{e}"));
        assert_eq!(&rest, b"next");
    }

    #[tokio::test]
    async fn test_source_eof_pads_destination() {
        let (mut src_client, src_server) = tokio::io::duplex(4096);
        let (dst_client, dst_server) = tokio::io::duplex(4096);
        let dest = dest_peer(dst_server);

        src_client
            .write_all(&[9u8; 100])
            .await
            .unwrap_or_else(|e| panic!("{e}"));
        drop(src_client);
        let mut source = FramedRead::new(src_server, FrameCodec);

        // The only block is 200 bytes and never completes, so the notice is
        // never sent.
        let result = relay_payload(&mut source, UserId(1), Some(&dest), 200, 0).await;
        assert!(result.is_err());
        drop(dest);

        let mut reader = FramedRead::new(dst_client, FrameCodec);
        assert!(reader.next().await.is_none());
    }

    #[tokio::test]
    async fn test_destination_closing_mid_transfer_still_drains_source() {
        let payload = vec![4u8; 20_000];
        let (mut src_client, src_server) = tokio::io::duplex(64 * 1024);
        let (dst_client, dst_server) = tokio::io::duplex(256);
        let dest = dest_peer(dst_server);

        src_client
            .write_all(&payload)
            .await
            .unwrap_or_else(|e| panic!("{e}"));
        src_client
            .write_all(b"next")
            .await
            .unwrap_or_else(|e| panic!("{e}"));
        let mut source = FramedRead::new(src_server, FrameCodec);

        // Read the notice, then hang up while the payload is in flight.
        let reader = async move {
            let mut reader = FramedRead::new(dst_client, FrameCodec);
            reader.next().await.and_then(|r| r.ok())
        };
        let relay = relay_payload(&mut source, UserId(1), Some(&dest), payload.len() as u32, 0);
        let (notice, outcome) = tokio::join!(reader, relay);

        let notice = notice.unwrap_or_else(|| panic!("no notice"));
        assert_eq!(notice.header.message_type, ResponseType::HasNewPeerData.as_u16());
        let outcome = outcome.unwrap_or_else(|e| panic!("{e}"));
        assert!(!outcome.delivered);
        assert!(outcome.forwarded < payload.len() as u64);
        assert!(!dest.is_usable());

        let mut rest = [0u8; 4];
        read_source(&mut source, &mut rest)
            .await
            .unwrap_or_else(|e| panic!("{e}"));
        assert_eq!(&rest, b"next");
    }

    #[tokio::test]
    async fn test_source_failing_after_first_block_pads_destination() {
        let first_block = vec![6u8; RELAY_BLOCK_SIZE];
        let size = RELAY_BLOCK_SIZE + 100;
        let (mut src_client, src_server) = tokio::io::duplex(2 * RELAY_BLOCK_SIZE);
        let (dst_client, dst_server) = tokio::io::duplex(2 * RELAY_BLOCK_SIZE);
        let dest = dest_peer(dst_server);

        src_client
            .write_all(&first_block)
            .await
            .unwrap_or_else(|e| panic!("{e}"));
        drop(src_client);
        let mut source = FramedRead::new(src_server, FrameCodec);

        let result = relay_payload(&mut source, UserId(1), Some(&dest), size as u32, 0).await;
        assert!(result.is_err());

        let mut reader = FramedRead::new(dst_client, FrameCodec);
        let notice = reader
            .next()
            .await
            .and_then(|r| r.ok())
            .unwrap_or_else(|| panic!("no notice"));
        let notice: PeerDataNotice = notice.decode_body().unwrap_or_else(|e| panic!("{e}"));
        assert_eq!(notice.size as usize, size);

        let mut received = vec![0xFFu8; size + 1];
        read_source(&mut reader, &mut received)
            .await
            .unwrap_or_else(|e| panic!("{e}"));
        assert!(received[..RELAY_BLOCK_SIZE].iter().all(|&b| b == 6));
        assert!(received[RELAY_BLOCK_SIZE..size].iter().all(|&b| b == 0));
        assert_eq!(received[size], RELAY_FAILURE);
    }

    #[tokio::test]
    async fn test_zero_size_sends_nothing() {
        let (_src_client, src_server) = tokio::io::duplex(64);
        let (dst_client, dst_server) = tokio::io::duplex(64);
        let dest = dest_peer(dst_server);
        let mut source = FramedRead::new(src_server, FrameCodec);

        let outcome = relay_payload(&mut source, UserId(1), Some(&dest), 0, 0)
            .await
            .unwrap_or_else(|e| panic!("{e}"));
        assert_eq!(outcome.forwarded, 0);
        drop(dest);

        let mut reader = FramedRead::new(dst_client, FrameCodec);
        assert!(reader.next().await.is_none());
    }
}
