//! Tokio codec for the length-prefixed header/body frame format.

use bytes::{Buf, BytesMut};
use tokio_util::codec::{Decoder, Encoder};

use crate::core::frame::{decode_header, Frame, LENGTH_PREFIX_SIZE, MAX_FRAME_SIZE};
use crate::error::{RelayError, Result};

/// Stateless frame codec used by both the server and [`crate::client::RelayClient`].
///
/// Decoding never consumes input until a complete frame is buffered, so any
/// bytes that follow a frame (a peer-data payload) stay in the read buffer.
#[derive(Debug, Default, Clone, Copy)]
pub struct FrameCodec;

impl Decoder for FrameCodec {
    type Item = Frame;
    type Error = RelayError;

    fn decode(&mut self, src: &mut BytesMut) -> Result<Option<Frame>> {
        if src.len() < LENGTH_PREFIX_SIZE {
            return Ok(None);
        }

        let header_len = u32::from_be_bytes([src[0], src[1], src[2], src[3]]) as usize;
        if header_len >= MAX_FRAME_SIZE {
            return Err(RelayError::OversizedFrame(header_len));
        }

        let header_end = LENGTH_PREFIX_SIZE + header_len;
        if src.len() < header_end {
            src.reserve(header_end - src.len());
            return Ok(None);
        }

        let header = decode_header(&src[LENGTH_PREFIX_SIZE..header_end])?;
        let body_len = header.length as usize;
        if body_len >= MAX_FRAME_SIZE {
            return Err(RelayError::OversizedFrame(body_len));
        }

        let total = header_end + body_len;
        if src.len() < total {
            src.reserve(total - src.len());
            return Ok(None);
        }

        src.advance(header_end);
        let body = src.split_to(body_len).freeze();
        Ok(Some(Frame { header, body }))
    }
}

impl Encoder<Frame> for FrameCodec {
    type Error = RelayError;

    fn encode(&mut self, frame: Frame, dst: &mut BytesMut) -> Result<()> {
        frame.encode_into(dst)
    }
}

/// Move up to `dst.len()` already-buffered bytes out of a codec read buffer.
///
/// Returns how many bytes were copied; the caller reads the rest from the
/// underlying stream.
pub fn take_buffered(buffer: &mut BytesMut, dst: &mut [u8]) -> usize {
    let n = buffer.len().min(dst.len());
    dst[..n].copy_from_slice(&buffer[..n]);
    buffer.advance(n);
    n
}
