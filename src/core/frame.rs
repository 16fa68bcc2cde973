//! Frame header record and whole-frame (de)serialization.

use bytes::{BufMut, Bytes, BytesMut};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};

use crate::error::{RelayError, Result};

/// Hard cap on the encoded header and on ordinary bodies.
pub const MAX_FRAME_SIZE: usize = 4096;

/// Size of the big-endian header length prefix.
pub const LENGTH_PREFIX_SIZE: usize = 4;

/// Fixed header record sent in front of every body.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Header {
    /// `RequestType` or `ResponseType` tag, depending on direction
    pub message_type: u16,
    /// Opaque value echoed back to correlate responses
    pub hold_value: i32,
    /// Length of the body that follows the header
    pub length: u32,
}

/// One decoded message: header plus raw body bytes.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Frame {
    pub header: Header,
    pub body: Bytes,
}

impl Frame {
    /// Serialize `body` and build the matching header.
    ///
    /// Fails with `OversizedFrame` when the encoded body would reach the cap,
    /// so nothing oversized is ever handed to a socket.
    pub fn new<T: Serialize>(message_type: u16, hold_value: i32, body: &T) -> Result<Self> {
        let body = bincode::serialize(body)?;
        Self::from_raw(message_type, hold_value, Bytes::from(body))
    }

    /// Build a frame around an already encoded body.
    pub fn from_raw(message_type: u16, hold_value: i32, body: Bytes) -> Result<Self> {
        if body.len() >= MAX_FRAME_SIZE {
            return Err(RelayError::OversizedFrame(body.len()));
        }
        Ok(Self {
            header: Header {
                message_type,
                hold_value,
                length: body.len() as u32,
            },
            body,
        })
    }

    /// Decode the body as `T`. A malformed body is a protocol violation.
    pub fn decode_body<T: DeserializeOwned>(&self) -> Result<T> {
        Ok(bincode::deserialize(&self.body)?)
    }

    /// Encode into `dst` as `[len][header][body]`.
    pub fn encode_into(&self, dst: &mut BytesMut) -> Result<()> {
        if self.body.len() >= MAX_FRAME_SIZE || self.header.length as usize != self.body.len() {
            return Err(RelayError::OversizedFrame(self.body.len()));
        }
        let header = bincode::serialize(&self.header)?;
        if header.len() >= MAX_FRAME_SIZE {
            return Err(RelayError::OversizedFrame(header.len()));
        }

        dst.reserve(LENGTH_PREFIX_SIZE + header.len() + self.body.len());
        dst.put_u32(header.len() as u32);
        dst.extend_from_slice(&header);
        dst.extend_from_slice(&self.body);
        Ok(())
    }

    /// Encode into a fresh buffer.
    pub fn to_bytes(&self) -> Result<Bytes> {
        let mut buf = BytesMut::new();
        self.encode_into(&mut buf)?;
        Ok(buf.freeze())
    }

    /// Parse exactly one complete frame from `data`.
    pub fn from_bytes(data: &[u8]) -> Result<Self> {
        if data.len() < LENGTH_PREFIX_SIZE {
            return Err(RelayError::InvalidHeader);
        }
        let header_len = u32::from_be_bytes([data[0], data[1], data[2], data[3]]) as usize;
        if header_len >= MAX_FRAME_SIZE {
            return Err(RelayError::OversizedFrame(header_len));
        }
        let header_end = LENGTH_PREFIX_SIZE + header_len;
        if data.len() < header_end {
            return Err(RelayError::InvalidHeader);
        }
        let header = decode_header(&data[LENGTH_PREFIX_SIZE..header_end])?;
        let body_len = header.length as usize;
        if body_len >= MAX_FRAME_SIZE {
            return Err(RelayError::OversizedFrame(body_len));
        }
        if data.len() < header_end + body_len {
            return Err(RelayError::InvalidHeader);
        }
        Ok(Self {
            header,
            body: Bytes::copy_from_slice(&data[header_end..header_end + body_len]),
        })
    }
}

/// Decode a header record, mapping any schema failure to `InvalidHeader`.
pub(crate) fn decode_header(bytes: &[u8]) -> Result<Header> {
    bincode::deserialize(bytes).map_err(|_| RelayError::InvalidHeader)
}
