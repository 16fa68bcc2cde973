//! # Core Wire Components
//!
//! Frame layout, header record and the tokio codec that drives them.
//!
//! ## Components
//! - **Frame**: header record plus body bytes
//! - **Codec**: Tokio codec for framing over byte streams
//!
//! ## Wire Format
//! ```text
//! [HeaderLen(4, big-endian)] [Header(HeaderLen)] [Body(Header.length)]
//! Header = bincode { message_type: u16, hold_value: i32, length: u32 }
//! ```
//!
//! ## Limits
//! - Header and body must each stay below `MAX_FRAME_SIZE` (4096 bytes)
//! - Length validation happens before any allocation

pub mod codec;
pub mod frame;
