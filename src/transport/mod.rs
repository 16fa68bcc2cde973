//! # Transport Layer
//!
//! Network listeners of the relay server.
//!
//! ## Components
//! - **TCP**: framed control channel, one task per connection
//! - **UDP**: token binding, datagram forwarding, keepalive pings

pub mod tcp;
pub mod udp;
