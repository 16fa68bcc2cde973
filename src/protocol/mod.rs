//! # Protocol Layer
//!
//! Message catalogue and identity types of the lobby protocol.
//!
//! Every control message is a [`Frame`](crate::core::frame::Frame) whose
//! header carries a [`RequestType`](message::RequestType) (client to server)
//! or [`ResponseType`](message::ResponseType) (server to client) tag and
//! whose body is one of the bincode records defined in [`message`].

pub mod message;
pub mod types;

#[cfg(test)]
mod tests;

pub use message::{RequestType, ResponseType};
pub use types::{Language, LobbyId, Slot, SlotRef, UserId, LOBBY_CAPACITY};
