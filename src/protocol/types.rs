//! Identity and handle types shared by every layer.

use serde::{Deserialize, Serialize};
use std::fmt;

/// Number of member slots in every lobby.
pub const LOBBY_CAPACITY: usize = 4;

/// Opaque 64-bit user identity. `UserId::NONE` (0) is never assigned.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Default, Serialize, Deserialize)]
pub struct UserId(pub u64);

impl UserId {
    pub const NONE: UserId = UserId(0);

    pub fn is_none(self) -> bool {
        self == Self::NONE
    }
}

impl fmt::Display for UserId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Lobby handle. `LobbyId::NONE` (0) means "not in a lobby".
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Default, Serialize, Deserialize)]
pub struct LobbyId(pub u64);

impl LobbyId {
    pub const NONE: LobbyId = LobbyId(0);

    pub fn is_none(self) -> bool {
        self == Self::NONE
    }
}

impl fmt::Display for LobbyId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// A lobby member position, always in `0..LOBBY_CAPACITY`.
pub type Slot = usize;

/// A member slot inside a specific lobby.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct SlotRef {
    pub lobby: LobbyId,
    pub slot: Slot,
}

/// Client language preference, sent at login.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum Language {
    #[default]
    English,
    Chinese,
}
