//! # Lobby
//!
//! Membership and key/value state of one 4-slot lobby.
//!
//! `Lobby` is plain data with synchronous methods; the registry wraps each
//! one in its own async mutex (`SharedLobby`). Slot indices are stable for as
//! long as a member stays, and an empty slot holds `UserId::NONE`.

use std::collections::BTreeMap;
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::{Duration, Instant};

use tokio::sync::Mutex;

use crate::error::Rejection;
use crate::protocol::message::{DataItem, LobbyInfo, MemberInfo};
use crate::protocol::types::{LobbyId, Slot, UserId, LOBBY_CAPACITY};

/// A lobby behind its own lock.
pub type SharedLobby = Arc<Mutex<Lobby>>;

/// What a removal cleared, so callers can drop the matching UDP binding.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RemovedMember {
    pub slot: Slot,
    pub udp_endpoint: Option<SocketAddr>,
}

#[derive(Debug)]
pub struct Lobby {
    id: LobbyId,
    owner: UserId,
    members: [UserId; LOBBY_CAPACITY],
    data: BTreeMap<String, String>,
    member_data: [BTreeMap<String, String>; LOBBY_CAPACITY],
    udp_endpoints: [Option<SocketAddr>; LOBBY_CAPACITY],
    name: String,
    password: Option<String>,
    created_at: Instant,
    /// Set whenever the member count drops to zero
    vacated_at: Option<Instant>,
    /// Set once the lobby has been taken out of the registry
    closed: bool,
}

impl Lobby {
    pub fn new(id: LobbyId, name: String, password: Option<String>, created_at: Instant) -> Self {
        Self {
            id,
            owner: UserId::NONE,
            members: [UserId::NONE; LOBBY_CAPACITY],
            data: BTreeMap::new(),
            member_data: Default::default(),
            udp_endpoints: [None; LOBBY_CAPACITY],
            name,
            password,
            created_at,
            vacated_at: None,
            closed: false,
        }
    }

    pub fn id(&self) -> LobbyId {
        self.id
    }

    pub fn owner(&self) -> UserId {
        self.owner
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn password(&self) -> Option<&str> {
        self.password.as_deref()
    }

    pub fn has_password(&self) -> bool {
        self.password.is_some()
    }

    /// An open lobby accepts anything; a locked one needs the exact password.
    pub fn password_matches(&self, supplied: Option<&str>) -> bool {
        match &self.password {
            None => true,
            Some(expected) => supplied == Some(expected.as_str()),
        }
    }

    pub fn created_at(&self) -> Instant {
        self.created_at
    }

    /// Copy of the slot array, in slot order.
    pub fn members(&self) -> [UserId; LOBBY_CAPACITY] {
        self.members
    }

    pub fn slot_of(&self, user: UserId) -> Option<Slot> {
        if user.is_none() {
            return None;
        }
        self.members.iter().position(|&m| m == user)
    }

    pub fn contains(&self, user: UserId) -> bool {
        self.slot_of(user).is_some()
    }

    pub fn member_count(&self) -> usize {
        self.members.iter().filter(|m| !m.is_none()).count()
    }

    pub fn is_empty(&self) -> bool {
        self.member_count() == 0
    }

    pub fn is_closed(&self) -> bool {
        self.closed
    }

    /// Mark the lobby as removed from the registry; later joins fail.
    pub fn close(&mut self) {
        self.closed = true;
    }

    /// Add `user`, returning its slot.
    ///
    /// Re-adding a present member is a no-op that returns the existing slot.
    pub fn add_member(&mut self, user: UserId) -> Result<Slot, Rejection> {
        if self.closed {
            return Err(Rejection::LobbyNotFound(self.id));
        }
        if let Some(slot) = self.slot_of(user) {
            return Ok(slot);
        }
        let slot = self
            .members
            .iter()
            .position(|m| m.is_none())
            .ok_or(Rejection::LobbyFull)?;
        self.members[slot] = user;
        self.member_data[slot].clear();
        self.udp_endpoints[slot] = None;
        self.vacated_at = None;
        Ok(slot)
    }

    /// Remove `user`, promoting the highest occupied slot if it owned the lobby.
    pub fn remove_member(&mut self, user: UserId, now: Instant) -> Option<RemovedMember> {
        let slot = self.slot_of(user)?;
        self.members[slot] = UserId::NONE;
        self.member_data[slot].clear();
        let udp_endpoint = self.udp_endpoints[slot].take();

        if self.owner == user {
            self.owner = self
                .members
                .iter()
                .rev()
                .copied()
                .find(|m| !m.is_none())
                .unwrap_or(UserId::NONE);
        }
        if self.is_empty() {
            self.vacated_at = Some(now);
        }

        Some(RemovedMember { slot, udp_endpoint })
    }

    pub fn set_owner(&mut self, user: UserId) {
        self.owner = user;
    }

    pub fn set_data(&mut self, key: String, value: String) {
        self.data.insert(key, value);
    }

    pub fn data(&self, key: &str) -> Option<&str> {
        self.data.get(key).map(String::as_str)
    }

    pub fn set_member_data(&mut self, slot: Slot, key: String, value: String) {
        if let Some(map) = self.member_data.get_mut(slot) {
            map.insert(key, value);
        }
    }

    pub fn member_data(&self, slot: Slot, key: &str) -> Option<&str> {
        self.member_data
            .get(slot)
            .and_then(|map| map.get(key))
            .map(String::as_str)
    }

    /// Store the UDP endpoint of `slot`, returning the one it replaces.
    pub fn bind_udp(&mut self, slot: Slot, addr: SocketAddr) -> Option<SocketAddr> {
        let entry = self.udp_endpoints.get_mut(slot)?;
        entry.replace(addr)
    }

    pub fn udp_endpoint(&self, slot: Slot) -> Option<SocketAddr> {
        self.udp_endpoints.get(slot).copied().flatten()
    }

    /// Empty for at least `grace` as of `now`.
    pub fn is_idle(&self, now: Instant, grace: Duration) -> bool {
        if !self.is_empty() {
            return false;
        }
        let since = self.vacated_at.unwrap_or(self.created_at);
        now.saturating_duration_since(since) >= grace
    }

    /// Public summary used in lobby listings.
    pub fn info(&self) -> LobbyInfo {
        LobbyInfo {
            lobby_id: self.id,
            owner: self.owner,
            members: self.members,
            data: to_items(&self.data),
            name: self.name.clone(),
            has_password: self.has_password(),
            password: None,
            member_data: None,
        }
    }

    /// Summary plus per-member data, sent to members.
    pub fn full_info(&self, share_udp: bool) -> LobbyInfo {
        let mut info = self.info();
        let members = (0..LOBBY_CAPACITY)
            .map(|slot| {
                if self.members[slot].is_none() {
                    return MemberInfo::default();
                }
                MemberInfo {
                    udp_addr: if share_udp {
                        self.udp_endpoints[slot]
                    } else {
                        None
                    },
                    data: to_items(&self.member_data[slot]),
                }
            })
            .collect();
        info.member_data = Some(members);
        info
    }
}

fn to_items(map: &BTreeMap<String, String>) -> Vec<DataItem> {
    map.iter()
        .map(|(key, value)| DataItem {
            key: key.clone(),
            value: value.clone(),
        })
        .collect()
}
