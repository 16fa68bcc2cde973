//! # Registries
//!
//! Server-wide tables, each behind its own lock.
//!
//! ## Lock order
//! A lobby's lock may be held while calling into any registry here. No
//! registry lock is ever held while awaiting a lobby lock, and registry locks
//! are never nested in each other.

use std::collections::HashMap;
use std::net::SocketAddr;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

use tokio::sync::Mutex;

use crate::config::AccessMode;
use crate::protocol::types::{LobbyId, SlotRef, UserId};
use crate::service::lobby::{Lobby, SharedLobby};
use crate::service::peer::Peer;

/// Logged-in sessions by identity.
#[derive(Debug, Default)]
pub struct SessionRegistry {
    inner: Mutex<HashMap<UserId, Arc<Peer>>>,
}

impl SessionRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a logged-in peer, returning the one it displaced.
    pub async fn insert(&self, peer: Arc<Peer>) -> Option<Arc<Peer>> {
        let user = peer.user_id();
        self.inner.lock().await.insert(user, peer)
    }

    pub async fn get(&self, user: UserId) -> Option<Arc<Peer>> {
        self.inner.lock().await.get(&user).cloned()
    }

    /// Remove `user` only if it still maps to `peer`.
    pub async fn remove_if_same(&self, user: UserId, peer: &Arc<Peer>) -> bool {
        let mut sessions = self.inner.lock().await;
        match sessions.get(&user) {
            Some(current) if Arc::ptr_eq(current, peer) => {
                sessions.remove(&user);
                true
            }
            _ => false,
        }
    }

    pub async fn snapshot(&self) -> Vec<Arc<Peer>> {
        let mut peers: Vec<_> = self.inner.lock().await.values().cloned().collect();
        peers.sort_by_key(|p| p.user_id());
        peers
    }

    pub async fn len(&self) -> usize {
        self.inner.lock().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.len().await == 0
    }
}

/// Live lobbies by id, plus the id allocator.
#[derive(Debug)]
pub struct LobbyRegistry {
    inner: Mutex<HashMap<LobbyId, SharedLobby>>,
    next_id: AtomicU64,
}

impl Default for LobbyRegistry {
    fn default() -> Self {
        Self::new()
    }
}

impl LobbyRegistry {
    pub fn new() -> Self {
        Self {
            inner: Mutex::new(HashMap::new()),
            next_id: AtomicU64::new(1),
        }
    }

    /// Next unused lobby id. Never returns `LobbyId::NONE`.
    pub fn allocate_id(&self) -> LobbyId {
        LobbyId(self.next_id.fetch_add(1, Ordering::Relaxed))
    }

    pub async fn insert(&self, lobby: Lobby) -> SharedLobby {
        let id = lobby.id();
        let shared = Arc::new(Mutex::new(lobby));
        self.inner.lock().await.insert(id, shared.clone());
        shared
    }

    pub async fn get(&self, id: LobbyId) -> Option<SharedLobby> {
        self.inner.lock().await.get(&id).cloned()
    }

    pub async fn remove(&self, id: LobbyId) -> Option<SharedLobby> {
        self.inner.lock().await.remove(&id)
    }

    /// All lobbies ordered by id.
    pub async fn snapshot(&self) -> Vec<SharedLobby> {
        let guard = self.inner.lock().await;
        let mut entries: Vec<_> = guard.iter().map(|(id, l)| (*id, l.clone())).collect();
        drop(guard);
        entries.sort_by_key(|(id, _)| *id);
        entries.into_iter().map(|(_, l)| l).collect()
    }

    pub async fn len(&self) -> usize {
        self.inner.lock().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.len().await == 0
    }

    /// Delete every lobby that has been empty for at least `grace`.
    ///
    /// Each candidate is re-checked and closed under its own lock, so a join
    /// racing the sweep either lands first (and the lobby survives) or sees a
    /// closed lobby.
    pub async fn sweep_idle(&self, now: Instant, grace: Duration) -> Vec<LobbyId> {
        let mut removed = Vec::new();
        for shared in self.snapshot().await {
            let mut lobby = shared.lock().await;
            if lobby.is_closed() || !lobby.is_idle(now, grace) {
                continue;
            }
            lobby.close();
            let mut inner = self.inner.lock().await;
            if inner.get(&lobby.id()).is_some_and(|l| Arc::ptr_eq(l, &shared)) {
                inner.remove(&lobby.id());
            }
            removed.push(lobby.id());
        }
        removed
    }
}

/// Outcome of an access-list check.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Access {
    Allowed,
    /// Private mode and the user has no allow entry
    NotListed,
    /// Explicit deny entry, with the administrator's reason if one was given
    Denied(Option<String>),
}

#[derive(Debug, Clone, PartialEq, Eq)]
enum AccessEntry {
    Allow,
    Deny(Option<String>),
}

#[derive(Debug, Default)]
struct AccessState {
    mode: AccessMode,
    entries: HashMap<UserId, AccessEntry>,
}

/// Public/private mode plus per-user allow and deny entries.
#[derive(Debug, Default)]
pub struct AccessList {
    inner: Mutex<AccessState>,
}

impl AccessList {
    pub fn new(mode: AccessMode) -> Self {
        Self {
            inner: Mutex::new(AccessState {
                mode,
                entries: HashMap::new(),
            }),
        }
    }

    pub async fn check(&self, user: UserId) -> Access {
        let state = self.inner.lock().await;
        match (state.mode, state.entries.get(&user)) {
            (_, Some(AccessEntry::Deny(reason))) => Access::Denied(reason.clone()),
            (AccessMode::Private, Some(AccessEntry::Allow)) => Access::Allowed,
            (AccessMode::Private, None) => Access::NotListed,
            (AccessMode::Public, _) => Access::Allowed,
        }
    }

    pub async fn mode(&self) -> AccessMode {
        self.inner.lock().await.mode
    }

    pub async fn set_mode(&self, mode: AccessMode) {
        self.inner.lock().await.mode = mode;
    }

    pub async fn allow(&self, user: UserId) {
        self.inner.lock().await.entries.insert(user, AccessEntry::Allow);
    }

    pub async fn deny(&self, user: UserId, reason: Option<String>) {
        self.inner
            .lock()
            .await
            .entries
            .insert(user, AccessEntry::Deny(reason));
    }
}

/// Outstanding UDP tokens.
#[derive(Debug, Default)]
pub struct TokenTable {
    inner: Mutex<HashMap<String, SlotRef>>,
}

impl TokenTable {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register `token`, dropping `previous` in the same critical section.
    pub async fn issue(&self, previous: Option<&str>, token: String, slot: SlotRef) {
        let mut tokens = self.inner.lock().await;
        if let Some(previous) = previous {
            tokens.remove(previous);
        }
        tokens.insert(token, slot);
    }

    /// Consume a token.
    pub async fn take(&self, token: &str) -> Option<SlotRef> {
        self.inner.lock().await.remove(token)
    }

    pub async fn revoke(&self, token: &str) {
        self.inner.lock().await.remove(token);
    }

    pub async fn len(&self) -> usize {
        self.inner.lock().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.len().await == 0
    }
}

/// Bound UDP addresses and the slot each one speaks for.
#[derive(Debug, Default)]
pub struct EndpointTable {
    inner: Mutex<HashMap<SocketAddr, SlotRef>>,
}

impl EndpointTable {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn bind(&self, addr: SocketAddr, slot: SlotRef) -> Option<SlotRef> {
        self.inner.lock().await.insert(addr, slot)
    }

    pub async fn get(&self, addr: SocketAddr) -> Option<SlotRef> {
        self.inner.lock().await.get(&addr).copied()
    }

    /// Drop `addr` only while it still speaks for `slot`.
    pub async fn remove_if(&self, addr: SocketAddr, slot: SlotRef) -> bool {
        let mut endpoints = self.inner.lock().await;
        if endpoints.get(&addr) == Some(&slot) {
            endpoints.remove(&addr);
            true
        } else {
            false
        }
    }

    pub async fn len(&self) -> usize {
        self.inner.lock().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.len().await == 0
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_lobby_ids_start_at_one_and_increase() {
        let registry = LobbyRegistry::new();
        assert_eq!(registry.allocate_id(), LobbyId(1));
        assert_eq!(registry.allocate_id(), LobbyId(2));
    }

    #[tokio::test]
    async fn test_sweep_removes_only_idle_lobbies() {
        let registry = LobbyRegistry::new();
        let start = Instant::now();
        let grace = Duration::from_secs(60);

        let empty = Lobby::new(registry.allocate_id(), "empty".into(), None, start);
        let mut occupied = Lobby::new(registry.allocate_id(), "busy".into(), None, start);
        occupied
            .add_member(UserId(1))
            .unwrap_or_else(|e| panic!("{e}"));
        let empty_id = empty.id();
        let shared_empty = registry.insert(empty).await;
        registry.insert(occupied).await;

        assert!(registry
            .sweep_idle(start + Duration::from_secs(10), grace)
            .await
            .is_empty());

        let removed = registry
            .sweep_idle(start + Duration::from_secs(61), grace)
            .await;
        assert_eq!(removed, vec![empty_id]);
        assert_eq!(registry.len().await, 1);
        assert!(shared_empty.lock().await.is_closed());
    }

    #[tokio::test]
    async fn test_access_modes() {
        let access = AccessList::new(AccessMode::Public);
        assert_eq!(access.check(UserId(1)).await, Access::Allowed);

        access.deny(UserId(1), Some("cheating".into())).await;
        assert_eq!(
            access.check(UserId(1)).await,
            Access::Denied(Some("cheating".into()))
        );

        access.set_mode(AccessMode::Private).await;
        assert_eq!(access.check(UserId(2)).await, Access::NotListed);
        access.allow(UserId(2)).await;
        assert_eq!(access.check(UserId(2)).await, Access::Allowed);

        access.allow(UserId(1)).await;
        assert_eq!(access.check(UserId(1)).await, Access::Allowed);
    }

    #[tokio::test]
    async fn test_issuing_replaces_previous_token() {
        let tokens = TokenTable::new();
        let slot = SlotRef {
            lobby: LobbyId(1),
            slot: 2,
        };
        tokens.issue(None, "first".into(), slot).await;
        tokens.issue(Some("first"), "second".into(), slot).await;

        assert_eq!(tokens.len().await, 1);
        assert_eq!(tokens.take("first").await, None);
        assert_eq!(tokens.take("second").await, Some(slot));
        assert_eq!(tokens.take("second").await, None);
    }

    #[tokio::test]
    async fn test_endpoint_conditional_remove() {
        let endpoints = EndpointTable::new();
        let addr: SocketAddr = "10.1.1.1:700".parse().unwrap_or_else(|e| panic!("{e}"));
        let old = SlotRef {
            lobby: LobbyId(1),
            slot: 0,
        };
        let new = SlotRef {
            lobby: LobbyId(2),
            slot: 1,
        };
        endpoints.bind(addr, old).await;
        endpoints.bind(addr, new).await;

        assert!(!endpoints.remove_if(addr, old).await);
        assert_eq!(endpoints.get(addr).await, Some(new));
        assert!(endpoints.remove_if(addr, new).await);
        assert!(endpoints.is_empty().await);
    }
}
