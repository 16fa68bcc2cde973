//! # Server Context
//!
//! Everything a connection task, the UDP loop, the sweeper, or the admin
//! console needs, bundled behind one `Arc`.

use std::sync::Arc;

use serde::Serialize;
use tokio::sync::RwLock;
use tracing::debug;

use crate::config::RelayConfig;
use crate::error::Result;
use crate::protocol::message::ResponseType;
use crate::protocol::types::{UserId, LOBBY_CAPACITY};
use crate::service::admin::AdminConsole;
use crate::service::filter::{PassThrough, RegexFilter, TextFilter};
use crate::service::registry::{AccessList, EndpointTable, LobbyRegistry, SessionRegistry, TokenTable};
use crate::utils::metrics::Metrics;

/// Lobby content the administrator can change at runtime.
#[derive(Debug)]
pub struct LobbySettings {
    default_names: RwLock<Option<Vec<String>>>,
    quick_chat: RwLock<Option<Vec<String>>>,
    filter: RwLock<Arc<dyn TextFilter>>,
}

impl LobbySettings {
    pub fn new(
        default_names: Option<Vec<String>>,
        quick_chat: Option<Vec<String>>,
        filter: Arc<dyn TextFilter>,
    ) -> Self {
        Self {
            default_names: RwLock::new(default_names),
            quick_chat: RwLock::new(quick_chat),
            filter: RwLock::new(filter),
        }
    }

    pub async fn default_names(&self) -> Option<Vec<String>> {
        self.default_names.read().await.clone()
    }

    pub async fn set_default_names(&self, names: Vec<String>) {
        *self.default_names.write().await = Some(names);
    }

    pub async fn quick_chat(&self) -> Option<Vec<String>> {
        self.quick_chat.read().await.clone()
    }

    pub async fn set_quick_chat(&self, messages: Vec<String>) {
        *self.quick_chat.write().await = Some(messages);
    }

    pub async fn filter(&self) -> Arc<dyn TextFilter> {
        self.filter.read().await.clone()
    }

    pub async fn set_filter(&self, filter: Arc<dyn TextFilter>) {
        *self.filter.write().await = filter;
    }

    pub async fn filter_text(&self, text: &str) -> String {
        self.filter().await.filter(text)
    }
}

pub struct ServerContext {
    pub config: RelayConfig,
    pub sessions: SessionRegistry,
    pub lobbies: LobbyRegistry,
    pub access: AccessList,
    pub tokens: TokenTable,
    pub endpoints: EndpointTable,
    pub settings: LobbySettings,
    pub metrics: Arc<Metrics>,
    admin: Arc<dyn AdminConsole>,
}

impl ServerContext {
    pub fn new(config: RelayConfig, admin: Arc<dyn AdminConsole>) -> Result<Self> {
        let filter: Arc<dyn TextFilter> = match &config.lobby.text_filter {
            Some(pattern) => Arc::new(RegexFilter::new(pattern)?),
            None => Arc::new(PassThrough),
        };
        let settings = LobbySettings::new(
            config.lobby.default_names.clone(),
            config.lobby.quick_chat_messages.clone(),
            filter,
        );

        Ok(Self {
            access: AccessList::new(config.server.access_mode),
            sessions: SessionRegistry::new(),
            lobbies: LobbyRegistry::new(),
            tokens: TokenTable::new(),
            endpoints: EndpointTable::new(),
            settings,
            metrics: Arc::new(Metrics::new()),
            admin,
            config,
        })
    }

    pub fn admin(&self) -> Arc<dyn AdminConsole> {
        self.admin.clone()
    }

    /// Send `body` to every logged-in member except `except`.
    ///
    /// Takes a snapshot of the slots, so callers release the lobby lock
    /// first. Delivery failures are logged and skipped.
    pub async fn broadcast<T: Serialize>(
        &self,
        members: &[UserId; LOBBY_CAPACITY],
        except: UserId,
        kind: ResponseType,
        body: &T,
    ) -> usize {
        let mut delivered = 0;
        for &user in members {
            if user.is_none() || user == except {
                continue;
            }
            let Some(peer) = self.sessions.get(user).await else {
                continue;
            };
            match peer.send(kind, 0, body).await {
                Ok(()) => delivered += 1,
                Err(e) => debug!(user = %user, kind = ?kind, error = %e, "Broadcast delivery failed"),
            }
        }
        delivered
    }
}

impl std::fmt::Debug for ServerContext {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ServerContext")
            .field("config", &self.config)
            .field("metrics", &self.metrics)
            .finish_non_exhaustive()
    }
}
