//! Shared helpers for integration tests.

#![allow(dead_code, clippy::expect_used, clippy::unwrap_used)]

use std::time::Duration;

use lobby_relay::client::RelayClient;
use lobby_relay::config::{RelayConfig, PROTOCOL_VERSION};
use lobby_relay::protocol::types::{Language, UserId};
use lobby_relay::server::{RelayServer, ServerHandle};

pub const ADMIN_PASSWORD: &str = "letmein";

pub const STEP: Duration = Duration::from_secs(5);

pub fn test_config() -> RelayConfig {
    RelayConfig::default_with_overrides(|c| {
        c.server.tcp_address = "127.0.0.1:0".into();
        c.server.udp_address = "127.0.0.1:0".into();
        c.server.admin_password = ADMIN_PASSWORD.into();
        c.server.block_penalty = Duration::from_millis(20);
        c.server.shutdown_timeout = Duration::from_secs(2);
        c.lobby.default_names = Some(vec!["Alpha".into(), "Beta".into()]);
        c.lobby.quick_chat_messages = Some(vec!["gg".into(), "wait".into()]);
    })
}

pub async fn start(config: RelayConfig) -> ServerHandle {
    RelayServer::bind(config).await.expect("bind relay").start()
}

pub async fn connect(handle: &ServerHandle) -> RelayClient {
    RelayClient::connect(handle.tcp_addr())
        .await
        .expect("connect")
}

pub async fn login(handle: &ServerHandle, id: u64, name: &str) -> RelayClient {
    let mut client = connect(handle).await;
    tokio::time::timeout(
        STEP,
        client.login(UserId(id), name, PROTOCOL_VERSION, Language::English),
    )
    .await
    .expect("login timed out")
    .expect("login");
    client
}

/// Wait until the server stops writing to `client`.
pub async fn assert_closed(client: &mut RelayClient) {
    let closed = tokio::time::timeout(STEP, async {
        loop {
            if client.recv().await.is_err() {
                return;
            }
        }
    })
    .await;
    assert!(closed.is_ok(), "connection stayed open");
}
