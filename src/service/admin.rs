//! # Admin Console
//!
//! A connection whose first message is `AdminLogin` leaves the frame protocol
//! and is handed to an [`AdminConsole`].
//!
//! The bundled [`TextAdminConsole`] speaks NUL-terminated text lines: the
//! first line must be the admin password, every later line is a command.
//! Replies are NUL-terminated as well.

use std::sync::Arc;
use std::time::{Duration, Instant};

use futures::future::BoxFuture;
use rand::Rng;
use tokio::io::{AsyncBufReadExt, AsyncRead, BufReader};
use tracing::{debug, info, warn};

use crate::config::AccessMode;
use crate::error::Rejection;
use crate::protocol::message::{ResponseType, StringList};
use crate::protocol::types::UserId;
use crate::service::context::ServerContext;
use crate::service::filter::RegexFilter;
use crate::service::locale;
use crate::service::peer::Peer;
use crate::utils::time::unix_timestamp;

/// Type-erased read half handed over by the connection loop.
pub type BoxedReader = Box<dyn AsyncRead + Send + Unpin>;

/// A connection taken over by the admin console.
pub struct AdminConnection {
    pub peer: Arc<Peer>,
    /// Bytes the frame decoder had buffered, followed by the socket
    pub reader: BoxedReader,
}

/// Handles connections that logged in as administrator.
pub trait AdminConsole: Send + Sync {
    fn serve(&self, ctx: Arc<ServerContext>, conn: AdminConnection) -> BoxFuture<'static, ()>;
}

/// Line-oriented text console.
#[derive(Debug, Default, Clone, Copy)]
pub struct TextAdminConsole;

impl AdminConsole for TextAdminConsole {
    fn serve(&self, ctx: Arc<ServerContext>, conn: AdminConnection) -> BoxFuture<'static, ()> {
        Box::pin(run_console(ctx, conn))
    }
}

/// Result of one console command.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Reply {
    Text(String),
    Exit,
}

const HELP: &str = "\
help                        show this text
info                        server summary and counters
time                        server time
log <text>                  write text to the server log
lsuser                      list logged-in users
lslobby                     list lobbies
broadcast <text>            message every user
setroomnames <a> <b> ...    suggested lobby names
setchatbtns <a> <b> ...     quick chat messages
setfilter <regex>           replace the chat and lobby name filter
del_old_lobby               remove idle lobbies now
public | private            switch access mode
allow <id> | deny <id> [reason]
kick <id> [reason]          disconnect a user
exit                        close this console";

async fn run_console(ctx: Arc<ServerContext>, conn: AdminConnection) {
    let AdminConnection { peer, reader } = conn;
    let mut reader = BufReader::new(reader);
    let mut authorized = false;

    loop {
        let mut raw = Vec::new();
        match reader.read_until(0, &mut raw).await {
            Ok(0) => break,
            Ok(_) => {}
            Err(e) => {
                debug!(peer = %peer.addr(), error = %e, "Admin console read failed");
                break;
            }
        }
        let line = decode_line(&raw);

        if !authorized {
            let delay = rand::rng().random_range(1000..2000);
            tokio::time::sleep(Duration::from_millis(delay)).await;
            if line != ctx.config.server.admin_password {
                warn!(peer = %peer.addr(), "Admin login with wrong password");
                break;
            }
            authorized = true;
            info!(peer = %peer.addr(), "Admin logged in");
            if !write_reply(&peer, "welcome, type help for commands").await {
                break;
            }
            continue;
        }

        match execute(&ctx, &line).await {
            Reply::Exit => break,
            Reply::Text(text) => {
                if !write_reply(&peer, &text).await {
                    break;
                }
            }
        }
    }
    info!(peer = %peer.addr(), "Admin console closed");
}

fn decode_line(raw: &[u8]) -> String {
    let end = raw.iter().position(|&b| b == 0).unwrap_or(raw.len());
    String::from_utf8_lossy(&raw[..end])
        .trim_end_matches(['\r', '\n'])
        .to_string()
}

async fn write_reply(peer: &Peer, text: &str) -> bool {
    let mut bytes = Vec::with_capacity(text.len() + 1);
    bytes.extend_from_slice(text.as_bytes());
    bytes.push(0);

    let mut permit = peer.permit().await;
    let written = async {
        permit.write_raw(&bytes).await?;
        permit.flush().await
    }
    .await;
    if let Err(e) = written {
        debug!(peer = %peer.addr(), error = %e, "Admin reply failed");
        return false;
    }
    true
}

/// Run one command line against the live server.
pub async fn execute(ctx: &ServerContext, line: &str) -> Reply {
    let line = line.trim();
    let (command, args) = line.split_once(' ').unwrap_or((line, ""));
    let args = args.trim();

    let text = match command {
        "help" => HELP.to_string(),
        "info" => info_text(ctx).await,
        "time" => format!("server time: {}", unix_timestamp()),
        "log" => {
            info!(target: "admin", "{args}");
            "logged".to_string()
        }
        "lsuser" => list_users(ctx).await,
        "lslobby" => list_lobbies(ctx).await,
        "broadcast" => broadcast(ctx, args).await,
        "setroomnames" => {
            let names = split_words(args);
            ctx.settings.set_default_names(names.clone()).await;
            push_list(ctx, ResponseType::UpdateCreateRoomNameLists, names).await
        }
        "setchatbtns" => {
            let messages = split_words(args);
            ctx.settings.set_quick_chat(messages.clone()).await;
            push_list(ctx, ResponseType::UpdateQuickChatMessages, messages).await
        }
        "setfilter" => match RegexFilter::new(args) {
            Ok(filter) => {
                ctx.settings.set_filter(Arc::new(filter)).await;
                format!("filter set to {args}")
            }
            Err(e) => format!("failed: {e}"),
        },
        "del_old_lobby" => {
            let removed = ctx
                .lobbies
                .sweep_idle(Instant::now(), ctx.config.server.lobby_grace_period)
                .await;
            ctx.metrics.lobbies_swept(removed.len() as u64);
            format!("{} lobbies removed", removed.len())
        }
        "public" => {
            ctx.access.set_mode(AccessMode::Public).await;
            "server is now public".to_string()
        }
        "private" => {
            ctx.access.set_mode(AccessMode::Private).await;
            "server is now private".to_string()
        }
        "allow" => match parse_user(args) {
            Some((user, _)) => {
                ctx.access.allow(user).await;
                format!("user {user} allowed")
            }
            None => "usage: allow <id>".to_string(),
        },
        "deny" => match parse_user(args) {
            Some((user, reason)) => {
                ctx.access.deny(user, reason).await;
                format!("user {user} denied")
            }
            None => "usage: deny <id> [reason]".to_string(),
        },
        "kick" => match parse_user(args) {
            Some((user, reason)) => kick(ctx, user, reason.as_deref()).await,
            None => "usage: kick <id> [reason]".to_string(),
        },
        "exit" => return Reply::Exit,
        "" => String::new(),
        other => format!("unknown command: {other}, type help for commands"),
    };
    Reply::Text(text)
}

fn split_words(args: &str) -> Vec<String> {
    args.split_whitespace().map(str::to_owned).collect()
}

/// `<id> [rest...]`
fn parse_user(args: &str) -> Option<(UserId, Option<String>)> {
    let (id, rest) = args.split_once(' ').unwrap_or((args, ""));
    let id: u64 = id.parse().ok()?;
    if id == 0 {
        return None;
    }
    let rest = rest.trim();
    Some((UserId(id), (!rest.is_empty()).then(|| rest.to_string())))
}

async fn info_text(ctx: &ServerContext) -> String {
    let snapshot = ctx.metrics.snapshot();
    let filter = ctx.settings.filter().await.describe();
    let names = ctx.settings.default_names().await.unwrap_or_default();
    let quick_chat = ctx.settings.quick_chat().await.unwrap_or_default();
    let mode = match ctx.access.mode().await {
        AccessMode::Public => "public",
        AccessMode::Private => "private",
    };

    format!(
        "protocol version: {}\naccess mode: {mode}\nusers: {}\nlobbies: {}\nudp tokens: {}\nudp endpoints: {}\n\
         lobby names: {}\nquick chat: {}\nfilter: {filter}\n\
         uptime: {}s\nconnections: {} total, {} active\nlogins: {} accepted, {} rejected\n\
         relays: {} completed, {} failed, {} bytes\ndatagrams forwarded: {}",
        ctx.config.server.protocol_version,
        ctx.sessions.len().await,
        ctx.lobbies.len().await,
        ctx.tokens.len().await,
        ctx.endpoints.len().await,
        names.join(" "),
        quick_chat.join(" "),
        snapshot.uptime_seconds,
        snapshot.connections_total,
        snapshot.connections_active,
        snapshot.logins_accepted,
        snapshot.logins_rejected,
        snapshot.relays_completed,
        snapshot.relays_failed,
        snapshot.relay_bytes,
        snapshot.datagrams_forwarded,
    )
}

async fn list_users(ctx: &ServerContext) -> String {
    let peers = ctx.sessions.snapshot().await;
    let mut out = format!("{} users", peers.len());
    for peer in peers {
        out.push_str(&format!(
            "\n{} {} {} lobby={}",
            peer.user_id(),
            peer.name(),
            peer.addr(),
            peer.current_lobby()
        ));
    }
    out
}

async fn list_lobbies(ctx: &ServerContext) -> String {
    let lobbies = ctx.lobbies.snapshot().await;
    let mut out = format!("{} lobbies", lobbies.len());
    for shared in lobbies {
        let lobby = shared.lock().await;
        let members: Vec<String> = lobby
            .members()
            .iter()
            .map(|m| m.to_string())
            .collect();
        out.push_str(&format!(
            "\n{} {} password={} owner={} members=[{}]",
            lobby.id(),
            lobby.name(),
            lobby.password().unwrap_or("-"),
            lobby.owner(),
            members.join(",")
        ));
    }
    out
}

async fn broadcast(ctx: &ServerContext, text: &str) -> String {
    let mut delivered = 0;
    for peer in ctx.sessions.snapshot().await {
        let notice = locale::admin_broadcast(peer.language(), text);
        if peer
            .send(ResponseType::ServerPublicMessage, 0, &notice)
            .await
            .is_ok()
        {
            delivered += 1;
        }
    }
    format!("{delivered} users have received the message")
}

async fn push_list(ctx: &ServerContext, kind: ResponseType, items: Vec<String>) -> String {
    let count = items.len();
    let body = StringList { items };
    for peer in ctx.sessions.snapshot().await {
        if let Err(e) = peer.send(kind, 0, &body).await {
            debug!(user = %peer.user_id(), error = %e, "List update failed");
        }
    }
    format!("{count} entries set")
}

async fn kick(ctx: &ServerContext, user: UserId, reason: Option<&str>) -> String {
    let Some(peer) = ctx.sessions.get(user).await else {
        return format!("failed: {}", Rejection::UnknownUser(user));
    };
    let notice = locale::kicked(peer.language(), reason);
    if let Err(e) = peer.send(ResponseType::ServerPublicMessage, 0, &notice).await {
        debug!(user = %user, error = %e, "Kick notice failed");
    }
    peer.kick();
    info!(user = %user, reason = reason.unwrap_or(""), "User kicked");
    format!("user {user} kicked")
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::RelayConfig;

    fn context() -> ServerContext {
        let config = RelayConfig::default_with_overrides(|c| {
            c.server.admin_password = "secret".into();
        });
        ServerContext::new(config, Arc::new(TextAdminConsole)).unwrap_or_else(|e| panic!("{e}"))
    }

    fn text(reply: Reply) -> String {
        match reply {
            Reply::Text(text) => text,
            Reply::Exit => panic!("unexpected exit"),
        }
    }

    #[test]
    fn test_decode_line_strips_terminators() {
        assert_eq!(decode_line(b"lsuser\0"), "lsuser");
        assert_eq!(decode_line(b"info\r\n\0"), "info");
    }

    #[test]
    fn test_parse_user_with_reason() {
        assert_eq!(
            parse_user("42 too many pings"),
            Some((UserId(42), Some("too many pings".into())))
        );
        assert_eq!(parse_user("42"), Some((UserId(42), None)));
        assert_eq!(parse_user("abc"), None);
        assert_eq!(parse_user("0"), None);
    }

    #[tokio::test]
    async fn test_kick_unknown_user_reports_failure() {
        let ctx = context();
        let reply = text(execute(&ctx, "kick 777 bye").await);
        assert!(reply.starts_with("failed"));
        assert!(reply.contains("777"));
    }

    #[tokio::test]
    async fn test_access_commands() {
        let ctx = context();
        text(execute(&ctx, "private").await);
        assert_eq!(ctx.access.mode().await, AccessMode::Private);
        text(execute(&ctx, "deny 5 griefing").await);
        assert_eq!(
            ctx.access.check(UserId(5)).await,
            crate::service::registry::Access::Denied(Some("griefing".into()))
        );
    }

    #[tokio::test]
    async fn test_settings_commands() {
        let ctx = context();
        text(execute(&ctx, "setroomnames Alpha Beta").await);
        assert_eq!(
            ctx.settings.default_names().await,
            Some(vec!["Alpha".to_string(), "Beta".to_string()])
        );

        let reply = text(execute(&ctx, "setfilter (").await);
        assert!(reply.starts_with("failed"));
        text(execute(&ctx, "setfilter darn").await);
        assert_eq!(ctx.settings.filter_text("darn it").await, "\u{F004}\u{F004}\u{F004}\u{F004} it");
    }

    #[tokio::test]
    async fn test_exit_and_unknown() {
        let ctx = context();
        assert_eq!(execute(&ctx, "exit").await, Reply::Exit);
        assert!(text(execute(&ctx, "killserver").await).starts_with("unknown command"));
    }
}
