//! # Session State Machine
//!
//! Per-connection protocol state: login, lobby membership, and dispatch of
//! every control request.
//!
//! ## States
//! ```text
//! Connected --Login ok--> Authenticated --(disconnect)--> Closed
//!     |
//!     +--AdminLogin--> handed to the admin console
//! ```
//! Before login, anything other than `Login` or `AdminLogin` is a protocol
//! violation. After login, unknown message types are ignored.

use std::mem;
use std::sync::Arc;
use std::time::Instant;

use tokio::io::AsyncRead;
use tokio_util::codec::FramedRead;
use tracing::{debug, info, warn};

use crate::core::codec::FrameCodec;
use crate::core::frame::Frame;
use crate::error::{RelayError, Rejection, Result};
use crate::protocol::message::*;
use crate::protocol::types::{LobbyId, SlotRef, UserId, LOBBY_CAPACITY};
use crate::service::context::ServerContext;
use crate::service::lobby::Lobby;
use crate::service::locale;
use crate::service::peer::{Peer, Profile};
use crate::service::registry::Access;
use crate::service::relay::relay_payload;
use crate::utils::time::unix_timestamp;

/// What the connection loop should do after a message.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Control {
    Continue,
    /// Stop decoding frames and hand the stream to the admin console
    AdminHandoff,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionState {
    Connected,
    Authenticated,
    Closed,
}

/// Result of a successful join.
struct Joined {
    members: [UserId; LOBBY_CAPACITY],
    info: LobbyInfo,
    rejoined: bool,
}

pub struct Session {
    ctx: Arc<ServerContext>,
    peer: Arc<Peer>,
    state: SessionState,
    lobby: LobbyId,
    /// Most recent unconsumed UDP token issued to this session
    udp_token: Option<String>,
}

impl Session {
    pub fn new(ctx: Arc<ServerContext>, peer: Arc<Peer>) -> Self {
        Self {
            ctx,
            peer,
            state: SessionState::Connected,
            lobby: LobbyId::NONE,
            udp_token: None,
        }
    }

    pub fn user_id(&self) -> UserId {
        self.peer.user_id()
    }

    pub fn current_lobby(&self) -> LobbyId {
        self.lobby
    }

    fn set_lobby(&mut self, lobby: LobbyId) {
        self.lobby = lobby;
        self.peer.set_current_lobby(lobby);
    }

    /// Process one decoded frame.
    ///
    /// `source` is the connection's own reader, needed when a peer relay
    /// payload follows the frame.
    pub async fn handle<R>(&mut self, frame: Frame, source: &mut FramedRead<R, FrameCodec>) -> Result<Control>
    where
        R: AsyncRead + Unpin,
    {
        let raw = frame.header.message_type;
        let kind = RequestType::try_from(raw);

        if self.state != SessionState::Authenticated {
            match kind {
                Ok(RequestType::Login) => {}
                Ok(RequestType::AdminLogin) => return Ok(Control::AdminHandoff),
                _ => return Err(RelayError::UnexpectedMessage(raw)),
            }
        }

        let hold = frame.header.hold_value;
        match kind {
            Ok(RequestType::Login) => self.login(&frame).await?,
            Ok(RequestType::AdminLogin) => {
                debug!(user = %self.user_id(), "Ignoring admin login after login");
            }
            Ok(RequestType::Time) => {
                let body = TimeResponse {
                    timestamp: unix_timestamp(),
                };
                self.peer.send(ResponseType::Time, hold, &body).await?;
            }
            Ok(RequestType::LobbyList) => self.list_lobbies(hold).await?,
            Ok(RequestType::LobbyCreate) => self.create_lobby(&frame).await?,
            Ok(RequestType::SetLobbyData) => self.set_data(&frame, false).await?,
            Ok(RequestType::SetLobbyMemberData) => self.set_data(&frame, true).await?,
            Ok(RequestType::LobbyJoin) => self.join_lobby(&frame).await?,
            Ok(RequestType::LobbyLeave) => {
                let request: LobbyLeaveRequest = frame.decode_body()?;
                if request.lobby_id != self.lobby {
                    debug!(user = %self.user_id(), requested = %request.lobby_id, current = %self.lobby, "Leave names another lobby");
                }
                self.leave_lobby().await;
            }
            Ok(RequestType::SendPeerData) => self.relay(&frame, source).await?,
            Ok(RequestType::GetServerUdpToken) => self.issue_udp_token(hold).await?,
            Ok(RequestType::LogConsoleChat) => self.chat(&frame).await?,
            Err(raw) => {
                debug!(user = %self.user_id(), message_type = raw, "Ignoring unknown message type");
            }
        }
        Ok(Control::Continue)
    }

    async fn login(&mut self, frame: &Frame) -> Result<()> {
        let request: LoginRequest = frame.decode_body()?;
        if self.state == SessionState::Authenticated {
            return Err(RelayError::LoginTwice);
        }
        if request.user_id.is_none() {
            return Err(RelayError::NullIdentity);
        }
        let lang = request.language;

        let reason = match self.ctx.access.check(request.user_id).await {
            Access::Allowed => None,
            Access::NotListed => Some(locale::not_listed_reason(lang)),
            Access::Denied(reason) => Some(reason.unwrap_or_else(|| locale::default_deny_reason(lang))),
        };
        if let Some(reason) = reason {
            self.ctx.metrics.login_rejected();
            warn!(user = %request.user_id, name = %request.name, reason = %reason, "Blocked login");
            if let Err(e) = self
                .peer
                .send(ResponseType::ServerPublicMessage, 0, &locale::access_denied(lang, &reason))
                .await
            {
                debug!(error = %e, "Could not deliver block notice");
            }
            tokio::time::sleep(self.ctx.config.server.effective_block_penalty()).await;
            return Err(RelayError::AccessDenied {
                user: request.user_id,
                reason,
            });
        }

        let server_version = self.ctx.config.server.protocol_version;
        if request.protocol_version != server_version {
            self.ctx.metrics.login_rejected();
            let notice = locale::version_mismatch(lang, request.protocol_version, server_version);
            if let Err(e) = self.peer.send(ResponseType::ServerPublicMessage, 0, &notice).await {
                debug!(error = %e, "Could not deliver version notice");
            }
            return Err(RelayError::VersionMismatch {
                client: request.protocol_version,
                server: server_version,
            });
        }

        let profile = Profile {
            user_id: request.user_id,
            name: request.name,
            language: lang,
        };
        if !self.peer.bind_profile(profile) {
            return Err(RelayError::LoginTwice);
        }
        self.state = SessionState::Authenticated;
        if self.ctx.sessions.insert(self.peer.clone()).await.is_some() {
            info!(user = %request.user_id, "Replaced an older session with the same identity");
        }
        self.ctx.metrics.login_accepted();
        info!(
            user = %request.user_id,
            name = %self.peer.name(),
            addr = %self.peer.addr(),
            crc = %format!("{:08x}", request.client_crc),
            "User logged in"
        );

        self.peer
            .send(ResponseType::ServerPublicMessage, 0, &locale::welcome(lang))
            .await?;
        if let Some(items) = self.ctx.settings.default_names().await {
            self.peer
                .send(ResponseType::UpdateCreateRoomNameLists, 0, &StringList { items })
                .await?;
        }
        if let Some(items) = self.ctx.settings.quick_chat().await {
            self.peer
                .send(ResponseType::UpdateQuickChatMessages, 0, &StringList { items })
                .await?;
        }
        Ok(())
    }

    async fn list_lobbies(&self, hold: i32) -> Result<()> {
        let mut lobbies = Vec::new();
        for shared in self.ctx.lobbies.snapshot().await {
            let lobby = shared.lock().await;
            if !lobby.is_closed() {
                lobbies.push(lobby.info());
            }
        }

        // Keep the listing inside one frame; the oldest lobbies come first.
        let available = lobbies.len();
        let frame = loop {
            match Frame::new(
                ResponseType::LobbyList.as_u16(),
                hold,
                &LobbyListResponse {
                    lobbies: lobbies.clone(),
                },
            ) {
                Err(RelayError::OversizedFrame(_)) if !lobbies.is_empty() => {
                    lobbies.pop();
                }
                other => break other?,
            }
        };
        if lobbies.len() < available {
            warn!(listed = lobbies.len(), available, "Lobby list capped at frame size");
        }
        self.peer.send_frame(&frame).await
    }

    async fn create_lobby(&mut self, frame: &Frame) -> Result<()> {
        let request: LobbyCreateRequest = frame.decode_body()?;
        if !self.lobby.is_none() {
            self.leave_lobby().await;
        }

        let user = self.user_id();
        let name = self.ctx.settings.filter_text(&request.name).await;
        let id = self.ctx.lobbies.allocate_id();
        let mut lobby = Lobby::new(id, name, request.password, Instant::now());
        lobby.add_member(user)?;
        lobby.set_owner(user);
        let mut info = lobby.info();
        info.password = lobby.password().map(str::to_owned);
        let members = lobby.members();

        self.ctx.lobbies.insert(lobby).await;
        self.set_lobby(id);
        self.ctx.metrics.lobby_created();
        info!(user = %user, lobby = %id, name = %info.name, locked = info.has_password, "Lobby created");

        self.peer
            .send(
                ResponseType::LobbyCreated,
                frame.header.hold_value,
                &LobbyCreatedResponse { lobby_id: id, info },
            )
            .await?;
        let update = DataUpdate {
            lobby_id: id,
            member: user,
            only_lobby: true,
            items: Vec::new(),
        };
        self.ctx
            .broadcast(&members, UserId::NONE, ResponseType::LobbyDataUpdate, &update)
            .await;
        Ok(())
    }

    async fn set_data(&self, frame: &Frame, member_scope: bool) -> Result<()> {
        let request: SetDataRequest = frame.decode_body()?;
        let user = self.user_id();
        let shared = self
            .ctx
            .lobbies
            .get(request.lobby_id)
            .await
            .ok_or(Rejection::LobbyNotFound(request.lobby_id))?;

        let members = {
            let mut lobby = shared.lock().await;
            if lobby.is_closed() {
                return Err(Rejection::LobbyNotFound(request.lobby_id).into());
            }
            let slot = lobby
                .slot_of(user)
                .ok_or(Rejection::NotAMember(request.lobby_id))?;
            if member_scope {
                lobby.set_member_data(slot, request.key.clone(), request.value.clone());
            } else {
                lobby.set_data(request.key.clone(), request.value.clone());
            }
            lobby.members()
        };

        let update = DataUpdate {
            lobby_id: request.lobby_id,
            member: user,
            only_lobby: !member_scope,
            items: vec![DataItem {
                key: request.key,
                value: request.value,
            }],
        };
        if member_scope {
            self.ctx
                .broadcast(&members, user, ResponseType::LobbyMemberDataUpdate, &update)
                .await;
        } else {
            self.ctx
                .broadcast(&members, UserId::NONE, ResponseType::LobbyDataUpdate, &update)
                .await;
        }
        Ok(())
    }

    async fn join_lobby(&mut self, frame: &Frame) -> Result<()> {
        let request: LobbyJoinRequest = frame.decode_body()?;
        let hold = frame.header.hold_value;
        let id = request.lobby_id;
        let user = self.user_id();

        let joined = self.try_join(id, request.password.as_deref()).await;
        let Joined {
            members,
            info,
            rejoined,
        } = match joined {
            Ok(joined) => joined,
            Err(rejection) => {
                if rejection == Rejection::WrongPassword {
                    let notice = locale::wrong_password(self.peer.language());
                    self.peer
                        .send(ResponseType::ServerPublicMessage, 0, &notice)
                        .await?;
                }
                let response = LobbyJoinResponse {
                    lobby_id: id,
                    locked: rejection == Rejection::WrongPassword,
                    result: JoinResult::NotAllowed,
                    chat_permissions: 0,
                    info: None,
                };
                self.peer.send(ResponseType::LobbyJoin, hold, &response).await?;
                return Err(rejection.into());
            }
        };

        let response = LobbyJoinResponse {
            lobby_id: id,
            locked: info.has_password,
            result: JoinResult::Success,
            chat_permissions: 0,
            info: Some(info.clone()),
        };
        if rejoined {
            debug!(user = %user, lobby = %id, "Already a member");
            return self.peer.send(ResponseType::LobbyJoin, hold, &response).await;
        }

        self.set_lobby(id);
        info!(user = %user, lobby = %id, "Joined lobby");
        self.publish_member_info(&members).await;
        self.peer.send(ResponseType::LobbyJoin, hold, &response).await?;

        let update = LobbyChatUpdate {
            lobby_id: id,
            user_changed: user,
            making_change: UserId::NONE,
            change: MemberStateChange::Entered,
            info: Some(info),
        };
        self.ctx
            .broadcast(&members, user, ResponseType::LobbyChatUpdate, &update)
            .await;
        Ok(())
    }

    /// Add this session to `id`, returning the slots and full info.
    /// Joining the lobby the session is already in changes nothing.
    async fn try_join(
        &self,
        id: LobbyId,
        password: Option<&str>,
    ) -> std::result::Result<Joined, Rejection> {
        if !self.lobby.is_none() && self.lobby != id {
            return Err(Rejection::AlreadyInLobby(self.lobby));
        }
        let shared = self
            .ctx
            .lobbies
            .get(id)
            .await
            .ok_or(Rejection::LobbyNotFound(id))?;

        let mut lobby = shared.lock().await;
        if lobby.is_closed() {
            return Err(Rejection::LobbyNotFound(id));
        }
        let rejoining = self.lobby == id && lobby.contains(self.user_id());
        if !rejoining && !lobby.password_matches(password) {
            return Err(Rejection::WrongPassword);
        }
        lobby.add_member(self.user_id())?;
        Ok(Joined {
            members: lobby.members(),
            info: lobby.full_info(self.ctx.config.lobby.share_udp_endpoints),
            rejoined: rejoining,
        })
    }

    /// Tell every member the name of every member.
    async fn publish_member_info(&self, members: &[UserId; LOBBY_CAPACITY]) {
        let mut peers = Vec::new();
        for &user in members.iter().filter(|u| !u.is_none()) {
            if let Some(peer) = self.ctx.sessions.get(user).await {
                peers.push(peer);
            }
        }
        let infos: Vec<UserInfo> = peers
            .iter()
            .map(|p| UserInfo {
                user_id: p.user_id(),
                name: p.name().to_owned(),
            })
            .collect();

        for recipient in &peers {
            for info in &infos {
                if let Err(e) = recipient.send(ResponseType::UpdateUserInfo, 0, info).await {
                    debug!(user = %recipient.user_id(), error = %e, "User info delivery failed");
                    break;
                }
            }
        }
    }

    /// Leave the current lobby, if any. Deletes the lobby when it empties.
    pub async fn leave_lobby(&mut self) {
        let id = mem::replace(&mut self.lobby, LobbyId::NONE);
        self.peer.set_current_lobby(LobbyId::NONE);
        if id.is_none() {
            return;
        }
        self.revoke_udp_token().await;

        let user = self.user_id();
        let Some(shared) = self.ctx.lobbies.get(id).await else {
            return;
        };

        let (members, emptied) = {
            let mut lobby = shared.lock().await;
            let removed = lobby.remove_member(user, Instant::now());
            if let Some(endpoint) = removed.and_then(|r| r.udp_endpoint.map(|a| (r.slot, a))) {
                let (slot, addr) = endpoint;
                self.ctx
                    .endpoints
                    .remove_if(addr, SlotRef { lobby: id, slot })
                    .await;
            }
            let emptied = lobby.is_empty();
            if emptied {
                lobby.close();
                self.ctx.lobbies.remove(id).await;
            }
            (lobby.members(), emptied)
        };

        if emptied {
            info!(user = %user, lobby = %id, "Last member left, lobby removed");
            return;
        }
        info!(user = %user, lobby = %id, "Left lobby");
        let update = LobbyChatUpdate {
            lobby_id: id,
            user_changed: user,
            making_change: user,
            change: MemberStateChange::Left,
            info: None,
        };
        self.ctx
            .broadcast(&members, user, ResponseType::LobbyChatUpdate, &update)
            .await;
    }

    async fn issue_udp_token(&mut self, hold: i32) -> Result<()> {
        let mut slot = None;
        if let Some(shared) = self.ctx.lobbies.get(self.lobby).await {
            slot = shared.lock().await.slot_of(self.user_id());
        }
        let Some(slot) = slot else {
            self.peer
                .send(ResponseType::ServerUdpToken, hold, &UdpTokenResponse { token: String::new() })
                .await?;
            return Err(Rejection::NotInLobby.into());
        };

        let token = format!("{}{}", self.user_id(), rand::random::<u64>());
        let slot = SlotRef {
            lobby: self.lobby,
            slot,
        };
        self.ctx
            .tokens
            .issue(self.udp_token.as_deref(), token.clone(), slot)
            .await;
        self.udp_token = Some(token.clone());
        debug!(user = %self.user_id(), lobby = %slot.lobby, slot = slot.slot, "Issued UDP token");

        self.peer
            .send(ResponseType::ServerUdpToken, hold, &UdpTokenResponse { token })
            .await
    }

    async fn revoke_udp_token(&mut self) {
        if let Some(token) = self.udp_token.take() {
            self.ctx.tokens.revoke(&token).await;
        }
    }

    async fn chat(&self, frame: &Frame) -> Result<()> {
        let request: ChatRequest = frame.decode_body()?;
        if self.lobby.is_none() {
            return Err(Rejection::NotInLobby.into());
        }
        let shared = self
            .ctx
            .lobbies
            .get(self.lobby)
            .await
            .ok_or(Rejection::LobbyNotFound(self.lobby))?;
        let members = shared.lock().await.members();

        let user = self.user_id();
        let message = self.ctx.settings.filter_text(&request.message).await;
        info!(user = %user, name = %self.peer.name(), lobby = %self.lobby, message = %message, "Chat");
        let body = ChatBroadcast {
            user_id: user,
            message,
        };
        self.ctx
            .broadcast(&members, UserId::NONE, ResponseType::LogConsoleChat, &body)
            .await;
        Ok(())
    }

    async fn relay<R>(&self, frame: &Frame, source: &mut FramedRead<R, FrameCodec>) -> Result<()>
    where
        R: AsyncRead + Unpin,
    {
        let request: SendPeerDataRequest = frame.decode_body()?;
        let destination = self.ctx.sessions.get(request.target).await;
        if destination.is_none() {
            debug!(source = %self.user_id(), target_user = %request.target, size = request.size, "Relay target not connected, draining");
        }

        let outcome = relay_payload(
            source,
            self.user_id(),
            destination.as_ref(),
            request.size,
            request.channel,
        )
        .await?;
        if request.size > 0 {
            self.ctx
                .metrics
                .relay_finished(outcome.forwarded, outcome.delivered);
        }
        debug!(
            source = %self.user_id(),
            target_user = %request.target,
            size = request.size,
            forwarded = outcome.forwarded,
            delivered = outcome.delivered,
            "Relay finished"
        );
        Ok(())
    }

    /// Release everything this session holds. Runs once, on every exit path.
    pub async fn close(&mut self) {
        if self.state == SessionState::Closed {
            return;
        }
        let was_authenticated = self.state == SessionState::Authenticated;
        self.state = SessionState::Closed;
        if !was_authenticated {
            return;
        }

        self.leave_lobby().await;
        self.revoke_udp_token().await;
        let user = self.user_id();
        if self.ctx.sessions.remove_if_same(user, &self.peer).await {
            info!(user = %user, "User logged out");
        }
    }
}
