//! # Message Catalogue
//!
//! Request and response types carried in the frame header, and the bincode
//! encoded body records that follow them.
//!
//! The numeric tags are part of the wire format and must never be reordered.

use serde::{Deserialize, Serialize};
use std::net::SocketAddr;

use crate::protocol::types::{Language, LobbyId, UserId, LOBBY_CAPACITY};

/// Tags of client-to-server messages.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(u16)]
pub enum RequestType {
    Login = 0,
    AdminLogin = 1,
    Time = 2,
    LobbyList = 3,
    LobbyCreate = 4,
    SetLobbyData = 5,
    SetLobbyMemberData = 6,
    LobbyJoin = 7,
    LobbyLeave = 8,
    SendPeerData = 9,
    GetServerUdpToken = 10,
    LogConsoleChat = 11,
}

impl RequestType {
    pub fn as_u16(self) -> u16 {
        self as u16
    }
}

impl TryFrom<u16> for RequestType {
    type Error = u16;

    fn try_from(value: u16) -> std::result::Result<Self, u16> {
        Ok(match value {
            0 => RequestType::Login,
            1 => RequestType::AdminLogin,
            2 => RequestType::Time,
            3 => RequestType::LobbyList,
            4 => RequestType::LobbyCreate,
            5 => RequestType::SetLobbyData,
            6 => RequestType::SetLobbyMemberData,
            7 => RequestType::LobbyJoin,
            8 => RequestType::LobbyLeave,
            9 => RequestType::SendPeerData,
            10 => RequestType::GetServerUdpToken,
            11 => RequestType::LogConsoleChat,
            other => return Err(other),
        })
    }
}

/// Tags of server-to-client messages.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(u16)]
pub enum ResponseType {
    Time = 0,
    ServerPublicMessage = 1,
    LobbyList = 2,
    LobbyCreated = 3,
    LobbyDataUpdate = 4,
    LobbyMemberDataUpdate = 5,
    LobbyJoin = 6,
    LobbyChatUpdate = 7,
    UpdateUserInfo = 8,
    HasNewPeerData = 9,
    ServerUdpToken = 10,
    UpdateUserUdpAddr = 11,
    LogConsoleChat = 12,
    UpdateCreateRoomNameLists = 13,
    UpdateQuickChatMessages = 14,
}

impl ResponseType {
    pub fn as_u16(self) -> u16 {
        self as u16
    }
}

impl TryFrom<u16> for ResponseType {
    type Error = u16;

    fn try_from(value: u16) -> std::result::Result<Self, u16> {
        Ok(match value {
            0 => ResponseType::Time,
            1 => ResponseType::ServerPublicMessage,
            2 => ResponseType::LobbyList,
            3 => ResponseType::LobbyCreated,
            4 => ResponseType::LobbyDataUpdate,
            5 => ResponseType::LobbyMemberDataUpdate,
            6 => ResponseType::LobbyJoin,
            7 => ResponseType::LobbyChatUpdate,
            8 => ResponseType::UpdateUserInfo,
            9 => ResponseType::HasNewPeerData,
            10 => ResponseType::ServerUdpToken,
            11 => ResponseType::UpdateUserUdpAddr,
            12 => ResponseType::LogConsoleChat,
            13 => ResponseType::UpdateCreateRoomNameLists,
            14 => ResponseType::UpdateQuickChatMessages,
            other => return Err(other),
        })
    }
}

// ---------------------------------------------------------------------------
// Requests
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LoginRequest {
    pub user_id: UserId,
    pub name: String,
    pub protocol_version: u32,
    pub language: Language,
    /// Checksum of the client build, logged only.
    pub client_crc: u32,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Empty {}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LobbyCreateRequest {
    pub name: String,
    pub password: Option<String>,
}

/// Body of both `SetLobbyData` and `SetLobbyMemberData`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SetDataRequest {
    pub lobby_id: LobbyId,
    pub key: String,
    pub value: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LobbyJoinRequest {
    pub lobby_id: LobbyId,
    pub password: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LobbyLeaveRequest {
    pub lobby_id: LobbyId,
}

/// Announces `size` raw bytes that follow this frame on the same stream.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SendPeerDataRequest {
    pub target: UserId,
    pub size: u32,
    pub channel: i32,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChatRequest {
    pub message: String,
}

// ---------------------------------------------------------------------------
// Responses
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TimeResponse {
    pub timestamp: u32,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum PublicMessageKind {
    DisplayAndContinue,
    DisplayAndExit,
    DisplayAtLogConsole,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PublicMessage {
    pub kind: PublicMessageKind,
    pub caption: Option<String>,
    pub text: Option<String>,
}

impl PublicMessage {
    pub fn new(kind: PublicMessageKind, caption: impl Into<String>, text: impl Into<String>) -> Self {
        Self {
            kind,
            caption: Some(caption.into()),
            text: Some(text.into()),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DataItem {
    pub key: String,
    pub value: String,
}

/// Per-slot details included in full lobby info.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct MemberInfo {
    pub udp_addr: Option<SocketAddr>,
    pub data: Vec<DataItem>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LobbyInfo {
    pub lobby_id: LobbyId,
    pub owner: UserId,
    pub members: [UserId; LOBBY_CAPACITY],
    pub data: Vec<DataItem>,
    pub name: String,
    pub has_password: bool,
    /// Only ever filled in for the creator.
    pub password: Option<String>,
    /// Present in full info (join responses, membership events).
    pub member_data: Option<Vec<MemberInfo>>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LobbyListResponse {
    pub lobbies: Vec<LobbyInfo>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LobbyCreatedResponse {
    pub lobby_id: LobbyId,
    pub info: LobbyInfo,
}

/// Body of both `LobbyDataUpdate` and `LobbyMemberDataUpdate`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DataUpdate {
    pub lobby_id: LobbyId,
    pub member: UserId,
    pub only_lobby: bool,
    pub items: Vec<DataItem>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum JoinResult {
    Success,
    NotAllowed,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LobbyJoinResponse {
    pub lobby_id: LobbyId,
    pub locked: bool,
    pub result: JoinResult,
    pub chat_permissions: u32,
    pub info: Option<LobbyInfo>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum MemberStateChange {
    Entered,
    Left,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LobbyChatUpdate {
    pub lobby_id: LobbyId,
    pub user_changed: UserId,
    pub making_change: UserId,
    pub change: MemberStateChange,
    pub info: Option<LobbyInfo>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UserInfo {
    pub user_id: UserId,
    pub name: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PeerDataNotice {
    pub source: UserId,
    pub size: u32,
    pub channel: i32,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UdpTokenResponse {
    /// Empty when no token could be issued.
    pub token: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UserUdpAddr {
    pub slot: u32,
    pub addr: SocketAddr,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChatBroadcast {
    pub user_id: UserId,
    pub message: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StringList {
    pub items: Vec<String>,
}
