//! User-facing notices in the client's language.

use crate::protocol::message::{PublicMessage, PublicMessageKind};
use crate::protocol::types::Language;

pub fn welcome(lang: Language) -> PublicMessage {
    let (caption, text) = match lang {
        Language::English => ("Welcome", "Connected to the lobby server."),
        Language::Chinese => ("欢迎", "已连接到联机大厅服务器。"),
    };
    PublicMessage::new(PublicMessageKind::DisplayAndContinue, caption, text)
}

/// Shown before a blocked login is dropped.
pub fn access_denied(lang: Language, reason: &str) -> PublicMessage {
    let caption = match lang {
        Language::English => "Access denied",
        Language::Chinese => "禁止登录",
    };
    PublicMessage::new(PublicMessageKind::DisplayAndExit, caption, reason)
}

pub fn not_listed_reason(lang: Language) -> String {
    match lang {
        Language::English => "This server is private and you are not on its allow list.".into(),
        Language::Chinese => "该服务器为私有服务器，你不在允许列表中。".into(),
    }
}

pub fn default_deny_reason(lang: Language) -> String {
    match lang {
        Language::English => "You have been banned from this server.".into(),
        Language::Chinese => "你已被该服务器封禁。".into(),
    }
}

pub fn version_mismatch(lang: Language, client: u32, server: u32) -> PublicMessage {
    let (caption, text) = match lang {
        Language::English => (
            "Version mismatch",
            format!("Your client speaks protocol {client} but the server speaks protocol {server}. Please update."),
        ),
        Language::Chinese => (
            "版本不匹配",
            format!("客户端协议版本为 {client}，服务器协议版本为 {server}，请更新。"),
        ),
    };
    PublicMessage::new(PublicMessageKind::DisplayAndExit, caption, text)
}

pub fn wrong_password(lang: Language) -> PublicMessage {
    let (caption, text) = match lang {
        Language::English => ("Join failed", "Wrong lobby password."),
        Language::Chinese => ("加入失败", "房间密码错误。"),
    };
    PublicMessage::new(PublicMessageKind::DisplayAtLogConsole, caption, text)
}

pub fn kicked(lang: Language, reason: Option<&str>) -> PublicMessage {
    let (caption, fallback) = match lang {
        Language::English => ("Disconnected", "You have been removed by the administrator."),
        Language::Chinese => ("已断开", "你已被管理员移出服务器。"),
    };
    PublicMessage::new(PublicMessageKind::DisplayAndExit, caption, reason.unwrap_or(fallback))
}

pub fn admin_broadcast(lang: Language, text: &str) -> PublicMessage {
    let caption = match lang {
        Language::English => "Server",
        Language::Chinese => "服务器",
    };
    PublicMessage::new(PublicMessageKind::DisplayAtLogConsole, caption, text)
}
