// test-only module included via protocol/mod.rs
#![allow(clippy::unwrap_used, clippy::expect_used, clippy::panic)]

use std::net::SocketAddr;

use crate::core::frame::Frame;
use crate::protocol::message::*;
use crate::protocol::types::*;

#[test]
fn test_request_tags_are_stable() {
    assert_eq!(RequestType::Login.as_u16(), 0);
    assert_eq!(RequestType::AdminLogin.as_u16(), 1);
    assert_eq!(RequestType::SendPeerData.as_u16(), 9);
    assert_eq!(RequestType::LogConsoleChat.as_u16(), 11);

    for tag in 0..=11u16 {
        let kind = RequestType::try_from(tag).expect("known tag");
        assert_eq!(kind.as_u16(), tag);
    }
    assert_eq!(RequestType::try_from(12), Err(12));
}

#[test]
fn test_response_tags_are_stable() {
    for tag in 0..=14u16 {
        let kind = ResponseType::try_from(tag).expect("known tag");
        assert_eq!(kind.as_u16(), tag);
    }
    assert_eq!(ResponseType::try_from(999), Err(999));
}

#[test]
fn test_login_body_through_frame() {
    let login = LoginRequest {
        user_id: UserId(76561198000000001),
        name: "Isaac".into(),
        protocol_version: 1,
        language: Language::Chinese,
        client_crc: 0xDEAD_BEEF,
    };
    let frame = Frame::new(RequestType::Login.as_u16(), 5, &login).expect("frame");
    let decoded: LoginRequest = frame.decode_body().expect("body");
    assert_eq!(decoded, login);
}

#[test]
fn test_full_lobby_info_fits_in_a_frame() {
    let addr: SocketAddr = "203.0.113.7:40000".parse().expect("addr");
    let info = LobbyInfo {
        lobby_id: LobbyId(1),
        owner: UserId(1),
        members: [UserId(1), UserId(2), UserId(3), UserId(4)],
        data: vec![DataItem {
            key: "seed".into(),
            value: "ABCD 1234".into(),
        }],
        name: "Alpha".into(),
        has_password: true,
        password: None,
        member_data: Some(vec![
            MemberInfo {
                udp_addr: Some(addr),
                data: vec![DataItem {
                    key: "character".into(),
                    value: "Azazel".into(),
                }],
            };
            LOBBY_CAPACITY
        ]),
    };
    let response = LobbyJoinResponse {
        lobby_id: LobbyId(1),
        locked: true,
        result: JoinResult::Success,
        chat_permissions: 0,
        info: Some(info),
    };
    assert!(Frame::new(ResponseType::LobbyJoin.as_u16(), 0, &response).is_ok());
}

#[test]
fn test_malformed_body_is_an_error() {
    let frame = Frame::new(RequestType::LobbyJoin.as_u16(), 0, &Empty {}).expect("frame");
    assert!(frame.decode_body::<LobbyJoinRequest>().is_err());
}
