//! UDP token binding, forwarding, and keepalive.

#![allow(clippy::expect_used, clippy::unwrap_used)]

mod common;

use std::net::SocketAddr;
use std::time::Duration;

use common::*;
use lobby_relay::client::RelayClient;
use lobby_relay::protocol::message::*;
use lobby_relay::protocol::types::{LobbyId, UserId};
use lobby_relay::server::ServerHandle;
use tokio::net::UdpSocket;

async fn bind_udp(handle: &ServerHandle, client: &mut RelayClient) -> (UdpSocket, SocketAddr) {
    let socket = UdpSocket::bind("127.0.0.1:0").await.unwrap();
    let token = client.request_udp_token().await.unwrap();
    assert!(!token.is_empty());
    socket.send_to(token.as_bytes(), handle.udp_addr()).await.unwrap();

    let mut buf = [0u8; 64];
    let (len, _) = tokio::time::timeout(STEP, socket.recv_from(&mut buf))
        .await
        .expect("ping-pong timed out")
        .unwrap();
    assert_eq!(&buf[..len], &[0x30]);
    let addr = socket.local_addr().unwrap();
    (socket, addr)
}

async fn assert_silent(socket: &UdpSocket) {
    let mut buf = [0u8; 64];
    let extra = tokio::time::timeout(Duration::from_millis(200), socket.recv_from(&mut buf)).await;
    assert!(extra.is_err(), "unexpected datagram");
}

#[tokio::test]
async fn token_binds_slot_and_replies_once() {
    let handle = start(test_config()).await;
    let mut a = login(&handle, 1, "A").await;
    let mut b = login(&handle, 2, "B").await;
    let mut c = login(&handle, 3, "C").await;

    let lobby = a.create_lobby("Alpha", None).await.unwrap().lobby_id;
    b.join_lobby(lobby, None).await.unwrap();
    c.join_lobby(lobby, None).await.unwrap();

    let (socket, addr) = bind_udp(&handle, &mut c).await;
    assert_silent(&socket).await;

    for client in [&mut a, &mut b, &mut c] {
        let (_, update): (_, UserUdpAddr) = client
            .expect(ResponseType::UpdateUserUdpAddr)
            .await
            .unwrap();
        assert_eq!(update.slot, 2);
        assert_eq!(update.addr, addr);
    }
    assert!(handle.context().tokens.is_empty().await);

    drop((a, b, c));
    handle.stop().await.unwrap();
}

#[tokio::test]
async fn datagrams_forward_to_target_slot() {
    let handle = start(test_config()).await;
    let mut a = login(&handle, 1, "A").await;
    let mut b = login(&handle, 2, "B").await;

    let lobby = a.create_lobby("Alpha", None).await.unwrap().lobby_id;
    b.join_lobby(lobby, None).await.unwrap();

    let (socket_a, _) = bind_udp(&handle, &mut a).await;
    let (socket_b, _) = bind_udp(&handle, &mut b).await;

    // Slot 1 is B.
    let datagram = [0x01, b'h', b'i'];
    socket_a.send_to(&datagram, handle.udp_addr()).await.unwrap();
    let mut buf = [0u8; 64];
    let (len, from) = tokio::time::timeout(STEP, socket_b.recv_from(&mut buf))
        .await
        .expect("forward timed out")
        .unwrap();
    assert_eq!(&buf[..len], &datagram);
    assert_eq!(from, handle.udp_addr());

    // Ping from a bound address.
    socket_b.send_to(&[0x30], handle.udp_addr()).await.unwrap();
    let (len, _) = tokio::time::timeout(STEP, socket_b.recv_from(&mut buf))
        .await
        .expect("ping timed out")
        .unwrap();
    assert_eq!(&buf[..len], &[0x30]);

    drop((a, b));
    handle.stop().await.unwrap();
}

#[tokio::test]
async fn unbound_sender_is_ignored() {
    let handle = start(test_config()).await;
    let socket = UdpSocket::bind("127.0.0.1:0").await.unwrap();
    socket.send_to(&[0x30], handle.udp_addr()).await.unwrap();
    socket
        .send_to(b"1234567890", handle.udp_addr())
        .await
        .unwrap();
    assert_silent(&socket).await;
    handle.stop().await.unwrap();
}

#[tokio::test]
async fn token_requires_lobby_membership() {
    let handle = start(test_config()).await;
    let mut loner = login(&handle, 1, "Loner").await;
    assert_eq!(loner.request_udp_token().await.unwrap(), "");
    drop(loner);
    handle.stop().await.unwrap();
}

#[tokio::test]
async fn leaving_revokes_token() {
    let handle = start(test_config()).await;
    let mut a = login(&handle, 1, "A").await;
    let lobby = a.create_lobby("Alpha", None).await.unwrap().lobby_id;
    let token = a.request_udp_token().await.unwrap();
    let _ = a.request_udp_token().await.unwrap();
    assert_eq!(handle.context().tokens.len().await, 1);

    a.leave_lobby(lobby).await.unwrap();
    let _ = a.list_lobbies().await.unwrap();
    assert!(handle.context().tokens.is_empty().await);

    let socket = UdpSocket::bind("127.0.0.1:0").await.unwrap();
    socket.send_to(token.as_bytes(), handle.udp_addr()).await.unwrap();
    assert_silent(&socket).await;
    assert_eq!(handle.context().lobbies.get(LobbyId(1)).await.map(|_| ()), None);

    drop(a);
    handle.stop().await.unwrap();
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn busy_member_socket_does_not_stall_datagrams() {
    let handle = start(test_config()).await;
    let mut a = login(&handle, 1, "A").await;
    let mut b = login(&handle, 2, "B").await;
    let mut sender = login(&handle, 3, "Sender").await;

    let lobby = a.create_lobby("Alpha", None).await.unwrap().lobby_id;
    b.join_lobby(lobby, None).await.unwrap();
    let (socket_a, _) = bind_udp(&handle, &mut a).await;

    // A relay into A that stalls after the first block keeps A's connection busy.
    let request = SendPeerDataRequest {
        target: UserId(1),
        size: 2 * 1024 * 1024,
        channel: 0,
    };
    sender.send(RequestType::SendPeerData, &request).await.unwrap();
    sender.send_raw(&vec![0u8; 1024 * 1024 + 1]).await.unwrap();
    let (_, notice): (_, PeerDataNotice) = a.expect(ResponseType::HasNewPeerData).await.unwrap();
    assert_eq!(notice.source, UserId(3));

    // B still binds and gets its ping-pong while A cannot take the notice.
    let (_socket_b, _) = bind_udp(&handle, &mut b).await;

    socket_a.send_to(&[0x30], handle.udp_addr()).await.unwrap();
    let mut buf = [0u8; 16];
    let (len, _) = tokio::time::timeout(STEP, socket_a.recv_from(&mut buf))
        .await
        .expect("ping stalled behind a busy member")
        .unwrap();
    assert_eq!(&buf[..len], &[0x30]);

    drop((a, b, sender));
    handle.stop().await.unwrap();
}
