//! # Relay Client
//!
//! Async client for the control channel, used by tools and tests.
//!
//! Responses are read in order; [`RelayClient::expect`] skips unrelated
//! pushes (welcome notices, member updates) until the wanted type arrives.

use std::time::Duration;

use futures::{SinkExt, StreamExt};
use serde::de::DeserializeOwned;
use serde::Serialize;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::{TcpStream, ToSocketAddrs};
use tokio_util::codec::Framed;
use tracing::{debug, instrument};

use crate::core::codec::{take_buffered, FrameCodec};
use crate::core::frame::{Frame, Header};
use crate::error::{RelayError, Result};
use crate::protocol::message::*;
use crate::protocol::types::{Language, LobbyId, UserId};
use crate::service::relay::RELAY_SUCCESS;

pub struct RelayClient {
    framed: Framed<TcpStream, FrameCodec>,
    next_hold: i32,
}

impl RelayClient {
    #[instrument]
    pub async fn connect<A: ToSocketAddrs + std::fmt::Debug>(addr: A) -> Result<Self> {
        let stream = TcpStream::connect(addr).await?;
        stream.set_nodelay(true)?;
        debug!("Connected to relay");
        Ok(Self {
            framed: Framed::new(stream, FrameCodec),
            next_hold: 1,
        })
    }

    /// Send a request, returning the hold value it carries.
    pub async fn send<T: Serialize>(&mut self, kind: RequestType, body: &T) -> Result<i32> {
        let hold = self.next_hold;
        self.next_hold = self.next_hold.wrapping_add(1);
        self.send_with_hold(kind, hold, body).await?;
        Ok(hold)
    }

    pub async fn send_with_hold<T: Serialize>(&mut self, kind: RequestType, hold: i32, body: &T) -> Result<()> {
        let frame = Frame::new(kind.as_u16(), hold, body)?;
        self.send_frame(frame).await
    }

    /// Send a prebuilt frame, whatever its type tag.
    pub async fn send_frame(&mut self, frame: Frame) -> Result<()> {
        self.framed.send(frame).await
    }

    /// Next frame, whatever its type.
    pub async fn recv(&mut self) -> Result<Frame> {
        match self.framed.next().await {
            Some(frame) => frame,
            None => Err(RelayError::ConnectionClosed),
        }
    }

    pub async fn recv_timeout(&mut self, timeout: Duration) -> Result<Frame> {
        tokio::time::timeout(timeout, self.recv())
            .await
            .map_err(|_| RelayError::Custom(format!("No frame within {timeout:?}")))?
    }

    /// Skip frames until one of type `kind` arrives and decode its body.
    pub async fn expect<T: DeserializeOwned>(&mut self, kind: ResponseType) -> Result<(Header, T)> {
        loop {
            let frame = self.recv().await?;
            if frame.header.message_type == kind.as_u16() {
                return Ok((frame.header, frame.decode_body()?));
            }
            debug!(message_type = frame.header.message_type, "Skipping frame");
        }
    }

    /// Log in and wait for the welcome notice.
    pub async fn login(&mut self, user_id: UserId, name: &str, protocol_version: u32, language: Language) -> Result<PublicMessage> {
        let request = LoginRequest {
            user_id,
            name: name.to_owned(),
            protocol_version,
            language,
            client_crc: 0,
        };
        self.send(RequestType::Login, &request).await?;
        let (_, notice) = self.expect(ResponseType::ServerPublicMessage).await?;
        Ok(notice)
    }

    pub async fn server_time(&mut self) -> Result<u32> {
        self.send(RequestType::Time, &Empty {}).await?;
        let (_, body): (_, TimeResponse) = self.expect(ResponseType::Time).await?;
        Ok(body.timestamp)
    }

    pub async fn list_lobbies(&mut self) -> Result<Vec<LobbyInfo>> {
        self.send(RequestType::LobbyList, &Empty {}).await?;
        let (_, body): (_, LobbyListResponse) = self.expect(ResponseType::LobbyList).await?;
        Ok(body.lobbies)
    }

    pub async fn create_lobby(&mut self, name: &str, password: Option<&str>) -> Result<LobbyCreatedResponse> {
        let request = LobbyCreateRequest {
            name: name.to_owned(),
            password: password.map(str::to_owned),
        };
        self.send(RequestType::LobbyCreate, &request).await?;
        let (_, body) = self.expect(ResponseType::LobbyCreated).await?;
        Ok(body)
    }

    pub async fn join_lobby(&mut self, lobby_id: LobbyId, password: Option<&str>) -> Result<LobbyJoinResponse> {
        let request = LobbyJoinRequest {
            lobby_id,
            password: password.map(str::to_owned),
        };
        self.send(RequestType::LobbyJoin, &request).await?;
        let (_, body) = self.expect(ResponseType::LobbyJoin).await?;
        Ok(body)
    }

    pub async fn leave_lobby(&mut self, lobby_id: LobbyId) -> Result<()> {
        self.send(RequestType::LobbyLeave, &LobbyLeaveRequest { lobby_id })
            .await
            .map(|_| ())
    }

    pub async fn set_lobby_data(&mut self, lobby_id: LobbyId, key: &str, value: &str) -> Result<()> {
        let request = SetDataRequest {
            lobby_id,
            key: key.to_owned(),
            value: value.to_owned(),
        };
        self.send(RequestType::SetLobbyData, &request).await.map(|_| ())
    }

    pub async fn set_member_data(&mut self, lobby_id: LobbyId, key: &str, value: &str) -> Result<()> {
        let request = SetDataRequest {
            lobby_id,
            key: key.to_owned(),
            value: value.to_owned(),
        };
        self.send(RequestType::SetLobbyMemberData, &request)
            .await
            .map(|_| ())
    }

    pub async fn request_udp_token(&mut self) -> Result<String> {
        self.send(RequestType::GetServerUdpToken, &Empty {}).await?;
        let (_, body): (_, UdpTokenResponse) = self.expect(ResponseType::ServerUdpToken).await?;
        Ok(body.token)
    }

    pub async fn chat(&mut self, message: &str) -> Result<()> {
        let request = ChatRequest {
            message: message.to_owned(),
        };
        self.send(RequestType::LogConsoleChat, &request).await.map(|_| ())
    }

    /// Announce and stream `payload` to `target`.
    pub async fn send_peer_data(&mut self, target: UserId, channel: i32, payload: &[u8]) -> Result<()> {
        let request = SendPeerDataRequest {
            target,
            size: payload.len() as u32,
            channel,
        };
        self.send(RequestType::SendPeerData, &request).await?;
        self.send_raw(payload).await
    }

    /// Write bytes outside any frame, such as part of an announced payload.
    pub async fn send_raw(&mut self, bytes: &[u8]) -> Result<()> {
        let stream = self.framed.get_mut();
        stream.write_all(bytes).await?;
        stream.flush().await?;
        Ok(())
    }

    /// Read the payload announced by `notice` and its trailing status byte.
    ///
    /// Returns the bytes and whether the relay reported success.
    pub async fn read_peer_data(&mut self, notice: &PeerDataNotice) -> Result<(Vec<u8>, bool)> {
        let mut payload = vec![0u8; notice.size as usize + 1];
        self.read_exact_raw(&mut payload).await?;
        let status = payload.pop().unwrap_or_default();
        Ok((payload, status == RELAY_SUCCESS))
    }

    async fn read_exact_raw(&mut self, dst: &mut [u8]) -> Result<()> {
        let buffered = take_buffered(self.framed.read_buffer_mut(), dst);
        if buffered < dst.len() {
            self.framed.get_mut().read_exact(&mut dst[buffered..]).await?;
        }
        Ok(())
    }

    /// Switch this connection to the admin console and send the password.
    pub async fn admin_login(&mut self, password: &str) -> Result<String> {
        self.send(RequestType::AdminLogin, &Empty {}).await?;
        self.admin_command(password).await
    }

    /// Send one console line and read its NUL-terminated reply.
    pub async fn admin_command(&mut self, line: &str) -> Result<String> {
        let mut bytes = line.as_bytes().to_vec();
        bytes.push(0);
        let stream = self.framed.get_mut();
        stream.write_all(&bytes).await?;
        stream.flush().await?;
        self.read_admin_reply().await
    }

    async fn read_admin_reply(&mut self) -> Result<String> {
        loop {
            let buffer = self.framed.read_buffer_mut();
            if let Some(end) = buffer.iter().position(|&b| b == 0) {
                let line = buffer.split_to(end + 1);
                return Ok(String::from_utf8_lossy(&line[..end]).into_owned());
            }
            let mut chunk = [0u8; 1024];
            let n = self.framed.get_mut().read(&mut chunk).await?;
            if n == 0 {
                return Err(RelayError::ConnectionClosed);
            }
            self.framed.read_buffer_mut().extend_from_slice(&chunk[..n]);
        }
    }

    /// Close the connection.
    pub async fn close(mut self) -> Result<()> {
        self.framed.get_mut().shutdown().await?;
        Ok(())
    }
}
