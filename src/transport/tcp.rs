//! # Control Channel
//!
//! TCP accept loop and the per-connection task that drives a [`Session`].

use std::net::SocketAddr;
use std::sync::atomic::Ordering;
use std::sync::Arc;
use std::time::Duration;

use futures::StreamExt;
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite};
use tokio::net::TcpListener;
use tokio::sync::broadcast;
use tokio_util::codec::FramedRead;
use tracing::{debug, error, info, instrument, warn};

use crate::core::codec::FrameCodec;
use crate::error::{RelayError, Result};
use crate::service::admin::AdminConnection;
use crate::service::context::ServerContext;
use crate::service::peer::Peer;
use crate::service::session::{Control, Session};

/// Accept control connections until `shutdown` fires, then wait up to the
/// configured timeout for open connections to finish.
#[instrument(skip_all, fields(addr = ?listener.local_addr().ok()))]
pub async fn serve_control(
    listener: TcpListener,
    ctx: Arc<ServerContext>,
    mut shutdown: broadcast::Receiver<()>,
) -> Result<()> {
    info!("Control channel listening");
    loop {
        tokio::select! {
            _ = shutdown.recv() => {
                info!("Shutting down control channel. Waiting for connections to close...");
                drain_connections(&ctx).await;
                return Ok(());
            }

            accept_result = listener.accept() => {
                match accept_result {
                    Ok((stream, addr)) => {
                        if let Err(e) = stream.set_nodelay(true) {
                            debug!(peer = %addr, error = %e, "Failed to set TCP_NODELAY");
                        }
                        let ctx = ctx.clone();
                        let (reader, writer) = stream.into_split();
                        tokio::spawn(serve_connection(ctx, reader, writer, addr));
                    }
                    Err(e) => {
                        error!(error = %e, "Error accepting connection");
                    }
                }
            }
        }
    }
}

async fn drain_connections(ctx: &ServerContext) {
    let timeout = tokio::time::sleep(ctx.config.server.shutdown_timeout);
    tokio::pin!(timeout);

    loop {
        let connections = ctx.metrics.connections_active.load(Ordering::Relaxed);
        if connections == 0 {
            info!("All connections closed");
            return;
        }
        tokio::select! {
            _ = &mut timeout => {
                warn!(connections, "Shutdown timeout reached, forcing exit");
                return;
            }
            _ = tokio::time::sleep(Duration::from_millis(100)) => {
                debug!(connections, "Waiting for connections to close");
            }
        }
    }
}

/// Drive one control connection to completion.
///
/// Session cleanup runs on every exit path, including protocol errors and
/// admin handoff.
#[instrument(skip(ctx, reader, writer), fields(peer = %addr))]
pub async fn serve_connection<R, W>(ctx: Arc<ServerContext>, reader: R, writer: W, addr: SocketAddr)
where
    R: AsyncRead + Unpin + Send + 'static,
    W: AsyncWrite + Unpin + Send + 'static,
{
    ctx.metrics.connection_established();
    debug!("Connection opened");

    let peer = Arc::new(Peer::new(addr, Box::new(writer), ctx.metrics.clone()));
    let mut session = Session::new(ctx.clone(), peer.clone());
    let mut framed = FramedRead::new(reader, FrameCodec);

    match drive(&ctx, &mut session, &peer, &mut framed).await {
        Ok(Control::AdminHandoff) => {
            let buffered = framed.read_buffer_mut().split();
            let reader = std::io::Cursor::new(buffered).chain(framed.into_inner());
            let conn = AdminConnection {
                peer: peer.clone(),
                reader: Box::new(reader),
            };
            ctx.admin().serve(ctx.clone(), conn).await;
            debug!("{}", RelayError::AdminSessionClosed);
        }
        Ok(Control::Continue) => {}
        Err(e) if e.is_disconnect() => {
            debug!(user = %session.user_id(), "Connection closed by peer");
        }
        Err(e) => {
            if matches!(
                e,
                RelayError::InvalidHeader
                    | RelayError::OversizedFrame(_)
                    | RelayError::UnexpectedMessage(_)
                    | RelayError::Serialization(_)
            ) {
                ctx.metrics.protocol_error();
            }
            warn!(user = %session.user_id(), error = %e, "Closing connection");
        }
    }

    session.close().await;
    peer.shutdown().await;
    ctx.metrics.connection_closed();
    debug!("Connection closed");
}

async fn drive<R>(
    ctx: &ServerContext,
    session: &mut Session,
    peer: &Peer,
    framed: &mut FramedRead<R, FrameCodec>,
) -> Result<Control>
where
    R: AsyncRead + Unpin,
{
    loop {
        let next = tokio::select! {
            next = framed.next() => next,
            _ = peer.kicked() => {
                info!(user = %session.user_id(), "Connection kicked");
                return Err(RelayError::ConnectionClosed);
            }
        };
        let frame = match next {
            Some(Ok(frame)) => frame,
            Some(Err(e)) => return Err(e),
            None => return Err(RelayError::ConnectionClosed),
        };
        ctx.metrics.frame_received();

        match session.handle(frame, framed).await {
            Ok(Control::Continue) => {}
            Ok(Control::AdminHandoff) => return Ok(Control::AdminHandoff),
            Err(e) if !e.is_fatal() => {
                debug!(user = %session.user_id(), error = %e, "Request rejected");
            }
            Err(e) => return Err(e),
        }
    }
}
