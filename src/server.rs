//! # Relay Server
//!
//! Binds both listeners and runs the control channel, the UDP rendezvous,
//! and the idle-lobby sweeper until shutdown.
//!
//! ```no_run
//! use lobby_relay::config::RelayConfig;
//! use lobby_relay::server::RelayServer;
//!
//! # async fn demo() -> lobby_relay::error::Result<()> {
//! let config = RelayConfig::default_with_overrides(|c| {
//!     c.server.admin_password = "change-me".into();
//! });
//! let handle = RelayServer::bind(config).await?.start();
//! println!("control channel on {}", handle.tcp_addr());
//! handle.stop().await?;
//! # Ok(())
//! # }
//! ```

use std::net::SocketAddr;
use std::sync::Arc;

use tokio::net::{TcpListener, UdpSocket};
use tokio::sync::{broadcast, mpsc};
use tokio::task::JoinHandle;
use tracing::{info, instrument};

use crate::config::RelayConfig;
use crate::error::{RelayError, Result};
use crate::service::admin::{AdminConsole, TextAdminConsole};
use crate::service::context::ServerContext;
use crate::service::sweeper::run_sweeper;
use crate::transport::tcp::serve_control;
use crate::transport::udp::UdpRelay;

pub struct RelayServer {
    ctx: Arc<ServerContext>,
    listener: TcpListener,
    socket: Arc<UdpSocket>,
}

impl RelayServer {
    /// Validate `config` and bind both listeners, with the text admin console.
    pub async fn bind(config: RelayConfig) -> Result<Self> {
        Self::bind_with_admin(config, Arc::new(TextAdminConsole)).await
    }

    #[instrument(skip_all, fields(tcp = %config.server.tcp_address, udp = %config.server.udp_address))]
    pub async fn bind_with_admin(config: RelayConfig, admin: Arc<dyn AdminConsole>) -> Result<Self> {
        config.validate_strict()?;
        let listener = TcpListener::bind(&config.server.tcp_address).await?;
        let socket = UdpSocket::bind(&config.server.udp_address).await?;
        let ctx = Arc::new(ServerContext::new(config, admin)?);

        info!(
            tcp = ?listener.local_addr().ok(),
            udp = ?socket.local_addr().ok(),
            version = ctx.config.server.protocol_version,
            "Relay server bound"
        );
        Ok(Self {
            ctx,
            listener,
            socket: Arc::new(socket),
        })
    }

    pub fn context(&self) -> Arc<ServerContext> {
        self.ctx.clone()
    }

    pub fn tcp_addr(&self) -> Result<SocketAddr> {
        Ok(self.listener.local_addr()?)
    }

    pub fn udp_addr(&self) -> Result<SocketAddr> {
        Ok(self.socket.local_addr()?)
    }

    /// Serve until a message arrives on `shutdown_rx` (or all senders drop).
    pub async fn run(self, mut shutdown_rx: mpsc::Receiver<()>) -> Result<()> {
        let (stop_tx, _) = broadcast::channel::<()>(1);

        let udp = UdpRelay::new(self.socket.clone(), self.ctx.clone());
        let udp_task = tokio::spawn(udp.run(stop_tx.subscribe()));
        let sweeper_task = tokio::spawn(run_sweeper(self.ctx.clone(), stop_tx.subscribe()));
        let control = serve_control(self.listener, self.ctx.clone(), stop_tx.subscribe());
        tokio::pin!(control);

        let result = tokio::select! {
            result = &mut control => result,
            _ = shutdown_rx.recv() => {
                info!("Shutdown requested");
                let _ = stop_tx.send(());
                control.await
            }
        };
        let _ = stop_tx.send(());

        join(udp_task).await??;
        join(sweeper_task).await?;
        self.ctx.metrics.log_metrics();
        info!("Relay server stopped");
        result
    }

    /// Run on a background task and return a handle for stopping it.
    pub fn start(self) -> ServerHandle {
        let tcp_addr = self.listener.local_addr().ok();
        let udp_addr = self.socket.local_addr().ok();
        let ctx = self.ctx.clone();
        let (shutdown_tx, shutdown_rx) = mpsc::channel(1);
        let task = tokio::spawn(self.run(shutdown_rx));

        ServerHandle {
            tcp_addr: tcp_addr.unwrap_or_else(|| SocketAddr::from(([0, 0, 0, 0], 0))),
            udp_addr: udp_addr.unwrap_or_else(|| SocketAddr::from(([0, 0, 0, 0], 0))),
            ctx,
            shutdown_tx,
            task,
        }
    }
}

async fn join<T>(task: JoinHandle<T>) -> Result<T> {
    task.await
        .map_err(|e| RelayError::Custom(format!("Server task failed: {e}")))
}

/// A server running in the background.
pub struct ServerHandle {
    tcp_addr: SocketAddr,
    udp_addr: SocketAddr,
    ctx: Arc<ServerContext>,
    shutdown_tx: mpsc::Sender<()>,
    task: JoinHandle<Result<()>>,
}

impl ServerHandle {
    pub fn tcp_addr(&self) -> SocketAddr {
        self.tcp_addr
    }

    pub fn udp_addr(&self) -> SocketAddr {
        self.udp_addr
    }

    pub fn context(&self) -> Arc<ServerContext> {
        self.ctx.clone()
    }

    /// Signal shutdown and wait for the server to finish.
    pub async fn stop(self) -> Result<()> {
        let _ = self.shutdown_tx.send(()).await;
        join(self.task).await?
    }
}
