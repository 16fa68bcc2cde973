//! Periodic removal of lobbies that stayed empty past the grace period.

use std::sync::Arc;
use std::time::Instant;

use tokio::sync::broadcast;
use tracing::{debug, info};

use crate::service::context::ServerContext;

pub async fn run_sweeper(ctx: Arc<ServerContext>, mut shutdown: broadcast::Receiver<()>) {
    let period = ctx.config.server.sweep_interval;
    let grace = ctx.config.server.lobby_grace_period;
    let mut interval = tokio::time::interval(period);
    // The first tick completes immediately.
    interval.tick().await;

    loop {
        tokio::select! {
            _ = interval.tick() => {
                let removed = ctx.lobbies.sweep_idle(Instant::now(), grace).await;
                if removed.is_empty() {
                    debug!("Idle lobby sweep found nothing");
                } else {
                    ctx.metrics.lobbies_swept(removed.len() as u64);
                    info!(count = removed.len(), lobbies = ?removed, "Removed idle lobbies");
                }
                ctx.metrics.log_metrics();
            }
            _ = shutdown.recv() => {
                debug!("Sweeper stopping");
                break;
            }
        }
    }
}
