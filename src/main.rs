//! Command-line entry point for the lobby relay.

use std::path::PathBuf;

use clap::Parser;
use tokio::sync::mpsc;
use tracing::{error, info};

use lobby_relay::config::{AccessMode, RelayConfig};
use lobby_relay::server::RelayServer;
use lobby_relay::utils::logging::init_logging;

/// Lobby rendezvous and relay server
#[derive(Parser, Debug)]
#[command(name = "lobby-relay", version, about)]
struct Cli {
    /// TOML configuration file; environment variables are used when absent
    #[arg(long, short)]
    config: Option<PathBuf>,

    /// Admin console password
    #[arg(long, short = 'p')]
    password: Option<String>,

    /// Control channel listen address
    #[arg(long, short = 't')]
    tcp: Option<String>,

    /// UDP rendezvous listen address
    #[arg(long, short = 'u')]
    udp: Option<String>,

    /// Start in private mode (allow list only)
    #[arg(long)]
    private: bool,

    /// Print an example configuration and exit
    #[arg(long)]
    print_config: bool,
}

#[tokio::main]
async fn main() {
    let cli = Cli::parse();
    if cli.print_config {
        println!("{}", RelayConfig::example_config());
        return;
    }

    let config = match load_config(&cli) {
        Ok(config) => config,
        Err(e) => {
            eprintln!("{e}");
            std::process::exit(2);
        }
    };
    init_logging(&config.logging);

    let server = match RelayServer::bind(config).await {
        Ok(server) => server,
        Err(e) => {
            error!(error = %e, "Failed to start relay");
            std::process::exit(1);
        }
    };

    let (shutdown_tx, shutdown_rx) = mpsc::channel::<()>(1);
    tokio::spawn(async move {
        if let Ok(()) = tokio::signal::ctrl_c().await {
            info!("Received CTRL+C signal, shutting down");
            let _ = shutdown_tx.send(()).await;
        }
    });

    if let Err(e) = server.run(shutdown_rx).await {
        error!(error = %e, "Relay stopped with an error");
        std::process::exit(1);
    }
}

fn load_config(cli: &Cli) -> lobby_relay::Result<RelayConfig> {
    let mut config = match &cli.config {
        Some(path) => RelayConfig::from_file(path)?,
        None => RelayConfig::from_env()?,
    };
    if let Some(password) = &cli.password {
        config.server.admin_password = password.clone();
    }
    if let Some(tcp) = &cli.tcp {
        config.server.tcp_address = tcp.clone();
    }
    if let Some(udp) = &cli.udp {
        config.server.udp_address = udp.clone();
    }
    if cli.private {
        config.server.access_mode = AccessMode::Private;
    }
    config.validate_strict()?;
    Ok(config)
}
