//! Loyalty gateway - HTTP front for the loyalty ledger network

use clap::Parser;
use std::sync::Arc;
use tracing::{error, info};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use loyalty_gateway::{
    config::Args,
    controller::ControllerRegistry,
    identity::FileIdentityStore,
    network::WsConnector,
    server::{self, AppState},
};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Load environment variables from .env file if present
    let _ = dotenvy::dotenv();

    let args = Args::parse();

    // Initialize tracing/logging
    let filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| format!("loyalty_gateway={},info", args.log_level).into());
    let registry = tracing_subscriber::registry().with(filter);
    if args.log_json {
        registry.with(tracing_subscriber::fmt::layer().json()).init();
    } else {
        registry.with(tracing_subscriber::fmt::layer()).init();
    }

    if let Err(e) = args.validate() {
        error!("Configuration error: {}", e);
        std::process::exit(1);
    }

    info!("======================================");
    info!("  Loyalty Gateway");
    info!("======================================");
    info!("Listen: {}", args.listen);
    info!("Peer: {}", args.network.peer_host);
    info!("Orderer: {}", args.network.orderer_host);
    info!("Event source: {}", args.network.event_host);
    info!("TLS: {}", if args.network.tls_enabled { "enabled" } else { "disabled" });
    info!("Store path: {}", args.network.store_path().display());
    info!("Defaults: user={} channel={}", args.default_user, args.default_channel);
    info!("Commit timeout: {}s", args.network.commit_timeout_secs);
    info!("======================================");

    let profile = args.network.network_profile()?;
    let identities = Arc::new(FileIdentityStore::new(profile.store_path.clone()));
    let connector = Arc::new(WsConnector {
        connect_timeout: args.network.connect_timeout(),
        request_timeout: args.network.request_timeout(),
    });
    let controllers = Arc::new(
        ControllerRegistry::new(profile, identities, connector)
            .with_commit_timeout(args.network.commit_timeout()),
    );

    let state = Arc::new(AppState::new(args, controllers));

    tokio::select! {
        result = server::run(state) => {
            if let Err(e) = result {
                error!("Server error: {:?}", e);
                std::process::exit(1);
            }
        }
        _ = tokio::signal::ctrl_c() => {
            info!("Received shutdown signal");
        }
    }

    Ok(())
}
