//! loyalty-query - run one chaincode query from the command line
//!
//! Usage: loyalty-query -u user1 --chaincode loyalty -m get_customer -a 123456789

use clap::Parser;
use std::sync::Arc;
use tracing::info;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use loyalty_gateway::{
    config::NetworkArgs, controller::ControllerRegistry, identity::FileIdentityStore,
    network::WsConnector, types::TransactionRequest,
};

/// Query the loyalty ledger
#[derive(Parser, Debug)]
#[command(name = "loyalty-query", version)]
struct QueryArgs {
    /// User id
    #[arg(short, long, default_value = "user1")]
    user: String,

    /// Channel
    #[arg(long, default_value = "mychannel")]
    channel: String,

    /// Chaincode id
    #[arg(long, default_value = "loyalty")]
    chaincode: String,

    /// Chaincode function
    #[arg(short, long)]
    method: String,

    /// Function argument (repeatable)
    #[arg(short, long = "arguments")]
    arguments: Vec<String>,

    #[command(flatten)]
    network: NetworkArgs,

    /// Log level (trace, debug, info, warn, error)
    #[arg(long, env = "LOG_LEVEL", default_value = "warn")]
    log_level: String,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let _ = dotenvy::dotenv();
    let args = QueryArgs::parse();

    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| format!("loyalty_gateway={},warn", args.log_level).into()),
        )
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .init();

    args.network.validate().map_err(anyhow::Error::msg)?;

    let profile = args.network.network_profile()?;
    info!("Store path: {}", profile.store_path.display());

    let identities = Arc::new(FileIdentityStore::new(profile.store_path.clone()));
    let connector = Arc::new(WsConnector {
        connect_timeout: args.network.connect_timeout(),
        request_timeout: args.network.request_timeout(),
    });
    let registry = ControllerRegistry::new(profile, identities, connector);
    let controller = registry.get_instance(&args.user, &args.channel);
    info!(
        "Querying {} on {} via {}",
        args.chaincode,
        controller.channel(),
        controller.endpoints().peer.url()
    );

    let request = TransactionRequest::new(&args.chaincode, &args.method, args.arguments.iter().cloned());
    match controller.query(&args.user, &request).await? {
        Some(payload) => println!("Response is {}", String::from_utf8_lossy(&payload)),
        None => println!("No payloads were returned from query"),
    }

    Ok(())
}
