//! Configuration for the loyalty gateway
//!
//! CLI arguments and environment variable handling using clap.

use clap::Parser;
use std::net::SocketAddr;
use std::path::PathBuf;
use std::time::Duration;

use crate::network::{Endpoint, NetworkProfile};
use crate::types::{GatewayError, Result};

/// Loyalty gateway - HTTP front for ledger queries and transactions
#[derive(Parser, Debug, Clone)]
#[command(name = "loyalty-gateway")]
#[command(about = "Submits and queries transactions on the loyalty ledger network")]
pub struct Args {
    /// Address to listen on
    #[arg(long, env = "LISTEN", default_value = "0.0.0.0:8000")]
    pub listen: SocketAddr,

    /// Ledger endpoints and TLS material
    #[command(flatten)]
    pub network: NetworkArgs,

    /// User assumed when a request names none
    #[arg(long, env = "DEFAULT_USER", default_value = "admin")]
    pub default_user: String,

    /// Channel assumed when a request names none
    #[arg(long, env = "DEFAULT_CHANNEL", default_value = "mychannel")]
    pub default_channel: String,

    /// Log level (trace, debug, info, warn, error)
    #[arg(long, env = "LOG_LEVEL", default_value = "info")]
    pub log_level: String,

    /// Emit logs as JSON lines
    #[arg(long, env = "LOG_JSON", default_value = "false")]
    pub log_json: bool,
}

/// Ledger network connection configuration
#[derive(Parser, Debug, Clone)]
pub struct NetworkArgs {
    /// Endorsing peer address (host:port)
    #[arg(long, env = "PEER_HOST", default_value = "localhost:7051")]
    pub peer_host: String,

    /// Ordering service address (host:port)
    #[arg(long, env = "ORDERER_HOST", default_value = "localhost:7050")]
    pub orderer_host: String,

    /// Commit event source address (host:port)
    #[arg(long, env = "EVENT_HOST", default_value = "localhost:7053")]
    pub event_host: String,

    /// Use TLS for peer and orderer connections
    #[arg(long, env = "TLS_ENABLED", default_value = "false")]
    pub tls_enabled: bool,

    /// PEM file with the peer's TLS root certificate
    #[arg(long, env = "PEER_PEM")]
    pub peer_pem: Option<PathBuf>,

    /// Expected TLS server name of the peer
    #[arg(long, env = "PEER_DOMAIN")]
    pub peer_domain: Option<String>,

    /// PEM file with the orderer's TLS root certificate
    #[arg(long, env = "ORDERER_PEM")]
    pub orderer_pem: Option<PathBuf>,

    /// Expected TLS server name of the orderer
    #[arg(long, env = "ORDERER_DOMAIN")]
    pub orderer_domain: Option<String>,

    /// PEM file for the event source; the event source is plaintext unless set
    #[arg(long, env = "EVENT_PEM")]
    pub event_pem: Option<PathBuf>,

    /// Expected TLS server name of the event source
    #[arg(long, env = "EVENT_DOMAIN")]
    pub event_domain: Option<String>,

    /// Directory holding enrolled identities (defaults to ~/.hfc-key-store)
    #[arg(long, env = "KEY_STORE_PATH")]
    pub key_store_path: Option<PathBuf>,

    /// Seconds to wait for a commit event before reporting a timeout
    #[arg(long, env = "COMMIT_TIMEOUT_SECS", default_value = "150")]
    pub commit_timeout_secs: u64,

    /// Per-request transport timeout in milliseconds
    #[arg(long, env = "REQUEST_TIMEOUT_MS", default_value = "30000")]
    pub request_timeout_ms: u64,

    /// Initial connection timeout in milliseconds
    #[arg(long, env = "CONNECT_TIMEOUT_MS", default_value = "5000")]
    pub connect_timeout_ms: u64,
}

impl NetworkArgs {
    /// Effective identity store directory
    pub fn store_path(&self) -> PathBuf {
        self.key_store_path.clone().unwrap_or_else(|| {
            let home = std::env::var_os("HOME")
                .map(PathBuf::from)
                .unwrap_or_else(|| PathBuf::from("."));
            home.join(".hfc-key-store")
        })
    }

    pub fn commit_timeout(&self) -> Duration {
        Duration::from_secs(self.commit_timeout_secs)
    }

    pub fn request_timeout(&self) -> Duration {
        Duration::from_millis(self.request_timeout_ms)
    }

    pub fn connect_timeout(&self) -> Duration {
        Duration::from_millis(self.connect_timeout_ms)
    }

    /// Build the static network profile, reading TLS material from disk
    pub fn network_profile(&self) -> Result<NetworkProfile> {
        let peer = if self.tls_enabled {
            let pem = read_pem(self.peer_pem.as_ref(), "PEER_PEM")?;
            Endpoint::with_tls(&self.peer_host, pem, self.peer_domain.clone())
        } else {
            Endpoint::plain(&self.peer_host)
        };

        let orderer = if self.tls_enabled {
            let pem = read_pem(self.orderer_pem.as_ref(), "ORDERER_PEM")?;
            Endpoint::with_tls(&self.orderer_host, pem, self.orderer_domain.clone())
        } else {
            Endpoint::plain(&self.orderer_host)
        };

        let events = match self.event_pem {
            Some(ref path) => {
                let pem = read_pem(Some(path), "EVENT_PEM")?;
                Endpoint::with_tls(&self.event_host, pem, self.event_domain.clone())
            }
            None => Endpoint::plain(&self.event_host),
        };

        Ok(NetworkProfile {
            peer,
            orderer,
            events,
            store_path: self.store_path(),
        })
    }

    /// Validate configuration
    pub fn validate(&self) -> std::result::Result<(), String> {
        if self.commit_timeout_secs == 0 {
            return Err("COMMIT_TIMEOUT_SECS must be greater than zero".to_string());
        }
        if self.request_timeout_ms == 0 || self.connect_timeout_ms == 0 {
            return Err("REQUEST_TIMEOUT_MS and CONNECT_TIMEOUT_MS must be greater than zero".to_string());
        }
        if self.tls_enabled && (self.peer_pem.is_none() || self.orderer_pem.is_none()) {
            return Err("TLS_ENABLED requires PEER_PEM and ORDERER_PEM".to_string());
        }
        Ok(())
    }
}

impl Args {
    /// Validate configuration
    pub fn validate(&self) -> std::result::Result<(), String> {
        if self.default_user.is_empty() || self.default_channel.is_empty() {
            return Err("DEFAULT_USER and DEFAULT_CHANNEL must not be empty".to_string());
        }
        self.network.validate()
    }
}

fn read_pem(path: Option<&PathBuf>, name: &str) -> Result<String> {
    let path = path.ok_or_else(|| GatewayError::Config(format!("{} is required when TLS is enabled", name)))?;
    std::fs::read_to_string(path)
        .map_err(|e| GatewayError::Config(format!("Failed to read {} ({}): {}", name, path.display(), e)))
}
