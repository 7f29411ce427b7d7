//! Static description of the ledger endpoints a controller binds to

use std::path::PathBuf;

/// TLS material for one endpoint
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TlsMaterial {
    /// PEM-encoded root certificate(s) the endpoint's certificate chains to
    pub pem: String,
    /// Expected server name (overrides the host part of the address)
    pub domain: String,
}

/// A single network endpoint (peer, orderer or event source)
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Endpoint {
    /// `host:port`
    pub address: String,
    pub tls: Option<TlsMaterial>,
}

impl Endpoint {
    /// Plaintext endpoint
    pub fn plain(address: impl Into<String>) -> Self {
        Self {
            address: address.into(),
            tls: None,
        }
    }

    /// TLS endpoint; the server name defaults to the host part of the address
    pub fn with_tls(address: impl Into<String>, pem: impl Into<String>, domain: Option<String>) -> Self {
        let address = address.into();
        let domain = domain.unwrap_or_else(|| host_of(&address).to_string());
        Self {
            address,
            tls: Some(TlsMaterial {
                pem: pem.into(),
                domain,
            }),
        }
    }

    /// WebSocket URL for this endpoint
    pub fn url(&self) -> String {
        let scheme = if self.tls.is_some() { "wss" } else { "ws" };
        format!("{}://{}", scheme, self.address)
    }

    /// Host part of the address
    pub fn host(&self) -> &str {
        host_of(&self.address)
    }
}

fn host_of(address: &str) -> &str {
    address.split(':').next().unwrap_or(address)
}

/// Endpoints and identity directory shared by every channel.
///
/// The registry merges this with a channel name to build each controller's
/// [`EndpointConfig`].
#[derive(Debug, Clone)]
pub struct NetworkProfile {
    pub peer: Endpoint,
    pub orderer: Endpoint,
    pub events: Endpoint,
    /// Directory holding enrolled identities
    pub store_path: PathBuf,
}

impl NetworkProfile {
    pub fn for_channel(&self, channel: &str) -> EndpointConfig {
        EndpointConfig {
            peer: self.peer.clone(),
            orderer: self.orderer.clone(),
            events: self.events.clone(),
            channel: channel.to_string(),
            store_path: self.store_path.clone(),
        }
    }
}

/// Immutable endpoint binding of one controller
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EndpointConfig {
    pub peer: Endpoint,
    pub orderer: Endpoint,
    pub events: Endpoint,
    pub channel: String,
    pub store_path: PathBuf,
}
