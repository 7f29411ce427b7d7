//! Controller registry
//!
//! Process-wide map from (user, channel) to a shared [`Controller`].
//! Controllers are created on first access and live until the process exits.

use dashmap::DashMap;
use std::fmt;
use std::sync::Arc;
use std::time::Duration;
use tracing::info;

use super::commit::DEFAULT_COMMIT_TIMEOUT;
use super::Controller;
use crate::identity::IdentityStore;
use crate::network::{Connector, NetworkProfile};

/// Registry key. Kept structured so `("ab", "c")` and `("a", "bc")` never collide.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct ControllerKey {
    pub user: String,
    pub channel: String,
}

impl ControllerKey {
    pub fn new(user: impl Into<String>, channel: impl Into<String>) -> Self {
        Self {
            user: user.into(),
            channel: channel.into(),
        }
    }
}

impl fmt::Display for ControllerKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}#{}", self.user, self.channel)
    }
}

/// Memoizing factory of controllers
pub struct ControllerRegistry {
    controllers: DashMap<ControllerKey, Arc<Controller>>,
    profile: NetworkProfile,
    identities: Arc<dyn IdentityStore>,
    connector: Arc<dyn Connector>,
    commit_timeout: Duration,
}

impl ControllerRegistry {
    pub fn new(
        profile: NetworkProfile,
        identities: Arc<dyn IdentityStore>,
        connector: Arc<dyn Connector>,
    ) -> Self {
        Self {
            controllers: DashMap::new(),
            profile,
            identities,
            connector,
            commit_timeout: DEFAULT_COMMIT_TIMEOUT,
        }
    }

    /// Override the commit-wait deadline for controllers created afterwards
    pub fn with_commit_timeout(mut self, timeout: Duration) -> Self {
        self.commit_timeout = timeout;
        self
    }

    /// Controller for (user, channel), created on first access.
    ///
    /// Construction happens under the map's shard lock, so concurrent first
    /// calls for the same key build exactly one controller.
    pub fn get_instance(&self, user: &str, channel: &str) -> Arc<Controller> {
        let key = ControllerKey::new(user, channel);
        if let Some(existing) = self.controllers.get(&key) {
            return Arc::clone(existing.value());
        }

        let entry = self.controllers.entry(key).or_insert_with(|| {
            let endpoints = self.profile.for_channel(channel);
            info!(
                user = %user,
                channel = %channel,
                peer = %endpoints.peer.url(),
                store = %endpoints.store_path.display(),
                "Creating controller"
            );
            let ledger = self.connector.ledger_client(&endpoints);
            let events = self.connector.event_source(&endpoints);
            Arc::new(Controller::new(
                user,
                endpoints,
                Arc::clone(&self.identities),
                ledger,
                events,
                self.commit_timeout,
            ))
        });
        Arc::clone(entry.value())
    }

    /// Number of controllers created so far
    pub fn len(&self) -> usize {
        self.controllers.len()
    }

    pub fn is_empty(&self) -> bool {
        self.controllers.is_empty()
    }

    pub fn profile(&self) -> &NetworkProfile {
        &self.profile
    }

    pub fn commit_timeout(&self) -> Duration {
        self.commit_timeout
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_key_display_and_distinctness() {
        let a = ControllerKey::new("ab", "c");
        let b = ControllerKey::new("a", "bc");
        assert_eq!(a.to_string(), "ab#c");
        assert_ne!(a, b);
    }
}
