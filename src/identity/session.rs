//! Identity session cache
//!
//! Each controller owns one session. The first `resolve` performs the store
//! lookup and enrollment check; every later call returns the cached identity
//! without touching the store. Calls that arrive while a lookup is running
//! await that same attempt and share its outcome, failures included. A failed
//! attempt is not cached: the next call after it settles looks up again.
//!
//! The cache holds a single identity regardless of the `user` argument:
//! isolation between users comes from the registry keying controllers by
//! (user, channel), not from this cache.

use futures::future::{BoxFuture, FutureExt, Shared};
use std::sync::Arc;
use tokio::sync::{Mutex, RwLock};
use tracing::{debug, info, warn};

use super::{Identity, IdentityStore};
use crate::types::{GatewayError, Result};

/// One lookup attempt, awaited by every caller that raced it
type Resolution = Shared<BoxFuture<'static, Result<Arc<Identity>>>>;

/// Per-controller cache of the resolved identity
pub struct IdentitySession {
    store: Arc<dyn IdentityStore>,
    /// The resolved identity (populated once)
    current: RwLock<Option<Arc<Identity>>>,
    /// Lookup currently running, if any
    in_flight: Mutex<Option<Resolution>>,
}

impl IdentitySession {
    pub fn new(store: Arc<dyn IdentityStore>) -> Self {
        Self {
            store,
            current: RwLock::new(None),
            in_flight: Mutex::new(None),
        }
    }

    /// Resolve the identity for `user`, loading it on first use
    pub async fn resolve(&self, user: &str) -> Result<Arc<Identity>> {
        // Fast path: already resolved
        if let Some(identity) = self.cached_for(user).await {
            return Ok(identity);
        }

        let attempt = {
            let mut in_flight = self.in_flight.lock().await;

            // Double-check after acquiring lock
            if let Some(identity) = self.cached_for(user).await {
                return Ok(identity);
            }

            match in_flight.as_ref() {
                Some(attempt) => {
                    debug!(user = %user, "Joining identity lookup in flight");
                    attempt.clone()
                }
                None => {
                    let attempt = load(Arc::clone(&self.store), user.to_string())
                        .boxed()
                        .shared();
                    *in_flight = Some(attempt.clone());
                    attempt
                }
            }
        };

        let result = attempt.clone().await;

        let mut in_flight = self.in_flight.lock().await;
        if let Ok(ref identity) = result {
            let mut current = self.current.write().await;
            if current.is_none() {
                *current = Some(Arc::clone(identity));
            }
        }
        if in_flight.as_ref().is_some_and(|running| running.ptr_eq(&attempt)) {
            *in_flight = None;
        }

        result
    }

    /// The cached identity, if one has been resolved
    pub async fn cached(&self) -> Option<Arc<Identity>> {
        self.current.read().await.clone()
    }

    async fn cached_for(&self, user: &str) -> Option<Arc<Identity>> {
        let identity = self.cached().await?;
        if identity.name() != user {
            warn!(
                requested = %user,
                cached = %identity.name(),
                "Reusing the controller's cached identity for a different user"
            );
        }
        Some(identity)
    }
}

/// Look up `user` and require an enrolled identity
async fn load(store: Arc<dyn IdentityStore>, user: String) -> Result<Arc<Identity>> {
    debug!(user = %user, "Loading identity from store");
    let identity = match store.lookup(&user).await {
        Ok(Some(identity)) => identity,
        Ok(None) => {
            warn!(user = %user, "Identity not found in store");
            return Err(GatewayError::Unauthenticated(format!(
                "{} is not registered in the identity store",
                user
            )));
        }
        Err(e) => {
            warn!(user = %user, error = %e, "Identity lookup failed");
            return Err(GatewayError::Unauthenticated(format!("{}: {}", user, e)));
        }
    };

    if !store.is_enrolled(&identity) {
        warn!(user = %user, "Identity is not enrolled");
        return Err(GatewayError::Unauthenticated(format!("{} is not enrolled", user)));
    }

    info!(user = %user, msp_id = %identity.msp_id(), "Identity loaded");
    Ok(Arc::new(identity))
}
