//! Memoized "does this endpoint still accept passwords" probe.

use chrono::{DateTime, Utc};
use std::collections::HashMap;
use std::sync::{Arc, PoisonError, RwLock};
use std::time::Duration;
use tokio::time::timeout;
use tracing::{debug, warn};

use crate::config::SignInConfig;
use crate::endpoint::same_endpoint;
use crate::error::CapabilityError;
use crate::events::Emitter;
use crate::service::AuthorizationService;

/// Process-wide cache of basic-auth support per API endpoint.
///
/// Entries are overwritten on every usable probe and never removed. Writes
/// are last-writer-wins: concurrent probes of one endpoint converge on the
/// same answer.
#[derive(Clone)]
pub struct CapabilityCache {
    entries: Arc<RwLock<HashMap<String, bool>>>,
    hosted_endpoint: String,
    probe_timeout: Duration,
    deadline: DateTime<Utc>,
    hosted_updates: Emitter<bool>,
}

impl CapabilityCache {
    pub fn new(config: &SignInConfig) -> Self {
        Self {
            entries: Arc::new(RwLock::new(HashMap::new())),
            hosted_endpoint: config.hosted_endpoint.clone(),
            probe_timeout: config.probe_timeout(),
            deadline: config.basic_auth_deadline,
            hosted_updates: Emitter::new(),
        }
    }

    /// Fired with the probed value whenever a probe of the hosted endpoint
    /// produces one, changed or not.
    pub fn hosted_updates(&self) -> &Emitter<bool> {
        &self.hosted_updates
    }

    pub fn is_hosted(&self, endpoint: &str) -> bool {
        same_endpoint(endpoint, &self.hosted_endpoint)
    }

    pub fn cached(&self, endpoint: &str) -> Option<bool> {
        self.entries
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .get(endpoint)
            .copied()
    }

    pub(crate) fn record(&self, endpoint: &str, supported: bool) {
        self.entries
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .insert(endpoint.to_string(), supported);
    }

    /// Password auth is assumed available strictly before the deadline.
    pub fn assumed_at(&self, now: DateTime<Utc>) -> bool {
        now < self.deadline
    }

    /// Best guess without touching the network or the cache.
    pub fn try_synchronous_read(&self, endpoint: &str) -> bool {
        self.cached(endpoint)
            .unwrap_or_else(|| self.assumed_at(Utc::now()))
    }

    pub async fn probe(
        &self,
        service: &dyn AuthorizationService,
        endpoint: &str,
    ) -> Result<bool, CapabilityError> {
        let fallback = self.cached(endpoint);
        let hosted = self.is_hosted(endpoint);

        let probed = match timeout(self.probe_timeout, service.fetch_metadata(endpoint)).await {
            Ok(Ok(metadata)) => Some(metadata.supports_basic_auth),
            Ok(Err(e)) if e.is_host_not_found() && !hosted => return Err(e.into()),
            Ok(Err(e)) => {
                debug!(endpoint, "Capability probe failed: {e}");
                None
            }
            Err(_) => {
                warn!(
                    endpoint,
                    timeout = ?self.probe_timeout,
                    ?fallback,
                    "Capability probe timed out"
                );
                fallback
            }
        };

        match probed {
            Some(supported) => {
                debug!(endpoint, supported, "Capability probe resolved");
                self.record(endpoint, supported);
                if hosted {
                    self.hosted_updates.emit(&supported);
                }
                Ok(supported)
            }
            None if hosted => Ok(self.assumed_at(Utc::now())),
            None => Err(CapabilityError::Unreachable {
                endpoint: endpoint.to_string(),
            }),
        }
    }
}
