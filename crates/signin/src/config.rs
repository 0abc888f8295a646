use chrono::{DateTime, TimeZone, Utc};
use serde::{Deserialize, Serialize};
use std::time::Duration;

use crate::endpoint::DEFAULT_HOSTED_ENDPOINT;

const DEFAULT_PROBE_TIMEOUT_MS: u64 = 2000;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct SignInConfig {
    /// API endpoint of the public hosted service.
    pub hosted_endpoint: String,
    pub probe_timeout_ms: u64,
    /// Password authentication against the hosted endpoint is assumed to be
    /// unavailable from this instant on when no probe result is usable.
    pub basic_auth_deadline: DateTime<Utc>,
}

impl Default for SignInConfig {
    fn default() -> Self {
        Self {
            hosted_endpoint: DEFAULT_HOSTED_ENDPOINT.to_string(),
            probe_timeout_ms: DEFAULT_PROBE_TIMEOUT_MS,
            basic_auth_deadline: default_basic_auth_deadline(),
        }
    }
}

impl SignInConfig {
    pub fn probe_timeout(&self) -> Duration {
        Duration::from_millis(self.probe_timeout_ms)
    }
}

fn default_basic_auth_deadline() -> DateTime<Utc> {
    Utc.with_ymd_and_hms(2020, 11, 13, 16, 0, 0)
        .single()
        .unwrap_or(DateTime::<Utc>::MIN_UTC)
}
