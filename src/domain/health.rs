//! Health probe results.

use crate::domain::chain::ChainKey;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Result of probing one protocol family's active connection.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FamilyHealth {
    /// Chain the probe ran against.
    pub chain: ChainKey,
    /// Whether the probe succeeded.
    pub healthy: bool,
    /// Round-trip latency in milliseconds.
    pub latency_ms: u64,
    /// Block number (EVM) or slot (alternate chain).
    pub height: Option<u64>,
    /// Failure detail when unhealthy.
    pub error: Option<String>,
    /// When the probe completed.
    pub checked_at: DateTime<Utc>,
}

impl FamilyHealth {
    /// Healthy probe.
    #[must_use]
    pub fn up(chain: ChainKey, latency: Duration, height: u64) -> Self {
        Self {
            chain,
            healthy: true,
            latency_ms: duration_ms(latency),
            height: Some(height),
            error: None,
            checked_at: Utc::now(),
        }
    }

    /// Failed probe.
    #[must_use]
    pub fn down(chain: ChainKey, latency: Duration, error: impl Into<String>) -> Self {
        Self {
            chain,
            healthy: false,
            latency_ms: duration_ms(latency),
            height: None,
            error: Some(error.into()),
            checked_at: Utc::now(),
        }
    }
}

fn duration_ms(d: Duration) -> u64 {
    u64::try_from(d.as_millis()).unwrap_or(u64::MAX)
}
