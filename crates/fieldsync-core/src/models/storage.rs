//! Storage usage model

use serde::{Deserialize, Serialize};

/// Raw usage figures reported by a record store that knows its quota
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct StorageEstimate {
    /// Bytes currently used
    pub used: u64,
    /// Bytes available in total
    pub quota: u64,
}

/// Quota consumption as shown to users
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct StorageInfo {
    pub used: u64,
    pub quota: u64,
    /// `used / quota` in percent, rounded to two decimals
    pub percentage: f64,
}

impl StorageInfo {
    /// Build from an optional estimate; stores without quota support report zeros.
    #[must_use]
    pub fn from_estimate(estimate: Option<StorageEstimate>) -> Self {
        let Some(StorageEstimate { used, quota }) = estimate else {
            return Self::default();
        };
        if quota == 0 {
            return Self {
                used,
                quota,
                percentage: 0.0,
            };
        }

        #[allow(clippy::cast_precision_loss)]
        let ratio = used as f64 / quota as f64;
        Self {
            used,
            quota,
            percentage: (ratio * 10_000.0).round() / 100.0,
        }
    }
}
