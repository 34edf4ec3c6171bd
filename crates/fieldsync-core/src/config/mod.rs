//! Engine configuration.
//!
//! `EngineConfig` carries the timing knobs of the sync engine. It is
//! deserializable so clients can ship overrides in their own config files;
//! every field falls back to its default when omitted.

use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::util::normalize_text_option;

const DEFAULT_SETTLE_DELAY_MS: u64 = 1_000;
const DEFAULT_REQUEST_TIMEOUT_MS: u64 = 30_000;
const DEFAULT_RETENTION_SECS: u64 = 7 * 24 * 60 * 60;
const DEFAULT_BACKGROUND_SYNC_TAG: &str = "sync-data";

/// Timing and naming knobs for the offline sync engine.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct EngineConfig {
    /// Wait after an offline → online transition before syncing
    pub settle_delay_ms: u64,
    /// Upper bound for a single remote call
    pub request_timeout_ms: u64,
    /// Age past which synced operations are purged
    pub retention_secs: u64,
    /// Tag registered with the platform's background sync facility
    pub background_sync_tag: String,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            settle_delay_ms: DEFAULT_SETTLE_DELAY_MS,
            request_timeout_ms: DEFAULT_REQUEST_TIMEOUT_MS,
            retention_secs: DEFAULT_RETENTION_SECS,
            background_sync_tag: DEFAULT_BACKGROUND_SYNC_TAG.to_string(),
        }
    }
}

impl EngineConfig {
    /// Set the settling delay applied after connectivity returns
    #[must_use]
    pub const fn with_settle_delay(mut self, delay: Duration) -> Self {
        self.settle_delay_ms = duration_to_ms(delay);
        self
    }

    /// Set the per-request timeout
    #[must_use]
    pub const fn with_request_timeout(mut self, timeout: Duration) -> Self {
        self.request_timeout_ms = duration_to_ms(timeout);
        self
    }

    /// Set the retention window for synced operations
    #[must_use]
    pub const fn with_retention(mut self, retention: Duration) -> Self {
        self.retention_secs = retention.as_secs();
        self
    }

    #[must_use]
    pub fn with_background_sync_tag(mut self, tag: impl Into<String>) -> Self {
        self.background_sync_tag = tag.into();
        self
    }

    pub const fn settle_delay(&self) -> Duration {
        Duration::from_millis(self.settle_delay_ms)
    }

    pub const fn request_timeout(&self) -> Duration {
        Duration::from_millis(self.request_timeout_ms)
    }

    pub const fn retention(&self) -> Duration {
        Duration::from_secs(self.retention_secs)
    }

    /// Retention window in milliseconds, saturating on overflow
    #[allow(clippy::cast_possible_wrap)]
    pub const fn retention_ms(&self) -> i64 {
        let ms = self.retention_secs.saturating_mul(1_000);
        if ms > i64::MAX as u64 {
            i64::MAX
        } else {
            ms as i64
        }
    }

    /// Check that the configuration can drive the engine.
    pub fn validate(&self) -> Result<(), String> {
        if self.request_timeout_ms == 0 {
            return Err("request_timeout_ms must be greater than zero".to_string());
        }
        if self.retention_secs == 0 {
            return Err("retention_secs must be greater than zero".to_string());
        }
        if normalize_text_option(Some(self.background_sync_tag.clone())).is_none() {
            return Err("background_sync_tag must not be empty".to_string());
        }
        Ok(())
    }
}

/// Parse and validate an engine configuration from a JSON payload.
pub fn parse_engine_config(payload: &str) -> Result<EngineConfig, String> {
    let config: EngineConfig = serde_json::from_str(payload)
        .map_err(|error| format!("invalid engine config JSON: {error}"))?;
    config.validate()?;
    Ok(config)
}

#[allow(clippy::cast_possible_truncation)]
const fn duration_to_ms(duration: Duration) -> u64 {
    let ms = duration.as_millis();
    if ms > u64::MAX as u128 {
        u64::MAX
    } else {
        ms as u64
    }
}
