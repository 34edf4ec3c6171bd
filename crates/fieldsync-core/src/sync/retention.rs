//! Retention policy for synced operations

use crate::config::EngineConfig;
use crate::models::Operation;

/// Decides when a synced operation may be purged.
///
/// Unsynced operations, dead-lettered ones included, never expire.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetentionPolicy {
    window_ms: i64,
}

impl RetentionPolicy {
    pub const fn new(window_ms: i64) -> Self {
        Self { window_ms }
    }

    pub const fn from_config(config: &EngineConfig) -> Self {
        Self::new(config.retention_ms())
    }

    pub const fn window_ms(&self) -> i64 {
        self.window_ms
    }

    pub const fn is_expired(&self, operation: &Operation, now_ms: i64) -> bool {
        operation.synced && operation.age_ms(now_ms) > self.window_ms
    }
}

impl Default for RetentionPolicy {
    fn default() -> Self {
        Self::from_config(&EngineConfig::default())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{Action, EntityType};
    use serde_json::json;

    const DAY_MS: i64 = 24 * 60 * 60 * 1_000;

    fn operation(created_at: i64, synced: bool) -> Operation {
        let mut op = Operation::new(EntityType::inspection(), Action::Create, json!({}), created_at);
        op.synced = synced;
        op
    }

    #[test]
    fn default_window_is_seven_days() {
        assert_eq!(RetentionPolicy::default().window_ms(), 7 * DAY_MS);
    }

    #[test]
    fn synced_operation_expires_after_window() {
        let policy = RetentionPolicy::default();
        let now = 100 * DAY_MS;

        assert!(policy.is_expired(&operation(now - 8 * DAY_MS, true), now));
        assert!(!policy.is_expired(&operation(now - 6 * DAY_MS, true), now));
        assert!(!policy.is_expired(&operation(now - 7 * DAY_MS, true), now));
    }

    #[test]
    fn unsynced_operation_never_expires() {
        let policy = RetentionPolicy::default();
        let now = 1_000 * DAY_MS;

        assert!(!policy.is_expired(&operation(0, false), now));

        let mut parked = operation(0, false);
        parked.dead_lettered_at = Some(1);
        assert!(!policy.is_expired(&parked, now));
    }
}
