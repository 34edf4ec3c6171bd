//! Sync session model

use serde::{Deserialize, Serialize};

use super::OperationId;

/// How a failed delivery should be treated
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FailureKind {
    /// Network error, timeout, throttling or server error; retried next pass
    Transient,
    /// Rejected by the server as invalid; parked in the dead-letter state
    Permanent,
}

/// Why a pass ended before contacting the remote API
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SkipReason {
    Offline,
    AlreadyRunning,
}

/// What started a pass
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SyncTrigger {
    Manual,
    ConnectivityRestored,
    VisibilityRestored,
    BackgroundSync,
    /// Follow-up pass for work enqueued while a previous pass was running
    Deferred,
}

/// Result of one delivery attempt
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum ItemOutcome {
    Succeeded,
    Failed { kind: FailureKind, message: String },
}

/// One operation within a pass
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SessionItem {
    pub id: OperationId,
    pub outcome: ItemOutcome,
}

/// Summary of a sync pass. Ephemeral; never persisted.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct SyncReport {
    pub attempted: usize,
    pub succeeded: usize,
    pub dead_lettered: usize,
    pub skipped: Option<SkipReason>,
    pub items: Vec<SessionItem>,
}

impl SyncReport {
    #[must_use]
    pub fn skipped(reason: SkipReason) -> Self {
        Self {
            skipped: Some(reason),
            ..Self::default()
        }
    }

    /// Failed items, transient and permanent
    pub const fn failed(&self) -> usize {
        self.attempted.saturating_sub(self.succeeded)
    }

    pub(crate) fn record(&mut self, id: OperationId, outcome: ItemOutcome) {
        self.attempted += 1;
        match &outcome {
            ItemOutcome::Succeeded => self.succeeded += 1,
            ItemOutcome::Failed {
                kind: FailureKind::Permanent,
                ..
            } => self.dead_lettered += 1,
            ItemOutcome::Failed { .. } => {}
        }
        self.items.push(SessionItem { id, outcome });
    }

    /// Fold a follow-up pass into this one
    pub(crate) fn absorb(&mut self, other: Self) {
        self.attempted += other.attempted;
        self.succeeded += other.succeeded;
        self.dead_lettered += other.dead_lettered;
        self.items.extend(other.items);
    }

    /// Outcome recorded for `id`, if it was attempted
    pub fn outcome_of(&self, id: &OperationId) -> Option<&ItemOutcome> {
        self.items
            .iter()
            .find(|item| &item.id == id)
            .map(|item| &item.outcome)
    }
}
