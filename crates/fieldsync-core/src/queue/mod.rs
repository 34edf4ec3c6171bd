//! Durable operation queue.
//!
//! The queue keeps two views in the record store and rewrites both in one
//! atomic batch on every mutation:
//!
//! - `pwa_sync_queue`: `{ "items": [...], "lastSync": ... }` holding every
//!   operation that is not yet synced, in insertion order
//! - `pwa_offline_data`: the full record of every known operation
//!
//! Nothing is cached in memory. Every mutation is a single
//! [`RecordStore::update`]: the current state is read, changed and written
//! back inside one store transaction, so a write is never based on a copy
//! taken before another writer ran, even one in another process.

use std::sync::Arc;

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::db::RecordStore;
use crate::error::Result;
use crate::models::{Action, EntityType, FailureKind, Operation, OperationId};
use crate::sync::retention::RetentionPolicy;
use crate::util::{compact_text, Clock};

pub const SYNC_QUEUE_KEY: &str = "pwa_sync_queue";
pub const OFFLINE_DATA_KEY: &str = "pwa_offline_data";
pub const LAST_SYNC_KEY: &str = "pwa_last_sync";

const STATE_KEYS: [&str; 2] = [SYNC_QUEUE_KEY, OFFLINE_DATA_KEY];

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
struct SyncQueueDocument {
    #[serde(default)]
    items: Vec<Operation>,
    #[serde(default)]
    last_sync: Option<i64>,
}

struct QueueState {
    queue: SyncQueueDocument,
    mirror: Vec<Operation>,
}

impl QueueState {
    fn decode(queue: Option<&str>, mirror: Option<&str>) -> Result<Self> {
        let queue: SyncQueueDocument = match queue {
            Some(raw) => serde_json::from_str(raw)?,
            None => SyncQueueDocument::default(),
        };
        let mut mirror: Vec<Operation> = match mirror {
            Some(raw) => serde_json::from_str(raw)?,
            None => Vec::new(),
        };

        // The mirror must cover the queue; restore anything a partial write lost.
        for item in &queue.items {
            if !mirror.iter().any(|op| op.id == item.id) {
                tracing::warn!("Restoring operation {} missing from offline data", item.id);
                mirror.push(item.clone());
            }
        }

        Ok(Self { queue, mirror })
    }

    fn encode(&self) -> Result<Vec<(String, String)>> {
        Ok(vec![
            (SYNC_QUEUE_KEY.to_string(), serde_json::to_string(&self.queue)?),
            (OFFLINE_DATA_KEY.to_string(), serde_json::to_string(&self.mirror)?),
        ])
    }
}

/// FIFO log of pending mutations backed by a `RecordStore`
#[derive(Clone)]
pub struct OperationQueue {
    store: Arc<dyn RecordStore>,
    clock: Arc<dyn Clock>,
}

impl OperationQueue {
    pub fn new(store: Arc<dyn RecordStore>, clock: Arc<dyn Clock>) -> Self {
        Self { store, clock }
    }

    /// Record a new mutation. Returns only after both views are durably written.
    pub async fn enqueue(
        &self,
        entity_type: EntityType,
        action: Action,
        payload: Value,
    ) -> Result<OperationId> {
        let operation = Operation::new(entity_type, action, payload, self.clock.now_ms());
        let id = operation.id;

        let result = self
            .transact(move |state| {
                state.mirror.push(operation.clone());
                state.queue.items.push(operation);
                ((), true)
            })
            .await;
        if let Err(error) = result {
            tracing::warn!("Failed to persist operation {id}: {error}");
            return Err(error);
        }

        tracing::debug!("Enqueued operation {id}");
        Ok(id)
    }

    /// Operations awaiting delivery, oldest first
    pub async fn pending(&self) -> Result<Vec<Operation>> {
        let state = self.load_state().await?;
        Ok(state
            .queue
            .items
            .into_iter()
            .filter(Operation::is_pending)
            .collect())
    }

    /// Number of operations awaiting delivery
    pub async fn pending_count(&self) -> Result<usize> {
        Ok(self.pending().await?.len())
    }

    /// Operations parked after a permanent failure, oldest first
    pub async fn dead_letters(&self) -> Result<Vec<Operation>> {
        let state = self.load_state().await?;
        Ok(state
            .queue
            .items
            .into_iter()
            .filter(Operation::is_dead_lettered)
            .collect())
    }

    /// Every known operation, optionally limited to one entity type
    pub async fn all(&self, entity_type: Option<&EntityType>) -> Result<Vec<Operation>> {
        let state = self.load_state().await?;
        Ok(state
            .mirror
            .into_iter()
            .filter(|op| entity_type.is_none_or(|entity| &op.entity_type == entity))
            .collect())
    }

    /// Current record for `id`
    pub async fn get(&self, id: &OperationId) -> Result<Option<Operation>> {
        let state = self.load_state().await?;
        Ok(state.mirror.into_iter().find(|op| &op.id == id))
    }

    /// Flip `synced` for `id`. Returns `false` when it was already synced or is unknown.
    pub async fn mark_synced(&self, id: &OperationId) -> Result<bool> {
        self.modify(id, |op| {
            if op.synced {
                return false;
            }
            op.synced = true;
            op.last_error = None;
            op.dead_lettered_at = None;
            true
        })
        .await
    }

    /// Note a failed delivery. Permanent failures park the operation.
    pub async fn record_failure(
        &self,
        id: &OperationId,
        kind: FailureKind,
        message: &str,
    ) -> Result<bool> {
        let now = self.clock.now_ms();
        let message = compact_text(message);
        self.modify(id, move |op| {
            if op.synced {
                return false;
            }
            op.attempts = op.attempts.saturating_add(1);
            op.last_error = Some(message);
            if kind == FailureKind::Permanent {
                op.dead_lettered_at = Some(now);
            }
            true
        })
        .await
    }

    /// Move a dead-lettered operation back into the pending set
    pub async fn requeue(&self, id: &OperationId) -> Result<bool> {
        self.modify(id, |op| {
            if !op.is_dead_lettered() {
                return false;
            }
            op.dead_lettered_at = None;
            true
        })
        .await
    }

    /// Remove synced operations the policy considers expired. Returns how many were removed.
    pub async fn purge(&self, policy: &RetentionPolicy) -> Result<usize> {
        let now = self.clock.now_ms();
        let policy = *policy;
        self.transact(move |state| {
            let before = state.mirror.len();
            state.mirror.retain(|op| !policy.is_expired(op, now));
            let removed = before - state.mirror.len();
            (removed, removed > 0)
        })
        .await
    }

    /// Persist the completion time of a sync pass
    pub async fn record_last_sync(&self, at_ms: i64) -> Result<()> {
        self.store
            .update(
                &[SYNC_QUEUE_KEY],
                Box::new(move |values: Vec<Option<String>>| {
                    let mut queue: SyncQueueDocument = match values.into_iter().flatten().next() {
                        Some(raw) => serde_json::from_str(&raw)?,
                        None => SyncQueueDocument::default(),
                    };
                    queue.last_sync = Some(at_ms);
                    Ok(vec![
                        (SYNC_QUEUE_KEY.to_string(), serde_json::to_string(&queue)?),
                        (LAST_SYNC_KEY.to_string(), at_ms.to_string()),
                    ])
                }),
            )
            .await
    }

    /// Completion time of the last sync pass, if any
    pub async fn last_sync(&self) -> Result<Option<i64>> {
        let Some(raw) = self.store.get(LAST_SYNC_KEY).await? else {
            return Ok(None);
        };
        Ok(Some(serde_json::from_str(&raw)?))
    }

    /// Drop every persisted record, pending or not
    pub async fn clear(&self) -> Result<()> {
        self.store
            .remove(&[SYNC_QUEUE_KEY, OFFLINE_DATA_KEY, LAST_SYNC_KEY])
            .await?;
        tracing::info!("Cleared offline data");
        Ok(())
    }

    async fn modify<F>(&self, id: &OperationId, apply: F) -> Result<bool>
    where
        F: FnOnce(&mut Operation) -> bool + Send,
    {
        let id = *id;
        self.transact(move |state| {
            let Some(record) = state.mirror.iter_mut().find(|op| op.id == id) else {
                return (false, false);
            };
            if !apply(record) {
                return (false, false);
            }
            let updated = record.clone();

            if updated.synced {
                state.queue.items.retain(|op| op.id != id);
            } else if let Some(item) = state.queue.items.iter_mut().find(|op| op.id == id) {
                *item = updated;
            }
            (true, true)
        })
        .await
    }

    /// Run `apply` against the stored state inside one store transaction.
    /// `apply` returns its result and whether the state must be written back.
    async fn transact<T, F>(&self, apply: F) -> Result<T>
    where
        T: Default + Send,
        F: FnOnce(&mut QueueState) -> (T, bool) + Send,
    {
        let mut outcome = None;
        self.store
            .update(
                &STATE_KEYS,
                Box::new(|values: Vec<Option<String>>| {
                    let mut values = values.into_iter();
                    let queue = values.next().flatten();
                    let mirror = values.next().flatten();
                    let mut state = QueueState::decode(queue.as_deref(), mirror.as_deref())?;
                    let (value, changed) = apply(&mut state);
                    outcome = Some(value);
                    if changed {
                        state.encode()
                    } else {
                        Ok(Vec::new())
                    }
                }),
            )
            .await?;
        Ok(outcome.unwrap_or_default())
    }

    async fn load_state(&self) -> Result<QueueState> {
        let queue = self.store.get(SYNC_QUEUE_KEY).await?;
        let mirror = self.store.get(OFFLINE_DATA_KEY).await?;
        QueueState::decode(queue.as_deref(), mirror.as_deref())
    }
}
