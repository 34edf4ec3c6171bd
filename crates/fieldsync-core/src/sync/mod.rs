//! Sync dispatcher.
//!
//! Drains the operation queue against the remote API. Every trigger funnels
//! into [`SyncDispatcher::run`], which admits one pass at a time.

pub mod background;
pub mod retention;

use std::collections::HashSet;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use tokio::sync::Notify;

use crate::config::EngineConfig;
use crate::connectivity::ConnectivityMonitor;
use crate::error::Result;
use crate::models::{
    FailureKind, ItemOutcome, Operation, OperationId, SkipReason, SyncReport, SyncTrigger,
};
use crate::queue::OperationQueue;
use crate::remote::{RemoteApi, RemoteError};
use crate::state::SyncState;
use crate::util::Clock;

use retention::RetentionPolicy;

/// Clears the in-flight flag when the pass ends, even on panic or cancellation.
struct InFlightGuard<'a> {
    flag: &'a AtomicBool,
    idle: &'a Notify,
}

impl<'a> InFlightGuard<'a> {
    fn acquire(flag: &'a AtomicBool, idle: &'a Notify) -> Option<Self> {
        flag.compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .ok()
            .map(|_| Self { flag, idle })
    }
}

impl Drop for InFlightGuard<'_> {
    fn drop(&mut self) {
        self.flag.store(false, Ordering::Release);
        self.idle.notify_waiters();
    }
}

/// Delivers pending operations to the remote API
#[derive(Clone)]
pub struct SyncDispatcher {
    queue: OperationQueue,
    remote: Arc<dyn RemoteApi>,
    connectivity: ConnectivityMonitor,
    clock: Arc<dyn Clock>,
    retention: RetentionPolicy,
    request_timeout: Duration,
    in_flight: Arc<AtomicBool>,
    idle: Arc<Notify>,
    rerun_requested: Arc<AtomicBool>,
    last_pass_failed: Arc<AtomicBool>,
}

impl SyncDispatcher {
    pub fn new(
        queue: OperationQueue,
        remote: Arc<dyn RemoteApi>,
        connectivity: ConnectivityMonitor,
        clock: Arc<dyn Clock>,
        config: &EngineConfig,
    ) -> Self {
        Self {
            queue,
            remote,
            connectivity,
            clock,
            retention: RetentionPolicy::from_config(config),
            request_timeout: config.request_timeout(),
            in_flight: Arc::new(AtomicBool::new(false)),
            idle: Arc::new(Notify::new()),
            rerun_requested: Arc::new(AtomicBool::new(false)),
            last_pass_failed: Arc::new(AtomicBool::new(false)),
        }
    }

    /// Whether a pass is currently running
    pub fn is_running(&self) -> bool {
        self.in_flight.load(Ordering::Acquire)
    }

    /// Resolve once no pass is running
    pub async fn wait_idle(&self) {
        loop {
            // Registered before the check so a pass ending in between still wakes us.
            let notified = self.idle.notified();
            if !self.is_running() {
                return;
            }
            notified.await;
        }
    }

    /// Summary for status indicators
    pub fn state(&self) -> SyncState {
        SyncState::resolve(
            self.connectivity.is_online(),
            self.is_running(),
            self.last_pass_failed.load(Ordering::Acquire),
        )
    }

    /// Run one sync pass.
    ///
    /// Item failures are recorded on the operations and reported in the
    /// returned [`SyncReport`]; only store failures surface as `Err`.
    pub async fn run(&self, trigger: SyncTrigger) -> Result<SyncReport> {
        if !self.connectivity.is_online() {
            tracing::debug!("Skipping {trigger:?} sync: offline");
            return Ok(SyncReport::skipped(SkipReason::Offline));
        }

        let Some(_guard) = InFlightGuard::acquire(&self.in_flight, &self.idle) else {
            self.rerun_requested.store(true, Ordering::Release);
            tracing::debug!("Sync already running; deferring {trigger:?} trigger");
            return Ok(SyncReport::skipped(SkipReason::AlreadyRunning));
        };
        self.rerun_requested.store(false, Ordering::Release);

        let outcome = self.run_guarded(trigger).await;
        let failed = match &outcome {
            Ok(report) => report.failed() > 0,
            Err(error) => {
                tracing::warn!("Sync pass aborted: {error}");
                true
            }
        };
        self.last_pass_failed.store(failed, Ordering::Release);
        outcome
    }

    async fn run_guarded(&self, trigger: SyncTrigger) -> Result<SyncReport> {
        let snapshot = self.queue.pending().await?;
        let seen: HashSet<OperationId> = snapshot.iter().map(|op| op.id).collect();
        tracing::info!("Starting {trigger:?} sync of {} operation(s)", snapshot.len());

        let mut report = self.deliver_batch(snapshot).await?;

        if self.rerun_requested.swap(false, Ordering::AcqRel) && self.connectivity.is_online() {
            let follow_up: Vec<Operation> = self
                .queue
                .pending()
                .await?
                .into_iter()
                .filter(|op| !seen.contains(&op.id))
                .collect();
            if !follow_up.is_empty() {
                tracing::info!(
                    "Running {:?} sync of {} operation(s)",
                    SyncTrigger::Deferred,
                    follow_up.len()
                );
                report.absorb(self.deliver_batch(follow_up).await?);
            }
        }

        self.queue.record_last_sync(self.clock.now_ms()).await?;
        let purged = self.queue.purge(&self.retention).await?;
        if purged > 0 {
            tracing::debug!("Purged {purged} expired operation(s)");
        }

        tracing::info!(
            "Sync finished: {} attempted, {} succeeded, {} failed, {} dead-lettered",
            report.attempted,
            report.succeeded,
            report.failed(),
            report.dead_lettered
        );
        Ok(report)
    }

    async fn deliver_batch(&self, operations: Vec<Operation>) -> Result<SyncReport> {
        let mut report = SyncReport::default();

        for operation in operations {
            if !self.connectivity.is_online() {
                tracing::info!("Connectivity lost mid-pass; remaining operations stay queued");
                break;
            }

            // Another writer may have synced, parked or purged it since the snapshot.
            let current = match self.queue.get(&operation.id).await? {
                Some(current) if current.is_pending() => current,
                _ => {
                    tracing::debug!("Skipping operation {}: no longer pending", operation.id);
                    continue;
                }
            };

            let outcome = match self.deliver(&current).await {
                Ok(()) => {
                    self.queue.mark_synced(&current.id).await?;
                    tracing::debug!("Synced operation {}", current.id);
                    ItemOutcome::Succeeded
                }
                Err(error) => {
                    self.queue
                        .record_failure(&current.id, error.kind, &error.message)
                        .await?;
                    match error.kind {
                        FailureKind::Transient => tracing::debug!(
                            "Operation {} failed, will retry: {}",
                            current.id,
                            error.message
                        ),
                        FailureKind::Permanent => tracing::warn!(
                            "Operation {} rejected, moved to dead letters: {}",
                            current.id,
                            error.message
                        ),
                    }
                    ItemOutcome::Failed {
                        kind: error.kind,
                        message: error.message,
                    }
                }
            };
            report.record(current.id, outcome);
        }

        Ok(report)
    }

    async fn deliver(&self, operation: &Operation) -> std::result::Result<(), RemoteError> {
        match tokio::time::timeout(self.request_timeout, self.remote.apply(operation)).await {
            Ok(result) => result,
            Err(_) => Err(RemoteError::transient(format!(
                "request timed out after {} ms",
                self.request_timeout.as_millis()
            ))),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::LibSqlRecordStore;
    use crate::models::{Action, EntityType};
    use crate::util::ManualClock;
    use async_trait::async_trait;
    use pretty_assertions::assert_eq;
    use serde_json::{json, Value};
    use std::sync::Mutex;

    const DAY_MS: i64 = 24 * 60 * 60 * 1_000;

    /// Succeeds unless the payload carries `"fail": "transient" | "permanent" | "hang"`.
    #[derive(Default)]
    struct ScriptedRemote {
        calls: Mutex<Vec<OperationId>>,
        delay: Duration,
        go_offline: Option<ConnectivityMonitor>,
    }

    impl ScriptedRemote {
        fn calls(&self) -> Vec<OperationId> {
            self.calls.lock().unwrap().clone()
        }
    }

    #[async_trait]
    impl RemoteApi for ScriptedRemote {
        async fn apply(&self, operation: &Operation) -> std::result::Result<(), RemoteError> {
            self.calls.lock().unwrap().push(operation.id);
            if let Some(monitor) = &self.go_offline {
                monitor.set_online(false);
            }
            if !self.delay.is_zero() {
                tokio::time::sleep(self.delay).await;
            }
            match operation.payload.get("fail").and_then(Value::as_str) {
                Some("transient") => Err(RemoteError::from_status(503, "HTTP 503")),
                Some("permanent") => Err(RemoteError::from_status(422, "HTTP 422")),
                Some("hang") => {
                    tokio::time::sleep(Duration::from_secs(5)).await;
                    Ok(())
                }
                _ => Ok(()),
            }
        }
    }

    struct Harness {
        queue: OperationQueue,
        monitor: ConnectivityMonitor,
        clock: Arc<ManualClock>,
        remote: Arc<ScriptedRemote>,
        dispatcher: SyncDispatcher,
    }

    async fn harness_with(remote: ScriptedRemote, monitor: ConnectivityMonitor) -> Harness {
        let store = LibSqlRecordStore::open_in_memory().await.unwrap();
        let clock = Arc::new(ManualClock::new(1_700_000_000_000));
        let queue = OperationQueue::new(Arc::new(store), clock.clone());
        let remote = Arc::new(remote);
        let config = EngineConfig::default().with_request_timeout(Duration::from_millis(200));
        let dispatcher = SyncDispatcher::new(
            queue.clone(),
            remote.clone(),
            monitor.clone(),
            clock.clone(),
            &config,
        );
        Harness {
            queue,
            monitor,
            clock,
            remote,
            dispatcher,
        }
    }

    async fn harness() -> Harness {
        harness_with(ScriptedRemote::default(), ConnectivityMonitor::new(true)).await
    }

    async fn enqueue(queue: &OperationQueue, payload: Value) -> OperationId {
        queue
            .enqueue(EntityType::inspection(), Action::Create, payload)
            .await
            .unwrap()
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn test_successful_pass_drains_queue() {
        let h = harness().await;
        let first = enqueue(&h.queue, json!({"n": 1})).await;
        let second = enqueue(&h.queue, json!({"n": 2})).await;

        let report = h.dispatcher.run(SyncTrigger::Manual).await.unwrap();

        assert_eq!(report.attempted, 2);
        assert_eq!(report.succeeded, 2);
        assert_eq!(h.remote.calls(), vec![first, second]);
        assert!(h.queue.pending().await.unwrap().is_empty());
        assert_eq!(h.queue.last_sync().await.unwrap(), Some(h.clock.now_ms()));
        assert_eq!(h.dispatcher.state(), SyncState::Synced);
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn test_partial_failure_leaves_only_failed_item_pending() {
        let h = harness().await;
        let first = enqueue(&h.queue, json!({"n": 1})).await;
        let second = enqueue(&h.queue, json!({"n": 2, "fail": "transient"})).await;
        let third = enqueue(&h.queue, json!({"n": 3})).await;

        let report = h.dispatcher.run(SyncTrigger::Manual).await.unwrap();

        assert_eq!(h.remote.calls(), vec![first, second, third]);
        assert_eq!(report.succeeded, 2);
        assert_eq!(report.failed(), 1);
        assert_eq!(report.dead_lettered, 0);

        let pending = h.queue.pending().await.unwrap();
        assert_eq!(pending.len(), 1);
        assert_eq!(pending[0].id, second);
        assert_eq!(pending[0].attempts, 1);
        assert_eq!(pending[0].last_error.as_deref(), Some("HTTP 503"));
        assert_eq!(h.dispatcher.state(), SyncState::Error);
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn test_permanent_failure_is_dead_lettered() {
        let h = harness().await;
        let rejected = enqueue(&h.queue, json!({"fail": "permanent"})).await;

        let report = h.dispatcher.run(SyncTrigger::Manual).await.unwrap();
        assert_eq!(report.dead_lettered, 1);
        assert!(matches!(
            report.outcome_of(&rejected),
            Some(ItemOutcome::Failed {
                kind: FailureKind::Permanent,
                ..
            })
        ));

        // Parked operations are not retried by later passes.
        let again = h.dispatcher.run(SyncTrigger::Manual).await.unwrap();
        assert_eq!(again.attempted, 0);
        assert_eq!(h.remote.calls(), vec![rejected]);
        assert_eq!(h.queue.dead_letters().await.unwrap().len(), 1);
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn test_offline_pass_makes_no_network_calls() {
        let h = harness_with(ScriptedRemote::default(), ConnectivityMonitor::new(false)).await;
        enqueue(&h.queue, json!({})).await;

        let report = h.dispatcher.run(SyncTrigger::Manual).await.unwrap();

        assert_eq!(report.skipped, Some(SkipReason::Offline));
        assert!(h.remote.calls().is_empty());
        assert_eq!(h.queue.pending_count().await.unwrap(), 1);
        assert_eq!(h.queue.last_sync().await.unwrap(), None);
        assert_eq!(h.dispatcher.state(), SyncState::Offline);
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn test_concurrent_triggers_deliver_each_operation_once() {
        let remote = ScriptedRemote {
            delay: Duration::from_millis(50),
            ..ScriptedRemote::default()
        };
        let h = harness_with(remote, ConnectivityMonitor::new(true)).await;
        let mut ids = Vec::new();
        for n in 0..3 {
            ids.push(enqueue(&h.queue, json!({"n": n})).await);
        }

        let (first, second) = tokio::join!(
            h.dispatcher.run(SyncTrigger::ConnectivityRestored),
            h.dispatcher.run(SyncTrigger::VisibilityRestored)
        );
        let reports = [first.unwrap(), second.unwrap()];

        let skipped: Vec<_> = reports.iter().filter_map(|r| r.skipped).collect();
        assert_eq!(skipped, vec![SkipReason::AlreadyRunning]);
        assert_eq!(h.remote.calls(), ids);
        assert!(h.queue.pending().await.unwrap().is_empty());
        assert!(!h.dispatcher.is_running());
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn test_trigger_during_pass_runs_deferred_pass_for_new_work() {
        let remote = ScriptedRemote {
            delay: Duration::from_millis(100),
            ..ScriptedRemote::default()
        };
        let h = harness_with(remote, ConnectivityMonitor::new(true)).await;
        let first = enqueue(&h.queue, json!({"n": 1})).await;

        let dispatcher = h.dispatcher.clone();
        let running = tokio::spawn(async move { dispatcher.run(SyncTrigger::Manual).await });

        while h.remote.calls().is_empty() {
            tokio::time::sleep(Duration::from_millis(5)).await;
        }
        let late = enqueue(&h.queue, json!({"n": 2})).await;
        let skipped = h.dispatcher.run(SyncTrigger::Manual).await.unwrap();
        assert_eq!(skipped.skipped, Some(SkipReason::AlreadyRunning));

        let report = running.await.unwrap().unwrap();
        assert_eq!(report.succeeded, 2);
        assert_eq!(h.remote.calls(), vec![first, late]);
        assert!(h.queue.pending().await.unwrap().is_empty());
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn test_wait_idle_resolves_when_pass_ends() {
        let remote = ScriptedRemote {
            delay: Duration::from_millis(100),
            ..ScriptedRemote::default()
        };
        let h = harness_with(remote, ConnectivityMonitor::new(true)).await;
        enqueue(&h.queue, json!({})).await;

        // Nothing running yet.
        h.dispatcher.wait_idle().await;

        let dispatcher = h.dispatcher.clone();
        let pass = tokio::spawn(async move { dispatcher.run(SyncTrigger::Manual).await });
        while !h.dispatcher.is_running() && !pass.is_finished() {
            tokio::task::yield_now().await;
        }

        h.dispatcher.wait_idle().await;
        assert!(!h.dispatcher.is_running());
        assert!(h.queue.pending().await.unwrap().is_empty());
        assert_eq!(pass.await.unwrap().unwrap().succeeded, 1);
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn test_timeout_counts_as_transient_failure() {
        let h = harness().await;
        let slow = enqueue(&h.queue, json!({"fail": "hang"})).await;
        let fast = enqueue(&h.queue, json!({})).await;

        let report = h.dispatcher.run(SyncTrigger::Manual).await.unwrap();

        assert_eq!(report.succeeded, 1);
        assert!(matches!(
            report.outcome_of(&slow),
            Some(ItemOutcome::Failed {
                kind: FailureKind::Transient,
                ..
            })
        ));
        assert_eq!(report.outcome_of(&fast), Some(&ItemOutcome::Succeeded));
        let pending = h.queue.pending().await.unwrap();
        assert_eq!(pending.len(), 1);
        assert!(pending[0]
            .last_error
            .as_deref()
            .is_some_and(|message| message.contains("timed out")));
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn test_connectivity_loss_mid_pass_stops_early() {
        let monitor = ConnectivityMonitor::new(true);
        let remote = ScriptedRemote {
            go_offline: Some(monitor.clone()),
            ..ScriptedRemote::default()
        };
        let h = harness_with(remote, monitor).await;
        let first = enqueue(&h.queue, json!({"n": 1})).await;
        enqueue(&h.queue, json!({"n": 2})).await;
        enqueue(&h.queue, json!({"n": 3})).await;

        let report = h.dispatcher.run(SyncTrigger::Manual).await.unwrap();

        assert_eq!(report.attempted, 1);
        assert_eq!(h.remote.calls(), vec![first]);
        assert_eq!(h.queue.pending_count().await.unwrap(), 2);
        assert!(!h.monitor.is_online());
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn test_operation_synced_elsewhere_is_not_resent() {
        let remote = ScriptedRemote {
            delay: Duration::from_millis(50),
            ..ScriptedRemote::default()
        };
        let h = harness_with(remote, ConnectivityMonitor::new(true)).await;
        let first = enqueue(&h.queue, json!({"n": 1})).await;
        let second = enqueue(&h.queue, json!({"n": 2})).await;

        let dispatcher = h.dispatcher.clone();
        let running = tokio::spawn(async move { dispatcher.run(SyncTrigger::Manual).await });
        while h.remote.calls().is_empty() {
            tokio::time::sleep(Duration::from_millis(5)).await;
        }
        h.queue.mark_synced(&second).await.unwrap();

        let report = running.await.unwrap().unwrap();
        assert_eq!(report.attempted, 1);
        assert_eq!(h.remote.calls(), vec![first]);
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn test_pass_purges_expired_synced_operations() {
        let h = harness().await;
        let old = enqueue(&h.queue, json!({"n": 1})).await;
        h.queue.mark_synced(&old).await.unwrap();
        let parked = enqueue(&h.queue, json!({"n": 2})).await;
        h.queue
            .record_failure(&parked, FailureKind::Permanent, "HTTP 400")
            .await
            .unwrap();

        h.clock.advance(8 * DAY_MS);
        let report = h.dispatcher.run(SyncTrigger::BackgroundSync).await.unwrap();

        assert_eq!(report.attempted, 0);
        let remaining: Vec<OperationId> = h
            .queue
            .all(None)
            .await
            .unwrap()
            .iter()
            .map(|op| op.id)
            .collect();
        assert_eq!(remaining, vec![parked]);
    }
}
