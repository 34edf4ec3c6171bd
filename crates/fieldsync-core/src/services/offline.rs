//! Offline-first service facade shared across clients.

use std::collections::HashSet;
use std::sync::{Arc, Mutex, PoisonError};
use std::time::Duration;

use serde_json::Value;
use tokio::sync::watch;
use tokio::task::JoinHandle;

use crate::config::EngineConfig;
use crate::connectivity::{ConnectivityMonitor, ListenerHandle};
use crate::db::RecordStore;
use crate::error::{Error, Result};
use crate::models::{
    Action, EntityType, Operation, OperationId, SkipReason, StorageInfo, SyncReport,
    SyncTrigger,
};
use crate::queue::OperationQueue;
use crate::remote::RemoteApi;
use crate::state::SyncState;
use crate::sync::background::{register_background_sync, BackgroundSyncRegistrar};
use crate::sync::SyncDispatcher;
use crate::util::{Clock, SystemClock};

/// Configures and starts an [`OfflineService`].
pub struct OfflineServiceBuilder {
    store: Arc<dyn RecordStore>,
    remote: Arc<dyn RemoteApi>,
    monitor: Option<ConnectivityMonitor>,
    registrar: Option<Arc<dyn BackgroundSyncRegistrar>>,
    clock: Option<Arc<dyn Clock>>,
    config: EngineConfig,
}

impl OfflineServiceBuilder {
    /// Use an existing monitor instead of one that starts online
    #[must_use]
    pub fn monitor(mut self, monitor: ConnectivityMonitor) -> Self {
        self.monitor = Some(monitor);
        self
    }

    #[must_use]
    pub fn registrar(mut self, registrar: Arc<dyn BackgroundSyncRegistrar>) -> Self {
        self.registrar = Some(registrar);
        self
    }

    #[must_use]
    pub fn clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.clock = Some(clock);
        self
    }

    #[must_use]
    pub fn config(mut self, config: EngineConfig) -> Self {
        self.config = config;
        self
    }

    /// Validate the configuration, register background sync and start
    /// watching connectivity. Must be called inside a Tokio runtime.
    pub async fn start(self) -> Result<OfflineService> {
        self.config.validate().map_err(Error::InvalidInput)?;

        let monitor = self
            .monitor
            .unwrap_or_else(|| ConnectivityMonitor::new(true));
        let clock = self.clock.unwrap_or_else(|| Arc::new(SystemClock));
        let queue = OperationQueue::new(Arc::clone(&self.store), Arc::clone(&clock));
        let dispatcher = SyncDispatcher::new(
            queue.clone(),
            self.remote,
            monitor.clone(),
            clock,
            &self.config,
        );

        let background_sync_registered = register_background_sync(
            self.registrar.as_deref(),
            &self.config.background_sync_tag,
        )
        .await;

        let watcher = tokio::spawn(watch_connectivity(
            monitor.watch(),
            dispatcher.clone(),
            self.config.settle_delay(),
        ));

        tracing::info!(
            "Offline service started ({})",
            if monitor.is_online() { "online" } else { "offline" }
        );

        Ok(OfflineService {
            inner: Arc::new(ServiceInner {
                store: self.store,
                queue,
                dispatcher,
                monitor,
                config: self.config,
                background_sync_registered,
                tasks: Mutex::new(vec![watcher]),
            }),
        })
    }
}

struct ServiceInner {
    store: Arc<dyn RecordStore>,
    queue: OperationQueue,
    dispatcher: SyncDispatcher,
    monitor: ConnectivityMonitor,
    config: EngineConfig,
    background_sync_registered: bool,
    tasks: Mutex<Vec<JoinHandle<()>>>,
}

impl ServiceInner {
    fn abort_tasks(&self) {
        let mut tasks = self.tasks.lock().unwrap_or_else(PoisonError::into_inner);
        for task in tasks.drain(..) {
            task.abort();
        }
    }
}

impl Drop for ServiceInner {
    fn drop(&mut self) {
        self.abort_tasks();
    }
}

/// Thread-safe entry point for application code.
///
/// Records every mutation durably, replays them when connectivity allows and
/// reports status. Clones share the same queue, dispatcher and monitor.
#[derive(Clone)]
pub struct OfflineService {
    inner: Arc<ServiceInner>,
}

impl OfflineService {
    pub fn builder(store: Arc<dyn RecordStore>, remote: Arc<dyn RemoteApi>) -> OfflineServiceBuilder {
        OfflineServiceBuilder {
            store,
            remote,
            monitor: None,
            registrar: None,
            clock: None,
            config: EngineConfig::default(),
        }
    }

    /// Durably record a mutation. Starts a sync in the background when online.
    pub async fn store_offline_data(
        &self,
        entity_type: EntityType,
        action: Action,
        payload: Value,
    ) -> Result<OperationId> {
        let id = self.inner.queue.enqueue(entity_type, action, payload).await?;

        if self.is_app_online() {
            let dispatcher = self.inner.dispatcher.clone();
            tokio::spawn(async move {
                if let Err(error) = dispatcher.run(SyncTrigger::Manual).await {
                    tracing::warn!("Sync after enqueue failed: {error}");
                }
            });
        }
        Ok(id)
    }

    /// Every known operation, optionally limited to one entity type
    pub async fn get_offline_data(&self, entity_type: Option<&EntityType>) -> Result<Vec<Operation>> {
        self.inner.queue.all(entity_type).await
    }

    pub async fn get_pending_sync_items(&self) -> Result<Vec<Operation>> {
        self.inner.queue.pending().await
    }

    pub async fn pending_count(&self) -> Result<usize> {
        self.inner.queue.pending_count().await
    }

    pub async fn dead_letters(&self) -> Result<Vec<Operation>> {
        self.inner.queue.dead_letters().await
    }

    /// Return a dead-lettered operation to the pending set
    pub async fn requeue(&self, id: &OperationId) -> Result<bool> {
        let requeued = self.inner.queue.requeue(id).await?;
        if requeued {
            tracing::info!("Requeued operation {id}");
        }
        Ok(requeued)
    }

    /// Run a manual pass.
    ///
    /// Returns `true` iff every operation pending at call time is now synced.
    /// When another pass is running, waits for it to finish and then runs
    /// again. An offline skip returns `true` only if nothing was pending.
    pub async fn sync_data(&self) -> Result<bool> {
        let pending_at_start: Vec<OperationId> = self
            .inner
            .queue
            .pending()
            .await?
            .into_iter()
            .map(|op| op.id)
            .collect();

        loop {
            let report = self.run_sync(SyncTrigger::Manual).await?;
            match report.skipped {
                None => break,
                Some(SkipReason::Offline) => return Ok(pending_at_start.is_empty()),
                Some(SkipReason::AlreadyRunning) => self.inner.dispatcher.wait_idle().await,
            }
        }

        let still_unsynced: HashSet<OperationId> = self
            .inner
            .queue
            .all(None)
            .await?
            .into_iter()
            .filter(|op| !op.synced)
            .map(|op| op.id)
            .collect();
        Ok(pending_at_start
            .iter()
            .all(|id| !still_unsynced.contains(id)))
    }

    /// Run a pass for an arbitrary trigger and return its report
    pub async fn run_sync(&self, trigger: SyncTrigger) -> Result<SyncReport> {
        self.inner.dispatcher.run(trigger).await
    }

    /// Platform visibility signal. Becoming visible while online triggers a pass.
    pub async fn on_visibility_change(&self, visible: bool) -> Result<Option<SyncReport>> {
        if !visible {
            return Ok(None);
        }
        self.run_sync(SyncTrigger::VisibilityRestored).await.map(Some)
    }

    /// Platform background sync callback. Tags other than the registered one are ignored.
    pub async fn on_background_sync(&self, tag: &str) -> Result<Option<SyncReport>> {
        if tag != self.inner.config.background_sync_tag {
            tracing::debug!("Ignoring background sync callback for tag '{tag}'");
            return Ok(None);
        }
        self.run_sync(SyncTrigger::BackgroundSync).await.map(Some)
    }

    pub fn is_app_online(&self) -> bool {
        self.inner.monitor.is_online()
    }

    /// Subscribe to connectivity transitions
    pub fn add_network_listener<F>(&self, listener: F) -> ListenerHandle
    where
        F: Fn(bool) + Send + Sync + 'static,
    {
        self.inner.monitor.subscribe(listener)
    }

    pub async fn get_storage_info(&self) -> Result<StorageInfo> {
        Ok(StorageInfo::from_estimate(self.inner.store.usage().await?))
    }

    /// Remove every stored operation and the last-sync marker
    pub async fn clear_offline_data(&self) -> Result<()> {
        self.inner.queue.clear().await
    }

    pub async fn last_sync(&self) -> Result<Option<i64>> {
        self.inner.queue.last_sync().await
    }

    pub fn sync_state(&self) -> SyncState {
        self.inner.dispatcher.state()
    }

    pub fn monitor(&self) -> &ConnectivityMonitor {
        &self.inner.monitor
    }

    pub fn config(&self) -> &EngineConfig {
        &self.inner.config
    }

    /// Whether the platform accepted the background sync registration
    pub fn background_sync_registered(&self) -> bool {
        self.inner.background_sync_registered
    }

    /// Stop watching connectivity. Passes already running finish normally.
    pub fn shutdown(&self) {
        self.inner.abort_tasks();
        tracing::debug!("Offline service stopped");
    }
}

/// Run one pass per offline → online transition, after the settle delay.
async fn watch_connectivity(
    mut state: watch::Receiver<bool>,
    dispatcher: SyncDispatcher,
    settle_delay: Duration,
) {
    state.borrow_and_update();

    loop {
        if state.changed().await.is_err() {
            return;
        }
        if !*state.borrow_and_update() {
            continue;
        }

        match settle(&mut state, settle_delay).await {
            None => return,
            Some(false) => {
                tracing::debug!("Connectivity dropped during settle delay; sync cancelled");
            }
            Some(true) => {
                if let Err(error) = dispatcher.run(SyncTrigger::ConnectivityRestored).await {
                    tracing::warn!("Sync after reconnect failed: {error}");
                }
            }
        }
    }
}

/// Wait until connectivity has stayed up for `delay`.
///
/// Returns `Some(false)` if it went down meanwhile, `None` once the monitor is gone.
async fn settle(state: &mut watch::Receiver<bool>, delay: Duration) -> Option<bool> {
    loop {
        tokio::select! {
            () = tokio::time::sleep(delay) => return Some(true),
            changed = state.changed() => {
                changed.ok()?;
                if !*state.borrow_and_update() {
                    return Some(false);
                }
            }
        }
    }
}
