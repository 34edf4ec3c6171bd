//! fieldsync-core - Offline-first sync engine
//!
//! This crate contains the durable operation queue, connectivity monitor,
//! sync dispatcher and the `OfflineService` facade used by every fieldsync
//! client (CLI and embedding applications).

pub mod config;
pub mod connectivity;
pub mod db;
pub mod error;
pub mod models;
pub mod queue;
pub mod remote;
pub mod services;
pub mod state;
pub mod sync;
pub mod util;

pub use config::EngineConfig;
pub use connectivity::{ConnectivityMonitor, ListenerHandle};
pub use db::{LibSqlRecordStore, RecordStore, RecordUpdate};
pub use error::{Error, Result};
pub use models::{
    Action, EntityType, FailureKind, Operation, OperationId, StorageInfo, SyncReport, SyncTrigger,
};
pub use queue::OperationQueue;
pub use remote::{EndpointRegistry, EntityEndpoint, RemoteApi, RemoteError};
pub use services::{OfflineService, OfflineServiceBuilder};
pub use state::SyncState;
pub use sync::SyncDispatcher;
