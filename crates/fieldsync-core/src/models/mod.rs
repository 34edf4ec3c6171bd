//! Data models for fieldsync

mod operation;
mod storage;
mod sync_report;

pub use operation::{Action, EntityType, Operation, OperationId};
pub use storage::{StorageEstimate, StorageInfo};
pub use sync_report::{
    FailureKind, ItemOutcome, SessionItem, SkipReason, SyncReport, SyncTrigger,
};
