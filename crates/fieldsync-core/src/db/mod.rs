//! Database layer for fieldsync

mod connection;
mod migrations;
mod record_store;

pub use connection::Database;
pub use record_store::{LibSqlRecordStore, RecordStore, RecordUpdate};
