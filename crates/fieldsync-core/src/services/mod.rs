//! Client-facing services.

mod offline;

pub use offline::{OfflineService, OfflineServiceBuilder};
