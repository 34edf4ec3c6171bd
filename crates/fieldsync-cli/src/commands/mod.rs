pub mod clear;
pub mod common;
pub mod completions;
pub mod config;
pub mod enqueue;
pub mod list;
pub mod requeue;
pub mod storage;
pub mod sync;
pub mod watch;
