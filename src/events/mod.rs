//! Ledger change-event subscription and deduplication

pub mod watcher;

pub use watcher::{ChangeEventWatcher, WatchHandle};
