//! index-sync: keep remote search indices in line with query results.
//!
//! This crate re-exports the workspace members:
//! - [`config`], [`persistence`] and [`types`] from `index-sync-config`
//! - the reconciliation engine from `index-sync-core`

pub use index_sync_config::{config, persistence, types};
pub use index_sync_core::{error, reporter, search, source, sync, test_utils};

pub use index_sync_config::{ConfigError, IndexSettings, ObjectRecord, SyncConfig};
pub use index_sync_core::{Result, SyncError, SyncRunner};
