//! The reconciliation engine: fetch, group, compare and write.
//!
//! A run groups query descriptors by target index and processes each group
//! independently: fetch every query, read the existing state (partial mode),
//! reconcile, then write additions, deletions and settings. Full rebuilds go
//! through a shadow index that is atomically moved onto the primary.

mod descriptor;
mod existing;
mod fetcher;
mod grouper;
mod orchestrator;
mod reconciler;
mod settings;
mod writer;

pub use descriptor::QueryDescriptor;
pub use existing::{ExistingState, ExistingStateReader, SnapshotSource};
pub use fetcher::{fetch_objects, identify, FreshObjects};
pub use grouper::{group_queries, IndexGroup};
pub use orchestrator::{
    preflight, GroupFailure, GroupOutcome, RunDecision, RunOptions, RunReport, RunStatus,
    SyncRunner,
};
pub use reconciler::{reconcile, FreshResult, ReconcileMode, Reconciliation};
pub use settings::{merge_replicas, plan_settings, resolve_settings, SettingsPlan};
pub use writer::{shadow_name, IndexWriter};
