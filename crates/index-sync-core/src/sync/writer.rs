//! Terminal writes against the search service.
//!
//! Every method is a no-op in dry-run mode apart from a `[dry run]` status
//! line describing the change it would have made.

use crate::error::{Result, SyncError};
use crate::reporter::Reporter;
use crate::search::{CopyScope, SearchService};
use futures::future::try_join_all;
use index_sync_config::{IndexSettings, ObjectId, ObjectRecord};
use std::sync::Arc;
use tracing::debug;

const SHADOW_SUFFIX: &str = "_tmp";

/// Name of the temporary index a full rebuild of `primary` is written to.
pub fn shadow_name(primary: &str) -> String {
    format!("{}{}", primary, SHADOW_SUFFIX)
}

pub struct IndexWriter {
    search: Arc<dyn SearchService>,
    reporter: Arc<dyn Reporter>,
    chunk_size: usize,
    dry_run: bool,
}

impl IndexWriter {
    pub fn new(
        search: Arc<dyn SearchService>,
        reporter: Arc<dyn Reporter>,
        chunk_size: usize,
        dry_run: bool,
    ) -> Self {
        Self {
            search,
            reporter,
            chunk_size: chunk_size.max(1),
            dry_run,
        }
    }

    fn dry(&self, message: String) -> bool {
        if self.dry_run {
            self.reporter.status(&format!("[dry run] {}", message));
        }
        self.dry_run
    }

    /// Create `index` by applying empty settings.
    pub async fn initialize(&self, index: &str) -> Result<()> {
        if self.dry(format!("would create index `{}`", index)) {
            return Ok(());
        }
        self.search
            .set_settings(index, &IndexSettings::new(), false)
            .await
            .map_err(|e| SyncError::remote(index, "initialize", e))
    }

    /// Seed the shadow of `primary` with its settings, synonyms and rules.
    /// A shadow left over from an earlier run is dropped first, so the
    /// shadow only ever holds what this run writes. Returns its name.
    pub async fn prepare_shadow(&self, primary: &str) -> Result<String> {
        let shadow = shadow_name(primary);
        if self.dry(format!(
            "would recreate `{}` with the settings, synonyms and rules of `{}`",
            shadow, primary
        )) {
            return Ok(shadow);
        }
        self.search
            .delete_index(&shadow)
            .await
            .map_err(|e| SyncError::remote(primary, "clear shadow index", e))?;
        self.search
            .copy_index(primary, &shadow, &CopyScope::CONFIGURATION)
            .await
            .map_err(|e| SyncError::remote(primary, "copy to shadow index", e))?;
        Ok(shadow)
    }

    /// Save `objects` in `chunk_size` batches sent concurrently. The first
    /// failed batch fails the call; batches already committed stay.
    pub async fn write_objects(&self, index: &str, objects: Vec<ObjectRecord>) -> Result<usize> {
        let total = objects.len();
        if total == 0 {
            return Ok(0);
        }
        let batches = into_chunks(objects, self.chunk_size);
        if self.dry(format!(
            "would save {} objects to `{}` in {} batches",
            total,
            index,
            batches.len()
        )) {
            return Ok(total);
        }

        debug!("Saving {} objects to `{}` in {} batches", total, index, batches.len());
        try_join_all(
            batches
                .into_iter()
                .map(|batch| self.search.save_objects(index, batch)),
        )
        .await
        .map_err(|e| SyncError::remote(index, "save objects", e))?;
        Ok(total)
    }

    /// Delete `ids` in `chunk_size` batches, one after the other.
    pub async fn delete_objects(&self, index: &str, ids: Vec<ObjectId>) -> Result<usize> {
        let total = ids.len();
        if total == 0 {
            return Ok(0);
        }
        if self.dry(format!("would delete {} objects from `{}`", total, index)) {
            return Ok(total);
        }

        for batch in into_chunks(ids, self.chunk_size) {
            self.search
                .delete_objects(index, batch)
                .await
                .map_err(|e| SyncError::remote(index, "delete objects", e))?;
        }
        Ok(total)
    }

    pub async fn apply_settings(
        &self,
        index: &str,
        settings: &IndexSettings,
        forward_to_replicas: bool,
    ) -> Result<()> {
        if self.dry(format!(
            "would apply settings to `{}`: {}",
            index,
            serde_json::to_string(settings).unwrap_or_default()
        )) {
            return Ok(());
        }
        self.search
            .set_settings(index, settings, forward_to_replicas)
            .await
            .map_err(|e| SyncError::remote(index, "set settings", e))
    }

    /// Atomically replace `primary` with `shadow`.
    pub async fn promote(&self, shadow: &str, primary: &str) -> Result<()> {
        if self.dry(format!("would move `{}` to `{}`", shadow, primary)) {
            return Ok(());
        }
        self.search
            .move_index(shadow, primary)
            .await
            .map_err(|e| SyncError::remote(primary, "move shadow index", e))
    }
}

fn into_chunks<T>(items: Vec<T>, size: usize) -> Vec<Vec<T>> {
    let mut chunks = Vec::with_capacity(items.len().div_ceil(size));
    let mut current = Vec::with_capacity(size.min(items.len()));
    for item in items {
        current.push(item);
        if current.len() == size {
            chunks.push(std::mem::take(&mut current));
        }
    }
    if !current.is_empty() {
        chunks.push(current);
    }
    chunks
}
