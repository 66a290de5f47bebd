//! Remote search-index service abstraction.

mod algolia;
mod memory;

pub use algolia::{AlgoliaClient, TaskWaitConfig};
pub use memory::{MemorySearchService, Operation, OperationKind};

use async_trait::async_trait;
use index_sync_config::{IndexSettings, ObjectId, ObjectRecord};
use serde::{Deserialize, Serialize};
use std::time::Duration;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum SearchError {
    #[error("index `{index}` does not exist")]
    NotFound { index: String },

    #[error("search service returned {status}: {message}")]
    Http { status: u16, message: String },

    #[error("transport error: {0}")]
    Transport(#[from] reqwest::Error),

    #[error("malformed response: {0}")]
    Decode(#[from] serde_json::Error),

    #[error("invalid request url: {0}")]
    InvalidUrl(String),

    #[error("task {task_id} on index `{index}` not published after {elapsed:?}")]
    TaskTimeout {
        index: String,
        task_id: i64,
        elapsed: Duration,
    },

    #[error("{0}")]
    Injected(String),
}

impl SearchError {
    pub fn is_not_found(&self) -> bool {
        match self {
            SearchError::NotFound { .. } => true,
            SearchError::Http { status, .. } => *status == 404,
            _ => false,
        }
    }
}

pub type SearchResult<T> = std::result::Result<T, SearchError>;

/// Parts of an index carried by a scoped copy.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum CopyScope {
    Settings,
    Synonyms,
    Rules,
}

impl CopyScope {
    /// Everything except records.
    pub const CONFIGURATION: [CopyScope; 3] =
        [CopyScope::Settings, CopyScope::Synonyms, CopyScope::Rules];
}

/// One page of a full index scan.
#[derive(Debug, Clone, Default)]
pub struct BrowsePage {
    pub hits: Vec<ObjectRecord>,
    /// Cursor of the next page; `None` on the last page
    pub cursor: Option<String>,
}

/// Operations the engine needs from a search service.
///
/// Write operations resolve once the change is visible on the service.
#[async_trait]
pub trait SearchService: Send + Sync {
    async fn index_exists(&self, index: &str) -> SearchResult<bool>;

    /// Fetch one page of records, retrieving only `attributes` besides
    /// `objectID`. Fails with `NotFound` when the index does not exist.
    async fn browse_page(
        &self,
        index: &str,
        attributes: &[String],
        cursor: Option<&str>,
    ) -> SearchResult<BrowsePage>;

    /// Add or replace whole records.
    async fn save_objects(&self, index: &str, objects: Vec<ObjectRecord>) -> SearchResult<()>;

    async fn delete_objects(&self, index: &str, ids: Vec<ObjectId>) -> SearchResult<()>;

    async fn get_settings(&self, index: &str) -> SearchResult<IndexSettings>;

    async fn set_settings(
        &self,
        index: &str,
        settings: &IndexSettings,
        forward_to_replicas: bool,
    ) -> SearchResult<()>;

    /// Atomically replace `destination` with `source`; `source` ceases to exist.
    async fn move_index(&self, source: &str, destination: &str) -> SearchResult<()>;

    /// Remove `index` with its records and configuration. A missing index
    /// is not an error.
    async fn delete_index(&self, index: &str) -> SearchResult<()>;

    /// Copy the given parts of `source` into `destination`.
    async fn copy_index(
        &self,
        source: &str,
        destination: &str,
        scopes: &[CopyScope],
    ) -> SearchResult<()>;
}
