//! Error types for the reconciliation engine.
//!
//! Every variant names the index it happened on so a failed run can be
//! diagnosed from the message alone.

use crate::search::SearchError;
use index_sync_config::ConfigError;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum SyncError {
    #[error("invalid configuration: {0}")]
    Config(#[from] ConfigError),

    #[error("query for index `{index}` failed: {message}")]
    Query { index: String, message: String },

    #[error("invalid record for index `{index}`: {message}. Current object:\n{record}")]
    InvalidRecord {
        index: String,
        message: String,
        record: String,
    },

    #[error("{operation} on index `{index}` failed: {source}")]
    Remote {
        index: String,
        operation: &'static str,
        #[source]
        source: SearchError,
    },

    #[error("sync task for index `{index}` did not complete: {message}")]
    Task { index: String, message: String },
}

impl SyncError {
    pub fn remote(index: impl Into<String>, operation: &'static str, source: SearchError) -> Self {
        SyncError::Remote {
            index: index.into(),
            operation,
            source,
        }
    }

    pub fn invalid_record(
        index: impl Into<String>,
        message: impl Into<String>,
        record: &serde_json::Value,
    ) -> Self {
        SyncError::InvalidRecord {
            index: index.into(),
            message: message.into(),
            record: serde_json::to_string_pretty(record).unwrap_or_else(|_| record.to_string()),
        }
    }

    /// Index the error occurred on, if any.
    pub fn index(&self) -> Option<&str> {
        match self {
            SyncError::Config(_) => None,
            SyncError::Query { index, .. }
            | SyncError::InvalidRecord { index, .. }
            | SyncError::Remote { index, .. }
            | SyncError::Task { index, .. } => Some(index),
        }
    }
}

pub type Result<T> = std::result::Result<T, SyncError>;
