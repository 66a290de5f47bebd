//! Run configuration loaded from TOML.
//!
//! Every option has a documented default and is validated eagerly by
//! [`SyncConfig::validate`] before any remote call is made.

use crate::types::{FieldPath, IndexSettings};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use thiserror::Error;

/// Environment variable overriding `credentials.app_id`.
pub const ENV_APP_ID: &str = "INDEX_SYNC_APP_ID";
/// Environment variable overriding `credentials.api_key`.
pub const ENV_API_KEY: &str = "INDEX_SYNC_API_KEY";
/// Environment variable overriding the global `index_name`.
pub const ENV_INDEX_NAME: &str = "INDEX_SYNC_INDEX_NAME";

pub const DEFAULT_CHUNK_SIZE: usize = 1000;
pub const DEFAULT_MAX_CONCURRENT_GROUPS: usize = 4;
pub const DEFAULT_MATCH_FIELD: &str = "internal.contentDigest";

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to read config file {path}: {source}")]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to parse config file {path}: {source}")]
    Parse {
        path: PathBuf,
        #[source]
        source: toml::de::Error,
    },

    #[error("failed to read query file {path} for query #{index}: {source}")]
    QueryFile {
        index: usize,
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("query #{0} has neither `query` nor `query_file`")]
    MissingQuery(usize),

    #[error("query #{0} has no `index_name` and no global `index_name` is set")]
    MissingIndexName(usize),

    #[error("`{0}` must be greater than zero")]
    ZeroValue(&'static str),

    #[error("partial updates are enabled but no match fields are configured for {0}")]
    NoMatchFields(String),

    #[error(transparent)]
    InvalidFieldPath(#[from] crate::types::InvalidFieldPath),

    #[error("query #{index} has an invalid transformer pointer `{pointer}`; it must be empty or start with '/'")]
    InvalidTransformer { index: usize, pointer: String },

    #[error("missing credentials: `app_id` and `api_key` are required")]
    MissingCredentials,
}

/// How requested replicas combine with the replicas already on an index.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ReplicaUpdateMode {
    /// Union of existing and requested replicas
    #[default]
    Merge,
    /// Requested replicas verbatim
    Replace,
}

/// Search service credentials
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct Credentials {
    #[serde(alias = "appId")]
    pub app_id: String,
    #[serde(alias = "apiKey")]
    pub api_key: String,
}

impl Credentials {
    pub fn new(app_id: impl Into<String>, api_key: impl Into<String>) -> Self {
        Self {
            app_id: app_id.into(),
            api_key: api_key.into(),
        }
    }

    pub fn is_complete(&self) -> bool {
        !self.app_id.trim().is_empty() && !self.api_key.trim().is_empty()
    }
}

/// GraphQL data source
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct SourceConfig {
    /// GraphQL endpoint queries are POSTed to
    pub endpoint: Option<String>,
    /// Extra request headers (e.g. authorization)
    pub headers: HashMap<String, String>,
}

/// Search client transport options
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ClientOptions {
    pub connect_timeout_secs: u64,
    pub read_timeout_secs: u64,
    pub write_timeout_secs: u64,
    /// Base URL overriding the default read and write hosts
    pub hosts: Option<String>,
}

impl Default for ClientOptions {
    fn default() -> Self {
        Self {
            connect_timeout_secs: 1,
            read_timeout_secs: 30,
            write_timeout_secs: 30,
            hosts: None,
        }
    }
}

/// Snapshot cache location
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct CacheConfig {
    pub enabled: bool,
    /// Cache directory; defaults to the platform cache dir
    pub dir: Option<PathBuf>,
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            dir: None,
        }
    }
}

/// One query feeding an index.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct QueryConfig {
    /// Inline GraphQL query text
    pub query: Option<String>,
    /// File holding the query text, relative to the config file
    pub query_file: Option<PathBuf>,
    #[serde(alias = "queryVariables")]
    pub query_variables: Option<Value>,
    /// JSON pointer selecting the record array in the query response,
    /// e.g. `/data/allSitePage/nodes`
    pub transformer: Option<String>,
    #[serde(alias = "indexName")]
    pub index_name: Option<String>,
    pub settings: Option<IndexSettings>,
    #[serde(alias = "mergeSettings")]
    pub merge_settings: bool,
    #[serde(alias = "matchFields")]
    pub match_fields: Option<Vec<String>>,
    #[serde(alias = "forwardToReplicas")]
    pub forward_to_replicas: Option<bool>,
}

impl QueryConfig {
    pub fn inline(query: impl Into<String>) -> Self {
        Self {
            query: Some(query.into()),
            ..Self::default()
        }
    }

    pub fn with_index_name(mut self, index_name: impl Into<String>) -> Self {
        self.index_name = Some(index_name.into());
        self
    }

    pub fn with_transformer(mut self, pointer: impl Into<String>) -> Self {
        self.transformer = Some(pointer.into());
        self
    }
}

/// Top-level run configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SyncConfig {
    pub credentials: Option<Credentials>,
    #[serde(alias = "indexName")]
    pub index_name: Option<String>,
    /// Settings for queries that do not carry their own
    pub settings: Option<IndexSettings>,
    pub queries: Vec<QueryConfig>,
    #[serde(alias = "chunkSize")]
    pub chunk_size: usize,
    #[serde(alias = "concurrentQueries")]
    pub concurrent_queries: bool,
    pub max_concurrent_groups: usize,
    #[serde(alias = "dryRun")]
    pub dry_run: bool,
    #[serde(alias = "continueOnFailure")]
    pub continue_on_failure: bool,
    #[serde(alias = "enablePartialUpdates")]
    pub enable_partial_updates: bool,
    #[serde(alias = "matchFields")]
    pub match_fields: Vec<String>,
    #[serde(alias = "replicaUpdateMode")]
    pub replica_update_mode: ReplicaUpdateMode,
    #[serde(alias = "skipIndexing")]
    pub skip_indexing: bool,
    pub source: SourceConfig,
    pub client: ClientOptions,
    pub cache: CacheConfig,
}

impl Default for SyncConfig {
    fn default() -> Self {
        Self {
            credentials: None,
            index_name: None,
            settings: None,
            queries: Vec::new(),
            chunk_size: DEFAULT_CHUNK_SIZE,
            concurrent_queries: true,
            max_concurrent_groups: DEFAULT_MAX_CONCURRENT_GROUPS,
            dry_run: false,
            continue_on_failure: false,
            enable_partial_updates: false,
            match_fields: vec![DEFAULT_MATCH_FIELD.to_string()],
            replica_update_mode: ReplicaUpdateMode::Merge,
            skip_indexing: false,
            source: SourceConfig::default(),
            client: ClientOptions::default(),
            cache: CacheConfig::default(),
        }
    }
}

impl SyncConfig {
    /// Load, resolve query files, apply environment overrides and validate.
    pub fn load(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let path = path.as_ref();
        let content = std::fs::read_to_string(path).map_err(|source| ConfigError::Read {
            path: path.to_path_buf(),
            source,
        })?;
        let mut config = Self::from_toml_str(&content).map_err(|source| ConfigError::Parse {
            path: path.to_path_buf(),
            source,
        })?;

        let base_dir = path.parent().unwrap_or_else(|| Path::new("."));
        config.resolve_query_files(base_dir)?;
        config.apply_env_overrides();
        config.validate()?;
        Ok(config)
    }

    pub fn from_toml_str(content: &str) -> Result<Self, toml::de::Error> {
        toml::from_str(content)
    }

    /// Read `query_file` entries into `query`, relative to `base_dir`.
    pub fn resolve_query_files(&mut self, base_dir: &Path) -> Result<(), ConfigError> {
        for (index, query) in self.queries.iter_mut().enumerate() {
            if query.query.is_some() {
                continue;
            }
            if let Some(file) = &query.query_file {
                let path = if file.is_absolute() {
                    file.clone()
                } else {
                    base_dir.join(file)
                };
                let text = std::fs::read_to_string(&path)
                    .map_err(|source| ConfigError::QueryFile { index, path, source })?;
                query.query = Some(text);
            }
        }
        Ok(())
    }

    pub fn apply_env_overrides(&mut self) {
        let app_id = std::env::var(ENV_APP_ID).ok();
        let api_key = std::env::var(ENV_API_KEY).ok();
        if app_id.is_some() || api_key.is_some() {
            let credentials = self.credentials.get_or_insert_with(Credentials::default);
            if let Some(app_id) = app_id {
                credentials.app_id = app_id;
            }
            if let Some(api_key) = api_key {
                credentials.api_key = api_key;
            }
        }
        if let Ok(index_name) = std::env::var(ENV_INDEX_NAME) {
            if !index_name.is_empty() {
                self.index_name = Some(index_name);
            }
        }
    }

    pub fn has_credentials(&self) -> bool {
        self.credentials
            .as_ref()
            .map(Credentials::is_complete)
            .unwrap_or(false)
    }

    /// Parsed global match fields.
    pub fn default_match_fields(&self) -> Result<Vec<FieldPath>, ConfigError> {
        parse_fields(&self.match_fields)
    }

    /// Check every structural constraint. Credentials are not checked here;
    /// their absence is a run decision, not a malformed config.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.chunk_size == 0 {
            return Err(ConfigError::ZeroValue("chunk_size"));
        }
        if self.max_concurrent_groups == 0 {
            return Err(ConfigError::ZeroValue("max_concurrent_groups"));
        }

        let defaults = self.default_match_fields()?;

        for (index, query) in self.queries.iter().enumerate() {
            let has_text = query
                .query
                .as_deref()
                .map(|text| !text.trim().is_empty())
                .unwrap_or(false);
            if !has_text {
                return Err(ConfigError::MissingQuery(index));
            }

            let index_name = query
                .index_name
                .as_deref()
                .or(self.index_name.as_deref())
                .filter(|name| !name.is_empty())
                .ok_or(ConfigError::MissingIndexName(index))?;

            if let Some(pointer) = &query.transformer {
                if !pointer.is_empty() && !pointer.starts_with('/') {
                    return Err(ConfigError::InvalidTransformer {
                        index,
                        pointer: pointer.clone(),
                    });
                }
            }

            let fields = match &query.match_fields {
                Some(fields) => parse_fields(fields)?,
                None => defaults.clone(),
            };
            if self.enable_partial_updates && fields.is_empty() {
                return Err(ConfigError::NoMatchFields(format!(
                    "query #{index} (index `{index_name}`)"
                )));
            }
        }

        Ok(())
    }
}

pub fn parse_fields(fields: &[String]) -> Result<Vec<FieldPath>, ConfigError> {
    fields
        .iter()
        .map(|field| FieldPath::parse(field).map_err(ConfigError::from))
        .collect()
}
