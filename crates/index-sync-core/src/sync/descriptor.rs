//! Per-query options resolved from the configuration.

use crate::source::{PointerTransformer, Transformer};
use index_sync_config::config::parse_fields;
use index_sync_config::{ConfigError, FieldPath, IndexSettings, QueryConfig, SyncConfig};
use serde_json::Value;
use std::fmt;
use std::sync::Arc;

/// One query feeding an index, resolved from configuration.
///
/// Built once per run and never mutated after grouping.
#[derive(Clone)]
pub struct QueryDescriptor {
    pub query: String,
    pub variables: Option<Value>,
    pub transformer: Arc<dyn Transformer>,
    /// Target index; falls back to the global default when `None`
    pub index_name: Option<String>,
    pub settings: Option<IndexSettings>,
    pub merge_settings: bool,
    /// Change-detection fields; falls back to the global list when `None`
    pub match_fields: Option<Vec<FieldPath>>,
    pub forward_to_replicas: Option<bool>,
}

impl QueryDescriptor {
    pub fn new(query: impl Into<String>) -> Self {
        Self {
            query: query.into(),
            variables: None,
            transformer: Arc::new(PointerTransformer::default()),
            index_name: None,
            settings: None,
            merge_settings: false,
            match_fields: None,
            forward_to_replicas: None,
        }
    }

    pub fn with_index_name(mut self, index_name: impl Into<String>) -> Self {
        self.index_name = Some(index_name.into());
        self
    }

    pub fn with_transformer(mut self, transformer: Arc<dyn Transformer>) -> Self {
        self.transformer = transformer;
        self
    }

    pub fn with_variables(mut self, variables: Value) -> Self {
        self.variables = Some(variables);
        self
    }

    pub fn with_settings(mut self, settings: IndexSettings, merge_settings: bool) -> Self {
        self.settings = Some(settings);
        self.merge_settings = merge_settings;
        self
    }

    pub fn with_match_fields(mut self, fields: Vec<FieldPath>) -> Self {
        self.match_fields = Some(fields);
        self
    }

    pub fn with_forward_to_replicas(mut self, forward: bool) -> Self {
        self.forward_to_replicas = Some(forward);
        self
    }

    /// This query's match fields, or `defaults` when it has none of its own.
    pub fn match_fields_or<'a>(&'a self, defaults: &'a [FieldPath]) -> &'a [FieldPath] {
        self.match_fields.as_deref().unwrap_or(defaults)
    }

    /// Build from the `position`-th `[[queries]]` entry. Query files must
    /// already be resolved.
    pub fn from_config(position: usize, config: &QueryConfig) -> Result<Self, ConfigError> {
        let query = config
            .query
            .clone()
            .filter(|text| !text.trim().is_empty())
            .ok_or(ConfigError::MissingQuery(position))?;

        let transformer: Arc<dyn Transformer> = match &config.transformer {
            Some(pointer) => Arc::new(PointerTransformer::new(pointer.clone())),
            None => Arc::new(PointerTransformer::default()),
        };

        let match_fields = config
            .match_fields
            .as_deref()
            .map(parse_fields)
            .transpose()?;

        Ok(Self {
            query,
            variables: config.query_variables.clone(),
            transformer,
            index_name: config.index_name.clone().filter(|name| !name.is_empty()),
            settings: config.settings.clone(),
            merge_settings: config.merge_settings,
            match_fields,
            forward_to_replicas: config.forward_to_replicas,
        })
    }

    /// Descriptors for every query of a run, in configuration order.
    pub fn all_from_config(config: &SyncConfig) -> Result<Vec<Self>, ConfigError> {
        config
            .queries
            .iter()
            .enumerate()
            .map(|(position, query)| Self::from_config(position, query))
            .collect()
    }
}

impl fmt::Debug for QueryDescriptor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("QueryDescriptor")
            .field("query", &self.query)
            .field("variables", &self.variables)
            .field("index_name", &self.index_name)
            .field("settings", &self.settings)
            .field("merge_settings", &self.merge_settings)
            .field("match_fields", &self.match_fields)
            .field("forward_to_replicas", &self.forward_to_replicas)
            .finish_non_exhaustive()
    }
}
