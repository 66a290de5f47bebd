//! Query execution and result transformation.

mod graphql;
mod transform;

pub use graphql::GraphqlClient;
pub use transform::{FnTransformer, PointerTransformer};

use anyhow::Result;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Response of a declarative query.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct QueryResponse {
    #[serde(default)]
    pub data: Value,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub errors: Vec<Value>,
}

impl QueryResponse {
    pub fn data(data: Value) -> Self {
        Self {
            data,
            errors: Vec::new(),
        }
    }

    pub fn has_errors(&self) -> bool {
        !self.errors.is_empty()
    }
}

/// Runs a query with optional variables.
#[async_trait]
pub trait QueryExecutor: Send + Sync {
    async fn execute(&self, query: &str, variables: Option<&Value>) -> Result<QueryResponse>;
}

/// Turns a query response into flat records.
#[async_trait]
pub trait Transformer: Send + Sync {
    async fn transform(&self, response: QueryResponse) -> Result<Vec<Value>>;
}
