use super::{QueryResponse, Transformer};
use anyhow::{anyhow, Result};
use async_trait::async_trait;
use serde_json::Value;

/// Selects the record array with a JSON pointer into `{ data, errors }`.
///
/// The empty pointer selects the whole response; `/data` is the common
/// identity-like choice for queries returning a list at the root.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PointerTransformer {
    pointer: String,
}

impl PointerTransformer {
    pub fn new(pointer: impl Into<String>) -> Self {
        Self {
            pointer: pointer.into(),
        }
    }

    pub fn pointer(&self) -> &str {
        &self.pointer
    }
}

impl Default for PointerTransformer {
    fn default() -> Self {
        Self::new("/data")
    }
}

#[async_trait]
impl Transformer for PointerTransformer {
    async fn transform(&self, response: QueryResponse) -> Result<Vec<Value>> {
        let mut root = serde_json::to_value(response)?;
        let selected = root
            .pointer_mut(&self.pointer)
            .ok_or_else(|| anyhow!("Transformer pointer `{}` matched nothing", self.pointer))?;

        match selected.take() {
            Value::Array(items) => Ok(items),
            Value::Null => Ok(Vec::new()),
            other => Err(anyhow!(
                "Transformer pointer `{}` selected a {} instead of an array",
                self.pointer,
                kind(&other)
            )),
        }
    }
}

/// Transformer backed by a closure.
pub struct FnTransformer<F> {
    f: F,
}

impl<F> FnTransformer<F>
where
    F: Fn(QueryResponse) -> Result<Vec<Value>> + Send + Sync,
{
    pub fn new(f: F) -> Self {
        Self { f }
    }
}

#[async_trait]
impl<F> Transformer for FnTransformer<F>
where
    F: Fn(QueryResponse) -> Result<Vec<Value>> + Send + Sync,
{
    async fn transform(&self, response: QueryResponse) -> Result<Vec<Value>> {
        (self.f)(response)
    }
}

fn kind(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "boolean",
        Value::Number(_) => "number",
        Value::String(_) => "string",
        Value::Array(_) => "array",
        Value::Object(_) => "object",
    }
}
