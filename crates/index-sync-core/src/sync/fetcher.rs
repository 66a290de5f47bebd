//! Runs one query and turns its result into identified records.

use super::descriptor::QueryDescriptor;
use crate::error::{Result, SyncError};
use crate::source::QueryExecutor;
use index_sync_config::types::{OBJECT_ID_FIELD, SOURCE_ID_FIELD};
use index_sync_config::{ObjectId, ObjectRecord};
use serde_json::{Map, Value};
use std::collections::BTreeMap;

/// Records produced by one query, keyed by `objectID`.
pub type FreshObjects = BTreeMap<ObjectId, ObjectRecord>;

/// Execute `descriptor` and return its records.
///
/// Query errors (transport failures and a non-empty `errors` array),
/// transformer failures and a repeated `objectID` are fatal for the group.
pub async fn fetch_objects(
    executor: &dyn QueryExecutor,
    descriptor: &QueryDescriptor,
    index_name: &str,
) -> Result<FreshObjects> {
    let response = executor
        .execute(&descriptor.query, descriptor.variables.as_ref())
        .await
        .map_err(|e| SyncError::Query {
            index: index_name.to_string(),
            message: format!("{:#}", e),
        })?;

    if response.has_errors() {
        let errors = serde_json::to_string_pretty(&response.errors)
            .unwrap_or_else(|_| format!("{:?}", response.errors));
        return Err(SyncError::Query {
            index: index_name.to_string(),
            message: format!("the query returned errors:\n{}", errors),
        });
    }

    let records = descriptor
        .transformer
        .transform(response)
        .await
        .map_err(|e| SyncError::Query {
            index: index_name.to_string(),
            message: format!("transformer failed: {:#}", e),
        })?;

    let mut objects = FreshObjects::new();
    for record in records {
        let object = identify(record, index_name)?;
        let Some(id) = object.object_id().map(str::to_string) else {
            continue;
        };
        if objects.contains_key(&id) {
            return Err(SyncError::invalid_record(
                index_name,
                format!("the query produced objectID `{}` more than once", id),
                &object.into_value(),
            ));
        }
        objects.insert(id, object);
    }
    Ok(objects)
}

/// Give `record` a string `objectID`, derived from `id` when needed.
pub fn identify(record: Value, index_name: &str) -> Result<ObjectRecord> {
    let mut map = match record {
        Value::Object(map) => map,
        other => {
            return Err(SyncError::invalid_record(
                index_name,
                "query results must be JSON objects",
                &other,
            ))
        }
    };

    let id = identifier(&map, OBJECT_ID_FIELD).or_else(|| identifier(&map, SOURCE_ID_FIELD));
    match id {
        Some(id) => {
            map.insert(OBJECT_ID_FIELD.to_string(), Value::String(id));
            Ok(ObjectRecord::from_map(map))
        }
        None => Err(SyncError::invalid_record(
            index_name,
            format!(
                "every record needs a non-empty `{}` or `{}` field",
                OBJECT_ID_FIELD, SOURCE_ID_FIELD
            ),
            &Value::Object(map),
        )),
    }
}

fn identifier(map: &Map<String, Value>, key: &str) -> Option<String> {
    match map.get(key)? {
        Value::String(id) if !id.is_empty() => Some(id.clone()),
        Value::Number(n) => Some(n.to_string()),
        _ => None,
    }
}
