//! Record, field path and settings types shared by the config and core crates.

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::collections::BTreeMap;
use std::fmt;

/// Field holding the unique identifier of every indexed record.
pub const OBJECT_ID_FIELD: &str = "objectID";

/// Field the identifier is derived from when a record has no `objectID`.
pub const SOURCE_ID_FIELD: &str = "id";

/// Settings key listing replica indices.
pub const REPLICAS_KEY: &str = "replicas";

/// Unique identifier of an object within one index.
pub type ObjectId = String;

/// Existing index state: `objectID` to a partial record holding only the
/// fields needed for comparison.
pub type ObjectSnapshot = BTreeMap<ObjectId, ObjectRecord>;

/// A search-indexable record.
///
/// Wraps a JSON object. The `objectID` field is not enforced at construction;
/// the fetcher validates it before records reach reconciliation.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ObjectRecord(Map<String, Value>);

impl ObjectRecord {
    pub fn new() -> Self {
        Self(Map::new())
    }

    pub fn from_map(map: Map<String, Value>) -> Self {
        Self(map)
    }

    /// Build a record from a JSON value. Returns `None` for non-objects.
    pub fn from_value(value: Value) -> Option<Self> {
        match value {
            Value::Object(map) => Some(Self(map)),
            _ => None,
        }
    }

    /// The record's `objectID`, if it is a non-empty string.
    pub fn object_id(&self) -> Option<&str> {
        match self.0.get(OBJECT_ID_FIELD) {
            Some(Value::String(id)) if !id.is_empty() => Some(id),
            _ => None,
        }
    }

    pub fn get(&self, key: &str) -> Option<&Value> {
        self.0.get(key)
    }

    pub fn get_path(&self, path: &FieldPath) -> Option<&Value> {
        path.lookup(&self.0)
    }

    pub fn insert(&mut self, key: impl Into<String>, value: Value) -> Option<Value> {
        self.0.insert(key.into(), value)
    }

    /// Whether at least one of `fields` is present with a non-null value.
    pub fn has_any(&self, fields: &[FieldPath]) -> bool {
        fields
            .iter()
            .any(|field| matches!(self.get_path(field), Some(value) if !value.is_null()))
    }

    /// Copy of this record restricted to `fields`, preserving nesting.
    pub fn project(&self, fields: &[FieldPath]) -> ObjectRecord {
        let mut projected = Map::new();
        for field in fields {
            if let Some(value) = self.get_path(field) {
                field.assign(&mut projected, value.clone());
            }
        }
        ObjectRecord(projected)
    }

    pub fn as_map(&self) -> &Map<String, Value> {
        &self.0
    }

    pub fn into_value(self) -> Value {
        Value::Object(self.0)
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

impl From<Map<String, Value>> for ObjectRecord {
    fn from(map: Map<String, Value>) -> Self {
        Self(map)
    }
}

/// Dotted path addressing a possibly nested field, e.g. `internal.contentDigest`.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct FieldPath(Vec<String>);

impl FieldPath {
    pub fn parse(path: &str) -> Result<Self, InvalidFieldPath> {
        if path.is_empty() {
            return Err(InvalidFieldPath(path.to_string()));
        }
        let segments: Vec<String> = path.split('.').map(str::to_string).collect();
        if segments.iter().any(|segment| segment.is_empty()) {
            return Err(InvalidFieldPath(path.to_string()));
        }
        Ok(Self(segments))
    }

    pub fn segments(&self) -> &[String] {
        &self.0
    }

    pub fn lookup<'a>(&self, map: &'a Map<String, Value>) -> Option<&'a Value> {
        let (first, rest) = self.0.split_first()?;
        let mut current = map.get(first)?;
        for segment in rest {
            current = current.as_object()?.get(segment)?;
        }
        Some(current)
    }

    /// Write `value` at this path, creating intermediate objects. A
    /// non-object value sitting on the path is replaced.
    pub fn assign(&self, map: &mut Map<String, Value>, value: Value) {
        let Some((last, parents)) = self.0.split_last() else {
            return;
        };
        let mut current = map;
        for segment in parents {
            let entry = current
                .entry(segment.clone())
                .or_insert_with(|| Value::Object(Map::new()));
            if !entry.is_object() {
                *entry = Value::Object(Map::new());
            }
            current = match entry {
                Value::Object(inner) => inner,
                _ => return,
            };
        }
        current.insert(last.clone(), value);
    }
}

impl fmt::Display for FieldPath {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0.join("."))
    }
}

impl TryFrom<String> for FieldPath {
    type Error = InvalidFieldPath;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        FieldPath::parse(&value)
    }
}

impl From<FieldPath> for String {
    fn from(path: FieldPath) -> Self {
        path.to_string()
    }
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("invalid field path `{0}`: segments must be non-empty and separated by '.'")]
pub struct InvalidFieldPath(pub String);

/// Remote index settings (ranking, searchable attributes, replicas, ...).
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct IndexSettings(Map<String, Value>);

impl IndexSettings {
    pub fn new() -> Self {
        Self(Map::new())
    }

    pub fn from_map(map: Map<String, Value>) -> Self {
        Self(map)
    }

    pub fn get(&self, key: &str) -> Option<&Value> {
        self.0.get(key)
    }

    pub fn insert(&mut self, key: impl Into<String>, value: Value) {
        self.0.insert(key.into(), value);
    }

    /// Replica index names, if the settings carry a `replicas` list.
    pub fn replicas(&self) -> Option<Vec<String>> {
        let list = self.0.get(REPLICAS_KEY)?.as_array()?;
        Some(
            list.iter()
                .filter_map(|replica| replica.as_str().map(str::to_string))
                .collect(),
        )
    }

    pub fn with_replicas(mut self, replicas: Vec<String>) -> Self {
        self.0.insert(
            REPLICAS_KEY.to_string(),
            Value::Array(replicas.into_iter().map(Value::String).collect()),
        );
        self
    }

    pub fn without_replicas(mut self) -> Self {
        self.0.remove(REPLICAS_KEY);
        self
    }

    /// `self` overlaid with `other`; keys from `other` win.
    pub fn merged_with(&self, other: &IndexSettings) -> IndexSettings {
        let mut merged = self.0.clone();
        for (key, value) in &other.0 {
            merged.insert(key.clone(), value.clone());
        }
        IndexSettings(merged)
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn as_map(&self) -> &Map<String, Value> {
        &self.0
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn record(value: Value) -> ObjectRecord {
        ObjectRecord::from_value(value).unwrap()
    }

    #[test]
    fn field_path_rejects_empty_segments() {
        assert!(FieldPath::parse("").is_err());
        assert!(FieldPath::parse("internal..digest").is_err());
        assert!(FieldPath::parse(".digest").is_err());
        assert_eq!(
            FieldPath::parse("internal.contentDigest").unwrap().segments(),
            &["internal".to_string(), "contentDigest".to_string()]
        );
    }

    #[test]
    fn nested_lookup_and_projection() {
        let obj = record(json!({
            "objectID": "1",
            "title": "Home",
            "internal": { "contentDigest": "abc", "type": "Page" }
        }));
        let digest = FieldPath::parse("internal.contentDigest").unwrap();

        assert_eq!(obj.get_path(&digest), Some(&json!("abc")));

        let projected = obj.project(&[digest.clone(), FieldPath::parse("missing").unwrap()]);
        assert_eq!(
            projected.into_value(),
            json!({ "internal": { "contentDigest": "abc" } })
        );
    }

    #[test]
    fn has_any_ignores_null_values() {
        let digest = FieldPath::parse("digest").unwrap();
        assert!(!record(json!({ "digest": null })).has_any(&[digest.clone()]));
        assert!(!record(json!({})).has_any(&[digest.clone()]));
        assert!(record(json!({ "digest": "" })).has_any(&[digest]));
    }

    #[test]
    fn object_id_must_be_non_empty_string() {
        assert_eq!(record(json!({ "objectID": "a" })).object_id(), Some("a"));
        assert_eq!(record(json!({ "objectID": "" })).object_id(), None);
        assert_eq!(record(json!({ "objectID": 4 })).object_id(), None);
    }

    #[test]
    fn settings_merge_and_replicas() {
        let existing = IndexSettings::from_map(
            json!({ "searchableAttributes": ["title"], "replicas": ["a"] })
                .as_object()
                .cloned()
                .unwrap(),
        );
        let requested = IndexSettings::new().with_replicas(vec!["b".to_string()]);

        let merged = existing.merged_with(&requested);
        assert_eq!(merged.replicas(), Some(vec!["b".to_string()]));
        assert_eq!(merged.get("searchableAttributes"), Some(&json!(["title"])));
        assert_eq!(merged.without_replicas().replicas(), None);
    }
}
