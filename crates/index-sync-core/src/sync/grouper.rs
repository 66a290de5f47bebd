//! Groups query descriptors by target index.

use super::descriptor::QueryDescriptor;
use crate::error::Result;
use index_sync_config::{ConfigError, FieldPath};

/// Queries targeting the same index.
#[derive(Debug, Clone)]
pub struct IndexGroup {
    pub index_name: String,
    pub queries: Vec<QueryDescriptor>,
}

impl IndexGroup {
    /// Union of the queries' match fields in first-seen order.
    pub fn match_fields(&self, defaults: &[FieldPath]) -> Vec<FieldPath> {
        let mut fields: Vec<FieldPath> = Vec::new();
        for query in &self.queries {
            for field in query.match_fields_or(defaults) {
                if !fields.contains(field) {
                    fields.push(field.clone());
                }
            }
        }
        fields
    }
}

/// Partition descriptors by target index, keeping first-seen order of
/// groups and of queries within a group.
pub fn group_queries(
    descriptors: Vec<QueryDescriptor>,
    default_index: Option<&str>,
) -> Result<Vec<IndexGroup>> {
    let mut groups: Vec<IndexGroup> = Vec::new();

    for (position, descriptor) in descriptors.into_iter().enumerate() {
        let index_name = descriptor
            .index_name
            .as_deref()
            .or(default_index)
            .filter(|name| !name.is_empty())
            .ok_or(ConfigError::MissingIndexName(position))?
            .to_string();

        match groups.iter_mut().find(|g| g.index_name == index_name) {
            Some(group) => group.queries.push(descriptor),
            None => groups.push(IndexGroup {
                index_name,
                queries: vec![descriptor],
            }),
        }
    }

    Ok(groups)
}
