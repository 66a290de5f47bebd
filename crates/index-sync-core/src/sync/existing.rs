//! Reads what an index currently holds, trimmed to the match fields.

use crate::error::{Result, SyncError};
use crate::search::SearchService;
use index_sync_config::{objects_key, FieldPath, ObjectCache, ObjectSnapshot};
use std::sync::Arc;
use tracing::{debug, warn};

/// Where an [`ExistingState`] came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SnapshotSource {
    Cache,
    Remote,
}

#[derive(Debug, Clone)]
pub struct ExistingState {
    pub objects: ObjectSnapshot,
    pub source: SnapshotSource,
}

pub struct ExistingStateReader {
    search: Arc<dyn SearchService>,
    cache: Option<Arc<dyn ObjectCache>>,
}

impl ExistingStateReader {
    pub fn new(search: Arc<dyn SearchService>, cache: Option<Arc<dyn ObjectCache>>) -> Self {
        Self { search, cache }
    }

    /// Snapshot of `index_name`, from the cache when it holds a usable entry,
    /// otherwise from a full remote browse retrieving only `fields`.
    pub async fn read(&self, index_name: &str, fields: &[FieldPath]) -> Result<ExistingState> {
        if let Some(objects) = self.read_cache(index_name).await {
            debug!(
                "Using {} cached objects for `{}`",
                objects.len(),
                index_name
            );
            return Ok(ExistingState {
                objects,
                source: SnapshotSource::Cache,
            });
        }

        let objects = self.browse(index_name, fields).await?;
        Ok(ExistingState {
            objects,
            source: SnapshotSource::Remote,
        })
    }

    async fn read_cache(&self, index_name: &str) -> Option<ObjectSnapshot> {
        let cache = self.cache.as_ref()?;
        let key = objects_key(index_name);

        let value = match cache.get(&key).await {
            Ok(Some(value)) => value,
            Ok(None) => return None,
            Err(e) => {
                warn!("Could not read cache entry `{}`: {:#}", key, e);
                return None;
            }
        };

        match serde_json::from_value::<ObjectSnapshot>(value) {
            Ok(objects) if !objects.is_empty() => Some(objects),
            Ok(_) => None,
            Err(e) => {
                warn!("Ignoring undecodable cache entry `{}`: {}", key, e);
                None
            }
        }
    }

    async fn browse(&self, index_name: &str, fields: &[FieldPath]) -> Result<ObjectSnapshot> {
        let attributes: Vec<String> = fields.iter().map(FieldPath::to_string).collect();
        let mut objects = ObjectSnapshot::new();
        let mut cursor: Option<String> = None;

        loop {
            let page = match self
                .search
                .browse_page(index_name, &attributes, cursor.as_deref())
                .await
            {
                Ok(page) => page,
                Err(e) if e.is_not_found() => {
                    debug!("Index `{}` does not exist yet", index_name);
                    return Ok(ObjectSnapshot::new());
                }
                Err(e) => return Err(SyncError::remote(index_name, "browse", e)),
            };

            for hit in page.hits {
                match hit.object_id() {
                    Some(id) => {
                        objects.insert(id.to_string(), hit.project(fields));
                    }
                    None => debug!("Skipping hit without objectID in `{}`", index_name),
                }
            }

            match page.cursor {
                Some(next) => cursor = Some(next),
                None => break,
            }
        }

        debug!("Browsed {} objects from `{}`", objects.len(), index_name);
        Ok(objects)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::search::{MemorySearchService, OperationKind};
    use index_sync_config::{IndexSettings, MemoryCache, ObjectRecord};
    use serde_json::json;

    fn record(id: &str, digest: &str) -> ObjectRecord {
        ObjectRecord::from_value(json!({ "objectID": id, "digest": digest, "body": "long" }))
            .unwrap()
    }

    fn digest() -> Vec<FieldPath> {
        vec![FieldPath::parse("digest").unwrap()]
    }

    #[tokio::test]
    async fn remote_browse_walks_every_page() {
        let search = Arc::new(MemorySearchService::new().with_page_size(2));
        search
            .seed(
                "pages",
                vec![record("1", "a"), record("2", "b"), record("3", "c")],
                IndexSettings::new(),
            )
            .await;

        let reader = ExistingStateReader::new(search.clone(), None);
        let state = reader.read("pages", &digest()).await.unwrap();

        assert_eq!(state.source, SnapshotSource::Remote);
        assert_eq!(state.objects.len(), 3);
        assert_eq!(state.objects["3"].clone().into_value(), json!({ "digest": "c" }));
        let browses = search
            .operations()
            .await
            .into_iter()
            .filter(|op| op.kind == OperationKind::Browse)
            .count();
        assert_eq!(browses, 2);
    }

    #[tokio::test]
    async fn missing_index_reads_as_empty() {
        let reader = ExistingStateReader::new(Arc::new(MemorySearchService::new()), None);
        let state = reader.read("nope", &digest()).await.unwrap();
        assert!(state.objects.is_empty());
    }

    #[tokio::test]
    async fn browse_failure_is_fatal() {
        let search = Arc::new(MemorySearchService::new());
        search.seed("pages", vec![], IndexSettings::new()).await;
        search.fail_on(OperationKind::Browse, "pages").await;

        let reader = ExistingStateReader::new(search, None);
        let err = reader.read("pages", &digest()).await.unwrap_err();
        assert!(matches!(err, SyncError::Remote { operation: "browse", .. }));
    }

    #[tokio::test]
    async fn cache_hit_skips_the_remote() {
        let search = Arc::new(MemorySearchService::new());
        let cache = Arc::new(MemoryCache::new());
        cache
            .set(&objects_key("pages"), json!({ "1": { "digest": "a" } }))
            .await
            .unwrap();

        let reader = ExistingStateReader::new(search.clone(), Some(cache));
        let state = reader.read("pages", &digest()).await.unwrap();

        assert_eq!(state.source, SnapshotSource::Cache);
        assert_eq!(state.objects.len(), 1);
        assert!(search.operations().await.is_empty());
    }

    #[tokio::test]
    async fn empty_or_malformed_cache_falls_back() {
        let search = Arc::new(MemorySearchService::new());
        search
            .seed("pages", vec![record("1", "a")], IndexSettings::new())
            .await;
        let cache = Arc::new(MemoryCache::new());
        let reader = ExistingStateReader::new(search.clone(), Some(cache.clone()));

        cache.set(&objects_key("pages"), json!({})).await.unwrap();
        let state = reader.read("pages", &digest()).await.unwrap();
        assert_eq!(state.source, SnapshotSource::Remote);

        cache
            .set(&objects_key("pages"), json!(["not", "a", "map"]))
            .await
            .unwrap();
        let state = reader.read("pages", &digest()).await.unwrap();
        assert_eq!(state.source, SnapshotSource::Remote);
        assert_eq!(state.objects.len(), 1);
    }
}
