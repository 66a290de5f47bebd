//! In-process search service with an operation log and failure injection.

use super::{BrowsePage, CopyScope, SearchError, SearchResult, SearchService};
use async_trait::async_trait;
use index_sync_config::{FieldPath, IndexSettings, ObjectId, ObjectRecord};
use serde_json::Value;
use std::collections::{BTreeMap, HashMap, HashSet};
use tokio::sync::Mutex;

const DEFAULT_PAGE_SIZE: usize = 1000;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum OperationKind {
    Browse,
    Save,
    Delete,
    GetSettings,
    SetSettings,
    Move,
    Copy,
    DeleteIndex,
}

impl OperationKind {
    /// Whether this operation mutates the index it targets.
    pub fn is_write(&self) -> bool {
        matches!(
            self,
            OperationKind::Save
                | OperationKind::Delete
                | OperationKind::SetSettings
                | OperationKind::Move
                | OperationKind::Copy
                | OperationKind::DeleteIndex
        )
    }
}

/// A recorded call. For `Move` and `Copy`, `index` is the destination and
/// `source` the origin.
#[derive(Debug, Clone, PartialEq)]
pub struct Operation {
    pub kind: OperationKind,
    pub index: String,
    pub source: Option<String>,
    pub count: usize,
}

#[derive(Debug, Clone, Default)]
struct MemoryIndex {
    objects: BTreeMap<ObjectId, ObjectRecord>,
    settings: IndexSettings,
    synonyms: Vec<Value>,
    rules: Vec<Value>,
}

#[derive(Debug, Default)]
struct State {
    indices: HashMap<String, MemoryIndex>,
    operations: Vec<Operation>,
    failures: HashSet<(OperationKind, String)>,
}

#[derive(Debug)]
pub struct MemorySearchService {
    state: Mutex<State>,
    page_size: usize,
}

impl Default for MemorySearchService {
    fn default() -> Self {
        Self::new()
    }
}

impl MemorySearchService {
    pub fn new() -> Self {
        Self {
            state: Mutex::new(State::default()),
            page_size: DEFAULT_PAGE_SIZE,
        }
    }

    pub fn with_page_size(mut self, page_size: usize) -> Self {
        self.page_size = page_size.max(1);
        self
    }

    /// Create or replace an index with the given records and settings.
    pub async fn seed(&self, index: &str, objects: Vec<ObjectRecord>, settings: IndexSettings) {
        let mut state = self.state.lock().await;
        let entry = state.indices.entry(index.to_string()).or_default();
        entry.settings = settings;
        for object in objects {
            if let Some(id) = object.object_id() {
                entry.objects.insert(id.to_string(), object);
            }
        }
    }

    pub async fn seed_rules(&self, index: &str, rules: Vec<Value>, synonyms: Vec<Value>) {
        let mut state = self.state.lock().await;
        let entry = state.indices.entry(index.to_string()).or_default();
        entry.rules = rules;
        entry.synonyms = synonyms;
    }

    /// Make every `kind` call against `index` fail.
    pub async fn fail_on(&self, kind: OperationKind, index: &str) {
        self.state
            .lock()
            .await
            .failures
            .insert((kind, index.to_string()));
    }

    pub async fn objects(&self, index: &str) -> Option<BTreeMap<ObjectId, ObjectRecord>> {
        self.state
            .lock()
            .await
            .indices
            .get(index)
            .map(|i| i.objects.clone())
    }

    pub async fn settings(&self, index: &str) -> Option<IndexSettings> {
        self.state
            .lock()
            .await
            .indices
            .get(index)
            .map(|i| i.settings.clone())
    }

    pub async fn rules(&self, index: &str) -> Option<(Vec<Value>, Vec<Value>)> {
        self.state
            .lock()
            .await
            .indices
            .get(index)
            .map(|i| (i.rules.clone(), i.synonyms.clone()))
    }

    pub async fn exists(&self, index: &str) -> bool {
        self.state.lock().await.indices.contains_key(index)
    }

    pub async fn operations(&self) -> Vec<Operation> {
        self.state.lock().await.operations.clone()
    }

    /// Recorded writes, in call order.
    pub async fn writes(&self) -> Vec<Operation> {
        self.operations()
            .await
            .into_iter()
            .filter(|op| op.kind.is_write())
            .collect()
    }
}

impl State {
    fn record(
        &mut self,
        kind: OperationKind,
        index: &str,
        source: Option<&str>,
        count: usize,
    ) -> SearchResult<()> {
        self.operations.push(Operation {
            kind,
            index: index.to_string(),
            source: source.map(str::to_string),
            count,
        });
        if self.failures.contains(&(kind, index.to_string())) {
            return Err(SearchError::Injected(format!(
                "injected {:?} failure on `{}`",
                kind, index
            )));
        }
        Ok(())
    }

    fn existing(&self, index: &str) -> SearchResult<&MemoryIndex> {
        self.indices.get(index).ok_or_else(|| SearchError::NotFound {
            index: index.to_string(),
        })
    }
}

#[async_trait]
impl SearchService for MemorySearchService {
    async fn index_exists(&self, index: &str) -> SearchResult<bool> {
        let mut state = self.state.lock().await;
        state.record(OperationKind::GetSettings, index, None, 0)?;
        Ok(state.indices.contains_key(index))
    }

    async fn browse_page(
        &self,
        index: &str,
        attributes: &[String],
        cursor: Option<&str>,
    ) -> SearchResult<BrowsePage> {
        let mut state = self.state.lock().await;
        state.record(OperationKind::Browse, index, None, 0)?;

        let fields = attributes
            .iter()
            .filter_map(|attribute| FieldPath::parse(attribute).ok())
            .collect::<Vec<_>>();
        let offset = match cursor {
            Some(cursor) => cursor
                .parse::<usize>()
                .map_err(|_| SearchError::Injected(format!("bad cursor `{}`", cursor)))?,
            None => 0,
        };

        let existing = state.existing(index)?;
        let hits: Vec<ObjectRecord> = existing
            .objects
            .iter()
            .skip(offset)
            .take(self.page_size)
            .map(|(id, object)| {
                let mut hit = object.project(&fields);
                hit.insert(index_sync_config::types::OBJECT_ID_FIELD, Value::String(id.clone()));
                hit
            })
            .collect();

        let next = offset + hits.len();
        let cursor = (next < existing.objects.len()).then(|| next.to_string());
        Ok(BrowsePage { hits, cursor })
    }

    async fn save_objects(&self, index: &str, objects: Vec<ObjectRecord>) -> SearchResult<()> {
        let mut state = self.state.lock().await;
        state.record(OperationKind::Save, index, None, objects.len())?;
        let entry = state.indices.entry(index.to_string()).or_default();
        for object in objects {
            let id = object.object_id().map(str::to_string).ok_or_else(|| {
                SearchError::Http {
                    status: 400,
                    message: "record is missing objectID".to_string(),
                }
            })?;
            entry.objects.insert(id, object);
        }
        Ok(())
    }

    async fn delete_objects(&self, index: &str, ids: Vec<ObjectId>) -> SearchResult<()> {
        let mut state = self.state.lock().await;
        state.record(OperationKind::Delete, index, None, ids.len())?;
        let entry = state.indices.entry(index.to_string()).or_default();
        for id in ids {
            entry.objects.remove(&id);
        }
        Ok(())
    }

    async fn get_settings(&self, index: &str) -> SearchResult<IndexSettings> {
        let mut state = self.state.lock().await;
        state.record(OperationKind::GetSettings, index, None, 0)?;
        Ok(state.existing(index)?.settings.clone())
    }

    async fn set_settings(
        &self,
        index: &str,
        settings: &IndexSettings,
        _forward_to_replicas: bool,
    ) -> SearchResult<()> {
        let mut state = self.state.lock().await;
        state.record(OperationKind::SetSettings, index, None, 0)?;
        let entry = state.indices.entry(index.to_string()).or_default();
        entry.settings = entry.settings.merged_with(settings);
        Ok(())
    }

    async fn move_index(&self, source: &str, destination: &str) -> SearchResult<()> {
        let mut state = self.state.lock().await;
        state.record(OperationKind::Move, destination, Some(source), 0)?;
        let moved = state
            .indices
            .remove(source)
            .ok_or_else(|| SearchError::NotFound {
                index: source.to_string(),
            })?;
        state.indices.insert(destination.to_string(), moved);
        Ok(())
    }

    async fn delete_index(&self, index: &str) -> SearchResult<()> {
        let mut state = self.state.lock().await;
        state.record(OperationKind::DeleteIndex, index, None, 0)?;
        state.indices.remove(index);
        Ok(())
    }

    async fn copy_index(
        &self,
        source: &str,
        destination: &str,
        scopes: &[CopyScope],
    ) -> SearchResult<()> {
        let mut state = self.state.lock().await;
        state.record(OperationKind::Copy, destination, Some(source), 0)?;
        let origin = state.existing(source)?.clone();
        let target = state.indices.entry(destination.to_string()).or_default();
        if scopes.is_empty() {
            *target = origin;
            return Ok(());
        }
        for scope in scopes {
            match scope {
                CopyScope::Settings => target.settings = origin.settings.clone(),
                CopyScope::Synonyms => target.synonyms = origin.synonyms.clone(),
                CopyScope::Rules => target.rules = origin.rules.clone(),
            }
        }
        Ok(())
    }
}
