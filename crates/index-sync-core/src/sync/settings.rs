//! Settings and replica resolution.

use super::descriptor::QueryDescriptor;
use crate::error::{Result, SyncError};
use crate::search::SearchService;
use index_sync_config::{IndexSettings, ReplicaUpdateMode};
use tracing::debug;

/// Settings to apply to an index once its objects are written.
#[derive(Debug, Clone, PartialEq)]
pub struct SettingsPlan {
    pub settings: IndexSettings,
    pub forward_to_replicas: bool,
}

impl SettingsPlan {
    pub fn replicas(&self) -> Option<Vec<String>> {
        self.settings.replicas()
    }
}

/// Combine replica lists. `Merge` keeps existing order first and drops
/// duplicates; `Replace` returns `requested` verbatim.
pub fn merge_replicas(
    existing: &[String],
    requested: &[String],
    mode: ReplicaUpdateMode,
) -> Vec<String> {
    match mode {
        ReplicaUpdateMode::Replace => requested.to_vec(),
        ReplicaUpdateMode::Merge => {
            let mut merged: Vec<String> = Vec::with_capacity(existing.len() + requested.len());
            for replica in existing.iter().chain(requested) {
                if !merged.contains(replica) {
                    merged.push(replica.clone());
                }
            }
            merged
        }
    }
}

/// Final settings given what the index has and what was requested.
pub fn resolve_settings(
    existing: &IndexSettings,
    requested: &IndexSettings,
    merge_settings: bool,
    mode: ReplicaUpdateMode,
) -> IndexSettings {
    let resolved = if merge_settings {
        existing.merged_with(requested)
    } else {
        requested.clone()
    };

    match requested.replicas() {
        Some(wanted) => {
            let current = existing.replicas().unwrap_or_default();
            resolved.with_replicas(merge_replicas(&current, &wanted, mode))
        }
        None => resolved,
    }
}

/// Work out the settings for `index_name` from the group's first query,
/// falling back to the global settings. Returns `None` when nothing is
/// requested. Existing settings are only read when they affect the result.
pub async fn plan_settings(
    search: &dyn SearchService,
    index_name: &str,
    descriptor: &QueryDescriptor,
    global: Option<&IndexSettings>,
    mode: ReplicaUpdateMode,
    index_exists: bool,
) -> Result<Option<SettingsPlan>> {
    let Some(requested) = descriptor.settings.as_ref().or(global) else {
        debug!("No settings requested for `{}`", index_name);
        return Ok(None);
    };

    let needs_existing = index_exists
        && (descriptor.merge_settings
            || (mode == ReplicaUpdateMode::Merge && requested.replicas().is_some()));

    let existing = if needs_existing {
        match search.get_settings(index_name).await {
            Ok(settings) => settings,
            Err(e) if e.is_not_found() => IndexSettings::new(),
            Err(e) => return Err(SyncError::remote(index_name, "get settings", e)),
        }
    } else {
        IndexSettings::new()
    };

    Ok(Some(SettingsPlan {
        settings: resolve_settings(&existing, requested, descriptor.merge_settings, mode),
        forward_to_replicas: descriptor.forward_to_replicas.unwrap_or(false),
    }))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::search::MemorySearchService;
    use serde_json::json;

    fn settings(value: serde_json::Value) -> IndexSettings {
        IndexSettings::from_map(value.as_object().cloned().unwrap())
    }

    fn names(list: &[&str]) -> Vec<String> {
        list.iter().map(|s| s.to_string()).collect()
    }

    #[test]
    fn replica_merge_is_a_union() {
        let merged = merge_replicas(&names(&["A", "B"]), &names(&["B", "C"]), ReplicaUpdateMode::Merge);
        assert_eq!(merged, names(&["A", "B", "C"]));
    }

    #[test]
    fn replica_replace_is_verbatim() {
        let replaced =
            merge_replicas(&names(&["A", "B"]), &names(&["B", "C"]), ReplicaUpdateMode::Replace);
        assert_eq!(replaced, names(&["B", "C"]));
    }

    #[test]
    fn merge_settings_keeps_existing_keys() {
        let existing = settings(json!({ "searchableAttributes": ["title"], "replicas": ["A", "B"] }));
        let requested = settings(json!({ "customRanking": ["desc(date)"], "replicas": ["B", "C"] }));

        let resolved = resolve_settings(&existing, &requested, true, ReplicaUpdateMode::Merge);
        assert_eq!(resolved.get("searchableAttributes"), Some(&json!(["title"])));
        assert_eq!(resolved.get("customRanking"), Some(&json!(["desc(date)"])));
        assert_eq!(resolved.replicas(), Some(names(&["A", "B", "C"])));

        let resolved = resolve_settings(&existing, &requested, false, ReplicaUpdateMode::Replace);
        assert_eq!(resolved.get("searchableAttributes"), None);
        assert_eq!(resolved.replicas(), Some(names(&["B", "C"])));
    }

    #[test]
    fn requested_wins_over_existing() {
        let existing = settings(json!({ "hitsPerPage": 10 }));
        let requested = settings(json!({ "hitsPerPage": 50 }));
        let resolved = resolve_settings(&existing, &requested, true, ReplicaUpdateMode::Merge);
        assert_eq!(resolved.get("hitsPerPage"), Some(&json!(50)));
        assert_eq!(resolved.replicas(), None);
    }

    #[tokio::test]
    async fn nothing_requested_means_no_plan() {
        let search = MemorySearchService::new();
        let plan = plan_settings(
            &search,
            "pages",
            &QueryDescriptor::new("{ a }"),
            None,
            ReplicaUpdateMode::Merge,
            true,
        )
        .await
        .unwrap();
        assert!(plan.is_none());
    }

    #[tokio::test]
    async fn plan_reads_existing_replicas() {
        let search = MemorySearchService::new();
        search
            .seed("pages", vec![], IndexSettings::new().with_replicas(names(&["A", "B"])))
            .await;

        let descriptor = QueryDescriptor::new("{ a }")
            .with_settings(IndexSettings::new().with_replicas(names(&["B", "C"])), false)
            .with_forward_to_replicas(true);
        let plan = plan_settings(&search, "pages", &descriptor, None, ReplicaUpdateMode::Merge, true)
            .await
            .unwrap()
            .unwrap();

        assert_eq!(plan.replicas(), Some(names(&["A", "B", "C"])));
        assert!(plan.forward_to_replicas);
    }

    #[tokio::test]
    async fn global_settings_are_the_fallback() {
        let search = MemorySearchService::new();
        let global = settings(json!({ "attributesToSnippet": ["body:20"] }));
        let plan = plan_settings(
            &search,
            "pages",
            &QueryDescriptor::new("{ a }"),
            Some(&global),
            ReplicaUpdateMode::Merge,
            false,
        )
        .await
        .unwrap()
        .unwrap();
        assert_eq!(plan.settings, global);
        assert!(search.operations().await.is_empty());
    }
}
