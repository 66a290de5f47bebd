//! Runs every index group of a sync and collects the outcome.

use super::descriptor::QueryDescriptor;
use super::existing::{ExistingStateReader, SnapshotSource};
use super::fetcher::fetch_objects;
use super::grouper::{group_queries, IndexGroup};
use super::reconciler::{reconcile, FreshResult, ReconcileMode};
use super::settings::plan_settings;
use super::writer::IndexWriter;
use crate::error::{Result, SyncError};
use crate::reporter::{Activity, Reporter};
use crate::search::SearchService;
use crate::source::QueryExecutor;
use chrono::{DateTime, Utc};
use futures::future::try_join_all;
use futures::stream::{FuturesUnordered, StreamExt};
use index_sync_config::config::DEFAULT_MAX_CONCURRENT_GROUPS;
use index_sync_config::{
    objects_key, ConfigError, FieldPath, IndexSettings, ObjectCache, ObjectSnapshot,
    ReplicaUpdateMode, SyncConfig,
};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Semaphore;
use tracing::{debug, info, warn};

/// Run-wide options resolved from [`SyncConfig`].
#[derive(Debug, Clone)]
pub struct RunOptions {
    pub default_index: Option<String>,
    /// Settings for groups whose first query carries none
    pub settings: Option<IndexSettings>,
    pub chunk_size: usize,
    pub concurrent: bool,
    pub max_concurrent_groups: usize,
    pub dry_run: bool,
    pub continue_on_failure: bool,
    pub partial_updates: bool,
    pub match_fields: Vec<FieldPath>,
    pub replica_update_mode: ReplicaUpdateMode,
}

impl Default for RunOptions {
    fn default() -> Self {
        let config = SyncConfig::default();
        Self {
            default_index: None,
            settings: None,
            chunk_size: config.chunk_size,
            concurrent: config.concurrent_queries,
            max_concurrent_groups: DEFAULT_MAX_CONCURRENT_GROUPS,
            dry_run: false,
            continue_on_failure: false,
            partial_updates: false,
            match_fields: config.default_match_fields().unwrap_or_default(),
            replica_update_mode: ReplicaUpdateMode::Merge,
        }
    }
}

impl RunOptions {
    pub fn from_config(config: &SyncConfig) -> std::result::Result<Self, ConfigError> {
        Ok(Self {
            default_index: config.index_name.clone().filter(|name| !name.is_empty()),
            settings: config.settings.clone(),
            chunk_size: config.chunk_size,
            concurrent: config.concurrent_queries,
            max_concurrent_groups: config.max_concurrent_groups,
            dry_run: config.dry_run,
            continue_on_failure: config.continue_on_failure,
            partial_updates: config.enable_partial_updates,
            match_fields: config.default_match_fields()?,
            replica_update_mode: config.replica_update_mode,
        })
    }

    fn mode(&self) -> ReconcileMode {
        if self.partial_updates {
            ReconcileMode::PartialUpdate
        } else {
            ReconcileMode::FullReplace
        }
    }
}

/// Whether a run should go ahead.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RunDecision {
    Run,
    Skip(String),
}

/// Decide whether to run at all. Missing credentials are an error unless
/// `continue_on_failure` is set, in which case the run is skipped.
pub fn preflight(config: &SyncConfig, reporter: &dyn Reporter) -> Result<RunDecision> {
    if config.skip_indexing {
        let reason = "indexing is disabled by `skip_indexing`".to_string();
        reporter.status(&format!("Skipping: {}", reason));
        return Ok(RunDecision::Skip(reason));
    }

    if !config.has_credentials() {
        if config.continue_on_failure {
            let reason = "no credentials are configured".to_string();
            reporter.warn(&format!(
                "Skipping: {}; set `credentials.app_id` and `credentials.api_key` to index",
                reason
            ));
            return Ok(RunDecision::Skip(reason));
        }
        return Err(ConfigError::MissingCredentials.into());
    }

    Ok(RunDecision::Run)
}

/// What happened to one index.
#[derive(Debug, Clone, PartialEq)]
pub struct GroupOutcome {
    pub index_name: String,
    pub queries: usize,
    pub fetched: usize,
    pub indexed: usize,
    pub removed: usize,
    pub unchanged: usize,
    pub overlapping: usize,
    /// Where the existing state came from; `None` when it was not read
    pub snapshot_source: Option<SnapshotSource>,
    /// Whether the index was rebuilt through a shadow index
    pub rebuilt: bool,
    pub elapsed: Duration,
}

#[derive(Debug)]
pub struct GroupFailure {
    pub index_name: String,
    pub error: SyncError,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RunStatus {
    Completed,
    /// At least one group failed under `continue_on_failure`
    Degraded,
    Skipped,
}

#[derive(Debug)]
pub struct RunReport {
    pub started_at: DateTime<Utc>,
    pub groups: Vec<GroupOutcome>,
    pub failures: Vec<GroupFailure>,
    pub status: RunStatus,
}

impl RunReport {
    fn new(started_at: DateTime<Utc>) -> Self {
        Self {
            started_at,
            groups: Vec::new(),
            failures: Vec::new(),
            status: RunStatus::Completed,
        }
    }

    pub fn skipped() -> Self {
        Self {
            status: RunStatus::Skipped,
            ..Self::new(Utc::now())
        }
    }

    pub fn group(&self, index_name: &str) -> Option<&GroupOutcome> {
        self.groups.iter().find(|g| g.index_name == index_name)
    }
}

/// Per-group result handed back to the runner by value.
struct GroupResult {
    outcome: GroupOutcome,
    /// Fresh objects trimmed to the group's match fields
    snapshot: ObjectSnapshot,
}

/// Drives fetch, reconcile and write for every index group.
#[derive(Clone)]
pub struct SyncRunner {
    search: Arc<dyn SearchService>,
    executor: Arc<dyn QueryExecutor>,
    cache: Option<Arc<dyn ObjectCache>>,
    reporter: Arc<dyn Reporter>,
    options: RunOptions,
}

impl SyncRunner {
    pub fn new(
        search: Arc<dyn SearchService>,
        executor: Arc<dyn QueryExecutor>,
        reporter: Arc<dyn Reporter>,
        options: RunOptions,
    ) -> Self {
        Self {
            search,
            executor,
            cache: None,
            reporter,
            options,
        }
    }

    pub fn with_cache(mut self, cache: Arc<dyn ObjectCache>) -> Self {
        self.cache = Some(cache);
        self
    }

    pub fn options(&self) -> &RunOptions {
        &self.options
    }

    pub async fn run(&self, descriptors: Vec<QueryDescriptor>) -> Result<RunReport> {
        let mut report = RunReport::new(Utc::now());
        let activity = Activity::start(self.reporter.as_ref(), "index to search service");

        let groups = group_queries(descriptors, self.options.default_index.as_deref())?;
        if groups.is_empty() {
            self.reporter.warn("No queries to index");
        }
        if self.options.dry_run {
            activity.set_status("dry run; nothing will be written");
        }
        activity.set_status(&format!(
            "{} indices, {} mode",
            groups.len(),
            if self.options.partial_updates {
                "partial update"
            } else {
                "full rebuild"
            }
        ));

        if self.options.concurrent {
            self.run_concurrent(groups, &mut report).await?;
        } else {
            for group in groups {
                let index_name = group.index_name.clone();
                let result = self.run_group(group).await;
                self.absorb(index_name, result, &mut report).await?;
            }
        }

        if !report.failures.is_empty() {
            report.status = RunStatus::Degraded;
        }
        activity.end();
        Ok(report)
    }

    async fn run_concurrent(&self, groups: Vec<IndexGroup>, report: &mut RunReport) -> Result<()> {
        let semaphore = Arc::new(Semaphore::new(self.options.max_concurrent_groups.max(1)));
        let mut pending = FuturesUnordered::new();

        for group in groups {
            let runner = self.clone();
            let semaphore = semaphore.clone();
            let index_name = group.index_name.clone();

            let task = tokio::spawn(async move {
                let _permit = semaphore.acquire_owned().await.map_err(|e| SyncError::Task {
                    index: group.index_name.clone(),
                    message: e.to_string(),
                })?;
                runner.run_group(group).await
            });
            pending.push(async move { (index_name, task.await) });
        }

        // Returning early drops the remaining join handles, which detaches
        // their tasks.
        while let Some((index_name, joined)) = pending.next().await {
            let result = joined.unwrap_or_else(|e| {
                Err(SyncError::Task {
                    index: index_name.clone(),
                    message: e.to_string(),
                })
            });
            self.absorb(index_name, result, report).await?;
        }
        Ok(())
    }

    /// Fold one group's result into the report, persisting its snapshot on
    /// success. Fails only when the run should abort.
    async fn absorb(
        &self,
        index_name: String,
        result: Result<GroupResult>,
        report: &mut RunReport,
    ) -> Result<()> {
        match result {
            Ok(GroupResult { outcome, snapshot }) => {
                if !self.options.dry_run {
                    self.persist(&index_name, snapshot).await;
                }
                report.groups.push(outcome);
                Ok(())
            }
            Err(error) if self.options.continue_on_failure => {
                self.reporter
                    .fatal(&format!("Failed to index to `{}`", index_name), &error);
                report.failures.push(GroupFailure { index_name, error });
                Ok(())
            }
            Err(error) => Err(error),
        }
    }

    async fn persist(&self, index_name: &str, snapshot: ObjectSnapshot) {
        let Some(cache) = &self.cache else {
            return;
        };
        let key = objects_key(index_name);
        let value = match serde_json::to_value(&snapshot) {
            Ok(value) => value,
            Err(e) => {
                warn!("Could not encode snapshot for `{}`: {}", index_name, e);
                return;
            }
        };
        match cache.set(&key, value).await {
            Ok(()) => debug!("Cached {} objects under `{}`", snapshot.len(), key),
            Err(e) => warn!("Could not write cache entry `{}`: {:#}", key, e),
        }
    }

    async fn fetch(&self, descriptor: &QueryDescriptor, index_name: &str) -> Result<FreshResult> {
        let objects = fetch_objects(self.executor.as_ref(), descriptor, index_name).await?;
        debug!("Query returned {} objects for `{}`", objects.len(), index_name);
        Ok(FreshResult {
            objects,
            match_fields: descriptor.match_fields_or(&self.options.match_fields).to_vec(),
        })
    }

    async fn run_group(&self, group: IndexGroup) -> Result<GroupResult> {
        let index_name = group.index_name.as_str();
        let activity = Activity::start(self.reporter.as_ref(), format!("index to `{}`", index_name));
        let mode = self.options.mode();
        let group_fields = group.match_fields(&self.options.match_fields);

        activity.set_status(&format!("{} queries to index", group.queries.len()));
        let fresh = try_join_all(
            group
                .queries
                .iter()
                .map(|descriptor| self.fetch(descriptor, index_name)),
        )
        .await?;
        let fetched = fresh.iter().map(|r| r.objects.len()).sum::<usize>();

        let exists = self
            .search
            .index_exists(index_name)
            .await
            .map_err(|e| SyncError::remote(index_name, "check index", e))?;

        let existing = if mode == ReconcileMode::PartialUpdate && exists {
            let reader = ExistingStateReader::new(self.search.clone(), self.cache.clone());
            let state = reader.read(index_name, &group_fields).await?;
            activity.set_status(&format!(
                "found {} existing objects ({:?})",
                state.objects.len(),
                state.source
            ));
            Some(state)
        } else {
            None
        };
        let no_objects = ObjectSnapshot::new();
        let existing_objects = existing
            .as_ref()
            .map(|state| &state.objects)
            .unwrap_or(&no_objects);

        let plan = reconcile(index_name, existing_objects, &fresh, mode)?;
        if !plan.overlapping.is_empty() {
            self.reporter.warn(&format!(
                "{} objects of `{}` are produced by more than one query; the last query wins: {}",
                plan.overlapping.len(),
                index_name,
                plan.overlapping.iter().cloned().collect::<Vec<_>>().join(", ")
            ));
        }
        if mode == ReconcileMode::PartialUpdate {
            activity.set_status(&format!(
                "{} objects to index, {} to remove, {} unchanged",
                plan.to_index.len(),
                plan.to_remove.len(),
                plan.unchanged.len()
            ));
        }

        let writer = IndexWriter::new(
            self.search.clone(),
            self.reporter.clone(),
            self.options.chunk_size,
            self.options.dry_run,
        );

        if !exists {
            writer.initialize(index_name).await?;
        }
        let rebuilt = mode == ReconcileMode::FullReplace && exists;
        let target = if rebuilt {
            writer.prepare_shadow(index_name).await?
        } else {
            index_name.to_string()
        };

        let snapshot: ObjectSnapshot = fresh
            .iter()
            .flat_map(|r| r.objects.iter())
            .map(|(id, object)| (id.clone(), object.project(&group_fields)))
            .collect();

        let indexed = writer
            .write_objects(&target, plan.to_index.into_values().collect())
            .await?;
        let removed = writer
            .delete_objects(&target, plan.to_remove.iter().cloned().collect())
            .await?;

        let settings = match group.queries.first() {
            Some(first) => {
                plan_settings(
                    self.search.as_ref(),
                    index_name,
                    first,
                    self.options.settings.as_ref(),
                    self.options.replica_update_mode,
                    exists,
                )
                .await?
            }
            None => None,
        };
        if let Some(settings) = &settings {
            if rebuilt {
                let shadow_settings = settings.settings.clone().without_replicas();
                writer.apply_settings(&target, &shadow_settings, false).await?;
            } else {
                writer
                    .apply_settings(&target, &settings.settings, settings.forward_to_replicas)
                    .await?;
            }
        }

        if rebuilt {
            writer.promote(&target, index_name).await?;
            if let Some(replicas) = settings.as_ref().and_then(|s| s.replicas()) {
                writer
                    .apply_settings(index_name, &IndexSettings::new().with_replicas(replicas), false)
                    .await?;
            }
        }

        let elapsed = activity.end();
        info!(
            "Indexed {} objects to `{}` ({} removed)",
            indexed, index_name, removed
        );

        Ok(GroupResult {
            outcome: GroupOutcome {
                index_name: index_name.to_string(),
                queries: group.queries.len(),
                fetched,
                indexed,
                removed,
                unchanged: plan.unchanged.len(),
                overlapping: plan.overlapping.len(),
                snapshot_source: existing.map(|state| state.source),
                rebuilt,
                elapsed,
            },
            snapshot,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::search::{MemorySearchService, Operation, OperationKind};
    use crate::test_utils::{RecordingReporter, StaticQueryExecutor};
    use index_sync_config::{Credentials, FileCache, MemoryCache, ObjectRecord};
    use serde_json::{json, Value};

    const PAGES: &str = "{ pages }";
    const POSTS: &str = "{ posts }";

    fn record(value: Value) -> ObjectRecord {
        ObjectRecord::from_value(value).unwrap()
    }

    fn partial_options() -> RunOptions {
        RunOptions {
            partial_updates: true,
            match_fields: vec![FieldPath::parse("digest").unwrap()],
            ..RunOptions::default()
        }
    }

    struct Harness {
        search: Arc<MemorySearchService>,
        reporter: Arc<RecordingReporter>,
        cache: Arc<MemoryCache>,
    }

    impl Harness {
        fn new() -> Self {
            Self {
                search: Arc::new(MemorySearchService::new()),
                reporter: Arc::new(RecordingReporter::new()),
                cache: Arc::new(MemoryCache::new()),
            }
        }

        fn runner(&self, executor: StaticQueryExecutor, options: RunOptions) -> SyncRunner {
            SyncRunner::new(
                self.search.clone(),
                Arc::new(executor),
                self.reporter.clone(),
                options,
            )
            .with_cache(self.cache.clone())
        }

        async fn seed_pages(&self) {
            self.search
                .seed(
                    "pages",
                    vec![
                        record(json!({ "objectID": "1", "digest": "x", "title": "one" })),
                        record(json!({ "objectID": "3", "digest": "z", "title": "three" })),
                    ],
                    IndexSettings::new(),
                )
                .await;
        }
    }

    fn pages_executor() -> StaticQueryExecutor {
        StaticQueryExecutor::new().with_records(
            PAGES,
            vec![
                json!({ "objectID": "1", "digest": "x", "title": "one" }),
                json!({ "objectID": "2", "digest": "y", "title": "two" }),
            ],
        )
    }

    fn pages_query() -> QueryDescriptor {
        QueryDescriptor::new(PAGES).with_index_name("pages")
    }

    fn writes_to<'a>(ops: &'a [Operation], index: &str) -> Vec<&'a Operation> {
        ops.iter().filter(|op| op.index == index).collect()
    }

    #[tokio::test]
    async fn partial_update_writes_only_the_difference() {
        let harness = Harness::new();
        harness.seed_pages().await;

        let report = harness
            .runner(pages_executor(), partial_options())
            .run(vec![pages_query()])
            .await
            .unwrap();

        assert_eq!(report.status, RunStatus::Completed);
        let outcome = report.group("pages").unwrap();
        assert_eq!(outcome.indexed, 1);
        assert_eq!(outcome.removed, 1);
        assert_eq!(outcome.unchanged, 1);
        assert_eq!(outcome.snapshot_source, Some(SnapshotSource::Remote));

        let objects = harness.search.objects("pages").await.unwrap();
        assert_eq!(objects.keys().collect::<Vec<_>>(), vec!["1", "2"]);
        let saves: Vec<_> = harness
            .search
            .writes()
            .await
            .into_iter()
            .filter(|op| op.kind == OperationKind::Save)
            .collect();
        assert_eq!(saves.len(), 1);
        assert_eq!(saves[0].count, 1);
    }

    #[tokio::test]
    async fn missing_match_field_writes_nothing() {
        let harness = Harness::new();
        harness.seed_pages().await;
        let executor = StaticQueryExecutor::new().with_records(
            PAGES,
            vec![
                json!({ "objectID": "1", "digest": "x" }),
                json!({ "objectID": "2", "title": "no digest" }),
            ],
        );

        let err = harness
            .runner(executor, partial_options())
            .run(vec![pages_query()])
            .await
            .unwrap_err();

        assert!(matches!(err, SyncError::InvalidRecord { .. }));
        assert!(harness.search.writes().await.is_empty());
    }

    #[tokio::test]
    async fn second_run_is_a_noop() {
        let harness = Harness::new();
        harness.seed_pages().await;

        let runner = harness.runner(pages_executor(), partial_options());
        runner.run(vec![pages_query()]).await.unwrap();
        let writes_after_first = harness.search.writes().await.len();

        let report = runner.run(vec![pages_query()]).await.unwrap();
        let outcome = report.group("pages").unwrap();
        assert_eq!(outcome.indexed, 0);
        assert_eq!(outcome.removed, 0);
        assert_eq!(outcome.unchanged, 2);
        assert_eq!(outcome.snapshot_source, Some(SnapshotSource::Cache));
        assert_eq!(harness.search.writes().await.len(), writes_after_first);
    }

    #[tokio::test]
    async fn full_rebuild_never_writes_the_primary_before_the_move() {
        let harness = Harness::new();
        harness.seed_pages().await;
        let options = RunOptions {
            settings: Some(IndexSettings::new().with_replicas(vec!["pages_by_date".into()])),
            ..RunOptions::default()
        };

        let report = harness
            .runner(pages_executor(), options)
            .run(vec![pages_query()])
            .await
            .unwrap();
        assert!(report.group("pages").unwrap().rebuilt);

        let writes = harness.search.writes().await;
        let move_at = writes
            .iter()
            .position(|op| op.kind == OperationKind::Move)
            .unwrap();
        assert!(writes[..move_at].iter().all(|op| op.index != "pages"));
        assert_eq!(writes[move_at].source.as_deref(), Some("pages_tmp"));
        assert_eq!(writes[move_at].index, "pages");

        let after = writes_to(&writes[move_at + 1..], "pages");
        assert_eq!(after.len(), 1);
        assert_eq!(after[0].kind, OperationKind::SetSettings);

        let objects = harness.search.objects("pages").await.unwrap();
        assert_eq!(objects.keys().collect::<Vec<_>>(), vec!["1", "2"]);
        assert_eq!(
            harness.search.settings("pages").await.unwrap().replicas(),
            Some(vec!["pages_by_date".to_string()])
        );
        assert!(!harness.search.exists("pages_tmp").await);
    }

    #[tokio::test]
    async fn failed_shadow_write_leaves_the_primary_untouched() {
        let harness = Harness::new();
        harness.seed_pages().await;
        harness
            .search
            .fail_on(OperationKind::Save, "pages_tmp")
            .await;
        let before = harness.search.objects("pages").await.unwrap();

        let err = harness
            .runner(pages_executor(), RunOptions::default())
            .run(vec![pages_query()])
            .await
            .unwrap_err();

        assert!(matches!(err, SyncError::Remote { .. }));
        assert_eq!(harness.search.objects("pages").await.unwrap(), before);
        assert!(harness
            .search
            .writes()
            .await
            .iter()
            .all(|op| op.kind != OperationKind::Move));
    }

    #[tokio::test]
    async fn full_rebuild_discards_a_leftover_shadow() {
        let harness = Harness::new();
        harness
            .search
            .seed(
                "pages",
                vec![
                    record(json!({ "objectID": "1", "digest": "x" })),
                    record(json!({ "objectID": "stale", "digest": "s" })),
                ],
                IndexSettings::new(),
            )
            .await;
        harness
            .search
            .seed(
                "pages_tmp",
                vec![record(json!({ "objectID": "stale", "digest": "s" }))],
                IndexSettings::new(),
            )
            .await;
        let executor = StaticQueryExecutor::new()
            .with_records(PAGES, vec![json!({ "objectID": "1", "digest": "x" })]);

        harness
            .runner(executor, RunOptions::default())
            .run(vec![pages_query()])
            .await
            .unwrap();

        let objects = harness.search.objects("pages").await.unwrap();
        assert_eq!(objects.keys().collect::<Vec<_>>(), vec!["1"]);
        assert!(!harness.search.exists("pages_tmp").await);
    }

    #[tokio::test]
    async fn new_index_is_initialized_and_written_directly() {
        let harness = Harness::new();

        let report = harness
            .runner(pages_executor(), RunOptions::default())
            .run(vec![pages_query()])
            .await
            .unwrap();
        assert!(!report.group("pages").unwrap().rebuilt);

        let writes = harness.search.writes().await;
        assert_eq!(writes[0].kind, OperationKind::SetSettings);
        assert_eq!(writes[0].index, "pages");
        assert!(writes.iter().all(|op| op.index == "pages"));
        assert_eq!(harness.search.objects("pages").await.unwrap().len(), 2);
    }

    #[tokio::test]
    async fn settings_merge_unions_replicas() {
        let harness = Harness::new();
        harness
            .search
            .seed(
                "pages",
                vec![],
                IndexSettings::new().with_replicas(vec!["A".into(), "B".into()]),
            )
            .await;
        let query = pages_query().with_settings(
            IndexSettings::new().with_replicas(vec!["B".into(), "C".into()]),
            false,
        );

        harness
            .runner(pages_executor(), partial_options())
            .run(vec![query])
            .await
            .unwrap();

        assert_eq!(
            harness.search.settings("pages").await.unwrap().replicas(),
            Some(vec!["A".to_string(), "B".to_string(), "C".to_string()])
        );
    }

    #[tokio::test]
    async fn dry_run_computes_but_never_writes() {
        let harness = Harness::new();
        harness.seed_pages().await;
        let options = RunOptions {
            dry_run: true,
            ..partial_options()
        };

        let report = harness
            .runner(pages_executor(), options)
            .run(vec![pages_query()])
            .await
            .unwrap();

        assert_eq!(report.group("pages").unwrap().indexed, 1);
        assert!(harness.search.writes().await.is_empty());
        assert!(harness.reporter.has_status("[dry run] would save 1 objects to `pages`"));
        assert!(harness.reporter.has_status("[dry run] would delete 1 objects from `pages`"));
        assert_eq!(harness.cache.len().await, 0);
    }

    #[tokio::test]
    async fn continue_on_failure_degrades_the_run() {
        let harness = Harness::new();
        let executor = pages_executor().with_error(POSTS, "posts source is down");
        let options = RunOptions {
            continue_on_failure: true,
            ..RunOptions::default()
        };

        let report = harness
            .runner(executor, options)
            .run(vec![
                QueryDescriptor::new(POSTS).with_index_name("posts"),
                pages_query(),
            ])
            .await
            .unwrap();

        assert_eq!(report.status, RunStatus::Degraded);
        assert_eq!(report.failures.len(), 1);
        assert_eq!(report.failures[0].index_name, "posts");
        assert!(report.group("pages").is_some());
        assert_eq!(harness.reporter.fatals().len(), 1);
        assert!(harness.reporter.fatals()[0].contains("posts source is down"));
    }

    #[tokio::test]
    async fn first_failure_aborts_without_continue_on_failure() {
        let harness = Harness::new();
        let executor = pages_executor().with_error(POSTS, "posts source is down");
        let options = RunOptions {
            concurrent: false,
            ..RunOptions::default()
        };

        let err = harness
            .runner(executor, options)
            .run(vec![
                QueryDescriptor::new(POSTS).with_index_name("posts"),
                pages_query(),
            ])
            .await
            .unwrap_err();

        assert_eq!(err.index(), Some("posts"));
        assert!(!harness.search.exists("pages").await);
    }

    #[tokio::test]
    async fn overlapping_queries_warn() {
        let harness = Harness::new();
        let executor = pages_executor().with_records(
            POSTS,
            vec![json!({ "objectID": "2", "digest": "y2", "title": "two again" })],
        );

        let report = harness
            .runner(executor, RunOptions::default())
            .run(vec![pages_query(), QueryDescriptor::new(POSTS).with_index_name("pages")])
            .await
            .unwrap();

        assert_eq!(report.groups.len(), 1);
        assert_eq!(report.group("pages").unwrap().overlapping, 1);
        assert_eq!(harness.reporter.warnings().len(), 1);
        let objects = harness.search.objects("pages").await.unwrap();
        assert_eq!(objects["2"].get("title"), Some(&json!("two again")));
    }

    #[tokio::test]
    async fn snapshot_is_cached_after_success() {
        let harness = Harness::new();

        harness
            .runner(pages_executor(), partial_options())
            .run(vec![pages_query()])
            .await
            .unwrap();

        let cached = harness
            .cache
            .get(&objects_key("pages"))
            .await
            .unwrap()
            .unwrap();
        assert_eq!(
            cached,
            json!({ "1": { "digest": "x" }, "2": { "digest": "y" } })
        );
    }

    #[tokio::test]
    async fn file_cache_carries_state_between_runs() {
        let dir = tempfile::tempdir().unwrap();
        let search = Arc::new(MemorySearchService::new());
        let reporter = Arc::new(RecordingReporter::new());
        let runner = || {
            SyncRunner::new(
                search.clone(),
                Arc::new(pages_executor()),
                reporter.clone(),
                partial_options(),
            )
            .with_cache(Arc::new(FileCache::new(dir.path())))
        };

        let first = runner().run(vec![pages_query()]).await.unwrap();
        assert_eq!(first.group("pages").unwrap().snapshot_source, None);

        let second = runner().run(vec![pages_query()]).await.unwrap();
        let outcome = second.group("pages").unwrap();
        assert_eq!(outcome.snapshot_source, Some(SnapshotSource::Cache));
        assert_eq!(outcome.indexed, 0);
        assert!(dir.path().join("objects-pages.json").exists());
    }

    #[test]
    fn preflight_honours_skip_and_credentials() {
        let reporter = RecordingReporter::new();

        let config = SyncConfig {
            skip_indexing: true,
            ..SyncConfig::default()
        };
        assert!(matches!(
            preflight(&config, &reporter).unwrap(),
            RunDecision::Skip(_)
        ));

        let config = SyncConfig::default();
        assert!(matches!(
            preflight(&config, &reporter),
            Err(SyncError::Config(ConfigError::MissingCredentials))
        ));

        let config = SyncConfig {
            continue_on_failure: true,
            ..SyncConfig::default()
        };
        assert!(matches!(
            preflight(&config, &reporter).unwrap(),
            RunDecision::Skip(_)
        ));
        assert_eq!(reporter.warnings().len(), 1);

        let config = SyncConfig {
            credentials: Some(Credentials::new("app", "key")),
            ..SyncConfig::default()
        };
        assert_eq!(preflight(&config, &reporter).unwrap(), RunDecision::Run);
    }

    #[test]
    fn options_follow_the_config() {
        let config = SyncConfig {
            index_name: Some("pages".into()),
            enable_partial_updates: true,
            concurrent_queries: false,
            match_fields: vec!["modified".into()],
            ..SyncConfig::default()
        };
        let options = RunOptions::from_config(&config).unwrap();
        assert_eq!(options.default_index.as_deref(), Some("pages"));
        assert!(options.partial_updates);
        assert!(!options.concurrent);
        assert_eq!(options.match_fields[0].to_string(), "modified");
    }
}
