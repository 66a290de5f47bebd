//! `index-sync` command line.
//!
//! Loads a TOML configuration, runs every configured query and reconciles
//! the results into the configured search indices.
//!
//! ```bash
//! INDEX_SYNC_API_KEY=... index-sync --config index-sync.toml --partial-updates
//! ```

use anyhow::{Context, Result};
use clap::Parser;
use index_sync_config::{FileCache, ObjectCache, SyncConfig};
use index_sync_core::search::AlgoliaClient;
use index_sync_core::source::GraphqlClient;
use index_sync_core::sync::{
    preflight, QueryDescriptor, RunDecision, RunOptions, RunReport, RunStatus, SyncRunner,
};
use index_sync_core::TracingReporter;
use std::path::PathBuf;
use std::sync::Arc;
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

/// Sync query results into remote search indices
#[derive(Parser, Debug)]
#[command(name = "index-sync", version)]
struct Args {
    /// Configuration file
    #[arg(long, short, default_value = "index-sync.toml", env = "INDEX_SYNC_CONFIG")]
    config: PathBuf,

    /// Compute and report changes without writing anything
    #[arg(long)]
    dry_run: bool,

    /// Process indices one after the other
    #[arg(long)]
    sequential: bool,

    /// Report failed indices and keep going
    #[arg(long)]
    continue_on_failure: bool,

    /// Only write changed objects and delete stale ones
    #[arg(long)]
    partial_updates: bool,

    /// Always read existing objects from the search service
    #[arg(long)]
    no_cache: bool,

    /// Snapshot cache directory
    #[arg(long, env = "INDEX_SYNC_CACHE_DIR")]
    cache_dir: Option<PathBuf>,

    /// Debug logging
    #[arg(long, short)]
    verbose: bool,
}

impl Args {
    fn apply(&self, config: &mut SyncConfig) {
        if self.dry_run {
            config.dry_run = true;
        }
        if self.sequential {
            config.concurrent_queries = false;
        }
        if self.continue_on_failure {
            config.continue_on_failure = true;
        }
        if self.partial_updates {
            config.enable_partial_updates = true;
        }
        if self.no_cache {
            config.cache.enabled = false;
        }
        if let Some(dir) = &self.cache_dir {
            config.cache.dir = Some(dir.clone());
        }
    }
}

fn init_tracing(verbose: bool) {
    let default = if verbose { "debug" } else { "info" };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default));
    tracing_subscriber::fmt().with_env_filter(filter).init();
}

fn open_cache(config: &SyncConfig) -> Result<Option<Arc<dyn ObjectCache>>> {
    if !config.cache.enabled {
        return Ok(None);
    }
    let cache = match &config.cache.dir {
        Some(dir) => FileCache::new(dir),
        None => FileCache::default_location()?,
    };
    info!("Using snapshot cache at {}", cache.dir().display());
    Ok(Some(Arc::new(cache)))
}

fn print_summary(report: &RunReport) {
    for group in &report.groups {
        println!(
            "{:<24} {:>6} fetched {:>6} indexed {:>6} removed {:>6} unchanged {:>8.2}s{}",
            group.index_name,
            group.fetched,
            group.indexed,
            group.removed,
            group.unchanged,
            group.elapsed.as_secs_f64(),
            if group.rebuilt { "  (rebuilt)" } else { "" }
        );
    }
    for failure in &report.failures {
        println!("{:<24} failed: {}", failure.index_name, failure.error);
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();
    init_tracing(args.verbose);

    let mut config = SyncConfig::load(&args.config)
        .with_context(|| format!("Failed to load {}", args.config.display()))?;
    args.apply(&mut config);
    config.validate()?;

    let reporter = Arc::new(TracingReporter);
    if let RunDecision::Skip(reason) = preflight(&config, reporter.as_ref())? {
        info!("Nothing indexed: {}", reason);
        return Ok(());
    }

    let credentials = config
        .credentials
        .clone()
        .context("Credentials are required to index")?;
    let search = AlgoliaClient::new(&credentials, &config.client)?;
    let executor = GraphqlClient::from_config(&config.source)?;
    let descriptors = QueryDescriptor::all_from_config(&config)?;
    let options = RunOptions::from_config(&config)?;

    info!(
        queries = descriptors.len(),
        dry_run = options.dry_run,
        partial_updates = options.partial_updates,
        "Starting index sync"
    );

    let mut runner = SyncRunner::new(Arc::new(search), Arc::new(executor), reporter, options);
    if let Some(cache) = open_cache(&config)? {
        runner = runner.with_cache(cache);
    }

    let report = runner.run(descriptors).await?;
    print_summary(&report);

    match report.status {
        RunStatus::Degraded => warn!(
            "{} of {} indices failed",
            report.failures.len(),
            report.failures.len() + report.groups.len()
        ),
        RunStatus::Completed | RunStatus::Skipped => info!(
            "Index sync started at {} finished for {} indices",
            report.started_at.to_rfc3339(),
            report.groups.len()
        ),
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn flags_override_the_config() {
        let args = Args::parse_from([
            "index-sync",
            "--dry-run",
            "--sequential",
            "--partial-updates",
            "--no-cache",
            "--cache-dir",
            "/tmp/index-sync",
        ]);
        let mut config = SyncConfig::default();
        args.apply(&mut config);

        assert!(config.dry_run);
        assert!(!config.concurrent_queries);
        assert!(config.enable_partial_updates);
        assert!(!config.continue_on_failure);
        assert!(!config.cache.enabled);
        assert_eq!(config.cache.dir, Some(PathBuf::from("/tmp/index-sync")));
    }

    #[test]
    fn disabled_cache_opens_nothing() {
        let mut config = SyncConfig::default();
        config.cache.enabled = false;
        assert!(open_cache(&config).unwrap().is_none());
    }
}
