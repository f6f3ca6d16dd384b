//! The batch driver: find what's missing, fetch it, write it, move on.

use std::path::{Path, PathBuf};
use std::time::Duration;

use tracing::{error, info, warn};

use crate::catalog::{Catalog, CatalogEntry};
use crate::constants::DEFAULT_COOLDOWN_SECS;
use crate::error::PipelineError;
use crate::naming::NamingScheme;
use crate::persist::{PersistOutcome, Persister};
use crate::retry::RetryPolicy;
use crate::source::{ArtifactSource, Fetched};

/// Entries whose target path doesn't exist yet, in catalog order.
pub fn resolve_remaining<'a, F>(catalog: &'a Catalog, target_path: F) -> Vec<&'a CatalogEntry>
where
    F: Fn(&CatalogEntry) -> PathBuf,
{
    catalog
        .entries()
        .iter()
        .filter(|entry| !target_path(entry).exists())
        .collect()
}

/// What happened to one entry.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum FetchOutcome {
    /// Image written to the target path
    Success,
    /// The remote had nothing for this entry
    NotFound,
    /// Found, but couldn't be downloaded or written
    DownloadFailed,
    /// The search or generation call failed after all retries
    FetchFailed,
}

/// Per-entry record kept for the summary.
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct FetchResult {
    /// Catalog name
    pub name: String,
    /// Outcome
    pub outcome: FetchOutcome,
    /// Bytes written on success
    pub bytes_written: Option<u64>,
    /// Why it didn't succeed
    pub reason: Option<String>,
}

impl FetchResult {
    fn failed(entry: &CatalogEntry, outcome: FetchOutcome, reason: String) -> Self {
        Self {
            name: entry.name.clone(),
            outcome,
            bytes_written: None,
            reason: Some(reason),
        }
    }
}

/// Knobs for a batch run.
#[derive(Clone, Debug)]
pub struct BatchOptions {
    /// Process at most this many remaining entries
    pub batch_size: Option<usize>,
    /// Pause between entries, whatever the outcome
    pub cooldown: Duration,
    /// Retry policy for remote calls
    pub retry: RetryPolicy,
}

impl Default for BatchOptions {
    fn default() -> Self {
        Self {
            batch_size: None,
            cooldown: Duration::from_secs(DEFAULT_COOLDOWN_SECS),
            retry: RetryPolicy::default(),
        }
    }
}

/// Counts reported at the end of a run.
#[derive(Clone, Debug, Default, Eq, PartialEq)]
pub struct BatchSummary {
    /// Written this run
    pub succeeded: usize,
    /// The remote had nothing
    pub not_found: usize,
    /// Remote or download failures
    pub failed: usize,
    /// Already on disk before the run
    pub skipped: usize,
    /// Still missing and not attempted because of the batch size
    pub deferred: usize,
    /// Per-entry details, in processing order
    pub results: Vec<FetchResult>,
}

impl BatchSummary {
    fn record(&mut self, result: FetchResult) {
        match result.outcome {
            FetchOutcome::Success => self.succeeded += 1,
            FetchOutcome::NotFound => self.not_found += 1,
            FetchOutcome::DownloadFailed | FetchOutcome::FetchFailed => self.failed += 1,
        }
        self.results.push(result);
    }

    /// Writes the summary to the log.
    pub fn log(&self) {
        info!("{}", "=".repeat(60));
        info!("Succeeded: {}", self.succeeded);
        info!("Not found: {}", self.not_found);
        info!("Failed: {}", self.failed);
        info!("Skipped (already exists): {}", self.skipped);
        if self.deferred > 0 {
            info!("Remaining for a later batch: {}", self.deferred);
        }
        info!("{}", "=".repeat(60));
    }
}

/// Presence of one entry's target file.
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct EntryStatus {
    /// Catalog name
    pub name: String,
    /// Target path
    pub path: PathBuf,
    /// Whether the target exists
    pub present: bool,
}

/// Target presence for every entry, without touching the network.
pub fn status(catalog: &Catalog, naming: &NamingScheme, out_dir: &Path) -> Vec<EntryStatus> {
    catalog
        .entries()
        .iter()
        .map(|entry| {
            let path = naming.target_path(out_dir, &entry.name);
            let present = path.exists();
            EntryStatus {
                name: entry.name.clone(),
                path,
                present,
            }
        })
        .collect()
}

/// Drives a catalog through a source and into the output directory, one entry at a time.
#[derive(Debug)]
pub struct Pipeline<S> {
    source: S,
    persister: Persister,
    naming: NamingScheme,
    out_dir: PathBuf,
    options: BatchOptions,
}

impl<S: ArtifactSource> Pipeline<S> {
    /// Wires a pipeline together.
    pub fn new(
        source: S,
        persister: Persister,
        naming: NamingScheme,
        out_dir: impl Into<PathBuf>,
        options: BatchOptions,
    ) -> Self {
        Self {
            source,
            persister,
            naming,
            out_dir: out_dir.into(),
            options,
        }
    }

    /// Where an entry's image goes.
    pub fn target_path(&self, entry: &CatalogEntry) -> PathBuf {
        self.naming.target_path(&self.out_dir, &entry.name)
    }

    /// Fetches and writes one entry. Never fails, the outcome says what happened.
    pub async fn process_entry(&self, entry: &CatalogEntry) -> FetchResult {
        let target = self.target_path(entry);
        let fetched = match self
            .source
            .fetch_artifact(entry, &self.options.retry)
            .await
        {
            Ok(fetched) => fetched,
            Err(err) => {
                error!("{}: {} failed: {err}", entry.name, self.source.name());
                return FetchResult::failed(entry, FetchOutcome::FetchFailed, err.to_string());
            }
        };

        let artifact = match fetched {
            Fetched::Found(artifact) => artifact,
            Fetched::NotFound(reason) => {
                warn!("{}: no image found ({reason})", entry.name);
                return FetchResult::failed(entry, FetchOutcome::NotFound, reason);
            }
        };

        match self.persister.persist(&artifact, &target).await {
            PersistOutcome::Success(bytes) => {
                info!("{}: saved {} ({bytes} bytes)", entry.name, target.display());
                FetchResult {
                    name: entry.name.clone(),
                    outcome: FetchOutcome::Success,
                    bytes_written: Some(bytes),
                    reason: None,
                }
            }
            PersistOutcome::DownloadFailed(reason) => {
                error!("{}: download failed: {reason}", entry.name);
                FetchResult::failed(entry, FetchOutcome::DownloadFailed, reason)
            }
        }
    }

    /// Runs one batch over the catalog.
    ///
    /// Only setup problems (eg an output directory that can't be created) are
    /// returned as errors; per-entry failures end up in the summary.
    pub async fn run(&self, catalog: &Catalog) -> Result<BatchSummary, PipelineError> {
        std::fs::create_dir_all(&self.out_dir)?;

        for (file, names) in catalog.collisions(&self.naming) {
            warn!("{} entries share the file name {file}: {names:?}", names.len());
        }

        let remaining = resolve_remaining(catalog, |entry| self.target_path(entry));
        let mut summary = BatchSummary {
            skipped: catalog.len() - remaining.len(),
            ..BatchSummary::default()
        };
        if remaining.is_empty() {
            info!("All {} images already present", catalog.len());
            return Ok(summary);
        }

        let batch_len = self
            .options
            .batch_size
            .map_or(remaining.len(), |size| size.min(remaining.len()));
        summary.deferred = remaining.len() - batch_len;
        info!(
            "Processing {batch_len} of {} remaining entries with {}",
            remaining.len(),
            self.source.name()
        );

        for (index, entry) in remaining.iter().take(batch_len).enumerate() {
            if index > 0 {
                tokio::time::sleep(self.options.cooldown).await;
            }
            info!("[{}/{batch_len}] {}", index + 1, entry.name);
            let result = self.process_entry(entry).await;
            summary.record(result);
        }

        Ok(summary)
    }
}
