use std::fs;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::thread;

use serde::Serialize;
use tracing::{info, warn};

use crate::client::{Fetcher, url_file_part};
use crate::config::default_workers;
use crate::error::Result;
use crate::sources::SourceDescriptor;
use crate::url_builder::UrlResolver;

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "status", rename_all = "lowercase")]
pub enum FetchStatus {
    Downloaded { bytes: u64 },
    Cached,
    Failed { reason: String },
}

/// What happened to one file of a batch.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct FetchOutcome {
    pub remote: String,
    pub local: PathBuf,
    #[serde(flatten)]
    pub status: FetchStatus,
}

impl FetchOutcome {
    pub fn is_success(&self) -> bool {
        !matches!(self.status, FetchStatus::Failed { .. })
    }

    pub fn message(&self) -> String {
        match &self.status {
            FetchStatus::Downloaded { bytes } => format!("downloaded {bytes} bytes"),
            FetchStatus::Cached => "cached".to_string(),
            FetchStatus::Failed { reason } => reason.clone(),
        }
    }
}

/// Receives each outcome as soon as its fetch finishes. Called from worker threads.
pub trait ProgressSink: Sync {
    fn event(&self, outcome: &FetchOutcome);
}

pub struct SilentProgress;

impl ProgressSink for SilentProgress {
    fn event(&self, _outcome: &FetchOutcome) {}
}

/// Reports outcomes through `tracing`.
pub struct LogProgress;

impl ProgressSink for LogProgress {
    fn event(&self, outcome: &FetchOutcome) {
        if outcome.is_success() {
            info!(path = %outcome.local.display(), "{}", outcome.message());
        } else {
            warn!(url = %outcome.remote, "{}", outcome.message());
        }
    }
}

#[derive(Debug, Clone)]
pub struct BatchOptions {
    pub force: bool,
    pub workers: usize,
}

impl Default for BatchOptions {
    fn default() -> Self {
        Self {
            force: false,
            workers: default_workers(),
        }
    }
}

/// Fetch every url into `dest` on a pool of worker threads.
///
/// A failed fetch is reported in its outcome and does not stop the others.
/// Outcomes are returned in the order of `urls`.
pub fn fetch_all(
    fetcher: &dyn Fetcher,
    urls: &[String],
    dest: &Path,
    opts: &BatchOptions,
    sink: &dyn ProgressSink,
) -> Result<Vec<FetchOutcome>> {
    fs::create_dir_all(dest)?;

    let next = AtomicUsize::new(0);
    let workers = opts.workers.clamp(1, urls.len().max(1));

    let mut indexed: Vec<(usize, FetchOutcome)> = thread::scope(|scope| {
        let next = &next;
        let mut handles = Vec::with_capacity(workers);
        for _ in 0..workers {
            handles.push(scope.spawn(move || {
                let mut done = Vec::new();
                loop {
                    let i = next.fetch_add(1, Ordering::Relaxed);
                    let Some(url) = urls.get(i) else {
                        break;
                    };
                    let outcome = fetch_one(fetcher, url, dest, opts.force);
                    sink.event(&outcome);
                    done.push((i, outcome));
                }
                done
            }));
        }
        handles
            .into_iter()
            .flat_map(|h| h.join().unwrap_or_else(|panic| std::panic::resume_unwind(panic)))
            .collect()
    });

    indexed.sort_by_key(|(i, _)| *i);
    Ok(indexed.into_iter().map(|(_, outcome)| outcome).collect())
}

fn fetch_one(fetcher: &dyn Fetcher, url: &str, dest: &Path, force: bool) -> FetchOutcome {
    let failed = |local: PathBuf, reason: String| FetchOutcome {
        remote: url.to_string(),
        local,
        status: FetchStatus::Failed { reason },
    };

    let local = match url_file_part(url) {
        Ok(name) => dest.join(name),
        Err(err) => return failed(dest.to_path_buf(), err.to_string()),
    };

    match fetcher.retrieve(url, &local, force) {
        Ok(retrieved) => FetchOutcome {
            remote: url.to_string(),
            local: std::path::absolute(&retrieved.path).unwrap_or(retrieved.path),
            status: match retrieved.bytes {
                Some(bytes) => FetchStatus::Downloaded { bytes },
                None => FetchStatus::Cached,
            },
        },
        Err(err) => failed(local, err.to_string()),
    }
}

/// Validate every (date, quantity) pair for `source` before anything is fetched.
/// An empty `quantities` selects all of the source's quantities; an empty
/// `dates` yields no resolvers once the grid and quantities are valid.
pub fn resolve_all(
    source: &'static SourceDescriptor,
    dates: &[String],
    grid: Option<&str>,
    quantities: &[String],
) -> Result<Vec<UrlResolver>> {
    // Grid and quantities are checked even when there are no dates.
    let grid = source.grid_or_default(grid)?;
    let quantities: Vec<&str> = if quantities.is_empty() {
        let mut all = source.quantities.to_vec();
        all.sort_unstable();
        all
    } else {
        quantities
            .iter()
            .map(|q| source.quantity(q).map(|q| q.as_str()))
            .collect::<Result<_>>()?
    };

    let mut resolvers = Vec::with_capacity(dates.len() * quantities.len());
    for date in dates {
        for quantity in &quantities {
            resolvers.push(UrlResolver::new(source, date, quantity, Some(grid.as_str()))?);
        }
    }
    Ok(resolvers)
}

/// Fetch the files behind `resolvers`; outcomes are sorted by local path.
pub fn fetch_resolvers(
    fetcher: &dyn Fetcher,
    resolvers: &[UrlResolver],
    dest: &Path,
    opts: &BatchOptions,
    sink: &dyn ProgressSink,
) -> Result<Vec<FetchOutcome>> {
    let mut urls: Vec<String> = resolvers.iter().map(UrlResolver::to_string).collect();
    urls.sort();
    urls.dedup();
    let mut outcomes = fetch_all(fetcher, &urls, dest, opts, sink)?;
    outcomes.sort_by(|a, b| a.local.cmp(&b.local));
    Ok(outcomes)
}
