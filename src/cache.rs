use std::fs;
use std::io;
use std::path::{Path, PathBuf};
use std::sync::OnceLock;

use regex::Regex;
use serde::Serialize;
use tracing::{debug, info};

use crate::error::Result;

/// A local directory holding downloaded archive files.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CacheDir {
    root: PathBuf,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct CacheEntry {
    pub path: PathBuf,
    pub size: u64,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct CleanReport {
    pub files: Vec<CacheEntry>,
    pub total_bytes: u64,
}

impl CacheDir {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Archive files (and their decompressed or index companions) directly
    /// under the root, sorted by path. Anything else is left alone.
    pub fn entries(&self) -> Result<Vec<CacheEntry>> {
        let dir = match fs::read_dir(&self.root) {
            Ok(dir) => dir,
            Err(e) if e.kind() == io::ErrorKind::NotFound => return Ok(Vec::new()),
            Err(e) => return Err(e.into()),
        };

        let mut entries = Vec::new();
        for entry in dir {
            let entry = entry?;
            let meta = entry.metadata()?;
            if !meta.is_file() {
                continue;
            }
            let name = entry.file_name();
            if name.to_str().is_some_and(is_archive_file) {
                entries.push(CacheEntry {
                    path: entry.path(),
                    size: meta.len(),
                });
            }
        }
        entries.sort_by(|a, b| a.path.cmp(&b.path));
        Ok(entries)
    }

    /// Remove every cached archive file. With `dry_run` nothing is deleted,
    /// but the report lists what would have been.
    pub fn clean(&self, dry_run: bool) -> Result<CleanReport> {
        let files = self.entries()?;
        let total_bytes = files.iter().map(|e| e.size).sum();

        if !dry_run {
            for entry in &files {
                debug!(path = %entry.path.display(), "removing");
                fs::remove_file(&entry.path)?;
            }
            info!(
                dir = %self.root.display(),
                files = files.len(),
                bytes = total_bytes,
                "cache cleaned"
            );
        }

        Ok(CleanReport { files, total_bytes })
    }
}

fn is_archive_file(name: &str) -> bool {
    static PATTERNS: OnceLock<[Regex; 2]> = OnceLock::new();
    let patterns = PATTERNS.get_or_init(|| {
        [
            // multi_1.glo_30m.hs.201005.grb2, multi_reanal...grb2.gz, *.idx
            Regex::new(r"^multi_\w+\.\w+\.\w+\.\d{6}\.grb2(?:\.gz|\..+\.idx)?$")
                .unwrap_or_else(|e| unreachable!("{e}")),
            // nww3.hs.200001.grb
            Regex::new(r"^\w+\.\w+\.\d{6}\.grb(?:\..+\.idx)?$")
                .unwrap_or_else(|e| unreachable!("{e}")),
        ]
    });
    patterns.iter().any(|re| re.is_match(name))
}
