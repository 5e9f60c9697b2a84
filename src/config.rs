use std::ffi::OsString;
use std::path::{Path, PathBuf};

use directories::BaseDirs;

/// Overrides the default cache directory when set to a non-empty value.
pub const CACHE_DIR_ENV: &str = "WAVEWATCH3_CACHE_DIR";

/// `$WAVEWATCH3_CACHE_DIR`, else `~/.wavewatch3/data`.
pub fn default_cache_dir() -> PathBuf {
    cache_dir_from(std::env::var_os(CACHE_DIR_ENV))
}

fn cache_dir_from(var: Option<OsString>) -> PathBuf {
    match var.filter(|v| !v.is_empty()) {
        Some(dir) => expand_tilde(Path::new(&dir)),
        None => BaseDirs::new()
            .map(|dirs| dirs.home_dir().join(".wavewatch3").join("data"))
            .unwrap_or_else(|| PathBuf::from(".wavewatch3").join("data")),
    }
}

/// Replace a leading `~` with the home directory.
pub fn expand_tilde(path: &Path) -> PathBuf {
    let Ok(rest) = path.strip_prefix("~") else {
        return path.to_path_buf();
    };
    match BaseDirs::new() {
        Some(dirs) => dirs.home_dir().join(rest),
        None => path.to_path_buf(),
    }
}

/// Worker threads used for batch downloads.
pub fn default_workers() -> usize {
    std::thread::available_parallelism()
        .map(|n| n.get())
        .unwrap_or(4)
}
