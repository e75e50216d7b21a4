// Cache path utilities.
// Resolves the storage root and the per-key entry paths beneath it.

use std::path::{Path, PathBuf};

use directories::{BaseDirs, ProjectDirs};

use crate::fingerprint::CacheKey;

/// Default name of the storage root directory.
pub const DEFAULT_DIR_NAME: &str = ".ditto";

/// Default project marker.
pub const DEFAULT_MARKER: &str = "Cargo.toml";

/// Extension of stored entries.
pub const ENTRY_EXTENSION: &str = "json";

/// Per-user cache directory (~/.cache/ditto on Linux).
pub fn user_cache_dir() -> Option<PathBuf> {
    ProjectDirs::from("", "", "ditto").map(|dirs| dirs.cache_dir().to_path_buf())
}

/// The user's home directory, which bounds the upward project search.
pub fn home_dir() -> Option<PathBuf> {
    BaseDirs::new().map(|dirs| dirs.home_dir().to_path_buf())
}

/// Find the nearest ancestor of the current working directory holding one of
/// `markers`.
pub fn find_project_dir(markers: &[String]) -> Option<PathBuf> {
    let cwd = std::env::current_dir().ok()?;
    find_project_dir_from(&cwd, home_dir().as_deref(), markers)
}

/// Walk upward from `start` looking for a directory containing any of
/// `markers`. The search stops without a result on reaching `home` (which is
/// not itself checked) or the filesystem root.
pub fn find_project_dir_from(
    start: &Path,
    home: Option<&Path>,
    markers: &[String],
) -> Option<PathBuf> {
    let mut dir = Some(start);
    while let Some(current) = dir {
        if home == Some(current) {
            return None;
        }
        if markers.iter().any(|m| current.join(m).is_file()) {
            return Some(current.to_path_buf());
        }
        dir = current.parent();
    }
    None
}

/// Default storage root: `.ditto` in the nearest project directory above the
/// working directory. None means caching is unavailable.
pub fn locate_root() -> Option<PathBuf> {
    locate_root_with(&[DEFAULT_MARKER.to_string()], DEFAULT_DIR_NAME)
}

/// Storage root named `dir_name` in the nearest project directory identified
/// by `markers`.
pub fn locate_root_with(markers: &[String], dir_name: &str) -> Option<PathBuf> {
    find_project_dir(markers).map(|dir| dir.join(dir_name))
}

/// Path of the entry file for `key` under `root`.
pub fn entry_path(root: &Path, key: &CacheKey) -> PathBuf {
    root.join(format!("{}.{}", key, ENTRY_EXTENSION))
}
