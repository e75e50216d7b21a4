// Cache configuration.
// Decides where the storage root lives and how corrupt entries are handled.

use std::path::PathBuf;

use serde::{Deserialize, Serialize};

use crate::cache::paths::{self, DEFAULT_DIR_NAME, DEFAULT_MARKER};
use crate::cache::CacheStore;
use crate::error::{DittoError, Result};

/// Where the storage root is anchored.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum RootAnchor {
    /// Nearest ancestor of the working directory containing a marker file.
    #[default]
    Project,
    /// The working directory itself.
    WorkingDir,
    /// The per-user cache directory.
    UserCache,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct CacheConfig {
    /// Name of the root directory created under the anchor.
    pub dir_name: String,
    /// Marker files identifying a project directory.
    pub markers: Vec<String>,
    pub anchor: RootAnchor,
    /// Explicit root; skips discovery entirely.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub root: Option<PathBuf>,
    /// Delete entries that fail to decode.
    pub purge_corrupt: bool,
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            dir_name: DEFAULT_DIR_NAME.to_string(),
            markers: vec![DEFAULT_MARKER.to_string()],
            anchor: RootAnchor::default(),
            root: None,
            purge_corrupt: true,
        }
    }
}

impl CacheConfig {
    /// Config with a fixed root directory.
    pub fn with_root(root: impl Into<PathBuf>) -> Self {
        Self {
            root: Some(root.into()),
            ..Self::default()
        }
    }

    /// Resolve the storage root.
    ///
    /// The user cache anchor already names a ditto-specific directory, so
    /// `dir_name` is not appended to it.
    pub fn resolve_root(&self) -> Result<PathBuf> {
        if let Some(root) = &self.root {
            return Ok(root.clone());
        }

        let cwd = std::env::current_dir()?;
        let anchor = match self.anchor {
            RootAnchor::Project => paths::locate_root_with(&self.markers, &self.dir_name),
            RootAnchor::WorkingDir => Some(cwd.join(&self.dir_name)),
            RootAnchor::UserCache => paths::user_cache_dir(),
        };

        anchor.ok_or(DittoError::RootNotFound(cwd))
    }

    /// Resolve the root and open a store there.
    pub fn open_store(&self) -> Result<CacheStore> {
        self.resolve_root().map(CacheStore::new)
    }
}
