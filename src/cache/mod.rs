// Cache module for on-disk response snapshots.
// Owns root discovery and the file layout under the storage root.

pub mod paths;
pub mod store;

pub use paths::{
    DEFAULT_DIR_NAME, DEFAULT_MARKER, find_project_dir, find_project_dir_from, locate_root,
    locate_root_with,
};
pub use store::{CacheStore, CachedSnapshot};
