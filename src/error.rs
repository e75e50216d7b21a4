// Error types for ditto.
// Covers transport failures, cache root resolution, and cache store I/O.

use std::path::PathBuf;

use thiserror::Error;

#[derive(Error, Debug)]
pub enum DittoError {
    #[error("HTTP request failed: {0}")]
    Network(#[from] reqwest::Error),

    #[error("No cache root found above {0}")]
    RootNotFound(PathBuf),

    #[error("Corrupt cache entry {path}: {reason}")]
    CorruptCache { path: PathBuf, reason: String },

    #[error("Failed to write cache entry {path}: {source}")]
    StoreWriteFailed {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Invalid response: {0}")]
    Http(#[from] http::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Cache task failed: {0}")]
    Task(String),

    #[error("{0}")]
    Other(String),
}

pub type Result<T> = std::result::Result<T, DittoError>;
