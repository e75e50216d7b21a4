// Cache store for reading and writing response snapshots.
// Handles JSON serialization, body encoding, and atomic filesystem writes.

use std::fs;
use std::io::{self, Write};
use std::path::{Path, PathBuf};

use bytes::Bytes;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::error::{DittoError, Result};
use crate::fingerprint::CacheKey;

use super::paths::{ENTRY_EXTENSION, entry_path};

/// One persisted response: status, headers, and the fully drained body.
#[derive(Debug, Clone, PartialEq)]
pub struct CachedSnapshot {
    /// Numeric status code.
    pub status: u16,
    /// Status line such as "200 OK", if known.
    pub status_line: Option<String>,
    /// Header names with their raw values, in the order first seen.
    pub headers: Vec<(String, Vec<Bytes>)>,
    /// Raw body bytes.
    pub body: Bytes,
    /// Request method, kept for debugging only.
    pub method: Option<String>,
    /// Request URL, kept for debugging only.
    pub url: Option<String>,
    /// When the snapshot was taken.
    pub cached_at: DateTime<Utc>,
}

impl CachedSnapshot {
    /// Create a snapshot with no headers or request metadata.
    pub fn new(status: u16, body: impl Into<Bytes>) -> Self {
        Self {
            status,
            status_line: None,
            headers: Vec::new(),
            body: body.into(),
            method: None,
            url: None,
            cached_at: Utc::now(),
        }
    }

    /// Append a header value, grouping it with earlier values of the same
    /// name (compared case-insensitively).
    pub fn push_header(&mut self, name: &str, value: impl Into<Bytes>) {
        match self
            .headers
            .iter_mut()
            .find(|(existing, _)| existing.eq_ignore_ascii_case(name))
        {
            Some((_, values)) => values.push(value.into()),
            None => self
                .headers
                .push((name.to_ascii_lowercase(), vec![value.into()])),
        }
    }

    /// All values stored for a header name (case-insensitive).
    pub fn header(&self, name: &str) -> &[Bytes] {
        self.headers
            .iter()
            .find(|(existing, _)| existing.eq_ignore_ascii_case(name))
            .map(|(_, values)| values.as_slice())
            .unwrap_or(&[])
    }
}

/// Body as written to disk: readable text when possible, hex otherwise.
#[derive(Debug, Serialize, Deserialize)]
#[serde(tag = "encoding", content = "data", rename_all = "lowercase")]
enum StoredBody {
    Utf8(String),
    Hex(String),
}

impl StoredBody {
    fn encode(body: &[u8]) -> Self {
        match std::str::from_utf8(body) {
            Ok(text) => Self::Utf8(text.to_string()),
            Err(_) => Self::Hex(hex::encode(body)),
        }
    }

    fn decode(self) -> std::result::Result<Bytes, hex::FromHexError> {
        match self {
            Self::Utf8(text) => Ok(Bytes::from(text)),
            Self::Hex(data) => hex::decode(data).map(Bytes::from),
        }
    }
}

/// Header value as written to disk: a plain string when it is UTF-8.
#[derive(Debug, Serialize, Deserialize)]
#[serde(untagged)]
enum StoredHeaderValue {
    Text(String),
    Binary { hex: String },
}

impl StoredHeaderValue {
    fn encode(value: &[u8]) -> Self {
        match std::str::from_utf8(value) {
            Ok(text) => Self::Text(text.to_string()),
            Err(_) => Self::Binary {
                hex: hex::encode(value),
            },
        }
    }

    fn decode(self) -> std::result::Result<Bytes, hex::FromHexError> {
        match self {
            Self::Text(text) => Ok(Bytes::from(text)),
            Self::Binary { hex } => hex::decode(hex).map(Bytes::from),
        }
    }
}

/// On-disk JSON layout of a snapshot.
#[derive(Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
struct StoredSnapshot {
    status: u16,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    status_line: Option<String>,
    #[serde(default)]
    headers: Vec<(String, Vec<StoredHeaderValue>)>,
    body: StoredBody,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    method: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    url: Option<String>,
    cached_at: DateTime<Utc>,
}

impl From<&CachedSnapshot> for StoredSnapshot {
    fn from(snapshot: &CachedSnapshot) -> Self {
        Self {
            status: snapshot.status,
            status_line: snapshot.status_line.clone(),
            headers: snapshot
                .headers
                .iter()
                .map(|(name, values)| {
                    let values = values.iter().map(|v| StoredHeaderValue::encode(v)).collect();
                    (name.clone(), values)
                })
                .collect(),
            body: StoredBody::encode(&snapshot.body),
            method: snapshot.method.clone(),
            url: snapshot.url.clone(),
            cached_at: snapshot.cached_at,
        }
    }
}

/// Decode the bytes of an entry file.
fn decode_snapshot(path: &Path, contents: &[u8]) -> Result<CachedSnapshot> {
    let corrupt = |reason: String| DittoError::CorruptCache {
        path: path.to_path_buf(),
        reason,
    };

    let stored: StoredSnapshot =
        serde_json::from_slice(contents).map_err(|e| corrupt(e.to_string()))?;
    let body = stored.body.decode().map_err(|e| corrupt(e.to_string()))?;

    let mut headers = Vec::with_capacity(stored.headers.len());
    for (name, values) in stored.headers {
        let values = values
            .into_iter()
            .map(StoredHeaderValue::decode)
            .collect::<std::result::Result<Vec<_>, _>>()
            .map_err(|e| corrupt(e.to_string()))?;
        headers.push((name, values));
    }

    Ok(CachedSnapshot {
        status: stored.status,
        status_line: stored.status_line,
        headers,
        body,
        method: stored.method,
        url: stored.url,
        cached_at: stored.cached_at,
    })
}

/// Filesystem-backed snapshot store rooted at one directory.
///
/// The store holds no locks. Writes go through a uniquely named temp file in
/// the root followed by a rename, so readers and concurrent writers to the
/// same key only ever see complete entries. The last writer wins.
#[derive(Debug, Clone)]
pub struct CacheStore {
    root: PathBuf,
}

impl CacheStore {
    /// Create a store at `root`. The directory is created on first write.
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Path of the entry file for `key`.
    pub fn entry_path(&self, key: &CacheKey) -> PathBuf {
        entry_path(&self.root, key)
    }

    /// Check if an entry exists for `key`.
    pub fn contains(&self, key: &CacheKey) -> bool {
        self.entry_path(key).is_file()
    }

    /// Read the snapshot stored under `key`.
    ///
    /// A missing entry is `Ok(None)`. An entry that fails to decode is
    /// `Err(CorruptCache)`.
    pub fn read(&self, key: &CacheKey) -> Result<Option<CachedSnapshot>> {
        let path = self.entry_path(key);
        let contents = match fs::read(&path) {
            Ok(contents) => contents,
            Err(e) if e.kind() == io::ErrorKind::NotFound => return Ok(None),
            Err(e) => return Err(e.into()),
        };

        decode_snapshot(&path, &contents).map(Some)
    }

    /// Write `snapshot` under `key`, replacing any existing entry.
    pub fn write(&self, key: &CacheKey, snapshot: &CachedSnapshot) -> Result<()> {
        let path = self.entry_path(key);
        let json = serde_json::to_vec_pretty(&StoredSnapshot::from(snapshot))?;

        self.write_atomic(&path, &json)
            .map_err(|source| DittoError::StoreWriteFailed {
                path: path.clone(),
                source,
            })?;

        debug!(key = %key, path = %path.display(), bytes = snapshot.body.len(), "cache entry written");
        Ok(())
    }

    fn write_atomic(&self, path: &Path, contents: &[u8]) -> io::Result<()> {
        fs::create_dir_all(&self.root)?;

        // Unique per writer so racing writes to one key never share a temp file.
        let mut temp_file = tempfile::Builder::new()
            .prefix(".tmp-")
            .suffix(".partial")
            .tempfile_in(&self.root)?;
        temp_file.write_all(contents)?;
        temp_file.as_file().sync_all()?;
        temp_file.persist(path).map_err(|e| e.error)?;

        Ok(())
    }

    /// Delete the entry for `key`. Missing entries are not an error.
    pub fn remove(&self, key: &CacheKey) -> Result<()> {
        match fs::remove_file(self.entry_path(key)) {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(()),
            Err(e) => Err(e.into()),
        }
    }

    /// Keys of every stored entry, sorted.
    pub fn keys(&self) -> Result<Vec<CacheKey>> {
        let entries = match fs::read_dir(&self.root) {
            Ok(entries) => entries,
            Err(e) if e.kind() == io::ErrorKind::NotFound => return Ok(Vec::new()),
            Err(e) => return Err(e.into()),
        };

        let mut keys = Vec::new();
        for entry in entries {
            let path = entry?.path();
            if path.extension().and_then(|ext| ext.to_str()) != Some(ENTRY_EXTENSION) {
                continue;
            }
            if let Some(key) = path
                .file_stem()
                .and_then(|stem| stem.to_str())
                .and_then(CacheKey::parse)
            {
                keys.push(key);
            }
        }
        keys.sort();
        Ok(keys)
    }

    /// Delete every stored entry. Returns how many were removed.
    pub fn clear(&self) -> Result<usize> {
        let keys = self.keys()?;
        for key in &keys {
            self.remove(key)?;
        }
        Ok(keys.len())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::fingerprint::fingerprint;
    use tempfile::TempDir;

    fn sample_snapshot() -> CachedSnapshot {
        let mut snapshot = CachedSnapshot::new(200, "Hello, World!");
        snapshot.status_line = Some("200 OK".to_string());
        snapshot.push_header("Content-Type", "text/plain");
        snapshot.push_header("Set-Cookie", "a=1");
        snapshot.push_header("set-cookie", "b=2");
        snapshot.method = Some("GET".to_string());
        snapshot.url = Some("https://example.com/api".to_string());
        snapshot
    }

    #[test]
    fn test_write_and_read() {
        let temp_dir = TempDir::new().unwrap();
        let store = CacheStore::new(temp_dir.path().join(".ditto"));
        let key = fingerprint("GET", "https://example.com/api");
        let snapshot = sample_snapshot();

        store.write(&key, &snapshot).unwrap();

        let read = store.read(&key).unwrap().unwrap();
        assert_eq!(read, snapshot);
        assert_eq!(read.header("SET-COOKIE"), ["a=1", "b=2"]);
        assert_eq!(read.headers[0].0, "content-type");
    }

    #[test]
    fn test_non_utf8_header_value() {
        let temp_dir = TempDir::new().unwrap();
        let store = CacheStore::new(temp_dir.path());
        let key = fingerprint("GET", "https://example.com/api");
        let mut snapshot = CachedSnapshot::new(200, "ok");
        snapshot.push_header("X-Bin", Bytes::from_static(b"caf\xe9"));
        snapshot.push_header("X-Text", "plain");

        store.write(&key, &snapshot).unwrap();

        let raw = fs::read_to_string(store.entry_path(&key)).unwrap();
        assert!(raw.contains("\"636166e9\""));
        assert!(raw.contains("\"plain\""));
        let read = store.read(&key).unwrap().unwrap();
        assert_eq!(read.header("x-bin"), [Bytes::from_static(b"caf\xe9")]);
        assert_eq!(read.header("x-text"), ["plain"]);
    }

    #[test]
    fn test_read_nonexistent() {
        let temp_dir = TempDir::new().unwrap();
        let store = CacheStore::new(temp_dir.path().join(".ditto"));
        let key = fingerprint("GET", "https://example.com/missing");

        assert!(store.read(&key).unwrap().is_none());
        assert!(!store.contains(&key));
    }

    #[test]
    fn test_binary_body() {
        let temp_dir = TempDir::new().unwrap();
        let store = CacheStore::new(temp_dir.path());
        let key = fingerprint("GET", "https://example.com/logo.png");
        let snapshot = CachedSnapshot::new(200, vec![0x89, b'P', b'N', b'G', 0xff, 0x00]);

        store.write(&key, &snapshot).unwrap();

        let raw = fs::read_to_string(store.entry_path(&key)).unwrap();
        assert!(raw.contains("\"hex\""));
        assert_eq!(store.read(&key).unwrap().unwrap().body, snapshot.body);
    }

    #[test]
    fn test_text_body_is_readable_on_disk() {
        let temp_dir = TempDir::new().unwrap();
        let store = CacheStore::new(temp_dir.path());
        let key = fingerprint("GET", "https://example.com/api");

        store.write(&key, &sample_snapshot()).unwrap();

        let raw = fs::read_to_string(store.entry_path(&key)).unwrap();
        assert!(raw.contains("Hello, World!"));
        assert!(raw.contains("\"utf8\""));
    }

    #[test]
    fn test_write_twice_is_idempotent() {
        let temp_dir = TempDir::new().unwrap();
        let store = CacheStore::new(temp_dir.path());
        let key = fingerprint("GET", "https://example.com/api");
        let snapshot = sample_snapshot();

        store.write(&key, &snapshot).unwrap();
        store.write(&key, &snapshot).unwrap();

        assert_eq!(store.read(&key).unwrap().unwrap(), snapshot);
        assert_eq!(store.keys().unwrap(), vec![key]);
        assert_eq!(fs::read_dir(temp_dir.path()).unwrap().count(), 1);
    }

    #[test]
    fn test_overwrite_replaces_entry() {
        let temp_dir = TempDir::new().unwrap();
        let store = CacheStore::new(temp_dir.path());
        let key = fingerprint("GET", "https://example.com/api");

        store.write(&key, &CachedSnapshot::new(200, "first")).unwrap();
        store.write(&key, &CachedSnapshot::new(404, "second")).unwrap();

        let read = store.read(&key).unwrap().unwrap();
        assert_eq!(read.status, 404);
        assert_eq!(read.body, Bytes::from("second"));
    }

    #[test]
    fn test_corrupt_entry() {
        let temp_dir = TempDir::new().unwrap();
        let store = CacheStore::new(temp_dir.path());
        let key = fingerprint("GET", "https://example.com/api");
        fs::write(store.entry_path(&key), b"{\"status\": 200, \"bo").unwrap();

        let err = store.read(&key).unwrap_err();
        assert!(matches!(err, DittoError::CorruptCache { .. }));
    }

    #[test]
    fn test_corrupt_hex_body() {
        let temp_dir = TempDir::new().unwrap();
        let store = CacheStore::new(temp_dir.path());
        let key = fingerprint("GET", "https://example.com/api");
        let json = r#"{"status":200,"body":{"encoding":"hex","data":"zz"},"cachedAt":"2024-01-01T00:00:00Z"}"#;
        fs::write(store.entry_path(&key), json).unwrap();

        assert!(matches!(
            store.read(&key),
            Err(DittoError::CorruptCache { .. })
        ));
    }

    #[test]
    fn test_write_failure() {
        let temp_dir = TempDir::new().unwrap();
        let blocker = temp_dir.path().join("not-a-dir");
        fs::write(&blocker, "").unwrap();
        let store = CacheStore::new(&blocker);
        let key = fingerprint("GET", "https://example.com/api");

        let err = store.write(&key, &sample_snapshot()).unwrap_err();
        assert!(matches!(err, DittoError::StoreWriteFailed { .. }));
    }

    #[test]
    fn test_remove_and_clear() {
        let temp_dir = TempDir::new().unwrap();
        let store = CacheStore::new(temp_dir.path());
        let a = fingerprint("GET", "https://example.com/a");
        let b = fingerprint("GET", "https://example.com/b");
        store.write(&a, &CachedSnapshot::new(200, "a")).unwrap();
        store.write(&b, &CachedSnapshot::new(200, "b")).unwrap();
        fs::write(temp_dir.path().join("notes.txt"), "ignored").unwrap();

        store.remove(&a).unwrap();
        store.remove(&a).unwrap();
        assert!(!store.contains(&a));
        assert_eq!(store.keys().unwrap(), vec![b]);

        assert_eq!(store.clear().unwrap(), 1);
        assert!(store.keys().unwrap().is_empty());
    }

    #[test]
    fn test_keys_without_root() {
        let temp_dir = TempDir::new().unwrap();
        let store = CacheStore::new(temp_dir.path().join("absent"));
        assert!(store.keys().unwrap().is_empty());
    }
}
