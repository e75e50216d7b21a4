// Caching transport.
// Read-through/write-through wrapper that serves repeated requests from disk.

use async_trait::async_trait;
use bytes::Bytes;
use http::header::{HeaderMap, HeaderName, HeaderValue};
use http::{StatusCode, Version};
use reqwest::{Request, Response, ResponseBuilderExt, Url};
use tracing::{debug, warn};

use crate::cache::{CacheStore, CachedSnapshot};
use crate::config::CacheConfig;
use crate::error::{DittoError, Result};
use crate::fingerprint::{CacheKey, fingerprint_request};

use super::Transport;

/// How a response was produced. Attached to every response returned by
/// [`CachingTransport`] as an extension.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CacheOutcome {
    /// Served from the store without touching the network.
    Hit,
    /// Fetched from the inner transport and written to the store.
    Miss,
    /// Fetched from the inner transport; the store write failed.
    MissNotStored,
    /// No store is configured; the request passed straight through.
    Bypass,
}

/// Transport wrapper that caches every response on disk, keyed by method and
/// URL.
///
/// Entries never expire. Two concurrent misses for the same key both reach
/// the inner transport and both write the store; the last write wins.
pub struct CachingTransport<T> {
    inner: T,
    store: Option<CacheStore>,
    purge_corrupt: bool,
}

impl<T: Transport> CachingTransport<T> {
    /// Cache responses from `inner` in `store`.
    pub fn new(inner: T, store: CacheStore) -> Self {
        Self {
            inner,
            store: Some(store),
            purge_corrupt: true,
        }
    }

    /// Forward everything to `inner` without caching.
    pub fn passthrough(inner: T) -> Self {
        Self {
            inner,
            store: None,
            purge_corrupt: true,
        }
    }

    /// Build from a config. If no root can be resolved, caching is disabled
    /// and requests pass straight through.
    pub fn from_config(inner: T, config: &CacheConfig) -> Self {
        let transport = match config.open_store() {
            Ok(store) => {
                debug!(root = %store.root().display(), "response cache enabled");
                Self::new(inner, store)
            }
            Err(e) => {
                debug!(error = %e, "response cache disabled");
                Self::passthrough(inner)
            }
        };
        transport.with_purge_corrupt(config.purge_corrupt)
    }

    /// Build with the default config, discovering the root from the working
    /// directory.
    pub fn discover(inner: T) -> Self {
        Self::from_config(inner, &CacheConfig::default())
    }

    /// Whether entries that fail to decode are deleted when found.
    pub fn with_purge_corrupt(mut self, purge: bool) -> Self {
        self.purge_corrupt = purge;
        self
    }

    pub fn store(&self) -> Option<&CacheStore> {
        self.store.as_ref()
    }

    pub fn inner(&self) -> &T {
        &self.inner
    }

    pub fn is_caching(&self) -> bool {
        self.store.is_some()
    }

    async fn execute_cached(&self, store: &CacheStore, request: Request) -> Result<Response> {
        let key = fingerprint_request(&request);

        if let Some(snapshot) = self.lookup(store, &key).await {
            match replay(&snapshot, request.url()) {
                Ok(response) => {
                    debug!(key = %key, url = %request.url(), "cache hit");
                    return Ok(response);
                }
                Err(e) => warn!(key = %key, error = %e, "unusable cache entry, refetching"),
            }
        }

        debug!(key = %key, url = %request.url(), "cache miss");
        let method = request.method().to_string();
        let url = request.url().to_string();

        let response = self.inner.execute(request).await?;
        let status = response.status();
        let version = response.version();
        let headers = response.headers().clone();
        let final_url = response.url().clone();

        // The network body can be read once. Drain it here and hand the same
        // buffer to both the store and the caller.
        let body = response.bytes().await.map_err(DittoError::Network)?;

        let mut snapshot = capture(status, &headers, body.clone());
        snapshot.method = Some(method);
        snapshot.url = Some(url);

        let outcome = match self.persist(store, key.clone(), snapshot).await {
            Ok(()) => CacheOutcome::Miss,
            Err(e) => {
                warn!(key = %key, error = %e, "response served but not cached");
                CacheOutcome::MissNotStored
            }
        };

        rebuild(status, version, headers, final_url, body, outcome)
    }

    /// Read an entry, folding every cache-side failure into a miss.
    async fn lookup(&self, store: &CacheStore, key: &CacheKey) -> Option<CachedSnapshot> {
        let store = store.clone();
        let key = key.clone();
        let purge = self.purge_corrupt;

        let result = run_blocking(move || match store.read(&key) {
            Err(DittoError::CorruptCache { path, reason }) => {
                warn!(key = %key, path = %path.display(), reason = %reason, "corrupt cache entry");
                if purge {
                    if let Err(e) = store.remove(&key) {
                        warn!(key = %key, error = %e, "failed to purge corrupt cache entry");
                    }
                }
                Ok(None)
            }
            other => other,
        })
        .await;

        result.unwrap_or_else(|e| {
            warn!(error = %e, "cache read failed, treating as miss");
            None
        })
    }

    async fn persist(&self, store: &CacheStore, key: CacheKey, snapshot: CachedSnapshot) -> Result<()> {
        let store = store.clone();
        run_blocking(move || store.write(&key, &snapshot)).await
    }
}

#[async_trait]
impl<T: Transport> Transport for CachingTransport<T> {
    async fn execute(&self, request: Request) -> Result<Response> {
        let Some(store) = &self.store else {
            let mut response = self.inner.execute(request).await?;
            response.extensions_mut().insert(CacheOutcome::Bypass);
            return Ok(response);
        };
        self.execute_cached(store, request).await
    }
}

/// Run filesystem work off the async worker threads.
async fn run_blocking<F, R>(f: F) -> Result<R>
where
    F: FnOnce() -> Result<R> + Send + 'static,
    R: Send + 'static,
{
    tokio::task::spawn_blocking(f)
        .await
        .map_err(|e| DittoError::Task(e.to_string()))?
}

/// Snapshot a drained response.
fn capture(status: StatusCode, headers: &HeaderMap, body: Bytes) -> CachedSnapshot {
    let mut snapshot = CachedSnapshot::new(status.as_u16(), body);
    snapshot.status_line = status
        .canonical_reason()
        .map(|reason| format!("{} {}", status.as_str(), reason));
    for (name, value) in headers {
        snapshot.push_header(name.as_str(), Bytes::copy_from_slice(value.as_bytes()));
    }
    snapshot
}

/// Synthesize a response from a stored snapshot. Each call gets its own body.
/// The URL is the one recorded in the snapshot, else `request_url`.
fn replay(snapshot: &CachedSnapshot, request_url: &Url) -> Result<Response> {
    let status = StatusCode::from_u16(snapshot.status).map_err(http::Error::from)?;

    let mut headers = HeaderMap::new();
    for (name, values) in &snapshot.headers {
        let name = HeaderName::from_bytes(name.as_bytes()).map_err(http::Error::from)?;
        for value in values {
            let value = HeaderValue::from_bytes(value).map_err(http::Error::from)?;
            headers.append(name.clone(), value);
        }
    }

    let url = snapshot
        .url
        .as_deref()
        .and_then(|url| Url::parse(url).ok())
        .unwrap_or_else(|| request_url.clone());

    rebuild(
        status,
        Version::HTTP_11,
        headers,
        url,
        snapshot.body.clone(),
        CacheOutcome::Hit,
    )
}

fn rebuild(
    status: StatusCode,
    version: Version,
    headers: HeaderMap,
    url: Url,
    body: Bytes,
    outcome: CacheOutcome,
) -> Result<Response> {
    let mut builder = http::Response::builder()
        .status(status)
        .version(version)
        .url(url)
        .extension(outcome);
    if let Some(map) = builder.headers_mut() {
        *map = headers;
    }
    Ok(Response::from(builder.body(body)?))
}
