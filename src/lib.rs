// ditto: transparent disk-backed response cache for reqwest.
// Swap the transport, keep the calling code: repeated requests are served
// from a directory of JSON snapshots instead of the network.

pub mod cache;
pub mod client;
pub mod config;
pub mod error;
pub mod fingerprint;
pub mod transport;

pub use cache::{CacheStore, CachedSnapshot};
pub use client::{CachingClient, client};
pub use config::{CacheConfig, RootAnchor};
pub use error::{DittoError, Result};
pub use fingerprint::{CacheKey, fingerprint, fingerprint_request};
pub use transport::{CacheOutcome, CachingTransport, Transport};
