// Caching HTTP client.
// Pairs a reqwest client for building requests with a caching transport that
// executes them.

use async_trait::async_trait;
use bytes::Bytes;
use reqwest::{Client, IntoUrl, Method, Request, RequestBuilder, Response};

use crate::config::CacheConfig;
use crate::error::{DittoError, Result};
use crate::transport::{CachingTransport, Transport};

const USER_AGENT: &str = concat!("ditto/", env!("CARGO_PKG_VERSION"));

/// reqwest client whose requests go through the response cache.
pub struct CachingClient {
    client: Client,
    transport: CachingTransport<Client>,
}

impl CachingClient {
    /// Create a client with a default reqwest client and the given config.
    pub fn new(config: &CacheConfig) -> Result<Self> {
        let client = Client::builder()
            .user_agent(USER_AGENT)
            .build()
            .map_err(DittoError::Network)?;
        Ok(Self::with_client(client, config))
    }

    /// Wrap an existing reqwest client.
    pub fn with_client(client: Client, config: &CacheConfig) -> Self {
        let transport = CachingTransport::from_config(client.clone(), config);
        Self { client, transport }
    }

    /// The underlying caching transport.
    pub fn transport(&self) -> &CachingTransport<Client> {
        &self.transport
    }

    /// Start building a request. Execute it with [`CachingClient::execute`],
    /// not `RequestBuilder::send`, or it will bypass the cache.
    pub fn request<U: IntoUrl>(&self, method: Method, url: U) -> RequestBuilder {
        self.client.request(method, url)
    }

    /// Execute a request through the cache.
    pub async fn execute(&self, request: Request) -> Result<Response> {
        self.transport.execute(request).await
    }

    /// Make a GET request.
    pub async fn get<U: IntoUrl>(&self, url: U) -> Result<Response> {
        let request = self.client.get(url).build().map_err(DittoError::Network)?;
        self.execute(request).await
    }

    /// Make a GET request and return the whole body.
    pub async fn get_bytes<U: IntoUrl>(&self, url: U) -> Result<Bytes> {
        self.get(url)
            .await?
            .bytes()
            .await
            .map_err(DittoError::Network)
    }
}

#[async_trait]
impl Transport for CachingClient {
    async fn execute(&self, request: Request) -> Result<Response> {
        self.transport.execute(request).await
    }
}

/// Create a caching client with the default config, rooted at the nearest
/// project directory. Caching is disabled if none is found.
pub fn client() -> Result<CachingClient> {
    CachingClient::new(&CacheConfig::default())
}
