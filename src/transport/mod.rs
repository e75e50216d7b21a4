// Request executors.
// reqwest::Client talks to the network; CachingTransport wraps any transport
// and implements the same trait, so either can be used where the other is.

mod caching;

use std::sync::Arc;

use async_trait::async_trait;
use reqwest::{Request, Response};

use crate::error::{DittoError, Result};

pub use caching::{CacheOutcome, CachingTransport};

/// Executes a request and returns the response with its single-use body.
#[async_trait]
pub trait Transport: Send + Sync {
    async fn execute(&self, request: Request) -> Result<Response>;
}

#[async_trait]
impl Transport for reqwest::Client {
    async fn execute(&self, request: Request) -> Result<Response> {
        reqwest::Client::execute(self, request)
            .await
            .map_err(DittoError::Network)
    }
}

#[async_trait]
impl<T: Transport + ?Sized> Transport for Arc<T> {
    async fn execute(&self, request: Request) -> Result<Response> {
        (**self).execute(request).await
    }
}

#[async_trait]
impl<T: Transport + ?Sized> Transport for Box<T> {
    async fn execute(&self, request: Request) -> Result<Response> {
        (**self).execute(request).await
    }
}
