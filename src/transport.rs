//! HTTP transports the client sends requests through.
//!
//! [`ReqwestTransport`] is the default. [`TracingTransport`] wraps any other
//! transport and opens a span per request. Custom transports implement
//! [`Transport`] and are installed with
//! [`ClientBuilder::transport`](crate::ClientBuilder::transport).

use crate::{Error, Result};
use async_trait::async_trait;
use std::fmt;
use std::sync::Arc;
use std::time::Duration;
use tracing::Instrument;

/// Sends a single HTTP request and returns the response head.
///
/// The body of the returned response is drained by the client. The client
/// bounds the send and the drain by [`reqwest::Request::timeout`], so
/// implementations need not enforce it themselves.
#[async_trait]
pub trait Transport: Send + Sync {
    /// Sends `request` once, without retrying.
    async fn send(&self, request: reqwest::Request) -> Result<reqwest::Response>;
}

/// Connection-pool settings for the default transport.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PoolConfig {
    /// Idle connections kept across all hosts.
    ///
    /// `reqwest` only caps idle connections per host, so this value is
    /// informational for the default transport and available to custom ones.
    pub max_idle_connections: usize,
    /// Idle connections kept per host.
    pub max_idle_per_host: usize,
    /// How long an idle connection stays in the pool.
    pub idle_timeout: Duration,
}

impl Default for PoolConfig {
    fn default() -> Self {
        Self {
            max_idle_connections: 100,
            max_idle_per_host: 100,
            idle_timeout: Duration::from_secs(90),
        }
    }
}

/// The default transport, backed by a pooled [`reqwest::Client`].
#[derive(Debug, Clone)]
pub struct ReqwestTransport {
    client: reqwest::Client,
}

impl ReqwestTransport {
    /// Wraps an existing `reqwest` client.
    pub fn new(client: reqwest::Client) -> Self {
        Self { client }
    }

    /// Builds a `reqwest` client with the given pool settings.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Configuration`] if the TLS backend cannot be initialized.
    pub fn from_pool(pool: &PoolConfig) -> Result<Self> {
        let client = reqwest::Client::builder()
            .pool_max_idle_per_host(pool.max_idle_per_host)
            .pool_idle_timeout(pool.idle_timeout)
            .build()
            .map_err(|e| Error::Configuration(format!("Failed to build HTTP client: {}", e)))?;
        Ok(Self::new(client))
    }

    /// Returns the underlying `reqwest` client.
    pub fn client(&self) -> &reqwest::Client {
        &self.client
    }
}

#[async_trait]
impl Transport for ReqwestTransport {
    async fn send(&self, request: reqwest::Request) -> Result<reqwest::Response> {
        Ok(self.client.execute(request).await?)
    }
}

/// Wraps a transport and records an `http.request` span per request.
///
/// The span carries the method and URL; the response status is recorded on
/// it once the response head arrives.
#[derive(Clone)]
pub struct TracingTransport {
    inner: Arc<dyn Transport>,
}

impl TracingTransport {
    /// Wraps `inner`.
    pub fn new(inner: Arc<dyn Transport>) -> Self {
        Self { inner }
    }
}

impl fmt::Debug for TracingTransport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TracingTransport").finish_non_exhaustive()
    }
}

#[async_trait]
impl Transport for TracingTransport {
    async fn send(&self, request: reqwest::Request) -> Result<reqwest::Response> {
        let span = tracing::info_span!(
            "http.request",
            method = %request.method(),
            url = %request.url(),
            status = tracing::field::Empty,
        );

        let result = self.inner.send(request).instrument(span.clone()).await;
        match &result {
            Ok(response) => {
                span.record("status", response.status().as_u16());
            }
            Err(e) => {
                span.in_scope(|| tracing::debug!(error = %e, "HTTP transport failed"));
            }
        }
        result
    }
}
