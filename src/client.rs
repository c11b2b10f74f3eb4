//! REST client with retry, circuit breaking and shared configuration.
//!
//! The [`Client`] type is the main entry point for making HTTP requests.
//! Use [`ClientBuilder`] to configure and create clients, or
//! [`ClientBuilder::from_shared`] to derive one from an existing client.

use crate::{
    circuit_breaker::{CircuitBreaker, CircuitBreakerPolicy, CircuitState},
    request::{Body, RequestConfig},
    retry::{is_retryable_status, RetryPolicy},
    transport::{PoolConfig, ReqwestTransport, TracingTransport, Transport},
    Error, Response, Result,
};
use http::header::{HeaderValue, CONTENT_TYPE, USER_AGENT};
use http::{HeaderMap, HeaderName, Method};
use std::fmt;
use std::sync::Arc;
use std::time::{Duration, Instant};
use url::Url;

const PRODUCTION_BREAKER: &str = "production-client";
const PRODUCTION_USER_AGENT: &str = "svckit-rest-client/1.0";

/// Settings a [`Client`] is built from.
///
/// A built client keeps its configuration immutable; [`Client::to_builder`]
/// copies it into a new builder.
#[derive(Clone)]
pub struct ClientConfig {
    /// Prefix for every request path. Without one, paths must be absolute URLs.
    pub base_url: Option<Url>,
    /// Headers sent with every request unless the request overrides them.
    pub default_headers: HeaderMap,
    /// Timeout for each attempt.
    pub timeout: Option<Duration>,
    /// Retry policy; `None` makes exactly one attempt.
    pub retry: Option<RetryPolicy>,
    /// Circuit-breaker policy; each built client gets its own breaker.
    pub circuit_breaker: Option<CircuitBreakerPolicy>,
    /// Connection-pool tuning for the default transport.
    pub pool: PoolConfig,
    /// Whether requests are wrapped in a tracing span.
    pub tracing: bool,
    /// Transport override; `None` uses a pooled `reqwest` client.
    pub transport: Option<Arc<dyn Transport>>,
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            base_url: None,
            default_headers: HeaderMap::new(),
            timeout: Some(Duration::from_secs(30)),
            retry: None,
            circuit_breaker: None,
            pool: PoolConfig::default(),
            tracing: false,
            transport: None,
        }
    }
}

impl fmt::Debug for ClientConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ClientConfig")
            .field("base_url", &self.base_url.as_ref().map(Url::as_str))
            .field("default_headers", &self.default_headers)
            .field("timeout", &self.timeout)
            .field("retry", &self.retry)
            .field("circuit_breaker", &self.circuit_breaker)
            .field("pool", &self.pool)
            .field("tracing", &self.tracing)
            .field("custom_transport", &self.transport.is_some())
            .finish()
    }
}

/// An HTTP client with optional retries and circuit breaking.
///
/// The client is designed to be reused across multiple requests. Clones share
/// the same transport and circuit breaker.
///
/// # Examples
///
/// ```no_run
/// use svckit::{Client, RequestConfig, RetryPolicy};
/// use serde::{Deserialize, Serialize};
/// use std::time::Duration;
///
/// #[derive(Serialize)]
/// struct CreateUser {
///     name: String,
/// }
///
/// #[derive(Deserialize)]
/// struct User {
///     id: u64,
///     name: String,
/// }
///
/// # async fn example() -> Result<(), svckit::Error> {
/// let client = Client::builder()
///     .base_url("https://api.example.com")?
///     .timeout(Duration::from_secs(10))
///     .retry(RetryPolicy::default())
///     .default_circuit_breaker("users-api")
///     .build()?;
///
/// let user: User = client.get("/users/123").await?.json()?;
/// println!("User: {}", user.name);
///
/// let created = client
///     .request(RequestConfig::post("/users").json(&CreateUser { name: "Alice".into() })?)
///     .await?;
/// let created: User = created.json()?;
/// println!("Created user with ID: {}", created.id);
/// # Ok(())
/// # }
/// ```
#[derive(Clone)]
pub struct Client {
    inner: Arc<ClientInner>,
}

struct ClientInner {
    config: ClientConfig,
    transport: Arc<dyn Transport>,
    breaker: Option<CircuitBreaker>,
}

impl Client {
    /// Creates a client with default settings: no base URL, a 30 second
    /// timeout, no retries and no circuit breaker.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Configuration`] if the HTTP backend cannot be built.
    pub fn new() -> Result<Self> {
        ClientBuilder::new().build()
    }

    /// Creates a client with production defaults: tracing enabled, the
    /// default retry policy, a circuit breaker named `production-client` and
    /// a `svckit-rest-client/1.0` user agent.
    ///
    /// # Errors
    ///
    /// Returns an error if `base_url` is invalid or the HTTP backend cannot
    /// be built.
    pub fn production(base_url: impl AsRef<str>) -> Result<Self> {
        ClientBuilder::new()
            .base_url(base_url)?
            .tracing(true)
            .default_retry()
            .default_circuit_breaker(PRODUCTION_BREAKER)
            .default_header(USER_AGENT.as_str(), PRODUCTION_USER_AGENT)?
            .build()
    }

    /// Creates a new `ClientBuilder` for configuring a client.
    pub fn builder() -> ClientBuilder {
        ClientBuilder::new()
    }

    /// Returns a builder seeded with this client's configuration.
    ///
    /// Changing the builder never affects this client.
    pub fn to_builder(&self) -> ClientBuilder {
        ClientBuilder {
            config: self.inner.config.clone(),
        }
    }

    /// Returns the configuration this client was built from.
    pub fn config(&self) -> &ClientConfig {
        &self.inner.config
    }

    /// Returns the circuit-breaker state, or `None` without a breaker.
    pub fn circuit_state(&self) -> Option<CircuitState> {
        self.inner.breaker.as_ref().map(CircuitBreaker::state)
    }

    /// Returns the circuit breaker, if one is configured.
    pub fn circuit_breaker(&self) -> Option<&CircuitBreaker> {
        self.inner.breaker.as_ref()
    }

    /// Makes a request described by `config`.
    ///
    /// Without a retry policy exactly one attempt is made and any response,
    /// including 4xx and 5xx, is returned as `Ok`. With a policy, transport
    /// errors, timeouts, circuit-breaker rejections and 5xx, 429 and 408
    /// responses are attempted again after an exponential backoff.
    ///
    /// # Errors
    ///
    /// - [`Error::InvalidUrl`] if the URL cannot be resolved.
    /// - [`Error::Cancelled`] or [`Error::DeadlineExceeded`] when the request
    ///   context ends first, including during a backoff wait.
    /// - [`Error::RetryExhausted`] when every attempt allowed by the policy failed.
    /// - The attempt's own error without a retry policy.
    pub async fn request(&self, config: RequestConfig) -> Result<Response> {
        let start_time = Instant::now();
        let RequestConfig {
            method,
            path,
            body,
            headers,
            query,
            timeout,
            context,
        } = config;

        let url = self.resolve_url(&path, &query)?;
        let template = self.build_request(method.clone(), url.clone(), headers, body, timeout);

        let policy = self.inner.config.retry.as_ref();
        let replayable = template.try_clone().is_some();
        let max_attempts = match policy {
            Some(policy) if replayable => policy.max_attempts(),
            _ => 1,
        };
        if policy.is_some() && !replayable {
            tracing::debug!(
                method = %method,
                url = %url,
                "Request body cannot be replayed, making a single attempt"
            );
        }

        let mut template = Some(template);
        let mut attempt = 0;

        loop {
            attempt += 1;

            if let Some(policy) = policy.filter(|_| attempt > 1) {
                let delay = policy.backoff_for_attempt(attempt);
                tracing::info!(
                    delay_ms = delay.as_millis() as u64,
                    attempt = attempt,
                    "Retrying request after delay"
                );
                context.sleep(delay).await?;
            }

            let request = if attempt >= max_attempts {
                template.take()
            } else {
                template.as_ref().and_then(reqwest::Request::try_clone)
            }
            .ok_or_else(|| Error::Configuration("Request body cannot be replayed".to_string()))?;

            tracing::debug!(
                method = %method,
                url = %url,
                attempt = attempt,
                request_id = context.request_id(),
                "Executing HTTP request"
            );

            let result = context.run(self.dispatch(request)).await.and_then(|response| {
                if policy.is_some() && is_retryable_status(response.status) {
                    Err(Error::HttpStatus {
                        status: response.status,
                        headers: response.headers,
                        body: response.body,
                    })
                } else {
                    Ok(response)
                }
            });

            match result {
                Ok(mut response) => {
                    response.attempts = attempt;
                    response.latency = start_time.elapsed();
                    tracing::info!(
                        status = response.status.as_u16(),
                        latency_ms = response.latency.as_millis() as u64,
                        attempts = attempt,
                        "Received HTTP response"
                    );
                    return Ok(response);
                }
                Err(e) => {
                    tracing::warn!(
                        error = %e,
                        attempt = attempt,
                        method = %method,
                        url = %url,
                        request_id = context.request_id(),
                        "Request failed"
                    );

                    if policy.is_none() || e.is_cancellation() || !e.is_retryable() {
                        return Err(e);
                    }
                    if attempt >= max_attempts {
                        return Err(Error::RetryExhausted {
                            attempts: attempt,
                            last_error: Box::new(e),
                        });
                    }
                }
            }
        }
    }

    /// Runs one attempt, through the circuit breaker when one is configured.
    async fn dispatch(&self, request: reqwest::Request) -> Result<Response> {
        match &self.inner.breaker {
            Some(breaker) => breaker.execute(|| self.send_once(request)).await,
            None => self.send_once(request).await,
        }
    }

    /// Sends one request and drains its body, bounded by the request timeout
    /// whatever the transport does with it.
    async fn send_once(&self, request: reqwest::Request) -> Result<Response> {
        let timeout = request.timeout().copied();
        let exchange = async {
            let response = self.inner.transport.send(request).await?;
            let status = response.status();
            let headers = response.headers().clone();
            let body = response.bytes().await?;
            Ok::<_, Error>(Response::new(status, headers, body))
        };
        match timeout {
            Some(limit) => tokio::time::timeout(limit, exchange)
                .await
                .map_err(|_| Error::Timeout)?,
            None => exchange.await,
        }
    }

    fn resolve_url(&self, path: &str, query: &[(String, String)]) -> Result<Url> {
        let mut url = match &self.inner.config.base_url {
            Some(base) => {
                let base = base.as_str().trim_end_matches('/');
                Url::parse(&format!("{}/{}", base, path.trim_start_matches('/')))?
            }
            None => Url::parse(path)?,
        };

        if !query.is_empty() {
            let kept: Vec<(String, String)> = url
                .query_pairs()
                .filter(|(key, _)| !query.iter().any(|(k, _)| k == key))
                .map(|(key, value)| (key.into_owned(), value.into_owned()))
                .collect();
            url.query_pairs_mut()
                .clear()
                .extend_pairs(kept.iter().chain(query));
        }

        Ok(url)
    }

    fn build_request(
        &self,
        method: Method,
        url: Url,
        headers: HeaderMap,
        body: Option<Body>,
        timeout: Option<Duration>,
    ) -> reqwest::Request {
        let mut request = reqwest::Request::new(method, url);

        let merged = request.headers_mut();
        merged.extend(self.inner.config.default_headers.clone());
        merged.extend(headers);

        if let Some(body) = body {
            if body.is_json() && !merged.contains_key(CONTENT_TYPE) {
                merged.insert(CONTENT_TYPE, HeaderValue::from_static("application/json"));
            }
            *request.body_mut() = Some(body.into_reqwest());
        }

        *request.timeout_mut() = timeout.or(self.inner.config.timeout);
        request
    }

    /// Makes a GET request to `path`.
    pub async fn get(&self, path: impl Into<String>) -> Result<Response> {
        self.request(RequestConfig::get(path)).await
    }

    /// Makes a POST request to `path` with `body`.
    ///
    /// Use [`Body::json`] or [`RequestConfig::json`] for JSON payloads.
    pub async fn post(&self, path: impl Into<String>, body: impl Into<Body>) -> Result<Response> {
        self.request(RequestConfig::post(path).body(body)).await
    }

    /// Makes a PUT request to `path` with `body`.
    pub async fn put(&self, path: impl Into<String>, body: impl Into<Body>) -> Result<Response> {
        self.request(RequestConfig::put(path).body(body)).await
    }

    /// Makes a PATCH request to `path` with `body`.
    pub async fn patch(&self, path: impl Into<String>, body: impl Into<Body>) -> Result<Response> {
        self.request(RequestConfig::patch(path).body(body)).await
    }

    /// Makes a DELETE request to `path`.
    pub async fn delete(&self, path: impl Into<String>) -> Result<Response> {
        self.request(RequestConfig::delete(path)).await
    }

    /// Makes a HEAD request to `path`.
    pub async fn head(&self, path: impl Into<String>) -> Result<Response> {
        self.request(RequestConfig::head(path)).await
    }

    /// Makes an OPTIONS request to `path`.
    pub async fn options(&self, path: impl Into<String>) -> Result<Response> {
        self.request(RequestConfig::options(path)).await
    }
}

impl fmt::Debug for Client {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Client")
            .field("config", &self.inner.config)
            .field("breaker", &self.inner.breaker)
            .finish()
    }
}

/// Builder for configuring and creating a [`Client`].
///
/// # Examples
///
/// ```no_run
/// use svckit::{ClientBuilder, RetryPolicy};
/// use std::time::Duration;
///
/// # async fn example() -> Result<(), svckit::Error> {
/// let client = ClientBuilder::new()
///     .base_url("https://api.example.com")?
///     .timeout(Duration::from_secs(30))
///     .retry(RetryPolicy::new(
///         5,
///         Duration::from_millis(200),
///         Duration::from_secs(10),
///         2.0,
///     ))
///     .default_header("User-Agent", "my-app/1.0")?
///     .build()?;
///
/// // A client for a sibling service that shares headers and policies.
/// let billing = ClientBuilder::from_shared(&client, Some("https://billing.example.com"))?
///     .default_header("X-Service", "billing")?
///     .build()?;
/// # Ok(())
/// # }
/// ```
#[derive(Debug, Clone, Default)]
pub struct ClientBuilder {
    config: ClientConfig,
}

impl ClientBuilder {
    /// Creates a new `ClientBuilder` with default settings.
    pub fn new() -> Self {
        Self::default()
    }

    /// Creates a builder seeded with `parent`'s configuration, optionally
    /// replacing its base URL.
    ///
    /// # Errors
    ///
    /// Returns an error if `base_url` is invalid.
    pub fn from_shared(parent: &Client, base_url: Option<&str>) -> Result<Self> {
        let builder = parent.to_builder();
        match base_url {
            Some(url) => builder.base_url(url),
            None => Ok(builder),
        }
    }

    /// Sets the base URL for all requests.
    ///
    /// # Errors
    ///
    /// Returns an error if the URL is invalid.
    pub fn base_url(mut self, url: impl AsRef<str>) -> Result<Self> {
        self.config.base_url = Some(Url::parse(url.as_ref())?);
        Ok(self)
    }

    /// Adds a default header that will be included in all requests.
    ///
    /// # Errors
    ///
    /// Returns an error if the header name or value is invalid.
    pub fn default_header(mut self, name: impl AsRef<str>, value: impl AsRef<str>) -> Result<Self> {
        let name = HeaderName::try_from(name.as_ref())
            .map_err(|e| Error::Configuration(format!("Invalid header name: {}", e)))?;
        let value = HeaderValue::try_from(value.as_ref())
            .map_err(|e| Error::Configuration(format!("Invalid header value: {}", e)))?;
        self.config.default_headers.insert(name, value);
        Ok(self)
    }

    /// Adds several default headers.
    ///
    /// # Errors
    ///
    /// Returns an error if any header name or value is invalid.
    pub fn default_headers<I, K, V>(self, headers: I) -> Result<Self>
    where
        I: IntoIterator<Item = (K, V)>,
        K: AsRef<str>,
        V: AsRef<str>,
    {
        headers
            .into_iter()
            .try_fold(self, |builder, (name, value)| builder.default_header(name, value))
    }

    /// Sets the timeout for each attempt.
    pub fn timeout(mut self, timeout: Duration) -> Self {
        self.config.timeout = Some(timeout);
        self
    }

    /// Sets the retry policy.
    pub fn retry(mut self, policy: RetryPolicy) -> Self {
        self.config.retry = Some(policy);
        self
    }

    /// Uses [`RetryPolicy::default`].
    pub fn default_retry(self) -> Self {
        self.retry(RetryPolicy::default())
    }

    /// Disables retries.
    pub fn without_retry(mut self) -> Self {
        self.config.retry = None;
        self
    }

    /// Sets the circuit-breaker policy.
    pub fn circuit_breaker(mut self, policy: CircuitBreakerPolicy) -> Self {
        self.config.circuit_breaker = Some(policy);
        self
    }

    /// Uses [`CircuitBreakerPolicy::with_defaults`] with the given name.
    pub fn default_circuit_breaker(self, name: impl Into<String>) -> Self {
        self.circuit_breaker(CircuitBreakerPolicy::with_defaults(name))
    }

    /// Disables the circuit breaker.
    pub fn without_circuit_breaker(mut self) -> Self {
        self.config.circuit_breaker = None;
        self
    }

    /// Sets the total idle-connection cap.
    pub fn max_idle_connections(mut self, max: usize) -> Self {
        self.config.pool.max_idle_connections = max;
        self
    }

    /// Sets the idle-connection cap per host.
    pub fn max_idle_per_host(mut self, max: usize) -> Self {
        self.config.pool.max_idle_per_host = max;
        self
    }

    /// Sets how long idle connections are kept.
    pub fn idle_timeout(mut self, timeout: Duration) -> Self {
        self.config.pool.idle_timeout = timeout;
        self
    }

    /// Enables or disables a tracing span around every request.
    pub fn tracing(mut self, enabled: bool) -> Self {
        self.config.tracing = enabled;
        self
    }

    /// Replaces the default `reqwest` transport.
    pub fn transport(mut self, transport: Arc<dyn Transport>) -> Self {
        self.config.transport = Some(transport);
        self
    }

    /// Builds the configured `Client`.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Configuration`] if the default transport cannot be built.
    pub fn build(self) -> Result<Client> {
        let config = self.config;

        let base: Arc<dyn Transport> = match &config.transport {
            Some(transport) => Arc::clone(transport),
            None => Arc::new(ReqwestTransport::from_pool(&config.pool)?),
        };
        let transport: Arc<dyn Transport> = if config.tracing {
            Arc::new(TracingTransport::new(base))
        } else {
            base
        };
        let breaker = config.circuit_breaker.clone().map(CircuitBreaker::new);

        Ok(Client {
            inner: Arc::new(ClientInner {
                config,
                transport,
                breaker,
            }),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use std::sync::Mutex;

    /// Records requests and answers each with a fixed status.
    struct Recorder {
        status: u16,
        seen: Mutex<Vec<reqwest::Request>>,
    }

    impl Recorder {
        fn new(status: u16) -> Arc<Self> {
            Arc::new(Self {
                status,
                seen: Mutex::new(Vec::new()),
            })
        }

        fn count(&self) -> usize {
            self.seen.lock().unwrap().len()
        }
    }

    #[async_trait]
    impl Transport for Recorder {
        async fn send(&self, request: reqwest::Request) -> Result<reqwest::Response> {
            self.seen.lock().unwrap().push(request);
            let response = http::Response::builder()
                .status(self.status)
                .body("")
                .map_err(Error::transport)?;
            Ok(reqwest::Response::from(response))
        }
    }

    struct Refusing;

    #[async_trait]
    impl Transport for Refusing {
        async fn send(&self, _request: reqwest::Request) -> Result<reqwest::Response> {
            Err(Error::transport("connection refused"))
        }
    }

    /// Answers only after a long pause and ignores the request timeout.
    struct Stalled;

    #[async_trait]
    impl Transport for Stalled {
        async fn send(&self, _request: reqwest::Request) -> Result<reqwest::Response> {
            tokio::time::sleep(Duration::from_secs(5)).await;
            let response = http::Response::builder()
                .status(200)
                .body("")
                .map_err(Error::transport)?;
            Ok(reqwest::Response::from(response))
        }
    }

    fn client_with(transport: Arc<dyn Transport>) -> ClientBuilder {
        Client::builder()
            .base_url("http://service.local/api/")
            .unwrap()
            .transport(transport)
    }

    #[test]
    fn test_builder_defaults() {
        let config = ClientConfig::default();
        assert_eq!(config.timeout, Some(Duration::from_secs(30)));
        assert!(config.retry.is_none());
        assert!(config.circuit_breaker.is_none());
        assert!(!config.tracing);
        assert_eq!(config.pool, PoolConfig::default());
    }

    #[test]
    fn test_invalid_base_url() {
        let result = Client::builder().base_url("not a url");
        assert!(matches!(result, Err(Error::InvalidUrl(_))));
    }

    #[test]
    fn test_resolve_url_joins_with_single_slash() {
        let client = client_with(Recorder::new(200)).build().unwrap();
        let url = client.resolve_url("/users/1", &[]).unwrap();
        assert_eq!(url.as_str(), "http://service.local/api/users/1");
        let url = client.resolve_url("users/1", &[]).unwrap();
        assert_eq!(url.as_str(), "http://service.local/api/users/1");
    }

    #[test]
    fn test_resolve_url_replaces_query_pairs() {
        let client = client_with(Recorder::new(200)).build().unwrap();
        let query = vec![("page".to_string(), "2".to_string())];
        let url = client
            .resolve_url("/items?page=1&sort=asc", &query)
            .unwrap();
        let pairs: Vec<(String, String)> = url
            .query_pairs()
            .map(|(k, v)| (k.into_owned(), v.into_owned()))
            .collect();
        assert_eq!(
            pairs,
            vec![
                ("sort".to_string(), "asc".to_string()),
                ("page".to_string(), "2".to_string())
            ]
        );
    }

    #[test]
    fn test_relative_path_without_base_url() {
        let client = Client::builder()
            .transport(Recorder::new(200))
            .build()
            .unwrap();
        assert!(matches!(
            client.resolve_url("/relative", &[]),
            Err(Error::InvalidUrl(_))
        ));
        assert!(client.resolve_url("http://other.local/x", &[]).is_ok());
    }

    #[tokio::test]
    async fn test_header_precedence_and_content_type() {
        let recorder = Recorder::new(200);
        let client = client_with(recorder.clone())
            .default_header("X-Tenant", "default")
            .unwrap()
            .default_header("X-Keep", "yes")
            .unwrap()
            .build()
            .unwrap();

        let request = RequestConfig::post("/orders")
            .json(&serde_json::json!({"qty": 1}))
            .unwrap()
            .header("X-Tenant", "override")
            .unwrap();
        client.request(request).await.unwrap();

        let seen = recorder.seen.lock().unwrap();
        let headers = seen[0].headers();
        assert_eq!(headers["x-tenant"], "override");
        assert_eq!(headers["x-keep"], "yes");
        assert_eq!(headers[CONTENT_TYPE], "application/json");
        assert_eq!(seen[0].timeout(), Some(&Duration::from_secs(30)));
    }

    #[tokio::test]
    async fn test_explicit_content_type_kept() {
        let recorder = Recorder::new(200);
        let client = client_with(recorder.clone()).build().unwrap();

        let request = RequestConfig::post("/events")
            .json(&serde_json::json!([]))
            .unwrap()
            .header("Content-Type", "application/cloudevents+json")
            .unwrap();
        client.request(request).await.unwrap();

        let seen = recorder.seen.lock().unwrap();
        assert_eq!(
            seen[0].headers()[CONTENT_TYPE],
            "application/cloudevents+json"
        );
    }

    #[tokio::test]
    async fn test_no_retry_returns_error_status_as_response() {
        let recorder = Recorder::new(503);
        let client = client_with(recorder.clone()).build().unwrap();

        let response = client.get("/health").await.unwrap();
        assert_eq!(response.status, 503);
        assert!(!response.is_success());
        assert_eq!(response.attempts, 1);
        assert_eq!(recorder.count(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_retries_transport_errors_until_exhausted() {
        let client = client_with(Arc::new(Refusing))
            .retry(RetryPolicy::new(
                3,
                Duration::from_millis(10),
                Duration::from_millis(100),
                2.0,
            ))
            .build()
            .unwrap();

        match client.get("/x").await {
            Err(Error::RetryExhausted {
                attempts,
                last_error,
            }) => {
                assert_eq!(attempts, 3);
                assert!(matches!(*last_error, Error::Transport(_)));
            }
            other => panic!("expected RetryExhausted, got {:?}", other),
        }
    }

    #[tokio::test]
    async fn test_transport_error_without_retry_is_returned() {
        let client = client_with(Arc::new(Refusing)).build().unwrap();
        assert!(matches!(client.get("/x").await, Err(Error::Transport(_))));
    }

    #[tokio::test(start_paused = true)]
    async fn test_client_timeout_bounds_custom_transport() {
        let client = client_with(Arc::new(Stalled))
            .timeout(Duration::from_millis(100))
            .build()
            .unwrap();

        let start = tokio::time::Instant::now();
        let err = client.get("/slow").await.unwrap_err();
        assert!(matches!(err, Error::Timeout), "{err:?}");
        assert!(start.elapsed() < Duration::from_secs(1));
    }

    #[tokio::test(start_paused = true)]
    async fn test_request_timeout_bounds_custom_transport() {
        let client = client_with(Arc::new(Stalled)).build().unwrap();

        let request = RequestConfig::get("/slow").timeout(Duration::from_millis(250));
        let err = client.request(request).await.unwrap_err();
        assert!(matches!(err, Error::Timeout), "{err:?}");
    }

    #[tokio::test(start_paused = true)]
    async fn test_client_error_not_retried() {
        let recorder = Recorder::new(404);
        let client = client_with(recorder.clone())
            .default_retry()
            .build()
            .unwrap();

        let response = client.get("/missing").await.unwrap();
        assert_eq!(response.status, 404);
        assert_eq!(recorder.count(), 1);
    }

    #[tokio::test]
    async fn test_breaker_opens_on_transport_failures() {
        let client = client_with(Arc::new(Refusing))
            .circuit_breaker(
                CircuitBreakerPolicy::new("flaky").with_ready_to_trip(|c| c.consecutive_failures >= 2),
            )
            .build()
            .unwrap();

        assert_eq!(client.circuit_state(), Some(CircuitState::Closed));
        let _ = client.get("/a").await;
        let _ = client.get("/a").await;
        assert_eq!(client.circuit_state(), Some(CircuitState::Open));

        match client.get("/a").await {
            Err(Error::CircuitOpen { name, .. }) => assert_eq!(name, "flaky"),
            other => panic!("expected CircuitOpen, got {:?}", other),
        }
    }

    #[tokio::test]
    async fn test_error_statuses_do_not_trip_breaker() {
        let client = client_with(Recorder::new(500))
            .circuit_breaker(
                CircuitBreakerPolicy::new("statuses").with_ready_to_trip(|c| c.consecutive_failures >= 1),
            )
            .build()
            .unwrap();

        for _ in 0..3 {
            assert_eq!(client.get("/").await.unwrap().status, 500);
        }
        assert_eq!(client.circuit_state(), Some(CircuitState::Closed));
    }

    #[test]
    fn test_from_shared_copies_and_isolates() {
        let parent = client_with(Recorder::new(200))
            .default_header("X-Team", "payments")
            .unwrap()
            .default_retry()
            .default_circuit_breaker("parent")
            .timeout(Duration::from_secs(5))
            .build()
            .unwrap();

        let child = ClientBuilder::from_shared(&parent, Some("http://billing.local"))
            .unwrap()
            .default_header("X-Team", "billing")
            .unwrap()
            .without_retry()
            .build()
            .unwrap();

        assert_eq!(
            child.config().base_url.as_ref().map(Url::as_str),
            Some("http://billing.local/")
        );
        assert_eq!(child.config().default_headers["x-team"], "billing");
        assert!(child.config().retry.is_none());
        assert_eq!(child.config().timeout, Some(Duration::from_secs(5)));
        assert_eq!(
            child.config().circuit_breaker.as_ref().map(|p| p.name.as_str()),
            Some("parent")
        );

        assert_eq!(parent.config().default_headers["x-team"], "payments");
        assert!(parent.config().retry.is_some());
        assert_eq!(
            parent.config().base_url.as_ref().map(Url::as_str),
            Some("http://service.local/api/")
        );
        assert!(!std::ptr::eq(
            parent.circuit_breaker().unwrap(),
            child.circuit_breaker().unwrap()
        ));
    }

    #[test]
    fn test_production_preset() {
        let client = Client::production("https://api.example.com").unwrap();
        let config = client.config();
        assert!(config.tracing);
        assert_eq!(config.retry, Some(RetryPolicy::default()));
        assert_eq!(
            config.circuit_breaker.as_ref().map(|p| p.name.as_str()),
            Some("production-client")
        );
        assert_eq!(config.default_headers[USER_AGENT], "svckit-rest-client/1.0");
    }
}
