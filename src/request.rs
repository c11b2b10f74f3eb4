//! Per-call request configuration.

use crate::{Context, Error, Result};
use bytes::Bytes;
use http::{HeaderMap, HeaderName, HeaderValue, Method};
use serde::Serialize;
use std::time::Duration;

/// A request body.
#[derive(Debug)]
pub enum Body {
    /// Raw bytes, sent as-is.
    Bytes(Bytes),
    /// UTF-8 text, sent as-is.
    Text(String),
    /// An already-encoded JSON document. Tagged `Content-Type: application/json`
    /// unless the request sets its own content type.
    Json(Bytes),
    /// Any `reqwest` body. Bodies that cannot be cloned are sent at most once.
    Stream(reqwest::Body),
}

impl Body {
    /// Encodes `value` as a JSON body.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Encode`] if `value` cannot be serialized.
    pub fn json<T>(value: &T) -> Result<Self>
    where
        T: Serialize + ?Sized,
    {
        crate::json::to_json(value).map(|bytes| Body::Json(Bytes::from(bytes)))
    }

    pub(crate) fn is_json(&self) -> bool {
        matches!(self, Body::Json(_))
    }

    pub(crate) fn into_reqwest(self) -> reqwest::Body {
        match self {
            Body::Bytes(bytes) | Body::Json(bytes) => reqwest::Body::from(bytes),
            Body::Text(text) => reqwest::Body::from(text),
            Body::Stream(body) => body,
        }
    }
}

impl From<Bytes> for Body {
    fn from(bytes: Bytes) -> Self {
        Body::Bytes(bytes)
    }
}

impl From<Vec<u8>> for Body {
    fn from(bytes: Vec<u8>) -> Self {
        Body::Bytes(Bytes::from(bytes))
    }
}

impl From<&'static [u8]> for Body {
    fn from(bytes: &'static [u8]) -> Self {
        Body::Bytes(Bytes::from_static(bytes))
    }
}

impl From<String> for Body {
    fn from(text: String) -> Self {
        Body::Text(text)
    }
}

impl From<&str> for Body {
    fn from(text: &str) -> Self {
        Body::Text(text.to_owned())
    }
}

impl From<reqwest::Body> for Body {
    fn from(body: reqwest::Body) -> Self {
        Body::Stream(body)
    }
}

/// Everything needed to make one call through a [`Client`](crate::Client).
///
/// Headers set here override the client's default headers with the same
/// name. Query parameters replace same-named pairs already in the URL.
///
/// # Examples
///
/// ```
/// use svckit::{Context, RequestConfig};
/// use std::time::Duration;
///
/// # fn main() -> Result<(), svckit::Error> {
/// let request = RequestConfig::post("/orders")
///     .json(&serde_json::json!({ "sku": "A-1", "qty": 2 }))?
///     .header("X-Tenant", "acme")?
///     .query("dry_run", "true")
///     .timeout(Duration::from_secs(5))
///     .context(Context::background().with_request_id("req-42"));
///
/// assert_eq!(request.method(), http::Method::POST);
/// assert_eq!(request.path(), "/orders");
/// # Ok(())
/// # }
/// ```
#[derive(Debug)]
pub struct RequestConfig {
    pub(crate) method: Method,
    pub(crate) path: String,
    pub(crate) body: Option<Body>,
    pub(crate) headers: HeaderMap,
    pub(crate) query: Vec<(String, String)>,
    pub(crate) timeout: Option<Duration>,
    pub(crate) context: Context,
}

impl RequestConfig {
    /// Creates a request for `method` and `path`.
    pub fn new(method: Method, path: impl Into<String>) -> Self {
        Self {
            method,
            path: path.into(),
            body: None,
            headers: HeaderMap::new(),
            query: Vec::new(),
            timeout: None,
            context: Context::background(),
        }
    }

    /// Creates a GET request.
    pub fn get(path: impl Into<String>) -> Self {
        Self::new(Method::GET, path)
    }

    /// Creates a POST request.
    pub fn post(path: impl Into<String>) -> Self {
        Self::new(Method::POST, path)
    }

    /// Creates a PUT request.
    pub fn put(path: impl Into<String>) -> Self {
        Self::new(Method::PUT, path)
    }

    /// Creates a PATCH request.
    pub fn patch(path: impl Into<String>) -> Self {
        Self::new(Method::PATCH, path)
    }

    /// Creates a DELETE request.
    pub fn delete(path: impl Into<String>) -> Self {
        Self::new(Method::DELETE, path)
    }

    /// Creates a HEAD request.
    pub fn head(path: impl Into<String>) -> Self {
        Self::new(Method::HEAD, path)
    }

    /// Creates an OPTIONS request.
    pub fn options(path: impl Into<String>) -> Self {
        Self::new(Method::OPTIONS, path)
    }

    /// Sets the body.
    pub fn body(mut self, body: impl Into<Body>) -> Self {
        self.body = Some(body.into());
        self
    }

    /// Encodes `value` as a JSON body.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Encode`] if `value` cannot be serialized.
    pub fn json<T>(mut self, value: &T) -> Result<Self>
    where
        T: Serialize + ?Sized,
    {
        self.body = Some(Body::json(value)?);
        Ok(self)
    }

    /// Sets a header, replacing any earlier value with the same name.
    ///
    /// # Errors
    ///
    /// Returns an error if the header name or value is invalid.
    pub fn header(mut self, name: impl AsRef<str>, value: impl AsRef<str>) -> Result<Self> {
        let name = HeaderName::try_from(name.as_ref())
            .map_err(|e| Error::Configuration(format!("Invalid header name: {}", e)))?;
        let value = HeaderValue::try_from(value.as_ref())
            .map_err(|e| Error::Configuration(format!("Invalid header value: {}", e)))?;
        self.headers.insert(name, value);
        Ok(self)
    }

    /// Sets several headers at once; each replaces an earlier value with the
    /// same name.
    pub fn headers(mut self, headers: HeaderMap) -> Self {
        self.headers.extend(headers);
        self
    }

    /// Sets a query parameter, replacing an earlier one with the same key.
    pub fn query(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        let key = key.into();
        let value = value.into();
        match self.query.iter_mut().find(|(k, _)| *k == key) {
            Some(slot) => slot.1 = value,
            None => self.query.push((key, value)),
        }
        self
    }

    /// Sets a timeout for each attempt, overriding the client timeout.
    pub fn timeout(mut self, timeout: Duration) -> Self {
        self.timeout = Some(timeout);
        self
    }

    /// Binds the call to a context whose cancellation and deadline bound the
    /// whole attempt sequence.
    pub fn context(mut self, context: Context) -> Self {
        self.context = context;
        self
    }

    /// Returns the HTTP method.
    pub fn method(&self) -> Method {
        self.method.clone()
    }

    /// Returns the target path.
    pub fn path(&self) -> &str {
        &self.path
    }

    /// Returns the query parameters in insertion order.
    pub fn query_params(&self) -> &[(String, String)] {
        &self.query
    }
}
