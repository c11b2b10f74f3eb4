//! Response type returned by the REST client.
//!
//! The body is fully drained before a [`Response`] is handed out, so every
//! view over it (text, JSON, headers) can be taken any number of times.

use crate::Result;
use bytes::Bytes;
use http::{HeaderMap, StatusCode};
use serde::de::DeserializeOwned;
use std::time::Duration;

/// A completed HTTP response.
///
/// # Examples
///
/// ```no_run
/// use serde::Deserialize;
/// use svckit::Client;
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
///     .build()?;
///
/// let response = client.get("/users/123").await?;
/// if response.is_success() {
///     let user: User = response.json()?;
///     println!("User {}: {}", user.id, user.name);
/// } else {
///     println!("HTTP {}: {}", response.status, response.text());
/// }
/// println!("Took {:?} over {} attempt(s)", response.latency, response.attempts);
/// # Ok(())
/// # }
/// ```
#[derive(Debug, Clone)]
pub struct Response {
    /// The HTTP status code.
    pub status: StatusCode,

    /// The response headers.
    pub headers: HeaderMap,

    /// The raw response body.
    pub body: Bytes,

    /// Number of attempts made, including the one that produced this response.
    pub attempts: u32,

    /// Time from the start of the call until the body was drained, including
    /// any backoff waits.
    pub latency: Duration,
}

impl Response {
    /// Creates a response from a single attempt.
    pub fn new(status: StatusCode, headers: HeaderMap, body: Bytes) -> Self {
        Self {
            status,
            headers,
            body,
            attempts: 1,
            latency: Duration::ZERO,
        }
    }

    /// Returns `true` if the status code is in 200..=299.
    pub fn is_success(&self) -> bool {
        self.status.is_success()
    }

    /// Returns the body as text, replacing invalid UTF-8 sequences.
    pub fn text(&self) -> String {
        String::from_utf8_lossy(&self.body).into_owned()
    }

    /// Decodes the body as JSON.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Decode`](crate::Error::Decode) if the body is not
    /// valid JSON for `T`.
    pub fn json<T>(&self) -> Result<T>
    where
        T: DeserializeOwned,
    {
        crate::json::from_json(&self.body)
    }

    /// Returns a header value, if present and valid visible ASCII.
    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers.get(name).and_then(|v| v.to_str().ok())
    }

    /// Returns `true` if more than one attempt was made.
    pub fn was_retried(&self) -> bool {
        self.attempts > 1
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::Error;
    use serde::Deserialize;

    fn response(status: u16, body: &'static str) -> Response {
        let mut headers = HeaderMap::new();
        headers.insert("content-type", "application/json".parse().unwrap());
        Response::new(
            StatusCode::from_u16(status).unwrap(),
            headers,
            Bytes::from_static(body.as_bytes()),
        )
    }

    #[test]
    fn test_is_success_range() {
        assert!(response(200, "").is_success());
        assert!(response(204, "").is_success());
        assert!(response(299, "").is_success());
        assert!(!response(199, "").is_success());
        assert!(!response(300, "").is_success());
        assert!(!response(404, "").is_success());
        assert!(!response(500, "").is_success());
    }

    #[test]
    fn test_json_and_text_views() {
        #[derive(Deserialize, Debug, PartialEq)]
        struct Item {
            id: u32,
        }

        let resp = response(200, r#"{"id":7}"#);
        assert_eq!(resp.json::<Item>().unwrap(), Item { id: 7 });
        assert_eq!(resp.text(), r#"{"id":7}"#);
        // Views do not consume the body.
        assert_eq!(resp.json::<Item>().unwrap().id, 7);
        assert_eq!(resp.header("Content-Type"), Some("application/json"));
        assert_eq!(resp.header("x-missing"), None);
    }

    #[test]
    fn test_json_mismatch_is_decode_error() {
        let resp = response(200, "not json");
        let err = resp.json::<serde_json::Value>().unwrap_err();
        assert!(matches!(err, Error::Decode(_)));
    }

    #[test]
    fn test_text_is_lossy() {
        let resp = Response::new(
            StatusCode::OK,
            HeaderMap::new(),
            Bytes::from_static(b"ok\xff"),
        );
        assert_eq!(resp.text(), "ok\u{fffd}");
        assert!(!resp.was_retried());
    }
}
