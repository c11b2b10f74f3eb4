//! Error types shared by every svckit module.
//!
//! JSON helpers, the REST client and the logger all report failures through
//! the single [`Error`] enum. Errors are always returned to the caller; the
//! only place that recovers from them internally is the client's retry loop.

use crate::circuit_breaker::CircuitState;
use bytes::Bytes;
use http::{HeaderMap, StatusCode};

/// Boxed error type used for transport failures from arbitrary transports.
pub type BoxError = Box<dyn std::error::Error + Send + Sync + 'static>;

/// The main error type for svckit.
///
/// # Examples
///
/// ```no_run
/// use svckit::{Client, Error};
///
/// # async fn example() -> Result<(), Error> {
/// let client = Client::builder()
///     .base_url("https://api.example.com")?
///     .default_retry()
///     .build()?;
///
/// match client.get("/endpoint").await {
///     Ok(response) => println!("Status: {}", response.status),
///     Err(Error::RetryExhausted { attempts, last_error }) => {
///         eprintln!("Gave up after {} attempts: {}", attempts, last_error);
///     }
///     Err(e) if e.is_cancellation() => eprintln!("Call was cancelled"),
///     Err(e) => eprintln!("Other error: {}", e),
/// }
/// # Ok(())
/// # }
/// ```
#[derive(thiserror::Error, Debug)]
pub enum Error {
    /// A value could not be encoded as JSON.
    #[error("Failed to encode JSON: {0}")]
    Encode(#[source] serde_json::Error),

    /// Input was not valid JSON or did not match the requested shape.
    ///
    /// The wrapped serde error carries the parser diagnostic, including the
    /// line and column where decoding failed.
    #[error("Failed to decode JSON: {0}")]
    Decode(#[source] serde_json::Error),

    /// A network-level error occurred (connection refused, DNS failure, reset, ...).
    #[error("Transport error: {0}")]
    Transport(#[source] BoxError),

    /// The transport gave up waiting for the server.
    #[error("Request timed out")]
    Timeout,

    /// The server answered with a status that the retry loop treats as a failure.
    ///
    /// Only produced as the terminal cause inside [`Error::RetryExhausted`];
    /// without a retry policy every response is handed back as-is.
    #[error("HTTP {status}")]
    HttpStatus {
        /// The HTTP status code
        status: StatusCode,
        /// The response headers
        headers: HeaderMap,
        /// The raw response body
        body: Bytes,
    },

    /// The circuit breaker rejected the call without reaching the transport.
    #[error("Circuit breaker '{name}' rejected the request ({state:?})")]
    CircuitOpen {
        /// Name of the breaker
        name: String,
        /// State the breaker was in when it rejected the call
        state: CircuitState,
    },

    /// All attempts allowed by the retry policy failed.
    #[error("Max retries exceeded after {attempts} attempts: {last_error}")]
    RetryExhausted {
        /// The number of attempts made
        attempts: u32,
        /// The failure observed on the final attempt
        last_error: Box<Error>,
    },

    /// The call's cancellation token fired.
    #[error("Request cancelled")]
    Cancelled,

    /// The call's deadline passed.
    #[error("Context deadline exceeded")]
    DeadlineExceeded,

    /// Invalid configuration was provided.
    #[error("Configuration error: {0}")]
    Configuration(String),

    /// An invalid URL was provided or produced.
    #[error("Invalid URL: {0}")]
    InvalidUrl(#[from] url::ParseError),
}

impl Error {
    /// Returns `true` if a retry policy may attempt the call again after this error.
    ///
    /// Transport errors, timeouts, circuit-breaker rejections and 5xx, 429 and
    /// 408 statuses are retryable. Cancellation is never retryable.
    ///
    /// # Examples
    ///
    /// ```
    /// use svckit::Error;
    /// use http::StatusCode;
    ///
    /// let err = Error::HttpStatus {
    ///     status: StatusCode::TOO_MANY_REQUESTS,
    ///     headers: http::HeaderMap::new(),
    ///     body: bytes::Bytes::new(),
    /// };
    /// assert!(err.is_retryable());
    ///
    /// assert!(!Error::Cancelled.is_retryable());
    /// ```
    pub fn is_retryable(&self) -> bool {
        match self {
            Error::Transport(_) | Error::Timeout | Error::CircuitOpen { .. } => true,
            Error::HttpStatus { status, .. } => crate::retry::is_retryable_status(*status),
            Error::Encode(_)
            | Error::Decode(_)
            | Error::RetryExhausted { .. }
            | Error::Cancelled
            | Error::DeadlineExceeded
            | Error::Configuration(_)
            | Error::InvalidUrl(_) => false,
        }
    }

    /// Returns `true` if the caller's context cancelled the call.
    pub fn is_cancellation(&self) -> bool {
        matches!(self, Error::Cancelled | Error::DeadlineExceeded)
    }

    /// Returns the HTTP status code carried by this error, looking through
    /// [`Error::RetryExhausted`].
    pub fn status(&self) -> Option<StatusCode> {
        match self {
            Error::HttpStatus { status, .. } => Some(*status),
            Error::RetryExhausted { last_error, .. } => last_error.status(),
            _ => None,
        }
    }

    /// Wraps a transport-level failure, for use by custom
    /// [`Transport`](crate::Transport) implementations.
    ///
    /// ```
    /// let err = svckit::Error::transport("connection reset");
    /// assert!(err.is_retryable());
    /// assert_eq!(err.to_string(), "Transport error: connection reset");
    /// ```
    pub fn transport<E>(error: E) -> Self
    where
        E: Into<BoxError>,
    {
        Error::Transport(error.into())
    }
}

impl From<reqwest::Error> for Error {
    fn from(error: reqwest::Error) -> Self {
        if error.is_timeout() {
            Error::Timeout
        } else {
            Error::Transport(Box::new(error))
        }
    }
}

/// A specialized `Result` type for svckit operations.
pub type Result<T> = std::result::Result<T, Error>;
