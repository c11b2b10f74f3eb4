//! Call-scoped context: cancellation, deadline, request id and logger.
//!
//! A [`Context`] travels with a single logical call. The REST client uses its
//! cancellation token and deadline to bound the whole attempt sequence, and
//! [`crate::logger::from_context`] uses its request id and logger.

use crate::logger::LoggerHandle;
use crate::{Error, Result};
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;

/// Values scoped to one logical call.
///
/// Cheap to clone; clones share the same cancellation token.
///
/// # Examples
///
/// ```
/// use svckit::Context;
/// use std::time::Duration;
/// use tokio_util::sync::CancellationToken;
///
/// # #[tokio::main(flavor = "current_thread")]
/// # async fn main() {
/// let token = CancellationToken::new();
/// let ctx = Context::background()
///     .with_request_id("req-123")
///     .with_cancellation(token.clone())
///     .with_timeout(Duration::from_secs(5));
///
/// assert_eq!(ctx.request_id(), Some("req-123"));
/// assert!(ctx.err().is_none());
///
/// token.cancel();
/// assert!(ctx.err().unwrap().is_cancellation());
/// # }
/// ```
#[derive(Debug, Clone, Default)]
pub struct Context {
    cancel: Option<CancellationToken>,
    deadline: Option<Instant>,
    request_id: Option<Arc<str>>,
    logger: Option<LoggerHandle>,
}

impl Context {
    /// Returns an empty context that is never cancelled and has no deadline.
    pub fn background() -> Self {
        Self::default()
    }

    /// Binds a cancellation token.
    pub fn with_cancellation(mut self, token: CancellationToken) -> Self {
        self.cancel = Some(token);
        self
    }

    /// Sets a deadline. An earlier existing deadline is kept.
    pub fn with_deadline(mut self, deadline: Instant) -> Self {
        self.deadline = Some(match self.deadline {
            Some(existing) => existing.min(deadline),
            None => deadline,
        });
        self
    }

    /// Sets a deadline `timeout` from now.
    pub fn with_timeout(self, timeout: Duration) -> Self {
        self.with_deadline(Instant::now() + timeout)
    }

    /// Attaches a request identifier.
    pub fn with_request_id(mut self, request_id: impl Into<String>) -> Self {
        self.request_id = Some(Arc::from(request_id.into()));
        self
    }

    /// Attaches a logger, which [`crate::logger::from_context`] returns as-is.
    pub fn with_logger(mut self, logger: LoggerHandle) -> Self {
        self.logger = Some(logger);
        self
    }

    /// Returns the request identifier, if any.
    pub fn request_id(&self) -> Option<&str> {
        self.request_id.as_deref()
    }

    /// Returns the attached logger, if any.
    pub fn logger(&self) -> Option<&LoggerHandle> {
        self.logger.as_ref()
    }

    /// Returns the deadline, if any.
    pub fn deadline(&self) -> Option<Instant> {
        self.deadline
    }

    /// Returns the cancellation token, if any.
    pub fn cancellation_token(&self) -> Option<&CancellationToken> {
        self.cancel.as_ref()
    }

    /// Returns the reason this context is done, or `None` while it is live.
    ///
    /// Cancellation takes precedence over an expired deadline.
    pub fn err(&self) -> Option<Error> {
        if self.cancel.as_ref().is_some_and(|t| t.is_cancelled()) {
            return Some(Error::Cancelled);
        }
        match self.deadline {
            Some(deadline) if Instant::now() >= deadline => Some(Error::DeadlineExceeded),
            _ => None,
        }
    }

    /// Completes when the context is cancelled or its deadline passes.
    ///
    /// Never completes for a background context.
    pub async fn done(&self) -> Error {
        let cancelled = async {
            match &self.cancel {
                Some(token) => token.cancelled().await,
                None => std::future::pending().await,
            }
        };
        let expired = async {
            match self.deadline {
                Some(deadline) => tokio::time::sleep_until(deadline).await,
                None => std::future::pending().await,
            }
        };

        tokio::select! {
            biased;
            _ = cancelled => Error::Cancelled,
            _ = expired => Error::DeadlineExceeded,
        }
    }

    /// Runs `future` until it completes or the context is done, whichever
    /// happens first.
    pub async fn run<F, T>(&self, future: F) -> Result<T>
    where
        F: Future<Output = Result<T>>,
    {
        if let Some(err) = self.err() {
            return Err(err);
        }
        tokio::select! {
            biased;
            err = self.done() => Err(err),
            result = future => result,
        }
    }

    /// Sleeps for `delay` unless the context is done first.
    pub async fn sleep(&self, delay: Duration) -> Result<()> {
        self.run(async {
            tokio::time::sleep(delay).await;
            Ok(())
        })
        .await
    }
}
