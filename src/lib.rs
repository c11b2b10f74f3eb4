//! # svckit - building blocks for HTTP microservices
//!
//! svckit bundles the pieces most services re-implement: JSON helpers, a
//! standard API response envelope, structured logging with request-scoped
//! context, and a REST client with retries and a circuit breaker.
//!
//! ## Quick Start
//!
//! ```no_run
//! use serde::Deserialize;
//! use svckit::{Client, Context, RequestConfig};
//! use std::time::Duration;
//!
//! #[derive(Deserialize)]
//! struct Order {
//!     id: u64,
//!     total_cents: u64,
//! }
//!
//! #[tokio::main]
//! async fn main() -> Result<(), svckit::Error> {
//!     // Tracing, default retries and a circuit breaker
//!     let client = Client::production("https://orders.example.com")?;
//!
//!     let ctx = Context::background()
//!         .with_request_id("req-42")
//!         .with_timeout(Duration::from_secs(2));
//!
//!     let response = client
//!         .request(RequestConfig::get("/orders/1001").context(ctx))
//!         .await?;
//!     let order: Order = response.json()?;
//!     println!("Order {} totals {} cents", order.id, order.total_cents);
//!     println!("Took {:?} over {} attempt(s)", response.latency, response.attempts);
//!
//!     Ok(())
//! }
//! ```
//!
//! ## Modules
//!
//! - [`json`] - encode, decode, validate, compact, indent and merge JSON
//! - [`envelope`] - `Accepted`/`Rejected`/`Failed` response envelope
//! - [`logger`] - init-once logger with context-derived handles
//! - [`Client`] - REST client; see [`retry`], [`circuit_breaker`] and [`transport`]
//!
//! ## Error Handling
//!
//! Every operation returns [`Result`]. The client only recovers from errors
//! inside its retry loop; a call that runs out of attempts reports the last
//! failure:
//!
//! ```no_run
//! use svckit::{Client, Error};
//!
//! # async fn example() -> Result<(), Error> {
//! # let client = Client::builder().base_url("https://api.example.com")?.default_retry().build()?;
//! match client.get("/endpoint").await {
//!     Ok(response) if response.is_success() => println!("{}", response.text()),
//!     Ok(response) => eprintln!("HTTP {}", response.status),
//!     Err(Error::RetryExhausted { attempts, last_error }) => {
//!         eprintln!("Gave up after {} attempts: {}", attempts, last_error);
//!     }
//!     Err(Error::CircuitOpen { name, .. }) => eprintln!("{} is unavailable", name),
//!     Err(e) => eprintln!("Other error: {}", e),
//! }
//! # Ok(())
//! # }
//! ```

pub mod circuit_breaker;
mod client;
mod context;
pub mod envelope;
mod error;
pub mod json;
pub mod logger;
mod request;
mod response;
pub mod retry;
pub mod transport;

pub use circuit_breaker::{CircuitBreaker, CircuitBreakerPolicy, CircuitState, Counts};
pub use client::{Client, ClientBuilder, ClientConfig};
pub use context::Context;
pub use envelope::{Envelope, Status, ValidationError};
pub use error::{BoxError, Error, Result};
pub use logger::{LogLevel, Logger, LoggerConfig, LoggerHandle};
pub use request::{Body, RequestConfig};
pub use response::Response;
pub use retry::RetryPolicy;
pub use transport::{PoolConfig, Transport};
