//! Retries, circuit breaking, deadlines and context-scoped logging.
//!
//! The client points at an endpoint that always answers 503, so every call
//! runs out of retries until the circuit breaker opens and starts rejecting
//! calls without touching the network.
//!
//! Run with: `cargo run --example resilient_client`

use std::time::Duration;
use svckit::logger::{self, LogLevel, LoggerConfig};
use svckit::{CircuitBreakerPolicy, Client, Context, Error, RequestConfig, RetryPolicy};

#[tokio::main]
async fn main() -> Result<(), Error> {
    logger::init(
        LoggerConfig::from_env()
            .with_level(LogLevel::Debug)
            .with_file_path(None),
    )?;

    let client = Client::builder()
        .base_url("https://httpbin.org")?
        .default_header("User-Agent", "svckit-demo/1.0")?
        .timeout(Duration::from_secs(5))
        .retry(
            RetryPolicy::new(
                3,
                Duration::from_millis(200),
                Duration::from_secs(2),
                2.0,
            )
            .with_jitter(),
        )
        .circuit_breaker(
            CircuitBreakerPolicy::new("httpbin")
                .with_max_requests(1)
                .with_timeout(Duration::from_secs(30))
                .with_ready_to_trip(|counts| counts.consecutive_failures >= 3),
        )
        .tracing(true)
        .build()?;

    for call in 1..=4 {
        let ctx = Context::background()
            .with_request_id(format!("demo-{call}"))
            .with_timeout(Duration::from_secs(10));
        let log = logger::from_context(&ctx).with_field("call", call);

        let request = RequestConfig::get("/status/503").context(ctx);
        match client.request(request).await {
            Ok(response) => log.info(format!("HTTP {}", response.status)),
            Err(Error::RetryExhausted {
                attempts,
                last_error,
            }) => log.warn(format!("gave up after {attempts} attempts: {last_error}")),
            Err(e) if e.is_cancellation() => log.warn(format!("call abandoned: {e}")),
            Err(e) => log.error(e),
        }
        log.info(format!("breaker is {:?}", client.circuit_state()));
    }

    // A derived client inherits headers and policies but has its own breaker.
    let fresh = client.to_builder().without_retry().build()?;
    let response = fresh.get("/get").await?;
    logger::from_context(&Context::background()).info(format!(
        "derived client: HTTP {} in {:?}",
        response.status, response.latency
    ));

    Ok(())
}
