//! Retries, per-attempt timeouts and cancellation.
//!
//! This example shows how to:
//! - Retry 5xx responses with exponential backoff
//! - Honor `Retry-After` on 429 responses
//! - Bound every attempt with a timeout
//! - Cancel a call from another task
//!
//! Run with: `cargo run --example retry_and_cancel`

use layerfetch::retry::{Delay, OrPredicate, RetryOn5xx, RetryOnTimeout, RetryOptions};
use layerfetch::{AbortController, Client, Error, FetchOptions};
use serde_json::Value;
use std::time::Duration;

#[tokio::main]
async fn main() -> Result<(), Error> {
    tracing_subscriber::fmt()
        .with_env_filter("layerfetch=debug,retry_and_cancel=info")
        .init();

    let client = Client::builder()
        .base_url("https://httpbin.org")?
        .timeout(Duration::from_secs(5))
        .retry(
            RetryOptions::new()
                .when(OrPredicate::new(vec![
                    Box::new(RetryOn5xx),
                    Box::new(RetryOnTimeout),
                ]))
                .attempts(3)
                .delay(Delay::exponential(
                    Duration::from_millis(200),
                    Duration::from_secs(2),
                    true,
                )),
        )
        .on_retry(|ctx| println!("  retry #{} of {}", ctx.attempt, ctx.request.url))
        .build()?;

    println!("=== 503 with exponential backoff ===");
    match client.get::<Value>("/status/503").await {
        Ok(reply) => println!("Unexpected success: {}", reply.status),
        Err(e) => println!("Gave up: {} ({:?})", e, e.kind()),
    }

    println!("=== Per-attempt timeout ===");
    let options = FetchOptions::new()
        .timeout(Duration::from_millis(500))
        .retry(RetryOptions::new().attempts(1));
    match client.fetch::<Value>("/delay/2", options).await {
        Ok(_) => println!("Unexpected success"),
        Err(e) => println!("Timed out: {}", e.is_timeout()),
    }

    println!("=== Honor Retry-After ===");
    let options = FetchOptions::new().retry(RetryOptions::new().attempts(1).delay(
        Delay::retry_after(Delay::Fixed(Duration::from_millis(100)), Duration::from_secs(3)),
    ));
    match client.fetch::<Value>("/status/429", options).await {
        Ok(reply) => println!("Succeeded after {} attempts", reply.attempts),
        Err(e) => println!("Still rate limited: {}", e),
    }

    println!("=== Cancel from another task ===");
    let controller = AbortController::new();
    let options = FetchOptions::new()
        .signal(controller.signal())
        .timeout(Duration::from_secs(30));
    let call = tokio::spawn({
        let client = client.clone();
        async move { client.fetch::<Value>("/delay/10", options).await }
    });
    tokio::time::sleep(Duration::from_millis(300)).await;
    controller.abort();
    match call.await {
        Ok(Err(e)) => println!("Cancelled: {}", e.is_cancelled()),
        Ok(Ok(_)) => println!("Unexpected success"),
        Err(e) => println!("Task failed: {}", e),
    }

    Ok(())
}
