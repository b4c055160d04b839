//! Bounded exponential backoff for calls to external services.
//!
//! Safe to repeat because every write downstream is an upsert.

use crate::error::Result;
use rand::Rng;
use std::future::Future;
use std::time::Duration;

/// Run `call` up to `max_attempts` times. Only upstream failures are retried;
/// the delay before retry `n` is `base * 3^n` plus up to `base / 2` of jitter.
pub async fn with_backoff<T, F, Fut>(
    op: &str,
    max_attempts: u32,
    base: Duration,
    mut call: F,
) -> Result<T>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<T>>,
{
    let mut attempt = 0u32;
    loop {
        match call().await {
            Ok(value) => return Ok(value),
            Err(e) if e.is_retryable() && attempt + 1 < max_attempts => {
                let delay = base * 3u32.pow(attempt) + jitter(base / 2);
                log::warn!(
                    "[RETRY] {} attempt {}/{} failed: {} (retrying in {:?})",
                    op,
                    attempt + 1,
                    max_attempts,
                    e,
                    delay
                );
                tokio::time::sleep(delay).await;
                attempt += 1;
            }
            Err(e) => return Err(e),
        }
    }
}

fn jitter(cap: Duration) -> Duration {
    let cap_ms = cap.as_millis() as u64;
    Duration::from_millis(rand::thread_rng().gen_range(0..=cap_ms))
}
