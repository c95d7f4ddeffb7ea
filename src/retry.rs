//! Fixed-delay retry around a fallible async operation.
//!
//! The scheduler wraps each ingestion cycle in [`retry_fixed`]: the operation
//! runs up to `max_retries + 1` times, sleeping `delay` between attempts.
//! Sleeps go through `tokio::time`, so paused-clock tests advance instantly.

use std::fmt;
use std::future::Future;
use std::time::Duration;
use tokio::time::{Instant, sleep};
use tracing::{error, warn};

/// How a retried operation ended, with the number of attempts it took.
#[derive(Debug, Clone, PartialEq)]
pub enum Retried<T, E> {
    Succeeded { value: T, attempts: u32 },
    Exhausted { error: E, attempts: u32 },
}

impl<T, E> Retried<T, E> {
    pub fn attempts(&self) -> u32 {
        match self {
            Retried::Succeeded { attempts, .. } | Retried::Exhausted { attempts, .. } => *attempts,
        }
    }
}

/// Run `op` until it succeeds or `max_retries` retries have been spent.
pub async fn retry_fixed<T, E, F, Fut>(max_retries: u32, delay: Duration, mut op: F) -> Retried<T, E>
where
    F: FnMut(u32) -> Fut,
    Fut: Future<Output = Result<T, E>>,
    E: fmt::Display,
{
    let total_t0 = Instant::now();
    let mut attempt = 0u32;

    loop {
        attempt += 1;
        let attempt_t0 = Instant::now();
        match op(attempt).await {
            Ok(value) => {
                return Retried::Succeeded {
                    value,
                    attempts: attempt,
                };
            }
            Err(e) => {
                let attempt_dt = attempt_t0.elapsed();
                let total_dt = total_t0.elapsed();

                if attempt > max_retries {
                    error!(
                        attempt,
                        max = max_retries,
                        elapsed_ms_attempt = attempt_dt.as_millis() as u64,
                        elapsed_ms_total = total_dt.as_millis() as u64,
                        error = %e,
                        "Operation exhausted retries"
                    );
                    return Retried::Exhausted {
                        error: e,
                        attempts: attempt,
                    };
                }

                warn!(
                    attempt,
                    max = max_retries,
                    elapsed_ms_attempt = attempt_dt.as_millis() as u64,
                    elapsed_ms_total = total_dt.as_millis() as u64,
                    ?delay,
                    error = %e,
                    "Attempt failed; retrying after delay"
                );
                sleep(delay).await;
            }
        }
    }
}
