//! Periodic task runner with circuit breaker
//!
//! Runs a background job on a fixed interval, retries failed runs with
//! exponential backoff and gives up after too many consecutive failures.

use std::time::Duration;
use tokio::time::sleep;
use tracing::{debug, error, warn};

/// Circuit breaker configuration for background tasks
#[derive(Debug, Clone)]
pub struct CircuitBreakerConfig {
    /// Maximum number of consecutive failures before the task is abandoned
    pub max_consecutive_failures: u32,
    /// Initial delay between retries
    pub initial_retry_delay: Duration,
    /// Maximum delay between retries
    pub max_retry_delay: Duration,
}

impl Default for CircuitBreakerConfig {
    fn default() -> Self {
        Self {
            max_consecutive_failures: 5,
            initial_retry_delay: Duration::from_secs(30),
            max_retry_delay: Duration::from_secs(3600),
        }
    }
}

#[derive(Debug, Clone, PartialEq, thiserror::Error)]
#[error("Task '{task_name}' exceeded {failures} consecutive failures, last error: {last_error}")]
pub struct CircuitOpen {
    pub task_name: String,
    pub failures: u32,
    pub last_error: String,
}

/// Internal state for circuit breaker
#[derive(Debug)]
struct CircuitBreakerState {
    consecutive_failures: u32,
    current_retry_delay: Duration,
}

impl CircuitBreakerState {
    fn new(initial_delay: Duration) -> Self {
        Self {
            consecutive_failures: 0,
            current_retry_delay: initial_delay,
        }
    }

    /// Returns the delay to wait before the next attempt
    fn record_failure(&mut self, max_delay: Duration) -> Duration {
        self.consecutive_failures += 1;
        let delay = self.current_retry_delay;
        // Exponential backoff with cap
        self.current_retry_delay = std::cmp::min(self.current_retry_delay * 2, max_delay);
        delay
    }

    fn reset(&mut self, initial_delay: Duration) {
        self.consecutive_failures = 0;
        self.current_retry_delay = initial_delay;
    }
}

/// Run `task_fn` every `interval` until it fails too often in a row
///
/// A successful run waits the full interval before the next one. A failed
/// run is retried after the current backoff delay, which doubles up to
/// `max_retry_delay`. Only returns once `max_consecutive_failures` is reached.
pub async fn run_periodic_with_circuit_breaker<F, Fut>(
    task_name: &str,
    interval: Duration,
    config: CircuitBreakerConfig,
    mut task_fn: F,
) -> CircuitOpen
where
    F: FnMut() -> Fut,
    Fut: std::future::Future<Output = Result<(), String>>,
{
    let mut state = CircuitBreakerState::new(config.initial_retry_delay);

    loop {
        match task_fn().await {
            Ok(()) => {
                if state.consecutive_failures > 0 {
                    warn!(
                        "Task '{}' recovered after {} failures",
                        task_name, state.consecutive_failures
                    );
                }
                state.reset(config.initial_retry_delay);
                debug!("Task '{}' next run in {:?}", task_name, interval);
                sleep(interval).await;
            }
            Err(e) => {
                let delay = state.record_failure(config.max_retry_delay);
                error!(
                    "Task '{}' failed (attempt {}/{}): {}",
                    task_name, state.consecutive_failures, config.max_consecutive_failures, e
                );

                if state.consecutive_failures >= config.max_consecutive_failures {
                    error!("Task '{}' stopped after repeated failures", task_name);
                    return CircuitOpen {
                        task_name: task_name.to_string(),
                        failures: state.consecutive_failures,
                        last_error: e,
                    };
                }

                warn!("Task '{}' will retry in {:?}", task_name, delay);
                sleep(delay).await;
            }
        }
    }
}
