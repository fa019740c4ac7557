/// Retry logic with exponential backoff for transient store and network failures
use crate::{FloraError, Result};
use rand::Rng;
use std::time::Duration;
use tracing::{debug, error, warn};

/// Configuration for retry behavior
#[derive(Debug, Clone)]
pub struct RetryPolicy {
    /// Maximum number of attempts, the first one included
    pub max_attempts: u32,
    /// Initial backoff duration
    pub initial_backoff: Duration,
    /// Maximum backoff duration
    pub max_backoff: Duration,
    /// Backoff multiplier (typically 2.0)
    pub multiplier: f32,
    /// Add jitter to prevent thundering herd
    pub jitter: bool,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            initial_backoff: Duration::from_secs(1),
            max_backoff: Duration::from_secs(60),
            multiplier: 2.0,
            jitter: true,
        }
    }
}

impl RetryPolicy {
    /// Create a policy for network operations
    pub fn for_network() -> Self {
        Self {
            max_attempts: 5,
            initial_backoff: Duration::from_secs(2),
            max_backoff: Duration::from_secs(120),
            multiplier: 2.0,
            jitter: true,
        }
    }

    /// Create a policy for database operations
    pub fn for_database() -> Self {
        Self {
            max_attempts: 4,
            initial_backoff: Duration::from_millis(200),
            max_backoff: Duration::from_secs(10),
            multiplier: 2.0,
            jitter: true,
        }
    }

    /// Single attempt, no waiting
    pub fn none() -> Self {
        Self {
            max_attempts: 1,
            initial_backoff: Duration::ZERO,
            max_backoff: Duration::ZERO,
            multiplier: 1.0,
            jitter: false,
        }
    }

    /// Calculate backoff duration for attempt number
    fn calculate_backoff(&self, attempt: u32) -> Duration {
        let mut backoff = self.initial_backoff.as_millis() as f32;

        for _ in 0..attempt {
            backoff *= self.multiplier;
        }

        let mut duration =
            Duration::from_millis(backoff.min(self.max_backoff.as_millis() as f32) as u64);

        if self.jitter && duration.as_millis() >= 4 {
            let mut rng = rand::thread_rng();
            let jitter_ms = rng.gen_range(0..=(duration.as_millis() / 4) as u64);
            duration += Duration::from_millis(jitter_ms);
        }

        duration
    }
}

/// Execute an operation, retrying only errors classified as transient
pub fn with_retry<F, T>(mut operation: F, policy: &RetryPolicy, context: &str) -> Result<T>
where
    F: FnMut() -> Result<T>,
{
    let max_attempts = policy.max_attempts.max(1);
    let mut attempt = 0;

    loop {
        match operation() {
            Ok(result) => {
                if attempt > 0 {
                    debug!("Operation succeeded after {} retries", attempt);
                }
                return Ok(result);
            }
            Err(err) if !err.is_retryable() => {
                debug!("Non-retryable error in {}: {}", context, err);
                return Err(err);
            }
            Err(err) => {
                attempt += 1;
                if attempt >= max_attempts {
                    error!(
                        "All {} attempts failed for {}: {}",
                        max_attempts, context, err
                    );
                    return Err(escalate(err, max_attempts, context));
                }

                let backoff = policy.calculate_backoff(attempt - 1);
                warn!(
                    "Attempt {}/{} failed for {}: {}. Retrying in {:?}",
                    attempt, max_attempts, context, err, backoff
                );
                std::thread::sleep(backoff);
            }
        }
    }
}

/// Turn an exhausted transient error into a fatal one so callers stop retrying
fn escalate(err: FloraError, attempts: u32, context: &str) -> FloraError {
    match err {
        FloraError::Network { message, .. } => FloraError::Network {
            message: format!("{} (gave up after {} attempts: {})", message, attempts, context),
            retryable: false,
        },
        other => other,
    }
}
