use std::future::Future;
use std::time::{Duration, Instant};

use tracing::{debug, warn};

use crate::client::VonageError;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
/// Redrives requests rejected with [`VonageError::Throttle`].
///
/// Each retry waits for the delay the throttle error carries (falling back to
/// `default_delay` when it is zero), capped at `max_delay`. Other errors are
/// returned immediately.
pub struct RetryPolicy {
    max_attempts: u32,
    default_delay: Duration,
    max_delay: Duration,
}

/// Upper bound on a single server-requested wait.
pub const DEFAULT_MAX_DELAY: Duration = Duration::from_secs(60);

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            default_delay: Duration::from_secs(1),
            max_delay: DEFAULT_MAX_DELAY,
        }
    }
}

impl RetryPolicy {
    /// `max_attempts` counts the first try; values below 1 are raised to 1.
    pub fn new(max_attempts: u32, default_delay: Duration) -> Self {
        Self {
            max_attempts: max_attempts.max(1),
            default_delay,
            max_delay: DEFAULT_MAX_DELAY,
        }
    }

    /// Cap every wait at `max_delay`, whatever the server asks for.
    pub fn with_max_delay(mut self, max_delay: Duration) -> Self {
        self.max_delay = max_delay;
        self
    }

    /// Single attempt, no retries.
    pub fn none() -> Self {
        Self::new(1, Duration::ZERO)
    }

    pub fn max_attempts(&self) -> u32 {
        self.max_attempts
    }

    pub fn default_delay(&self) -> Duration {
        self.default_delay
    }

    pub fn max_delay(&self) -> Duration {
        self.max_delay
    }

    /// Run `send` until it succeeds, fails with a non-throttle error, or the
    /// attempts run out. The last throttle error is returned as is.
    pub async fn run<T, F, Fut>(&self, mut send: F) -> Result<T, VonageError>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = Result<T, VonageError>>,
    {
        let started = Instant::now();
        let mut attempt = 1;
        loop {
            match send().await {
                Ok(value) => {
                    debug!(
                        attempts = attempt,
                        elapsed_ms = started.elapsed().as_millis() as u64,
                        "request completed"
                    );
                    return Ok(value);
                }
                Err(VonageError::Throttle { retry_after, .. }) if attempt < self.max_attempts => {
                    let delay = if retry_after.is_zero() {
                        self.default_delay
                    } else {
                        retry_after
                    }
                    .min(self.max_delay);
                    warn!(
                        attempt,
                        max_attempts = self.max_attempts,
                        delay_ms = delay.as_millis() as u64,
                        "request throttled, retrying"
                    );
                    tokio::time::sleep(delay).await;
                    attempt += 1;
                }
                Err(err) => {
                    if err.is_throttle() {
                        warn!(attempts = attempt, "request still throttled, giving up");
                    }
                    return Err(err);
                }
            }
        }
    }
}
