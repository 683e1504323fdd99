/// Bounded fixed-interval polling
use crate::error::WebvhResult;
use std::future::Future;
use tokio::time::{sleep_until, Duration, Instant};
use tracing::debug;

/// Attempts made while waiting for the endorser connection to become active
pub const ENDORSER_CONNECTION_ATTEMPTS: u32 = 5;

/// Wait between two attempts
pub const ENDORSER_CONNECTION_INTERVAL: Duration = Duration::from_secs(1);

/// Polling budget
#[derive(Debug, Clone, PartialEq)]
pub struct RetryPolicy {
    /// Maximum number of attempts
    pub max_attempts: u32,
    /// Fixed delay between attempts
    pub interval: Duration,
    /// Overall deadline measured from the first attempt
    pub deadline: Option<Duration>,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self::fixed(ENDORSER_CONNECTION_ATTEMPTS, ENDORSER_CONNECTION_INTERVAL)
    }
}

impl RetryPolicy {
    pub fn fixed(max_attempts: u32, interval: Duration) -> Self {
        Self {
            max_attempts,
            interval,
            deadline: None,
        }
    }

    pub fn with_deadline(mut self, deadline: Duration) -> Self {
        self.deadline = Some(deadline);
        self
    }
}

/// Run `check` until it yields a value or the budget is spent
///
/// `check` receives the 1-based attempt number. `Ok(None)` means the budget
/// ran out; errors from `check` end polling immediately.
pub async fn poll_until<T, F, Fut>(policy: &RetryPolicy, mut check: F) -> WebvhResult<Option<T>>
where
    F: FnMut(u32) -> Fut,
    Fut: Future<Output = WebvhResult<Option<T>>>,
{
    let deadline = policy.deadline.map(|budget| Instant::now() + budget);

    for attempt in 1..=policy.max_attempts {
        if let Some(value) = check(attempt).await? {
            return Ok(Some(value));
        }

        if attempt == policy.max_attempts {
            break;
        }

        let wake_at = Instant::now() + policy.interval;
        if deadline.is_some_and(|deadline| wake_at > deadline) {
            debug!(attempt, "Polling deadline reached");
            break;
        }

        sleep_until(wake_at).await;
    }

    Ok(None)
}
