// src/poll.rs - Fixed-interval polling with an optional deadline
use std::future::Future;
use std::time::Duration;
use tokio::time::Instant;

/// Result of a bounded poll.
#[derive(Debug, Clone, PartialEq)]
pub enum PollOutcome<T> {
    Ready(T),
    TimedOut { elapsed: Duration },
}

/// Runs a step at a fixed interval until it yields a value, fails, or the
/// deadline passes. `timeout: None` polls until the step finishes.
#[derive(Debug, Clone, Copy)]
pub struct BoundedPoll {
    pub interval: Duration,
    pub timeout: Option<Duration>,
}

impl BoundedPoll {
    pub fn new(interval: Duration, timeout: Duration) -> Self {
        Self { interval, timeout: Some(timeout) }
    }

    pub fn unbounded(interval: Duration) -> Self {
        Self { interval, timeout: None }
    }

    /// The step runs at least once, even with a zero timeout.
    pub async fn until<T, E, F, Fut>(&self, mut step: F) -> Result<PollOutcome<T>, E>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = Result<Option<T>, E>>,
    {
        let start = Instant::now();
        loop {
            if let Some(value) = step().await? {
                return Ok(PollOutcome::Ready(value));
            }
            let elapsed = start.elapsed();
            if let Some(limit) = self.timeout {
                if elapsed >= limit {
                    return Ok(PollOutcome::TimedOut { elapsed });
                }
            }
            if self.interval.is_zero() {
                tokio::task::yield_now().await;
            } else {
                tokio::time::sleep(self.interval).await;
            }
        }
    }
}
