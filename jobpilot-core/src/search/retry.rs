use std::future::Future;
use std::time::Duration;

use rand::Rng;
use tokio::time::sleep;
use tracing::warn;

use crate::config::RetrySection;

use super::providers::{ProviderError, ProviderResult};

/// Bounded retry for rate-limited sources. Only `RateLimited` is retried;
/// every other error returns immediately so the orchestrator can move on.
#[derive(Debug, Clone)]
pub struct RetryPolicy {
    max_attempts: usize,
    schedule: Vec<Duration>,
    jitter_ms: u64,
}

#[derive(Debug, Clone)]
pub struct RetryOutcome<T> {
    pub result: T,
    pub attempts: usize,
}

impl RetryPolicy {
    pub fn new(config: RetrySection) -> Self {
        let mut schedule = config
            .schedule_ms
            .into_iter()
            .map(Duration::from_millis)
            .collect::<Vec<_>>();
        if schedule.is_empty() {
            schedule.push(Duration::from_millis(500));
            schedule.push(Duration::from_millis(1500));
        }
        Self {
            max_attempts: config.max_attempts.max(1),
            schedule,
            jitter_ms: config.jitter_ms,
        }
    }

    pub fn max_attempts(&self) -> usize {
        self.max_attempts
    }

    fn delay_for_attempt(&self, attempt: usize) -> Duration {
        if attempt == 0 {
            return Duration::ZERO;
        }
        self.schedule
            .get(attempt - 1)
            .or_else(|| self.schedule.last())
            .copied()
            .unwrap_or_default()
    }

    /// Runs `operation(attempt)` until it succeeds, fails with a
    /// non-retryable error, or the attempt budget is spent.
    pub async fn run<F, Fut, T>(
        &self,
        provider: &str,
        mut operation: F,
    ) -> ProviderResult<RetryOutcome<T>>
    where
        F: FnMut(usize) -> Fut,
        Fut: Future<Output = ProviderResult<T>>,
    {
        let mut attempt = 0usize;
        loop {
            match operation(attempt).await {
                Ok(result) => {
                    return Ok(RetryOutcome {
                        result,
                        attempts: attempt + 1,
                    })
                }
                Err(err @ ProviderError::RateLimited { .. }) => {
                    attempt += 1;
                    if attempt >= self.max_attempts {
                        warn!(provider, attempts = attempt, "rate limit retries exhausted");
                        return Err(err);
                    }
                    let mut delay = self.delay_for_attempt(attempt);
                    if self.jitter_ms > 0 {
                        let jitter = rand::thread_rng().gen_range(0..=self.jitter_ms);
                        delay += Duration::from_millis(jitter);
                    }
                    warn!(
                        provider,
                        attempt,
                        delay_ms = delay.as_millis() as u64,
                        "rate limited, backing off"
                    );
                    sleep(delay).await;
                }
                Err(err) => return Err(err),
            }
        }
    }
}
