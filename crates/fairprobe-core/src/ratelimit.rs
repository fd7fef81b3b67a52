use crate::config::{OverLimitMode, RateLimitConfig};
use crate::errors::AuditError;
use std::collections::VecDeque;
use tokio::sync::Mutex;
use tokio::time::{Duration, Instant};
use tokio_util::sync::CancellationToken;

/// Sliding-window limiter: at most `max_calls` acquisitions in any trailing
/// `window`. Owned by one audit run and shared by its workers.
#[derive(Debug)]
pub struct RateLimiter {
    max_calls: usize,
    window: Duration,
    mode: OverLimitMode,
    calls: Mutex<VecDeque<Instant>>,
}

impl RateLimiter {
    pub fn new(max_calls: usize, window: Duration, mode: OverLimitMode) -> Self {
        Self {
            max_calls: max_calls.max(1),
            window,
            mode,
            calls: Mutex::new(VecDeque::new()),
        }
    }

    pub fn from_config(cfg: &RateLimitConfig) -> Self {
        Self::new(cfg.max_calls, Duration::from_secs(cfg.window_seconds), cfg.mode)
    }

    pub async fn acquire(&self, cancel: &CancellationToken) -> Result<(), AuditError> {
        self.acquire_many(1, cancel).await
    }

    /// Reserves `n` slots at once, so every probe of a pair is admitted in the
    /// same instant or none is.
    ///
    /// In block mode this waits until the window has room; in fail-fast mode
    /// it returns `RateLimitExceeded` with the time until room frees up.
    pub async fn acquire_many(&self, n: usize, cancel: &CancellationToken) -> Result<(), AuditError> {
        self.acquire_with_mode(n, self.mode, cancel).await
    }

    /// Like [`acquire_many`](Self::acquire_many) but always waits, whatever the
    /// configured mode. Used for retries of a probe whose pair is already
    /// admitted.
    pub async fn acquire_blocking(&self, n: usize, cancel: &CancellationToken) -> Result<(), AuditError> {
        self.acquire_with_mode(n, OverLimitMode::Block, cancel).await
    }

    async fn acquire_with_mode(
        &self,
        n: usize,
        mode: OverLimitMode,
        cancel: &CancellationToken,
    ) -> Result<(), AuditError> {
        if n > self.max_calls {
            return Err(AuditError::Configuration(format!(
                "cannot reserve {} calls in a window of {}",
                n, self.max_calls
            )));
        }

        loop {
            if cancel.is_cancelled() {
                return Err(AuditError::Cancelled);
            }

            let wait = {
                let mut calls = self.calls.lock().await;
                let now = Instant::now();
                while calls
                    .front()
                    .is_some_and(|t| now.duration_since(*t) >= self.window)
                {
                    calls.pop_front();
                }

                if calls.len() + n <= self.max_calls {
                    for _ in 0..n {
                        calls.push_back(now);
                    }
                    return Ok(());
                }

                // the slot that must expire before n more calls fit
                let idx = calls.len() + n - self.max_calls - 1;
                (calls[idx] + self.window).saturating_duration_since(now)
            };

            if mode == OverLimitMode::FailFast {
                return Err(AuditError::RateLimitExceeded { retry_after: wait });
            }

            tracing::debug!(
                event = "fairprobe.ratelimit.wait",
                wait_ms = wait.as_millis() as u64,
                requested = n,
            );

            tokio::select! {
                _ = cancel.cancelled() => return Err(AuditError::Cancelled),
                _ = tokio::time::sleep(wait) => {}
            }
        }
    }

    /// Timestamps still inside the trailing window.
    pub async fn recorded(&self) -> Vec<Instant> {
        self.calls.lock().await.iter().copied().collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;

    fn max_in_any_window(times: &[Instant], window: Duration) -> usize {
        times
            .iter()
            .map(|end| {
                times
                    .iter()
                    .filter(|t| **t <= *end && end.duration_since(**t) < window)
                    .count()
            })
            .max()
            .unwrap_or(0)
    }

    #[tokio::test(start_paused = true)]
    async fn test_fourth_and_fifth_wait_for_window() {
        let limiter = RateLimiter::new(3, Duration::from_secs(60), OverLimitMode::Block);
        let cancel = CancellationToken::new();
        let start = Instant::now();

        let mut admitted = Vec::new();
        for _ in 0..5 {
            limiter.acquire(&cancel).await.unwrap();
            admitted.push(Instant::now());
        }

        for t in &admitted[..3] {
            assert_eq!(t.duration_since(start), Duration::ZERO);
        }
        assert!(admitted[3].duration_since(start) >= Duration::from_secs(60));
        assert!(admitted[4].duration_since(start) >= Duration::from_secs(60));
        assert!(max_in_any_window(&admitted, Duration::from_secs(60)) <= 3);
    }

    #[tokio::test(start_paused = true)]
    async fn test_staggered_calls_free_one_slot_at_a_time() {
        let limiter = RateLimiter::new(3, Duration::from_secs(60), OverLimitMode::Block);
        let cancel = CancellationToken::new();
        let start = Instant::now();

        let mut admitted = Vec::new();
        for i in 0..3 {
            limiter.acquire(&cancel).await.unwrap();
            admitted.push(Instant::now());
            if i < 2 {
                tokio::time::sleep(Duration::from_secs(10)).await;
            }
        }
        limiter.acquire(&cancel).await.unwrap();
        admitted.push(Instant::now());
        limiter.acquire(&cancel).await.unwrap();
        admitted.push(Instant::now());

        assert_eq!(admitted[3].duration_since(start), Duration::from_secs(60));
        assert_eq!(admitted[4].duration_since(start), Duration::from_secs(70));
        assert!(max_in_any_window(&admitted, Duration::from_secs(60)) <= 3);
    }

    #[tokio::test(start_paused = true)]
    async fn test_concurrent_workers_share_one_window() {
        let limiter = Arc::new(RateLimiter::new(3, Duration::from_secs(60), OverLimitMode::Block));
        let cancel = CancellationToken::new();

        let mut handles = Vec::new();
        for _ in 0..7 {
            let l = limiter.clone();
            let c = cancel.clone();
            handles.push(tokio::spawn(async move {
                l.acquire(&c).await.unwrap();
                Instant::now()
            }));
        }
        let mut admitted = Vec::new();
        for h in handles {
            admitted.push(h.await.unwrap());
        }
        admitted.sort();
        assert!(max_in_any_window(&admitted, Duration::from_secs(60)) <= 3);
    }

    #[tokio::test(start_paused = true)]
    async fn test_fail_fast_reports_retry_after() {
        let limiter = RateLimiter::new(3, Duration::from_secs(60), OverLimitMode::FailFast);
        let cancel = CancellationToken::new();
        limiter.acquire_many(2, &cancel).await.unwrap();

        let err = limiter.acquire_many(2, &cancel).await.unwrap_err();
        match err {
            AuditError::RateLimitExceeded { retry_after } => {
                assert_eq!(retry_after, Duration::from_secs(60))
            }
            other => panic!("unexpected {other:?}"),
        }
        // a failed reservation records nothing
        assert_eq!(limiter.recorded().await.len(), 2);

        limiter.acquire_blocking(2, &cancel).await.unwrap();
        assert_eq!(limiter.recorded().await.len(), 2);
    }

    #[tokio::test(start_paused = true)]
    async fn test_cancel_while_waiting() {
        let limiter = Arc::new(RateLimiter::new(1, Duration::from_secs(60), OverLimitMode::Block));
        let cancel = CancellationToken::new();
        limiter.acquire(&cancel).await.unwrap();

        let l = limiter.clone();
        let c = cancel.clone();
        let waiter = tokio::spawn(async move { l.acquire(&c).await });
        tokio::time::sleep(Duration::from_secs(5)).await;
        cancel.cancel();
        assert!(matches!(waiter.await.unwrap(), Err(AuditError::Cancelled)));
    }

    #[tokio::test]
    async fn test_oversized_reservation_is_config_error() {
        let limiter = RateLimiter::new(2, Duration::from_secs(1), OverLimitMode::Block);
        let err = limiter
            .acquire_many(3, &CancellationToken::new())
            .await
            .unwrap_err();
        assert!(matches!(err, AuditError::Configuration(_)));
    }
}
