//! Bounded re-attempts with exponential backoff, cancellable mid-wait.
//!
//! Mirrors `internal/retry/retry.go`: `retry` calls `op` up to
//! `max_retries + 1` times (one initial attempt plus `max_retries` retries),
//! sleeping `backoff(attempt)` between attempts, where `attempt` is the
//! 0-based index of the attempt that just failed.

use std::future::Future;
use std::time::Duration;

use tokio_util::sync::CancellationToken;

use crate::error::{KonvahtiError, Result};

/// `min * 2^attempt`, clamped to `max`. Saturates rather than panicking on
/// overflow.
pub fn exponential_backoff(min: Duration, max: Duration) -> impl Fn(u32) -> Duration + Clone {
    move |attempt: u32| {
        let factor = 1u64.checked_shl(attempt).unwrap_or(u64::MAX);
        match min
            .checked_mul(factor.min(u32::MAX as u64) as u32)
            .filter(|d| *d <= max)
        {
            Some(d) => d,
            None => max,
        }
    }
}

/// Invokes `op` until it succeeds, the retry budget is exhausted, or `token`
/// is cancelled. `op` is called with a fresh attempt index each time
/// (0-based); the returned future owns whatever per-attempt context it
/// needs.
pub async fn retry<T, E, F, Fut>(
    token: &CancellationToken,
    max_retries: u32,
    backoff: impl Fn(u32) -> Duration,
    mut op: F,
) -> Result<T>
where
    F: FnMut(u32) -> Fut,
    Fut: Future<Output = std::result::Result<T, E>>,
    E: Into<anyhow::Error>,
{
    let mut last_err: Option<anyhow::Error> = None;

    for attempt in 0..=max_retries {
        if token.is_cancelled() {
            return Err(KonvahtiError::Cancelled);
        }

        match op(attempt).await {
            Ok(value) => return Ok(value),
            Err(err) => last_err = Some(err.into()),
        }

        if attempt == max_retries {
            break;
        }

        let delay = backoff(attempt);
        tokio::select! {
            _ = token.cancelled() => return Err(KonvahtiError::Cancelled),
            _ = tokio::time::sleep(delay) => {}
        }
    }

    Err(KonvahtiError::Source(
        last_err.unwrap_or_else(|| anyhow::anyhow!("retry exhausted with no recorded error")),
    ))
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicU32, Ordering};

    #[test]
    fn backoff_stays_within_bounds() {
        let min = Duration::from_millis(100);
        let max = Duration::from_millis(2000);
        let backoff = exponential_backoff(min, max);
        for attempt in 0..64 {
            let d = backoff(attempt);
            assert!(d >= min, "attempt {attempt}: {d:?} < {min:?}");
            assert!(d <= max, "attempt {attempt}: {d:?} > {max:?}");
        }
    }

    #[tokio::test]
    async fn retries_exact_budget_on_permanent_failure() {
        let calls = AtomicU32::new(0);
        let token = CancellationToken::new();
        let result: Result<()> = retry(
            &token,
            3,
            |_| Duration::from_millis(0),
            |_attempt| {
                calls.fetch_add(1, Ordering::SeqCst);
                async { Err::<(), anyhow::Error>(anyhow::anyhow!("nope")) }
            },
        )
        .await;

        assert!(result.is_err());
        assert_eq!(calls.load(Ordering::SeqCst), 4);
    }

    #[tokio::test]
    async fn succeeds_on_attempt_k() {
        let calls = AtomicU32::new(0);
        let token = CancellationToken::new();
        let result = retry(
            &token,
            3,
            |_| Duration::from_millis(0),
            |_attempt| {
                let n = calls.fetch_add(1, Ordering::SeqCst) + 1;
                async move {
                    if n < 2 {
                        Err::<(), anyhow::Error>(anyhow::anyhow!("not yet"))
                    } else {
                        Ok(())
                    }
                }
            },
        )
        .await;

        assert!(result.is_ok());
        assert_eq!(calls.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn cancellation_stops_further_attempts() {
        let calls = AtomicU32::new(0);
        let token = CancellationToken::new();
        let token_clone = token.clone();
        let result: Result<()> = retry(
            &token,
            5,
            |_| Duration::from_millis(0),
            |_attempt| {
                let n = calls.fetch_add(1, Ordering::SeqCst) + 1;
                if n == 2 {
                    token_clone.cancel();
                }
                async move { Err::<(), anyhow::Error>(anyhow::anyhow!("fail")) }
            },
        )
        .await;

        assert!(matches!(result, Err(KonvahtiError::Cancelled)));
        assert_eq!(calls.load(Ordering::SeqCst), 2);
    }
}
