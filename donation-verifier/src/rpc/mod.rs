//! RPC-backed chain-access collaborators.
//!
//! Both clients retry transport failures with exponential backoff and
//! jitter. Retrying here is about flaky connections to one endpoint; the
//! engine itself never retries a claim, it reports status and lets the
//! caller decide.

pub mod evm;
pub mod solana;

pub use evm::EvmRpcClient;
pub use solana::SolanaRpcClient;

use std::future::Future;
use std::time::Duration;
use tokio::time::sleep;
use tracing::debug;

use crate::error::{Result, VerifyError};

/// Exponential backoff delays in milliseconds.
const BACKOFF_DELAYS_MS: [u64; 3] = [500, 1500, 4000];

/// Jitter percentage for backoff (±10%).
const JITTER_PERCENT: f64 = 0.1;

/// Default backoff schedule; one attempt per entry.
pub fn default_backoff() -> Vec<Duration> {
    BACKOFF_DELAYS_MS.iter().map(|ms| Duration::from_millis(*ms)).collect()
}

/// Run `attempt` until it succeeds, fails non-transiently, or the schedule runs out.
///
/// Only `ChainUnavailable` is retried; `NotFound` and malformed input are
/// answers, not transport failures.
pub(crate) async fn with_backoff<T, F, Fut>(schedule: &[Duration], mut attempt: F) -> Result<T>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<T>>,
{
    let mut last_error = None;

    for (index, base_delay) in schedule.iter().enumerate() {
        match attempt().await {
            Ok(value) => return Ok(value),
            Err(error @ VerifyError::ChainUnavailable(_)) => {
                debug!("RPC attempt {} failed: {}", index + 1, error);
                last_error = Some(error);

                // Apply jitter and sleep (except on last attempt)
                if index < schedule.len() - 1 {
                    let jitter = rand::random::<f64>() * JITTER_PERCENT * 2.0 - JITTER_PERCENT;
                    sleep(base_delay.mul_f64(1.0 + jitter)).await;
                }
            }
            Err(error) => return Err(error),
        }
    }

    Err(last_error.unwrap_or_else(|| {
        VerifyError::ChainUnavailable(format!("no attempts made ({} scheduled)", schedule.len()))
    }))
}

/// Map a transport error message onto the verifier taxonomy.
pub(crate) fn classify_message(message: &str) -> VerifyError {
    let lower = message.to_lowercase();

    if lower.contains("invalid argument")
        || lower.contains("invalid params")
        || lower.contains("invalid param")
        || lower.contains("invalid signature")
    {
        return VerifyError::MalformedReference(message.to_string());
    }

    if lower.contains("rate limit") || lower.contains("too many requests") {
        return VerifyError::ChainUnavailable(
            "Rate limited by RPC provider. Try again later.".to_string(),
        );
    }

    VerifyError::ChainUnavailable(message.to_string())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};

    #[tokio::test]
    async fn test_backoff_retries_unavailable_then_succeeds() {
        let counter = AtomicUsize::new(0);
        let calls = &counter;
        let schedule = vec![Duration::from_millis(1); 3];

        let result = with_backoff(&schedule, move || async move {
            if calls.fetch_add(1, Ordering::SeqCst) < 2 {
                Err(VerifyError::ChainUnavailable("connection reset".into()))
            } else {
                Ok(7)
            }
        })
        .await;

        assert_eq!(result.unwrap(), 7);
        assert_eq!(counter.load(Ordering::SeqCst), 3);
    }

    #[tokio::test]
    async fn test_backoff_does_not_retry_answers() {
        let counter = AtomicUsize::new(0);
        let calls = &counter;
        let schedule = vec![Duration::from_millis(1); 3];

        let result: Result<()> = with_backoff(&schedule, move || async move {
            calls.fetch_add(1, Ordering::SeqCst);
            Err(VerifyError::MalformedReference("bad".into()))
        })
        .await;

        assert!(matches!(result, Err(VerifyError::MalformedReference(_))));
        assert_eq!(counter.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_backoff_gives_up() {
        let schedule = vec![Duration::from_millis(1); 2];
        let result: Result<()> = with_backoff(&schedule, || async {
            Err(VerifyError::ChainUnavailable("down".into()))
        })
        .await;
        assert!(matches!(result, Err(VerifyError::ChainUnavailable(_))));
    }

    #[test]
    fn test_classify_message() {
        assert!(matches!(
            classify_message("Invalid params: invalid type"),
            VerifyError::MalformedReference(_)
        ));
        assert!(matches!(
            classify_message("429 Too Many Requests"),
            VerifyError::ChainUnavailable(_)
        ));
        assert!(matches!(
            classify_message("connection refused"),
            VerifyError::ChainUnavailable(_)
        ));
    }
}
