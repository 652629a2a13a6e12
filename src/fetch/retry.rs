use super::{HttpClient, fetch_text};
use crate::error::ScrapeError;
use rand::Rng;
use std::time::Duration;
use tokio::sync::Semaphore;
use tracing::{debug, warn};

/// Exponential backoff settings for [`fetch_with_retry`].
#[derive(Debug, Clone)]
pub struct RetryPolicy {
    pub max_retries: u32,
    /// Delay before the second attempt; doubles for each attempt after.
    pub backoff_base: Duration,
    /// Upper bound of the random delay added to every backoff.
    pub jitter: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_retries: 5,
            backoff_base: Duration::from_secs(1),
            jitter: Duration::from_millis(500),
        }
    }
}

impl RetryPolicy {
    /// A policy that retries immediately; used by tests.
    pub fn immediate(max_retries: u32) -> Self {
        Self {
            max_retries,
            backoff_base: Duration::ZERO,
            jitter: Duration::ZERO,
        }
    }

    pub fn delay_for(&self, attempt: u32) -> Duration {
        let factor = 2u32.saturating_pow(attempt);
        let base = self.backoff_base.saturating_mul(factor);
        let jitter_ms = self.jitter.as_millis() as u64;
        if jitter_ms == 0 {
            return base;
        }
        base + Duration::from_millis(rand::thread_rng().gen_range(0..=jitter_ms))
    }
}

#[derive(Debug)]
pub enum FetchOutcome {
    Body(String),
    /// The server answered 404; the page is gone and retrying will not help.
    NotFound,
    Failed(ScrapeError),
}

/// Fetches `url`, retrying transient failures with exponential backoff.
///
/// Each attempt holds one permit of `limiter`; backoff sleeps do not.
#[tracing::instrument(skip(client, policy, limiter))]
pub async fn fetch_with_retry<C: HttpClient + ?Sized>(
    client: &C,
    url: &str,
    policy: &RetryPolicy,
    limiter: &Semaphore,
) -> FetchOutcome {
    let mut last_err = None;

    for attempt in 0..policy.max_retries {
        let result = match limiter.acquire().await {
            Ok(_permit) => fetch_text(client, url).await,
            Err(e) => return FetchOutcome::Failed(e.into()),
        };
        match result {
            Ok(body) => {
                debug!(attempt = attempt + 1, bytes = body.len(), "Fetched");
                return FetchOutcome::Body(body);
            }
            Err(ScrapeError::Status { status: 404, .. }) => {
                warn!("404 Not Found");
                return FetchOutcome::NotFound;
            }
            Err(e) if e.is_permanent() => return FetchOutcome::Failed(e),
            Err(e) => {
                if attempt + 1 == policy.max_retries {
                    warn!(attempt = attempt + 1, error = %e, "Fetch failed, no attempts left");
                    last_err = Some(e);
                    break;
                }
                let wait = policy.delay_for(attempt);
                warn!(
                    attempt = attempt + 1,
                    max_retries = policy.max_retries,
                    wait_ms = wait.as_millis() as u64,
                    error = %e,
                    "Fetch failed, backing off"
                );
                last_err = Some(e);
                tokio::time::sleep(wait).await;
            }
        }
    }

    FetchOutcome::Failed(last_err.unwrap_or_else(|| ScrapeError::RetriesExhausted {
        url: url.to_string(),
        attempts: policy.max_retries,
    }))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::fetch::testing::ScriptedClient;

    const URL: &str = "https://birja-in.az/elanlar/ev-alqi-satqisi/num1.html";

    fn limiter() -> Semaphore {
        Semaphore::new(1)
    }

    fn slow_backoff(max_retries: u32) -> RetryPolicy {
        RetryPolicy {
            max_retries,
            backoff_base: Duration::from_millis(300),
            jitter: Duration::ZERO,
        }
    }

    #[test]
    fn test_delay_doubles_without_jitter() {
        let policy = RetryPolicy {
            max_retries: 5,
            backoff_base: Duration::from_secs(1),
            jitter: Duration::ZERO,
        };
        assert_eq!(policy.delay_for(0), Duration::from_secs(1));
        assert_eq!(policy.delay_for(1), Duration::from_secs(2));
        assert_eq!(policy.delay_for(4), Duration::from_secs(16));
    }

    #[test]
    fn test_delay_jitter_is_bounded() {
        let policy = RetryPolicy {
            max_retries: 5,
            backoff_base: Duration::from_millis(100),
            jitter: Duration::from_millis(50),
        };
        for _ in 0..20 {
            let d = policy.delay_for(0);
            assert!(d >= Duration::from_millis(100) && d <= Duration::from_millis(150));
        }
    }

    #[tokio::test]
    async fn test_recovers_after_transient_errors() {
        let client = ScriptedClient::new()
            .route(URL, 503, "")
            .route(URL, 502, "")
            .route(URL, 200, "ok");

        let outcome = fetch_with_retry(&client, URL, &RetryPolicy::immediate(5), &limiter()).await;
        assert!(matches!(outcome, FetchOutcome::Body(ref b) if b == "ok"));
        assert_eq!(client.calls(), 3);
    }

    #[tokio::test]
    async fn test_not_found_stops_immediately() {
        let client = ScriptedClient::new().route(URL, 404, "");
        let outcome = fetch_with_retry(&client, URL, &RetryPolicy::immediate(5), &limiter()).await;
        assert!(matches!(outcome, FetchOutcome::NotFound));
        assert_eq!(client.calls(), 1);
    }

    #[tokio::test]
    async fn test_gives_up_after_max_retries() {
        let client = ScriptedClient::new().route(URL, 500, "");
        let outcome = fetch_with_retry(&client, URL, &RetryPolicy::immediate(3), &limiter()).await;
        assert!(matches!(
            outcome,
            FetchOutcome::Failed(ScrapeError::Status { status: 500, .. })
        ));
        assert_eq!(client.calls(), 3);
    }

    #[tokio::test]
    async fn test_zero_retries_reports_exhausted() {
        let client = ScriptedClient::new();
        let outcome = fetch_with_retry(&client, URL, &RetryPolicy::immediate(0), &limiter()).await;
        assert!(matches!(
            outcome,
            FetchOutcome::Failed(ScrapeError::RetriesExhausted { attempts: 0, .. })
        ));
    }

    #[tokio::test]
    async fn test_permit_is_released_while_backing_off() {
        let client = ScriptedClient::new().route(URL, 503, "").route(URL, 200, "ok");
        let limiter = limiter();
        let policy = slow_backoff(3);

        let fetch = fetch_with_retry(&client, URL, &policy, &limiter);
        let check_slot = async {
            tokio::time::sleep(Duration::from_millis(100)).await;
            limiter.try_acquire().is_ok()
        };
        let (outcome, slot_free) = tokio::join!(fetch, check_slot);

        assert!(slot_free);
        assert!(matches!(outcome, FetchOutcome::Body(ref b) if b == "ok"));
    }

    #[tokio::test]
    async fn test_no_sleep_after_last_attempt() {
        let client = ScriptedClient::new().route(URL, 500, "");
        let policy = RetryPolicy {
            max_retries: 1,
            backoff_base: Duration::from_secs(30),
            jitter: Duration::ZERO,
        };

        let outcome = tokio::time::timeout(
            Duration::from_secs(5),
            fetch_with_retry(&client, URL, &policy, &limiter()),
        )
        .await
        .expect("gave up without sleeping");
        assert!(matches!(outcome, FetchOutcome::Failed(ScrapeError::Status { status: 500, .. })));
    }
}
