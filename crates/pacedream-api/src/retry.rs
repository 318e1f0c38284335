//! Bounded retry for transport failures, plus per-call state tracing.

use crate::executor::{HttpRequest, RawResponse, RequestExecutor};
use crate::{ApiError, ApiResult};
use pacedream_config::{Config, DEFAULT_RETRY_BACKOFF_MS, DEFAULT_RETRY_MAX_ATTEMPTS};
use std::time::Duration;
use tracing::{debug, warn};

/// How often and how patiently transport failures are retried.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RetryPolicy {
    /// Total attempts, including the first.
    pub max_attempts: u32,
    /// Delay before each retry. The last entry repeats.
    pub backoff: Vec<Duration>,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: DEFAULT_RETRY_MAX_ATTEMPTS,
            backoff: DEFAULT_RETRY_BACKOFF_MS
                .iter()
                .copied()
                .map(Duration::from_millis)
                .collect(),
        }
    }
}

impl RetryPolicy {
    pub fn from_config(config: &Config) -> Self {
        Self {
            max_attempts: config.retry_max_attempts.max(1),
            backoff: config.retry_backoff(),
        }
    }

    /// A policy that never retries.
    pub fn none() -> Self {
        Self {
            max_attempts: 1,
            backoff: Vec::new(),
        }
    }

    /// Delay before retry number `retry` (0-indexed).
    pub fn delay_for_retry(&self, retry: u32) -> Duration {
        self.backoff
            .get(retry as usize)
            .or_else(|| self.backoff.last())
            .copied()
            .unwrap_or(Duration::ZERO)
    }
}

/// Lifecycle of one client call.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CallState {
    NotSent,
    Sent,
    Success,
    AuthFailed,
    Refreshing,
    RetriedSuccess,
    RetriedFail,
    NetworkFailed,
    Retrying,
    Exhausted,
}

impl CallState {
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            CallState::Success
                | CallState::RetriedSuccess
                | CallState::RetriedFail
                | CallState::Exhausted
        )
    }
}

/// Debug-level trace of a call's state transitions.
#[derive(Debug)]
pub(crate) struct CallTrace {
    state: CallState,
    target: String,
}

impl CallTrace {
    pub(crate) fn new(target: String) -> Self {
        Self {
            state: CallState::NotSent,
            target,
        }
    }

    pub(crate) fn enter(&mut self, next: CallState) {
        debug!(url = %self.target, from = ?self.state, to = ?next, "Call state");
        self.state = next;
    }

    #[cfg(test)]
    pub(crate) fn state(&self) -> CallState {
        self.state
    }

    pub(crate) fn target(&self) -> &str {
        &self.target
    }
}

/// Send `request`, retrying transport failures per `policy`.
///
/// Any HTTP response, whatever its status, ends the loop.
pub(crate) async fn send_with_retry(
    executor: &dyn RequestExecutor,
    request: &HttpRequest,
    token: Option<&str>,
    policy: &RetryPolicy,
    trace: &mut CallTrace,
) -> ApiResult<RawResponse> {
    let max_attempts = policy.max_attempts.max(1);
    let mut attempt = 0;

    loop {
        attempt += 1;
        match executor.send(request, token).await {
            Ok(response) => return Ok(response),
            Err(err) if attempt >= max_attempts => {
                trace.enter(CallState::Exhausted);
                warn!(
                    url = %trace.target(),
                    attempts = attempt,
                    error = %err,
                    "Network retries exhausted"
                );
                return Err(ApiError::Network {
                    kind: err.kind,
                    message: err.message,
                    attempts: attempt,
                });
            }
            Err(err) => {
                trace.enter(CallState::NetworkFailed);
                let delay = policy.delay_for_retry(attempt - 1);
                warn!(
                    url = %trace.target(),
                    attempt,
                    delay_ms = delay.as_millis() as u64,
                    error = %err,
                    "Network error, retrying"
                );
                tokio::time::sleep(delay).await;
                trace.enter(CallState::Retrying);
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::executor::{TransportError, TransportErrorKind};
    use async_trait::async_trait;
    use parking_lot::Mutex;
    use reqwest::Method;
    use std::collections::VecDeque;
    use tokio::time::Instant;
    use url::Url;

    struct Flaky {
        outcomes: Mutex<VecDeque<Result<RawResponse, TransportError>>>,
        sent_at: Mutex<Vec<Instant>>,
    }

    impl Flaky {
        fn new(outcomes: Vec<Result<RawResponse, TransportError>>) -> Self {
            Self {
                outcomes: Mutex::new(outcomes.into()),
                sent_at: Mutex::new(Vec::new()),
            }
        }
    }

    #[async_trait]
    impl RequestExecutor for Flaky {
        async fn send(
            &self,
            _request: &HttpRequest,
            _token: Option<&str>,
        ) -> Result<RawResponse, TransportError> {
            self.sent_at.lock().push(Instant::now());
            self.outcomes
                .lock()
                .pop_front()
                .unwrap_or_else(|| Err(TransportError::new(TransportErrorKind::Other, "script empty")))
        }
    }

    fn request() -> HttpRequest {
        HttpRequest::new(
            Method::GET,
            Url::parse("https://api.example.com/v1/items").unwrap(),
        )
    }

    fn connect_error() -> Result<RawResponse, TransportError> {
        Err(TransportError::new(TransportErrorKind::Connect, "refused"))
    }

    #[test]
    fn test_default_policy() {
        let policy = RetryPolicy::default();
        assert_eq!(policy.max_attempts, 2);
        assert_eq!(policy.delay_for_retry(0), Duration::from_millis(500));
        assert_eq!(policy.delay_for_retry(1), Duration::from_millis(1000));
        // Last delay repeats
        assert_eq!(policy.delay_for_retry(5), Duration::from_millis(1000));
        assert_eq!(RetryPolicy::none().delay_for_retry(0), Duration::ZERO);
    }

    #[test]
    fn test_policy_from_config() {
        let mut config = Config::default();
        config.retry_max_attempts = 4;
        config.retry_backoff_ms = vec![10, 20];
        let policy = RetryPolicy::from_config(&config);
        assert_eq!(policy.max_attempts, 4);
        assert_eq!(policy.delay_for_retry(3), Duration::from_millis(20));
    }

    #[test]
    fn test_terminal_states() {
        assert!(CallState::Success.is_terminal());
        assert!(CallState::Exhausted.is_terminal());
        assert!(!CallState::Refreshing.is_terminal());
        assert!(!CallState::Retrying.is_terminal());
    }

    #[tokio::test(start_paused = true)]
    async fn test_retry_then_success_waits_backoff() {
        let executor = Flaky::new(vec![connect_error(), Ok(RawResponse::new(200, "{}"))]);
        let mut trace = CallTrace::new("test".to_string());

        let response = send_with_retry(
            &executor,
            &request(),
            None,
            &RetryPolicy::default(),
            &mut trace,
        )
        .await
        .unwrap();

        assert_eq!(response.status, 200);
        assert_eq!(trace.state(), CallState::Retrying);
        let sent_at = executor.sent_at.lock();
        assert_eq!(sent_at.len(), 2);
        assert!(sent_at[1] - sent_at[0] >= Duration::from_millis(500));
    }

    #[tokio::test(start_paused = true)]
    async fn test_retries_are_bounded() {
        let executor = Flaky::new(vec![connect_error(), connect_error(), connect_error()]);
        let mut trace = CallTrace::new("test".to_string());

        let err = send_with_retry(
            &executor,
            &request(),
            Some("token"),
            &RetryPolicy::default(),
            &mut trace,
        )
        .await
        .unwrap_err();

        match err {
            ApiError::Network { kind, attempts, .. } => {
                assert_eq!(kind, TransportErrorKind::Connect);
                assert_eq!(attempts, 2);
            }
            other => panic!("unexpected error: {other:?}"),
        }
        assert_eq!(trace.state(), CallState::Exhausted);
        assert_eq!(executor.sent_at.lock().len(), 2);
    }

    #[tokio::test(start_paused = true)]
    async fn test_http_error_status_is_not_retried() {
        let executor = Flaky::new(vec![Ok(RawResponse::new(500, "{}"))]);
        let mut trace = CallTrace::new("test".to_string());

        let response = send_with_retry(
            &executor,
            &request(),
            None,
            &RetryPolicy::default(),
            &mut trace,
        )
        .await
        .unwrap();

        assert_eq!(response.status, 500);
        assert_eq!(executor.sent_at.lock().len(), 1);
    }
}
