//! The resilience client: the one component that calls the completion
//! transport.

use serde::de::DeserializeOwned;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, info, warn};

use super::backoff::BackoffPolicy;
use super::classify::classify;
use super::coordinator::RateLimitCoordinator;
use super::extract::parse_structured;
use crate::cancellation::CancellationToken;
use crate::config::PipelineConfig;
use crate::errors::{ServiceError, ServiceErrorKind};
use crate::provider::{CompletionProvider, CompletionRequest};

/// Credential key used when none is configured.
pub const DEFAULT_CREDENTIAL_KEY: &str = "default";

/// Wraps a [`CompletionProvider`] with classification, bounded retries,
/// shared rate-limit coordination and schema parsing.
pub struct ResilientClient {
    provider: Arc<dyn CompletionProvider>,
    policy: BackoffPolicy,
    coordinator: Arc<RateLimitCoordinator>,
    credential_key: String,
}

impl std::fmt::Debug for ResilientClient {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ResilientClient")
            .field("policy", &self.policy)
            .field("credential_key", &self.credential_key)
            .finish_non_exhaustive()
    }
}

/// Retry counters for one `complete` call.
#[derive(Debug, Default)]
struct Attempts {
    calls: u32,
    rate_limit_retries: u32,
    network_retries: u32,
    reprompted: bool,
}

fn millis(duration: Duration) -> u64 {
    u64::try_from(duration.as_millis()).unwrap_or(u64::MAX)
}

fn cancelled_error(cancel: &CancellationToken) -> ServiceError {
    ServiceError::cancelled(cancel.reason().unwrap_or_else(|| "cancelled".to_string()))
}

impl ResilientClient {
    /// Creates a client with its own coordinator.
    #[must_use]
    pub fn new(provider: Arc<dyn CompletionProvider>, config: &PipelineConfig) -> Self {
        Self {
            provider,
            policy: BackoffPolicy::from_config(config),
            coordinator: Arc::new(RateLimitCoordinator::new()),
            credential_key: DEFAULT_CREDENTIAL_KEY.to_string(),
        }
    }

    /// Shares `coordinator` with other clients.
    #[must_use]
    pub fn with_coordinator(mut self, coordinator: Arc<RateLimitCoordinator>) -> Self {
        self.coordinator = coordinator;
        self
    }

    /// Sets the key under which rate-limit blocks are shared.
    #[must_use]
    pub fn with_credential_key(mut self, key: impl Into<String>) -> Self {
        self.credential_key = key.into();
        self
    }

    /// The backoff policy in use.
    #[must_use]
    pub fn policy(&self) -> &BackoffPolicy {
        &self.policy
    }

    /// The shared coordinator.
    #[must_use]
    pub fn coordinator(&self) -> &Arc<RateLimitCoordinator> {
        &self.coordinator
    }

    /// Sends `request` and deserializes the reply into `T`.
    ///
    /// Every individual call is bounded by `timeout`. Transient failures are
    /// retried per the backoff policy; malformed output is reprompted once.
    /// Returns a fully parsed `T` or a final, classified [`ServiceError`].
    pub async fn complete<T: DeserializeOwned>(
        &self,
        request: &CompletionRequest,
        timeout: Duration,
        cancel: &CancellationToken,
    ) -> Result<T, ServiceError> {
        let mut attempts = Attempts::default();
        let mut current = request.clone();

        loop {
            if cancel.is_cancelled() {
                return Err(cancelled_error(cancel).with_attempts(attempts.calls));
            }
            self.coordinator
                .wait(&self.credential_key, cancel)
                .await
                .map_err(|e| e.with_attempts(attempts.calls))?;

            attempts.calls += 1;
            let err = match self.send_once(&current, timeout, cancel).await {
                Ok(text) => match parse_structured::<T>(&text) {
                    Ok(value) => {
                        debug!(attempt = attempts.calls, "Completion parsed");
                        return Ok(value);
                    }
                    Err(parse_error) => ServiceError::malformed(parse_error),
                },
                Err(err) => err,
            };

            match err.kind {
                ServiceErrorKind::MalformedOutput => {
                    if attempts.reprompted {
                        warn!(attempt = attempts.calls, kind = %err.kind, "Malformed output recurred");
                        return Err(ServiceError::new(
                            ServiceErrorKind::SchemaViolation,
                            format!("malformed output after corrective reprompt: {}", err.message),
                        )
                        .with_attempts(attempts.calls));
                    }
                    attempts.reprompted = true;
                    info!(attempt = attempts.calls, kind = %err.kind, "Reprompting with parse error");
                    current = request.with_correction(&err.message);
                }
                ServiceErrorKind::RateLimited => {
                    if attempts.rate_limit_retries >= self.policy.rate_limit_max_retries {
                        warn!(
                            attempt = attempts.calls,
                            kind = %err.kind,
                            "Rate limit persisted past the retry bound"
                        );
                        let mut exhausted = ServiceError::new(
                            ServiceErrorKind::BackoffExhausted,
                            format!(
                                "rate limited on {} consecutive attempts",
                                attempts.rate_limit_retries + 1
                            ),
                        )
                        .with_retry_after(err.retry_after)
                        .with_attempts(attempts.calls);
                        exhausted.status = err.status;
                        return Err(exhausted);
                    }
                    let delay = self
                        .policy
                        .rate_limit_delay_with_hint(attempts.rate_limit_retries, err.retry_after);
                    attempts.rate_limit_retries += 1;
                    info!(
                        attempt = attempts.calls,
                        kind = %err.kind,
                        delay_ms = millis(delay),
                        "Backing off after rate limit"
                    );
                    self.coordinator.block(&self.credential_key, delay);
                }
                ServiceErrorKind::Unreachable | ServiceErrorKind::Timeout => {
                    if attempts.network_retries >= self.policy.network_max_retries {
                        warn!(attempt = attempts.calls, kind = %err.kind, "Network retries exhausted");
                        return Err(err.with_attempts(attempts.calls));
                    }
                    let delay = self.policy.network_delay(attempts.network_retries);
                    attempts.network_retries += 1;
                    info!(
                        attempt = attempts.calls,
                        kind = %err.kind,
                        delay_ms = millis(delay),
                        "Retrying after network failure"
                    );
                    self.sleep(delay, cancel)
                        .await
                        .map_err(|e| e.with_attempts(attempts.calls))?;
                }
                _ => {
                    warn!(attempt = attempts.calls, kind = %err.kind, "Service call failed");
                    return Err(err.with_attempts(attempts.calls));
                }
            }
        }
    }

    async fn send_once(
        &self,
        request: &CompletionRequest,
        timeout: Duration,
        cancel: &CancellationToken,
    ) -> Result<String, ServiceError> {
        tokio::select! {
            biased;
            () = cancel.cancelled() => Err(cancelled_error(cancel)),
            result = tokio::time::timeout(timeout, self.provider.send(request)) => match result {
                Err(_) => Err(ServiceError::timeout(format!(
                    "no response within {}ms",
                    millis(timeout)
                ))),
                Ok(Ok(text)) => Ok(text),
                Ok(Err(failure)) => Err(classify(&failure)),
            },
        }
    }

    async fn sleep(&self, delay: Duration, cancel: &CancellationToken) -> Result<(), ServiceError> {
        tokio::select! {
            biased;
            () = cancel.cancelled() => Err(cancelled_error(cancel)),
            () = tokio::time::sleep(delay) => Ok(()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::errors::ProviderFailure;
    use crate::provider::MockCompletionProvider;
    use crate::testing::ScriptedProvider;
    use pretty_assertions::assert_eq;
    use serde::Deserialize;
    use tokio::time::Instant;

    #[derive(Debug, Deserialize, PartialEq)]
    struct Reply {
        ok: bool,
    }

    const OK: &str = r#"{"ok": true}"#;
    const TIMEOUT: Duration = Duration::from_secs(120);

    fn request() -> CompletionRequest {
        CompletionRequest::new("system", "prompt")
    }

    fn client(provider: Arc<dyn CompletionProvider>) -> ResilientClient {
        ResilientClient::new(provider, &PipelineConfig::default())
    }

    #[tokio::test(start_paused = true)]
    async fn test_success_first_try() {
        let provider = Arc::new(ScriptedProvider::new(vec![Ok(OK.to_string())]));
        let reply: Reply = client(provider.clone())
            .complete(&request(), TIMEOUT, &CancellationToken::new())
            .await
            .unwrap();
        assert_eq!(reply, Reply { ok: true });
        assert_eq!(provider.calls(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_quota_is_never_retried() {
        let mut mock = MockCompletionProvider::new();
        mock.expect_send()
            .times(1)
            .returning(|_| Err(ProviderFailure::http(402, "payment required")));

        let err = client(Arc::new(mock))
            .complete::<Reply>(&request(), TIMEOUT, &CancellationToken::new())
            .await
            .unwrap_err();
        assert_eq!(err.kind, ServiceErrorKind::QuotaExhausted);
        assert_eq!(err.attempts, 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_rejected_is_never_retried() {
        let mut mock = MockCompletionProvider::new();
        mock.expect_send()
            .times(1)
            .returning(|_| Err(ProviderFailure::http(401, "bad key")));

        let err = client(Arc::new(mock))
            .complete::<Reply>(&request(), TIMEOUT, &CancellationToken::new())
            .await
            .unwrap_err();
        assert_eq!(err.kind, ServiceErrorKind::Rejected);
        assert_eq!(err.status, Some(401));
    }

    #[tokio::test(start_paused = true)]
    async fn test_rate_limit_backoff_shape() {
        let provider = Arc::new(ScriptedProvider::new(vec![
            Err(ProviderFailure::http(429, "")),
            Err(ProviderFailure::http(429, "")),
            Err(ProviderFailure::http(429, "")),
            Ok(OK.to_string()),
        ]));
        let started = Instant::now();

        let reply: Reply = client(provider.clone())
            .complete(&request(), TIMEOUT, &CancellationToken::new())
            .await
            .unwrap();

        assert!(reply.ok);
        assert_eq!(provider.calls(), 4);
        let gaps = provider.gaps();
        assert_eq!(
            gaps,
            vec![
                Duration::from_secs(5),
                Duration::from_secs(15),
                Duration::from_secs(45)
            ]
        );
        assert!(gaps.windows(2).all(|w| w[0] < w[1]));
        assert_eq!(started.elapsed(), Duration::from_secs(65));
    }

    #[tokio::test(start_paused = true)]
    async fn test_rate_limit_exhaustion() {
        let provider = Arc::new(ScriptedProvider::repeating(Err(ProviderFailure::http(
            529, "overloaded",
        ))));

        let err = client(provider.clone())
            .complete::<Reply>(&request(), TIMEOUT, &CancellationToken::new())
            .await
            .unwrap_err();

        assert_eq!(err.kind, ServiceErrorKind::BackoffExhausted);
        assert_eq!(provider.calls(), 4);
        assert_eq!(err.attempts, 4);
    }

    #[tokio::test(start_paused = true)]
    async fn test_retry_after_hint_extends_delay() {
        let provider = Arc::new(ScriptedProvider::new(vec![
            Err(ProviderFailure::Http {
                status: 429,
                body: String::new(),
                retry_after: Some(Duration::from_secs(30)),
            }),
            Ok(OK.to_string()),
        ]));

        let _: Reply = client(provider.clone())
            .complete(&request(), TIMEOUT, &CancellationToken::new())
            .await
            .unwrap();
        assert_eq!(provider.gaps(), vec![Duration::from_secs(30)]);
    }

    #[tokio::test(start_paused = true)]
    async fn test_huge_retry_after_hint_is_clamped() {
        let provider = Arc::new(ScriptedProvider::new(vec![
            Err(ProviderFailure::Http {
                status: 429,
                body: String::new(),
                retry_after: Some(Duration::from_secs(u64::MAX)),
            }),
            Ok(OK.to_string()),
        ]));
        let config = PipelineConfig::new().with_max_retry_after(Duration::from_secs(60));
        let client = ResilientClient::new(provider.clone(), &config);

        let _: Reply = client
            .complete(&request(), TIMEOUT, &CancellationToken::new())
            .await
            .unwrap();
        assert_eq!(provider.gaps(), vec![Duration::from_secs(60)]);
        assert!(client.coordinator().remaining(DEFAULT_CREDENTIAL_KEY).is_none());
    }

    #[tokio::test(start_paused = true)]
    async fn test_malformed_reprompts_once_then_succeeds() {
        let provider = Arc::new(ScriptedProvider::new(vec![
            Ok("not json at all".to_string()),
            Ok(OK.to_string()),
        ]));

        let reply: Reply = client(provider.clone())
            .complete(&request(), TIMEOUT, &CancellationToken::new())
            .await
            .unwrap();

        assert!(reply.ok);
        let prompts = provider.prompts();
        assert_eq!(prompts[0], "prompt");
        assert!(prompts[1].starts_with("prompt"));
        assert!(prompts[1].contains("did not contain a JSON object"));
        assert!(provider.gaps().iter().all(|g| g.is_zero()));
    }

    #[tokio::test(start_paused = true)]
    async fn test_malformed_twice_is_schema_violation() {
        let provider = Arc::new(ScriptedProvider::new(vec![
            Ok(r#"{"wrong": 1}"#.to_string()),
            Ok(r#"{"still": "wrong"}"#.to_string()),
            Ok(OK.to_string()),
        ]));

        let err = client(provider.clone())
            .complete::<Reply>(&request(), TIMEOUT, &CancellationToken::new())
            .await
            .unwrap_err();

        assert_eq!(err.kind, ServiceErrorKind::SchemaViolation);
        assert_eq!(provider.calls(), 2);
    }

    #[tokio::test(start_paused = true)]
    async fn test_network_retries_are_linear_then_final() {
        let provider = Arc::new(ScriptedProvider::repeating(Err(ProviderFailure::http(
            503, "",
        ))));

        let err = client(provider.clone())
            .complete::<Reply>(&request(), TIMEOUT, &CancellationToken::new())
            .await
            .unwrap_err();

        assert_eq!(err.kind, ServiceErrorKind::Unreachable);
        assert_eq!(provider.calls(), 4);
        assert_eq!(
            provider.gaps(),
            vec![
                Duration::from_secs(1),
                Duration::from_secs(2),
                Duration::from_secs(3)
            ]
        );
    }

    #[tokio::test(start_paused = true)]
    async fn test_per_call_deadline_is_timeout() {
        let provider = Arc::new(
            ScriptedProvider::new(vec![Ok(OK.to_string()), Ok(OK.to_string())])
                .with_latency(Duration::from_secs(10)),
        );
        let config = PipelineConfig::default().with_network_backoff(Duration::from_secs(1), 0);

        let err = ResilientClient::new(provider, &config)
            .complete::<Reply>(&request(), Duration::from_secs(2), &CancellationToken::new())
            .await
            .unwrap_err();

        assert_eq!(err.kind, ServiceErrorKind::Timeout);
    }

    #[tokio::test(start_paused = true)]
    async fn test_cancel_during_backoff() {
        let provider = Arc::new(ScriptedProvider::repeating(Err(ProviderFailure::http(
            429, "",
        ))));
        let cancel = Arc::new(CancellationToken::new());
        let client = Arc::new(client(provider.clone()));

        let task = {
            let cancel = cancel.clone();
            let client = client.clone();
            tokio::spawn(async move {
                client
                    .complete::<Reply>(&request(), TIMEOUT, &cancel)
                    .await
            })
        };
        tokio::time::sleep(Duration::from_secs(2)).await;
        cancel.cancel("user aborted");

        let err = task.await.unwrap().unwrap_err();
        assert_eq!(err.kind, ServiceErrorKind::Cancelled);
        assert_eq!(err.message, "user aborted");
        assert_eq!(provider.calls(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_shared_coordinator_blocks_second_client() {
        let coordinator = Arc::new(RateLimitCoordinator::new());
        let first = Arc::new(ScriptedProvider::new(vec![
            Err(ProviderFailure::http(429, "")),
            Ok(OK.to_string()),
        ]));
        let second = Arc::new(ScriptedProvider::new(vec![Ok(OK.to_string())]));

        let client_a = client(first.clone()).with_coordinator(coordinator.clone());
        let client_b = client(second.clone()).with_coordinator(coordinator.clone());
        let cancel = CancellationToken::new();
        let started = Instant::now();
        let request_a = request();

        let (a, b) = tokio::join!(
            client_a.complete::<Reply>(&request_a, TIMEOUT, &cancel),
            async {
                tokio::time::sleep(Duration::from_secs(1)).await;
                client_b.complete::<Reply>(&request(), TIMEOUT, &cancel).await
            }
        );

        assert!(a.unwrap().ok);
        assert!(b.unwrap().ok);
        assert_eq!(second.first_call_at().unwrap() - started, Duration::from_secs(5));
    }

    #[tokio::test(start_paused = true)]
    async fn test_separate_credentials_do_not_block_each_other() {
        let coordinator = Arc::new(RateLimitCoordinator::new());
        coordinator.block("tenant-a", Duration::from_secs(60));
        let provider = Arc::new(ScriptedProvider::new(vec![Ok(OK.to_string())]));
        let started = Instant::now();

        let _: Reply = client(provider)
            .with_coordinator(coordinator)
            .with_credential_key("tenant-b")
            .complete(&request(), TIMEOUT, &CancellationToken::new())
            .await
            .unwrap();
        assert_eq!(started.elapsed(), Duration::ZERO);
    }
}
