//! Model interaction: the [`ModelClient`] seam and the bounded-retry driver.
//!
//! Every stage talks to the language model through [`ModelClient`], a single
//! request/response method. The production implementation,
//! [`ProviderClient`], adapts any `edgequake_llm` provider; tests plug in a
//! scripted stub so the pipeline can be exercised without network access.
//!
//! ## Retry Strategy
//!
//! [`with_retry`] wraps one logical call. Each attempt runs under the
//! per-call timeout; transient failures (timeout, 5xx, 429, connection)
//! are retried after `backoff * 2^(retry-1)`. Rejections are returned at
//! once. Content problems never reach this layer: they are judged by the
//! stage after a successful reply, so they are never retried.

use crate::config::{ExtractionConfig, RetryPolicy};
use crate::error::TransportError;
use crate::pipeline::encode::ImagePayload;
use async_trait::async_trait;
use edgequake_llm::{ChatMessage, CompletionOptions, ImageData, LLMProvider};
use std::fmt;
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;
use tokio::time::{sleep, timeout};
use tracing::{debug, warn};

/// Which pipeline call a request belongs to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum CallPurpose {
    /// Vision transcription of an image document.
    Ocr,
    /// Combined language detection + translation.
    Normalize,
    /// Structured four-field extraction.
    Extract,
}

impl fmt::Display for CallPurpose {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            CallPurpose::Ocr => "ocr",
            CallPurpose::Normalize => "normalize",
            CallPurpose::Extract => "extract",
        })
    }
}

/// One model request: a system instruction, a user turn, optionally an image.
#[derive(Debug, Clone)]
pub struct ModelRequest {
    pub purpose: CallPurpose,
    pub system: String,
    pub user: String,
    pub image: Option<ImagePayload>,
}

/// The model's answer plus token accounting.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ModelReply {
    pub content: String,
    pub input_tokens: u64,
    pub output_tokens: u64,
}

impl ModelReply {
    pub fn text(content: impl Into<String>) -> Self {
        Self {
            content: content.into(),
            ..Default::default()
        }
    }
}

/// Anything that can answer a [`ModelRequest`].
///
/// Implementations are shared across concurrent pipelines and must be
/// `Send + Sync`. A single call makes exactly one attempt; retries and
/// timeouts are applied by [`with_retry`].
#[async_trait]
pub trait ModelClient: Send + Sync {
    async fn complete(&self, request: &ModelRequest) -> Result<ModelReply, TransportError>;
}

/// [`ModelClient`] backed by an `edgequake_llm` provider.
pub struct ProviderClient {
    provider: Arc<dyn LLMProvider>,
    temperature: f32,
    max_tokens: usize,
}

impl ProviderClient {
    pub fn new(provider: Arc<dyn LLMProvider>, config: &ExtractionConfig) -> Self {
        Self {
            provider,
            temperature: config.temperature,
            max_tokens: config.max_tokens,
        }
    }

    fn options(&self) -> CompletionOptions {
        CompletionOptions {
            temperature: Some(self.temperature),
            max_tokens: Some(self.max_tokens),
            ..Default::default()
        }
    }
}

/// Build the chat transcript for a request.
///
/// Images are attached to the user turn with `detail: "high"` so that fine
/// print (VAT numbers, totals in small type) survives the provider's tiling.
fn build_messages(request: &ModelRequest) -> Vec<ChatMessage> {
    let mut messages = vec![ChatMessage::system(request.system.as_str())];
    match &request.image {
        Some(image) => messages.push(ChatMessage::user_with_images(
            request.user.as_str(),
            vec![ImageData::new(image.data.clone(), image.mime_type).with_detail("high")],
        )),
        None => messages.push(ChatMessage::user(request.user.as_str())),
    }
    messages
}

#[async_trait]
impl ModelClient for ProviderClient {
    async fn complete(&self, request: &ModelRequest) -> Result<ModelReply, TransportError> {
        let messages = build_messages(request);
        let options = self.options();

        let response = self
            .provider
            .chat(&messages, Some(&options))
            .await
            .map_err(|e| TransportError::classify(e.to_string()))?;

        Ok(ModelReply {
            content: response.content,
            input_tokens: response.prompt_tokens as u64,
            output_tokens: response.completion_tokens as u64,
        })
    }
}

/// Run `op` under `policy`, returning the value and the number of retries used.
///
/// Each attempt and each backoff sleep is raced against `policy.cancel`;
/// once the token is set no further attempt starts and
/// [`TransportError::Cancelled`] is returned.
pub async fn with_retry<T, F, Fut>(
    policy: &RetryPolicy,
    label: impl fmt::Display,
    mut op: F,
) -> Result<(T, u32), TransportError>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<T, TransportError>>,
{
    let cancel = &policy.cancel;
    let mut attempt: u32 = 0;

    loop {
        if cancel.is_cancelled() {
            debug!("{}: cancelled before attempt {}", label, attempt + 1);
            return Err(TransportError::Cancelled);
        }

        if attempt > 0 {
            let backoff = backoff_delay(policy.backoff, attempt);
            warn!(
                "{}: retry {}/{} after {}ms",
                label,
                attempt,
                policy.max_retries,
                backoff.as_millis()
            );
            tokio::select! {
                _ = cancel.cancelled() => return Err(TransportError::Cancelled),
                _ = sleep(backoff) => {}
            }
        }

        let outcome = tokio::select! {
            biased;
            _ = cancel.cancelled() => return Err(TransportError::Cancelled),
            attempted = timeout(policy.timeout, op()) => match attempted {
                Ok(outcome) => outcome,
                Err(_) => Err(TransportError::Timeout {
                    secs: policy.timeout.as_secs(),
                }),
            },
        };

        match outcome {
            Ok(value) => {
                debug!("{}: succeeded after {} retries", label, attempt);
                return Ok((value, attempt));
            }
            Err(_) if cancel.is_cancelled() => {
                debug!("{}: cancelled during attempt {}", label, attempt + 1);
                return Err(TransportError::Cancelled);
            }
            Err(e) if e.is_transient() && attempt < policy.max_retries => {
                warn!("{}: attempt {} failed: {}", label, attempt + 1, e);
                attempt += 1;
            }
            Err(e) => {
                warn!("{}: giving up after {} attempts: {}", label, attempt + 1, e);
                return Err(e);
            }
        }
    }
}

/// `base * 2^(retry-1)`, saturating at `Duration::MAX`.
fn backoff_delay(base: Duration, retry: u32) -> Duration {
    2u32.checked_pow(retry.saturating_sub(1))
        .and_then(|factor| base.checked_mul(factor))
        .unwrap_or(Duration::MAX)
}

/// Send `request` through `client` with the bounded retry policy.
pub async fn call_model(
    client: &dyn ModelClient,
    request: &ModelRequest,
    policy: &RetryPolicy,
) -> Result<(ModelReply, u32), TransportError> {
    with_retry(policy, request.purpose, move || client.complete(request)).await
}


#[cfg(test)]
mod tests {
    use super::stub::ScriptedClient;
    use super::*;
    use std::sync::atomic::{AtomicU32, Ordering};
    use std::time::Duration;

    fn fast_policy(max_retries: u32) -> RetryPolicy {
        RetryPolicy {
            max_retries,
            backoff: Duration::from_millis(1),
            timeout: Duration::from_millis(200),
            ..RetryPolicy::default()
        }
    }

    fn request(purpose: CallPurpose) -> ModelRequest {
        ModelRequest {
            purpose,
            system: "sys".into(),
            user: "hello".into(),
            image: None,
        }
    }

    #[tokio::test]
    async fn transient_error_is_retried_once() {
        let client = ScriptedClient::new()
            .fail(CallPurpose::Extract, TransportError::Server("503".into()))
            .reply(CallPurpose::Extract, "{}");

        let (reply, retries) = call_model(&client, &request(CallPurpose::Extract), &fast_policy(1))
            .await
            .expect("second attempt succeeds");
        assert_eq!(reply.content, "{}");
        assert_eq!(retries, 1);
        assert_eq!(client.calls(CallPurpose::Extract), 2);
    }

    #[tokio::test]
    async fn retry_budget_is_bounded() {
        let client = ScriptedClient::new()
            .fail(CallPurpose::Normalize, TransportError::Network("reset".into()))
            .fail(CallPurpose::Normalize, TransportError::Network("reset".into()))
            .reply(CallPurpose::Normalize, "never reached");

        let err = call_model(&client, &request(CallPurpose::Normalize), &fast_policy(1))
            .await
            .unwrap_err();
        assert!(matches!(err, TransportError::Network(_)));
        assert_eq!(client.calls(CallPurpose::Normalize), 2);
    }

    #[tokio::test]
    async fn rejection_is_not_retried() {
        let client = ScriptedClient::new()
            .fail(CallPurpose::Ocr, TransportError::Rejected("401".into()))
            .reply(CallPurpose::Ocr, "never reached");

        let err = call_model(&client, &request(CallPurpose::Ocr), &fast_policy(3))
            .await
            .unwrap_err();
        assert!(matches!(err, TransportError::Rejected(_)));
        assert_eq!(client.calls(CallPurpose::Ocr), 1);
    }

    #[test]
    fn slow_attempt_times_out_and_is_retried() {
        let attempts = AtomicU32::new(0);
        let policy = RetryPolicy {
            max_retries: 1,
            backoff: Duration::from_millis(1),
            timeout: Duration::from_millis(20),
            ..RetryPolicy::default()
        };

        let result = tokio_test::block_on(with_retry(&policy, "slow", || {
            let n = attempts.fetch_add(1, Ordering::SeqCst);
            async move {
                if n == 0 {
                    sleep(Duration::from_millis(500)).await;
                }
                Ok::<_, TransportError>(n)
            }
        }));

        assert_eq!(result.unwrap(), (1, 1));
        assert_eq!(attempts.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn cancel_during_failing_attempt_stops_retrying() {
        let policy = fast_policy(3);
        let cancel = policy.cancel.clone();
        let attempts = AtomicU32::new(0);

        let err = with_retry(&policy, "cancel", || {
            attempts.fetch_add(1, Ordering::SeqCst);
            cancel.cancel();
            async { Err::<(), _>(TransportError::Server("503".into())) }
        })
        .await
        .unwrap_err();

        assert_eq!(err, TransportError::Cancelled);
        assert_eq!(attempts.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn cancel_interrupts_backoff_sleep() {
        let policy = RetryPolicy {
            max_retries: 1,
            backoff: Duration::from_secs(60),
            timeout: Duration::from_secs(1),
            ..RetryPolicy::default()
        };
        let cancel = policy.cancel.clone();
        tokio::spawn(async move {
            sleep(Duration::from_millis(20)).await;
            cancel.cancel();
        });

        let outcome = timeout(
            Duration::from_secs(5),
            with_retry(&policy, "backoff", || async {
                Err::<(), _>(TransportError::Network("reset".into()))
            }),
        )
        .await
        .expect("backoff should be abandoned");
        assert_eq!(outcome.unwrap_err(), TransportError::Cancelled);
    }

    #[tokio::test]
    async fn cancel_abandons_in_flight_attempt() {
        let policy = RetryPolicy {
            timeout: Duration::from_secs(30),
            ..fast_policy(1)
        };
        let cancel = policy.cancel.clone();
        tokio::spawn(async move {
            sleep(Duration::from_millis(20)).await;
            cancel.cancel();
        });

        let outcome = timeout(
            Duration::from_secs(5),
            with_retry(&policy, "slow", || async {
                sleep(Duration::from_secs(30)).await;
                Ok::<_, TransportError>(())
            }),
        )
        .await
        .expect("attempt should be abandoned");
        assert_eq!(outcome.unwrap_err(), TransportError::Cancelled);
    }

    #[test]
    fn backoff_doubles_and_saturates() {
        let base = Duration::from_millis(500);
        assert_eq!(backoff_delay(base, 1), base);
        assert_eq!(backoff_delay(base, 3), Duration::from_millis(2000));
        assert_eq!(backoff_delay(Duration::MAX, 2), Duration::MAX);
        assert_eq!(backoff_delay(base, 40), Duration::MAX);
    }

    #[test]
    fn text_request_has_system_and_user_turns() {
        let messages = build_messages(&request(CallPurpose::Extract));
        assert_eq!(messages.len(), 2);
    }
}
