//! Configuration types for invoice extraction.
//!
//! All extraction behaviour is controlled through [`ExtractionConfig`], built
//! via its [`ExtractionConfigBuilder`]. Keeping every knob in one struct makes
//! it trivial to share configs across concurrent pipelines and to log exactly
//! which model and limits produced a given record.

use crate::cancel::CancelToken;
use crate::error::InvoiceError;
use crate::progress::ProgressCallback;
use edgequake_llm::LLMProvider;
use std::fmt;
use std::sync::Arc;
use std::time::Duration;

/// Model used when neither the config nor the environment names one.
pub const DEFAULT_MODEL: &str = "gpt-4o-mini";

/// Upper bound accepted for [`ExtractionConfig::max_retries`].
pub const MAX_RETRIES_LIMIT: u32 = 5;

/// Upper bound accepted for [`ExtractionConfig::retry_backoff_ms`] (one minute).
pub const MAX_RETRY_BACKOFF_MS: u64 = 60_000;

/// Configuration for an invoice extraction pipeline.
///
/// Built via [`ExtractionConfig::builder()`] or using
/// [`ExtractionConfig::default()`].
///
/// # Example
/// ```rust
/// use edgequake_invoice::ExtractionConfig;
///
/// let config = ExtractionConfig::builder()
///     .model("gpt-4o-mini")
///     .max_retries(1)
///     .api_timeout_secs(30)
///     .build()
///     .unwrap();
/// ```
#[derive(Clone)]
pub struct ExtractionConfig {
    /// LLM model identifier, e.g. "gpt-4o-mini". If None, uses [`DEFAULT_MODEL`].
    ///
    /// The same model serves all three calls, so it must be vision-capable
    /// whenever image documents are processed.
    pub model: Option<String>,

    /// LLM provider name (e.g. "openai", "anthropic", "ollama").
    /// If None along with `provider`, the provider is detected from the environment.
    pub provider_name: Option<String>,

    /// Pre-constructed LLM provider. Takes precedence over `provider_name`.
    pub provider: Option<Arc<dyn LLMProvider>>,

    /// Sampling temperature for every model call. Default: 0.0.
    ///
    /// Transcription, translation and field extraction all reward
    /// determinism; identical inputs should yield identical records.
    pub temperature: f32,

    /// Maximum tokens the LLM may generate per call. Default: 2048.
    pub max_tokens: usize,

    /// Retries per model call on a transient transport failure. Default: 1.
    ///
    /// Only timeouts, 5xx, 429 and connection errors are retried. Content
    /// failures (empty OCR, malformed JSON) are deterministic for a given
    /// input and surface immediately.
    pub max_retries: u32,

    /// Initial retry delay in milliseconds (exponential backoff). Default: 500.
    pub retry_backoff_ms: u64,

    /// Per-model-call timeout in seconds. Default: 30.
    pub api_timeout_secs: u64,

    /// Download timeout for URL inputs in seconds. Default: 120.
    pub download_timeout_secs: u64,

    /// Documents processed at once by [`crate::stream::extract_stream`]. Default: 4.
    pub concurrency: usize,

    /// Custom OCR system prompt. If None, uses [`crate::prompts::OCR_SYSTEM_PROMPT`].
    pub ocr_prompt: Option<String>,

    /// Custom normalization system prompt. If None, uses
    /// [`crate::prompts::NORMALIZE_SYSTEM_PROMPT`].
    pub normalize_prompt: Option<String>,

    /// Custom field-extraction system prompt. If None, uses
    /// [`crate::prompts::EXTRACT_SYSTEM_PROMPT`].
    pub extract_prompt: Option<String>,

    /// Optional per-stage event sink.
    pub progress_callback: Option<ProgressCallback>,
}

impl Default for ExtractionConfig {
    fn default() -> Self {
        Self {
            model: None,
            provider_name: None,
            provider: None,
            temperature: 0.0,
            max_tokens: 2048,
            max_retries: 1,
            retry_backoff_ms: 500,
            api_timeout_secs: 30,
            download_timeout_secs: 120,
            concurrency: 4,
            ocr_prompt: None,
            normalize_prompt: None,
            extract_prompt: None,
            progress_callback: None,
        }
    }
}

impl fmt::Debug for ExtractionConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ExtractionConfig")
            .field("model", &self.model)
            .field("provider_name", &self.provider_name)
            .field("provider", &self.provider.as_ref().map(|_| "<dyn LLMProvider>"))
            .field("temperature", &self.temperature)
            .field("max_tokens", &self.max_tokens)
            .field("max_retries", &self.max_retries)
            .field("retry_backoff_ms", &self.retry_backoff_ms)
            .field("api_timeout_secs", &self.api_timeout_secs)
            .field("concurrency", &self.concurrency)
            .field(
                "progress_callback",
                &self.progress_callback.as_ref().map(|_| "<dyn ExtractionProgressCallback>"),
            )
            .finish()
    }
}

impl ExtractionConfig {
    /// Create a new builder for `ExtractionConfig`.
    pub fn builder() -> ExtractionConfigBuilder {
        ExtractionConfigBuilder {
            config: Self::default(),
        }
    }

    /// Model name, falling back to [`DEFAULT_MODEL`].
    pub fn model_or_default(&self) -> &str {
        self.model.as_deref().unwrap_or(DEFAULT_MODEL)
    }

    /// Retry/timeout policy applied to every outbound model call.
    pub fn retry_policy(&self) -> RetryPolicy {
        RetryPolicy {
            max_retries: self.max_retries,
            backoff: Duration::from_millis(self.retry_backoff_ms),
            timeout: Duration::from_secs(self.api_timeout_secs),
            cancel: CancelToken::default(),
        }
    }
}

/// Bounded retry with a per-attempt timeout.
#[derive(Debug, Clone)]
pub struct RetryPolicy {
    pub max_retries: u32,
    /// Delay before the first retry; doubles on each further retry.
    pub backoff: Duration,
    pub timeout: Duration,
    /// Attempts and backoff sleeps are abandoned once this is set.
    pub cancel: CancelToken,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        ExtractionConfig::default().retry_policy()
    }
}

/// Builder for [`ExtractionConfig`].
#[derive(Debug)]
pub struct ExtractionConfigBuilder {
    config: ExtractionConfig,
}

impl ExtractionConfigBuilder {
    pub fn model(mut self, model: impl Into<String>) -> Self {
        self.config.model = Some(model.into());
        self
    }

    pub fn provider_name(mut self, name: impl Into<String>) -> Self {
        self.config.provider_name = Some(name.into());
        self
    }

    pub fn provider(mut self, provider: Arc<dyn LLMProvider>) -> Self {
        self.config.provider = Some(provider);
        self
    }

    pub fn temperature(mut self, t: f32) -> Self {
        self.config.temperature = t.clamp(0.0, 2.0);
        self
    }

    pub fn max_tokens(mut self, n: usize) -> Self {
        self.config.max_tokens = n;
        self
    }

    pub fn max_retries(mut self, n: u32) -> Self {
        self.config.max_retries = n;
        self
    }

    pub fn retry_backoff_ms(mut self, ms: u64) -> Self {
        self.config.retry_backoff_ms = ms;
        self
    }

    pub fn api_timeout_secs(mut self, secs: u64) -> Self {
        self.config.api_timeout_secs = secs;
        self
    }

    pub fn download_timeout_secs(mut self, secs: u64) -> Self {
        self.config.download_timeout_secs = secs;
        self
    }

    pub fn concurrency(mut self, n: usize) -> Self {
        self.config.concurrency = n.max(1);
        self
    }

    pub fn ocr_prompt(mut self, prompt: impl Into<String>) -> Self {
        self.config.ocr_prompt = Some(prompt.into());
        self
    }

    pub fn normalize_prompt(mut self, prompt: impl Into<String>) -> Self {
        self.config.normalize_prompt = Some(prompt.into());
        self
    }

    pub fn extract_prompt(mut self, prompt: impl Into<String>) -> Self {
        self.config.extract_prompt = Some(prompt.into());
        self
    }

    pub fn progress_callback(mut self, cb: ProgressCallback) -> Self {
        self.config.progress_callback = Some(cb);
        self
    }

    /// Build the configuration, validating constraints.
    pub fn build(self) -> Result<ExtractionConfig, InvoiceError> {
        let c = &self.config;
        if c.api_timeout_secs == 0 {
            return Err(InvoiceError::InvalidConfig(
                "API timeout must be ≥ 1 second".into(),
            ));
        }
        if c.max_retries > MAX_RETRIES_LIMIT {
            return Err(InvoiceError::InvalidConfig(format!(
                "max_retries must be ≤ {}, got {}",
                MAX_RETRIES_LIMIT, c.max_retries
            )));
        }
        if c.retry_backoff_ms > MAX_RETRY_BACKOFF_MS {
            return Err(InvoiceError::InvalidConfig(format!(
                "retry_backoff_ms must be ≤ {}, got {}",
                MAX_RETRY_BACKOFF_MS, c.retry_backoff_ms
            )));
        }
        if c.max_tokens == 0 {
            return Err(InvoiceError::InvalidConfig("max_tokens must be ≥ 1".into()));
        }
        Ok(self.config)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_are_conservative() {
        let c = ExtractionConfig::default();
        assert_eq!(c.max_retries, 1);
        assert_eq!(c.api_timeout_secs, 30);
        assert_eq!(c.temperature, 0.0);
        assert_eq!(c.model_or_default(), DEFAULT_MODEL);
    }

    #[test]
    fn retry_policy_from_config() {
        let c = ExtractionConfig::builder()
            .max_retries(2)
            .retry_backoff_ms(100)
            .api_timeout_secs(10)
            .build()
            .unwrap();
        let p = c.retry_policy();
        assert_eq!(p.max_retries, 2);
        assert_eq!(p.backoff, Duration::from_millis(100));
        assert_eq!(p.timeout, Duration::from_secs(10));
    }

    #[test]
    fn zero_timeout_rejected() {
        let err = ExtractionConfig::builder().api_timeout_secs(0).build().unwrap_err();
        assert!(matches!(err, InvoiceError::InvalidConfig(_)));
    }

    #[test]
    fn excessive_retries_rejected() {
        let err = ExtractionConfig::builder().max_retries(9).build().unwrap_err();
        assert!(err.to_string().contains("max_retries"));
    }

    #[test]
    fn excessive_backoff_rejected() {
        let err = ExtractionConfig::builder()
            .retry_backoff_ms(u64::MAX)
            .build()
            .unwrap_err();
        assert!(err.to_string().contains("retry_backoff_ms"));
    }

    #[test]
    fn concurrency_clamped_to_one() {
        let c = ExtractionConfig::builder().concurrency(0).build().unwrap();
        assert_eq!(c.concurrency, 1);
    }
}
