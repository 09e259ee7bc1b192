//! Pipeline orchestrator and the top-level extraction entry points.
//!
//! [`InvoicePipeline`] sequences read → normalize → extract for one document
//! at a time. The state machine is linear: the first stage error is terminal
//! and later stages never run. Every failure is returned as a
//! [`PipelineResult::Failure`]; only conditions that stop extraction before
//! any document is touched (missing provider, unreadable path) surface as
//! `Err(InvoiceError)`.

use crate::cancel::{CancelToken, CANCELLED};
use crate::config::{ExtractionConfig, DEFAULT_MODEL};
use crate::document::{Document, DocumentKind, NormalizedText, RawText};
use crate::error::{InvoiceError, Stage, StageError};
use crate::output::{ExtractionOutput, ExtractionStats, InvoiceRecord, PipelineResult, StageStats};
use crate::pipeline::fields::extract_fields;
use crate::pipeline::input;
use crate::pipeline::llm::{ModelClient, ProviderClient};
use crate::pipeline::normalize::normalize;
use crate::pipeline::read::read_document;
use crate::pipeline::vision::VisionClient;
use crate::prompts::{EXTRACT_SYSTEM_PROMPT, NORMALIZE_SYSTEM_PROMPT, OCR_SYSTEM_PROMPT};
use edgequake_llm::{LLMProvider, ProviderFactory};
use std::future::Future;
use std::path::Path;
use std::sync::Arc;
use std::time::Instant;
use tracing::{debug, info, warn};

/// Intermediate values collected while a document moves through the stages.
#[derive(Default)]
struct Trace {
    raw: Option<RawText>,
    normalized: Option<NormalizedText>,
    stats: ExtractionStats,
}

/// One configured extraction pipeline.
///
/// Cheap to clone; clones share the model client, which must be safe for
/// concurrent use. Each call to [`process`](Self::process) owns its own
/// intermediate values, so any number of documents may be in flight at once.
#[derive(Clone)]
pub struct InvoicePipeline {
    client: Arc<dyn ModelClient>,
    config: ExtractionConfig,
}

impl InvoicePipeline {
    /// Build a pipeline backed by the provider `config` resolves to.
    pub fn new(config: ExtractionConfig) -> Result<Self, InvoiceError> {
        let provider = resolve_provider(&config)?;
        info!(
            "Using provider '{}' with model '{}'",
            config.provider_name.as_deref().unwrap_or("auto"),
            config.model_or_default()
        );
        let client = ProviderClient::new(provider, &config);
        Ok(Self::with_client(Arc::new(client), config))
    }

    /// Build a pipeline around an explicit [`ModelClient`].
    pub fn with_client(client: Arc<dyn ModelClient>, config: ExtractionConfig) -> Self {
        Self { client, config }
    }

    pub fn config(&self) -> &ExtractionConfig {
        &self.config
    }

    /// Run `document` through every stage and return the contract value.
    pub async fn process(&self, document: &Document) -> PipelineResult {
        self.run(document).await.result
    }

    /// Like [`process`](Self::process), but gives up once `cancel` is set.
    ///
    /// No stage starts after the token is seen. A model call in flight or a
    /// retry backoff in progress is abandoned, and the document fails at the
    /// running stage with reason `"cancelled"`.
    pub async fn process_cancellable(&self, document: &Document, cancel: &CancelToken) -> PipelineResult {
        self.execute(document, Some(cancel)).await.result
    }

    /// Run `document` and keep the intermediate texts and statistics.
    pub async fn run(&self, document: &Document) -> ExtractionOutput {
        self.execute(document, None).await
    }

    async fn execute(&self, document: &Document, cancel: Option<&CancelToken>) -> ExtractionOutput {
        let start = Instant::now();
        let source = document.source_name();
        info!("Processing {} document: {}", document.kind(), source);
        if let Some(ref cb) = self.config.progress_callback {
            cb.on_document_start(source);
        }

        let mut trace = Trace::default();
        let result = PipelineResult::from(self.run_stages(document, cancel, &mut trace).await);
        trace.stats.total_duration_ms = start.elapsed().as_millis() as u64;

        match &result {
            PipelineResult::Success(record) => {
                info!(
                    "{}: extracted {}/4 fields in {}ms",
                    source,
                    record.filled_fields(),
                    trace.stats.total_duration_ms
                );
                if let Some(ref cb) = self.config.progress_callback {
                    cb.on_document_complete(source, record);
                }
            }
            PipelineResult::Failure(failure) => {
                warn!("{}: failed at {}: {}", source, failure.stage, failure.reason);
                if let Some(ref cb) = self.config.progress_callback {
                    cb.on_document_failed(source, failure);
                }
            }
        }

        ExtractionOutput {
            source_name: source.to_string(),
            kind: document.kind(),
            raw_text: trace.raw,
            normalized: trace.normalized,
            result,
            stats: trace.stats,
        }
    }

    async fn run_stages(
        &self,
        document: &Document,
        cancel: Option<&CancelToken>,
        trace: &mut Trace,
    ) -> Result<InvoiceRecord, StageError> {
        let mut policy = self.config.retry_policy();
        if let Some(token) = cancel {
            policy.cancel = token.clone();
        }
        let client = self.client.as_ref();
        let source = document.source_name();

        // ── Stage 1: Read ────────────────────────────────────────────────
        let ocr_prompt = self.config.ocr_prompt.as_deref().unwrap_or(OCR_SYSTEM_PROMPT);
        let vision = VisionClient::new(client, ocr_prompt);
        let read = self
            .stage(Stage::Read, source, cancel, read_document(document, &vision, &policy))
            .await?;
        debug!("{}: read {} chars", source, read.raw.content.chars().count());
        if let Some(stats) = read.stats {
            trace.stats.record(stats);
        }
        let raw = trace.raw.insert(read.raw);

        // ── Stage 2: Normalize ───────────────────────────────────────────
        let normalize_prompt = self
            .config
            .normalize_prompt
            .as_deref()
            .unwrap_or(NORMALIZE_SYSTEM_PROMPT);
        let normalized = self
            .stage(
                Stage::Normalize,
                source,
                cancel,
                normalize(client, raw, normalize_prompt, &policy),
            )
            .await?;
        log_stage(source, &normalized.stats);
        trace.stats.record(normalized.stats);
        let text = trace.normalized.insert(normalized.normalized);

        // ── Stage 3: Extract + validate ──────────────────────────────────
        let extract_prompt = self
            .config
            .extract_prompt
            .as_deref()
            .unwrap_or(EXTRACT_SYSTEM_PROMPT);
        let fields = self
            .stage(
                Stage::Extract,
                source,
                cancel,
                extract_fields(client, text, extract_prompt, &policy),
            )
            .await?;
        log_stage(source, &fields.stats);
        trace.stats.record(fields.stats);

        Ok(fields.record)
    }

    /// Run one stage with cancellation check and progress events around it.
    async fn stage<T>(
        &self,
        stage: Stage,
        source: &str,
        cancel: Option<&CancelToken>,
        work: impl Future<Output = Result<T, StageError>>,
    ) -> Result<T, StageError> {
        if cancel.is_some_and(CancelToken::is_cancelled) {
            debug!("{}: cancelled before {}", source, stage);
            return Err(StageError::at(stage, CANCELLED));
        }
        if let Some(ref cb) = self.config.progress_callback {
            cb.on_stage_start(source, stage);
        }

        let value = work.await?;

        if let Some(ref cb) = self.config.progress_callback {
            cb.on_stage_complete(source, stage);
        }
        Ok(value)
    }
}

fn log_stage(source: &str, stats: &StageStats) {
    debug!(
        "{}: {} done in {}ms ({} in / {} out tokens, {} retries)",
        source, stats.stage, stats.duration_ms, stats.input_tokens, stats.output_tokens, stats.retries
    );
}

// ── Entry points ─────────────────────────────────────────────────────────

/// Extract invoice fields from a file path or URL.
///
/// The document kind is inferred from the file extension.
///
/// # Errors
/// Returns `Err(InvoiceError)` only for fatal errors (input not found,
/// download failure, provider not configured). Stage failures are reported
/// in `output.result`.
///
/// # Example
/// ```rust,no_run
/// use edgequake_invoice::{extract_file, ExtractionConfig};
///
/// # #[tokio::main]
/// # async fn main() -> Result<(), Box<dyn std::error::Error>> {
/// let output = extract_file("invoice.docx", &ExtractionConfig::default()).await?;
/// println!("{}", serde_json::to_string_pretty(&output.result)?);
/// # Ok(())
/// # }
/// ```
pub async fn extract_file(
    input_str: impl AsRef<str>,
    config: &ExtractionConfig,
) -> Result<ExtractionOutput, InvoiceError> {
    let document = input::load_document(input_str.as_ref(), None, config.download_timeout_secs).await?;
    let pipeline = InvoicePipeline::new(config.clone())?;
    Ok(pipeline.run(&document).await)
}

/// Extract invoice fields from an in-memory payload.
pub async fn extract_from_bytes(
    bytes: impl Into<Vec<u8>>,
    kind: DocumentKind,
    source_name: impl Into<String>,
    config: &ExtractionConfig,
) -> Result<ExtractionOutput, InvoiceError> {
    let document = Document::new(kind, bytes, source_name);
    let pipeline = InvoicePipeline::new(config.clone())?;
    Ok(pipeline.run(&document).await)
}

/// Synchronous wrapper around [`extract_file`].
///
/// Creates a temporary tokio runtime internally.
pub fn extract_sync(
    input_str: impl AsRef<str>,
    config: &ExtractionConfig,
) -> Result<ExtractionOutput, InvoiceError> {
    tokio::runtime::Runtime::new()
        .map_err(|e| InvoiceError::Internal(format!("Failed to create tokio runtime: {}", e)))?
        .block_on(extract_file(input_str, config))
}

/// Extract a document and write its [`PipelineResult`] as JSON to `output_path`.
///
/// Uses atomic write (temp file + rename) to prevent partial files. Both
/// successes and stage failures are written; the result is also returned.
pub async fn extract_to_file(
    input_str: impl AsRef<str>,
    output_path: impl AsRef<Path>,
    config: &ExtractionConfig,
) -> Result<PipelineResult, InvoiceError> {
    let output = extract_file(input_str, config).await?;
    write_result(&output.result, output_path.as_ref()).await?;
    Ok(output.result)
}

/// Atomically write `result` as pretty JSON.
pub async fn write_result(result: &PipelineResult, path: &Path) -> Result<(), InvoiceError> {
    let write_err = |e: std::io::Error| InvoiceError::OutputWriteFailed {
        path: path.to_path_buf(),
        source: e,
    };

    let json = serde_json::to_string_pretty(result)
        .map_err(|e| InvoiceError::Internal(format!("Failed to serialise result: {}", e)))?;

    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        tokio::fs::create_dir_all(parent).await.map_err(write_err)?;
    }

    let tmp_path = path.with_extension("json.tmp");
    tokio::fs::write(&tmp_path, json).await.map_err(write_err)?;
    tokio::fs::rename(&tmp_path, path).await.map_err(write_err)?;
    Ok(())
}

// ── Provider resolution ──────────────────────────────────────────────────

fn create_provider(provider_name: &str, model: &str) -> Result<Arc<dyn LLMProvider>, InvoiceError> {
    ProviderFactory::create_llm_provider(provider_name, model).map_err(|e| {
        InvoiceError::ProviderNotConfigured {
            provider: provider_name.to_string(),
            hint: format!("{e}"),
        }
    })
}

/// Resolve the LLM provider, from most-specific to least-specific.
///
/// 1. **Pre-built provider** (`config.provider`), used as-is.
/// 2. **Named provider + model** (`config.provider_name`), with the API key
///    read from the provider's usual environment variable.
/// 3. **Environment pair** (`EDGEQUAKE_LLM_PROVIDER` + `EDGEQUAKE_MODEL`).
/// 4. **`OPENAI_API_KEY`** present → OpenAI with the configured model.
/// 5. **Full auto-detection** (`ProviderFactory::from_env`).
pub fn resolve_provider(config: &ExtractionConfig) -> Result<Arc<dyn LLMProvider>, InvoiceError> {
    if let Some(ref provider) = config.provider {
        return Ok(Arc::clone(provider));
    }

    if let Some(ref name) = config.provider_name {
        return create_provider(name, config.model_or_default());
    }

    if let (Ok(prov), Ok(model)) = (
        std::env::var("EDGEQUAKE_LLM_PROVIDER"),
        std::env::var("EDGEQUAKE_MODEL"),
    ) {
        if !prov.is_empty() && !model.is_empty() {
            return create_provider(&prov, config.model.as_deref().unwrap_or(&model));
        }
    }

    if let Ok(openai_key) = std::env::var("OPENAI_API_KEY") {
        if !openai_key.is_empty() {
            return create_provider("openai", config.model_or_default());
        }
    }

    let (llm_provider, _embedding) =
        ProviderFactory::from_env().map_err(|e| InvoiceError::ProviderNotConfigured {
            provider: "auto".to_string(),
            hint: format!(
                "No LLM provider could be auto-detected from environment.\n\
                Set OPENAI_API_KEY (model defaults to {}) or configure a provider.\n\
                Error: {}",
                DEFAULT_MODEL, e
            ),
        })?;

    Ok(llm_provider)
}
