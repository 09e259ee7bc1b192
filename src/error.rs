//! Error types for the edgequake-invoice2json library.
//!
//! Three distinct error types reflect three distinct failure modes:
//!
//! * [`InvoiceError`]: **Fatal**: extraction cannot start at all (file not
//!   found, provider not configured, invalid configuration). Returned as
//!   `Err(InvoiceError)` from constructors and the top-level `extract*`
//!   functions.
//!
//! * [`StageError`]: **Per-document**: one pipeline stage rejected the
//!   document (unreadable payload, empty content, malformed model JSON).
//!   Never propagated as `Err`; it becomes the
//!   [`crate::output::PipelineResult::Failure`] of that document so the
//!   caller always receives a stage-tagged, display-ready reason.
//!
//! * [`TransportError`]: **Per-call**: a single outbound model call failed.
//!   Transient kinds are retried in place by
//!   [`crate::pipeline::llm::with_retry`]; once the retry budget is spent
//!   the error is escalated into the owning stage's [`StageError`].

use once_cell::sync::Lazy;
use regex::Regex;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::PathBuf;
use thiserror::Error;

/// All fatal errors returned by the edgequake-invoice2json library.
#[derive(Debug, Error)]
pub enum InvoiceError {
    // ── Input errors ──────────────────────────────────────────────────────
    /// Input file was not found at the given path.
    #[error("Invoice file not found: '{path}'\nCheck the path exists and is readable.")]
    FileNotFound { path: PathBuf },

    /// Process does not have read permission on the file.
    #[error("Permission denied reading '{path}'\nTry: chmod +r {path:?}")]
    PermissionDenied { path: PathBuf },

    /// The input string is not a valid file path or URL.
    #[error("Invalid input '{input}': not a file path or a valid HTTP/HTTPS URL")]
    InvalidInput { input: String },

    /// The declared document kind is not one of image, docx, text.
    #[error("Unsupported document kind '{kind}' (expected image, docx or text)")]
    UnsupportedKind { kind: String },

    /// HTTP URL was syntactically valid but download failed.
    #[error("Failed to download '{url}': {reason}\nCheck your internet connection.")]
    DownloadFailed { url: String, reason: String },

    /// Download exceeded the configured timeout.
    #[error("Download timed out after {secs}s for '{url}'\nIncrease --download-timeout.")]
    DownloadTimeout { url: String, secs: u64 },

    // ── LLM errors ────────────────────────────────────────────────────────
    /// The configured provider is not initialised (missing API key etc.).
    #[error("LLM provider '{provider}' is not configured.\n{hint}")]
    ProviderNotConfigured { provider: String, hint: String },

    // ── I/O errors ────────────────────────────────────────────────────────
    /// Could not create or write the output JSON file.
    #[error("Failed to write output file '{path}': {source}")]
    OutputWriteFailed {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    // ── Config errors ─────────────────────────────────────────────────────
    /// Builder validation failed.
    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),

    // ── Catch-all ─────────────────────────────────────────────────────────
    /// Unexpected internal error.
    #[error("Internal error: {0}")]
    Internal(String),
}

/// One discrete pipeline phase.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Stage {
    Read,
    Normalize,
    Extract,
    Validate,
}

impl Stage {
    pub fn as_str(&self) -> &'static str {
        match self {
            Stage::Read => "read",
            Stage::Normalize => "normalize",
            Stage::Extract => "extract",
            Stage::Validate => "validate",
        }
    }
}

impl fmt::Display for Stage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A terminal, stage-tagged rejection of one document.
///
/// The `Display` output is the bare reason so it can be shown to end users
/// as-is; the stage is available through [`StageError::stage`].
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum StageError {
    /// Unreadable, undecodable, or empty-OCR input.
    #[error("{0}")]
    Read(String),

    /// Empty content or a malformed normalization response.
    #[error("{0}")]
    Normalize(String),

    /// The extraction model did not return parseable JSON.
    #[error("{0}")]
    Extract(String),

    /// The parsed JSON cannot be repaired into the four-field record.
    #[error("{0}")]
    Validate(String),
}

impl StageError {
    /// Build the error for `stage` carrying `reason`.
    pub fn at(stage: Stage, reason: impl Into<String>) -> Self {
        let reason = reason.into();
        match stage {
            Stage::Read => StageError::Read(reason),
            Stage::Normalize => StageError::Normalize(reason),
            Stage::Extract => StageError::Extract(reason),
            Stage::Validate => StageError::Validate(reason),
        }
    }

    /// Escalate an exhausted transport failure into `stage`'s error kind.
    pub fn from_transport(stage: Stage, err: &TransportError) -> Self {
        match err {
            TransportError::Cancelled => Self::at(stage, crate::cancel::CANCELLED),
            _ => Self::at(stage, format!("model call failed: {err}")),
        }
    }

    pub fn stage(&self) -> Stage {
        match self {
            StageError::Read(_) => Stage::Read,
            StageError::Normalize(_) => Stage::Normalize,
            StageError::Extract(_) => Stage::Extract,
            StageError::Validate(_) => Stage::Validate,
        }
    }

    pub fn reason(&self) -> &str {
        match self {
            StageError::Read(r)
            | StageError::Normalize(r)
            | StageError::Extract(r)
            | StageError::Validate(r) => r,
        }
    }
}

/// Failure of a single outbound model call.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum TransportError {
    /// The call did not complete within the per-call timeout.
    #[error("call timed out after {secs}s")]
    Timeout { secs: u64 },

    /// The provider answered with a 5xx / overloaded error.
    #[error("provider server error: {0}")]
    Server(String),

    /// The provider throttled the call (HTTP 429).
    #[error("rate limited: {0}")]
    RateLimited(String),

    /// Connection reset or DNS failure.
    #[error("network error: {0}")]
    Network(String),

    /// Non-retryable rejection (bad request, auth, content filter).
    #[error("request rejected: {0}")]
    Rejected(String),

    /// The caller cancelled the run while the call or its backoff was pending.
    #[error("{}", crate::cancel::CANCELLED)]
    Cancelled,
}

impl TransportError {
    /// Whether retrying the same request can plausibly succeed.
    pub fn is_transient(&self) -> bool {
        !matches!(self, TransportError::Rejected(_) | TransportError::Cancelled)
    }

    /// Classify a provider error message.
    ///
    /// Provider errors arrive as opaque messages from the SDK. A status code
    /// is trusted only at the start of the message or right after `status`,
    /// `code` or `HTTP`; digits elsewhere (token counts, request ids) are
    /// ignored. Without a status code, well-known phrases decide.
    pub fn classify(message: impl Into<String>) -> Self {
        let message = message.into();

        if let Some(status) = status_code(&message) {
            return match status {
                408 => TransportError::Timeout { secs: 0 },
                429 => TransportError::RateLimited(message),
                500..=599 => TransportError::Server(message),
                _ => TransportError::Rejected(message),
            };
        }

        let lower = message.to_lowercase();
        if lower.contains("timed out") || lower.contains("timeout") {
            TransportError::Timeout { secs: 0 }
        } else if lower.contains("rate limit") || lower.contains("too many requests") {
            TransportError::RateLimited(message)
        } else if ["overloaded", "unavailable", "internal server error", "bad gateway"]
            .iter()
            .any(|needle| lower.contains(needle))
        {
            TransportError::Server(message)
        } else if lower.contains("connection") || lower.contains("network") || lower.contains("dns") {
            TransportError::Network(message)
        } else {
            TransportError::Rejected(message)
        }
    }
}

static STATUS_RE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(
        r"(?i)^\W*([1-5]\d{2})\b|\b(?:status|code|http(?:/\d(?:\.\d)?)?)\s*[:=(]?\s*([1-5]\d{2})\b",
    )
    .expect("valid status regex")
});

/// HTTP status of a provider message, if one appears in status position.
fn status_code(message: &str) -> Option<u16> {
    STATUS_RE
        .captures(message)?
        .iter()
        .skip(1)
        .flatten()
        .next()?
        .as_str()
        .parse()
        .ok()
}
