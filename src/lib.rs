//! # edgequake-invoice2json
//!
//! Extract structured invoice data (invoice number, date, vendor, total) from
//! scanned images, DOCX files and plain text using language models.
//!
//! ## Why this crate?
//!
//! Invoices arrive in every format and language. Rather than maintaining
//! per-vendor templates, this crate reads whatever text the document holds
//! (with a vision model for scans), normalises it to English, and asks a
//! model for a fixed four-key JSON object. The answer is then repaired into a
//! typed [`InvoiceRecord`] whose four keys are always present.
//!
//! ## Pipeline Overview
//!
//! ```text
//! Document
//!  │
//!  ├─ 1. Read       text: UTF-8 · DOCX: paragraphs · image: vision model
//!  ├─ 2. Normalize  one call: detect language, translate to English
//!  ├─ 3. Extract    one call: four-key JSON
//!  └─ 4. Validate   coalesce keys into InvoiceRecord, nulls for unknowns
//! ```
//!
//! The first failing stage ends the run; the caller receives a
//! [`PipelineResult::Failure`] naming the stage and a display-ready reason.
//! Transient model errors (timeouts, 5xx, 429) are retried once by default,
//! content errors never.
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use edgequake_invoice::{extract_file, ExtractionConfig};
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     // Provider auto-detected from OPENAI_API_KEY / ANTHROPIC_API_KEY / GEMINI_API_KEY
//!     let config = ExtractionConfig::default();
//!     let output = extract_file("invoice.png", &config).await?;
//!     println!("{}", serde_json::to_string_pretty(&output.result)?);
//!     eprintln!("tokens: {} in / {} out",
//!         output.stats.total_input_tokens,
//!         output.stats.total_output_tokens);
//!     Ok(())
//! }
//! ```
//!
//! ## Feature Flags
//!
//! | Feature | Default | Description |
//! |---------|---------|-------------|
//! | `cli`   | on      | Enables the `invoice2json` binary (clap + anyhow + tracing-subscriber) |
//!
//! Disable `cli` when using only the library to avoid pulling in CLI-only deps:
//! ```toml
//! edgequake-invoice2json = { version = "0.1", default-features = false }
//! ```

// ── Modules ──────────────────────────────────────────────────────────────

pub mod cancel;
pub mod config;
pub mod document;
pub mod error;
pub mod extract;
pub mod output;
pub mod pipeline;
pub mod progress;
pub mod prompts;
pub mod stream;

// ── Re-exports ───────────────────────────────────────────────────────────

pub use cancel::{CancelToken, CANCELLED};
pub use config::{ExtractionConfig, ExtractionConfigBuilder, RetryPolicy, DEFAULT_MODEL};
pub use document::{Document, DocumentKind, NormalizedText, RawText};
pub use error::{InvoiceError, Stage, StageError, TransportError};
pub use extract::{
    extract_file, extract_from_bytes, extract_sync, extract_to_file, write_result, InvoicePipeline,
};
pub use output::{
    ExtractionOutput, ExtractionStats, InvoiceRecord, PipelineResult, StageFailure, StageStats,
};
pub use pipeline::input::load_document;
pub use pipeline::llm::{ModelClient, ModelReply, ModelRequest};
pub use progress::{ExtractionProgressCallback, NoopProgressCallback, ProgressCallback};
pub use stream::{extract_stream, stream_indexed, stream_with, IndexedOutputStream, OutputStream};
