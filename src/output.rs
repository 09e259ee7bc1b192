//! Output types returned to callers.
//!
//! [`PipelineResult`] is the contract value: either the four-field
//! [`InvoiceRecord`] or a stage-tagged [`StageFailure`]. It serialises
//! untagged, so a success renders as the bare four-key JSON object and a
//! failure as `{"stage": "...", "reason": "..."}`.
//!
//! [`ExtractionOutput`] wraps the result together with the intermediate
//! texts and per-stage statistics for callers that want to show their work.

use crate::document::{DocumentKind, NormalizedText, RawText};
use crate::error::{Stage, StageError};
use serde::{Deserialize, Serialize};

/// The four invoice fields.
///
/// All four keys are always present when serialised; unknown fields are
/// `null`, never omitted.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct InvoiceRecord {
    pub invoice_number: Option<String>,
    pub date: Option<String>,
    pub vendor: Option<String>,
    /// Amount exactly as printed, currency symbol included.
    pub total: Option<String>,
}

impl InvoiceRecord {
    /// JSON key names, in output order.
    pub const FIELDS: [&'static str; 4] = ["invoice_number", "date", "vendor", "total"];

    /// Mutable slot for a canonical field name.
    pub(crate) fn slot_mut(&mut self, field: &str) -> Option<&mut Option<String>> {
        match field {
            "invoice_number" => Some(&mut self.invoice_number),
            "date" => Some(&mut self.date),
            "vendor" => Some(&mut self.vendor),
            "total" => Some(&mut self.total),
            _ => None,
        }
    }

    /// Number of fields the model could determine.
    pub fn filled_fields(&self) -> usize {
        [&self.invoice_number, &self.date, &self.vendor, &self.total]
            .iter()
            .filter(|f| f.is_some())
            .count()
    }
}

/// Display-ready description of why a document failed.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StageFailure {
    pub stage: Stage,
    pub reason: String,
}

impl From<StageError> for StageFailure {
    fn from(err: StageError) -> Self {
        Self {
            stage: err.stage(),
            reason: err.reason().to_string(),
        }
    }
}

/// Outcome of one pipeline invocation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(untagged)]
pub enum PipelineResult {
    Success(InvoiceRecord),
    Failure(StageFailure),
}

impl PipelineResult {
    pub fn is_success(&self) -> bool {
        matches!(self, PipelineResult::Success(_))
    }

    pub fn record(&self) -> Option<&InvoiceRecord> {
        match self {
            PipelineResult::Success(r) => Some(r),
            PipelineResult::Failure(_) => None,
        }
    }

    pub fn failure(&self) -> Option<&StageFailure> {
        match self {
            PipelineResult::Success(_) => None,
            PipelineResult::Failure(f) => Some(f),
        }
    }

    /// Convert into a plain `Result` for `?`-style callers.
    pub fn into_result(self) -> Result<InvoiceRecord, StageError> {
        match self {
            PipelineResult::Success(r) => Ok(r),
            PipelineResult::Failure(f) => Err(StageError::at(f.stage, f.reason)),
        }
    }
}

impl From<Result<InvoiceRecord, StageError>> for PipelineResult {
    fn from(r: Result<InvoiceRecord, StageError>) -> Self {
        match r {
            Ok(record) => PipelineResult::Success(record),
            Err(e) => PipelineResult::Failure(e.into()),
        }
    }
}

/// Statistics for one stage that called a model.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StageStats {
    pub stage: Stage,
    pub input_tokens: u64,
    pub output_tokens: u64,
    pub retries: u32,
    pub duration_ms: u64,
}

/// Aggregate statistics for one document.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ExtractionStats {
    pub stages: Vec<StageStats>,
    pub total_input_tokens: u64,
    pub total_output_tokens: u64,
    pub total_duration_ms: u64,
}

impl ExtractionStats {
    pub(crate) fn record(&mut self, stats: StageStats) {
        self.total_input_tokens += stats.input_tokens;
        self.total_output_tokens += stats.output_tokens;
        self.stages.push(stats);
    }

    /// Total model calls that had to be retried across all stages.
    pub fn total_retries(&self) -> u32 {
        self.stages.iter().map(|s| s.retries).sum()
    }
}

/// Full record of one pipeline invocation.
#[derive(Debug, Clone, Serialize)]
pub struct ExtractionOutput {
    pub source_name: String,
    pub kind: DocumentKind,
    /// Present once the read stage succeeded.
    pub raw_text: Option<RawText>,
    /// Present once the normalize stage succeeded.
    pub normalized: Option<NormalizedText>,
    pub result: PipelineResult,
    pub stats: ExtractionStats,
}
