//! Field extractor: English invoice text in, four-field [`InvoiceRecord`] out.
//!
//! The reply is parsed as loosely as possible before it is judged:
//! fences and surrounding prose are stripped, then each canonical key is
//! looked up in the object and coalesced into its typed slot.
//!
//! | reply value            | slot                          |
//! |------------------------|-------------------------------|
//! | string                 | `Some(trimmed)`, `None` if blank |
//! | `null` or missing key  | `None`                        |
//! | number / boolean       | `Some(value.to_string())`     |
//! | array / object         | validate failure              |
//!
//! Keys are matched exactly first, then ignoring case and punctuation, so
//! `"Invoice Number"` or `"invoiceNumber"` still land in `invoice_number`.
//! Unknown keys are dropped.

use crate::config::RetryPolicy;
use crate::document::NormalizedText;
use crate::error::{Stage, StageError};
use crate::output::{InvoiceRecord, StageStats};
use crate::pipeline::llm::{call_model, CallPurpose, ModelClient, ModelRequest};
use crate::pipeline::postprocess::json_payload;
use serde_json::{Map, Value};
use std::time::Instant;
use tracing::debug;

/// Four-field record plus model statistics.
#[derive(Debug, Clone)]
pub struct FieldsOutcome {
    pub record: InvoiceRecord,
    pub stats: StageStats,
}

/// Extract the invoice fields from `text`.
pub async fn extract_fields(
    client: &dyn ModelClient,
    text: &NormalizedText,
    system_prompt: &str,
    policy: &RetryPolicy,
) -> Result<FieldsOutcome, StageError> {
    let start = Instant::now();
    let request = ModelRequest {
        purpose: CallPurpose::Extract,
        system: system_prompt.to_string(),
        user: text.content.clone(),
        image: None,
    };

    let (reply, retries) = call_model(client, &request, policy)
        .await
        .map_err(|e| StageError::from_transport(Stage::Extract, &e))?;

    let record = parse_record(&reply.content)?;
    debug!("Extracted {}/4 invoice fields", record.filled_fields());

    Ok(FieldsOutcome {
        record,
        stats: StageStats {
            stage: Stage::Extract,
            input_tokens: reply.input_tokens,
            output_tokens: reply.output_tokens,
            retries,
            duration_ms: start.elapsed().as_millis() as u64,
        },
    })
}

/// Parse and repair a model reply into an [`InvoiceRecord`].
pub fn parse_record(reply: &str) -> Result<InvoiceRecord, StageError> {
    let value: Value = serde_json::from_str(&json_payload(reply))
        .map_err(|e| StageError::Extract(format!("malformed model JSON: {e}")))?;

    let object = match value {
        Value::Object(object) => object,
        other => {
            return Err(StageError::Validate(format!(
                "expected a JSON object, got {}",
                json_type(&other)
            )));
        }
    };

    let mut record = InvoiceRecord::default();
    for field in InvoiceRecord::FIELDS {
        let coalesced = match lookup(&object, field) {
            None | Some(Value::Null) => None,
            Some(Value::String(s)) => Some(s.trim().to_string()).filter(|s| !s.is_empty()),
            Some(Value::Number(n)) => Some(n.to_string()),
            Some(Value::Bool(b)) => Some(b.to_string()),
            Some(Value::Array(_)) | Some(Value::Object(_)) => {
                return Err(StageError::Validate(format!(
                    "field `{field}` is a nested structure"
                )));
            }
        };
        if let Some(slot) = record.slot_mut(field) {
            *slot = coalesced;
        }
    }

    Ok(record)
}

fn lookup<'a>(object: &'a Map<String, Value>, field: &str) -> Option<&'a Value> {
    if let Some(v) = object.get(field) {
        return Some(v);
    }
    let wanted = loose_key(field);
    object
        .iter()
        .find(|(k, _)| loose_key(k) == wanted)
        .map(|(_, v)| v)
}

fn loose_key(key: &str) -> String {
    key.chars()
        .filter(|c| c.is_alphanumeric())
        .flat_map(char::to_lowercase)
        .collect()
}

fn json_type(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "a boolean",
        Value::Number(_) => "a number",
        Value::String(_) => "a string",
        Value::Array(_) => "an array",
        Value::Object(_) => "an object",
    }
}
