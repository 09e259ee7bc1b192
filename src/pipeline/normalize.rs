//! Language normalizer: one model call that both detects the language and,
//! when needed, translates to English.
//!
//! The model answers `{"language": "<code>", "text": "<english>"}`. For
//! English input the model's echo is discarded and the raw text is passed
//! through untouched, so a model that "tidies up" English text can never
//! alter what the extractor sees.

use crate::config::RetryPolicy;
use crate::document::{NormalizedText, RawText};
use crate::error::{Stage, StageError};
use crate::output::StageStats;
use crate::pipeline::llm::{call_model, CallPurpose, ModelClient, ModelRequest};
use crate::pipeline::postprocess::json_payload;
use serde::Deserialize;
use std::time::Instant;
use tracing::debug;

/// Reason reported for empty or whitespace-only input.
pub const EMPTY_CONTENT: &str = "empty content";

/// Reason reported when the reply is not `{language, text}`.
pub const MALFORMED_RESPONSE: &str = "malformed normalization response";

#[derive(Debug, Deserialize)]
struct NormalizationReply {
    language: String,
    #[serde(default)]
    text: Option<String>,
}

/// English text plus model statistics.
#[derive(Debug, Clone)]
pub struct NormalizeOutcome {
    pub normalized: NormalizedText,
    pub stats: StageStats,
}

/// Normalize `raw` to English.
pub async fn normalize(
    client: &dyn ModelClient,
    raw: &RawText,
    system_prompt: &str,
    policy: &RetryPolicy,
) -> Result<NormalizeOutcome, StageError> {
    if raw.content.trim().is_empty() {
        return Err(StageError::Normalize(EMPTY_CONTENT.into()));
    }

    let start = Instant::now();
    let request = ModelRequest {
        purpose: CallPurpose::Normalize,
        system: system_prompt.to_string(),
        user: raw.content.clone(),
        image: None,
    };

    let (reply, retries) = call_model(client, &request, policy)
        .await
        .map_err(|e| StageError::from_transport(Stage::Normalize, &e))?;

    let normalized = parse_reply(&reply.content, raw)?;
    debug!(
        "Detected language '{}' (translated: {})",
        normalized.detected_language, normalized.was_translated
    );

    Ok(NormalizeOutcome {
        normalized,
        stats: StageStats {
            stage: Stage::Normalize,
            input_tokens: reply.input_tokens,
            output_tokens: reply.output_tokens,
            retries,
            duration_ms: start.elapsed().as_millis() as u64,
        },
    })
}

fn parse_reply(content: &str, raw: &RawText) -> Result<NormalizedText, StageError> {
    let malformed = || StageError::Normalize(MALFORMED_RESPONSE.into());

    let reply: NormalizationReply = serde_json::from_str(&json_payload(content)).map_err(|e| {
        debug!("Unparseable normalization reply: {}", e);
        malformed()
    })?;

    let language = reply.language.trim().to_lowercase();
    if language.is_empty() {
        return Err(malformed());
    }

    if is_english(&language) {
        return Ok(NormalizedText {
            content: raw.content.clone(),
            detected_language: "en".to_string(),
            was_translated: false,
        });
    }

    match reply.text {
        Some(text) if !text.trim().is_empty() => Ok(NormalizedText {
            content: text,
            detected_language: language,
            was_translated: true,
        }),
        _ => Err(malformed()),
    }
}

fn is_english(language: &str) -> bool {
    matches!(language, "en" | "eng" | "english")
        || language.starts_with("en-")
        || language.starts_with("en_")
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::document::DocumentKind;
    use crate::error::TransportError;
    use crate::pipeline::llm::stub::ScriptedClient;
    use crate::prompts::NORMALIZE_SYSTEM_PROMPT;
    use std::time::Duration;

    fn policy() -> RetryPolicy {
        RetryPolicy {
            max_retries: 1,
            backoff: Duration::from_millis(1),
            timeout: Duration::from_secs(1),
            ..RetryPolicy::default()
        }
    }

    fn raw(s: &str) -> RawText {
        RawText::new(s, DocumentKind::Text)
    }

    #[tokio::test]
    async fn empty_content_fails_without_model_call() {
        let client = ScriptedClient::new();
        for input in ["", "   \n\t "] {
            let err = normalize(&client, &raw(input), NORMALIZE_SYSTEM_PROMPT, &policy())
                .await
                .unwrap_err();
            assert_eq!(err, StageError::Normalize(EMPTY_CONTENT.into()));
        }
        assert_eq!(client.calls(CallPurpose::Normalize), 0);
    }

    #[tokio::test]
    async fn english_passes_through_unchanged() {
        let input = "Invoice INV-7\nTotal:   $5.00  ";
        let client = ScriptedClient::new().reply(
            CallPurpose::Normalize,
            r#"{"language": "EN", "text": "Invoice INV-7 Total: $5.00"}"#,
        );

        let out = normalize(&client, &raw(input), NORMALIZE_SYSTEM_PROMPT, &policy())
            .await
            .unwrap();
        assert_eq!(out.normalized.content, input);
        assert!(!out.normalized.was_translated);
        assert_eq!(out.normalized.detected_language, "en");
    }

    #[tokio::test]
    async fn foreign_text_is_translated() {
        let client = ScriptedClient::new().reply(
            CallPurpose::Normalize,
            "```json\n{\"language\": \"de\", \"text\": \"Invoice No. 42\\nTotal: 12,50 €\"}\n```",
        );

        let out = normalize(
            &client,
            &raw("Rechnung Nr. 42\nGesamt: 12,50 €"),
            NORMALIZE_SYSTEM_PROMPT,
            &policy(),
        )
        .await
        .unwrap();
        assert_eq!(out.normalized.content, "Invoice No. 42\nTotal: 12,50 €");
        assert!(out.normalized.was_translated);
        assert_eq!(out.normalized.detected_language, "de");
    }

    #[tokio::test]
    async fn malformed_replies_fail_normalize() {
        let replies = [
            "Sure! The text is in French.",
            r#"{"lang": "fr"}"#,
            r#"{"language": "fr", "text": ""}"#,
            r#"{"language": "  ", "text": "x"}"#,
        ];
        for reply in replies {
            let client = ScriptedClient::new().reply(CallPurpose::Normalize, reply);
            let err = normalize(&client, &raw("Facture"), NORMALIZE_SYSTEM_PROMPT, &policy())
                .await
                .unwrap_err();
            assert_eq!(
                err,
                StageError::Normalize(MALFORMED_RESPONSE.into()),
                "reply: {reply}"
            );
            assert_eq!(client.calls(CallPurpose::Normalize), 1, "content errors are not retried");
        }
    }

    #[tokio::test]
    async fn exhausted_transport_escalates_to_normalize() {
        let client = ScriptedClient::new()
            .fail(CallPurpose::Normalize, TransportError::RateLimited("429".into()))
            .fail(CallPurpose::Normalize, TransportError::RateLimited("429".into()));
        let err = normalize(&client, &raw("Factura"), NORMALIZE_SYSTEM_PROMPT, &policy())
            .await
            .unwrap_err();
        assert_eq!(err.stage(), Stage::Normalize);
        assert_eq!(client.calls(CallPurpose::Normalize), 2);
    }

    #[test]
    fn english_labels() {
        assert!(is_english("en"));
        assert!(is_english("en-gb"));
        assert!(is_english("english"));
        assert!(!is_english("es"));
        assert!(!is_english("ena"));
    }
}
