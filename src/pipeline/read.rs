//! Content reader: turn a [`Document`] into [`RawText`].
//!
//! Only image documents cost a model call; DOCX and text are decoded
//! locally. An empty DOCX is not an error here: the normalize stage owns the
//! "nothing to work with" decision for every kind alike.

use crate::config::RetryPolicy;
use crate::document::{Document, DocumentKind, RawText};
use crate::error::{Stage, StageError};
use crate::output::StageStats;
use crate::pipeline::docx;
use crate::pipeline::encode::encode_image;
use crate::pipeline::llm::with_retry;
use crate::pipeline::vision::VisionClient;
use std::time::Instant;
use tracing::debug;

/// Reason reported when the vision model finds nothing to read.
pub const NO_EXTRACTABLE_TEXT: &str = "no extractable text";

/// Raw text plus model statistics (image documents only).
#[derive(Debug, Clone)]
pub struct ReadOutcome {
    pub raw: RawText,
    pub stats: Option<StageStats>,
}

/// Read `document` into raw text.
pub async fn read_document(
    document: &Document,
    vision: &VisionClient<'_>,
    policy: &RetryPolicy,
) -> Result<ReadOutcome, StageError> {
    match document.kind() {
        DocumentKind::Image => read_image(document, vision, policy).await,
        DocumentKind::Docx => {
            let paragraphs = docx::paragraphs(document.payload())
                .map_err(|e| StageError::Read(e.to_string()))?;
            debug!(
                "{}: {} DOCX paragraphs",
                document.source_name(),
                paragraphs.len()
            );
            Ok(ReadOutcome {
                raw: RawText::new(paragraphs.join("\n"), DocumentKind::Docx),
                stats: None,
            })
        }
        DocumentKind::Text => {
            let content = std::str::from_utf8(document.payload())
                .map_err(|e| StageError::Read(format!("invalid UTF-8 text: {e}")))?;
            Ok(ReadOutcome {
                raw: RawText::new(content, DocumentKind::Text),
                stats: None,
            })
        }
    }
}

async fn read_image(
    document: &Document,
    vision: &VisionClient<'_>,
    policy: &RetryPolicy,
) -> Result<ReadOutcome, StageError> {
    let start = Instant::now();
    let payload = encode_image(document.payload()).map_err(|e| StageError::Read(e.to_string()))?;
    let image = &payload;
    let (transcript, retries) = with_retry(policy, "ocr", move || vision.extract(image))
        .await
        .map_err(|e| StageError::from_transport(Stage::Read, &e))?;

    let transcript = transcript.ok_or_else(|| StageError::Read(NO_EXTRACTABLE_TEXT.into()))?;

    Ok(ReadOutcome {
        raw: RawText::new(transcript.text, DocumentKind::Image),
        stats: Some(StageStats {
            stage: Stage::Read,
            input_tokens: transcript.input_tokens,
            output_tokens: transcript.output_tokens,
            retries,
            duration_ms: start.elapsed().as_millis() as u64,
        }),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::TransportError;
    use crate::pipeline::docx::fixtures::docx_with_paragraphs;
    use crate::pipeline::llm::stub::ScriptedClient;
    use crate::pipeline::llm::CallPurpose;
    use crate::prompts::OCR_SYSTEM_PROMPT;
    use std::time::Duration;

    const PNG_MAGIC: [u8; 8] = [0x89, b'P', b'N', b'G', 0x0D, 0x0A, 0x1A, 0x0A];

    fn policy() -> RetryPolicy {
        RetryPolicy {
            max_retries: 1,
            backoff: Duration::from_millis(1),
            timeout: Duration::from_secs(1),
            ..RetryPolicy::default()
        }
    }

    #[tokio::test]
    async fn text_is_decoded_verbatim() {
        let client = ScriptedClient::new();
        let vision = VisionClient::new(&client, OCR_SYSTEM_PROMPT);
        let payload = "  Rechnung Nr. 42\n\nGesamt: 12,50 €  \n";
        let doc = Document::text(payload, "r.txt");

        let out = read_document(&doc, &vision, &policy()).await.unwrap();
        assert_eq!(out.raw.content, payload);
        assert_eq!(out.raw.origin_kind, DocumentKind::Text);
        assert!(out.stats.is_none());
        assert_eq!(client.calls(CallPurpose::Ocr), 0);
    }

    #[tokio::test]
    async fn invalid_utf8_fails_read() {
        let client = ScriptedClient::new();
        let vision = VisionClient::new(&client, OCR_SYSTEM_PROMPT);
        let doc = Document::new(DocumentKind::Text, vec![0xC3, 0x28], "bad.txt");

        let err = read_document(&doc, &vision, &policy()).await.unwrap_err();
        assert_eq!(err.stage(), Stage::Read);
        assert!(err.reason().contains("UTF-8"));
    }

    #[tokio::test]
    async fn docx_paragraphs_joined_with_newlines() {
        let client = ScriptedClient::new();
        let vision = VisionClient::new(&client, OCR_SYSTEM_PROMPT);
        let bytes = docx_with_paragraphs(&["Invoice INV-1029", "Total: $1299.55"]);
        let doc = Document::new(DocumentKind::Docx, bytes, "inv.docx");

        let out = read_document(&doc, &vision, &policy()).await.unwrap();
        assert_eq!(out.raw.content, "Invoice INV-1029\nTotal: $1299.55");
    }

    #[tokio::test]
    async fn empty_docx_yields_empty_text() {
        let client = ScriptedClient::new();
        let vision = VisionClient::new(&client, OCR_SYSTEM_PROMPT);
        let doc = Document::new(DocumentKind::Docx, docx_with_paragraphs(&[]), "empty.docx");

        let out = read_document(&doc, &vision, &policy()).await.unwrap();
        assert_eq!(out.raw.content, "");
    }

    #[tokio::test]
    async fn image_without_text_fails_read() {
        let client = ScriptedClient::new().reply(CallPurpose::Ocr, "");
        let vision = VisionClient::new(&client, OCR_SYSTEM_PROMPT);
        let doc = Document::new(DocumentKind::Image, PNG_MAGIC.to_vec(), "blank.png");

        let err = read_document(&doc, &vision, &policy()).await.unwrap_err();
        assert_eq!(err, StageError::Read(NO_EXTRACTABLE_TEXT.into()));
    }

    #[tokio::test]
    async fn image_transient_failure_retried_then_read() {
        let client = ScriptedClient::new()
            .fail(CallPurpose::Ocr, TransportError::Timeout { secs: 1 })
            .reply(CallPurpose::Ocr, "INVOICE 9");
        let vision = VisionClient::new(&client, OCR_SYSTEM_PROMPT);
        let doc = Document::new(DocumentKind::Image, PNG_MAGIC.to_vec(), "scan.png");

        let out = read_document(&doc, &vision, &policy()).await.unwrap();
        assert_eq!(out.raw.content, "INVOICE 9");
        assert_eq!(out.stats.unwrap().retries, 1);
    }

    #[tokio::test]
    async fn image_transient_failure_escalates_after_budget() {
        let client = ScriptedClient::new()
            .fail(CallPurpose::Ocr, TransportError::Server("500".into()))
            .fail(CallPurpose::Ocr, TransportError::Server("500".into()));
        let vision = VisionClient::new(&client, OCR_SYSTEM_PROMPT);
        let doc = Document::new(DocumentKind::Image, PNG_MAGIC.to_vec(), "scan.png");

        let err = read_document(&doc, &vision, &policy()).await.unwrap_err();
        assert_eq!(err.stage(), Stage::Read);
        assert!(err.reason().starts_with("model call failed"));
    }

    #[tokio::test]
    async fn bad_request_quoting_large_numbers_is_not_retried() {
        let rejection = TransportError::classify(
            "400 Bad Request: maximum context length is 128000 tokens, \
             your messages resulted in 150023 tokens",
        );
        let client = ScriptedClient::new()
            .fail(CallPurpose::Ocr, rejection)
            .reply(CallPurpose::Ocr, "never reached");
        let vision = VisionClient::new(&client, OCR_SYSTEM_PROMPT);
        let doc = Document::new(DocumentKind::Image, PNG_MAGIC.to_vec(), "huge.png");

        let err = read_document(&doc, &vision, &policy()).await.unwrap_err();
        assert_eq!(err, StageError::Read(NO_EXTRACTABLE_TEXT.into()));
        assert_eq!(client.calls(CallPurpose::Ocr), 1);
    }

    #[tokio::test]
    async fn non_image_payload_fails_before_model_call() {
        let client = ScriptedClient::new();
        let vision = VisionClient::new(&client, OCR_SYSTEM_PROMPT);
        let doc = Document::new(DocumentKind::Image, b"hello".to_vec(), "fake.png");

        let err = read_document(&doc, &vision, &policy()).await.unwrap_err();
        assert_eq!(err.stage(), Stage::Read);
        assert_eq!(client.calls(CallPurpose::Ocr), 0);
    }
}
