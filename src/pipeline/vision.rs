//! Vision extraction: transcribe an invoice image with a multimodal model.
//!
//! One request per image: the OCR system prompt, a short user instruction,
//! and the image as a base64 attachment. The client makes a single attempt;
//! the read stage decides whether to retry it.

use crate::error::TransportError;
use crate::pipeline::encode::ImagePayload;
use crate::pipeline::llm::{CallPurpose, ModelClient, ModelReply, ModelRequest};
use crate::pipeline::postprocess::clean_transcript;
use crate::prompts::{NO_TEXT_SENTINEL, OCR_USER_PROMPT};
use tracing::debug;

/// Transcribed text plus the reply's token accounting.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Transcript {
    pub text: String,
    pub input_tokens: u64,
    pub output_tokens: u64,
}

/// Sends invoice images to a vision-capable model.
pub struct VisionClient<'a> {
    client: &'a dyn ModelClient,
    system_prompt: &'a str,
}

impl<'a> VisionClient<'a> {
    pub fn new(client: &'a dyn ModelClient, system_prompt: &'a str) -> Self {
        Self {
            client,
            system_prompt,
        }
    }

    /// Transcribe `image`.
    ///
    /// * `Ok(Some(_))`: the model returned legible text
    /// * `Ok(None)`: empty reply, the no-text sentinel, or a non-retryable
    ///   rejection of the request (a non-2xx answer)
    /// * `Err(_)`: transient transport failure the caller may retry, or
    ///   cancellation
    pub async fn extract(&self, image: &ImagePayload) -> Result<Option<Transcript>, TransportError> {
        let request = ModelRequest {
            purpose: CallPurpose::Ocr,
            system: self.system_prompt.to_string(),
            user: OCR_USER_PROMPT.to_string(),
            image: Some(image.clone()),
        };

        match self.client.complete(&request).await {
            Ok(reply) => Ok(transcript_from(reply)),
            Err(e) if e.is_transient() || e == TransportError::Cancelled => Err(e),
            Err(e) => {
                debug!("Vision request rejected: {}", e);
                Ok(None)
            }
        }
    }
}

fn transcript_from(reply: ModelReply) -> Option<Transcript> {
    let text = clean_transcript(&reply.content);
    if text.trim().is_empty() || text.trim() == NO_TEXT_SENTINEL {
        return None;
    }
    Some(Transcript {
        text,
        input_tokens: reply.input_tokens,
        output_tokens: reply.output_tokens,
    })
}
