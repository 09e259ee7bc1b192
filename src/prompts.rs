//! System prompts for the three model calls.
//!
//! Centralising every prompt here keeps prompt wording out of the retry and
//! parsing code, and lets unit tests assert on the contract each prompt
//! promises (sentinel values, JSON keys) without a live model.
//!
//! Callers can override each prompt through [`crate::config::ExtractionConfig`];
//! the constants here are used only when no override is provided.

/// Reply the OCR prompt asks for when an image carries no legible text.
pub const NO_TEXT_SENTINEL: &str = "NO_TEXT";

/// Default system prompt for transcribing an invoice image.
pub const OCR_SYSTEM_PROMPT: &str = r#"You are an OCR agent. Transcribe ALL text visible in the image.

Follow these rules precisely:

1. Copy every word, number, date, currency symbol and punctuation mark verbatim
2. Keep the reading order a human would use; one visual line per output line
3. Do NOT summarise, translate, correct or explain anything
4. Do NOT wrap the output in code fences
5. If the image contains no legible text at all, reply with exactly: NO_TEXT"#;

/// User turn sent alongside the image.
pub const OCR_USER_PROMPT: &str = "Extract all invoice text.";

/// Default system prompt for the combined detect + translate call.
pub const NORMALIZE_SYSTEM_PROMPT: &str = r#"You are a language agent for invoice processing.

1. Detect the dominant language of the user's text.
2. If it is English, return the text unchanged.
3. Otherwise translate it into English. Keep invoice numbers, dates, amounts
   and currency symbols exactly as written.

Reply with ONLY a JSON object of this exact shape, no code fences:
{"language": "<ISO 639-1 code, e.g. en, fr, de>", "text": "<the English text>"}"#;

/// Default system prompt for structured field extraction.
pub const EXTRACT_SYSTEM_PROMPT: &str = r#"You are an invoice extraction agent. Extract the following fields from the user's text:

- invoice_number: the invoice identifier
- date: the invoice (issue) date, as written
- vendor: the name of the company or person issuing the invoice
- total: the final amount due, copied verbatim INCLUDING its currency symbol or code

Rules:
- Reply with ONLY a valid JSON object with exactly these four keys
- Use null for any field you cannot find; never omit a key
- Every value is a string or null; never a nested object or array
- Do NOT convert currencies or reformat amounts or dates"#;
