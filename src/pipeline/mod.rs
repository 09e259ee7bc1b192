//! Pipeline stages for invoice extraction.
//!
//! Each submodule implements exactly one transformation step, so every
//! stage can be tested against a scripted [`llm::ModelClient`] without the
//! others.
//!
//! ## Data Flow
//!
//! ```text
//! input ──▶ read ──────────▶ normalize ──────▶ fields
//! (path/URL) (docx | vision)  (detect+translate) (four-key JSON)
//! ```
//!
//! 1. [`input`]: load a local file or download a URL into a `Document`
//! 2. [`read`]: decode text or DOCX locally; images go through
//!    [`encode`] and [`vision`]
//! 3. [`normalize`]: one model call that detects the language and returns
//!    English text
//! 4. [`fields`]: structured extraction, then repair into `InvoiceRecord`
//!
//! [`llm`] holds the model seam and the bounded retry driver shared by the
//! three model-calling stages; [`postprocess`] strips fences and invisible
//! characters from replies before they are parsed.

pub mod docx;
pub mod encode;
pub mod fields;
pub mod input;
pub mod llm;
pub mod normalize;
pub mod postprocess;
pub mod read;
pub mod vision;
