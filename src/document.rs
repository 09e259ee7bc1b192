//! Input and intermediate text types that flow through the pipeline.
//!
//! ```text
//! Document ──read──▶ RawText ──normalize──▶ NormalizedText ──extract──▶ InvoiceRecord
//! ```
//!
//! Every value is owned by exactly one pipeline invocation; nothing here is
//! shared or mutated after construction.

use crate::error::InvoiceError;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::Path;
use std::str::FromStr;

/// Declared kind of an input document.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DocumentKind {
    /// Scanned or photographed invoice; text comes from the vision model.
    Image,
    /// Word document; text comes from its paragraphs.
    Docx,
    /// UTF-8 plain text.
    Text,
}

impl DocumentKind {
    /// Infer the kind from a file name's extension.
    ///
    /// Unknown or missing extensions fall back to [`DocumentKind::Text`].
    pub fn from_path(path: impl AsRef<Path>) -> Self {
        let ext = path
            .as_ref()
            .extension()
            .and_then(|e| e.to_str())
            .map(|e| e.to_ascii_lowercase());

        match ext.as_deref() {
            Some("png" | "jpg" | "jpeg" | "gif" | "webp") => DocumentKind::Image,
            Some("docx") => DocumentKind::Docx,
            _ => DocumentKind::Text,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            DocumentKind::Image => "image",
            DocumentKind::Docx => "docx",
            DocumentKind::Text => "text",
        }
    }
}

impl fmt::Display for DocumentKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for DocumentKind {
    type Err = InvoiceError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "image" | "img" => Ok(DocumentKind::Image),
            "docx" => Ok(DocumentKind::Docx),
            "text" | "txt" => Ok(DocumentKind::Text),
            other => Err(InvoiceError::UnsupportedKind {
                kind: other.to_string(),
            }),
        }
    }
}

/// Immutable input descriptor.
#[derive(Clone, PartialEq, Eq)]
pub struct Document {
    kind: DocumentKind,
    payload: Vec<u8>,
    source_name: String,
}

impl Document {
    pub fn new(kind: DocumentKind, payload: impl Into<Vec<u8>>, source_name: impl Into<String>) -> Self {
        Self {
            kind,
            payload: payload.into(),
            source_name: source_name.into(),
        }
    }

    /// Convenience constructor for an in-memory text document.
    pub fn text(content: impl Into<String>, source_name: impl Into<String>) -> Self {
        Self::new(DocumentKind::Text, content.into().into_bytes(), source_name)
    }

    pub fn kind(&self) -> DocumentKind {
        self.kind
    }

    pub fn payload(&self) -> &[u8] {
        &self.payload
    }

    pub fn source_name(&self) -> &str {
        &self.source_name
    }
}

impl fmt::Debug for Document {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Document")
            .field("kind", &self.kind)
            .field("payload", &format_args!("<{} bytes>", self.payload.len()))
            .field("source_name", &self.source_name)
            .finish()
    }
}

/// Text as read from the document, before any language handling.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RawText {
    pub content: String,
    pub origin_kind: DocumentKind,
}

impl RawText {
    pub fn new(content: impl Into<String>, origin_kind: DocumentKind) -> Self {
        Self {
            content: content.into(),
            origin_kind,
        }
    }
}

/// English version of a [`RawText`].
///
/// `content` is English-readable whether or not a translation happened.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NormalizedText {
    pub content: String,
    pub detected_language: String,
    pub was_translated: bool,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn kind_from_extension() {
        assert_eq!(DocumentKind::from_path("scan.PNG"), DocumentKind::Image);
        assert_eq!(DocumentKind::from_path("photo.jpeg"), DocumentKind::Image);
        assert_eq!(DocumentKind::from_path("invoice.docx"), DocumentKind::Docx);
        assert_eq!(DocumentKind::from_path("invoice.txt"), DocumentKind::Text);
        assert_eq!(DocumentKind::from_path("README"), DocumentKind::Text);
    }

    #[test]
    fn kind_from_str() {
        assert_eq!("image".parse::<DocumentKind>().unwrap(), DocumentKind::Image);
        assert_eq!(" DOCX ".parse::<DocumentKind>().unwrap(), DocumentKind::Docx);
        assert_eq!("txt".parse::<DocumentKind>().unwrap(), DocumentKind::Text);
        assert!(matches!(
            "pdf".parse::<DocumentKind>(),
            Err(InvoiceError::UnsupportedKind { .. })
        ));
    }

    #[test]
    fn debug_hides_payload_bytes() {
        let doc = Document::new(DocumentKind::Image, vec![0u8; 2048], "scan.png");
        let dbg = format!("{doc:?}");
        assert!(dbg.contains("<2048 bytes>"), "got: {dbg}");
    }
}
