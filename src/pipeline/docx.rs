//! DOCX text extraction: paragraphs of `word/document.xml`, in document order.
//!
//! A DOCX file is a zip container; the body lives in `word/document.xml` as
//! WordprocessingML. Each `<w:p>` is a paragraph and its visible text is the
//! concatenation of its `<w:t>` runs. `<w:tab/>` and `<w:br/>` are kept as
//! `\t` and `\n` so that label/value pairs on one line stay readable.

use quick_xml::events::Event;
use quick_xml::Reader;
use std::io::Cursor;
use thiserror::Error;

const DOCUMENT_PART: &str = "word/document.xml";

#[derive(Debug, Error)]
pub enum DocxError {
    #[error("not a DOCX archive: {0}")]
    NotAnArchive(String),
    #[error("DOCX archive has no word/document.xml")]
    MissingDocumentPart,
    #[error("unreadable word/document.xml: {0}")]
    Unreadable(String),
    #[error("malformed word/document.xml: {0}")]
    MalformedXml(String),
}

/// Extract every paragraph's text from DOCX bytes.
///
/// Empty paragraphs are kept as empty strings so blank lines survive the
/// newline join. A body with no paragraphs yields an empty vector.
pub fn paragraphs(bytes: &[u8]) -> Result<Vec<String>, DocxError> {
    let mut archive = zip::ZipArchive::new(Cursor::new(bytes))
        .map_err(|e| DocxError::NotAnArchive(e.to_string()))?;

    let part = archive
        .by_name(DOCUMENT_PART)
        .map_err(|_| DocxError::MissingDocumentPart)?;
    let xml = std::io::read_to_string(part).map_err(|e| DocxError::Unreadable(e.to_string()))?;

    paragraphs_from_xml(&xml)
}

/// Paragraph text of a WordprocessingML body.
pub fn paragraphs_from_xml(xml: &str) -> Result<Vec<String>, DocxError> {
    let mut reader = Reader::from_str(xml);
    let mut paragraphs = Vec::new();
    // Text boxes nest paragraphs inside runs, hence a stack.
    let mut open: Vec<String> = Vec::new();
    let mut in_text = false;

    loop {
        match reader.read_event() {
            Ok(Event::Start(e)) => match e.name().as_ref() {
                b"w:p" => open.push(String::new()),
                b"w:t" => in_text = true,
                _ => {}
            },
            Ok(Event::Empty(e)) => match e.name().as_ref() {
                b"w:p" => paragraphs.push(String::new()),
                b"w:tab" => push_to(&mut open, "\t"),
                b"w:br" | b"w:cr" => push_to(&mut open, "\n"),
                _ => {}
            },
            Ok(Event::End(e)) => match e.name().as_ref() {
                b"w:p" => {
                    if let Some(p) = open.pop() {
                        paragraphs.push(p);
                    }
                }
                b"w:t" => in_text = false,
                _ => {}
            },
            Ok(Event::Text(t)) if in_text => {
                let text = t
                    .unescape()
                    .map_err(|e| DocxError::MalformedXml(e.to_string()))?;
                push_to(&mut open, &text);
            }
            Ok(Event::Eof) => break,
            Err(e) => return Err(DocxError::MalformedXml(e.to_string())),
            _ => {}
        }
    }

    Ok(paragraphs)
}

fn push_to(open: &mut [String], text: &str) {
    if let Some(current) = open.last_mut() {
        current.push_str(text);
    }
}

#[cfg(test)]
pub(crate) mod fixtures {
    //! In-memory DOCX builder shared by unit tests.

    use std::io::{Cursor, Write};
    use zip::write::SimpleFileOptions;

    fn escape(s: &str) -> String {
        s.replace('&', "&amp;").replace('<', "&lt;").replace('>', "&gt;")
    }

    /// A minimal DOCX whose body holds one `<w:p>` per entry.
    pub(crate) fn docx_with_paragraphs(paragraphs: &[&str]) -> Vec<u8> {
        let body: String = paragraphs
            .iter()
            .map(|p| format!(r#"<w:p><w:r><w:t xml:space="preserve">{}</w:t></w:r></w:p>"#, escape(p)))
            .collect();
        let xml = format!(
            r#"<?xml version="1.0" encoding="UTF-8" standalone="yes"?><w:document xmlns:w="http://schemas.openxmlformats.org/wordprocessingml/2006/main"><w:body>{body}</w:body></w:document>"#
        );

        let mut writer = zip::ZipWriter::new(Cursor::new(Vec::new()));
        writer
            .start_file("word/document.xml", SimpleFileOptions::default())
            .expect("start entry");
        writer.write_all(xml.as_bytes()).expect("write entry");
        writer.finish().expect("finish zip").into_inner()
    }
}

#[cfg(test)]
mod tests {
    use super::fixtures::docx_with_paragraphs;
    use super::*;

    #[test]
    fn paragraphs_in_document_order() {
        let bytes = docx_with_paragraphs(&["Invoice INV-1029", "Date: 2025-10-21"]);
        assert_eq!(
            paragraphs(&bytes).unwrap(),
            vec!["Invoice INV-1029", "Date: 2025-10-21"]
        );
    }

    #[test]
    fn runs_are_concatenated_and_entities_unescaped() {
        let xml = r#"<w:document><w:body><w:p><w:r><w:t>Vendor: </w:t></w:r><w:r><w:t>A&amp;B Ltd</w:t></w:r></w:p></w:body></w:document>"#;
        assert_eq!(paragraphs_from_xml(xml).unwrap(), vec!["Vendor: A&B Ltd"]);
    }

    #[test]
    fn tabs_breaks_and_empty_paragraphs() {
        let xml = r#"<w:body><w:p><w:r><w:t>Total</w:t><w:tab/><w:t>$5</w:t><w:br/><w:t>VAT</w:t></w:r></w:p><w:p/></w:body>"#;
        assert_eq!(paragraphs_from_xml(xml).unwrap(), vec!["Total\t$5\nVAT", ""]);
    }

    #[test]
    fn body_without_paragraphs_is_empty() {
        let bytes = docx_with_paragraphs(&[]);
        assert!(paragraphs(&bytes).unwrap().is_empty());
    }

    #[test]
    fn non_zip_payload_is_rejected() {
        let err = paragraphs(b"plain text, not a zip").unwrap_err();
        assert!(matches!(err, DocxError::NotAnArchive(_)));
    }

    #[test]
    fn zip_without_document_part_is_rejected() {
        use std::io::Write;
        let mut writer = zip::ZipWriter::new(Cursor::new(Vec::new()));
        writer
            .start_file("readme.txt", zip::write::SimpleFileOptions::default())
            .unwrap();
        writer.write_all(b"hi").unwrap();
        let bytes = writer.finish().unwrap().into_inner();
        assert!(matches!(
            paragraphs(&bytes).unwrap_err(),
            DocxError::MissingDocumentPart
        ));
    }
}
