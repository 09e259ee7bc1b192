//! Input resolution: turn a user-supplied path or URL into a [`Document`].
//!
//! Local files are read whole; URLs are downloaded into memory with the
//! configured timeout. The document kind is taken from the caller when
//! given, otherwise inferred from the file name (or, for downloads without
//! a usable name, from the `Content-Type` header).

use crate::document::{Document, DocumentKind};
use crate::error::InvoiceError;
use reqwest::header::CONTENT_TYPE;
use std::path::{Path, PathBuf};
use tracing::{debug, info};

/// Check if the input string looks like a URL.
pub fn is_url(input: &str) -> bool {
    input.starts_with("http://") || input.starts_with("https://")
}

/// Load `input` (local path or HTTP/HTTPS URL) as a [`Document`].
pub async fn load_document(
    input: &str,
    kind: Option<DocumentKind>,
    timeout_secs: u64,
) -> Result<Document, InvoiceError> {
    if input.trim().is_empty() {
        return Err(InvoiceError::InvalidInput {
            input: input.to_string(),
        });
    }
    if is_url(input) {
        download_url(input, kind, timeout_secs).await
    } else {
        load_local(Path::new(input), kind).await
    }
}

async fn load_local(path: &Path, kind: Option<DocumentKind>) -> Result<Document, InvoiceError> {
    let bytes = tokio::fs::read(path).await.map_err(|e| match e.kind() {
        std::io::ErrorKind::PermissionDenied => InvoiceError::PermissionDenied {
            path: path.to_path_buf(),
        },
        _ => InvoiceError::FileNotFound {
            path: path.to_path_buf(),
        },
    })?;

    let kind = kind.unwrap_or_else(|| DocumentKind::from_path(path));
    let name = path
        .file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_else(|| path.display().to_string());

    debug!("Loaded local {} document: {} ({} bytes)", kind, path.display(), bytes.len());
    Ok(Document::new(kind, bytes, name))
}

/// Download a URL into memory.
async fn download_url(
    url: &str,
    kind: Option<DocumentKind>,
    timeout_secs: u64,
) -> Result<Document, InvoiceError> {
    info!("Downloading invoice from: {}", url);

    let client = reqwest::Client::builder()
        .timeout(std::time::Duration::from_secs(timeout_secs))
        .build()
        .map_err(|e| InvoiceError::DownloadFailed {
            url: url.to_string(),
            reason: e.to_string(),
        })?;

    let response = client.get(url).send().await.map_err(|e| {
        if e.is_timeout() {
            InvoiceError::DownloadTimeout {
                url: url.to_string(),
                secs: timeout_secs,
            }
        } else {
            InvoiceError::DownloadFailed {
                url: url.to_string(),
                reason: e.to_string(),
            }
        }
    })?;

    if !response.status().is_success() {
        return Err(InvoiceError::DownloadFailed {
            url: url.to_string(),
            reason: format!("HTTP {}", response.status()),
        });
    }

    let filename = extract_filename(url);
    let content_type = response
        .headers()
        .get(CONTENT_TYPE)
        .and_then(|v| v.to_str().ok())
        .map(str::to_string);

    let bytes = response
        .bytes()
        .await
        .map_err(|e| InvoiceError::DownloadFailed {
            url: url.to_string(),
            reason: e.to_string(),
        })?;

    let kind = kind.unwrap_or_else(|| infer_remote_kind(filename.as_deref(), content_type.as_deref()));
    info!("Downloaded {} bytes as {}", bytes.len(), kind);

    Ok(Document::new(
        kind,
        bytes.to_vec(),
        filename.unwrap_or_else(|| url.to_string()),
    ))
}

/// Last path segment of the URL, if it looks like a file name.
fn extract_filename(url: &str) -> Option<String> {
    let parsed = reqwest::Url::parse(url).ok()?;
    let last = parsed.path_segments()?.next_back()?;
    if !last.is_empty() && last.contains('.') {
        Some(last.to_string())
    } else {
        None
    }
}

fn infer_remote_kind(filename: Option<&str>, content_type: Option<&str>) -> DocumentKind {
    if let Some(name) = filename {
        return DocumentKind::from_path(PathBuf::from(name));
    }
    match content_type.map(|c| c.to_ascii_lowercase()) {
        Some(c) if c.starts_with("image/") => DocumentKind::Image,
        Some(c) if c.contains("wordprocessingml") => DocumentKind::Docx,
        _ => DocumentKind::Text,
    }
}
