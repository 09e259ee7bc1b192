//! Streaming API: extract many documents, emitting each as it completes.
//!
//! Each document gets its own independent pipeline invocation; nothing is
//! shared between them except the model client. Up to `concurrency`
//! invocations run at once and outputs arrive in completion order. Use
//! [`stream_indexed`] to match them back to their inputs by position;
//! `source_name` is not unique when two inputs share a file name.
//!
//! Dropping the stream abandons every in-flight invocation.

use crate::config::ExtractionConfig;
use crate::document::Document;
use crate::error::InvoiceError;
use crate::extract::InvoicePipeline;
use crate::output::ExtractionOutput;
use futures::stream::{self, StreamExt};
use std::pin::Pin;
use tokio_stream::Stream;
use tracing::info;

/// A boxed stream of per-document outputs.
pub type OutputStream = Pin<Box<dyn Stream<Item = ExtractionOutput> + Send>>;

/// A boxed stream of `(input index, output)` pairs.
pub type IndexedOutputStream = Pin<Box<dyn Stream<Item = (usize, ExtractionOutput)> + Send>>;

/// Extract every document in `documents`, streaming outputs as they are ready.
///
/// # Returns
/// - `Ok(OutputStream)`: one [`ExtractionOutput`] per document; stage
///   failures are carried in each output's `result`
/// - `Err(InvoiceError)`: fatal error (provider not configured)
///
/// # Example
/// ```rust,no_run
/// use edgequake_invoice::{extract_stream, Document, ExtractionConfig};
/// use futures::StreamExt;
///
/// # #[tokio::main]
/// # async fn main() -> Result<(), Box<dyn std::error::Error>> {
/// let docs = vec![
///     Document::text("Invoice 1 ...", "a.txt"),
///     Document::text("Rechnung 2 ...", "b.txt"),
/// ];
/// let mut outputs = extract_stream(docs, &ExtractionConfig::default())?;
/// while let Some(out) = outputs.next().await {
///     println!("{}: {}", out.source_name, serde_json::to_string(&out.result)?);
/// }
/// # Ok(())
/// # }
/// ```
pub fn extract_stream(
    documents: Vec<Document>,
    config: &ExtractionConfig,
) -> Result<OutputStream, InvoiceError> {
    let pipeline = InvoicePipeline::new(config.clone())?;
    Ok(stream_with(pipeline, documents))
}

/// Stream `documents` through an existing pipeline.
pub fn stream_with(pipeline: InvoicePipeline, documents: Vec<Document>) -> OutputStream {
    Box::pin(stream_indexed(pipeline, documents).map(|(_, output)| output))
}

/// Like [`stream_with`], but tags each output with the position of its
/// document in `documents`.
pub fn stream_indexed(pipeline: InvoicePipeline, documents: Vec<Document>) -> IndexedOutputStream {
    let concurrency = pipeline.config().concurrency.max(1);
    info!(
        "Starting streaming extraction: {} documents, concurrency {}",
        documents.len(),
        concurrency
    );

    let s = stream::iter(documents.into_iter().enumerate().map(move |(index, document)| {
        let pipeline = pipeline.clone();
        async move { (index, pipeline.run(&document).await) }
    }))
    .buffer_unordered(concurrency);

    Box::pin(s)
}
