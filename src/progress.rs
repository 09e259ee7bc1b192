//! Progress-callback trait for per-stage extraction events.
//!
//! Inject an [`Arc<dyn ExtractionProgressCallback>`] via
//! [`crate::config::ExtractionConfigBuilder::progress_callback`] to receive
//! events as each document moves through read → normalize → extract.
//!
//! # Example
//!
//! ```rust
//! use edgequake_invoice::{ExtractionConfig, ExtractionProgressCallback, Stage};
//! use std::sync::{Arc, atomic::{AtomicUsize, Ordering}};
//!
//! struct StageCounter {
//!     completed: AtomicUsize,
//! }
//!
//! impl ExtractionProgressCallback for StageCounter {
//!     fn on_stage_complete(&self, source: &str, stage: Stage) {
//!         let done = self.completed.fetch_add(1, Ordering::SeqCst) + 1;
//!         eprintln!("{source}: {stage} done ({done} stages so far)");
//!     }
//! }
//!
//! let counter = Arc::new(StageCounter { completed: AtomicUsize::new(0) });
//!
//! let config = ExtractionConfig::builder()
//!     .progress_callback(counter as Arc<dyn ExtractionProgressCallback>)
//!     .build()
//!     .unwrap();
//! ```

use crate::error::Stage;
use crate::output::{InvoiceRecord, StageFailure};
use std::sync::Arc;

/// Called by the pipeline as it processes each document.
///
/// Implementations must be `Send + Sync`: several documents may be in flight
/// at once through [`crate::stream::extract_stream`], so events for different
/// documents can interleave. All methods default to no-ops.
pub trait ExtractionProgressCallback: Send + Sync {
    /// Called once when a document enters the pipeline.
    fn on_document_start(&self, source: &str) {
        let _ = source;
    }

    /// Called just before a stage runs.
    fn on_stage_start(&self, source: &str, stage: Stage) {
        let _ = (source, stage);
    }

    /// Called when a stage finished without error.
    fn on_stage_complete(&self, source: &str, stage: Stage) {
        let _ = (source, stage);
    }

    /// Called once with the terminal failure of a document.
    fn on_document_failed(&self, source: &str, failure: &StageFailure) {
        let _ = (source, failure);
    }

    /// Called once with the validated record of a document.
    fn on_document_complete(&self, source: &str, record: &InvoiceRecord) {
        let _ = (source, record);
    }
}

/// A no-op implementation for callers that don't need progress events.
pub struct NoopProgressCallback;

impl ExtractionProgressCallback for NoopProgressCallback {}

/// Convenience alias matching the type stored in [`crate::config::ExtractionConfig`].
pub type ProgressCallback = Arc<dyn ExtractionProgressCallback>;

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Mutex;

    #[derive(Default)]
    struct Recorder {
        events: Mutex<Vec<String>>,
    }

    impl ExtractionProgressCallback for Recorder {
        fn on_stage_start(&self, _source: &str, stage: Stage) {
            self.events.lock().unwrap().push(format!("start:{stage}"));
        }

        fn on_document_failed(&self, _source: &str, failure: &StageFailure) {
            self.events
                .lock()
                .unwrap()
                .push(format!("failed:{}", failure.stage));
        }
    }

    #[test]
    fn noop_callback_does_not_panic() {
        let cb = NoopProgressCallback;
        cb.on_document_start("a.txt");
        cb.on_stage_start("a.txt", Stage::Read);
        cb.on_stage_complete("a.txt", Stage::Read);
        cb.on_document_complete("a.txt", &InvoiceRecord::default());
    }

    #[test]
    fn recorder_receives_overridden_events_only() {
        let rec = Recorder::default();
        rec.on_document_start("a.txt");
        rec.on_stage_start("a.txt", Stage::Read);
        rec.on_stage_complete("a.txt", Stage::Read);
        rec.on_document_failed(
            "a.txt",
            &StageFailure {
                stage: Stage::Normalize,
                reason: "empty content".into(),
            },
        );
        assert_eq!(
            *rec.events.lock().unwrap(),
            vec!["start:read".to_string(), "failed:normalize".to_string()]
        );
    }

    #[test]
    fn arc_dyn_callback_is_send_sync() {
        fn assert_send_sync<T: Send + Sync + ?Sized>() {}
        assert_send_sync::<dyn ExtractionProgressCallback>();
        let cb: ProgressCallback = Arc::new(NoopProgressCallback);
        cb.on_stage_start("scan.png", Stage::Read);
    }
}
