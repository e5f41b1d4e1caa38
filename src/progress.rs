//! Progress-callback traits for the two long-running drivers.
//!
//! Inject an [`Arc<dyn ExtractionProgressCallback>`] via
//! [`crate::config::ExtractionConfigBuilder::progress_callback`] or an
//! [`Arc<dyn BackfillProgressCallback>`] via
//! [`crate::config::BackfillConfigBuilder::progress_callback`].
//!
//! Both drivers are strictly sequential, so callbacks arrive synchronously,
//! in order, on the task running the driver. The traits are still
//! `Send + Sync` because configs are shared behind `Arc`.
//!
//! # Example
//!
//! ```rust
//! use paper2quiz::{ExtractionConfig, ExtractionProgressCallback};
//! use std::sync::Arc;
//!
//! struct Printer;
//!
//! impl ExtractionProgressCallback for Printer {
//!     fn on_page_complete(&self, completed: usize, total: usize, questions_found: usize) {
//!         eprintln!("{completed}/{total} pages, {questions_found} questions on this page");
//!     }
//! }
//!
//! let config = ExtractionConfig::builder()
//!     .progress_callback(Arc::new(Printer))
//!     .build()
//!     .unwrap();
//! ```

use std::sync::Arc;

/// Events emitted by [`crate::extract::QuestionExtractor::extract_range`].
pub trait ExtractionProgressCallback: Send + Sync {
    /// Called once before the first page is rasterised.
    fn on_extraction_start(&self, total_pages: usize) {
        let _ = total_pages;
    }

    /// Called exactly once per page, in page order, including pages that
    /// produced no image. `completed` runs 1..=`total`.
    fn on_page_complete(&self, completed: usize, total: usize, questions_found: usize) {
        let _ = (completed, total, questions_found);
    }

    /// Called once after the last page, before renumbering is returned.
    fn on_extraction_complete(&self, total_pages: usize, total_questions: usize) {
        let _ = (total_pages, total_questions);
    }
}

/// Events emitted by [`crate::backfill::ExplanationBackfiller::run`].
pub trait BackfillProgressCallback: Send + Sync {
    /// Called once the pending set is known.
    fn on_backfill_start(&self, pending: usize) {
        let _ = pending;
    }

    /// Called after each pending question, successful or not.
    ///
    /// * `done`: pending questions attempted so far (1-based)
    /// * `index`: position of the question in the paper
    /// * `error`: `None` on success
    fn on_question_complete(&self, done: usize, pending: usize, index: usize, error: Option<&str>) {
        let _ = (done, pending, index, error);
    }

    /// Called after every checkpoint write.
    fn on_checkpoint(&self, succeeded: usize) {
        let _ = succeeded;
    }
}

/// A no-op implementation for callers that don't need progress events.
pub struct NoopProgressCallback;

impl ExtractionProgressCallback for NoopProgressCallback {}
impl BackfillProgressCallback for NoopProgressCallback {}

pub type ExtractionProgress = Arc<dyn ExtractionProgressCallback>;
pub type BackfillProgress = Arc<dyn BackfillProgressCallback>;

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};

    struct CountingCallback {
        pages: AtomicUsize,
        questions: AtomicUsize,
    }

    impl ExtractionProgressCallback for CountingCallback {
        fn on_page_complete(&self, _completed: usize, _total: usize, questions_found: usize) {
            self.pages.fetch_add(1, Ordering::SeqCst);
            self.questions.fetch_add(questions_found, Ordering::SeqCst);
        }
    }

    #[test]
    fn noop_callback_does_not_panic() {
        let cb = NoopProgressCallback;
        ExtractionProgressCallback::on_page_complete(&cb, 1, 5, 3);
        cb.on_extraction_complete(5, 12);
        cb.on_question_complete(1, 4, 9, Some("timeout"));
        cb.on_checkpoint(10);
    }

    #[test]
    fn arc_dyn_callback_receives_events() {
        let counter = Arc::new(CountingCallback {
            pages: AtomicUsize::new(0),
            questions: AtomicUsize::new(0),
        });
        let cb: ExtractionProgress = counter.clone();
        cb.on_extraction_start(2);
        cb.on_page_complete(1, 2, 4);
        cb.on_page_complete(2, 2, 0);
        assert_eq!(counter.pages.load(Ordering::SeqCst), 2);
        assert_eq!(counter.questions.load(Ordering::SeqCst), 4);
    }
}
