//! Progress-callback trait for per-page extraction events.
//!
//! Inject an [`Arc<dyn ExtractionProgressCallback>`] via
//! [`crate::config::ExtractionConfigBuilder::progress_callback`] to receive
//! events as the extractor processes each page. [`ChannelProgress`] forwards
//! every event into a Tokio channel for hosts that prefer to consume events
//! elsewhere (a UI task, a websocket).
//!
//! # Example
//!
//! ```rust
//! use invoice_vlm::{ExtractionProgressCallback, ExtractionConfig};
//! use std::sync::{Arc, atomic::{AtomicUsize, Ordering}};
//!
//! struct RetryCounter {
//!     retries: AtomicUsize,
//! }
//!
//! impl ExtractionProgressCallback for RetryCounter {
//!     fn on_page_retry(&self, page_num: usize, attempt: u32, error: &str) {
//!         self.retries.fetch_add(1, Ordering::SeqCst);
//!         eprintln!("page {page_num}: attempt {attempt} failed: {error}");
//!     }
//! }
//!
//! let config = ExtractionConfig::builder()
//!     .progress_callback(Arc::new(RetryCounter { retries: AtomicUsize::new(0) }))
//!     .build()
//!     .unwrap();
//! ```

use std::sync::Arc;
use tokio::sync::mpsc;

/// Called by the extractor as it processes each page.
///
/// All methods have default no-op implementations so callers only override
/// what they care about. With `concurrency > 1` the page methods may be
/// called concurrently for different pages.
pub trait ExtractionProgressCallback: Send + Sync {
    /// Called once after the page images are loaded, before any request.
    fn on_document_start(&self, total_pages: usize) {
        let _ = total_pages;
    }

    /// Called before the first attempt for a page (1-indexed).
    fn on_page_start(&self, page_num: usize, total_pages: usize) {
        let _ = (page_num, total_pages);
    }

    /// Called for streamed fragments that report model-side progress
    /// (fragments containing "Processing").
    fn on_page_fragment(&self, page_num: usize, fragment: &str) {
        let _ = (page_num, fragment);
    }

    /// Called when an attempt fails and another will follow.
    ///
    /// # Arguments
    /// * `page_num`: 1-indexed page number
    /// * `attempt` : the attempt that failed (1-indexed)
    /// * `error`   : human-readable error of that attempt
    fn on_page_retry(&self, page_num: usize, attempt: u32, error: &str) {
        let _ = (page_num, attempt, error);
    }

    /// Called when a page produced a record.
    fn on_page_complete(&self, page_num: usize, total_pages: usize, fields_found: usize) {
        let _ = (page_num, total_pages, fields_found);
    }

    /// Called when a page failed after all attempts.
    fn on_page_error(&self, page_num: usize, total_pages: usize, error: &str) {
        let _ = (page_num, total_pages, error);
    }

    /// Called once after all pages have been attempted.
    fn on_document_complete(&self, total_pages: usize, success_count: usize) {
        let _ = (total_pages, success_count);
    }

    /// Called with the full answer accumulated so far while a chat answer
    /// streams in.
    fn on_chat_update(&self, accumulated: &str) {
        let _ = accumulated;
    }
}

/// A no-op implementation for callers that don't need progress events.
///
/// This is the default when no callback is configured.
pub struct NoopProgressCallback;

impl ExtractionProgressCallback for NoopProgressCallback {}

/// Convenience alias matching the type stored in [`crate::config::ExtractionConfig`].
pub type ProgressCallback = Arc<dyn ExtractionProgressCallback>;

/// One progress event, as forwarded by [`ChannelProgress`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ProgressEvent {
    DocumentStart {
        total_pages: usize,
    },
    PageStart {
        page_num: usize,
        total_pages: usize,
    },
    PageFragment {
        page_num: usize,
        fragment: String,
    },
    PageRetry {
        page_num: usize,
        attempt: u32,
        error: String,
    },
    PageComplete {
        page_num: usize,
        total_pages: usize,
        fields_found: usize,
    },
    PageError {
        page_num: usize,
        total_pages: usize,
        error: String,
    },
    DocumentComplete {
        total_pages: usize,
        success_count: usize,
    },
    ChatUpdate {
        accumulated: String,
    },
}

/// Forwards every event into an unbounded Tokio channel.
///
/// Sending never blocks the pipeline; events sent after the receiver is
/// dropped are discarded.
#[derive(Debug, Clone)]
pub struct ChannelProgress {
    tx: mpsc::UnboundedSender<ProgressEvent>,
}

impl ChannelProgress {
    /// Create the adapter and the receiving end.
    pub fn channel() -> (Self, mpsc::UnboundedReceiver<ProgressEvent>) {
        let (tx, rx) = mpsc::unbounded_channel();
        (Self { tx }, rx)
    }

    fn send(&self, event: ProgressEvent) {
        let _ = self.tx.send(event);
    }
}

impl ExtractionProgressCallback for ChannelProgress {
    fn on_document_start(&self, total_pages: usize) {
        self.send(ProgressEvent::DocumentStart { total_pages });
    }

    fn on_page_start(&self, page_num: usize, total_pages: usize) {
        self.send(ProgressEvent::PageStart {
            page_num,
            total_pages,
        });
    }

    fn on_page_fragment(&self, page_num: usize, fragment: &str) {
        self.send(ProgressEvent::PageFragment {
            page_num,
            fragment: fragment.to_string(),
        });
    }

    fn on_page_retry(&self, page_num: usize, attempt: u32, error: &str) {
        self.send(ProgressEvent::PageRetry {
            page_num,
            attempt,
            error: error.to_string(),
        });
    }

    fn on_page_complete(&self, page_num: usize, total_pages: usize, fields_found: usize) {
        self.send(ProgressEvent::PageComplete {
            page_num,
            total_pages,
            fields_found,
        });
    }

    fn on_page_error(&self, page_num: usize, total_pages: usize, error: &str) {
        self.send(ProgressEvent::PageError {
            page_num,
            total_pages,
            error: error.to_string(),
        });
    }

    fn on_document_complete(&self, total_pages: usize, success_count: usize) {
        self.send(ProgressEvent::DocumentComplete {
            total_pages,
            success_count,
        });
    }

    fn on_chat_update(&self, accumulated: &str) {
        self.send(ProgressEvent::ChatUpdate {
            accumulated: accumulated.to_string(),
        });
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};

    struct TrackingCallback {
        starts: AtomicUsize,
        completes: AtomicUsize,
        errors: AtomicUsize,
    }

    impl ExtractionProgressCallback for TrackingCallback {
        fn on_page_start(&self, _page_num: usize, _total_pages: usize) {
            self.starts.fetch_add(1, Ordering::SeqCst);
        }

        fn on_page_complete(&self, _page_num: usize, _total_pages: usize, _fields: usize) {
            self.completes.fetch_add(1, Ordering::SeqCst);
        }

        fn on_page_error(&self, _page_num: usize, _total_pages: usize, _error: &str) {
            self.errors.fetch_add(1, Ordering::SeqCst);
        }
    }

    #[test]
    fn noop_callback_does_not_panic() {
        let cb = NoopProgressCallback;
        cb.on_document_start(2);
        cb.on_page_start(1, 2);
        cb.on_page_fragment(1, "Processing");
        cb.on_page_retry(1, 1, "timeout");
        cb.on_page_complete(1, 2, 13);
        cb.on_page_error(2, 2, "some error");
        cb.on_document_complete(2, 1);
        cb.on_chat_update("answer");
    }

    #[test]
    fn tracking_callback_receives_events() {
        let tracker = TrackingCallback {
            starts: AtomicUsize::new(0),
            completes: AtomicUsize::new(0),
            errors: AtomicUsize::new(0),
        };
        tracker.on_page_start(1, 2);
        tracker.on_page_complete(1, 2, 4);
        tracker.on_page_start(2, 2);
        tracker.on_page_error(2, 2, "VLM timeout");

        assert_eq!(tracker.starts.load(Ordering::SeqCst), 2);
        assert_eq!(tracker.completes.load(Ordering::SeqCst), 1);
        assert_eq!(tracker.errors.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn channel_forwards_in_order() {
        let (progress, mut rx) = ChannelProgress::channel();
        let cb: ProgressCallback = Arc::new(progress);
        cb.on_document_start(1);
        cb.on_page_retry(1, 1, "empty");
        cb.on_document_complete(1, 1);
        drop(cb);

        let mut events = Vec::new();
        while let Some(e) = rx.recv().await {
            events.push(e);
        }
        assert_eq!(
            events,
            vec![
                ProgressEvent::DocumentStart { total_pages: 1 },
                ProgressEvent::PageRetry {
                    page_num: 1,
                    attempt: 1,
                    error: "empty".into()
                },
                ProgressEvent::DocumentComplete {
                    total_pages: 1,
                    success_count: 1
                },
            ]
        );
    }

    #[test]
    fn channel_ignores_dropped_receiver() {
        let (progress, rx) = ChannelProgress::channel();
        drop(rx);
        progress.on_document_start(3);
    }
}
