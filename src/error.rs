//! Error types for the invoice-vlm library.
//!
//! Three error types reflect three failure scopes:
//!
//! * [`InvoiceError`]: **Fatal**: the document cannot be processed at all
//!   (unreadable image, nothing extracted from any page, bad configuration).
//!   Returned as `Err(InvoiceError)` from the top-level extractor methods.
//!
//! * [`PageError`]: **Non-fatal**: one page failed after all attempts.
//!   Recorded in [`crate::output::PageOutcome`] so the remaining pages can
//!   still contribute to the merged record.
//!
//! * [`TransportError`]: one request to the model endpoint failed. The
//!   retrying client wraps it in a [`PageError`]; chat wraps it in an
//!   [`InvoiceError`].

use std::path::PathBuf;
use thiserror::Error;

/// All fatal errors returned by the invoice-vlm library.
#[derive(Debug, Error)]
pub enum InvoiceError {
    // ── Input errors ──────────────────────────────────────────────────────
    /// Page image was not found at the given path.
    #[error("Image file not found: '{path}'\nCheck the path exists and is readable.")]
    ImageNotFound { path: PathBuf },

    /// The image exists but could not be read.
    #[error("Failed to read image '{path}': {source}")]
    ImageReadFailed {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// The image bytes could not be decoded or re-encoded.
    #[error("Image '{label}' could not be decoded: {detail}")]
    ImageDecodeFailed { label: String, detail: String },

    /// The page source has no pages.
    #[error("Document has no pages to extract")]
    EmptyDocument,

    // ── Extraction errors ─────────────────────────────────────────────────
    /// A page failed and the page-failure policy is `Abort`.
    #[error("Extraction aborted on page {page}: {source}")]
    PageFailed {
        page: usize,
        #[source]
        source: PageError,
    },

    /// Every field of the merged record is empty.
    #[error(
        "Failed to extract any information from the document ({pages} pages).\n\
First error: {first_error}\nTry again, or use a sharper scan of the invoice."
    )]
    NothingExtracted { pages: usize, first_error: String },

    // ── Chat errors ───────────────────────────────────────────────────────
    /// The chat question was blank.
    #[error("Chat question is empty")]
    EmptyQuestion,

    /// The model returned no answer.
    #[error("Chat failed: {detail}")]
    ChatFailed { detail: String },

    /// Request to the model endpoint failed outside the retrying client.
    #[error(transparent)]
    Transport(#[from] TransportError),

    // ── Config errors ─────────────────────────────────────────────────────
    /// Builder validation failed.
    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),

    // ── Catch-all ─────────────────────────────────────────────────────────
    /// Unexpected internal error.
    #[error("Internal error: {0}")]
    Internal(String),
}

/// A non-fatal error for a single page attempt or a whole page.
#[derive(Debug, Clone, PartialEq, Eq, Error, serde::Serialize, serde::Deserialize)]
pub enum PageError {
    /// The model endpoint could not be reached or streamed an error.
    #[error(transparent)]
    Transport(#[from] TransportError),

    /// The stream ended without any text.
    #[error("No text was extracted from the image")]
    EmptyResponse,

    /// The cleaned response has no `label: value` lines.
    #[error("Invalid response format from the model: no fields found")]
    MalformedResponse,

    /// Every field came back as not available.
    #[error("Failed to extract any information from the image")]
    NothingExtracted,

    /// A single attempt exceeded the configured request timeout.
    #[error("Model request timed out after {secs}s")]
    Timeout { secs: u64 },

    /// All attempts failed; `detail` is the last attempt's error.
    #[error("Page {page}: extraction failed after {attempts} attempts: {detail}")]
    Exhausted {
        page: usize,
        attempts: u32,
        detail: String,
    },
}

/// Failure of one request to the model endpoint.
#[derive(Debug, Clone, PartialEq, Eq, Error, serde::Serialize, serde::Deserialize)]
pub enum TransportError {
    /// Connection, DNS or request-building failure.
    #[error("Request to model endpoint failed: {0}")]
    Request(String),

    /// The endpoint answered with a non-success status.
    #[error("HTTP error! status: {status}, details: {body}")]
    Status { status: u16, body: String },

    /// The response body stream broke mid-way.
    #[error("Response stream interrupted: {0}")]
    Stream(String),

    /// The model reported an error object inside the stream.
    #[error("Model reported an error: {0}")]
    Model(String),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn nothing_extracted_is_actionable() {
        let e = InvoiceError::NothingExtracted {
            pages: 2,
            first_error: "timeout".into(),
        };
        let msg = e.to_string();
        assert!(msg.contains("2 pages"), "got: {msg}");
        assert!(msg.contains("Try again"), "got: {msg}");
    }

    #[test]
    fn status_display() {
        let e = TransportError::Status {
            status: 503,
            body: "overloaded".into(),
        };
        assert!(e.to_string().contains("503"));
        assert!(e.to_string().contains("overloaded"));
    }

    #[test]
    fn exhausted_display() {
        let e = PageError::Exhausted {
            page: 3,
            attempts: 3,
            detail: "No text was extracted from the image".into(),
        };
        let msg = e.to_string();
        assert!(msg.contains("Page 3"));
        assert!(msg.contains("3 attempts"));
    }

    #[test]
    fn transport_converts_into_page_error() {
        let e: PageError = TransportError::Request("refused".into()).into();
        assert!(e.to_string().contains("refused"));
    }

    #[test]
    fn page_failed_keeps_source() {
        use std::error::Error as _;
        let e = InvoiceError::PageFailed {
            page: 1,
            source: PageError::MalformedResponse,
        };
        assert!(e.source().is_some());
    }
}
