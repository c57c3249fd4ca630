//! Result types returned by the extractor.

use crate::error::PageError;
use crate::record::ExtractedRecord;
use serde::{Deserialize, Serialize};

/// How one page went: attempts used, timing and the final error, if any.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PageOutcome {
    /// 1-indexed page number.
    pub page_num: usize,
    /// Page reference (file path or `pageN`).
    pub label: String,
    /// Attempts made, including the successful one.
    pub attempts: u32,
    /// Non-absent fields in the page's record; 0 for failed pages.
    pub fields_found: usize,
    pub duration_ms: u64,
    /// Set when the page failed after all attempts.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<PageError>,
}

impl PageOutcome {
    pub fn succeeded(&self) -> bool {
        self.error.is_none()
    }
}

/// A page's record together with its outcome.
#[derive(Debug, Clone, PartialEq)]
pub struct PageResult {
    pub outcome: PageOutcome,
    /// `None` when the page failed after all attempts.
    pub record: Option<ExtractedRecord>,
}

impl PageResult {
    /// The record, or the page's final error.
    pub fn into_result(self) -> Result<ExtractedRecord, PageError> {
        match (self.record, self.outcome.error) {
            (Some(record), None) => Ok(record),
            (_, Some(err)) => Err(err),
            (None, None) => Err(PageError::NothingExtracted),
        }
    }
}

/// Aggregate numbers for one document.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ExtractionStats {
    pub total_pages: usize,
    pub processed_pages: usize,
    pub failed_pages: usize,
    /// Attempts across all pages, retries included.
    pub total_attempts: u64,
    /// Non-absent fields in the merged record.
    pub fields_found: usize,
    pub total_duration_ms: u64,
}

/// Everything one extraction produced.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ExtractionOutput {
    /// Source name (file name or caller-supplied label).
    pub filename: String,
    /// The merged record.
    pub record: ExtractedRecord,
    /// Per-page records in page order; `None` for failed pages.
    pub page_records: Vec<Option<ExtractedRecord>>,
    /// Per-page outcomes in page order.
    pub pages: Vec<PageOutcome>,
    pub stats: ExtractionStats,
}

impl ExtractionOutput {
    /// References of every page, in order, for the session history.
    pub fn page_refs(&self) -> Vec<String> {
        self.pages.iter().map(|p| p.label.clone()).collect()
    }
}
