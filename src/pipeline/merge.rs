//! Merging: fold per-page records into one document record.
//!
//! Invoices put different fields on different pages (header on page 1,
//! totals and bank details on the last). The merge starts from an all-absent
//! record and walks the pages in order; only present values are written, so
//! a page that lacks a field never erases what another page found.

use crate::config::MergePrecedence;
use crate::record::ExtractedRecord;
use crate::schema::FieldKey;

/// Fold page results in page order. `None` entries (failed pages) are
/// skipped.
///
/// With [`MergePrecedence::LastWins`] a later page overwrites an earlier
/// value; with [`MergePrecedence::FirstWins`] the first value sticks.
/// The free-text slots of contributing pages are joined in page order,
/// separated by a blank line.
pub fn merge_pages(pages: &[Option<ExtractedRecord>], precedence: MergePrecedence) -> ExtractedRecord {
    let mut merged = ExtractedRecord::new();
    let mut additional: Vec<&str> = Vec::new();
    let mut full_text: Vec<&str> = Vec::new();

    for page in pages.iter().flatten() {
        for key in FieldKey::ALL {
            let Some(value) = page.get(key) else {
                continue;
            };
            let keep_existing =
                precedence == MergePrecedence::FirstWins && merged.get(key).is_some();
            if !keep_existing {
                merged.set(key, Some(value.to_string()));
            }
        }
        additional.extend(page.additional_information.as_deref());
        full_text.extend(page.full_text.as_deref());
    }

    merged.additional_information = join_sections(&additional);
    merged.full_text = join_sections(&full_text);
    merged
}

fn join_sections(parts: &[&str]) -> Option<String> {
    (!parts.is_empty()).then(|| parts.join("\n\n"))
}
