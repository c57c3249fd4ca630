//! Session history of completed extractions.
//!
//! Entries live in memory for as long as the owning application keeps the
//! [`SessionHistory`] around; nothing is persisted. Entries are snapshots
//! and never change after they are recorded.

use crate::record::ExtractedRecord;
use chrono::{Local, Utc};
use serde::Serialize;

/// One completed extraction.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct HistoryEntry {
    /// Creation time in epoch milliseconds, unique within its history.
    pub id: u64,
    pub record: ExtractedRecord,
    /// Local creation time, formatted for display.
    pub timestamp: String,
    /// Page image references (file paths or page labels), in page order.
    pub page_refs: Vec<String>,
    pub filename: String,
    pub page_count: usize,
}

/// Completed extractions, newest first, with one of them selected.
#[derive(Debug, Default)]
pub struct SessionHistory {
    entries: Vec<HistoryEntry>,
    current: Option<u64>,
    last_id: u64,
}

impl SessionHistory {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a completed extraction. It goes to the front and becomes the
    /// current entry.
    pub fn record(
        &mut self,
        record: ExtractedRecord,
        filename: impl Into<String>,
        page_refs: Vec<String>,
    ) -> &HistoryEntry {
        let now_ms = u64::try_from(Utc::now().timestamp_millis()).unwrap_or(0);
        // Two extractions within the same millisecond still get distinct ids.
        let id = now_ms.max(self.last_id + 1);
        self.last_id = id;

        let entry = HistoryEntry {
            id,
            record,
            timestamp: Local::now().format("%-m/%-d/%Y, %-I:%M:%S %p").to_string(),
            page_count: page_refs.len(),
            page_refs,
            filename: filename.into(),
        };
        self.entries.insert(0, entry);
        self.current = Some(id);
        &self.entries[0]
    }

    /// All entries, newest first.
    pub fn entries(&self) -> &[HistoryEntry] {
        &self.entries
    }

    pub fn get(&self, id: u64) -> Option<&HistoryEntry> {
        self.entries.iter().find(|e| e.id == id)
    }

    /// Make entry `id` current. Returns `None` (and changes nothing) when
    /// there is no such entry.
    pub fn select(&mut self, id: u64) -> Option<&HistoryEntry> {
        let pos = self.entries.iter().position(|e| e.id == id)?;
        self.current = Some(id);
        Some(&self.entries[pos])
    }

    /// The selected entry; after [`Self::record`] that is the newest one.
    pub fn current(&self) -> Option<&HistoryEntry> {
        self.current.and_then(|id| self.get(id))
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn clear(&mut self) {
        self.entries.clear();
        self.current = None;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::schema::FieldKey;

    fn record(number: &str) -> ExtractedRecord {
        let mut r = ExtractedRecord::new();
        r.set(FieldKey::InvoiceNumber, Some(number.into()));
        r
    }

    #[test]
    fn newest_first_and_current() {
        let mut h = SessionHistory::new();
        assert!(h.current().is_none());

        let first = h.record(record("A"), "a.png", vec!["a.png".into()]).id;
        let second = h
            .record(record("B"), "b.pdf", vec!["page1".into(), "page2".into()])
            .id;

        assert_eq!(h.len(), 2);
        assert_eq!(h.entries()[0].id, second);
        assert_eq!(h.entries()[1].id, first);
        assert_eq!(h.current().unwrap().filename, "b.pdf");
        assert_eq!(h.current().unwrap().page_count, 2);
    }

    #[test]
    fn ids_strictly_increase() {
        let mut h = SessionHistory::new();
        let ids: Vec<u64> = (0..5)
            .map(|i| h.record(record(&i.to_string()), "x", vec![]).id)
            .collect();
        assert!(ids.windows(2).all(|w| w[1] > w[0]), "{ids:?}");
    }

    #[test]
    fn select_switches_current() {
        let mut h = SessionHistory::new();
        let first = h.record(record("A"), "a", vec![]).id;
        h.record(record("B"), "b", vec![]);

        let selected = h.select(first).unwrap();
        assert_eq!(selected.record.get(FieldKey::InvoiceNumber), Some("A"));
        assert_eq!(h.current().unwrap().id, first);
        // Selecting does not reorder.
        assert_ne!(h.entries()[0].id, first);
    }

    #[test]
    fn select_unknown_keeps_current() {
        let mut h = SessionHistory::new();
        let id = h.record(record("A"), "a", vec![]).id;
        assert!(h.select(id + 1_000).is_none());
        assert_eq!(h.current().unwrap().id, id);
    }

    #[test]
    fn clear_empties() {
        let mut h = SessionHistory::new();
        h.record(record("A"), "a", vec![]);
        h.clear();
        assert!(h.is_empty());
        assert!(h.current().is_none());
        assert!(h.get(0).is_none());
    }
}
