//! Journal - append-only record of phase transitions
//!
//! Entries accumulate across runs; once the journal grows past
//! `compact_after` the oldest tail is folded into a single synthetic INIT
//! summary entry so the on-disk journal never exceeds `journal_max` entries.

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::context::Phase;

/// One journal entry
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct JournalEntry {
    /// RFC 3339 timestamp
    pub ts: String,

    /// Task this entry belongs to
    pub task_id: String,

    /// Phase that produced the entry
    pub phase: Phase,

    /// Human-readable description
    pub desc: String,

    /// Optional structured metadata
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub meta: Option<Value>,
}

impl JournalEntry {
    /// Create an entry stamped with the current time
    pub fn new(task_id: impl Into<String>, phase: Phase, desc: impl Into<String>) -> Self {
        Self {
            ts: chrono::Utc::now().to_rfc3339(),
            task_id: task_id.into(),
            phase,
            desc: desc.into(),
            meta: None,
        }
    }

    /// Attach metadata
    pub fn with_meta(mut self, meta: Value) -> Self {
        self.meta = Some(meta);
        self
    }
}

/// The journal - an ordered list of entries
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Journal {
    pub entries: Vec<JournalEntry>,
}

impl Journal {
    /// Append an entry
    pub fn push(&mut self, entry: JournalEntry) {
        self.entries.push(entry);
    }

    /// Number of entries
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Whether the journal is empty
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Compact the journal if it has outgrown `compact_after`.
    ///
    /// Keeps the `journal_max - 1` most recent entries and replaces everything
    /// older with one synthetic INIT entry summarizing what was dropped, so
    /// the post-compaction length is at most `journal_max`. Returns the number
    /// of entries folded away, or `None` if no compaction was needed.
    pub fn compact(&mut self, journal_max: usize, compact_after: usize) -> Option<usize> {
        if self.entries.len() <= compact_after {
            return None;
        }

        let keep = journal_max.saturating_sub(1);
        if self.entries.len() <= keep {
            return None;
        }

        let cut = self.entries.len() - keep;
        let old: Vec<JournalEntry> = self.entries.drain(..cut).collect();
        let summary = summarize(&old);

        let task_id = old.first().map(|e| e.task_id.clone()).unwrap_or_else(|| "unknown".to_string());

        let entry = JournalEntry::new(task_id, Phase::Init, format!("Compacted {} entries: {}", old.len(), summary))
            .with_meta(serde_json::json!({ "compacted": true, "entry_count": old.len() }));

        self.entries.insert(0, entry);
        Some(old.len())
    }
}

/// Summarize dropped entries (first few phase/desc pairs)
fn summarize(entries: &[JournalEntry]) -> String {
    let phases: Vec<String> = entries.iter().take(10).map(|e| format!("{}: {}", e.phase, e.desc)).collect();
    format!("{}...", phases.join(", "))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn entry(n: usize) -> JournalEntry {
        JournalEntry::new("task-1", Phase::Read, format!("entry {}", n))
    }

    #[test]
    fn test_no_compaction_under_threshold() {
        let mut journal = Journal::default();
        for n in 0..5 {
            journal.push(entry(n));
        }

        assert!(journal.compact(10, 5).is_none());
        assert_eq!(journal.len(), 5);
    }

    #[test]
    fn test_compaction_caps_length_at_journal_max() {
        let mut journal = Journal::default();
        for n in 0..20 {
            journal.push(entry(n));
        }

        let dropped = journal.compact(10, 5).unwrap();
        assert_eq!(dropped, 11);
        assert_eq!(journal.len(), 10);

        // First entry is the synthetic summary
        let first = &journal.entries[0];
        assert_eq!(first.phase, Phase::Init);
        assert!(first.desc.starts_with("Compacted 11 entries"));
        assert!(first.meta.is_some());

        // Most recent entries survive in order
        assert_eq!(journal.entries.last().unwrap().desc, "entry 19");
    }

    #[test]
    fn test_no_compaction_under_compact_after() {
        let mut journal = Journal::default();
        for n in 0..10 {
            journal.push(entry(n));
        }

        // 10 entries with compact_after = 15: nothing to do
        assert!(journal.compact(10, 15).is_none());
        assert_eq!(journal.len(), 10);
    }

    #[test]
    fn test_entry_roundtrip() {
        let e = JournalEntry::new("t", Phase::Write, "applied").with_meta(serde_json::json!({"edits": 2}));
        let json = serde_json::to_string(&e).unwrap();
        assert!(json.contains("\"WRITE\""));

        let back: JournalEntry = serde_json::from_str(&json).unwrap();
        assert_eq!(back.phase, Phase::Write);
        assert_eq!(back.desc, "applied");
    }
}
