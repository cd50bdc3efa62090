use std::sync::Arc;

use chrono::{DateTime, Utc};
use dashmap::DashMap;
use parking_lot::RwLock;
use serde::Serialize;

#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct NoteEntry {
    pub text: String,
    pub node_id: String,
    pub timestamp: DateTime<Utc>,
}

/// Tagged notes for one meeting. Visible to templates only, never to users.
///
/// Appends to the same tag are serialized so producing order is kept;
/// different tags never contend.
#[derive(Default)]
pub struct NotesStore {
    channels: DashMap<String, Arc<RwLock<Vec<NoteEntry>>>>,
}

impl NotesStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn append(&self, tag: &str, text: &str, node_id: &str) {
        let channel = self
            .channels
            .entry(tag.to_string())
            .or_default()
            .clone();
        channel.write().push(NoteEntry {
            text: text.to_string(),
            node_id: node_id.to_string(),
            timestamp: Utc::now(),
        });
    }

    /// All notes under `tag`, newline-joined in producing order. Empty if none.
    pub fn read(&self, tag: &str) -> String {
        self.entries(tag)
            .iter()
            .map(|n| n.text.as_str())
            .collect::<Vec<_>>()
            .join("\n")
    }

    pub fn entries(&self, tag: &str) -> Vec<NoteEntry> {
        let Some(channel) = self.channels.get(tag).map(|c| Arc::clone(c.value())) else {
            return Vec::new();
        };
        let notes = channel.read();
        notes.clone()
    }

    pub fn tags(&self) -> Vec<String> {
        let mut tags: Vec<String> = self.channels.iter().map(|c| c.key().clone()).collect();
        tags.sort();
        tags
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn read_unknown_tag_is_empty() {
        let notes = NotesStore::new();
        assert_eq!(notes.read("summary"), "");
        assert!(notes.entries("summary").is_empty());
    }

    #[test]
    fn read_joins_in_producing_order() {
        let notes = NotesStore::new();
        notes.append("summary", "kickoff", "a");
        notes.append("summary", "budget agreed", "b");
        notes.append("risks", "vendor delay", "a");
        assert_eq!(notes.read("summary"), "kickoff\nbudget agreed");
        assert_eq!(notes.read("risks"), "vendor delay");

        let entries = notes.entries("summary");
        assert_eq!(entries[1].node_id, "b");
        assert_eq!(notes.tags(), vec!["risks".to_string(), "summary".to_string()]);
    }

    #[test]
    fn concurrent_writers_keep_per_writer_order() {
        let notes = Arc::new(NotesStore::new());
        let writers: Vec<_> = ["a", "b", "c"]
            .into_iter()
            .map(|node| {
                let notes = Arc::clone(&notes);
                std::thread::spawn(move || {
                    for i in 0..100 {
                        notes.append("shared", &format!("{node}{i}"), node);
                    }
                })
            })
            .collect();
        for w in writers {
            w.join().unwrap();
        }

        let entries = notes.entries("shared");
        assert_eq!(entries.len(), 300);
        for node in ["a", "b", "c"] {
            let seq: Vec<_> = entries
                .iter()
                .filter(|e| e.node_id == node)
                .map(|e| e.text.clone())
                .collect();
            let expected: Vec<_> = (0..100).map(|i| format!("{node}{i}")).collect();
            assert_eq!(seq, expected);
        }
    }
}
