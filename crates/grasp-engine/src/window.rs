//! Rolling, timestamp-ordered transcript store for one meeting.
//!
//! One writer (ingestion) and many readers (node firings). The writer works
//! on its own copy and then publishes an immutable snapshot. Readers only
//! clone the published `Arc`, so they never wait on an append in progress and
//! never see a partially written entry.

use std::collections::VecDeque;
use std::sync::Arc;
use std::time::Duration;

use parking_lot::{Mutex, RwLock};

use grasp_core::transcript::TranscriptEntry;

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum WindowSelector {
    /// The `n` most recent entries.
    LastN(usize),
    /// Entries with `timestamp >= now_ms - window`.
    Trailing { window: Duration, now_ms: i64 },
}

type Snapshot = Arc<[Arc<TranscriptEntry>]>;

pub struct ContextWindow {
    pending: Mutex<VecDeque<Arc<TranscriptEntry>>>,
    published: RwLock<Snapshot>,
    capacity: usize,
}

impl ContextWindow {
    pub fn new(capacity: usize) -> Self {
        Self {
            pending: Mutex::new(VecDeque::new()),
            published: RwLock::new(Arc::from(Vec::new())),
            capacity: capacity.max(1),
        }
    }

    fn snapshot(&self) -> Snapshot {
        Arc::clone(&self.published.read())
    }

    /// Add an entry, evicting the oldest once over capacity. An entry older
    /// than the current tail is placed after any entries with the same or
    /// earlier timestamp.
    pub fn append(&self, entry: TranscriptEntry) -> Arc<TranscriptEntry> {
        let entry = Arc::new(entry);
        let mut entries = self.pending.lock();
        match entries.back() {
            Some(last) if last.timestamp > entry.timestamp => {
                let at = entries.partition_point(|e| e.timestamp <= entry.timestamp);
                entries.insert(at, Arc::clone(&entry));
            }
            _ => entries.push_back(Arc::clone(&entry)),
        }
        while entries.len() > self.capacity {
            entries.pop_front();
        }
        let snapshot: Snapshot = entries.iter().cloned().collect();
        // The replaced snapshot is freed outside the publish lock.
        let _previous = std::mem::replace(&mut *self.published.write(), snapshot);
        entry
    }

    /// Snapshot of the selected entries, oldest first.
    pub fn query(&self, selector: WindowSelector) -> Vec<Arc<TranscriptEntry>> {
        let entries = self.snapshot();
        let start = match selector {
            WindowSelector::LastN(n) => entries.len().saturating_sub(n),
            WindowSelector::Trailing { window, now_ms } => {
                let window_ms = i64::try_from(window.as_millis()).unwrap_or(i64::MAX);
                let lower = now_ms.saturating_sub(window_ms);
                entries.partition_point(|e| e.timestamp < lower)
            }
        };
        entries[start..].to_vec()
    }

    pub fn len(&self) -> usize {
        self.published.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.published.read().is_empty()
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }
}
