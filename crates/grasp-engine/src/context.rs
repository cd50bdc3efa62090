use std::sync::Arc;

use dashmap::DashMap;
use parking_lot::Mutex;

use grasp_core::ids::MeetingId;

use crate::ingestion::DedupIndex;
use crate::notes::NotesStore;
use crate::window::ContextWindow;

/// Everything templates can read for one meeting.
pub struct MeetingContext {
    pub meeting_id: MeetingId,
    pub window: ContextWindow,
    pub notes: NotesStore,
    /// Held across dedup and append so a meeting's events apply in arrival order.
    pub(crate) ingest: Mutex<DedupIndex>,
}

impl MeetingContext {
    pub fn new(meeting_id: MeetingId, window_capacity: usize, dedup_id_capacity: usize) -> Self {
        Self {
            meeting_id,
            window: ContextWindow::new(window_capacity),
            notes: NotesStore::new(),
            ingest: Mutex::new(DedupIndex::new(dedup_id_capacity)),
        }
    }
}

/// Live meeting contexts, created on first use.
pub struct ContextRegistry {
    contexts: DashMap<MeetingId, Arc<MeetingContext>>,
    window_capacity: usize,
    dedup_id_capacity: usize,
}

impl ContextRegistry {
    pub fn new(window_capacity: usize, dedup_id_capacity: usize) -> Self {
        Self {
            contexts: DashMap::new(),
            window_capacity,
            dedup_id_capacity,
        }
    }

    pub fn get_or_create(&self, meeting_id: &MeetingId) -> Arc<MeetingContext> {
        if let Some(ctx) = self.contexts.get(meeting_id) {
            return Arc::clone(ctx.value());
        }
        self.contexts
            .entry(meeting_id.clone())
            .or_insert_with(|| {
                Arc::new(MeetingContext::new(
                    meeting_id.clone(),
                    self.window_capacity,
                    self.dedup_id_capacity,
                ))
            })
            .clone()
    }

    pub fn get(&self, meeting_id: &MeetingId) -> Option<Arc<MeetingContext>> {
        self.contexts.get(meeting_id).map(|c| Arc::clone(c.value()))
    }

    pub fn remove(&self, meeting_id: &MeetingId) -> Option<Arc<MeetingContext>> {
        self.contexts.remove(meeting_id).map(|(_, ctx)| ctx)
    }

    pub fn len(&self) -> usize {
        self.contexts.len()
    }

    pub fn is_empty(&self) -> bool {
        self.contexts.is_empty()
    }
}
