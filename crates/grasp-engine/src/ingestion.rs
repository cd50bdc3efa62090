//! Transcript ingestion: drop partials, dedup redundant observers, append.
//!
//! Several capture sources may observe the same speech. An event is a
//! duplicate when its upstream result id was already seen for the meeting,
//! or when the same normalized text already landed in the same 2-second
//! bucket (`timestamp.div_euclid(2000)`).

use std::collections::{HashSet, VecDeque};
use std::hash::Hash;
use std::sync::Arc;

use sha2::{Digest, Sha256};
use tracing::{debug, warn};

use grasp_core::errors::IngestionError;
use grasp_core::transcript::{TranscriptEntry, TranscriptEvent};

use crate::context::ContextRegistry;

pub const DEDUP_BUCKET_MS: i64 = 2_000;

pub fn time_bucket(timestamp_ms: i64) -> i64 {
    timestamp_ms.div_euclid(DEDUP_BUCKET_MS)
}

/// SHA-256 of the text after trimming, collapsing whitespace and lowercasing.
pub fn content_hash(text: &str) -> String {
    let normalized = text
        .split_whitespace()
        .collect::<Vec<_>>()
        .join(" ")
        .to_lowercase();
    let digest = Sha256::digest(normalized.as_bytes());
    format!("{digest:x}")[..32].to_string()
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub enum IngestOutcome {
    Appended { dedup_key: String },
    DroppedPartial,
    Duplicate { dedup_key: String },
}

/// Keys remembered in arrival order; the oldest is forgotten past `capacity`.
struct RecentKeys<K> {
    keys: HashSet<K>,
    order: VecDeque<K>,
    capacity: usize,
}

impl<K: Clone + Eq + Hash> RecentKeys<K> {
    fn new(capacity: usize) -> Self {
        Self {
            keys: HashSet::new(),
            order: VecDeque::new(),
            capacity: capacity.max(1),
        }
    }

    fn contains(&self, key: &K) -> bool {
        self.keys.contains(key)
    }

    fn insert(&mut self, key: K) {
        if self.keys.insert(key.clone()) {
            self.order.push_back(key);
        }
        while self.order.len() > self.capacity {
            if let Some(evicted) = self.order.pop_front() {
                self.keys.remove(&evicted);
            }
        }
    }
}

/// Per-meeting memory of what has been accepted.
///
/// Both result ids and content keys are forgotten by arrival order, so a
/// source that reports speech late still merges with what an earlier source
/// delivered, however far the meeting's timestamps have moved since.
pub struct DedupIndex {
    result_ids: RecentKeys<String>,
    content: RecentKeys<(i64, String)>,
}

impl DedupIndex {
    pub fn new(capacity: usize) -> Self {
        Self {
            result_ids: RecentKeys::new(capacity),
            content: RecentKeys::new(capacity),
        }
    }

    fn seen_result(&self, result_id: &str) -> bool {
        self.result_ids.contains(&result_id.to_string())
    }

    fn seen_content(&self, bucket: i64, hash: &str) -> bool {
        self.content.contains(&(bucket, hash.to_string()))
    }

    fn record(&mut self, result_id: Option<&str>, bucket: i64, hash: String) {
        if let Some(id) = result_id {
            self.result_ids.insert(id.to_string());
        }
        self.content.insert((bucket, hash));
    }
}

/// Single entry point for utterance events from every capture source.
pub struct TranscriptIngestion {
    contexts: Arc<ContextRegistry>,
}

impl TranscriptIngestion {
    pub fn new(contexts: Arc<ContextRegistry>) -> Self {
        Self { contexts }
    }

    pub fn accept(&self, event: TranscriptEvent) -> Result<IngestOutcome, IngestionError> {
        if let Err(e) = event.check() {
            warn!(meeting_id = %event.meeting_id, error = %e, "dropping malformed transcript event");
            return Err(e);
        }
        if !event.is_final {
            return Ok(IngestOutcome::DroppedPartial);
        }

        let ctx = self.contexts.get_or_create(&event.meeting_id);
        let mut index = ctx.ingest.lock();

        let bucket = time_bucket(event.timestamp);
        let hash = content_hash(&event.text);
        let dedup_key = match &event.result_id {
            Some(id) => format!("rid:{id}"),
            None => format!("txt:{hash}:{bucket}"),
        };

        let duplicate = event
            .result_id
            .as_deref()
            .is_some_and(|id| index.seen_result(id))
            || index.seen_content(bucket, &hash);
        if duplicate {
            debug!(meeting_id = %event.meeting_id, dedup_key, "duplicate utterance dropped");
            return Ok(IngestOutcome::Duplicate { dedup_key });
        }

        index.record(event.result_id.as_deref(), bucket, hash);
        ctx.window.append(TranscriptEntry {
            speaker_id: event.speaker_id,
            speaker_name: event.speaker_name,
            text: event.text,
            timestamp: event.timestamp,
            dedup_key: dedup_key.clone(),
        });
        Ok(IngestOutcome::Appended { dedup_key })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::window::WindowSelector;
    use grasp_core::ids::MeetingId;

    fn setup() -> (Arc<ContextRegistry>, TranscriptIngestion) {
        let contexts = Arc::new(ContextRegistry::new(1_000, 4));
        let ingestion = TranscriptIngestion::new(Arc::clone(&contexts));
        (contexts, ingestion)
    }

    fn event(meeting: &str, text: &str, timestamp: i64, result_id: Option<&str>) -> TranscriptEvent {
        TranscriptEvent {
            meeting_id: MeetingId::from_raw(meeting),
            speaker_id: "spk".into(),
            speaker_name: None,
            text: text.into(),
            is_final: true,
            timestamp,
            result_id: result_id.map(str::to_string),
        }
    }

    fn window_len(contexts: &ContextRegistry, meeting: &str) -> usize {
        contexts
            .get(&MeetingId::from_raw(meeting))
            .map(|c| c.window.len())
            .unwrap_or(0)
    }

    #[test]
    fn partial_events_never_reach_the_window() {
        let (contexts, ingestion) = setup();
        let mut e = event("m", "half a sent", 1_000, None);
        e.is_final = false;
        assert_eq!(ingestion.accept(e).unwrap(), IngestOutcome::DroppedPartial);
        assert_eq!(window_len(&contexts, "m"), 0);
    }

    #[test]
    fn malformed_events_are_rejected() {
        let (_, ingestion) = setup();
        let err = ingestion.accept(event("m", "   ", 1_000, None)).unwrap_err();
        assert_eq!(err, IngestionError::MissingField("text"));
    }

    #[test]
    fn same_result_id_yields_one_entry() {
        let (contexts, ingestion) = setup();
        ingestion.accept(event("m", "we ship friday", 1_000, Some("r1"))).unwrap();
        let second = ingestion
            .accept(event("m", "we ship Friday.", 9_000, Some("r1")))
            .unwrap();
        assert_eq!(second, IngestOutcome::Duplicate { dedup_key: "rid:r1".into() });
        assert_eq!(window_len(&contexts, "m"), 1);
    }

    #[test]
    fn result_ids_are_scoped_per_meeting() {
        let (contexts, ingestion) = setup();
        ingestion.accept(event("a", "hello", 1_000, Some("r1"))).unwrap();
        ingestion.accept(event("b", "hello", 1_000, Some("r1"))).unwrap();
        assert_eq!(window_len(&contexts, "a"), 1);
        assert_eq!(window_len(&contexts, "b"), 1);
    }

    #[test]
    fn same_text_within_bucket_yields_one_entry() {
        let (contexts, ingestion) = setup();
        ingestion.accept(event("m", "Let's take this offline", 10_000, Some("bot-a-1"))).unwrap();
        let second = ingestion
            .accept(event("m", "let's  take this offline", 11_500, Some("bot-b-7")))
            .unwrap();
        assert!(matches!(second, IngestOutcome::Duplicate { .. }));
        assert_eq!(window_len(&contexts, "m"), 1);
    }

    #[test]
    fn same_text_without_ids_within_bucket_yields_one_entry() {
        let (contexts, ingestion) = setup();
        ingestion.accept(event("m", "agreed", 4_100, None)).unwrap();
        ingestion.accept(event("m", "agreed", 5_900, None)).unwrap();
        assert_eq!(window_len(&contexts, "m"), 1);
    }

    #[test]
    fn same_text_three_seconds_apart_yields_two_entries() {
        let (contexts, ingestion) = setup();
        ingestion.accept(event("m", "agreed", 10_000, Some("r1"))).unwrap();
        ingestion.accept(event("m", "agreed", 13_000, Some("r2"))).unwrap();
        ingestion.accept(event("m", "agreed", 20_000, None)).unwrap();
        ingestion.accept(event("m", "agreed", 23_500, None)).unwrap();
        assert_eq!(window_len(&contexts, "m"), 4);
    }

    #[test]
    fn bucket_boundary_is_floor_inclusive() {
        assert_eq!(time_bucket(11_999), 5);
        assert_eq!(time_bucket(12_000), 6);
        assert_eq!(time_bucket(0), 0);

        let (contexts, ingestion) = setup();
        ingestion.accept(event("m", "yes", 11_999, None)).unwrap();
        ingestion.accept(event("m", "yes", 12_000, None)).unwrap();
        assert_eq!(window_len(&contexts, "m"), 2);
    }

    #[test]
    fn different_text_in_same_bucket_is_kept() {
        let (contexts, ingestion) = setup();
        ingestion.accept(event("m", "yes", 1_000, None)).unwrap();
        ingestion.accept(event("m", "no", 1_100, None)).unwrap();
        assert_eq!(window_len(&contexts, "m"), 2);
    }

    #[test]
    fn accepted_entries_carry_dedup_key_and_speaker() {
        let (contexts, ingestion) = setup();
        let mut e = event("m", "hello", 2_500, None);
        e.speaker_name = Some("Ana".into());
        let outcome = ingestion.accept(e).unwrap();
        let IngestOutcome::Appended { dedup_key } = outcome else {
            panic!("expected append, got {outcome:?}");
        };
        assert!(dedup_key.starts_with("txt:"));
        assert!(dedup_key.ends_with(":1"));

        let ctx = contexts.get(&MeetingId::from_raw("m")).unwrap();
        let entries = ctx.window.query(WindowSelector::LastN(1));
        assert_eq!(entries[0].dedup_key, dedup_key);
        assert_eq!(entries[0].line(), "Ana: hello");
    }

    #[test]
    fn result_id_memory_is_bounded() {
        let (contexts, ingestion) = setup();
        for i in 0..6 {
            ingestion
                .accept(event("m", &format!("line {i}"), i * 10_000, Some(&format!("r{i}"))))
                .unwrap();
        }
        // Capacity is 4: r0 has been forgotten, r5 has not.
        let replay_old = ingestion.accept(event("m", "replayed", 100_000, Some("r0"))).unwrap();
        assert!(matches!(replay_old, IngestOutcome::Appended { .. }));
        let replay_new = ingestion.accept(event("m", "replayed again", 200_000, Some("r5"))).unwrap();
        assert!(matches!(replay_new, IngestOutcome::Duplicate { .. }));
        assert_eq!(window_len(&contexts, "m"), 7);
    }

    #[test]
    fn late_observer_merges_after_later_speech() {
        let (contexts, ingestion) = setup();
        ingestion.accept(event("m", "we ship friday", 10_000, Some("bot-a-1"))).unwrap();
        ingestion.accept(event("m", "next topic", 16_500, Some("bot-a-2"))).unwrap();

        let late = ingestion
            .accept(event("m", "We ship Friday", 10_400, Some("bot-b-9")))
            .unwrap();
        assert_eq!(late, IngestOutcome::Duplicate { dedup_key: "rid:bot-b-9".into() });
        assert_eq!(window_len(&contexts, "m"), 2);
    }

    #[test]
    fn content_memory_is_bounded() {
        let (contexts, ingestion) = setup();
        ingestion.accept(event("m", "first", 1_000, None)).unwrap();
        for i in 0..4 {
            ingestion.accept(event("m", &format!("filler {i}"), 1_000, None)).unwrap();
        }
        // Capacity is 4: "first" has been forgotten.
        let replay = ingestion.accept(event("m", "first", 1_000, None)).unwrap();
        assert!(matches!(replay, IngestOutcome::Appended { .. }));
        assert_eq!(window_len(&contexts, "m"), 6);
    }

    #[test]
    fn content_hash_normalizes() {
        assert_eq!(content_hash("  Hello   World "), content_hash("hello world"));
        assert_ne!(content_hash("hello world"), content_hash("hello, world"));
        assert_eq!(content_hash("x").len(), 32);
    }

    #[test]
    fn meetings_ingest_in_parallel() {
        let (contexts, ingestion) = setup();
        let ingestion = Arc::new(ingestion);
        let handles: Vec<_> = (0..4)
            .map(|m| {
                let ingestion = Arc::clone(&ingestion);
                std::thread::spawn(move || {
                    for i in 0..250 {
                        ingestion
                            .accept(event(&format!("m{m}"), &format!("utterance {i}"), i * 100, None))
                            .unwrap();
                    }
                })
            })
            .collect();
        for h in handles {
            h.join().unwrap();
        }
        for m in 0..4 {
            assert_eq!(window_len(&contexts, &format!("m{m}")), 250);
        }
    }
}
