use async_trait::async_trait;
use tracing::instrument;

use grasp_core::chat::{ChatEntry, ChatSink};
use grasp_core::errors::DispatchError;
use grasp_core::ids::MeetingId;

use crate::database::Database;
use crate::error::StoreError;
use crate::row_helpers::{self, format_time};

/// Persistent per-meeting chat log, polled by the meeting UI.
#[derive(Clone)]
pub struct ChatRepo {
    db: Database,
}

impl ChatRepo {
    pub fn new(db: Database) -> Self {
        Self { db }
    }

    #[instrument(skip(self, entry), fields(meeting_id = %meeting_id, kind = %entry.kind))]
    pub fn append(&self, meeting_id: &MeetingId, entry: &ChatEntry) -> Result<i64, StoreError> {
        self.db.with_conn(|conn| {
            conn.execute(
                "INSERT INTO chat_entries (meeting_id, kind, message, node_id, timestamp)
                 VALUES (?1, ?2, ?3, ?4, ?5)",
                rusqlite::params![
                    meeting_id.as_str(),
                    entry.kind.to_string(),
                    entry.message,
                    entry.node_id,
                    format_time(&entry.timestamp),
                ],
            )?;
            Ok(conn.last_insert_rowid())
        })
    }

    /// Entries for a meeting in posting order, optionally only those after `after_id`.
    #[instrument(skip(self), fields(meeting_id = %meeting_id))]
    pub fn list(
        &self,
        meeting_id: &MeetingId,
        after_id: Option<i64>,
    ) -> Result<Vec<(i64, ChatEntry)>, StoreError> {
        self.db.with_conn(|conn| {
            let mut stmt = conn.prepare(
                "SELECT id, kind, message, node_id, timestamp FROM chat_entries
                 WHERE meeting_id = ?1 AND id > ?2 ORDER BY id ASC",
            )?;
            let mut rows = stmt.query(rusqlite::params![meeting_id.as_str(), after_id.unwrap_or(0)])?;
            let mut results = Vec::new();
            while let Some(row) = rows.next()? {
                let id: i64 = row_helpers::get(row, 0, "chat_entries", "id")?;
                let kind: String = row_helpers::get(row, 1, "chat_entries", "kind")?;
                let timestamp: String = row_helpers::get(row, 4, "chat_entries", "timestamp")?;
                results.push((
                    id,
                    ChatEntry {
                        kind: row_helpers::parse_enum(&kind, "chat_entries", "kind")?,
                        message: row_helpers::get(row, 2, "chat_entries", "message")?,
                        node_id: row_helpers::get(row, 3, "chat_entries", "node_id")?,
                        timestamp: row_helpers::parse_time(&timestamp, "chat_entries", "timestamp")?,
                    },
                ));
            }
            Ok(results)
        })
    }
}

#[async_trait]
impl ChatSink for ChatRepo {
    async fn post(&self, meeting_id: &MeetingId, entry: ChatEntry) -> Result<(), DispatchError> {
        self.append(meeting_id, &entry)
            .map(|_| ())
            .map_err(|e| DispatchError(e.to_string()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use grasp_core::chat::ChatEntryKind;

    fn repo() -> ChatRepo {
        ChatRepo::new(Database::in_memory().unwrap())
    }

    #[tokio::test]
    async fn post_then_list() {
        let repo = repo();
        let meeting = MeetingId::from_raw("m1");
        repo.post(&meeting, ChatEntry::intervention("coach", "Recap please"))
            .await
            .unwrap();
        repo.post(&meeting, ChatEntry::apply_error("cfg failed to apply: x"))
            .await
            .unwrap();

        let entries = repo.list(&meeting, None).unwrap();
        assert_eq!(entries.len(), 2);
        assert_eq!(entries[0].1.kind, ChatEntryKind::AiIntervention);
        assert_eq!(entries[0].1.node_id.as_deref(), Some("coach"));
        assert_eq!(entries[1].1.kind, ChatEntryKind::ApplyError);
        assert_eq!(entries[1].1.node_id, None);
    }

    #[test]
    fn list_is_scoped_per_meeting() {
        let repo = repo();
        repo.append(&MeetingId::from_raw("a"), &ChatEntry::intervention("n", "one"))
            .unwrap();
        repo.append(&MeetingId::from_raw("b"), &ChatEntry::intervention("n", "two"))
            .unwrap();
        let entries = repo.list(&MeetingId::from_raw("b"), None).unwrap();
        assert_eq!(entries.len(), 1);
        assert_eq!(entries[0].1.message, "two");
    }

    #[test]
    fn list_after_cursor() {
        let repo = repo();
        let meeting = MeetingId::from_raw("m");
        let first = repo.append(&meeting, &ChatEntry::intervention("n", "one")).unwrap();
        repo.append(&meeting, &ChatEntry::intervention("n", "two")).unwrap();
        let entries = repo.list(&meeting, Some(first)).unwrap();
        assert_eq!(entries.len(), 1);
        assert_eq!(entries[0].1.message, "two");
    }
}
