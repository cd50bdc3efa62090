use serde::{Deserialize, Serialize};

use crate::errors::IngestionError;
use crate::ids::MeetingId;

/// Utterance event as delivered by a capture source. May be partial.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TranscriptEvent {
    pub meeting_id: MeetingId,
    pub speaker_id: String,
    /// External identity, e.g. the participant's display name.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub speaker_name: Option<String>,
    pub text: String,
    #[serde(default)]
    pub is_final: bool,
    /// Milliseconds since the Unix epoch.
    pub timestamp: i64,
    /// Stable upstream result identifier, scoped to the meeting.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub result_id: Option<String>,
}

impl TranscriptEvent {
    pub fn check(&self) -> Result<(), IngestionError> {
        if self.meeting_id.as_str().trim().is_empty() {
            return Err(IngestionError::MissingField("meetingId"));
        }
        if self.speaker_id.trim().is_empty() {
            return Err(IngestionError::MissingField("speakerId"));
        }
        if self.text.trim().is_empty() {
            return Err(IngestionError::MissingField("text"));
        }
        if self.timestamp < 0 {
            return Err(IngestionError::NegativeTimestamp(self.timestamp));
        }
        Ok(())
    }
}

/// A finalized utterance held in a meeting's context window.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct TranscriptEntry {
    pub speaker_id: String,
    pub speaker_name: Option<String>,
    pub text: String,
    pub timestamp: i64,
    pub dedup_key: String,
}

impl TranscriptEntry {
    pub fn speaker(&self) -> &str {
        self.speaker_name.as_deref().unwrap_or(&self.speaker_id)
    }

    /// `speaker: text`, the form templates see.
    pub fn line(&self) -> String {
        format!("{}: {}", self.speaker(), self.text.trim())
    }
}
