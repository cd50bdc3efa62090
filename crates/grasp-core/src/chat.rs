use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::errors::DispatchError;
use crate::ids::MeetingId;

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ChatEntryKind {
    /// A node decided to speak up.
    AiIntervention,
    /// A config could not be applied to the meeting.
    ApplyError,
}

impl std::fmt::Display for ChatEntryKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::AiIntervention => write!(f, "ai_intervention"),
            Self::ApplyError => write!(f, "apply_error"),
        }
    }
}

impl std::str::FromStr for ChatEntryKind {
    type Err = String;
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "ai_intervention" => Ok(Self::AiIntervention),
            "apply_error" => Ok(Self::ApplyError),
            other => Err(format!("unknown chat entry kind: {other}")),
        }
    }
}

/// A chat-visible entry, as consumed by the meeting UI.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChatEntry {
    #[serde(rename = "type")]
    pub kind: ChatEntryKind,
    pub message: String,
    pub timestamp: DateTime<Utc>,
    #[serde(default, rename = "nodeId", skip_serializing_if = "Option::is_none")]
    pub node_id: Option<String>,
}

impl ChatEntry {
    pub fn intervention(node_id: &str, message: impl Into<String>) -> Self {
        Self {
            kind: ChatEntryKind::AiIntervention,
            message: message.into(),
            timestamp: Utc::now(),
            node_id: Some(node_id.to_string()),
        }
    }

    pub fn apply_error(message: impl Into<String>) -> Self {
        Self {
            kind: ChatEntryKind::ApplyError,
            message: message.into(),
            timestamp: Utc::now(),
            node_id: None,
        }
    }
}

/// Destination for chat-visible entries.
#[async_trait]
pub trait ChatSink: Send + Sync {
    async fn post(&self, meeting_id: &MeetingId, entry: ChatEntry) -> Result<(), DispatchError>;
}
