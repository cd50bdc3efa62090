use std::sync::Arc;

use chrono::{DateTime, Utc};
use dashmap::DashMap;
use serde::Serialize;
use tokio::sync::RwLock;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

use grasp_core::ids::{BindingId, ConfigId, MeetingId};

/// What is currently applied to a meeting.
#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct BindingInfo {
    pub binding_id: BindingId,
    pub config_id: ConfigId,
    pub config_name: String,
    pub node_ids: Vec<String>,
    pub bound_at: DateTime<Utc>,
}

/// A live binding: its node timers and the token that stops them.
pub(crate) struct ActiveBinding {
    pub info: BindingInfo,
    pub cancel: CancellationToken,
    pub commit: Arc<RwLock<()>>,
    pub tasks: Vec<JoinHandle<()>>,
}

impl ActiveBinding {
    /// Cancel every node timer and wait out any commit already past its
    /// binding check. In-flight cycles finish and discard their output.
    pub async fn stop(self) -> Vec<JoinHandle<()>> {
        self.cancel.cancel();
        drop(self.commit.write().await);
        self.tasks
    }
}

/// At most one live binding per meeting.
#[derive(Clone, Default)]
pub(crate) struct BindingTable {
    bindings: Arc<DashMap<MeetingId, ActiveBinding>>,
}

impl BindingTable {
    /// Whether `binding_id` is still the one applied to `meeting_id`.
    pub fn is_current(&self, meeting_id: &MeetingId, binding_id: &BindingId) -> bool {
        self.bindings
            .get(meeting_id)
            .is_some_and(|b| &b.info.binding_id == binding_id)
    }

    /// Install `binding`, handing back whatever it displaced.
    pub fn replace(&self, meeting_id: MeetingId, binding: ActiveBinding) -> Option<ActiveBinding> {
        self.bindings.insert(meeting_id, binding)
    }

    pub fn remove(&self, meeting_id: &MeetingId) -> Option<ActiveBinding> {
        self.bindings.remove(meeting_id).map(|(_, b)| b)
    }

    pub fn info(&self, meeting_id: &MeetingId) -> Option<BindingInfo> {
        self.bindings.get(meeting_id).map(|b| b.info.clone())
    }

    pub fn len(&self) -> usize {
        self.bindings.len()
    }

    /// Remove every binding.
    pub fn drain(&self) -> Vec<ActiveBinding> {
        let meetings: Vec<MeetingId> = self.bindings.iter().map(|b| b.key().clone()).collect();
        meetings.iter().filter_map(|m| self.remove(m)).collect()
    }
}
