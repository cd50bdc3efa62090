use std::sync::Arc;

use tracing::{error, warn};

use grasp_core::chat::{ChatEntry, ChatSink};
use grasp_core::errors::SemanticValidationError;
use grasp_core::ids::MeetingId;

/// Tells the meeting, once, that a config could not be applied.
#[derive(Clone)]
pub struct ErrorReporter {
    chat: Arc<dyn ChatSink>,
}

impl ErrorReporter {
    pub fn new(chat: Arc<dyn ChatSink>) -> Self {
        Self { chat }
    }

    /// Posts `"<config name> failed to apply: <detail>"`. A failed post is
    /// logged and not retried.
    pub async fn report_apply_failure(
        &self,
        meeting_id: &MeetingId,
        config_name: &str,
        err: &SemanticValidationError,
    ) {
        let message = apply_failure_message(config_name, err);
        warn!(meeting_id = %meeting_id, config = config_name, orphans = err.orphans.len(), "config failed to apply");
        if let Err(e) = self.chat.post(meeting_id, ChatEntry::apply_error(message)).await {
            error!(meeting_id = %meeting_id, error = %e, "could not report apply failure");
        }
    }
}

pub fn apply_failure_message(config_name: &str, err: &SemanticValidationError) -> String {
    format!("{config_name} failed to apply: {}", err.detail())
}
