use std::sync::Arc;

use tracing::debug;

use grasp_core::chat::{ChatEntry, ChatSink};
use grasp_core::config::{GraspNode, NodeOutput};
use grasp_core::decision::Decision;
use grasp_core::errors::DispatchError;

use crate::context::MeetingContext;

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum RouteOutcome {
    /// Posted to the meeting chat.
    Posted,
    /// Appended to the node's note channel.
    Noted,
    /// The model chose not to intervene.
    Skipped,
}

/// Commits an intervening decision to the destination the node names.
#[derive(Clone)]
pub struct OutputRouter {
    chat: Arc<dyn ChatSink>,
}

impl OutputRouter {
    pub fn new(chat: Arc<dyn ChatSink>) -> Self {
        Self { chat }
    }

    pub async fn route(
        &self,
        ctx: &MeetingContext,
        node: &GraspNode,
        decision: &Decision,
    ) -> Result<RouteOutcome, DispatchError> {
        if !decision.should_intervene {
            debug!(meeting_id = %ctx.meeting_id, node_id = %node.node_id, reason = %decision.reason, "node stayed quiet");
            return Ok(RouteOutcome::Skipped);
        }

        match &node.output {
            NodeOutput::Chat => {
                self.chat
                    .post(&ctx.meeting_id, ChatEntry::intervention(&node.node_id, &decision.message))
                    .await?;
                Ok(RouteOutcome::Posted)
            }
            NodeOutput::Note { tag } => {
                ctx.notes.append(tag, &decision.message, &node.node_id);
                Ok(RouteOutcome::Noted)
            }
        }
    }
}
