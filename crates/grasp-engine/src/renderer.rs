//! Resolve a node's template against the live meeting context.

use std::sync::Arc;

use tracing::warn;

use grasp_core::decision::DECISION_INSTRUCTION;
use grasp_core::template::{Placeholder, PromptTemplate, Segment};
use grasp_core::transcript::TranscriptEntry;

use crate::context::MeetingContext;
use crate::window::WindowSelector;

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct RenderedPrompt {
    pub text: String,
    /// One line per placeholder that could not be resolved.
    pub warnings: Vec<String>,
}

/// Substitute every placeholder, then append the decision instruction.
///
/// Never fails: unknown placeholders become empty text and a warning.
pub fn render(template: &PromptTemplate, ctx: &MeetingContext, now_ms: i64) -> RenderedPrompt {
    let mut text = String::new();
    let mut warnings = Vec::new();

    for segment in template.segments() {
        match segment {
            Segment::Text(t) => text.push_str(t),
            Segment::Placeholder(Placeholder::LastEntries(n)) => {
                text.push_str(&lines(&ctx.window.query(WindowSelector::LastN(*n))));
            }
            Segment::Placeholder(Placeholder::Trailing(window)) => {
                let selector = WindowSelector::Trailing { window: *window, now_ms };
                text.push_str(&lines(&ctx.window.query(selector)));
            }
            Segment::Placeholder(Placeholder::Notes(tag)) => text.push_str(&ctx.notes.read(tag)),
            Segment::Placeholder(Placeholder::Unknown(raw)) => {
                warn!(meeting_id = %ctx.meeting_id, placeholder = %raw, "unknown placeholder rendered empty");
                warnings.push(format!("unknown placeholder '{{{{{raw}}}}}'"));
            }
        }
    }

    text.push_str("\n\n");
    text.push_str(DECISION_INSTRUCTION);
    RenderedPrompt { text, warnings }
}

fn lines(entries: &[Arc<TranscriptEntry>]) -> String {
    entries
        .iter()
        .map(|e| e.line())
        .collect::<Vec<_>>()
        .join("\n")
}
