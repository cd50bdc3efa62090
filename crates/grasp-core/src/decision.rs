//! The structured decision a model returns for one node firing.

use serde::{Deserialize, Serialize};

use crate::errors::InvocationError;

/// Appended to every rendered prompt.
pub const DECISION_INSTRUCTION: &str = "\
Respond with a single JSON object and nothing else, of the form:
{\"shouldIntervene\": <true|false>, \"reason\": \"<why>\", \"message\": \"<text to deliver when intervening>\"}
Set shouldIntervene to false when there is nothing worth saying right now.";

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Decision {
    pub should_intervene: bool,
    #[serde(default)]
    pub reason: String,
    #[serde(default)]
    pub message: String,
}

impl Decision {
    pub fn quiet(reason: impl Into<String>) -> Self {
        Self {
            should_intervene: false,
            reason: reason.into(),
            message: String::new(),
        }
    }

    pub fn intervene(message: impl Into<String>, reason: impl Into<String>) -> Self {
        Self {
            should_intervene: true,
            reason: reason.into(),
            message: message.into(),
        }
    }

    /// Parse a raw model response, failing closed.
    ///
    /// Accepts a bare object or one wrapped in prose or a markdown fence. An
    /// intervening decision must carry a non-blank message.
    pub fn parse(raw: &str, max_bytes: usize) -> Result<Self, InvocationError> {
        if raw.len() > max_bytes {
            return Err(InvocationError::Oversized {
                size: raw.len(),
                limit: max_bytes,
            });
        }

        let start = raw
            .find('{')
            .ok_or_else(|| InvocationError::Malformed("no JSON object in response".into()))?;
        let end = raw
            .rfind('}')
            .filter(|&end| end > start)
            .ok_or_else(|| InvocationError::Malformed("unterminated JSON object".into()))?;

        let decision: Decision = serde_json::from_str(&raw[start..=end])
            .map_err(|e| InvocationError::Malformed(e.to_string()))?;

        if decision.should_intervene && decision.message.trim().is_empty() {
            return Err(InvocationError::Malformed(
                "intervening decision has an empty message".into(),
            ));
        }
        Ok(decision)
    }
}
