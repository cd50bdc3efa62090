//! Grasp configuration values.
//!
//! Source text goes through [`ConfigDocument::parse`] and then
//! [`crate::validate::validate_structure`]; everything downstream works with
//! the typed [`GraspConfig`].

use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_yaml::{Mapping, Value};

use crate::errors::ParseError;
use crate::ids::ConfigId;
use crate::template::PromptTemplate;

/// Name that pins a config to the top of listings.
pub const DEFAULT_CONFIG_NAME: &str = "DEFAULT";

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum OutputHandler {
    Chat,
    Note,
}

impl fmt::Display for OutputHandler {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Chat => write!(f, "chat"),
            Self::Note => write!(f, "note"),
        }
    }
}

impl FromStr for OutputHandler {
    type Err = String;
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "chat" => Ok(Self::Chat),
            "note" => Ok(Self::Note),
            other => Err(format!("unknown output handler: {other}")),
        }
    }
}

/// Where a node's intervening decisions go.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "handler", rename_all = "snake_case")]
pub enum NodeOutput {
    Chat,
    Note { tag: String },
}

impl NodeOutput {
    pub fn handler(&self) -> OutputHandler {
        match self {
            Self::Chat => OutputHandler::Chat,
            Self::Note { .. } => OutputHandler::Note,
        }
    }

    pub fn note_tag(&self) -> Option<&str> {
        match self {
            Self::Chat => None,
            Self::Note { tag } => Some(tag),
        }
    }
}

/// One independently scheduled intervention rule.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct GraspNode {
    pub node_id: String,
    pub prompt_template: String,
    pub interval_sec: u64,
    pub output: NodeOutput,
    template: PromptTemplate,
}

impl GraspNode {
    pub fn new(
        node_id: impl Into<String>,
        prompt_template: impl Into<String>,
        interval_sec: u64,
        output: NodeOutput,
    ) -> Self {
        let prompt_template = prompt_template.into();
        let template = PromptTemplate::parse(&prompt_template);
        Self {
            node_id: node_id.into(),
            prompt_template,
            interval_sec,
            output,
            template,
        }
    }

    pub fn template(&self) -> &PromptTemplate {
        &self.template
    }
}

/// A saved configuration. Content never changes after save.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct GraspConfig {
    pub id: ConfigId,
    pub name: String,
    pub source: String,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    pub nodes: Vec<GraspNode>,
}

impl GraspConfig {
    pub fn node(&self, node_id: &str) -> Option<&GraspNode> {
        self.nodes.iter().find(|n| n.node_id == node_id)
    }

    pub fn is_default(&self) -> bool {
        self.name == DEFAULT_CONFIG_NAME
    }
}

/// Listing order: every `DEFAULT` config first, then newest `updated_at`
/// first. Ties fall back to id, newest first. The input is left untouched.
pub fn sort_for_listing(configs: &[GraspConfig]) -> Vec<GraspConfig> {
    let mut sorted = configs.to_vec();
    sorted.sort_by(|a, b| {
        b.is_default()
            .cmp(&a.is_default())
            .then_with(|| b.updated_at.cmp(&a.updated_at))
            .then_with(|| b.id.cmp(&a.id))
    });
    sorted
}

/// A node as written in the source, before any field checks.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct RawNode {
    pub node_id: Option<Value>,
    pub prompt_template: Option<Value>,
    pub interval_sec: Option<Value>,
    pub output_handler: Option<Value>,
    pub note_tag: Option<Value>,
}

/// Parsed but unvalidated config source.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct ConfigDocument {
    pub nodes: Vec<RawNode>,
}

impl ConfigDocument {
    pub fn parse(text: &str) -> Result<Self, ParseError> {
        let root: Value = serde_yaml::from_str(text).map_err(|e| ParseError(e.to_string()))?;
        let root = match root {
            Value::Mapping(map) => map,
            Value::Null => return Err(ParseError("config is empty".into())),
            _ => return Err(ParseError("top level must be a mapping".into())),
        };
        let nodes = match root.get("nodes") {
            Some(Value::Sequence(items)) => items,
            Some(Value::Null) | None => return Err(ParseError("missing 'nodes' list".into())),
            Some(_) => return Err(ParseError("'nodes' must be a list".into())),
        };

        let nodes = nodes
            .iter()
            .enumerate()
            .map(|(i, item)| match item {
                Value::Mapping(map) => Ok(RawNode::from_mapping(map)),
                _ => Err(ParseError(format!("node #{i} must be a mapping"))),
            })
            .collect::<Result<Vec<_>, _>>()?;

        Ok(Self { nodes })
    }
}

impl RawNode {
    fn from_mapping(map: &Mapping) -> Self {
        let field = |name: &str| map.get(name).filter(|v| !v.is_null()).cloned();
        Self {
            node_id: field("nodeId"),
            prompt_template: field("promptTemplate"),
            interval_sec: field("intervalSec"),
            output_handler: field("outputHandler"),
            note_tag: field("noteTag"),
        }
    }
}
