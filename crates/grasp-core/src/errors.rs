use std::fmt;
use std::time::Duration;

/// Malformed configuration source.
#[derive(Clone, Debug, PartialEq, Eq, thiserror::Error)]
#[error("config parse error: {0}")]
pub struct ParseError(pub String);

/// One invalid or missing per-node field.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct FieldViolation {
    /// Position of the node in the config's `nodes` sequence.
    pub index: usize,
    /// The node's id, when it has a usable one.
    pub node_id: Option<String>,
    pub field: &'static str,
    pub reason: String,
}

impl fmt::Display for FieldViolation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.node_id {
            Some(id) => write!(f, "node '{}': {} {}", id, self.field, self.reason),
            None => write!(f, "node #{}: {} {}", self.index, self.field, self.reason),
        }
    }
}

/// Save-time rejection. Carries every violation found, in node order.
#[derive(Clone, Debug, PartialEq, Eq, thiserror::Error)]
#[error("{}", join_violations(.violations))]
pub struct StructuralValidationError {
    pub violations: Vec<FieldViolation>,
}

impl StructuralValidationError {
    pub fn first(&self) -> Option<&FieldViolation> {
        self.violations.first()
    }

    pub fn mentions(&self, field: &str) -> bool {
        self.violations.iter().any(|v| v.field == field)
    }
}

fn join_violations(violations: &[FieldViolation]) -> String {
    violations
        .iter()
        .map(ToString::to_string)
        .collect::<Vec<_>>()
        .join("; ")
}

/// A note tag written by some node but read by no template.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct OrphanTag {
    pub tag: String,
    pub writers: Vec<String>,
}

impl fmt::Display for OrphanTag {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "note tag '{}' is written by {} but never read by any template",
            self.tag,
            self.writers
                .iter()
                .map(|w| format!("'{w}'"))
                .collect::<Vec<_>>()
                .join(", ")
        )
    }
}

/// Activation-time rejection.
#[derive(Clone, Debug, PartialEq, Eq, thiserror::Error)]
#[error("{}", join_orphans(.orphans))]
pub struct SemanticValidationError {
    pub orphans: Vec<OrphanTag>,
}

impl SemanticValidationError {
    pub fn detail(&self) -> String {
        join_orphans(&self.orphans)
    }

    pub fn orphan_tags(&self) -> impl Iterator<Item = &str> {
        self.orphans.iter().map(|o| o.tag.as_str())
    }
}

fn join_orphans(orphans: &[OrphanTag]) -> String {
    orphans
        .iter()
        .map(ToString::to_string)
        .collect::<Vec<_>>()
        .join("; ")
}

/// Anything that stops a config source from becoming a saved config.
#[derive(Clone, Debug, PartialEq, Eq, thiserror::Error)]
pub enum ConfigError {
    #[error(transparent)]
    Parse(#[from] ParseError),
    #[error("invalid config: {0}")]
    Structural(#[from] StructuralValidationError),
}

/// Malformed utterance event. The event is dropped.
#[derive(Clone, Debug, PartialEq, Eq, thiserror::Error)]
pub enum IngestionError {
    #[error("missing field: {0}")]
    MissingField(&'static str),
    #[error("negative timestamp: {0}")]
    NegativeTimestamp(i64),
}

/// Model invocation failure. The cycle is abandoned.
#[derive(Clone, Debug, thiserror::Error)]
pub enum InvocationError {
    #[error("model call timed out after {0:?}")]
    Timeout(Duration),
    #[error("transport error: {0}")]
    Transport(String),
    #[error("model returned status {status}: {body}")]
    Status { status: u16, body: String },
    #[error("malformed model response: {0}")]
    Malformed(String),
    #[error("model response of {size} bytes exceeds limit of {limit}")]
    Oversized { size: usize, limit: usize },
}

impl InvocationError {
    /// Short classification string for logs.
    pub fn error_kind(&self) -> &'static str {
        match self {
            Self::Timeout(_) => "timeout",
            Self::Transport(_) => "transport",
            Self::Status { .. } => "status",
            Self::Malformed(_) => "malformed",
            Self::Oversized { .. } => "oversized",
        }
    }
}

/// Failure writing a routed output.
#[derive(Clone, Debug, thiserror::Error)]
#[error("dispatch failed: {0}")]
pub struct DispatchError(pub String);
