//! Two-phase config validation.
//!
//! Structural checks run at save time and reject the write. Semantic checks
//! (note tag wiring) run only when a config is bound to a meeting.

use std::collections::{BTreeMap, HashSet};

use serde_yaml::Value;

use crate::config::{ConfigDocument, GraspNode, NodeOutput, OutputHandler, RawNode};
use crate::errors::{
    ConfigError, FieldViolation, OrphanTag, SemanticValidationError, StructuralValidationError,
};

/// Longest accepted node interval: one day.
pub const MAX_INTERVAL_SEC: u64 = 86_400;

/// Parse and structurally validate config source in one step.
pub fn parse_and_validate(text: &str) -> Result<Vec<GraspNode>, ConfigError> {
    let doc = ConfigDocument::parse(text)?;
    Ok(validate_structure(&doc)?)
}

/// Check every node's fields and produce typed nodes. All violations are
/// collected before returning.
pub fn validate_structure(doc: &ConfigDocument) -> Result<Vec<GraspNode>, StructuralValidationError> {
    let mut violations = Vec::new();
    let mut nodes = Vec::with_capacity(doc.nodes.len());
    let mut seen_ids = HashSet::new();

    if doc.nodes.is_empty() {
        violations.push(FieldViolation {
            index: 0,
            node_id: None,
            field: "nodes",
            reason: "must contain at least one node".into(),
        });
    }

    for (index, raw) in doc.nodes.iter().enumerate() {
        let mut check = NodeCheck {
            index,
            node_id: None,
            violations: &mut violations,
        };

        let node_id = check.non_empty_string(raw.node_id.as_ref(), "nodeId");
        if let Some(id) = &node_id {
            check.node_id = Some(id.clone());
            if !seen_ids.insert(id.clone()) {
                check.violation("nodeId", format!("'{id}' is not unique"));
            }
        }

        let template = check.non_empty_string(raw.prompt_template.as_ref(), "promptTemplate");
        let interval = check.positive_interval(raw);
        let output = check.output(raw);

        if let (Some(node_id), Some(template), Some(interval), Some(output)) =
            (node_id, template, interval, output)
        {
            nodes.push(GraspNode::new(node_id, template, interval, output));
        }
    }

    if violations.is_empty() {
        Ok(nodes)
    } else {
        Err(StructuralValidationError { violations })
    }
}

struct NodeCheck<'a> {
    index: usize,
    node_id: Option<String>,
    violations: &'a mut Vec<FieldViolation>,
}

impl NodeCheck<'_> {
    fn violation(&mut self, field: &'static str, reason: impl Into<String>) {
        self.violations.push(FieldViolation {
            index: self.index,
            node_id: self.node_id.clone(),
            field,
            reason: reason.into(),
        });
    }

    fn non_empty_string(&mut self, value: Option<&Value>, field: &'static str) -> Option<String> {
        match value {
            None => {
                self.violation(field, "is required");
                None
            }
            Some(Value::String(s)) if s.trim().is_empty() => {
                self.violation(field, "must not be empty");
                None
            }
            Some(Value::String(s)) => Some(s.clone()),
            Some(_) => {
                self.violation(field, "must be a string");
                None
            }
        }
    }

    fn positive_interval(&mut self, raw: &RawNode) -> Option<u64> {
        let Some(value) = raw.interval_sec.as_ref() else {
            self.violation("intervalSec", "is required");
            return None;
        };
        match value {
            Value::Number(n) => match (n.as_u64(), n.as_i64()) {
                (Some(secs), _) if secs > MAX_INTERVAL_SEC => {
                    self.violation("intervalSec", format!("must be at most {MAX_INTERVAL_SEC}"));
                    None
                }
                (Some(secs), _) if secs > 0 => Some(secs),
                (_, Some(_)) | (Some(_), _) => {
                    self.violation("intervalSec", "must be greater than zero");
                    None
                }
                (None, None) => {
                    self.violation("intervalSec", "must be an integer");
                    None
                }
            },
            _ => {
                self.violation("intervalSec", "must be a positive integer");
                None
            }
        }
    }

    fn output(&mut self, raw: &RawNode) -> Option<NodeOutput> {
        let handler = match raw.output_handler.as_ref() {
            None => {
                self.violation("outputHandler", "is required");
                None
            }
            Some(Value::String(s)) => match s.parse::<OutputHandler>() {
                Ok(h) => Some(h),
                Err(_) => {
                    self.violation("outputHandler", format!("must be 'chat' or 'note', got '{s}'"));
                    None
                }
            },
            Some(_) => {
                self.violation("outputHandler", "must be 'chat' or 'note'");
                None
            }
        };

        match handler? {
            OutputHandler::Chat => {
                if raw.note_tag.is_some() {
                    self.violation("noteTag", "is only allowed when outputHandler is 'note'");
                    return None;
                }
                Some(NodeOutput::Chat)
            }
            OutputHandler::Note => self
                .non_empty_string(raw.note_tag.as_ref(), "noteTag")
                .map(|tag| NodeOutput::Note { tag }),
        }
    }
}

/// Every note tag some node writes must be read by at least one template.
pub fn validate_semantics(nodes: &[GraspNode]) -> Result<(), SemanticValidationError> {
    let read: HashSet<&str> = nodes
        .iter()
        .flat_map(|n| n.template().note_tags())
        .collect();

    let mut written: BTreeMap<&str, Vec<String>> = BTreeMap::new();
    for node in nodes {
        if let Some(tag) = node.output.note_tag() {
            written.entry(tag).or_default().push(node.node_id.clone());
        }
    }

    let orphans: Vec<OrphanTag> = written
        .into_iter()
        .filter(|(tag, _)| !read.contains(tag))
        .map(|(tag, writers)| OrphanTag {
            tag: tag.to_string(),
            writers,
        })
        .collect();

    if orphans.is_empty() {
        Ok(())
    } else {
        Err(SemanticValidationError { orphans })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn structure(text: &str) -> Result<Vec<GraspNode>, StructuralValidationError> {
        validate_structure(&ConfigDocument::parse(text).unwrap())
    }

    const VALID: &str = r#"
nodes:
  - nodeId: summarizer
    promptTemplate: "Summarize {{INPUT:past5m}}"
    intervalSec: 60
    outputHandler: note
    noteTag: summary
  - nodeId: coach
    promptTemplate: "Given {{NOTES:summary}} and {{INPUT:last10}}"
    intervalSec: 30
    outputHandler: chat
"#;

    #[test]
    fn valid_config_produces_typed_nodes() {
        let nodes = structure(VALID).unwrap();
        assert_eq!(nodes.len(), 2);
        assert_eq!(nodes[0].node_id, "summarizer");
        assert_eq!(nodes[0].interval_sec, 60);
        assert_eq!(nodes[0].output, NodeOutput::Note { tag: "summary".into() });
        assert_eq!(nodes[1].output, NodeOutput::Chat);
        assert!(validate_semantics(&nodes).is_ok());
    }

    #[test]
    fn missing_node_id_is_rejected() {
        let err = structure("nodes:\n  - promptTemplate: x\n    intervalSec: 5\n    outputHandler: chat\n")
            .unwrap_err();
        let v = err.first().unwrap();
        assert_eq!(v.field, "nodeId");
        assert_eq!(v.node_id, None);
        assert_eq!(v.index, 0);
    }

    #[test]
    fn empty_strings_are_rejected() {
        let err = structure("nodes:\n  - nodeId: \"  \"\n    promptTemplate: \"\"\n    intervalSec: 5\n    outputHandler: chat\n")
            .unwrap_err();
        assert!(err.mentions("nodeId"));
        assert!(err.mentions("promptTemplate"));
    }

    #[test]
    fn missing_template_names_the_node() {
        let err = structure("nodes:\n  - nodeId: a\n    intervalSec: 5\n    outputHandler: chat\n")
            .unwrap_err();
        let v = err.first().unwrap();
        assert_eq!(v.field, "promptTemplate");
        assert_eq!(v.node_id.as_deref(), Some("a"));
    }

    #[test]
    fn interval_must_be_positive_integer() {
        for bad in ["0", "-5", "2.5", "\"ten\"", "[1]"] {
            let text = format!(
                "nodes:\n  - nodeId: a\n    promptTemplate: x\n    intervalSec: {bad}\n    outputHandler: chat\n"
            );
            let err = structure(&text).unwrap_err();
            assert!(err.mentions("intervalSec"), "accepted intervalSec {bad}");
        }
        let err = structure("nodes:\n  - nodeId: a\n    promptTemplate: x\n    outputHandler: chat\n")
            .unwrap_err();
        assert!(err.mentions("intervalSec"));
    }

    #[test]
    fn interval_has_an_upper_bound() {
        let config = |secs: &str| {
            format!("nodes:\n  - nodeId: a\n    promptTemplate: x\n    intervalSec: {secs}\n    outputHandler: chat\n")
        };
        assert_eq!(structure(&config("86400")).unwrap()[0].interval_sec, MAX_INTERVAL_SEC);

        for too_long in ["86401", "18446744073709551615"] {
            let err = structure(&config(too_long)).unwrap_err();
            let v = err.first().unwrap();
            assert_eq!(v.field, "intervalSec");
            assert_eq!(v.node_id.as_deref(), Some("a"));
            assert!(v.reason.contains("at most 86400"), "{}", v.reason);
        }
        assert!(parse_and_validate(&config("18446744073709551615")).is_err());
    }

    #[test]
    fn note_handler_requires_tag() {
        let err = structure("nodes:\n  - nodeId: a\n    promptTemplate: x\n    intervalSec: 5\n    outputHandler: note\n")
            .unwrap_err();
        assert_eq!(err.first().unwrap().field, "noteTag");
    }

    #[test]
    fn chat_handler_rejects_tag() {
        let err = structure("nodes:\n  - nodeId: a\n    promptTemplate: x\n    intervalSec: 5\n    outputHandler: chat\n    noteTag: t\n")
            .unwrap_err();
        assert_eq!(err.first().unwrap().field, "noteTag");
    }

    #[test]
    fn unknown_handler_is_rejected() {
        let err = structure("nodes:\n  - nodeId: a\n    promptTemplate: x\n    intervalSec: 5\n    outputHandler: email\n")
            .unwrap_err();
        assert_eq!(err.first().unwrap().field, "outputHandler");
    }

    #[test]
    fn duplicate_node_ids_are_rejected() {
        let text = "nodes:\n  - nodeId: a\n    promptTemplate: x\n    intervalSec: 5\n    outputHandler: chat\n  - nodeId: a\n    promptTemplate: y\n    intervalSec: 5\n    outputHandler: chat\n";
        let err = structure(text).unwrap_err();
        let v = err.first().unwrap();
        assert_eq!(v.field, "nodeId");
        assert_eq!(v.index, 1);
    }

    #[test]
    fn all_violations_are_reported() {
        let text = "nodes:\n  - nodeId: a\n  - promptTemplate: y\n    intervalSec: 0\n    outputHandler: note\n";
        let err = structure(text).unwrap_err();
        assert!(err.violations.len() >= 5, "{err}");
        assert!(err.violations.iter().any(|v| v.index == 1 && v.field == "noteTag"));
    }

    #[test]
    fn empty_node_list_is_rejected() {
        let err = structure("nodes: []\n").unwrap_err();
        assert!(err.mentions("nodes"));
    }

    #[test]
    fn parse_and_validate_distinguishes_errors() {
        assert!(matches!(parse_and_validate("nodes: ["), Err(ConfigError::Parse(_))));
        assert!(matches!(
            parse_and_validate("nodes:\n  - nodeId: a\n"),
            Err(ConfigError::Structural(_))
        ));
        assert!(parse_and_validate(VALID).is_ok());
    }

    #[test]
    fn orphan_tag_fails_semantics_but_not_structure() {
        let text = "nodes:\n  - nodeId: w\n    promptTemplate: \"{{INPUT:last5}}\"\n    intervalSec: 10\n    outputHandler: note\n    noteTag: lonely\n";
        let nodes = structure(text).unwrap();
        let err = validate_semantics(&nodes).unwrap_err();
        assert_eq!(err.orphan_tags().collect::<Vec<_>>(), vec!["lonely"]);
        assert_eq!(err.orphans[0].writers, vec!["w".to_string()]);
    }

    #[test]
    fn self_read_satisfies_semantics() {
        let nodes = vec![GraspNode::new(
            "loop",
            "previous: {{NOTES:mine}}",
            10,
            NodeOutput::Note { tag: "mine".into() },
        )];
        assert!(validate_semantics(&nodes).is_ok());
    }

    #[test]
    fn read_but_unwritten_tags_are_allowed() {
        let nodes = vec![GraspNode::new("r", "{{NOTES:nobody}}", 10, NodeOutput::Chat)];
        assert!(validate_semantics(&nodes).is_ok());
    }

    #[test]
    fn orphans_are_sorted_and_grouped() {
        let nodes = vec![
            GraspNode::new("a", "x", 10, NodeOutput::Note { tag: "zeta".into() }),
            GraspNode::new("b", "x", 10, NodeOutput::Note { tag: "alpha".into() }),
            GraspNode::new("c", "x", 10, NodeOutput::Note { tag: "zeta".into() }),
        ];
        let err = validate_semantics(&nodes).unwrap_err();
        assert_eq!(err.orphan_tags().collect::<Vec<_>>(), vec!["alpha", "zeta"]);
        assert_eq!(err.orphans[1].writers, vec!["a".to_string(), "c".to_string()]);
    }
}
