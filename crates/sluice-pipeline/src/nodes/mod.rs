//! Built-in node types.

pub mod fs;
pub mod log;
pub mod text;
pub mod time;
pub mod variable;

pub use fs::{CombinePathNode, CopyFileNode, ListFilesNode};
pub use log::LogNode;
pub use text::{MatchNode, SplitTextNode};
pub use time::{DelayNode, FormatDateNode};
pub use variable::SetVariableNode;

use sluice_types::{Result, SluiceError, Value, ValueMap};

use crate::node::{NodeType, NodeUsage};

/// Registration candidates for every built-in node.
pub fn builtin_node_types() -> Vec<NodeType> {
    let anywhere = NodeUsage::ALL;
    let mutating = NodeUsage::PRE_PROCESS | NodeUsage::PROCESS | NodeUsage::POST_PROCESS;
    vec![
        NodeType::new("log", LogNode::new).type_id("Log").usage(anywhere).shared(),
        NodeType::new("set-variable", SetVariableNode::new)
            .type_id("SetVariable")
            .usage(anywhere)
            .shared(),
        NodeType::new("combine-path", CombinePathNode::new)
            .type_id("CombinePath")
            .usage(anywhere)
            .shared(),
        NodeType::new("format-date", FormatDateNode::new)
            .type_id("FormatDate")
            .usage(anywhere)
            .shared(),
        NodeType::new("copy-file", CopyFileNode::new)
            .type_id("CopyFile")
            .usage(mutating)
            .shared(),
        NodeType::new("list-files", ListFilesNode::new)
            .type_id("ListFiles")
            .usage(anywhere)
            .shared(),
        NodeType::new("match", MatchNode::new).type_id("Match").usage(anywhere).shared(),
        NodeType::new("split-text", SplitTextNode::new)
            .type_id("SplitText")
            .usage(anywhere)
            .shared(),
        NodeType::new("delay", DelayNode::new).type_id("Delay").usage(anywhere).exclusive(),
    ]
}

// ---------------------------------------------------------------------------
// Input helpers
// ---------------------------------------------------------------------------

/// A text input that must be present and non-null.
pub(crate) fn require_str<'a>(node: &str, inputs: &'a ValueMap, name: &str) -> Result<&'a str> {
    inputs
        .get(name)
        .and_then(Value::as_str)
        .ok_or_else(|| SluiceError::NodeError {
            node: node.to_string(),
            message: format!("input '{name}' has no text value"),
        })
}

/// A text input that may be null.
pub(crate) fn optional_str<'a>(inputs: &'a ValueMap, name: &str) -> Option<&'a str> {
    inputs.get(name).and_then(Value::as_str)
}

pub(crate) fn flag(inputs: &ValueMap, name: &str) -> bool {
    inputs.get(name).and_then(Value::as_bool).unwrap_or(false)
}

pub(crate) fn outputs<const N: usize>(pairs: [(&str, Value); N]) -> ValueMap {
    pairs
        .into_iter()
        .map(|(name, value)| (name.to_string(), value))
        .collect()
}
