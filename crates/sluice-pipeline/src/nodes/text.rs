//! Text nodes.

use async_trait::async_trait;
use regex::Regex;
use tokio_util::sync::CancellationToken;

use sluice_types::{ExecutionResult, Result, SluiceError, Value, ValueMap, ValueType};

use crate::node::Node;
use crate::property::Property;

use super::{optional_str, outputs, require_str};

pub const MATCH_OUTCOME: &str = "Match";
pub const NO_MATCH_OUTCOME: &str = "NoMatch";

// ---------------------------------------------------------------------------
// Match
// ---------------------------------------------------------------------------

/// Tests text against a regular expression and branches on the result.
pub struct MatchNode {
    inputs: Vec<Property>,
    outputs: Vec<Property>,
}

impl MatchNode {
    pub fn new() -> Self {
        Self {
            inputs: vec![
                Property::new("Text", ValueType::String).required(),
                Property::new("Pattern", ValueType::String)
                    .describe("Regular expression")
                    .required()
                    .example(r"^report-(\d{{4}})\.csv$"),
            ],
            outputs: vec![Property::new("Captures", ValueType::list_of(ValueType::String))
                .describe("Capture groups of the first match; unmatched groups are empty")],
        }
    }
}

impl Default for MatchNode {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl Node for MatchNode {
    fn inputs(&self) -> &[Property] {
        &self.inputs
    }

    fn outputs(&self) -> &[Property] {
        &self.outputs
    }

    async fn process(&self, inputs: &ValueMap, _cancel: &CancellationToken) -> Result<ExecutionResult> {
        let text = require_str("Match", inputs, "Text")?;
        let pattern = require_str("Match", inputs, "Pattern")?;
        let regex = Regex::new(pattern).map_err(|e| SluiceError::NodeError {
            node: "Match".into(),
            message: format!("invalid pattern '{pattern}': {e}"),
        })?;

        let Some(captures) = regex.captures(text) else {
            return Ok(ExecutionResult::success(ValueMap::new()).with_outcome(NO_MATCH_OUTCOME));
        };
        let groups = captures
            .iter()
            .skip(1)
            .map(|m| Value::String(m.map(|m| m.as_str().to_string()).unwrap_or_default()))
            .collect();
        Ok(ExecutionResult::success(outputs([("Captures", Value::List(groups))]))
            .with_outcome(MATCH_OUTCOME))
    }
}

// ---------------------------------------------------------------------------
// SplitText
// ---------------------------------------------------------------------------

pub struct SplitTextNode {
    inputs: Vec<Property>,
    outputs: Vec<Property>,
}

impl SplitTextNode {
    pub fn new() -> Self {
        Self {
            inputs: vec![
                Property::new("Text", ValueType::String).required(),
                Property::new("Separator", ValueType::String).default_value(";"),
            ],
            outputs: vec![Property::new("Items", ValueType::list_of(ValueType::String))
                .describe("Trimmed, non-empty parts")],
        }
    }
}

impl Default for SplitTextNode {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl Node for SplitTextNode {
    fn inputs(&self) -> &[Property] {
        &self.inputs
    }

    fn outputs(&self) -> &[Property] {
        &self.outputs
    }

    async fn process(&self, inputs: &ValueMap, _cancel: &CancellationToken) -> Result<ExecutionResult> {
        let text = require_str("SplitText", inputs, "Text")?;
        let separator = optional_str(inputs, "Separator")
            .filter(|s| !s.is_empty())
            .unwrap_or(";");
        let items = text
            .split(separator)
            .map(str::trim)
            .filter(|s| !s.is_empty())
            .map(Value::from)
            .collect();
        Ok(ExecutionResult::success(outputs([("Items", Value::List(items))])))
    }
}
