use async_trait::async_trait;
use tokio_util::sync::CancellationToken;

use sluice_types::{EnumDef, ExecutionResult, Result, Value, ValueMap, ValueType};

use crate::node::Node;
use crate::property::Property;

use super::require_str;

/// Writes a message to the log at the requested level.
pub struct LogNode {
    inputs: Vec<Property>,
}

impl LogNode {
    pub fn new() -> Self {
        let levels = EnumDef::new("LogLevel", &["Trace", "Debug", "Info", "Warn", "Error"]);
        let info = levels.value("Info").unwrap_or(Value::Null);
        Self {
            inputs: vec![
                Property::new("Message", ValueType::String)
                    .describe("Text to log")
                    .required()
                    .example("Copied {Item}"),
                Property::new("Level", ValueType::Enum(levels))
                    .describe("Log level")
                    .default_value(info),
            ],
        }
    }
}

impl Default for LogNode {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl Node for LogNode {
    fn inputs(&self) -> &[Property] {
        &self.inputs
    }

    fn outputs(&self) -> &[Property] {
        &[]
    }

    async fn process(&self, inputs: &ValueMap, _cancel: &CancellationToken) -> Result<ExecutionResult> {
        let message = require_str("Log", inputs, "Message")?;
        match inputs.get("Level").and_then(Value::as_enum_variant) {
            Some("Trace") => tracing::trace!(target: "sluice::log", "{message}"),
            Some("Debug") => tracing::debug!(target: "sluice::log", "{message}"),
            Some("Warn") => tracing::warn!(target: "sluice::log", "{message}"),
            Some("Error") => tracing::error!(target: "sluice::log", "{message}"),
            _ => tracing::info!(target: "sluice::log", "{message}"),
        }
        Ok(ExecutionResult::success(ValueMap::new()))
    }
}
