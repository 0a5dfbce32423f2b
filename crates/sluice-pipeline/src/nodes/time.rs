//! Date formatting and timed waits.

use std::time::Duration;

use async_trait::async_trait;
use chrono::format::{Item, StrftimeItems};
use chrono::Local;
use tokio_util::sync::CancellationToken;

use sluice_types::{ExecutionResult, Result, SluiceError, Value, ValueMap, ValueType};

use crate::node::Node;
use crate::property::Property;

use super::{optional_str, outputs};

fn now() -> Value {
    Value::DateTime(Local::now())
}

// ---------------------------------------------------------------------------
// FormatDate
// ---------------------------------------------------------------------------

/// Renders a date with a strftime format.
pub struct FormatDateNode {
    inputs: Vec<Property>,
    outputs: Vec<Property>,
}

impl FormatDateNode {
    pub fn new() -> Self {
        Self {
            inputs: vec![
                Property::new("Date", ValueType::DateTime)
                    .describe("Date to format; the current time when unset")
                    .default_with(now),
                Property::new("Format", ValueType::String)
                    .describe("strftime format")
                    .default_value("%Y-%m-%d"),
            ],
            outputs: vec![Property::new("Text", ValueType::String)],
        }
    }
}

impl Default for FormatDateNode {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl Node for FormatDateNode {
    fn inputs(&self) -> &[Property] {
        &self.inputs
    }

    fn outputs(&self) -> &[Property] {
        &self.outputs
    }

    async fn process(&self, inputs: &ValueMap, _cancel: &CancellationToken) -> Result<ExecutionResult> {
        let date = match inputs.get("Date") {
            Some(Value::DateTime(date)) => *date,
            _ => Local::now(),
        };
        let format = optional_str(inputs, "Format").unwrap_or("%Y-%m-%d");
        if StrftimeItems::new(format).any(|item| matches!(item, Item::Error)) {
            return Err(SluiceError::NodeError {
                node: "FormatDate".into(),
                message: format!("invalid date format '{format}'"),
            });
        }
        let text = date.format(format).to_string();
        Ok(ExecutionResult::success(outputs([("Text", Value::String(text))])))
    }
}

// ---------------------------------------------------------------------------
// Delay
// ---------------------------------------------------------------------------

/// Waits for the given number of milliseconds, or until cancelled.
pub struct DelayNode {
    inputs: Vec<Property>,
}

impl DelayNode {
    pub fn new() -> Self {
        Self {
            inputs: vec![Property::new("Milliseconds", ValueType::Int)
                .required()
                .example("{WatchInterval}")],
        }
    }
}

impl Default for DelayNode {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl Node for DelayNode {
    fn inputs(&self) -> &[Property] {
        &self.inputs
    }

    fn outputs(&self) -> &[Property] {
        &[]
    }

    async fn process(&self, inputs: &ValueMap, cancel: &CancellationToken) -> Result<ExecutionResult> {
        let millis = inputs
            .get("Milliseconds")
            .and_then(Value::as_int)
            .and_then(|n| u64::try_from(n).ok())
            .ok_or_else(|| SluiceError::NodeError {
                node: "Delay".into(),
                message: "Milliseconds must be a non-negative integer".into(),
            })?;

        tokio::select! {
            _ = tokio::time::sleep(Duration::from_millis(millis)) => {
                Ok(ExecutionResult::success(ValueMap::new()))
            }
            _ = cancel.cancelled() => Ok(ExecutionResult::cancelled("Delay cancelled")),
        }
    }
}
