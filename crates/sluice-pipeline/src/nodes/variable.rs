use async_trait::async_trait;
use tokio_util::sync::CancellationToken;

use sluice_types::{ExecutionResult, Result, Value, ValueMap, ValueType};

use crate::node::Node;
use crate::property::Property;

use super::outputs;

/// Passes its input through unchanged so it can be bound to a variable.
pub struct SetVariableNode {
    inputs: Vec<Property>,
    outputs: Vec<Property>,
}

impl SetVariableNode {
    pub fn new() -> Self {
        Self {
            inputs: vec![Property::new("Value", ValueType::Any)
                .describe("Value to store")
                .required()],
            outputs: vec![Property::new("Value", ValueType::Any).describe("The same value")],
        }
    }
}

impl Default for SetVariableNode {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl Node for SetVariableNode {
    fn inputs(&self) -> &[Property] {
        &self.inputs
    }

    fn outputs(&self) -> &[Property] {
        &self.outputs
    }

    async fn process(&self, inputs: &ValueMap, _cancel: &CancellationToken) -> Result<ExecutionResult> {
        let value = inputs.get("Value").cloned().unwrap_or(Value::Null);
        Ok(ExecutionResult::success(outputs([("Value", value)])))
    }
}
