use indexmap::IndexMap;
use serde::{Deserialize, Serialize};

/// Outcome key followed when a node does not report one.
pub const DEFAULT_CONNECTION: &str = "Default";

/// Ordered string map used for every key/value section of a document.
pub type KeyValues = IndexMap<String, String>;

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase", deny_unknown_fields)]
pub struct PipelineDocument {
    #[serde(default)]
    pub name: String,
    #[serde(default)]
    pub environment: KeyValues,
    #[serde(default)]
    pub workflow: WorkflowDescription,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct WorkflowDescription {
    #[serde(default, rename = "PreProcessGraph")]
    pub pre_process: GraphDescription,
    #[serde(default, rename = "ProcessGraph")]
    pub process: ProcessDescription,
    #[serde(default, rename = "PostProcessGraph")]
    pub post_process: GraphDescription,
}

/// The main phase: an identification graph plus a graph run once per item.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ProcessDescription {
    #[serde(default, rename = "Environment")]
    pub environment: KeyValues,
    #[serde(default, rename = "IdentificationGraph")]
    pub identification: GraphDescription,
    #[serde(default, rename = "ProcessGraph")]
    pub process: GraphDescription,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase", deny_unknown_fields)]
pub struct GraphDescription {
    #[serde(default)]
    pub environment: KeyValues,
    #[serde(default)]
    pub nodes: Vec<NodeDescription>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct NodeDescription {
    #[serde(default, rename = "Name")]
    pub name: String,
    #[serde(rename = "ID")]
    pub id: String,
    #[serde(rename = "TypeID")]
    pub type_id: String,
    /// Property name -> descriptor string.
    #[serde(default, rename = "Inputs")]
    pub inputs: KeyValues,
    /// Property name -> runtime variable receiving the produced value.
    #[serde(default, rename = "Outputs")]
    pub outputs: KeyValues,
    /// Outcome key -> next node ID. An empty ID ends the branch.
    #[serde(default, rename = "Connections")]
    pub connections: KeyValues,
}

impl NodeDescription {
    pub fn new(id: impl Into<String>, type_id: impl Into<String>) -> Self {
        let id = id.into();
        Self {
            name: id.clone(),
            id,
            type_id: type_id.into(),
            ..Default::default()
        }
    }

    pub fn named(mut self, name: impl Into<String>) -> Self {
        self.name = name.into();
        self
    }

    pub fn input(mut self, property: impl Into<String>, descriptor: impl Into<String>) -> Self {
        self.inputs.insert(property.into(), descriptor.into());
        self
    }

    pub fn output(mut self, property: impl Into<String>, variable: impl Into<String>) -> Self {
        self.outputs.insert(property.into(), variable.into());
        self
    }

    pub fn connect(mut self, outcome: impl Into<String>, target: impl Into<String>) -> Self {
        self.connections.insert(outcome.into(), target.into());
        self
    }

    /// Shorthand for a `Default` connection.
    pub fn then(self, target: impl Into<String>) -> Self {
        self.connect(DEFAULT_CONNECTION, target)
    }

    pub fn label(&self) -> &str {
        if self.name.is_empty() {
            &self.id
        } else {
            &self.name
        }
    }
}

impl GraphDescription {
    pub fn new(nodes: Vec<NodeDescription>) -> Self {
        Self {
            environment: KeyValues::new(),
            nodes,
        }
    }

    pub fn with_env(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.environment.insert(key.into(), value.into());
        self
    }

    /// The traversal head: the first node in declaration order.
    pub fn head(&self) -> Option<&NodeDescription> {
        self.nodes.first()
    }

    pub fn node(&self, id: &str) -> Option<&NodeDescription> {
        self.nodes.iter().find(|n| n.id == id)
    }

    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }
}

impl WorkflowDescription {
    /// Every graph of the workflow with a short label, in execution order.
    pub fn graphs(&self) -> [(&'static str, &GraphDescription); 4] {
        [
            ("PreProcessGraph", &self.pre_process),
            ("IdentificationGraph", &self.process.identification),
            ("ProcessGraph", &self.process.process),
            ("PostProcessGraph", &self.post_process),
        ]
    }
}
