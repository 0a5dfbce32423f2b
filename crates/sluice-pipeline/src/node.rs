//! Node trait and the registration metadata that describes a node type.

use std::fmt;
use std::ops::BitOr;
use std::sync::Arc;

use async_trait::async_trait;
use tokio_util::sync::CancellationToken;

use sluice_types::{ExecutionResult, Result, ValueMap};

use crate::property::Property;

// ---------------------------------------------------------------------------
// Node trait
// ---------------------------------------------------------------------------

/// A unit of work in a graph.
///
/// Shared node types hand the same instance to every graph that uses them, so
/// implementations must not keep per-invocation state in `self`.
#[async_trait]
pub trait Node: Send + Sync {
    /// Declared inputs. The engine resolves each one before `process`.
    fn inputs(&self) -> &[Property];

    /// Declared outputs. Values present in the result are bound to the runtime
    /// variables named by the node description.
    fn outputs(&self) -> &[Property];

    /// Run the node. Returning `Err` is reported as a fault with the error's
    /// result code; long-running nodes should watch `cancel`.
    async fn process(&self, inputs: &ValueMap, cancel: &CancellationToken) -> Result<ExecutionResult>;
}

// ---------------------------------------------------------------------------
// NodeUsage
// ---------------------------------------------------------------------------

/// Bit set of the graph kinds a node type may appear in.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub struct NodeUsage(u8);

impl NodeUsage {
    pub const NONE: NodeUsage = NodeUsage(0);
    pub const PRE_PROCESS: NodeUsage = NodeUsage(1);
    pub const IDENTIFICATION: NodeUsage = NodeUsage(1 << 1);
    pub const PROCESS: NodeUsage = NodeUsage(1 << 2);
    pub const POST_PROCESS: NodeUsage = NodeUsage(1 << 3);
    pub const ALL: NodeUsage = NodeUsage(0b1111);

    pub fn contains(self, other: NodeUsage) -> bool {
        self.0 & other.0 == other.0
    }

    pub fn intersects(self, other: NodeUsage) -> bool {
        self.0 & other.0 != 0
    }

    pub fn is_empty(self) -> bool {
        self.0 == 0
    }
}

impl BitOr for NodeUsage {
    type Output = NodeUsage;

    fn bitor(self, rhs: NodeUsage) -> NodeUsage {
        NodeUsage(self.0 | rhs.0)
    }
}

impl fmt::Display for NodeUsage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        const NAMES: [(NodeUsage, &str); 4] = [
            (NodeUsage::PRE_PROCESS, "PreProcess"),
            (NodeUsage::IDENTIFICATION, "Identification"),
            (NodeUsage::PROCESS, "Process"),
            (NodeUsage::POST_PROCESS, "PostProcess"),
        ];
        let names: Vec<&str> = NAMES
            .iter()
            .filter(|(flag, _)| self.contains(*flag))
            .map(|(_, name)| *name)
            .collect();
        if names.is_empty() {
            f.write_str("None")
        } else {
            f.write_str(&names.join("|"))
        }
    }
}

// ---------------------------------------------------------------------------
// NodeType: registration candidate
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Instancing {
    /// One instance for the whole process, created on first use.
    Shared,
    /// A fresh instance for every graph node that references the type.
    Exclusive,
}

pub type NodeFactory = Arc<dyn Fn() -> Arc<dyn Node> + Send + Sync>;

/// A node implementation offered to the registry together with its metadata.
///
/// Metadata left unset makes the candidate invalid; the registry rejects it at
/// load time.
#[derive(Clone)]
pub struct NodeType {
    name: String,
    type_id: Option<String>,
    usage: Option<NodeUsage>,
    instancing: Option<Instancing>,
    priority: i32,
    factory: NodeFactory,
}

impl NodeType {
    pub fn new<N, F>(name: impl Into<String>, factory: F) -> Self
    where
        N: Node + 'static,
        F: Fn() -> N + Send + Sync + 'static,
    {
        Self {
            name: name.into(),
            type_id: None,
            usage: None,
            instancing: None,
            priority: 0,
            factory: Arc::new(move || Arc::new(factory()) as Arc<dyn Node>),
        }
    }

    pub fn type_id(mut self, type_id: impl Into<String>) -> Self {
        self.type_id = Some(type_id.into());
        self
    }

    pub fn usage(mut self, usage: NodeUsage) -> Self {
        self.usage = Some(usage);
        self
    }

    pub fn shared(mut self) -> Self {
        self.instancing = Some(Instancing::Shared);
        self
    }

    pub fn exclusive(mut self) -> Self {
        self.instancing = Some(Instancing::Exclusive);
        self
    }

    pub fn priority(mut self, priority: i32) -> Self {
        self.priority = priority;
        self
    }

    /// Implementation name used in load diagnostics.
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Complete characteristics, or the list of missing metadata fields.
    pub(crate) fn characteristics(&self) -> std::result::Result<NodeCharacteristics, Vec<&'static str>> {
        let mut missing = Vec::new();
        let type_id = self
            .type_id
            .as_ref()
            .filter(|id| !id.trim().is_empty());
        if type_id.is_none() {
            missing.push("type id");
        }
        let usage = self.usage.filter(|u| !u.is_empty());
        if usage.is_none() {
            missing.push("usage");
        }
        if self.instancing.is_none() {
            missing.push("instancing");
        }
        match (type_id, usage, self.instancing) {
            (Some(type_id), Some(usage), Some(instancing)) => Ok(NodeCharacteristics {
                type_id: type_id.clone(),
                usage,
                instancing,
                priority: self.priority,
            }),
            _ => Err(missing),
        }
    }

    pub(crate) fn factory(&self) -> NodeFactory {
        Arc::clone(&self.factory)
    }
}

impl fmt::Debug for NodeType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("NodeType")
            .field("name", &self.name)
            .field("type_id", &self.type_id)
            .field("usage", &self.usage)
            .field("instancing", &self.instancing)
            .field("priority", &self.priority)
            .finish()
    }
}

/// Validated metadata of a registered node type.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NodeCharacteristics {
    pub type_id: String,
    pub usage: NodeUsage,
    pub instancing: Instancing,
    pub priority: i32,
}

#[cfg(test)]
mod tests {
    use super::*;

    struct Noop;

    #[async_trait]
    impl Node for Noop {
        fn inputs(&self) -> &[Property] {
            &[]
        }

        fn outputs(&self) -> &[Property] {
            &[]
        }

        async fn process(&self, _inputs: &ValueMap, _cancel: &CancellationToken) -> Result<ExecutionResult> {
            Ok(ExecutionResult::success(ValueMap::new()))
        }
    }

    #[test]
    fn usage_flags_combine() {
        let usage = NodeUsage::PRE_PROCESS | NodeUsage::POST_PROCESS;
        assert!(usage.contains(NodeUsage::PRE_PROCESS));
        assert!(!usage.contains(NodeUsage::PROCESS));
        assert!(usage.intersects(NodeUsage::POST_PROCESS | NodeUsage::PROCESS));
        assert_eq!(usage.to_string(), "PreProcess|PostProcess");
        assert_eq!(NodeUsage::NONE.to_string(), "None");
    }

    #[test]
    fn complete_candidate_has_characteristics() {
        let candidate = NodeType::new("noop", || Noop)
            .type_id("Noop")
            .usage(NodeUsage::ALL)
            .exclusive()
            .priority(3);
        let c = candidate.characteristics().unwrap();
        assert_eq!(c.type_id, "Noop");
        assert_eq!(c.instancing, Instancing::Exclusive);
        assert_eq!(c.priority, 3);
    }

    #[test]
    fn incomplete_candidate_lists_missing_fields() {
        let missing = NodeType::new("noop", || Noop)
            .usage(NodeUsage::NONE)
            .characteristics()
            .unwrap_err();
        assert_eq!(missing, vec!["type id", "usage", "instancing"]);
    }

    #[test]
    fn factory_builds_nodes() {
        let candidate = NodeType::new("noop", || Noop);
        let node = (candidate.factory())();
        assert!(node.inputs().is_empty());
    }
}
