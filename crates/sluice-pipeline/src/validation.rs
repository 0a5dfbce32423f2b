//! Workflow validation: lint rules and diagnostics.
//!
//! Checks a [`WorkflowDescription`] against a [`NodeRegistry`] without running
//! anything. Call [`validate`] for advisory diagnostics or
//! [`validate_or_raise`] to fail when any `Error`-severity issue is found.

use std::collections::{HashSet, VecDeque};
use std::fmt;

use sluice_document::{GraphDescription, NodeDescription, WorkflowDescription};
use sluice_types::{Result, SluiceError};

use crate::descriptor;
use crate::engine::EXPORT_TYPE_ID;
use crate::node::NodeUsage;
use crate::registry::NodeRegistry;
use crate::workflow::graph_usages;

// ---------------------------------------------------------------------------
// Diagnostic types
// ---------------------------------------------------------------------------

#[derive(Debug, Clone)]
pub struct Diagnostic {
    pub rule: String,
    pub severity: Severity,
    pub message: String,
    pub graph: String,
    pub node_id: Option<String>,
    pub fix: Option<String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Severity {
    Error,
    Warning,
}

impl fmt::Display for Diagnostic {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let level = match self.severity {
            Severity::Error => "error",
            Severity::Warning => "warning",
        };
        write!(f, "{level}[{}] {}: {}", self.rule, self.graph, self.message)?;
        if let Some(fix) = &self.fix {
            write!(f, " (fix: {fix})")?;
        }
        Ok(())
    }
}

// ---------------------------------------------------------------------------
// LintRule trait
// ---------------------------------------------------------------------------

/// One graph of the workflow as seen by a lint rule.
pub struct GraphContext<'a> {
    pub label: &'static str,
    pub graph: &'a GraphDescription,
    pub usage: NodeUsage,
    pub registry: &'a NodeRegistry,
}

impl GraphContext<'_> {
    fn diagnostic(
        &self,
        rule: &dyn LintRule,
        severity: Severity,
        node: Option<&NodeDescription>,
        message: String,
        fix: Option<String>,
    ) -> Diagnostic {
        Diagnostic {
            rule: rule.name().into(),
            severity,
            message,
            graph: self.label.into(),
            node_id: node.map(|n| n.id.clone()),
            fix,
        }
    }

    /// Nodes that refer to a registered type, skipping `Export`.
    fn typed_nodes(&self) -> impl Iterator<Item = &NodeDescription> {
        self.graph
            .nodes
            .iter()
            .filter(|n| n.type_id != EXPORT_TYPE_ID && self.registry.has(&n.type_id))
    }
}

pub trait LintRule: Send + Sync {
    fn name(&self) -> &str;
    fn apply(&self, ctx: &GraphContext<'_>) -> Vec<Diagnostic>;
}

// ---------------------------------------------------------------------------
// Rules
// ---------------------------------------------------------------------------

struct UniqueIdsRule;
impl LintRule for UniqueIdsRule {
    fn name(&self) -> &str { "unique_ids" }
    fn apply(&self, ctx: &GraphContext<'_>) -> Vec<Diagnostic> {
        let mut seen = HashSet::new();
        ctx.graph
            .nodes
            .iter()
            .filter(|n| !seen.insert(n.id.as_str()))
            .map(|n| {
                ctx.diagnostic(
                    self,
                    Severity::Error,
                    Some(n),
                    format!("Node ID '{}' is used more than once", n.id),
                    Some("Give every node in a graph its own ID".into()),
                )
            })
            .collect()
    }
}

struct KnownTypeRule;
impl LintRule for KnownTypeRule {
    fn name(&self) -> &str { "known_type" }
    fn apply(&self, ctx: &GraphContext<'_>) -> Vec<Diagnostic> {
        ctx.graph
            .nodes
            .iter()
            .filter(|n| n.type_id != EXPORT_TYPE_ID && !ctx.registry.has(&n.type_id))
            .map(|n| {
                ctx.diagnostic(
                    self,
                    Severity::Error,
                    Some(n),
                    format!("Node '{}' references unknown type '{}'", n.id, n.type_id),
                    Some(format!("Use one of: {}", ctx.registry.type_ids().join(", "))),
                )
            })
            .collect()
    }
}

struct UsageEligibleRule;
impl LintRule for UsageEligibleRule {
    fn name(&self) -> &str { "usage_eligible" }
    fn apply(&self, ctx: &GraphContext<'_>) -> Vec<Diagnostic> {
        ctx.typed_nodes()
            .filter_map(|n| {
                let c = ctx.registry.characteristics(&n.type_id)?;
                if c.usage.intersects(ctx.usage) {
                    return None;
                }
                Some(ctx.diagnostic(
                    self,
                    Severity::Error,
                    Some(n),
                    format!(
                        "Node '{}' of type '{}' may only be used in {}",
                        n.id, n.type_id, c.usage
                    ),
                    None,
                ))
            })
            .collect()
    }
}

struct ConnectionTargetRule;
impl LintRule for ConnectionTargetRule {
    fn name(&self) -> &str { "connection_target_exists" }
    fn apply(&self, ctx: &GraphContext<'_>) -> Vec<Diagnostic> {
        let mut diagnostics = Vec::new();
        for node in &ctx.graph.nodes {
            for (key, target) in &node.connections {
                if !target.is_empty() && ctx.graph.node(target).is_none() {
                    diagnostics.push(ctx.diagnostic(
                        self,
                        Severity::Error,
                        Some(node),
                        format!("Connection '{key}' of node '{}' targets unknown node '{target}'", node.id),
                        Some(format!("Add node '{target}' or leave the target empty to end the branch")),
                    ));
                }
            }
        }
        diagnostics
    }
}

struct DescriptorSyntaxRule;
impl LintRule for DescriptorSyntaxRule {
    fn name(&self) -> &str { "descriptor_syntax" }
    fn apply(&self, ctx: &GraphContext<'_>) -> Vec<Diagnostic> {
        let mut diagnostics = Vec::new();
        for node in &ctx.graph.nodes {
            for (property, text) in &node.inputs {
                if let Err(err) = descriptor::tokenize(text) {
                    diagnostics.push(ctx.diagnostic(
                        self,
                        Severity::Error,
                        Some(node),
                        format!("Input '{property}' of node '{}': {err}", node.id),
                        Some("Write literal braces as '{{' and '}}'".into()),
                    ));
                }
            }
        }
        diagnostics
    }
}

struct ReachabilityRule;
impl LintRule for ReachabilityRule {
    fn name(&self) -> &str { "reachability" }
    fn apply(&self, ctx: &GraphContext<'_>) -> Vec<Diagnostic> {
        let Some(head) = ctx.graph.head() else {
            return vec![];
        };

        let mut visited = HashSet::new();
        let mut queue = VecDeque::new();
        visited.insert(head.id.as_str());
        queue.push_back(head);

        while let Some(current) = queue.pop_front() {
            for target in current.connections.values() {
                if let Some(next) = ctx.graph.node(target) {
                    if visited.insert(next.id.as_str()) {
                        queue.push_back(next);
                    }
                }
            }
        }

        ctx.graph
            .nodes
            .iter()
            .filter(|n| !visited.contains(n.id.as_str()))
            .map(|n| {
                ctx.diagnostic(
                    self,
                    Severity::Warning,
                    Some(n),
                    format!("Node '{}' is not reachable from the head node '{}'", n.id, head.id),
                    Some(format!("Connect a reachable node to '{}' or remove it", n.id)),
                )
            })
            .collect()
    }
}

struct InputBindingsRule;
impl LintRule for InputBindingsRule {
    fn name(&self) -> &str { "input_bindings" }
    fn apply(&self, ctx: &GraphContext<'_>) -> Vec<Diagnostic> {
        let mut diagnostics = Vec::new();
        for node in ctx.typed_nodes() {
            let Some(instance) = ctx.registry.get_instance(&node.type_id) else {
                continue;
            };
            let declared: HashSet<&str> = instance.inputs().iter().map(|p| p.name()).collect();
            for name in node.inputs.keys().filter(|k| !declared.contains(k.as_str())) {
                diagnostics.push(ctx.diagnostic(
                    self,
                    Severity::Warning,
                    Some(node),
                    format!("Node '{}' binds input '{name}', which type '{}' does not declare", node.id, node.type_id),
                    None,
                ));
            }
            let produced: HashSet<&str> = instance.outputs().iter().map(|p| p.name()).collect();
            for name in node.outputs.keys().filter(|k| !produced.contains(k.as_str())) {
                diagnostics.push(ctx.diagnostic(
                    self,
                    Severity::Warning,
                    Some(node),
                    format!("Node '{}' binds output '{name}', which type '{}' does not declare", node.id, node.type_id),
                    None,
                ));
            }
        }
        diagnostics
    }
}

struct RequiredInputsRule;
impl LintRule for RequiredInputsRule {
    fn name(&self) -> &str { "required_inputs" }
    fn apply(&self, ctx: &GraphContext<'_>) -> Vec<Diagnostic> {
        let mut diagnostics = Vec::new();
        for node in ctx.typed_nodes() {
            let Some(instance) = ctx.registry.get_instance(&node.type_id) else {
                continue;
            };
            for property in instance.inputs().iter().filter(|p| p.is_required()) {
                let bound = node
                    .inputs
                    .get(property.name())
                    .is_some_and(|d| !d.is_empty());
                if !bound {
                    diagnostics.push(ctx.diagnostic(
                        self,
                        Severity::Warning,
                        Some(node),
                        format!("Node '{}' does not bind required input '{}'", node.id, property.name()),
                        property
                            .usage_example()
                            .map(|e| format!("e.g. \"{}\": \"{e}\"", property.name())),
                    ));
                }
            }
        }
        diagnostics
    }
}

// ---------------------------------------------------------------------------
// Entry points
// ---------------------------------------------------------------------------

/// Run all lint rules over every graph of `workflow`.
pub fn validate(workflow: &WorkflowDescription, registry: &NodeRegistry) -> Vec<Diagnostic> {
    let rules: Vec<Box<dyn LintRule>> = vec![
        Box::new(UniqueIdsRule),
        Box::new(KnownTypeRule),
        Box::new(UsageEligibleRule),
        Box::new(ConnectionTargetRule),
        Box::new(DescriptorSyntaxRule),
        Box::new(ReachabilityRule),
        Box::new(InputBindingsRule),
        Box::new(RequiredInputsRule),
    ];

    let mut diagnostics = Vec::new();
    for (label, graph, usage) in graph_usages(workflow) {
        let ctx = GraphContext {
            label,
            graph,
            usage,
            registry,
        };
        for rule in &rules {
            diagnostics.extend(rule.apply(&ctx));
        }
    }
    diagnostics
}

/// Run all lint rules; return `Err` if any `Error`-severity diagnostic found.
pub fn validate_or_raise(workflow: &WorkflowDescription, registry: &NodeRegistry) -> Result<Vec<Diagnostic>> {
    let diagnostics = validate(workflow, registry);
    let errors: Vec<String> = diagnostics
        .iter()
        .filter(|d| d.severity == Severity::Error)
        .map(|d| format!("{}: {}", d.graph, d.message))
        .collect();
    if !errors.is_empty() {
        return Err(SluiceError::ValidationError(errors.join("; ")));
    }
    Ok(diagnostics)
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use crate::registry::default_registry;

    fn workflow_with_process(nodes: Vec<NodeDescription>) -> WorkflowDescription {
        let mut workflow = WorkflowDescription::default();
        workflow.process.process = GraphDescription::new(nodes);
        workflow
    }

    fn rules_hit(diagnostics: &[Diagnostic]) -> Vec<&str> {
        diagnostics.iter().map(|d| d.rule.as_str()).collect()
    }

    #[test]
    fn clean_workflow_has_no_diagnostics() {
        let workflow = workflow_with_process(vec![
            NodeDescription::new("copy", "CopyFile")
                .input("Source", "{Item}")
                .input("Destination", "/backup")
                .then("log"),
            NodeDescription::new("log", "Log").input("Message", "copied {Item}"),
        ]);
        let diagnostics = validate(&workflow, &default_registry());
        assert!(diagnostics.is_empty(), "{diagnostics:?}");
    }

    #[test]
    fn unknown_type_is_an_error() {
        let workflow = workflow_with_process(vec![NodeDescription::new("x", "Teleport")]);
        let diagnostics = validate(&workflow, &default_registry());
        assert_eq!(rules_hit(&diagnostics), vec!["known_type"]);
        assert_eq!(diagnostics[0].severity, Severity::Error);
        assert_eq!(diagnostics[0].graph, "ProcessGraph");
    }

    #[test]
    fn usage_outside_allowed_graphs_is_an_error() {
        let mut workflow = WorkflowDescription::default();
        workflow.process.identification = GraphDescription::new(vec![NodeDescription::new("c", "CopyFile")
            .input("Source", "a")
            .input("Destination", "b")]);
        let diagnostics = validate(&workflow, &default_registry());
        assert_eq!(rules_hit(&diagnostics), vec!["usage_eligible"]);
    }

    #[test]
    fn dangling_connection_and_unreachable_node() {
        let workflow = workflow_with_process(vec![
            NodeDescription::new("a", "Log").input("Message", "hi").then("ghost"),
            NodeDescription::new("b", "Log").input("Message", "orphan"),
        ]);
        let diagnostics = validate(&workflow, &default_registry());
        let rules = rules_hit(&diagnostics);
        assert!(rules.contains(&"connection_target_exists"));
        assert!(rules.contains(&"reachability"));
        let unreachable = diagnostics.iter().find(|d| d.rule == "reachability").unwrap();
        assert_eq!(unreachable.node_id.as_deref(), Some("b"));
        assert_eq!(unreachable.severity, Severity::Warning);
    }

    #[test]
    fn binding_and_required_warnings() {
        let workflow = workflow_with_process(vec![NodeDescription::new("log", "Log").input("Mesage", "typo")]);
        let diagnostics = validate(&workflow, &default_registry());
        let rules = rules_hit(&diagnostics);
        assert!(rules.contains(&"input_bindings"));
        assert!(rules.contains(&"required_inputs"));
        assert!(validate_or_raise(&workflow, &default_registry()).is_ok());
    }

    #[test]
    fn malformed_descriptor_is_an_error() {
        let workflow = workflow_with_process(vec![NodeDescription::new("log", "Log").input("Message", "{oops")]);
        let err = validate_or_raise(&workflow, &default_registry()).unwrap_err();
        assert!(err.to_string().contains("unterminated placeholder"));
    }

    #[test]
    fn duplicate_ids_are_errors() {
        let workflow = workflow_with_process(vec![
            NodeDescription::new("a", "Log").input("Message", "1").then("a"),
            NodeDescription::new("a", "Log").input("Message", "2"),
        ]);
        let diagnostics = validate(&workflow, &default_registry());
        assert_eq!(rules_hit(&diagnostics), vec!["unique_ids"]);
    }

    #[test]
    fn export_nodes_are_not_type_checked() {
        let mut workflow = WorkflowDescription::default();
        workflow.process.identification =
            GraphDescription::new(vec![NodeDescription::new("out", EXPORT_TYPE_ID).input("Items", "a;b")]);
        assert!(validate(&workflow, &default_registry()).is_empty());
    }

    #[test]
    fn diagnostic_display() {
        let d = Diagnostic {
            rule: "known_type".into(),
            severity: Severity::Error,
            message: "bad".into(),
            graph: "PreProcessGraph".into(),
            node_id: None,
            fix: Some("fix it".into()),
        };
        assert_eq!(d.to_string(), "error[known_type] PreProcessGraph: bad (fix: fix it)");
    }
}
