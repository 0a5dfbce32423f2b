//! Graph engine: the traversal loop over one graph description.

use std::collections::{HashMap, VecDeque};
use std::sync::Arc;
use std::time::Instant;

use tokio_util::sync::CancellationToken;

use sluice_document::{GraphDescription, NodeDescription, DEFAULT_CONNECTION};
use sluice_types::{ExecutionResult, Result, SluiceError, Value, ValueMap, ValueType};

use crate::environment::EnvMap;
use crate::events::{EventEmitter, PipelineEvent};
use crate::node::{Node, NodeUsage};
use crate::property::Property;
use crate::registry::NodeRegistry;
use crate::resolver::Resolver;

/// Reserved type id of the pseudo-node that publishes graph results.
pub const EXPORT_TYPE_ID: &str = "Export";

/// Step limit used when a phase does not configure `MaxDepth`.
pub const DEFAULT_MAX_DEPTH: usize = 1000;

/// Number of most recent node IDs kept for diagnostics.
pub const TRACE_CAPACITY: usize = 64;

enum Slot {
    Export,
    Node(Arc<dyn Node>),
}

// ---------------------------------------------------------------------------
// Trace
// ---------------------------------------------------------------------------

/// Ring buffer of visited node IDs.
#[derive(Debug, Default)]
struct Trace {
    ids: VecDeque<String>,
    dropped: usize,
}

impl Trace {
    fn push(&mut self, id: &str) {
        if self.ids.len() == TRACE_CAPACITY {
            self.ids.pop_front();
            self.dropped += 1;
        }
        self.ids.push_back(id.to_string());
    }

    fn render(&self) -> String {
        let path = self
            .ids
            .iter()
            .map(String::as_str)
            .collect::<Vec<_>>()
            .join(" -> ");
        if self.dropped > 0 {
            format!("... -> {path}")
        } else {
            path
        }
    }
}

// ---------------------------------------------------------------------------
// GraphProcessor
// ---------------------------------------------------------------------------

/// A graph description bound to node instances, ready to run.
pub struct GraphProcessor {
    name: String,
    instances: HashMap<String, Slot>,
    descriptions: HashMap<String, NodeDescription>,
    head: Option<String>,
    resolver: Arc<Resolver>,
    events: Option<EventEmitter>,
}

impl GraphProcessor {
    /// Bind every node of `description` to an instance from `registry`.
    ///
    /// Duplicate IDs, unknown type ids and types not eligible for `usage` are
    /// collected and reported together.
    pub fn build(
        name: impl Into<String>,
        description: &GraphDescription,
        registry: &NodeRegistry,
        usage: NodeUsage,
        resolver: Arc<Resolver>,
    ) -> Result<Self> {
        let name = name.into();
        let mut instances = HashMap::new();
        let mut descriptions = HashMap::new();
        let mut errors = Vec::new();

        for node in &description.nodes {
            if descriptions.contains_key(&node.id) {
                errors.push(format!("duplicate node ID '{}'", node.id));
                continue;
            }
            if node.type_id == EXPORT_TYPE_ID {
                instances.insert(node.id.clone(), Slot::Export);
            } else {
                match registry.characteristics(&node.type_id) {
                    None => errors.push(
                        SluiceError::UnknownNodeType {
                            node: node.id.clone(),
                            type_id: node.type_id.clone(),
                        }
                        .to_string(),
                    ),
                    Some(c) if !c.usage.intersects(usage) => errors.push(format!(
                        "node '{}' of type '{}' is not usable here (allowed in {}, graph requires {})",
                        node.id, node.type_id, c.usage, usage
                    )),
                    Some(_) => {
                        if let Some(instance) = registry.get_instance(&node.type_id) {
                            instances.insert(node.id.clone(), Slot::Node(instance));
                        }
                    }
                }
            }
            descriptions.insert(node.id.clone(), node.clone());
        }

        if !errors.is_empty() {
            return Err(SluiceError::ValidationError(format!(
                "{name}: {}",
                errors.join("; ")
            )));
        }

        tracing::debug!(graph = %name, nodes = descriptions.len(), "Built graph");
        Ok(Self {
            name,
            instances,
            descriptions,
            head: description.head().map(|n| n.id.clone()),
            resolver,
            events: None,
        })
    }

    pub fn with_events(mut self, events: EventEmitter) -> Self {
        self.events = Some(events);
        self
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn head(&self) -> Option<&str> {
        self.head.as_deref()
    }

    pub fn len(&self) -> usize {
        self.descriptions.len()
    }

    pub fn is_empty(&self) -> bool {
        self.descriptions.is_empty()
    }

    /// Walk the graph from its head.
    ///
    /// Node outputs are written into `runtime`. On success the result carries
    /// the values published by `Export` nodes and the visited path as message.
    /// Stops with 504 when more than `max_depth` nodes would run.
    pub async fn run(
        &self,
        env: &EnvMap,
        runtime: &mut ValueMap,
        max_depth: usize,
        cancel: &CancellationToken,
    ) -> ExecutionResult {
        let mut trace = Trace::default();
        let mut exports = ValueMap::new();
        let mut steps = 0usize;
        let mut active = self.head.as_deref().and_then(|id| self.descriptions.get(id));

        while let Some(node) = active {
            if steps >= max_depth {
                break;
            }
            if cancel.is_cancelled() {
                return cancelled(&self.name, &trace).with_outputs(exports);
            }
            trace.push(&node.id);

            let result = match self.instances.get(&node.id) {
                None => {
                    return fail(&self.name, &trace, SluiceError::NodeNotFound(node.id.clone()));
                }
                Some(Slot::Export) => match self.export(node, env, runtime) {
                    Ok(values) => {
                        exports.extend(values);
                        ExecutionResult::success(ValueMap::new())
                    }
                    Err(err) => return fail(&self.name, &trace, err),
                },
                Some(Slot::Node(instance)) => {
                    let result = self.invoke(node, instance.as_ref(), env, runtime, cancel).await;
                    if cancel.is_cancelled() {
                        return cancelled(&self.name, &trace).with_outputs(exports);
                    }
                    if !result.is_success() {
                        tracing::warn!(
                            graph = %self.name,
                            node = %node.id,
                            code = result.code(),
                            message = result.message(),
                            "Node failed"
                        );
                        return result;
                    }
                    self.assign_outputs(node, instance.as_ref(), &result, runtime);
                    result
                }
            };

            active = match self.next_node(node, result.outcome()) {
                Ok(next) => next,
                Err(err) => return fail(&self.name, &trace, err),
            };
            steps += 1;
        }

        if active.is_some() {
            return fail(&self.name, &trace, SluiceError::DepthExceeded { depth: max_depth });
        }
        ExecutionResult::success(exports).with_message(trace.render())
    }

    async fn invoke(
        &self,
        node: &NodeDescription,
        instance: &dyn Node,
        env: &EnvMap,
        runtime: &ValueMap,
        cancel: &CancellationToken,
    ) -> ExecutionResult {
        let inputs = match self.resolve_inputs(node, instance, env, runtime) {
            Ok(inputs) => inputs,
            Err(err) => {
                tracing::warn!(graph = %self.name, node = %node.id, error = %err, "Input resolution failed");
                return ExecutionResult::from_error(&err);
            }
        };

        let started = Instant::now();
        tracing::debug!(graph = %self.name, node = %node.id, type_id = %node.type_id, "Running node");
        let result = match instance.process(&inputs, cancel).await {
            Ok(result) => result,
            Err(err) => {
                tracing::error!(graph = %self.name, node = %node.id, error = %err, "Node raised a fault");
                ExecutionResult::from_error(&err)
            }
        };

        if let Some(events) = &self.events {
            events.emit(PipelineEvent::NodeCompleted {
                graph: self.name.clone(),
                node_id: node.id.clone(),
                type_id: node.type_id.clone(),
                code: result.code(),
                duration_ms: started.elapsed().as_millis() as u64,
            });
        }
        result
    }

    fn resolve_inputs(
        &self,
        node: &NodeDescription,
        instance: &dyn Node,
        env: &EnvMap,
        runtime: &ValueMap,
    ) -> Result<ValueMap> {
        let mut inputs = ValueMap::new();
        for property in instance.inputs() {
            let descriptor = node
                .inputs
                .get(property.name())
                .map(String::as_str)
                .unwrap_or("");
            let value = self
                .resolver
                .resolve_descriptor(descriptor, property, env, runtime)?;
            inputs.insert(property.name().to_string(), value);
        }
        Ok(inputs)
    }

    fn assign_outputs(
        &self,
        node: &NodeDescription,
        instance: &dyn Node,
        result: &ExecutionResult,
        runtime: &mut ValueMap,
    ) {
        for property in instance.outputs() {
            let Some(variable) = node.outputs.get(property.name()) else {
                continue;
            };
            if variable.is_empty() {
                continue;
            }
            match result.output(property.name()) {
                Some(value) => {
                    runtime.insert(variable.clone(), value.clone());
                }
                None => tracing::debug!(
                    node = %node.id,
                    output = property.name(),
                    "Output not produced, variable left unset"
                ),
            }
        }
    }

    /// Resolve every input of an `Export` node without type constraints.
    fn export(&self, node: &NodeDescription, env: &EnvMap, runtime: &ValueMap) -> Result<ValueMap> {
        let mut values = ValueMap::new();
        for (name, descriptor) in &node.inputs {
            let property = Property::new(name.clone(), ValueType::Any);
            let value: Value = self
                .resolver
                .resolve_descriptor(descriptor, &property, env, runtime)?;
            values.insert(name.clone(), value);
        }
        Ok(values)
    }

    fn next_node(&self, node: &NodeDescription, outcome: Option<&str>) -> Result<Option<&NodeDescription>> {
        if node.connections.is_empty() {
            return Ok(None);
        }
        let key = outcome.unwrap_or(DEFAULT_CONNECTION);
        let target = node
            .connections
            .get(key)
            .ok_or_else(|| SluiceError::NoMatchingConnection {
                node: node.id.clone(),
                key: key.to_string(),
            })?;
        if target.is_empty() {
            return Ok(None);
        }
        self.descriptions
            .get(target)
            .map(Some)
            .ok_or_else(|| SluiceError::DanglingConnection {
                node: node.id.clone(),
                target: target.clone(),
            })
    }
}

fn fail(graph: &str, trace: &Trace, err: SluiceError) -> ExecutionResult {
    tracing::warn!(graph, error = %err, path = %trace.render(), "Graph run aborted");
    ExecutionResult::from_error(&err)
}

fn cancelled(graph: &str, trace: &Trace) -> ExecutionResult {
    tracing::info!(graph, path = %trace.render(), "Graph run cancelled");
    ExecutionResult::cancelled(format!("{graph} cancelled"))
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use crate::node::NodeType;
    use crate::registry::default_registry;
    use async_trait::async_trait;
    use sluice_types::codes;
    use std::sync::atomic::{AtomicUsize, Ordering};

    /// Counts invocations and reports the outcome given as input.
    struct Step {
        calls: Arc<AtomicUsize>,
        inputs: Vec<Property>,
        outputs: Vec<Property>,
    }

    impl Step {
        fn new(calls: Arc<AtomicUsize>) -> Self {
            Self {
                calls,
                inputs: vec![Property::new("Outcome", ValueType::String)],
                outputs: vec![Property::new("Count", ValueType::Int)],
            }
        }
    }

    #[async_trait]
    impl Node for Step {
        fn inputs(&self) -> &[Property] {
            &self.inputs
        }

        fn outputs(&self) -> &[Property] {
            &self.outputs
        }

        async fn process(&self, inputs: &ValueMap, _cancel: &CancellationToken) -> Result<ExecutionResult> {
            let count = self.calls.fetch_add(1, Ordering::SeqCst) + 1;
            let mut outputs = ValueMap::new();
            outputs.insert("Count".into(), Value::Int(count as i64));
            let result = ExecutionResult::success(outputs);
            Ok(match inputs.get("Outcome").and_then(Value::as_str) {
                Some(key) => result.with_outcome(key),
                None => result,
            })
        }
    }

    struct Fault;

    #[async_trait]
    impl Node for Fault {
        fn inputs(&self) -> &[Property] {
            &[]
        }

        fn outputs(&self) -> &[Property] {
            &[]
        }

        async fn process(&self, _inputs: &ValueMap, _cancel: &CancellationToken) -> Result<ExecutionResult> {
            Err(SluiceError::NodeError {
                node: "Fault".into(),
                message: "boom".into(),
            })
        }
    }

    fn registry(calls: &Arc<AtomicUsize>) -> NodeRegistry {
        let calls = Arc::clone(calls);
        let mut registry = NodeRegistry::new();
        registry
            .load([
                NodeType::new("step", move || Step::new(Arc::clone(&calls)))
                    .type_id("Step")
                    .usage(NodeUsage::ALL)
                    .shared(),
                NodeType::new("fault", || Fault)
                    .type_id("Fault")
                    .usage(NodeUsage::ALL)
                    .shared(),
                NodeType::new("pre-only", || Fault)
                    .type_id("PreOnly")
                    .usage(NodeUsage::PRE_PROCESS)
                    .shared(),
            ])
            .unwrap();
        registry
    }

    fn build(nodes: Vec<NodeDescription>, registry: &NodeRegistry) -> GraphProcessor {
        GraphProcessor::build(
            "TestGraph",
            &GraphDescription::new(nodes),
            registry,
            NodeUsage::PROCESS,
            Arc::new(Resolver::default()),
        )
        .unwrap()
    }

    async fn run(graph: &GraphProcessor, runtime: &mut ValueMap, max_depth: usize) -> ExecutionResult {
        graph
            .run(&EnvMap::new(), runtime, max_depth, &CancellationToken::new())
            .await
    }

    #[tokio::test]
    async fn linear_graph_runs_to_end() {
        let calls = Arc::new(AtomicUsize::new(0));
        let reg = registry(&calls);
        let graph = build(
            vec![
                NodeDescription::new("a", "Step").then("b"),
                NodeDescription::new("b", "Step").output("Count", "total"),
            ],
            &reg,
        );
        let mut runtime = ValueMap::new();
        let result = run(&graph, &mut runtime, DEFAULT_MAX_DEPTH).await;
        assert!(result.is_success(), "{}", result.message());
        assert_eq!(result.message(), "a -> b");
        assert_eq!(runtime.get("total"), Some(&Value::Int(2)));
    }

    #[tokio::test]
    async fn empty_graph_succeeds() {
        let reg = default_registry();
        let graph = build(vec![], &reg);
        let result = run(&graph, &mut ValueMap::new(), 10).await;
        assert!(result.is_success());
        assert!(result.outputs().is_empty());
    }

    #[tokio::test]
    async fn outcome_selects_connection() {
        let calls = Arc::new(AtomicUsize::new(0));
        let reg = registry(&calls);
        let graph = build(
            vec![
                NodeDescription::new("a", "Step")
                    .input("Outcome", "Skipped")
                    .then("b")
                    .connect("Skipped", "c"),
                NodeDescription::new("b", "Fault"),
                NodeDescription::new("c", "Step"),
            ],
            &reg,
        );
        let result = run(&graph, &mut ValueMap::new(), 10).await;
        assert!(result.is_success());
        assert_eq!(result.message(), "a -> c");
    }

    #[tokio::test]
    async fn missing_outcome_key_is_404() {
        let calls = Arc::new(AtomicUsize::new(0));
        let reg = registry(&calls);
        let graph = build(
            vec![
                NodeDescription::new("a", "Step")
                    .input("Outcome", "Other")
                    .then("b"),
                NodeDescription::new("b", "Step"),
            ],
            &reg,
        );
        let result = run(&graph, &mut ValueMap::new(), 10).await;
        assert_eq!(result.code(), codes::NOT_FOUND);
        assert!(result.message().contains("no connection for outcome 'Other'"));
    }

    #[tokio::test]
    async fn dangling_connection_is_404() {
        let calls = Arc::new(AtomicUsize::new(0));
        let reg = registry(&calls);
        let graph = build(vec![NodeDescription::new("a", "Step").then("ghost")], &reg);
        let result = run(&graph, &mut ValueMap::new(), 10).await;
        assert_eq!(result.code(), codes::NOT_FOUND);
        assert!(result.message().contains("ghost"));
    }

    #[derive(Clone, Default)]
    struct CapturedLog(Arc<std::sync::Mutex<Vec<u8>>>);

    impl std::io::Write for CapturedLog {
        fn write(&mut self, buf: &[u8]) -> std::io::Result<usize> {
            self.0.lock().unwrap().extend_from_slice(buf);
            Ok(buf.len())
        }

        fn flush(&mut self) -> std::io::Result<()> {
            Ok(())
        }
    }

    #[tokio::test]
    async fn abort_log_names_the_graph() {
        let log = CapturedLog::default();
        let writer = log.clone();
        let subscriber = tracing_subscriber::fmt()
            .with_writer(move || writer.clone())
            .with_ansi(false)
            .finish();
        let _guard = tracing::subscriber::set_default(subscriber);

        let calls = Arc::new(AtomicUsize::new(0));
        let reg = registry(&calls);
        let graph = build(vec![NodeDescription::new("a", "Step").then("ghost")], &reg);
        let result = run(&graph, &mut ValueMap::new(), 10).await;
        assert_eq!(result.code(), codes::NOT_FOUND);

        let text = String::from_utf8(log.0.lock().unwrap().clone()).unwrap();
        let line = text
            .lines()
            .find(|l| l.contains("Graph run aborted"))
            .unwrap_or_else(|| panic!("no abort line in {text}"));
        assert!(line.contains("TestGraph"), "{line}");
    }

    #[tokio::test]
    async fn empty_target_ends_branch() {
        let calls = Arc::new(AtomicUsize::new(0));
        let reg = registry(&calls);
        let graph = build(
            vec![
                NodeDescription::new("a", "Step").then(""),
                NodeDescription::new("b", "Fault"),
            ],
            &reg,
        );
        let result = run(&graph, &mut ValueMap::new(), 10).await;
        assert!(result.is_success());
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn cycle_stops_at_max_depth() {
        let calls = Arc::new(AtomicUsize::new(0));
        let reg = registry(&calls);
        let graph = build(
            vec![
                NodeDescription::new("a", "Step").then("b"),
                NodeDescription::new("b", "Step").then("a"),
            ],
            &reg,
        );
        let result = run(&graph, &mut ValueMap::new(), 5).await;
        assert_eq!(result.code(), codes::DEPTH_EXCEEDED);
        assert_eq!(calls.load(Ordering::SeqCst), 5);
    }

    #[tokio::test]
    async fn node_fault_becomes_failure_result() {
        let calls = Arc::new(AtomicUsize::new(0));
        let reg = registry(&calls);
        let graph = build(
            vec![
                NodeDescription::new("a", "Fault").then("b"),
                NodeDescription::new("b", "Step"),
            ],
            &reg,
        );
        let result = run(&graph, &mut ValueMap::new(), 10).await;
        assert_eq!(result.code(), codes::FAULT);
        assert!(result.message().contains("boom"));
        assert_eq!(calls.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn unresolvable_input_is_422() {
        let calls = Arc::new(AtomicUsize::new(0));
        let reg = registry(&calls);
        let graph = build(vec![NodeDescription::new("a", "Step").input("Outcome", "{missing}")], &reg);
        let result = run(&graph, &mut ValueMap::new(), 10).await;
        assert_eq!(result.code(), codes::UNRESOLVABLE);
        assert_eq!(calls.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn export_publishes_untyped_values() {
        let calls = Arc::new(AtomicUsize::new(0));
        let reg = registry(&calls);
        let graph = build(
            vec![
                NodeDescription::new("a", "Step").output("Count", "n").then("out"),
                NodeDescription::new("out", EXPORT_TYPE_ID)
                    .input("Count", "{n}")
                    .input("Label", "run-{n}"),
            ],
            &reg,
        );
        let result = run(&graph, &mut ValueMap::new(), 10).await;
        assert!(result.is_success());
        assert_eq!(result.output("Count"), Some(&Value::Int(1)));
        assert_eq!(result.output("Label"), Some(&Value::from("run-1")));
    }

    #[tokio::test]
    async fn cancelled_token_stops_before_next_node() {
        let calls = Arc::new(AtomicUsize::new(0));
        let reg = registry(&calls);
        let graph = build(vec![NodeDescription::new("a", "Step")], &reg);
        let token = CancellationToken::new();
        token.cancel();
        let result = graph.run(&EnvMap::new(), &mut ValueMap::new(), 10, &token).await;
        assert!(result.is_cancelled());
        assert_eq!(calls.load(Ordering::SeqCst), 0);
    }

    #[test]
    fn build_aggregates_configuration_errors() {
        let calls = Arc::new(AtomicUsize::new(0));
        let reg = registry(&calls);
        let err = GraphProcessor::build(
            "Bad",
            &GraphDescription::new(vec![
                NodeDescription::new("a", "Nope"),
                NodeDescription::new("b", "PreOnly"),
                NodeDescription::new("b", "Step"),
            ]),
            &reg,
            NodeUsage::PROCESS,
            Arc::new(Resolver::default()),
        )
        .err()
        .unwrap();
        let message = err.to_string();
        assert!(message.contains("unknown type 'Nope'"), "{message}");
        assert!(message.contains("'b' of type 'PreOnly' is not usable"), "{message}");
        assert!(message.contains("duplicate node ID 'b'"), "{message}");
        assert_eq!(err.result_code(), codes::INVALID);
    }

    #[test]
    fn trace_keeps_most_recent_ids() {
        let mut trace = Trace::default();
        for i in 0..(TRACE_CAPACITY + 2) {
            trace.push(&format!("n{i}"));
        }
        let rendered = trace.render();
        assert!(rendered.starts_with("... -> n2 -> "));
        assert!(rendered.ends_with(&format!("n{}", TRACE_CAPACITY + 1)));
    }
}
