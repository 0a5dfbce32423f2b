//! Workflow orchestration: pre-process, main and post-process phases.
//!
//! The main phase runs its identification graph, takes the exported `Items`
//! and runs the per-item graph once for each of them, optionally repeating
//! the whole pass in watch mode until interrupted.

use std::sync::Arc;
use std::time::{Duration, Instant};

use async_trait::async_trait;
use tokio_util::sync::CancellationToken;
use tracing::Instrument;
use uuid::Uuid;

use sluice_document::{GraphDescription, PipelineDocument, WorkflowDescription};
use sluice_types::{ExecutionResult, Result, SluiceError, Value, ValueMap, ValueType};

use crate::cancel::{CancelScope, CancellationStack};
use crate::convert::LIST_SEPARATOR;
use crate::engine::{GraphProcessor, DEFAULT_MAX_DEPTH};
use crate::environment::{EnvMap, EnvironmentLayers};
use crate::events::{EventEmitter, PipelineEvent};
use crate::node::NodeUsage;
use crate::property::Property;
use crate::registry::NodeRegistry;
use crate::resolver::Resolver;

/// Export of the identification graph holding the item identifiers.
pub const ITEMS_EXPORT: &str = "Items";

/// Runtime variable carrying the current item in the per-item graph.
pub const ITEM_VARIABLE: &str = "Item";

/// Every graph of a workflow with its label and the node usage it admits.
pub fn graph_usages(workflow: &WorkflowDescription) -> [(&'static str, &GraphDescription, NodeUsage); 4] {
    let [pre, ident, process, post] = workflow.graphs();
    [
        (pre.0, pre.1, NodeUsage::PRE_PROCESS),
        (ident.0, ident.1, NodeUsage::IDENTIFICATION),
        (process.0, process.1, NodeUsage::PROCESS),
        (post.0, post.1, NodeUsage::POST_PROCESS),
    ]
}

// ---------------------------------------------------------------------------
// PhaseSettings
// ---------------------------------------------------------------------------

/// Per-phase knobs read from the phase's layered environment.
#[derive(Debug, Clone, PartialEq)]
pub struct PhaseSettings {
    pub max_depth: usize,
    pub watch: bool,
    pub watch_interval: Duration,
    pub propagate_failure: bool,
}

impl Default for PhaseSettings {
    fn default() -> Self {
        Self {
            max_depth: DEFAULT_MAX_DEPTH,
            watch: false,
            watch_interval: Duration::from_millis(5000),
            propagate_failure: true,
        }
    }
}

impl PhaseSettings {
    pub fn properties() -> [Property; 4] {
        [
            Property::new("MaxDepth", ValueType::Int)
                .describe("Maximum number of nodes a single graph run may execute")
                .default_value(Value::Int(DEFAULT_MAX_DEPTH as i64)),
            Property::new("Watch", ValueType::Bool)
                .describe("Repeat the main phase until interrupted")
                .default_value(false),
            Property::new("WatchInterval", ValueType::Int)
                .describe("Milliseconds to wait between watch passes")
                .default_value(Value::Int(5000)),
            Property::new("PropagateFailure", ValueType::Bool)
                .describe("Abort the phase when one item fails")
                .default_value(true),
        ]
    }

    pub fn resolve(resolver: &Resolver, env: &EnvMap) -> Result<Self> {
        let [max_depth, watch, interval, propagate] = Self::properties();
        let non_negative = |property: &Property| -> Result<u64> {
            let value = resolver.resolve_from_environment(property, env)?;
            value
                .as_int()
                .and_then(|n| u64::try_from(n).ok())
                .ok_or_else(|| {
                    SluiceError::ValidationError(format!(
                        "{} must be a non-negative integer, got '{}'",
                        property.name(),
                        value
                    ))
                })
        };
        let flag = |property: &Property| -> Result<bool> {
            let value = resolver.resolve_from_environment(property, env)?;
            Ok(value.as_bool().unwrap_or(false))
        };

        Ok(Self {
            max_depth: non_negative(&max_depth)? as usize,
            watch: flag(&watch)?,
            watch_interval: Duration::from_millis(non_negative(&interval)?),
            propagate_failure: flag(&propagate)?,
        })
    }
}

// ---------------------------------------------------------------------------
// Phases
// ---------------------------------------------------------------------------

#[async_trait]
pub trait Phase: Send + Sync {
    fn name(&self) -> &str;

    /// Run the phase on a copy of `runtime`. A successful result carries the
    /// values the phase exports.
    async fn run(&self, runtime: &ValueMap) -> ExecutionResult;
}

/// A phase that runs one graph once.
struct GraphPhase {
    name: &'static str,
    graph: GraphProcessor,
    env: EnvMap,
    settings: PhaseSettings,
    stack: Arc<CancellationStack>,
}

#[async_trait]
impl Phase for GraphPhase {
    fn name(&self) -> &str {
        self.name
    }

    async fn run(&self, runtime: &ValueMap) -> ExecutionResult {
        if self.graph.is_empty() {
            return ExecutionResult::success(ValueMap::new());
        }
        let scope = self.stack.enter(&[]);
        let mut working = runtime.clone();
        let result = self
            .graph
            .run(&self.env, &mut working, self.settings.max_depth, scope.token())
            .await;
        self.stack.leave(&scope);
        result
    }
}

/// Identification followed by one per-item run for each identified item.
struct MainPhase {
    identification: GraphProcessor,
    process: GraphProcessor,
    identification_env: EnvMap,
    process_env: EnvMap,
    settings: PhaseSettings,
    stack: Arc<CancellationStack>,
    events: EventEmitter,
}

#[async_trait]
impl Phase for MainPhase {
    fn name(&self) -> &str {
        "Process"
    }

    async fn run(&self, runtime: &ValueMap) -> ExecutionResult {
        // Item runs use the phase scope. In watch mode a watch scope sits on
        // top of it, so the first interrupt only stops the repetition.
        let phase_scope = self.stack.enter(&[]);
        let watch_scope = self.settings.watch.then(|| self.stack.enter(&[]));
        let result = self.run_passes(runtime, &phase_scope, watch_scope.as_ref()).await;
        if let Some(scope) = &watch_scope {
            self.stack.leave(scope);
        }
        self.stack.leave(&phase_scope);
        result
    }
}

impl MainPhase {
    async fn run_passes(
        &self,
        runtime: &ValueMap,
        phase_scope: &CancelScope,
        watch_scope: Option<&CancelScope>,
    ) -> ExecutionResult {
        let mut pass = 0usize;
        loop {
            pass += 1;
            let exports = match self.run_pass(runtime, phase_scope.token(), pass).await {
                Ok(exports) => exports,
                Err(result) => return result,
            };

            let Some(watch_scope) = watch_scope else {
                return ExecutionResult::success(exports);
            };
            if !watch_scope.is_cancelled() {
                let interval_ms = self.settings.watch_interval.as_millis() as u64;
                self.events.emit(PipelineEvent::WatchSleeping { interval_ms });
                tracing::debug!(pass, interval_ms, "Watching for new items");
                tokio::select! {
                    _ = tokio::time::sleep(self.settings.watch_interval) => continue,
                    _ = watch_scope.cancelled() => {}
                }
            }

            if phase_scope.is_cancelled() {
                return ExecutionResult::cancelled("Process phase cancelled").with_outputs(exports);
            }
            tracing::info!(passes = pass, "Watch stopped");
            return ExecutionResult::success(exports);
        }
    }

    /// One identification run plus the item runs. `Err` carries the result
    /// that ends the phase.
    async fn run_pass(
        &self,
        runtime: &ValueMap,
        token: &CancellationToken,
        pass: usize,
    ) -> std::result::Result<ValueMap, ExecutionResult> {
        let max_depth = self.settings.max_depth;
        let mut working = runtime.clone();
        let identified = self
            .identification
            .run(&self.identification_env, &mut working, max_depth, token)
            .await;
        if !identified.is_success() {
            return Err(identified);
        }

        let mut exports = identified.into_outputs();
        let items = identified_items(&exports);
        tracing::info!(pass, items = items.len(), "Identified items");

        let mut base = runtime.clone();
        base.extend(exports.clone());

        for (index, item) in items.iter().enumerate() {
            if token.is_cancelled() {
                return Err(ExecutionResult::cancelled("Process phase cancelled").with_outputs(exports));
            }
            self.events.emit(PipelineEvent::ItemStarted {
                item: item.clone(),
                index,
            });

            let mut item_runtime = base.clone();
            item_runtime.insert(ITEM_VARIABLE.to_string(), Value::String(item.clone()));
            let result = self
                .process
                .run(&self.process_env, &mut item_runtime, max_depth, token)
                .instrument(tracing::info_span!("item", %item, index))
                .await;

            self.events.emit(PipelineEvent::ItemCompleted {
                item: item.clone(),
                code: result.code(),
            });

            if result.is_cancelled() {
                exports.extend(result.outputs().clone());
                return Err(result.with_outputs(exports));
            }
            if !result.is_success() {
                if self.settings.propagate_failure {
                    return Err(result);
                }
                tracing::warn!(%item, code = result.code(), message = result.message(), "Item failed, continuing");
                continue;
            }
            exports.extend(result.into_outputs());
        }
        Ok(exports)
    }
}

/// Item identifiers from the identification exports. Lists yield one item
/// per element; text is split on the list separator.
pub fn identified_items(exports: &ValueMap) -> Vec<String> {
    match exports.get(ITEMS_EXPORT) {
        None | Some(Value::Null) => Vec::new(),
        Some(Value::List(items)) => items
            .iter()
            .filter(|v| !v.is_null())
            .map(Value::render)
            .collect(),
        Some(Value::String(text)) => text
            .split(LIST_SEPARATOR)
            .map(str::trim)
            .filter(|s| !s.is_empty())
            .map(String::from)
            .collect(),
        Some(other) => vec![other.render()],
    }
}

// ---------------------------------------------------------------------------
// Workflow
// ---------------------------------------------------------------------------

/// A document bound to node instances and resolved settings, ready to run.
pub struct Workflow {
    name: String,
    phases: Vec<Box<dyn Phase>>,
    stack: Arc<CancellationStack>,
    events: EventEmitter,
}

/// Outcome of a full workflow run.
#[derive(Debug)]
pub struct WorkflowReport {
    pub name: String,
    pub result: ExecutionResult,
    pub runtime: ValueMap,
    pub duration: Duration,
}

impl WorkflowReport {
    /// Process exit status: zero on success, the failing code otherwise.
    pub fn exit_code(&self) -> i32 {
        self.result.code()
    }

    pub fn is_success(&self) -> bool {
        self.result.is_success()
    }
}

fn keep_ok<T>(result: Result<T>, context: &str, errors: &mut Vec<String>) -> Option<T> {
    match result {
        Ok(value) => Some(value),
        Err(SluiceError::ValidationError(message)) => {
            errors.push(message);
            None
        }
        Err(err) => {
            errors.push(format!("{context}: {err}"));
            None
        }
    }
}

impl Workflow {
    /// Bind `document` to instances from `registry` using the built-in
    /// conversion chain.
    pub fn build(
        document: &PipelineDocument,
        registry: &NodeRegistry,
        environment: &EnvironmentLayers,
        stack: Arc<CancellationStack>,
    ) -> Result<Self> {
        Self::build_with_resolver(document, registry, environment, stack, Arc::new(Resolver::default()))
    }

    /// Like [`Workflow::build`] with a caller-supplied resolver. Errors from
    /// all graphs and phase settings are reported together.
    pub fn build_with_resolver(
        document: &PipelineDocument,
        registry: &NodeRegistry,
        environment: &EnvironmentLayers,
        stack: Arc<CancellationStack>,
        resolver: Arc<Resolver>,
    ) -> Result<Self> {
        let workflow = &document.workflow;
        let events = EventEmitter::default();
        let mut errors = Vec::new();

        let doc_env = &document.environment;
        let main_sections = [doc_env, &workflow.process.environment];
        let pre_env = environment.scoped(&[doc_env, &workflow.pre_process.environment]);
        let main_env = environment.scoped(&main_sections);
        let identification_env = environment.scoped(&[
            doc_env,
            &workflow.process.environment,
            &workflow.process.identification.environment,
        ]);
        let process_env = environment.scoped(&[
            doc_env,
            &workflow.process.environment,
            &workflow.process.process.environment,
        ]);
        let post_env = environment.scoped(&[doc_env, &workflow.post_process.environment]);

        let [pre, ident, item, post] = graph_usages(workflow).map(|(label, graph, usage)| {
            keep_ok(
                GraphProcessor::build(label, graph, registry, usage, Arc::clone(&resolver))
                    .map(|g| g.with_events(events.clone())),
                label,
                &mut errors,
            )
        });
        let pre_settings = keep_ok(PhaseSettings::resolve(&resolver, &pre_env), "PreProcess settings", &mut errors);
        let main_settings = keep_ok(PhaseSettings::resolve(&resolver, &main_env), "Process settings", &mut errors);
        let post_settings = keep_ok(PhaseSettings::resolve(&resolver, &post_env), "PostProcess settings", &mut errors);

        let (
            Some(pre),
            Some(identification),
            Some(process),
            Some(post),
            Some(pre_settings),
            Some(main_settings),
            Some(post_settings),
        ) = (pre, ident, item, post, pre_settings, main_settings, post_settings)
        else {
            return Err(SluiceError::ValidationError(errors.join("; ")));
        };

        let phases: Vec<Box<dyn Phase>> = vec![
            Box::new(GraphPhase {
                name: "PreProcess",
                graph: pre,
                env: pre_env,
                settings: pre_settings,
                stack: Arc::clone(&stack),
            }),
            Box::new(MainPhase {
                identification,
                process,
                identification_env,
                process_env,
                settings: main_settings,
                stack: Arc::clone(&stack),
                events: events.clone(),
            }),
            Box::new(GraphPhase {
                name: "PostProcess",
                graph: post,
                env: post_env,
                settings: post_settings,
                stack: Arc::clone(&stack),
            }),
        ];

        Ok(Self {
            name: document.name.clone(),
            phases,
            stack,
            events,
        })
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn events(&self) -> &EventEmitter {
        &self.events
    }

    pub fn stack(&self) -> &Arc<CancellationStack> {
        &self.stack
    }

    /// Run the phases in order, merging each phase's exports into `runtime`.
    /// Stops at the first phase that does not succeed and returns its result.
    pub async fn run(&self, runtime: &mut ValueMap) -> ExecutionResult {
        let run_id = Uuid::new_v4();
        let span = tracing::info_span!("workflow", name = %self.name, %run_id);
        self.run_phases(runtime, run_id).instrument(span).await
    }

    /// Run with an empty runtime and collect a report.
    pub async fn execute(&self) -> WorkflowReport {
        let started = Instant::now();
        let mut runtime = ValueMap::new();
        let result = self.run(&mut runtime).await;
        WorkflowReport {
            name: self.name.clone(),
            result,
            runtime,
            duration: started.elapsed(),
        }
    }

    async fn run_phases(&self, runtime: &mut ValueMap, run_id: Uuid) -> ExecutionResult {
        let started = Instant::now();
        tracing::info!("Workflow started");
        self.events.emit(PipelineEvent::WorkflowStarted {
            workflow: self.name.clone(),
            run_id: run_id.to_string(),
        });

        let mut outcome = None;
        for phase in &self.phases {
            if self.stack.root().is_cancelled() {
                outcome = Some(ExecutionResult::cancelled("Workflow cancelled"));
                break;
            }

            let phase_started = Instant::now();
            self.events.emit(PipelineEvent::PhaseStarted {
                phase: phase.name().to_string(),
            });
            let result = phase
                .run(runtime)
                .instrument(tracing::info_span!("phase", phase = phase.name()))
                .await;
            self.events.emit(PipelineEvent::PhaseCompleted {
                phase: phase.name().to_string(),
                code: result.code(),
                duration_ms: phase_started.elapsed().as_millis() as u64,
            });

            runtime.extend(result.outputs().clone());
            if !result.is_success() {
                tracing::warn!(phase = phase.name(), code = result.code(), message = result.message(), "Phase did not complete");
                outcome = Some(result);
                break;
            }
        }

        let result = outcome.unwrap_or_else(|| ExecutionResult::success(runtime.clone()));
        self.events.emit(PipelineEvent::WorkflowCompleted {
            workflow: self.name.clone(),
            code: result.code(),
            duration_ms: started.elapsed().as_millis() as u64,
        });
        tracing::info!(code = result.code(), "Workflow finished");
        result
    }
}
