//! Pipeline execution engine for Sluice.
//!
//! Binds pipeline documents to registered node types, resolves node inputs
//! from descriptors, walks graphs, and orchestrates the pre-process, main and
//! post-process phases of a workflow.

pub mod cancel;
pub mod convert;
pub mod descriptor;
pub mod engine;
pub mod environment;
pub mod events;
pub mod node;
pub mod nodes;
pub mod property;
pub mod registry;
pub mod resolver;
pub mod validation;
pub mod workflow;

pub use cancel::{CancelScope, CancellationStack};
pub use convert::{
    ConvertibleParser, DelimitedListParser, EnumNameParser, TypeParser, TypeParserChain,
};
pub use descriptor::{tokenize, Token};
pub use engine::{GraphProcessor, DEFAULT_MAX_DEPTH, EXPORT_TYPE_ID, TRACE_CAPACITY};
pub use environment::{EnvMap, EnvironmentLayers};
pub use events::{EventEmitter, PipelineEvent};
pub use node::{Instancing, Node, NodeCharacteristics, NodeType, NodeUsage};
pub use property::{DefaultValue, Property};
pub use registry::{default_registry, NodeRegistry};
pub use resolver::{check_compatible, Resolver};
pub use validation::{validate, validate_or_raise, Diagnostic, LintRule, Severity};
pub use workflow::{
    identified_items, Phase, PhaseSettings, Workflow, WorkflowReport, ITEMS_EXPORT, ITEM_VARIABLE,
};

pub use tokio_util::sync::CancellationToken;
