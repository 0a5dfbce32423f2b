//! Shared types, errors, result codes, and values for the Sluice pipeline engine.
//!
//! This crate provides the foundational types used across all other Sluice crates:
//! - `SluiceError`: unified error taxonomy with result-code mapping
//! - `ExecutionResult`: outcome of running one node or one whole graph
//! - `Value` / `ValueType`: the dynamic value model flowing through the resolver

pub mod value;

pub use value::{EnumDef, TypeKind, Value, ValueMap, ValueType, DATE_TIME_FORMAT, NULL_TOKEN};

/// Reserved result codes. Zero is success; everything else is a failure.
pub mod codes {
    pub const SUCCESS: i32 = 0;
    pub const INVALID: i32 = 400;
    pub const NOT_FOUND: i32 = 404;
    pub const UNRESOLVABLE: i32 = 422;
    pub const CANCELLED: i32 = 499;
    pub const FAULT: i32 = 500;
    pub const DEPTH_EXCEEDED: i32 = 504;
}

/// Unified error type for all Sluice subsystems.
#[derive(Debug, thiserror::Error)]
pub enum SluiceError {
    // === Document / Configuration Errors ===
    #[error("Document parse error at line {line}, col {col}: {message}")]
    ParseError {
        line: usize,
        col: usize,
        message: String,
    },

    #[error("Pipeline validation failed: {0}")]
    ValidationError(String),

    #[error("Node registry load failed: {}", errors.join("; "))]
    RegistryLoad { errors: Vec<String> },

    #[error("Node '{node}' references unknown type '{type_id}'")]
    UnknownNodeType { node: String, type_id: String },

    // === Resolution Errors ===
    #[error("Variable '{name}' could not be resolved for property '{property}'")]
    UnresolvedVariable { property: String, name: String },

    #[error("Required property '{property}' has no value")]
    MissingRequired { property: String },

    #[error("Cannot convert '{text}' to {target}")]
    Conversion { text: String, target: String },

    #[error("Value of type {actual} is not assignable to property '{property}' of type {expected}")]
    TypeMismatch {
        property: String,
        expected: String,
        actual: String,
    },

    #[error("Malformed descriptor '{descriptor}' at offset {offset}: {message}")]
    MalformedDescriptor {
        descriptor: String,
        offset: usize,
        message: String,
    },

    // === Graph Errors ===
    #[error("Node '{0}' not found")]
    NodeNotFound(String),

    #[error("Node '{node}' has no connection for outcome '{key}'")]
    NoMatchingConnection { node: String, key: String },

    #[error("Node '{node}' connects to unknown node '{target}'")]
    DanglingConnection { node: String, target: String },

    #[error("Maximum depth of {depth} steps exceeded")]
    DepthExceeded { depth: usize },

    #[error("Execution cancelled")]
    Cancelled,

    #[error("Node '{node}' failed: {message}")]
    NodeError { node: String, message: String },

    // === Generic ===
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("{0}")]
    Other(String),
}

impl SluiceError {
    /// Maps the error to the result code reported for it. This is also the
    /// process exit status when the error escapes the orchestrator.
    pub fn result_code(&self) -> i32 {
        match self {
            SluiceError::ParseError { .. }
            | SluiceError::ValidationError(_)
            | SluiceError::RegistryLoad { .. } => codes::INVALID,
            SluiceError::UnknownNodeType { .. }
            | SluiceError::NodeNotFound(_)
            | SluiceError::NoMatchingConnection { .. }
            | SluiceError::DanglingConnection { .. } => codes::NOT_FOUND,
            SluiceError::UnresolvedVariable { .. }
            | SluiceError::MissingRequired { .. }
            | SluiceError::Conversion { .. }
            | SluiceError::TypeMismatch { .. }
            | SluiceError::MalformedDescriptor { .. } => codes::UNRESOLVABLE,
            SluiceError::Cancelled => codes::CANCELLED,
            SluiceError::DepthExceeded { .. } => codes::DEPTH_EXCEEDED,
            SluiceError::Io(e) => e.raw_os_error().filter(|c| *c != 0).unwrap_or(codes::FAULT),
            SluiceError::NodeError { .. } | SluiceError::Json(_) | SluiceError::Other(_) => {
                codes::FAULT
            }
        }
    }

    /// Returns `true` for errors detected while loading descriptions or the
    /// registry, before anything runs.
    pub fn is_configuration(&self) -> bool {
        matches!(
            self,
            SluiceError::ParseError { .. }
                | SluiceError::ValidationError(_)
                | SluiceError::RegistryLoad { .. }
                | SluiceError::UnknownNodeType { .. }
        )
    }
}

/// A convenience alias for `Result<T, SluiceError>`.
pub type Result<T> = std::result::Result<T, SluiceError>;

// ---------------------------------------------------------------------------
// ExecutionResult: outcome of running one node or one full graph
// ---------------------------------------------------------------------------

/// Immutable outcome of a node or graph run.
///
/// A result is either a success carrying produced outputs, or a failure
/// carrying a nonzero code and a detail message. The optional outcome key
/// selects which connection the engine follows next.
#[derive(Debug, Clone, PartialEq)]
pub struct ExecutionResult {
    code: i32,
    message: String,
    outputs: ValueMap,
    outcome: Option<String>,
}

impl ExecutionResult {
    /// Create a successful result carrying `outputs`.
    pub fn success(outputs: ValueMap) -> Self {
        Self {
            code: codes::SUCCESS,
            message: String::new(),
            outputs,
            outcome: None,
        }
    }

    /// Create a failed result. A zero code is promoted to [`codes::FAULT`]
    /// so a failure can never read as success.
    pub fn failure(code: i32, message: impl Into<String>) -> Self {
        Self {
            code: if code == codes::SUCCESS { codes::FAULT } else { code },
            message: message.into(),
            outputs: ValueMap::new(),
            outcome: None,
        }
    }

    /// Convert a caught error into a failed result using its native code.
    pub fn from_error(err: &SluiceError) -> Self {
        Self::failure(err.result_code(), err.to_string())
    }

    pub fn cancelled(message: impl Into<String>) -> Self {
        Self::failure(codes::CANCELLED, message)
    }

    /// Return a copy of this result that selects `key` as its outcome.
    pub fn with_outcome(mut self, key: impl Into<String>) -> Self {
        self.outcome = Some(key.into());
        self
    }

    /// Attach outputs to a result, e.g. values exported before a cancellation.
    pub fn with_outputs(mut self, outputs: ValueMap) -> Self {
        self.outputs = outputs;
        self
    }

    /// Return a copy of this result with a replaced detail message.
    pub fn with_message(mut self, message: impl Into<String>) -> Self {
        self.message = message.into();
        self
    }

    pub fn code(&self) -> i32 {
        self.code
    }

    pub fn message(&self) -> &str {
        &self.message
    }

    pub fn outputs(&self) -> &ValueMap {
        &self.outputs
    }

    pub fn output(&self, name: &str) -> Option<&Value> {
        self.outputs.get(name)
    }

    pub fn outcome(&self) -> Option<&str> {
        self.outcome.as_deref()
    }

    pub fn is_success(&self) -> bool {
        self.code == codes::SUCCESS
    }

    pub fn is_cancelled(&self) -> bool {
        self.code == codes::CANCELLED
    }

    pub fn into_outputs(self) -> ValueMap {
        self.outputs
    }
}
