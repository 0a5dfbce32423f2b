//! Pipeline document model and loader.
//!
//! A pipeline document is JSON (with `//` and `/* */` comments allowed) that
//! describes a workflow of three phases. It produces the description types
//! [`PipelineDocument`], [`WorkflowDescription`], [`ProcessDescription`],
//! [`GraphDescription`] and [`NodeDescription`].
//!
//! # Example
//! ```
//! let json = r#"{
//!     "Name": "Demo",
//!     "Workflow": {
//!         "PreProcessGraph": { "Nodes": [
//!             { "ID": "hello", "TypeID": "Log", "Inputs": { "Message": "hi" } }
//!         ] }
//!     }
//! }"#;
//! let doc = sluice_document::parse(json).unwrap();
//! assert_eq!(doc.name, "Demo");
//! assert_eq!(doc.workflow.pre_process.nodes.len(), 1);
//! ```

pub mod ast;
mod parser;

pub use ast::*;
pub use parser::{load, parse};
