use std::collections::HashSet;
use std::path::Path;

use sluice_types::{Result, SluiceError};

use crate::ast::*;

/// Strip `//` line comments and `/* */` block comments, leaving string
/// literals untouched. Newlines inside block comments are kept so that parse
/// errors still report the right line.
pub(crate) fn strip_comments(input: &str) -> String {
    let mut out = String::with_capacity(input.len());
    let mut chars = input.chars().peekable();

    while let Some(c) = chars.next() {
        match c {
            '/' if chars.peek() == Some(&'/') => {
                for next in chars.by_ref() {
                    if next == '\n' {
                        out.push('\n');
                        break;
                    }
                }
            }
            '/' if chars.peek() == Some(&'*') => {
                chars.next();
                let mut prev = '\0';
                for next in chars.by_ref() {
                    if prev == '*' && next == '/' {
                        break;
                    }
                    if next == '\n' {
                        out.push('\n');
                    }
                    prev = next;
                }
            }
            '"' => {
                out.push('"');
                while let Some(next) = chars.next() {
                    out.push(next);
                    if next == '\\' {
                        if let Some(escaped) = chars.next() {
                            out.push(escaped);
                        }
                    } else if next == '"' {
                        break;
                    }
                }
            }
            other => out.push(other),
        }
    }
    out
}

/// Parse a pipeline document from JSON text (comments allowed).
pub fn parse(input: &str) -> Result<PipelineDocument> {
    let cleaned = strip_comments(input);
    let document: PipelineDocument =
        serde_json::from_str(&cleaned).map_err(|e| SluiceError::ParseError {
            line: e.line(),
            col: e.column(),
            message: e.to_string(),
        })?;
    check_structure(&document)?;
    Ok(document)
}

/// Read and parse a pipeline document. An unnamed document takes the file stem
/// as its name.
pub fn load(path: &Path) -> Result<PipelineDocument> {
    let source = std::fs::read_to_string(path)?;
    let mut document = parse(&source)?;
    if document.name.is_empty() {
        document.name = path
            .file_stem()
            .map(|s| s.to_string_lossy().into_owned())
            .unwrap_or_default();
    }
    tracing::debug!(path = %path.display(), name = %document.name, "Loaded pipeline document");
    Ok(document)
}

/// Every node needs an ID and a TypeID, and IDs are unique within a graph.
fn check_structure(document: &PipelineDocument) -> Result<()> {
    let mut problems = Vec::new();
    for (label, graph) in document.workflow.graphs() {
        let mut seen = HashSet::new();
        for (index, node) in graph.nodes.iter().enumerate() {
            if node.id.trim().is_empty() {
                problems.push(format!("{label}: node #{index} has an empty ID"));
                continue;
            }
            if node.type_id.trim().is_empty() {
                problems.push(format!("{label}: node '{}' has an empty TypeID", node.id));
            }
            if !seen.insert(node.id.as_str()) {
                problems.push(format!("{label}: duplicate node ID '{}'", node.id));
            }
        }
    }
    if problems.is_empty() {
        Ok(())
    } else {
        Err(SluiceError::ValidationError(problems.join("; ")))
    }
}
