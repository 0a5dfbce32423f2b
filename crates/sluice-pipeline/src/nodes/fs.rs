//! Filesystem nodes.

use std::path::{Path, PathBuf};

use async_trait::async_trait;
use globset::Glob;
use tokio_util::sync::CancellationToken;

use sluice_types::{ExecutionResult, Result, SluiceError, Value, ValueMap, ValueType};

use crate::node::Node;
use crate::property::Property;

use super::{flag, optional_str, outputs, require_str};

/// Outcome reported by [`CopyFileNode`] when the target exists and
/// overwriting is off.
pub const SKIPPED_OUTCOME: &str = "Skipped";

fn path_text(path: &Path) -> Value {
    Value::String(path.to_string_lossy().into_owned())
}

// ---------------------------------------------------------------------------
// CombinePath
// ---------------------------------------------------------------------------

pub struct CombinePathNode {
    inputs: Vec<Property>,
    outputs: Vec<Property>,
}

impl CombinePathNode {
    pub fn new() -> Self {
        Self {
            inputs: vec![
                Property::new("Base", ValueType::String).required(),
                Property::new("Relative", ValueType::String)
                    .describe("Joined onto Base; an absolute path replaces it")
                    .required(),
            ],
            outputs: vec![Property::new("Path", ValueType::String)],
        }
    }
}

impl Default for CombinePathNode {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl Node for CombinePathNode {
    fn inputs(&self) -> &[Property] {
        &self.inputs
    }

    fn outputs(&self) -> &[Property] {
        &self.outputs
    }

    async fn process(&self, inputs: &ValueMap, _cancel: &CancellationToken) -> Result<ExecutionResult> {
        let base = require_str("CombinePath", inputs, "Base")?;
        let relative = require_str("CombinePath", inputs, "Relative")?;
        let path = Path::new(base).join(relative);
        Ok(ExecutionResult::success(outputs([("Path", path_text(&path))])))
    }
}

// ---------------------------------------------------------------------------
// CopyFile
// ---------------------------------------------------------------------------

pub struct CopyFileNode {
    inputs: Vec<Property>,
    outputs: Vec<Property>,
}

impl CopyFileNode {
    pub fn new() -> Self {
        Self {
            inputs: vec![
                Property::new("Source", ValueType::String)
                    .describe("File to copy")
                    .required()
                    .example("{Item}"),
                Property::new("Destination", ValueType::String)
                    .describe("Target file, or a directory to copy into (existing, or ending in a separator)")
                    .required(),
                Property::new("Overwrite", ValueType::Bool).default_value(false),
            ],
            outputs: vec![Property::new("Destination", ValueType::String)
                .describe("Path of the copied file")],
        }
    }
}

impl Default for CopyFileNode {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl Node for CopyFileNode {
    fn inputs(&self) -> &[Property] {
        &self.inputs
    }

    fn outputs(&self) -> &[Property] {
        &self.outputs
    }

    async fn process(&self, inputs: &ValueMap, _cancel: &CancellationToken) -> Result<ExecutionResult> {
        let source = PathBuf::from(require_str("CopyFile", inputs, "Source")?);
        let target = require_str("CopyFile", inputs, "Destination")?;
        let mut destination = PathBuf::from(target);

        let into_dir = target.ends_with(std::path::is_separator)
            || tokio::fs::metadata(&destination)
                .await
                .map(|m| m.is_dir())
                .unwrap_or(false);
        if into_dir {
            if let Some(name) = source.file_name() {
                destination.push(name);
            }
        }

        let produced = outputs([("Destination", path_text(&destination))]);
        if !flag(inputs, "Overwrite") && tokio::fs::try_exists(&destination).await? {
            tracing::info!(destination = %destination.display(), "Target exists, copy skipped");
            return Ok(ExecutionResult::success(produced).with_outcome(SKIPPED_OUTCOME));
        }

        if let Some(parent) = destination.parent().filter(|p| !p.as_os_str().is_empty()) {
            tokio::fs::create_dir_all(parent).await?;
        }
        let bytes = tokio::fs::copy(&source, &destination).await?;
        tracing::debug!(
            source = %source.display(),
            destination = %destination.display(),
            bytes,
            "Copied file"
        );
        Ok(ExecutionResult::success(produced))
    }
}

// ---------------------------------------------------------------------------
// ListFiles
// ---------------------------------------------------------------------------

pub struct ListFilesNode {
    inputs: Vec<Property>,
    outputs: Vec<Property>,
}

impl ListFilesNode {
    pub fn new() -> Self {
        Self {
            inputs: vec![
                Property::new("Directory", ValueType::String).required(),
                Property::new("Pattern", ValueType::String)
                    .describe("Glob matched against file names")
                    .default_value("*")
                    .example("*.csv"),
            ],
            outputs: vec![Property::new("Files", ValueType::list_of(ValueType::String))
                .describe("Matching file paths, sorted")],
        }
    }
}

impl Default for ListFilesNode {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl Node for ListFilesNode {
    fn inputs(&self) -> &[Property] {
        &self.inputs
    }

    fn outputs(&self) -> &[Property] {
        &self.outputs
    }

    async fn process(&self, inputs: &ValueMap, cancel: &CancellationToken) -> Result<ExecutionResult> {
        let directory = require_str("ListFiles", inputs, "Directory")?;
        let pattern = optional_str(inputs, "Pattern").unwrap_or("*");
        let matcher = Glob::new(pattern)
            .map_err(|e| SluiceError::NodeError {
                node: "ListFiles".into(),
                message: format!("invalid pattern '{pattern}': {e}"),
            })?
            .compile_matcher();

        let mut entries = tokio::fs::read_dir(directory).await?;
        let mut files = Vec::new();
        while let Some(entry) = entries.next_entry().await? {
            if cancel.is_cancelled() {
                return Ok(ExecutionResult::cancelled("ListFiles cancelled"));
            }
            if !entry.file_type().await?.is_file() {
                continue;
            }
            if matcher.is_match(entry.file_name()) {
                files.push(entry.path().to_string_lossy().into_owned());
            }
        }
        files.sort();
        tracing::debug!(directory, pattern, count = files.len(), "Listed files");

        let files = files.into_iter().map(Value::String).collect();
        Ok(ExecutionResult::success(outputs([("Files", Value::List(files))])))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn inputs(pairs: Vec<(&str, Value)>) -> ValueMap {
        pairs.into_iter().map(|(k, v)| (k.to_string(), v)).collect()
    }

    fn text(s: &str) -> Value {
        Value::from(s)
    }

    #[tokio::test]
    async fn combine_path_joins() {
        let node = CombinePathNode::new();
        let result = node
            .process(
                &inputs(vec![("Base", text("/data")), ("Relative", text("in/a.txt"))]),
                &CancellationToken::new(),
            )
            .await
            .unwrap();
        let expected = Path::new("/data").join("in/a.txt");
        assert_eq!(result.output("Path"), Some(&path_text(&expected)));
    }

    #[tokio::test]
    async fn copy_into_directory_then_skip() {
        let dir = tempfile::tempdir().unwrap();
        let source = dir.path().join("a.txt");
        std::fs::write(&source, "alpha").unwrap();
        let target_dir = dir.path().join("out");
        std::fs::create_dir(&target_dir).unwrap();

        let node = CopyFileNode::new();
        let args = inputs(vec![
            ("Source", text(source.to_str().unwrap())),
            ("Destination", text(target_dir.to_str().unwrap())),
            ("Overwrite", Value::Bool(false)),
        ]);

        let first = node.process(&args, &CancellationToken::new()).await.unwrap();
        assert!(first.is_success());
        assert!(first.outcome().is_none());
        assert_eq!(std::fs::read_to_string(target_dir.join("a.txt")).unwrap(), "alpha");

        let second = node.process(&args, &CancellationToken::new()).await.unwrap();
        assert_eq!(second.outcome(), Some(SKIPPED_OUTCOME));
    }

    #[tokio::test]
    async fn copy_creates_parent_directories() {
        let dir = tempfile::tempdir().unwrap();
        let source = dir.path().join("a.txt");
        std::fs::write(&source, "alpha").unwrap();
        let destination = dir.path().join("deep/er/b.txt");

        let node = CopyFileNode::new();
        let args = inputs(vec![
            ("Source", text(source.to_str().unwrap())),
            ("Destination", text(destination.to_str().unwrap())),
        ]);
        let result = node.process(&args, &CancellationToken::new()).await.unwrap();
        assert!(result.is_success());
        assert!(destination.exists());
    }

    #[tokio::test]
    async fn trailing_separator_names_new_directory() {
        let dir = tempfile::tempdir().unwrap();
        let source = dir.path().join("a.txt");
        std::fs::write(&source, "alpha").unwrap();
        let target = format!("{}{}", dir.path().join("new").display(), std::path::MAIN_SEPARATOR);

        let node = CopyFileNode::new();
        let args = inputs(vec![
            ("Source", text(source.to_str().unwrap())),
            ("Destination", text(&target)),
        ]);
        let result = node.process(&args, &CancellationToken::new()).await.unwrap();
        assert!(result.is_success());
        assert!(dir.path().join("new").join("a.txt").exists());
    }

    #[tokio::test]
    async fn copy_missing_source_reports_os_error() {
        let dir = tempfile::tempdir().unwrap();
        let node = CopyFileNode::new();
        let args = inputs(vec![
            ("Source", text(dir.path().join("nope").to_str().unwrap())),
            ("Destination", text(dir.path().join("x").to_str().unwrap())),
        ]);
        let err = node.process(&args, &CancellationToken::new()).await.unwrap_err();
        assert!(matches!(err, SluiceError::Io(_)));
    }

    #[tokio::test]
    async fn list_files_filters_and_sorts() {
        let dir = tempfile::tempdir().unwrap();
        for name in ["b.csv", "a.csv", "notes.txt"] {
            std::fs::write(dir.path().join(name), "").unwrap();
        }
        std::fs::create_dir(dir.path().join("sub.csv")).unwrap();

        let node = ListFilesNode::new();
        let args = inputs(vec![
            ("Directory", text(dir.path().to_str().unwrap())),
            ("Pattern", text("*.csv")),
        ]);
        let result = node.process(&args, &CancellationToken::new()).await.unwrap();
        let files: Vec<String> = result
            .output("Files")
            .and_then(Value::as_list)
            .unwrap()
            .iter()
            .map(Value::render)
            .collect();
        assert_eq!(files.len(), 2);
        assert!(files[0].ends_with("a.csv"));
        assert!(files[1].ends_with("b.csv"));
    }

    #[tokio::test]
    async fn list_files_rejects_bad_glob() {
        let dir = tempfile::tempdir().unwrap();
        let node = ListFilesNode::new();
        let args = inputs(vec![
            ("Directory", text(dir.path().to_str().unwrap())),
            ("Pattern", text("[")),
        ]);
        let err = node.process(&args, &CancellationToken::new()).await.unwrap_err();
        assert!(err.to_string().contains("invalid pattern"));
    }
}
