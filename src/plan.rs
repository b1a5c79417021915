//! Edit plan types.
//!
//! An [`EditPlan`] is the single structured artifact passed from the planner
//! to the reconciler. Its serde shape is also the wire schema the oracle is
//! asked to emit, so there is exactly one representation of a plan.

pub mod extract;
pub mod paths;

pub use extract::{extract_plan, render_fenced};
pub use paths::{normalize_path, PathRemapper};

use crate::error::{FactoryError, Result};
use serde::{Deserialize, Serialize};
use std::collections::HashSet;

/// A file in the original project to modify.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ExistingFileTask {
    pub file_path: String,
    pub task: String,
    /// Original file text, attached during enrichment.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub content: Option<String>,
}

impl ExistingFileTask {
    pub fn new(file_path: impl Into<String>, task: impl Into<String>) -> Self {
        Self {
            file_path: file_path.into(),
            task: task.into(),
            content: None,
        }
    }
}

/// A file to create.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NewFileTask {
    pub file_path: String,
    pub purpose: String,
}

impl NewFileTask {
    pub fn new(file_path: impl Into<String>, purpose: impl Into<String>) -> Self {
        Self {
            file_path: file_path.into(),
            purpose: purpose.into(),
        }
    }
}

/// Structured description of which files to change or create.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct EditPlan {
    #[serde(default)]
    pub feature_request: String,
    #[serde(default)]
    pub analysis_results: String,
    pub existing_files: Vec<ExistingFileTask>,
    pub new_files: Vec<NewFileTask>,
}

impl EditPlan {
    pub fn new(feature_request: impl Into<String>) -> Self {
        Self {
            feature_request: feature_request.into(),
            ..Self::default()
        }
    }

    #[must_use]
    pub fn with_existing(mut self, file_path: &str, task: &str) -> Self {
        self.existing_files.push(ExistingFileTask::new(file_path, task));
        self
    }

    #[must_use]
    pub fn with_new(mut self, file_path: &str, purpose: &str) -> Self {
        self.new_files.push(NewFileTask::new(file_path, purpose));
        self
    }

    /// Number of generation tasks (existing files first, then new files).
    pub fn task_count(&self) -> usize {
        self.existing_files.len() + self.new_files.len()
    }

    pub fn is_empty(&self) -> bool {
        self.task_count() == 0
    }

    /// Every planned path in task order.
    pub fn paths(&self) -> impl Iterator<Item = &str> {
        self.existing_files
            .iter()
            .map(|t| t.file_path.as_str())
            .chain(self.new_files.iter().map(|t| t.file_path.as_str()))
    }

    /// Reject plans whose paths cannot be applied unambiguously.
    ///
    /// Paths are compared by their root-relative form, so `project_old/a.py`
    /// and `./a.py` name the same file. Fails on duplicate existing-file
    /// entries, a new file colliding with any other entry, and paths that
    /// escape the project root.
    ///
    /// # Errors
    ///
    /// Returns [`FactoryError::Consistency`] naming the offending path.
    pub fn check_paths(&self, remapper: &PathRemapper) -> Result<()> {
        let mut seen = HashSet::new();

        for task in &self.existing_files {
            let rel = remapper.relative(&task.file_path)?;
            if !seen.insert(rel.clone()) {
                return Err(FactoryError::consistency(format!(
                    "file '{}' is listed more than once in existing_files",
                    task.file_path
                )));
            }
        }

        for task in &self.new_files {
            let rel = remapper.relative(&task.file_path)?;
            if !seen.insert(rel) {
                return Err(FactoryError::consistency(format!(
                    "new file '{}' collides with another planned file",
                    task.file_path
                )));
            }
        }

        Ok(())
    }
}
