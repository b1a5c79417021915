//! Test fixtures for creating reproducible project trees.

use crate::llm::MockOracle;
use crate::plan::{render_fenced, EditPlan};
use std::path::{Path, PathBuf};
use tempfile::TempDir;

/// Input directory name used by fixtures.
pub const INPUT_DIR: &str = "project_old";

/// Output directory name used by fixtures.
pub const OUTPUT_DIR: &str = "project_new";

/// A temporary workspace holding an input project.
///
/// Automatically cleaned up when dropped.
pub struct ProjectFixture {
    temp_dir: TempDir,
}

impl ProjectFixture {
    /// Create a workspace with an empty input project.
    ///
    /// # Panics
    ///
    /// Panics if temporary directory creation fails.
    #[must_use]
    pub fn empty() -> Self {
        let temp_dir = TempDir::new().expect("Failed to create temp directory");
        std::fs::create_dir_all(temp_dir.path().join(INPUT_DIR))
            .expect("Failed to create input directory");
        Self { temp_dir }
    }

    /// `a.py` = `print(1)`, `b.py` = `print(2)`.
    #[must_use]
    pub fn two_files() -> Self {
        Self::empty()
            .with_file("a.py", "print(1)")
            .with_file("b.py", "print(2)")
    }

    /// A small Python project with a manifest, nested packages and noise.
    #[must_use]
    pub fn python_project() -> Self {
        Self::empty()
            .with_file("requirements.txt", "flask==3.0.0\nrequests>=2.31\n")
            .with_file("app.py", "from flask import Flask\n\napp = Flask(__name__)\n")
            .with_file("utils/__init__.py", "")
            .with_file("utils/helpers.py", "def helper():\n    return 1\n")
            .with_file("src/models/user.py", "class User:\n    pass\n")
            .with_file("__pycache__/app.cpython-312.pyc", "cached")
    }

    /// Add a file under the input project.
    ///
    /// # Panics
    ///
    /// Panics if the file cannot be written.
    #[must_use]
    pub fn with_file(self, relative_path: &str, content: &str) -> Self {
        self.write_input(relative_path, content.as_bytes());
        self
    }

    /// Write raw bytes under the input project.
    ///
    /// # Panics
    ///
    /// Panics if the file cannot be written.
    pub fn write_input(&self, relative_path: &str, content: &[u8]) {
        let path = self.input_dir().join(relative_path);
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent).expect("Failed to create parent directory");
        }
        std::fs::write(path, content).expect("Failed to write fixture file");
    }

    /// Workspace root.
    #[must_use]
    pub fn path(&self) -> &Path {
        self.temp_dir.path()
    }

    #[must_use]
    pub fn input_dir(&self) -> PathBuf {
        self.temp_dir.path().join(INPUT_DIR)
    }

    #[must_use]
    pub fn output_dir(&self) -> PathBuf {
        self.temp_dir.path().join(OUTPUT_DIR)
    }

    /// Read a file from the output project.
    ///
    /// # Panics
    ///
    /// Panics if the file does not exist.
    #[must_use]
    pub fn read_output(&self, relative_path: &str) -> String {
        std::fs::read_to_string(self.output_dir().join(relative_path))
            .expect("Failed to read output file")
    }
}

/// An oracle that answers a full planning run.
///
/// The three analysis prompts get `mock nodes`, `mock edges` and
/// `mock report`; the preprocessing prompt gets `plan` in the fenced wire
/// format; every other prompt (the per-file tasks) gets `artifact`.
#[must_use]
pub fn planning_oracle(plan: &EditPlan, artifact: &str) -> MockOracle {
    MockOracle::new()
        .with_route("List the components", "mock nodes")
        .with_route("List the relationships", "mock edges")
        .with_route("Write a short impact report", "mock report")
        .with_route(
            "identify the specific files",
            &render_fenced(plan).expect("plan serializes"),
        )
        .with_response(artifact)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_two_files_layout() {
        let fixture = ProjectFixture::two_files();
        assert!(fixture.input_dir().join("a.py").exists());
        assert!(fixture.input_dir().join("b.py").exists());
        assert!(!fixture.output_dir().exists());
    }

    #[test]
    fn test_with_file_creates_directories() {
        let fixture = ProjectFixture::empty().with_file("deep/nested/x.py", "x = 1");
        assert!(fixture.input_dir().join("deep/nested/x.py").exists());
    }
}
