//! Context builder for the planning stage.
//!
//! Combines the dependency manifest scan and a textual directory tree into a
//! single context blob. The blob is embedded verbatim into several prompts,
//! so it must be byte-identical for identical input.

pub mod manifest;
pub mod tree;

pub use manifest::DependencyManifest;
pub use tree::{list_tree_files, render_tree};

use crate::error::Result;
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use std::path::{Path, PathBuf};

/// Heading placed between the manifest entries and the tree listing.
pub const STRUCTURE_HEADING: &str = "Project Structure:";

/// Combine manifest entries and tree text into the planning context.
///
/// Pure: the same inputs always produce the same string.
#[must_use]
pub fn build_context(manifest: &DependencyManifest, tree: &str, preview_lines: usize) -> String {
    let mut context = manifest.render(preview_lines);
    if !context.is_empty() && !context.ends_with("\n\n") {
        context.push('\n');
    }
    context.push_str(STRUCTURE_HEADING);
    context.push('\n');
    context.push_str(tree);
    context
}

/// Hex sha256 of a context blob.
#[must_use]
pub fn context_hash(context: &str) -> String {
    hex::encode(Sha256::digest(context.as_bytes()))
}

/// Statistics about a built context.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ContextStats {
    pub manifests: Vec<String>,
    pub tree_lines: usize,
    pub bytes: usize,
    pub context_hash: String,
}

/// Builder reading a project directory into a planning context.
pub struct ContextBuilder {
    project_dir: PathBuf,
    preview_lines: usize,
}

impl ContextBuilder {
    /// Create a new context builder for a project
    pub fn new(project_dir: impl Into<PathBuf>) -> Self {
        Self {
            project_dir: project_dir.into(),
            preview_lines: 20,
        }
    }

    /// Set how many lines of each manifest are embedded
    #[must_use]
    pub fn preview_lines(mut self, lines: usize) -> Self {
        self.preview_lines = lines;
        self
    }

    pub fn project_dir(&self) -> &Path {
        &self.project_dir
    }

    /// Scan the project and build the context string.
    pub fn build(&self) -> Result<String> {
        let manifest = DependencyManifest::scan(&self.project_dir)?;
        let tree = render_tree(&self.project_dir)?;
        Ok(build_context(&manifest, &tree, self.preview_lines))
    }

    /// Build the context and report statistics alongside it.
    pub fn build_with_stats(&self) -> Result<(String, ContextStats)> {
        let manifest = DependencyManifest::scan(&self.project_dir)?;
        let tree = render_tree(&self.project_dir)?;
        let context = build_context(&manifest, &tree, self.preview_lines);

        let stats = ContextStats {
            manifests: manifest.names().map(str::to_string).collect(),
            tree_lines: tree.lines().count(),
            bytes: context.len(),
            context_hash: context_hash(&context),
        };
        Ok((context, stats))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;
    use tempfile::TempDir;

    #[test]
    fn test_build_context_layout() {
        let manifest =
            DependencyManifest::from_entries([("requirements.txt", vec!["flask".to_string()])]);
        let context = build_context(&manifest, "proj/\n└── app.py\n", 20);

        assert_eq!(
            context,
            "requirements.txt:\nflask\n\nProject Structure:\nproj/\n└── app.py\n"
        );
    }

    #[test]
    fn test_build_context_without_manifests() {
        let context = build_context(&DependencyManifest::default(), "proj/\n", 20);
        assert_eq!(context, "Project Structure:\nproj/\n");
    }

    #[test]
    fn test_builder_is_deterministic() {
        let temp = TempDir::new().unwrap();
        let root = temp.path().join("project_old");
        fs::create_dir_all(root.join("src")).unwrap();
        fs::write(root.join("src/app.py"), "print(1)").unwrap();
        fs::write(root.join("requirements.txt"), "flask\nrequests\n").unwrap();

        let builder = ContextBuilder::new(&root).preview_lines(1);
        let (first, stats) = builder.build_with_stats().unwrap();
        let second = builder.build().unwrap();

        assert_eq!(first, second);
        assert_eq!(stats.context_hash, context_hash(&second));
        assert_eq!(stats.manifests, vec!["requirements.txt".to_string()]);
        assert!(first.contains("flask\n... (1 more lines)"));
        assert!(first.contains("└── app.py"));
    }

    #[test]
    fn test_context_hash_is_hex_sha256() {
        let hash = context_hash("abc");
        assert_eq!(
            hash,
            "ba7816bf8f01cfea414140de5dae2223b00361a396177a9cb410ff61f20015ad"
        );
    }
}
