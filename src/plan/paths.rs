//! Planned-path normalisation and old-root to new-root remapping.
//!
//! The oracle names files however it saw them: prefixed with the input
//! directory (`project_old/src/x.py`), relative to it (`src/x.py`), with a
//! leading `./`, or with Windows separators. Everything is reduced to one
//! root-relative form before it touches the filesystem.

use crate::error::{FactoryError, Result};
use std::path::{Component, Path, PathBuf};

/// Normalise separators and drop leading `./` segments.
#[must_use]
pub fn normalize_path(path: &str) -> String {
    let mut normalized = path.trim().replace('\\', "/");
    while let Some(rest) = normalized.strip_prefix("./") {
        normalized = rest.to_string();
    }
    while normalized.contains("//") {
        normalized = normalized.replace("//", "/");
    }
    normalized
}

/// `path` relative to `root` if it lies under it.
fn strip_dir<'a>(path: &'a str, root: &str) -> Option<&'a str> {
    if root.is_empty() || root == "." {
        return None;
    }
    if path == root {
        return Some("");
    }
    path.strip_prefix(root)?.strip_prefix('/')
}

/// Maps planned paths from the input tree onto the output tree.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PathRemapper {
    old_root: PathBuf,
    new_root: PathBuf,
}

impl PathRemapper {
    pub fn new(old_root: impl Into<PathBuf>, new_root: impl Into<PathBuf>) -> Self {
        Self {
            old_root: old_root.into(),
            new_root: new_root.into(),
        }
    }

    pub fn old_root(&self) -> &Path {
        &self.old_root
    }

    pub fn new_root(&self) -> &Path {
        &self.new_root
    }

    /// Root-relative form of a planned path.
    ///
    /// Accepts the path prefixed by the full input root, by the input
    /// directory's name alone, or already relative.
    ///
    /// # Errors
    ///
    /// Returns [`FactoryError::Consistency`] for empty paths and paths that
    /// would resolve outside the project root.
    pub fn relative(&self, file_path: &str) -> Result<String> {
        let path = normalize_path(file_path);
        let root = normalize_path(&self.old_root.to_string_lossy());
        let root = root.trim_end_matches('/');
        let root_name = self
            .old_root
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_default();

        let rel = strip_dir(&path, root)
            .or_else(|| strip_dir(&path, &root_name))
            .unwrap_or(&path)
            .to_string();

        Self::check_contained(file_path, &rel)?;
        Ok(rel)
    }

    fn check_contained(original: &str, rel: &str) -> Result<()> {
        if rel.is_empty() {
            return Err(FactoryError::consistency(format!(
                "planned path '{}' does not name a file",
                original
            )));
        }
        let escapes = Path::new(rel).components().any(|c| {
            matches!(
                c,
                Component::ParentDir | Component::RootDir | Component::Prefix(_)
            )
        });
        if escapes {
            return Err(FactoryError::consistency(format!(
                "planned path '{}' points outside the project",
                original
            )));
        }
        Ok(())
    }

    /// Location of a planned file in the input tree.
    pub fn input_path(&self, file_path: &str) -> Result<PathBuf> {
        Ok(self.old_root.join(self.relative(file_path)?))
    }

    /// Location of a planned file in the output tree.
    pub fn output_path(&self, file_path: &str) -> Result<PathBuf> {
        Ok(self.new_root.join(self.relative(file_path)?))
    }
}
