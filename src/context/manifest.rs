//! Dependency manifest scanning.

use crate::config::{default_ignore_dirs, MANIFEST_FILES};
use crate::error::{FactoryError, Result};
use std::collections::BTreeMap;
use std::fs;
use std::path::{Path, PathBuf};
use walkdir::WalkDir;

/// Manifest filename mapped to its raw lines.
///
/// Keys are ordered so rendering is deterministic.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct DependencyManifest {
    entries: BTreeMap<String, Vec<String>>,
}

impl DependencyManifest {
    /// Scan `root` recursively for known manifest files.
    ///
    /// When a filename occurs more than once, the shallowest occurrence wins,
    /// then the lexicographically first path.
    ///
    /// # Errors
    ///
    /// Returns [`FactoryError::NotFound`] if `root` does not exist, or an IO
    /// error if a manifest cannot be read as text.
    pub fn scan(root: &Path) -> Result<Self> {
        if !root.exists() {
            return Err(FactoryError::not_found(root));
        }

        let ignore = default_ignore_dirs();
        let mut chosen: BTreeMap<String, (usize, PathBuf)> = BTreeMap::new();

        let walker = WalkDir::new(root)
            .sort_by_file_name()
            .into_iter()
            .filter_entry(|e| {
                e.depth() == 0
                    || !e.file_type().is_dir()
                    || !e.file_name().to_str().is_some_and(|n| ignore.contains(n))
            });

        for entry in walker.filter_map(|e| e.ok()) {
            if !entry.file_type().is_file() {
                continue;
            }
            let Some(name) = entry.file_name().to_str() else {
                continue;
            };
            if !MANIFEST_FILES.contains(&name) {
                continue;
            }

            let candidate = (entry.depth(), entry.path().to_path_buf());
            match chosen.get(name) {
                Some(existing) if *existing <= candidate => {}
                _ => {
                    chosen.insert(name.to_string(), candidate);
                }
            }
        }

        let mut entries = BTreeMap::new();
        for (name, (_, path)) in chosen {
            let content = fs::read_to_string(&path)?;
            entries.insert(name, content.lines().map(str::to_string).collect());
        }

        Ok(Self { entries })
    }

    /// Build a manifest from explicit entries.
    pub fn from_entries<I, K>(entries: I) -> Self
    where
        I: IntoIterator<Item = (K, Vec<String>)>,
        K: Into<String>,
    {
        Self {
            entries: entries.into_iter().map(|(k, v)| (k.into(), v)).collect(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Manifest filenames found, in sorted order.
    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.entries.keys().map(String::as_str)
    }

    pub fn lines(&self, name: &str) -> Option<&[String]> {
        self.entries.get(name).map(Vec::as_slice)
    }

    /// Render as `name:` followed by at most `preview_lines` lines per entry.
    pub fn render(&self, preview_lines: usize) -> String {
        let mut out = String::new();
        for (name, lines) in &self.entries {
            out.push_str(name);
            out.push_str(":\n");
            for line in lines.iter().take(preview_lines) {
                out.push_str(line);
                out.push('\n');
            }
            if lines.len() > preview_lines {
                out.push_str(&format!("... ({} more lines)\n", lines.len() - preview_lines));
            }
            out.push('\n');
        }
        out
    }
}
