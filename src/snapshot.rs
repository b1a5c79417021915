//! Project snapshot reader.
//!
//! Walks a project directory and returns one [`SourceRecord`] per readable
//! text file. Binary or undecodable files are skipped silently; they are not
//! source content.

use crate::config::default_ignore_dirs;
use crate::error::{FactoryError, Result};
use globset::GlobSet;
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::fs;
use std::path::{Path, PathBuf};
use tracing::debug;
use walkdir::{DirEntry, WalkDir};

/// Bytes inspected for NUL when sniffing binary content.
const BINARY_SNIFF_LEN: usize = 1024;

/// One readable text file of a project.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SourceRecord {
    /// Path as walked, i.e. prefixed with the snapshot root.
    pub path: PathBuf,
    pub content: String,
}

impl SourceRecord {
    pub fn new(path: impl Into<PathBuf>, content: impl Into<String>) -> Self {
        Self {
            path: path.into(),
            content: content.into(),
        }
    }
}

/// Reader producing snapshots of a project tree.
pub struct SnapshotReader {
    root: PathBuf,
    ignore_dirs: HashSet<String>,
    exclude: Option<GlobSet>,
}

impl SnapshotReader {
    /// Create a reader for `root` with the default ignore list.
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self {
            root: root.into(),
            ignore_dirs: default_ignore_dirs().iter().map(|s| s.to_string()).collect(),
            exclude: None,
        }
    }

    /// Exclude files whose root-relative path matches `set`.
    #[must_use]
    pub fn with_excludes(mut self, set: GlobSet) -> Self {
        self.exclude = Some(set);
        self
    }

    /// Skip an additional directory name anywhere in the tree.
    #[must_use]
    pub fn ignore_dir(mut self, name: &str) -> Self {
        self.ignore_dirs.insert(name.to_string());
        self
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Read every text file under the root.
    ///
    /// Ordering follows the walk and must not be relied on.
    ///
    /// # Errors
    ///
    /// Returns [`FactoryError::NotFound`] if the root does not exist.
    pub fn read(&self) -> Result<Vec<SourceRecord>> {
        if !self.root.exists() {
            return Err(FactoryError::not_found(&self.root));
        }

        let mut records = Vec::new();
        for entry in self.walk_files() {
            if self.is_excluded(entry.path()) {
                continue;
            }
            match read_text_file(entry.path()) {
                Some(content) => records.push(SourceRecord::new(entry.path(), content)),
                None => debug!("Skipping non-text file: {}", entry.path().display()),
            }
        }

        debug!(
            "Snapshot of {} holds {} text files",
            self.root.display(),
            records.len()
        );
        Ok(records)
    }

    /// Count regular files visible to the walk, text or not.
    pub fn count_files(&self) -> usize {
        self.walk_files().count()
    }

    fn walk_files(&self) -> impl Iterator<Item = DirEntry> + '_ {
        WalkDir::new(&self.root)
            .follow_links(false)
            .into_iter()
            .filter_entry(|e| !self.is_ignored_dir(e))
            .filter_map(|e| e.ok())
            .filter(|e| e.file_type().is_file())
    }

    fn is_ignored_dir(&self, entry: &DirEntry) -> bool {
        entry.depth() > 0
            && entry.file_type().is_dir()
            && entry
                .file_name()
                .to_str()
                .is_some_and(|name| self.ignore_dirs.contains(name))
    }

    fn is_excluded(&self, path: &Path) -> bool {
        let Some(set) = &self.exclude else {
            return false;
        };
        let relative = path.strip_prefix(&self.root).unwrap_or(path);
        set.is_match(relative)
    }
}

/// Read `root` with default settings.
pub fn read_snapshot(root: &Path) -> Result<Vec<SourceRecord>> {
    SnapshotReader::new(root).read()
}

/// Decode a file as UTF-8 text, or `None` if it is binary or unreadable.
pub fn read_text_file(path: &Path) -> Option<String> {
    let bytes = fs::read(path).ok()?;
    if looks_binary(&bytes) {
        return None;
    }
    String::from_utf8(bytes).ok()
}

/// NUL byte within the sniff window marks binary content.
pub fn looks_binary(bytes: &[u8]) -> bool {
    bytes.iter().take(BINARY_SNIFF_LEN).any(|&b| b == 0)
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn paths(records: &[SourceRecord], root: &Path) -> HashSet<String> {
        records
            .iter()
            .map(|r| {
                r.path
                    .strip_prefix(root)
                    .unwrap()
                    .to_string_lossy()
                    .replace('\\', "/")
            })
            .collect()
    }

    #[test]
    fn test_missing_root_is_not_found() {
        let temp = TempDir::new().unwrap();
        let err = read_snapshot(&temp.path().join("absent")).unwrap_err();
        assert!(matches!(err, FactoryError::NotFound { .. }));
    }

    #[test]
    fn test_reads_text_and_skips_binary() {
        let temp = TempDir::new().unwrap();
        fs::create_dir_all(temp.path().join("src")).unwrap();
        fs::write(temp.path().join("a.py"), "print(1)").unwrap();
        fs::write(temp.path().join("src/b.py"), "print(2)").unwrap();
        fs::write(temp.path().join("logo.png"), [0x89u8, 0x50, 0x00, 0x47]).unwrap();
        fs::write(temp.path().join("latin1.txt"), [0x63u8, 0x61, 0xe9]).unwrap();

        let reader = SnapshotReader::new(temp.path());
        let records = reader.read().unwrap();

        let found = paths(&records, temp.path());
        assert_eq!(found.len(), 2);
        assert!(found.contains("a.py"));
        assert!(found.contains("src/b.py"));
        assert!(records.len() <= reader.count_files());
        assert_eq!(reader.count_files(), 4);

        let a = records.iter().find(|r| r.path.ends_with("a.py")).unwrap();
        assert_eq!(a.content, "print(1)");
    }

    #[test]
    fn test_skips_noise_directories() {
        let temp = TempDir::new().unwrap();
        fs::create_dir_all(temp.path().join("__pycache__")).unwrap();
        fs::create_dir_all(temp.path().join(".git")).unwrap();
        fs::write(temp.path().join("__pycache__/x.pyc.txt"), "cached").unwrap();
        fs::write(temp.path().join(".git/HEAD"), "ref: main").unwrap();
        fs::write(temp.path().join("app.py"), "pass").unwrap();

        let records = read_snapshot(temp.path()).unwrap();
        let found = paths(&records, temp.path());
        assert_eq!(found, HashSet::from(["app.py".to_string()]));
    }

    #[test]
    fn test_exclude_globs() {
        let temp = TempDir::new().unwrap();
        fs::write(temp.path().join("app.js"), "x").unwrap();
        fs::write(temp.path().join("app.min.js"), "x").unwrap();

        let mut config = crate::config::PipelineConfig::default();
        config.exclude_globs = vec!["*.min.js".to_string()];
        let records = SnapshotReader::new(temp.path())
            .with_excludes(config.exclude_set().unwrap())
            .read()
            .unwrap();

        let found = paths(&records, temp.path());
        assert_eq!(found, HashSet::from(["app.js".to_string()]));
    }

    #[test]
    fn test_root_named_like_ignored_dir_still_read() {
        let temp = TempDir::new().unwrap();
        let root = temp.path().join("build");
        fs::create_dir_all(&root).unwrap();
        fs::write(root.join("main.py"), "pass").unwrap();

        let records = read_snapshot(&root).unwrap();
        assert_eq!(records.len(), 1);
    }

    #[test]
    fn test_looks_binary() {
        assert!(looks_binary(b"abc\0def"));
        assert!(!looks_binary(b"plain text"));
        let mut late_nul = vec![b'a'; BINARY_SNIFF_LEN];
        late_nul.push(0);
        assert!(!looks_binary(&late_nul));
    }
}
