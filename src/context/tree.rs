//! Textual directory tree rendering.
//!
//! Directories sort before files, names sort alphabetically within a
//! directory, and the same connectors are always used, so identical trees
//! render to identical bytes.

use crate::config::default_ignore_dirs;
use crate::error::{FactoryError, Result};
use std::collections::HashSet;
use std::fs;
use std::path::Path;

const BRANCH: &str = "├── ";
const LAST_BRANCH: &str = "└── ";
const PIPE: &str = "│   ";
const SPACE: &str = "    ";

/// Render the tree below `root`, headed by the root's directory name.
///
/// # Errors
///
/// Returns [`FactoryError::NotFound`] if `root` does not exist, or an IO error
/// if a directory cannot be listed.
pub fn render_tree(root: &Path) -> Result<String> {
    if !root.exists() {
        return Err(FactoryError::not_found(root));
    }

    let ignore = default_ignore_dirs();
    let name = root
        .file_name()
        .map(|n| n.to_string_lossy().to_string())
        .unwrap_or_else(|| root.display().to_string());

    let mut out = format!("{}/\n", name);
    render_dir(root, "", &ignore, &mut out)?;
    Ok(out)
}

fn render_dir(dir: &Path, prefix: &str, ignore: &HashSet<&str>, out: &mut String) -> Result<()> {
    let mut dirs = Vec::new();
    let mut files = Vec::new();

    for entry in fs::read_dir(dir)? {
        let entry = entry?;
        let name = entry.file_name().to_string_lossy().to_string();
        if entry.file_type()?.is_dir() {
            if !ignore.contains(name.as_str()) {
                dirs.push(name);
            }
        } else {
            files.push(name);
        }
    }

    dirs.sort();
    files.sort();

    let total = dirs.len() + files.len();
    let mut index = 0;

    for name in &dirs {
        index += 1;
        let last = index == total;
        out.push_str(prefix);
        out.push_str(if last { LAST_BRANCH } else { BRANCH });
        out.push_str(name);
        out.push_str("/\n");

        let child_prefix = format!("{}{}", prefix, if last { SPACE } else { PIPE });
        render_dir(&dir.join(name), &child_prefix, ignore, out)?;
    }

    for name in &files {
        index += 1;
        out.push_str(prefix);
        out.push_str(if index == total { LAST_BRANCH } else { BRANCH });
        out.push_str(name);
        out.push('\n');
    }

    Ok(())
}

/// List every file below `root` as root-relative `/`-separated paths, sorted.
pub fn list_tree_files(root: &Path) -> Result<Vec<String>> {
    if !root.exists() {
        return Err(FactoryError::not_found(root));
    }

    let mut files: Vec<String> = walkdir::WalkDir::new(root)
        .into_iter()
        .filter_map(|e| e.ok())
        .filter(|e| e.file_type().is_file())
        .filter_map(|e| {
            e.path()
                .strip_prefix(root)
                .ok()
                .map(|p| p.to_string_lossy().replace('\\', "/"))
        })
        .collect();
    files.sort();
    Ok(files)
}
