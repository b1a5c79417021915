//! Project reconciler.
//!
//! The only component that writes to the output tree. It clones the input
//! project into a fresh output directory, writes each generated artifact to
//! its remapped path, and checks that every planned existing file is present
//! afterwards. Nothing here rolls back: a failed run leaves its partial
//! output in place for inspection.

use crate::error::{FactoryError, Result};
use crate::plan::EditPlan;
pub use crate::plan::PathRemapper;
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};
use tracing::{debug, info, warn};
use walkdir::WalkDir;

/// Files touched by [`Reconciler::apply`].
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ApplyReport {
    pub written: Vec<PathBuf>,
    /// Targets left untouched because they existed and overwrite was off.
    pub skipped: Vec<PathBuf>,
}

/// Outcome of [`Reconciler::validate`].
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ValidationReport {
    pub expected: Vec<PathBuf>,
    pub missing: Vec<PathBuf>,
}

impl ValidationReport {
    #[must_use]
    pub fn is_pass(&self) -> bool {
        self.missing.is_empty()
    }

    /// Turn missing files into a [`FactoryError::Consistency`].
    pub fn ensure_pass(&self) -> Result<()> {
        if self.is_pass() {
            return Ok(());
        }
        let listed: Vec<String> = self
            .missing
            .iter()
            .map(|p| p.display().to_string())
            .collect();
        Err(FactoryError::consistency(format!(
            "{} of {} planned files missing after apply: {}",
            self.missing.len(),
            self.expected.len(),
            listed.join(", ")
        )))
    }
}

/// Applies a plan's artifacts onto a clone of the input project.
pub struct Reconciler {
    remapper: PathRemapper,
}

impl Reconciler {
    pub fn new(remapper: PathRemapper) -> Self {
        Self { remapper }
    }

    pub fn remapper(&self) -> &PathRemapper {
        &self.remapper
    }

    /// Replace the output tree with a full copy of the input tree.
    ///
    /// Returns the number of files copied.
    ///
    /// # Errors
    ///
    /// Returns [`FactoryError::NotFound`] if the input root is missing and
    /// [`FactoryError::Consistency`] if removing the output tree would
    /// remove the input tree.
    pub fn clone_tree(&self) -> Result<usize> {
        let old_root = self.remapper.old_root();
        let new_root = self.remapper.new_root();

        if !old_root.is_dir() {
            return Err(FactoryError::not_found(old_root));
        }
        check_disjoint(old_root, new_root)?;

        if new_root.exists() {
            debug!("Removing previous output {}", new_root.display());
            fs::remove_dir_all(new_root)?;
        }
        fs::create_dir_all(new_root)?;

        let entries: Vec<walkdir::DirEntry> = WalkDir::new(old_root)
            .min_depth(1)
            .into_iter()
            .filter_map(|e| e.ok())
            .filter(|e| !e.path().starts_with(new_root))
            .collect();

        let mut copied = 0;
        for entry in entries {
            let rel = entry.path().strip_prefix(old_root).unwrap_or(entry.path());
            let target = new_root.join(rel);

            if entry.file_type().is_dir() {
                fs::create_dir_all(&target)?;
                continue;
            }
            if let Some(parent) = target.parent() {
                fs::create_dir_all(parent)?;
            }
            match fs::copy(entry.path(), &target) {
                Ok(_) => copied += 1,
                Err(e) if entry.path_is_symlink() => {
                    warn!("Skipping unreadable link {}: {}", entry.path().display(), e);
                }
                Err(e) => return Err(e.into()),
            }
        }

        info!(
            "Cloned {} files from {} to {}",
            copied,
            old_root.display(),
            new_root.display()
        );
        Ok(copied)
    }

    /// Write `artifacts[i]` to the output path of the plan's i-th task.
    ///
    /// Tasks are ordered existing files first, then new files. With
    /// `overwrite` off, targets that already exist are kept.
    ///
    /// # Errors
    ///
    /// Returns [`FactoryError::Consistency`] before writing anything if the
    /// artifact count differs from the task count or a planned path cannot
    /// be remapped.
    pub fn apply(&self, plan: &EditPlan, artifacts: &[String], overwrite: bool) -> Result<ApplyReport> {
        if artifacts.len() != plan.task_count() {
            return Err(FactoryError::consistency(format!(
                "{} artifacts for {} planned tasks ({} existing, {} new)",
                artifacts.len(),
                plan.task_count(),
                plan.existing_files.len(),
                plan.new_files.len()
            )));
        }

        let targets = plan
            .paths()
            .map(|p| self.remapper.output_path(p))
            .collect::<Result<Vec<_>>>()?;

        let mut report = ApplyReport::default();
        for (target, artifact) in targets.into_iter().zip(artifacts) {
            if !overwrite && target.exists() {
                debug!("Keeping existing {}", target.display());
                report.skipped.push(target);
                continue;
            }
            if let Some(parent) = target.parent() {
                fs::create_dir_all(parent)?;
            }
            fs::write(&target, artifact)?;
            debug!("Wrote {} ({} bytes)", target.display(), artifact.len());
            report.written.push(target);
        }

        info!(
            "Applied plan: {} written, {} skipped",
            report.written.len(),
            report.skipped.len()
        );
        Ok(report)
    }

    /// Check that every planned existing file is present in the output tree.
    ///
    /// New files are not part of the check.
    pub fn validate(&self, plan: &EditPlan) -> Result<ValidationReport> {
        let expected = plan
            .existing_files
            .iter()
            .map(|t| self.remapper.output_path(&t.file_path))
            .collect::<Result<Vec<_>>>()?;

        let missing: Vec<PathBuf> = expected.iter().filter(|p| !p.is_file()).cloned().collect();
        for path in &missing {
            warn!("Missing after apply: {}", path.display());
        }

        Ok(ValidationReport { expected, missing })
    }
}

/// Refuse to clone when deleting `new_root` would delete `old_root`.
fn check_disjoint(old_root: &Path, new_root: &Path) -> Result<()> {
    let Ok(new_abs) = fs::canonicalize(new_root) else {
        return Ok(());
    };
    let old_abs = fs::canonicalize(old_root)?;
    if old_abs.starts_with(&new_abs) {
        return Err(FactoryError::consistency(format!(
            "output {} contains the input project {}",
            new_root.display(),
            old_root.display()
        )));
    }
    Ok(())
}
