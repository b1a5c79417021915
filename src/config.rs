//! Configuration management for Feature Factory.
//!
//! Configuration is loaded from `factory.toml` in the working directory,
//! then from the user config directory, then falls back to defaults. The
//! resolved [`FactoryConfig`] is passed explicitly into every component that
//! needs it; nothing downstream reads environment state.

use crate::error::{FactoryError, Result};
use globset::{Glob, GlobSet, GlobSetBuilder};
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::path::{Path, PathBuf};

/// Name of the configuration file looked up in the working directory.
pub const CONFIG_FILE_NAME: &str = "factory.toml";

/// Default directories to ignore during file traversal
pub fn default_ignore_dirs() -> HashSet<&'static str> {
    [
        "__pycache__",
        ".git",
        ".idea",
        "node_modules",
        "venv",
        ".venv",
        "target",
        ".pytest_cache",
        ".mypy_cache",
        "dist",
        "build",
    ]
    .into_iter()
    .collect()
}

/// Dependency manifest filenames scanned by the context builder
pub const MANIFEST_FILES: &[&str] = &[
    "requirements.txt",
    "package.json",
    "pom.xml",
    "pyproject.toml",
    "Cargo.toml",
    "go.mod",
];

/// Pipeline I/O settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PipelineConfig {
    /// Directory holding the original project.
    #[serde(default = "default_input_dir")]
    pub input_dir: PathBuf,

    /// Directory the reconciled project is written to.
    #[serde(default = "default_output_dir")]
    pub output_dir: PathBuf,

    /// Overwrite files already present in the output tree.
    #[serde(default = "default_true")]
    pub overwrite: bool,

    /// Number of leading lines of each manifest embedded in the context.
    #[serde(default = "default_manifest_preview_lines")]
    pub manifest_preview_lines: usize,

    /// Extra glob patterns excluded from snapshots (e.g. `"**/*.min.js"`).
    #[serde(default)]
    pub exclude_globs: Vec<String>,

    /// Remove a single fence wrapping an entire artifact before writing it.
    #[serde(default)]
    pub strip_fences: bool,

    /// Where run metadata (plan and report) is written. Defaults to a
    /// `<output_dir>.factory` sibling of the output tree.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub report_dir: Option<PathBuf>,
}

fn default_input_dir() -> PathBuf {
    PathBuf::from("project_old")
}

fn default_output_dir() -> PathBuf {
    PathBuf::from("project_new")
}

fn default_true() -> bool {
    true
}

fn default_manifest_preview_lines() -> usize {
    20
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            input_dir: default_input_dir(),
            output_dir: default_output_dir(),
            overwrite: true,
            manifest_preview_lines: default_manifest_preview_lines(),
            exclude_globs: Vec::new(),
            strip_fences: false,
            report_dir: None,
        }
    }
}

impl PipelineConfig {
    /// Resolve the run metadata directory.
    ///
    /// # Errors
    ///
    /// Returns a configuration error if the directory would land inside the
    /// input or output tree, or cannot be derived from `output_dir`.
    pub fn report_dir(&self) -> Result<PathBuf> {
        let dir = match &self.report_dir {
            Some(dir) => dir.clone(),
            None => {
                let name = self.output_dir.file_name().ok_or_else(|| {
                    FactoryError::config(
                        "pipeline.report_dir must be set when pipeline.output_dir has no final component",
                    )
                })?;
                let mut sibling = name.to_os_string();
                sibling.push(".factory");
                self.output_dir.with_file_name(sibling)
            }
        };
        if dir.starts_with(&self.output_dir) || dir.starts_with(&self.input_dir) {
            return Err(FactoryError::config(format!(
                "pipeline.report_dir '{}' must lie outside the input and output trees",
                dir.display()
            )));
        }
        Ok(dir)
    }

    /// Compile `exclude_globs` into a matcher.
    ///
    /// # Errors
    ///
    /// Returns a configuration error naming the first invalid pattern.
    pub fn exclude_set(&self) -> Result<GlobSet> {
        let mut builder = GlobSetBuilder::new();
        for pattern in &self.exclude_globs {
            let glob = Glob::new(pattern).map_err(|e| {
                FactoryError::config(format!("invalid exclude glob '{}': {}", pattern, e))
            })?;
            builder.add(glob);
        }
        builder
            .build()
            .map_err(|e| FactoryError::config(format!("failed to build exclude set: {}", e)))
    }
}

/// Which generation backend to talk to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum OracleBackend {
    /// Anthropic-compatible messages endpoint over HTTP
    #[default]
    Http,
    /// Local CLI reading the prompt on stdin and answering on stdout
    Command,
}

impl std::fmt::Display for OracleBackend {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            OracleBackend::Http => write!(f, "http"),
            OracleBackend::Command => write!(f, "command"),
        }
    }
}

/// Generation oracle settings.
///
/// # Example factory.toml
///
/// ```toml
/// [oracle]
/// backend = "http"
/// base_url = "https://api.anthropic.com"
/// model = "claude-sonnet-4-20250514"
/// api_key_env = "ANTHROPIC_API_KEY"
/// timeout_secs = 120
/// max_retries = 1
/// concurrency = 4
/// ```
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OracleConfig {
    #[serde(default)]
    pub backend: OracleBackend,

    #[serde(default = "default_base_url")]
    pub base_url: String,

    #[serde(default = "default_model")]
    pub model: String,

    /// Environment variable holding the API key (read once at startup).
    #[serde(default = "default_api_key_env")]
    pub api_key_env: String,

    #[serde(default = "default_max_tokens")]
    pub max_tokens: u32,

    /// Program for the command backend.
    #[serde(default = "default_command")]
    pub command: String,

    /// Arguments for the command backend.
    #[serde(default = "default_command_args")]
    pub args: Vec<String>,

    /// Per-call timeout.
    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,

    /// Retries after the first attempt for transient failures.
    #[serde(default = "default_max_retries")]
    pub max_retries: u32,

    /// Ceiling on in-flight generation requests. 1 keeps the pipeline sequential.
    #[serde(default = "default_concurrency")]
    pub concurrency: usize,

    #[serde(default = "default_system_message")]
    pub system_message: String,
}

fn default_base_url() -> String {
    "https://api.anthropic.com".to_string()
}

fn default_model() -> String {
    "claude-sonnet-4-20250514".to_string()
}

fn default_api_key_env() -> String {
    "ANTHROPIC_API_KEY".to_string()
}

fn default_max_tokens() -> u32 {
    4096
}

fn default_command() -> String {
    "claude".to_string()
}

fn default_command_args() -> Vec<String> {
    vec![
        "-p".to_string(),
        "--output-format".to_string(),
        "text".to_string(),
    ]
}

fn default_timeout_secs() -> u64 {
    120
}

fn default_max_retries() -> u32 {
    1
}

fn default_concurrency() -> usize {
    1
}

fn default_system_message() -> String {
    "You are a helpful assistant that answers concisely. If unsure, say 'I don't know.'"
        .to_string()
}

impl Default for OracleConfig {
    fn default() -> Self {
        Self {
            backend: OracleBackend::default(),
            base_url: default_base_url(),
            model: default_model(),
            api_key_env: default_api_key_env(),
            max_tokens: default_max_tokens(),
            command: default_command(),
            args: default_command_args(),
            timeout_secs: default_timeout_secs(),
            max_retries: default_max_retries(),
            concurrency: default_concurrency(),
            system_message: default_system_message(),
        }
    }
}

/// Retrieval gateway settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RetrievalConfig {
    #[serde(default = "default_top_k")]
    pub top_k: usize,
}

fn default_top_k() -> usize {
    5
}

impl Default for RetrievalConfig {
    fn default() -> Self {
        Self {
            top_k: default_top_k(),
        }
    }
}

/// Top-level configuration loaded from `factory.toml`.
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct FactoryConfig {
    #[serde(default)]
    pub pipeline: PipelineConfig,

    #[serde(default)]
    pub oracle: OracleConfig,

    #[serde(default)]
    pub retrieval: RetrievalConfig,
}

impl FactoryConfig {
    /// Load configuration, preferring an explicit path, then `factory.toml`
    /// in `work_dir`, then the user config directory.
    ///
    /// # Errors
    ///
    /// Returns an error if an explicitly named file is missing, or if any
    /// file found fails to parse.
    pub fn load(work_dir: &Path, explicit: Option<&Path>) -> Result<Self> {
        if let Some(path) = explicit {
            if !path.exists() {
                return Err(FactoryError::not_found(path));
            }
            return Self::from_file(path);
        }

        let local = work_dir.join(CONFIG_FILE_NAME);
        if local.exists() {
            return Self::from_file(&local);
        }

        if let Some(user) = Self::user_config_path() {
            if user.exists() {
                return Self::from_file(&user);
            }
        }

        Ok(Self::default())
    }

    /// Parse a configuration file.
    pub fn from_file(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)?;
        Self::from_toml(&content)
            .map_err(|e| FactoryError::config_with_path(e.to_string(), path.to_path_buf()))
    }

    /// Parse configuration from TOML text.
    pub fn from_toml(content: &str) -> Result<Self> {
        toml::from_str(content).map_err(|e| FactoryError::config(e.to_string()))
    }

    /// User-level config file location (`~/.config/factory/factory.toml` on Linux)
    pub fn user_config_path() -> Option<PathBuf> {
        dirs::config_dir().map(|d| d.join("factory").join(CONFIG_FILE_NAME))
    }

    /// Read the API key named by `oracle.api_key_env`.
    ///
    /// This is the only place the environment is consulted; callers pass the
    /// result into the oracle constructor.
    pub fn resolve_api_key(&self) -> Result<String> {
        std::env::var(&self.oracle.api_key_env).map_err(|_| {
            FactoryError::config(format!(
                "environment variable {} is not set",
                self.oracle.api_key_env
            ))
        })
    }

    /// Validate the configuration.
    ///
    /// # Errors
    ///
    /// Returns a configuration error describing the first invalid field.
    pub fn validate(&self) -> Result<()> {
        if self.oracle.concurrency == 0 {
            return Err(FactoryError::config("oracle.concurrency must be at least 1"));
        }
        if self.retrieval.top_k == 0 {
            return Err(FactoryError::config("retrieval.top_k must be at least 1"));
        }
        if self.oracle.timeout_secs == 0 {
            return Err(FactoryError::config("oracle.timeout_secs must be at least 1"));
        }
        if self.oracle.backend == OracleBackend::Command && self.oracle.command.trim().is_empty()
        {
            return Err(FactoryError::config(
                "oracle.command must be set for the command backend",
            ));
        }
        if self.pipeline.input_dir == self.pipeline.output_dir {
            return Err(FactoryError::config(
                "pipeline.input_dir and pipeline.output_dir must differ",
            ));
        }
        self.pipeline.exclude_set()?;
        self.pipeline.report_dir()?;
        Ok(())
    }
}
