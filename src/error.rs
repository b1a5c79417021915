//! Custom error types for Feature Factory.
//!
//! Every pipeline stage returns [`FactoryError`]. The variants mirror the
//! failure taxonomy of the plan/validate/apply pipeline so the binary can map
//! a failure to a stage-qualified message and an exit code in one place.

use crate::llm::OracleError;
use std::path::PathBuf;
use thiserror::Error;

/// Main error type for Feature Factory operations
#[derive(Error, Debug)]
pub enum FactoryError {
    // =========================================================================
    // Input Errors
    // =========================================================================
    /// Missing input project or file
    #[error("Not found: {path}")]
    NotFound { path: PathBuf },

    /// Failed to load or validate configuration
    #[error("Configuration error: {message}")]
    Config {
        message: String,
        path: Option<PathBuf>,
    },

    // =========================================================================
    // Planning Errors
    // =========================================================================
    /// Oracle output did not contain a parsable plan
    #[error("Schema extraction failed: {reason}")]
    SchemaExtraction { reason: String },

    /// Generation or retrieval service failure
    #[error("Oracle error: {0}")]
    Oracle(#[from] OracleError),

    // =========================================================================
    // Reconciliation Errors
    // =========================================================================
    /// Artifact/plan mismatch or post-apply validation failure
    #[error("Consistency error: {message}")]
    Consistency { message: String },

    // =========================================================================
    // Stage boundary
    // =========================================================================
    /// A pipeline stage failed; wraps the underlying cause with the stage name
    #[error("Stage '{stage}' failed: {source}")]
    Stage {
        stage: String,
        #[source]
        source: Box<FactoryError>,
    },

    // =========================================================================
    // Wrapped Errors
    // =========================================================================
    /// IO error wrapper
    #[error(transparent)]
    Io(#[from] std::io::Error),

    /// JSON error wrapper
    #[error(transparent)]
    Json(#[from] serde_json::Error),

    /// Generic error wrapper
    #[error(transparent)]
    Other(#[from] anyhow::Error),
}

impl FactoryError {
    // =========================================================================
    // Constructor helpers
    // =========================================================================

    /// Create a not-found error
    pub fn not_found(path: impl Into<PathBuf>) -> Self {
        Self::NotFound { path: path.into() }
    }

    /// Create a configuration error
    pub fn config(message: impl Into<String>) -> Self {
        Self::Config {
            message: message.into(),
            path: None,
        }
    }

    /// Create a configuration error with path
    pub fn config_with_path(message: impl Into<String>, path: PathBuf) -> Self {
        Self::Config {
            message: message.into(),
            path: Some(path),
        }
    }

    /// Create a schema extraction error
    pub fn schema(reason: impl Into<String>) -> Self {
        Self::SchemaExtraction {
            reason: reason.into(),
        }
    }

    /// Create a consistency error
    pub fn consistency(message: impl Into<String>) -> Self {
        Self::Consistency {
            message: message.into(),
        }
    }

    /// Wrap an error with the name of the stage it escaped from.
    ///
    /// Already-wrapped errors keep their innermost stage.
    pub fn at_stage(self, stage: impl Into<String>) -> Self {
        match self {
            Self::Stage { .. } => self,
            other => Self::Stage {
                stage: stage.into(),
                source: Box::new(other),
            },
        }
    }

    // =========================================================================
    // Classification helpers
    // =========================================================================

    /// The error with any stage wrapper removed
    pub fn root(&self) -> &FactoryError {
        match self {
            Self::Stage { source, .. } => source.root(),
            other => other,
        }
    }

    /// Name of the stage this error was raised in, if known
    pub fn stage(&self) -> Option<&str> {
        match self {
            Self::Stage { stage, .. } => Some(stage),
            _ => None,
        }
    }

    /// Check if retrying the failing operation could succeed
    pub fn is_retryable(&self) -> bool {
        match self.root() {
            Self::Oracle(e) => e.is_transient(),
            _ => false,
        }
    }

    /// Get error code for exit status
    pub fn exit_code(&self) -> i32 {
        match self.root() {
            Self::SchemaExtraction { .. } => 3,
            Self::Oracle(_) => 4,
            Self::Consistency { .. } => 5,
            Self::NotFound { .. } => 6,
            Self::Config { .. } => 7,
            _ => 1,
        }
    }
}

/// Type alias for Feature Factory results
pub type Result<T> = std::result::Result<T, FactoryError>;

/// Extension trait for tagging results with the stage they belong to
pub trait StageContext<T> {
    fn stage(self, stage: &str) -> Result<T>;
}

impl<T, E: Into<FactoryError>> StageContext<T> for std::result::Result<T, E> {
    fn stage(self, stage: &str) -> Result<T> {
        self.map_err(|e| e.into().at_stage(stage))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_display() {
        let err = FactoryError::not_found("project_old");
        assert!(err.to_string().contains("project_old"));

        let err = FactoryError::schema("no ```json block");
        assert!(err.to_string().contains("no ```json block"));
    }

    #[test]
    fn test_stage_wrapping_keeps_innermost_stage() {
        let err = FactoryError::consistency("3 artifacts for 2 tasks")
            .at_stage("apply")
            .at_stage("pipeline");

        assert_eq!(err.stage(), Some("apply"));
        assert!(matches!(err.root(), FactoryError::Consistency { .. }));
        assert!(err.to_string().contains("apply"));
        assert!(err.to_string().contains("3 artifacts"));
    }

    #[test]
    fn test_exit_codes() {
        assert_eq!(FactoryError::schema("x").exit_code(), 3);
        assert_eq!(
            FactoryError::Oracle(OracleError::permanent("denied")).exit_code(),
            4
        );
        assert_eq!(FactoryError::consistency("x").exit_code(), 5);
        assert_eq!(FactoryError::not_found("x").exit_code(), 6);
        assert_eq!(FactoryError::config("x").exit_code(), 7);
        assert_eq!(
            FactoryError::not_found("x").at_stage("read").exit_code(),
            6
        );
    }

    #[test]
    fn test_is_retryable() {
        assert!(FactoryError::Oracle(OracleError::transient("timeout")).is_retryable());
        assert!(!FactoryError::Oracle(OracleError::malformed("bad")).is_retryable());
        assert!(!FactoryError::schema("bad").is_retryable());
    }

    #[test]
    fn test_stage_context_trait() {
        let result: std::result::Result<(), std::io::Error> = Err(std::io::Error::new(
            std::io::ErrorKind::PermissionDenied,
            "access denied",
        ));

        let err = result.stage("clone").unwrap_err();
        assert_eq!(err.stage(), Some("clone"));
        assert!(matches!(err.root(), FactoryError::Io(_)));
        assert!(err.to_string().contains("access denied"));
    }

    #[test]
    fn test_config_with_path() {
        let path = PathBuf::from("/test/factory.toml");
        let err = FactoryError::config_with_path("failed to parse", path.clone());
        if let FactoryError::Config {
            message,
            path: opt_path,
        } = err
        {
            assert_eq!(message, "failed to parse");
            assert_eq!(opt_path, Some(path));
        } else {
            panic!("Wrong error variant");
        }
    }
}
