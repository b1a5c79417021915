//! Feature Factory - plan, generate, and reconcile LLM-driven project edits
//!
//! Takes an existing project and a natural-language feature request, asks a
//! generation oracle to plan the change as a structured [`EditPlan`], has it
//! write each planned file, and reconciles the results onto a fresh copy of
//! the project.
//!
//! # Architecture
//!
//! The crate is organized into several modules, leaves first:
//!
//! - [`snapshot`] - Project snapshot reading (text files only)
//! - [`context`] - Deterministic planning context (manifests + tree)
//! - [`retrieval`] - Ranked retrieval over a snapshot
//! - [`llm`] - Generation oracle trait, backends, retry and fan-out
//! - [`plan`] - Edit plan types, path remapping, schema extraction
//! - [`prompt`] - Planning templates and per-file task prompts
//! - [`planner`] - The planning state machine
//! - [`reconcile`] - Output tree clone, apply and validate
//! - [`pipeline`] - End-to-end orchestration and run reports
//! - [`config`] - Configuration loading and validation
//! - [`error`] - Custom error types and handling
//!
//! # Example
//!
//! ```rust,ignore
//! use feature_factory::{create_oracle, FactoryConfig, Pipeline};
//!
//! let config = FactoryConfig::load(".".as_ref(), None)?;
//! let oracle = create_oracle(&config, Some(config.resolve_api_key()?))?;
//! let report = Pipeline::new(config, oracle).run("add logging").await?;
//! assert!(report.is_success());
//! ```

pub mod config;
pub mod context;
pub mod error;
pub mod llm;
pub mod pipeline;
pub mod plan;
pub mod planner;
pub mod prompt;
pub mod reconcile;
pub mod retrieval;
pub mod snapshot;

#[cfg(test)]
pub mod testing;

// Re-export commonly used types
pub use error::{FactoryError, Result, StageContext};

pub use config::{FactoryConfig, OracleBackend, OracleConfig, PipelineConfig, RetrievalConfig};

pub use snapshot::{read_snapshot, SnapshotReader, SourceRecord};

pub use context::{build_context, context_hash, ContextBuilder, DependencyManifest};

pub use retrieval::{KeywordIndex, RetrievalGateway};

pub use llm::{
    create_oracle, generate_all, Completion, CompletionRequest, GenerationOracle, MockOracle,
    OracleError, RetryPolicy, RetryingOracle,
};

pub use plan::{extract_plan, EditPlan, ExistingFileTask, NewFileTask, PathRemapper};

pub use prompt::{expand_tasks, strip_code_fence};

pub use planner::{FeaturePlanner, PlanOutcome, PlannerState, PlanningTrace};

pub use reconcile::{ApplyReport, Reconciler, ValidationReport};

pub use pipeline::{load_plan, write_plan, Pipeline, PipelineReport};
