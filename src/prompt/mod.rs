//! Prompt construction.
//!
//! - [`templates`] - the analysis and preprocessing prompts used while planning
//! - [`expander`] - per-file generation prompts built from an [`EditPlan`]
//!
//! [`EditPlan`]: crate::plan::EditPlan

pub mod expander;
pub mod templates;

pub use expander::{expand_tasks, strip_code_fence};
pub use templates::{render_analysis_results, PromptKind, TemplateMarker, TemplateVars};
