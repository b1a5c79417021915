//! Test support for Feature Factory.
//!
//! - **Fixtures**: temporary project trees laid out the way the pipeline
//!   expects them (`project_old/` next to a not-yet-created `project_new/`)
//! - **Scripted oracles**: [`MockOracle`](crate::llm::MockOracle) instances
//!   routed so a whole planning run answers deterministically
//!
//! # Example
//!
//! ```rust,ignore
//! use crate::testing::{planning_oracle, ProjectFixture};
//!
//! let fixture = ProjectFixture::two_files();
//! let plan = EditPlan::new("add logging").with_existing("a.py", "add logging");
//! let oracle = planning_oracle(&plan, "import logging\nprint(1)");
//! ```

pub mod fixtures;

pub use fixtures::*;
