//! Planning prompt templates with marker substitution.
//!
//! # Example
//!
//! ```
//! use feature_factory::prompt::templates::{PromptKind, TemplateMarker, TemplateVars};
//!
//! let vars = TemplateVars::new()
//!     .set(TemplateMarker::FeatureRequest, "add logging")
//!     .set(TemplateMarker::ProjectContext, "Project Structure:\napp/");
//! let prompt = PromptKind::ImpactedNodes.render(&vars);
//! assert!(prompt.contains("add logging"));
//! ```

use serde::{Deserialize, Serialize};
use std::collections::HashMap;

/// Injection points inside a template.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum TemplateMarker {
    FeatureRequest,
    ProjectContext,
    AnalysisResults,
}

impl TemplateMarker {
    /// Tag string replaced in the template text.
    ///
    /// ```
    /// use feature_factory::prompt::templates::TemplateMarker;
    ///
    /// assert_eq!(TemplateMarker::FeatureRequest.tag(), "{{FEATURE_REQUEST}}");
    /// ```
    #[must_use]
    pub fn tag(&self) -> &'static str {
        match self {
            TemplateMarker::FeatureRequest => "{{FEATURE_REQUEST}}",
            TemplateMarker::ProjectContext => "{{PROJECT_CONTEXT}}",
            TemplateMarker::AnalysisResults => "{{ANALYSIS_RESULTS}}",
        }
    }
}

/// Values substituted for markers.
#[derive(Debug, Clone, Default)]
pub struct TemplateVars {
    values: HashMap<TemplateMarker, String>,
}

impl TemplateVars {
    pub fn new() -> Self {
        Self::default()
    }

    #[must_use]
    pub fn set(mut self, marker: TemplateMarker, value: impl Into<String>) -> Self {
        self.values.insert(marker, value.into());
        self
    }

    pub fn get(&self, marker: TemplateMarker) -> Option<&str> {
        self.values.get(&marker).map(String::as_str)
    }
}

const IMPACTED_NODES: &str = "\
You are analysing an existing software project before a change is made to it.

Feature Request: {{FEATURE_REQUEST}}

Project Context:
{{PROJECT_CONTEXT}}

List the components (files, modules, classes and functions) that this feature \
request will touch or that must be created. For each one give its file path and \
one sentence on why it is affected.";

const IMPACTED_EDGES: &str = "\
You are analysing an existing software project before a change is made to it.

Feature Request: {{FEATURE_REQUEST}}

Project Context:
{{PROJECT_CONTEXT}}

List the relationships between project components that this feature request \
affects: imports, calls, configuration and data passed between files. Give each \
relationship as `source -> target: reason`.";

const IMPACT_REPORT: &str = "\
You are analysing an existing software project before a change is made to it.

Feature Request: {{FEATURE_REQUEST}}

Project Context:
{{PROJECT_CONTEXT}}

Write a short impact report for this feature request: the files that must \
change, the new files that must be added, and any risk to existing behaviour.";

const PREPROCESSING: &str = r#"Using the results of the feature analysis, identify the specific files to be handled for the following feature request:

Feature Request: {{FEATURE_REQUEST}}

Feature Analysis Results:
{{ANALYSIS_RESULTS}}

For each impacted file:
- Provide the file path.
- Specify the task to be performed on the file (e.g., modify, add functionality).

For any new file required:
- Specify the file path.
- Provide a brief description of its purpose.
- Suggest the initial content or structure the file should include.

Ensure the output clearly separates existing files and new files to be created. Output this information as a JSON file with the following format:

```json
{
  "feature_request": "{{FEATURE_REQUEST}}",
  "analysis_results": " ",
  "existing_files": [
    {
      "file_path": "path/to/file.extension",
      "task": "Modification needed in this file"
    }
  ],
  "new_files": [
    {
      "file_path": "path/to/new/file.extension",
      "purpose": "Purpose of the new file"
    }
  ]
}
```"#;

/// The planning prompts issued by the feature planner.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum PromptKind {
    ImpactedNodes,
    ImpactedEdges,
    ImpactReport,
    Preprocessing,
}

impl PromptKind {
    /// The three analysis prompts, in the order their answers are combined.
    pub const ANALYSIS: [PromptKind; 3] = [
        PromptKind::ImpactedNodes,
        PromptKind::ImpactedEdges,
        PromptKind::ImpactReport,
    ];

    #[must_use]
    pub fn template(&self) -> &'static str {
        match self {
            PromptKind::ImpactedNodes => IMPACTED_NODES,
            PromptKind::ImpactedEdges => IMPACTED_EDGES,
            PromptKind::ImpactReport => IMPACT_REPORT,
            PromptKind::Preprocessing => PREPROCESSING,
        }
    }

    /// Markers this template expects to be filled.
    #[must_use]
    pub fn markers(&self) -> &'static [TemplateMarker] {
        match self {
            PromptKind::Preprocessing => &[
                TemplateMarker::FeatureRequest,
                TemplateMarker::AnalysisResults,
            ],
            _ => &[
                TemplateMarker::FeatureRequest,
                TemplateMarker::ProjectContext,
            ],
        }
    }

    /// Substitute `vars` into the template. Unset markers become empty.
    #[must_use]
    pub fn render(&self, vars: &TemplateVars) -> String {
        let mut out = self.template().to_string();
        for marker in self.markers() {
            out = out.replace(marker.tag(), vars.get(*marker).unwrap_or_default());
        }
        out
    }

    /// Short label used in logs and traces.
    #[must_use]
    pub fn label(&self) -> &'static str {
        match self {
            PromptKind::ImpactedNodes => "nodes",
            PromptKind::ImpactedEdges => "edges",
            PromptKind::ImpactReport => "impact report",
            PromptKind::Preprocessing => "preprocessing",
        }
    }
}

/// Combine the three analysis answers into `analysis_results`.
#[must_use]
pub fn render_analysis_results(nodes: &str, edges: &str, report: &str) -> String {
    format!(
        "Nodes:\n{}\n\nEdges:\n{}\n\nImpact Report:\n{}",
        nodes, edges, report
    )
}
