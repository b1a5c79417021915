//! Plan extraction from raw oracle text.
//!
//! The oracle is asked to answer with a ```` ```json ```` fenced block holding
//! an [`EditPlan`]. Anything else is a [`FactoryError::SchemaExtraction`];
//! malformed output is surfaced, never repaired.

use super::EditPlan;
use crate::error::{FactoryError, Result};
use regex::Regex;
use std::sync::OnceLock;
use tracing::debug;

fn json_fence() -> Option<&'static Regex> {
    static FENCE: OnceLock<Option<Regex>> = OnceLock::new();
    FENCE
        .get_or_init(|| Regex::new(r"(?is)```json[ \t]*\r?\n(.*?)```").ok())
        .as_ref()
}

/// Body of the first ```` ```json ```` block in `text`.
pub fn find_json_block(text: &str) -> Option<&str> {
    json_fence()?
        .captures(text)
        .and_then(|caps| caps.get(1))
        .map(|m| m.as_str())
}

/// Parse the plan out of an oracle response.
///
/// # Errors
///
/// Returns [`FactoryError::SchemaExtraction`] when no fenced json block is
/// present or its body does not match the plan schema.
pub fn extract_plan(text: &str) -> Result<EditPlan> {
    let block = find_json_block(text)
        .ok_or_else(|| FactoryError::schema("no ```json fenced block in oracle response"))?;

    let plan: EditPlan = serde_json::from_str(block)
        .map_err(|e| FactoryError::schema(format!("plan block does not match schema: {}", e)))?;

    debug!(
        "Extracted plan: {} existing, {} new",
        plan.existing_files.len(),
        plan.new_files.len()
    );
    Ok(plan)
}

/// Render a plan in the wire format [`extract_plan`] reads.
pub fn render_fenced(plan: &EditPlan) -> Result<String> {
    Ok(format!("```json\n{}\n```", serde_json::to_string_pretty(plan)?))
}

#[cfg(test)]
mod tests {
    use super::*;

    const RESPONSE: &str = r#"Here is the plan:

```json
{
  "feature_request": "add logging",
  "analysis_results": " ",
  "existing_files": [
    {"file_path": "project_old/app.py", "task": "configure logging at startup"}
  ],
  "new_files": [
    {"file_path": "project_old/log_config.py", "purpose": "logging configuration"}
  ]
}
```

Let me know if you need anything else."#;

    #[test]
    fn test_extracts_fenced_plan() {
        let plan = extract_plan(RESPONSE).unwrap();
        assert_eq!(plan.feature_request, "add logging");
        assert_eq!(plan.existing_files.len(), 1);
        assert_eq!(plan.existing_files[0].file_path, "project_old/app.py");
        assert_eq!(plan.new_files[0].purpose, "logging configuration");
        assert!(plan.existing_files[0].content.is_none());
    }

    #[test]
    fn test_first_block_wins() {
        let text = "```json\n{\"existing_files\":[],\"new_files\":[]}\n```\n\
                    ```json\n{\"existing_files\":[{\"file_path\":\"a\",\"task\":\"t\"}],\"new_files\":[]}\n```";
        assert!(extract_plan(text).unwrap().is_empty());
    }

    #[test]
    fn test_uppercase_tag_accepted() {
        let text = "```JSON\n{\"existing_files\":[],\"new_files\":[]}\n```";
        assert!(extract_plan(text).is_ok());
    }

    #[test]
    fn test_missing_block_is_schema_error() {
        let err = extract_plan("{\"existing_files\": [], \"new_files\": []}").unwrap_err();
        assert!(matches!(err, FactoryError::SchemaExtraction { .. }));
    }

    #[test]
    fn test_untagged_fence_is_schema_error() {
        let err = extract_plan("```\n{\"existing_files\": [], \"new_files\": []}\n```").unwrap_err();
        assert!(matches!(err, FactoryError::SchemaExtraction { .. }));
    }

    #[test]
    fn test_invalid_json_is_schema_error() {
        let err = extract_plan("```json\n{\"existing_files\": [,]}\n```").unwrap_err();
        assert!(err.to_string().contains("does not match schema"));
    }

    #[test]
    fn test_wrong_shape_is_schema_error() {
        let text = "```json\n{\"existing_files\": [{\"path\": \"a.py\"}], \"new_files\": []}\n```";
        assert!(matches!(
            extract_plan(text).unwrap_err(),
            FactoryError::SchemaExtraction { .. }
        ));
    }

    #[test]
    fn test_schema_round_trip() {
        let plan = EditPlan::new("add logging")
            .with_existing("project_old/a.py", "import logging and log startup")
            .with_existing("project_old/pkg/b.py", "log errors")
            .with_new("project_old/pkg/log.py", "shared logger");

        let wire = render_fenced(&plan).unwrap();
        assert_eq!(extract_plan(&wire).unwrap(), plan);
    }
}
