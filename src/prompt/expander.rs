//! Task expansion: one self-contained generation prompt per planned file.
//!
//! Prompts come out in plan order, existing files first, then new files.
//! That order is the contract the reconciler relies on to pair artifacts
//! with their target paths.

use crate::plan::{EditPlan, ExistingFileTask, NewFileTask};

const ROLE_LINE: &str = "You are an expert at writing source code. Perform the following task:";

/// Prompt for modifying an existing file.
#[must_use]
pub fn existing_file_prompt(plan: &EditPlan, task: &ExistingFileTask) -> String {
    format!(
        "{ROLE_LINE}\n\n\
         Task Request: {}\n\n\
         Feature Request: {}\n\n\
         File Path: {}\n\n\
         File Content:\n{}\n\n\
         Analysis Results: {}\n\n\
         Output ONLY the complete modified source code for the specified file. \
         Do not include comments, explanations, or any other text.",
        task.task,
        plan.feature_request,
        task.file_path,
        task.content.as_deref().unwrap_or_default(),
        plan.analysis_results,
    )
}

/// Prompt for creating a new file.
#[must_use]
pub fn new_file_prompt(plan: &EditPlan, task: &NewFileTask) -> String {
    format!(
        "{ROLE_LINE}\n\n\
         Task Request: Create a new file for {}\n\n\
         Feature Request: {}\n\n\
         File Path: {}\n\n\
         Analysis Results: {}\n\n\
         Output ONLY the complete source code for the new file. \
         Do not include comments, explanations, or any other text.",
        task.purpose, plan.feature_request, task.file_path, plan.analysis_results,
    )
}

/// Expand a plan into generation prompts, one per task, in plan order.
#[must_use]
pub fn expand_tasks(plan: &EditPlan) -> Vec<String> {
    plan.existing_files
        .iter()
        .map(|task| existing_file_prompt(plan, task))
        .chain(plan.new_files.iter().map(|task| new_file_prompt(plan, task)))
        .collect()
}

/// Remove one markdown fence wrapping the whole artifact.
///
/// Text that is not entirely enclosed by a single fence is returned
/// unchanged, as is a fenced body that itself contains fences.
#[must_use]
pub fn strip_code_fence(text: &str) -> &str {
    let trimmed = text.trim();
    let Some(rest) = trimmed.strip_prefix("```") else {
        return text;
    };
    let Some((_info, body)) = rest.split_once('\n') else {
        return text;
    };
    let Some(body) = body.trim_end().strip_suffix("```") else {
        return text;
    };
    if body.contains("```") {
        return text;
    }
    body.strip_suffix('\n').unwrap_or(body)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn plan() -> EditPlan {
        let mut plan = EditPlan::new("add logging")
            .with_existing("project_old/a.py", "import logging")
            .with_existing("project_old/b.py", "log calls")
            .with_new("project_old/log.py", "logger setup");
        plan.analysis_results = "Nodes:\na.py".to_string();
        plan.existing_files[0].content = Some("print(1)".to_string());
        plan
    }

    #[test]
    fn test_one_prompt_per_task_in_order() {
        let prompts = expand_tasks(&plan());
        assert_eq!(prompts.len(), 3);
        assert!(prompts[0].contains("File Path: project_old/a.py"));
        assert!(prompts[1].contains("File Path: project_old/b.py"));
        assert!(prompts[2].contains("File Path: project_old/log.py"));
    }

    #[test]
    fn test_existing_prompt_layout() {
        let prompts = expand_tasks(&plan());
        assert_eq!(
            prompts[0],
            "You are an expert at writing source code. Perform the following task:\n\n\
             Task Request: import logging\n\n\
             Feature Request: add logging\n\n\
             File Path: project_old/a.py\n\n\
             File Content:\nprint(1)\n\n\
             Analysis Results: Nodes:\na.py\n\n\
             Output ONLY the complete modified source code for the specified file. \
             Do not include comments, explanations, or any other text."
        );
    }

    #[test]
    fn test_new_file_prompt_has_purpose_and_no_content() {
        let prompts = expand_tasks(&plan());
        assert!(prompts[2].contains("Task Request: Create a new file for logger setup"));
        assert!(!prompts[2].contains("File Content:"));
        assert!(prompts[2].ends_with(
            "Output ONLY the complete source code for the new file. \
             Do not include comments, explanations, or any other text."
        ));
    }

    #[test]
    fn test_empty_plan_expands_to_nothing() {
        assert!(expand_tasks(&EditPlan::new("x")).is_empty());
    }

    #[test]
    fn test_strip_code_fence() {
        assert_eq!(strip_code_fence("```python\nimport logging\nprint(1)\n```"), "import logging\nprint(1)");
        assert_eq!(strip_code_fence("  ```\nx = 1\n```\n"), "x = 1");
    }

    #[test]
    fn test_strip_code_fence_leaves_unfenced_text() {
        let raw = "import logging\nprint(1)";
        assert_eq!(strip_code_fence(raw), raw);
        let prose = "Here you go:\n```python\nx\n```";
        assert_eq!(strip_code_fence(prose), prose);
    }

    #[test]
    fn test_strip_code_fence_leaves_nested_fences() {
        let doc = "```markdown\n# Usage\n```sh\nrun\n```\n```";
        assert_eq!(strip_code_fence(doc), doc);
    }
}
