//! Feature planner.
//!
//! Runs the planning state machine:
//!
//! ```text
//! ANALYZING -> PREPROCESSING -> EXTRACTING -> ENRICHING -> VALIDATED
//!     |              |              |             |
//!     v              +------+-------+             v
//! ANALYSIS_FAILED           v              ENRICHMENT_FAILED
//!                    EXTRACTION_FAILED
//! ```
//!
//! Analysis is three independent oracle calls whose answers are only used
//! together. Extraction never repairs oracle output. Enrichment reads file
//! content from disk and degrades to a placeholder for files it cannot read.

use crate::error::{FactoryError, Result};
use crate::llm::{generate_all, CompletionRequest, GenerationOracle};
use crate::plan::{extract_plan, EditPlan, PathRemapper};
use crate::prompt::{render_analysis_results, PromptKind, TemplateMarker, TemplateVars};
use crate::retrieval::RetrievalGateway;
use crate::snapshot::SourceRecord;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::sync::Arc;
use tracing::{debug, error, info, warn};

/// State of the planning state machine.
///
/// # Example
///
/// ```
/// use feature_factory::planner::PlannerState;
///
/// assert_eq!(PlannerState::Analyzing.to_string(), "ANALYZING");
/// assert!(PlannerState::Validated.is_terminal());
/// assert!(PlannerState::ExtractionFailed.is_failure());
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum PlannerState {
    Analyzing,
    Preprocessing,
    Extracting,
    Enriching,
    Validated,
    AnalysisFailed,
    ExtractionFailed,
    EnrichmentFailed,
}

impl std::fmt::Display for PlannerState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            PlannerState::Analyzing => "ANALYZING",
            PlannerState::Preprocessing => "PREPROCESSING",
            PlannerState::Extracting => "EXTRACTING",
            PlannerState::Enriching => "ENRICHING",
            PlannerState::Validated => "VALIDATED",
            PlannerState::AnalysisFailed => "ANALYSIS_FAILED",
            PlannerState::ExtractionFailed => "EXTRACTION_FAILED",
            PlannerState::EnrichmentFailed => "ENRICHMENT_FAILED",
        };
        write!(f, "{}", name)
    }
}

impl PlannerState {
    #[must_use]
    pub fn is_terminal(&self) -> bool {
        matches!(self, PlannerState::Validated) || self.is_failure()
    }

    #[must_use]
    pub fn is_failure(&self) -> bool {
        matches!(
            self,
            PlannerState::AnalysisFailed
                | PlannerState::ExtractionFailed
                | PlannerState::EnrichmentFailed
        )
    }

    /// Failure state entered when this state's work fails.
    #[must_use]
    pub fn failure(&self) -> PlannerState {
        match self {
            PlannerState::Analyzing | PlannerState::AnalysisFailed => PlannerState::AnalysisFailed,
            PlannerState::Enriching | PlannerState::EnrichmentFailed => {
                PlannerState::EnrichmentFailed
            }
            _ => PlannerState::ExtractionFailed,
        }
    }

    /// Stage name reported when this state fails.
    #[must_use]
    pub fn stage_name(&self) -> &'static str {
        match self {
            PlannerState::Analyzing | PlannerState::AnalysisFailed => "analysis",
            PlannerState::Preprocessing => "preprocessing",
            PlannerState::Extracting | PlannerState::ExtractionFailed => "extraction",
            PlannerState::Enriching | PlannerState::EnrichmentFailed => "enrichment",
            PlannerState::Validated => "planning",
        }
    }
}

/// One recorded state entry.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Transition {
    pub state: PlannerState,
    pub at: DateTime<Utc>,
}

/// Ordered history of planner states.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct PlanningTrace {
    pub transitions: Vec<Transition>,
}

impl PlanningTrace {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn enter(&mut self, state: PlannerState) {
        debug!("Planner -> {}", state);
        self.transitions.push(Transition {
            state,
            at: Utc::now(),
        });
    }

    pub fn current(&self) -> Option<PlannerState> {
        self.transitions.last().map(|t| t.state)
    }

    pub fn states(&self) -> Vec<PlannerState> {
        self.transitions.iter().map(|t| t.state).collect()
    }
}

/// A validated plan and how the planner got there.
#[derive(Debug, Clone)]
pub struct PlanOutcome {
    pub plan: EditPlan,
    pub trace: PlanningTrace,
}

/// Placeholder attached to a planned file that does not exist.
pub fn missing_file_placeholder(file_path: &str) -> String {
    format!("File not found: {}", file_path)
}

/// Builds a validated [`EditPlan`] from a feature request and project context.
pub struct FeaturePlanner {
    oracle: Arc<dyn GenerationOracle>,
    retrieval: Arc<dyn RetrievalGateway>,
    remapper: PathRemapper,
    concurrency: usize,
    top_k: usize,
}

impl FeaturePlanner {
    /// Create a planner with sequential calls and a top-5 grounding set.
    pub fn new(
        oracle: Arc<dyn GenerationOracle>,
        retrieval: Arc<dyn RetrievalGateway>,
        remapper: PathRemapper,
    ) -> Self {
        Self {
            oracle,
            retrieval,
            remapper,
            concurrency: 1,
            top_k: 5,
        }
    }

    /// Maximum oracle calls in flight during analysis.
    #[must_use]
    pub fn with_concurrency(mut self, concurrency: usize) -> Self {
        self.concurrency = concurrency.max(1);
        self
    }

    /// Number of retrieved records grounding the planning calls.
    #[must_use]
    pub fn with_top_k(mut self, top_k: usize) -> Self {
        self.top_k = top_k;
        self
    }

    /// Run the state machine to VALIDATED.
    ///
    /// `snapshot` is only used to warn about planned files that were not in
    /// the project when it was read.
    ///
    /// # Errors
    ///
    /// The error is wrapped with the name of the stage that failed:
    /// `analysis` (oracle or retrieval failure), `preprocessing` (oracle
    /// failure), `extraction` (schema or path consistency failure) or
    /// `enrichment` (input tree gone).
    pub async fn plan(
        &self,
        feature_request: &str,
        context: &str,
        snapshot: &[SourceRecord],
    ) -> Result<PlanOutcome> {
        let mut trace = PlanningTrace::new();

        trace.enter(PlannerState::Analyzing);
        info!("Analyzing feature impact");
        let (grounding, analysis) = self
            .analyze(feature_request, context)
            .await
            .map_err(|e| fail(&mut trace, PlannerState::Analyzing, e))?;

        trace.enter(PlannerState::Preprocessing);
        info!("Requesting edit plan");
        let response = self
            .preprocess(feature_request, &analysis, grounding)
            .await
            .map_err(|e| fail(&mut trace, PlannerState::Preprocessing, e))?;

        trace.enter(PlannerState::Extracting);
        let mut plan = self
            .extract(&response, feature_request, analysis, snapshot)
            .map_err(|e| fail(&mut trace, PlannerState::Extracting, e))?;

        trace.enter(PlannerState::Enriching);
        self.enrich(&mut plan)
            .map_err(|e| fail(&mut trace, PlannerState::Enriching, e))?;

        trace.enter(PlannerState::Validated);
        info!(
            "Plan validated: {} tasks ({} existing, {} new)",
            plan.task_count(),
            plan.existing_files.len(),
            plan.new_files.len()
        );

        Ok(PlanOutcome { plan, trace })
    }

    async fn analyze(
        &self,
        feature_request: &str,
        context: &str,
    ) -> Result<(Vec<SourceRecord>, String)> {
        let grounding = self.retrieval.search(feature_request, self.top_k).await?;
        debug!("Grounding planning calls with {} records", grounding.len());

        let vars = TemplateVars::new()
            .set(TemplateMarker::FeatureRequest, feature_request)
            .set(TemplateMarker::ProjectContext, context);
        let requests: Vec<CompletionRequest> = PromptKind::ANALYSIS
            .iter()
            .map(|kind| CompletionRequest::new(kind.render(&vars)).with_grounding(grounding.clone()))
            .collect();

        let answers = generate_all(self.oracle.as_ref(), &requests, self.concurrency).await?;
        match answers.as_slice() {
            [nodes, edges, report] => Ok((
                grounding,
                render_analysis_results(&nodes.text, &edges.text, &report.text),
            )),
            other => Err(FactoryError::consistency(format!(
                "expected 3 analysis answers, got {}",
                other.len()
            ))),
        }
    }

    async fn preprocess(
        &self,
        feature_request: &str,
        analysis: &str,
        grounding: Vec<SourceRecord>,
    ) -> Result<String> {
        let vars = TemplateVars::new()
            .set(TemplateMarker::FeatureRequest, feature_request)
            .set(TemplateMarker::AnalysisResults, analysis);
        let request =
            CompletionRequest::new(PromptKind::Preprocessing.render(&vars)).with_grounding(grounding);
        Ok(self.oracle.complete(&request).await?.text)
    }

    fn extract(
        &self,
        response: &str,
        feature_request: &str,
        analysis: String,
        snapshot: &[SourceRecord],
    ) -> Result<EditPlan> {
        let mut plan = extract_plan(response)?;
        plan.feature_request = feature_request.to_string();
        plan.analysis_results = analysis;
        plan.check_paths(&self.remapper)?;

        let known: HashSet<String> = snapshot
            .iter()
            .filter_map(|r| self.remapper.relative(&r.path.to_string_lossy()).ok())
            .collect();
        for task in &plan.existing_files {
            let rel = self.remapper.relative(&task.file_path)?;
            if !known.contains(&rel) {
                warn!("Planned file {} is not in the project snapshot", task.file_path);
            }
        }

        Ok(plan)
    }

    fn enrich(&self, plan: &mut EditPlan) -> Result<()> {
        let root = self.remapper.old_root();
        if !root.is_dir() {
            return Err(FactoryError::not_found(root));
        }

        for task in &mut plan.existing_files {
            let path = self.remapper.input_path(&task.file_path)?;
            let content = match std::fs::read_to_string(&path) {
                Ok(content) => content,
                Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                    warn!("File not found during enrichment: {}", path.display());
                    missing_file_placeholder(&task.file_path)
                }
                Err(e) => {
                    warn!("Could not read {}: {}", path.display(), e);
                    format!("Error reading file {}: {}", task.file_path, e)
                }
            };
            debug!("Enriched {} ({} bytes)", task.file_path, content.len());
            task.content = Some(content);
        }
        Ok(())
    }
}

fn fail(trace: &mut PlanningTrace, state: PlannerState, err: FactoryError) -> FactoryError {
    let failed = state.failure();
    trace.enter(failed);
    error!("Planner entered {}: {}", failed, err);
    err.at_stage(state.stage_name())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::llm::{MockOracle, OracleError};
    use crate::retrieval::KeywordIndex;
    use crate::snapshot::read_snapshot;
    use crate::testing::{planning_oracle, ProjectFixture};

    fn planner(fixture: &ProjectFixture, oracle: Arc<dyn GenerationOracle>) -> FeaturePlanner {
        let snapshot = read_snapshot(&fixture.input_dir()).unwrap();
        FeaturePlanner::new(
            oracle,
            Arc::new(KeywordIndex::build(snapshot)),
            PathRemapper::new(fixture.input_dir(), fixture.output_dir()),
        )
    }

    #[test]
    fn test_failure_mapping() {
        assert_eq!(PlannerState::Analyzing.failure(), PlannerState::AnalysisFailed);
        assert_eq!(PlannerState::Preprocessing.failure(), PlannerState::ExtractionFailed);
        assert_eq!(PlannerState::Extracting.failure(), PlannerState::ExtractionFailed);
        assert_eq!(PlannerState::Enriching.failure(), PlannerState::EnrichmentFailed);
        assert!(!PlannerState::Enriching.is_terminal());
    }

    #[test]
    fn test_state_serializes_screaming() {
        let json = serde_json::to_string(&PlannerState::AnalysisFailed).unwrap();
        assert_eq!(json, "\"ANALYSIS_FAILED\"");
    }

    #[tokio::test]
    async fn test_plan_reaches_validated_and_enriches() {
        let fixture = ProjectFixture::two_files();
        let plan = EditPlan::new("add logging").with_existing("a.py", "add logging");
        let oracle = Arc::new(planning_oracle(&plan, "import logging\nprint(1)"));

        let outcome = planner(&fixture, oracle.clone())
            .plan("add logging", "Project Structure:\n", &[])
            .await
            .unwrap();

        assert_eq!(
            outcome.trace.states(),
            vec![
                PlannerState::Analyzing,
                PlannerState::Preprocessing,
                PlannerState::Extracting,
                PlannerState::Enriching,
                PlannerState::Validated,
            ]
        );
        let task = &outcome.plan.existing_files[0];
        assert_eq!(task.content.as_deref(), Some("print(1)"));
        assert_eq!(outcome.plan.feature_request, "add logging");
        assert!(outcome.plan.analysis_results.starts_with("Nodes:\n"));
        assert!(outcome.plan.analysis_results.contains("\n\nImpact Report:\n"));
        // three analysis calls plus preprocessing
        assert_eq!(oracle.call_count(), 4);
    }

    #[tokio::test]
    async fn test_analysis_results_embedded_in_preprocessing_prompt() {
        let fixture = ProjectFixture::two_files();
        let plan = EditPlan::new("add logging").with_existing("a.py", "t");
        let oracle = Arc::new(planning_oracle(&plan, ""));

        planner(&fixture, oracle.clone())
            .with_concurrency(3)
            .plan("add logging", "ctx", &[])
            .await
            .unwrap();

        let prompts = oracle.prompts();
        let preprocessing = prompts.last().unwrap();
        assert!(preprocessing.contains("Feature Analysis Results:\nNodes:\nmock nodes"));
        assert!(preprocessing.contains("Edges:\nmock edges"));
        assert!(preprocessing.contains("Impact Report:\nmock report"));
    }

    #[tokio::test]
    async fn test_analysis_failure_is_atomic() {
        let fixture = ProjectFixture::two_files();
        let oracle = Arc::new(
            MockOracle::new()
                .with_failure_on("List the relationships", OracleError::permanent("denied"))
                .with_response("fine"),
        );

        let err = planner(&fixture, oracle.clone())
            .plan("add logging", "ctx", &[])
            .await
            .unwrap_err();

        assert_eq!(err.stage(), Some("analysis"));
        assert!(matches!(err.root(), FactoryError::Oracle(_)));
        // nodes answered, edges failed, report and preprocessing never issued
        assert_eq!(oracle.call_count(), 2);
    }

    #[tokio::test]
    async fn test_missing_block_fails_extraction() {
        let fixture = ProjectFixture::two_files();
        let oracle = Arc::new(MockOracle::new().with_response("I would change a.py"));

        let err = planner(&fixture, oracle)
            .plan("add logging", "ctx", &[])
            .await
            .unwrap_err();

        assert_eq!(err.stage(), Some("extraction"));
        assert_eq!(err.exit_code(), 3);
    }

    #[tokio::test]
    async fn test_colliding_paths_fail_extraction() {
        let fixture = ProjectFixture::two_files();
        let plan = EditPlan::new("x")
            .with_existing("a.py", "t")
            .with_new("./a.py", "p");
        let oracle = Arc::new(planning_oracle(&plan, ""));

        let err = planner(&fixture, oracle)
            .plan("x", "ctx", &[])
            .await
            .unwrap_err();

        assert_eq!(err.stage(), Some("extraction"));
        assert!(matches!(err.root(), FactoryError::Consistency { .. }));
    }

    #[tokio::test]
    async fn test_missing_file_gets_placeholder() {
        let fixture = ProjectFixture::two_files();
        let plan = EditPlan::new("x")
            .with_existing("a.py", "t")
            .with_existing("ghost.py", "t");
        let oracle = Arc::new(planning_oracle(&plan, ""));

        let outcome = planner(&fixture, oracle)
            .plan("x", "ctx", &[])
            .await
            .unwrap();

        assert_eq!(outcome.plan.existing_files[0].content.as_deref(), Some("print(1)"));
        assert_eq!(
            outcome.plan.existing_files[1].content.as_deref(),
            Some("File not found: ghost.py")
        );
    }

    #[tokio::test]
    async fn test_missing_input_root_fails_enrichment() {
        let fixture = ProjectFixture::two_files();
        let plan = EditPlan::new("x").with_existing("a.py", "t");
        let oracle: Arc<dyn GenerationOracle> = Arc::new(planning_oracle(&plan, ""));
        let planner = FeaturePlanner::new(
            oracle,
            Arc::new(KeywordIndex::build(Vec::new())),
            PathRemapper::new(fixture.path().join("gone"), fixture.output_dir()),
        );

        let err = planner.plan("x", "ctx", &[]).await.unwrap_err();
        assert_eq!(err.stage(), Some("enrichment"));
        assert_eq!(err.exit_code(), 6);
    }
}
