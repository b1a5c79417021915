//! End-to-end pipeline orchestration.
//!
//! `Read -> Context -> Plan -> Expand -> Generate -> Clone -> Apply -> Validate`
//!
//! Every stage is a hard boundary: the first failure aborts the run and is
//! returned wrapped with the stage name. The output tree is only written
//! after all generation has finished, and is never deleted on failure.
//! Run metadata goes to the report directory, never into the output tree.

use crate::config::FactoryConfig;
use crate::context::{context_hash, list_tree_files, ContextBuilder};
use crate::error::{FactoryError, Result, StageContext};
use crate::llm::{generate_all, CompletionRequest, GenerationOracle};
use crate::plan::{EditPlan, PathRemapper};
use crate::planner::{FeaturePlanner, PlanOutcome, PlanningTrace};
use crate::prompt::{expand_tasks, strip_code_fence};
use crate::reconcile::{ApplyReport, Reconciler, ValidationReport};
use crate::retrieval::{KeywordIndex, RetrievalGateway};
use crate::snapshot::{SnapshotReader, SourceRecord};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::{debug, info};

/// File the enriched plan is written to inside the report directory.
pub const PLAN_FILE_NAME: &str = "plan.json";

/// File the run report is written to inside the report directory.
pub const REPORT_FILE_NAME: &str = "factory-report.json";

/// Summary of one pipeline run.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PipelineReport {
    pub run_id: String,
    pub feature_request: String,
    pub started_at: DateTime<Utc>,
    pub finished_at: DateTime<Utc>,
    pub snapshot_files: usize,
    pub context_hash: String,
    pub plan: EditPlan,
    pub apply: ApplyReport,
    pub validation: ValidationReport,
    pub trace: PlanningTrace,
}

impl PipelineReport {
    #[must_use]
    pub fn is_success(&self) -> bool {
        self.validation.is_pass()
    }

    pub fn duration(&self) -> chrono::Duration {
        self.finished_at - self.started_at
    }

    /// Write the report as pretty JSON into `dir`, creating it if needed.
    pub fn write(&self, dir: &Path) -> Result<PathBuf> {
        fs::create_dir_all(dir)?;
        let path = dir.join(REPORT_FILE_NAME);
        fs::write(&path, serde_json::to_string_pretty(self)?)?;
        Ok(path)
    }

    /// Load a report written by [`PipelineReport::write`].
    pub fn load(path: &Path) -> Result<Self> {
        let content = fs::read_to_string(path)?;
        Ok(serde_json::from_str(&content)?)
    }
}

/// Write an enriched plan as pretty JSON.
pub fn write_plan(plan: &EditPlan, path: &Path) -> Result<()> {
    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        fs::create_dir_all(parent)?;
    }
    fs::write(path, serde_json::to_string_pretty(plan)?)?;
    Ok(())
}

/// Read a plan written by [`write_plan`].
pub fn load_plan(path: &Path) -> Result<EditPlan> {
    if !path.exists() {
        return Err(FactoryError::not_found(path));
    }
    let content = fs::read_to_string(path)?;
    Ok(serde_json::from_str(&content)?)
}

/// Drives a feature request through every stage.
pub struct Pipeline {
    config: FactoryConfig,
    oracle: Arc<dyn GenerationOracle>,
    retrieval: Option<Arc<dyn RetrievalGateway>>,
}

impl Pipeline {
    /// Create a pipeline. Retrieval defaults to a [`KeywordIndex`] over the
    /// snapshot read at the start of each run.
    pub fn new(config: FactoryConfig, oracle: Arc<dyn GenerationOracle>) -> Self {
        Self {
            config,
            oracle,
            retrieval: None,
        }
    }

    /// Use an external retrieval backend instead of the keyword index.
    #[must_use]
    pub fn with_retrieval(mut self, retrieval: Arc<dyn RetrievalGateway>) -> Self {
        self.retrieval = Some(retrieval);
        self
    }

    pub fn config(&self) -> &FactoryConfig {
        &self.config
    }

    fn remapper(&self) -> PathRemapper {
        PathRemapper::new(&self.config.pipeline.input_dir, &self.config.pipeline.output_dir)
    }

    fn read(&self) -> Result<Vec<SourceRecord>> {
        let reader = SnapshotReader::new(&self.config.pipeline.input_dir)
            .with_excludes(self.config.pipeline.exclude_set()?);
        let records = reader.read()?;
        info!("Read {} source files", records.len());
        Ok(records)
    }

    fn context(&self) -> Result<String> {
        let context = ContextBuilder::new(&self.config.pipeline.input_dir)
            .preview_lines(self.config.pipeline.manifest_preview_lines)
            .build()?;
        debug!("Context: {} bytes", context.len());
        Ok(context)
    }

    async fn planned(
        &self,
        feature_request: &str,
        snapshot: &[SourceRecord],
        context: &str,
    ) -> Result<PlanOutcome> {
        let retrieval: Arc<dyn RetrievalGateway> = match &self.retrieval {
            Some(retrieval) => retrieval.clone(),
            None => Arc::new(KeywordIndex::build(snapshot.to_vec())),
        };
        FeaturePlanner::new(self.oracle.clone(), retrieval, self.remapper())
            .with_concurrency(self.config.oracle.concurrency)
            .with_top_k(self.config.retrieval.top_k)
            .plan(feature_request, context, snapshot)
            .await
    }

    /// Run the stages up to a validated plan, without touching the output.
    pub async fn plan(&self, feature_request: &str) -> Result<PlanOutcome> {
        let snapshot = self.read().stage("read")?;
        let context = self.context().stage("context")?;
        self.planned(feature_request, &snapshot, &context)
            .await
            .stage("plan")
    }

    async fn generate(&self, prompts: Vec<String>) -> Result<Vec<String>> {
        let requests: Vec<CompletionRequest> =
            prompts.into_iter().map(CompletionRequest::new).collect();
        info!("Generating {} artifacts", requests.len());

        let completions =
            generate_all(self.oracle.as_ref(), &requests, self.config.oracle.concurrency).await?;

        let strip = self.config.pipeline.strip_fences;
        Ok(completions
            .into_iter()
            .map(|c| {
                if strip {
                    strip_code_fence(&c.text).to_string()
                } else {
                    c.text
                }
            })
            .collect())
    }

    /// Run the full pipeline.
    ///
    /// The plan and report are written to the report directory before
    /// validation is enforced, so a run with missing files still leaves its
    /// report behind.
    ///
    /// # Errors
    ///
    /// Returns the first stage failure wrapped with its stage name.
    pub async fn run(&self, feature_request: &str) -> Result<PipelineReport> {
        let started_at = Utc::now();
        let run_id = uuid::Uuid::new_v4().to_string();
        info!("Run {} started: {}", run_id, feature_request);
        let report_dir = self.config.pipeline.report_dir().stage("report")?;

        let snapshot = self.read().stage("read")?;
        let context = self.context().stage("context")?;
        let outcome = self
            .planned(feature_request, &snapshot, &context)
            .await
            .stage("plan")?;

        let prompts = expand_tasks(&outcome.plan);
        let artifacts = self.generate(prompts).await.stage("generate")?;

        let reconciler = Reconciler::new(self.remapper());
        reconciler.clone_tree().stage("clone")?;
        let apply = reconciler
            .apply(&outcome.plan, &artifacts, self.config.pipeline.overwrite)
            .stage("apply")?;

        let output_dir = &self.config.pipeline.output_dir;
        if let Ok(files) = list_tree_files(output_dir) {
            debug!("Output tree: {} files", files.len());
            for file in files {
                debug!("  {}", file);
            }
        }
        write_plan(&outcome.plan, &report_dir.join(PLAN_FILE_NAME)).stage("report")?;

        let validation = reconciler.validate(&outcome.plan).stage("validate")?;

        let report = PipelineReport {
            run_id,
            feature_request: feature_request.to_string(),
            started_at,
            finished_at: Utc::now(),
            snapshot_files: snapshot.len(),
            context_hash: context_hash(&context),
            plan: outcome.plan,
            apply,
            validation,
            trace: outcome.trace,
        };
        let path = report.write(&report_dir).stage("report")?;
        debug!("Report written to {}", path.display());

        report.validation.ensure_pass().stage("validate")?;
        info!("Run {} finished in {}ms", report.run_id, report.duration().num_milliseconds());
        Ok(report)
    }
}
