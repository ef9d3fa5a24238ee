//! Stage orchestration.
//!
//! [`Orchestrator::run`] drives one run through the stage state machine:
//!
//! ```text
//! Extract -> PreTransform -> Validate -> PostTransform -> Profile -> Load
//! ```
//!
//! Stages are strictly sequential, so every table has been published by
//! Pre-Transform before Validation looks at any foreign key. Within a stage,
//! per-table work runs concurrently against the read-only registry.
//!
//! A disabled stage is skipped and the state still advances. The first
//! failing stage moves the run to `FAILED`; later stages are reported as
//! not run. Validation findings only fail the run when
//! `validation_cfg.fail_on_severity` is set and a rule at or above that
//! severity has violations.
//!
//! ```rust,no_run
//! use term_pipeline::config::PipelineConfig;
//! use term_pipeline::orchestrator::Orchestrator;
//!
//! # async fn example() -> term_pipeline::error::Result<()> {
//! let config = PipelineConfig::from_path("pipeline.yaml".as_ref())?;
//! let result = Orchestrator::csv().run(&config).await?;
//! println!("{:?} after {} ms", result.status, result.duration_ms());
//! # Ok(())
//! # }
//! ```

mod adapters;
mod result;
pub(crate) mod run_context;
mod state;

pub use adapters::{CsvExtractor, CsvLoader, Extractor, Loader, MemoryExtractor, MemoryLoader};
pub use result::{RunResult, RunStatus, StageOutcome, StageReports, StageStatus};
pub use run_context::{RunContext, SanitizationPolicy};
pub use state::{PipelineState, Stage};

use crate::config::PipelineConfig;
use crate::dataset::DatasetRegistry;
use crate::error::{PipelineError, Result};
use crate::profiling::ProfilingEngine;
use crate::reports::ReportWriter;
use crate::transform::{OperationLog, TransformationEngine, TransformationPlan};
use crate::validation::{RuleSet, ValidationEngine};
use chrono::Utc;
use futures::future::{join_all, try_join_all};
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Instant;
use tracing::{debug, error, info, instrument, warn};

/// A validated configuration with its resolved plans and rules.
///
/// Building a pipeline performs every check that does not need data, so a
/// run never starts with an unknown operation or a rule on an undeclared
/// table.
#[derive(Debug, Clone)]
pub struct Pipeline {
    config: PipelineConfig,
    pre_plan: TransformationPlan,
    post_plan: TransformationPlan,
    rules: RuleSet,
}

impl Pipeline {
    #[instrument(skip_all, fields(pipeline_id = %config.pipeline_id))]
    pub fn build(config: PipelineConfig) -> Result<Self> {
        config.validate()?;
        let pre_plan = TransformationPlan::resolve(&config.transformation_cfg.pre_validation)?;
        let post_plan = TransformationPlan::resolve(&config.transformation_cfg.post_validation)?;
        let rules = RuleSet::from_config(&config.validation_cfg)?;
        debug!(
            pre_steps = pre_plan.steps().len(),
            post_steps = post_plan.steps().len(),
            rules = rules.len(),
            "Pipeline built"
        );
        Ok(Self {
            config,
            pre_plan,
            post_plan,
            rules,
        })
    }

    pub fn config(&self) -> &PipelineConfig {
        &self.config
    }

    pub fn pre_plan(&self) -> &TransformationPlan {
        &self.pre_plan
    }

    pub fn post_plan(&self) -> &TransformationPlan {
        &self.post_plan
    }

    pub fn rules(&self) -> &RuleSet {
        &self.rules
    }

    /// Whether configuration enables `stage`.
    pub fn stage_enabled(&self, stage: Stage) -> bool {
        let config = &self.config;
        match stage {
            Stage::Extract => config.extraction_cfg.enabled,
            Stage::PreTransform | Stage::PostTransform => config.transformation_cfg.enabled,
            Stage::Validate => config.validation_cfg.enabled,
            Stage::Profile => config.profiling_cfg.enabled,
            Stage::Load => config.load_cfg.enabled,
        }
    }
}

/// Mutable state of one run, owned by the stage loop.
#[derive(Debug, Default)]
struct RunWork {
    registry: DatasetRegistry,
    reports: StageReports,
    loaded_tables: Vec<String>,
    artifacts: Vec<PathBuf>,
}

/// Runs pipelines against an extractor and a loader.
#[derive(Debug, Clone)]
pub struct Orchestrator {
    extractor: Arc<dyn Extractor>,
    loader: Arc<dyn Loader>,
}

impl Orchestrator {
    pub fn new(extractor: impl Extractor + 'static, loader: impl Loader + 'static) -> Self {
        Self {
            extractor: Arc::new(extractor),
            loader: Arc::new(loader),
        }
    }

    /// CSV sources in, CSV files out.
    pub fn csv() -> Self {
        Self::new(CsvExtractor::new(), CsvLoader::new())
    }

    /// Builds the pipeline and runs it.
    ///
    /// Only configuration errors are returned as `Err`; a failing stage is
    /// reported through [`RunResult::status`].
    pub async fn run(&self, config: &PipelineConfig) -> Result<RunResult> {
        let pipeline = Pipeline::build(config.clone())?;
        Ok(self.run_pipeline(&pipeline).await)
    }

    /// Runs an already built pipeline.
    #[instrument(skip_all, fields(
        pipeline_id = %pipeline.config().pipeline_id,
        run_id = tracing::field::Empty,
        dry_run = pipeline.config().dry_run
    ))]
    pub async fn run_pipeline(&self, pipeline: &Pipeline) -> RunResult {
        let config = pipeline.config();
        let run = RunContext::new(&config.pipeline_id, config.dry_run)
            .with_sanitization(config.sanitization.clone())
            .with_log_config(config.logging.to_log_config());
        tracing::Span::current().record("run_id", run.run_id());
        info!("Pipeline run started");

        let mut work = RunWork::default();
        let mut state = PipelineState::Init;
        let mut stages = Vec::with_capacity(Stage::ALL.len());
        let mut failed = false;

        for stage in Stage::ALL {
            if failed {
                stages.push(StageOutcome::new(stage, StageStatus::NotRun, 0));
                continue;
            }

            let start = Instant::now();
            let outcome = if pipeline.stage_enabled(stage) {
                self.run_stage(stage, pipeline, &run, &mut work).await
            } else {
                debug!(stage = %stage, "Stage disabled");
                Ok(None)
            };
            let duration_ms = start.elapsed().as_millis() as u64;
            let outcome =
                outcome.and_then(|message| Ok((state.advance(stage.completed_state())?, message)));

            match outcome {
                Ok((next, message)) => {
                    state = next;
                    let status = if pipeline.stage_enabled(stage) {
                        StageStatus::Completed
                    } else {
                        StageStatus::Skipped
                    };
                    let mut record = StageOutcome::new(stage, status, duration_ms);
                    if let Some(message) = message {
                        record = record.with_message(message);
                    }
                    info!(stage = %stage, status = ?status, duration_ms, "Stage finished");
                    stages.push(record);
                }
                Err(e) => {
                    error!(
                        stage = %stage,
                        category = ?e.category(),
                        error = %e,
                        "Stage failed"
                    );
                    state = PipelineState::Failed;
                    failed = true;
                    stages.push(
                        StageOutcome::new(stage, StageStatus::Failed, duration_ms)
                            .with_message(e.to_string()),
                    );
                }
            }
        }

        if !failed {
            state = state.advance(PipelineState::Done).unwrap_or_else(|e| {
                error!(error = %e, "Cannot finish run");
                PipelineState::Failed
            });
        }
        let status = if state == PipelineState::Done {
            RunStatus::Succeeded
        } else {
            RunStatus::Failed
        };

        let result = RunResult {
            pipeline_id: run.pipeline_id().to_string(),
            run_id: run.run_id().to_string(),
            started_at: run.start_time(),
            finished_at: Utc::now(),
            dry_run: run.is_dry_run(),
            status,
            final_state: state,
            stages,
            reports: work.reports,
            loaded_tables: work.loaded_tables,
            artifacts: work.artifacts,
        };
        info!(
            status = ?result.status,
            violations = result.total_violations(),
            loaded = result.loaded_tables.len(),
            duration_ms = result.duration_ms(),
            "Pipeline run finished"
        );
        result
    }

    /// Executes one enabled stage and returns its summary message.
    async fn run_stage(
        &self,
        stage: Stage,
        pipeline: &Pipeline,
        run: &RunContext,
        work: &mut RunWork,
    ) -> Result<Option<String>> {
        let config = pipeline.config();
        match stage {
            Stage::Extract => {
                let tables = self.extractor.tables(&config.extraction_cfg);
                let datasets = try_join_all(
                    tables
                        .iter()
                        .map(|table| self.extractor.extract(table, &config.extraction_cfg)),
                )
                .await?;
                for dataset in datasets {
                    work.registry.insert(dataset);
                }
                Ok(Some(format!("{} table(s) extracted", work.registry.len())))
            }
            Stage::PreTransform => {
                let logs =
                    transform(run, stage, pipeline.pre_plan(), &mut work.registry).await?;
                let message = transform_summary(&logs);
                work.reports.pre_transform = logs;
                Ok(message)
            }
            Stage::Validate => {
                let report = ValidationEngine::new(run.clone())
                    .validate_rules(&work.registry, pipeline.rules())
                    .await?;
                let validation = &config.validation_cfg;
                if let Some(dir) = &validation.reports_path {
                    let paths =
                        ReportWriter::new(dir, run).write_validation(&report, &validation.format)?;
                    work.artifacts.extend(paths);
                }

                let total = report.total_violations();
                let escalated = validation.fail_on_severity.map(|threshold| {
                    let count: usize = report
                        .tables
                        .iter()
                        .flat_map(|t| t.rule_outcomes())
                        .filter(|(severity, _)| severity.is_at_least(threshold))
                        .map(|(_, violations)| violations)
                        .sum();
                    (threshold, count)
                });
                work.reports.validation = Some(report);

                match escalated {
                    Some((threshold, violations)) if violations > 0 => {
                        Err(PipelineError::ViolationThreshold {
                            threshold: threshold.to_string(),
                            violations,
                        })
                    }
                    _ => Ok(Some(format!("{total} violation(s)"))),
                }
            }
            Stage::PostTransform => {
                let logs =
                    transform(run, stage, pipeline.post_plan(), &mut work.registry).await?;
                let message = transform_summary(&logs);
                work.reports.post_transform = logs;
                Ok(message)
            }
            Stage::Profile => {
                let engine = ProfilingEngine::new(run.clone());
                let profiling = &config.profiling_cfg;
                let results = join_all(work.registry.iter().map(|(name, dataset)| {
                    let engine = &engine;
                    async move { (name, engine.profile(dataset, profiling).await) }
                }))
                .await;

                let mut profiles = Vec::with_capacity(results.len());
                let mut failures = Vec::new();
                for (table, result) in results {
                    match result {
                        Ok(profile) => profiles.push(profile),
                        Err(e) => {
                            warn!(table = %table, error = %e, "Profiling skipped table");
                            failures.push(format!("{table}: {e}"));
                        }
                    }
                }
                if let Some(dir) = &profiling.reports_path {
                    match ReportWriter::new(dir, run).write_profiles(&profiles, &profiling.format) {
                        Ok(paths) => work.artifacts.extend(paths),
                        Err(e) => {
                            warn!(path = %dir.display(), error = %e, "Profile reports not written");
                            failures.push(format!("reports: {e}"));
                        }
                    }
                }

                let message = if failures.is_empty() {
                    format!("{} table(s) profiled", profiles.len())
                } else {
                    format!(
                        "{} table(s) profiled; not profiled: {}",
                        profiles.len(),
                        failures.join("; ")
                    )
                };
                work.reports.profiles = profiles;
                Ok(Some(message))
            }
            Stage::Load => {
                if run.is_dry_run() {
                    info!(tables = work.registry.len(), "Dry run, load suppressed");
                    return Ok(Some("dry run: nothing written".to_string()));
                }
                for (table, dataset) in work.registry.iter() {
                    self.loader.load(dataset, &config.load_cfg).await?;
                    work.loaded_tables.push(table.to_string());
                }
                Ok(Some(format!("{} table(s) loaded", work.loaded_tables.len())))
            }
        }
    }
}

/// Applies `plan` to every table concurrently and publishes the results.
async fn transform(
    run: &RunContext,
    stage: Stage,
    plan: &TransformationPlan,
    registry: &mut DatasetRegistry,
) -> Result<Vec<OperationLog>> {
    if plan.is_empty() {
        return Ok(Vec::new());
    }
    let engine = TransformationEngine::new(run.clone(), stage);
    let engine = &engine;
    let outputs = try_join_all(
        registry
            .iter()
            .map(|(_, dataset)| async move { engine.apply_plan(dataset, plan).await }),
    )
    .await?;

    let mut logs = Vec::new();
    for (dataset, table_logs) in outputs {
        registry.insert(dataset);
        logs.extend(table_logs);
    }
    Ok(logs)
}

fn transform_summary(logs: &[OperationLog]) -> Option<String> {
    if logs.is_empty() {
        return None;
    }
    let removed: usize = logs.iter().map(|l| l.rows_removed).sum();
    let changed: usize = logs.iter().map(|l| l.cells_changed).sum();
    Some(format!("{removed} row(s) removed, {changed} cell(s) changed"))
}
