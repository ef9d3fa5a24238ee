//! Outcome of one pipeline run.

use super::state::{PipelineState, Stage};
use crate::profiling::ProfileReport;
use crate::transform::OperationLog;
use crate::validation::ValidationReport;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::path::PathBuf;

/// Overall status of a run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RunStatus {
    Succeeded,
    Failed,
}

/// What happened to one stage.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StageStatus {
    Completed,
    /// Disabled in configuration; the state still advanced
    Skipped,
    Failed,
    /// Not reached because an earlier stage failed
    NotRun,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StageOutcome {
    pub stage: Stage,
    pub status: StageStatus,
    pub duration_ms: u64,
    pub message: Option<String>,
}

impl StageOutcome {
    pub(crate) fn new(stage: Stage, status: StageStatus, duration_ms: u64) -> Self {
        Self {
            stage,
            status,
            duration_ms,
            message: None,
        }
    }

    pub(crate) fn with_message(mut self, message: impl Into<String>) -> Self {
        self.message = Some(message.into());
        self
    }
}

/// Reports produced by the engine stages.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct StageReports {
    pub pre_transform: Vec<OperationLog>,
    pub validation: Option<ValidationReport>,
    pub post_transform: Vec<OperationLog>,
    pub profiles: Vec<ProfileReport>,
}

/// Result of [`Orchestrator::run`](super::Orchestrator::run).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RunResult {
    pub pipeline_id: String,
    pub run_id: String,
    pub started_at: DateTime<Utc>,
    pub finished_at: DateTime<Utc>,
    pub dry_run: bool,
    pub status: RunStatus,
    pub final_state: PipelineState,
    pub stages: Vec<StageOutcome>,
    pub reports: StageReports,
    /// Tables the load stage committed, in load order
    pub loaded_tables: Vec<String>,
    /// Report files written during the run
    pub artifacts: Vec<PathBuf>,
}

impl RunResult {
    pub fn is_success(&self) -> bool {
        self.status == RunStatus::Succeeded
    }

    pub fn stage(&self, stage: Stage) -> Option<&StageOutcome> {
        self.stages.iter().find(|s| s.stage == stage)
    }

    /// The first failed stage and its message.
    pub fn failure(&self) -> Option<&StageOutcome> {
        self.stages.iter().find(|s| s.status == StageStatus::Failed)
    }

    pub fn total_violations(&self) -> usize {
        self.reports
            .validation
            .as_ref()
            .map_or(0, ValidationReport::total_violations)
    }

    pub fn duration_ms(&self) -> i64 {
        (self.finished_at - self.started_at).num_milliseconds()
    }
}
