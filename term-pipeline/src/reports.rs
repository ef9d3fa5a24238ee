//! Persisted validation and profiling reports.
//!
//! Every report is written once per run. File names carry the pipeline id,
//! the run start time and the run id, and files are opened with create-new
//! semantics, so a second write to the same name fails instead of
//! overwriting:
//!
//! ```text
//! {pipeline_id}_{YYYYMMDDTHHMMSSZ}_{run_id}_validation.json
//! {pipeline_id}_{YYYYMMDDTHHMMSSZ}_{run_id}_profile.md
//! ```

use crate::error::{PipelineError, Result};
use crate::formatters::MarkdownFormatter;
use crate::orchestrator::RunContext;
use crate::profiling::ProfileReport;
use crate::validation::ValidationReport;
use serde::{Deserialize, Serialize};
use std::fs::OpenOptions;
use std::io::Write;
use std::path::{Path, PathBuf};
use tracing::{info, instrument};

/// Output encoding of a persisted report.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ReportFormat {
    Json,
    Yaml,
    Markdown,
}

impl ReportFormat {
    pub fn extension(&self) -> &'static str {
        match self {
            ReportFormat::Json => "json",
            ReportFormat::Yaml => "yaml",
            ReportFormat::Markdown => "md",
        }
    }
}

/// Writes the reports of one run into a directory.
#[derive(Debug, Clone)]
pub struct ReportWriter {
    dir: PathBuf,
    prefix: String,
}

impl ReportWriter {
    pub fn new(dir: impl Into<PathBuf>, run: &RunContext) -> Self {
        Self {
            dir: dir.into(),
            prefix: format!(
                "{}_{}_{}",
                run.pipeline_id(),
                run.timestamp_tag(),
                run.run_id()
            ),
        }
    }

    /// Path a report of `kind` gets in `format`.
    pub fn path_for(&self, kind: &str, format: ReportFormat) -> PathBuf {
        self.dir
            .join(format!("{}_{kind}.{}", self.prefix, format.extension()))
    }

    #[instrument(skip_all, fields(dir = %self.dir.display()))]
    pub fn write_validation(
        &self,
        report: &ValidationReport,
        formats: &[ReportFormat],
    ) -> Result<Vec<PathBuf>> {
        formats
            .iter()
            .map(|format| {
                let body = match format {
                    ReportFormat::Json => serde_json::to_string_pretty(report)?,
                    ReportFormat::Yaml => serde_yaml::to_string(report)?,
                    ReportFormat::Markdown => MarkdownFormatter::new().format_validation(report)?,
                };
                self.write_new(&self.path_for("validation", *format), &body)
            })
            .collect()
    }

    #[instrument(skip_all, fields(dir = %self.dir.display(), tables = reports.len()))]
    pub fn write_profiles(
        &self,
        reports: &[ProfileReport],
        formats: &[ReportFormat],
    ) -> Result<Vec<PathBuf>> {
        formats
            .iter()
            .map(|format| {
                let body = match format {
                    ReportFormat::Json => serde_json::to_string_pretty(reports)?,
                    ReportFormat::Yaml => serde_yaml::to_string(reports)?,
                    ReportFormat::Markdown => MarkdownFormatter::new().format_profiles(reports)?,
                };
                self.write_new(&self.path_for("profile", *format), &body)
            })
            .collect()
    }

    fn write_new(&self, path: &Path, body: &str) -> Result<PathBuf> {
        std::fs::create_dir_all(&self.dir)?;
        let mut file = OpenOptions::new()
            .write(true)
            .create_new(true)
            .open(path)
            .map_err(|e| {
                PipelineError::Io(std::io::Error::new(
                    e.kind(),
                    format!("cannot create report '{}': {e}", path.display()),
                ))
            })?;
        file.write_all(body.as_bytes())?;
        info!(path = %path.display(), "Report written");
        Ok(path.to_path_buf())
    }
}
