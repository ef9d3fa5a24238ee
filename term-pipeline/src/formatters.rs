//! Human-readable rendering of run results and reports.
//!
//! [`RunSummaryFormatter`] produces the terminal summary printed by the CLI.
//! [`MarkdownFormatter`] renders validation and profile reports for the
//! `markdown` report format.
//!
//! ```rust
//! use term_pipeline::formatters::MarkdownFormatter;
//! use term_pipeline::validation::ValidationReport;
//!
//! let markdown = MarkdownFormatter::new()
//!     .format_validation(&ValidationReport::default())
//!     .unwrap();
//! assert!(markdown.starts_with("# "));
//! ```

use crate::error::{PipelineError, Result};
use crate::orchestrator::{RunResult, StageStatus};
use crate::profiling::{ProfileReport, ProfileSection};
use crate::severity::Severity;
use crate::validation::{TableValidation, ValidationReport};
use std::fmt::{self, Write};

/// Options shared by the formatters.
#[derive(Debug, Clone)]
pub struct FormatterConfig {
    /// Whether to use ANSI colors (summary formatter only)
    pub use_colors: bool,
    /// Maximum row ids or groups listed per finding (-1 for all)
    pub max_findings: i32,
    /// Include per-table violation counts in the run summary
    pub include_tables: bool,
}

impl Default for FormatterConfig {
    fn default() -> Self {
        Self {
            use_colors: true,
            max_findings: 10,
            include_tables: true,
        }
    }
}

impl FormatterConfig {
    /// Plain output for logs and CI.
    pub fn ci() -> Self {
        Self {
            use_colors: false,
            ..Self::default()
        }
    }

    pub fn with_colors(mut self, use_colors: bool) -> Self {
        self.use_colors = use_colors;
        self
    }

    pub fn with_max_findings(mut self, max: i32) -> Self {
        self.max_findings = max;
        self
    }

    fn shown(&self, total: usize) -> usize {
        if self.max_findings < 0 {
            total
        } else {
            total.min(self.max_findings as usize)
        }
    }

    fn limit<'a, T>(&self, items: &'a [T]) -> &'a [T] {
        &items[..self.shown(items.len())]
    }
}

fn render(f: impl FnOnce(&mut String) -> fmt::Result) -> Result<String> {
    let mut output = String::new();
    f(&mut output).map_err(|_| PipelineError::Internal("failed to render report".to_string()))?;
    Ok(output)
}

fn paint(text: &str, code: &str, use_colors: bool) -> String {
    if use_colors {
        format!("\x1b[{code}m{text}\x1b[0m")
    } else {
        text.to_string()
    }
}

/// Terminal summary of one run.
#[derive(Debug, Clone, Default)]
pub struct RunSummaryFormatter {
    config: FormatterConfig,
}

impl RunSummaryFormatter {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_config(config: FormatterConfig) -> Self {
        Self { config }
    }

    pub fn format(&self, result: &RunResult) -> Result<String> {
        render(|out| self.write_summary(out, result))
    }

    fn write_summary(&self, out: &mut String, result: &RunResult) -> fmt::Result {
        let colors = self.config.use_colors;
        writeln!(out)?;
        if result.is_success() {
            writeln!(out, "✅ {}", paint("Pipeline SUCCEEDED", "32", colors))?;
        } else {
            writeln!(out, "❌ {}", paint("Pipeline FAILED", "31", colors))?;
        }
        writeln!(out)?;
        writeln!(out, "Pipeline: {}", result.pipeline_id)?;
        writeln!(out, "Run: {}", result.run_id)?;
        writeln!(out, "Started: {}", result.started_at.to_rfc3339())?;
        writeln!(out, "Duration: {}ms", result.duration_ms())?;
        if result.dry_run {
            writeln!(out, "Mode: {}", paint("dry run", "33", colors))?;
        }
        writeln!(out, "Final state: {}", result.final_state)?;

        writeln!(out)?;
        writeln!(out, "🧭 Stages:")?;
        for stage in &result.stages {
            let symbol = match stage.status {
                StageStatus::Completed => "✅",
                StageStatus::Skipped => "⏭️ ",
                StageStatus::Failed => "❌",
                StageStatus::NotRun => "⏸️ ",
            };
            write!(out, "   {symbol} {:<15} {:>6}ms", stage.stage.as_str(), stage.duration_ms)?;
            match &stage.message {
                Some(message) if stage.status == StageStatus::Failed => {
                    writeln!(out, "  {}", paint(message, "31", colors))?
                }
                Some(message) => writeln!(out, "  {message}")?,
                None => writeln!(out)?,
            }
        }

        if let Some(report) = &result.reports.validation {
            writeln!(out)?;
            writeln!(out, "🔍 Validation:")?;
            writeln!(out, "   Rules evaluated: {}", report.rules_evaluated())?;
            let total = report.total_violations();
            let total = if total == 0 {
                paint("0", "32", colors)
            } else {
                paint(&total.to_string(), "31", colors)
            };
            writeln!(out, "   Violations: {total}")?;
            if let Some(severity) = report.max_violated_severity() {
                writeln!(out, "   Highest severity: {}", severity_label(severity))?;
            }
            if self.config.include_tables {
                for (table, count) in report.violation_counts_by_table() {
                    writeln!(out, "   {table}: {count}")?;
                }
            }
        }

        if !result.reports.profiles.is_empty() {
            writeln!(out)?;
            writeln!(out, "📊 Profiles:")?;
            for profile in &result.reports.profiles {
                write!(
                    out,
                    "   {}: {} rows, {} columns",
                    profile.table,
                    profile.overall.row_count,
                    profile.overall.columns.len()
                )?;
                if !profile.groups.is_empty() {
                    write!(out, ", {} groups", profile.groups.len())?;
                }
                match profile.omitted_count() {
                    0 => writeln!(out)?,
                    n => writeln!(out, ", {n} stats omitted")?,
                }
            }
        }

        if !result.loaded_tables.is_empty() {
            writeln!(out)?;
            writeln!(out, "📦 Loaded: {}", result.loaded_tables.join(", "))?;
        }

        if !result.artifacts.is_empty() {
            writeln!(out)?;
            writeln!(out, "📝 Reports:")?;
            for path in &result.artifacts {
                writeln!(out, "   {}", path.display())?;
            }
        }
        writeln!(out)
    }
}

fn severity_label(severity: Severity) -> &'static str {
    match severity {
        Severity::Error => "🚨 error",
        Severity::Warning => "⚠️ warning",
        Severity::Info => "ℹ️ info",
    }
}

/// Markdown reports.
#[derive(Debug, Clone)]
pub struct MarkdownFormatter {
    config: FormatterConfig,
    heading_level: u8,
}

impl MarkdownFormatter {
    pub fn new() -> Self {
        Self {
            config: FormatterConfig::ci().with_max_findings(-1),
            heading_level: 1,
        }
    }

    pub fn with_config(config: FormatterConfig) -> Self {
        Self {
            config,
            heading_level: 1,
        }
    }

    /// Sets the level of the top heading (1-6).
    pub fn with_heading_level(mut self, level: u8) -> Self {
        self.heading_level = level.clamp(1, 6);
        self
    }

    pub fn format_validation(&self, report: &ValidationReport) -> Result<String> {
        render(|out| self.write_validation(out, report))
    }

    pub fn format_profiles(&self, reports: &[ProfileReport]) -> Result<String> {
        render(|out| self.write_profiles(out, reports))
    }

    fn write_validation(&self, out: &mut String, report: &ValidationReport) -> fmt::Result {
        let h = "#".repeat(self.heading_level as usize);
        if report.is_clean() {
            writeln!(out, "{h} ✅ Validation Report - CLEAN")?;
        } else {
            writeln!(out, "{h} ⚠️ Validation Report - VIOLATIONS FOUND")?;
        }
        writeln!(out)?;
        writeln!(out, "**Pipeline:** {}", report.pipeline_id)?;
        writeln!(out, "**Run:** {}", report.run_id)?;
        writeln!(out)?;
        writeln!(out, "{h}# Summary")?;
        writeln!(out)?;
        writeln!(out, "| Table | Rows checked | Violations |")?;
        writeln!(out, "|-------|--------------|------------|")?;
        for table in &report.tables {
            writeln!(
                out,
                "| {} | {} | {} |",
                table.table,
                table.rows_checked,
                table.total_violations()
            )?;
        }

        for table in &report.tables {
            self.write_table_validation(out, &h, table)?;
        }
        Ok(())
    }

    fn write_table_validation(&self, out: &mut String, h: &str, table: &TableValidation) -> fmt::Result {
        writeln!(out)?;
        writeln!(out, "{h}# {}", table.table)?;

        for finding in &table.constraints {
            writeln!(out)?;
            writeln!(
                out,
                "- **{}** ({}): {} violation(s)",
                finding.rule.describe(),
                finding.rule.severity,
                finding.violations
            )?;
            self.write_row_ids(out, &finding.row_ids)?;
        }
        for finding in &table.foreign_keys {
            writeln!(out)?;
            writeln!(
                out,
                "- **{}** ({}): {} orphan(s)",
                finding.rule.describe(),
                finding.rule.severity,
                finding.violations
            )?;
            for orphan in self.config.limit(&finding.orphans) {
                writeln!(out, "  - row {}: `{}`", orphan.row_id, orphan.value)?;
            }
            self.write_remainder(out, finding.orphans.len())?;
        }
        for finding in &table.composite_keys {
            writeln!(out)?;
            writeln!(
                out,
                "- **{}** ({}): {} duplicate row(s)",
                finding.rule.describe(),
                finding.rule.severity,
                finding.violations
            )?;
            for group in self.config.limit(&finding.duplicates) {
                writeln!(
                    out,
                    "  - ({}): rows {}",
                    group.key.join(", "),
                    join_ids(&group.row_ids)
                )?;
            }
            self.write_remainder(out, finding.duplicates.len())?;
        }
        Ok(())
    }

    fn write_row_ids(&self, out: &mut String, row_ids: &[u64]) -> fmt::Result {
        if row_ids.is_empty() {
            return Ok(());
        }
        writeln!(out, "  - rows {}", join_ids(self.config.limit(row_ids)))?;
        self.write_remainder(out, row_ids.len())
    }

    fn write_remainder(&self, out: &mut String, total: usize) -> fmt::Result {
        let shown = self.config.shown(total);
        if total > shown {
            writeln!(out, "  - ... and {} more", total - shown)?;
        }
        Ok(())
    }

    fn write_profiles(&self, out: &mut String, reports: &[ProfileReport]) -> fmt::Result {
        let h = "#".repeat(self.heading_level as usize);
        writeln!(out, "{h} 📊 Profile Report")?;
        if let Some(first) = reports.first() {
            writeln!(out)?;
            writeln!(out, "**Pipeline:** {}", first.pipeline_id)?;
            writeln!(out, "**Run:** {}", first.run_id)?;
        }

        for report in reports {
            writeln!(out)?;
            writeln!(out, "{h}# {}", report.table)?;
            writeln!(out)?;
            write_section(out, &report.overall)?;

            for group in &report.groups {
                writeln!(out)?;
                writeln!(
                    out,
                    "{h}## {} = ({})",
                    report.group_by.join(", "),
                    group.key.join(", ")
                )?;
                writeln!(out)?;
                write_section(out, &group.profile)?;
            }
        }
        Ok(())
    }
}

impl Default for MarkdownFormatter {
    fn default() -> Self {
        Self::new()
    }
}

fn write_section(out: &mut String, section: &ProfileSection) -> fmt::Result {
    writeln!(out, "Rows: {}", section.row_count)?;
    writeln!(out)?;
    writeln!(out, "| Column | Type | Nulls | Distinct | Mean | Top values |")?;
    writeln!(out, "|--------|------|-------|----------|------|------------|")?;
    for column in &section.columns {
        let nulls = column
            .null_fraction
            .map_or_else(|| "-".to_string(), |f| format!("{:.1}%", f * 100.0));
        let distinct = column
            .distinct_count
            .map_or_else(|| "-".to_string(), |d| d.to_string());
        let mean = column
            .numeric
            .as_ref()
            .map_or_else(|| "-".to_string(), |n| format!("{:.3}", n.mean));
        let top = column.top_k.as_ref().map_or_else(
            || "-".to_string(),
            |values| {
                values
                    .iter()
                    .map(|v| format!("{} ({})", v.value, v.count))
                    .collect::<Vec<_>>()
                    .join(", ")
            },
        );
        writeln!(
            out,
            "| {} | {:?} | {nulls} | {distinct} | {mean} | {top} |",
            column.column, column.data_type
        )?;
    }

    if !section.correlations.is_empty() {
        writeln!(out)?;
        writeln!(out, "| Left | Right | Pearson |")?;
        writeln!(out, "|------|-------|---------|")?;
        for correlation in &section.correlations {
            let coefficient = correlation
                .coefficient
                .map_or_else(|| "-".to_string(), |c| format!("{c:.4}"));
            writeln!(
                out,
                "| {} | {} | {coefficient} |",
                correlation.left, correlation.right
            )?;
        }
    }

    if !section.omitted.is_empty() {
        writeln!(out)?;
        for omitted in &section.omitted {
            writeln!(
                out,
                "> **Omitted:** {} `{}`: {}",
                omitted.stat, omitted.column, omitted.reason
            )?;
        }
    }
    Ok(())
}

fn join_ids(ids: &[u64]) -> String {
    ids.iter()
        .map(u64::to_string)
        .collect::<Vec<_>>()
        .join(", ")
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::orchestrator::{PipelineState, RunStatus, Stage, StageOutcome, StageReports};
    use crate::validation::{ConstraintFinding, ConstraintRule, Predicate};
    use chrono::Utc;

    fn validation_report() -> ValidationReport {
        let mut users = TableValidation {
            table: "users".to_string(),
            rows_checked: 4,
            constraints: Vec::new(),
            foreign_keys: Vec::new(),
            composite_keys: Vec::new(),
        };
        users.constraints.push(ConstraintFinding {
            rule: ConstraintRule::new("users", "age", Predicate::strictly_between(0.0, 100.0))
                .with_severity(Severity::Error),
            row_ids: vec![1, 2],
            violations: 2,
        });
        ValidationReport {
            pipeline_id: "shop".to_string(),
            run_id: "abcd1234".to_string(),
            tables: vec![users],
        }
    }

    fn run_result(status: RunStatus) -> RunResult {
        let now = Utc::now();
        RunResult {
            pipeline_id: "shop".to_string(),
            run_id: "abcd1234".to_string(),
            started_at: now,
            finished_at: now,
            dry_run: true,
            status,
            final_state: PipelineState::Done,
            stages: vec![
                StageOutcome {
                    stage: Stage::Extract,
                    status: StageStatus::Completed,
                    duration_ms: 3,
                    message: Some("1 table(s) extracted".to_string()),
                },
                StageOutcome {
                    stage: Stage::Load,
                    status: StageStatus::Failed,
                    duration_ms: 1,
                    message: Some("sink unavailable".to_string()),
                },
            ],
            reports: StageReports {
                validation: Some(validation_report()),
                ..StageReports::default()
            },
            loaded_tables: Vec::new(),
            artifacts: Vec::new(),
        }
    }

    #[test]
    fn test_run_summary_plain() -> Result<()> {
        let formatter = RunSummaryFormatter::with_config(FormatterConfig::ci());
        let output = formatter.format(&run_result(RunStatus::Failed))?;
        assert!(output.contains("Pipeline FAILED"));
        assert!(output.contains("dry run"));
        assert!(output.contains("sink unavailable"));
        assert!(output.contains("Violations: 2"));
        assert!(output.contains("users: 2"));
        assert!(!output.contains("\x1b["));
        Ok(())
    }

    #[test]
    fn test_run_summary_colors() -> Result<()> {
        let output = RunSummaryFormatter::new().format(&run_result(RunStatus::Succeeded))?;
        assert!(output.contains("\x1b[32mPipeline SUCCEEDED"));
        Ok(())
    }

    #[test]
    fn test_markdown_validation() -> Result<()> {
        let output = MarkdownFormatter::new()
            .with_heading_level(2)
            .format_validation(&validation_report())?;
        assert!(output.starts_with("## ⚠️ Validation Report"));
        assert!(output.contains("| users | 4 | 2 |"));
        assert!(output.contains("  - rows 1, 2"));
        Ok(())
    }

    #[test]
    fn test_markdown_limits_findings() -> Result<()> {
        let mut report = validation_report();
        report.tables[0].constraints[0].row_ids = (0..25).collect();
        report.tables[0].constraints[0].violations = 25;
        let output = MarkdownFormatter::with_config(FormatterConfig::ci().with_max_findings(5))
            .format_validation(&report)?;
        assert!(output.contains("  - rows 0, 1, 2, 3, 4\n"));
        assert!(output.contains("... and 20 more"));
        Ok(())
    }

    #[test]
    fn test_markdown_empty_profiles() -> Result<()> {
        let output = MarkdownFormatter::new().format_profiles(&[])?;
        assert_eq!(output, "# 📊 Profile Report\n");
        Ok(())
    }
}
