//! `profiling_cfg` section.

use crate::error::{PipelineError, Result};
use crate::reports::ReportFormat;
use crate::security::SqlSecurity;
use serde::{Deserialize, Serialize};
use std::path::PathBuf;

/// Statistics that can be requested per column.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StatKind {
    NullFraction,
    DistinctCount,
    TopK,
    NumericSummary,
    Correlation,
}

impl StatKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            StatKind::NullFraction => "null_fraction",
            StatKind::DistinctCount => "distinct_count",
            StatKind::TopK => "top_k",
            StatKind::NumericSummary => "numeric_summary",
            StatKind::Correlation => "correlation",
        }
    }
}

/// Profiling configuration.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct ProfilingConfig {
    pub enabled: bool,
    pub reports_path: Option<PathBuf>,
    pub format: Vec<ReportFormat>,
    /// Adds numeric summaries and top-k tables
    pub detailed: bool,
    pub group_by: Vec<String>,
    /// Columns to profile; `"*"` selects every column
    pub include_columns: Vec<String>,
    /// Applied after `include_columns`
    pub exclude_columns: Vec<String>,
    /// Explicit stat selection; empty means the defaults for `detailed`
    pub stats: Vec<StatKind>,
    pub top_k: usize,
    /// Percentiles in `[0, 100]`
    pub percentiles: Vec<f64>,
}

impl Default for ProfilingConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            reports_path: None,
            format: vec![ReportFormat::Json],
            detailed: false,
            group_by: Vec::new(),
            include_columns: vec!["*".to_string()],
            exclude_columns: Vec::new(),
            stats: Vec::new(),
            top_k: 10,
            percentiles: vec![25.0, 50.0, 75.0, 95.0],
        }
    }
}

impl ProfilingConfig {
    /// Returns true if `stat` should be computed.
    pub fn wants(&self, stat: StatKind) -> bool {
        if !self.stats.is_empty() {
            return self.stats.contains(&stat);
        }
        match stat {
            StatKind::NullFraction | StatKind::DistinctCount | StatKind::Correlation => true,
            StatKind::TopK | StatKind::NumericSummary => self.detailed,
        }
    }

    /// True when every column is included.
    pub fn includes_all(&self) -> bool {
        self.include_columns.iter().any(|c| c == "*")
    }

    pub fn validate(&self) -> Result<()> {
        if self.top_k == 0 {
            return Err(PipelineError::Configuration(
                "profiling_cfg.top_k must be positive".to_string(),
            ));
        }
        if let Some(bad) = self
            .percentiles
            .iter()
            .find(|p| !p.is_finite() || **p < 0.0 || **p > 100.0)
        {
            return Err(PipelineError::Configuration(format!(
                "profiling_cfg.percentiles: {bad} is outside [0, 100]"
            )));
        }

        let named = self
            .include_columns
            .iter()
            .filter(|c| c.as_str() != "*")
            .chain(&self.exclude_columns)
            .chain(&self.group_by);
        for column in named {
            SqlSecurity::validate_identifier(column).map_err(|e| {
                PipelineError::Configuration(format!("profiling_cfg column '{column}': {e}"))
            })?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_stats_follow_detailed_flag() {
        let mut config = ProfilingConfig::default();
        assert!(config.wants(StatKind::NullFraction));
        assert!(config.wants(StatKind::Correlation));
        assert!(!config.wants(StatKind::TopK));

        config.detailed = true;
        assert!(config.wants(StatKind::NumericSummary));

        config.stats = vec![StatKind::TopK];
        assert!(config.wants(StatKind::TopK));
        assert!(!config.wants(StatKind::NullFraction));
    }

    #[test]
    fn test_yaml_defaults_match_default_impl() {
        let parsed: ProfilingConfig = serde_yaml::from_str("{}").unwrap();
        assert_eq!(parsed, ProfilingConfig::default());

        let parsed: ProfilingConfig =
            serde_yaml::from_str("stats: [null_fraction, top_k]\ntop_k: 3").unwrap();
        assert_eq!(parsed.stats, vec![StatKind::NullFraction, StatKind::TopK]);
        assert_eq!(parsed.top_k, 3);
    }

    #[test]
    fn test_validate() {
        assert!(ProfilingConfig::default().validate().is_ok());

        let config = ProfilingConfig {
            percentiles: vec![50.0, 101.0],
            ..ProfilingConfig::default()
        };
        assert!(config.validate().is_err());

        let config = ProfilingConfig {
            exclude_columns: vec!["bad column".to_string()],
            ..ProfilingConfig::default()
        };
        assert!(config.validate().is_err());

        let config = ProfilingConfig {
            top_k: 0,
            ..ProfilingConfig::default()
        };
        assert!(config.validate().is_err());
    }
}
