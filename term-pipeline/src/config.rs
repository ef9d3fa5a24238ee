//! Pipeline configuration.
//!
//! A pipeline is described by one YAML document deserialised into
//! [`PipelineConfig`]. Every section has defaults, unknown keys are rejected,
//! and [`PipelineConfig::validate`] performs the structural checks that must
//! pass before any stage runs.
//!
//! ```yaml
//! pipeline_id: shop_daily
//! extraction_cfg:
//!   sources:
//!     users: { path: data/users.csv }
//!     orders: { path: data/orders.csv }
//! transformation_cfg:
//!   pre_validation:
//!     operations:
//!       drop_nulls: { enabled: true, columns: [id] }
//!       drop_duplicates: { enabled: true }
//!     pre_order: [drop_nulls, drop_duplicates]
//! validation_cfg:
//!   foreign_keys:
//!     orders: { user_id: users.id }
//!   constraints:
//!     users:
//!       - { column: age, kind: range, min: 0, max: 100, inclusive: false }
//! ```

use crate::error::{PipelineError, Result};
use crate::logging::{setup::LoggingConfig, LogConfig};
use crate::orchestrator::SanitizationPolicy;
use crate::profiling::ProfilingConfig;
use crate::reports::ReportFormat;
use crate::security::SqlSecurity;
use crate::severity::Severity;
use crate::transform::TransformationPlan;
use crate::validation::{ConstraintSpec, RuleSet};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet};
use std::path::{Path, PathBuf};
use std::str::FromStr;
use tracing::{debug, instrument};

/// Root configuration document.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct PipelineConfig {
    /// Identifier used in run ids and artifact names
    pub pipeline_id: String,
    /// Run every stage but suppress Load writes
    pub dry_run: bool,
    pub logging: LoggingSection,
    pub sanitization: SanitizationPolicy,
    pub extraction_cfg: ExtractionConfig,
    pub transformation_cfg: TransformationConfig,
    pub validation_cfg: ValidationConfig,
    pub profiling_cfg: ProfilingConfig,
    pub load_cfg: LoadConfig,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            pipeline_id: "pipeline".to_string(),
            dry_run: false,
            logging: LoggingSection::default(),
            sanitization: SanitizationPolicy::default(),
            extraction_cfg: ExtractionConfig::default(),
            transformation_cfg: TransformationConfig::default(),
            validation_cfg: ValidationConfig::default(),
            profiling_cfg: ProfilingConfig::default(),
            load_cfg: LoadConfig::default(),
        }
    }
}

/// `logging` section.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct LoggingSection {
    /// Level for term-pipeline components (`error`..`trace`)
    pub level: String,
    /// JSON console output
    pub json: bool,
    /// Directory for daily-rolling log files
    pub log_dir: Option<PathBuf>,
    pub file_prefix: String,
    /// Log every generated rule query at debug level
    pub log_rule_details: bool,
}

impl Default for LoggingSection {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
            json: false,
            log_dir: None,
            file_prefix: "term-pipeline.log".to_string(),
            log_rule_details: false,
        }
    }
}

impl LoggingSection {
    fn parsed_level(&self) -> Result<tracing::Level> {
        tracing::Level::from_str(&self.level).map_err(|_| {
            PipelineError::Configuration(format!("Unknown log level '{}'", self.level))
        })
    }

    /// Subscriber settings for binaries.
    pub fn to_setup(&self) -> Result<LoggingConfig> {
        let mut config = LoggingConfig::default()
            .with_pipeline_level(self.parsed_level()?)
            .with_json_format(self.json);
        config.file_prefix = self.file_prefix.clone();
        if let Some(dir) = &self.log_dir {
            config = config.with_log_dir(dir.clone());
        }
        Ok(config)
    }

    /// Engine verbosity settings carried by the run context.
    pub fn to_log_config(&self) -> LogConfig {
        LogConfig {
            log_rule_details: self.log_rule_details,
            ..LogConfig::default()
        }
    }
}

/// `extraction_cfg` section.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct ExtractionConfig {
    pub enabled: bool,
    /// Table name to source description
    pub sources: BTreeMap<String, SourceConfig>,
}

impl Default for ExtractionConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            sources: BTreeMap::new(),
        }
    }
}

/// Supported flat-file formats.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum FileFormat {
    #[default]
    Csv,
}

/// One extraction source.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct SourceConfig {
    pub path: PathBuf,
    #[serde(default)]
    pub format: FileFormat,
    #[serde(default = "default_true")]
    pub has_header: bool,
    #[serde(default = "default_delimiter")]
    pub delimiter: char,
}

impl SourceConfig {
    /// CSV source with a header row and comma delimiter.
    pub fn csv(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            format: FileFormat::Csv,
            has_header: true,
            delimiter: ',',
        }
    }
}

/// `transformation_cfg` section.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct TransformationConfig {
    pub enabled: bool,
    pub pre_validation: TransformationPhaseConfig,
    pub post_validation: TransformationPhaseConfig,
}

impl Default for TransformationConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            pre_validation: TransformationPhaseConfig::default(),
            post_validation: TransformationPhaseConfig::default(),
        }
    }
}

/// Operations of one transformation pass and their execution order.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct TransformationPhaseConfig {
    /// Operation name to settings
    pub operations: BTreeMap<String, OperationConfig>,
    /// Execution order; names must be declared in `operations`
    #[serde(alias = "pre_order", alias = "post_order")]
    pub order: Vec<String>,
}

/// Settings for one named operation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct OperationConfig {
    #[serde(default = "default_true")]
    pub enabled: bool,
    /// Operation kind; defaults to the entry name
    #[serde(default)]
    pub kind: Option<String>,
    #[serde(default)]
    pub columns: ColumnsSpec,
    /// Restrict the operation to these tables
    #[serde(default)]
    pub tables: Option<Vec<String>>,
}

impl Default for OperationConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            kind: None,
            columns: ColumnsSpec::default(),
            tables: None,
        }
    }
}

/// `columns: all`, `columns: id` or `columns: [a, b]`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum ColumnsSpec {
    Single(String),
    List(Vec<String>),
}

impl Default for ColumnsSpec {
    fn default() -> Self {
        ColumnsSpec::Single("all".to_string())
    }
}

/// `validation_cfg` section.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct ValidationConfig {
    pub enabled: bool,
    /// Findings at or above this severity fail the run; soft when unset
    pub fail_on_severity: Option<Severity>,
    /// Severity attached to foreign-key and composite-key findings
    pub key_severity: Severity,
    /// Child table to `{column: "parent_table.parent_column"}`
    pub foreign_keys: BTreeMap<String, BTreeMap<String, String>>,
    /// Table to candidate keys
    pub composite_keys: BTreeMap<String, Vec<Vec<String>>>,
    /// Table to predicate rules, in declaration order
    pub constraints: BTreeMap<String, Vec<ConstraintSpec>>,
    pub reports_path: Option<PathBuf>,
    pub format: Vec<ReportFormat>,
}

impl Default for ValidationConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            fail_on_severity: None,
            key_severity: Severity::Warning,
            foreign_keys: BTreeMap::new(),
            composite_keys: BTreeMap::new(),
            constraints: BTreeMap::new(),
            reports_path: None,
            format: vec![ReportFormat::Json],
        }
    }
}

/// `load_cfg` section.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct LoadConfig {
    pub enabled: bool,
    /// Directory receiving one file per table
    pub target_path: Option<PathBuf>,
    pub format: FileFormat,
}

impl Default for LoadConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            target_path: None,
            format: FileFormat::Csv,
        }
    }
}

fn default_true() -> bool {
    true
}

fn default_delimiter() -> char {
    ','
}

impl PipelineConfig {
    /// Reads and validates a YAML file.
    #[instrument]
    pub fn from_path(path: &Path) -> Result<Self> {
        let text = std::fs::read_to_string(path).map_err(|e| {
            PipelineError::Configuration(format!("Cannot read '{}': {e}", path.display()))
        })?;
        Self::from_yaml_str(&text)
    }

    /// Parses and validates a YAML document.
    pub fn from_yaml_str(yaml: &str) -> Result<Self> {
        let config: Self = serde_yaml::from_str(yaml)
            .map_err(|e| PipelineError::Configuration(format!("Invalid configuration: {e}")))?;
        config.validate()?;
        Ok(config)
    }

    /// Checks everything that can be checked without data.
    pub fn validate(&self) -> Result<()> {
        validate_pipeline_id(&self.pipeline_id)?;
        self.logging.parsed_level()?;

        if self.sanitization.max_value_length == 0 {
            return Err(PipelineError::Configuration(
                "sanitization.max_value_length must be positive".to_string(),
            ));
        }

        for (table, source) in &self.extraction_cfg.sources {
            SqlSecurity::validate_identifier(table)
                .map_err(|e| PipelineError::Configuration(format!("source '{table}': {e}")))?;
            if !source.delimiter.is_ascii() {
                return Err(PipelineError::Configuration(format!(
                    "source '{table}': delimiter must be a single ASCII character"
                )));
            }
        }

        let pre = TransformationPlan::resolve(&self.transformation_cfg.pre_validation)?;
        let post = TransformationPlan::resolve(&self.transformation_cfg.post_validation)?;
        let rules = RuleSet::from_config(&self.validation_cfg)?;
        self.profiling_cfg.validate()?;

        // Table references can only be checked when sources are declared.
        let declared: BTreeSet<&str> = self
            .extraction_cfg
            .sources
            .keys()
            .map(String::as_str)
            .collect();
        if !declared.is_empty() {
            let referenced = rules
                .referenced_tables()
                .into_iter()
                .chain(pre.referenced_tables())
                .chain(post.referenced_tables());
            for table in referenced {
                if !declared.contains(table.as_str()) {
                    return Err(PipelineError::Configuration(format!(
                        "table '{table}' is referenced but not declared in extraction_cfg.sources"
                    )));
                }
            }
        }

        debug!(pipeline_id = %self.pipeline_id, "Configuration validated");
        Ok(())
    }
}

fn validate_pipeline_id(id: &str) -> Result<()> {
    let valid = !id.is_empty()
        && id.len() <= 64
        && id
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || c == '_' || c == '-');
    if valid {
        Ok(())
    } else {
        Err(PipelineError::Configuration(format!(
            "pipeline_id '{id}' must be 1-64 characters of letters, digits, '_' or '-'"
        )))
    }
}
