//! Operation registry, transformation steps and plans.

use crate::config::{ColumnsSpec, OperationConfig, TransformationPhaseConfig};
use crate::dataset::Dataset;
use crate::error::{PipelineError, Result};
use crate::security::SqlSecurity;
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use std::fmt;

/// Closed set of built-in cleaning operations.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum OperationKind {
    /// Drop rows with a null in any targeted column
    DropNulls,
    /// Drop rows repeating an earlier row on the targeted columns
    DropDuplicates,
    /// Trim leading and trailing whitespace in string columns
    TrimWhitespace,
    /// Remove ASCII control characters from string columns
    StripControlChars,
}

impl OperationKind {
    /// Every registered operation.
    pub const ALL: [OperationKind; 4] = [
        OperationKind::DropNulls,
        OperationKind::DropDuplicates,
        OperationKind::TrimWhitespace,
        OperationKind::StripControlChars,
    ];

    /// Looks an operation up by name. Dashes and underscores are equivalent.
    pub fn from_name(name: &str) -> Option<Self> {
        let normalized = name.trim().to_ascii_lowercase().replace('-', "_");
        Self::ALL
            .into_iter()
            .find(|kind| kind.as_str() == normalized)
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            OperationKind::DropNulls => "drop_nulls",
            OperationKind::DropDuplicates => "drop_duplicates",
            OperationKind::TrimWhitespace => "trim_whitespace",
            OperationKind::StripControlChars => "strip_control_chars",
        }
    }

    /// True for operations that remove rows, false for those rewriting cells.
    pub fn removes_rows(&self) -> bool {
        matches!(
            self,
            OperationKind::DropNulls | OperationKind::DropDuplicates
        )
    }
}

impl fmt::Display for OperationKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Which columns a step targets.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ColumnSelector {
    /// Every column of the dataset
    All,
    /// Exactly these columns
    Columns(Vec<String>),
}

impl ColumnSelector {
    fn from_spec(spec: &ColumnsSpec) -> Result<Self> {
        let columns = match spec {
            ColumnsSpec::Single(s) if s == "all" || s == "*" => return Ok(ColumnSelector::All),
            ColumnsSpec::Single(s) => vec![s.clone()],
            ColumnsSpec::List(list) => list.clone(),
        };
        if columns.is_empty() {
            return Err(PipelineError::Configuration(
                "column list must not be empty (use 'all')".to_string(),
            ));
        }
        for column in &columns {
            SqlSecurity::validate_identifier(column)
                .map_err(|e| PipelineError::Configuration(format!("column '{column}': {e}")))?;
        }
        Ok(ColumnSelector::Columns(columns))
    }

    /// Resolves the selector against a dataset.
    ///
    /// An explicit column the dataset lacks is an error.
    pub fn resolve(&self, dataset: &Dataset, operation: &str) -> Result<Vec<String>> {
        match self {
            ColumnSelector::All => Ok(dataset.column_names()),
            ColumnSelector::Columns(columns) => {
                for column in columns {
                    if !dataset.has_column(column) {
                        return Err(PipelineError::transformation(
                            operation,
                            dataset.name(),
                            format!("column '{column}' does not exist"),
                        ));
                    }
                }
                Ok(columns.clone())
            }
        }
    }
}

/// One configured operation, resolved against the registry.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TransformationStep {
    /// Name from configuration
    pub name: String,
    pub kind: OperationKind,
    pub columns: ColumnSelector,
    /// Tables the step touches; all when `None`
    pub tables: Option<Vec<String>>,
    pub enabled: bool,
}

impl TransformationStep {
    /// Enabled step over all columns of all tables.
    pub fn new(kind: OperationKind) -> Self {
        Self {
            name: kind.as_str().to_string(),
            kind,
            columns: ColumnSelector::All,
            tables: None,
            enabled: true,
        }
    }

    pub fn on_columns<I, S>(mut self, columns: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.columns = ColumnSelector::Columns(columns.into_iter().map(Into::into).collect());
        self
    }

    pub fn on_tables<I, S>(mut self, tables: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.tables = Some(tables.into_iter().map(Into::into).collect());
        self
    }

    pub fn disabled(mut self) -> Self {
        self.enabled = false;
        self
    }

    /// Returns true if the step should touch this table.
    pub fn applies_to(&self, table: &str) -> bool {
        self.tables
            .as_ref()
            .is_none_or(|tables| tables.iter().any(|t| t == table))
    }

    fn from_config(name: &str, config: &OperationConfig) -> Result<Self> {
        let kind_name = config.kind.as_deref().unwrap_or(name);
        let kind = OperationKind::from_name(kind_name).ok_or_else(|| {
            PipelineError::Configuration(format!(
                "operation '{name}' has unknown kind '{kind_name}'"
            ))
        })?;
        let columns = ColumnSelector::from_spec(&config.columns)
            .map_err(|e| PipelineError::Configuration(format!("operation '{name}': {e}")))?;
        if let Some(tables) = &config.tables {
            for table in tables {
                SqlSecurity::validate_identifier(table).map_err(|e| {
                    PipelineError::Configuration(format!("operation '{name}' table '{table}': {e}"))
                })?;
            }
        }
        Ok(Self {
            name: name.to_string(),
            kind,
            columns,
            tables: config.tables.clone(),
            enabled: config.enabled,
        })
    }
}

/// Ordered steps of one transformation pass.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct TransformationPlan {
    steps: Vec<TransformationStep>,
}

impl TransformationPlan {
    /// Builds a plan from explicit steps.
    pub fn new(steps: Vec<TransformationStep>) -> Self {
        Self { steps }
    }

    /// Resolves a phase configuration.
    ///
    /// Every declared operation must name a registered kind and every order
    /// entry must be declared. Declared operations missing from the order are
    /// not part of the plan.
    pub fn resolve(config: &TransformationPhaseConfig) -> Result<Self> {
        let mut resolved = std::collections::BTreeMap::new();
        for (name, op) in &config.operations {
            resolved.insert(name.as_str(), TransformationStep::from_config(name, op)?);
        }

        let mut steps = Vec::with_capacity(config.order.len());
        for name in &config.order {
            let step = resolved.get(name.as_str()).ok_or_else(|| {
                PipelineError::Configuration(format!(
                    "operation order references undeclared operation '{name}'"
                ))
            })?;
            steps.push(step.clone());
        }
        Ok(Self { steps })
    }

    pub fn steps(&self) -> &[TransformationStep] {
        &self.steps
    }

    pub fn is_empty(&self) -> bool {
        self.steps.is_empty()
    }

    /// Tables named by any step's table filter.
    pub fn referenced_tables(&self) -> BTreeSet<String> {
        self.steps
            .iter()
            .filter_map(|s| s.tables.as_ref())
            .flatten()
            .cloned()
            .collect()
    }
}

/// What one step did to one table.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OperationLog {
    pub operation: String,
    pub kind: OperationKind,
    pub table: String,
    pub columns: Vec<String>,
    pub rows_before: usize,
    pub rows_after: usize,
    pub rows_removed: usize,
    pub cells_changed: usize,
    pub skipped: bool,
    pub skip_reason: Option<String>,
}

impl OperationLog {
    pub(crate) fn skipped(step: &TransformationStep, table: &str, rows: usize, reason: &str) -> Self {
        Self {
            operation: step.name.clone(),
            kind: step.kind,
            table: table.to_string(),
            columns: Vec::new(),
            rows_before: rows,
            rows_after: rows,
            rows_removed: 0,
            cells_changed: 0,
            skipped: true,
            skip_reason: Some(reason.to_string()),
        }
    }
}
