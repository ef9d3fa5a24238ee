//! Error types for the term-pipeline engine.
//!
//! All errors raised by the engines and the orchestrator are represented by
//! [`PipelineError`]. Validation findings are never errors: they are data and
//! live in [`ValidationReport`](crate::validation::ValidationReport).

use thiserror::Error;

/// Broad classification of an error, used for run summaries.
#[derive(Debug, Clone, Copy, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorCategory {
    /// Invalid configuration detected before or while building the pipeline.
    Configuration,
    /// A source could not be read.
    Extraction,
    /// A sink could not be written.
    Load,
    /// A rule could not be bound to the registry or is malformed.
    ValidationSetup,
    /// Findings reached the configured failure severity.
    Validation,
    /// A transformation step could not be applied.
    Transformation,
    /// A profiling statistic could not be computed.
    Profiling,
    /// Anything else (query engine, I/O, serialization, internal).
    Internal,
}

/// The main error type for term-pipeline.
#[derive(Error, Debug)]
pub enum PipelineError {
    /// Schema violation, unknown operation name, or a rule referencing an
    /// undeclared table or column.
    #[error("Configuration error: {0}")]
    Configuration(String),

    /// A source adapter failed for a table.
    #[error("Extraction failed for table '{table}': {message}")]
    Extraction {
        /// Table being extracted
        table: String,
        /// Detailed error message
        message: String,
        /// Optional underlying error
        #[source]
        source: Option<Box<dyn std::error::Error + Send + Sync>>,
    },

    /// A sink adapter failed for a table.
    #[error("Load failed for table '{table}': {message}")]
    Load {
        /// Table being loaded
        table: String,
        /// Detailed error message
        message: String,
        /// Optional underlying error
        #[source]
        source: Option<Box<dyn std::error::Error + Send + Sync>>,
    },

    /// A validation rule references a table or column that is not present.
    #[error("Rule '{rule}' could not be resolved: {message}")]
    RuleResolution {
        /// Human-readable rule description
        rule: String,
        /// Detailed error message
        message: String,
    },

    /// A validation rule is malformed (bad pattern, bounds, or types).
    #[error("Validation setup failed for rule '{rule}': {message}")]
    ValidationSetup {
        /// Human-readable rule description
        rule: String,
        /// Detailed error message
        message: String,
    },

    /// A transformation step failed while processing a table.
    #[error("Transformation '{operation}' failed on table '{table}': {message}")]
    Transformation {
        /// Operation name from configuration
        operation: String,
        /// Table being transformed
        table: String,
        /// Detailed error message
        message: String,
    },

    /// Findings at or above `validation_cfg.fail_on_severity`.
    #[error("Validation found {violations} violation(s) at or above severity '{threshold}'")]
    ViolationThreshold {
        /// Configured failure severity
        threshold: String,
        /// Offending rows across the escalated rules
        violations: usize,
    },

    /// A profiling statistic could not be computed.
    #[error("Profiling failed for column '{column}': {message}")]
    Profiling {
        /// Column being profiled
        column: String,
        /// Detailed error message
        message: String,
    },

    /// Error from DataFusion operations.
    #[error("DataFusion error: {0}")]
    DataFusion(#[from] datafusion::error::DataFusionError),

    /// Error from Arrow operations.
    #[error("Arrow error: {0}")]
    Arrow(#[from] arrow::error::ArrowError),

    /// Error from I/O operations.
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// Error parsing YAML configuration or writing YAML reports.
    #[error("YAML error: {0}")]
    Yaml(#[from] serde_yaml::Error),

    /// Error from JSON serialization.
    #[error("Serialization error: {0}")]
    Serialization(String),

    /// Security-related error (rejected identifier or pattern).
    #[error("Security error: {0}")]
    SecurityError(String),

    /// A stage transition that the state machine does not allow.
    #[error("Invalid state transition: {from} -> {to}")]
    InvalidState {
        /// Current state
        from: String,
        /// Requested state
        to: String,
    },

    /// Generic internal error for unexpected conditions.
    #[error("Internal error: {0}")]
    Internal(String),
}

/// A type alias for `Result<T, PipelineError>`.
pub type Result<T> = std::result::Result<T, PipelineError>;

impl PipelineError {
    /// Creates a new extraction error.
    pub fn extraction(table: impl Into<String>, message: impl Into<String>) -> Self {
        Self::Extraction {
            table: table.into(),
            message: message.into(),
            source: None,
        }
    }

    /// Creates a new extraction error with a source error.
    pub fn extraction_with_source(
        table: impl Into<String>,
        message: impl Into<String>,
        source: Box<dyn std::error::Error + Send + Sync>,
    ) -> Self {
        Self::Extraction {
            table: table.into(),
            message: message.into(),
            source: Some(source),
        }
    }

    /// Creates a new load error.
    pub fn load(table: impl Into<String>, message: impl Into<String>) -> Self {
        Self::Load {
            table: table.into(),
            message: message.into(),
            source: None,
        }
    }

    /// Creates a new load error with a source error.
    pub fn load_with_source(
        table: impl Into<String>,
        message: impl Into<String>,
        source: Box<dyn std::error::Error + Send + Sync>,
    ) -> Self {
        Self::Load {
            table: table.into(),
            message: message.into(),
            source: Some(source),
        }
    }

    /// Creates a new rule resolution error.
    pub fn rule_resolution(rule: impl Into<String>, message: impl Into<String>) -> Self {
        Self::RuleResolution {
            rule: rule.into(),
            message: message.into(),
        }
    }

    /// Creates a new validation setup error.
    pub fn validation_setup(rule: impl Into<String>, message: impl Into<String>) -> Self {
        Self::ValidationSetup {
            rule: rule.into(),
            message: message.into(),
        }
    }

    /// Creates a new transformation error.
    pub fn transformation(
        operation: impl Into<String>,
        table: impl Into<String>,
        message: impl Into<String>,
    ) -> Self {
        Self::Transformation {
            operation: operation.into(),
            table: table.into(),
            message: message.into(),
        }
    }

    /// Creates a new profiling error.
    pub fn profiling(column: impl Into<String>, message: impl Into<String>) -> Self {
        Self::Profiling {
            column: column.into(),
            message: message.into(),
        }
    }

    /// Returns the category of this error.
    pub fn category(&self) -> ErrorCategory {
        match self {
            Self::Configuration(_) | Self::Yaml(_) | Self::SecurityError(_) => {
                ErrorCategory::Configuration
            }
            Self::Extraction { .. } => ErrorCategory::Extraction,
            Self::Load { .. } => ErrorCategory::Load,
            Self::RuleResolution { .. } | Self::ValidationSetup { .. } => {
                ErrorCategory::ValidationSetup
            }
            Self::ViolationThreshold { .. } => ErrorCategory::Validation,
            Self::Transformation { .. } => ErrorCategory::Transformation,
            Self::Profiling { .. } => ErrorCategory::Profiling,
            Self::DataFusion(_)
            | Self::Arrow(_)
            | Self::Io(_)
            | Self::Serialization(_)
            | Self::InvalidState { .. }
            | Self::Internal(_) => ErrorCategory::Internal,
        }
    }

    /// Returns true if this error must halt the stage that raised it.
    ///
    /// Profiling errors are the only non-fatal kind: the statistic is
    /// omitted and profiling continues.
    pub fn is_fatal(&self) -> bool {
        !matches!(self, Self::Profiling { .. })
    }
}

impl From<serde_json::Error> for PipelineError {
    fn from(err: serde_json::Error) -> Self {
        Self::Serialization(err.to_string())
    }
}

/// Extension trait for adding context to errors.
pub trait ErrorContext<T> {
    /// Adds context to an error.
    fn context(self, msg: &str) -> Result<T>;

    /// Adds context with a lazy message.
    fn with_context<F>(self, f: F) -> Result<T>
    where
        F: FnOnce() -> String;
}

impl<T, E> ErrorContext<T> for std::result::Result<T, E>
where
    E: Into<PipelineError>,
{
    fn context(self, msg: &str) -> Result<T> {
        self.map_err(|e| match e.into() {
            PipelineError::Internal(inner) => PipelineError::Internal(format!("{msg}: {inner}")),
            other => PipelineError::Internal(format!("{msg}: {other}")),
        })
    }

    fn with_context<F>(self, f: F) -> Result<T>
    where
        F: FnOnce() -> String,
    {
        self.map_err(|e| {
            let msg = f();
            match e.into() {
                PipelineError::Internal(inner) => {
                    PipelineError::Internal(format!("{msg}: {inner}"))
                }
                other => PipelineError::Internal(format!("{msg}: {other}")),
            }
        })
    }
}
