//! Severity levels attached to validation rules.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

use crate::error::PipelineError;

/// The severity of a validation rule.
///
/// Severities are ordered: `Error > Warning > Info`. A rule's severity is
/// reported next to its findings and, when the validation section sets
/// `fail_on_severity`, decides whether those findings fail the run.
///
/// ```rust
/// use term_pipeline::severity::Severity;
///
/// assert!(Severity::Error > Severity::Warning);
/// assert!(Severity::Warning.is_at_least(Severity::Info));
/// assert_eq!(Severity::default(), Severity::Warning);
/// ```
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize, Default,
)]
#[serde(rename_all = "lowercase")]
pub enum Severity {
    /// Informational finding
    Info = 0,
    /// Finding that should be reviewed
    #[default]
    Warning = 1,
    /// Finding that breaks downstream consumers
    Error = 2,
}

impl Severity {
    /// Returns the string representation of the severity.
    pub fn as_str(&self) -> &'static str {
        match self {
            Severity::Info => "info",
            Severity::Warning => "warning",
            Severity::Error => "error",
        }
    }

    /// Checks if this severity is at least as high as another one.
    pub fn is_at_least(&self, other: Severity) -> bool {
        *self >= other
    }
}

impl fmt::Display for Severity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

impl FromStr for Severity {
    type Err = PipelineError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "info" => Ok(Severity::Info),
            "warning" | "warn" => Ok(Severity::Warning),
            "error" => Ok(Severity::Error),
            other => Err(PipelineError::Configuration(format!(
                "Unknown severity '{other}' (expected info, warning or error)"
            ))),
        }
    }
}
