//! Per-run values threaded from the orchestrator into every engine call.

use crate::logging::{truncate_field, LogConfig};
use chrono::{DateTime, SecondsFormat, Utc};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};

/// How cell values are cleaned before they appear in reports and logs.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct SanitizationPolicy {
    /// Remove ASCII control characters (0x00-0x1F)
    pub strip_control_chars: bool,
    /// Truncate rendered values longer than this many bytes
    pub max_value_length: usize,
}

impl Default for SanitizationPolicy {
    fn default() -> Self {
        Self {
            strip_control_chars: true,
            max_value_length: 256,
        }
    }
}

impl SanitizationPolicy {
    /// Cleans one rendered value.
    pub fn apply(&self, value: &str) -> String {
        let cleaned: String = if self.strip_control_chars {
            value.chars().filter(|c| !is_control_char(*c)).collect()
        } else {
            value.to_string()
        };
        truncate_field(&cleaned, self.max_value_length)
    }
}

/// ASCII control characters 0x00-0x1F.
pub(crate) fn is_control_char(c: char) -> bool {
    (c as u32) < 0x20
}

/// Identity and policy of one pipeline run.
#[derive(Debug, Clone)]
pub struct RunContext {
    pipeline_id: String,
    run_id: String,
    started_at: DateTime<Utc>,
    dry_run: bool,
    sanitization: SanitizationPolicy,
    log: LogConfig,
}

impl RunContext {
    /// Starts a run now.
    pub fn new(pipeline_id: impl Into<String>, dry_run: bool) -> Self {
        Self::started_at(pipeline_id, dry_run, Utc::now())
    }

    /// Starts a run at a fixed time.
    pub fn started_at(pipeline_id: impl Into<String>, dry_run: bool, at: DateTime<Utc>) -> Self {
        let pipeline_id = pipeline_id.into();
        let run_id = run_id_for(&pipeline_id, &at);
        Self {
            pipeline_id,
            run_id,
            started_at: at,
            dry_run,
            sanitization: SanitizationPolicy::default(),
            log: LogConfig::default(),
        }
    }

    pub fn with_sanitization(mut self, policy: SanitizationPolicy) -> Self {
        self.sanitization = policy;
        self
    }

    pub fn with_log_config(mut self, log: LogConfig) -> Self {
        self.log = log;
        self
    }

    pub fn pipeline_id(&self) -> &str {
        &self.pipeline_id
    }

    /// Short hash identifying this run.
    pub fn run_id(&self) -> &str {
        &self.run_id
    }

    pub fn start_time(&self) -> DateTime<Utc> {
        self.started_at
    }

    pub fn is_dry_run(&self) -> bool {
        self.dry_run
    }

    pub fn sanitization(&self) -> &SanitizationPolicy {
        &self.sanitization
    }

    pub fn log(&self) -> &LogConfig {
        &self.log
    }

    /// Applies the sanitization policy to a rendered value.
    pub fn sanitize(&self, value: &str) -> String {
        self.sanitization.apply(value)
    }

    /// Compact UTC start timestamp used in artifact names.
    pub fn timestamp_tag(&self) -> String {
        self.started_at.format("%Y%m%dT%H%M%SZ").to_string()
    }
}

fn run_id_for(pipeline_id: &str, at: &DateTime<Utc>) -> String {
    let mut hasher = Sha256::new();
    hasher.update(pipeline_id.as_bytes());
    hasher.update(b"_");
    hasher.update(at.to_rfc3339_opts(SecondsFormat::Micros, true).as_bytes());
    let digest = hex::encode(hasher.finalize());
    digest[..8].to_string()
}
