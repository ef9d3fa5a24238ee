//! Logging utilities and configuration for term-pipeline.
//!
//! Engines log through `tracing`. [`LogConfig`] controls how chatty they are
//! and travels with the [`RunContext`](crate::orchestrator::RunContext);
//! [`setup`] installs the global subscriber for binaries.

/// Engine-level logging knobs.
#[derive(Debug, Clone)]
pub struct LogConfig {
    /// Whether to log every generated rule query
    pub log_rule_details: bool,
    /// Whether to log per-table data operations (rows in/out)
    pub log_data_operations: bool,
}

impl Default for LogConfig {
    fn default() -> Self {
        Self {
            log_rule_details: false,
            log_data_operations: true,
        }
    }
}

/// Logs a rule evaluation detail when rule logging is enabled.
#[macro_export]
macro_rules! log_rule {
    ($config:expr, $($arg:tt)*) => {
        if $config.log_rule_details {
            tracing::debug!($($arg)*);
        }
    };
}

/// Logs a data operation when data operation logging is enabled.
#[macro_export]
macro_rules! log_data_op {
    ($config:expr, $($arg:tt)*) => {
        if $config.log_data_operations {
            tracing::info!($($arg)*);
        }
    };
}

/// Truncates a string to at most `max_length` bytes, on a char boundary.
pub fn truncate_field(value: &str, max_length: usize) -> String {
    if value.len() <= max_length {
        return value.to_string();
    }
    let mut end = max_length;
    while !value.is_char_boundary(end) {
        end -= 1;
    }
    format!("{}...(truncated)", &value[..end])
}

/// Subscriber installation for binaries.
pub mod setup {
    use crate::error::{PipelineError, Result};
    use std::path::PathBuf;
    use tracing::Level;
    use tracing_appender::non_blocking::WorkerGuard;

    /// Configuration for installing the global subscriber.
    #[derive(Debug, Clone)]
    pub struct LoggingConfig {
        /// Log level for everything outside this crate
        pub level: Level,
        /// Log level for term-pipeline components
        pub pipeline_level: Level,
        /// Whether to use JSON output format on the console
        pub json_format: bool,
        /// Directory for daily-rolling log files; console only when unset
        pub log_dir: Option<PathBuf>,
        /// File name prefix for rolled log files
        pub file_prefix: String,
    }

    impl Default for LoggingConfig {
        fn default() -> Self {
            Self {
                level: Level::WARN,
                pipeline_level: Level::INFO,
                json_format: false,
                log_dir: None,
                file_prefix: "term-pipeline.log".to_string(),
            }
        }
    }

    impl LoggingConfig {
        /// Sets the log level for term-pipeline components.
        pub fn with_pipeline_level(mut self, level: Level) -> Self {
            self.pipeline_level = level;
            self
        }

        /// Sets whether to use JSON output format.
        pub fn with_json_format(mut self, enabled: bool) -> Self {
            self.json_format = enabled;
            self
        }

        /// Enables daily-rolling file output in `dir`.
        pub fn with_log_dir(mut self, dir: impl Into<PathBuf>) -> Self {
            self.log_dir = Some(dir.into());
            self
        }

        /// Builds the filter used when `RUST_LOG` is unset.
        pub fn env_filter(&self) -> String {
            format!(
                "{},term_pipeline={}",
                self.level.as_str().to_lowercase(),
                self.pipeline_level.as_str().to_lowercase()
            )
        }
    }

    /// Installs the global subscriber.
    ///
    /// When a log directory is configured the returned guard must be kept
    /// alive for the life of the process, or buffered file output is lost.
    ///
    /// # Examples
    ///
    /// ```rust,no_run
    /// use term_pipeline::logging::setup::{init_logging, LoggingConfig};
    ///
    /// let _guard = init_logging(LoggingConfig::default().with_json_format(true)).unwrap();
    /// tracing::info!("pipeline starting");
    /// ```
    pub fn init_logging(config: LoggingConfig) -> Result<Option<WorkerGuard>> {
        use tracing_subscriber::{
            fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter, Layer,
        };

        let env_filter = EnvFilter::try_from_default_env()
            .unwrap_or_else(|_| EnvFilter::new(config.env_filter()));

        let console_layer = if config.json_format {
            fmt::layer().json().boxed()
        } else {
            fmt::layer().with_target(true).boxed()
        };

        let (file_layer, guard) = match &config.log_dir {
            Some(dir) => {
                std::fs::create_dir_all(dir)?;
                let appender = tracing_appender::rolling::daily(dir, &config.file_prefix);
                let (writer, guard) = tracing_appender::non_blocking(appender);
                let layer = fmt::layer()
                    .json()
                    .with_ansi(false)
                    .with_writer(writer)
                    .boxed();
                (Some(layer), Some(guard))
            }
            None => (None, None),
        };

        tracing_subscriber::registry()
            .with(env_filter)
            .with(console_layer)
            .with(file_layer)
            .try_init()
            .map_err(|e| PipelineError::Internal(format!("Failed to install logger: {e}")))?;

        Ok(guard)
    }
}

#[cfg(test)]
mod tests {
    use super::setup::LoggingConfig;
    use super::*;
    use tracing::Level;

    #[test]
    fn test_log_config_defaults() {
        let config = LogConfig::default();
        assert!(!config.log_rule_details);
        assert!(config.log_data_operations);
    }

    #[test]
    fn test_truncate_field() {
        assert_eq!(truncate_field("hello", 10), "hello");

        let long_text = "this is a very long text that should be truncated";
        assert_eq!(truncate_field(long_text, 10), "this is a ...(truncated)");
    }

    #[test]
    fn test_truncate_field_respects_char_boundaries() {
        // 'é' is two bytes; cutting at 2 would split it
        assert_eq!(truncate_field("aé-suffix", 2), "a...(truncated)");
    }

    #[test]
    fn test_env_filter_string() {
        let config = LoggingConfig::default();
        assert_eq!(config.env_filter(), "warn,term_pipeline=info");

        let config = config.with_pipeline_level(Level::DEBUG);
        assert_eq!(config.env_filter(), "warn,term_pipeline=debug");
    }
}
