//! Prelude for commonly used types and traits in term-pipeline.

pub use crate::config::PipelineConfig;
pub use crate::dataset::{Dataset, DatasetRegistry};
pub use crate::error::{ErrorContext, PipelineError, Result};
pub use crate::formatters::{FormatterConfig, RunSummaryFormatter};
pub use crate::logging::LogConfig;
pub use crate::orchestrator::{
    Extractor, Loader, MemoryExtractor, MemoryLoader, Orchestrator, Pipeline, RunContext,
    RunResult, RunStatus, Stage,
};
pub use crate::severity::Severity;
