//! # term-pipeline - Rule-driven ETL on DataFusion
//!
//! term-pipeline runs a tabular ETL pipeline described by one YAML document.
//! Tables are extracted into Arrow record batches, cleaned by an ordered list
//! of transformation steps, checked against typed validation rules,
//! profiled, and handed to a sink. Every query runs on DataFusion.
//!
//! ## Overview
//!
//! A run moves through a fixed sequence of stages:
//!
//! ```text
//! Extract -> PreTransform -> Validate -> PostTransform -> Profile -> Load
//! ```
//!
//! Each stage can be disabled in configuration. Validation findings are data
//! attached to the run result; they only fail a run when
//! `validation_cfg.fail_on_severity` asks for it. Extraction and load errors
//! are fatal.
//!
//! ## Quick Start
//!
//! ```rust
//! use term_pipeline::prelude::*;
//! use arrow::array::{Int64Array, RecordBatch};
//! use arrow::datatypes::{DataType, Field, Schema};
//! use std::sync::Arc;
//!
//! # async fn example() -> term_pipeline::error::Result<()> {
//! let schema = Arc::new(Schema::new(vec![Field::new("age", DataType::Int64, true)]));
//! let users = RecordBatch::try_new(
//!     schema,
//!     vec![Arc::new(Int64Array::from(vec![25, -5, 150, 40]))],
//! )?;
//!
//! let config = PipelineConfig::from_yaml_str(
//!     r#"
//! pipeline_id: quickstart
//! dry_run: true
//! validation_cfg:
//!   constraints:
//!     users:
//!       - { column: age, kind: range, min: 0, max: 100, inclusive: false }
//! "#,
//! )?;
//!
//! let orchestrator = Orchestrator::new(
//!     MemoryExtractor::new().with_table("users", users),
//!     MemoryLoader::new(),
//! );
//! let result = orchestrator.run(&config).await?;
//! assert!(result.is_success());
//! assert_eq!(result.total_violations(), 2);
//! # Ok(())
//! # }
//! ```
//!
//! ## Engines
//!
//! The stage engines can be used on their own:
//!
//! - [`transform::TransformationEngine`]: `drop_nulls`, `drop_duplicates`,
//!   `trim_whitespace` and `strip_control_chars`, applied in declared order
//! - [`validation::ValidationEngine`]: range, pattern, membership and
//!   not-null predicates, foreign keys and composite keys
//! - [`profiling::ProfilingEngine`]: null fractions, distinct counts, top-k
//!   values, numeric summaries, correlations and grouped profiles
//!
//! All of them take a [`orchestrator::RunContext`] carrying the pipeline id,
//! run id, dry-run flag and value sanitization policy.
//!
//! ## Logging
//!
//! The library only emits `tracing` events. Binaries install a subscriber
//! with [`logging::setup::init_logging`].

pub mod config;
pub mod context;
pub mod dataset;
pub mod error;
pub mod formatters;
pub mod logging;
pub mod orchestrator;
pub mod prelude;
pub mod profiling;
pub mod reports;
pub mod security;
pub mod severity;
pub mod transform;
pub mod validation;
