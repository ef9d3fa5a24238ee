//! Column profiling.
//!
//! [`ProfilingEngine::profile`] computes per-column statistics for one
//! dataset. It is read-only and deterministic: the same dataset and
//! configuration always produce the same report.
//!
//! Each column goes through up to three passes:
//!
//! 1. counts (null fraction and distinct values)
//! 2. a top-k frequency table for categorical columns
//! 3. a numeric summary with exact percentiles for numeric columns
//!
//! A statistic that cannot be computed is recorded in the report's
//! `omitted` list and profiling moves on to the next one.
//!
//! ```rust,no_run
//! use term_pipeline::dataset::Dataset;
//! use term_pipeline::orchestrator::RunContext;
//! use term_pipeline::profiling::{ProfilingConfig, ProfilingEngine};
//!
//! # async fn example(users: Dataset) -> term_pipeline::error::Result<()> {
//! let config = ProfilingConfig {
//!     detailed: true,
//!     ..ProfilingConfig::default()
//! };
//! let engine = ProfilingEngine::new(RunContext::new("shop", false));
//! let report = engine.profile(&users, &config).await?;
//! for column in &report.overall.columns {
//!     println!("{}: {:?}", column.column, column.null_fraction);
//! }
//! # Ok(())
//! # }
//! ```

mod config;
mod report;
mod stats;

pub use config::{ProfilingConfig, StatKind};
pub use report::{
    ColumnProfile, Correlation, DetectedDataType, GroupProfile, NumericSummary, OmittedStat,
    Percentile, ProfileReport, ProfileSection, TopValue,
};

use crate::context::{take_rows, value_to_string, PipelineContext};
use crate::dataset::Dataset;
use crate::error::{PipelineError, Result};
use crate::orchestrator::{RunContext, Stage};
use crate::security::{SqlSecurity, ROW_ID_COLUMN};
use arrow::array::{Array, AsArray, Int64Array, UInt64Array};
use arrow::datatypes::Float64Type;
use arrow::record_batch::RecordBatch;
use datafusion::scalar::ScalarValue;
use futures::future::try_join_all;
use std::time::Instant;
use tracing::{debug, info, instrument};

/// Computes profile reports.
#[derive(Debug, Clone)]
pub struct ProfilingEngine {
    run: RunContext,
}

impl ProfilingEngine {
    pub fn new(run: RunContext) -> Self {
        Self { run }
    }

    /// Profiles one dataset.
    ///
    /// Returns a configuration error before reading any data when `config`
    /// fails [`ProfilingConfig::validate`].
    #[instrument(skip_all, fields(table = %dataset.name(), rows = dataset.num_rows()))]
    pub async fn profile(&self, dataset: &Dataset, config: &ProfilingConfig) -> Result<ProfileReport> {
        config.validate()?;
        let start = Instant::now();
        let (columns, mut omitted) = select_columns(dataset, config);

        let mut ctx = PipelineContext::new();
        ctx.register(dataset)?;
        let mut overall = self.profile_section(&ctx, dataset, &columns, config).await?;

        let missing_groups: Vec<&String> = config
            .group_by
            .iter()
            .filter(|g| !dataset.has_column(g))
            .collect();
        let groups = if config.group_by.is_empty() {
            Vec::new()
        } else if !missing_groups.is_empty() {
            omitted.extend(missing_groups.into_iter().map(|g| OmittedStat {
                column: g.clone(),
                stat: "group_by".to_string(),
                reason: "column not found".to_string(),
            }));
            Vec::new()
        } else {
            let group_columns: Vec<String> = columns
                .iter()
                .filter(|c| !config.group_by.contains(c))
                .cloned()
                .collect();
            let keyed = self.group_rows(&ctx, dataset, &config.group_by).await?;
            try_join_all(keyed.into_iter().map(|(key, row_ids)| {
                let group_columns = &group_columns;
                async move {
                    let subset = dataset.derive(take_rows(dataset.batch(), &row_ids)?, Stage::Profile)?;
                    let mut group_ctx = PipelineContext::new();
                    group_ctx.register(&subset)?;
                    let profile = self
                        .profile_section(&group_ctx, &subset, group_columns, config)
                        .await?;
                    Ok::<_, PipelineError>(GroupProfile { key, profile })
                }
            }))
            .await?
        };

        omitted.append(&mut overall.omitted);
        overall.omitted = omitted;

        info!(
            columns = overall.columns.len(),
            groups = groups.len(),
            omitted = overall.omitted.len(),
            time_ms = start.elapsed().as_millis() as u64,
            "Completed table profiling"
        );

        Ok(ProfileReport {
            pipeline_id: self.run.pipeline_id().to_string(),
            run_id: self.run.run_id().to_string(),
            table: dataset.name().to_string(),
            overall,
            group_by: config.group_by.clone(),
            groups,
        })
    }

    async fn profile_section(
        &self,
        ctx: &PipelineContext,
        dataset: &Dataset,
        columns: &[String],
        config: &ProfilingConfig,
    ) -> Result<ProfileSection> {
        let table = SqlSecurity::escape_identifier(dataset.name())
            .map_err(|e| PipelineError::profiling(dataset.name(), e.to_string()))?;
        let schema = dataset.schema();
        let mut section = ProfileSection {
            row_count: dataset.num_rows() as u64,
            ..ProfileSection::default()
        };

        for column in columns {
            let Some((_, field)) = schema.column_with_name(column) else {
                continue;
            };
            let data_type = DetectedDataType::from_arrow(field.data_type());
            let quoted = match SqlSecurity::escape_identifier(column) {
                Ok(quoted) => quoted,
                Err(e) => {
                    section.omitted.push(omit(column, "all", e));
                    continue;
                }
            };

            let mut profile = ColumnProfile {
                column: column.clone(),
                data_type,
                row_count: section.row_count,
                null_count: None,
                null_fraction: None,
                distinct_count: None,
                top_k: None,
                numeric: None,
            };

            // Pass 1: counts
            if config.wants(StatKind::NullFraction) || config.wants(StatKind::DistinctCount) {
                match self.counts(ctx, &table, &quoted).await {
                    Ok((total, non_null, distinct)) => {
                        if config.wants(StatKind::NullFraction) {
                            let nulls = total - non_null;
                            profile.null_count = Some(nulls);
                            profile.null_fraction = Some(if total > 0 {
                                nulls as f64 / total as f64
                            } else {
                                0.0
                            });
                        }
                        if config.wants(StatKind::DistinctCount) {
                            profile.distinct_count = Some(distinct);
                        }
                    }
                    Err(e) => section.omitted.push(omit(column, "counts", e)),
                }
            }

            // Pass 2: frequency table
            if config.wants(StatKind::TopK) && data_type.is_categorical() {
                match self.top_values(ctx, &table, &quoted, config.top_k).await {
                    Ok(values) => profile.top_k = Some(values),
                    Err(e) => section.omitted.push(omit(column, StatKind::TopK.as_str(), e)),
                }
            }

            // Pass 3: numeric distribution
            if config.wants(StatKind::NumericSummary) && data_type.is_numeric() {
                match numeric_values(ctx, &table, &quoted).await {
                    Ok(values) => profile.numeric = stats::summarize(&values, &config.percentiles),
                    Err(e) => {
                        section
                            .omitted
                            .push(omit(column, StatKind::NumericSummary.as_str(), e))
                    }
                }
            }

            debug!(column = %column, data_type = ?data_type, "Profiled column");
            section.columns.push(profile);
        }

        if config.wants(StatKind::Correlation) {
            let numeric: Vec<&ColumnProfile> = section
                .columns
                .iter()
                .filter(|c| c.data_type.is_numeric())
                .collect();
            let mut correlations = Vec::new();
            let mut failures = Vec::new();
            for (i, left) in numeric.iter().enumerate() {
                for right in &numeric[i + 1..] {
                    match paired_values(ctx, &table, &left.column, &right.column).await {
                        Ok(pairs) => correlations.push(Correlation {
                            left: left.column.clone(),
                            right: right.column.clone(),
                            coefficient: stats::pearson(&pairs),
                        }),
                        Err(e) => failures.push(omit(
                            &format!("{}, {}", left.column, right.column),
                            StatKind::Correlation.as_str(),
                            e,
                        )),
                    }
                }
            }
            section.correlations = correlations;
            section.omitted.extend(failures);
        }

        Ok(section)
    }

    async fn counts(&self, ctx: &PipelineContext, table: &str, column: &str) -> Result<(u64, u64, u64)> {
        let sql = format!(
            "SELECT COUNT(*) AS total_count, COUNT({column}) AS non_null_count, \
             COUNT(DISTINCT {column}) AS distinct_count FROM {table}"
        );
        let batches = ctx.sql(&sql).await?;
        let batch = first_row(&batches)?;
        Ok((
            scalar_u64(batch, 0)?,
            scalar_u64(batch, 1)?,
            scalar_u64(batch, 2)?,
        ))
    }

    async fn top_values(
        &self,
        ctx: &PipelineContext,
        table: &str,
        column: &str,
        k: usize,
    ) -> Result<Vec<TopValue>> {
        let sql = format!(
            "SELECT {column} AS top_value, COUNT(*) AS frequency FROM {table} \
             WHERE {column} IS NOT NULL GROUP BY {column} \
             ORDER BY frequency DESC, top_value ASC LIMIT {k}"
        );
        let mut values = Vec::new();
        for batch in ctx.sql(&sql).await? {
            for row in 0..batch.num_rows() {
                let value = value_to_string(batch.column(0).as_ref(), row)?.unwrap_or_default();
                values.push(TopValue {
                    value: self.run.sanitize(&value),
                    count: count_at(&batch, 1, row)?,
                });
            }
        }
        Ok(values)
    }

    /// Row ids of each distinct group-by key, ordered by key.
    async fn group_rows(
        &self,
        ctx: &PipelineContext,
        dataset: &Dataset,
        group_by: &[String],
    ) -> Result<Vec<(Vec<String>, Vec<u64>)>> {
        let table = SqlSecurity::escape_identifier(dataset.name())?;
        let keys = group_by
            .iter()
            .map(|g| SqlSecurity::escape_identifier(g))
            .collect::<Result<Vec<_>>>()?
            .join(", ");
        let sql = format!(
            "SELECT \"{ROW_ID_COLUMN}\", {keys} FROM {table} ORDER BY {keys}, \"{ROW_ID_COLUMN}\""
        );

        let mut groups: Vec<(Vec<ScalarValue>, Vec<String>, Vec<u64>)> = Vec::new();
        for batch in ctx.sql(&sql).await? {
            let ids = crate::context::row_id_column(&batch, 0)?;
            for row in 0..batch.num_rows() {
                let key = (1..batch.num_columns())
                    .map(|col| ScalarValue::try_from_array(batch.column(col), row))
                    .collect::<std::result::Result<Vec<_>, _>>()?;
                let same_group = groups.last().is_some_and(|(last, _, _)| *last == key);
                match groups.last_mut() {
                    Some((_, _, rows)) if same_group => rows.push(ids.value(row)),
                    _ => {
                        let display = (1..batch.num_columns())
                            .map(|col| {
                                value_to_string(batch.column(col).as_ref(), row).map(|v| {
                                    v.map_or_else(|| "null".to_string(), |v| self.run.sanitize(&v))
                                })
                            })
                            .collect::<Result<Vec<_>>>()?;
                        groups.push((key, display, vec![ids.value(row)]));
                    }
                }
            }
        }
        Ok(groups
            .into_iter()
            .map(|(_, display, rows)| (display, rows))
            .collect())
    }
}

/// Columns to profile in schema order, plus reasons for unknown includes.
fn select_columns(dataset: &Dataset, config: &ProfilingConfig) -> (Vec<String>, Vec<OmittedStat>) {
    let mut omitted = Vec::new();
    let included: Vec<String> = if config.includes_all() {
        dataset.column_names()
    } else {
        for column in &config.include_columns {
            if !dataset.has_column(column) {
                omitted.push(OmittedStat {
                    column: column.clone(),
                    stat: "column".to_string(),
                    reason: "column not found".to_string(),
                });
            }
        }
        dataset
            .column_names()
            .into_iter()
            .filter(|c| config.include_columns.contains(c))
            .collect()
    };
    let selected = included
        .into_iter()
        .filter(|c| !config.exclude_columns.contains(c))
        .collect();
    (selected, omitted)
}

fn omit(column: &str, stat: &str, error: impl std::fmt::Display) -> OmittedStat {
    OmittedStat {
        column: column.to_string(),
        stat: stat.to_string(),
        reason: error.to_string(),
    }
}

async fn numeric_values(ctx: &PipelineContext, table: &str, column: &str) -> Result<Vec<f64>> {
    let sql = format!("SELECT CAST({column} AS DOUBLE) FROM {table} WHERE {column} IS NOT NULL");
    let mut values = Vec::new();
    for batch in ctx.sql(&sql).await? {
        values.extend(float_column(&batch, 0)?.iter().flatten());
    }
    values.sort_by(f64::total_cmp);
    Ok(values)
}

async fn paired_values(
    ctx: &PipelineContext,
    table: &str,
    left: &str,
    right: &str,
) -> Result<Vec<(f64, f64)>> {
    let left = SqlSecurity::escape_identifier(left)?;
    let right = SqlSecurity::escape_identifier(right)?;
    let sql = format!(
        "SELECT CAST({left} AS DOUBLE), CAST({right} AS DOUBLE) FROM {table} \
         WHERE {left} IS NOT NULL AND {right} IS NOT NULL ORDER BY \"{ROW_ID_COLUMN}\""
    );
    let mut pairs = Vec::new();
    for batch in ctx.sql(&sql).await? {
        let xs = float_column(&batch, 0)?;
        let ys = float_column(&batch, 1)?;
        pairs.extend(
            xs.iter()
                .zip(ys.iter())
                .filter_map(|(x, y)| Some((x?, y?))),
        );
    }
    Ok(pairs)
}

fn float_column(batch: &RecordBatch, index: usize) -> Result<&arrow::array::Float64Array> {
    batch
        .column(index)
        .as_primitive_opt::<Float64Type>()
        .ok_or_else(|| PipelineError::Internal("expected a DOUBLE result column".to_string()))
}

fn first_row(batches: &[RecordBatch]) -> Result<&RecordBatch> {
    batches
        .iter()
        .find(|b| b.num_rows() > 0)
        .ok_or_else(|| PipelineError::Internal("aggregate query returned no rows".to_string()))
}

fn scalar_u64(batch: &RecordBatch, index: usize) -> Result<u64> {
    count_at(batch, index, 0)
}

fn count_at(batch: &RecordBatch, index: usize, row: usize) -> Result<u64> {
    let column = batch.column(index);
    if column.is_null(row) {
        return Ok(0);
    }
    if let Some(array) = column.as_any().downcast_ref::<Int64Array>() {
        Ok(array.value(row).max(0) as u64)
    } else if let Some(array) = column.as_any().downcast_ref::<UInt64Array>() {
        Ok(array.value(row))
    } else {
        Err(PipelineError::Internal(format!(
            "expected an integer count, got {}",
            column.data_type()
        )))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use arrow::array::{Float64Array, StringArray};
    use arrow::datatypes::{DataType, Field, Schema};
    use std::sync::Arc;

    fn people() -> Dataset {
        let schema = Arc::new(Schema::new(vec![
            Field::new("age", DataType::Int64, true),
            Field::new("score", DataType::Float64, true),
            Field::new("country", DataType::Utf8, true),
        ]));
        let batch = RecordBatch::try_new(
            schema,
            vec![
                Arc::new(Int64Array::from(vec![Some(20), Some(30), None, Some(40), Some(50)])),
                Arc::new(Float64Array::from(vec![
                    Some(2.0),
                    Some(3.0),
                    Some(9.0),
                    Some(4.0),
                    Some(5.0),
                ])),
                Arc::new(StringArray::from(vec![
                    Some("NO"),
                    Some("PE"),
                    Some("NO"),
                    None,
                    Some("NO"),
                ])),
            ],
        )
        .unwrap();
        Dataset::new("people", batch)
    }

    fn engine() -> ProfilingEngine {
        ProfilingEngine::new(RunContext::new("profile_test", false))
    }

    #[tokio::test]
    async fn test_base_stats() -> Result<()> {
        let report = engine().profile(&people(), &ProfilingConfig::default()).await?;
        assert_eq!(report.overall.columns.len(), 3);

        let age = report.column("age").unwrap();
        assert_eq!(age.data_type, DetectedDataType::Integer);
        assert_eq!(age.null_count, Some(1));
        assert_eq!(age.null_fraction, Some(0.2));
        assert_eq!(age.distinct_count, Some(4));
        assert!(age.numeric.is_none());
        assert!(age.top_k.is_none());

        let country = report.column("country").unwrap();
        assert_eq!(country.distinct_count, Some(2));

        // age and score pair up on rows 0, 1, 3, 4 and grow together
        assert_eq!(report.overall.correlations.len(), 1);
        let coefficient = report.overall.correlations[0].coefficient.unwrap();
        assert!((coefficient - 1.0).abs() < 1e-9);
        Ok(())
    }

    #[tokio::test]
    async fn test_detailed_stats() -> Result<()> {
        let config = ProfilingConfig {
            detailed: true,
            top_k: 1,
            ..ProfilingConfig::default()
        };
        let report = engine().profile(&people(), &config).await?;

        let age = report.column("age").unwrap().numeric.clone().unwrap();
        assert_eq!(age.count, 4);
        assert_eq!(age.min, 20.0);
        assert_eq!(age.max, 50.0);
        assert_eq!(age.mean, 35.0);
        assert_eq!(age.percentiles.len(), 4);
        assert_eq!(age.percentiles[1].value, 35.0);

        let top = report.column("country").unwrap().top_k.clone().unwrap();
        assert_eq!(
            top,
            vec![TopValue {
                value: "NO".to_string(),
                count: 3
            }]
        );
        Ok(())
    }

    #[tokio::test]
    async fn test_column_selection() -> Result<()> {
        let config = ProfilingConfig {
            include_columns: vec!["country".into(), "age".into(), "height".into()],
            exclude_columns: vec!["age".into()],
            ..ProfilingConfig::default()
        };
        let report = engine().profile(&people(), &config).await?;
        let names: Vec<&str> = report
            .overall
            .columns
            .iter()
            .map(|c| c.column.as_str())
            .collect();
        assert_eq!(names, vec!["country"]);
        assert_eq!(report.overall.omitted.len(), 1);
        assert_eq!(report.overall.omitted[0].column, "height");
        Ok(())
    }

    #[tokio::test]
    async fn test_grouped_profiles_are_ordered_by_key() -> Result<()> {
        let config = ProfilingConfig {
            group_by: vec!["country".into()],
            ..ProfilingConfig::default()
        };
        let report = engine().profile(&people(), &config).await?;
        let keys: Vec<Vec<String>> = report.groups.iter().map(|g| g.key.clone()).collect();
        assert_eq!(keys.len(), 3);
        let norway_at = keys.iter().position(|k| k == &["NO"]).unwrap();
        let peru_at = keys.iter().position(|k| k == &["PE"]).unwrap();
        assert!(norway_at < peru_at);
        assert!(keys.contains(&vec!["null".to_string()]));

        let norway = &report.groups[norway_at].profile;
        assert_eq!(norway.row_count, 3);
        assert!(norway.column("country").is_none());
        assert_eq!(norway.column("age").unwrap().null_count, Some(1));
        Ok(())
    }

    #[tokio::test]
    async fn test_profile_is_deterministic() -> Result<()> {
        let config = ProfilingConfig {
            detailed: true,
            group_by: vec!["country".into()],
            ..ProfilingConfig::default()
        };
        let engine = engine();
        let first = serde_json::to_string(&engine.profile(&people(), &config).await?)?;
        let second = serde_json::to_string(&engine.profile(&people(), &config).await?)?;
        assert_eq!(first, second);
        Ok(())
    }

    #[tokio::test]
    async fn test_free_form_column_names_are_profiled() -> Result<()> {
        let schema = Arc::new(Schema::new(vec![
            Field::new("first name", DataType::Utf8, true),
            Field::new("order-total", DataType::Float64, true),
        ]));
        let batch = RecordBatch::try_new(
            schema,
            vec![
                Arc::new(StringArray::from(vec![Some("ada"), None, Some("ada")])),
                Arc::new(Float64Array::from(vec![Some(1.0), Some(3.0), None])),
            ],
        )
        .unwrap();
        let config = ProfilingConfig {
            detailed: true,
            ..ProfilingConfig::default()
        };
        let report = engine().profile(&Dataset::new("orders", batch), &config).await?;

        assert_eq!(report.omitted_count(), 0);
        let name = report.column("first name").expect("profiled");
        assert_eq!(name.null_count, Some(1));
        assert_eq!(name.distinct_count, Some(1));
        let total = report.column("order-total").and_then(|c| c.numeric.clone()).expect("numeric");
        assert_eq!(total.max, 3.0);
        Ok(())
    }

    #[tokio::test]
    async fn test_out_of_range_percentile_is_a_configuration_error() {
        let config = ProfilingConfig {
            detailed: true,
            percentiles: vec![150.0],
            ..ProfilingConfig::default()
        };
        let err = engine().profile(&people(), &config).await.unwrap_err();
        assert!(matches!(err, PipelineError::Configuration(_)));
    }

    #[tokio::test]
    async fn test_missing_group_column_is_omitted() -> Result<()> {
        let config = ProfilingConfig {
            group_by: vec!["region".into()],
            ..ProfilingConfig::default()
        };
        let report = engine().profile(&people(), &config).await?;
        assert!(report.groups.is_empty());
        assert_eq!(report.omitted_count(), 1);
        Ok(())
    }
}
