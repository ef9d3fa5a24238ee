//! Transformation engine.
//!
//! [`TransformationEngine::apply`] runs an ordered list of
//! [`TransformationStep`]s over one dataset. Each step consumes the dataset
//! produced by the previous one and the input is never modified.
//!
//! Row-removing operations are planned as SQL over the registered table and
//! return the surviving row positions, which are then taken from the input
//! batch in their original order. Cell-rewriting operations work directly
//! on Arrow string arrays.
//!
//! Every built-in operation is idempotent.

mod operation;

pub use operation::{
    ColumnSelector, OperationKind, OperationLog, TransformationPlan, TransformationStep,
};

use crate::context::{take_rows, PipelineContext};
use crate::dataset::Dataset;
use crate::error::{PipelineError, Result};
use crate::orchestrator::run_context::is_control_char;
use crate::orchestrator::{RunContext, Stage};
use crate::security::{SqlSecurity, ROW_ID_COLUMN};
use crate::log_data_op;
use arrow::array::{Array, ArrayRef, AsArray, LargeStringArray, StringArray, StringViewArray};
use arrow::datatypes::DataType;
use arrow::record_batch::RecordBatch;
use std::borrow::Cow;
use std::sync::Arc;
use tracing::{debug, instrument};

/// Applies transformation steps to datasets.
#[derive(Debug, Clone)]
pub struct TransformationEngine {
    run: RunContext,
    stage: Stage,
}

impl TransformationEngine {
    /// Creates an engine for one transformation pass.
    pub fn new(run: RunContext, stage: Stage) -> Self {
        Self { run, stage }
    }

    /// Applies `steps` in order and returns the new dataset and a log entry
    /// per step.
    #[instrument(skip_all, fields(table = %dataset.name(), stage = %self.stage, steps = steps.len()))]
    pub async fn apply(
        &self,
        dataset: &Dataset,
        steps: &[TransformationStep],
    ) -> Result<(Dataset, Vec<OperationLog>)> {
        let mut current = dataset.clone();
        let mut logs = Vec::with_capacity(steps.len());

        for step in steps {
            let rows_before = current.num_rows();
            if !step.enabled {
                logs.push(OperationLog::skipped(step, current.name(), rows_before, "disabled"));
                continue;
            }
            if !step.applies_to(current.name()) {
                logs.push(OperationLog::skipped(
                    step,
                    current.name(),
                    rows_before,
                    "table not targeted",
                ));
                continue;
            }

            let columns = step.columns.resolve(&current, &step.name)?;
            let (batch, cells_changed) = match step.kind {
                OperationKind::DropNulls => (self.drop_nulls(&current, &columns).await?, 0),
                OperationKind::DropDuplicates => {
                    (self.drop_duplicates(&current, &columns).await?, 0)
                }
                OperationKind::TrimWhitespace => rewrite_strings(&current, &columns, trim)?,
                OperationKind::StripControlChars => {
                    rewrite_strings(&current, &columns, strip_control)?
                }
            };
            current = current.derive(batch, self.stage)?;

            let log = OperationLog {
                operation: step.name.clone(),
                kind: step.kind,
                table: current.name().to_string(),
                columns,
                rows_before,
                rows_after: current.num_rows(),
                rows_removed: rows_before - current.num_rows(),
                cells_changed,
                skipped: false,
                skip_reason: None,
            };
            log_data_op!(
                self.run.log(),
                table = %log.table,
                operation = %log.operation,
                rows_removed = log.rows_removed,
                cells_changed = log.cells_changed,
                "Applied transformation step"
            );
            logs.push(log);
        }

        Ok((current, logs))
    }

    /// Applies a resolved plan.
    pub async fn apply_plan(
        &self,
        dataset: &Dataset,
        plan: &TransformationPlan,
    ) -> Result<(Dataset, Vec<OperationLog>)> {
        self.apply(dataset, plan.steps()).await
    }

    async fn drop_nulls(&self, dataset: &Dataset, columns: &[String]) -> Result<RecordBatch> {
        if columns.is_empty() {
            return Ok(dataset.batch().clone());
        }
        let predicate = columns
            .iter()
            .map(|c| Ok(format!("{} IS NOT NULL", quoted(c, dataset, "drop_nulls")?)))
            .collect::<Result<Vec<_>>>()?
            .join(" AND ");
        let sql = format!(
            "SELECT \"{ROW_ID_COLUMN}\" FROM {} WHERE {predicate}",
            quoted_table(dataset, "drop_nulls")?
        );
        self.surviving_rows(dataset, &sql).await
    }

    async fn drop_duplicates(&self, dataset: &Dataset, columns: &[String]) -> Result<RecordBatch> {
        if columns.is_empty() || dataset.num_rows() == 0 {
            return Ok(dataset.batch().clone());
        }
        let keys = columns
            .iter()
            .map(|c| quoted(c, dataset, "drop_duplicates"))
            .collect::<Result<Vec<_>>>()?
            .join(", ");
        // GROUP BY treats nulls as equal, so null-bearing rows dedupe too
        let sql = format!(
            "SELECT MIN(\"{ROW_ID_COLUMN}\") FROM {} GROUP BY {keys}",
            quoted_table(dataset, "drop_duplicates")?
        );
        self.surviving_rows(dataset, &sql).await
    }

    async fn surviving_rows(&self, dataset: &Dataset, sql: &str) -> Result<RecordBatch> {
        let mut ctx = PipelineContext::new();
        ctx.register(dataset)?;
        debug!(sql = %sql, "Planning row filter");
        let mut keep = ctx.row_ids(sql).await?;
        keep.sort_unstable();
        take_rows(dataset.batch(), &keep)
    }
}

fn quoted(column: &str, dataset: &Dataset, operation: &str) -> Result<String> {
    SqlSecurity::escape_identifier(column)
        .map_err(|e| PipelineError::transformation(operation, dataset.name(), e.to_string()))
}

fn quoted_table(dataset: &Dataset, operation: &str) -> Result<String> {
    quoted(dataset.name(), dataset, operation)
}

fn trim(value: &str) -> Cow<'_, str> {
    Cow::Borrowed(value.trim())
}

fn strip_control(value: &str) -> Cow<'_, str> {
    if value.chars().any(is_control_char) {
        Cow::Owned(value.chars().filter(|c| !is_control_char(*c)).collect())
    } else {
        Cow::Borrowed(value)
    }
}

/// Rewrites the targeted string columns; other columns pass through.
fn rewrite_strings(
    dataset: &Dataset,
    columns: &[String],
    clean: fn(&str) -> Cow<'_, str>,
) -> Result<(RecordBatch, usize)> {
    let batch = dataset.batch();
    let schema = batch.schema();
    let mut arrays: Vec<ArrayRef> = batch.columns().to_vec();
    let mut changed = 0;

    for column in columns {
        let Some((idx, _)) = schema.column_with_name(column) else {
            continue;
        };
        let array = batch.column(idx);
        let rewritten: Option<ArrayRef> = match array.data_type() {
            DataType::Utf8 => {
                let values = array.as_string::<i32>().iter();
                Some(Arc::new(clean_all::<_, StringArray>(values, clean, &mut changed)))
            }
            DataType::LargeUtf8 => {
                let values = array.as_string::<i64>().iter();
                Some(Arc::new(clean_all::<_, LargeStringArray>(values, clean, &mut changed)))
            }
            DataType::Utf8View => {
                let values = array.as_string_view().iter();
                Some(Arc::new(clean_all::<_, StringViewArray>(values, clean, &mut changed)))
            }
            _ => None,
        };
        if let Some(rewritten) = rewritten {
            arrays[idx] = rewritten;
        }
    }

    Ok((RecordBatch::try_new(schema, arrays)?, changed))
}

fn clean_all<'a, I, A>(values: I, clean: fn(&str) -> Cow<'_, str>, changed: &mut usize) -> A
where
    I: Iterator<Item = Option<&'a str>>,
    A: FromIterator<Option<String>> + Array,
{
    values
        .map(|value| {
            value.map(|s| match clean(s) {
                Cow::Borrowed(out) if out.len() == s.len() => s.to_string(),
                out => {
                    *changed += 1;
                    out.into_owned()
                }
            })
        })
        .collect()
}
