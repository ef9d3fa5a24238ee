//! DataFusion context used by the engines.
//!
//! [`PipelineContext`] wraps a [`SessionContext`] and registers datasets as
//! in-memory tables. Every registered table gets an extra `__row_id` column
//! holding the 0-based row position, which is what reports refer to.

use crate::dataset::{Dataset, DatasetRegistry};
use crate::error::{PipelineError, Result};
use crate::security::ROW_ID_COLUMN;
use arrow::array::{Array, ArrayRef, AsArray, UInt64Array};
use arrow::datatypes::{DataType, Field, Schema, UInt64Type};
use arrow::record_batch::RecordBatch;
use datafusion::datasource::MemTable;
use datafusion::execution::context::{SessionConfig, SessionContext};
use datafusion::sql::TableReference;
use std::collections::BTreeSet;
use std::sync::Arc;
use tracing::{debug, instrument};

/// DataFusion session holding registered datasets for one engine pass.
pub struct PipelineContext {
    inner: SessionContext,
    tables: BTreeSet<String>,
}

impl Default for PipelineContext {
    fn default() -> Self {
        Self::new()
    }
}

impl PipelineContext {
    /// Creates an empty context.
    pub fn new() -> Self {
        let config = SessionConfig::new().with_information_schema(false);
        Self {
            inner: SessionContext::new_with_config(config),
            tables: BTreeSet::new(),
        }
    }

    /// Creates a context with every table of the registry registered.
    pub fn from_registry(registry: &DatasetRegistry) -> Result<Self> {
        let mut ctx = Self::new();
        for (_, dataset) in registry.iter() {
            ctx.register(dataset)?;
        }
        Ok(ctx)
    }

    /// Returns the underlying DataFusion session.
    pub fn inner(&self) -> &SessionContext {
        &self.inner
    }

    /// Registers (or re-registers) a dataset under its own name.
    ///
    /// The name is registered as-is, so mixed-case table names survive.
    #[instrument(skip(self, dataset), fields(table = %dataset.name(), rows = dataset.num_rows()))]
    pub fn register(&mut self, dataset: &Dataset) -> Result<()> {
        let batch = with_row_ids(dataset.batch())?;
        let table = MemTable::try_new(batch.schema(), vec![vec![batch]])?;
        let reference = TableReference::bare(dataset.name().to_string());

        if self.tables.contains(dataset.name()) {
            self.inner.deregister_table(reference.clone())?;
        }
        self.inner.register_table(reference, Arc::new(table))?;
        self.tables.insert(dataset.name().to_string());

        debug!("Registered table");
        Ok(())
    }

    /// Returns true if a table with this name is registered.
    pub fn has_table(&self, name: &str) -> bool {
        self.tables.contains(name)
    }

    /// Runs a generated statement and collects every batch.
    pub async fn sql(&self, sql: &str) -> Result<Vec<RecordBatch>> {
        debug!(sql = %sql, "Executing generated query");
        let df = self.inner.sql(sql).await?;
        Ok(df.collect().await?)
    }

    /// Runs a statement whose first column is a row identifier.
    pub async fn row_ids(&self, sql: &str) -> Result<Vec<u64>> {
        let batches = self.sql(sql).await?;
        let mut ids = Vec::new();
        for batch in &batches {
            if batch.num_columns() == 0 {
                continue;
            }
            ids.extend(row_id_column(batch, 0)?.iter().flatten());
        }
        Ok(ids)
    }
}

/// Reads a result column holding row identifiers.
pub fn row_id_column(batch: &RecordBatch, index: usize) -> Result<&UInt64Array> {
    batch
        .column(index)
        .as_primitive_opt::<UInt64Type>()
        .ok_or_else(|| PipelineError::Internal("row identifier column is not UInt64".to_string()))
}

/// Appends the `__row_id` column to a batch.
pub fn with_row_ids(batch: &RecordBatch) -> Result<RecordBatch> {
    let schema = batch.schema();
    let mut fields: Vec<Arc<Field>> = schema.fields().iter().cloned().collect();
    fields.push(Arc::new(Field::new(ROW_ID_COLUMN, DataType::UInt64, false)));

    let mut columns: Vec<ArrayRef> = batch.columns().to_vec();
    columns.push(Arc::new(UInt64Array::from_iter_values(
        0..batch.num_rows() as u64,
    )));

    Ok(RecordBatch::try_new(
        Arc::new(Schema::new_with_metadata(fields, schema.metadata().clone())),
        columns,
    )?)
}

/// Selects rows by position, in the order given.
pub fn take_rows(batch: &RecordBatch, row_ids: &[u64]) -> Result<RecordBatch> {
    let indices = UInt64Array::from(row_ids.to_vec());
    Ok(arrow::compute::take_record_batch(batch, &indices)?)
}

/// Renders one cell for reports; `None` for null.
pub fn value_to_string(array: &dyn Array, row: usize) -> Result<Option<String>> {
    if array.is_null(row) {
        return Ok(None);
    }
    Ok(Some(arrow::util::display::array_value_to_string(
        array, row,
    )?))
}

#[cfg(test)]
mod tests {
    use super::*;
    use arrow::array::{Int64Array, StringArray};

    fn dataset(name: &str) -> Dataset {
        let schema = Arc::new(Schema::new(vec![
            Field::new("id", DataType::Int64, false),
            Field::new("city", DataType::Utf8, true),
        ]));
        let batch = RecordBatch::try_new(
            schema,
            vec![
                Arc::new(Int64Array::from(vec![10, 20, 30])),
                Arc::new(StringArray::from(vec![Some("Oslo"), None, Some("Lima")])),
            ],
        )
        .unwrap();
        Dataset::new(name, batch)
    }

    #[test]
    fn test_with_row_ids_appends_positions() -> Result<()> {
        let ds = dataset("users");
        let batch = with_row_ids(ds.batch())?;
        assert_eq!(batch.num_columns(), 3);
        assert_eq!(batch.schema().field(2).name(), ROW_ID_COLUMN);
        let ids = batch.column(2).as_primitive::<UInt64Type>();
        assert_eq!(ids.values().to_vec(), vec![0, 1, 2]);
        Ok(())
    }

    #[tokio::test]
    async fn test_register_preserves_case_and_exposes_row_ids() -> Result<()> {
        let mut ctx = PipelineContext::new();
        ctx.register(&dataset("UserActions"))?;
        assert!(ctx.has_table("UserActions"));

        let ids = ctx
            .row_ids("SELECT \"__row_id\" FROM \"UserActions\" WHERE \"city\" IS NULL")
            .await?;
        assert_eq!(ids, vec![1]);
        Ok(())
    }

    #[tokio::test]
    async fn test_reregister_replaces_table() -> Result<()> {
        let mut ctx = PipelineContext::new();
        let ds = dataset("users");
        ctx.register(&ds)?;
        let smaller = ds.derive(take_rows(ds.batch(), &[0])?, crate::orchestrator::Stage::PreTransform)?;
        ctx.register(&smaller)?;

        let ids = ctx.row_ids("SELECT \"__row_id\" FROM \"users\"").await?;
        assert_eq!(ids, vec![0]);
        Ok(())
    }

    #[test]
    fn test_take_rows_and_value_to_string() -> Result<()> {
        let ds = dataset("users");
        let taken = take_rows(ds.batch(), &[2, 0])?;
        assert_eq!(taken.num_rows(), 2);
        assert_eq!(value_to_string(taken.column(0).as_ref(), 0)?, Some("30".to_string()));
        assert_eq!(value_to_string(ds.batch().column(1).as_ref(), 1)?, None);
        Ok(())
    }
}
