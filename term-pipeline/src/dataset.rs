//! Named datasets and the registry that holds them for one run.
//!
//! A [`Dataset`] is an Arrow [`RecordBatch`] plus a name and [`Lineage`].
//! Datasets are never edited in place: a transformation produces a new
//! value through [`Dataset::derive`] and the orchestrator publishes it back
//! into the [`DatasetRegistry`], replacing the previous version.

use crate::error::{PipelineError, Result};
use crate::orchestrator::Stage;
use arrow::datatypes::SchemaRef;
use arrow::record_batch::RecordBatch;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::sync::Arc;

/// Where a dataset version came from.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Lineage {
    /// Number of rows in this version
    pub row_count: usize,
    /// Stage that produced this version
    pub source_stage: Stage,
    /// Free-form origin, e.g. the file path it was extracted from
    pub source: Option<String>,
}

/// A named, immutable table.
#[derive(Debug, Clone)]
pub struct Dataset {
    name: String,
    batch: RecordBatch,
    lineage: Lineage,
}

impl Dataset {
    /// Creates a freshly extracted dataset.
    pub fn new(name: impl Into<String>, batch: RecordBatch) -> Self {
        let lineage = Lineage {
            row_count: batch.num_rows(),
            source_stage: Stage::Extract,
            source: None,
        };
        Self {
            name: name.into(),
            batch,
            lineage,
        }
    }

    /// Records the origin of an extracted dataset.
    pub fn with_source(mut self, source: impl Into<String>) -> Self {
        self.lineage.source = Some(source.into());
        self
    }

    /// Produces the next version of this dataset.
    ///
    /// The column types must not change; engines only drop rows or rewrite
    /// values. The new version always carries this dataset's schema.
    pub fn derive(&self, batch: RecordBatch, stage: Stage) -> Result<Self> {
        let batch = RecordBatch::try_new(self.batch.schema(), batch.columns().to_vec())
            .map_err(|e| {
                PipelineError::Internal(format!(
                    "Derived version of '{}' changed its schema: {e}",
                    self.name
                ))
            })?;
        Ok(Self {
            name: self.name.clone(),
            lineage: Lineage {
                row_count: batch.num_rows(),
                source_stage: stage,
                source: self.lineage.source.clone(),
            },
            batch,
        })
    }

    /// Table name.
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Underlying record batch.
    pub fn batch(&self) -> &RecordBatch {
        &self.batch
    }

    /// Arrow schema.
    pub fn schema(&self) -> SchemaRef {
        self.batch.schema()
    }

    /// Number of rows.
    pub fn num_rows(&self) -> usize {
        self.batch.num_rows()
    }

    /// Column names in schema order.
    pub fn column_names(&self) -> Vec<String> {
        self.batch
            .schema()
            .fields()
            .iter()
            .map(|f| f.name().clone())
            .collect()
    }

    /// Returns true if the dataset has a column with this exact name.
    pub fn has_column(&self, column: &str) -> bool {
        self.batch.schema().column_with_name(column).is_some()
    }

    /// Lineage of this version.
    pub fn lineage(&self) -> &Lineage {
        &self.lineage
    }
}

/// In-memory mapping from table name to the current dataset version.
///
/// Iteration is ordered by table name.
#[derive(Debug, Clone, Default)]
pub struct DatasetRegistry {
    tables: BTreeMap<String, Arc<Dataset>>,
}

impl DatasetRegistry {
    /// Creates an empty registry.
    pub fn new() -> Self {
        Self::default()
    }

    /// Publishes a dataset, returning the version it replaced.
    pub fn insert(&mut self, dataset: Dataset) -> Option<Arc<Dataset>> {
        self.publish(Arc::new(dataset))
    }

    /// Publishes an already shared dataset.
    pub fn publish(&mut self, dataset: Arc<Dataset>) -> Option<Arc<Dataset>> {
        self.tables.insert(dataset.name().to_string(), dataset)
    }

    /// Looks up a table.
    pub fn get(&self, name: &str) -> Option<&Arc<Dataset>> {
        self.tables.get(name)
    }

    /// Looks up a table that a rule depends on.
    pub fn require(&self, name: &str, rule: &str) -> Result<&Arc<Dataset>> {
        self.tables.get(name).ok_or_else(|| {
            PipelineError::rule_resolution(rule, format!("table '{name}' is not in the registry"))
        })
    }

    /// Returns true if the table is present.
    pub fn contains(&self, name: &str) -> bool {
        self.tables.contains_key(name)
    }

    /// Table names in order.
    pub fn table_names(&self) -> Vec<String> {
        self.tables.keys().cloned().collect()
    }

    /// Number of tables.
    pub fn len(&self) -> usize {
        self.tables.len()
    }

    /// Returns true if no table has been published.
    pub fn is_empty(&self) -> bool {
        self.tables.is_empty()
    }

    /// Iterates over tables in name order.
    pub fn iter(&self) -> impl Iterator<Item = (&str, &Arc<Dataset>)> {
        self.tables.iter().map(|(k, v)| (k.as_str(), v))
    }
}
