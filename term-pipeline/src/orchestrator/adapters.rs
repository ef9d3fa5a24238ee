//! Extraction and load adapters.
//!
//! The orchestrator only talks to sources and sinks through the
//! [`Extractor`] and [`Loader`] traits. Adapters are expected to apply their
//! own timeouts; any error they return is fatal for the stage.

use crate::config::{ExtractionConfig, LoadConfig, SourceConfig};
use crate::dataset::Dataset;
use crate::error::{PipelineError, Result};
use arrow::record_batch::RecordBatch;
use async_trait::async_trait;
use datafusion::prelude::{CsvReadOptions, SessionContext};
use std::collections::BTreeMap;
use std::fmt::Debug;
use std::path::PathBuf;
use std::sync::{Arc, Mutex};
use tracing::{info, instrument};

/// A source of tables.
#[async_trait]
pub trait Extractor: Debug + Send + Sync {
    /// Tables this extractor will produce for `config`.
    fn tables(&self, config: &ExtractionConfig) -> Vec<String> {
        config.sources.keys().cloned().collect()
    }

    /// Reads one table.
    async fn extract(&self, table: &str, config: &ExtractionConfig) -> Result<Dataset>;
}

/// A sink for final datasets.
#[async_trait]
pub trait Loader: Debug + Send + Sync {
    /// Writes one table. Called once per table, in name order.
    async fn load(&self, dataset: &Dataset, config: &LoadConfig) -> Result<()>;
}

/// Serves tables held in memory.
///
/// When the extraction config declares sources, exactly those tables are
/// requested; a declared table that was never provided fails extraction.
#[derive(Debug, Clone, Default)]
pub struct MemoryExtractor {
    tables: BTreeMap<String, RecordBatch>,
}

impl MemoryExtractor {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_table(mut self, name: impl Into<String>, batch: RecordBatch) -> Self {
        self.tables.insert(name.into(), batch);
        self
    }
}

#[async_trait]
impl Extractor for MemoryExtractor {
    fn tables(&self, config: &ExtractionConfig) -> Vec<String> {
        if config.sources.is_empty() {
            self.tables.keys().cloned().collect()
        } else {
            config.sources.keys().cloned().collect()
        }
    }

    async fn extract(&self, table: &str, _config: &ExtractionConfig) -> Result<Dataset> {
        let batch = self
            .tables
            .get(table)
            .ok_or_else(|| PipelineError::extraction(table, "table was not provided"))?;
        Ok(Dataset::new(table, batch.clone()).with_source("memory"))
    }
}

/// Collects loaded tables in memory.
///
/// Clones share the same storage, so a test can keep one handle and give
/// another to the orchestrator.
#[derive(Debug, Clone, Default)]
pub struct MemoryLoader {
    loaded: Arc<Mutex<BTreeMap<String, RecordBatch>>>,
}

impl MemoryLoader {
    pub fn new() -> Self {
        Self::default()
    }

    /// Snapshot of everything loaded so far.
    pub fn loaded(&self) -> BTreeMap<String, RecordBatch> {
        self.loaded
            .lock()
            .map(|tables| tables.clone())
            .unwrap_or_default()
    }
}

#[async_trait]
impl Loader for MemoryLoader {
    async fn load(&self, dataset: &Dataset, _config: &LoadConfig) -> Result<()> {
        let mut tables = self
            .loaded
            .lock()
            .map_err(|_| PipelineError::load(dataset.name(), "memory sink is poisoned"))?;
        tables.insert(dataset.name().to_string(), dataset.batch().clone());
        Ok(())
    }
}

/// Reads CSV files declared in `extraction_cfg.sources`.
#[derive(Debug, Clone, Default)]
pub struct CsvExtractor;

impl CsvExtractor {
    pub fn new() -> Self {
        Self
    }
}

#[async_trait]
impl Extractor for CsvExtractor {
    #[instrument(skip(self, config), fields(source.type = "csv"))]
    async fn extract(&self, table: &str, config: &ExtractionConfig) -> Result<Dataset> {
        let source = config
            .sources
            .get(table)
            .ok_or_else(|| PipelineError::extraction(table, "no source declared"))?;
        let batch = read_csv(table, source).await?;
        info!(
            table = %table,
            path = %source.path.display(),
            rows = batch.num_rows(),
            "Extracted CSV source"
        );
        Ok(Dataset::new(table, batch).with_source(source.path.display().to_string()))
    }
}

async fn read_csv(table: &str, source: &SourceConfig) -> Result<RecordBatch> {
    let path = source
        .path
        .to_str()
        .ok_or_else(|| PipelineError::extraction(table, "path is not valid UTF-8"))?;
    let extension = source
        .path
        .extension()
        .map(|e| format!(".{}", e.to_string_lossy()))
        .unwrap_or_default();
    let options = CsvReadOptions::new()
        .has_header(source.has_header)
        .delimiter(source.delimiter as u8)
        .file_extension(&extension);

    let ctx = SessionContext::new();
    let df = ctx.read_csv(path, options).await.map_err(|e| {
        PipelineError::extraction_with_source(table, format!("cannot read '{path}'"), Box::new(e))
    })?;
    let schema = Arc::new(df.schema().as_arrow().clone());
    let batches = df.collect().await.map_err(|e| {
        PipelineError::extraction_with_source(table, format!("cannot parse '{path}'"), Box::new(e))
    })?;
    Ok(arrow::compute::concat_batches(&schema, &batches)?)
}

/// Writes one CSV file per table into `load_cfg.target_path`.
#[derive(Debug, Clone, Default)]
pub struct CsvLoader;

impl CsvLoader {
    pub fn new() -> Self {
        Self
    }
}

#[async_trait]
impl Loader for CsvLoader {
    #[instrument(skip_all, fields(table = %dataset.name(), rows = dataset.num_rows()))]
    async fn load(&self, dataset: &Dataset, config: &LoadConfig) -> Result<()> {
        let dir = config
            .target_path
            .clone()
            .ok_or_else(|| PipelineError::load(dataset.name(), "load_cfg.target_path is not set"))?;
        let table = dataset.name().to_string();
        let batch = dataset.batch().clone();

        let path = tokio::task::spawn_blocking(move || write_csv(dir, &table, &batch))
            .await
            .map_err(|e| PipelineError::load(dataset.name(), format!("writer task failed: {e}")))??;
        info!(path = %path.display(), "Loaded table");
        Ok(())
    }
}

fn write_csv(dir: PathBuf, table: &str, batch: &RecordBatch) -> Result<PathBuf> {
    let sink_error = |e: &dyn std::fmt::Display| PipelineError::load(table, e.to_string());

    std::fs::create_dir_all(&dir).map_err(|e| sink_error(&e))?;
    let path = dir.join(format!("{table}.csv"));
    let file = std::fs::File::create(&path).map_err(|e| sink_error(&e))?;
    let mut writer = arrow::csv::WriterBuilder::new()
        .with_header(true)
        .build(file);
    writer.write(batch).map_err(|e| sink_error(&e))?;
    Ok(path)
}
