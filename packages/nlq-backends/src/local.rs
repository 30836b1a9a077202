//! In-process warehouse backed by a DataFusion session.
//!
//! Tables live under one schema named after the dataset, so generated SQL
//! addresses them as `dataset.table` just like it would against BigQuery.

use std::path::Path;
use std::sync::Arc;

use async_trait::async_trait;
use datafusion::arrow::json::ArrayWriter;
use datafusion::arrow::record_batch::RecordBatch;
use datafusion::datasource::MemTable;
use datafusion::error::DataFusionError;
use datafusion::prelude::{CsvReadOptions, SessionContext};
use datafusion::sql::TableReference;
use nlq_core::{
    NativeColumn, NativeTable, QueryRows, TableListing, Warehouse, WarehouseError,
    WarehouseErrorKind,
};
use serde_json::{Map, Value};
use tokio::sync::RwLock;

pub struct LocalWarehouse {
    ctx: SessionContext,
    dataset: String,
    /// Registration order, which is also listing order
    tables: RwLock<Vec<String>>,
}

impl LocalWarehouse {
    pub async fn new(dataset: impl Into<String>) -> Result<Self, WarehouseError> {
        let warehouse = Self {
            ctx: SessionContext::new(),
            dataset: dataset.into(),
            tables: RwLock::new(Vec::new()),
        };
        warehouse.ensure_schema().await?;
        Ok(warehouse)
    }

    pub fn dataset(&self) -> &str {
        &self.dataset
    }

    async fn ensure_schema(&self) -> Result<(), WarehouseError> {
        let statement = format!("CREATE SCHEMA IF NOT EXISTS {}", self.dataset);
        self.ctx
            .sql(&statement)
            .await
            .map_err(|e| map_datafusion_error(&e))?
            .collect()
            .await
            .map_err(|e| map_datafusion_error(&e))?;
        Ok(())
    }

    /// Registers every `*.csv` file in `dir` as a table named after its file
    /// stem. Files are registered in name order. Returns the table count.
    pub async fn register_csv_dir(&self, dir: impl AsRef<Path>) -> Result<usize, WarehouseError> {
        let dir = dir.as_ref();
        let entries = std::fs::read_dir(dir).map_err(|e| {
            WarehouseError::not_found(format!("cannot read data directory {}: {}", dir.display(), e))
        })?;

        let mut files: Vec<_> = entries
            .filter_map(|entry| entry.ok().map(|e| e.path()))
            .filter(|p| p.extension().is_some_and(|ext| ext.eq_ignore_ascii_case("csv")))
            .collect();
        files.sort();

        for path in &files {
            let Some(table) = path.file_stem().and_then(|s| s.to_str()) else {
                continue;
            };
            self.register_csv(table, path).await?;
        }
        tracing::info!(
            "Registered {} CSV tables from {} into dataset '{}'",
            files.len(),
            dir.display(),
            self.dataset
        );
        Ok(files.len())
    }

    pub async fn register_csv(&self, table: &str, path: impl AsRef<Path>) -> Result<(), WarehouseError> {
        let path = path.as_ref();
        let location = path.to_string_lossy();
        let extension = path
            .extension()
            .and_then(|e| e.to_str())
            .map(|e| format!(".{}", e))
            .unwrap_or_default();
        let options = CsvReadOptions::new().file_extension(&extension);

        self.ctx
            .register_csv(
                TableReference::partial(self.dataset.as_str(), table),
                &*location,
                options,
            )
            .await
            .map_err(|e| map_datafusion_error(&e))?;
        self.remember(table).await;
        Ok(())
    }

    /// Registers in-memory batches as a table.
    pub async fn register_batches(&self, table: &str, batches: Vec<RecordBatch>) -> Result<(), WarehouseError> {
        let Some(schema) = batches.first().map(|b| b.schema()) else {
            return Err(WarehouseError::rejected(format!(
                "table '{}' needs at least one batch",
                table
            )));
        };
        let provider = MemTable::try_new(schema, vec![batches]).map_err(|e| map_datafusion_error(&e))?;
        self.ctx
            .register_table(TableReference::partial(self.dataset.as_str(), table), Arc::new(provider))
            .map_err(|e| map_datafusion_error(&e))?;
        self.remember(table).await;
        Ok(())
    }

    async fn remember(&self, table: &str) {
        let mut tables = self.tables.write().await;
        if !tables.iter().any(|t| t == table) {
            tables.push(table.to_string());
        }
    }
}

#[async_trait]
impl Warehouse for LocalWarehouse {
    async fn list_tables(&self, dataset: &str) -> Result<Vec<TableListing>, WarehouseError> {
        if dataset != self.dataset {
            return Err(WarehouseError::not_found(format!("Not found: Dataset {}", dataset)));
        }
        let tables = self.tables.read().await;
        Ok(tables
            .iter()
            .map(|name| TableListing {
                name: name.clone(),
                qualified_name: format!("{}.{}", self.dataset, name),
            })
            .collect())
    }

    async fn describe_table(&self, dataset: &str, table: &str) -> Result<NativeTable, WarehouseError> {
        let provider = self
            .ctx
            .table_provider(TableReference::partial(dataset, table))
            .await
            .map_err(|_| WarehouseError::not_found(format!("Not found: Table {}.{}", dataset, table)))?;

        let schema = provider.schema();
        let columns = schema
            .fields()
            .iter()
            .map(|field| NativeColumn {
                name: field.name().clone(),
                native_type: field.data_type().to_string(),
                mode: if field.is_nullable() { "NULLABLE" } else { "REQUIRED" }.to_string(),
                description: None,
            })
            .collect();

        Ok(NativeTable {
            columns,
            row_count: None,
            description: None,
        })
    }

    async fn run_query(&self, sql: &str, max_rows: usize) -> Result<QueryRows, WarehouseError> {
        let df = self
            .ctx
            .sql(sql)
            .await
            .map_err(|e| map_datafusion_error(&e))?
            .limit(0, Some(max_rows))
            .map_err(|e| map_datafusion_error(&e))?;

        let columns: Vec<String> = df.schema().fields().iter().map(|f| f.name().clone()).collect();
        let batches = df.collect().await.map_err(|e| map_datafusion_error(&e))?;
        let rows = batches_to_rows(&columns, &batches)?;
        Ok(QueryRows { columns, rows })
    }
}

/// Converts batches to positional rows via the Arrow JSON writer. Null cells
/// are omitted by the writer and come back as `Value::Null`.
fn batches_to_rows(columns: &[String], batches: &[RecordBatch]) -> Result<Vec<Vec<Value>>, WarehouseError> {
    if batches.iter().all(|b| b.num_rows() == 0) {
        return Ok(Vec::new());
    }

    let mut writer = ArrayWriter::new(Vec::new());
    let refs: Vec<&RecordBatch> = batches.iter().collect();
    writer
        .write_batches(&refs)
        .map_err(|e| WarehouseError::unreachable(format!("failed to encode rows: {}", e)))?;
    writer
        .finish()
        .map_err(|e| WarehouseError::unreachable(format!("failed to encode rows: {}", e)))?;

    let objects: Vec<Map<String, Value>> = serde_json::from_slice(&writer.into_inner())
        .map_err(|e| WarehouseError::unreachable(format!("failed to decode rows: {}", e)))?;

    Ok(objects
        .into_iter()
        .map(|mut object| {
            columns
                .iter()
                .map(|c| object.remove(c).unwrap_or(Value::Null))
                .collect()
        })
        .collect())
}

fn map_datafusion_error(err: &DataFusionError) -> WarehouseError {
    let kind = match err {
        DataFusionError::SQL(_, _) | DataFusionError::Plan(_) | DataFusionError::SchemaError(_, _) => {
            WarehouseErrorKind::Rejected
        }
        DataFusionError::ObjectStore(_) | DataFusionError::IoError(_) => WarehouseErrorKind::NotFound,
        _ => WarehouseErrorKind::Unreachable,
    };
    WarehouseError::new(kind, err.to_string())
}
