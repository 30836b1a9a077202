//! Warehouse and language-model seams.
//!
//! The pipeline only talks to the outside world through these two traits, so
//! backends (BigQuery, a local DataFusion session, test doubles) are
//! interchangeable.

use async_trait::async_trait;
use serde_json::Value;

use crate::error::{ModelError, WarehouseError};

/// Table entry returned by listing a dataset.
#[derive(Debug, Clone, PartialEq)]
pub struct TableListing {
    /// Short table name
    pub name: String,
    /// Dataset-qualified name usable in SQL
    pub qualified_name: String,
}

/// Column definition as reported by the warehouse, before normalisation.
#[derive(Debug, Clone, PartialEq)]
pub struct NativeColumn {
    pub name: String,
    pub native_type: String,
    /// BigQuery `mode` (`NULLABLE`, `REQUIRED`, `REPEATED`) or `NULLABLE`/`REQUIRED`
    pub mode: String,
    pub description: Option<String>,
}

/// Table definition as reported by the warehouse.
#[derive(Debug, Clone, PartialEq)]
pub struct NativeTable {
    pub columns: Vec<NativeColumn>,
    pub row_count: Option<u64>,
    pub description: Option<String>,
}

/// Raw rows returned by one query round trip.
///
/// Each row holds values positionally aligned with `columns`.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct QueryRows {
    pub columns: Vec<String>,
    pub rows: Vec<Vec<Value>>,
}

/// Read-only access to a tabular warehouse.
#[async_trait]
pub trait Warehouse: Send + Sync {
    /// Enumerates the tables of a dataset.
    async fn list_tables(&self, dataset: &str) -> Result<Vec<TableListing>, WarehouseError>;

    /// Describes one table's columns. Must not recurse into nested schemas.
    async fn describe_table(&self, dataset: &str, table: &str)
        -> Result<NativeTable, WarehouseError>;

    /// Runs one statement and returns at most `max_rows` rows.
    async fn run_query(&self, sql: &str, max_rows: usize) -> Result<QueryRows, WarehouseError>;
}

/// Text generation endpoint.
#[async_trait]
pub trait LanguageModel: Send + Sync {
    /// Generates a completion for `prompt`.
    async fn generate(&self, prompt: &str) -> Result<String, ModelError>;

    /// Identifier for logs and health output.
    fn name(&self) -> &str;
}
