//! Runs validated statements against the warehouse with a row cap.

use std::sync::Arc;
use std::time::Duration;

use nlq_core::sql_guard;
use nlq_core::{ExecutionError, ResultSet, Warehouse, WarehouseError};

pub struct QueryExecutor {
    warehouse: Arc<dyn Warehouse>,
    timeout: Duration,
}

impl QueryExecutor {
    pub fn new(warehouse: Arc<dyn Warehouse>, timeout: Duration) -> Self {
        Self { warehouse, timeout }
    }

    /// Executes `query_text` with at most `row_limit` rows returned.
    ///
    /// A missing trailing `LIMIT` is appended and a larger one is lowered, so
    /// the cap also holds server-side. Warehouse diagnostics are passed
    /// through unchanged.
    pub async fn execute(&self, query_text: &str, row_limit: usize) -> Result<ResultSet, ExecutionError> {
        let sql = sql_guard::apply_row_limit(query_text, row_limit);
        tracing::debug!("Executing: {}", sql);

        let raw = match tokio::time::timeout(self.timeout, self.warehouse.run_query(&sql, row_limit)).await {
            Ok(result) => result?,
            Err(_) => {
                return Err(ExecutionError::from(WarehouseError::timeout(format!(
                    "Query exceeded the {} ms execution timeout",
                    self.timeout.as_millis()
                ))))
            }
        };

        let result = ResultSet::from_query_rows(raw, row_limit);
        tracing::info!(
            "Query returned {} rows ({} columns{})",
            result.row_count(),
            result.columns.len(),
            if result.truncated { ", truncated" } else { "" }
        );
        Ok(result)
    }
}
