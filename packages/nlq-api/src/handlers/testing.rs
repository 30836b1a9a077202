//! Orchestrators wired to in-process backends for router tests.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use nlq_backends::LocalWarehouse;
use nlq_core::{
    LanguageModel, ModelError, NativeTable, PipelineConfig, QueryRows, SchemaCatalog,
    TableListing, Warehouse, WarehouseError,
};
use nlq_runtime::Orchestrator;
use tempfile::TempDir;

/// Always generates the customer count statement.
struct CountingModel;

#[async_trait]
impl LanguageModel for CountingModel {
    async fn generate(&self, _prompt: &str) -> Result<String, ModelError> {
        Ok("```sql\nSELECT COUNT(*) AS total_customers FROM shop.customers;\n```".to_string())
    }

    fn name(&self) -> &str {
        "counting"
    }
}

struct UnreachableWarehouse;

#[async_trait]
impl Warehouse for UnreachableWarehouse {
    async fn list_tables(&self, _dataset: &str) -> Result<Vec<TableListing>, WarehouseError> {
        Err(WarehouseError::unreachable("connection refused"))
    }

    async fn describe_table(&self, _dataset: &str, _table: &str) -> Result<NativeTable, WarehouseError> {
        Err(WarehouseError::unreachable("connection refused"))
    }

    async fn run_query(&self, _sql: &str, _max_rows: usize) -> Result<QueryRows, WarehouseError> {
        Err(WarehouseError::unreachable("connection refused"))
    }
}

fn config() -> PipelineConfig {
    PipelineConfig {
        project_id: "local".into(),
        dataset_id: "shop".into(),
        ..Default::default()
    }
}

/// A `shop.customers` table with three rows and a published snapshot.
pub async fn answering_orchestrator() -> (Arc<Orchestrator>, TempDir) {
    let dir = tempfile::tempdir().unwrap();
    std::fs::write(
        dir.path().join("customers.csv"),
        "customer_id,customer_name\n1,Alice Brown\n2,Bob Stone\n3,Carol White\n",
    )
    .unwrap();
    let warehouse = Arc::new(LocalWarehouse::new("shop").await.unwrap());
    warehouse.register_csv_dir(dir.path()).await.unwrap();

    let catalog = Arc::new(SchemaCatalog::new(warehouse.clone(), "shop", Duration::from_secs(5)));
    catalog.refresh().await.unwrap();
    let orchestrator = Orchestrator::new(catalog, warehouse, Arc::new(CountingModel), &config());
    (Arc::new(orchestrator), dir)
}

/// Discovery has never succeeded.
pub fn empty_orchestrator() -> Arc<Orchestrator> {
    let warehouse = Arc::new(UnreachableWarehouse);
    let catalog = Arc::new(SchemaCatalog::new(warehouse.clone(), "shop", Duration::from_secs(5)));
    Arc::new(Orchestrator::new(catalog, warehouse, Arc::new(CountingModel), &config()))
}
