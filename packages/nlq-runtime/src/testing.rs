//! In-process doubles shared by the unit tests.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Mutex;

use async_trait::async_trait;
use chrono::Utc;
use nlq_core::schema::{ColumnDescriptor, SchemaSnapshot, TableDescriptor};
use nlq_core::{
    LanguageModel, ModelError, NativeTable, QueryRows, TableListing, Warehouse, WarehouseError,
};

type Reply = Box<dyn Fn(&str) -> Result<String, ModelError> + Send + Sync>;

/// Language model that answers from a closure over the prompt.
pub struct ScriptedModel {
    reply: Reply,
    pub calls: AtomicUsize,
    pub prompts: Mutex<Vec<String>>,
}

impl ScriptedModel {
    pub fn new(reply: impl Fn(&str) -> Result<String, ModelError> + Send + Sync + 'static) -> Self {
        Self {
            reply: Box::new(reply),
            calls: AtomicUsize::new(0),
            prompts: Mutex::new(Vec::new()),
        }
    }

    pub fn replying(text: &str) -> Self {
        let text = text.to_string();
        Self::new(move |_| Ok(text.clone()))
    }

    pub fn failing(error: ModelError) -> Self {
        Self::new(move |_| Err(error.clone()))
    }
}

#[async_trait]
impl LanguageModel for ScriptedModel {
    async fn generate(&self, prompt: &str) -> Result<String, ModelError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        self.prompts.lock().unwrap().push(prompt.to_string());
        (self.reply)(prompt)
    }

    fn name(&self) -> &str {
        "scripted"
    }
}

/// Warehouse that returns canned rows for every query and records the SQL.
pub struct CannedWarehouse {
    pub result: Result<QueryRows, WarehouseError>,
    pub queries: Mutex<Vec<String>>,
}

impl CannedWarehouse {
    pub fn returning(result: Result<QueryRows, WarehouseError>) -> Self {
        Self {
            result,
            queries: Mutex::new(Vec::new()),
        }
    }
}

#[async_trait]
impl Warehouse for CannedWarehouse {
    async fn list_tables(&self, _dataset: &str) -> Result<Vec<TableListing>, WarehouseError> {
        Err(WarehouseError::unreachable("canned warehouse has no catalog"))
    }

    async fn describe_table(&self, _dataset: &str, table: &str) -> Result<NativeTable, WarehouseError> {
        Err(WarehouseError::not_found(format!("Not found: Table {}", table)))
    }

    async fn run_query(&self, sql: &str, max_rows: usize) -> Result<QueryRows, WarehouseError> {
        self.queries.lock().unwrap().push(sql.to_string());
        self.result.clone().map(|mut rows| {
            rows.rows.truncate(max_rows);
            rows
        })
    }
}

fn table(name: &str, columns: &[(&str, &str)]) -> TableDescriptor {
    TableDescriptor {
        name: name.to_string(),
        qualified_name: format!("shop.{}", name),
        columns: columns
            .iter()
            .map(|(n, t)| ColumnDescriptor::new(*n, *t, true))
            .collect(),
        row_count_estimate: Some(3),
        description: None,
    }
}

/// `customers(customer_id, customer_name, revenue)` and
/// `contacts(contact_id, name, email)`.
pub fn shop_snapshot() -> SchemaSnapshot {
    SchemaSnapshot::new(
        "shop",
        1,
        Utc::now(),
        vec![
            table(
                "customers",
                &[
                    ("customer_id", "INT64"),
                    ("customer_name", "STRING"),
                    ("revenue", "FLOAT64"),
                ],
            ),
            table(
                "contacts",
                &[("contact_id", "INT64"), ("name", "STRING"), ("email", "STRING")],
            ),
        ],
    )
}
