//! Shared fixtures for the pipeline tests.

use std::fs;
use std::future::Future;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use nlq_backends::LocalWarehouse;
use nlq_core::{LanguageModel, ModelError, PipelineConfig, SchemaCatalog};
use nlq_runtime::Orchestrator;
use tempfile::TempDir;

/// Answers generation prompts from a question-to-SQL script and summary
/// prompts with a fixed reply.
pub struct ScriptedModel {
    statements: Vec<(String, String)>,
    summary: Option<String>,
    pub sql_calls: AtomicUsize,
    pub summary_calls: AtomicUsize,
    pub prompts: Mutex<Vec<String>>,
}

impl ScriptedModel {
    pub fn new(statements: &[(&str, &str)]) -> Self {
        Self {
            statements: statements
                .iter()
                .map(|(q, sql)| (format!("Question: {}", q), sql.to_string()))
                .collect(),
            summary: None,
            sql_calls: AtomicUsize::new(0),
            summary_calls: AtomicUsize::new(0),
            prompts: Mutex::new(Vec::new()),
        }
    }

    pub fn with_summary(mut self, summary: &str) -> Self {
        self.summary = Some(summary.to_string());
        self
    }
}

#[async_trait]
impl LanguageModel for ScriptedModel {
    async fn generate(&self, prompt: &str) -> Result<String, ModelError> {
        self.prompts.lock().unwrap().push(prompt.to_string());
        if prompt.trim_end().ends_with("SQL Query:") {
            self.sql_calls.fetch_add(1, Ordering::SeqCst);
            return self
                .statements
                .iter()
                .find(|(question, _)| prompt.contains(question.as_str()))
                .map(|(_, sql)| sql.clone())
                .ok_or(ModelError::EmptyResponse);
        }
        self.summary_calls.fetch_add(1, Ordering::SeqCst);
        self.summary.clone().ok_or(ModelError::Unreachable("no summary scripted".into()))
    }

    fn name(&self) -> &str {
        "scripted"
    }
}

/// `shop` dataset with `contacts` and `customers` tables.
pub fn write_shop_csvs() -> TempDir {
    let dir = tempfile::tempdir().unwrap();
    fs::write(
        dir.path().join("customers.csv"),
        "customer_id,customer_name,revenue\n\
         1,Alice Brown,5000.5\n\
         2,Bob Stone,1200.0\n\
         3,Carol White,800.25\n",
    )
    .unwrap();
    fs::write(
        dir.path().join("contacts.csv"),
        "contact_id,name,email\n\
         1,John Doe,john@example.com\n\
         2,Jane Roe,jane@example.com\n",
    )
    .unwrap();
    dir
}

pub fn test_config() -> PipelineConfig {
    PipelineConfig {
        project_id: "local".into(),
        dataset_id: "shop".into(),
        translation_retry_delay_ms: 1,
        ..Default::default()
    }
}

pub struct Pipeline {
    pub orchestrator: Orchestrator,
    pub warehouse: Arc<LocalWarehouse>,
    pub model: Arc<ScriptedModel>,
    _data: TempDir,
}

/// Builds a pipeline over the CSV fixtures with a freshly published schema.
pub async fn pipeline(model: ScriptedModel, config: PipelineConfig) -> Pipeline {
    let data = write_shop_csvs();
    let warehouse = Arc::new(LocalWarehouse::new("shop").await.unwrap());
    warehouse.register_csv_dir(data.path()).await.unwrap();

    let catalog = Arc::new(SchemaCatalog::new(
        warehouse.clone(),
        "shop",
        Duration::from_secs(5),
    ));
    catalog.refresh().await.unwrap();

    let model = Arc::new(model);
    let orchestrator = Orchestrator::new(catalog, warehouse.clone(), model.clone(), &config);
    Pipeline {
        orchestrator,
        warehouse,
        model,
        _data: data,
    }
}

pub fn block_on<F: Future>(future: F) -> F::Output {
    tokio::runtime::Builder::new_multi_thread()
        .worker_threads(2)
        .enable_all()
        .build()
        .unwrap()
        .block_on(future)
}
