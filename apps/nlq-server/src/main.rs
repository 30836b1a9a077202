//! Natural-language query server.
//!
//! Wires a warehouse and a language model into the pipeline, publishes the
//! initial schema snapshot and serves the HTTP API until Ctrl+C.

use std::net::SocketAddr;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use anyhow::{bail, Context};
use clap::{Parser, ValueEnum};
use nlq_api::{Router, Server};
use nlq_backends::{
    BigQueryConfig, BigQueryWarehouse, GeminiConfig, GeminiModel, LocalWarehouse, OllamaModel,
};
use nlq_core::{DisplayMode, LanguageModel, PipelineConfig, SchemaCatalog, Warehouse};
use nlq_runtime::Orchestrator;
use tokio::signal;
use tracing_subscriber::EnvFilter;

#[derive(Copy, Clone, Debug, PartialEq, Eq, ValueEnum)]
enum WarehouseBackend {
    /// BigQuery REST API
    Bigquery,
    /// DataFusion over a directory of CSV files
    Local,
}

#[derive(Copy, Clone, Debug, PartialEq, Eq, ValueEnum)]
enum ModelBackend {
    /// Gemini on Vertex AI
    Gemini,
    /// Ollama-compatible local server
    Ollama,
}

/// Command-line arguments for the query server.
#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
struct Args {
    /// Port to listen on
    #[arg(short, long, env = "API_PORT", default_value_t = 8080)]
    port: u16,

    /// Host address to bind to
    #[arg(long, default_value = "127.0.0.1")]
    host: String,

    /// Warehouse project
    #[arg(long, env = "GCP_PROJECT_ID", default_value = "")]
    project_id: String,

    /// Dataset whose tables are discovered and queried
    #[arg(long, env = "GCP_DATASET_ID")]
    dataset_id: String,

    /// BigQuery processing location
    #[arg(long, env = "BIGQUERY_LOCATION")]
    bigquery_location: Option<String>,

    /// Vertex AI region for Gemini
    #[arg(long, env = "VERTEX_AI_LOCATION", default_value = "us-central1")]
    vertex_location: String,

    /// Model identifier for the selected model backend
    #[arg(long, env = "VERTEX_AI_MODEL", default_value = nlq_backends::gemini::DEFAULT_MODEL)]
    model: String,

    /// OAuth2 bearer token for BigQuery and Vertex AI
    #[arg(long, env = "GOOGLE_ACCESS_TOKEN", hide_env_values = true)]
    access_token: Option<String>,

    #[arg(long, value_enum, default_value_t = WarehouseBackend::Bigquery)]
    warehouse: WarehouseBackend,

    /// CSV directory for the local warehouse
    #[arg(long, default_value = "./data")]
    data_dir: PathBuf,

    #[arg(long = "model-backend", value_enum, default_value_t = ModelBackend::Gemini)]
    model_backend: ModelBackend,

    /// Base URL of the Ollama server
    #[arg(long, env = "OLLAMA_URL")]
    ollama_url: Option<String>,

    /// Maximum question length in characters
    #[arg(long, env = "MAX_QUERY_LENGTH", default_value_t = 500)]
    max_query_length: usize,

    /// Maximum rows returned per question
    #[arg(long, env = "MAX_RESULTS", default_value_t = 100)]
    max_results: usize,

    /// `full` or `summary_only`
    #[arg(long, env = "RESPONSE_MODE", default_value = "full")]
    response_mode: DisplayMode,

    /// Re-discover the schema after this many seconds
    #[arg(long, env = "SCHEMA_TTL_SECS")]
    schema_ttl_secs: Option<u64>,

    /// Language model call timeout in milliseconds
    #[arg(long, default_value_t = 30_000)]
    model_timeout_ms: u64,

    /// Warehouse query timeout in milliseconds
    #[arg(long, default_value_t = 60_000)]
    warehouse_timeout_ms: u64,
}

impl Args {
    fn pipeline_config(&self) -> PipelineConfig {
        PipelineConfig {
            project_id: self.project_id.clone(),
            dataset_id: self.dataset_id.clone(),
            max_question_length: self.max_query_length,
            max_result_rows: self.max_results,
            display_mode: self.response_mode,
            schema_ttl: self.schema_ttl_secs.map(Duration::from_secs),
            model_timeout_ms: self.model_timeout_ms,
            warehouse_timeout_ms: self.warehouse_timeout_ms,
            ..Default::default()
        }
    }
}

async fn build_warehouse(args: &Args) -> anyhow::Result<Arc<dyn Warehouse>> {
    match args.warehouse {
        WarehouseBackend::Bigquery => {
            if args.project_id.is_empty() {
                bail!("--project-id (GCP_PROJECT_ID) is required for the BigQuery warehouse");
            }
            let mut config = BigQueryConfig::new(&args.project_id);
            config.location = args.bigquery_location.clone();
            config.access_token = args.access_token.clone();
            config.request_timeout = Duration::from_millis(args.warehouse_timeout_ms);
            Ok(Arc::new(BigQueryWarehouse::new(config)))
        }
        WarehouseBackend::Local => {
            let warehouse = LocalWarehouse::new(&args.dataset_id).await?;
            let tables = warehouse
                .register_csv_dir(&args.data_dir)
                .await
                .with_context(|| format!("loading CSV tables from {}", args.data_dir.display()))?;
            if tables == 0 {
                tracing::warn!("No CSV files found in {}", args.data_dir.display());
            }
            Ok(Arc::new(warehouse))
        }
    }
}

fn build_model(args: &Args) -> Arc<dyn LanguageModel> {
    let timeout = Duration::from_millis(args.model_timeout_ms);
    match args.model_backend {
        ModelBackend::Gemini => {
            let mut config = GeminiConfig::new(&args.project_id, &args.vertex_location);
            config.model = args.model.clone();
            config.access_token = args.access_token.clone();
            config.request_timeout = timeout;
            Arc::new(GeminiModel::new(config))
        }
        ModelBackend::Ollama => Arc::new(OllamaModel::new(args.ollama_url.clone(), &args.model, timeout)),
    }
}

/// Refreshes the snapshot whenever it is older than `ttl`. Failures keep the
/// stale snapshot.
fn spawn_refresher(catalog: Arc<SchemaCatalog>, ttl: Duration) {
    let period = (ttl / 4).clamp(Duration::from_secs(1), Duration::from_secs(60));
    tokio::spawn(async move {
        let mut interval = tokio::time::interval(period);
        interval.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
        loop {
            interval.tick().await;
            if !catalog.is_stale(ttl) {
                continue;
            }
            tracing::info!("Schema snapshot older than {:?}, refreshing", ttl);
            if let Err(e) = catalog.refresh().await {
                tracing::warn!("Scheduled schema refresh failed: {}", e);
            }
        }
    });
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let args = Args::parse();

    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .init();

    let config = args.pipeline_config();
    if let Err(e) = config.validate() {
        tracing::error!("{}", e);
        return Err(e.into());
    }

    let warehouse = build_warehouse(&args).await?;
    let model = build_model(&args);

    let catalog = Arc::new(SchemaCatalog::new(
        Arc::clone(&warehouse),
        &config.dataset_id,
        Duration::from_millis(config.discovery_timeout_ms),
    ));
    match catalog.refresh().await {
        Ok(snapshot) => tracing::info!(
            "Discovered {} tables in {}",
            snapshot.table_count(),
            config.dataset_ref()
        ),
        // Questions report the configuration error until a refresh succeeds
        Err(e) => tracing::warn!("Initial schema discovery failed: {}", e),
    }
    if let Some(ttl) = config.schema_ttl {
        spawn_refresher(Arc::clone(&catalog), ttl);
    }

    let orchestrator = Arc::new(Orchestrator::new(catalog, warehouse, model, &config));
    let router = Router::new(orchestrator);

    let addr: SocketAddr = format!("{}:{}", args.host, args.port)
        .parse()
        .with_context(|| format!("invalid listen address {}:{}", args.host, args.port))?;
    let server = Server::bind(addr, router).await?;

    tracing::info!(
        "Serving dataset {} ({:?} warehouse, {:?} model '{}', {} mode)",
        config.dataset_ref(),
        args.warehouse,
        args.model_backend,
        args.model,
        config.display_mode
    );

    server
        .serve(async {
            if let Err(e) = signal::ctrl_c().await {
                tracing::error!("Failed to listen for Ctrl+C: {}", e);
            }
        })
        .await?;
    tracing::info!("Server stopped");
    Ok(())
}
