//! BigQuery REST warehouse.
//!
//! Uses the v2 `tables.list`, `tables.get` and `jobs.query` endpoints. The
//! access token is supplied by the caller; token minting is outside this
//! crate.

use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use nlq_core::{
    NativeColumn, NativeTable, QueryRows, TableListing, Warehouse, WarehouseError,
    WarehouseErrorKind,
};
use reqwest::StatusCode;
use serde::{Deserialize, Serialize};
use serde_json::Value;

pub const DEFAULT_BASE_URL: &str = "https://bigquery.googleapis.com/bigquery/v2";
const DEFAULT_REQUEST_TIMEOUT: Duration = Duration::from_secs(60);
const TABLES_PAGE_SIZE: usize = 1000;

#[derive(Debug, Clone)]
pub struct BigQueryConfig {
    pub project_id: String,
    /// Processing location, e.g. `US` or `europe-west1`
    pub location: Option<String>,
    pub base_url: String,
    /// OAuth2 bearer token
    pub access_token: Option<String>,
    pub request_timeout: Duration,
    /// Server-side wait for `jobs.query` before it reports an incomplete job
    pub query_timeout_ms: u64,
    /// Upper bound on `tables.list` pages fetched during discovery
    pub max_table_pages: usize,
}

impl BigQueryConfig {
    pub fn new(project_id: impl Into<String>) -> Self {
        Self {
            project_id: project_id.into(),
            location: None,
            base_url: DEFAULT_BASE_URL.to_string(),
            access_token: None,
            request_timeout: DEFAULT_REQUEST_TIMEOUT,
            query_timeout_ms: 30_000,
            max_table_pages: 20,
        }
    }
}

pub struct BigQueryWarehouse {
    client: reqwest::Client,
    config: BigQueryConfig,
}

impl BigQueryWarehouse {
    pub fn new(config: BigQueryConfig) -> Self {
        let client = reqwest::Client::builder()
            .timeout(config.request_timeout)
            .build()
            .unwrap_or_else(|_| reqwest::Client::new());
        Self { client, config }
    }

    fn url(&self, path: &str) -> String {
        format!(
            "{}/projects/{}/{}",
            self.config.base_url.trim_end_matches('/'),
            self.config.project_id,
            path
        )
    }

    fn authorize(&self, request: reqwest::RequestBuilder) -> reqwest::RequestBuilder {
        match &self.config.access_token {
            Some(token) => request.bearer_auth(token),
            None => request,
        }
    }

    async fn send<T: for<'de> Deserialize<'de>>(
        &self,
        request: reqwest::RequestBuilder,
    ) -> Result<T, WarehouseError> {
        let response = self
            .authorize(request)
            .send()
            .await
            .map_err(|e| transport_error(&e))?;

        let status = response.status();
        let body = response
            .bytes()
            .await
            .map_err(|e| WarehouseError::unreachable(format!("failed reading BigQuery response: {}", e)))?;

        if !status.is_success() {
            return Err(api_error(status, &body));
        }
        serde_json::from_slice(&body).map_err(|e| {
            WarehouseError::unreachable(format!("invalid BigQuery response: {}", e))
        })
    }
}

#[async_trait]
impl Warehouse for BigQueryWarehouse {
    async fn list_tables(&self, dataset: &str) -> Result<Vec<TableListing>, WarehouseError> {
        let mut tables = Vec::new();
        let mut page_token: Option<String> = None;

        for page in 0..self.config.max_table_pages {
            let mut request = self
                .client
                .get(self.url(&format!("datasets/{}/tables", dataset)))
                .query(&[("maxResults", TABLES_PAGE_SIZE.to_string())]);
            if let Some(token) = &page_token {
                request = request.query(&[("pageToken", token)]);
            }

            let listing: TableList = self.send(request).await?;
            tables.extend(listing.tables.into_iter().map(|t| TableListing {
                qualified_name: format!(
                    "{}.{}.{}",
                    t.table_reference.project_id, t.table_reference.dataset_id, t.table_reference.table_id
                ),
                name: t.table_reference.table_id,
            }));

            match listing.next_page_token {
                Some(token) if !token.is_empty() => page_token = Some(token),
                _ => return Ok(tables),
            }
            if page + 1 == self.config.max_table_pages {
                tracing::warn!(
                    "Dataset '{}' has more than {} pages of tables, listing truncated",
                    dataset,
                    self.config.max_table_pages
                );
            }
        }
        Ok(tables)
    }

    async fn describe_table(&self, dataset: &str, table: &str) -> Result<NativeTable, WarehouseError> {
        let request = self
            .client
            .get(self.url(&format!("datasets/{}/tables/{}", dataset, table)));
        let resource: TableResource = self.send(request).await?;
        Ok(resource.into_native())
    }

    async fn run_query(&self, sql: &str, max_rows: usize) -> Result<QueryRows, WarehouseError> {
        let body = QueryRequest {
            query: sql,
            use_legacy_sql: false,
            max_results: max_rows,
            timeout_ms: self.config.query_timeout_ms,
            location: self.config.location.as_deref(),
        };
        let request = self.client.post(self.url("queries")).json(&body);
        let response: QueryResponse = self.send(request).await?;
        response.into_rows()
    }
}

fn transport_error(e: &reqwest::Error) -> WarehouseError {
    if e.is_timeout() {
        WarehouseError::timeout(format!("BigQuery request timed out: {}", e))
    } else {
        WarehouseError::unreachable(format!("BigQuery request failed: {}", e))
    }
}

/// Maps an error response, keeping BigQuery's own message.
fn api_error(status: StatusCode, body: &[u8]) -> WarehouseError {
    let message = serde_json::from_slice::<ErrorEnvelope>(body)
        .ok()
        .map(|e| e.error.message)
        .filter(|m| !m.is_empty())
        .unwrap_or_else(|| String::from_utf8_lossy(body).trim().to_string());

    let kind = match status {
        StatusCode::UNAUTHORIZED | StatusCode::FORBIDDEN => WarehouseErrorKind::PermissionDenied,
        StatusCode::NOT_FOUND => WarehouseErrorKind::NotFound,
        StatusCode::TOO_MANY_REQUESTS => WarehouseErrorKind::Unreachable,
        s if s.is_server_error() => WarehouseErrorKind::Unreachable,
        _ => WarehouseErrorKind::Rejected,
    };
    WarehouseError::new(kind, message)
}

#[derive(Deserialize)]
struct ErrorEnvelope {
    error: ErrorBody,
}

#[derive(Deserialize)]
struct ErrorBody {
    #[serde(default)]
    message: String,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct TableList {
    #[serde(default)]
    tables: Vec<TableEntry>,
    next_page_token: Option<String>,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct TableEntry {
    table_reference: TableReference,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct TableReference {
    project_id: String,
    dataset_id: String,
    table_id: String,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct TableResource {
    #[serde(default)]
    schema: Option<TableSchema>,
    num_rows: Option<String>,
    description: Option<String>,
}

impl TableResource {
    fn into_native(self) -> NativeTable {
        let columns = self
            .schema
            .map(|s| s.fields)
            .unwrap_or_default()
            .into_iter()
            .map(|f| NativeColumn {
                name: f.name,
                // Nested RECORD fields are not expanded
                native_type: f.field_type,
                mode: f.mode.unwrap_or_else(|| "NULLABLE".to_string()),
                description: f.description,
            })
            .collect();
        NativeTable {
            columns,
            row_count: self.num_rows.and_then(|n| n.parse().ok()),
            description: self.description,
        }
    }
}

#[derive(Deserialize, Default)]
struct TableSchema {
    #[serde(default)]
    fields: Vec<FieldSchema>,
}

#[derive(Deserialize)]
struct FieldSchema {
    name: String,
    #[serde(rename = "type")]
    field_type: String,
    mode: Option<String>,
    description: Option<String>,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct QueryRequest<'a> {
    query: &'a str,
    use_legacy_sql: bool,
    max_results: usize,
    timeout_ms: u64,
    #[serde(skip_serializing_if = "Option::is_none")]
    location: Option<&'a str>,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct QueryResponse {
    #[serde(default)]
    job_complete: bool,
    schema: Option<TableSchema>,
    #[serde(default)]
    rows: Vec<RowCells>,
}

#[derive(Deserialize)]
struct RowCells {
    #[serde(default)]
    f: Vec<Cell>,
}

#[derive(Deserialize)]
struct Cell {
    #[serde(default)]
    v: Value,
}

impl QueryResponse {
    fn into_rows(self) -> Result<QueryRows, WarehouseError> {
        if !self.job_complete {
            return Err(WarehouseError::timeout(
                "Query job did not complete before the request deadline",
            ));
        }
        let fields = self.schema.unwrap_or_default().fields;
        let columns = fields.iter().map(|f| f.name.clone()).collect();
        let rows = self
            .rows
            .into_iter()
            .map(|row| {
                row.f
                    .into_iter()
                    .zip(fields.iter())
                    .map(|(cell, field)| convert_cell(cell.v, field))
                    .collect()
            })
            .collect();
        Ok(QueryRows { columns, rows })
    }
}

/// Converts a `jobs.query` cell (always a string or null on the wire) to a
/// typed JSON value.
fn convert_cell(value: Value, field: &FieldSchema) -> Value {
    if field.mode.as_deref() == Some("REPEATED") {
        return value;
    }
    let Value::String(text) = value else {
        return value;
    };
    match field.field_type.to_ascii_uppercase().as_str() {
        "INTEGER" | "INT64" => text
            .parse::<i64>()
            .map(Value::from)
            .unwrap_or(Value::String(text)),
        "FLOAT" | "FLOAT64" => text
            .parse::<f64>()
            .ok()
            .and_then(serde_json::Number::from_f64)
            .map(Value::Number)
            .unwrap_or(Value::String(text)),
        "BOOLEAN" | "BOOL" => match text.as_str() {
            "true" => Value::Bool(true),
            "false" => Value::Bool(false),
            _ => Value::String(text),
        },
        // Epoch seconds with a fractional part
        "TIMESTAMP" => text
            .parse::<f64>()
            .ok()
            .and_then(|secs| {
                DateTime::<Utc>::from_timestamp(secs.trunc() as i64, (secs.fract() * 1e9) as u32)
            })
            .map(|ts| Value::String(ts.to_rfc3339()))
            .unwrap_or(Value::String(text)),
        // NUMERIC/BIGNUMERIC stay strings to keep precision
        _ => Value::String(text),
    }
}
