//! Health, schema and refresh endpoints.

use hyper::http::request::Parts;
use hyper::{body::Bytes, Response};
use nlq_core::ConfigurationError;
use serde_json::json;

use crate::router::{AppState, RouterError};

use super::request_utils::json_response;
use super::response::{HealthResponse, RefreshResponse};

/// `GET /health`. Always 200; `handlers_ready` is false until a schema
/// snapshot has been published.
pub async fn health(_parts: &Parts, state: AppState) -> Result<Response<Bytes>, RouterError> {
    let snapshot = state.orchestrator.catalog().current();
    let body = HealthResponse {
        status: "healthy",
        mode: state.orchestrator.display_mode().as_str(),
        handlers_ready: snapshot.is_some(),
        version: env!("CARGO_PKG_VERSION"),
        schema_version: snapshot.map(|s| s.version),
    };
    json_response(200, &body)
}

/// `GET /schema`. Lists the active snapshot's tables and columns.
pub async fn schema(_parts: &Parts, state: AppState) -> Result<Response<Bytes>, RouterError> {
    let catalog = state.orchestrator.catalog();
    let body = match catalog.current() {
        Some(snapshot) => json!({
            "success": true,
            "schema": snapshot.as_ref(),
        }),
        None => json!({
            "success": false,
            "error": ConfigurationError::SchemaUnavailable {
                dataset: catalog.dataset().to_string(),
            }
            .to_string(),
        }),
    };
    json_response(200, &body)
}

/// `POST /refresh`. Re-runs discovery; on failure the previous snapshot
/// stays active and its version is reported.
pub async fn refresh(_parts: &Parts, state: AppState) -> Result<Response<Bytes>, RouterError> {
    let catalog = state.orchestrator.catalog();
    let body = match catalog.refresh().await {
        Ok(snapshot) => RefreshResponse {
            success: true,
            version: Some(snapshot.version),
            table_count: Some(snapshot.table_count()),
            error: None,
        },
        Err(e) => {
            let active = catalog.current();
            RefreshResponse {
                success: false,
                version: active.as_ref().map(|s| s.version),
                table_count: active.as_ref().map(|s| s.table_count()),
                error: Some(e.to_string()),
            }
        }
    };
    json_response(200, &body)
}
