//! Response types and helpers for HTTP endpoints.

use serde::Serialize;

/// Transport error details
#[derive(Debug, Serialize)]
pub struct ApiError {
    /// HTTP status code as string
    pub code: String,
    pub message: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub details: Option<String>,
}

/// Body of every non-200 response
#[derive(Debug, Serialize)]
pub struct ErrorResponse {
    /// Always false
    pub success: bool,
    pub error: ApiError,
}

pub fn error_response(code: u16, message: String, details: Option<String>) -> ErrorResponse {
    ErrorResponse {
        success: false,
        error: ApiError {
            code: code.to_string(),
            message,
            details,
        },
    }
}

/// `GET /health` body
#[derive(Debug, Serialize)]
pub struct HealthResponse {
    pub status: &'static str,
    pub mode: &'static str,
    /// True once a schema snapshot has been published
    pub handlers_ready: bool,
    pub version: &'static str,
    pub schema_version: Option<u64>,
}

/// `POST /refresh` body
#[derive(Debug, Serialize)]
pub struct RefreshResponse {
    pub success: bool,
    /// Version of the snapshot active after the call
    pub version: Option<u64>,
    pub table_count: Option<usize>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}
