//! Question answering endpoint.

use hyper::http::request::Parts;
use hyper::{body::Bytes, Response};

use crate::router::{AppState, RouterError};

use super::request_utils::{json_response, query_param};

/// Answers one natural-language question.
///
/// # Endpoint
/// `GET /?query=<url-encoded question>`
///
/// # Response
/// - **200 OK**: the response envelope, for answered and failed questions
///   alike. Failures carry `success: false`, `error`, and the generated
///   `sql` when one was produced.
///
/// # Errors
/// - **400 Bad Request**: `query` is missing or blank
///
/// # Example
/// ```bash
/// curl "http://localhost:8080/?query=Count%20total%20customers"
/// ```
pub async fn ask(parts: &Parts, state: AppState) -> Result<Response<Bytes>, RouterError> {
    let question = query_param(parts.uri.query(), "query")
        .filter(|q| !q.trim().is_empty())
        .ok_or_else(|| RouterError::BadRequest("Missing 'query' parameter".to_string()))?;

    let envelope = state.orchestrator.handle(&question).await;
    json_response(200, &envelope)
}
