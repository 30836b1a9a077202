//! Request utilities for HTTP endpoints.

use hyper::{body::Bytes, Response};
use percent_encoding::percent_decode_str;
use serde::Serialize;

use crate::router::RouterError;

/// Looks up one query-string parameter, percent-decoded with `+` as space.
pub fn query_param(query_str: Option<&str>, name: &str) -> Option<String> {
    query_str?.split('&').find_map(|pair| {
        let (key, value) = pair.split_once('=').unwrap_or((pair, ""));
        if decode_component(key) != name {
            return None;
        }
        Some(decode_component(value))
    })
}

fn decode_component(raw: &str) -> String {
    let spaced = raw.replace('+', " ");
    percent_decode_str(&spaced).decode_utf8_lossy().into_owned()
}

/// Serializes `body` into a JSON response.
pub fn json_response<T: Serialize>(status: u16, body: &T) -> Result<Response<Bytes>, RouterError> {
    let json = serde_json::to_vec(body)
        .map_err(|e| RouterError::InternalError(format!("Failed to serialize response: {}", e)))?;
    Response::builder()
        .status(status)
        .header("Content-Type", "application/json")
        .body(Bytes::from(json))
        .map_err(|e| RouterError::InternalError(format!("Failed to build response: {}", e)))
}
