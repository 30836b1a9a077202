//! HTTP endpoint implementations.

mod admin_handlers;
mod query_handlers;
pub mod request_utils;
pub mod response;

#[cfg(test)]
pub(crate) mod testing;

pub use admin_handlers::{health, refresh, schema};
pub use query_handlers::ask;
pub use response::{error_response, ErrorResponse, HealthResponse, RefreshResponse};
