//! Concrete warehouse and language-model backends.

pub mod bigquery;
pub mod gemini;
pub mod local;
pub mod ollama;

#[cfg(test)]
mod test_server;

pub use bigquery::{BigQueryConfig, BigQueryWarehouse};
pub use gemini::{GeminiConfig, GeminiModel};
pub use local::LocalWarehouse;
pub use ollama::OllamaModel;
