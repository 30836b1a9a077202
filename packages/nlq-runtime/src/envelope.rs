//! Response envelope returned for every question.

use nlq_core::{DisplayMode, ResultSet, Row};
use serde::Serialize;

/// The externally visible result of one request.
///
/// Absent fields are omitted from the JSON: in summary-only mode a success
/// carries only `success`, `query` and `summary`; a failure carries
/// `success`, `error`, `query` and the generated `sql` when there was one.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ResponseEnvelope {
    pub success: bool,
    /// The question as received
    pub query: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub summary: Option<String>,
    /// Statement that was (or would have been) executed
    #[serde(skip_serializing_if = "Option::is_none")]
    pub sql: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub data: Option<Vec<Row>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub row_count: Option<usize>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub columns: Option<Vec<String>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl ResponseEnvelope {
    /// Successful answer shaped for `mode`.
    pub fn answered(
        question: &str,
        summary: String,
        sql: String,
        result: ResultSet,
        mode: DisplayMode,
    ) -> Self {
        let mut envelope = Self {
            success: true,
            query: question.to_string(),
            summary: Some(summary),
            sql: None,
            data: None,
            row_count: None,
            columns: None,
            error: None,
        };
        if mode == DisplayMode::Full {
            envelope.sql = Some(sql);
            envelope.row_count = Some(result.row_count());
            envelope.columns = Some(result.columns);
            envelope.data = Some(result.rows);
        }
        envelope
    }

    /// Failed request. `sql` is present only if a statement was generated.
    pub fn failed(question: &str, error: String, sql: Option<String>) -> Self {
        Self {
            success: false,
            query: question.to_string(),
            summary: None,
            sql,
            data: None,
            row_count: None,
            columns: None,
            error: Some(error),
        }
    }
}
