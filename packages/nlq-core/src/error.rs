//! Error taxonomy for the query pipeline.
//!
//! External collaborators report `WarehouseError` and `ModelError`; the
//! pipeline components translate those into the request-level kinds
//! (`DiscoveryError`, `TranslationError`, `ExecutionError`,
//! `ConfigurationError`) that the orchestrator maps onto the response
//! envelope.

use thiserror::Error;

/// Broad classification of a warehouse failure.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WarehouseErrorKind {
    /// Network failure or service unavailable
    Unreachable,
    /// Caller lacks list/describe/query permission
    PermissionDenied,
    /// Dataset or table does not exist
    NotFound,
    /// Warehouse rejected the statement (syntax, unknown column, quota)
    Rejected,
    /// Call exceeded its deadline
    Timeout,
}

/// Failure reported by a warehouse backend.
///
/// `message` carries the warehouse's own diagnostic text verbatim.
#[derive(Error, Debug, Clone)]
#[error("{message}")]
pub struct WarehouseError {
    pub kind: WarehouseErrorKind,
    pub message: String,
}

impl WarehouseError {
    pub fn new(kind: WarehouseErrorKind, message: impl Into<String>) -> Self {
        Self {
            kind,
            message: message.into(),
        }
    }

    pub fn unreachable(message: impl Into<String>) -> Self {
        Self::new(WarehouseErrorKind::Unreachable, message)
    }

    pub fn rejected(message: impl Into<String>) -> Self {
        Self::new(WarehouseErrorKind::Rejected, message)
    }

    pub fn not_found(message: impl Into<String>) -> Self {
        Self::new(WarehouseErrorKind::NotFound, message)
    }

    pub fn timeout(message: impl Into<String>) -> Self {
        Self::new(WarehouseErrorKind::Timeout, message)
    }
}

/// Failure reported by a language-model backend.
#[derive(Error, Debug, Clone)]
pub enum ModelError {
    /// Endpoint could not be reached
    #[error("language model unreachable: {0}")]
    Unreachable(String),

    /// Call exceeded its deadline
    #[error("language model timed out after {0} ms")]
    Timeout(u64),

    /// Endpoint answered with an error status
    #[error("language model rejected the request ({status}): {message}")]
    Rejected { status: u16, message: String },

    /// Endpoint answered without any generated text
    #[error("language model returned an empty response")]
    EmptyResponse,
}

impl ModelError {
    /// Returns true if repeating the call may succeed.
    pub fn is_transient(&self) -> bool {
        match self {
            ModelError::Unreachable(_) | ModelError::Timeout(_) | ModelError::EmptyResponse => true,
            ModelError::Rejected { status, .. } => *status == 429 || *status >= 500,
        }
    }
}

/// Schema discovery failed. Never fatal once a snapshot exists.
#[derive(Error, Debug, Clone)]
pub enum DiscoveryError {
    /// Listing the dataset's tables failed
    #[error("failed to list tables in dataset '{dataset}': {source}")]
    ListTables {
        dataset: String,
        #[source]
        source: WarehouseError,
    },

    /// Tables were listed but none could be described
    #[error("failed to describe any table in dataset '{dataset}': {source}")]
    DescribeTables {
        dataset: String,
        #[source]
        source: WarehouseError,
    },

    /// Discovery exceeded its deadline
    #[error("schema discovery for dataset '{dataset}' timed out after {timeout_ms} ms")]
    Timeout { dataset: String, timeout_ms: u64 },
}

/// Natural-language to SQL translation failed. No query was executed.
#[derive(Error, Debug, Clone)]
pub enum TranslationError {
    /// Question longer than the configured maximum
    #[error("Query too long. Maximum length is {max} characters (got {actual}).")]
    QuestionTooLong { max: usize, actual: usize },

    /// Question is blank
    #[error("Query is empty.")]
    EmptyQuestion,

    /// Model could not be reached after all attempts
    #[error("Error generating SQL: {0}")]
    ModelUnavailable(#[source] ModelError),

    /// Model output was not a usable statement after all attempts
    #[error("Error generating SQL: model returned malformed output ({0})")]
    Malformed(String),

    /// Model output violated the read-only policy
    #[error("Generated SQL contains potentially unsafe operations: {0}")]
    Unsafe(String),
}

/// Warehouse rejected or failed the query.
///
/// The display text is the warehouse's diagnostic, unmodified.
#[derive(Error, Debug, Clone)]
#[error("{source}")]
pub struct ExecutionError {
    #[from]
    pub source: WarehouseError,
}

impl ExecutionError {
    pub fn kind(&self) -> WarehouseErrorKind {
        self.source.kind
    }
}

/// Operator misconfiguration surfaced immediately.
#[derive(Error, Debug, Clone)]
pub enum ConfigurationError {
    /// No schema snapshot has ever been discovered
    #[error("Schema is not available: discovery has not succeeded for dataset '{dataset}'. Check the warehouse configuration.")]
    SchemaUnavailable { dataset: String },

    /// A configuration value is out of range
    #[error("Invalid configuration: {0}")]
    Invalid(String),
}
