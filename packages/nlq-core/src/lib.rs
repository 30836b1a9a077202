//! Core model for natural-language queries over a tabular warehouse.
//!
//! Provides the schema model and catalog, the warehouse and language-model
//! seams, result sets, configuration, the error taxonomy and the read-only
//! SQL guard.

pub mod catalog;
pub mod config;
pub mod error;
pub mod result;
pub mod schema;
pub mod sql_guard;
pub mod text;
pub mod warehouse;

pub use catalog::SchemaCatalog;
pub use config::{DisplayMode, DisplayModeCell, PipelineConfig};
pub use error::{
    ConfigurationError, DiscoveryError, ExecutionError, ModelError, TranslationError,
    WarehouseError, WarehouseErrorKind,
};
pub use result::{ResultSet, Row};
pub use schema::{ColumnDescriptor, ColumnType, SchemaSnapshot, TableDescriptor};
pub use warehouse::{LanguageModel, NativeColumn, NativeTable, QueryRows, TableListing, Warehouse};
