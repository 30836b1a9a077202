//! Pipeline configuration.

use std::fmt;
use std::str::FromStr;
use std::sync::atomic::{AtomicU8, Ordering};
use std::time::Duration;

use serde::Serialize;

use crate::error::ConfigurationError;

/// Controls whether raw query data accompanies the summary in responses.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum DisplayMode {
    /// Summary plus SQL, rows, row count and columns
    Full,
    /// Summary only
    SummaryOnly,
}

impl DisplayMode {
    pub fn as_str(&self) -> &'static str {
        match self {
            DisplayMode::Full => "full",
            DisplayMode::SummaryOnly => "summary_only",
        }
    }
}

impl fmt::Display for DisplayMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for DisplayMode {
    type Err = ConfigurationError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "full" => Ok(DisplayMode::Full),
            "summary_only" | "summary-only" | "summary" | "natural_language_only" => {
                Ok(DisplayMode::SummaryOnly)
            }
            other => Err(ConfigurationError::Invalid(format!(
                "unknown display mode '{}' (expected 'full' or 'summary_only')",
                other
            ))),
        }
    }
}

/// Display mode that can be switched while the service runs.
#[derive(Debug)]
pub struct DisplayModeCell(AtomicU8);

impl DisplayModeCell {
    pub fn new(mode: DisplayMode) -> Self {
        Self(AtomicU8::new(Self::encode(mode)))
    }

    pub fn get(&self) -> DisplayMode {
        match self.0.load(Ordering::Acquire) {
            1 => DisplayMode::SummaryOnly,
            _ => DisplayMode::Full,
        }
    }

    pub fn set(&self, mode: DisplayMode) {
        self.0.store(Self::encode(mode), Ordering::Release);
    }

    fn encode(mode: DisplayMode) -> u8 {
        match mode {
            DisplayMode::Full => 0,
            DisplayMode::SummaryOnly => 1,
        }
    }
}

/// Pipeline configuration, loaded once at process start.
#[derive(Debug, Clone)]
pub struct PipelineConfig {
    /// Warehouse project identifier (may be empty for local warehouses)
    pub project_id: String,
    /// Dataset whose tables are discovered
    pub dataset_id: String,
    /// Maximum accepted question length in characters
    pub max_question_length: usize,
    /// Row cap applied to every executed query
    pub max_result_rows: usize,
    /// Initial display mode
    pub display_mode: DisplayMode,
    /// Snapshot age after which the server refreshes it (None = never)
    pub schema_ttl: Option<Duration>,
    /// Timeout for one complete schema discovery
    pub discovery_timeout_ms: u64,
    /// Timeout for a single language-model call
    pub model_timeout_ms: u64,
    /// Timeout for a single warehouse query
    pub warehouse_timeout_ms: u64,
    /// Attempts the translator makes before giving up
    pub translation_attempts: u32,
    /// Delay between translation attempts in milliseconds
    pub translation_retry_delay_ms: u64,
    /// Rows rendered into the summary fallback prompt
    pub summary_max_rows: usize,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            project_id: String::new(),
            dataset_id: String::new(),
            max_question_length: 500,
            max_result_rows: 100,
            display_mode: DisplayMode::Full,
            schema_ttl: None,
            discovery_timeout_ms: 60_000,
            model_timeout_ms: 30_000,
            warehouse_timeout_ms: 60_000,
            translation_attempts: 2,
            translation_retry_delay_ms: 250,
            summary_max_rows: 50,
        }
    }
}

impl PipelineConfig {
    /// Checks value ranges. Called once at startup.
    pub fn validate(&self) -> Result<(), ConfigurationError> {
        if self.dataset_id.trim().is_empty() {
            return Err(ConfigurationError::Invalid(
                "dataset id must not be empty".to_string(),
            ));
        }
        if self.max_question_length == 0 {
            return Err(ConfigurationError::Invalid(
                "maximum question length must be > 0".to_string(),
            ));
        }
        if self.max_result_rows == 0 {
            return Err(ConfigurationError::Invalid(
                "maximum result rows must be > 0".to_string(),
            ));
        }
        if self.translation_attempts == 0 {
            return Err(ConfigurationError::Invalid(
                "translation attempts must be > 0".to_string(),
            ));
        }
        if matches!(self.schema_ttl, Some(ttl) if ttl.is_zero()) {
            return Err(ConfigurationError::Invalid(
                "schema TTL must be > 0 when set".to_string(),
            ));
        }
        Ok(())
    }

    /// Dataset reference used in prompts and summaries (`project.dataset`).
    pub fn dataset_ref(&self) -> String {
        if self.project_id.is_empty() {
            self.dataset_id.clone()
        } else {
            format!("{}.{}", self.project_id, self.dataset_id)
        }
    }
}
