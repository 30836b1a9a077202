//! Schema catalog with an atomically swapped snapshot.
//!
//! Readers call [`SchemaCatalog::current`] and get an `Arc` to a complete,
//! immutable snapshot; they never block and never observe a partial refresh.
//! Refreshes are serialized so at most one discovery runs at a time.

use std::sync::Arc;
use std::time::Duration;

use arc_swap::ArcSwapOption;
use chrono::Utc;
use tokio::sync::Mutex;

use crate::error::{DiscoveryError, WarehouseError};
use crate::schema::{ColumnDescriptor, SchemaSnapshot, TableDescriptor};
use crate::warehouse::{NativeTable, TableListing, Warehouse};

/// Owner of the active schema snapshot for one dataset.
pub struct SchemaCatalog {
    warehouse: Arc<dyn Warehouse>,
    dataset: String,
    discovery_timeout: Duration,
    active: ArcSwapOption<SchemaSnapshot>,
    refresh_lock: Mutex<()>,
}

impl SchemaCatalog {
    /// Creates a catalog with no snapshot. Call [`refresh`](Self::refresh) to
    /// populate it.
    pub fn new(
        warehouse: Arc<dyn Warehouse>,
        dataset: impl Into<String>,
        discovery_timeout: Duration,
    ) -> Self {
        Self {
            warehouse,
            dataset: dataset.into(),
            discovery_timeout,
            active: ArcSwapOption::empty(),
            refresh_lock: Mutex::new(()),
        }
    }

    pub fn dataset(&self) -> &str {
        &self.dataset
    }

    /// Returns the last successfully discovered snapshot, if any.
    pub fn current(&self) -> Option<Arc<SchemaSnapshot>> {
        self.active.load_full()
    }

    /// Version of the active snapshot, 0 when none exists.
    pub fn current_version(&self) -> u64 {
        self.current().map(|s| s.version).unwrap_or(0)
    }

    /// True when there is no snapshot or the active one is at least `ttl` old.
    pub fn is_stale(&self, ttl: Duration) -> bool {
        match self.current() {
            None => true,
            Some(snapshot) => {
                let age = Utc::now().signed_duration_since(snapshot.discovered_at);
                age.to_std().map(|age| age >= ttl).unwrap_or(false)
            }
        }
    }

    /// Discovers the dataset's tables without touching the active snapshot.
    ///
    /// The returned snapshot carries the next version number. A table whose
    /// description fails is skipped with a warning; failing to list the
    /// dataset, or to describe every listed table, is an error.
    pub async fn discover(&self, dataset: &str) -> Result<SchemaSnapshot, DiscoveryError> {
        let timeout_ms = self.discovery_timeout.as_millis() as u64;
        match tokio::time::timeout(self.discovery_timeout, self.discover_tables(dataset)).await {
            Ok(Ok(tables)) => Ok(SchemaSnapshot::new(
                dataset,
                self.current_version() + 1,
                Utc::now(),
                tables,
            )),
            Ok(Err(e)) => Err(e),
            Err(_) => Err(DiscoveryError::Timeout {
                dataset: dataset.to_string(),
                timeout_ms,
            }),
        }
    }

    /// Re-discovers the configured dataset and publishes the result.
    ///
    /// On failure the previous snapshot stays active. A caller that waited
    /// behind a refresh which already published a newer snapshot gets that
    /// snapshot without a second discovery.
    pub async fn refresh(&self) -> Result<Arc<SchemaSnapshot>, DiscoveryError> {
        let observed = self.current_version();
        let _guard = self.refresh_lock.lock().await;

        if let Some(current) = self.current() {
            if current.version > observed {
                tracing::debug!(
                    "Refresh of '{}' satisfied by concurrent refresh (version {})",
                    self.dataset,
                    current.version
                );
                return Ok(current);
            }
        }

        match self.discover(&self.dataset).await {
            Ok(snapshot) => {
                let snapshot = Arc::new(snapshot);
                self.active.store(Some(Arc::clone(&snapshot)));
                tracing::info!(
                    "Schema snapshot v{} for '{}' published with {} tables",
                    snapshot.version,
                    self.dataset,
                    snapshot.table_count()
                );
                Ok(snapshot)
            }
            Err(e) => {
                match self.current() {
                    Some(current) => tracing::warn!(
                        "Schema refresh failed, keeping snapshot v{}: {}",
                        current.version,
                        e
                    ),
                    None => tracing::warn!("Schema discovery failed, no snapshot available: {}", e),
                }
                Err(e)
            }
        }
    }

    async fn discover_tables(&self, dataset: &str) -> Result<Vec<TableDescriptor>, DiscoveryError> {
        let listings = self
            .warehouse
            .list_tables(dataset)
            .await
            .map_err(|source| DiscoveryError::ListTables {
                dataset: dataset.to_string(),
                source,
            })?;

        let mut tables = Vec::with_capacity(listings.len());
        let mut last_error: Option<WarehouseError> = None;
        for listing in &listings {
            match self.warehouse.describe_table(dataset, &listing.name).await {
                Ok(native) => tables.push(to_descriptor(listing, native)),
                Err(e) => {
                    tracing::warn!("Skipping table '{}': {}", listing.qualified_name, e);
                    last_error = Some(e);
                }
            }
        }

        if tables.is_empty() {
            if let Some(source) = last_error {
                return Err(DiscoveryError::DescribeTables {
                    dataset: dataset.to_string(),
                    source,
                });
            }
        }
        tracing::debug!(
            "Discovered {} of {} tables in '{}'",
            tables.len(),
            listings.len(),
            dataset
        );
        Ok(tables)
    }
}

impl std::fmt::Debug for SchemaCatalog {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SchemaCatalog")
            .field("dataset", &self.dataset)
            .field("version", &self.current_version())
            .finish()
    }
}

fn to_descriptor(listing: &TableListing, native: NativeTable) -> TableDescriptor {
    let columns = native
        .columns
        .into_iter()
        .map(|c| {
            let mode = c.mode.to_ascii_uppercase();
            let mut column = ColumnDescriptor::new(c.name, c.native_type, mode != "REQUIRED");
            column.repeated = mode == "REPEATED";
            column.description = c.description.filter(|d| !d.is_empty());
            column
        })
        .collect();

    TableDescriptor {
        name: listing.name.clone(),
        qualified_name: listing.qualified_name.clone(),
        columns,
        row_count_estimate: native.row_count,
        description: native.description.filter(|d| !d.is_empty()),
    }
}
