//! Discovered schema: column and table descriptors and immutable snapshots.

use std::collections::HashMap;
use std::fmt::Write as _;

use chrono::{DateTime, Utc};
use serde::Serialize;

/// Declared column type, normalised from the warehouse's native vocabulary.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum ColumnType {
    Integer,
    Float,
    String,
    Boolean,
    Timestamp,
    Unknown,
}

impl ColumnType {
    /// Maps a native type name to the normalised enum.
    ///
    /// Accepts BigQuery names (`INT64`, `NUMERIC`, `DATETIME`, ...) and Arrow
    /// names (`Int32`, `Utf8`, `Timestamp(Nanosecond, None)`, ...).
    /// Anything unrecognised maps to `Unknown`.
    pub fn from_native(native: &str) -> Self {
        let lowered = native.trim().to_ascii_lowercase();
        // Parameterised types: `NUMERIC(10, 2)`, `Timestamp(Second, None)`
        let base = lowered
            .split(|c: char| c == '(' || c == '<')
            .next()
            .unwrap_or("")
            .trim();
        match base {
            "int" | "int8" | "int16" | "int32" | "int64" | "integer" | "smallint" | "bigint"
            | "tinyint" | "byteint" | "uint8" | "uint16" | "uint32" | "uint64" => {
                ColumnType::Integer
            }
            "float" | "float16" | "float32" | "float64" | "double" | "real" | "numeric"
            | "bignumeric" | "decimal" | "bigdecimal" | "decimal128" | "decimal256" => {
                ColumnType::Float
            }
            "string" | "utf8" | "largeutf8" | "utf8view" | "varchar" | "char" | "text" => {
                ColumnType::String
            }
            "bool" | "boolean" => ColumnType::Boolean,
            "timestamp" | "datetime" | "date" | "time" | "date32" | "date64" | "time32"
            | "time64" => ColumnType::Timestamp,
            _ => ColumnType::Unknown,
        }
    }

    pub fn is_numeric(&self) -> bool {
        matches!(self, ColumnType::Integer | ColumnType::Float)
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            ColumnType::Integer => "integer",
            ColumnType::Float => "float",
            ColumnType::String => "string",
            ColumnType::Boolean => "boolean",
            ColumnType::Timestamp => "timestamp",
            ColumnType::Unknown => "unknown",
        }
    }
}

/// One discovered column.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ColumnDescriptor {
    pub name: String,
    pub declared_type: ColumnType,
    /// Native type name as reported by the warehouse
    pub native_type: String,
    pub nullable: bool,
    /// True for BigQuery `REPEATED` fields
    pub repeated: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
}

impl ColumnDescriptor {
    pub fn new(name: impl Into<String>, native_type: impl Into<String>, nullable: bool) -> Self {
        let native_type = native_type.into();
        Self {
            name: name.into(),
            declared_type: ColumnType::from_native(&native_type),
            native_type,
            nullable,
            repeated: false,
            description: None,
        }
    }
}

/// One discovered table. Columns are in physical order.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct TableDescriptor {
    /// Short name, unique within a snapshot
    pub name: String,
    /// Dataset-qualified name used in generated SQL
    pub qualified_name: String,
    pub columns: Vec<ColumnDescriptor>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub row_count_estimate: Option<u64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
}

impl TableDescriptor {
    /// Finds a column by name, exact match first, then case-insensitive.
    pub fn column(&self, name: &str) -> Option<&ColumnDescriptor> {
        self.columns
            .iter()
            .find(|c| c.name == name)
            .or_else(|| self.columns.iter().find(|c| c.name.eq_ignore_ascii_case(name)))
    }
}

/// A column matched by [`SchemaSnapshot::find_columns_by_hint`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ColumnMatch {
    pub table: String,
    pub column: String,
    pub declared_type: ColumnType,
}

/// Semantic hints and the column-name fragments they stand for.
const HINT_PATTERNS: &[(&str, &[&str])] = &[
    ("email", &["email", "mail", "e_mail"]),
    ("name", &["name", "title", "label"]),
    ("id", &["id", "identifier", "_id"]),
    ("date", &["date", "time", "timestamp", "created", "updated"]),
    ("revenue", &["revenue", "amount", "total", "price", "cost", "value"]),
];

/// Immutable view of a dataset's schema.
///
/// Tables keep discovery (declaration) order. Refreshing builds a new snapshot
/// with a higher version; a snapshot is never mutated after construction.
#[derive(Debug, Clone, Serialize)]
pub struct SchemaSnapshot {
    pub dataset: String,
    pub version: u64,
    pub discovered_at: DateTime<Utc>,
    tables: Vec<TableDescriptor>,
    #[serde(skip)]
    index: HashMap<String, usize>,
}

impl SchemaSnapshot {
    /// Builds a snapshot from tables in declaration order.
    ///
    /// Short names must be unique: a later table with an already-seen name is
    /// dropped (first seen wins). Names differing only in case are both kept;
    /// lookups prefer the exact-case match.
    pub fn new(
        dataset: impl Into<String>,
        version: u64,
        discovered_at: DateTime<Utc>,
        tables: Vec<TableDescriptor>,
    ) -> Self {
        let mut kept = Vec::with_capacity(tables.len());
        let mut index = HashMap::with_capacity(tables.len());
        for table in tables {
            if index.contains_key(&table.name) {
                tracing::warn!(
                    "Duplicate table name '{}' in discovery output, keeping first occurrence",
                    table.name
                );
                continue;
            }
            index.insert(table.name.clone(), kept.len());
            kept.push(table);
        }
        Self {
            dataset: dataset.into(),
            version,
            discovered_at,
            tables: kept,
            index,
        }
    }

    /// Tables in declaration order.
    pub fn tables(&self) -> &[TableDescriptor] {
        &self.tables
    }

    pub fn table_count(&self) -> usize {
        self.tables.len()
    }

    pub fn is_empty(&self) -> bool {
        self.tables.is_empty()
    }

    /// Looks up a table by short name, exact case first, then the first
    /// case-insensitive match in declaration order.
    pub fn table(&self, name: &str) -> Option<&TableDescriptor> {
        if let Some(&i) = self.index.get(name) {
            return Some(&self.tables[i]);
        }
        self.tables.iter().find(|t| t.name.eq_ignore_ascii_case(name))
    }

    /// Resolves a SQL relation reference (`proj.ds.t`, `` `ds.t` ``, `t`) to a
    /// table short name.
    pub fn resolve_relation(&self, relation: &str) -> Option<&TableDescriptor> {
        let cleaned = relation.trim().trim_matches('`').trim_matches('"');
        if let Some(t) = self
            .tables
            .iter()
            .find(|t| t.qualified_name.eq_ignore_ascii_case(cleaned))
        {
            return Some(t);
        }
        let short = cleaned
            .rsplit('.')
            .next()
            .unwrap_or(cleaned)
            .trim_matches('`')
            .trim_matches('"');
        self.table(short)
    }

    /// Returns true if any table has a column with this name (case-insensitive).
    pub fn has_column(&self, name: &str) -> bool {
        self.tables.iter().any(|t| t.column(name).is_some())
    }

    /// Finds columns whose names match a semantic hint.
    ///
    /// Known hints expand to synonym fragments, so "email" also finds
    /// `mail`/`e_mail` columns.
    pub fn find_columns_by_hint(&self, hint: &str) -> Vec<ColumnMatch> {
        let hint_lower = hint.to_lowercase();
        let mut patterns: Vec<&str> = vec![hint_lower.as_str()];
        for (key, fragments) in HINT_PATTERNS {
            if hint_lower.contains(key) {
                patterns.extend(fragments.iter().copied());
            }
        }

        let mut matches = Vec::new();
        for table in &self.tables {
            for column in &table.columns {
                let name = column.name.to_lowercase();
                if patterns.iter().any(|p| !p.is_empty() && name.contains(p)) {
                    matches.push(ColumnMatch {
                        table: table.name.clone(),
                        column: column.name.clone(),
                        declared_type: column.declared_type,
                    });
                }
            }
        }
        matches
    }

    /// Textual rendering for language-model prompts.
    pub fn summary(&self) -> String {
        self.render(self.tables.iter())
    }

    /// Rendering restricted to the named tables, in the given order.
    pub fn summary_for(&self, names: &[String]) -> String {
        self.render(names.iter().filter_map(|n| self.table(n)))
    }

    fn render<'a>(&self, tables: impl Iterator<Item = &'a TableDescriptor>) -> String {
        let tables: Vec<&TableDescriptor> = tables.collect();
        let mut out = String::new();
        let _ = writeln!(out, "Dataset: {}", self.dataset);
        let _ = writeln!(out, "Total Tables: {}", tables.len());
        for table in tables {
            let _ = writeln!(out);
            let _ = writeln!(out, "Table: {}", table.qualified_name);
            if let Some(description) = table.description.as_deref().filter(|d| !d.is_empty()) {
                let _ = writeln!(out, "Description: {}", description);
            }
            match table.row_count_estimate {
                Some(rows) if rows > 0 => {
                    let _ = writeln!(out, "Rows: {}", rows);
                }
                _ => {
                    let _ = writeln!(out, "Rows: Unknown");
                }
            }
            let _ = writeln!(out, "Columns ({}):", table.columns.len());
            for column in &table.columns {
                let mode = if column.repeated { " (REPEATED)" } else { "" };
                let description = column
                    .description
                    .as_deref()
                    .filter(|d| !d.is_empty())
                    .map(|d| format!(" - {}", d))
                    .unwrap_or_default();
                let _ = writeln!(
                    out,
                    "  - {}: {}{}{}",
                    column.name,
                    column.native_type.to_uppercase(),
                    mode,
                    description
                );
            }
        }
        out
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;

    pub(crate) fn table(name: &str, columns: &[(&str, &str)]) -> TableDescriptor {
        TableDescriptor {
            name: name.to_string(),
            qualified_name: format!("shop.{}", name),
            columns: columns
                .iter()
                .map(|(n, t)| ColumnDescriptor::new(*n, *t, true))
                .collect(),
            row_count_estimate: None,
            description: None,
        }
    }

    pub(crate) fn shop_snapshot() -> SchemaSnapshot {
        SchemaSnapshot::new(
            "shop",
            1,
            Utc::now(),
            vec![
                table(
                    "customers",
                    &[
                        ("customer_id", "INT64"),
                        ("customer_name", "STRING"),
                        ("revenue", "FLOAT64"),
                    ],
                ),
                table(
                    "contacts",
                    &[("contact_id", "INT64"), ("name", "STRING"), ("email", "STRING")],
                ),
            ],
        )
    }

    #[test]
    fn native_types_normalise() {
        assert_eq!(ColumnType::from_native("INT64"), ColumnType::Integer);
        assert_eq!(ColumnType::from_native("NUMERIC(10, 2)"), ColumnType::Float);
        assert_eq!(ColumnType::from_native("Utf8"), ColumnType::String);
        assert_eq!(ColumnType::from_native("BOOL"), ColumnType::Boolean);
        assert_eq!(
            ColumnType::from_native("Timestamp(Nanosecond, None)"),
            ColumnType::Timestamp
        );
        assert_eq!(ColumnType::from_native("DATETIME"), ColumnType::Timestamp);
    }

    #[test]
    fn unrecognised_native_types_are_unknown() {
        assert_eq!(ColumnType::from_native("GEOGRAPHY"), ColumnType::Unknown);
        assert_eq!(ColumnType::from_native("RECORD"), ColumnType::Unknown);
        assert_eq!(ColumnType::from_native(""), ColumnType::Unknown);
    }

    #[test]
    fn duplicate_short_names_keep_first_seen() {
        let snapshot = SchemaSnapshot::new(
            "shop",
            1,
            Utc::now(),
            vec![
                table("orders", &[("order_id", "INT64")]),
                table("orders", &[("other", "STRING")]),
            ],
        );
        assert_eq!(snapshot.table_count(), 1);
        assert!(snapshot.table("orders").unwrap().column("order_id").is_some());
    }

    #[test]
    fn lookup_prefers_exact_case() {
        let snapshot = SchemaSnapshot::new(
            "shop",
            1,
            Utc::now(),
            vec![
                table("Orders", &[("a", "INT64")]),
                table("orders", &[("b", "INT64")]),
            ],
        );
        assert!(snapshot.table("orders").unwrap().column("b").is_some());
        assert!(snapshot.table("Orders").unwrap().column("a").is_some());
        // No exact match: first seen in declaration order
        assert!(snapshot.table("ORDERS").unwrap().column("a").is_some());
    }

    #[test]
    fn resolve_relation_handles_qualified_and_quoted_names() {
        let snapshot = shop_snapshot();
        assert_eq!(
            snapshot.resolve_relation("`acme.shop.customers`").unwrap().name,
            "customers"
        );
        assert_eq!(snapshot.resolve_relation("shop.contacts").unwrap().name, "contacts");
        assert!(snapshot.resolve_relation("invoices").is_none());
    }

    #[test]
    fn column_hints_expand_synonyms() {
        let snapshot = shop_snapshot();
        let matches = snapshot.find_columns_by_hint("email");
        assert_eq!(matches.len(), 1);
        assert_eq!(matches[0].table, "contacts");

        let revenue = snapshot.find_columns_by_hint("revenue");
        assert!(revenue.iter().any(|m| m.column == "revenue"));
    }

    #[test]
    fn summary_lists_every_table_and_column() {
        let summary = shop_snapshot().summary();
        assert!(summary.contains("Total Tables: 2"));
        assert!(summary.contains("Table: shop.customers"));
        assert!(summary.contains("  - email: STRING"));
        assert!(summary.contains("Rows: Unknown"));
    }
}
