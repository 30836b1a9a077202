//! Query result sets.

use serde_json::{Map, Value};

use crate::warehouse::QueryRows;

/// One result row keyed by column name, in column order.
pub type Row = Map<String, Value>;

/// Rows produced by one executed query. Never mutated after construction.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct ResultSet {
    pub columns: Vec<String>,
    pub rows: Vec<Row>,
    /// Set when the row count reached the cap.
    ///
    /// This is an approximation: a result with exactly `row_limit` rows is
    /// reported as truncated even if nothing was cut off. Telling the two
    /// apart would need a second count query per request.
    pub truncated: bool,
}

impl ResultSet {
    /// Builds a result set from positional rows, keeping at most `row_limit`.
    ///
    /// Duplicate column names (e.g. `name` from both sides of a join) get a
    /// numeric suffix so no value is lost when keyed by name.
    pub fn from_query_rows(raw: QueryRows, row_limit: usize) -> Self {
        let columns = dedupe_columns(raw.columns);
        let returned = raw.rows.len();
        let rows: Vec<Row> = raw
            .rows
            .into_iter()
            .take(row_limit)
            .map(|values| {
                let mut row = Map::with_capacity(columns.len());
                let mut values = values.into_iter();
                for column in &columns {
                    row.insert(column.clone(), values.next().unwrap_or(Value::Null));
                }
                row
            })
            .collect();

        Self {
            truncated: returned >= row_limit,
            columns,
            rows,
        }
    }

    pub fn row_count(&self) -> usize {
        self.rows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    /// Values of one column across all rows.
    pub fn column_values<'a>(&'a self, column: &'a str) -> impl Iterator<Item = &'a Value> + 'a {
        self.rows.iter().filter_map(move |row| row.get(column))
    }

    /// Returns true if every non-null value of the column is numeric.
    pub fn is_numeric_column(&self, column: &str) -> bool {
        let mut seen = false;
        for value in self.column_values(column) {
            if value.is_null() {
                continue;
            }
            if as_number(value).is_none() {
                return false;
            }
            seen = true;
        }
        seen
    }
}

/// Renders a JSON value the way it should read in a sentence.
pub fn display_value(value: &Value) -> String {
    match value {
        Value::Null => "null".to_string(),
        Value::String(s) => s.clone(),
        Value::Number(n) => {
            if let Some(f) = n.as_f64().filter(|_| n.is_f64()) {
                format_float(f)
            } else {
                n.to_string()
            }
        }
        Value::Bool(b) => b.to_string(),
        other => other.to_string(),
    }
}

/// Numeric view of a value; numeric strings count (warehouses often return
/// NUMERIC/BIGNUMERIC as strings).
pub fn as_number(value: &Value) -> Option<f64> {
    match value {
        Value::Number(n) => n.as_f64(),
        Value::String(s) => s.trim().parse::<f64>().ok().filter(|f| f.is_finite()),
        _ => None,
    }
}

/// Formats a float without a trailing `.0` for whole values.
pub fn format_float(f: f64) -> String {
    if f.fract() == 0.0 && f.abs() < 1e15 {
        format!("{}", f as i64)
    } else {
        let rounded = (f * 100.0).round() / 100.0;
        format!("{}", rounded)
    }
}

fn dedupe_columns(columns: Vec<String>) -> Vec<String> {
    let mut seen: Vec<String> = Vec::with_capacity(columns.len());
    for column in columns {
        let mut candidate = column.clone();
        let mut n = 2;
        while seen.contains(&candidate) {
            candidate = format!("{}_{}", column, n);
            n += 1;
        }
        seen.push(candidate);
    }
    seen
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn raw(rows: usize) -> QueryRows {
        QueryRows {
            columns: vec!["id".to_string(), "name".to_string()],
            rows: (0..rows)
                .map(|i| vec![json!(i), json!(format!("n{}", i))])
                .collect(),
        }
    }

    #[test]
    fn cap_is_enforced_and_flagged() {
        let result = ResultSet::from_query_rows(raw(15), 10);
        assert_eq!(result.row_count(), 10);
        assert!(result.truncated);
    }

    #[test]
    fn exactly_at_cap_is_reported_truncated() {
        let result = ResultSet::from_query_rows(raw(10), 10);
        assert_eq!(result.row_count(), 10);
        assert!(result.truncated);
    }

    #[test]
    fn below_cap_is_not_truncated() {
        let result = ResultSet::from_query_rows(raw(3), 10);
        assert!(!result.truncated);
        assert_eq!(result.rows[2]["name"], json!("n2"));
    }

    #[test]
    fn duplicate_columns_get_suffixes() {
        let result = ResultSet::from_query_rows(
            QueryRows {
                columns: vec!["name".into(), "name".into()],
                rows: vec![vec![json!("a"), json!("b")]],
            },
            10,
        );
        assert_eq!(result.columns, vec!["name", "name_2"]);
        assert_eq!(result.rows[0]["name_2"], json!("b"));
    }

    #[test]
    fn values_render_for_sentences() {
        assert_eq!(display_value(&json!(3)), "3");
        assert_eq!(display_value(&json!(3.0)), "3");
        assert_eq!(display_value(&json!(2.345)), "2.35");
        assert_eq!(display_value(&json!("x@y.com")), "x@y.com");
        assert_eq!(as_number(&json!("12.5")), Some(12.5));
        assert_eq!(as_number(&json!("abc")), None);
    }
}
