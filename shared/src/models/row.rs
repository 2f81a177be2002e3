//! Result rows returned by a query source.
//!
//! Query results are heterogeneous: the source infers column types on its side and
//! a single table can mix strings, numbers and nested documents. Rows are therefore
//! modeled as ordered lists of tagged [`Cell`] values plus a [`ColumnIndex`] that
//! maps column names to positions for one result set.

use serde::{Deserialize, Serialize};
use std::collections::HashMap;

/// A single cell value in a result row.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum Cell {
    /// Missing value.
    Null,
    /// Boolean value.
    Bool(bool),
    /// Numeric value, kept in its original JSON representation.
    Number(serde_json::Number),
    /// String value.
    String(String),
    /// Arrays and objects.
    Nested(serde_json::Value),
}

impl Cell {
    /// Renders the cell as plain text.
    ///
    /// `Null` renders as the empty string and nested values as compact JSON.
    ///
    /// # Example
    ///
    /// ```
    /// use shared::models::Cell;
    ///
    /// assert_eq!(Cell::Null.as_text(), "");
    /// assert_eq!(Cell::from(serde_json::json!(42)).as_text(), "42");
    /// assert_eq!(Cell::from(serde_json::json!({"a": 1})).as_text(), r#"{"a":1}"#);
    /// ```
    #[must_use]
    pub fn as_text(&self) -> String {
        match self {
            Self::Null => String::new(),
            Self::Bool(b) => b.to_string(),
            Self::Number(n) => n.to_string(),
            Self::String(s) => s.clone(),
            Self::Nested(v) => v.to_string(),
        }
    }

    /// Returns true if the cell holds no value.
    #[must_use]
    pub fn is_null(&self) -> bool {
        matches!(self, Self::Null)
    }

    /// Converts the cell back into a JSON value.
    #[must_use]
    pub fn to_json(&self) -> serde_json::Value {
        match self {
            Self::Null => serde_json::Value::Null,
            Self::Bool(b) => serde_json::Value::Bool(*b),
            Self::Number(n) => serde_json::Value::Number(n.clone()),
            Self::String(s) => serde_json::Value::String(s.clone()),
            Self::Nested(v) => v.clone(),
        }
    }
}

impl From<serde_json::Value> for Cell {
    fn from(value: serde_json::Value) -> Self {
        match value {
            serde_json::Value::Null => Self::Null,
            serde_json::Value::Bool(b) => Self::Bool(b),
            serde_json::Value::Number(n) => Self::Number(n),
            serde_json::Value::String(s) => Self::String(s),
            nested @ (serde_json::Value::Array(_) | serde_json::Value::Object(_)) => {
                Self::Nested(nested)
            }
        }
    }
}

impl From<&str> for Cell {
    fn from(value: &str) -> Self {
        Self::String(value.to_string())
    }
}

impl From<String> for Cell {
    fn from(value: String) -> Self {
        Self::String(value)
    }
}

/// A result row: cells in column order.
pub type Row = Vec<Cell>;

/// Column descriptor as reported by the query source.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Column {
    /// Column name.
    pub name: String,

    /// Source-side type name (e.g. `datetime`, `string`, `dynamic`).
    #[serde(rename = "type", default)]
    pub column_type: String,
}

impl Column {
    /// Creates a new column descriptor.
    #[must_use]
    pub fn new(name: impl Into<String>, column_type: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            column_type: column_type.into(),
        }
    }
}

/// One table of a query response.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ResultTable {
    /// Table name assigned by the source (usually `PrimaryResult`).
    #[serde(default)]
    pub name: String,

    /// Column descriptors in row order.
    #[serde(default)]
    pub columns: Vec<Column>,

    /// Rows, each with one cell per column.
    #[serde(default)]
    pub rows: Vec<Row>,
}

impl ResultTable {
    /// Creates an empty result table with the given columns.
    #[must_use]
    pub fn new(columns: Vec<Column>) -> Self {
        Self {
            name: "PrimaryResult".to_string(),
            columns,
            rows: Vec::new(),
        }
    }

    /// Appends a row.
    #[must_use]
    pub fn with_row(mut self, row: Row) -> Self {
        self.rows.push(row);
        self
    }

    /// Builds the name to position mapping for this table.
    #[must_use]
    pub fn column_index(&self) -> ColumnIndex {
        ColumnIndex::new(self.columns.iter().map(|c| c.name.clone()))
    }
}

/// Stable name to position mapping for the columns of one result set.
///
/// When a name appears more than once the first position wins.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ColumnIndex {
    names: Vec<String>,
    positions: HashMap<String, usize>,
}

impl ColumnIndex {
    /// Builds an index from column names in row order.
    pub fn new(names: impl IntoIterator<Item = String>) -> Self {
        let names: Vec<String> = names.into_iter().collect();
        let mut positions = HashMap::with_capacity(names.len());
        for (i, name) in names.iter().enumerate() {
            positions.entry(name.clone()).or_insert(i);
        }
        Self { names, positions }
    }

    /// Returns the position of the named column.
    #[must_use]
    pub fn position(&self, name: &str) -> Option<usize> {
        self.positions.get(name).copied()
    }

    /// Returns the column names in row order.
    #[must_use]
    pub fn names(&self) -> &[String] {
        &self.names
    }

    /// Returns the number of columns.
    #[must_use]
    pub fn len(&self) -> usize {
        self.names.len()
    }

    /// Returns true if there are no columns.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.names.is_empty()
    }

    /// Serializes a row as a JSON object keyed by column name.
    ///
    /// Keys are emitted in sorted order so the output does not depend on how the
    /// source ordered its columns. Cells beyond the known columns are dropped and
    /// missing trailing cells are omitted.
    #[must_use]
    pub fn row_to_json(&self, row: &[Cell]) -> serde_json::Value {
        let mut object = std::collections::BTreeMap::new();
        for (name, cell) in self.names.iter().zip(row) {
            object.insert(name.as_str(), cell.to_json());
        }
        serde_json::Value::Object(
            object
                .into_iter()
                .map(|(k, v)| (k.to_string(), v))
                .collect(),
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_cell_deserializes_every_variant() {
        let cells: Vec<Cell> =
            serde_json::from_value(json!([null, true, 1.5, "text", [1, 2], {"k": "v"}])).unwrap();

        assert_eq!(cells[0], Cell::Null);
        assert_eq!(cells[1], Cell::Bool(true));
        assert!(matches!(cells[2], Cell::Number(_)));
        assert_eq!(cells[3], Cell::String("text".to_string()));
        assert_eq!(cells[4], Cell::Nested(json!([1, 2])));
        assert_eq!(cells[5], Cell::Nested(json!({"k": "v"})));
    }

    #[test]
    fn test_cell_as_text() {
        assert_eq!(Cell::Bool(false).as_text(), "false");
        assert_eq!(Cell::from("hello").as_text(), "hello");
        assert_eq!(Cell::from(json!(3)).as_text(), "3");
        assert_eq!(Cell::from(json!(["a"])).as_text(), r#"["a"]"#);
    }

    #[test]
    fn test_column_index_position() {
        let index = ColumnIndex::new(vec!["TimeGenerated".to_string(), "PodName".to_string()]);

        assert_eq!(index.position("TimeGenerated"), Some(0));
        assert_eq!(index.position("PodName"), Some(1));
        assert_eq!(index.position("Missing"), None);
        assert_eq!(index.len(), 2);
    }

    #[test]
    fn test_column_index_duplicate_names_keep_first() {
        let index = ColumnIndex::new(vec!["a".to_string(), "b".to_string(), "a".to_string()]);
        assert_eq!(index.position("a"), Some(0));
    }

    #[test]
    fn test_row_to_json_sorted_keys() {
        let index = ColumnIndex::new(vec!["b".to_string(), "a".to_string()]);
        let row = vec![Cell::from("second"), Cell::Null];

        let text = serde_json::to_string(&index.row_to_json(&row)).unwrap();

        assert_eq!(text, r#"{"a":null,"b":"second"}"#);
    }

    #[test]
    fn test_row_to_json_short_row() {
        let index = ColumnIndex::new(vec!["a".to_string(), "b".to_string()]);
        let value = index.row_to_json(&[Cell::from("only")]);
        assert_eq!(value, json!({"a": "only"}));
    }

    #[test]
    fn test_result_table_deserialization() {
        let table: ResultTable = serde_json::from_value(json!({
            "name": "PrimaryResult",
            "columns": [{"name": "TimeGenerated", "type": "datetime"}],
            "rows": [["2024-01-01T00:00:00Z"]]
        }))
        .unwrap();

        assert_eq!(table.columns[0].column_type, "datetime");
        assert_eq!(table.rows.len(), 1);
        assert_eq!(table.column_index().position("TimeGenerated"), Some(0));
    }
}
