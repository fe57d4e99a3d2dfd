//! Tables, their schemas, and rows.
//!
//! A `TableMeta` is what the Table Metadata Store persists: the ordered
//! column schema plus the views defined against the table. Rows live in the
//! Row Store and refer back to their table by id.
//!
//! # Examples
//!
//! ```
//! use tableviews::{ColumnType, ColumnValue, Row, Schema};
//!
//! let schema = Schema::new(vec![
//!     ("Price".to_string(), ColumnType::Number),
//!     ("Category".to_string(), ColumnType::String),
//! ]);
//! assert_eq!(schema.get_column_index("Category"), Some(1));
//!
//! let row = Row::new("ro_1", "ta_sales")
//!     .with("Price", 1000.0)
//!     .with("Category", "One");
//! assert_eq!(row.get("Price").and_then(ColumnValue::as_number), Some(1000.0));
//! ```

use crate::column::{ColumnType, ColumnValue};
use crate::view::View;
use serde::de::{MapAccess, Visitor};
use serde::ser::SerializeMap;
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use std::collections::BTreeMap;
use std::fmt;

/// Ordered column definitions (name, type).
///
/// Serialized as `{ "<name>": { "type": "<type>" } }`, keeping column order.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct Schema {
    columns: Vec<(String, ColumnType)>,
}

impl Schema {
    /// Creates a new schema with the specified columns, in order.
    pub fn new(columns: Vec<(String, ColumnType)>) -> Self {
        Schema { columns }
    }

    /// Returns the number of columns in the schema.
    pub fn len(&self) -> usize {
        self.columns.len()
    }

    /// Returns true if the schema has no columns.
    pub fn is_empty(&self) -> bool {
        self.columns.is_empty()
    }

    /// Returns a list of all column names.
    pub fn get_column_names(&self) -> Vec<&str> {
        self.columns.iter().map(|(name, _)| name.as_str()).collect()
    }

    /// Returns the index of a column by name, or None if not found.
    pub fn get_column_index(&self, name: &str) -> Option<usize> {
        self.columns.iter().position(|(n, _)| n == name)
    }

    /// Returns (name, type) of the column at the given index.
    pub fn get_column_info(&self, index: usize) -> Option<(&str, ColumnType)> {
        self.columns.get(index).map(|(name, ty)| (name.as_str(), *ty))
    }

    /// Returns the type of a column by name, or None if not found.
    pub fn get_column_type(&self, name: &str) -> Option<ColumnType> {
        self.columns
            .iter()
            .find(|(n, _)| n == name)
            .map(|(_, ty)| *ty)
    }

    pub fn contains(&self, name: &str) -> bool {
        self.get_column_index(name).is_some()
    }

    /// Appends a column. Returns false if the name is already taken.
    pub fn add_column(&mut self, name: impl Into<String>, column_type: ColumnType) -> bool {
        let name = name.into();
        if self.contains(&name) {
            return false;
        }
        self.columns.push((name, column_type));
        true
    }

    /// Removes a column, returning its type if it existed.
    pub fn remove_column(&mut self, name: &str) -> Option<ColumnType> {
        let index = self.get_column_index(name)?;
        Some(self.columns.remove(index).1)
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, ColumnType)> {
        self.columns.iter().map(|(name, ty)| (name.as_str(), *ty))
    }
}

#[derive(Serialize, Deserialize)]
struct ColumnSpec {
    #[serde(rename = "type")]
    column_type: ColumnType,
}

impl Serialize for Schema {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        let mut map = serializer.serialize_map(Some(self.columns.len()))?;
        for (name, column_type) in &self.columns {
            map.serialize_entry(name, &ColumnSpec { column_type: *column_type })?;
        }
        map.end()
    }
}

struct SchemaVisitor;

impl<'de> Visitor<'de> for SchemaVisitor {
    type Value = Schema;

    fn expecting(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("a map of column name to { \"type\": ... }")
    }

    fn visit_map<A: MapAccess<'de>>(self, mut access: A) -> Result<Schema, A::Error> {
        let mut schema = Schema::default();
        while let Some((name, entry)) = access.next_entry::<String, ColumnSpec>()? {
            if !schema.add_column(name.clone(), entry.column_type) {
                return Err(serde::de::Error::custom(format!("duplicate column '{}'", name)));
            }
        }
        Ok(schema)
    }
}

impl<'de> Deserialize<'de> for Schema {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        deserializer.deserialize_map(SchemaVisitor)
    }
}

/// Table metadata: identity, schema and the views that belong to it.
///
/// Views are keyed by name; a table owns its views and they go away with it.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct TableMeta {
    #[serde(rename = "_id")]
    pub id: String,
    pub name: String,
    pub schema: Schema,
    pub views: BTreeMap<String, View>,
}

impl TableMeta {
    pub fn new(id: impl Into<String>, name: impl Into<String>, schema: Schema) -> Self {
        TableMeta {
            id: id.into(),
            name: name.into(),
            schema,
            views: BTreeMap::new(),
        }
    }

    pub fn view(&self, name: &str) -> Option<&View> {
        self.views.get(name)
    }
}

static NULL_VALUE: ColumnValue = ColumnValue::Null;

/// A single row: id, owning table, and column values.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Row {
    #[serde(rename = "_id")]
    pub id: String,
    #[serde(rename = "tableId")]
    pub table_id: String,
    #[serde(flatten)]
    pub values: BTreeMap<String, ColumnValue>,
}

impl Row {
    pub fn new(id: impl Into<String>, table_id: impl Into<String>) -> Self {
        Row {
            id: id.into(),
            table_id: table_id.into(),
            values: BTreeMap::new(),
        }
    }

    /// Builder-style setter, handy for tests and seeding.
    pub fn with(mut self, column: impl Into<String>, value: impl Into<ColumnValue>) -> Self {
        self.values.insert(column.into(), value.into());
        self
    }

    /// Returns the value of a column; `None` when the key is absent.
    pub fn get(&self, column: &str) -> Option<&ColumnValue> {
        self.values.get(column)
    }

    /// Returns the value of a column, mapping an absent key to `Null`.
    pub fn value(&self, column: &str) -> &ColumnValue {
        self.values.get(column).unwrap_or(&NULL_VALUE)
    }

    pub fn set(&mut self, column: impl Into<String>, value: ColumnValue) {
        self.values.insert(column.into(), value);
    }

    pub fn remove(&mut self, column: &str) -> Option<ColumnValue> {
        self.values.remove(column)
    }
}
