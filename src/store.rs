//! Collaborator interfaces and an in-memory implementation.
//!
//! The view engine only ever talks to two seams:
//! - [`RowStore`]: read-only access to a table's rows and column schema
//! - [`TableMetadataStore`]: the sole persistence boundary for views
//!
//! [`MemoryStore`] implements both. It backs the tests, the benchmarks and
//! the HTTP server, and also carries the table/column/row operations that
//! sit outside the view engine proper.

use crate::column::{ColumnType, ColumnValue};
use crate::error::StoreError;
use crate::table::{Row, Schema, TableMeta};
use crate::view::View;
use std::collections::{BTreeMap, HashMap};
use std::sync::{Mutex, MutexGuard, PoisonError};

/// Lazy row sequence handed out by a Row Store.
///
/// Items are fallible so a backend can surface a failure mid-stream.
pub type RowStream = Box<dyn Iterator<Item = Result<Row, StoreError>> + Send>;

/// Read-only source of rows and table schemas.
pub trait RowStore: Send + Sync {
    fn fetch_rows(&self, table_id: &str) -> Result<RowStream, StoreError>;

    fn fetch_table_schema(&self, table_id: &str) -> Result<Schema, StoreError>;
}

/// Persistence boundary for table metadata and view definitions.
pub trait TableMetadataStore: Send + Sync {
    fn load_table(&self, table_id: &str) -> Result<TableMeta, StoreError>;

    /// Insert or overwrite the view under its name.
    fn save_view(&self, table_id: &str, view: &View) -> Result<(), StoreError>;

    /// Remove a view. Missing views are not an error.
    fn delete_view(&self, table_id: &str, name: &str) -> Result<(), StoreError>;

    /// Ids of every table, in ascending order.
    fn table_ids(&self) -> Result<Vec<String>, StoreError>;
}

struct TableEntry {
    meta: TableMeta,
    rows: Vec<Row>,
}

#[derive(Default)]
struct Inner {
    tables: BTreeMap<String, TableEntry>,
    next_row_id: u64,
}

/// Thread-safe in-memory table, row and view storage.
#[derive(Default)]
pub struct MemoryStore {
    inner: Mutex<Inner>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> MutexGuard<'_, Inner> {
        // Every write replaces whole values, so a poisoned guard is still consistent
        self.inner.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn with_table<T>(
        &self,
        table_id: &str,
        f: impl FnOnce(&mut TableEntry) -> Result<T, StoreError>,
    ) -> Result<T, StoreError> {
        let mut inner = self.lock();
        let entry = inner
            .tables
            .get_mut(table_id)
            .ok_or_else(|| StoreError::TableNotFound(table_id.to_string()))?;
        f(entry)
    }

    // ==================== Tables and columns ====================

    pub fn create_table(&self, table_id: &str, name: &str, schema: Schema) -> Result<(), StoreError> {
        let mut inner = self.lock();
        if inner.tables.contains_key(table_id) {
            return Err(StoreError::TableExists(table_id.to_string()));
        }
        inner.tables.insert(
            table_id.to_string(),
            TableEntry {
                meta: TableMeta::new(table_id, name, schema),
                rows: Vec::new(),
            },
        );
        log::info!("created table '{}'", table_id);
        Ok(())
    }

    /// Drop a table together with its rows and views.
    pub fn delete_table(&self, table_id: &str) -> Result<(), StoreError> {
        let removed = self.lock().tables.remove(table_id);
        match removed {
            Some(entry) => {
                log::info!(
                    "deleted table '{}' ({} rows, {} views)",
                    table_id,
                    entry.rows.len(),
                    entry.meta.views.len()
                );
                Ok(())
            }
            None => Err(StoreError::TableNotFound(table_id.to_string())),
        }
    }

    pub fn add_column(&self, table_id: &str, column: &str, column_type: ColumnType) -> Result<(), StoreError> {
        self.with_table(table_id, |entry| {
            if entry.meta.schema.add_column(column, column_type) {
                Ok(())
            } else {
                Err(StoreError::ColumnExists {
                    table_id: table_id.to_string(),
                    column: column.to_string(),
                })
            }
        })
    }

    /// Remove a column from the schema and from every row.
    ///
    /// Views that reference the column are kept as they are.
    pub fn delete_column(&self, table_id: &str, column: &str) -> Result<(), StoreError> {
        self.with_table(table_id, |entry| {
            if entry.meta.schema.remove_column(column).is_none() {
                return Err(StoreError::ColumnNotFound {
                    table_id: table_id.to_string(),
                    column: column.to_string(),
                });
            }
            for row in &mut entry.rows {
                row.remove(column);
            }
            Ok(())
        })
    }

    // ==================== Rows ====================

    /// Append a row and return it with its assigned id.
    pub fn insert_row(&self, table_id: &str, values: HashMap<String, ColumnValue>) -> Result<Row, StoreError> {
        let mut inner = self.lock();
        inner.next_row_id += 1;
        let row_id = format!("ro_{}_{}", table_id, inner.next_row_id);
        let entry = inner
            .tables
            .get_mut(table_id)
            .ok_or_else(|| StoreError::TableNotFound(table_id.to_string()))?;

        let row = Row {
            id: row_id,
            table_id: table_id.to_string(),
            values: values.into_iter().collect(),
        };
        entry.rows.push(row.clone());
        Ok(row)
    }

    /// Merge new values into an existing row.
    pub fn update_row(
        &self,
        table_id: &str,
        row_id: &str,
        values: HashMap<String, ColumnValue>,
    ) -> Result<Row, StoreError> {
        self.with_table(table_id, |entry| {
            let row = entry
                .rows
                .iter_mut()
                .find(|row| row.id == row_id)
                .ok_or_else(|| StoreError::RowNotFound {
                    table_id: table_id.to_string(),
                    row_id: row_id.to_string(),
                })?;
            row.values.extend(values);
            Ok(row.clone())
        })
    }

    pub fn delete_row(&self, table_id: &str, row_id: &str) -> Result<Row, StoreError> {
        self.with_table(table_id, |entry| {
            let index = entry
                .rows
                .iter()
                .position(|row| row.id == row_id)
                .ok_or_else(|| StoreError::RowNotFound {
                    table_id: table_id.to_string(),
                    row_id: row_id.to_string(),
                })?;
            Ok(entry.rows.remove(index))
        })
    }

    pub fn row_count(&self, table_id: &str) -> Result<usize, StoreError> {
        self.with_table(table_id, |entry| Ok(entry.rows.len()))
    }
}

impl RowStore for MemoryStore {
    /// Snapshot of the table's rows at call time.
    fn fetch_rows(&self, table_id: &str) -> Result<RowStream, StoreError> {
        let rows = self.with_table(table_id, |entry| Ok(entry.rows.clone()))?;
        Ok(Box::new(rows.into_iter().map(Ok)))
    }

    fn fetch_table_schema(&self, table_id: &str) -> Result<Schema, StoreError> {
        self.with_table(table_id, |entry| Ok(entry.meta.schema.clone()))
    }
}

impl TableMetadataStore for MemoryStore {
    fn load_table(&self, table_id: &str) -> Result<TableMeta, StoreError> {
        self.with_table(table_id, |entry| Ok(entry.meta.clone()))
    }

    fn save_view(&self, table_id: &str, view: &View) -> Result<(), StoreError> {
        self.with_table(table_id, |entry| {
            entry.meta.views.insert(view.name.clone(), view.clone());
            Ok(())
        })
    }

    fn delete_view(&self, table_id: &str, name: &str) -> Result<(), StoreError> {
        self.with_table(table_id, |entry| {
            entry.meta.views.remove(name);
            Ok(())
        })
    }

    fn table_ids(&self) -> Result<Vec<String>, StoreError> {
        Ok(self.lock().tables.keys().cloned().collect())
    }
}
