//! View definitions and the registry that stores them against tables.
//!
//! A view is a named, read-mostly projection of a table's rows: a target
//! field, an optional calculation, an optional group-by column, and filters.
//! Its output schema is always derived, never edited by hand.
//!
//! Views survive schema changes. When a column a view depends on is deleted,
//! the view stays in storage but is left out of listings until someone
//! removes or redefines it.

use crate::calculation::{self, Calculation};
use crate::error::{Result, ViewError};
use crate::filter::Predicate;
use crate::store::TableMetadataStore;
use crate::table::{Schema, TableMeta};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::sync::{Arc, Mutex, PoisonError};

/// A stored view.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct View {
    pub name: String,
    pub field: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub calculation: Option<Calculation>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub group_by: Option<String>,
    pub filters: Vec<Predicate>,
    pub schema: Schema,
    pub table_id: String,
}

impl View {
    /// True while `field` and `group_by` still name columns of the table.
    pub fn is_valid(&self, table_schema: &Schema) -> bool {
        table_schema.contains(&self.field)
            && self
                .group_by
                .as_deref()
                .map_or(true, |group| table_schema.contains(group))
    }
}

/// What a caller submits to create or replace a view.
#[derive(Debug, Clone, PartialEq, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ViewDefinition {
    pub name: String,
    pub field: String,
    #[serde(default)]
    pub calculation: Option<String>,
    #[serde(default)]
    pub group_by: Option<String>,
    #[serde(default)]
    pub filters: Vec<Predicate>,
}

impl ViewDefinition {
    pub fn new(name: impl Into<String>, field: impl Into<String>) -> Self {
        ViewDefinition {
            name: name.into(),
            field: field.into(),
            ..Default::default()
        }
    }

    pub fn calculation(mut self, kind: impl Into<String>) -> Self {
        self.calculation = Some(kind.into());
        self
    }

    pub fn group_by(mut self, column: impl Into<String>) -> Self {
        self.group_by = Some(column.into());
        self
    }

    pub fn filter(mut self, predicate: Predicate) -> Self {
        self.filters.push(predicate);
        self
    }

    /// Check the definition against a table and build the view.
    ///
    /// Runs entirely before persistence, so a rejected definition leaves
    /// stored state untouched.
    pub fn validate(self, table: &TableMeta) -> Result<View> {
        if self.name.trim().is_empty() {
            return Err(ViewError::InvalidViewName(self.name));
        }

        let calculation = Calculation::parse_kind(self.calculation.as_deref())?;

        let field_type = table
            .schema
            .get_column_type(&self.field)
            .ok_or_else(|| ViewError::UnknownField {
                table_id: table.id.clone(),
                field: self.field.clone(),
            })?;
        if calculation.map_or(false, |c| c.requires_numeric_field()) && !field_type.is_numeric() {
            return Err(ViewError::NonNumericField {
                table_id: table.id.clone(),
                field: self.field,
            });
        }

        if let Some(group) = self.group_by.as_deref() {
            if !table.schema.contains(group) {
                return Err(ViewError::UnknownGroupField {
                    table_id: table.id.clone(),
                    field: group.to_string(),
                });
            }
        }

        Ok(View {
            schema: calculation::output_schema(calculation, &table.schema),
            name: self.name,
            field: self.field,
            calculation,
            group_by: self.group_by,
            filters: self.filters,
            table_id: table.id.clone(),
        })
    }
}

/// Owns view definitions on top of a Table Metadata Store.
///
/// Mutations on one table are serialized (load, validate, write) so two
/// racing create/delete calls cannot lose each other's update. Reads and
/// mutations on different tables never wait on each other.
pub struct ViewRegistry<M> {
    store: Arc<M>,
    table_locks: Mutex<HashMap<String, Arc<Mutex<()>>>>,
}

impl<M: TableMetadataStore> ViewRegistry<M> {
    pub fn new(store: Arc<M>) -> Self {
        ViewRegistry {
            store,
            table_locks: Mutex::new(HashMap::new()),
        }
    }

    pub fn store(&self) -> &Arc<M> {
        &self.store
    }

    /// Run `op` while holding the table's mutation lock. The lock entry is
    /// dropped again once no other caller holds or waits on it.
    fn with_table_lock<T>(&self, table_id: &str, op: impl FnOnce() -> Result<T>) -> Result<T> {
        let lock = {
            let mut locks = self.table_locks.lock().unwrap_or_else(PoisonError::into_inner);
            Arc::clone(locks.entry(table_id.to_string()).or_default())
        };
        let result = {
            let _guard = lock.lock().unwrap_or_else(PoisonError::into_inner);
            op()
        };

        // Handles are only cloned under the map lock, so the count is stable here
        let mut locks = self.table_locks.lock().unwrap_or_else(PoisonError::into_inner);
        if Arc::strong_count(&lock) == 2 {
            locks.remove(table_id);
        }
        result
    }

    #[cfg(test)]
    fn lock_count(&self) -> usize {
        self.table_locks.lock().unwrap_or_else(PoisonError::into_inner).len()
    }

    /// Validate, derive the schema, and persist a view, overwriting any
    /// existing view of the same name.
    pub fn create_or_replace(&self, table_id: &str, definition: ViewDefinition) -> Result<View> {
        self.with_table_lock(table_id, || {
            let table = self.store.load_table(table_id)?;
            let replacing = table.views.contains_key(&definition.name);
            let view = definition.validate(&table)?;
            self.store.save_view(table_id, &view)?;

            log::info!(
                "View {} saved successfully on table '{}'{}",
                view.name,
                table_id,
                if replacing { " (replaced)" } else { "" }
            );
            Ok(view)
        })
    }

    /// Remove a view. Removing a view that does not exist succeeds.
    pub fn delete(&self, table_id: &str, name: &str) -> Result<()> {
        self.with_table_lock(table_id, || {
            self.store.delete_view(table_id, name)?;
            log::info!("View {} deleted from table '{}'", name, table_id);
            Ok(())
        })
    }

    /// Fetch one stored view, valid or not.
    pub fn get(&self, table_id: &str, name: &str) -> Result<View> {
        let table = self.store.load_table(table_id)?;
        table
            .views
            .get(name)
            .cloned()
            .ok_or_else(|| ViewError::ViewNotFound {
                table_id: table_id.to_string(),
                name: name.to_string(),
            })
    }

    /// Views of a table whose columns still exist, ordered by name.
    pub fn list_valid(&self, table_id: &str) -> Result<Vec<View>> {
        let table = self.store.load_table(table_id)?;
        Ok(valid_views(table))
    }

    /// Valid views across every table, grouped by table id order.
    pub fn list_all_valid(&self) -> Result<Vec<View>> {
        let mut views = Vec::new();
        for table_id in self.store.table_ids()? {
            views.extend(valid_views(self.store.load_table(&table_id)?));
        }
        Ok(views)
    }

    /// Find a view by name alone, searching tables in id order.
    pub fn locate(&self, name: &str) -> Result<View> {
        for table_id in self.store.table_ids()? {
            let table = self.store.load_table(&table_id)?;
            if let Some(view) = table.views.get(name) {
                return Ok(view.clone());
            }
        }
        Err(ViewError::ViewNotFound {
            table_id: String::new(),
            name: name.to_string(),
        })
    }
}

fn valid_views(table: TableMeta) -> Vec<View> {
    let TableMeta { id, schema, views, .. } = table;
    views
        .into_values()
        .filter(|view| {
            let valid = view.is_valid(&schema);
            if !valid {
                log::debug!("view '{}' on table '{}' references a missing column, hidden", view.name, id);
            }
            valid
        })
        .collect()
}
