//! The four boundary operations over a pair of stores.

use crate::aggregate::Cancellation;
use crate::error::Result;
use crate::filter::Predicate;
use crate::query::{QueryFacade, QueryOptions, QueryOutput};
use crate::store::{RowStore, TableMetadataStore};
use crate::view::{View, ViewDefinition, ViewRegistry};
use std::sync::Arc;

/// Entry point for boundary layers: create, delete, list, and query views.
pub struct ViewService<R, M> {
    registry: ViewRegistry<M>,
    facade: QueryFacade<R, M>,
}

impl<R: RowStore, M: TableMetadataStore> ViewService<R, M> {
    pub fn new(rows: Arc<R>, metadata: Arc<M>) -> Self {
        ViewService {
            registry: ViewRegistry::new(Arc::clone(&metadata)),
            facade: QueryFacade::new(rows, metadata),
        }
    }

    pub fn registry(&self) -> &ViewRegistry<M> {
        &self.registry
    }

    /// Create or overwrite a view. Nothing is saved if validation fails.
    pub fn create_view(
        &self,
        table_id: &str,
        name: &str,
        field: &str,
        calculation: Option<&str>,
        group_by: Option<&str>,
        filters: Vec<Predicate>,
    ) -> Result<View> {
        let definition = ViewDefinition {
            name: name.to_string(),
            field: field.to_string(),
            calculation: calculation.map(str::to_string),
            group_by: group_by.map(str::to_string),
            filters,
        };
        self.registry.create_or_replace(table_id, definition)
    }

    /// Idempotent.
    pub fn delete_view(&self, table_id: &str, name: &str) -> Result<()> {
        self.registry.delete(table_id, name)
    }

    /// Views of the table that still reference existing columns.
    pub fn list_views(&self, table_id: &str) -> Result<Vec<View>> {
        self.registry.list_valid(table_id)
    }

    pub fn query_view(
        &self,
        table_id: &str,
        name: &str,
        calculation: Option<&str>,
        group_by: Option<&str>,
    ) -> Result<QueryOutput> {
        self.query_view_with_cancel(table_id, name, calculation, group_by, &Cancellation::new())
    }

    pub fn query_view_with_cancel(
        &self,
        table_id: &str,
        name: &str,
        calculation: Option<&str>,
        group_by: Option<&str>,
        cancel: &Cancellation,
    ) -> Result<QueryOutput> {
        let options = QueryOptions {
            calculation: calculation.map(str::to_string),
            group_by: group_by.map(str::to_string),
        };
        self.facade.query_with_cancel(table_id, name, &options, cancel)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::column::{ColumnType, ColumnValue};
    use crate::error::ViewError;
    use crate::filter::FilterOperator;
    use crate::store::MemoryStore;
    use crate::table::Schema;
    use std::collections::HashMap;

    fn service() -> (Arc<MemoryStore>, ViewService<MemoryStore, MemoryStore>) {
        let store = Arc::new(MemoryStore::new());
        store
            .create_table(
                "ta_orders",
                "orders",
                Schema::new(vec![
                    ("Amount".to_string(), ColumnType::Number),
                    ("Region".to_string(), ColumnType::String),
                ]),
            )
            .unwrap();
        for (amount, region) in [(10.0, "North"), (20.0, "South"), (30.0, "North"), (40.0, "East")] {
            let mut row = HashMap::new();
            row.insert("Amount".to_string(), ColumnValue::Number(amount));
            row.insert("Region".to_string(), ColumnValue::from(region));
            store.insert_row("ta_orders", row).unwrap();
        }
        let service = ViewService::new(Arc::clone(&store), Arc::clone(&store));
        (store, service)
    }

    #[test]
    fn test_create_and_query_count() {
        let (_, service) = service();
        let view = service
            .create_view("ta_orders", "ByRegion", "Amount", Some("count"), Some("Region"), Vec::new())
            .unwrap();
        assert_eq!(view.schema.get_column_names(), vec!["count"]);

        let output = service.query_view("ta_orders", "ByRegion", None, None).unwrap();
        let counts: Vec<_> = output
            .records()
            .iter()
            .map(|record| (record.group.as_deref().unwrap(), record.result.count()))
            .collect();
        assert_eq!(counts, vec![("North", 2), ("South", 1), ("East", 1)]);
    }

    #[test]
    fn test_create_with_filters_and_list() {
        let (_, service) = service();
        service
            .create_view(
                "ta_orders",
                "BigNorth",
                "Amount",
                Some("stats"),
                None,
                vec![
                    Predicate::new("Region", FilterOperator::Equals, "North"),
                    Predicate::new("Amount", FilterOperator::GreaterThan, 15.0),
                ],
            )
            .unwrap();

        let output = service.query_view("ta_orders", "BigNorth", None, None).unwrap();
        let stats = output.records()[0].result.as_stats().unwrap();
        assert_eq!((stats.sum, stats.count), (30.0, 1));

        let names: Vec<_> = service
            .list_views("ta_orders")
            .unwrap()
            .into_iter()
            .map(|view| view.name)
            .collect();
        assert_eq!(names, vec!["BigNorth"]);
    }

    #[test]
    fn test_failed_create_saves_nothing() {
        let (_, service) = service();
        let err = service
            .create_view("ta_orders", "Bad", "Amount", Some("stats"), Some("Country"), Vec::new())
            .unwrap_err();
        assert!(matches!(err, ViewError::UnknownGroupField { .. }));
        assert!(service.list_views("ta_orders").unwrap().is_empty());
    }

    #[test]
    fn test_delete_view_twice() {
        let (_, service) = service();
        service
            .create_view("ta_orders", "Totals", "Amount", Some("stats"), None, Vec::new())
            .unwrap();
        service.delete_view("ta_orders", "Totals").unwrap();
        service.delete_view("ta_orders", "Totals").unwrap();
        assert!(matches!(
            service.query_view("ta_orders", "Totals", None, None),
            Err(ViewError::ViewNotFound { .. })
        ));
    }

    #[test]
    fn test_query_with_cancel() {
        let (_, service) = service();
        service
            .create_view("ta_orders", "Totals", "Amount", Some("stats"), None, Vec::new())
            .unwrap();
        let cancel = Cancellation::new();
        cancel.cancel();
        assert_eq!(
            service.query_view_with_cancel("ta_orders", "Totals", None, None, &cancel),
            Err(ViewError::Cancelled)
        );
    }

    #[test]
    fn test_soft_invalidated_view_still_queries() {
        let (store, service) = service();
        service
            .create_view("ta_orders", "Totals", "Amount", Some("stats"), None, Vec::new())
            .unwrap();
        store.delete_column("ta_orders", "Amount").unwrap();

        assert!(service.list_views("ta_orders").unwrap().is_empty());
        let output = service.query_view("ta_orders", "Totals", None, None).unwrap();
        let stats = output.records()[0].result.as_stats().unwrap();
        assert_eq!((stats.count, stats.min, stats.max, stats.avg), (0, 0.0, 0.0, 0.0));
    }
}
