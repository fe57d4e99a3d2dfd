/// TableViews - Named Aggregate Views over Typed Tables
///
/// A view is a named query stored on a table: a target field, an optional
/// calculation (`stats` or `count`), an optional grouping column, and a list
/// of row filters. Creating a view validates it against the table schema and
/// derives the schema of its output. Querying a view streams the table's rows
/// through the filters into a single-pass aggregation.

pub mod column;
pub mod table;
pub mod calculation;
pub mod filter;
pub mod aggregate;
pub mod view;
pub mod store;
pub mod query;
pub mod service;
pub mod error;
pub mod config;

pub use column::{ColumnType, ColumnValue};
pub use table::{Row, Schema, TableMeta};
pub use calculation::{derive_schema, output_schema, Calculation};
pub use filter::{FilterOperator, Predicate};
pub use aggregate::{
    aggregate, AggregateResult, Aggregation, Cancellation, CountResult, GroupedResult, StatsResult,
};
pub use view::{View, ViewDefinition, ViewRegistry};
pub use store::{MemoryStore, RowStore, RowStream, TableMetadataStore};
pub use query::{AggregateRecord, QueryFacade, QueryOptions, QueryOutput};
pub use service::ViewService;
pub use error::{ErrorKind, Result, StoreError, ViewError};
pub use config::{RequestContext, ServerConfig};

// HTTP server modules - only when server feature is enabled
#[cfg(feature = "server")]
pub mod messages;
#[cfg(feature = "server")]
pub mod server;

#[cfg(test)]
mod integration_tests {
    use super::*;
    use std::collections::HashMap;
    use std::sync::Arc;

    fn row(price: Option<f64>, category: &str) -> HashMap<String, ColumnValue> {
        let mut values = HashMap::new();
        if let Some(price) = price {
            values.insert("Price".to_string(), ColumnValue::Number(price));
        }
        values.insert("Category".to_string(), ColumnValue::from(category));
        values
    }

    #[test]
    fn test_complete_workflow() {
        // Create a sales table
        let store = Arc::new(MemoryStore::new());
        store
            .create_table(
                "ta_sales",
                "sales",
                Schema::new(vec![
                    ("Price".to_string(), ColumnType::Number),
                    ("Category".to_string(), ColumnType::String),
                ]),
            )
            .unwrap();

        // Add data
        store.insert_row("ta_sales", row(Some(1000.0), "One")).unwrap();
        store.insert_row("ta_sales", row(Some(2000.0), "One")).unwrap();
        store.insert_row("ta_sales", row(Some(4000.0), "Two")).unwrap();

        let service = ViewService::new(Arc::clone(&store), Arc::clone(&store));
        let view = service
            .create_view("ta_sales", "TestView", "Price", Some("stats"), None, Vec::new())
            .unwrap();
        assert_eq!(
            view.schema.get_column_names(),
            vec!["sum", "min", "max", "count", "sumsqr", "avg", "field"]
        );

        // Ungrouped stats
        let output = service.query_view("ta_sales", "TestView", None, None).unwrap();
        let stats = output.records()[0].result.as_stats().unwrap();
        assert_eq!(stats.sum, 7000.0);
        assert_eq!(stats.min, 1000.0);
        assert_eq!(stats.max, 4000.0);
        assert_eq!(stats.count, 3);
        assert_eq!(stats.sumsqr, 21_000_000.0);
        assert!((stats.avg - 2333.333).abs() < 0.001);
        assert_eq!(stats.field, "Price");

        // Grouped on the fly
        let grouped = service
            .query_view("ta_sales", "TestView", Some("stats"), Some("Category"))
            .unwrap();
        let records = grouped.records();
        assert_eq!(records.len(), 2);
        assert_eq!(records[0].group.as_deref(), Some("One"));
        let one = records[0].result.as_stats().unwrap();
        assert_eq!((one.sum, one.count, one.min, one.max), (3000.0, 2, 1000.0, 2000.0));
        let two = records[1].result.as_stats().unwrap();
        assert_eq!((two.sum, two.count, two.min, two.max), (4000.0, 1, 4000.0, 4000.0));

        // Dropping the column hides the view without deleting it
        store.delete_column("ta_sales", "Price").unwrap();
        assert!(service.list_views("ta_sales").unwrap().is_empty());
        assert!(store.load_table("ta_sales").unwrap().view("TestView").is_some());

        // Deleting twice is fine
        service.delete_view("ta_sales", "TestView").unwrap();
        service.delete_view("ta_sales", "TestView").unwrap();
        assert!(matches!(
            service.query_view("ta_sales", "TestView", None, None),
            Err(ViewError::ViewNotFound { .. })
        ));
    }

    #[test]
    fn test_anomalous_rows_are_skipped_not_fatal() {
        let store = Arc::new(MemoryStore::new());
        store
            .create_table(
                "ta_sales",
                "sales",
                Schema::new(vec![
                    ("Price".to_string(), ColumnType::Number),
                    ("Category".to_string(), ColumnType::String),
                ]),
            )
            .unwrap();
        store.insert_row("ta_sales", row(Some(10.0), "A")).unwrap();
        store.insert_row("ta_sales", row(None, "A")).unwrap();
        let mut text = row(None, "B");
        text.insert("Price".to_string(), ColumnValue::from("n/a"));
        store.insert_row("ta_sales", text).unwrap();

        let service = ViewService::new(Arc::clone(&store), Arc::clone(&store));
        service
            .create_view("ta_sales", "Stats", "Price", Some("stats"), Some("Category"), Vec::new())
            .unwrap();
        let output = service.query_view("ta_sales", "Stats", None, None).unwrap();
        let records = output.records();

        // Group B exists but has nothing numeric to accumulate
        assert_eq!(records.len(), 2);
        assert_eq!(records[0].result.count(), 1);
        let b = records[1].result.as_stats().unwrap();
        assert_eq!((b.count, b.sum, b.avg), (0, 0.0, 0.0));

        // A count view counts every row regardless
        let counts = service
            .query_view("ta_sales", "Stats", Some("count"), None)
            .unwrap();
        assert_eq!(counts.len(), 2);
        assert_eq!(counts.records()[0].result.count(), 2);
    }

    #[test]
    fn test_views_can_be_serialized() {
        let store = Arc::new(MemoryStore::new());
        store
            .create_table(
                "ta_sales",
                "sales",
                Schema::new(vec![("Price".to_string(), ColumnType::Number)]),
            )
            .unwrap();
        let registry = ViewRegistry::new(Arc::clone(&store));
        let view = registry
            .create_or_replace(
                "ta_sales",
                ViewDefinition::new("Cheap", "Price")
                    .calculation("count")
                    .filter(Predicate::new("Price", FilterOperator::LessThan, 100.0)),
            )
            .unwrap();

        let json = serde_json::to_value(&view).unwrap();
        assert_eq!(json["calculation"], "count");
        assert_eq!(json["tableId"], "ta_sales");
        assert_eq!(json["filters"][0]["operator"], "LT");
        assert_eq!(json["schema"]["count"]["type"], "number");
        assert!(json.get("groupBy").is_none());
    }
}
