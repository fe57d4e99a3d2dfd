//! Query execution for stored views: rows → filter → aggregate.

use crate::aggregate::{self, AggregateResult, Aggregation, Cancellation};
use crate::calculation::Calculation;
use crate::error::{Result, ViewError};
use crate::filter;
use crate::store::{RowStore, RowStream, TableMetadataStore};
use crate::table::Row;
use serde::Serialize;
use std::sync::Arc;

/// Per-query overrides of a view's stored definition.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct QueryOptions {
    /// Calculation kind to use instead of the stored one (`"stats"`, `"count"`)
    pub calculation: Option<String>,
    /// Column to group by instead of the stored `groupBy`
    pub group_by: Option<String>,
}

impl QueryOptions {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn calculation(mut self, kind: impl Into<String>) -> Self {
        self.calculation = Some(kind.into());
        self
    }

    pub fn group_by(mut self, column: impl Into<String>) -> Self {
        self.group_by = Some(column.into());
        self
    }
}

/// One output record of an aggregate query.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct AggregateRecord {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub group: Option<String>,
    #[serde(flatten)]
    pub result: AggregateResult,
}

/// Result set of a view query.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(untagged)]
pub enum QueryOutput {
    /// One record when ungrouped, one per group key otherwise
    Records(Vec<AggregateRecord>),
    /// Filtered rows of a plain view
    Rows(Vec<Row>),
}

impl QueryOutput {
    pub fn len(&self) -> usize {
        match self {
            QueryOutput::Records(records) => records.len(),
            QueryOutput::Rows(rows) => rows.len(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn records(&self) -> &[AggregateRecord] {
        match self {
            QueryOutput::Records(records) => records,
            QueryOutput::Rows(_) => &[],
        }
    }

    pub fn rows(&self) -> &[Row] {
        match self {
            QueryOutput::Rows(rows) => rows,
            QueryOutput::Records(_) => &[],
        }
    }
}

impl From<Aggregation> for QueryOutput {
    fn from(aggregation: Aggregation) -> Self {
        match aggregation {
            Aggregation::Single(result) => QueryOutput::Records(vec![AggregateRecord { group: None, result }]),
            Aggregation::Grouped(groups) => QueryOutput::Records(
                groups
                    .into_iter()
                    .map(|(key, result)| AggregateRecord {
                        group: Some(key),
                        result,
                    })
                    .collect(),
            ),
            Aggregation::Rows(rows) => QueryOutput::Rows(rows),
        }
    }
}

/// Raw store stream as seen by the filter. Stops at the first store error
/// or at cancellation and remembers why for the caller.
struct TrappedRows<'a> {
    stream: RowStream,
    cancel: &'a Cancellation,
    seen: usize,
    error: &'a mut Option<ViewError>,
}

impl Iterator for TrappedRows<'_> {
    type Item = Row;

    fn next(&mut self) -> Option<Row> {
        // Counted before filtering so selective filters still observe cancellation
        if let Err(err) = self.cancel.check(self.seen) {
            *self.error = Some(err);
            return None;
        }
        self.seen += 1;
        match self.stream.next()? {
            Ok(row) => Some(row),
            Err(err) => {
                *self.error = Some(err.into());
                None
            }
        }
    }
}

/// Runs view queries against a Row Store and a Table Metadata Store.
pub struct QueryFacade<R, M> {
    rows: Arc<R>,
    metadata: Arc<M>,
}

impl<R: RowStore, M: TableMetadataStore> QueryFacade<R, M> {
    pub fn new(rows: Arc<R>, metadata: Arc<M>) -> Self {
        QueryFacade { rows, metadata }
    }

    /// Query a view with no cancellation.
    pub fn query(&self, table_id: &str, view_name: &str, options: &QueryOptions) -> Result<QueryOutput> {
        self.query_with_cancel(table_id, view_name, options, &Cancellation::new())
    }

    /// Resolve the view, apply its filters, and aggregate with the effective
    /// calculation and grouping. Overrides apply to this query only.
    pub fn query_with_cancel(
        &self,
        table_id: &str,
        view_name: &str,
        options: &QueryOptions,
        cancel: &Cancellation,
    ) -> Result<QueryOutput> {
        let table = self.metadata.load_table(table_id)?;
        let view = table.view(view_name).ok_or_else(|| ViewError::ViewNotFound {
            table_id: table_id.to_string(),
            name: view_name.to_string(),
        })?;

        let calculation = match options.calculation.as_deref() {
            Some(kind) => Calculation::parse_kind(Some(kind))?,
            None => view.calculation,
        };
        let group_by = options.group_by.as_deref().or(view.group_by.as_deref());

        let schema = self.rows.fetch_table_schema(table_id)?;
        if let (Some(_), Some(group)) = (calculation, options.group_by.as_deref()) {
            if !schema.contains(group) {
                return Err(ViewError::UnknownGroupField {
                    table_id: table_id.to_string(),
                    field: group.to_string(),
                });
            }
        }
        if !view.is_valid(&schema) {
            log::warn!(
                "querying view '{}' on table '{}' whose columns no longer all exist",
                view.name,
                table_id
            );
        }
        log::debug!(
            "query view '{}': calculation={:?} field='{}' group_by={:?} filters={}",
            view.name,
            calculation,
            view.field,
            group_by,
            view.filters.len()
        );

        let mut stream_error = None;
        let rows = TrappedRows {
            stream: self.rows.fetch_rows(table_id)?,
            cancel,
            seen: 0,
            error: &mut stream_error,
        };
        let aggregation = aggregate::aggregate(
            filter::apply(rows, &view.filters),
            calculation,
            &view.field,
            group_by,
            cancel,
        );
        if let Some(err) = stream_error {
            return Err(err);
        }
        Ok(aggregation?.into())
    }
}
