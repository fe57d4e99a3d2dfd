//! Row filtering for view queries.
//!
//! A view stores an ordered list of predicates such as
//! - `Price MT 1000`
//! - `Category EQUALS 'One'`
//! - `Notes NOT_EMPTY`
//!
//! Predicates are ANDed left to right. Filtering is lazy and never touches
//! the rows it reads; it yields them through in their original order.

use crate::column::ColumnValue;
use crate::table::Row;
use serde::{Deserialize, Serialize};
use std::borrow::Borrow;
use std::cmp::Ordering;

/// Comparison operators
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum FilterOperator {
    #[serde(alias = "equals", alias = "eq")]
    Equals,
    #[serde(alias = "notEquals", alias = "not_equals", alias = "ne")]
    NotEquals,
    #[serde(rename = "MT", alias = "greaterThan", alias = "greater_than", alias = "gt")]
    GreaterThan,
    #[serde(rename = "LT", alias = "lessThan", alias = "less_than", alias = "lt")]
    LessThan,
    #[serde(alias = "contains")]
    Contains,
    #[serde(alias = "empty")]
    Empty,
    #[serde(alias = "notEmpty", alias = "not_empty")]
    NotEmpty,
}

/// One stored filter: `field operator value`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Predicate {
    pub field: String,
    pub operator: FilterOperator,
    #[serde(default, skip_serializing_if = "ColumnValue::is_null")]
    pub value: ColumnValue,
}

impl Predicate {
    pub fn new(field: impl Into<String>, operator: FilterOperator, value: impl Into<ColumnValue>) -> Self {
        Predicate {
            field: field.into(),
            operator,
            value: value.into(),
        }
    }

    /// Predicate for the value-less operators (`EMPTY`, `NOT_EMPTY`).
    pub fn unary(field: impl Into<String>, operator: FilterOperator) -> Self {
        Predicate {
            field: field.into(),
            operator,
            value: ColumnValue::Null,
        }
    }

    /// Evaluate against a single row.
    ///
    /// A missing or null cell never matches, except for `EMPTY`.
    pub fn matches(&self, row: &Row) -> bool {
        let cell = row.value(&self.field);
        match self.operator {
            FilterOperator::Empty => cell.is_empty(),
            FilterOperator::NotEmpty => !cell.is_empty(),
            _ if cell.is_null() => false,
            FilterOperator::Equals => cell.compare(&self.value) == Some(Ordering::Equal),
            FilterOperator::NotEquals => cell.compare(&self.value) != Some(Ordering::Equal),
            FilterOperator::GreaterThan => cell.compare(&self.value) == Some(Ordering::Greater),
            FilterOperator::LessThan => cell.compare(&self.value) == Some(Ordering::Less),
            FilterOperator::Contains => match (cell, &self.value) {
                (ColumnValue::String(haystack), needle) if !needle.is_null() => {
                    haystack.contains(needle.group_key().as_str())
                }
                _ => false,
            },
        }
    }
}

/// True if the row passes every predicate.
pub fn matches_all(row: &Row, filters: &[Predicate]) -> bool {
    filters.iter().all(|predicate| predicate.matches(row))
}

/// Lazily filter a row sequence. Works over owned rows or references.
pub fn apply<I>(rows: I, filters: &[Predicate]) -> FilteredRows<'_, I::IntoIter>
where
    I: IntoIterator,
    I::Item: Borrow<Row>,
{
    FilteredRows {
        rows: rows.into_iter(),
        filters,
    }
}

/// Iterator returned by [`apply`].
pub struct FilteredRows<'f, I> {
    rows: I,
    filters: &'f [Predicate],
}

impl<'f, I> Iterator for FilteredRows<'f, I>
where
    I: Iterator,
    I::Item: Borrow<Row>,
{
    type Item = I::Item;

    fn next(&mut self) -> Option<Self::Item> {
        let filters = self.filters;
        self.rows
            .find(|row| matches_all(<I::Item as Borrow<Row>>::borrow(row), filters))
    }

    fn size_hint(&self) -> (usize, Option<usize>) {
        (0, self.rows.size_hint().1)
    }
}
