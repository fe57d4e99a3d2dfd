//! Streaming aggregation over a row sequence.
//!
//! One pass, constant memory per accumulator: a single accumulator when
//! ungrouped, one per distinct group key otherwise. Group keys are kept in
//! order of first appearance.
//!
//! # Examples
//!
//! ```
//! use tableviews::{aggregate, Aggregation, AggregateResult, Calculation, Cancellation, Row};
//!
//! let rows = vec![
//!     Row::new("ro_1", "ta_1").with("Price", 1000.0),
//!     Row::new("ro_2", "ta_1").with("Price", 2000.0),
//!     Row::new("ro_3", "ta_1").with("Price", 4000.0),
//! ];
//! let result = aggregate(rows, Some(Calculation::Stats), "Price", None, &Cancellation::new()).unwrap();
//! match result {
//!     Aggregation::Single(AggregateResult::Stats(stats)) => {
//!         assert_eq!(stats.sum, 7000.0);
//!         assert_eq!(stats.count, 3);
//!     }
//!     other => panic!("unexpected {:?}", other),
//! }
//! ```

use crate::calculation::Calculation;
use crate::error::{Result, ViewError};
use crate::table::Row;
use serde::Serialize;
use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering as AtomicOrdering};
use std::sync::Arc;

/// How many rows are consumed between cancellation checks.
pub const CANCEL_CHECK_INTERVAL: usize = 1024;

/// Cooperative cancellation flag shared between a caller and a running query.
#[derive(Debug, Clone, Default)]
pub struct Cancellation {
    flag: Arc<AtomicBool>,
}

impl Cancellation {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn cancel(&self) {
        self.flag.store(true, AtomicOrdering::Relaxed);
    }

    pub fn is_cancelled(&self) -> bool {
        self.flag.load(AtomicOrdering::Relaxed)
    }

    /// Checked on row 0 and then every `CANCEL_CHECK_INTERVAL` rows.
    #[inline]
    pub(crate) fn check(&self, rows_seen: usize) -> Result<()> {
        if rows_seen % CANCEL_CHECK_INTERVAL == 0 && self.is_cancelled() {
            return Err(ViewError::Cancelled);
        }
        Ok(())
    }
}

/// Running state for one aggregate.
#[derive(Debug, Clone, Copy)]
struct Accumulator {
    sum: f64,
    min: f64,
    max: f64,
    count: u64,
    sumsqr: f64,
}

impl Accumulator {
    fn new() -> Self {
        Accumulator {
            sum: 0.0,
            min: f64::INFINITY,
            max: f64::NEG_INFINITY,
            count: 0,
            sumsqr: 0.0,
        }
    }

    #[inline]
    fn observe(&mut self, value: f64) {
        self.sum += value;
        self.sumsqr += value * value;
        self.count += 1;
        self.min = self.min.min(value);
        self.max = self.max.max(value);
    }

    #[inline]
    fn tally(&mut self) {
        self.count += 1;
    }

    /// Feed one row according to the calculation's counting rule.
    #[inline]
    fn update(&mut self, calculation: Calculation, row: &Row, field: &str) {
        match calculation {
            // Count measures row presence
            Calculation::Count => self.tally(),
            // Stats measures valid numeric observations
            Calculation::Stats => match row.get(field).and_then(|v| v.as_number()) {
                Some(value) => self.observe(value),
                None => log::trace!("row '{}' has no numeric '{}', skipped", row.id, field),
            },
        }
    }

    fn finish(self, calculation: Calculation, field: &str) -> AggregateResult {
        match calculation {
            Calculation::Count => AggregateResult::Count(CountResult { count: self.count }),
            Calculation::Stats => {
                let (min, max, avg) = if self.count > 0 {
                    (self.min, self.max, self.sum / self.count as f64)
                } else {
                    (0.0, 0.0, 0.0)
                };
                AggregateResult::Stats(StatsResult {
                    sum: self.sum,
                    min,
                    max,
                    count: self.count,
                    sumsqr: self.sumsqr,
                    avg,
                    field: field.to_string(),
                })
            }
        }
    }
}

/// Result record of a `stats` calculation.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct StatsResult {
    pub sum: f64,
    pub min: f64,
    pub max: f64,
    pub count: u64,
    pub sumsqr: f64,
    pub avg: f64,
    /// Name of the aggregated field, echoed for display
    pub field: String,
}

/// Result record of a `count` calculation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct CountResult {
    pub count: u64,
}

/// One finalized aggregate.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(untagged)]
pub enum AggregateResult {
    Stats(StatsResult),
    Count(CountResult),
}

impl AggregateResult {
    pub fn count(&self) -> u64 {
        match self {
            AggregateResult::Stats(stats) => stats.count,
            AggregateResult::Count(count) => count.count,
        }
    }

    pub fn as_stats(&self) -> Option<&StatsResult> {
        match self {
            AggregateResult::Stats(stats) => Some(stats),
            AggregateResult::Count(_) => None,
        }
    }
}

/// Group key → aggregate, in order of first appearance.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct GroupedResult {
    groups: Vec<(String, AggregateResult)>,
}

impl GroupedResult {
    pub fn len(&self) -> usize {
        self.groups.len()
    }

    pub fn is_empty(&self) -> bool {
        self.groups.is_empty()
    }

    pub fn get(&self, key: &str) -> Option<&AggregateResult> {
        self.groups
            .iter()
            .find(|(k, _)| k == key)
            .map(|(_, result)| result)
    }

    pub fn keys(&self) -> impl Iterator<Item = &str> {
        self.groups.iter().map(|(key, _)| key.as_str())
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &AggregateResult)> {
        self.groups.iter().map(|(key, result)| (key.as_str(), result))
    }
}

impl IntoIterator for GroupedResult {
    type Item = (String, AggregateResult);
    type IntoIter = std::vec::IntoIter<(String, AggregateResult)>;

    fn into_iter(self) -> Self::IntoIter {
        self.groups.into_iter()
    }
}

/// Output of the engine.
#[derive(Debug, Clone, PartialEq)]
pub enum Aggregation {
    /// Ungrouped stats or count
    Single(AggregateResult),
    /// One aggregate per group key
    Grouped(GroupedResult),
    /// No calculation: the rows themselves
    Rows(Vec<Row>),
}

/// Aggregate a row sequence.
///
/// With no calculation the rows pass through untouched and `group_by` is
/// ignored. Rows whose `field` is missing or non-numeric are left out of
/// `stats` but still counted by `count`. Empty input yields all-zero
/// results, never an error. The only failure is cancellation.
pub fn aggregate<I>(
    rows: I,
    calculation: Option<Calculation>,
    field: &str,
    group_by: Option<&str>,
    cancel: &Cancellation,
) -> Result<Aggregation>
where
    I: IntoIterator<Item = Row>,
{
    let Some(calculation) = calculation else {
        return collect_rows(rows, cancel).map(Aggregation::Rows);
    };

    match group_by {
        None => {
            let mut acc = Accumulator::new();
            for (seen, row) in rows.into_iter().enumerate() {
                cancel.check(seen)?;
                acc.update(calculation, &row, field);
            }
            let result = acc.finish(calculation, field);
            log::debug!("aggregated {} on '{}': count={}", calculation, field, result.count());
            Ok(Aggregation::Single(result))
        }
        Some(group_field) => {
            let mut index: HashMap<String, usize> = HashMap::new();
            let mut groups: Vec<(String, Accumulator)> = Vec::new();

            for (seen, row) in rows.into_iter().enumerate() {
                cancel.check(seen)?;
                let key = row.value(group_field).group_key();
                let slot = match index.get(&key) {
                    Some(&slot) => slot,
                    None => {
                        groups.push((key.clone(), Accumulator::new()));
                        index.insert(key, groups.len() - 1);
                        groups.len() - 1
                    }
                };
                groups[slot].1.update(calculation, &row, field);
            }

            log::debug!(
                "aggregated {} on '{}' grouped by '{}': {} groups",
                calculation,
                field,
                group_field,
                groups.len()
            );
            Ok(Aggregation::Grouped(GroupedResult {
                groups: groups
                    .into_iter()
                    .map(|(key, acc)| (key, acc.finish(calculation, field)))
                    .collect(),
            }))
        }
    }
}

fn collect_rows<I>(rows: I, cancel: &Cancellation) -> Result<Vec<Row>>
where
    I: IntoIterator<Item = Row>,
{
    let mut out = Vec::new();
    for (seen, row) in rows.into_iter().enumerate() {
        cancel.check(seen)?;
        out.push(row);
    }
    Ok(out)
}
