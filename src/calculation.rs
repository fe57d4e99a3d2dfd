//! Calculation kinds and the output schema each one produces.
//!
//! The mapping is a pure function over constant tables; nothing here holds
//! state.

use crate::column::ColumnType;
use crate::error::{Result, ViewError};
use crate::table::Schema;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Output columns of a `stats` view, in order.
pub const STATS_COLUMNS: [(&str, ColumnType); 7] = [
    ("sum", ColumnType::Number),
    ("min", ColumnType::Number),
    ("max", ColumnType::Number),
    ("count", ColumnType::Number),
    ("sumsqr", ColumnType::Number),
    ("avg", ColumnType::Number),
    ("field", ColumnType::String),
];

/// Output columns of a `count` view.
pub const COUNT_COLUMNS: [(&str, ColumnType); 1] = [("count", ColumnType::Number)];

/// What a view computes over its rows.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Calculation {
    /// Six-statistic numeric summary of `field`
    Stats,
    /// Number of rows
    Count,
}

impl Calculation {
    /// Parse an optional kind string. Absent or empty means a plain view.
    pub fn parse_kind(kind: Option<&str>) -> Result<Option<Calculation>> {
        match kind.map(str::trim) {
            None | Some("") => Ok(None),
            Some(kind) => kind.parse::<Calculation>().map(Some),
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Calculation::Stats => "stats",
            Calculation::Count => "count",
        }
    }

    /// True when the aggregated field must be a numeric column.
    pub fn requires_numeric_field(&self) -> bool {
        matches!(self, Calculation::Stats)
    }
}

impl FromStr for Calculation {
    type Err = ViewError;

    fn from_str(s: &str) -> Result<Self> {
        match s {
            "stats" => Ok(Calculation::Stats),
            "count" => Ok(Calculation::Count),
            other => Err(ViewError::InvalidCalculationKind(other.to_string())),
        }
    }
}

impl fmt::Display for Calculation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Output schema for a calculation.
///
/// Plain views (no calculation) expose the table's row schema unchanged.
pub fn output_schema(calculation: Option<Calculation>, row_schema: &Schema) -> Schema {
    let columns: &[(&str, ColumnType)] = match calculation {
        Some(Calculation::Stats) => &STATS_COLUMNS,
        Some(Calculation::Count) => &COUNT_COLUMNS,
        None => return row_schema.clone(),
    };
    Schema::new(
        columns
            .iter()
            .map(|(name, ty)| (name.to_string(), *ty))
            .collect(),
    )
}

/// Derive a view's output schema from its raw calculation kind.
///
/// Fails with `InvalidCalculationKind` for anything but `stats`, `count`,
/// or no kind at all.
pub fn derive_schema(kind: Option<&str>, row_schema: &Schema) -> Result<Schema> {
    let calculation = Calculation::parse_kind(kind)?;
    Ok(output_schema(calculation, row_schema))
}
