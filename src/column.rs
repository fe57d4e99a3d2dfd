//! Column types and scalar cell values.
//!
//! Row payloads are a closed sum over a handful of scalar kinds, so the
//! aggregation and filtering code can branch on numeric vs. non-numeric
//! with an exhaustive `match`.

use serde::{Deserialize, Deserializer, Serialize, Serializer};
use serde_json::Value as JsonValue;
use std::cmp::Ordering;
use std::fmt;
use std::str::FromStr;

/// Column data types
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ColumnType {
    Number,
    String,
    Boolean,
    DateTime,
    Options,
    LongForm,
}

impl ColumnType {
    /// Returns true if values of this type can feed numeric statistics.
    pub fn is_numeric(&self) -> bool {
        matches!(self, ColumnType::Number)
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            ColumnType::Number => "number",
            ColumnType::String => "string",
            ColumnType::Boolean => "boolean",
            ColumnType::DateTime => "datetime",
            ColumnType::Options => "options",
            ColumnType::LongForm => "longform",
        }
    }
}

impl FromStr for ColumnType {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "number" => Ok(ColumnType::Number),
            "string" | "text" => Ok(ColumnType::String),
            "boolean" | "bool" => Ok(ColumnType::Boolean),
            "datetime" | "date" => Ok(ColumnType::DateTime),
            "options" => Ok(ColumnType::Options),
            "longform" => Ok(ColumnType::LongForm),
            _ => Err(format!("Unknown column type: '{}'", s)),
        }
    }
}

impl fmt::Display for ColumnType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A single cell value.
///
/// `Date` holds days since the Unix epoch. `Null` and an absent key are
/// treated the same everywhere.
#[derive(Debug, Clone, PartialEq, Default)]
pub enum ColumnValue {
    Number(f64),
    String(String),
    Bool(bool),
    Date(i32),
    #[default]
    Null,
}

impl ColumnValue {
    pub fn is_null(&self) -> bool {
        matches!(self, ColumnValue::Null)
    }

    /// Numeric observation for aggregation. Non-finite numbers don't count.
    #[inline]
    pub fn as_number(&self) -> Option<f64> {
        match self {
            ColumnValue::Number(n) if n.is_finite() => Some(*n),
            _ => None,
        }
    }

    pub fn as_string(&self) -> Option<&str> {
        match self {
            ColumnValue::String(v) => Some(v),
            _ => None,
        }
    }

    pub fn as_bool(&self) -> Option<bool> {
        match self {
            ColumnValue::Bool(v) => Some(*v),
            _ => None,
        }
    }

    pub fn as_date(&self) -> Option<i32> {
        match self {
            ColumnValue::Date(days) => Some(*days),
            _ => None,
        }
    }

    /// Empty means null or a zero-length string.
    pub fn is_empty(&self) -> bool {
        match self {
            ColumnValue::Null => true,
            ColumnValue::String(s) => s.is_empty(),
            _ => false,
        }
    }

    /// Canonical text form used for group keys.
    ///
    /// Numbers use the shortest round-trip form (`1.0` becomes `"1"`), so
    /// the number `1` and the string `"1"` land in the same group. Nulls
    /// group under `"null"`.
    pub fn group_key(&self) -> String {
        match self {
            ColumnValue::Number(n) if *n == 0.0 => "0".to_string(),
            ColumnValue::Number(n) => n.to_string(),
            ColumnValue::String(s) => s.clone(),
            ColumnValue::Bool(b) => b.to_string(),
            ColumnValue::Date(days) => format_date(*days),
            ColumnValue::Null => "null".to_string(),
        }
    }

    /// Orders two values when they are comparable.
    ///
    /// Strings are coerced to the other side's type when they parse as a
    /// number or an ISO date; any other mixed pair is incomparable.
    pub fn compare(&self, other: &ColumnValue) -> Option<Ordering> {
        match (self, other) {
            (ColumnValue::Number(a), ColumnValue::Number(b)) => a.partial_cmp(b),
            (ColumnValue::Number(a), ColumnValue::String(s)) => {
                s.trim().parse::<f64>().ok().and_then(|b| a.partial_cmp(&b))
            }
            (ColumnValue::String(s), ColumnValue::Number(b)) => {
                s.trim().parse::<f64>().ok().and_then(|a| a.partial_cmp(b))
            }
            (ColumnValue::String(a), ColumnValue::String(b)) => Some(a.cmp(b)),
            (ColumnValue::Bool(a), ColumnValue::Bool(b)) => Some(a.cmp(b)),
            (ColumnValue::Date(a), ColumnValue::Date(b)) => Some(a.cmp(b)),
            (ColumnValue::Date(a), ColumnValue::String(s)) => parse_date(s).map(|b| a.cmp(&b)),
            (ColumnValue::String(s), ColumnValue::Date(b)) => parse_date(s).map(|a| a.cmp(b)),
            _ => None,
        }
    }

    /// Convert to a JSON value. Non-finite numbers become `null`.
    pub fn to_json(&self) -> JsonValue {
        match self {
            ColumnValue::Number(n) => serde_json::Number::from_f64(*n)
                .map(JsonValue::Number)
                .unwrap_or(JsonValue::Null),
            ColumnValue::String(s) => JsonValue::String(s.clone()),
            ColumnValue::Bool(b) => JsonValue::Bool(*b),
            ColumnValue::Date(days) => JsonValue::String(format_date(*days)),
            ColumnValue::Null => JsonValue::Null,
        }
    }

    /// Convert from a JSON scalar. ISO `YYYY-MM-DD` strings become dates.
    pub fn from_json(value: &JsonValue) -> Result<Self, String> {
        match value {
            JsonValue::Null => Ok(ColumnValue::Null),
            JsonValue::Bool(b) => Ok(ColumnValue::Bool(*b)),
            JsonValue::Number(n) => n
                .as_f64()
                .map(ColumnValue::Number)
                .ok_or_else(|| format!("Unsupported number: {}", n)),
            JsonValue::String(s) => {
                if s.len() == 10 && s.chars().nth(4) == Some('-') {
                    if let Some(days) = parse_date(s) {
                        return Ok(ColumnValue::Date(days));
                    }
                }
                Ok(ColumnValue::String(s.clone()))
            }
            JsonValue::Array(_) | JsonValue::Object(_) => {
                Err(format!("Unsupported JSON value type: {}", value))
            }
        }
    }
}

impl From<f64> for ColumnValue {
    fn from(v: f64) -> Self {
        ColumnValue::Number(v)
    }
}

impl From<i64> for ColumnValue {
    fn from(v: i64) -> Self {
        ColumnValue::Number(v as f64)
    }
}

impl From<&str> for ColumnValue {
    fn from(v: &str) -> Self {
        ColumnValue::String(v.to_string())
    }
}

impl From<String> for ColumnValue {
    fn from(v: String) -> Self {
        ColumnValue::String(v)
    }
}

impl From<bool> for ColumnValue {
    fn from(v: bool) -> Self {
        ColumnValue::Bool(v)
    }
}

impl fmt::Display for ColumnValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.group_key())
    }
}

impl Serialize for ColumnValue {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        self.to_json().serialize(serializer)
    }
}

impl<'de> Deserialize<'de> for ColumnValue {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let value = JsonValue::deserialize(deserializer)?;
        ColumnValue::from_json(&value).map_err(serde::de::Error::custom)
    }
}

// ============================================================================
// Date helpers
// ============================================================================

/// Years accepted by [`parse_date`].
pub const MAX_DATE_YEAR: i32 = 9999;

/// Convert days since Unix epoch (1970-01-01) to (year, month, day)
fn ymd_from_days(days: i32) -> (i64, u32, u32) {
    // Algorithm from https://howardhinnant.github.io/date_algorithms.html
    let z = i64::from(days) + 719468;
    let era = z.div_euclid(146097);
    let doe = (z - era * 146097) as u32;
    let yoe = (doe - doe / 1460 + doe / 36524 - doe / 146096) / 365;
    let y = i64::from(yoe) + era * 400;
    let doy = doe - (365 * yoe + yoe / 4 - yoe / 100);
    let mp = (5 * doy + 2) / 153;
    let d = doy - (153 * mp + 2) / 5 + 1;
    let m = if mp < 10 { mp + 3 } else { mp - 9 };
    let year = if m <= 2 { y + 1 } else { y };
    (year, m, d)
}

/// Convert (year, month, day) to days since Unix epoch.
///
/// `year` must lie within `0..=MAX_DATE_YEAR`; [`parse_date`] enforces this.
pub fn days_from_ymd(year: i32, month: u32, day: u32) -> i32 {
    let y = i64::from(if month <= 2 { year - 1 } else { year });
    let era = y.div_euclid(400);
    let yoe = (y - era * 400) as u32;
    let m = month;
    let doy = (153 * (if m > 2 { m - 3 } else { m + 9 }) + 2) / 5 + day - 1;
    let doe = yoe * 365 + yoe / 4 - yoe / 100 + doy;
    (era * 146097 + i64::from(doe) - 719468) as i32
}

fn is_leap_year(year: i32) -> bool {
    (year % 4 == 0 && year % 100 != 0) || year % 400 == 0
}

fn days_in_month(year: i32, month: u32) -> u32 {
    match month {
        2 if is_leap_year(year) => 29,
        2 => 28,
        4 | 6 | 9 | 11 => 30,
        _ => 31,
    }
}

/// Format a date (days since epoch) as ISO 8601 (YYYY-MM-DD)
pub fn format_date(days: i32) -> String {
    let (year, month, day) = ymd_from_days(days);
    format!("{:04}-{:02}-{:02}", year, month, day)
}

/// Parse an ISO 8601 date string (YYYY-MM-DD) to days since epoch.
///
/// Out-of-range years and days past the end of the month yield `None`.
pub fn parse_date(s: &str) -> Option<i32> {
    let parts: Vec<&str> = s.trim().split('-').collect();
    if parts.len() != 3 {
        return None;
    }
    let year: i32 = parts[0].parse().ok()?;
    let month: u32 = parts[1].parse().ok()?;
    let day: u32 = parts[2].parse().ok()?;

    if !(0..=MAX_DATE_YEAR).contains(&year) || !(1..=12).contains(&month) {
        return None;
    }
    if day == 0 || day > days_in_month(year, month) {
        return None;
    }

    Some(days_from_ymd(year, month, day))
}
