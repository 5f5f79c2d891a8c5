use serde::ser::SerializeMap;
use serde::{Deserialize, Serialize, Serializer};
use smallvec::SmallVec;
use std::fmt;

use crate::services::utils::coerce_number;

pub const SAMPLE_SIZE: usize = 5;

/// 2^53, the largest integer an f64 represents exactly.
const MAX_EXACT_INT: f64 = 9_007_199_254_740_992.0;

static NULL_CELL: CellValue = CellValue::Null;

/// A scalar cell, typed once by the file parser and never re-typed afterwards.
#[derive(Debug, Clone, PartialEq)]
pub enum CellValue {
    Number(f64),
    Bool(bool),
    Text(String),
    Null,
}

impl CellValue {
    pub fn text(value: impl Into<String>) -> Self {
        CellValue::Text(value.into())
    }

    /// Null and the empty string both count as absent.
    pub fn is_defined(&self) -> bool {
        match self {
            CellValue::Null => false,
            CellValue::Text(s) => !s.is_empty(),
            CellValue::Number(_) | CellValue::Bool(_) => true,
        }
    }

    pub fn as_number(&self) -> Option<f64> {
        match self {
            CellValue::Number(n) => Some(*n),
            _ => None,
        }
    }

    /// Loose numeric reading used for chart aggregation: booleans count as
    /// 0/1, text is read as a number literal, anything unreadable is `None`.
    pub fn to_number_lossy(&self) -> Option<f64> {
        let n = match self {
            CellValue::Number(n) => *n,
            CellValue::Bool(b) => f64::from(u8::from(*b)),
            CellValue::Text(s) => coerce_number(s)?,
            CellValue::Null => 0.0,
        };
        if n.is_nan() {
            None
        } else {
            Some(n)
        }
    }
}

impl fmt::Display for CellValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            CellValue::Number(n) => write!(f, "{}", format_number(*n)),
            CellValue::Bool(b) => write!(f, "{}", b),
            CellValue::Text(s) => f.write_str(s),
            CellValue::Null => f.write_str("null"),
        }
    }
}

impl Serialize for CellValue {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        match self {
            CellValue::Number(n) if !n.is_finite() => serializer.serialize_none(),
            CellValue::Number(n) if n.fract() == 0.0 && n.abs() < MAX_EXACT_INT => {
                serializer.serialize_i64(*n as i64)
            }
            CellValue::Number(n) => serializer.serialize_f64(*n),
            CellValue::Bool(b) => serializer.serialize_bool(*b),
            CellValue::Text(s) => serializer.serialize_str(s),
            CellValue::Null => serializer.serialize_none(),
        }
    }
}

fn format_number(n: f64) -> String {
    if n.is_nan() {
        "NaN".to_string()
    } else if n.is_infinite() {
        let label = if n > 0.0 { "Infinity" } else { "-Infinity" };
        label.to_string()
    } else if n.fract() == 0.0 && n.abs() < MAX_EXACT_INT {
        format!("{}", n as i64)
    } else {
        format!("{}", n)
    }
}

/// One row of a table: column name to cell, in insertion order.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct DataRow {
    cells: Vec<(String, CellValue)>,
}

impl DataRow {
    pub fn new() -> Self {
        Self::default()
    }

    /// Inserts a cell, overwriting the value in place if the key already exists.
    pub fn insert(&mut self, key: impl Into<String>, value: CellValue) {
        let key = key.into();
        match self.cells.iter_mut().find(|(k, _)| *k == key) {
            Some((_, existing)) => *existing = value,
            None => self.cells.push((key, value)),
        }
    }

    pub fn get(&self, key: &str) -> Option<&CellValue> {
        self.cells.iter().find(|(k, _)| k == key).map(|(_, v)| v)
    }

    pub fn keys(&self) -> impl Iterator<Item = &str> {
        self.cells.iter().map(|(k, _)| k.as_str())
    }

    pub fn len(&self) -> usize {
        self.cells.len()
    }

    pub fn is_empty(&self) -> bool {
        self.cells.is_empty()
    }

    /// Keeps only `columns`, in the given order. Keys this row lacks are left out.
    pub fn project(&self, columns: &[String]) -> DataRow {
        columns
            .iter()
            .filter_map(|c| self.get(c).map(|v| (c.clone(), v.clone())))
            .collect()
    }
}

impl<K: Into<String>> FromIterator<(K, CellValue)> for DataRow {
    fn from_iter<I: IntoIterator<Item = (K, CellValue)>>(iter: I) -> Self {
        let mut row = DataRow::new();
        for (k, v) in iter {
            row.insert(k, v);
        }
        row
    }
}

impl Serialize for DataRow {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        let mut map = serializer.serialize_map(Some(self.cells.len()))?;
        for (k, v) in &self.cells {
            map.serialize_entry(k, v)?;
        }
        map.end()
    }
}

/// An in-memory table. The column set is whatever the first row carries.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
#[serde(transparent)]
pub struct Table {
    rows: Vec<DataRow>,
}

impl Table {
    pub fn new(rows: Vec<DataRow>) -> Self {
        Self { rows }
    }

    pub fn rows(&self) -> &[DataRow] {
        &self.rows
    }

    pub fn len(&self) -> usize {
        self.rows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    pub fn columns(&self) -> Vec<String> {
        self.rows
            .first()
            .map(|row| row.keys().map(String::from).collect())
            .unwrap_or_default()
    }

    pub fn has_column(&self, name: &str) -> bool {
        self.rows
            .first()
            .map_or(false, |row| row.keys().any(|k| k == name))
    }

    /// Values of one column in row order; rows without the key yield `Null`.
    pub fn column_values<'a>(&'a self, name: &'a str) -> impl Iterator<Item = &'a CellValue> + 'a {
        self.rows
            .iter()
            .map(move |row| row.get(name).unwrap_or(&NULL_CELL))
    }

    pub fn head(&self, n: usize) -> &[DataRow] {
        &self.rows[..n.min(self.rows.len())]
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ColumnType {
    Number,
    Boolean,
    Date,
    String,
}

impl fmt::Display for ColumnType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ColumnType::Number => write!(f, "number"),
            ColumnType::Boolean => write!(f, "boolean"),
            ColumnType::Date => write!(f, "date"),
            ColumnType::String => write!(f, "string"),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct NumericStats {
    pub min: f64,
    pub max: f64,
    pub mean: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ColumnProfile {
    pub name: String,
    #[serde(rename = "type")]
    pub column_type: ColumnType,
    pub unique_values: usize,
    pub missing_values: usize,
    pub sample: SmallVec<[CellValue; SAMPLE_SIZE]>,
    /// Present only for number columns.
    #[serde(flatten)]
    pub stats: Option<NumericStats>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ChartType {
    Bar,
    Line,
    Scatter,
    Area,
    Pie,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ChartConfig {
    #[serde(rename = "type")]
    pub chart_type: ChartType,
    pub x_axis: String,
    pub y_axis: Vec<String>,
    #[serde(default)]
    pub title: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AiReport {
    pub title: String,
    pub summary: String,
    #[serde(default)]
    pub key_insights: Vec<String>,
    #[serde(default)]
    pub recommendations: Vec<String>,
    #[serde(default)]
    pub markdown_content: String,
}
