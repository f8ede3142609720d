//! Row-oriented in-memory tables.
//!
//! A [`Table`] is an ordered sequence of records sharing one header. Every transformation in
//! the pipeline takes a `&Table` and hands back a new one; source rows are never mutated.

use crate::error::{PipelineError, Result};
use crate::utils::parse_date_str;
use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use std::cmp::Ordering;
use std::collections::BTreeSet;
use std::fmt;
use std::hash::{Hash, Hasher};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Default)]
pub enum Value {
    /// Missing value. Also used as the "undefined" sentinel for ratios with a zero denominator.
    #[default]
    Null,
    Int(i64),
    Float(f64),
    Text(String),
    Date(NaiveDate),
}

impl Value {
    /// Best-effort typing of a raw text cell (integer, float, date, otherwise text).
    /// Empty cells become `Null`.
    pub fn infer(raw: &str) -> Value {
        let trimmed = raw.trim();
        if trimmed.is_empty() {
            return Value::Null;
        }
        if let Ok(i) = trimmed.parse::<i64>() {
            return Value::Int(i);
        }
        if let Ok(f) = trimmed.parse::<f64>() {
            return Value::Float(f);
        }
        if let Some(date) = parse_date_str(trimmed) {
            return Value::Date(date);
        }
        Value::Text(trimmed.to_string())
    }

    pub fn is_null(&self) -> bool {
        matches!(self, Value::Null)
    }

    /// Numeric view of the value; `None` for nulls and non-numeric cells.
    pub fn as_f64(&self) -> Option<f64> {
        self.try_f64().ok().flatten()
    }

    /// Text is accepted when it parses as a number once thousands separators are stripped.
    /// `Ok(None)` means the cell is null, `Err` that it is not numeric.
    pub(crate) fn try_f64(&self) -> std::result::Result<Option<f64>, ()> {
        match self {
            Value::Null => Ok(None),
            Value::Int(i) => Ok(Some(*i as f64)),
            Value::Float(f) => Ok(Some(*f)),
            Value::Text(s) => {
                let cleaned = s.trim().replace(',', "");
                if cleaned.is_empty() {
                    return Ok(None);
                }
                cleaned.parse::<f64>().map(Some).map_err(|_| ())
            }
            Value::Date(_) => Err(()),
        }
    }

    pub fn as_i64(&self) -> Option<i64> {
        match self {
            Value::Int(i) => Some(*i),
            Value::Float(f) if f.fract() == 0.0 && f.is_finite() => Some(*f as i64),
            Value::Text(s) => s.trim().parse().ok(),
            _ => None,
        }
    }

    pub fn as_str(&self) -> Option<&str> {
        match self {
            Value::Text(s) => Some(s.as_str()),
            _ => None,
        }
    }

    pub fn as_date(&self) -> Option<NaiveDate> {
        match self {
            Value::Date(d) => Some(*d),
            Value::Text(s) => parse_date_str(s),
            _ => None,
        }
    }

    pub fn key(&self) -> KeyAtom {
        KeyAtom::from(self)
    }
}

impl fmt::Display for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Value::Null => Ok(()),
            Value::Int(i) => write!(f, "{}", i),
            Value::Float(v) => write!(f, "{}", v),
            Value::Text(s) => write!(f, "{}", s),
            Value::Date(d) => write!(f, "{}", d.format("%Y-%m-%d")),
        }
    }
}

impl From<f64> for Value {
    fn from(v: f64) -> Self {
        Value::Float(v)
    }
}

impl From<i64> for Value {
    fn from(v: i64) -> Self {
        Value::Int(v)
    }
}

impl From<i32> for Value {
    fn from(v: i32) -> Self {
        Value::Int(v as i64)
    }
}

impl From<&str> for Value {
    fn from(v: &str) -> Self {
        Value::Text(v.to_string())
    }
}

impl From<String> for Value {
    fn from(v: String) -> Self {
        Value::Text(v)
    }
}

impl From<NaiveDate> for Value {
    fn from(v: NaiveDate) -> Self {
        Value::Date(v)
    }
}

impl<T: Into<Value>> From<Option<T>> for Value {
    fn from(v: Option<T>) -> Self {
        v.map(Into::into).unwrap_or(Value::Null)
    }
}

/// Hashable, totally ordered projection of a [`Value`], used for join and group keys.
///
/// Integral floats collapse onto `Int` so that `1` and `1.0` land in the same group.
#[derive(Debug, Clone)]
pub enum KeyAtom {
    Null,
    Int(i64),
    Float(f64),
    Text(String),
    Date(NaiveDate),
}

impl KeyAtom {
    fn rank(&self) -> u8 {
        match self {
            KeyAtom::Null => 0,
            KeyAtom::Int(_) | KeyAtom::Float(_) => 1,
            KeyAtom::Date(_) => 2,
            KeyAtom::Text(_) => 3,
        }
    }

    pub fn is_null(&self) -> bool {
        matches!(self, KeyAtom::Null)
    }

    pub fn to_value(&self) -> Value {
        match self {
            KeyAtom::Null => Value::Null,
            KeyAtom::Int(i) => Value::Int(*i),
            KeyAtom::Float(f) => Value::Float(*f),
            KeyAtom::Text(s) => Value::Text(s.clone()),
            KeyAtom::Date(d) => Value::Date(*d),
        }
    }
}

impl From<&Value> for KeyAtom {
    fn from(value: &Value) -> Self {
        match value {
            Value::Null => KeyAtom::Null,
            Value::Int(i) => KeyAtom::Int(*i),
            Value::Float(f) if f.is_finite() && f.fract() == 0.0 && f.abs() < i64::MAX as f64 => {
                KeyAtom::Int(*f as i64)
            }
            Value::Float(f) => KeyAtom::Float(*f),
            Value::Text(s) => KeyAtom::Text(s.clone()),
            Value::Date(d) => KeyAtom::Date(*d),
        }
    }
}

impl PartialEq for KeyAtom {
    fn eq(&self, other: &Self) -> bool {
        self.cmp(other) == Ordering::Equal
    }
}

impl Eq for KeyAtom {}

impl PartialOrd for KeyAtom {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for KeyAtom {
    fn cmp(&self, other: &Self) -> Ordering {
        match (self, other) {
            (KeyAtom::Null, KeyAtom::Null) => Ordering::Equal,
            (KeyAtom::Int(a), KeyAtom::Int(b)) => a.cmp(b),
            (KeyAtom::Float(a), KeyAtom::Float(b)) => a.total_cmp(b),
            (KeyAtom::Int(a), KeyAtom::Float(b)) => (*a as f64).total_cmp(b),
            (KeyAtom::Float(a), KeyAtom::Int(b)) => a.total_cmp(&(*b as f64)),
            (KeyAtom::Text(a), KeyAtom::Text(b)) => a.cmp(b),
            (KeyAtom::Date(a), KeyAtom::Date(b)) => a.cmp(b),
            _ => self.rank().cmp(&other.rank()),
        }
    }
}

impl Hash for KeyAtom {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.rank().hash(state);
        match self {
            KeyAtom::Null => {}
            KeyAtom::Int(i) => (*i as f64).to_bits().hash(state),
            KeyAtom::Float(f) => f.to_bits().hash(state),
            KeyAtom::Text(s) => s.hash(state),
            KeyAtom::Date(d) => d.hash(state),
        }
    }
}

impl fmt::Display for KeyAtom {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.to_value())
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(try_from = "RawTable")]
pub struct Table {
    name: String,
    columns: Vec<String>,
    rows: Vec<Vec<Value>>,
}

/// Wire shape of a [`Table`]; rows are width-checked before a `Table` is built from it.
#[derive(Deserialize)]
struct RawTable {
    name: String,
    columns: Vec<String>,
    rows: Vec<Vec<Value>>,
}

impl TryFrom<RawTable> for Table {
    type Error = PipelineError;

    fn try_from(raw: RawTable) -> Result<Self> {
        Table::from_rows(raw.name, raw.columns, raw.rows)
    }
}

/// Borrowed view of one row of a [`Table`].
#[derive(Debug, Clone, Copy)]
pub struct RowRef<'a> {
    table: &'a Table,
    index: usize,
}

impl<'a> RowRef<'a> {
    pub fn index(&self) -> usize {
        self.index
    }

    pub fn get(&self, column: &str) -> Option<&'a Value> {
        let idx = self.table.column_index(column)?;
        self.table.rows[self.index].get(idx)
    }

    pub fn values(&self) -> &'a [Value] {
        &self.table.rows[self.index]
    }
}

impl Table {
    pub fn new<S: Into<String>>(name: impl Into<String>, columns: Vec<S>) -> Self {
        Self {
            name: name.into(),
            columns: columns.into_iter().map(Into::into).collect(),
            rows: Vec::new(),
        }
    }

    pub fn from_rows<S: Into<String>>(
        name: impl Into<String>,
        columns: Vec<S>,
        rows: Vec<Vec<Value>>,
    ) -> Result<Self> {
        let mut table = Self::new(name, columns);
        for row in rows {
            table.push_row(row)?;
        }
        Ok(table)
    }

    pub fn push_row(&mut self, row: Vec<Value>) -> Result<()> {
        if row.len() != self.columns.len() {
            return Err(PipelineError::InvalidConfig(format!(
                "table '{}' expects {} values per row, got {}",
                self.name,
                self.columns.len(),
                row.len()
            )));
        }
        self.rows.push(row);
        Ok(())
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn with_name(&self, name: impl Into<String>) -> Table {
        Table {
            name: name.into(),
            columns: self.columns.clone(),
            rows: self.rows.clone(),
        }
    }

    pub fn columns(&self) -> &[String] {
        &self.columns
    }

    pub fn rows(&self) -> &[Vec<Value>] {
        &self.rows
    }

    pub fn len(&self) -> usize {
        self.rows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    pub fn has_column(&self, column: &str) -> bool {
        self.column_index(column).is_some()
    }

    pub fn column_index(&self, column: &str) -> Option<usize> {
        self.columns.iter().position(|c| c == column)
    }

    /// Index of a column that must exist. Header matching is exact (case and spaces).
    pub fn require(&self, column: &str) -> Result<usize> {
        self.column_index(column)
            .ok_or_else(|| PipelineError::schema_mismatch(&self.name, column))
    }

    pub fn require_all(&self, columns: &[&str]) -> Result<()> {
        for column in columns {
            self.require(column)?;
        }
        Ok(())
    }

    pub fn row(&self, index: usize) -> Option<RowRef<'_>> {
        if index < self.rows.len() {
            Some(RowRef { table: self, index })
        } else {
            None
        }
    }

    pub fn iter(&self) -> impl Iterator<Item = RowRef<'_>> {
        (0..self.rows.len()).map(move |index| RowRef { table: self, index })
    }

    pub fn value(&self, row: usize, column: &str) -> Result<&Value> {
        let idx = self.require(column)?;
        self.rows
            .get(row)
            .and_then(|r| r.get(idx))
            .ok_or_else(|| PipelineError::InvalidConfig(format!("row {} out of range", row)))
    }

    pub fn column(&self, column: &str) -> Result<Vec<&Value>> {
        let idx = self.require(column)?;
        Ok(self.rows.iter().map(|r| &r[idx]).collect())
    }

    /// Numeric cells of a column; nulls come back as `None`.
    pub fn f64_column(&self, column: &str) -> Result<Vec<Option<f64>>> {
        let idx = self.require(column)?;
        self.rows
            .iter()
            .enumerate()
            .map(|(row, values)| {
                values[idx]
                    .try_f64()
                    .map_err(|_| PipelineError::TypeMismatch {
                        column: column.to_string(),
                        row,
                        expected: "number".to_string(),
                    })
            })
            .collect()
    }

    /// Sum of a numeric column, skipping nulls. Zero on an empty table.
    pub fn sum(&self, column: &str) -> Result<f64> {
        Ok(self.f64_column(column)?.into_iter().flatten().sum())
    }

    pub fn distinct(&self, column: &str) -> Result<Vec<KeyAtom>> {
        let idx = self.require(column)?;
        let set: BTreeSet<KeyAtom> = self
            .rows
            .iter()
            .map(|r| r[idx].key())
            .filter(|k| !k.is_null())
            .collect();
        Ok(set.into_iter().collect())
    }

    pub fn nunique(&self, column: &str) -> Result<usize> {
        Ok(self.distinct(column)?.len())
    }

    /// New table with `column` set to `values`, replacing an existing column of that name.
    pub fn with_column(&self, column: &str, values: Vec<Value>) -> Result<Table> {
        if values.len() != self.rows.len() {
            return Err(PipelineError::InvalidConfig(format!(
                "column '{}' has {} values but table '{}' has {} rows",
                column,
                values.len(),
                self.name,
                self.rows.len()
            )));
        }

        let mut out = self.clone();
        match out.column_index(column) {
            Some(idx) => {
                for (row, value) in out.rows.iter_mut().zip(values) {
                    row[idx] = value;
                }
            }
            None => {
                out.columns.push(column.to_string());
                for (row, value) in out.rows.iter_mut().zip(values) {
                    row.push(value);
                }
            }
        }
        Ok(out)
    }

    pub fn rename_column(&self, from: &str, to: &str) -> Result<Table> {
        let idx = self.require(from)?;
        let mut out = self.clone();
        out.columns[idx] = to.to_string();
        Ok(out)
    }

    pub fn select(&self, columns: &[&str]) -> Result<Table> {
        let indices = columns
            .iter()
            .map(|c| self.require(c))
            .collect::<Result<Vec<_>>>()?;
        Ok(Table {
            name: self.name.clone(),
            columns: columns.iter().map(|c| c.to_string()).collect(),
            rows: self
                .rows
                .iter()
                .map(|r| indices.iter().map(|&i| r[i].clone()).collect())
                .collect(),
        })
    }

    /// Copy of the table without the named columns; names that do not exist are ignored.
    pub fn drop_columns(&self, columns: &[&str]) -> Table {
        let keep: Vec<usize> = (0..self.columns.len())
            .filter(|&i| !columns.contains(&self.columns[i].as_str()))
            .collect();
        Table {
            name: self.name.clone(),
            columns: keep.iter().map(|&i| self.columns[i].clone()).collect(),
            rows: self
                .rows
                .iter()
                .map(|r| keep.iter().map(|&i| r[i].clone()).collect())
                .collect(),
        }
    }

    pub fn filter<F>(&self, mut predicate: F) -> Table
    where
        F: FnMut(RowRef<'_>) -> bool,
    {
        let rows = self
            .iter()
            .filter(|row| predicate(*row))
            .map(|row| row.values().to_vec())
            .collect();
        Table {
            name: self.name.clone(),
            columns: self.columns.clone(),
            rows,
        }
    }

    /// Rows whose `column` value is one of `allowed`.
    pub fn filter_in(&self, column: &str, allowed: &[Value]) -> Result<Table> {
        let idx = self.require(column)?;
        let keys: BTreeSet<KeyAtom> = allowed.iter().map(Value::key).collect();
        Ok(self.filter(|row| keys.contains(&row.values()[idx].key())))
    }

    /// Stable sort by one or more columns, ascending.
    pub fn sort_by_columns(&self, columns: &[&str]) -> Result<Table> {
        let indices = columns
            .iter()
            .map(|c| self.require(c))
            .collect::<Result<Vec<_>>>()?;
        let mut rows = self.rows.clone();
        rows.sort_by(|a, b| {
            indices
                .iter()
                .map(|&i| a[i].key().cmp(&b[i].key()))
                .find(|o| *o != Ordering::Equal)
                .unwrap_or(Ordering::Equal)
        });
        Ok(Table {
            name: self.name.clone(),
            columns: self.columns.clone(),
            rows,
        })
    }

    /// Stable sort on a numeric column; nulls sort last either way.
    pub fn sort_by_f64(&self, column: &str, descending: bool) -> Result<Table> {
        let values = self.f64_column(column)?;
        let mut order: Vec<usize> = (0..self.rows.len()).collect();
        order.sort_by(|&a, &b| match (values[a], values[b]) {
            (Some(x), Some(y)) => {
                if descending {
                    y.total_cmp(&x)
                } else {
                    x.total_cmp(&y)
                }
            }
            (Some(_), None) => Ordering::Less,
            (None, Some(_)) => Ordering::Greater,
            (None, None) => Ordering::Equal,
        });
        Ok(Table {
            name: self.name.clone(),
            columns: self.columns.clone(),
            rows: order.into_iter().map(|i| self.rows[i].clone()).collect(),
        })
    }
}
