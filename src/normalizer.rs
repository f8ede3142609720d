//! Date normalization: derives canonical `Date`, `Year` and `Month` columns from whichever
//! date-like column a table carries.

use crate::error::{PipelineError, Result};
use crate::schema::columns::{DATE, MONTH, YEAR};
use crate::table::{Table, Value};
use crate::utils::{month_abbrev, parse_date_str};
use chrono::{Datelike, NaiveDate};
use log::{debug, warn};
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

/// Where a table keeps its date.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq, JsonSchema)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum DateSource {
    #[schemars(description = "A column holding dates (or date-formatted text)")]
    Column { column: String },

    #[schemars(
        description = "A composite key like '2023-01-05_CUST_0001'. Only the part before the first separator is parsed."
    )]
    CompositeKey { column: String, separator: String },
}

impl DateSource {
    pub fn column(name: impl Into<String>) -> Self {
        DateSource::Column {
            column: name.into(),
        }
    }

    pub fn composite_key(name: impl Into<String>, separator: impl Into<String>) -> Self {
        DateSource::CompositeKey {
            column: name.into(),
            separator: separator.into(),
        }
    }

    pub fn column_name(&self) -> &str {
        match self {
            DateSource::Column { column } => column,
            DateSource::CompositeKey { column, .. } => column,
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct RowIssue {
    pub row: usize,
    pub error: PipelineError,
}

#[derive(Debug, Clone, PartialEq, Default)]
pub struct NormalizeReport {
    /// The strategy that was applied; `None` when the table was already normalized.
    pub source: Option<DateSource>,
    pub total_rows: usize,
    pub skipped_rows: usize,
    pub issues: Vec<RowIssue>,
    pub already_normalized: bool,
}

#[derive(Debug, Clone, PartialEq)]
pub struct Normalized {
    pub table: Table,
    pub report: NormalizeReport,
}

/// True when the table already carries the canonical `Date`/`Year`/`Month` triple.
pub fn is_normalized(table: &Table) -> bool {
    table.has_column(DATE) && has_period_columns(table)
}

/// True when the table supplies its own `Year` and `Month`; those are never recomputed.
pub fn has_period_columns(table: &Table) -> bool {
    table.has_column(YEAR) && table.has_column(MONTH)
}

fn unchanged(table: &Table) -> Normalized {
    Normalized {
        table: table.clone(),
        report: NormalizeReport {
            source: None,
            total_rows: table.len(),
            skipped_rows: 0,
            issues: Vec::new(),
            already_normalized: true,
        },
    }
}

/// Applies a single date strategy. Rows whose date cannot be read are skipped and reported.
///
/// Existing `Year` and `Month` columns are kept as supplied; only `Date` is derived then.
pub fn normalize_dates(table: &Table, source: &DateSource) -> Result<Normalized> {
    if is_normalized(table) {
        debug!("Table '{}' already normalized, leaving unchanged", table.name());
        return Ok(unchanged(table));
    }
    let keep_periods = has_period_columns(table);

    let column = source.column_name();
    let idx = table.require(column)?;

    let mut kept: Vec<(usize, NaiveDate)> = Vec::with_capacity(table.len());
    let mut issues = Vec::new();

    for (row, values) in table.rows().iter().enumerate() {
        let parsed = match source {
            DateSource::Column { column } => parse_date_cell(&values[idx], row, column),
            DateSource::CompositeKey { separator, .. } => {
                parse_composite_key(&values[idx], row, separator)
            }
        };
        match parsed {
            Ok(date) => kept.push((row, date)),
            Err(error) => issues.push(RowIssue { row, error }),
        }
    }

    if !issues.is_empty() {
        warn!(
            "Skipped {} of {} rows of '{}' with unreadable dates in '{}'",
            issues.len(),
            table.len(),
            table.name(),
            column
        );
    }

    let filtered = if issues.is_empty() {
        table.clone()
    } else {
        let keep: std::collections::HashSet<usize> = kept.iter().map(|(row, _)| *row).collect();
        table.filter(|row| keep.contains(&row.index()))
    };

    let dates: Vec<NaiveDate> = kept.iter().map(|(_, d)| *d).collect();
    let mut out = filtered;
    if let DateSource::Column { column } = source {
        out = out.with_column(column, dates.iter().map(|d| Value::Date(*d)).collect())?;
    }
    out = out.with_column(DATE, dates.iter().map(|d| Value::Date(*d)).collect())?;
    if !keep_periods {
        out = out.with_column(
            YEAR,
            dates.iter().map(|d| Value::Int(d.year() as i64)).collect(),
        )?;
        out = out.with_column(
            MONTH,
            dates
                .iter()
                .map(|d| Value::from(month_abbrev(d.month()).map(str::to_string)))
                .collect(),
        )?;
    }

    debug!(
        "Normalized '{}' via '{}': {} rows kept, {} skipped",
        table.name(),
        column,
        out.len(),
        issues.len()
    );

    Ok(Normalized {
        table: out,
        report: NormalizeReport {
            source: Some(source.clone()),
            total_rows: table.len(),
            skipped_rows: issues.len(),
            issues,
            already_normalized: false,
        },
    })
}

fn parse_date_cell(value: &Value, row: usize, column: &str) -> Result<NaiveDate> {
    value.as_date().ok_or_else(|| PipelineError::InvalidDate {
        row,
        column: column.to_string(),
    })
}

fn parse_composite_key(value: &Value, row: usize, separator: &str) -> Result<NaiveDate> {
    let raw = match value {
        Value::Text(s) => s.as_str(),
        Value::Date(d) => return Ok(*d),
        _ => {
            return Err(PipelineError::MalformedKey {
                row,
                value: value.to_string(),
            })
        }
    };

    let prefix = match raw.find(separator) {
        Some(pos) if !separator.is_empty() => &raw[..pos],
        _ => raw,
    };

    parse_date_str(prefix).ok_or_else(|| PipelineError::MalformedKey {
        row,
        value: raw.to_string(),
    })
}

/// Tries an ordered list of date strategies and applies the first whose column is present.
#[derive(Debug, Clone)]
pub struct SchemaNormalizer {
    candidates: Vec<DateSource>,
}

impl SchemaNormalizer {
    pub fn new(candidates: Vec<DateSource>) -> Self {
        Self { candidates }
    }

    pub fn candidates(&self) -> &[DateSource] {
        &self.candidates
    }

    /// The strategy that would be applied to `table`, if any.
    pub fn resolve(&self, table: &Table) -> Option<&DateSource> {
        self.candidates
            .iter()
            .find(|c| table.has_column(c.column_name()))
    }

    pub fn normalize(&self, table: &Table) -> Result<Normalized> {
        if is_normalized(table) {
            return normalize_dates(table, &DateSource::column(DATE));
        }

        match self.resolve(table) {
            Some(source) => normalize_dates(table, source),
            None if has_period_columns(table) => Ok(unchanged(table)),
            None => {
                let tried: Vec<&str> = self.candidates.iter().map(|c| c.column_name()).collect();
                Err(PipelineError::schema_mismatch(table.name(), tried.join(" | ")))
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn keyed_table() -> Table {
        Table::from_rows(
            "cash_flow",
            vec!["Key", "Cash"],
            vec![
                vec!["2023-01-31_A".into(), Value::Float(10.0)],
                vec!["not-a-date_B".into(), Value::Float(20.0)],
                vec!["2023-02-28".into(), Value::Float(30.0)],
                vec![Value::Null, Value::Float(40.0)],
            ],
        )
        .unwrap()
    }

    #[test]
    fn test_composite_key_skips_and_counts_bad_rows() {
        let source = DateSource::composite_key("Key", "_");
        let result = normalize_dates(&keyed_table(), &source).unwrap();

        assert_eq!(result.table.len(), 2);
        assert_eq!(result.report.total_rows, 4);
        assert_eq!(result.report.skipped_rows, 2);
        assert!(matches!(
            result.report.issues[0].error,
            PipelineError::MalformedKey { row: 1, .. }
        ));
        assert!(result.report.issues.iter().all(|i| i.error.is_row_level()));

        assert_eq!(result.table.value(0, "Year").unwrap(), &Value::Int(2023));
        assert_eq!(result.table.value(0, "Month").unwrap(), &Value::from("Jan"));
        assert_eq!(result.table.value(1, "Month").unwrap(), &Value::from("Feb"));
        assert_eq!(result.table.value(1, "Cash").unwrap(), &Value::Float(30.0));
    }

    #[test]
    fn test_date_column_null_is_invalid_date() {
        let table = Table::from_rows(
            "sales",
            vec!["Valuation Date"],
            vec![vec!["2022-12-01".into()], vec![Value::Null]],
        )
        .unwrap();

        let result = normalize_dates(&table, &DateSource::column("Valuation Date")).unwrap();
        assert_eq!(result.table.len(), 1);
        assert_eq!(
            result.report.issues[0].error,
            PipelineError::InvalidDate {
                row: 1,
                column: "Valuation Date".to_string()
            }
        );
        assert_eq!(
            result.table.value(0, "Valuation Date").unwrap(),
            &Value::Date(NaiveDate::from_ymd_opt(2022, 12, 1).unwrap())
        );
        assert_eq!(result.table.value(0, "Month").unwrap(), &Value::from("Dec"));
    }

    #[test]
    fn test_normalization_is_idempotent() {
        let source = DateSource::composite_key("Key", "_");
        let once = normalize_dates(&keyed_table(), &source).unwrap();
        let twice = normalize_dates(&once.table, &source).unwrap();

        assert_eq!(once.table, twice.table);
        assert!(twice.report.already_normalized);
        assert_eq!(twice.report.skipped_rows, 0);
    }

    #[test]
    fn test_supplied_year_and_month_are_kept() {
        let table = Table::from_rows(
            "statements",
            vec!["Valuation Date", "Year", "Month", "Rev"],
            vec![
                vec!["2023-01-31".into(), Value::Int(2024), "FY-Q1".into(), Value::Float(1.0)],
                vec!["bad".into(), Value::Int(2024), "FY-Q1".into(), Value::Float(2.0)],
            ],
        )
        .unwrap();

        let result = normalize_dates(&table, &DateSource::column("Valuation Date")).unwrap();
        assert!(!result.report.already_normalized);
        assert_eq!(result.report.skipped_rows, 1);
        assert_eq!(result.table.value(0, "Year").unwrap(), &Value::Int(2024));
        assert_eq!(result.table.value(0, "Month").unwrap(), &Value::from("FY-Q1"));
        assert_eq!(
            result.table.value(0, "Date").unwrap(),
            &Value::Date(NaiveDate::from_ymd_opt(2023, 1, 31).unwrap())
        );

        let without_date = table.drop_columns(&["Valuation Date"]);
        let normalizer = SchemaNormalizer::new(vec![DateSource::column("Valuation Date")]);
        let kept = normalizer.normalize(&without_date).unwrap();
        assert!(kept.report.already_normalized);
        assert_eq!(kept.table, without_date);
    }

    #[test]
    fn test_candidates_are_tried_in_order() {
        let normalizer = SchemaNormalizer::new(vec![
            DateSource::column("Valuation Date"),
            DateSource::composite_key("Key", "_"),
        ]);
        let table = keyed_table();
        assert_eq!(
            normalizer.resolve(&table),
            Some(&DateSource::composite_key("Key", "_"))
        );
        assert_eq!(normalizer.normalize(&table).unwrap().table.len(), 2);
    }

    #[test]
    fn test_no_candidate_is_schema_mismatch() {
        let normalizer = SchemaNormalizer::new(vec![DateSource::column("Order Date")]);
        let err = normalizer.normalize(&keyed_table()).unwrap_err();
        assert!(matches!(err, PipelineError::SchemaMismatch { .. }));
    }
}
