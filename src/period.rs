//! Current vs previous period selection.
//!
//! Periods are the distinct values of a column (usually `Year`), sorted ascending. The previous
//! period of the earliest one is the period itself, so KPI deltas there come out as zero change
//! rather than an error.

use crate::error::{PipelineError, Result};
use crate::metrics::Ratio;
use crate::table::{KeyAtom, Table, Value};
use log::debug;
use serde::{Deserialize, Serialize};

/// Returns `(current, previous)` labels for `selected` among `labels`.
///
/// `labels` need not be sorted or unique.
pub fn compare_periods(labels: &[Value], selected: &Value) -> Result<(Value, Value)> {
    let mut sorted: Vec<KeyAtom> = labels
        .iter()
        .map(Value::key)
        .filter(|k| !k.is_null())
        .collect();
    sorted.sort();
    sorted.dedup();

    let key = selected.key();
    let pos = sorted
        .iter()
        .position(|k| *k == key)
        .ok_or_else(|| PipelineError::UnknownPeriod(selected.to_string()))?;
    let previous = if pos == 0 { &sorted[0] } else { &sorted[pos - 1] };
    Ok((sorted[pos].to_value(), previous.to_value()))
}

/// Splits `table` into the rows of the selected period and the rows of the period before it.
pub fn current_and_previous(
    table: &Table,
    column: &str,
    selected: &Value,
) -> Result<(Table, Table)> {
    let labels: Vec<Value> = table
        .distinct(column)?
        .iter()
        .map(KeyAtom::to_value)
        .collect();
    let (current, previous) = compare_periods(&labels, selected)?;

    let current_rows = table.filter_in(column, std::slice::from_ref(&current))?;
    let previous_rows = if previous.key() == current.key() {
        current_rows.clone()
    } else {
        table.filter_in(column, std::slice::from_ref(&previous))?
    };

    debug!(
        "Period {} of '{}': {} current rows, previous {} has {} rows",
        current,
        table.name(),
        current_rows.len(),
        previous,
        previous_rows.len()
    );
    Ok((current_rows, previous_rows))
}

/// The label before `month` in the configured calendar `months`. The first month has none.
pub fn previous_month<'a>(months: &'a [String], month: &str) -> Option<&'a str> {
    let idx = months.iter().position(|m| m == month)?;
    if idx == 0 {
        None
    } else {
        Some(months[idx - 1].as_str())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct KpiDelta {
    pub current: f64,
    pub previous: f64,
    /// Percentage change from previous to current; undefined when previous is zero.
    pub change: Ratio,
}

impl KpiDelta {
    pub fn new(current: f64, previous: f64) -> Self {
        Self {
            current,
            previous,
            change: Ratio::of(current - previous, previous).scaled(100.0),
        }
    }

    /// Evaluates `kpi` on the selected period and on the one before it.
    pub fn compare<F>(table: &Table, column: &str, selected: &Value, kpi: F) -> Result<Self>
    where
        F: Fn(&Table) -> Result<f64>,
    {
        let (current, previous) = current_and_previous(table, column, selected)?;
        Ok(Self::new(kpi(&current)?, kpi(&previous)?))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::PipelineConfig;

    fn yearly() -> Table {
        Table::from_rows(
            "sales",
            vec!["Year", "Revenue"],
            vec![
                vec![Value::Int(2023), Value::Float(20.0)],
                vec![Value::Int(2022), Value::Float(10.0)],
                vec![Value::Int(2024), Value::Float(30.0)],
                vec![Value::Int(2023), Value::Float(5.0)],
            ],
        )
        .unwrap()
    }

    #[test]
    fn test_earliest_period_falls_back_to_itself() {
        let labels = vec![Value::Int(2022), Value::Int(2023), Value::Int(2024)];
        let (current, previous) = compare_periods(&labels, &Value::Int(2022)).unwrap();
        assert_eq!(current, previous);

        let (current, previous) =
            current_and_previous(&yearly(), "Year", &Value::Int(2022)).unwrap();
        assert_eq!(current, previous);
        assert_eq!(current.len(), 1);
    }

    #[test]
    fn test_previous_period_rows() {
        let (current, previous) =
            current_and_previous(&yearly(), "Year", &Value::Int(2024)).unwrap();
        assert_eq!(current.sum("Revenue").unwrap(), 30.0);
        assert_eq!(previous.sum("Revenue").unwrap(), 25.0);
    }

    #[test]
    fn test_unknown_period() {
        let err = current_and_previous(&yearly(), "Year", &Value::Int(2019)).unwrap_err();
        assert_eq!(err, PipelineError::UnknownPeriod("2019".to_string()));
    }

    #[test]
    fn test_previous_month() {
        let calendar = PipelineConfig::default().months;
        assert_eq!(previous_month(&calendar, "Jan"), None);
        assert_eq!(previous_month(&calendar, "Mar"), Some("Feb"));
        assert_eq!(previous_month(&calendar, "March"), None);

        let fiscal: Vec<String> = ["Jul", "Aug", "Sep", "Oct", "Nov", "Dec"]
            .iter()
            .chain(["Jan", "Feb", "Mar", "Apr", "May", "Jun"].iter())
            .map(|m| m.to_string())
            .collect();
        assert_eq!(previous_month(&fiscal, "Jul"), None);
        assert_eq!(previous_month(&fiscal, "Jan"), Some("Dec"));
    }

    #[test]
    fn test_kpi_delta() {
        let delta =
            KpiDelta::compare(&yearly(), "Year", &Value::Int(2023), |t| t.sum("Revenue")).unwrap();
        assert_eq!(delta.current, 25.0);
        assert_eq!(delta.previous, 10.0);
        assert_eq!(delta.change, Ratio::Value(150.0));

        assert!(KpiDelta::new(5.0, 0.0).change.is_undefined());
        let flat =
            KpiDelta::compare(&yearly(), "Year", &Value::Int(2022), |t| t.sum("Revenue")).unwrap();
        assert_eq!(flat.change, Ratio::Value(0.0));
    }
}
