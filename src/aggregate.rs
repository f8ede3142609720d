//! Group-by / reduce over [`Table`]s.
//!
//! Groups come out in key order. A `Month` key is ordered by the calendar (Jan..Dec), every
//! other key by its natural order. Only observed key combinations produce a row unless calendar
//! filling is requested explicitly.

use crate::error::{PipelineError, Result};
use crate::schema::columns::MONTH;
use crate::table::{KeyAtom, Table, Value};
use crate::utils::MONTHS;
use log::debug;
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use std::cmp::Ordering;
use std::collections::{BTreeSet, HashMap};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "snake_case")]
pub enum Reducer {
    /// Sum of non-null values; 0 for an empty group.
    Sum,
    /// Mean of non-null values; null when the group has none.
    Mean,
    /// Number of non-null values.
    Count,
    /// Last non-null value in input order.
    Last,
    /// Number of distinct non-null values.
    NUnique,
    Min,
    Max,
}

impl Reducer {
    fn is_numeric(&self) -> bool {
        matches!(
            self,
            Reducer::Sum | Reducer::Mean | Reducer::Min | Reducer::Max
        )
    }

    /// Value used for a calendar-filled bucket with no rows.
    fn empty_value(&self) -> Value {
        match self {
            Reducer::Sum => Value::Float(0.0),
            Reducer::Count | Reducer::NUnique => Value::Int(0),
            Reducer::Mean | Reducer::Last | Reducer::Min | Reducer::Max => Value::Null,
        }
    }

    fn reduce(&self, column: &str, cells: &[(usize, &Value)]) -> Result<Value> {
        let present: Vec<(usize, &Value)> =
            cells.iter().copied().filter(|(_, v)| !v.is_null()).collect();

        Ok(match self {
            Reducer::Count => Value::Int(present.len() as i64),
            Reducer::NUnique => {
                let distinct: BTreeSet<KeyAtom> = present.iter().map(|(_, v)| v.key()).collect();
                Value::Int(distinct.len() as i64)
            }
            Reducer::Last => present
                .last()
                .map(|(_, v)| (*v).clone())
                .unwrap_or(Value::Null),
            Reducer::Sum => Value::Float(numbers(column, &present)?.iter().sum()),
            Reducer::Mean => Value::from(crate::utils::mean(&numbers(column, &present)?)),
            Reducer::Min => Value::from(numbers(column, &present)?.into_iter().reduce(f64::min)),
            Reducer::Max => Value::from(numbers(column, &present)?.into_iter().reduce(f64::max)),
        })
    }
}

fn numbers(column: &str, cells: &[(usize, &Value)]) -> Result<Vec<f64>> {
    let mut out = Vec::with_capacity(cells.len());
    for (row, value) in cells {
        match value.try_f64() {
            Ok(Some(n)) if n.is_finite() => out.push(n),
            Ok(_) => {}
            Err(()) => {
                return Err(PipelineError::TypeMismatch {
                    column: column.to_string(),
                    row: *row,
                    expected: "number".to_string(),
                })
            }
        }
    }
    Ok(out)
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, JsonSchema)]
pub struct Aggregation {
    pub column: String,
    pub reducer: Reducer,
    /// Output column name; defaults to the input column name.
    pub alias: Option<String>,
}

impl Aggregation {
    pub fn new(column: impl Into<String>, reducer: Reducer) -> Self {
        Self {
            column: column.into(),
            reducer,
            alias: None,
        }
    }

    pub fn sum(column: impl Into<String>) -> Self {
        Self::new(column, Reducer::Sum)
    }

    pub fn mean(column: impl Into<String>) -> Self {
        Self::new(column, Reducer::Mean)
    }

    pub fn count(column: impl Into<String>) -> Self {
        Self::new(column, Reducer::Count)
    }

    pub fn last(column: impl Into<String>) -> Self {
        Self::new(column, Reducer::Last)
    }

    pub fn nunique(column: impl Into<String>) -> Self {
        Self::new(column, Reducer::NUnique)
    }

    pub fn min(column: impl Into<String>) -> Self {
        Self::new(column, Reducer::Min)
    }

    pub fn max(column: impl Into<String>) -> Self {
        Self::new(column, Reducer::Max)
    }

    pub fn alias(mut self, name: impl Into<String>) -> Self {
        self.alias = Some(name.into());
        self
    }

    pub fn output_name(&self) -> &str {
        self.alias.as_deref().unwrap_or(&self.column)
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct GroupOptions {
    /// Key column ordered by `months` rather than by value.
    pub month_column: String,
    pub months: Vec<String>,
    /// Emit every month for each observed combination of the other keys.
    pub fill_calendar: bool,
}

impl Default for GroupOptions {
    fn default() -> Self {
        Self {
            month_column: MONTH.to_string(),
            months: MONTHS.iter().map(|m| m.to_string()).collect(),
            fill_calendar: false,
        }
    }
}

impl GroupOptions {
    pub fn with_months(months: &[String]) -> Self {
        Self {
            months: months.to_vec(),
            ..Self::default()
        }
    }

    pub fn fill_calendar(mut self) -> Self {
        self.fill_calendar = true;
        self
    }

    /// Calendar position of a month label; unknown labels sort after December.
    fn month_rank(&self, key: &KeyAtom) -> usize {
        match key {
            KeyAtom::Text(label) => self
                .months
                .iter()
                .position(|m| m == label)
                .unwrap_or(self.months.len()),
            _ => self.months.len(),
        }
    }
}

pub fn group_by(table: &Table, keys: &[&str], aggregations: &[Aggregation]) -> Result<Table> {
    group_by_with(table, keys, aggregations, &GroupOptions::default())
}

/// Groups `table` by `keys` and reduces each aggregation within every group.
///
/// Rows with a null key are left out of every group.
pub fn group_by_with(
    table: &Table,
    keys: &[&str],
    aggregations: &[Aggregation],
    options: &GroupOptions,
) -> Result<Table> {
    let key_indices = keys
        .iter()
        .map(|k| table.require(k))
        .collect::<Result<Vec<_>>>()?;
    let agg_indices = aggregations
        .iter()
        .map(|a| table.require(&a.column))
        .collect::<Result<Vec<_>>>()?;

    let month_pos = keys.iter().position(|k| *k == options.month_column);
    if options.fill_calendar && month_pos.is_none() {
        return Err(PipelineError::InvalidConfig(format!(
            "calendar fill requires '{}' among the group keys",
            options.month_column
        )));
    }

    let mut group_ids: HashMap<Vec<KeyAtom>, usize> = HashMap::new();
    let mut groups: Vec<(Vec<KeyAtom>, Vec<usize>)> = Vec::new();
    let mut null_keys = 0;

    for (row, values) in table.rows().iter().enumerate() {
        let key: Vec<KeyAtom> = key_indices.iter().map(|&i| values[i].key()).collect();
        if key.iter().any(KeyAtom::is_null) {
            null_keys += 1;
            continue;
        }
        match group_ids.get(&key) {
            Some(&id) => groups[id].1.push(row),
            None => {
                group_ids.insert(key.clone(), groups.len());
                groups.push((key, vec![row]));
            }
        }
    }

    if options.fill_calendar {
        if let Some(pos) = month_pos {
            let others: BTreeSet<Vec<KeyAtom>> = if keys.len() == 1 {
                BTreeSet::from([Vec::new()])
            } else {
                groups
                    .iter()
                    .map(|(key, _)| without(key, pos))
                    .collect()
            };
            for rest in others {
                for month in &options.months {
                    let mut key = rest.clone();
                    key.insert(pos, KeyAtom::Text(month.clone()));
                    if !group_ids.contains_key(&key) {
                        group_ids.insert(key.clone(), groups.len());
                        groups.push((key, Vec::new()));
                    }
                }
            }
        }
    }

    groups.sort_by(|(a, _), (b, _)| compare_keys(a, b, month_pos, options));

    let mut columns: Vec<String> = keys.iter().map(|k| k.to_string()).collect();
    columns.extend(aggregations.iter().map(|a| a.output_name().to_string()));
    let mut out = Table::new(table.name(), columns);

    for (key, rows) in &groups {
        let mut record: Vec<Value> = key.iter().map(KeyAtom::to_value).collect();
        for (agg, &idx) in aggregations.iter().zip(&agg_indices) {
            if rows.is_empty() {
                record.push(agg.reducer.empty_value());
                continue;
            }
            let cells: Vec<(usize, &Value)> =
                rows.iter().map(|&r| (r, &table.rows()[r][idx])).collect();
            record.push(agg.reducer.reduce(&agg.column, &cells)?);
        }
        out.push_row(record)?;
    }

    debug!(
        "Grouped '{}' by {:?}: {} rows into {} groups ({} rows with null keys)",
        table.name(),
        keys,
        table.len(),
        out.len(),
        null_keys
    );
    Ok(out)
}

fn without(key: &[KeyAtom], pos: usize) -> Vec<KeyAtom> {
    key.iter()
        .enumerate()
        .filter(|(i, _)| *i != pos)
        .map(|(_, k)| k.clone())
        .collect()
}

fn compare_keys(
    a: &[KeyAtom],
    b: &[KeyAtom],
    month_pos: Option<usize>,
    options: &GroupOptions,
) -> Ordering {
    for (i, (x, y)) in a.iter().zip(b).enumerate() {
        let ord = if Some(i) == month_pos {
            options
                .month_rank(x)
                .cmp(&options.month_rank(y))
                .then_with(|| x.cmp(y))
        } else {
            x.cmp(y)
        };
        if ord != Ordering::Equal {
            return ord;
        }
    }
    Ordering::Equal
}

/// Numeric reducers need numeric columns; checks that up front for a clearer error.
pub fn validate_aggregations(table: &Table, aggregations: &[Aggregation]) -> Result<()> {
    for agg in aggregations.iter().filter(|a| a.reducer.is_numeric()) {
        table.f64_column(&agg.column)?;
    }
    Ok(())
}

/// Wide to long: one output row per (input row, value column).
pub fn melt(
    table: &Table,
    id_columns: &[&str],
    value_columns: &[&str],
    variable_name: &str,
    value_name: &str,
) -> Result<Table> {
    let ids = id_columns
        .iter()
        .map(|c| table.require(c))
        .collect::<Result<Vec<_>>>()?;
    let values = value_columns
        .iter()
        .map(|c| table.require(c))
        .collect::<Result<Vec<_>>>()?;

    let mut columns: Vec<String> = id_columns.iter().map(|c| c.to_string()).collect();
    columns.push(variable_name.to_string());
    columns.push(value_name.to_string());
    let mut out = Table::new(table.name(), columns);

    for row in table.rows() {
        for (&vi, name) in values.iter().zip(value_columns) {
            let mut record: Vec<Value> = ids.iter().map(|&i| row[i].clone()).collect();
            record.push(Value::from(*name));
            record.push(row[vi].clone());
            out.push_row(record)?;
        }
    }
    Ok(out)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn two_years_reversed() -> Table {
        let mut table = Table::new("income", vec!["Year", "Month", "Rev"]);
        for year in [2023i64, 2022] {
            for month in MONTHS.iter().rev() {
                table
                    .push_row(vec![Value::Int(year), (*month).into(), Value::Float(10.0)])
                    .unwrap();
            }
        }
        table
    }

    #[test]
    fn test_month_buckets_in_calendar_order() {
        let grouped =
            group_by(&two_years_reversed(), &["Month"], &[Aggregation::sum("Rev")]).unwrap();

        assert_eq!(grouped.len(), 12);
        let months: Vec<String> = grouped
            .column("Month")
            .unwrap()
            .into_iter()
            .map(|v| v.to_string())
            .collect();
        assert_eq!(months, MONTHS.to_vec());
        assert_eq!(grouped.value(0, "Rev").unwrap(), &Value::Float(20.0));
    }

    #[test]
    fn test_multi_key_only_observed_combinations() {
        let table = Table::from_rows(
            "sales",
            vec!["Year", "Product", "Units"],
            vec![
                vec![Value::Int(2023), "B".into(), Value::Int(3)],
                vec![Value::Int(2022), "A".into(), Value::Int(1)],
                vec![Value::Int(2023), "B".into(), Value::Int(4)],
                vec![Value::Int(2023), "A".into(), Value::Null],
            ],
        )
        .unwrap();

        let grouped = group_by(
            &table,
            &["Year", "Product"],
            &[
                Aggregation::sum("Units"),
                Aggregation::mean("Units").alias("Mean Units"),
                Aggregation::count("Units").alias("Rows"),
            ],
        )
        .unwrap();

        assert_eq!(grouped.len(), 3);
        assert_eq!(grouped.value(0, "Year").unwrap(), &Value::Int(2022));
        assert_eq!(grouped.value(1, "Product").unwrap(), &Value::from("A"));
        assert_eq!(grouped.value(1, "Units").unwrap(), &Value::Float(0.0));
        assert!(grouped.value(1, "Mean Units").unwrap().is_null());
        assert_eq!(grouped.value(2, "Mean Units").unwrap(), &Value::Float(3.5));
        assert_eq!(grouped.value(2, "Rows").unwrap(), &Value::Int(2));
    }

    #[test]
    fn test_last_nunique_min_max() {
        let table = Table::from_rows(
            "cash",
            vec!["Year", "Cash", "Customer"],
            vec![
                vec![Value::Int(2023), Value::Float(5.0), "C1".into()],
                vec![Value::Int(2023), Value::Float(9.0), "C2".into()],
                vec![Value::Int(2023), Value::Null, "C1".into()],
            ],
        )
        .unwrap();
        let grouped = group_by(
            &table,
            &["Year"],
            &[
                Aggregation::last("Cash"),
                Aggregation::nunique("Customer"),
                Aggregation::min("Cash").alias("Low"),
                Aggregation::max("Cash").alias("High"),
            ],
        )
        .unwrap();

        assert_eq!(grouped.value(0, "Cash").unwrap(), &Value::Float(9.0));
        assert_eq!(grouped.value(0, "Customer").unwrap(), &Value::Int(2));
        assert_eq!(grouped.value(0, "Low").unwrap(), &Value::Float(5.0));
        assert_eq!(grouped.value(0, "High").unwrap(), &Value::Float(9.0));
    }

    #[test]
    fn test_calendar_fill_is_opt_in() {
        let table = Table::from_rows(
            "sales",
            vec!["Month", "Units"],
            vec![
                vec!["Mar".into(), Value::Int(2)],
                vec!["Jan".into(), Value::Int(1)],
            ],
        )
        .unwrap();

        let observed = group_by(&table, &["Month"], &[Aggregation::sum("Units")]).unwrap();
        assert_eq!(observed.len(), 2);

        let filled = group_by_with(
            &table,
            &["Month"],
            &[Aggregation::sum("Units")],
            &GroupOptions::default().fill_calendar(),
        )
        .unwrap();
        assert_eq!(filled.len(), 12);
        assert_eq!(filled.value(1, "Month").unwrap(), &Value::from("Feb"));
        assert_eq!(filled.value(1, "Units").unwrap(), &Value::Float(0.0));
        assert_eq!(filled.value(2, "Units").unwrap(), &Value::Float(2.0));
    }

    #[test]
    fn test_empty_input_gives_empty_table() {
        let table = Table::new("sales", vec!["Month", "Units"]);
        let grouped = group_by(&table, &["Month"], &[Aggregation::sum("Units")]).unwrap();
        assert!(grouped.is_empty());
        assert_eq!(grouped.columns(), &["Month".to_string(), "Units".to_string()]);
    }

    #[test]
    fn test_non_numeric_sum_is_type_mismatch() {
        let table =
            Table::from_rows("t", vec!["K", "V"], vec![vec!["a".into(), "x".into()]]).unwrap();
        let err = group_by(&table, &["K"], &[Aggregation::sum("V")]).unwrap_err();
        assert!(matches!(err, PipelineError::TypeMismatch { .. }));
        assert!(validate_aggregations(&table, &[Aggregation::sum("V")]).is_err());
    }

    #[test]
    fn test_melt() {
        let table = Table::from_rows(
            "income",
            vec!["Year", "Rent", "Utils"],
            vec![vec![Value::Int(2023), Value::Float(10.0), Value::Float(2.0)]],
        )
        .unwrap();
        let long = melt(&table, &["Year"], &["Rent", "Utils"], "Category", "Amount").unwrap();
        assert_eq!(long.len(), 2);
        assert_eq!(long.value(1, "Category").unwrap(), &Value::from("Utils"));
        assert_eq!(long.value(1, "Amount").unwrap(), &Value::Float(2.0));
    }
}
