//! Equality joins over [`Table`]s.
//!
//! Non-key columns that exist on more than one side are never overwritten: every copy is kept
//! under `"{column}_{source}"`.

use crate::error::{PipelineError, Result};
use crate::table::{KeyAtom, Table, Value};
use log::{debug, warn};
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeSet, HashMap};

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Default, JsonSchema)]
pub enum JoinKind {
    /// Only rows with a match on both sides.
    #[default]
    Inner,
    /// Every left row; unmatched ones get nulls for the right-hand columns.
    LeftOuter,
    /// Every row from both sides.
    FullOuter,
}

#[derive(Debug, Clone, PartialEq)]
pub struct JoinSpec {
    pub keys: Vec<String>,
    pub kind: JoinKind,
    pub left_source: Option<String>,
    pub right_source: Option<String>,
}

impl JoinSpec {
    pub fn new<S: Into<String>>(keys: Vec<S>, kind: JoinKind) -> Self {
        Self {
            keys: keys.into_iter().map(Into::into).collect(),
            kind,
            left_source: None,
            right_source: None,
        }
    }

    pub fn inner<S: Into<String>>(keys: Vec<S>) -> Self {
        Self::new(keys, JoinKind::Inner)
    }

    pub fn left_outer<S: Into<String>>(keys: Vec<S>) -> Self {
        Self::new(keys, JoinKind::LeftOuter)
    }

    pub fn full_outer<S: Into<String>>(keys: Vec<S>) -> Self {
        Self::new(keys, JoinKind::FullOuter)
    }

    /// Suffixes used for colliding columns. Defaults to the table names.
    pub fn with_sources(mut self, left: impl Into<String>, right: impl Into<String>) -> Self {
        self.left_source = Some(left.into());
        self.right_source = Some(right.into());
        self
    }
}

#[derive(Debug, Clone, PartialEq, Default)]
pub struct JoinReport {
    pub left_rows: usize,
    pub right_rows: usize,
    pub output_rows: usize,
    /// Left rows with no partner on the right (dropped under an inner join).
    pub unmatched_left: usize,
    /// Right rows with no partner on the left (dropped unless full outer).
    pub unmatched_right: usize,
    pub renamed_columns: Vec<String>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct Joined {
    pub table: Table,
    pub report: JoinReport,
}

pub fn join(left: &Table, right: &Table, spec: &JoinSpec) -> Result<Joined> {
    let left_source = spec
        .left_source
        .clone()
        .unwrap_or_else(|| left.name().to_string());
    let right_source = spec
        .right_source
        .clone()
        .unwrap_or_else(|| right.name().to_string());

    join_all(
        &[(left, left_source.as_str()), (right, right_source.as_str())],
        &spec.keys,
        spec.kind,
    )
}

/// Joins several tables on the same keys, left to right.
///
/// Collisions are detected across all inputs up front, so a column present in any two sources
/// is suffixed in every source that has it.
pub fn join_all(tables: &[(&Table, &str)], keys: &[String], kind: JoinKind) -> Result<Joined> {
    if keys.is_empty() {
        return Err(PipelineError::InvalidConfig(
            "join requires at least one key column".to_string(),
        ));
    }
    let Some(((first, _), rest)) = tables.split_first() else {
        return Err(PipelineError::InvalidConfig(
            "join requires at least one table".to_string(),
        ));
    };

    let mut sources = BTreeSet::new();
    for (table, source) in tables {
        if !sources.insert(*source) {
            return Err(PipelineError::InvalidConfig(format!(
                "join source '{}' is used by more than one table",
                source
            )));
        }
        for key in keys {
            table.require(key)?;
        }
    }

    let mut seen: HashMap<&str, usize> = HashMap::new();
    for (table, _) in tables {
        for column in table.columns() {
            if !keys.contains(column) {
                *seen.entry(column.as_str()).or_default() += 1;
            }
        }
    }
    let collisions: BTreeSet<String> = seen
        .into_iter()
        .filter(|(_, count)| *count > 1)
        .map(|(c, _)| c.to_string())
        .collect();

    // Suffixed names must not shadow any column already present in an input.
    let mut taken: BTreeSet<String> = tables
        .iter()
        .flat_map(|(t, _)| t.columns().iter().cloned())
        .collect();
    let mut renamed_columns = Vec::new();
    let mut prepared = Vec::with_capacity(tables.len());
    for (table, source) in tables {
        let mut t = (*table).clone();
        for column in &collisions {
            if t.has_column(column) {
                let new_name = format!("{}_{}", column, source);
                if !taken.insert(new_name.clone()) {
                    return Err(PipelineError::InvalidConfig(format!(
                        "cannot rename '{}' from '{}' to '{}': that column already exists",
                        column, source, new_name
                    )));
                }
                t = t.rename_column(column, &new_name)?;
                renamed_columns.push(new_name);
            }
        }
        prepared.push(t);
    }

    let mut acc = prepared[0].clone();
    let mut report = JoinReport {
        left_rows: first.len(),
        right_rows: 0,
        output_rows: 0,
        unmatched_left: 0,
        unmatched_right: 0,
        renamed_columns,
    };

    for (right, (original, _)) in prepared.iter().skip(1).zip(rest) {
        let (table, unmatched_left, unmatched_right) = join_pair(&acc, right, keys, kind)?;
        report.right_rows += original.len();
        report.unmatched_left += unmatched_left;
        report.unmatched_right += unmatched_right;
        acc = table;
    }
    report.output_rows = acc.len();

    if kind == JoinKind::Inner && report.unmatched_left > 0 {
        warn!(
            "Inner join on {:?} dropped {} of {} rows from '{}'",
            keys,
            report.unmatched_left,
            report.left_rows,
            first.name()
        );
    }
    debug!(
        "Joined {} tables on {:?} ({:?}): {} rows out",
        tables.len(),
        keys,
        kind,
        report.output_rows
    );

    Ok(Joined { table: acc, report })
}

fn key_of(row: &[Value], indices: &[usize]) -> Option<Vec<KeyAtom>> {
    let key: Vec<KeyAtom> = indices.iter().map(|&i| row[i].key()).collect();
    if key.iter().any(KeyAtom::is_null) {
        None
    } else {
        Some(key)
    }
}

/// Core two-table join; assumes colliding columns have already been renamed.
fn join_pair(
    left: &Table,
    right: &Table,
    keys: &[String],
    kind: JoinKind,
) -> Result<(Table, usize, usize)> {
    let left_keys = keys
        .iter()
        .map(|k| left.require(k))
        .collect::<Result<Vec<_>>>()?;
    let right_keys = keys
        .iter()
        .map(|k| right.require(k))
        .collect::<Result<Vec<_>>>()?;

    let right_extra: Vec<usize> = (0..right.columns().len())
        .filter(|i| !right_keys.contains(i))
        .collect();

    let mut columns: Vec<String> = left.columns().to_vec();
    columns.extend(right_extra.iter().map(|&i| right.columns()[i].clone()));

    let mut index: HashMap<Vec<KeyAtom>, Vec<usize>> = HashMap::new();
    for (i, row) in right.rows().iter().enumerate() {
        if let Some(key) = key_of(row, &right_keys) {
            index.entry(key).or_default().push(i);
        }
    }

    let mut out = Table::new(format!("{}_{}", left.name(), right.name()), columns);
    let mut right_matched = vec![false; right.len()];
    let mut unmatched_left = 0;

    for row in left.rows() {
        let matches = key_of(row, &left_keys).and_then(|k| index.get(&k));
        match matches {
            Some(partners) => {
                for &r in partners {
                    right_matched[r] = true;
                    let mut combined = row.clone();
                    combined.extend(right_extra.iter().map(|&i| right.rows()[r][i].clone()));
                    out.push_row(combined)?;
                }
            }
            None => {
                unmatched_left += 1;
                if kind != JoinKind::Inner {
                    let mut combined = row.clone();
                    combined.extend(std::iter::repeat(Value::Null).take(right_extra.len()));
                    out.push_row(combined)?;
                }
            }
        }
    }

    let unmatched_right = right_matched.iter().filter(|m| !**m).count();
    if kind == JoinKind::FullOuter {
        for (r, matched) in right_matched.iter().enumerate() {
            if *matched {
                continue;
            }
            let mut combined = vec![Value::Null; left.columns().len()];
            for (&li, &ri) in left_keys.iter().zip(&right_keys) {
                combined[li] = right.rows()[r][ri].clone();
            }
            combined.extend(right_extra.iter().map(|&i| right.rows()[r][i].clone()));
            out.push_row(combined)?;
        }
    }

    Ok((out, unmatched_left, unmatched_right))
}
