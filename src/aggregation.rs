//! Aggregation Pipeline
//!
//! Pure query primitives over a filtered `Dataset`. Grouping runs on the
//! polars lazy engine; ranking and date ordering are applied to the typed
//! results so tie-breaks stay deterministic.

use crate::dataset::{date_values, float_values, string_values, Dataset, Dimension, Measure, TimeGrain};
use crate::error::Result;
use chrono::NaiveDate;
use polars::prelude::*;
use serde::ser::{SerializeMap, SerializeSeq};
use serde::{Serialize, Serializer};
use std::collections::HashMap;
use tracing::debug;

/// A single value in a result table
#[derive(Debug, Clone, PartialEq)]
pub enum Cell {
    Text(String),
    Date(NaiveDate),
    Number(f64),
}

impl Cell {
    pub fn as_text(&self) -> Option<&str> {
        match self {
            Cell::Text(s) => Some(s),
            _ => None,
        }
    }

    pub fn as_date(&self) -> Option<NaiveDate> {
        match self {
            Cell::Date(d) => Some(*d),
            _ => None,
        }
    }

    pub fn as_number(&self) -> Option<f64> {
        match self {
            Cell::Number(n) => Some(*n),
            _ => None,
        }
    }
}

impl Serialize for Cell {
    fn serialize<S: Serializer>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error> {
        match self {
            Cell::Text(s) => serializer.serialize_str(s),
            Cell::Date(d) => serializer.serialize_str(&d.format("%Y-%m-%d").to_string()),
            Cell::Number(n) if n.is_finite() => serializer.serialize_f64(*n),
            Cell::Number(_) => serializer.serialize_none(),
        }
    }
}

/// Small ordered table with named columns
#[derive(Debug, Clone, PartialEq)]
pub struct ResultTable {
    columns: Vec<String>,
    rows: Vec<Vec<Cell>>,
}

impl ResultTable {
    pub fn new<I, S>(columns: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            columns: columns.into_iter().map(Into::into).collect(),
            rows: Vec::new(),
        }
    }

    pub fn push_row(&mut self, row: Vec<Cell>) {
        debug_assert_eq!(row.len(), self.columns.len());
        self.rows.push(row);
    }

    pub fn columns(&self) -> &[String] {
        &self.columns
    }

    pub fn rows(&self) -> &[Vec<Cell>] {
        &self.rows
    }

    pub fn len(&self) -> usize {
        self.rows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    pub fn column_index(&self, name: &str) -> Option<usize> {
        self.columns.iter().position(|c| c == name)
    }

    /// All cells of one column, top to bottom
    pub fn column(&self, name: &str) -> Option<Vec<&Cell>> {
        let idx = self.column_index(name)?;
        Some(self.rows.iter().map(|row| &row[idx]).collect())
    }

    /// `(key, number)` pairs for a text key column and a numeric column
    pub fn pairs(&self, key: &str, value: &str) -> Vec<(String, f64)> {
        match (self.column_index(key), self.column_index(value)) {
            (Some(k), Some(v)) => self
                .rows
                .iter()
                .filter_map(|row| {
                    let key = row[k].as_text()?.to_string();
                    Some((key, row[v].as_number()?))
                })
                .collect(),
            _ => Vec::new(),
        }
    }
}

struct RowRef<'a> {
    columns: &'a [String],
    cells: &'a [Cell],
}

impl Serialize for RowRef<'_> {
    fn serialize<S: Serializer>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error> {
        let mut map = serializer.serialize_map(Some(self.columns.len()))?;
        for (name, cell) in self.columns.iter().zip(self.cells) {
            map.serialize_entry(name, cell)?;
        }
        map.end()
    }
}

/// Serialized as a list of row objects keyed by column name, in column order
impl Serialize for ResultTable {
    fn serialize<S: Serializer>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error> {
        let mut seq = serializer.serialize_seq(Some(self.rows.len()))?;
        for row in &self.rows {
            seq.serialize_element(&RowRef {
                columns: &self.columns,
                cells: row,
            })?;
        }
        seq.end()
    }
}

/// Whole-set reduction; `NoData` when there was nothing to reduce
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Scalar {
    Value(f64),
    NoData,
}

impl Scalar {
    pub fn from_option(value: Option<f64>) -> Self {
        match value {
            Some(v) if v.is_finite() => Scalar::Value(v),
            _ => Scalar::NoData,
        }
    }

    pub fn value(&self) -> Option<f64> {
        match self {
            Scalar::Value(v) => Some(*v),
            Scalar::NoData => None,
        }
    }

    pub fn is_no_data(&self) -> bool {
        matches!(self, Scalar::NoData)
    }
}

impl Serialize for Scalar {
    fn serialize<S: Serializer>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error> {
        match self {
            Scalar::Value(v) => serializer.serialize_f64(*v),
            Scalar::NoData => serializer.serialize_none(),
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum AggregationResult {
    Table(ResultTable),
    Scalar(Scalar),
}

impl AggregationResult {
    pub fn is_empty(&self) -> bool {
        match self {
            AggregationResult::Table(table) => table.is_empty(),
            AggregationResult::Scalar(scalar) => scalar.is_no_data(),
        }
    }

    pub fn as_table(&self) -> Option<&ResultTable> {
        match self {
            AggregationResult::Table(table) => Some(table),
            AggregationResult::Scalar(_) => None,
        }
    }

    pub fn as_scalar(&self) -> Option<Scalar> {
        match self {
            AggregationResult::Scalar(scalar) => Some(*scalar),
            AggregationResult::Table(_) => None,
        }
    }
}

impl Serialize for AggregationResult {
    fn serialize<S: Serializer>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error> {
        match self {
            AggregationResult::Table(table) => table.serialize(serializer),
            AggregationResult::Scalar(scalar) => scalar.serialize(serializer),
        }
    }
}

fn grouped(frame: &DataFrame, keys: &[&str], aggs: Vec<Expr>) -> Result<DataFrame> {
    let by: Vec<Expr> = keys.iter().copied().map(col).collect();
    Ok(frame.clone().lazy().group_by_stable(by).agg(aggs).collect()?)
}

/// Per-key aggregate in first-seen key order
fn keyed(dataset: &Dataset, dimension: Dimension, measure: Measure, agg: Expr) -> Result<Vec<(String, f64)>> {
    if dataset.is_empty() {
        return Ok(Vec::new());
    }
    let frame = grouped(dataset.frame(), &[dimension.column()], vec![agg])?;
    let keys = string_values(&frame, dimension.column())?;
    let values = float_values(&frame, measure.column())?;
    Ok(keys.into_iter().zip(values).collect())
}

fn keyed_table(dimension: Dimension, measure: Measure, pairs: Vec<(String, f64)>) -> ResultTable {
    let mut table = ResultTable::new([dimension.column(), measure.column()]);
    for (key, value) in pairs {
        table.push_row(vec![Cell::Text(key), Cell::Number(value)]);
    }
    table
}

/// Largest first; equal sums ordered by key name ascending
fn rank_descending(mut pairs: Vec<(String, f64)>, n: usize) -> Vec<(String, f64)> {
    pairs.sort_by(|a, b| b.1.total_cmp(&a.1).then_with(|| a.0.cmp(&b.0)));
    pairs.truncate(n);
    pairs
}

/// Sum `measure` per distinct `dimension` value, in first-seen order
pub fn sum_by_key(dataset: &Dataset, dimension: Dimension, measure: Measure) -> Result<ResultTable> {
    let pairs = keyed(dataset, dimension, measure, col(measure.column()).sum())?;
    Ok(keyed_table(dimension, measure, pairs))
}

/// Mean of `measure` per distinct `dimension` value, in first-seen order
pub fn mean_by_key(dataset: &Dataset, dimension: Dimension, measure: Measure) -> Result<ResultTable> {
    let pairs = keyed(dataset, dimension, measure, col(measure.column()).mean())?;
    Ok(keyed_table(dimension, measure, pairs))
}

/// The `n` keys with the largest summed `measure`
pub fn top_n_by_sum(dataset: &Dataset, dimension: Dimension, measure: Measure, n: usize) -> Result<ResultTable> {
    let pairs = keyed(dataset, dimension, measure, col(measure.column()).sum())?;
    let ranked = rank_descending(pairs, n);
    debug!(
        "Top {} {} by {}: {:?}",
        n,
        dimension.column(),
        measure.column(),
        ranked.iter().map(|(k, _)| k.as_str()).collect::<Vec<_>>()
    );
    Ok(keyed_table(dimension, measure, ranked))
}

fn time_series(
    dataset: &Dataset,
    grain: TimeGrain,
    measures: &[Measure],
    agg: fn(Expr) -> Expr,
) -> Result<ResultTable> {
    let mut columns = vec![grain.column()];
    columns.extend(measures.iter().map(|m| m.column()));
    let mut table = ResultTable::new(columns);
    if dataset.is_empty() || measures.is_empty() {
        return Ok(table);
    }

    let aggs = measures.iter().map(|m| agg(col(m.column()))).collect();
    let frame = grouped(dataset.frame(), &[grain.column()], aggs)?;
    let dates = date_values(&frame, grain.column())?;
    let series = measures
        .iter()
        .map(|m| float_values(&frame, m.column()))
        .collect::<Result<Vec<_>>>()?;

    let mut order: Vec<usize> = (0..dates.len()).collect();
    order.sort_by_key(|&i| dates[i]);
    for i in order {
        let mut row = vec![Cell::Date(dates[i])];
        row.extend(series.iter().map(|values| Cell::Number(values[i])));
        table.push_row(row);
    }
    Ok(table)
}

/// Sum each measure per date bucket, ordered by date ascending
pub fn time_series_sum(dataset: &Dataset, grain: TimeGrain, measures: &[Measure]) -> Result<ResultTable> {
    time_series(dataset, grain, measures, |e| e.sum())
}

/// Average `measure` per date bucket, ordered by date ascending
pub fn time_series_mean(dataset: &Dataset, grain: TimeGrain, measure: Measure) -> Result<ResultTable> {
    time_series(dataset, grain, &[measure], |e| e.mean())
}

/// Time series of `measure` split by the top `n` keys of `dimension`.
///
/// Rows are ordered by bucket ascending, then by the key's rank.
pub fn top_n_over_time(
    dataset: &Dataset,
    dimension: Dimension,
    measure: Measure,
    n: usize,
    grain: TimeGrain,
) -> Result<ResultTable> {
    let mut table = ResultTable::new([grain.column(), dimension.column(), measure.column()]);
    let leaders = rank_descending(
        keyed(dataset, dimension, measure, col(measure.column()).sum())?,
        n,
    );
    let restriction = leaders
        .iter()
        .map(|(key, _)| col(dimension.column()).eq(lit(key.clone())))
        .reduce(|a, b| a.or(b));
    let Some(restriction) = restriction else {
        return Ok(table);
    };
    let rank: HashMap<&str, usize> = leaders
        .iter()
        .enumerate()
        .map(|(i, (key, _))| (key.as_str(), i))
        .collect();

    let frame = dataset
        .frame()
        .clone()
        .lazy()
        .filter(restriction)
        .group_by_stable([col(grain.column()), col(dimension.column())])
        .agg([col(measure.column()).sum()])
        .collect()?;
    let dates = date_values(&frame, grain.column())?;
    let keys = string_values(&frame, dimension.column())?;
    let values = float_values(&frame, measure.column())?;

    let mut order: Vec<usize> = (0..dates.len()).collect();
    order.sort_by_key(|&i| (dates[i], rank.get(keys[i].as_str()).copied().unwrap_or(usize::MAX)));
    for i in order {
        table.push_row(vec![
            Cell::Date(dates[i]),
            Cell::Text(keys[i].clone()),
            Cell::Number(values[i]),
        ]);
    }
    Ok(table)
}

pub fn scalar_sum(dataset: &Dataset, measure: Measure) -> Result<Scalar> {
    if dataset.is_empty() {
        return Ok(Scalar::NoData);
    }
    let series = dataset.frame().column(measure.column())?;
    Ok(Scalar::from_option(series.f64()?.sum()))
}

pub fn scalar_mean(dataset: &Dataset, measure: Measure) -> Result<Scalar> {
    if dataset.is_empty() {
        return Ok(Scalar::NoData);
    }
    let series = dataset.frame().column(measure.column())?;
    Ok(Scalar::from_option(series.f64()?.mean()))
}

pub fn row_count(dataset: &Dataset) -> usize {
    dataset.len()
}
