//! Query Layer
//!
//! Stateless aggregation and ranking over the reconciled (or capped) table.
//! Nothing here mutates its input.

use crate::data_utils::{float_values, require_column, take_rows};
use crate::error::{PipelineError, Result, Stage};
use polars::prelude::*;
use std::cmp::Ordering;
use std::collections::HashMap;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SortDirection {
    /// Largest values first.
    Descending,
    /// Smallest values first.
    Ascending,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CompareOp {
    Eq,
    NotEq,
    Gt,
    GtEq,
    Lt,
    LtEq,
}

/// `column <op> value` over a numeric column.
#[derive(Debug, Clone, PartialEq)]
pub struct Predicate {
    pub column: String,
    pub op: CompareOp,
    pub value: f64,
}

impl Predicate {
    pub fn new(column: &str, op: CompareOp, value: f64) -> Self {
        Self {
            column: column.to_string(),
            op,
            value,
        }
    }

    fn to_expr(&self) -> Expr {
        let c = col(&self.column);
        let v = lit(self.value);
        match self.op {
            CompareOp::Eq => c.eq(v),
            CompareOp::NotEq => c.neq(v),
            CompareOp::Gt => c.gt(v),
            CompareOp::GtEq => c.gt_eq(v),
            CompareOp::Lt => c.lt(v),
            CompareOp::LtEq => c.lt_eq(v),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Aggregation {
    /// Non-null values of the value column per group.
    Count,
    Sum,
}

fn require_numeric(df: &DataFrame, column: &str) -> Result<()> {
    let series = require_column(df, column, Stage::Query)?;
    if !series.dtype().is_numeric() {
        return Err(PipelineError::schema(
            Stage::Query,
            format!("column '{}' is not numeric ({:?})", column, series.dtype()),
        ));
    }
    Ok(())
}

/// Sum of every non-null value in `column`.
pub fn total_of_column(df: &DataFrame, column: &str) -> Result<f64> {
    Ok(float_values(df, column, Stage::Query)?.into_iter().flatten().sum())
}

/// The `n` rows with the largest (or smallest) values of `column`. Ties keep
/// their original row order; nulls rank last in both directions.
pub fn top_n_by(df: &DataFrame, column: &str, n: usize, direction: SortDirection) -> Result<DataFrame> {
    let values = float_values(df, column, Stage::Query)?;
    let mut order: Vec<usize> = (0..values.len()).collect();
    order.sort_by(|&a, &b| match (values[a], values[b]) {
        (Some(x), Some(y)) => {
            let ord = x.partial_cmp(&y).unwrap_or(Ordering::Equal);
            match direction {
                SortDirection::Ascending => ord,
                SortDirection::Descending => ord.reverse(),
            }
        }
        (Some(_), None) => Ordering::Less,
        (None, Some(_)) => Ordering::Greater,
        (None, None) => Ordering::Equal,
    });
    order.truncate(n);
    take_rows(df, &order)
}

/// Rows satisfying `predicate`.
pub fn filter_where(df: &DataFrame, predicate: &Predicate) -> Result<DataFrame> {
    require_numeric(df, &predicate.column)?;
    Ok(df.clone().lazy().filter(predicate.to_expr()).collect()?)
}

/// Number of rows satisfying `predicate`.
pub fn count_where(df: &DataFrame, predicate: &Predicate) -> Result<usize> {
    Ok(filter_where(df, predicate)?.height())
}

/// One row per distinct non-null `group` value, in order of first appearance,
/// with the aggregated `value` column (as `f64`) under its own name.
pub fn group_aggregate(df: &DataFrame, group: &str, value: &str, aggregation: Aggregation) -> Result<DataFrame> {
    require_column(df, group, Stage::Query)?;
    let agg = match aggregation {
        Aggregation::Count => {
            require_column(df, value, Stage::Query)?;
            col(value).count().cast(DataType::Float64).alias(value)
        }
        Aggregation::Sum => {
            require_numeric(df, value)?;
            col(value).cast(DataType::Float64).sum().alias(value)
        }
    };

    Ok(df
        .clone()
        .lazy()
        .filter(col(group).is_not_null())
        .group_by_stable([col(group)])
        .agg([agg])
        .collect()?)
}

/// Sums of several value columns per distinct `group` value.
pub fn group_sum_many(df: &DataFrame, group: &str, values: &[&str]) -> Result<DataFrame> {
    require_column(df, group, Stage::Query)?;
    let mut aggs = Vec::with_capacity(values.len());
    for value in values {
        require_numeric(df, value)?;
        aggs.push(col(value).cast(DataType::Float64).sum().alias(value));
    }

    Ok(df
        .clone()
        .lazy()
        .filter(col(group).is_not_null())
        .group_by_stable([col(group)])
        .agg(aggs)
        .collect()?)
}

/// `group_aggregate` as a map from group value to aggregate.
pub fn group_aggregate_map(
    df: &DataFrame,
    group: &str,
    value: &str,
    aggregation: Aggregation,
) -> Result<HashMap<String, f64>> {
    let grouped = group_aggregate(df, group, value, aggregation)?;
    let keys = crate::data_utils::string_values(&grouped, group, Stage::Query)?;
    let totals = float_values(&grouped, value, Stage::Query)?;
    Ok(keys
        .into_iter()
        .zip(totals)
        .filter_map(|(k, v)| Some((k?, v.unwrap_or(0.0))))
        .collect())
}

/// First `delimiter`-separated token of a multi-value field, trimmed.
pub fn lead_token<'a>(text: &'a str, delimiter: &str) -> &'a str {
    text.split(delimiter).next().unwrap_or("").trim()
}
