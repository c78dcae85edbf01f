//! Column profiling used to inspect each stage's output.

use crate::data_utils::require_column;
use crate::error::{PipelineError, Result, Stage};
use polars::prelude::*;

#[derive(Debug, Clone, PartialEq)]
pub struct ColumnProfile {
    pub column: String,
    pub data_type: String,
    pub null_count: usize,
    pub null_percentage: f64,
    pub total_count: usize,
}

/// Null count of every column, in column order.
pub fn missing_values(df: &DataFrame) -> Vec<ColumnProfile> {
    let total_count = df.height();
    df.get_columns()
        .iter()
        .map(|s| {
            let null_count = s.null_count();
            let null_percentage = if total_count > 0 {
                (null_count as f64 / total_count as f64) * 100.0
            } else {
                0.0
            };
            ColumnProfile {
                column: s.name().to_string(),
                data_type: format!("{:?}", s.dtype()),
                null_count,
                null_percentage,
                total_count,
            }
        })
        .collect()
}

pub const SUMMARY_STATISTICS: [&str; 8] = ["count", "mean", "std", "min", "25%", "50%", "75%", "max"];

/// count / mean / std / min / quartiles / max of each numeric column, one
/// output column per input column.
pub fn describe_numeric(df: &DataFrame, columns: &[&str]) -> Result<DataFrame> {
    let mut out = vec![Series::new("statistic", SUMMARY_STATISTICS.to_vec())];

    for &name in columns {
        let series = require_column(df, name, Stage::Query)?;
        if !series.dtype().is_numeric() {
            return Err(PipelineError::schema(
                Stage::Query,
                format!("column '{}' is not numeric ({:?})", name, series.dtype()),
            ));
        }
        let series = series.cast(&DataType::Float64)?;
        let ca = series.f64()?;
        let count = (ca.len() - ca.null_count()) as f64;

        let stats: Vec<Option<f64>> = vec![
            Some(count),
            ca.mean(),
            ca.std(1),
            ca.min(),
            ca.quantile(0.25, QuantileInterpolOptions::Linear)?,
            ca.quantile(0.5, QuantileInterpolOptions::Linear)?,
            ca.quantile(0.75, QuantileInterpolOptions::Linear)?,
            ca.max(),
        ];
        out.push(Series::new(name, stats));
    }

    Ok(DataFrame::new(out)?)
}

/// Numeric columns of `df`, in column order.
pub fn numeric_columns(df: &DataFrame) -> Vec<String> {
    df.get_columns()
        .iter()
        .filter(|s| s.dtype().is_numeric())
        .map(|s| s.name().to_string())
        .collect()
}
