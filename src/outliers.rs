//! IQR outlier detection and capping over a single numeric column.

use crate::data_utils::{filter_rows, float_values, require_column};
use crate::error::{PipelineError, Result, Stage};
use polars::prelude::*;
use tracing::{info, warn};

pub const DEFAULT_IQR_MULTIPLIER: f64 = 1.5;

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct IqrBounds {
    pub q1: f64,
    pub q3: f64,
    pub iqr: f64,
    pub lower: f64,
    pub upper: f64,
}

impl IqrBounds {
    pub fn from_quartiles(q1: f64, q3: f64, multiplier: f64) -> Self {
        let iqr = q3 - q1;
        Self {
            q1,
            q3,
            iqr,
            lower: q1 - multiplier * iqr,
            upper: q3 + multiplier * iqr,
        }
    }

    /// Strictly outside `[lower, upper]`.
    pub fn is_outlier(&self, value: f64) -> bool {
        value < self.lower || value > self.upper
    }
}

fn quartile(ca: &Float64Chunked, q: f64, column: &str) -> Result<f64> {
    ca.quantile(q, QuantileInterpolOptions::Linear)?
        .ok_or_else(|| PipelineError::InsufficientData {
            stage: Stage::Outliers,
            column: column.to_string(),
            message: "no non-null values to compute quartiles from".to_string(),
        })
}

/// Q1 and Q3 by linear interpolation, and the bounds at `multiplier` × IQR.
pub fn iqr_bounds(df: &DataFrame, column: &str, multiplier: f64) -> Result<IqrBounds> {
    let series = require_column(df, column, Stage::Outliers)?;
    if !series.dtype().is_numeric() {
        return Err(PipelineError::schema(
            Stage::Outliers,
            format!("column '{}' is not numeric ({:?})", column, series.dtype()),
        ));
    }
    let series = series.cast(&DataType::Float64)?;
    let ca = series.f64()?;

    let q1 = quartile(ca, 0.25, column)?;
    let q3 = quartile(ca, 0.75, column)?;
    Ok(IqrBounds::from_quartiles(q1, q3, multiplier))
}

/// Bounds of `column`, or `None` when it holds no non-null values.
pub fn observed_bounds(df: &DataFrame, column: &str, multiplier: f64) -> Result<Option<IqrBounds>> {
    let series = require_column(df, column, Stage::Outliers)?;
    if series.len() == series.null_count() && series.dtype().is_numeric() {
        return Ok(None);
    }
    iqr_bounds(df, column, multiplier).map(Some)
}

/// Per-row outlier flag. Nulls are never outliers.
pub fn outlier_mask(df: &DataFrame, column: &str, bounds: &IqrBounds) -> Result<Vec<bool>> {
    Ok(float_values(df, column, Stage::Outliers)?
        .into_iter()
        .map(|v| v.map(|v| bounds.is_outlier(v)).unwrap_or(false))
        .collect())
}

/// Rows that are outliers on `column`, with the bounds used.
pub fn detect_outliers(df: &DataFrame, column: &str, multiplier: f64) -> Result<(DataFrame, IqrBounds)> {
    let bounds = iqr_bounds(df, column, multiplier)?;
    let mask = outlier_mask(df, column, &bounds)?;
    Ok((filter_rows(df, &mask)?, bounds))
}

pub fn outlier_count(df: &DataFrame, column: &str, bounds: &IqrBounds) -> Result<usize> {
    Ok(outlier_mask(df, column, bounds)?.into_iter().filter(|&o| o).count())
}

/// Copy of `df` with `column` clamped into the IQR bounds. Row count and all
/// other columns are unchanged.
pub fn cap_with_bounds(df: &DataFrame, column: &str, bounds: &IqrBounds) -> Result<DataFrame> {
    require_column(df, column, Stage::Outliers)?;
    let value = col(column).cast(DataType::Float64);
    let capped = df
        .clone()
        .lazy()
        .with_columns([when(value.clone().gt(lit(bounds.upper)))
            .then(lit(bounds.upper))
            .when(value.clone().lt(lit(bounds.lower)))
            .then(lit(bounds.lower))
            .otherwise(value)
            .alias(column)])
        .collect()?;
    Ok(capped)
}

/// Compute the bounds of `column` and cap it. A column with no values has
/// no bounds; the table is returned unchanged.
pub fn cap_outliers(df: &DataFrame, column: &str, multiplier: f64) -> Result<(DataFrame, Option<IqrBounds>)> {
    let Some(bounds) = observed_bounds(df, column, multiplier)? else {
        warn!(column, rows = df.height(), "no values to compute outlier bounds from, nothing capped");
        return Ok((df.clone(), None));
    };
    let outliers = outlier_count(df, column, &bounds)?;
    let capped = cap_with_bounds(df, column, &bounds)?;

    info!(
        column,
        q1 = bounds.q1,
        q3 = bounds.q3,
        lower = bounds.lower,
        upper = bounds.upper,
        outliers,
        "outliers capped"
    );
    Ok((capped, Some(bounds)))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn values() -> DataFrame {
        df![
            "name" => ["a", "b", "c", "d", "e"],
            "income" => [1.0, 2.0, 3.0, 4.0, 100.0],
        ]
        .unwrap()
    }

    #[test]
    fn test_iqr_bounds() {
        let bounds = iqr_bounds(&values(), "income", DEFAULT_IQR_MULTIPLIER).unwrap();
        assert_eq!(bounds.q1, 2.0);
        assert_eq!(bounds.q3, 4.0);
        assert_eq!(bounds.iqr, 2.0);
        assert_eq!(bounds.lower, -1.0);
        assert_eq!(bounds.upper, 7.0);
    }

    #[test]
    fn test_detect_single_outlier() {
        let (outliers, _) = detect_outliers(&values(), "income", DEFAULT_IQR_MULTIPLIER).unwrap();
        assert_eq!(outliers.height(), 1);
        assert_eq!(outliers.column("name").unwrap().str().unwrap().get(0), Some("e"));
    }

    #[test]
    fn test_capping_preserves_rows_and_bounds() {
        let df = values();
        let (capped, bounds) = cap_outliers(&df, "income", DEFAULT_IQR_MULTIPLIER).unwrap();
        let bounds = bounds.unwrap();

        assert_eq!(capped.height(), df.height());
        let capped_values = float_values(&capped, "income", Stage::Outliers).unwrap();
        assert_eq!(
            capped_values,
            vec![Some(1.0), Some(2.0), Some(3.0), Some(4.0), Some(7.0)]
        );
        for v in capped_values.into_iter().flatten() {
            assert!(bounds.lower <= v && v <= bounds.upper);
        }
        assert!(capped.column("name").unwrap().equals(df.column("name").unwrap()));
        assert_eq!(float_values(&df, "income", Stage::Outliers).unwrap()[4], Some(100.0));
    }

    #[test]
    fn test_lower_values_capped() {
        let df = df!["v" => [-100.0, 10.0, 11.0, 12.0, 13.0]].unwrap();
        let (capped, bounds) = cap_outliers(&df, "v", DEFAULT_IQR_MULTIPLIER).unwrap();
        assert_eq!(float_values(&capped, "v", Stage::Outliers).unwrap()[0], Some(bounds.unwrap().lower));
    }

    #[test]
    fn test_empty_column() {
        let df = df!["v" => Vec::<f64>::new()].unwrap();
        assert!(matches!(
            iqr_bounds(&df, "v", DEFAULT_IQR_MULTIPLIER),
            Err(PipelineError::InsufficientData { .. })
        ));
    }

    #[test]
    fn test_capping_empty_column_keeps_table() {
        let df = df![
            "name" => Vec::<&str>::new(),
            "income" => Vec::<f64>::new(),
        ]
        .unwrap();
        let (capped, bounds) = cap_outliers(&df, "income", DEFAULT_IQR_MULTIPLIER).unwrap();
        assert!(bounds.is_none());
        assert_eq!(capped.height(), 0);
        assert_eq!(capped.width(), 2);
    }

    #[test]
    fn test_all_null_column_has_no_bounds() {
        let df = df!["v" => [None::<f64>, None]].unwrap();
        assert_eq!(observed_bounds(&df, "v", DEFAULT_IQR_MULTIPLIER).unwrap(), None);
        let (capped, _) = cap_outliers(&df, "v", DEFAULT_IQR_MULTIPLIER).unwrap();
        assert_eq!(capped.height(), 2);
    }
}
