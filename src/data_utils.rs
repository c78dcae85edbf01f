use crate::error::{PipelineError, Result, Stage};
use polars::prelude::*;

/// Look up a column, reporting the stage that needed it when absent.
pub fn require_column<'a>(df: &'a DataFrame, name: &str, stage: Stage) -> Result<&'a Series> {
    df.column(name).map_err(|_| {
        PipelineError::schema(
            stage,
            format!(
                "column '{}' not found (available: {:?})",
                name,
                df.get_column_names()
            ),
        )
    })
}

pub fn require_columns(df: &DataFrame, names: &[&str], stage: Stage) -> Result<()> {
    for name in names {
        require_column(df, name, stage)?;
    }
    Ok(())
}

/// Column values as owned text, casting non-text columns first.
pub fn string_values(df: &DataFrame, name: &str, stage: Stage) -> Result<Vec<Option<String>>> {
    let series = require_column(df, name, stage)?.cast(&DataType::String)?;
    let values = series
        .str()?
        .into_iter()
        .map(|v| v.map(|s| s.to_string()))
        .collect();
    Ok(values)
}

/// Column values as `f64`, casting integer columns first.
pub fn float_values(df: &DataFrame, name: &str, stage: Stage) -> Result<Vec<Option<f64>>> {
    let series = require_column(df, name, stage)?;
    if !series.dtype().is_numeric() {
        return Err(PipelineError::schema(
            stage,
            format!("column '{}' is not numeric ({:?})", name, series.dtype()),
        ));
    }
    let series = series.cast(&DataType::Float64)?;
    let values = series.f64()?.into_iter().collect();
    Ok(values)
}

/// True for null, empty and whitespace-only cells.
pub fn is_blank(value: Option<&str>) -> bool {
    value.map(|s| s.trim().is_empty()).unwrap_or(true)
}

/// Collapse every whitespace run (line breaks included) into one space.
pub fn collapse_whitespace(label: &str) -> String {
    label.split_whitespace().collect::<Vec<_>>().join(" ")
}

/// Replace (or append) a text column built from owned values.
pub fn put_string_column(df: &mut DataFrame, name: &str, values: Vec<Option<String>>) -> Result<()> {
    df.with_column(Series::new(name, values))?;
    Ok(())
}

/// Keep the rows flagged `true`.
pub fn filter_rows(df: &DataFrame, keep: &[bool]) -> Result<DataFrame> {
    let mask: BooleanChunked = keep.iter().copied().collect();
    Ok(df.filter(&mask)?)
}

/// Rows in the given order.
pub fn take_rows(df: &DataFrame, indices: &[usize]) -> Result<DataFrame> {
    let idx: Vec<IdxSize> = indices.iter().map(|&i| i as IdxSize).collect();
    let idx = IdxCa::from_vec("idx", idx);
    Ok(df.take(&idx)?)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_collapse_whitespace() {
        assert_eq!(collapse_whitespace("Registered\nCharity\nNumber"), "Registered Charity Number");
        assert_eq!(collapse_whitespace("Period\r\n Start Date "), "Period Start Date");
        assert_eq!(collapse_whitespace("Status"), "Status");
    }

    #[test]
    fn test_is_blank() {
        assert!(is_blank(None));
        assert!(is_blank(Some("")));
        assert!(is_blank(Some("  \t")));
        assert!(!is_blank(Some("x")));
    }

    #[test]
    fn test_missing_column_is_schema_error() {
        let df = df!["a" => ["1"]].unwrap();
        let err = string_values(&df, "b", Stage::Query).unwrap_err();
        assert!(matches!(err, PipelineError::Schema { stage: Stage::Query, .. }));
    }

    #[test]
    fn test_float_values_rejects_text() {
        let df = df!["a" => ["1"], "n" => [2i64]].unwrap();
        assert!(float_values(&df, "a", Stage::Query).is_err());
        assert_eq!(float_values(&df, "n", Stage::Query).unwrap(), vec![Some(2.0)]);
    }

    #[test]
    fn test_take_and_filter() {
        let df = df!["a" => ["x", "y", "z"]].unwrap();
        let taken = take_rows(&df, &[2, 0]).unwrap();
        assert_eq!(string_values(&taken, "a", Stage::Query).unwrap(), vec![Some("z".to_string()), Some("x".to_string())]);

        let filtered = filter_rows(&df, &[false, true, false]).unwrap();
        assert_eq!(filtered.height(), 1);
    }
}
