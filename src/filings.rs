//! Filing Normalizer
//!
//! Cleans the annual-report extract and keeps only the filings whose
//! reporting period is exactly the target calendar year.

use crate::data_utils::{collapse_whitespace, filter_rows, is_blank, require_columns, string_values};
use crate::error::{PipelineError, Result, Stage};
use crate::schema::{raw_currency_columns, CHARITY_NUMBER, PERIOD_END, PERIOD_START};
use chrono::NaiveDate;
use lazy_static::lazy_static;
use polars::prelude::*;
use regex::Regex;
use tracing::{debug, info, warn};

lazy_static! {
    /// Everything that is not part of a signed decimal literal: currency
    /// symbols (including their mojibake), thousands separators, spaces.
    static ref NON_NUMERIC_RE: Regex = Regex::new(r"[^0-9.+\-]").unwrap();
}

pub struct FilingNormalizer {
    date_format: String,
    period_start: NaiveDate,
    period_end: NaiveDate,
}

impl FilingNormalizer {
    pub fn new(date_format: &str, period_start: NaiveDate, period_end: NaiveDate) -> Self {
        Self {
            date_format: date_format.to_string(),
            period_start,
            period_end,
        }
    }

    /// Normalizer for the calendar year `year` with the given date format.
    pub fn for_year(date_format: &str, year: i32) -> Result<Self> {
        let start = NaiveDate::from_ymd_opt(year, 1, 1);
        let end = NaiveDate::from_ymd_opt(year, 12, 31);
        match (start, end) {
            (Some(start), Some(end)) => Ok(Self::new(date_format, start, end)),
            _ => Err(PipelineError::Config(format!("Target year out of range: {}", year))),
        }
    }

    pub fn normalize(&self, raw: &DataFrame) -> Result<DataFrame> {
        let rows_in = raw.height();

        let df = normalize_headers(raw)?;
        let currency = raw_currency_columns();
        let mut required = vec![CHARITY_NUMBER, PERIOD_START, PERIOD_END];
        required.extend(currency.iter().copied());
        require_columns(&df, &required, Stage::FilingNormalizer)?;

        let df = coerce_dates(&df, &[PERIOD_START, PERIOD_END], &self.date_format)?;
        let mut non_text = vec![PERIOD_START, PERIOD_END];
        non_text.extend(currency.iter().copied());
        let df = coerce_text_columns(&df, &non_text)?;
        let df = clean_currency_columns(&df, &currency)?;
        let df = filter_period(&df, self.period_start, self.period_end)?;

        info!(
            rows_in,
            rows_out = df.height(),
            period_start = %self.period_start,
            period_end = %self.period_end,
            "filings normalized"
        );
        Ok(df)
    }
}

/// Step 1: collapse multi-line labels to single-line names. The raw key
/// label `Registered\nCharity\nNumber` becomes the registry's key name.
pub fn normalize_headers(df: &DataFrame) -> Result<DataFrame> {
    let columns: Vec<Series> = df
        .get_columns()
        .iter()
        .map(|s| {
            let mut renamed = s.clone();
            let name = collapse_whitespace(s.name());
            if name != s.name() {
                debug!(from = s.name(), to = %name, "renamed filing column");
            }
            renamed.rename(&name);
            renamed
        })
        .collect();

    DataFrame::new(columns)
        .map_err(|e| PipelineError::schema(Stage::FilingNormalizer, format!("header normalization failed: {}", e)))
}

/// Parse one period-boundary value. Blank values stay null.
pub fn parse_period_date(value: Option<&str>, format: &str) -> std::result::Result<Option<NaiveDate>, String> {
    match value {
        Some(v) if !v.trim().is_empty() => NaiveDate::parse_from_str(v.trim(), format)
            .map(Some)
            .map_err(|_| v.to_string()),
        _ => Ok(None),
    }
}

/// Step 2: coerce the period-boundary columns to dates.
pub fn coerce_dates(df: &DataFrame, columns: &[&str], format: &str) -> Result<DataFrame> {
    let mut out = df.clone();
    for &column in columns {
        let values = string_values(df, column, Stage::FilingNormalizer)?;
        let mut dates: Vec<Option<NaiveDate>> = Vec::with_capacity(values.len());
        for (row, value) in values.iter().enumerate() {
            let date = parse_period_date(value.as_deref(), format).map_err(|value| PipelineError::DateParse {
                stage: Stage::FilingNormalizer,
                column: column.to_string(),
                row: row + 1,
                value,
                format: format.to_string(),
            })?;
            dates.push(date);
        }
        out.with_column(Series::new(column, dates))?;
    }
    Ok(out)
}

/// Step 3: every column not listed in `except` becomes text.
pub fn coerce_text_columns(df: &DataFrame, except: &[&str]) -> Result<DataFrame> {
    let columns = df
        .get_columns()
        .iter()
        .map(|s| {
            if except.contains(&s.name()) {
                Ok(s.clone())
            } else {
                s.cast(&DataType::String)
            }
        })
        .collect::<PolarsResult<Vec<_>>>()?;
    Ok(DataFrame::new(columns)?)
}

/// Strip every character that cannot belong to a signed decimal literal.
pub fn strip_non_numeric(raw: &str) -> String {
    NON_NUMERIC_RE.replace_all(raw, "").into_owned()
}

/// Clean one currency cell: `Ok(None)` when nothing numeric remains,
/// `Err(cleaned)` when the remainder is not a real-number literal.
pub fn parse_currency(raw: &str) -> std::result::Result<Option<f64>, String> {
    let cleaned = strip_non_numeric(raw);
    if cleaned.is_empty() {
        return Ok(None);
    }
    cleaned.parse::<f64>().map(Some).map_err(|_| cleaned)
}

/// Steps 4 and 5 for one column: strip, parse, default missing values to zero.
pub fn clean_currency_column(df: &DataFrame, column: &str) -> Result<Series> {
    let values = string_values(df, column, Stage::FilingNormalizer)?;
    let mut amounts: Vec<f64> = Vec::with_capacity(values.len());
    let mut defaulted = 0usize;
    let mut negative = 0usize;

    for (row, value) in values.iter().enumerate() {
        let parsed = match value.as_deref() {
            Some(raw) => parse_currency(raw).map_err(|cleaned| PipelineError::CurrencyParse {
                stage: Stage::FilingNormalizer,
                column: column.to_string(),
                row: row + 1,
                value: raw.to_string(),
                cleaned,
            })?,
            None => None,
        };
        let amount = match parsed {
            Some(amount) => amount,
            None => {
                defaulted += 1;
                0.0
            }
        };
        if amount < 0.0 {
            negative += 1;
        }
        amounts.push(amount);
    }

    debug!(column, defaulted, "currency column cleaned");
    if negative > 0 {
        warn!(column, rows = negative, "negative currency amounts kept as filed");
    }
    Ok(Series::new(column, amounts))
}

/// Steps 4 and 5 over every currency column.
pub fn clean_currency_columns(df: &DataFrame, columns: &[&str]) -> Result<DataFrame> {
    let mut out = df.clone();
    for column in columns {
        out.with_column(clean_currency_column(df, column)?)?;
    }
    Ok(out)
}

/// Step 6: exact-equality period filter. Partial or misaligned periods are dropped.
pub fn filter_period(df: &DataFrame, start: NaiveDate, end: NaiveDate) -> Result<DataFrame> {
    let starts = period_dates(df, PERIOD_START)?;
    let ends = period_dates(df, PERIOD_END)?;
    let keep: Vec<bool> = starts
        .iter()
        .zip(ends.iter())
        .map(|(s, e)| *s == Some(start) && *e == Some(end))
        .collect();
    filter_rows(df, &keep)
}

fn period_dates(df: &DataFrame, column: &str) -> Result<Vec<Option<NaiveDate>>> {
    let series = crate::data_utils::require_column(df, column, Stage::FilingNormalizer)?;
    Ok(series.date()?.as_date_iter().collect())
}

/// Number of filings whose key is blank; they can never match a registry row.
pub fn blank_key_count(df: &DataFrame) -> Result<usize> {
    let keys = string_values(df, CHARITY_NUMBER, Stage::FilingNormalizer)?;
    Ok(keys.iter().filter(|k| is_blank(k.as_deref())).count())
}
