//! Registry Normalizer
//!
//! Cleans the charity-registry extract. The steps run in a fixed order and
//! each one assumes the cleanup done by the steps before it.

use crate::config::SynonymEntry;
use crate::data_utils::{filter_rows, is_blank, put_string_column, require_column, string_values};
use crate::error::{Result, Stage};
use crate::schema::{CHARITY_NUMBER, COUNTRY_ESTABLISHED};
use polars::prelude::*;
use std::collections::{HashMap, HashSet};
use tracing::{info, warn};

/// Suffix left on identifiers that passed through a float column upstream.
pub const FLOAT_ARTIFACT: &str = ".0";

pub struct RegistryNormalizer {
    country_synonyms: HashMap<String, String>,
}

impl RegistryNormalizer {
    pub fn new(synonyms: &[SynonymEntry]) -> Self {
        let country_synonyms = synonyms
            .iter()
            .map(|e| (e.synonym.clone(), e.canonical.clone()))
            .collect();
        Self { country_synonyms }
    }

    pub fn normalize(&self, raw: &DataFrame) -> Result<DataFrame> {
        require_column(raw, CHARITY_NUMBER, Stage::RegistryNormalizer)?;
        let rows_in = raw.height();

        let df = coerce_to_text(raw)?;
        let df = strip_key_artifact(&df)?;
        let df = drop_duplicate_rows(&df)?;
        let df = drop_empty_rows(&df)?;
        let df = fill_blank_attributes(&df)?;
        let df = normalize_categories(&df, COUNTRY_ESTABLISHED, &self.country_synonyms)?;
        let df = enforce_unique_keys(&df)?;

        info!(rows_in, rows_out = df.height(), "registry normalized");
        Ok(df)
    }
}

/// Step 1: every column becomes text.
pub fn coerce_to_text(df: &DataFrame) -> Result<DataFrame> {
    let columns = df
        .get_columns()
        .iter()
        .map(|s| s.cast(&DataType::String))
        .collect::<PolarsResult<Vec<_>>>()?;
    Ok(DataFrame::new(columns)?)
}

/// Remove one trailing `.0` from a key. Only an exact suffix is removed.
pub fn strip_float_artifact(key: &str) -> &str {
    key.strip_suffix(FLOAT_ARTIFACT).unwrap_or(key)
}

/// Step 2: strip the float-formatting artifact from the identity key.
pub fn strip_key_artifact(df: &DataFrame) -> Result<DataFrame> {
    let keys = string_values(df, CHARITY_NUMBER, Stage::RegistryNormalizer)?;
    let stripped: Vec<Option<String>> = keys
        .into_iter()
        .map(|k| k.map(|k| strip_float_artifact(&k).to_string()))
        .collect();

    let mut out = df.clone();
    put_string_column(&mut out, CHARITY_NUMBER, stripped)?;
    Ok(out)
}

fn row_values(df: &DataFrame) -> Result<Vec<Vec<Option<String>>>> {
    let names: Vec<String> = df.get_column_names().iter().map(|s| s.to_string()).collect();
    let columns = names
        .iter()
        .map(|name| string_values(df, name, Stage::RegistryNormalizer))
        .collect::<Result<Vec<_>>>()?;

    let rows = (0..df.height())
        .map(|i| columns.iter().map(|c| c[i].clone()).collect())
        .collect();
    Ok(rows)
}

/// Step 3: remove rows equal in every column to an earlier row.
pub fn drop_duplicate_rows(df: &DataFrame) -> Result<DataFrame> {
    let rows = row_values(df)?;
    let mut seen = HashSet::with_capacity(rows.len());
    let keep: Vec<bool> = rows.into_iter().map(|row| seen.insert(row)).collect();
    filter_rows(df, &keep)
}

/// Step 4: remove rows whose every cell is null or blank.
pub fn drop_empty_rows(df: &DataFrame) -> Result<DataFrame> {
    let rows = row_values(df)?;
    let keep: Vec<bool> = rows
        .iter()
        .map(|row| !row.iter().all(|cell| is_blank(cell.as_deref())))
        .collect();
    filter_rows(df, &keep)
}

/// Step 5: null text attributes become empty strings. The key is left alone.
pub fn fill_blank_attributes(df: &DataFrame) -> Result<DataFrame> {
    let mut out = df.clone();
    let names: Vec<String> = df.get_column_names().iter().map(|s| s.to_string()).collect();
    for name in names.iter().filter(|n| n.as_str() != CHARITY_NUMBER) {
        let column = require_column(df, name, Stage::RegistryNormalizer)?;
        if column.null_count() == 0 {
            continue;
        }
        let filled = string_values(df, name, Stage::RegistryNormalizer)?
            .into_iter()
            .map(|v| Some(v.unwrap_or_default()))
            .collect();
        put_string_column(&mut out, name, filled)?;
    }
    Ok(out)
}

/// Step 6: map known synonyms of a categorical column to their canonical label.
pub fn normalize_categories(
    df: &DataFrame,
    column: &str,
    synonyms: &HashMap<String, String>,
) -> Result<DataFrame> {
    let values = string_values(df, column, Stage::RegistryNormalizer)?;
    let mut replaced = 0usize;
    let mapped: Vec<Option<String>> = values
        .into_iter()
        .map(|v| match v {
            Some(v) => match synonyms.get(&v) {
                Some(canonical) => {
                    replaced += 1;
                    Some(canonical.clone())
                }
                None => Some(v),
            },
            None => None,
        })
        .collect();

    info!(column, replaced, "categorical synonyms normalized");
    let mut out = df.clone();
    put_string_column(&mut out, column, mapped)?;
    Ok(out)
}

/// Rows without a key cannot be joined and a repeated key would multiply
/// filing rows in the join: drop the former, keep the first of the latter.
pub fn enforce_unique_keys(df: &DataFrame) -> Result<DataFrame> {
    let keys = string_values(df, CHARITY_NUMBER, Stage::RegistryNormalizer)?;
    let mut seen = HashSet::new();
    let mut blank = 0usize;
    let mut repeated = 0usize;

    let keep: Vec<bool> = keys
        .iter()
        .map(|key| {
            if is_blank(key.as_deref()) {
                blank += 1;
                false
            } else if !seen.insert(key.clone()) {
                repeated += 1;
                false
            } else {
                true
            }
        })
        .collect();

    if blank > 0 {
        warn!(rows = blank, "dropping registry rows without a charity number");
    }
    if repeated > 0 {
        warn!(rows = repeated, "dropping registry rows repeating an earlier charity number");
    }
    filter_rows(df, &keep)
}

/// Keys that still carry the float artifact.
pub fn artifact_keys(df: &DataFrame, stage: Stage) -> Result<Vec<String>> {
    let keys = string_values(df, CHARITY_NUMBER, stage)?;
    Ok(keys
        .into_iter()
        .flatten()
        .filter(|k| k.ends_with(FLOAT_ARTIFACT))
        .collect())
}

impl Default for RegistryNormalizer {
    fn default() -> Self {
        Self::new(&crate::config::default_country_synonyms())
    }
}
