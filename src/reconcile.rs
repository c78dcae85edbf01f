//! Reconciler - joins the normalized registry onto the period-filtered filings

use crate::data_utils::{require_column, string_values};
use crate::error::{PipelineError, Result, Stage};
use crate::registry::artifact_keys;
use crate::schema::{CHARITY_NAME, CHARITY_NUMBER, CURRENCY_COLUMNS};
use polars::prelude::*;
use std::collections::HashSet;
use tracing::{info, warn};

/// Suffix Polars gives the right-hand copy of a column present on both sides.
const RIGHT_SUFFIX: &str = "_right";

/// Outcome of checking that the two key columns can be joined.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct JoinKeyReport {
    pub registry_keys: usize,
    pub filing_rows: usize,
    pub matched_rows: usize,
    pub unmatched_rows: usize,
}

/// Check both key columns are present, textual and free of the float
/// artifact, and count how many filing rows will find a registry match.
pub fn validate_join_keys(registry: &DataFrame, filings: &DataFrame) -> Result<JoinKeyReport> {
    let registry_key = require_column(registry, CHARITY_NUMBER, Stage::Reconciler)?;
    let filing_key = require_column(filings, CHARITY_NUMBER, Stage::Reconciler)?;

    if registry_key.dtype() != &DataType::String || filing_key.dtype() != &DataType::String {
        return Err(PipelineError::JoinKeyMismatch(format!(
            "'{}' is {:?} in the registry and {:?} in the filings; both must be text",
            CHARITY_NUMBER,
            registry_key.dtype(),
            filing_key.dtype()
        )));
    }

    for (side, df) in [("registry", registry), ("filings", filings)] {
        let artifacts = artifact_keys(df, Stage::Reconciler)?;
        if let Some(example) = artifacts.first() {
            return Err(PipelineError::JoinKeyMismatch(format!(
                "{} {} key(s) in the {} still carry a '.0' suffix (e.g. '{}')",
                artifacts.len(),
                CHARITY_NUMBER,
                side,
                example
            )));
        }
    }

    let registry_keys: HashSet<String> = string_values(registry, CHARITY_NUMBER, Stage::Reconciler)?
        .into_iter()
        .flatten()
        .collect();
    let filing_keys = string_values(filings, CHARITY_NUMBER, Stage::Reconciler)?;
    let matched_rows = filing_keys
        .iter()
        .filter(|k| k.as_ref().map(|k| registry_keys.contains(k)).unwrap_or(false))
        .count();

    Ok(JoinKeyReport {
        registry_keys: registry_keys.len(),
        filing_rows: filing_keys.len(),
        matched_rows,
        unmatched_rows: filing_keys.len() - matched_rows,
    })
}

/// Right-outer join of registry and filings on the charity number.
///
/// Every filing row is kept in its original order; registry attributes are
/// null where no registry row matches, and registry-only charities drop out.
/// The registry's charity name is kept, the filing copy is discarded, and the
/// financial columns take their analytic names.
pub fn reconcile(registry: &DataFrame, filings: &DataFrame) -> Result<DataFrame> {
    let report = validate_join_keys(registry, filings)?;
    require_column(registry, CHARITY_NAME, Stage::Reconciler)?;
    require_column(filings, CHARITY_NAME, Stage::Reconciler)?;
    if report.unmatched_rows > 0 {
        warn!(
            rows = report.unmatched_rows,
            "filings without a registry match keep null registry attributes"
        );
    }

    // Polars has no right join here: left-join with the sides swapped.
    let joined = filings
        .clone()
        .lazy()
        .join(
            registry.clone().lazy(),
            [col(CHARITY_NUMBER)],
            [col(CHARITY_NUMBER)],
            JoinArgs::new(JoinType::Left),
        )
        .collect()?;

    if joined.height() != filings.height() {
        return Err(PipelineError::schema(
            Stage::Reconciler,
            format!(
                "join changed the filing row count from {} to {}",
                filings.height(),
                joined.height()
            ),
        ));
    }

    let registry_name = format!("{}{}", CHARITY_NAME, RIGHT_SUFFIX);
    let mut out = joined.drop(CHARITY_NAME)?;
    out.rename(&registry_name, CHARITY_NAME)?;
    for currency in CURRENCY_COLUMNS.iter() {
        out.rename(currency.raw, currency.analytic)?;
    }

    let out = out.select(column_order(registry, filings))?;

    info!(
        rows = out.height(),
        matched = report.matched_rows,
        unmatched = report.unmatched_rows,
        "registry and filings reconciled"
    );
    Ok(out)
}

/// Registry columns first, then the filing columns (analytic names).
fn column_order(registry: &DataFrame, filings: &DataFrame) -> Vec<String> {
    let mut order: Vec<String> = registry.get_column_names().iter().map(|s| s.to_string()).collect();
    for name in filings.get_column_names() {
        if name == CHARITY_NUMBER || name == CHARITY_NAME {
            continue;
        }
        let analytic = CURRENCY_COLUMNS
            .iter()
            .find(|c| c.raw == name)
            .map(|c| c.analytic)
            .unwrap_or(name);
        order.push(analytic.to_string());
    }
    order
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::schema::*;

    fn registry() -> DataFrame {
        df![
            CHARITY_NUMBER => ["20136598", "20000010", "20999999"],
            CHARITY_NAME => ["Alpha Trust (registry)", "Beta CLG (registry)", "Registry Only"],
            GOVERNING_FORM => ["Trust", "CLG", "Trust"],
        ]
        .unwrap()
    }

    fn filings() -> DataFrame {
        let mut columns = vec![
            Series::new(CHARITY_NUMBER, ["20000010", "20136598", "30000000"]),
            Series::new(CHARITY_NAME, ["Beta (filing)", "Alpha (filing)", "Unregistered"]),
        ];
        for (i, c) in CURRENCY_COLUMNS.iter().enumerate() {
            columns.push(Series::new(c.raw, [i as f64, 10.0 * i as f64, 0.0]));
        }
        DataFrame::new(columns).unwrap()
    }

    #[test]
    fn test_right_join_preserves_filing_rows() {
        let out = reconcile(&registry(), &filings()).unwrap();
        assert_eq!(out.height(), filings().height());

        let keys = string_values(&out, CHARITY_NUMBER, Stage::Reconciler).unwrap();
        assert_eq!(
            keys,
            vec![Some("20000010".to_string()), Some("20136598".to_string()), Some("30000000".to_string())]
        );
    }

    #[test]
    fn test_registry_name_is_canonical() {
        let out = reconcile(&registry(), &filings()).unwrap();
        let names = string_values(&out, CHARITY_NAME, Stage::Reconciler).unwrap();
        assert_eq!(
            names,
            vec![Some("Beta CLG (registry)".to_string()), Some("Alpha Trust (registry)".to_string()), None]
        );
        assert!(out.column(&format!("{}{}", CHARITY_NAME, RIGHT_SUFFIX)).is_err());
    }

    #[test]
    fn test_financial_columns_renamed() {
        let out = reconcile(&registry(), &filings()).unwrap();
        for c in CURRENCY_COLUMNS.iter() {
            assert!(out.column(c.analytic).is_ok());
            assert!(out.column(c.raw).is_err());
        }
        assert_eq!(out.get_column_names()[0], CHARITY_NUMBER);
        assert_eq!(out.get_column_names()[2], GOVERNING_FORM);
    }

    #[test]
    fn test_artifact_key_is_mismatch() {
        let registry = df![
            CHARITY_NUMBER => ["20136598.0"],
            CHARITY_NAME => ["Alpha"],
        ]
        .unwrap();
        let err = reconcile(&registry, &filings()).unwrap_err();
        assert!(matches!(err, PipelineError::JoinKeyMismatch(_)));
    }

    #[test]
    fn test_numeric_key_is_mismatch() {
        let registry = df![
            CHARITY_NUMBER => [20136598i64],
            CHARITY_NAME => ["Alpha"],
        ]
        .unwrap();
        assert!(matches!(
            validate_join_keys(&registry, &filings()),
            Err(PipelineError::JoinKeyMismatch(_))
        ));
    }

    #[test]
    fn test_join_key_report() {
        let report = validate_join_keys(&registry(), &filings()).unwrap();
        assert_eq!(report.matched_rows, 2);
        assert_eq!(report.unmatched_rows, 1);
        assert_eq!(report.registry_keys, 3);
    }
}
