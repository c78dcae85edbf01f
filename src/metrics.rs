//! Derived columns over the reconciled table.

use crate::data_utils::{put_string_column, require_columns, string_values};
use crate::error::{Result, Stage};
use crate::query::lead_token;
use crate::schema::{
    BENEFICIARIES, CHARITABLE_PURPOSE, CHARITY_PURPOSE, GROSS_EXPENDITURE, GROSS_INCOME, LEAD_BENEFICIARY,
    MULTI_VALUE_DELIMITER, NET_INCOME,
};
use polars::prelude::*;

/// `Total Net Income = Total Gross Income - Total Gross Expenditure` for every row.
pub fn add_net_income(df: &DataFrame) -> Result<DataFrame> {
    require_columns(df, &[GROSS_INCOME, GROSS_EXPENDITURE], Stage::DerivedMetrics)?;
    Ok(df
        .clone()
        .lazy()
        .with_columns([(col(GROSS_INCOME) - col(GROSS_EXPENDITURE)).alias(NET_INCOME)])
        .collect()?)
}

/// Add `target` holding the lead token of `source`. Null text stays null.
pub fn add_lead_token_column(df: &DataFrame, source: &str, target: &str) -> Result<DataFrame> {
    let tokens: Vec<Option<String>> = string_values(df, source, Stage::DerivedMetrics)?
        .into_iter()
        .map(|v| v.map(|text| lead_token(&text, MULTI_VALUE_DELIMITER).to_string()))
        .collect();

    let mut out = df.clone();
    put_string_column(&mut out, target, tokens)?;
    Ok(out)
}

/// Net income, lead beneficiary and charity purpose.
pub fn derive_metrics(reconciled: &DataFrame) -> Result<DataFrame> {
    let df = add_net_income(reconciled)?;
    let df = add_lead_token_column(&df, BENEFICIARIES, LEAD_BENEFICIARY)?;
    add_lead_token_column(&df, CHARITABLE_PURPOSE, CHARITY_PURPOSE)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::data_utils::float_values;

    fn reconciled() -> DataFrame {
        df![
            GROSS_INCOME => [100.0, 0.0, 50.5],
            GROSS_EXPENDITURE => [40.0, 25.0, 0.0],
            BENEFICIARIES => [Some("Children; Elderly; Animals"), Some(""), None],
            CHARITABLE_PURPOSE => [Some("Advancement of education;Relief of poverty"), Some(""), None],
        ]
        .unwrap()
    }

    #[test]
    fn test_net_income_law() {
        let df = derive_metrics(&reconciled()).unwrap();
        let income = float_values(&df, GROSS_INCOME, Stage::DerivedMetrics).unwrap();
        let spend = float_values(&df, GROSS_EXPENDITURE, Stage::DerivedMetrics).unwrap();
        let net = float_values(&df, NET_INCOME, Stage::DerivedMetrics).unwrap();
        for ((i, s), n) in income.iter().zip(&spend).zip(&net) {
            assert_eq!(n.unwrap(), i.unwrap() - s.unwrap());
        }
        assert_eq!(net, vec![Some(60.0), Some(-25.0), Some(50.5)]);
    }

    #[test]
    fn test_lead_tokens() {
        let df = derive_metrics(&reconciled()).unwrap();
        assert_eq!(
            string_values(&df, LEAD_BENEFICIARY, Stage::DerivedMetrics).unwrap(),
            vec![Some("Children".to_string()), Some(String::new()), None]
        );
        assert_eq!(
            string_values(&df, CHARITY_PURPOSE, Stage::DerivedMetrics).unwrap()[0],
            Some("Advancement of education".to_string())
        );
    }

    #[test]
    fn test_input_is_untouched() {
        let input = reconciled();
        let _ = derive_metrics(&input).unwrap();
        assert!(input.column(NET_INCOME).is_err());
        assert_eq!(input.width(), 4);
    }
}
