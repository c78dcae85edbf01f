//! Fixed analysis questions over the reconciled table.

use crate::config::PipelineConfig;
use crate::data_utils::require_column;
use crate::error::{Result, Stage};
use crate::outliers::{cap_with_bounds, observed_bounds, outlier_count, IqrBounds};
use crate::pipeline::PipelineOutput;
use crate::query::{
    count_where, filter_where, group_aggregate, group_sum_many, top_n_by, total_of_column, Aggregation, CompareOp,
    Predicate, SortDirection,
};
use crate::schema::{
    financial_columns, CHARITY_NAME, CHARITY_NUMBER, CHARITY_PURPOSE, COUNTRY_ESTABLISHED, GOVERNING_FORM,
    GROSS_EXPENDITURE, GROSS_INCOME, INCOME_DONATIONS, LEAD_BENEFICIARY, NET_INCOME,
};
use polars::prelude::*;
use std::fmt;

/// Threshold of the "large charity" question.
pub const HALF_BILLION: f64 = 500_000_000.0;

/// Value column of the count rankings.
pub const CHARITY_COUNT: &str = "Charities";

#[derive(Debug, Clone)]
pub struct OutlierSummary {
    pub column: String,
    pub bounds: IqrBounds,
    pub outliers: usize,
    pub total_before: f64,
    pub total_after: f64,
}

#[derive(Debug, Clone)]
pub struct AnalysisReport {
    pub year: i32,
    pub charities: usize,
    pub total_gross_income: f64,
    pub top_income: DataFrame,
    pub top_expenditure: DataFrame,
    pub top_net_income: DataFrame,
    pub bottom_net_income: DataFrame,
    pub zero_income_count: usize,
    pub top_donations: DataFrame,
    pub half_billion: DataFrame,
    pub beneficiaries_by_count: DataFrame,
    pub beneficiaries_by_expenditure: DataFrame,
    pub purposes_by_count: DataFrame,
    pub purposes_by_expenditure: DataFrame,
    pub governing_forms_by_count: DataFrame,
    pub governing_forms_by_expenditure: DataFrame,
    /// `None` when the outlier column had no values to bound.
    pub outliers: Option<OutlierSummary>,
    pub country_totals: DataFrame,
}

impl AnalysisReport {
    /// Answer every question over `df`, capping summary included.
    pub fn build(df: &DataFrame, config: &PipelineConfig) -> Result<Self> {
        let bounds = observed_bounds(df, &config.outlier_column, config.iqr_multiplier)?;
        Self::assemble(df, df, bounds, config)
    }

    /// Answer the questions over the output's analysis table. The capping
    /// summary always describes the raw reconciled table and the bounds the
    /// pipeline capped it with.
    pub fn from_output(output: &PipelineOutput, config: &PipelineConfig) -> Result<Self> {
        Self::assemble(output.analysis_frame(), &output.reconciled, output.bounds, config)
    }

    fn assemble(df: &DataFrame, raw: &DataFrame, bounds: Option<IqrBounds>, config: &PipelineConfig) -> Result<Self> {
        let n = config.top_n;

        let half_billion = filter_where(df, &Predicate::new(GROSS_INCOME, CompareOp::GtEq, HALF_BILLION))?;
        let half_billion = top_n_by(&half_billion, GROSS_INCOME, half_billion.height(), SortDirection::Descending)?;

        let mut country_values = financial_columns();
        country_values.push(NET_INCOME);

        Ok(Self {
            year: config.target_year,
            charities: df.height(),
            total_gross_income: total_of_column(df, GROSS_INCOME)?,
            top_income: ranked_rows(df, GROSS_INCOME, n, SortDirection::Descending)?,
            top_expenditure: ranked_rows(df, GROSS_EXPENDITURE, n, SortDirection::Descending)?,
            top_net_income: ranked_rows(df, NET_INCOME, n, SortDirection::Descending)?,
            bottom_net_income: ranked_rows(df, NET_INCOME, n, SortDirection::Ascending)?,
            zero_income_count: count_where(df, &Predicate::new(GROSS_INCOME, CompareOp::Eq, 0.0))?,
            top_donations: ranked_rows(df, INCOME_DONATIONS, n, SortDirection::Descending)?,
            half_billion: half_billion.select([CHARITY_NAME, GROSS_INCOME])?,
            beneficiaries_by_count: ranked_groups(df, LEAD_BENEFICIARY, Aggregation::Count, n)?,
            beneficiaries_by_expenditure: ranked_groups(df, LEAD_BENEFICIARY, Aggregation::Sum, n)?,
            purposes_by_count: ranked_groups(df, CHARITY_PURPOSE, Aggregation::Count, n)?,
            purposes_by_expenditure: ranked_groups(df, CHARITY_PURPOSE, Aggregation::Sum, n)?,
            governing_forms_by_count: ranked_groups(df, GOVERNING_FORM, Aggregation::Count, n)?,
            governing_forms_by_expenditure: ranked_groups(df, GOVERNING_FORM, Aggregation::Sum, n)?,
            outliers: bounds
                .map(|bounds| summarize_outliers(raw, &config.outlier_column, bounds))
                .transpose()?,
            country_totals: group_sum_many(df, COUNTRY_ESTABLISHED, &country_values)?,
        })
    }
}

/// Top rows on `column`, reduced to the charity name and that column.
fn ranked_rows(df: &DataFrame, column: &str, n: usize, direction: SortDirection) -> Result<DataFrame> {
    let ranked = top_n_by(df, column, n, direction)?;
    Ok(ranked.select([CHARITY_NAME, column])?)
}

/// Groups of `group` ranked by charity count or by summed expenditure.
fn ranked_groups(df: &DataFrame, group: &str, aggregation: Aggregation, n: usize) -> Result<DataFrame> {
    require_column(df, group, Stage::Query)?;
    let value = match aggregation {
        Aggregation::Count => {
            let mut grouped = group_aggregate(df, group, CHARITY_NUMBER, Aggregation::Count)?;
            grouped.rename(CHARITY_NUMBER, CHARITY_COUNT)?;
            return top_n_by(&grouped, CHARITY_COUNT, n, SortDirection::Descending);
        }
        Aggregation::Sum => GROSS_EXPENDITURE,
    };
    let grouped = group_aggregate(df, group, value, Aggregation::Sum)?;
    top_n_by(&grouped, value, n, SortDirection::Descending)
}

fn summarize_outliers(raw: &DataFrame, column: &str, bounds: IqrBounds) -> Result<OutlierSummary> {
    let capped = cap_with_bounds(raw, column, &bounds)?;
    Ok(OutlierSummary {
        column: column.to_string(),
        bounds,
        outliers: outlier_count(raw, column, &bounds)?,
        total_before: total_of_column(raw, column)?,
        total_after: total_of_column(&capped, column)?,
    })
}

impl fmt::Display for AnalysisReport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "Charity finances for {} ({} filings)", self.year, self.charities)?;
        writeln!(f, "Total gross income: {:.2}", self.total_gross_income)?;
        writeln!(f, "Charities reporting zero gross income: {}", self.zero_income_count)?;

        let tables = [
            ("Top gross income", &self.top_income),
            ("Top gross expenditure", &self.top_expenditure),
            ("Top net income", &self.top_net_income),
            ("Bottom net income", &self.bottom_net_income),
            ("Top donation income", &self.top_donations),
            ("Gross income of at least 500 million", &self.half_billion),
            ("Lead beneficiaries by charity count", &self.beneficiaries_by_count),
            ("Lead beneficiaries by expenditure", &self.beneficiaries_by_expenditure),
            ("Charity purposes by charity count", &self.purposes_by_count),
            ("Charity purposes by expenditure", &self.purposes_by_expenditure),
            ("Governing forms by charity count", &self.governing_forms_by_count),
            ("Governing forms by expenditure", &self.governing_forms_by_expenditure),
            ("Totals by country established", &self.country_totals),
        ];
        for (title, table) in tables {
            writeln!(f, "\n{}\n{}", title, table)?;
        }

        match &self.outliers {
            Some(o) => writeln!(
                f,
                "\n{} outliers: {} outside [{:.2}, {:.2}] (Q1 {:.2}, Q3 {:.2}); total {:.2} -> {:.2} after capping",
                o.column,
                o.outliers,
                o.bounds.lower,
                o.bounds.upper,
                o.bounds.q1,
                o.bounds.q3,
                o.total_before,
                o.total_after
            ),
            None => writeln!(f, "\nNo values to compute outlier bounds from"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::data_utils::{float_values, string_values};
    use crate::config::QuerySource;
    use crate::metrics::derive_metrics;
    use crate::outliers::cap_outliers;
    use crate::schema::CURRENCY_COLUMNS;

    fn reconciled() -> DataFrame {
        let mut columns = vec![
            Series::new(CHARITY_NUMBER, ["1", "2", "3", "4", "5"]),
            Series::new(CHARITY_NAME, [Some("A"), Some("B"), Some("C"), Some("D"), None]),
            Series::new(GOVERNING_FORM, [Some("Trust"), Some("CLG"), Some("CLG"), Some("Trust"), None]),
            Series::new(COUNTRY_ESTABLISHED, [Some("Ireland"), Some("Ireland"), Some("UK"), Some("Ireland"), None]),
            Series::new(
                crate::schema::CHARITABLE_PURPOSE,
                [Some("Education;Health"), Some("Health"), Some("Education"), Some("Education"), None],
            ),
            Series::new(
                crate::schema::BENEFICIARIES,
                [Some("Children"), Some("Elderly; Children"), Some("Children"), None, Some("Animals")],
            ),
        ];
        let income = [600_000_000.0, 10.0, 0.0, 30.0, 40.0];
        let spend = [100.0, 20.0, 5.0, 10.0, 1.0];
        for c in CURRENCY_COLUMNS.iter() {
            let values = match c.analytic {
                GROSS_INCOME => income.to_vec(),
                GROSS_EXPENDITURE => spend.to_vec(),
                INCOME_DONATIONS => vec![1.0, 5.0, 3.0, 0.0, 0.0],
                _ => vec![0.0; 5],
            };
            columns.push(Series::new(c.analytic, values));
        }
        derive_metrics(&DataFrame::new(columns).unwrap()).unwrap()
    }

    fn config() -> PipelineConfig {
        PipelineConfig {
            top_n: 2,
            ..PipelineConfig::default()
        }
    }

    fn names(df: &DataFrame, column: &str) -> Vec<Option<String>> {
        string_values(df, column, Stage::Query).unwrap()
    }

    #[test]
    fn test_scalar_answers() {
        let report = AnalysisReport::build(&reconciled(), &config()).unwrap();
        assert_eq!(report.charities, 5);
        assert_eq!(report.total_gross_income, 600_000_080.0);
        assert_eq!(report.zero_income_count, 1);
        assert_eq!(names(&report.half_billion, CHARITY_NAME), vec![Some("A".to_string())]);
    }

    #[test]
    fn test_rankings() {
        let report = AnalysisReport::build(&reconciled(), &config()).unwrap();
        assert_eq!(names(&report.top_income, CHARITY_NAME), vec![Some("A".to_string()), None]);
        assert_eq!(report.top_income.width(), 2);
        assert_eq!(
            names(&report.bottom_net_income, CHARITY_NAME),
            vec![Some("B".to_string()), Some("C".to_string())]
        );
        assert_eq!(
            names(&report.top_donations, CHARITY_NAME),
            vec![Some("B".to_string()), Some("C".to_string())]
        );
    }

    #[test]
    fn test_group_rankings() {
        let report = AnalysisReport::build(&reconciled(), &config()).unwrap();

        assert_eq!(
            names(&report.beneficiaries_by_count, LEAD_BENEFICIARY),
            vec![Some("Children".to_string()), Some("Elderly".to_string())]
        );
        assert_eq!(
            float_values(&report.beneficiaries_by_count, CHARITY_COUNT, Stage::Query).unwrap(),
            vec![Some(2.0), Some(1.0)]
        );
        assert_eq!(
            names(&report.governing_forms_by_expenditure, GOVERNING_FORM),
            vec![Some("Trust".to_string()), Some("CLG".to_string())]
        );
        assert_eq!(
            float_values(&report.governing_forms_by_expenditure, GROSS_EXPENDITURE, Stage::Query).unwrap(),
            vec![Some(110.0), Some(25.0)]
        );
        assert_eq!(report.purposes_by_count.height(), 2);
    }

    #[test]
    fn test_country_totals_include_net_income() {
        let report = AnalysisReport::build(&reconciled(), &config()).unwrap();
        assert_eq!(report.country_totals.height(), 2);
        let net = float_values(&report.country_totals, NET_INCOME, Stage::Query).unwrap();
        assert_eq!(net, vec![Some(599_999_910.0), Some(-5.0)]);
    }

    #[test]
    fn test_outlier_summary_and_display() {
        let report = AnalysisReport::build(&reconciled(), &config()).unwrap();
        let outliers = report.outliers.as_ref().unwrap();
        assert_eq!(outliers.outliers, 1);
        assert!(outliers.total_after < outliers.total_before);

        let text = report.to_string();
        assert!(text.contains("Top gross income"));
        assert!(text.contains("Totals by country established"));
    }

    #[test]
    fn test_capped_source_keeps_raw_outlier_summary() {
        let reconciled = reconciled();
        let (capped, bounds) = cap_outliers(&reconciled, GROSS_INCOME, 1.5).unwrap();
        let output = PipelineOutput {
            registry: DataFrame::default(),
            filings: DataFrame::default(),
            reconciled,
            capped,
            bounds,
            query_source: QuerySource::Capped,
        };

        let report = AnalysisReport::from_output(&output, &config()).unwrap();
        let outliers = report.outliers.as_ref().unwrap();
        assert_eq!(outliers.outliers, 1);
        assert_eq!(outliers.bounds, bounds.unwrap());
        assert_eq!(outliers.total_before, 600_000_080.0);
        assert_eq!(report.total_gross_income, outliers.total_after);
        assert!(report.half_billion.height() == 0);
    }

    #[test]
    fn test_empty_table_has_no_outlier_summary() {
        let empty = reconciled().head(Some(0));
        let report = AnalysisReport::build(&empty, &config()).unwrap();
        assert_eq!(report.charities, 0);
        assert_eq!(report.total_gross_income, 0.0);
        assert!(report.outliers.is_none());
        assert!(report.to_string().contains("No values to compute outlier bounds from"));
    }
}
