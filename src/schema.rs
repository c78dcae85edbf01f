//! Column names of the two source extracts and of the analytic schema.

/// Identity key shared by the registry and the filing log.
pub const CHARITY_NUMBER: &str = "Registered Charity Number";
pub const CHARITY_NAME: &str = "Registered Charity Name";

// Registry extract
pub const STATUS: &str = "Status";
pub const ALSO_KNOWN_AS: &str = "Also Known As";
pub const PRIMARY_ADDRESS: &str = "Primary Address";
pub const GOVERNING_FORM: &str = "Governing Form";
pub const CRO_NUMBER: &str = "CRO Number";
pub const COUNTRY_ESTABLISHED: &str = "Country Established";
pub const CHARITABLE_PURPOSE: &str = "Charitable Purpose";
pub const CHARITABLE_OBJECTS: &str = "Charitable Objects";

pub const REGISTRY_COLUMNS: [&str; 10] = [
    CHARITY_NUMBER,
    CHARITY_NAME,
    STATUS,
    ALSO_KNOWN_AS,
    PRIMARY_ADDRESS,
    GOVERNING_FORM,
    CRO_NUMBER,
    COUNTRY_ESTABLISHED,
    CHARITABLE_PURPOSE,
    CHARITABLE_OBJECTS,
];

// Filing extract, after header normalization
pub const PERIOD_START: &str = "Period Start Date";
pub const PERIOD_END: &str = "Period End Date";
pub const REPORT_ACTIVITY: &str = "Report Activity";
pub const ACTIVITY_DESCRIPTION: &str = "Activity Description";
pub const BENEFICIARIES: &str = "Beneficiaries";

/// A currency column: its label in the filing extract and in the analytic schema.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CurrencyColumn {
    pub raw: &'static str,
    pub analytic: &'static str,
}

pub const INCOME_GOVERNMENT: &str = "Income: Central_Gov Local_Auth";
pub const INCOME_PUBLIC_BODIES: &str = "Income: Other Public Bodies";
pub const INCOME_PHILANTHROPIC: &str = "Income: Philantrophic Orgs";
pub const INCOME_DONATIONS: &str = "Income: Donations";
pub const INCOME_TRADING: &str = "Income: Trading & Commercial";
pub const INCOME_OTHER: &str = "Income: Other Sources";
pub const GROSS_INCOME: &str = "Total Gross Income";
pub const GROSS_EXPENDITURE: &str = "Total Gross Expenditure";

pub const CURRENCY_COLUMNS: [CurrencyColumn; 8] = [
    CurrencyColumn {
        raw: "Financial: Income from Central Government or Local Authorities",
        analytic: INCOME_GOVERNMENT,
    },
    CurrencyColumn {
        raw: "Financial: Income from other public bodies",
        analytic: INCOME_PUBLIC_BODIES,
    },
    CurrencyColumn {
        raw: "Financial: Income from philantrophic organisations",
        analytic: INCOME_PHILANTHROPIC,
    },
    CurrencyColumn {
        raw: "Financial: Income from donations",
        analytic: INCOME_DONATIONS,
    },
    CurrencyColumn {
        raw: "Financial: Income from trading and commercial activities",
        analytic: INCOME_TRADING,
    },
    CurrencyColumn {
        raw: "Financial: Income from other sources",
        analytic: INCOME_OTHER,
    },
    CurrencyColumn {
        raw: "Financial: Gross Income",
        analytic: GROSS_INCOME,
    },
    CurrencyColumn {
        raw: "Financial: Gross Expenditure",
        analytic: GROSS_EXPENDITURE,
    },
];

// Derived columns
pub const NET_INCOME: &str = "Total Net Income";
pub const LEAD_BENEFICIARY: &str = "Lead Beneficiary";
pub const CHARITY_PURPOSE: &str = "Charity Purpose";

/// Separator of the multi-value text fields.
pub const MULTI_VALUE_DELIMITER: &str = ";";

/// Analytic names of the eight financial columns, in extract order.
pub fn financial_columns() -> Vec<&'static str> {
    CURRENCY_COLUMNS.iter().map(|c| c.analytic).collect()
}

/// Raw names of the eight currency columns, in extract order.
pub fn raw_currency_columns() -> Vec<&'static str> {
    CURRENCY_COLUMNS.iter().map(|c| c.raw).collect()
}
