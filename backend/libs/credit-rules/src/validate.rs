use serde::Serialize;

use crate::features::FeatureRecord;

/// Fields an event must carry to be scored, in reporting order.
pub const REQUIRED_FIELDS: [&str; 5] = [
    "loan_amnt",
    "annual_inc",
    "dti",
    "int_rate_pct",
    "credit_history_years",
];

/// Outcome of the required-field check.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize)]
pub struct Validation {
    pub missing: Vec<&'static str>,
}

impl Validation {
    pub fn is_valid(&self) -> bool {
        self.missing.is_empty()
    }
}

/// Check the required fields. A field is missing only when absent; zero is
/// a legitimate value.
pub fn validate(features: &FeatureRecord) -> Validation {
    let values = [
        features.loan_amnt,
        features.annual_inc,
        features.dti,
        features.int_rate_pct,
        features.credit_history_years,
    ];
    let missing = REQUIRED_FIELDS
        .iter()
        .zip(values)
        .filter(|(_, value)| value.is_none())
        .map(|(name, _)| *name)
        .collect();
    Validation { missing }
}
