use credit_rules::{FeatureRecord, RawEvent, RiskDecision};
use serde::{Deserialize, Serialize};

/// One row of the `risk_scored` table, already converted to the column types
/// PostgreSQL expects.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ScoredRow {
    pub loan_id: String,
    pub purpose: Option<String>,
    pub term: Option<String>,
    pub loan_amnt: Option<f64>,
    pub annual_inc: Option<f64>,
    pub dti: Option<f64>,
    pub int_rate_pct: Option<f64>,
    pub revol_util_pct: Option<f64>,
    pub delinq_2yrs: Option<i32>,
    pub inq_last_6mths: Option<i32>,
    pub credit_history_years: Option<f64>,
    pub emp_length_yrs: Option<f64>,
    pub dti_band: String,
    pub util_band: String,
    pub rate_band: String,
    pub early_warning_flag: i16,
    pub risk_tier: String,
    pub reasons: String,
}

impl ScoredRow {
    pub fn new(loan_id: impl Into<String>, features: &FeatureRecord, decision: &RiskDecision) -> Self {
        Self {
            loan_id: loan_id.into(),
            purpose: features.purpose.clone(),
            term: features.term.clone(),
            loan_amnt: features.loan_amnt,
            annual_inc: features.annual_inc,
            dti: features.dti,
            int_rate_pct: features.int_rate_pct,
            revol_util_pct: features.revol_util_pct,
            delinq_2yrs: features.delinq_2yrs.map(count_to_i32),
            inq_last_6mths: features.inq_last_6mths.map(count_to_i32),
            credit_history_years: features.credit_history_years,
            emp_length_yrs: features.emp_length_yrs,
            dti_band: decision.dti_band.as_str().to_string(),
            util_band: decision.util_band.as_str().to_string(),
            rate_band: decision.rate_band.as_str().to_string(),
            early_warning_flag: i16::from(decision.early_warning_flag),
            risk_tier: decision.risk_tier.as_str().to_string(),
            reasons: decision.reasons_joined(),
        }
    }
}

// `as` saturates out-of-range floats, which is what we want for counts.
fn count_to_i32(value: f64) -> i32 {
    value.trunc() as i32
}

fn default_true() -> bool {
    true
}

#[derive(Debug, Clone, Deserialize)]
pub struct ScoreRequest {
    pub event: RawEvent,
    #[serde(default = "default_true")]
    pub reject_if_missing_required: bool,
    #[serde(default)]
    pub persist_to_db: bool,
}

#[derive(Debug, Clone, Serialize)]
pub struct ScoreResponse {
    pub loan_id: String,
    pub valid: bool,
    pub missing_required: Vec<String>,
    pub features: FeatureRecord,
    pub decision: RiskDecision,
}

#[derive(Debug, Serialize)]
pub struct HealthResponse {
    pub status: &'static str,
    pub service: &'static str,
    pub version: &'static str,
    pub database: &'static str,
}
