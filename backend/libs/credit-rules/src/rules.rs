//! Deterministic risk rules: bands, early-warning flag, tier and reasons.

use serde::{Deserialize, Serialize};
use std::fmt;

use crate::features::FeatureRecord;

/// Upper-inclusive bounds of the Low, Moderate and High bins. Very High runs
/// from the last bound up to [`BAND_CEILING`].
pub const DTI_BOUNDS: [f64; 3] = [20.0, 30.0, 40.0];
pub const UTIL_BOUNDS: [f64; 3] = [30.0, 60.0, 80.0];
pub const RATE_BOUNDS: [f64; 3] = [10.0, 15.0, 20.0];

/// Upper bound of the Very High bin. Values beyond it fall outside every bin.
pub const BAND_CEILING: f64 = 100.0;

const LEVERAGE_DTI: f64 = 30.0;
const LEVERAGE_UTIL: f64 = 80.0;
const STRESS_INQUIRIES: f64 = 2.0;

/// Reason attached to decisions issued for records that failed validation.
pub const MISSING_REQUIRED_REASON: &str = "MISSING_REQUIRED_FIELDS";

pub const WITHIN_RANGES_REASON: &str = "All metrics within acceptable ranges";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum RiskBand {
    Low,
    Moderate,
    High,
    #[serde(rename = "Very High")]
    VeryHigh,
    Unknown,
}

impl RiskBand {
    pub fn as_str(&self) -> &'static str {
        match self {
            RiskBand::Low => "Low",
            RiskBand::Moderate => "Moderate",
            RiskBand::High => "High",
            RiskBand::VeryHigh => "Very High",
            RiskBand::Unknown => "Unknown",
        }
    }

    fn is_high(&self) -> bool {
        matches!(self, RiskBand::High | RiskBand::VeryHigh)
    }
}

impl fmt::Display for RiskBand {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum RiskTier {
    Low,
    Elevated,
    Watchlist,
    /// Assigned at the validation boundary, never by [`classify`].
    Rejected,
}

impl RiskTier {
    pub fn as_str(&self) -> &'static str {
        match self {
            RiskTier::Low => "Low",
            RiskTier::Elevated => "Elevated",
            RiskTier::Watchlist => "Watchlist",
            RiskTier::Rejected => "Rejected",
        }
    }
}

impl fmt::Display for RiskTier {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RiskDecision {
    pub dti_band: RiskBand,
    pub util_band: RiskBand,
    pub rate_band: RiskBand,
    /// 1 when both a leverage and a stress signal are present.
    pub early_warning_flag: u8,
    pub risk_tier: RiskTier,
    pub reasons: Vec<String>,
}

impl RiskDecision {
    /// Decision for an event that is missing required fields.
    pub fn rejected() -> Self {
        Self {
            dti_band: RiskBand::Unknown,
            util_band: RiskBand::Unknown,
            rate_band: RiskBand::Unknown,
            early_warning_flag: 0,
            risk_tier: RiskTier::Rejected,
            reasons: vec![MISSING_REQUIRED_REASON.to_string()],
        }
    }

    /// Reasons in storage form.
    pub fn reasons_joined(&self) -> String {
        self.reasons.join(",")
    }
}

/// First bin whose upper bound holds the value. Values below 0 or above
/// [`BAND_CEILING`] fall outside every bin and band as Unknown.
pub fn band(value: Option<f64>, bounds: &[f64; 3]) -> RiskBand {
    match value {
        None => RiskBand::Unknown,
        Some(v) if !(0.0..=BAND_CEILING).contains(&v) => RiskBand::Unknown,
        Some(v) if v <= bounds[0] => RiskBand::Low,
        Some(v) if v <= bounds[1] => RiskBand::Moderate,
        Some(v) if v <= bounds[2] => RiskBand::High,
        Some(_) => RiskBand::VeryHigh,
    }
}

/// Classify one validated feature record. Total and deterministic: absent
/// inputs yield Unknown bands and false conditions.
pub fn classify(features: &FeatureRecord) -> RiskDecision {
    let dti_band = band(features.dti, &DTI_BOUNDS);
    let util_band = band(features.revol_util_pct, &UTIL_BOUNDS);
    let rate_band = band(features.int_rate_pct, &RATE_BOUNDS);

    let high_dti = features.dti.filter(|v| *v >= LEVERAGE_DTI);
    let high_util = features.revol_util_pct.filter(|v| *v >= LEVERAGE_UTIL);
    let delinquencies = features.delinq_2yrs.filter(|v| *v > 0.0);
    let inquiries = features.inq_last_6mths.filter(|v| *v >= STRESS_INQUIRIES);

    let leverage = high_dti.is_some() || high_util.is_some();
    let stress = delinquencies.is_some() || inquiries.is_some();
    let early_warning = leverage && stress;

    let mut reasons = Vec::new();
    if let Some(dti) = high_dti {
        reasons.push(format!("High DTI ({dti:.1}%)"));
    }
    if let Some(util) = high_util {
        reasons.push(format!("Very high revolving utilization ({util:.1}%)"));
    }
    if let Some(count) = delinquencies {
        reasons.push(format!("Recent delinquencies ({})", count as i64));
    }
    if let Some(count) = inquiries {
        reasons.push(format!("Multiple recent credit inquiries ({})", count as i64));
    }

    let risk_tier = if early_warning {
        RiskTier::Watchlist
    } else if dti_band.is_high() || util_band.is_high() {
        if dti_band.is_high() && high_dti.is_none() {
            reasons.push(format!("DTI in {dti_band} band"));
        }
        if util_band.is_high() && high_util.is_none() {
            reasons.push(format!("Utilization in {util_band} band"));
        }
        RiskTier::Elevated
    } else {
        if reasons.is_empty() {
            reasons.push(WITHIN_RANGES_REASON.to_string());
        }
        RiskTier::Low
    };

    RiskDecision {
        dti_band,
        util_band,
        rate_band,
        early_warning_flag: u8::from(early_warning),
        risk_tier,
        reasons,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn record(dti: f64, util: f64, delinq: f64, inq: f64) -> FeatureRecord {
        FeatureRecord {
            dti: Some(dti),
            revol_util_pct: Some(util),
            delinq_2yrs: Some(delinq),
            inq_last_6mths: Some(inq),
            int_rate_pct: Some(12.0),
            ..Default::default()
        }
    }

    #[test]
    fn test_dti_banding_is_upper_inclusive() {
        let cases = [
            (19.9, RiskBand::Low),
            (20.0, RiskBand::Low),
            (20.1, RiskBand::Moderate),
            (30.0, RiskBand::Moderate),
            (30.1, RiskBand::High),
            (40.0, RiskBand::High),
            (40.1, RiskBand::VeryHigh),
        ];
        for (dti, expected) in cases {
            assert_eq!(band(Some(dti), &DTI_BOUNDS), expected, "dti {dti}");
        }
    }

    #[test]
    fn test_band_edges() {
        assert_eq!(band(Some(0.0), &UTIL_BOUNDS), RiskBand::Low);
        assert_eq!(band(None, &UTIL_BOUNDS), RiskBand::Unknown);
        assert_eq!(band(Some(-1.0), &RATE_BOUNDS), RiskBand::Unknown);
        assert_eq!(band(Some(100.0), &UTIL_BOUNDS), RiskBand::VeryHigh);
        assert_eq!(band(Some(100.1), &UTIL_BOUNDS), RiskBand::Unknown);
        assert_eq!(band(Some(112.0), &UTIL_BOUNDS), RiskBand::Unknown);
        assert_eq!(band(Some(15.0), &RATE_BOUNDS), RiskBand::Moderate);
        assert_eq!(band(Some(20.5), &RATE_BOUNDS), RiskBand::VeryHigh);
    }

    #[test]
    fn test_early_warning_requires_leverage_and_stress() {
        let d = classify(&record(35.0, 10.0, 0.0, 0.0));
        assert_eq!(d.early_warning_flag, 0);
        assert_ne!(d.risk_tier, RiskTier::Watchlist);
        assert_eq!(d.risk_tier, RiskTier::Elevated);

        let d = classify(&record(10.0, 10.0, 3.0, 5.0));
        assert_eq!(d.early_warning_flag, 0);
        assert_eq!(d.risk_tier, RiskTier::Low);
    }

    #[test]
    fn test_low_tier_keeps_stress_reasons_without_fallback() {
        let d = classify(&record(10.0, 10.0, 1.0, 0.0));
        assert_eq!(d.risk_tier, RiskTier::Low);
        assert_eq!(d.reasons, vec!["Recent delinquencies (1)".to_string()]);
    }

    #[test]
    fn test_elevated_band_reason_for_uncovered_utilization() {
        let d = classify(&record(10.0, 70.0, 0.0, 0.0));
        assert_eq!(d.risk_tier, RiskTier::Elevated);
        assert_eq!(d.util_band, RiskBand::High);
        assert_eq!(d.reasons, vec!["Utilization in High band".to_string()]);
    }

    #[test]
    fn test_absent_inputs_degrade_to_unknown() {
        let d = classify(&FeatureRecord::default());
        assert_eq!(d.dti_band, RiskBand::Unknown);
        assert_eq!(d.util_band, RiskBand::Unknown);
        assert_eq!(d.rate_band, RiskBand::Unknown);
        assert_eq!(d.early_warning_flag, 0);
        assert_eq!(d.risk_tier, RiskTier::Low);
        assert_eq!(d.reasons, vec![WITHIN_RANGES_REASON.to_string()]);
    }

    #[test]
    fn test_utilization_above_ceiling_is_unbanded_but_still_leverage() {
        let d = classify(&record(10.0, 112.0, 0.0, 0.0));
        assert_eq!(d.util_band, RiskBand::Unknown);
        assert_eq!(d.risk_tier, RiskTier::Low);
        assert_eq!(
            d.reasons,
            vec!["Very high revolving utilization (112.0%)".to_string()]
        );

        let d = classify(&record(10.0, 112.0, 1.0, 0.0));
        assert_eq!(d.early_warning_flag, 1);
        assert_eq!(d.risk_tier, RiskTier::Watchlist);
    }

    #[test]
    fn test_rejected_decision() {
        let d = RiskDecision::rejected();
        assert_eq!(d.risk_tier, RiskTier::Rejected);
        assert_eq!(d.early_warning_flag, 0);
        assert_eq!(d.reasons_joined(), MISSING_REQUIRED_REASON);
    }

    #[test]
    fn test_band_labels_serialize_with_spaces() {
        assert_eq!(serde_json::to_value(RiskBand::VeryHigh).unwrap(), "Very High");
        assert_eq!(serde_json::to_value(RiskTier::Watchlist).unwrap(), "Watchlist");
    }
}
