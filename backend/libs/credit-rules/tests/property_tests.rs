/// Property-based tests for the scoring core
use credit_rules::{classify, normalize, RawEvent, RiskBand, RiskTier, BAND_CEILING, DTI_BOUNDS};
use proptest::prelude::*;
use serde_json::{json, Value};

const FIELDS: [&str; 15] = [
    "loan_amnt",
    "term",
    "int_rate",
    "installment",
    "purpose",
    "annual_inc",
    "dti",
    "revol_util",
    "delinq_2yrs",
    "inq_last_6mths",
    "open_acc",
    "total_acc",
    "emp_length",
    "earliest_cr_line",
    "loan_status",
];

fn arb_value() -> impl Strategy<Value = Value> {
    prop_oneof![
        Just(Value::Null),
        any::<bool>().prop_map(Value::Bool),
        any::<i64>().prop_map(|n| json!(n)),
        any::<f64>().prop_map(|f| json!(f)),
        "\\PC*".prop_map(Value::String),
        "[0-9]{1,3}(\\.[0-9]{1,2})?%?".prop_map(Value::String),
        "[A-Z][a-z]{2}-(19|20)[0-9]{2}".prop_map(Value::String),
    ]
}

fn arb_event() -> impl Strategy<Value = RawEvent> {
    proptest::collection::vec(arb_value(), FIELDS.len()).prop_map(|values| {
        FIELDS
            .iter()
            .zip(values)
            .map(|(k, v)| (k.to_string(), v))
            .collect()
    })
}

proptest! {
    #[test]
    fn normalize_never_panics_and_respects_ranges(event in arb_event()) {
        let features = normalize(&event);
        if let Some(dti) = features.dti {
            prop_assert!((0.0..=100.0).contains(&dti));
        }
        if let Some(years) = features.credit_history_years {
            prop_assert!(years >= 0.0);
        }
        for value in [
            features.loan_amnt, features.annual_inc, features.int_rate_pct,
            features.revol_util_pct, features.installment, features.emp_length_yrs,
        ].into_iter().flatten() {
            prop_assert!(value.is_finite());
        }
    }

    #[test]
    fn classify_is_deterministic(event in arb_event()) {
        let features = normalize(&event).with_defaults();
        prop_assert_eq!(classify(&features), classify(&features));
    }

    #[test]
    fn classify_never_rejects_and_reasons_never_empty(event in arb_event()) {
        let decision = classify(&normalize(&event).with_defaults());
        prop_assert_ne!(decision.risk_tier, RiskTier::Rejected);
        prop_assert!(!decision.reasons.is_empty());
        prop_assert_eq!(
            decision.early_warning_flag == 1,
            decision.risk_tier == RiskTier::Watchlist
        );
    }

    #[test]
    fn dti_bands_are_monotonic(a in 0.0f64..=100.0, b in 0.0f64..=100.0) {
        let rank = |band: RiskBand| match band {
            RiskBand::Low => 0,
            RiskBand::Moderate => 1,
            RiskBand::High => 2,
            RiskBand::VeryHigh => 3,
            RiskBand::Unknown => -1,
        };
        let (lo, hi) = if a <= b { (a, b) } else { (b, a) };
        prop_assert!(
            rank(credit_rules::band(Some(lo), &DTI_BOUNDS))
                <= rank(credit_rules::band(Some(hi), &DTI_BOUNDS))
        );
    }

    #[test]
    fn values_past_the_ceiling_never_band(v in 100.000_001f64..1.0e9) {
        prop_assert!(v > BAND_CEILING);
        prop_assert_eq!(credit_rules::band(Some(v), &DTI_BOUNDS), RiskBand::Unknown);
    }
}
