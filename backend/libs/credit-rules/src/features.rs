//! Canonical feature record derived from a raw loan application event.

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

/// A loan application exactly as it arrived: untyped key/value pairs.
pub type RawEvent = Map<String, Value>;

/// Employment length substituted when the event carries none.
pub const DEFAULT_EMP_LENGTH_YRS: f64 = 5.0;

/// Revolving utilization substituted when the event carries none.
pub const DEFAULT_REVOL_UTIL_PCT: f64 = 50.0;

/// Typed projection of a [`RawEvent`].
///
/// Every field that failed to parse, or fell outside its sanity range, is
/// `None`. Only [`FeatureRecord::with_defaults`] ever fills a `None` in.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct FeatureRecord {
    pub loan_amnt: Option<f64>,
    pub term: Option<String>,
    pub installment: Option<f64>,
    pub purpose: Option<String>,
    pub annual_inc: Option<f64>,
    /// Debt-to-income ratio, always within [0, 100] when present.
    pub dti: Option<f64>,
    pub int_rate_pct: Option<f64>,
    pub revol_util_pct: Option<f64>,
    pub delinq_2yrs: Option<f64>,
    pub inq_last_6mths: Option<f64>,
    pub open_acc: Option<f64>,
    pub total_acc: Option<f64>,
    pub emp_length_yrs: Option<f64>,
    /// Never negative when present.
    pub credit_history_years: Option<f64>,
    /// Backfill label: 1 = charged off, 0 = fully paid. Absent in live scoring.
    #[serde(rename = "default")]
    pub default_label: Option<u8>,
}

impl FeatureRecord {
    /// Substitute the fixed defaults for employment length and revolving
    /// utilization. No other field is defaulted.
    pub fn with_defaults(mut self) -> Self {
        self.emp_length_yrs.get_or_insert(DEFAULT_EMP_LENGTH_YRS);
        self.revol_util_pct.get_or_insert(DEFAULT_REVOL_UTIL_PCT);
        self
    }
}

/// Pick a stable identifier for an event: `loan_id`, then `id`, then the
/// caller-supplied fallback.
pub fn resolve_event_id<F>(raw: &RawEvent, fallback: F) -> String
where
    F: FnOnce() -> String,
{
    ["loan_id", "id"]
        .iter()
        .filter_map(|key| raw.get(*key))
        .find_map(|value| match value {
            Value::Null => None,
            Value::String(s) => Some(s.clone()),
            other => Some(other.to_string()),
        })
        .unwrap_or_else(fallback)
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn raw(value: Value) -> RawEvent {
        value.as_object().cloned().unwrap()
    }

    #[test]
    fn test_with_defaults_only_fills_two_fields() {
        let record = FeatureRecord::default().with_defaults();
        assert_eq!(record.emp_length_yrs, Some(DEFAULT_EMP_LENGTH_YRS));
        assert_eq!(record.revol_util_pct, Some(DEFAULT_REVOL_UTIL_PCT));
        assert_eq!(record.dti, None);
        assert_eq!(record.loan_amnt, None);
        assert_eq!(record.delinq_2yrs, None);
    }

    #[test]
    fn test_with_defaults_keeps_present_values() {
        let record = FeatureRecord {
            emp_length_yrs: Some(0.0),
            revol_util_pct: Some(91.2),
            ..Default::default()
        }
        .with_defaults();
        assert_eq!(record.emp_length_yrs, Some(0.0));
        assert_eq!(record.revol_util_pct, Some(91.2));
    }

    #[test]
    fn test_resolve_event_id_precedence() {
        let both = raw(json!({"loan_id": "L-1", "id": 99}));
        assert_eq!(resolve_event_id(&both, || "fallback".into()), "L-1");

        let numeric = raw(json!({"id": 12345}));
        assert_eq!(resolve_event_id(&numeric, || "fallback".into()), "12345");

        let null_loan_id = raw(json!({"loan_id": null, "id": "abc"}));
        assert_eq!(resolve_event_id(&null_loan_id, || "fallback".into()), "abc");

        let neither = raw(json!({"dti": 10}));
        assert_eq!(resolve_event_id(&neither, || "evt_1".into()), "evt_1");
    }

    #[test]
    fn test_serializes_with_wire_names() {
        let record = FeatureRecord {
            default_label: Some(1),
            ..Default::default()
        };
        let value = serde_json::to_value(&record).unwrap();
        assert_eq!(value["default"], 1);
        assert!(value.get("default_label").is_none());
        assert!(value.get("credit_history_years").is_some());
    }
}
