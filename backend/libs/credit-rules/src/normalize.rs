//! Raw event → [`FeatureRecord`] conversion.
//!
//! Normalization never fails. A value that cannot be parsed, or that falls
//! outside its sanity range, becomes `None`.

use chrono::{DateTime, NaiveDate, NaiveDateTime};
use once_cell::sync::Lazy;
use regex::Regex;
use serde_json::Value;

use crate::features::{FeatureRecord, RawEvent};

/// Fixed "as of" date for credit history length (year, month, day).
pub const REFERENCE_DATE: (i32, u32, u32) = (2019, 1, 1);

const DAYS_PER_YEAR: f64 = 365.0;

static FIRST_INTEGER: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"\d+").expect("valid first-integer pattern"));

/// Build the canonical feature record for one raw event.
pub fn normalize(raw: &RawEvent) -> FeatureRecord {
    FeatureRecord {
        loan_amnt: to_f64(raw.get("loan_amnt")),
        term: passthrough(raw.get("term")),
        installment: to_f64(raw.get("installment")),
        purpose: passthrough(raw.get("purpose")),
        annual_inc: to_f64(raw.get("annual_inc")),
        dti: to_f64(raw.get("dti")).filter(|dti| (0.0..=100.0).contains(dti)),
        int_rate_pct: percent_to_f64(raw.get("int_rate")),
        revol_util_pct: percent_to_f64(raw.get("revol_util")),
        delinq_2yrs: to_f64(raw.get("delinq_2yrs")),
        inq_last_6mths: to_f64(raw.get("inq_last_6mths")),
        open_acc: to_f64(raw.get("open_acc")),
        total_acc: to_f64(raw.get("total_acc")),
        emp_length_yrs: emp_length_to_years(raw.get("emp_length")),
        credit_history_years: credit_history_years(raw.get("earliest_cr_line")),
        default_label: default_label(raw.get("loan_status")),
    }
}

fn is_missing_marker(s: &str) -> bool {
    s.is_empty() || s.eq_ignore_ascii_case("nan") || s.eq_ignore_ascii_case("none")
}

/// Best-effort numeric coercion from a JSON number or numeric string.
fn to_f64(value: Option<&Value>) -> Option<f64> {
    let parsed = match value? {
        Value::Number(n) => n.as_f64(),
        Value::String(s) => s.trim().parse::<f64>().ok(),
        _ => None,
    };
    parsed.filter(|v| v.is_finite())
}

/// `"13.56%"` → `13.56`. Numbers pass through.
fn percent_to_f64(value: Option<&Value>) -> Option<f64> {
    match value? {
        Value::Number(n) => n.as_f64().filter(|v| v.is_finite()),
        Value::String(s) => {
            let s = s.trim();
            if is_missing_marker(s) {
                return None;
            }
            s.strip_suffix('%')
                .unwrap_or(s)
                .trim()
                .parse::<f64>()
                .ok()
                .filter(|v| v.is_finite())
        }
        _ => None,
    }
}

/// `"< 1 year"` → 0, `"10+ years"` → 10, otherwise the first integer found.
fn emp_length_to_years(value: Option<&Value>) -> Option<f64> {
    let text = match value? {
        Value::String(s) => s.trim().to_string(),
        Value::Number(n) => n.to_string(),
        _ => return None,
    };
    if is_missing_marker(&text) {
        return None;
    }
    if text.contains("< 1") || text.contains("<1") {
        return Some(0.0);
    }
    if text.contains("10+") {
        return Some(10.0);
    }
    FIRST_INTEGER
        .find(&text)
        .and_then(|m| m.as_str().parse::<f64>().ok())
        .filter(|v| v.is_finite())
}

fn parse_credit_line_date(s: &str) -> Option<NaiveDate> {
    let s = s.trim();
    if s.is_empty() {
        return None;
    }
    NaiveDate::parse_from_str(s, "%Y-%m-%d")
        .ok()
        .or_else(|| DateTime::parse_from_rfc3339(s).ok().map(|dt| dt.date_naive()))
        .or_else(|| {
            ["%Y-%m-%d %H:%M:%S", "%Y-%m-%dT%H:%M:%S", "%Y-%m-%dT%H:%M:%S%.f"]
                .iter()
                .find_map(|fmt| NaiveDateTime::parse_from_str(s, fmt).ok())
                .map(|dt| dt.date())
        })
        // Lender exports use "Jan-2001".
        .or_else(|| NaiveDate::parse_from_str(&format!("01-{s}"), "%d-%b-%Y").ok())
}

fn credit_history_years(value: Option<&Value>) -> Option<f64> {
    let earliest = match value? {
        Value::String(s) => parse_credit_line_date(s)?,
        _ => return None,
    };
    let (year, month, day) = REFERENCE_DATE;
    let reference = NaiveDate::from_ymd_opt(year, month, day)?;
    let days = (reference - earliest).num_days();
    if days < 0 {
        return None;
    }
    Some(days as f64 / DAYS_PER_YEAR)
}

fn passthrough(value: Option<&Value>) -> Option<String> {
    match value? {
        Value::Null => None,
        Value::String(s) => Some(s.clone()),
        other => Some(other.to_string()),
    }
}

fn default_label(value: Option<&Value>) -> Option<u8> {
    match value?.as_str()? {
        "Fully Paid" => Some(0),
        "Charged Off" => Some(1),
        _ => None,
    }
}
