//! # Credit risk rules
//!
//! Pure scoring core shared by the streaming consumer and the scoring API.
//! Nothing in this crate performs I/O or holds state.
//!
//! ```text
//! RawEvent ──normalize──▶ FeatureRecord ──validate──▶ Validation
//!                              │
//!                        with_defaults
//!                              │
//!                              ▼
//!                          classify ──▶ RiskDecision
//! ```
//!
//! Callers should go through [`evaluate`] so that every surface applies the
//! same normalization, defaulting and rejection rules.

mod features;
mod normalize;
mod pipeline;
mod rules;
mod validate;

pub use features::{
    resolve_event_id, FeatureRecord, RawEvent, DEFAULT_EMP_LENGTH_YRS, DEFAULT_REVOL_UTIL_PCT,
};
pub use normalize::{normalize, REFERENCE_DATE};
pub use pipeline::{evaluate, EvaluateOptions, Evaluation};
pub use rules::{
    band, classify, RiskBand, RiskDecision, RiskTier, BAND_CEILING, DTI_BOUNDS,
    MISSING_REQUIRED_REASON, RATE_BOUNDS, UTIL_BOUNDS, WITHIN_RANGES_REASON,
};
pub use validate::{validate, Validation, REQUIRED_FIELDS};
