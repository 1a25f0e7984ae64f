use serde::Serialize;

use crate::features::{FeatureRecord, RawEvent};
use crate::normalize::normalize;
use crate::rules::{classify, RiskDecision, RiskTier};
use crate::validate::{validate, Validation};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct EvaluateOptions {
    /// Issue a Rejected decision instead of classifying an incomplete record.
    pub reject_if_missing_required: bool,
}

impl Default for EvaluateOptions {
    fn default() -> Self {
        Self {
            reject_if_missing_required: true,
        }
    }
}

/// Result of running one raw event through normalize → validate → classify.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Evaluation {
    /// Features after default substitution.
    pub features: FeatureRecord,
    pub validation: Validation,
    pub decision: RiskDecision,
}

impl Evaluation {
    pub fn is_rejected(&self) -> bool {
        self.decision.risk_tier == RiskTier::Rejected
    }
}

/// The single scoring entry point shared by every surface.
///
/// Validation runs on the record as normalized; the employment-length and
/// utilization defaults are substituted afterwards, once, before the rules
/// see the record.
pub fn evaluate(raw: &RawEvent, options: EvaluateOptions) -> Evaluation {
    let normalized = normalize(raw);
    let validation = validate(&normalized);
    let features = normalized.with_defaults();

    let decision = if options.reject_if_missing_required && !validation.is_valid() {
        RiskDecision::rejected()
    } else {
        classify(&features)
    };

    Evaluation {
        features,
        validation,
        decision,
    }
}
