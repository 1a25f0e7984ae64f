use std::time::Instant;

use actix_web::{web, HttpResponse};
use chrono::Utc;
use credit_rules::{evaluate, resolve_event_id, EvaluateOptions, RiskTier};
use tracing::{debug, warn};

use super::AppState;
use crate::db;
use crate::error::{Result, RiskServiceError};
use crate::models::{ScoreRequest, ScoreResponse, ScoredRow};

const ENDPOINT: &str = "/api/v1/score";

/// Score one raw event.
///
/// POST /api/v1/score
pub async fn score(
    state: web::Data<AppState>,
    req: web::Json<ScoreRequest>,
) -> Result<HttpResponse> {
    let started = Instant::now();
    let result = score_event(&state, req.into_inner()).await;
    state
        .metrics
        .observe_latency(ENDPOINT, started.elapsed().as_secs_f64());

    let status = match &result {
        Ok(resp) if resp.decision.risk_tier == RiskTier::Rejected => "rejected_missing",
        Ok(_) => "ok",
        Err(_) => "error",
    };
    state.metrics.record_request(ENDPOINT, status);

    Ok(HttpResponse::Ok().json(result?))
}

async fn score_event(state: &AppState, req: ScoreRequest) -> Result<ScoreResponse> {
    let ScoreRequest {
        event,
        reject_if_missing_required,
        persist_to_db,
    } = req;

    if event.is_empty() {
        return Err(RiskServiceError::Validation(
            "event must contain at least one field".to_string(),
        ));
    }

    let loan_id = resolve_event_id(&event, || format!("evt_{}", Utc::now().timestamp_millis()));
    let evaluation = evaluate(
        &event,
        EvaluateOptions {
            reject_if_missing_required,
        },
    );

    if evaluation.is_rejected() {
        debug!(loan_id = %loan_id, missing = ?evaluation.validation.missing, "Rejected for missing fields");
    } else {
        if persist_to_db {
            persist(state, &loan_id, &evaluation).await;
        }
        if evaluation.decision.risk_tier == RiskTier::Watchlist {
            state.metrics.record_watchlist("api");
        }
    }

    Ok(ScoreResponse {
        loan_id,
        valid: evaluation.validation.is_valid(),
        missing_required: evaluation
            .validation
            .missing
            .iter()
            .map(|field| field.to_string())
            .collect(),
        features: evaluation.features,
        decision: evaluation.decision,
    })
}

// Persistence is best-effort for the API; failures never fail the request.
async fn persist(state: &AppState, loan_id: &str, evaluation: &credit_rules::Evaluation) {
    let Some(pool) = state.pool.as_ref() else {
        warn!(loan_id, "persist_to_db requested but no database is configured");
        return;
    };
    let row = ScoredRow::new(loan_id, &evaluation.features, &evaluation.decision);
    if let Err(e) = db::insert_one(pool, &row).await {
        warn!(loan_id, error = %e, "Failed to persist scored row");
    }
}
