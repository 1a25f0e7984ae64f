use actix_web::{web, HttpResponse};
use prometheus::Registry;
use sqlx::PgPool;

use crate::metrics::{self, ApiMetrics};
use crate::models::HealthResponse;

pub mod score;

/// Shared state for the scoring API.
#[derive(Clone)]
pub struct AppState {
    /// Absent when the API runs without a database; scoring still works.
    pub pool: Option<PgPool>,
    pub metrics: ApiMetrics,
}

pub async fn health(state: web::Data<AppState>) -> HttpResponse {
    let database = match &state.pool {
        None => "disabled",
        Some(pool) => match sqlx::query("SELECT 1").execute(pool).await {
            Ok(_) => "ok",
            Err(_) => "unavailable",
        },
    };
    HttpResponse::Ok().json(HealthResponse {
        status: "ok",
        service: env!("CARGO_PKG_NAME"),
        version: env!("CARGO_PKG_VERSION"),
        database,
    })
}

pub async fn serve_metrics(registry: web::Data<Registry>) -> HttpResponse {
    match metrics::render(&registry) {
        Ok(body) => HttpResponse::Ok()
            .content_type("text/plain; version=0.0.4")
            .body(body),
        Err(e) => HttpResponse::InternalServerError().body(e.to_string()),
    }
}

/// Routes of the consumer's metrics listener.
pub fn register_ops_routes(cfg: &mut web::ServiceConfig) {
    cfg.route("/metrics", web::get().to(serve_metrics));
}

/// Scoring API routes. Expects `web::Data<AppState>` and `web::Data<Registry>`.
pub fn register_routes(cfg: &mut web::ServiceConfig) {
    cfg.route("/health", web::get().to(health))
        .route("/metrics", web::get().to(serve_metrics))
        .service(web::scope("/api/v1").route("/score", web::post().to(score::score)));
}
