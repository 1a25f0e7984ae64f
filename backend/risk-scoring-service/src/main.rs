use actix_web::{middleware, web, App, HttpServer};
use anyhow::Context;
use prometheus::Registry;
use risk_scoring_service::handlers::{register_routes, AppState};
use risk_scoring_service::metrics::ApiMetrics;
use risk_scoring_service::{db, init_tracing, Config};
use tracing::{info, warn};

#[actix_web::main]
async fn main() -> anyhow::Result<()> {
    init_tracing();
    let config = Config::from_env().context("Failed to load configuration")?;
    info!("Starting risk scoring API");

    // The API can score without a database; only persist_to_db needs one.
    let pool = match db::create_pool(&config.database).await {
        Ok(pool) => Some(pool),
        Err(e) => {
            warn!(error = %e, "Database unavailable, scored rows will not be persisted");
            None
        }
    };

    let registry = Registry::new();
    let metrics = ApiMetrics::register(&registry).context("Failed to register metrics")?;
    let state = web::Data::new(AppState { pool, metrics });
    let registry = web::Data::new(registry);

    let addr = ("0.0.0.0", config.http_port);
    info!("Starting HTTP server on {}:{}", addr.0, addr.1);

    HttpServer::new(move || {
        App::new()
            .app_data(state.clone())
            .app_data(registry.clone())
            .wrap(middleware::Logger::default())
            .configure(register_routes)
    })
    .bind(addr)
    .with_context(|| format!("Failed to bind {}:{}", addr.0, addr.1))?
    .run()
    .await
    .context("HTTP server error")?;

    info!("Risk scoring API stopped");
    Ok(())
}
