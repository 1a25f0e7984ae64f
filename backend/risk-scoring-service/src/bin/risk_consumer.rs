use actix_web::{web, App, HttpServer};
use anyhow::Context;
use prometheus::Registry;
use risk_scoring_service::db::{self, PgScoreStore};
use risk_scoring_service::handlers::register_ops_routes;
use risk_scoring_service::metrics::ConsumerMetrics;
use risk_scoring_service::services::{KafkaEventSource, RawEventArchive, RiskEventConsumer};
use risk_scoring_service::storage::S3BlobStore;
use risk_scoring_service::{init_tracing, Config};
use tokio::sync::watch;
use tracing::{error, info};

#[actix_web::main]
async fn main() -> anyhow::Result<()> {
    init_tracing();
    let config = Config::from_env().context("Failed to load configuration")?;
    info!(
        topic = %config.kafka.topic,
        group_id = %config.kafka.group_id,
        "Starting risk event consumer"
    );

    // Startup failures are fatal: nothing has been consumed yet.
    let pool = db::create_pool(&config.database)
        .await
        .context("Failed to connect to PostgreSQL")?;
    let source = KafkaEventSource::new(&config.kafka).context("Failed to create Kafka consumer")?;

    let archive = if config.archive.enabled {
        let store = S3BlobStore::from_env(config.archive.bucket.clone()).await;
        RawEventArchive::new(&config.archive, store)
    } else {
        RawEventArchive::<S3BlobStore>::disabled()
    };

    let registry = Registry::new();
    let metrics = ConsumerMetrics::register(&registry).context("Failed to register metrics")?;

    let metrics_data = web::Data::new(registry);
    let metrics_server = HttpServer::new(move || {
        App::new()
            .app_data(metrics_data.clone())
            .configure(register_ops_routes)
    })
    .workers(1)
    .disable_signals()
    .bind(("0.0.0.0", config.metrics_port))
    .with_context(|| format!("Failed to bind metrics port {}", config.metrics_port))?
    .run();
    let metrics_handle = metrics_server.handle();
    actix_rt::spawn(metrics_server);
    info!("Metrics available on 0.0.0.0:{}/metrics", config.metrics_port);

    let (shutdown_tx, shutdown_rx) = watch::channel(false);
    actix_rt::spawn(async move {
        if let Err(e) = tokio::signal::ctrl_c().await {
            error!(error = %e, "Failed to listen for shutdown signal");
            // Keep the sender alive; dropping it would stop the consumer.
            std::future::pending::<()>().await;
        }
        info!("Shutdown signal received");
        let _ = shutdown_tx.send(true);
    });

    let mut consumer = RiskEventConsumer::new(
        source,
        PgScoreStore::new(pool.clone()),
        archive,
        metrics,
        config.consumer.clone(),
    );
    let stats = consumer.run(shutdown_rx).await;

    metrics_handle.stop(true).await;
    pool.close().await;

    let stats = stats.context("Consumer loop failed")?;
    info!(
        processed = stats.processed,
        skipped = stats.skipped,
        db_errors = stats.db_errors,
        "Risk event consumer exited"
    );
    Ok(())
}
