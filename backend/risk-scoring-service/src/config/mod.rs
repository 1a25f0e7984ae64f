use std::env;
use std::fmt::Display;
use std::path::PathBuf;
use std::str::FromStr;
use std::time::Duration;

use crate::db::DatabaseConfig;
use crate::error::{Result, RiskServiceError};
use crate::services::{ArchiveConfig, ConsumerConfig, KafkaConfig};

/// Process configuration, read once from the environment at startup.
#[derive(Debug, Clone)]
pub struct Config {
    pub kafka: KafkaConfig,
    pub database: DatabaseConfig,
    pub consumer: ConsumerConfig,
    pub archive: ArchiveConfig,
    /// Port of the scoring API.
    pub http_port: u16,
    /// Port of the consumer's metrics listener.
    pub metrics_port: u16,
}

impl Config {
    pub fn from_env() -> Result<Self> {
        dotenvy::dotenv().ok();

        let kafka = KafkaConfig {
            brokers: string_env("KAFKA_BOOTSTRAP", "localhost:9092"),
            topic: string_env("KAFKA_TOPIC", "loan_applications"),
            group_id: string_env("KAFKA_GROUP_ID", "credit-risk-consumer-v1"),
            connect_timeout: Duration::from_millis(parse_env(
                "KAFKA_CONNECT_TIMEOUT_MS",
                10_000,
            )?),
        };

        let database = DatabaseConfig {
            url: database_url()?,
            max_connections: parse_env("DB_MAX_CONNECTIONS", 5)?,
            connect_timeout_secs: parse_env("DB_CONNECT_TIMEOUT_SECS", 5)?,
        };

        let consumer = ConsumerConfig {
            commit_every: parse_env::<usize>("COMMIT_EVERY", 200)?.max(1),
            poll_timeout: Duration::from_millis(parse_env("KAFKA_POLL_TIMEOUT_MS", 1000)?),
            ..ConsumerConfig::default()
        };

        let archive = ArchiveConfig {
            enabled: bool_env("RAW_EVENTS_TO_S3", false),
            prefix: string_env("RAW_EVENTS_PREFIX", "raw_events"),
            flush_every: parse_env::<usize>("RAW_EVENTS_FLUSH_EVERY", 500)?.max(1),
            local_dir: PathBuf::from(string_env("RAW_EVENTS_LOCAL_DIR", "tmp/raw_events")),
            bucket: string_env("S3_BUCKET", "credit-risk-lake"),
        };

        Ok(Self {
            kafka,
            database,
            consumer,
            archive,
            http_port: parse_env("HTTP_PORT", 8000)?,
            metrics_port: parse_env("METRICS_PORT", 9101)?,
        })
    }
}

fn database_url() -> Result<String> {
    if let Some(url) = env::var("DATABASE_URL").ok().filter(|u| !u.is_empty()) {
        return Ok(url);
    }
    let host = string_env("PG_HOST", "localhost");
    let port: u16 = parse_env("PG_PORT", 5433)?;
    let db = string_env("PG_DB", "credit_risk");
    let user = string_env("PG_USER", "credit");
    let password = string_env("PG_PASSWORD", "risk");
    Ok(format!("postgres://{user}:{password}@{host}:{port}/{db}"))
}

fn string_env(key: &str, default: &str) -> String {
    env::var(key)
        .ok()
        .filter(|v| !v.trim().is_empty())
        .unwrap_or_else(|| default.to_string())
}

fn bool_env(key: &str, default: bool) -> bool {
    env::var(key)
        .map(|v| v.trim().eq_ignore_ascii_case("true"))
        .unwrap_or(default)
}

fn parse_env<T>(key: &str, default: T) -> Result<T>
where
    T: FromStr,
    T::Err: Display,
{
    match env::var(key) {
        Ok(raw) if !raw.trim().is_empty() => raw.trim().parse().map_err(|e| {
            RiskServiceError::Config(format!("{key}={raw:?} is not valid: {e}"))
        }),
        _ => Ok(default),
    }
}
