//! Persistence of scored events.
//!
//! The consumer talks to the store through [`ScoreStore`] so that batching and
//! rollback handling can be exercised without a database.

use std::fmt;
use std::time::Duration;

use async_trait::async_trait;
use sqlx::migrate::Migrator;
use sqlx::postgres::{PgPool, PgPoolOptions};
use sqlx::{Postgres, Transaction};
use tracing::{debug, error, info};

use crate::error::{Result, RiskServiceError};
use crate::models::ScoredRow;

pub static MIGRATOR: Migrator = sqlx::migrate!("./migrations");

const INSERT_SCORED: &str = r#"
    INSERT INTO risk_scored (
        loan_id, purpose, term, loan_amnt, annual_inc, dti, int_rate_pct,
        revol_util_pct, delinq_2yrs, inq_last_6mths, credit_history_years,
        emp_length_yrs, dti_band, util_band, rate_band, early_warning_flag,
        risk_tier, reasons
    )
    VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12, $13, $14, $15, $16, $17, $18)
"#;

#[derive(Clone)]
pub struct DatabaseConfig {
    pub url: String,
    pub max_connections: u32,
    pub connect_timeout_secs: u64,
}

impl fmt::Debug for DatabaseConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("DatabaseConfig")
            .field("url", &"<redacted>")
            .field("max_connections", &self.max_connections)
            .field("connect_timeout_secs", &self.connect_timeout_secs)
            .finish()
    }
}

/// Connect, verify the connection and apply pending migrations.
pub async fn create_pool(config: &DatabaseConfig) -> Result<PgPool> {
    debug!(
        max_connections = config.max_connections,
        connect_timeout_secs = config.connect_timeout_secs,
        "Creating database pool"
    );

    let pool = PgPoolOptions::new()
        .max_connections(config.max_connections)
        .acquire_timeout(Duration::from_secs(config.connect_timeout_secs))
        .test_before_acquire(true)
        .connect(&config.url)
        .await?;

    match tokio::time::timeout(
        Duration::from_secs(config.connect_timeout_secs),
        sqlx::query("SELECT 1").execute(&pool),
    )
    .await
    {
        Ok(Ok(_)) => {}
        Ok(Err(e)) => {
            error!(error = %e, "Database connection verification failed");
            return Err(e.into());
        }
        Err(_) => {
            error!(
                timeout_secs = config.connect_timeout_secs,
                "Database connection verification timeout"
            );
            return Err(RiskServiceError::Database(sqlx::Error::PoolTimedOut));
        }
    }

    MIGRATOR.run(&pool).await.map_err(sqlx::Error::from)?;
    info!("Database pool ready, migrations applied");
    Ok(pool)
}

/// Transactional sink for scored rows.
///
/// `insert` joins the currently open transaction, opening one if needed.
/// Nothing is durable until `commit` returns Ok.
#[async_trait]
pub trait ScoreStore: Send {
    async fn insert(&mut self, row: &ScoredRow) -> Result<()>;
    async fn commit(&mut self) -> Result<()>;
    async fn rollback(&mut self) -> Result<()>;
}

pub struct PgScoreStore {
    pool: PgPool,
    tx: Option<Transaction<'static, Postgres>>,
}

impl PgScoreStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool, tx: None }
    }
}

#[async_trait]
impl ScoreStore for PgScoreStore {
    async fn insert(&mut self, row: &ScoredRow) -> Result<()> {
        if self.tx.is_none() {
            self.tx = Some(self.pool.begin().await?);
        }
        if let Some(tx) = self.tx.as_mut() {
            bind_row(sqlx::query(INSERT_SCORED), row)
                .execute(&mut **tx)
                .await?;
        }
        Ok(())
    }

    async fn commit(&mut self) -> Result<()> {
        match self.tx.take() {
            Some(tx) => Ok(tx.commit().await?),
            None => Ok(()),
        }
    }

    async fn rollback(&mut self) -> Result<()> {
        match self.tx.take() {
            Some(tx) => Ok(tx.rollback().await?),
            None => Ok(()),
        }
    }
}

/// Insert a single row in its own transaction.
pub async fn insert_one(pool: &PgPool, row: &ScoredRow) -> Result<()> {
    let mut tx = pool.begin().await?;
    bind_row(sqlx::query(INSERT_SCORED), row)
        .execute(&mut *tx)
        .await?;
    tx.commit().await?;
    Ok(())
}

fn bind_row<'q>(
    query: sqlx::query::Query<'q, Postgres, sqlx::postgres::PgArguments>,
    row: &'q ScoredRow,
) -> sqlx::query::Query<'q, Postgres, sqlx::postgres::PgArguments> {
    query
        .bind(&row.loan_id)
        .bind(&row.purpose)
        .bind(&row.term)
        .bind(row.loan_amnt)
        .bind(row.annual_inc)
        .bind(row.dti)
        .bind(row.int_rate_pct)
        .bind(row.revol_util_pct)
        .bind(row.delinq_2yrs)
        .bind(row.inq_last_6mths)
        .bind(row.credit_history_years)
        .bind(row.emp_length_yrs)
        .bind(&row.dti_band)
        .bind(&row.util_band)
        .bind(&row.rate_band)
        .bind(row.early_warning_flag)
        .bind(&row.risk_tier)
        .bind(&row.reasons)
}
