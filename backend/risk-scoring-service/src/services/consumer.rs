//! Streaming consumer: bus → archive → evaluate → batched store inserts.
//!
//! Offsets are acknowledged only after the rows they produced are durable, so
//! a crash replays at most the batch in flight. Replayed events are inserted
//! again; the table tolerates duplicates.

use std::time::{Duration, Instant};

use chrono::Utc;
use credit_rules::{evaluate, resolve_event_id, EvaluateOptions, RawEvent, RiskTier};
use serde_json::Value;
use tokio::sync::watch;
use tracing::{debug, error, info, warn};

use crate::db::ScoreStore;
use crate::error::Result;
use crate::metrics::{ConsumerMetrics, EventStatus};
use crate::models::ScoredRow;
use crate::services::archive::{RawEventArchive, RotationOutcome};
use crate::services::bus::{BusMessage, EventSource};
use crate::storage::BlobStore;

const MAX_BACKOFF_SECS: u64 = 60;

#[derive(Debug, Clone)]
pub struct ConsumerConfig {
    /// Successful inserts per store commit.
    pub commit_every: usize,
    pub poll_timeout: Duration,
    pub heartbeat_interval: Duration,
}

impl Default for ConsumerConfig {
    fn default() -> Self {
        Self {
            commit_every: 200,
            poll_timeout: Duration::from_millis(1000),
            heartbeat_interval: Duration::from_secs(3),
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ConsumerStats {
    /// Rows made durable by a successful store commit.
    pub processed: u64,
    pub skipped: u64,
    pub db_errors: u64,
    pub commits: u64,
}

pub struct RiskEventConsumer<S, D, B>
where
    S: EventSource,
    D: ScoreStore,
    B: BlobStore,
{
    source: S,
    store: D,
    archive: RawEventArchive<B>,
    metrics: ConsumerMetrics,
    config: ConsumerConfig,
    /// Rows inserted into the open transaction.
    pending: Vec<ScoredRow>,
    /// Messages delivered since the last offset commit.
    unacked: usize,
    consecutive_errors: u32,
    stats: ConsumerStats,
    last_heartbeat: Instant,
}

impl<S, D, B> RiskEventConsumer<S, D, B>
where
    S: EventSource,
    D: ScoreStore,
    B: BlobStore,
{
    pub fn new(
        source: S,
        store: D,
        archive: RawEventArchive<B>,
        metrics: ConsumerMetrics,
        config: ConsumerConfig,
    ) -> Self {
        Self {
            source,
            store,
            archive,
            metrics,
            config,
            pending: Vec::new(),
            unacked: 0,
            consecutive_errors: 0,
            stats: ConsumerStats::default(),
            last_heartbeat: Instant::now(),
        }
    }

    pub fn stats(&self) -> &ConsumerStats {
        &self.stats
    }

    /// Consume until `shutdown` flips to true (or its sender is dropped), then
    /// commit what is pending and close the archive.
    pub async fn run(&mut self, mut shutdown: watch::Receiver<bool>) -> Result<ConsumerStats> {
        info!(
            commit_every = self.config.commit_every,
            poll_timeout_ms = self.config.poll_timeout.as_millis() as u64,
            archive = self.archive.is_enabled(),
            "Risk event consumer started"
        );

        loop {
            if *shutdown.borrow() {
                break;
            }

            let polled = tokio::select! {
                biased;
                changed = shutdown.changed() => {
                    if changed.is_err() {
                        break;
                    }
                    continue;
                }
                polled = self.source.poll(self.config.poll_timeout) => polled,
            };

            match polled {
                Ok(Some(message)) => {
                    self.consecutive_errors = 0;
                    self.unacked += 1;
                    self.handle_message(message).await;

                    if self.pending.len() >= self.config.commit_every
                        || (self.pending.is_empty() && self.unacked >= self.config.commit_every)
                    {
                        self.commit_batch().await;
                    }
                }
                Ok(None) => {
                    self.commit_batch().await;
                    self.heartbeat(true);
                }
                Err(e) => {
                    self.consecutive_errors += 1;
                    let backoff = backoff_for(self.consecutive_errors);
                    warn!(
                        error = %e,
                        consecutive_errors = self.consecutive_errors,
                        backoff_secs = backoff.as_secs(),
                        "Bus poll failed, backing off"
                    );
                    tokio::select! {
                        _ = tokio::time::sleep(backoff) => {}
                        _ = shutdown.changed() => {}
                    }
                }
            }

            self.heartbeat(false);
        }

        self.shutdown().await;
        Ok(self.stats.clone())
    }

    /// Process one message and record its latency and lag, whatever the
    /// outcome.
    async fn handle_message(&mut self, message: BusMessage) {
        let started = Instant::now();
        let timestamp_ms = message.timestamp_ms;

        self.process_message(message).await;

        if let Some(ts) = timestamp_ms {
            let lag_ms = Utc::now().timestamp_millis() - ts;
            self.metrics.lag_seconds.set(lag_ms as f64 / 1000.0);
        }
        self.metrics
            .processing_latency
            .observe(started.elapsed().as_secs_f64());
    }

    async fn process_message(&mut self, message: BusMessage) {
        let raw = match decode_event(message.payload.as_deref()) {
            Some(raw) => raw,
            None => {
                warn!(
                    partition = message.partition,
                    offset = message.offset,
                    "Undecodable payload, skipping"
                );
                self.record_skip();
                return;
            }
        };

        if let Some(outcome) = self.archive.append(&raw).await {
            self.record_rotation(&outcome);
        }

        let loan_id = resolve_event_id(&raw, || {
            format!(
                "evt_{}_{}_{}",
                message.topic, message.partition, message.offset
            )
        });
        let evaluation = evaluate(&raw, EvaluateOptions::default());

        if evaluation.is_rejected() {
            debug!(
                loan_id = %loan_id,
                missing = ?evaluation.validation.missing,
                "Missing required fields, skipping"
            );
            self.record_skip();
            return;
        }

        let row = ScoredRow::new(loan_id, &evaluation.features, &evaluation.decision);
        match self.store.insert(&row).await {
            Ok(()) => {
                if evaluation.decision.risk_tier == RiskTier::Watchlist {
                    info!(
                        loan_id = %row.loan_id,
                        reasons = %row.reasons,
                        "Early warning: loan placed on watchlist"
                    );
                }
                self.pending.push(row);
                self.metrics
                    .last_event_unixtime
                    .set(Utc::now().timestamp_millis() as f64 / 1000.0);
            }
            Err(e) => {
                error!(
                    loan_id = %row.loan_id,
                    partition = message.partition,
                    offset = message.offset,
                    error = %e,
                    "Insert failed, rolling back batch"
                );
                self.record_db_errors(1);
                self.recover_batch().await;
            }
        }
    }

    /// Roll back the failed transaction and re-insert the rows that were
    /// pending in it. A row that fails again is dropped and counted.
    async fn recover_batch(&mut self) {
        let mut survivors = std::mem::take(&mut self.pending);

        loop {
            if let Err(e) = self.store.rollback().await {
                warn!(error = %e, "Rollback failed");
            }

            let mut failed = None;
            for (index, row) in survivors.iter().enumerate() {
                if let Err(e) = self.store.insert(row).await {
                    error!(loan_id = %row.loan_id, error = %e, "Re-insert after rollback failed");
                    failed = Some(index);
                    break;
                }
            }

            match failed {
                None => break,
                Some(index) => {
                    survivors.remove(index);
                    self.record_db_errors(1);
                }
            }
        }

        if !survivors.is_empty() {
            debug!(rows = survivors.len(), "Batch restored after rollback");
        }
        self.pending = survivors;
    }

    /// Commit the open transaction, then acknowledge the bus.
    async fn commit_batch(&mut self) {
        if !self.pending.is_empty() {
            match self.store.commit().await {
                Ok(()) => {
                    let stored = self.pending.len() as u64;
                    self.metrics.record_commit(true);
                    self.metrics.events(EventStatus::Ok).inc_by(stored);
                    self.stats.processed += stored;
                    self.stats.commits += 1;
                    debug!(rows = stored, "Batch committed");
                    self.pending.clear();
                }
                Err(e) => {
                    let lost = self.pending.len() as u64;
                    error!(rows = lost, error = %e, "Batch commit failed");
                    self.metrics.record_commit(false);
                    self.record_db_errors(lost);
                    self.pending.clear();
                    if let Err(e) = self.store.rollback().await {
                        warn!(error = %e, "Rollback after failed commit failed");
                    }
                    return;
                }
            }
        }

        if self.unacked > 0 {
            match self.source.commit_offsets().await {
                Ok(()) => self.unacked = 0,
                Err(e) => warn!(error = %e, "Offset commit failed, will retry"),
            }
        }
    }

    async fn shutdown(&mut self) {
        info!("Shutting down consumer");
        self.commit_batch().await;
        let outcome = self.archive.close().await;
        self.record_rotation(&outcome);
        info!(
            processed = self.stats.processed,
            skipped = self.stats.skipped,
            db_errors = self.stats.db_errors,
            commits = self.stats.commits,
            "Consumer stopped"
        );
    }

    fn heartbeat(&mut self, idle: bool) {
        if self.last_heartbeat.elapsed() < self.config.heartbeat_interval {
            return;
        }
        self.last_heartbeat = Instant::now();
        info!(
            processed = self.stats.processed,
            skipped = self.stats.skipped,
            db_errors = self.stats.db_errors,
            pending = self.pending.len(),
            idle,
            "Consumer heartbeat"
        );
    }

    fn record_skip(&mut self) {
        self.stats.skipped += 1;
        self.metrics.events(EventStatus::Skipped).inc();
    }

    fn record_db_errors(&mut self, count: u64) {
        self.stats.db_errors += count;
        self.metrics.events(EventStatus::DbError).inc_by(count);
    }

    fn record_rotation(&self, outcome: &RotationOutcome) {
        match outcome {
            RotationOutcome::Uploaded { .. } => self.metrics.record_rotation(true),
            RotationOutcome::Retained { .. } => self.metrics.record_rotation(false),
            RotationOutcome::Empty => {}
        }
    }
}

fn decode_event(payload: Option<&[u8]>) -> Option<RawEvent> {
    match serde_json::from_slice::<Value>(payload?) {
        Ok(Value::Object(map)) => Some(map),
        _ => None,
    }
}

/// 2^(n-1) seconds, capped.
fn backoff_for(consecutive_errors: u32) -> Duration {
    let secs = 2u64
        .saturating_pow(consecutive_errors.saturating_sub(1))
        .min(MAX_BACKOFF_SECS);
    Duration::from_secs(secs)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_backoff_doubles_and_caps() {
        assert_eq!(backoff_for(1), Duration::from_secs(1));
        assert_eq!(backoff_for(2), Duration::from_secs(2));
        assert_eq!(backoff_for(4), Duration::from_secs(8));
        assert_eq!(backoff_for(30), Duration::from_secs(MAX_BACKOFF_SECS));
    }

    #[test]
    fn test_decode_event() {
        assert!(decode_event(Some(br#"{"loan_id": "A"}"#.as_slice())).is_some());
        assert!(decode_event(Some(b"[1, 2]".as_slice())).is_none());
        assert!(decode_event(Some(b"not json".as_slice())).is_none());
        assert!(decode_event(None).is_none());
    }
}
