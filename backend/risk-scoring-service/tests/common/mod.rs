//! In-memory stand-ins for the bus, the database and object storage.
#![allow(dead_code)]

use std::collections::HashSet;
use std::path::Path;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use risk_scoring_service::db::ScoreStore;
use risk_scoring_service::models::ScoredRow;
use risk_scoring_service::services::{BusMessage, EventSource};
use risk_scoring_service::storage::BlobStore;
use risk_scoring_service::{Result, RiskServiceError};
use serde_json::{json, Value};
use tokio::sync::watch;

pub const TOPIC: &str = "loan_applications";

/// A complete, valid application with the given id.
pub fn application(loan_id: &str) -> Value {
    json!({
        "loan_id": loan_id,
        "loan_amnt": 12000,
        "term": " 36 months",
        "int_rate": "13.56%",
        "purpose": "debt_consolidation",
        "annual_inc": 72000,
        "dti": 18.4,
        "revol_util": "45%",
        "delinq_2yrs": 0,
        "inq_last_6mths": 1,
        "emp_length": "6 years",
        "earliest_cr_line": "Aug-2003",
    })
}

pub fn message(offset: i64, payload: &Value) -> BusMessage {
    raw_message(offset, serde_json::to_vec(payload).unwrap())
}

pub fn raw_message(offset: i64, payload: Vec<u8>) -> BusMessage {
    BusMessage {
        key: Some(format!("key-{offset}")),
        payload: Some(payload),
        timestamp_ms: Some(chrono::Utc::now().timestamp_millis()),
        topic: TOPIC.to_string(),
        partition: 0,
        offset,
    }
}

// ---------------------------------------------------------------------------
// Bus
// ---------------------------------------------------------------------------

/// What the scripted source does once every message has been delivered.
pub enum WhenDrained {
    /// Flip the shutdown flag and report an idle poll.
    Shutdown(watch::Sender<bool>),
    /// Never return, like a broker that stops delivering.
    Hang,
}

/// Committed position, shared across "restarts" of the consumer.
#[derive(Default)]
pub struct OffsetLog {
    pub committed: usize,
    pub commit_calls: usize,
}

pub struct ScriptedSource {
    messages: Vec<BusMessage>,
    position: usize,
    log: Arc<Mutex<OffsetLog>>,
    when_drained: WhenDrained,
    fail_commits: bool,
}

impl ScriptedSource {
    /// Resumes from the position recorded in `log`, as a restarted group
    /// member would.
    pub fn new(messages: Vec<BusMessage>, log: Arc<Mutex<OffsetLog>>, when_drained: WhenDrained) -> Self {
        let position = log.lock().unwrap().committed;
        Self {
            messages,
            position,
            log,
            when_drained,
            fail_commits: false,
        }
    }

    pub fn failing_commits(mut self) -> Self {
        self.fail_commits = true;
        self
    }
}

#[async_trait]
impl EventSource for ScriptedSource {
    async fn poll(&mut self, _timeout: Duration) -> Result<Option<BusMessage>> {
        if let Some(msg) = self.messages.get(self.position) {
            self.position += 1;
            return Ok(Some(msg.clone()));
        }
        match &self.when_drained {
            WhenDrained::Shutdown(tx) => {
                let _ = tx.send(true);
                Ok(None)
            }
            WhenDrained::Hang => std::future::pending().await,
        }
    }

    async fn commit_offsets(&mut self) -> Result<()> {
        let mut log = self.log.lock().unwrap();
        log.commit_calls += 1;
        if self.fail_commits {
            return Err(RiskServiceError::Kafka("commit refused".into()));
        }
        log.committed = self.position;
        Ok(())
    }
}

// ---------------------------------------------------------------------------
// Database
// ---------------------------------------------------------------------------

/// Transactional store. Like PostgreSQL, a failed statement poisons the open
/// transaction until it is rolled back.
pub struct MemoryScoreStore {
    pub committed: Arc<Mutex<Vec<ScoredRow>>>,
    open: Vec<ScoredRow>,
    aborted: bool,
    fail_loan_ids: HashSet<String>,
    fail_commit: Arc<AtomicBool>,
}

impl MemoryScoreStore {
    pub fn new(committed: Arc<Mutex<Vec<ScoredRow>>>) -> Self {
        Self {
            committed,
            open: Vec::new(),
            aborted: false,
            fail_loan_ids: HashSet::new(),
            fail_commit: Arc::new(AtomicBool::new(false)),
        }
    }

    pub fn failing_on(mut self, loan_id: &str) -> Self {
        self.fail_loan_ids.insert(loan_id.to_string());
        self
    }

    pub fn commit_switch(&self) -> Arc<AtomicBool> {
        Arc::clone(&self.fail_commit)
    }
}

#[async_trait]
impl ScoreStore for MemoryScoreStore {
    async fn insert(&mut self, row: &ScoredRow) -> Result<()> {
        if self.aborted {
            return Err(RiskServiceError::Internal(
                "current transaction is aborted".into(),
            ));
        }
        if self.fail_loan_ids.contains(&row.loan_id) {
            self.aborted = true;
            return Err(RiskServiceError::Internal(format!(
                "constraint violated by {}",
                row.loan_id
            )));
        }
        self.open.push(row.clone());
        Ok(())
    }

    async fn commit(&mut self) -> Result<()> {
        if self.aborted || self.fail_commit.load(Ordering::SeqCst) {
            self.open.clear();
            self.aborted = false;
            return Err(RiskServiceError::Internal("commit failed".into()));
        }
        self.committed.lock().unwrap().append(&mut self.open);
        Ok(())
    }

    async fn rollback(&mut self) -> Result<()> {
        self.open.clear();
        self.aborted = false;
        Ok(())
    }
}

// ---------------------------------------------------------------------------
// Object storage
// ---------------------------------------------------------------------------

#[derive(Clone, Default)]
pub struct MemoryBlobStore {
    pub objects: Arc<Mutex<Vec<(String, String)>>>,
    pub fail: Arc<AtomicBool>,
}

impl MemoryBlobStore {
    pub fn set_failing(&self, failing: bool) {
        self.fail.store(failing, Ordering::SeqCst);
    }

    pub fn uploaded_lines(&self) -> usize {
        self.objects
            .lock()
            .unwrap()
            .iter()
            .map(|(_, body)| body.lines().count())
            .sum()
    }
}

#[async_trait]
impl BlobStore for MemoryBlobStore {
    async fn put(&self, local_path: &Path, key: &str, _content_type: &str) -> Result<String> {
        if self.fail.load(Ordering::SeqCst) {
            return Err(RiskServiceError::Storage("bucket unreachable".into()));
        }
        let body = std::fs::read_to_string(local_path)?;
        self.objects.lock().unwrap().push((key.to_string(), body));
        Ok(format!("mem://{key}"))
    }
}

/// Lines in every `.jsonl` file under `dir`.
pub fn local_lines(dir: &Path) -> usize {
    std::fs::read_dir(dir)
        .unwrap()
        .filter_map(|entry| entry.ok())
        .filter(|entry| entry.path().extension().is_some_and(|ext| ext == "jsonl"))
        .map(|entry| {
            std::fs::read_to_string(entry.path())
                .unwrap()
                .lines()
                .count()
        })
        .sum()
}
