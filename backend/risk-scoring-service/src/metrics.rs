//! Prometheus metric sets for the consumer and the scoring API.
//!
//! Each set is built against a caller-supplied [`Registry`] and handed to the
//! component that updates it, so tests can inspect a private registry.

use prometheus::{
    Encoder, Gauge, Histogram, HistogramOpts, HistogramVec, IntCounter, IntCounterVec, Opts,
    Registry, TextEncoder,
};

use crate::error::Result;

const LATENCY_BUCKETS: &[f64] = &[0.001, 0.005, 0.01, 0.025, 0.05, 0.1, 0.25, 0.5, 1.0, 2.5];

/// Metrics updated by the streaming consumer loop.
#[derive(Clone)]
pub struct ConsumerMetrics {
    events_total: IntCounterVec,
    pub processing_latency: Histogram,
    pub last_event_unixtime: Gauge,
    pub lag_seconds: Gauge,
    batch_commits_total: IntCounterVec,
    archive_rotations_total: IntCounterVec,
}

impl ConsumerMetrics {
    pub fn register(registry: &Registry) -> Result<Self> {
        let events_total = IntCounterVec::new(
            Opts::new(
                "credit_risk_consumer_events_total",
                "Events consumed, partitioned by outcome; ok counts committed rows",
            ),
            &["status"],
        )?;
        let processing_latency = Histogram::with_opts(
            HistogramOpts::new(
                "credit_risk_consumer_processing_latency_seconds",
                "Time to handle one event, whatever its outcome",
            )
            .buckets(LATENCY_BUCKETS.to_vec()),
        )?;
        let last_event_unixtime = Gauge::new(
            "credit_risk_consumer_last_event_unixtime",
            "Wall-clock time of the last successfully stored event",
        )?;
        let lag_seconds = Gauge::new(
            "credit_risk_consumer_lag_seconds",
            "Wall-clock time minus the bus timestamp of the last event",
        )?;
        let batch_commits_total = IntCounterVec::new(
            Opts::new(
                "credit_risk_consumer_batch_commits_total",
                "Store transaction commits, partitioned by outcome",
            ),
            &["status"],
        )?;
        let archive_rotations_total = IntCounterVec::new(
            Opts::new(
                "credit_risk_raw_archive_rotations_total",
                "Raw archive rotations, partitioned by upload outcome",
            ),
            &["status"],
        )?;

        registry.register(Box::new(events_total.clone()))?;
        registry.register(Box::new(processing_latency.clone()))?;
        registry.register(Box::new(last_event_unixtime.clone()))?;
        registry.register(Box::new(lag_seconds.clone()))?;
        registry.register(Box::new(batch_commits_total.clone()))?;
        registry.register(Box::new(archive_rotations_total.clone()))?;

        Ok(Self {
            events_total,
            processing_latency,
            last_event_unixtime,
            lag_seconds,
            batch_commits_total,
            archive_rotations_total,
        })
    }

    pub fn events(&self, status: EventStatus) -> IntCounter {
        self.events_total.with_label_values(&[status.as_str()])
    }

    pub fn record_commit(&self, ok: bool) {
        let status = if ok { "ok" } else { "error" };
        self.batch_commits_total.with_label_values(&[status]).inc();
    }

    pub fn record_rotation(&self, uploaded: bool) {
        let status = if uploaded { "uploaded" } else { "retained" };
        self.archive_rotations_total
            .with_label_values(&[status])
            .inc();
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EventStatus {
    Ok,
    Skipped,
    DbError,
}

impl EventStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            EventStatus::Ok => "ok",
            EventStatus::Skipped => "skipped",
            EventStatus::DbError => "db_error",
        }
    }
}

/// Metrics updated by the scoring API handlers.
#[derive(Clone)]
pub struct ApiMetrics {
    requests_total: IntCounterVec,
    scoring_latency: HistogramVec,
    watchlist_total: IntCounterVec,
}

impl ApiMetrics {
    pub fn register(registry: &Registry) -> Result<Self> {
        let requests_total = IntCounterVec::new(
            Opts::new("credit_risk_requests_total", "Scoring API requests"),
            &["endpoint", "status"],
        )?;
        let scoring_latency = HistogramVec::new(
            HistogramOpts::new(
                "credit_risk_scoring_latency_seconds",
                "Scoring latency per endpoint",
            )
            .buckets(LATENCY_BUCKETS.to_vec()),
            &["endpoint"],
        )?;
        let watchlist_total = IntCounterVec::new(
            Opts::new(
                "credit_risk_watchlist_total",
                "Watchlist decisions by source",
            ),
            &["source"],
        )?;

        registry.register(Box::new(requests_total.clone()))?;
        registry.register(Box::new(scoring_latency.clone()))?;
        registry.register(Box::new(watchlist_total.clone()))?;

        Ok(Self {
            requests_total,
            scoring_latency,
            watchlist_total,
        })
    }

    pub fn record_request(&self, endpoint: &str, status: &str) {
        self.requests_total
            .with_label_values(&[endpoint, status])
            .inc();
    }

    pub fn observe_latency(&self, endpoint: &str, seconds: f64) {
        self.scoring_latency
            .with_label_values(&[endpoint])
            .observe(seconds);
    }

    pub fn record_watchlist(&self, source: &str) {
        self.watchlist_total.with_label_values(&[source]).inc();
    }
}

/// Encode every metric in `registry` in the Prometheus text format.
pub fn render(registry: &Registry) -> Result<String> {
    let encoder = TextEncoder::new();
    let mut buffer = Vec::new();
    encoder.encode(&registry.gather(), &mut buffer)?;
    Ok(String::from_utf8_lossy(&buffer).into_owned())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_consumer_metrics_render() {
        let registry = Registry::new();
        let metrics = ConsumerMetrics::register(&registry).unwrap();
        metrics.events(EventStatus::Ok).inc();
        metrics.events(EventStatus::DbError).inc_by(2);
        metrics.record_commit(true);
        metrics.record_rotation(false);

        let text = render(&registry).unwrap();
        assert!(text.contains("credit_risk_consumer_events_total{status=\"ok\"} 1"));
        assert!(text.contains("credit_risk_consumer_events_total{status=\"db_error\"} 2"));
        assert!(text.contains("credit_risk_consumer_batch_commits_total{status=\"ok\"} 1"));
        assert!(text.contains("credit_risk_raw_archive_rotations_total{status=\"retained\"} 1"));
    }

    #[test]
    fn test_double_registration_fails() {
        let registry = Registry::new();
        ApiMetrics::register(&registry).unwrap();
        assert!(ApiMetrics::register(&registry).is_err());
    }
}
