//! Prometheus metrics (spec §4.6): request counters/latency histograms,
//! per-stage latency, per-source retrieved-document counts, and abstain
//! counts by reason. Grounded in the metrics stack pattern used for the
//! vector-database monitoring subsystem, trimmed to a single
//! `Registry`-owning struct built once at startup rather than a process-
//! global singleton.

use crate::domain::AbstainReason;
use crate::generate::AbstainRecorder;
use prometheus::{
    CounterVec, Encoder, HistogramVec, Opts, Registry, TextEncoder,
};

pub struct Metrics {
    registry: Registry,
    pub requests_total: CounterVec,
    pub request_latency_seconds: HistogramVec,
    pub stage_latency_seconds: HistogramVec,
    pub retrieved_documents_total: CounterVec,
    pub abstain_total: CounterVec,
}

impl Metrics {
    pub fn new() -> prometheus::Result<Self> {
        let registry = Registry::new();

        let requests_total = CounterVec::new(
            Opts::new("requests_total", "Total HTTP requests by route and method"),
            &["route", "method"],
        )?;
        let request_latency_seconds = HistogramVec::new(
            prometheus::HistogramOpts::new(
                "request_latency_seconds",
                "Request latency in seconds by route",
            ),
            &["route"],
        )?;
        let stage_latency_seconds = HistogramVec::new(
            prometheus::HistogramOpts::new(
                "stage_latency_seconds",
                "Per-stage latency in seconds (retrieve, rerank, generate)",
            ),
            &["stage"],
        )?;
        let retrieved_documents_total = CounterVec::new(
            Opts::new(
                "retrieved_documents_total",
                "Documents retrieved per backend source",
            ),
            &["source"],
        )?;
        let abstain_total = CounterVec::new(
            Opts::new("abstain_total", "Abstentions by reason"),
            &["reason"],
        )?;

        registry.register(Box::new(requests_total.clone()))?;
        registry.register(Box::new(request_latency_seconds.clone()))?;
        registry.register(Box::new(stage_latency_seconds.clone()))?;
        registry.register(Box::new(retrieved_documents_total.clone()))?;
        registry.register(Box::new(abstain_total.clone()))?;

        Ok(Self {
            registry,
            requests_total,
            request_latency_seconds,
            stage_latency_seconds,
            retrieved_documents_total,
            abstain_total,
        })
    }

    pub fn record_request(&self, route: &str, method: &str, elapsed_secs: f64) {
        self.requests_total.with_label_values(&[route, method]).inc();
        self.request_latency_seconds
            .with_label_values(&[route])
            .observe(elapsed_secs);
    }

    pub fn record_stage(&self, stage: &str, elapsed_secs: f64) {
        self.stage_latency_seconds
            .with_label_values(&[stage])
            .observe(elapsed_secs);
    }

    pub fn record_retrieved(&self, source: &str, count: usize) {
        self.retrieved_documents_total
            .with_label_values(&[source])
            .inc_by(count as f64);
    }

    /// Text exposition for `GET /metrics`.
    pub fn encode(&self) -> String {
        let families = self.registry.gather();
        let mut buffer = Vec::new();
        TextEncoder::new()
            .encode(&families, &mut buffer)
            .expect("prometheus text encoding is infallible for valid metric families");
        String::from_utf8(buffer).expect("prometheus text encoder always emits valid UTF-8")
    }
}

impl AbstainRecorder for Metrics {
    fn record(&self, reason: AbstainReason) {
        self.abstain_total.with_label_values(&[reason.as_str()]).inc();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_metrics_new_registers_without_error() {
        assert!(Metrics::new().is_ok());
    }

    #[test]
    fn test_record_request_appears_in_encode() {
        let metrics = Metrics::new().unwrap();
        metrics.record_request("/search", "GET", 0.1);
        let output = metrics.encode();
        assert!(output.contains("requests_total"));
    }

    #[test]
    fn test_abstain_recorder_increments_by_reason() {
        let metrics = Metrics::new().unwrap();
        metrics.record(AbstainReason::LowCoverage);
        let output = metrics.encode();
        assert!(output.contains("abstain_total"));
        assert!(output.contains("low_coverage"));
    }

    #[test]
    fn test_record_retrieved_tracks_per_source() {
        let metrics = Metrics::new().unwrap();
        metrics.record_retrieved("bm25", 5);
        metrics.record_retrieved("dense", 3);
        let output = metrics.encode();
        assert!(output.contains("retrieved_documents_total"));
    }
}
