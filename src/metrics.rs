//! Pipeline metrics collection and export

use prometheus::{Encoder, Histogram, HistogramOpts, IntCounter, IntCounterVec, Opts, Registry, TextEncoder};
use std::time::Instant;

/// Metrics registry for one pipeline (or a set of pipelines sharing it)
#[derive(Clone)]
pub struct PipelineMetrics {
    registry: Registry,

    // Counters
    pub attempts_total: IntCounter,
    pub accepted_total: IntCounter,
    pub recovered_total: IntCounter,
    pub unknown_total: IntCounter,
    pub failures_total: IntCounterVec,
    pub ambiguous_total: IntCounter,

    // Histograms
    pub assemble_latency: Histogram,
    pub submit_latency: Histogram,
    pub transaction_size: Histogram,
}

impl PipelineMetrics {
    pub fn new() -> anyhow::Result<Self> {
        let registry = Registry::new();

        let attempts_total = IntCounter::with_opts(Opts::new(
            "txpipe_attempts_total",
            "Total number of pipeline attempts",
        ))?;

        let accepted_total = IntCounter::with_opts(Opts::new(
            "txpipe_accepted_total",
            "Submissions accepted by the node",
        ))?;

        let recovered_total = IntCounter::with_opts(Opts::new(
            "txpipe_recovered_total",
            "Ambiguous submissions whose signature was recovered",
        ))?;

        let unknown_total = IntCounter::with_opts(Opts::new(
            "txpipe_unknown_total",
            "Ambiguous submissions with no recoverable signature",
        ))?;

        let failures_total = IntCounterVec::new(
            Opts::new("txpipe_failures_total", "Pipeline failures by category"),
            &["category"],
        )?;

        let ambiguous_total = IntCounter::with_opts(Opts::new(
            "txpipe_ambiguous_total",
            "Submissions whose outcome the node could not confirm",
        ))?;

        let assemble_latency = Histogram::with_opts(
            HistogramOpts::new("txpipe_assemble_latency_seconds", "Sequencing through assembly latency")
                .buckets(vec![0.0001, 0.0005, 0.001, 0.005, 0.01, 0.05]),
        )?;

        let submit_latency = Histogram::with_opts(
            HistogramOpts::new("txpipe_submit_latency_seconds", "sendTransaction latency")
                .buckets(vec![0.01, 0.05, 0.1, 0.5, 1.0, 2.0, 5.0, 30.0]),
        )?;

        let transaction_size = Histogram::with_opts(
            HistogramOpts::new("txpipe_transaction_size_bytes", "Serialized transaction size")
                .buckets(vec![200.0, 400.0, 600.0, 800.0, 1000.0, 1232.0]),
        )?;

        registry.register(Box::new(attempts_total.clone()))?;
        registry.register(Box::new(accepted_total.clone()))?;
        registry.register(Box::new(recovered_total.clone()))?;
        registry.register(Box::new(unknown_total.clone()))?;
        registry.register(Box::new(failures_total.clone()))?;
        registry.register(Box::new(ambiguous_total.clone()))?;
        registry.register(Box::new(assemble_latency.clone()))?;
        registry.register(Box::new(submit_latency.clone()))?;
        registry.register(Box::new(transaction_size.clone()))?;

        Ok(Self {
            registry,
            attempts_total,
            accepted_total,
            recovered_total,
            unknown_total,
            failures_total,
            ambiguous_total,
            assemble_latency,
            submit_latency,
            transaction_size,
        })
    }

    pub fn registry(&self) -> &Registry {
        &self.registry
    }

    pub fn record_failure(&self, category: &str) {
        self.failures_total.with_label_values(&[category]).inc();
    }

    /// Render all metrics in the Prometheus text exposition format
    pub fn gather_text(&self) -> anyhow::Result<String> {
        let mut buffer = Vec::new();
        TextEncoder::new().encode(&self.registry.gather(), &mut buffer)?;
        Ok(String::from_utf8(buffer)?)
    }
}

/// Timer helper for measuring operation duration
pub struct Timer {
    start: Instant,
}

impl Timer {
    pub fn new() -> Self {
        Self { start: Instant::now() }
    }

    pub fn observe_duration(&self, histogram: &Histogram) {
        histogram.observe(self.start.elapsed().as_secs_f64());
    }
}

impl Default for Timer {
    fn default() -> Self {
        Self::new()
    }
}
