//! Prometheus metrics for core components.
//!
//! This module provides metrics for:
//! - Scheduler (job outcomes, running jobs, job duration)
//! - Converter (external tool invocations per pipeline step)

use once_cell::sync::Lazy;
use prometheus::{
    Encoder, HistogramOpts, HistogramVec, IntCounterVec, IntGauge, Opts, Registry, TextEncoder,
};

/// Registry holding every core metric.
pub static REGISTRY: Lazy<Registry> = Lazy::new(|| {
    let registry = Registry::new();
    for metric in all_metrics() {
        // Only fails on duplicate registration, which all_metrics rules out.
        let _ = registry.register(metric);
    }
    registry
});

// =============================================================================
// Scheduler Metrics
// =============================================================================

/// Jobs settled, by outcome.
pub static JOBS_TOTAL: Lazy<IntCounterVec> = Lazy::new(|| {
    IntCounterVec::new(
        Opts::new("pixelbatch_jobs_total", "Total jobs settled"),
        &["outcome"], // "completed", "failed", "canceled"
    )
    .unwrap()
});

/// Jobs currently running.
pub static JOBS_RUNNING: Lazy<IntGauge> = Lazy::new(|| {
    IntGauge::new("pixelbatch_jobs_running", "Jobs currently running").unwrap()
});

/// Wall-clock time from start to settlement.
pub static JOB_DURATION: Lazy<HistogramVec> = Lazy::new(|| {
    HistogramVec::new(
        HistogramOpts::new(
            "pixelbatch_job_duration_seconds",
            "Duration of a job from start to settlement",
        )
        .buckets(vec![0.05, 0.1, 0.25, 0.5, 1.0, 2.5, 5.0, 10.0, 30.0, 60.0, 300.0]),
        &["outcome"],
    )
    .unwrap()
});

// =============================================================================
// Converter Metrics
// =============================================================================

/// External tool invocations that ran to exit.
pub static TOOL_INVOCATIONS: Lazy<IntCounterVec> = Lazy::new(|| {
    IntCounterVec::new(
        Opts::new(
            "pixelbatch_tool_invocations_total",
            "Total external tool invocations",
        ),
        &["step", "result"], // result: "success", "failed"
    )
    .unwrap()
});

// =============================================================================
// Helper functions
// =============================================================================

/// Get all core metrics for registration in a registry.
pub fn all_metrics() -> Vec<Box<dyn prometheus::core::Collector>> {
    vec![
        Box::new(JOBS_TOTAL.clone()),
        Box::new(JOBS_RUNNING.clone()),
        Box::new(JOB_DURATION.clone()),
        Box::new(TOOL_INVOCATIONS.clone()),
    ]
}

/// Encodes [`REGISTRY`] in the Prometheus text exposition format.
pub fn gather_text() -> String {
    let encoder = TextEncoder::new();
    let mut buffer = Vec::new();
    if let Err(e) = encoder.encode(&REGISTRY.gather(), &mut buffer) {
        tracing::warn!("Failed to encode metrics: {}", e);
    }
    String::from_utf8_lossy(&buffer).into_owned()
}
