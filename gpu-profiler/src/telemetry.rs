//! Prometheus counters for the counter engine
//!
//! The counters live in a registry owned by this crate, so a host process
//! that already registered metrics under the same names in the default
//! registry is left alone.

use anyhow::{Context, Result};
use once_cell::sync::Lazy;
use prometheus::core::Collector;
use prometheus::{Encoder, IntCounter, IntCounterVec, Opts, Registry, TextEncoder};
use tracing::warn;

/// Registry holding every engine counter
pub static REGISTRY: Lazy<Registry> = Lazy::new(Registry::new);

fn register<C: Collector + Clone + 'static>(collector: C) -> C {
    if let Err(e) = REGISTRY.register(Box::new(collector.clone())) {
        warn!("Failed to register engine metric: {}", e);
    }
    collector
}

fn counter_vec(name: &str, help: &str, labels: &[&str]) -> IntCounterVec {
    register(IntCounterVec::new(Opts::new(name, help), labels).expect("constant metric descriptor"))
}

// ── Queue creation ───────────────────────────────────────────────────────────

pub static QUEUE_CREATE_TOTAL: Lazy<IntCounterVec> = Lazy::new(|| {
    counter_vec(
        "mdlens_queue_create_total",
        "Counter-enabled queue creation attempts",
        &["status"],
    )
});

// ── Sampling ─────────────────────────────────────────────────────────────────

pub static REPORTS_TOTAL: Lazy<IntCounterVec> =
    Lazy::new(|| counter_vec("mdlens_reports_total", "Counter reports decoded", &["mode"]));

pub static SAMPLES_DROPPED_TOTAL: Lazy<IntCounterVec> = Lazy::new(|| {
    counter_vec(
        "mdlens_samples_dropped_total",
        "Samples dropped before aggregation",
        &["reason"],
    )
});

// ── Dump ─────────────────────────────────────────────────────────────────────

pub static DUMP_ROWS_TOTAL: Lazy<IntCounter> = Lazy::new(|| {
    register(
        IntCounter::new("mdlens_dump_rows_total", "Rows appended to metric dumps")
            .expect("constant metric descriptor"),
    )
});

/// Render every engine metric in the Prometheus text format
pub fn gather_text() -> Result<String> {
    // Register everything so untouched counters still show up
    Lazy::force(&QUEUE_CREATE_TOTAL);
    Lazy::force(&REPORTS_TOTAL);
    Lazy::force(&SAMPLES_DROPPED_TOTAL);
    Lazy::force(&DUMP_ROWS_TOTAL);

    let mut buffer = Vec::new();
    TextEncoder::new()
        .encode(&REGISTRY.gather(), &mut buffer)
        .context("encode metrics")?;
    String::from_utf8(buffer).context("metrics are not UTF-8")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_gather_includes_engine_counters() {
        QUEUE_CREATE_TOTAL.with_label_values(&["ok"]).inc();
        DUMP_ROWS_TOTAL.inc();
        let text = gather_text().unwrap();
        assert!(text.contains("mdlens_queue_create_total"));
        assert!(text.contains("mdlens_dump_rows_total"));
    }

    #[test]
    fn test_host_metrics_with_same_names_do_not_collide() {
        let host = IntCounter::new("mdlens_reports_total", "host counter").unwrap();
        prometheus::register(Box::new(host.clone())).unwrap();
        host.inc();

        REPORTS_TOTAL.with_label_values(&["EBS"]).inc();
        let text = gather_text().unwrap();
        assert!(text.contains("mdlens_reports_total{mode=\"EBS\"}"));
        assert!(!text.contains("host counter"));
    }
}
