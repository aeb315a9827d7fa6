//! Prometheus metrics registration and export.
//!
//! Defines every metric prompt-forge records and the functions for
//! initializing and exporting them.

use prometheus::{
    CounterVec, Encoder, GaugeVec, HistogramOpts, HistogramVec, Opts, Registry, TextEncoder,
};
use std::sync::OnceLock;

/// Global Prometheus registry for all prompt-forge metrics.
pub static REGISTRY: OnceLock<Registry> = OnceLock::new();

/// Enhancement calls, labeled by provider and outcome (`success` or an error kind).
pub static ENHANCEMENTS_TOTAL: OnceLock<CounterVec> = OnceLock::new();

/// Provider round-trip latency in seconds, labeled by provider.
pub static ENHANCEMENT_LATENCY: OnceLock<HistogramVec> = OnceLock::new();

/// Tokens consumed by successful enhancements, labeled by provider.
pub static ENHANCEMENT_TOKENS_TOTAL: OnceLock<CounterVec> = OnceLock::new();

/// Enhancements currently in flight, labeled by template row.
pub static ENHANCEMENTS_IN_FLIGHT: OnceLock<GaugeVec> = OnceLock::new();

/// Initialize all metrics and register them with the registry.
///
/// Safe to call more than once; later calls leave the first registry in place.
///
/// # Errors
///
/// Returns a `prometheus::Error` if a metric definition is invalid.
pub fn init_metrics() -> Result<(), prometheus::Error> {
    let registry = Registry::new();

    let enhancements_total = CounterVec::new(
        Opts::new("prompt_forge_enhancements_total", "Total enhancement calls"),
        &["provider", "outcome"],
    )?;

    let enhancement_latency = HistogramVec::new(
        HistogramOpts::new(
            "prompt_forge_enhancement_latency_seconds",
            "Provider round-trip latency in seconds",
        )
        .buckets(vec![0.25, 0.5, 1.0, 2.0, 5.0, 10.0, 30.0, 60.0]),
        &["provider"],
    )?;

    let enhancement_tokens_total = CounterVec::new(
        Opts::new(
            "prompt_forge_enhancement_tokens_total",
            "Tokens consumed by successful enhancements",
        ),
        &["provider"],
    )?;

    let enhancements_in_flight = GaugeVec::new(
        Opts::new(
            "prompt_forge_enhancements_in_flight",
            "Enhancements currently in flight",
        ),
        &["row"],
    )?;

    registry.register(Box::new(enhancements_total.clone()))?;
    registry.register(Box::new(enhancement_latency.clone()))?;
    registry.register(Box::new(enhancement_tokens_total.clone()))?;
    registry.register(Box::new(enhancements_in_flight.clone()))?;

    // Already-set cells mean an earlier call won; keep its metrics.
    let _ = REGISTRY.set(registry);
    let _ = ENHANCEMENTS_TOTAL.set(enhancements_total);
    let _ = ENHANCEMENT_LATENCY.set(enhancement_latency);
    let _ = ENHANCEMENT_TOKENS_TOTAL.set(enhancement_tokens_total);
    let _ = ENHANCEMENTS_IN_FLIGHT.set(enhancements_in_flight);

    tracing::debug!("Prometheus metrics initialized");

    Ok(())
}

/// Export all registered metrics in Prometheus text format.
///
/// Returns a comment line instead when the registry is uninitialized or
/// encoding fails.
pub fn export_metrics() -> String {
    let Some(registry) = REGISTRY.get() else {
        return "# Metrics not initialized. Call init_metrics() first.\n".to_string();
    };

    let encoder = TextEncoder::new();
    let metric_families = registry.gather();

    let mut buffer = Vec::new();
    if let Err(e) = encoder.encode(&metric_families, &mut buffer) {
        return format!("# Error encoding metrics: {}\n", e);
    }

    String::from_utf8(buffer)
        .unwrap_or_else(|e| format!("# Error converting metrics to UTF-8: {}\n", e))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_init_metrics_is_idempotent() {
        assert!(init_metrics().is_ok());
        assert!(init_metrics().is_ok());
        assert!(REGISTRY.get().is_some());
    }

    #[test]
    fn test_export_after_init() {
        let _ = init_metrics();
        if let Some(counter) = ENHANCEMENTS_TOTAL.get() {
            counter.with_label_values(&["openai", "success"]).inc();
        }

        let metrics = export_metrics();
        assert!(!metrics.starts_with("# Error"));
        assert!(metrics.contains("prompt_forge_enhancements_total"));
    }
}
