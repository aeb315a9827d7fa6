//! High-level recording interface over the raw Prometheus metrics.
//!
//! Every method is a no-op until [`super::init_metrics`] has run, so library
//! users that never initialize metrics pay nothing.

use super::prometheus::{
    ENHANCEMENTS_IN_FLIGHT, ENHANCEMENTS_TOTAL, ENHANCEMENT_LATENCY, ENHANCEMENT_TOKENS_TOTAL,
};

/// Outcome label for successful enhancements.
pub const OUTCOME_SUCCESS: &str = "success";

/// Records enhancement metrics.
#[derive(Debug, Clone, Copy, Default)]
pub struct MetricsCollector;

impl MetricsCollector {
    pub fn new() -> Self {
        Self
    }

    /// Record a finished provider call.
    ///
    /// `outcome` is [`OUTCOME_SUCCESS`] or the failure kind name.
    pub fn record_enhancement(
        &self,
        provider: &str,
        outcome: &str,
        latency_secs: f64,
        tokens: u64,
    ) {
        if let Some(total) = ENHANCEMENTS_TOTAL.get() {
            total.with_label_values(&[provider, outcome]).inc();
        }

        if let Some(latency) = ENHANCEMENT_LATENCY.get() {
            latency.with_label_values(&[provider]).observe(latency_secs);
        }

        if tokens > 0 {
            if let Some(token_total) = ENHANCEMENT_TOKENS_TOTAL.get() {
                token_total
                    .with_label_values(&[provider])
                    .inc_by(tokens as f64);
            }
        }

        tracing::trace!(provider, outcome, latency_secs, tokens, "Recorded enhancement metric");
    }

    /// A call entered the busy state for a template row.
    pub fn enhancement_started(&self, row: &str) {
        if let Some(in_flight) = ENHANCEMENTS_IN_FLIGHT.get() {
            in_flight.with_label_values(&[row]).inc();
        }
    }

    /// A call left the busy state for a template row.
    pub fn enhancement_finished(&self, row: &str) {
        if let Some(in_flight) = ENHANCEMENTS_IN_FLIGHT.get() {
            in_flight.with_label_values(&[row]).dec();
        }
    }
}
