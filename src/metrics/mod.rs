//! Prometheus metrics for enhancement calls.
//!
//! ```ignore
//! use prompt_forge::metrics::{export_metrics, init_metrics, MetricsCollector};
//!
//! init_metrics().expect("Failed to initialize metrics");
//! MetricsCollector::new().record_enhancement("openai", "success", 0.8, 120);
//! println!("{}", export_metrics());
//! ```

pub mod collectors;
pub mod prometheus;

pub use collectors::{MetricsCollector, OUTCOME_SUCCESS};
pub use prometheus::{export_metrics, init_metrics};

pub use prometheus::{
    ENHANCEMENTS_IN_FLIGHT, ENHANCEMENTS_TOTAL, ENHANCEMENT_LATENCY, ENHANCEMENT_TOKENS_TOTAL,
    REGISTRY,
};
