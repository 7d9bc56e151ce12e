//! Prefetch observability.
//!
//! - `metrics` feature: OpenTelemetry counters and histograms exported through
//!   a Prometheus registry ([`METRICS`])
//! - `tracing` feature: spans around fetches and statements

#[cfg(feature = "metrics")]
mod recorder;
#[cfg(feature = "metrics")]
pub use recorder::{PrefetchMetrics, METRICS};

#[cfg(feature = "tracing")]
pub mod tracing_helpers;
