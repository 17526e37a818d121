//! Observability for the edge stale-while-revalidate cache.
//!
//! This crate provides:
//! - `SwrMetrics` - Lock-free counters updated by the engine
//! - `MetricsSnapshot` - Serializable point-in-time copy of the counters

mod metrics;

pub use metrics::*;
