//! Observability subsystem.
//!
//! # Data Flow
//! ```text
//! All subsystems produce:
//!     → logging.rs (structured tracing events, pretty or JSON)
//!     → metrics.rs (counters, gauges, histograms + local per-instance snapshot)
//!     → benchmark.rs (per-strategy outcomes while a comparison runs)
//!
//! Consumers:
//!     → Log aggregation (stdout)
//!     → Metrics endpoint (Prometheus scrape)
//!     → /api/metrics and the rl-static state encoder (local snapshot)
//!     → /api/benchmark (strategy comparison report)
//! ```
//!
//! # Design Decisions
//! - Trace id flows through proxy logs and downstream headers
//! - Metrics are cheap (atomic increments)

pub mod benchmark;
pub mod logging;
pub mod metrics;

pub use self::benchmark::{BenchmarkError, BenchmarkReport, BenchmarkTracker};
pub use self::logging::init_logging;
pub use self::metrics::{init_metrics, InstanceMetrics, MetricsSink};
