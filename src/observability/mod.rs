//! Observability subsystem.
//!
//! # Data Flow
//! ```text
//! All subsystems produce:
//!     → logging.rs (structured log events, per-connection spans)
//!     → metrics.rs (counters, gauges, histograms, admin totals)
//!
//! Consumers:
//!     → stdout
//!     → Metrics endpoint (Prometheus scrape)
//!     → Admin API (/admin/stats)
//! ```
//!
//! # Design Decisions
//! - Connection id flows through every event via the session span
//! - Metrics are cheap (atomic increments)

pub mod logging;
pub mod metrics;
