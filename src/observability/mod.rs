//! Observability subsystem.
//!
//! # Data Flow
//! ```text
//! handler / executor / server
//!     → logging.rs (tracing events with route_id, request_id, status)
//!     → metrics.rs (counters, histograms)
//!
//! Consumers:
//!     → stdout (pretty or JSON)
//!     → Prometheus scrape endpoint (optional)
//! ```

pub mod logging;
pub mod metrics;
