//! Lifecycle management.
//!
//! # Data Flow
//! ```text
//! Startup (main.rs):
//!     Load config → Validate → Init logging/metrics → Bind → Serve
//!
//! Shutdown:
//!     signals.rs (SIGINT/SIGTERM) → Shutdown::trigger
//!         → HttpServer stops accepting → in-flight requests drain → exit
//! ```
//!
//! # Design Decisions
//! - Draining is bounded by `timeouts.shutdown_grace_secs`

pub mod shutdown;
pub mod signals;

pub use shutdown::Shutdown;
