//! Routing subsystem.
//!
//! # Data Flow
//! ```text
//! Route Compilation (at build derivation):
//!     RouteRecord[]
//!     → tree.rs (validate ids, parents, single root)
//!     → flatten into branches (optional segments exploded)
//!     → matcher.rs (score, stable rank)
//!     → Freeze as immutable RouteTree
//!
//! Incoming pathname
//!     → first ranked branch whose segments all match
//!     → Return: root-to-leaf MatchedRoute[] or None
//! ```
//!
//! # Design Decisions
//! - Trees are built once per derived build, immutable at runtime
//! - No regex in hot path (segment walk only)
//! - Deterministic: same input always matches same routes
//! - Highest score wins, ties keep declaration order

pub mod matcher;
pub mod module;
pub mod tree;

pub use module::{RouteModule, ShouldRevalidateArgs};
pub use tree::{InvalidRouteTree, MatchedRoute, RouteRecord, RouteTree, RouteTreeError};
