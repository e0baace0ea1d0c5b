//! HTTP adapter.
//!
//! # Data Flow
//! ```text
//! TCP connection
//!     → server.rs (Axum, middleware, graceful shutdown)
//!     → request.rs (request id, RouteRequest conversion)
//!     → handler (document / single fetch / data / rsc)
//!     → response.rs (HandlerResponse → HTTP response)
//!     → client
//! ```

pub mod request;
pub mod response;
pub mod server;

pub use request::{RequestIdExt, X_REQUEST_ID};
pub use server::{HttpServer, LoadContextFn};
