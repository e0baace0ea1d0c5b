//! canopy: server runtime for nested-route web applications.
//!
//! A request is matched against the route tree, the matched routes'
//! loaders (and the target action, for mutations) run concurrently, and
//! their outcomes are folded into one response: an HTML document, a
//! single-fetch `.data` payload, a legacy `?_data=` JSON body or a
//! server-component stream.

// Request pipeline
pub mod args;
pub mod routing;
pub mod executor;
pub mod aggregate;
pub mod revalidation;
pub mod response;

// Wire formats
pub mod codec;
pub mod handoff;

// Serving
pub mod build;
pub mod handler;
pub mod http;
pub mod client;

// Cross-cutting concerns
pub mod config;
pub mod lifecycle;
pub mod observability;

pub mod demo;

pub use build::{BuildSource, EntryModule, ServerBuild};
pub use config::ServerConfig;
pub use handler::{HandlerError, RequestHandler, RscRequestHandler};
pub use http::HttpServer;
pub use lifecycle::Shutdown;
