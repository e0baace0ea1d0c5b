//! Request handler: turns an incoming request into a route-data response.
//!
//! # Data Flow
//! ```text
//! RouteRequest
//!     │
//!     ▼
//! DerivedCache::get ──▶ Derived { routes, executor, mode }
//!     │
//!     ▼
//! RequestKind::classify
//!     ├─ SingleFetch  (`<path>.data`, single fetch on)  → single_fetch.rs
//!     ├─ Data(route)  (`?_data=<id>`, single fetch off) → legacy.rs
//!     └─ Document                                       → document.rs
//!
//! Server components go through rsc.rs, mounted separately.
//! ```
//!
//! # Design Decisions
//! - Route failures never surface as [`HandlerError`]; they are rendered
//!   into the response. `HandlerError` is reserved for a broken build or
//!   missing collaborator input
//! - Ordinary errors are reported to the build's `handle_error` once per
//!   request, before the response is built

pub mod errors;

mod document;
mod legacy;
pub mod rsc;
mod single_fetch;

use std::fmt;
use std::sync::Arc;
use std::time::Instant;

use axum::body::Bytes;
use axum::http::{HeaderMap, StatusCode};
use futures_util::stream::BoxStream;
use url::Url;

use crate::aggregate::Aggregator;
use crate::args::{LoadContext, RouteRequest};
use crate::build::{BuildSource, Derived, DerivedCache, ErrorContext};
use crate::codec::{EncodedResponse, ErrorValue};
use crate::config::{FutureConfig, ServerMode};
use crate::executor::{LoaderRun, Outcome, RequestScope, RouteOutcome};
use crate::observability::metrics;
use crate::response::not_found;

pub use errors::{DevServerHooks, HandlerError};
pub use rsc::RscRequestHandler;

/// Body of a handler response.
pub enum ResponseBody {
    Full(Bytes),
    Stream(BoxStream<'static, Result<Bytes, std::io::Error>>),
}

impl ResponseBody {
    pub fn empty() -> Self {
        ResponseBody::Full(Bytes::new())
    }

    /// The buffered body, `None` for streams.
    pub fn as_bytes(&self) -> Option<&Bytes> {
        match self {
            ResponseBody::Full(bytes) => Some(bytes),
            ResponseBody::Stream(_) => None,
        }
    }
}

impl fmt::Debug for ResponseBody {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ResponseBody::Full(bytes) => write!(f, "Full({} bytes)", bytes.len()),
            ResponseBody::Stream(_) => f.write_str("Stream"),
        }
    }
}

#[derive(Debug)]
pub struct HandlerResponse {
    pub status: StatusCode,
    pub headers: HeaderMap,
    pub body: ResponseBody,
}

impl From<EncodedResponse> for HandlerResponse {
    fn from(encoded: EncodedResponse) -> Self {
        Self {
            status: encoded.status,
            headers: encoded.headers,
            body: ResponseBody::Full(encoded.body),
        }
    }
}

/// What a request is asking for.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RequestKind {
    SingleFetch,
    /// Legacy per-route data request for the given route id.
    Data(String),
    Document,
}

impl RequestKind {
    pub fn classify(request: &RouteRequest, future: &FutureConfig) -> Self {
        if future.v3_single_fetch {
            if request.pathname().ends_with(".data") {
                return RequestKind::SingleFetch;
            }
        } else if let Some(route_id) = request.search_param("_data") {
            return RequestKind::Data(route_id);
        }
        RequestKind::Document
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            RequestKind::SingleFetch => "single_fetch",
            RequestKind::Data(_) => "data",
            RequestKind::Document => "document",
        }
    }
}

/// Copy of `url` without the search param `name`.
pub(crate) fn without_search_param(url: &Url, name: &str) -> Url {
    let kept: Vec<(String, String)> = url
        .query_pairs()
        .filter(|(k, _)| k != name)
        .map(|(k, v)| (k.into_owned(), v.into_owned()))
        .collect();
    let mut out = url.clone();
    if kept.is_empty() {
        out.set_query(None);
    } else {
        out.query_pairs_mut().clear().extend_pairs(&kept);
    }
    out
}

/// Per-request view of the derived build shared by every request kind.
pub(crate) struct Dispatch<'a> {
    pub derived: &'a Derived,
    pub hooks: Option<&'a dyn DevServerHooks>,
}

impl<'a> Dispatch<'a> {
    /// Match the request. A miss yields the root alone with a 404 already
    /// thrown at it.
    pub fn scope(&self, request: RouteRequest, context: LoadContext) -> (RequestScope, Option<LoaderRun>) {
        match self.derived.routes.matches(request.pathname()) {
            Some(matches) => (RequestScope::new(request, context, matches), None),
            None => {
                tracing::debug!(path = %request.pathname(), "No route matches URL");
                let root = self.derived.routes.root_match();
                let run = LoaderRun {
                    outcomes: vec![RouteOutcome {
                        route_id: root.id().to_string(),
                        outcome: Outcome::ThrownResponse(not_found(request.pathname())),
                    }],
                    redirect: None,
                };
                (RequestScope::new(request, context, vec![root]), Some(run))
            }
        }
    }

    pub fn aggregator<'s>(&'s self, scope: &'s RequestScope) -> Aggregator<'s> {
        Aggregator::new(self.derived.args(), scope, self.derived.mode)
    }

    /// Report every ordinary error among `outcomes`.
    pub fn report<'o>(&self, scope: &RequestScope, outcomes: impl IntoIterator<Item = &'o RouteOutcome>) {
        for outcome in outcomes {
            if let Outcome::ThrownError(error) = &outcome.outcome {
                tracing::warn!(route_id = %outcome.route_id, error = %error, "Route threw an error");
                self.report_error(scope, error);
            }
        }
    }

    pub fn report_error(&self, scope: &RequestScope, error: &ErrorValue) {
        if self.derived.mode == ServerMode::Development {
            if let Some(hooks) = self.hooks {
                hooks.process_request_error(error);
            }
        }
        let cx = ErrorContext {
            request: scope.server.request.clone(),
            params: scope
                .matches
                .first()
                .map(|m| m.params.clone())
                .unwrap_or_default(),
            context: scope.server.context.clone(),
        };
        self.derived.handle_error(error, &cx);
    }
}

/// Entry point for document, single-fetch and legacy data requests.
pub struct RequestHandler {
    builds: DerivedCache,
    hooks: Option<Arc<dyn DevServerHooks>>,
}

impl RequestHandler {
    /// `mode` overrides the build's own mode when given.
    pub fn new(source: BuildSource, mode: Option<ServerMode>) -> Self {
        Self {
            builds: DerivedCache::new(source, mode),
            hooks: None,
        }
    }

    pub fn with_dev_hooks(mut self, hooks: Arc<dyn DevServerHooks>) -> Self {
        self.hooks = Some(hooks);
        self
    }

    pub async fn handle(
        &self,
        request: RouteRequest,
        context: LoadContext,
    ) -> Result<HandlerResponse, HandlerError> {
        let start = Instant::now();
        let derived = self.builds.get().await?;
        let kind = RequestKind::classify(&request, &derived.build.future);
        tracing::debug!(
            kind = kind.as_str(),
            method = %request.method(),
            path = %request.pathname(),
            "Handling request"
        );

        let dispatch = Dispatch {
            derived: &derived,
            hooks: self.hooks.as_deref(),
        };
        let result = match &kind {
            RequestKind::SingleFetch => single_fetch::handle(&dispatch, request, context).await,
            RequestKind::Data(route_id) => legacy::handle(&dispatch, route_id, request, context).await,
            RequestKind::Document => document::handle(&dispatch, request, context).await,
        };

        let status = match &result {
            Ok(response) => response.status,
            Err(err) => {
                tracing::error!(kind = kind.as_str(), error = %err, "Request failed");
                err.status()
            }
        };
        metrics::record_request(kind.as_str(), status.as_u16(), start);
        result
    }
}

impl fmt::Debug for RequestHandler {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RequestHandler")
            .field("source", self.builds.source())
            .field("dev_hooks", &self.hooks.is_some())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use axum::http::Method;

    use super::*;

    fn request(url: &str) -> RouteRequest {
        RouteRequest::new(Method::GET, Url::parse(url).unwrap())
    }

    #[test]
    fn test_classify() {
        let single = FutureConfig {
            v3_single_fetch: true,
            ..FutureConfig::default()
        };
        let legacy = FutureConfig::default();

        assert_eq!(
            RequestKind::classify(&request("http://x/data.data"), &single),
            RequestKind::SingleFetch
        );
        assert_eq!(
            RequestKind::classify(&request("http://x/data?_data=routes/data"), &single),
            RequestKind::Document
        );
        assert_eq!(
            RequestKind::classify(&request("http://x/data?_data=routes/data"), &legacy),
            RequestKind::Data("routes/data".into())
        );
        assert_eq!(
            RequestKind::classify(&request("http://x/data.data"), &legacy),
            RequestKind::Document
        );
    }

    #[test]
    fn test_without_search_param() {
        let url = Url::parse("http://x/a?_routes=root&page=2").unwrap();
        assert_eq!(without_search_param(&url, "_routes").as_str(), "http://x/a?page=2");
        let url = Url::parse("http://x/a?_routes=root").unwrap();
        assert_eq!(without_search_param(&url, "_routes").as_str(), "http://x/a");
    }
}
