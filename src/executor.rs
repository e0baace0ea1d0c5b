//! Data executor: runs the loaders and the action of one request.
//!
//! # Data Flow
//! ```text
//! GET   matches ──(RouteFilter)──▶ loaders, started root to leaf,
//!                                  polled together on the request task
//!                                  ──▶ LoaderRun (first redirect ends it)
//!
//! POST  matches ──▶ action target ──▶ action
//!                     │ failure (thrown, status ≥ 400, redirect)
//!                     │     ──▶ SubmitRun { loaders: None }
//!                     └ success ──▶ loaders on a GET copy of the request
//!                                   ──▶ SubmitRun { loaders: Some(..) }
//! ```
//!
//! # Design Decisions
//! - Every route function result is folded into an [`Outcome`] immediately;
//!   nothing downstream inspects `Returned`/`Thrown` again
//! - Loader functions are invoked inside the polled future, so a loader
//!   that has not been polled when a redirect lands is never called
//! - Loaders are concurrent, so a descendant may already be in flight when
//!   an ancestor's redirect settles after a suspension point. Its future is
//!   dropped at that moment and its outcome never reaches the response
//! - One route's failure never cancels its siblings

use std::collections::BTreeSet;
use std::sync::Arc;

use axum::http::{HeaderMap, Method, StatusCode};
use futures_util::stream::{FuturesUnordered, StreamExt};

use crate::args::{ArgumentBuilder, LoadContext, RouteRequest, ServerScope};
use crate::codec::{ErrorValue, Value};
use crate::observability::metrics;
use crate::response::{
    method_not_allowed, no_loader, redirect_from, DataResponse, HandlerResult, Redirect,
    Returned, Thrown,
};
use crate::routing::MatchedRoute;

/// What a single loader or action produced.
#[derive(Debug, Clone)]
pub enum Outcome {
    /// Returned data, or a returned Response unwrapped into its parts.
    Data {
        value: Value,
        headers: HeaderMap,
        status: StatusCode,
    },
    /// A Response thrown on purpose (404s, redirects, auth failures).
    ThrownResponse(DataResponse),
    /// An unexpected failure.
    ThrownError(ErrorValue),
}

impl Outcome {
    pub fn from_result(result: HandlerResult) -> Self {
        match result {
            Ok(Returned::Data(value)) => Outcome::Data {
                value,
                headers: HeaderMap::new(),
                status: StatusCode::OK,
            },
            Ok(Returned::Response(response)) => {
                let (status, headers, value) = response.into_parts();
                Outcome::Data {
                    value,
                    headers,
                    status,
                }
            }
            Err(Thrown::Response(response)) => Outcome::ThrownResponse(response),
            Err(Thrown::Error(error)) => Outcome::ThrownError(error),
        }
    }

    /// `null` data for routes that have no loader.
    pub fn empty() -> Self {
        Outcome::Data {
            value: Value::Null,
            headers: HeaderMap::new(),
            status: StatusCode::OK,
        }
    }

    /// Redirect signalled by a returned or thrown Response.
    pub fn redirect(&self) -> Option<Redirect> {
        match self {
            Outcome::Data {
                status, headers, ..
            } => redirect_from(*status, headers),
            Outcome::ThrownResponse(response) => response.to_redirect(),
            Outcome::ThrownError(_) => None,
        }
    }

    /// Headers of the Response behind this outcome. Thrown errors have none.
    pub fn headers(&self) -> Option<&HeaderMap> {
        match self {
            Outcome::Data { headers, .. } => Some(headers),
            Outcome::ThrownResponse(response) => Some(response.headers()),
            Outcome::ThrownError(_) => None,
        }
    }

    pub fn status(&self) -> StatusCode {
        match self {
            Outcome::Data { status, .. } => *status,
            Outcome::ThrownResponse(response) => response.status(),
            Outcome::ThrownError(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    pub fn is_thrown(&self) -> bool {
        !matches!(self, Outcome::Data { .. })
    }

    /// Anything but plain successful data. After an action this suppresses
    /// the revalidation phase.
    pub fn is_failure(&self) -> bool {
        self.is_thrown() || self.status().as_u16() >= 400 || self.redirect().is_some()
    }
}

/// An outcome tagged with the route that produced it.
#[derive(Debug, Clone)]
pub struct RouteOutcome {
    pub route_id: String,
    pub outcome: Outcome,
}

/// Everything a request's route functions share.
#[derive(Debug, Clone)]
pub struct RequestScope {
    pub server: ServerScope,
    pub matches: Vec<MatchedRoute>,
}

impl RequestScope {
    pub fn new(request: RouteRequest, context: LoadContext, matches: Vec<MatchedRoute>) -> Self {
        let infos = matches.iter().map(MatchedRoute::info).collect::<Vec<_>>();
        Self {
            server: ServerScope {
                request: Arc::new(request),
                context,
                matches: Arc::from(infos),
            },
            matches,
        }
    }

    pub fn request(&self) -> &RouteRequest {
        &self.server.request
    }

    /// Scope for the loaders that follow an action: a body-less GET to the
    /// same URL with the same headers.
    pub fn for_revalidation(&self) -> Self {
        let request = RouteRequest::new(Method::GET, self.request().url().clone())
            .with_headers(self.request().headers().clone());
        Self {
            server: ServerScope {
                request: Arc::new(request),
                context: self.server.context.clone(),
                matches: self.server.matches.clone(),
            },
            matches: self.matches.clone(),
        }
    }
}

/// Which matched routes a loader pass covers.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub enum RouteFilter {
    #[default]
    All,
    Only(BTreeSet<String>),
}

impl RouteFilter {
    /// Parse a `_routes=a,b` value. An absent or empty value means all.
    pub fn from_param(param: Option<&str>) -> Self {
        match param {
            Some(list) if !list.is_empty() => RouteFilter::Only(
                list.split(',')
                    .filter(|id| !id.is_empty())
                    .map(str::to_string)
                    .collect(),
            ),
            _ => RouteFilter::All,
        }
    }

    pub fn includes(&self, route_id: &str) -> bool {
        match self {
            RouteFilter::All => true,
            RouteFilter::Only(ids) => ids.contains(route_id),
        }
    }
}

/// Result of a loader pass.
#[derive(Debug, Clone, Default)]
pub struct LoaderRun {
    /// Outcomes of the routes that settled, in match order.
    pub outcomes: Vec<RouteOutcome>,
    /// The loader whose redirect cut the pass short.
    pub redirect: Option<RouteOutcome>,
}

impl LoaderRun {
    pub fn get(&self, route_id: &str) -> Option<&Outcome> {
        self.outcomes
            .iter()
            .find(|o| o.route_id == route_id)
            .map(|o| &o.outcome)
    }
}

/// Result of a mutation: the action and, when it succeeded, the loaders.
#[derive(Debug, Clone)]
pub struct SubmitRun {
    pub action: RouteOutcome,
    pub loaders: Option<LoaderRun>,
}

#[derive(Debug, Clone, Copy)]
pub struct Executor {
    args: ArgumentBuilder,
}

impl Executor {
    pub fn new(args: ArgumentBuilder) -> Self {
        Self { args }
    }

    pub fn args(&self) -> &ArgumentBuilder {
        &self.args
    }

    /// Index of the match whose action handles a mutation: the leaf, or its
    /// parent layout when the leaf is an index route and `?index` is absent.
    pub fn action_target(matches: &[MatchedRoute], request: &RouteRequest) -> Option<usize> {
        let leaf = matches.len().checked_sub(1)?;
        if matches[leaf].route.index && leaf > 0 && !request.has_search_param("index") {
            return Some(leaf - 1);
        }
        Some(leaf)
    }

    /// Run the loaders of every match `filter` admits.
    pub async fn load(&self, scope: &RequestScope, filter: &RouteFilter) -> LoaderRun {
        let mut settled: Vec<Option<Outcome>> = vec![None; scope.matches.len()];
        let mut pending = FuturesUnordered::new();

        for (i, m) in scope.matches.iter().enumerate() {
            if !filter.includes(m.id()) {
                continue;
            }
            let Some(loader) = m.route.module.loader.clone() else {
                settled[i] = Some(Outcome::empty());
                continue;
            };
            let args = self.args.loader(&scope.server, &m.params);
            let route_id = m.id().to_string();
            pending.push(async move {
                tracing::debug!(route_id = %route_id, "Invoking loader");
                metrics::record_invocation("loader");
                (i, Outcome::from_result(loader(args).await))
            });
        }

        while let Some((i, outcome)) = pending.next().await {
            let route_id = scope.matches[i].id().to_string();
            if let Some(redirect) = outcome.redirect() {
                tracing::debug!(
                    route_id = %route_id,
                    location = %redirect.location,
                    dropped = pending.len(),
                    "Loader redirected, dropping remaining loaders"
                );
                return LoaderRun {
                    outcomes: collect(scope, settled),
                    redirect: Some(RouteOutcome { route_id, outcome }),
                };
            }
            if outcome.is_thrown() {
                tracing::debug!(route_id = %route_id, status = %outcome.status(), "Loader threw");
            }
            settled[i] = Some(outcome);
        }

        LoaderRun {
            outcomes: collect(scope, settled),
            redirect: None,
        }
    }

    /// Run the action of the mutation's target route.
    pub async fn act(&self, scope: &RequestScope) -> Option<RouteOutcome> {
        let target = Self::action_target(&scope.matches, scope.request())?;
        Some(self.act_route(scope, target).await)
    }

    /// Action first; loaders only when it succeeded.
    pub async fn submit(&self, scope: &RequestScope, filter: &RouteFilter) -> Option<SubmitRun> {
        let action = self.act(scope).await?;
        if action.outcome.is_failure() {
            tracing::debug!(
                route_id = %action.route_id,
                status = %action.outcome.status(),
                "Action did not succeed, skipping revalidation"
            );
            return Some(SubmitRun {
                action,
                loaders: None,
            });
        }
        let loaders = self.load(&scope.for_revalidation(), filter).await;
        Some(SubmitRun {
            action,
            loaders: Some(loaders),
        })
    }

    /// Run one match's loader. A route without one answers 400.
    pub async fn load_route(&self, scope: &RequestScope, index: usize) -> RouteOutcome {
        RouteOutcome {
            route_id: scope.matches[index].id().to_string(),
            outcome: Outcome::from_result(self.call_loader(scope, index).await),
        }
    }

    /// Run one match's action. A route without one answers 405.
    pub async fn act_route(&self, scope: &RequestScope, index: usize) -> RouteOutcome {
        RouteOutcome {
            route_id: scope.matches[index].id().to_string(),
            outcome: Outcome::from_result(self.call_action(scope, index).await),
        }
    }

    /// [`Executor::load_route`] without folding, for callers that treat a
    /// returned Response differently from returned data.
    pub async fn call_loader(&self, scope: &RequestScope, index: usize) -> HandlerResult {
        let m = &scope.matches[index];
        match &m.route.module.loader {
            Some(loader) => {
                tracing::debug!(route_id = %m.id(), "Invoking loader");
                metrics::record_invocation("loader");
                loader(self.args.loader(&scope.server, &m.params)).await
            }
            None => Err(Thrown::Response(no_loader(scope.request().pathname(), m.id()))),
        }
    }

    pub async fn call_action(&self, scope: &RequestScope, index: usize) -> HandlerResult {
        let m = &scope.matches[index];
        match &m.route.module.action {
            Some(action) => {
                tracing::debug!(route_id = %m.id(), "Invoking action");
                metrics::record_invocation("action");
                action(self.args.action(&scope.server, &m.params)).await
            }
            None => Err(Thrown::Response(method_not_allowed(
                scope.request().method().as_str(),
                scope.request().pathname(),
                m.id(),
            ))),
        }
    }
}

fn collect(scope: &RequestScope, settled: Vec<Option<Outcome>>) -> Vec<RouteOutcome> {
    scope
        .matches
        .iter()
        .zip(settled)
        .filter_map(|(m, outcome)| {
            outcome.map(|outcome| RouteOutcome {
                route_id: m.id().to_string(),
                outcome,
            })
        })
        .collect()
}
