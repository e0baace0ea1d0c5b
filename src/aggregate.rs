//! Response aggregator: folds per-route outcomes into one response.
//!
//! # Responsibilities
//! - Turn each route's [`Outcome`] into a [`RouteResult`]
//! - Merge headers root to leaf, stopping at the error boundary
//! - Pick the overall status
//!
//! # Header Merge
//! ```text
//! parent = {}
//! for route in matches[..=boundary]:
//!     headers fn present and route did not throw:
//!         headers = fn(loaderHeaders, parentHeaders, actionHeaders, errorHeaders?)
//!         + Set-Cookie from error, action, loader, parent
//!     otherwise:
//!         headers = parent ∪ action ∪ loader   (later wins)
//!         route threw: ∪ error headers          (thrower is the boundary)
//!         otherwise:   + Set-Cookie from error
//!     parent = headers
//! ```
//! A route that threw a Response never has its own headers function called.
//! Its headers become `errorHeaders`, offered to the boundary route only.
//!
//! # Status
//! Redirect status, else the first error in match order (the thrown
//! Response's status, 500 for ordinary errors), else a non-200 action
//! status, else the first non-200 loader status, else 200.

use axum::http::{header, HeaderMap, StatusCode};

use crate::args::{ArgumentBuilder, HeaderInputs};
use crate::codec::{ErrorValue, PayloadKind, Value};
use crate::config::ServerMode;
use crate::executor::{LoaderRun, Outcome, RequestScope, RouteOutcome};
use crate::response::Redirect;
use crate::routing::RouteTree;

/// Message every ordinary error is reduced to in production.
pub const SANITIZED_MESSAGE: &str = "Unexpected Server Error";

/// One route's result as it goes over the wire.
#[derive(Debug, Clone, PartialEq)]
pub enum RouteResult {
    Data(Value),
    Error(Value),
    Redirect(Redirect),
}

/// Where errors are reported.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorPlacement {
    /// Keyed by the throwing route; the client bubbles. Single fetch.
    Thrower,
    /// Keyed by the nearest route with an error boundary. Documents.
    Boundary,
}

/// The consolidated response for one request.
#[derive(Debug, Clone)]
pub struct AggregatedResponse {
    kind: PayloadKind,
    results: Vec<(String, RouteResult)>,
    headers: HeaderMap,
    status: StatusCode,
    redirect: Option<Redirect>,
}

impl AggregatedResponse {
    fn redirecting(kind: PayloadKind, route_id: &str, outcome: &Outcome, redirect: Redirect) -> Self {
        Self {
            kind,
            results: vec![(route_id.to_string(), RouteResult::Redirect(redirect.clone()))],
            headers: outcome.headers().cloned().unwrap_or_default(),
            status: redirect.status,
            redirect: Some(redirect),
        }
    }

    pub fn kind(&self) -> PayloadKind {
        self.kind
    }

    /// Results in match order, root first.
    pub fn results(&self) -> &[(String, RouteResult)] {
        &self.results
    }

    pub fn get(&self, route_id: &str) -> Option<&RouteResult> {
        self.results
            .iter()
            .find(|(id, _)| id == route_id)
            .map(|(_, r)| r)
    }

    /// Route id → error, for every route reporting one.
    pub fn errors(&self) -> impl Iterator<Item = (&str, &Value)> {
        self.results.iter().filter_map(|(id, r)| match r {
            RouteResult::Error(v) => Some((id.as_str(), v)),
            _ => None,
        })
    }

    pub fn headers(&self) -> &HeaderMap {
        &self.headers
    }

    pub fn status(&self) -> StatusCode {
        self.status
    }

    pub fn redirect(&self) -> Option<&Redirect> {
        self.redirect.as_ref()
    }
}

/// Reduce an error to what may leave the server in `mode`.
pub fn sanitize_error(error: &ErrorValue, mode: ServerMode) -> ErrorValue {
    if mode.is_production() {
        ErrorValue::new(SANITIZED_MESSAGE)
    } else {
        error.clone()
    }
}

/// Append every `Set-Cookie` in `from` that `into` does not carry yet.
pub fn prepend_cookies(from: &HeaderMap, into: &mut HeaderMap) {
    for cookie in from.get_all(header::SET_COOKIE) {
        if !into.get_all(header::SET_COOKIE).iter().any(|v| v == cookie) {
            into.append(header::SET_COOKIE, cookie.clone());
        }
    }
}

/// Copy `from` over `into`, replacing same-named headers. Cookies are
/// accumulated, never replaced.
fn overlay(from: &HeaderMap, into: &mut HeaderMap) {
    for name in from.keys() {
        if name == header::SET_COOKIE {
            continue;
        }
        into.remove(name);
        for value in from.get_all(name) {
            into.append(name.clone(), value.clone());
        }
    }
    prepend_cookies(from, into);
}

/// Builds aggregated responses for one request.
pub struct Aggregator<'a> {
    args: &'a ArgumentBuilder,
    scope: &'a RequestScope,
    mode: ServerMode,
}

impl<'a> Aggregator<'a> {
    pub fn new(args: &'a ArgumentBuilder, scope: &'a RequestScope, mode: ServerMode) -> Self {
        Self { args, scope, mode }
    }

    /// Error value a thrown outcome reports; `None` for data.
    pub fn error_value(&self, outcome: &Outcome) -> Option<Value> {
        match outcome {
            Outcome::Data { .. } => None,
            Outcome::ThrownResponse(response) => Some(response.to_error_value()),
            Outcome::ThrownError(error) => Some(Value::Error(sanitize_error(error, self.mode))),
        }
    }

    /// Aggregate a loader pass, optionally preceded by an action.
    pub fn loaders(
        &self,
        run: &LoaderRun,
        action: Option<&RouteOutcome>,
        placement: ErrorPlacement,
    ) -> AggregatedResponse {
        let redirecting = action
            .into_iter()
            .chain(run.redirect.iter())
            .find_map(|o| o.outcome.redirect().map(|r| (o, r)));
        if let Some((source, redirect)) = redirecting {
            return AggregatedResponse::redirecting(
                PayloadKind::Loaders,
                &source.route_id,
                &source.outcome,
                redirect,
            );
        }

        let thrown = self.thrown(run, action);
        let mut errors: Vec<(usize, Value)> = Vec::new();
        for (index, outcome) in &thrown {
            let at = self.placed_at(*index, placement);
            if errors.iter().all(|(i, _)| *i != at) {
                if let Some(value) = self.error_value(&outcome.outcome) {
                    errors.push((at, value));
                }
            }
        }

        let mut results = Vec::with_capacity(run.outcomes.len() + errors.len());
        for (i, m) in self.scope.matches.iter().enumerate() {
            if let Some((_, value)) = errors.iter().find(|(at, _)| *at == i) {
                results.push((m.id().to_string(), RouteResult::Error(value.clone())));
                continue;
            }
            match run.get(m.id()) {
                Some(Outcome::Data { value, .. }) => {
                    results.push((m.id().to_string(), RouteResult::Data(value.clone())))
                }
                Some(_) | None => {}
            }
        }

        let status = match thrown.first() {
            Some((_, outcome)) => outcome.outcome.status(),
            None => action
                .map(|a| a.outcome.status())
                .filter(|s| *s != StatusCode::OK)
                .or_else(|| {
                    run.outcomes
                        .iter()
                        .map(|o| o.outcome.status())
                        .find(|s| *s != StatusCode::OK)
                })
                .unwrap_or(StatusCode::OK),
        };

        AggregatedResponse {
            kind: PayloadKind::Loaders,
            results,
            headers: self.merge_headers(run, action, placement),
            status,
            redirect: None,
        }
    }

    /// Aggregate a single-fetch action. Headers functions do not run; the
    /// action's own Response headers and status are returned as they are.
    pub fn action(&self, outcome: &RouteOutcome) -> AggregatedResponse {
        if let Some(redirect) = outcome.outcome.redirect() {
            return AggregatedResponse::redirecting(
                PayloadKind::Action,
                &outcome.route_id,
                &outcome.outcome,
                redirect,
            );
        }
        let result = match &outcome.outcome {
            Outcome::Data { value, .. } => RouteResult::Data(value.clone()),
            thrown => RouteResult::Error(self.error_value(thrown).unwrap_or(Value::Null)),
        };
        AggregatedResponse {
            kind: PayloadKind::Action,
            results: vec![(outcome.route_id.clone(), result)],
            headers: outcome.outcome.headers().cloned().unwrap_or_default(),
            status: outcome.outcome.status(),
            redirect: None,
        }
    }

    /// Thrown outcomes with their match index, in match order.
    fn thrown<'r>(
        &self,
        run: &'r LoaderRun,
        action: Option<&'r RouteOutcome>,
    ) -> Vec<(usize, &'r RouteOutcome)> {
        let mut thrown: Vec<(usize, &RouteOutcome)> = action
            .into_iter()
            .chain(run.outcomes.iter())
            .filter(|o| o.outcome.is_thrown())
            .filter_map(|o| self.index_of(&o.route_id).map(|i| (i, o)))
            .collect();
        thrown.sort_by_key(|(i, _)| *i);
        thrown
    }

    fn index_of(&self, route_id: &str) -> Option<usize> {
        self.scope.matches.iter().position(|m| m.id() == route_id)
    }

    fn placed_at(&self, index: usize, placement: ErrorPlacement) -> usize {
        match placement {
            ErrorPlacement::Thrower => index,
            ErrorPlacement::Boundary => RouteTree::nearest_boundary(&self.scope.matches, index),
        }
    }

    /// Merge headers root to leaf; see the module docs.
    pub fn merge_headers(
        &self,
        run: &LoaderRun,
        action: Option<&RouteOutcome>,
        placement: ErrorPlacement,
    ) -> HeaderMap {
        let matches = &self.scope.matches;
        if matches.is_empty() {
            return HeaderMap::new();
        }
        let thrown = self.thrown(run, action);
        let boundary = thrown
            .first()
            .map(|(i, _)| self.placed_at(*i, placement));
        let last = boundary.unwrap_or(matches.len() - 1);
        let error_headers = boundary.and_then(|b| {
            thrown
                .iter()
                .filter(|(i, _)| *i >= b)
                .find_map(|(_, o)| match &o.outcome {
                    Outcome::ThrownResponse(response) => Some(response.headers().clone()),
                    _ => None,
                })
        });

        let boundary_error = thrown.first().and_then(|(_, o)| self.error_value(&o.outcome));

        let mut parent = HeaderMap::new();
        for (i, m) in matches[..=last].iter().enumerate() {
            let threw = thrown.iter().any(|(t, _)| *t == i);
            let loader = data_headers(run.get(m.id()));
            let action_headers = data_headers(
                action
                    .filter(|a| a.route_id == m.id())
                    .map(|a| &a.outcome),
            );
            let error = error_headers.as_ref().filter(|_| i == last);

            let headers = match &m.route.module.headers {
                Some(headers_fn) if !threw => {
                    let inputs = HeaderInputs {
                        loader: loader.clone(),
                        parent: parent.clone(),
                        action: action_headers.clone(),
                        error: error.cloned(),
                        data: match run.get(m.id()) {
                            Some(Outcome::Data { value, .. }) => Some(value.clone()),
                            _ => None,
                        },
                        error_value: boundary_error.clone().filter(|_| i == last && boundary.is_some()),
                    };
                    let mut headers = headers_fn(self.args.headers(&self.scope.server, &m.params, inputs));
                    if let Some(error) = error {
                        prepend_cookies(error, &mut headers);
                    }
                    prepend_cookies(&action_headers, &mut headers);
                    prepend_cookies(&loader, &mut headers);
                    prepend_cookies(&parent, &mut headers);
                    headers
                }
                _ => {
                    let mut headers = parent.clone();
                    overlay(&action_headers, &mut headers);
                    overlay(&loader, &mut headers);
                    match error {
                        // A thrown Response keeps its own headers at the route that threw it.
                        Some(error) if threw => overlay(error, &mut headers),
                        Some(error) => prepend_cookies(error, &mut headers),
                        None => {}
                    }
                    headers
                }
            };
            parent = headers;
        }
        parent
    }
}

fn data_headers(outcome: Option<&Outcome>) -> HeaderMap {
    match outcome {
        Some(Outcome::Data { headers, .. }) => headers.clone(),
        _ => HeaderMap::new(),
    }
}
