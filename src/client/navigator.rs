//! Client-side navigation over single fetch.
//!
//! # Data Flow
//! ```text
//! navigate(path)                      submit(path, form)
//!     │                                   │
//!     │                                   ▼
//!     │                          client action? ── yes ─▶ clientAction(serverAction)
//!     │                                   │ no
//!     │                                   ▼
//!     │                          POST <path>.data ──▶ action entry / redirect
//!     ▼                                   ▼
//! revalidation::plan(snapshot) ◀──────────┘ (submission: status + result)
//!     │
//!     ├─ routes with a clientLoader  → clientLoader(serverLoader)
//!     └─ the rest                    → GET <path>.data[?_routes=..]
//!     ▼
//! merge into state; errors bubble to the nearest boundary
//! ```
//!
//! Redirects, whether out of band or thrown by client functions, are
//! followed up to [`MAX_REDIRECTS`] times.

use std::collections::BTreeMap;
use std::sync::Arc;

use axum::http::{HeaderMap, Method, StatusCode};
use url::Url;

use super::{ClientError, FetchResult, SingleFetchClient};
use crate::args::{ArgumentBuilder, ClientScope, Location, RouteRequest, ServerCall};
use crate::codec::{Decoded, Entry, ErrorValue, Value};
use crate::config::FutureConfig;
use crate::executor::{Executor, Outcome};
use crate::response::{redirect_with_status, DataResponse, HandlerResult, Redirect, Returned, Thrown};
use crate::revalidation::{self, Snapshot, Submission};
use crate::routing::{MatchedRoute, RouteTree};

pub const MAX_REDIRECTS: usize = 10;

/// What the UI would render right now.
#[derive(Debug, Clone, Default)]
pub struct NavigationState {
    pub location: Option<Url>,
    pub matches: Vec<MatchedRoute>,
    pub loader_data: BTreeMap<String, Value>,
    pub action_data: Option<Value>,
    pub errors: BTreeMap<String, Value>,
}

pub struct Navigator {
    client: SingleFetchClient,
    routes: Arc<RouteTree>,
    args: ArgumentBuilder,
    state: NavigationState,
    data_requests: Vec<Url>,
}

impl Navigator {
    pub fn new(client: SingleFetchClient, routes: Arc<RouteTree>, future: &FutureConfig) -> Self {
        Self {
            client,
            routes,
            args: ArgumentBuilder::for_future(future),
            state: NavigationState::default(),
            data_requests: Vec::new(),
        }
    }

    pub fn state(&self) -> &NavigationState {
        &self.state
    }

    pub fn loader_data(&self, route_id: &str) -> Option<&Value> {
        self.state.loader_data.get(route_id)
    }

    pub fn error(&self, route_id: &str) -> Option<&Value> {
        self.state.errors.get(route_id)
    }

    /// Every loader URL fetched so far, in order.
    pub fn data_requests(&self) -> &[Url] {
        &self.data_requests
    }

    pub async fn navigate(&mut self, path: &str) -> Result<(), ClientError> {
        let url = self.client.resolve(path)?;
        self.state.action_data = None;
        self.state.errors.clear();
        self.load(url, None, false).await
    }

    /// Submit `form` to the action for `path`, then revalidate.
    pub async fn submit(&mut self, path: &str, form: &[(&str, &str)]) -> Result<(), ClientError> {
        let url = self.client.resolve(path)?;
        let matches = self.match_url(&url)?;
        let body = url::form_urlencoded::Serializer::new(String::new())
            .extend_pairs(form)
            .finish();
        let request = RouteRequest::new(Method::POST, url.clone()).with_body(body);
        let target = Executor::action_target(&matches, &request)
            .ok_or_else(|| ClientError::NoMatch(url.path().to_string()))?;
        let action_route = matches[target].id().to_string();

        let outcome = match matches[target].route.module.client_action.clone() {
            Some(client_action) => {
                let server_action = self.server_action(url.clone(), form);
                let scope = self.client_scope(&request, &url, &matches);
                let args = self.args.client_action(&scope, &matches[target].params, server_action);
                Outcome::from_result(client_action(args).await)
            }
            None => {
                let fetched = self.client.submit(&url, form).await?;
                action_outcome(fetched)?
            }
        };

        self.state.errors.clear();
        let mut submission = Submission {
            method: Method::POST,
            action_route: action_route.clone(),
            action_status: Some(outcome.status().as_u16()),
            action_result: None,
        };
        if let Some(redirect) = outcome.redirect() {
            tracing::debug!(location = %redirect.location, "Action redirected");
            let next = self.client.resolve(&redirect.location)?;
            self.state.action_data = None;
            return self.load(next, Some(&submission), redirect.revalidate).await;
        }

        match outcome {
            Outcome::Data { value, .. } => {
                submission.action_result = Some(value.clone());
                self.state.action_data = Some(value);
            }
            Outcome::ThrownResponse(response) => {
                self.state.action_data = None;
                let boundary = RouteTree::nearest_boundary(&matches, target);
                self.state
                    .errors
                    .insert(matches[boundary].id().to_string(), response.to_error_value());
            }
            Outcome::ThrownError(error) => {
                self.state.action_data = None;
                let boundary = RouteTree::nearest_boundary(&matches, target);
                self.state
                    .errors
                    .insert(matches[boundary].id().to_string(), Value::Error(error));
            }
        }
        self.load(url, Some(&submission), false).await
    }

    fn match_url(&self, url: &Url) -> Result<Vec<MatchedRoute>, ClientError> {
        self.routes
            .matches(url.path())
            .ok_or_else(|| ClientError::NoMatch(url.path().to_string()))
    }

    fn client_scope(&self, request: &RouteRequest, url: &Url, matches: &[MatchedRoute]) -> ClientScope {
        ClientScope {
            request: Arc::new(request.clone()),
            location: Location::from_url(url),
            matches: matches.iter().map(MatchedRoute::info).collect::<Vec<_>>().into(),
        }
    }

    /// Run the loaders the revalidation plan selects, following redirects.
    async fn load(
        &mut self,
        mut url: Url,
        submission: Option<&Submission>,
        mut force: bool,
    ) -> Result<(), ClientError> {
        for _ in 0..MAX_REDIRECTS {
            match self.load_once(&url, submission, force).await? {
                Some(redirect) => {
                    url = self.client.resolve(&redirect.location)?;
                    force = force || redirect.revalidate;
                }
                None => return Ok(()),
            }
        }
        Err(ClientError::TooManyRedirects(MAX_REDIRECTS))
    }

    async fn load_once(
        &mut self,
        url: &Url,
        submission: Option<&Submission>,
        force: bool,
    ) -> Result<Option<Redirect>, ClientError> {
        let next_matches = self.match_url(url)?;
        let current_url = self.state.location.clone().unwrap_or_else(|| url.clone());
        let first_load = self.state.location.is_none();
        let current_matches = if first_load {
            Vec::new()
        } else {
            self.state.matches.clone()
        };
        let plan = revalidation::plan(&Snapshot {
            current_matches: &current_matches,
            next_matches: &next_matches,
            current_url: &current_url,
            next_url: url,
            submission,
            force,
        });

        // Client-only loaders have no server half to plan for and run on
        // every navigation.
        let (client_routes, server_routes): (Vec<&MatchedRoute>, Vec<&MatchedRoute>) = next_matches
            .iter()
            .filter(|m| {
                plan.should_load(m.id())
                    || (m.route.module.client_loader.is_some() && !m.route.has_loader())
            })
            .partition(|m| m.route.module.client_loader.is_some());

        let mut results: Vec<(String, Outcome)> = Vec::new();

        if !server_routes.is_empty() {
            let routes_param = if client_routes.is_empty() {
                plan.routes_param.clone()
            } else {
                Some(
                    server_routes
                        .iter()
                        .map(|m| m.id())
                        .collect::<Vec<_>>()
                        .join(","),
                )
            };
            let fetched = self.fetch_loaders(url, routes_param.as_deref()).await?;
            match fetched.decoded {
                Decoded::Redirect(redirect) => return Ok(Some(redirect)),
                Decoded::Routes(entries) => {
                    for (id, entry) in entries {
                        results.push((id, entry_outcome(entry)));
                    }
                }
                Decoded::Action(_) => {
                    return Err(ClientError::UnexpectedPayload { expected: "loader" })
                }
            }
        }

        let request = RouteRequest::new(Method::GET, url.clone());
        let scope = self.client_scope(&request, url, &next_matches);
        for m in &client_routes {
            let Some(client_loader) = m.route.module.client_loader.clone() else {
                continue;
            };
            let server_loader = self.server_loader(url.clone(), m.id().to_string());
            let args = self.args.client_loader(&scope, &m.params, server_loader);
            let outcome = Outcome::from_result(client_loader(args).await);
            if let Some(redirect) = outcome.redirect() {
                return Ok(Some(redirect));
            }
            results.push((m.id().to_string(), outcome));
        }

        self.apply(url, next_matches, results);
        Ok(None)
    }

    async fn fetch_loaders(&mut self, url: &Url, routes: Option<&str>) -> Result<FetchResult, ClientError> {
        self.data_requests.push(super::data_url(url, routes));
        self.client.load(url, routes).await
    }

    /// Fold loader results into the state. Routes no longer matched are
    /// dropped; routes that did not reload keep their data.
    fn apply(&mut self, url: &Url, matches: Vec<MatchedRoute>, results: Vec<(String, Outcome)>) {
        self.state
            .loader_data
            .retain(|id, _| matches.iter().any(|m| m.id() == id));
        self.state
            .errors
            .retain(|id, _| matches.iter().any(|m| m.id() == id));

        for (id, outcome) in results {
            let Some(index) = matches.iter().position(|m| m.id() == id) else {
                continue;
            };
            let error = match outcome {
                Outcome::Data { value, .. } => {
                    self.state.loader_data.insert(id, value);
                    continue;
                }
                Outcome::ThrownResponse(response) => response.to_error_value(),
                Outcome::ThrownError(error) => Value::Error(error),
            };
            self.state.loader_data.remove(&id);
            let boundary = matches[RouteTree::nearest_boundary(&matches, index)].id().to_string();
            self.state.errors.entry(boundary).or_insert(error);
        }

        tracing::debug!(
            url = %url,
            loaded = self.state.loader_data.len(),
            errors = self.state.errors.len(),
            "Navigation settled"
        );
        self.state.location = Some(url.clone());
        self.state.matches = matches;
    }

    /// `serverLoader` for a client loader: fetch just that route.
    fn server_loader(&self, url: Url, route_id: String) -> ServerCall {
        let client = self.client.clone();
        ServerCall::new(move || {
            let client = client.clone();
            let url = url.clone();
            let route_id = route_id.clone();
            async move {
                let fetched = client.load(&url, Some(&route_id)).await.map_err(server_call_error)?;
                match fetched.decoded {
                    Decoded::Redirect(redirect) => Err(Thrown::Response(redirect_response(&redirect))),
                    Decoded::Routes(mut entries) => match entries.remove(&route_id) {
                        Some(entry) => outcome_to_result(entry_outcome(entry)),
                        None => Ok(Returned::Data(Value::Undefined)),
                    },
                    Decoded::Action(_) => Err(Thrown::Error(ErrorValue::new("expected a loader payload"))),
                }
            }
        })
    }

    /// `serverAction` for a client action: the regular action request.
    fn server_action(&self, url: Url, form: &[(&str, &str)]) -> ServerCall {
        let client = self.client.clone();
        let form: Vec<(String, String)> = form
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        ServerCall::new(move || {
            let client = client.clone();
            let url = url.clone();
            let form = form.clone();
            async move {
                let pairs: Vec<(&str, &str)> = form.iter().map(|(k, v)| (k.as_str(), v.as_str())).collect();
                let fetched = client.submit(&url, &pairs).await.map_err(server_call_error)?;
                outcome_to_result(action_outcome(fetched).map_err(server_call_error)?)
            }
        })
    }
}

fn server_call_error(err: ClientError) -> Thrown {
    Thrown::Error(ErrorValue::new(err.to_string()))
}

/// A redirect as a thrown response. Revalidation rides on `Set-Cookie`,
/// the same signal a server route would send.
fn redirect_response(redirect: &Redirect) -> DataResponse {
    let response = redirect_with_status(&redirect.location, redirect.status);
    if redirect.revalidate {
        response.header(axum::http::header::SET_COOKIE, "")
    } else {
        response
    }
}

/// Outcome of a decoded action response.
fn action_outcome(fetched: FetchResult) -> Result<Outcome, ClientError> {
    match fetched.decoded {
        Decoded::Redirect(redirect) => Ok(Outcome::ThrownResponse(redirect_response(&redirect))),
        Decoded::Action(Entry::Data(value)) => Ok(Outcome::Data {
            value,
            headers: HeaderMap::new(),
            status: fetched.status,
        }),
        Decoded::Action(Entry::Error(value)) => Ok(error_outcome(value, fetched.status)),
        Decoded::Routes(_) => Err(ClientError::UnexpectedPayload { expected: "action" }),
    }
}

fn entry_outcome(entry: Entry) -> Outcome {
    match entry {
        Entry::Data(value) => Outcome::Data {
            value,
            headers: HeaderMap::new(),
            status: StatusCode::OK,
        },
        Entry::Error(value) => error_outcome(value, StatusCode::INTERNAL_SERVER_ERROR),
    }
}

/// Rebuild a thrown value from its wire form. Caught responses travel as
/// `{status, statusText, data, internal}` objects.
fn error_outcome(value: Value, status: StatusCode) -> Outcome {
    match value {
        Value::Error(error) => Outcome::ThrownError(error),
        other => {
            let status = other
                .get("status")
                .and_then(Value::as_f64)
                .and_then(|s| StatusCode::from_u16(s as u16).ok())
                .unwrap_or(status);
            let data = other.get("data").cloned().unwrap_or(other);
            Outcome::ThrownResponse(DataResponse::new(status).with_body(data))
        }
    }
}

fn outcome_to_result(outcome: Outcome) -> HandlerResult {
    match outcome {
        Outcome::Data {
            value,
            headers,
            status,
        } => {
            if status == StatusCode::OK && headers.is_empty() {
                Ok(Returned::Data(value))
            } else {
                let mut response = DataResponse::new(status).with_body(value);
                *response.headers_mut() = headers;
                Ok(Returned::Response(response))
            }
        }
        Outcome::ThrownResponse(response) => Err(Thrown::Response(response)),
        Outcome::ThrownError(error) => Err(Thrown::Error(error)),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_caught_response_round_trips_status() {
        let caught = DataResponse::new(StatusCode::NOT_FOUND)
            .with_body("missing")
            .to_error_value();
        match error_outcome(caught, StatusCode::INTERNAL_SERVER_ERROR) {
            Outcome::ThrownResponse(response) => {
                assert_eq!(response.status(), StatusCode::NOT_FOUND);
                assert_eq!(response.body(), &Value::from("missing"));
            }
            other => panic!("expected a thrown response, got {:?}", other),
        }
    }

    #[test]
    fn test_error_value_becomes_thrown_error() {
        let outcome = entry_outcome(Entry::Error(Value::Error(ErrorValue::new("boom"))));
        assert!(matches!(outcome, Outcome::ThrownError(e) if e.message() == "boom"));
    }

    #[test]
    fn test_redirect_response_keeps_revalidate() {
        let redirect = Redirect {
            location: "/login".into(),
            status: StatusCode::SEE_OTHER,
            revalidate: true,
        };
        let response = redirect_response(&redirect);
        assert_eq!(response.to_redirect(), Some(redirect));
        assert!(response.is_redirect());
    }
}
