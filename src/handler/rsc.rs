//! Server-component route handler.
//!
//! # Data Flow
//! ```text
//! request + `Route: <id>` header
//!     → match URL, find <id> among the matches
//!     → loader (GET) or action (mutation) of that one route
//!     → redirect          : 204 + X-Remix-Redirect / X-Remix-Status
//!       data              : 200 text/x-component, render_to_stream(data)
//!       returned Response : passed through as-is
//!       thrown Response   : as-is + X-Remix-Catch
//!       thrown error      : handle_error, request fails
//! ```
//! Data and returned Responses carry `X-Remix-Response: yes`.

use std::fmt;
use std::sync::Arc;
use std::time::Instant;

use axum::http::{header, HeaderMap, HeaderValue, StatusCode};

use super::legacy::json_response;
use super::{Dispatch, DevServerHooks, HandlerError, HandlerResponse, ResponseBody};
use crate::args::{LoadContext, RouteRequest};
use crate::build::{BuildSource, DerivedCache};
use crate::codec::{self, X_REMIX_CATCH, X_REMIX_RESPONSE};
use crate::config::ServerMode;
use crate::observability::metrics;
use crate::response::{not_found, Redirect, Returned, Thrown};

/// Header naming the route a server-component request targets.
pub const ROUTE_HEADER: &str = "route";

pub struct RscRequestHandler {
    builds: DerivedCache,
    hooks: Option<Arc<dyn DevServerHooks>>,
}

impl RscRequestHandler {
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
        let result = self.respond(request, context).await;
        let status = match &result {
            Ok(response) => response.status,
            Err(err) => err.status(),
        };
        metrics::record_request("rsc", status.as_u16(), start);
        result
    }

    async fn respond(
        &self,
        request: RouteRequest,
        context: LoadContext,
    ) -> Result<HandlerResponse, HandlerError> {
        let derived = self.builds.get().await?;
        let render_to_stream = derived
            .build
            .entry
            .render_to_stream
            .clone()
            .ok_or(HandlerError::MissingRenderToStream)?;
        let route_id = request
            .headers()
            .get(ROUTE_HEADER)
            .and_then(|v| v.to_str().ok())
            .ok_or(HandlerError::MissingRouteHeader)?
            .to_string();

        let dispatch = Dispatch {
            derived: &derived,
            hooks: self.hooks.as_deref(),
        };
        let mutation = request.is_mutation();
        let pathname = request.pathname().to_string();
        let (scope, unmatched) = dispatch.scope(request, context);

        let result = match unmatched {
            Some(_) => Err(Thrown::Response(not_found(&pathname))),
            None => {
                let index = scope
                    .matches
                    .iter()
                    .position(|m| m.id() == route_id)
                    .ok_or_else(|| HandlerError::UnknownRoute(route_id.clone()))?;
                let executor = &derived.executor;
                if mutation {
                    executor.call_action(&scope, index).await
                } else {
                    executor.call_loader(&scope, index).await
                }
            }
        };

        let mut response = match result {
            Ok(Returned::Data(value)) => {
                let mut headers = HeaderMap::new();
                headers.insert(header::CONTENT_TYPE, HeaderValue::from_static("text/x-component"));
                tracing::debug!(route_id = %route_id, "Streaming server component payload");
                HandlerResponse {
                    status: StatusCode::OK,
                    headers,
                    body: ResponseBody::Stream(render_to_stream(value)),
                }
            }
            Ok(Returned::Response(response)) => match response.to_redirect() {
                Some(redirect) => return Ok(redirect_response(response.headers(), &redirect)),
                None => {
                    let (status, headers, value) = response.into_parts();
                    json_response(status, headers, &value)?
                }
            },
            Err(Thrown::Response(response)) => match response.to_redirect() {
                Some(redirect) => return Ok(redirect_response(response.headers(), &redirect)),
                None => {
                    let (status, mut headers, value) = response.into_parts();
                    headers.insert(X_REMIX_CATCH, HeaderValue::from_static("yes"));
                    return json_response(status, headers, &value);
                }
            },
            Err(Thrown::Error(error)) => {
                dispatch.report_error(&scope, &error);
                return Err(HandlerError::Route { route_id, error });
            }
        };

        response.headers.insert(X_REMIX_RESPONSE, HeaderValue::from_static("yes"));
        Ok(response)
    }
}

fn redirect_response(original: &HeaderMap, redirect: &Redirect) -> HandlerResponse {
    HandlerResponse {
        status: StatusCode::NO_CONTENT,
        headers: codec::redirect_headers(original, redirect),
        body: ResponseBody::empty(),
    }
}

impl fmt::Debug for RscRequestHandler {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RscRequestHandler")
            .field("source", self.builds.source())
            .field("dev_hooks", &self.hooks.is_some())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::{AtomicUsize, Ordering};

    use axum::body::Bytes;
    use axum::http::{HeaderMap, Method};
    use futures_util::stream::{self, StreamExt};
    use url::Url;

    use super::*;
    use crate::build::{EntryModule, ServerBuild};
    use crate::codec::{ErrorValue, Value};
    use crate::response::{redirect, DataResponse};
    use crate::routing::{RouteModule, RouteRecord};

    fn handler(errors: Arc<AtomicUsize>) -> RscRequestHandler {
        let routes = vec![
            RouteRecord::new("root").path(""),
            RouteRecord::new("routes/tree").parent("root").path("tree").module(
                RouteModule::new().loader(|_| async { Ok(Returned::Data(Value::from("TREE"))) }),
            ),
            RouteRecord::new("routes/away").parent("root").path("away").module(
                RouteModule::new().loader(|_| async { Err(Thrown::Response(redirect("/tree"))) }),
            ),
            RouteRecord::new("routes/plain").parent("root").path("plain").module(
                RouteModule::new().loader(|_| async {
                    Ok(Returned::Response(
                        DataResponse::json("RAW")
                            .with_status(StatusCode::CREATED)
                            .header(header::HeaderName::from_static("x-raw"), "1"),
                    ))
                }),
            ),
            RouteRecord::new("routes/broken").parent("root").path("broken").module(
                RouteModule::new().loader(|_| async { Err(Thrown::Error(ErrorValue::new("boom"))) }),
            ),
        ];
        let entry = EntryModule::new()
            .render_to_stream(|value| {
                let text = value.as_str().unwrap_or_default().to_string();
                stream::iter(vec![Ok(Bytes::from(text))]).boxed()
            })
            .handle_error(move |_, _| {
                errors.fetch_add(1, Ordering::SeqCst);
            });
        RscRequestHandler::new(ServerBuild::new(routes, entry).into(), None)
    }

    fn request(path: &str, route: Option<&'static str>) -> RouteRequest {
        let mut headers = HeaderMap::new();
        if let Some(route) = route {
            headers.insert(ROUTE_HEADER, HeaderValue::from_static(route));
        }
        RouteRequest::new(Method::GET, Url::parse(&format!("http://x{}", path)).unwrap())
            .with_headers(headers)
    }

    #[tokio::test]
    async fn test_route_header_is_required() {
        let handler = handler(Arc::default());
        let result = handler.handle(request("/tree", None), LoadContext::default()).await;
        assert!(matches!(result, Err(HandlerError::MissingRouteHeader)));
    }

    #[tokio::test]
    async fn test_streams_component_payload() {
        let handler = handler(Arc::default());
        let response = handler
            .handle(request("/tree", Some("routes/tree")), LoadContext::default())
            .await
            .unwrap();
        assert_eq!(response.status, StatusCode::OK);
        assert_eq!(response.headers[header::CONTENT_TYPE], "text/x-component");
        assert_eq!(response.headers[X_REMIX_RESPONSE], "yes");
        let ResponseBody::Stream(body) = response.body else {
            panic!("expected a stream");
        };
        let chunks: Vec<_> = body.collect().await;
        assert_eq!(chunks[0].as_ref().unwrap(), &Bytes::from("TREE"));
    }

    #[tokio::test]
    async fn test_returned_response_passes_through() {
        let handler = handler(Arc::default());
        let response = handler
            .handle(request("/plain", Some("routes/plain")), LoadContext::default())
            .await
            .unwrap();
        assert_eq!(response.status, StatusCode::CREATED);
        assert_eq!(response.headers["x-raw"], "1");
        assert_eq!(response.headers[X_REMIX_RESPONSE], "yes");
        assert_ne!(response.headers[header::CONTENT_TYPE], "text/x-component");
        assert_eq!(response.body.as_bytes().unwrap(), &Bytes::from("\"RAW\""));
    }

    #[tokio::test]
    async fn test_redirect_goes_out_of_band() {
        let handler = handler(Arc::default());
        let response = handler
            .handle(request("/away", Some("routes/away")), LoadContext::default())
            .await
            .unwrap();
        assert_eq!(response.status, StatusCode::NO_CONTENT);
        assert_eq!(response.headers[codec::X_REMIX_REDIRECT], "/tree");
        assert!(response.headers.get(header::LOCATION).is_none());
    }

    #[tokio::test]
    async fn test_thrown_error_is_reported_and_fails() {
        let errors = Arc::new(AtomicUsize::new(0));
        let handler = handler(errors.clone());
        let result = handler
            .handle(request("/broken", Some("routes/broken")), LoadContext::default())
            .await;
        assert!(matches!(result, Err(HandlerError::Route { .. })));
        assert_eq!(errors.load(Ordering::SeqCst), 1);
    }
}
