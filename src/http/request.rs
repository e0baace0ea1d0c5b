//! Request identification and conversion.
//!
//! # Responsibilities
//! - Stamp every request with a UUID v4 `x-request-id` (unless the client
//!   sent one) and echo it on the response
//! - Convert an HTTP request into the [`RouteRequest`] route functions see
//!
//! # Design Decisions
//! - The id is assigned by the outermost layer so every log line of the
//!   request, including the trace layer's, can carry it

use axum::body::Bytes;
use axum::http::request::Parts;
use axum::http::{header, HeaderMap, HeaderValue, Request};
use tower_http::request_id::{
    MakeRequestId, PropagateRequestIdLayer, RequestId, SetRequestIdLayer,
};
use url::Url;
use uuid::Uuid;

use crate::args::RouteRequest;

pub const X_REQUEST_ID: &str = "x-request-id";

/// Generates UUID v4 request ids.
#[derive(Debug, Clone, Copy, Default)]
pub struct MakeRequestUuid;

impl MakeRequestId for MakeRequestUuid {
    fn make_request_id<B>(&mut self, _request: &Request<B>) -> Option<RequestId> {
        HeaderValue::from_str(&Uuid::new_v4().to_string())
            .ok()
            .map(RequestId::new)
    }
}

pub fn set_request_id_layer() -> SetRequestIdLayer<MakeRequestUuid> {
    SetRequestIdLayer::x_request_id(MakeRequestUuid)
}

pub fn propagate_request_id_layer() -> PropagateRequestIdLayer {
    PropagateRequestIdLayer::x_request_id()
}

/// Read access to the request id.
pub trait RequestIdExt {
    fn request_id(&self) -> &str;
}

impl RequestIdExt for HeaderMap {
    fn request_id(&self) -> &str {
        self.get(X_REQUEST_ID)
            .and_then(|v| v.to_str().ok())
            .unwrap_or("unknown")
    }
}

/// Build the route-facing request. The URL is made absolute from the
/// `Host` header, falling back to `localhost`.
pub fn to_route_request(parts: &Parts, body: Bytes) -> Result<RouteRequest, url::ParseError> {
    let host = parts
        .headers
        .get(header::HOST)
        .and_then(|v| v.to_str().ok())
        .unwrap_or("localhost");
    let path_and_query = parts
        .uri
        .path_and_query()
        .map(|pq| pq.as_str())
        .unwrap_or("/");
    let url = Url::parse(&format!("http://{}{}", host, path_and_query))?;
    Ok(RouteRequest::new(parts.method.clone(), url)
        .with_headers(parts.headers.clone())
        .with_body(body))
}
