//! Legacy per-route data requests: `?_data=<route id>`.
//!
//! ```text
//! redirect        → 204, X-Remix-Redirect / X-Remix-Status [/ X-Remix-Revalidate]
//! data            → route status + headers, JSON body
//! thrown Response → its status + headers, X-Remix-Catch: yes
//! thrown error    → 500, X-Remix-Error: yes, serialized error
//! ```
//! Headers functions do not run; the route's own headers go out as-is.

use axum::body::Bytes;
use axum::http::{header, HeaderMap, HeaderValue, StatusCode};
use serde_json::json;

use super::{without_search_param, Dispatch, HandlerError, HandlerResponse, ResponseBody};
use crate::aggregate::sanitize_error;
use crate::args::{LoadContext, RouteRequest};
use crate::codec::{redirect_headers, Value, X_REMIX_CATCH, X_REMIX_ERROR};
use crate::executor::Outcome;

pub(super) async fn handle(
    dispatch: &Dispatch<'_>,
    route_id: &str,
    request: RouteRequest,
    context: LoadContext,
) -> Result<HandlerResponse, HandlerError> {
    let request = request.with_url(without_search_param(request.url(), "_data"));
    let mutation = request.is_mutation();
    let (scope, unmatched) = dispatch.scope(request, context);

    let outcome = match unmatched {
        Some(mut run) => run.outcomes.remove(0).outcome,
        None => {
            let index = scope
                .matches
                .iter()
                .position(|m| m.id() == route_id)
                .ok_or_else(|| HandlerError::UnknownRoute(route_id.to_string()))?;
            let executor = &dispatch.derived.executor;
            let outcome = if mutation {
                executor.act_route(&scope, index).await
            } else {
                executor.load_route(&scope, index).await
            };
            dispatch.report(&scope, [&outcome]);
            outcome.outcome
        }
    };

    if let Some(redirect) = outcome.redirect() {
        let original = outcome.headers().cloned().unwrap_or_default();
        return Ok(HandlerResponse {
            status: StatusCode::NO_CONTENT,
            headers: redirect_headers(&original, &redirect),
            body: ResponseBody::empty(),
        });
    }

    Ok(match outcome {
        Outcome::Data {
            value,
            headers,
            status,
        } => json_response(status, headers, &value)?,
        Outcome::ThrownResponse(response) => {
            let (status, mut headers, value) = response.into_parts();
            headers.insert(X_REMIX_CATCH, HeaderValue::from_static("yes"));
            json_response(status, headers, &value)?
        }
        Outcome::ThrownError(error) => {
            let error = sanitize_error(&error, dispatch.derived.mode);
            let mut headers = HeaderMap::new();
            headers.insert(X_REMIX_ERROR, HeaderValue::from_static("yes"));
            headers.insert(header::CONTENT_TYPE, HeaderValue::from_static("application/json"));
            let body = json!({ "message": error.message(), "stack": error.stack() });
            HandlerResponse {
                status: StatusCode::INTERNAL_SERVER_ERROR,
                headers,
                body: ResponseBody::Full(Bytes::from(serde_json::to_vec(&body).map_err(
                    |e| HandlerError::Codec(e.into()),
                )?)),
            }
        }
    })
}

pub(super) fn json_response(
    status: StatusCode,
    mut headers: HeaderMap,
    value: &Value,
) -> Result<HandlerResponse, HandlerError> {
    let body = serde_json::to_vec(&value.to_plain_json()).map_err(|e| HandlerError::Codec(e.into()))?;
    if !headers.contains_key(header::CONTENT_TYPE) {
        headers.insert(
            header::CONTENT_TYPE,
            HeaderValue::from_static("application/json; charset=utf-8"),
        );
    }
    Ok(HandlerResponse {
        status,
        headers,
        body: ResponseBody::Full(Bytes::from(body)),
    })
}
