//! Conversion of handler output into HTTP responses.

use axum::body::Body;
use axum::http::{header, HeaderValue};
use axum::response::{IntoResponse, Response};

use crate::aggregate::SANITIZED_MESSAGE;
use crate::handler::{HandlerError, HandlerResponse, ResponseBody};

impl IntoResponse for HandlerResponse {
    fn into_response(self) -> Response {
        let body = match self.body {
            ResponseBody::Full(bytes) => Body::from(bytes),
            ResponseBody::Stream(stream) => Body::from_stream(stream),
        };
        let mut response = Response::new(body);
        *response.status_mut() = self.status;
        *response.headers_mut() = self.headers;
        response
    }
}

/// Handler failures go out as plain text. Server-side failures never leak
/// their message.
impl IntoResponse for HandlerError {
    fn into_response(self) -> Response {
        let status = self.status();
        let message = if status.is_server_error() {
            SANITIZED_MESSAGE.to_string()
        } else {
            self.to_string()
        };
        let mut response = (status, message).into_response();
        response.headers_mut().insert(
            header::CONTENT_TYPE,
            HeaderValue::from_static("text/plain; charset=utf-8"),
        );
        response
    }
}

#[cfg(test)]
mod tests {
    use axum::body::Bytes;
    use axum::http::{HeaderMap, StatusCode};

    use super::*;
    use crate::codec::ErrorValue;

    #[tokio::test]
    async fn test_handler_response_keeps_status_and_headers() {
        let mut headers = HeaderMap::new();
        headers.insert("x-test", HeaderValue::from_static("yes"));
        let response = HandlerResponse {
            status: StatusCode::CREATED,
            headers,
            body: ResponseBody::Full(Bytes::from("ok")),
        }
        .into_response();
        assert_eq!(response.status(), StatusCode::CREATED);
        assert_eq!(response.headers()["x-test"], "yes");
        let body = axum::body::to_bytes(response.into_body(), 1024).await.unwrap();
        assert_eq!(body, "ok");
    }

    #[tokio::test]
    async fn test_server_errors_are_sanitized() {
        let response = HandlerError::Render(ErrorValue::new("secret")).into_response();
        assert_eq!(response.status(), StatusCode::INTERNAL_SERVER_ERROR);
        let body = axum::body::to_bytes(response.into_body(), 1024).await.unwrap();
        assert_eq!(body, SANITIZED_MESSAGE);

        let response = HandlerError::MissingRouteHeader.into_response();
        let body = axum::body::to_bytes(response.into_body(), 1024).await.unwrap();
        assert_eq!(body, "A 'Route' header is required");
    }
}
