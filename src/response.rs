//! Responses returned or thrown by route functions.
//!
//! A route function may hand back plain data or a [`DataResponse`] carrying
//! a status, headers and a body. Throwing a `DataResponse` is the intentional
//! HTTP-level signal (redirects, 404s); throwing an [`ErrorValue`] is an
//! unexpected failure.

use axum::http::{header, HeaderMap, HeaderName, HeaderValue, StatusCode};

use crate::codec::{ErrorValue, Value};

const REDIRECT_STATUSES: [u16; 5] = [301, 302, 303, 307, 308];

/// An HTTP response produced by a loader or action.
#[derive(Debug, Clone)]
pub struct DataResponse {
    status: StatusCode,
    headers: HeaderMap,
    body: Value,
}

impl DataResponse {
    pub fn new(status: StatusCode) -> Self {
        Self {
            status,
            headers: HeaderMap::new(),
            body: Value::Null,
        }
    }

    /// A 200 response carrying `body`.
    pub fn json(body: impl Into<Value>) -> Self {
        Self::new(StatusCode::OK).with_body(body)
    }

    pub fn with_status(mut self, status: StatusCode) -> Self {
        self.status = status;
        self
    }

    pub fn with_body(mut self, body: impl Into<Value>) -> Self {
        self.body = body.into();
        self
    }

    /// Append a header. Values that are not valid header text are dropped.
    pub fn header(mut self, name: HeaderName, value: &str) -> Self {
        match HeaderValue::from_str(value) {
            Ok(v) => {
                self.headers.append(name, v);
            }
            Err(_) => tracing::warn!(header = %name, "Dropping invalid header value"),
        }
        self
    }

    pub fn status(&self) -> StatusCode {
        self.status
    }

    pub fn headers(&self) -> &HeaderMap {
        &self.headers
    }

    pub fn headers_mut(&mut self) -> &mut HeaderMap {
        &mut self.headers
    }

    pub fn body(&self) -> &Value {
        &self.body
    }

    pub fn into_parts(self) -> (StatusCode, HeaderMap, Value) {
        (self.status, self.headers, self.body)
    }

    pub fn location(&self) -> Option<&str> {
        self.headers
            .get(header::LOCATION)
            .and_then(|v| v.to_str().ok())
    }

    pub fn is_redirect(&self) -> bool {
        self.to_redirect().is_some()
    }

    /// The redirect this response signals, if any.
    pub fn to_redirect(&self) -> Option<Redirect> {
        redirect_from(self.status, &self.headers)
    }

    /// Shape of a caught response as seen by error boundaries.
    pub fn to_error_value(&self) -> Value {
        Value::object([
            ("status", Value::Number(self.status.as_u16() as f64)),
            (
                "statusText",
                Value::from(self.status.canonical_reason().unwrap_or("")),
            ),
            ("data", self.body.clone()),
            ("internal", Value::Bool(false)),
        ])
    }
}

/// Read a redirect off a status and header set. A `Set-Cookie` on the
/// redirect asks the client to revalidate everything after following it.
pub(crate) fn redirect_from(status: StatusCode, headers: &HeaderMap) -> Option<Redirect> {
    if !REDIRECT_STATUSES.contains(&status.as_u16()) {
        return None;
    }
    let location = headers.get(header::LOCATION)?.to_str().ok()?;
    Some(Redirect {
        location: location.to_string(),
        status,
        revalidate: headers.contains_key(header::SET_COOKIE),
    })
}

/// A 302 redirect to `location`.
pub fn redirect(location: &str) -> DataResponse {
    redirect_with_status(location, StatusCode::FOUND)
}

pub fn redirect_with_status(location: &str, status: StatusCode) -> DataResponse {
    DataResponse::new(status).header(header::LOCATION, location)
}

/// A 404 raised by the runtime itself when nothing matches.
pub(crate) fn not_found(pathname: &str) -> DataResponse {
    DataResponse::new(StatusCode::NOT_FOUND)
        .with_body(format!("No route matches URL \"{}\"", pathname))
}

/// A 405 raised when a mutation targets a route without an action.
pub(crate) fn method_not_allowed(method: &str, pathname: &str, route_id: &str) -> DataResponse {
    DataResponse::new(StatusCode::METHOD_NOT_ALLOWED).with_body(format!(
        "You made a {} request to \"{}\" but did not provide an `action` for route \"{}\", so there is no way to handle the request.",
        method, pathname, route_id
    ))
}

/// A 400 raised when a route's data is requested but it has no loader.
pub(crate) fn no_loader(pathname: &str, route_id: &str) -> DataResponse {
    DataResponse::new(StatusCode::BAD_REQUEST).with_body(format!(
        "You made a GET request to \"{}\" but did not provide a `loader` for route \"{}\", so there is no way to handle the request.",
        pathname, route_id
    ))
}

/// Redirect signal extracted from a route result.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Redirect {
    pub location: String,
    pub status: StatusCode,
    pub revalidate: bool,
}

/// Value a route function resolves with.
#[derive(Debug, Clone)]
pub enum Returned {
    Data(Value),
    Response(DataResponse),
}

/// Value a route function throws.
#[derive(Debug, Clone)]
pub enum Thrown {
    Response(DataResponse),
    Error(ErrorValue),
}

/// Result type of every loader and action.
pub type HandlerResult = Result<Returned, Thrown>;

impl From<Value> for Returned {
    fn from(value: Value) -> Self {
        Returned::Data(value)
    }
}

impl From<serde_json::Value> for Returned {
    fn from(value: serde_json::Value) -> Self {
        Returned::Data(value.into())
    }
}

impl From<DataResponse> for Returned {
    fn from(response: DataResponse) -> Self {
        Returned::Response(response)
    }
}

impl From<DataResponse> for Thrown {
    fn from(response: DataResponse) -> Self {
        Thrown::Response(response)
    }
}

impl From<ErrorValue> for Thrown {
    fn from(error: ErrorValue) -> Self {
        Thrown::Error(error)
    }
}
