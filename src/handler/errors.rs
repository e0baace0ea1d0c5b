//! Failures of the request handler itself, as opposed to route failures
//! (which become [`crate::executor::Outcome`]s and are rendered).

use axum::http::StatusCode;
use thiserror::Error;

use crate::codec::{CodecError, ErrorValue};
use crate::routing::InvalidRouteTree;

#[derive(Debug, Error)]
pub enum HandlerError {
    #[error(transparent)]
    Build(#[from] InvalidRouteTree),

    #[error("failed to load server build: {0}")]
    BuildLoad(ErrorValue),

    #[error("A 'Route' header is required")]
    MissingRouteHeader,

    #[error("server build has no `render_to_stream` entry")]
    MissingRenderToStream,

    #[error("server build has no `render` entry")]
    MissingRender,

    #[error("no route with id `{0}`")]
    UnknownRoute(String),

    #[error(transparent)]
    Codec(#[from] CodecError),

    /// A route function threw where the handler cannot render it.
    #[error("route `{route_id}` failed: {error}")]
    Route { route_id: String, error: ErrorValue },

    #[error("document render failed: {0}")]
    Render(ErrorValue),
}

impl HandlerError {
    pub fn status(&self) -> StatusCode {
        match self {
            HandlerError::MissingRouteHeader | HandlerError::UnknownRoute(_) => {
                StatusCode::BAD_REQUEST
            }
            _ => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

/// Hook a development server installs to see request failures.
pub trait DevServerHooks: Send + Sync {
    fn process_request_error(&self, error: &ErrorValue);
}
