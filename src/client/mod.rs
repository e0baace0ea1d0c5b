//! Single-fetch client.
//!
//! # Responsibilities
//! - Build `.data` URLs (`/` is addressed as `/_root.data`)
//! - Issue loader and action requests without following redirects
//! - Decode bodies and out-of-band redirects with the codec
//!
//! The [`navigator`] module layers router-like state on top.

pub mod navigator;

use axum::http::{HeaderMap, StatusCode};
use thiserror::Error;
use url::Url;

use crate::codec::{self, CodecError, Decoded, PayloadKind};

pub use navigator::Navigator;

#[derive(Debug, Error)]
pub enum ClientError {
    #[error("request failed: {0}")]
    Http(#[from] reqwest::Error),

    #[error(transparent)]
    Codec(#[from] CodecError),

    #[error("invalid URL: {0}")]
    Url(#[from] url::ParseError),

    #[error("no route matches URL \"{0}\"")]
    NoMatch(String),

    #[error("expected a {expected} payload")]
    UnexpectedPayload { expected: &'static str },

    #[error("stopped after {0} redirects")]
    TooManyRedirects(usize),
}

/// One decoded single-fetch response.
#[derive(Debug, Clone)]
pub struct FetchResult {
    pub status: StatusCode,
    pub headers: HeaderMap,
    pub decoded: Decoded,
}

/// `.data` URL for `url`, optionally scoped to `routes`.
pub fn data_url(url: &Url, routes: Option<&str>) -> Url {
    let mut out = url.clone();
    let path = url.path().trim_end_matches('/');
    if path.is_empty() {
        out.set_path("/_root.data");
    } else {
        out.set_path(&format!("{}.data", path));
    }
    if let Some(routes) = routes {
        out.query_pairs_mut().append_pair("_routes", routes);
    }
    out.set_fragment(None);
    out
}

#[derive(Debug, Clone)]
pub struct SingleFetchClient {
    http: reqwest::Client,
    base: Url,
}

impl SingleFetchClient {
    pub fn new(base: Url) -> Result<Self, ClientError> {
        let http = reqwest::Client::builder()
            .redirect(reqwest::redirect::Policy::none())
            .build()?;
        Ok(Self { http, base })
    }

    pub fn base(&self) -> &Url {
        &self.base
    }

    /// Resolve an app path against the base URL.
    pub fn resolve(&self, path: &str) -> Result<Url, ClientError> {
        Ok(self.base.join(path)?)
    }

    /// GET the loaders for `url`.
    pub async fn load(&self, url: &Url, routes: Option<&str>) -> Result<FetchResult, ClientError> {
        let target = data_url(url, routes);
        tracing::debug!(url = %target, "Fetching route data");
        let response = self.http.get(target).send().await?;
        Self::decode(response, PayloadKind::Loaders).await
    }

    /// POST `form` to the action for `url`.
    pub async fn submit(&self, url: &Url, form: &[(&str, &str)]) -> Result<FetchResult, ClientError> {
        let target = data_url(url, None);
        tracing::debug!(url = %target, "Submitting action");
        let body = url::form_urlencoded::Serializer::new(String::new())
            .extend_pairs(form)
            .finish();
        let response = self
            .http
            .post(target)
            .header(
                reqwest::header::CONTENT_TYPE,
                "application/x-www-form-urlencoded",
            )
            .body(body)
            .send()
            .await?;
        Self::decode(response, PayloadKind::Action).await
    }

    async fn decode(response: reqwest::Response, kind: PayloadKind) -> Result<FetchResult, ClientError> {
        let status = response.status();
        let headers = response.headers().clone();
        let body = response.bytes().await?;
        let decoded = codec::decode_response(status, &headers, &body, kind)?;
        Ok(FetchResult {
            status,
            headers,
            decoded,
        })
    }
}
