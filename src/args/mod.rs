//! Argument builder for route module functions.
//!
//! # Responsibilities
//! - Build the argument object for every function kind (loader, action,
//!   headers, meta, links, client loader, client action)
//! - Select the key set per [`ArgsMode`], resolved once from the build's
//!   future flags
//!
//! # Design Decisions
//! - One struct per (kind × mode); no optional fields toggled at call time
//! - Every struct reports its keys through [`ArgumentKeys`], implemented by
//!   exhaustive destructuring so a new field cannot go unlisted
//! - Each invocation gets its own argument value; shared request data sits
//!   behind `Arc`

pub mod kinds;

use std::collections::BTreeMap;
use std::fmt;
use std::future::Future;
use std::sync::Arc;

use axum::body::Bytes;
use axum::http::{Extensions, HeaderMap, Method};
use futures_util::future::BoxFuture;
use serde::Serialize;
use url::Url;

use crate::codec::Value;
use crate::config::FutureConfig;
use crate::response::HandlerResult;

pub use kinds::{
    ActionArgs, AlignedClientActionArgs, AlignedClientLoaderArgs, AlignedHeadersArgs,
    AlignedLinksArgs, AlignedMetaArgs, AlignedServerArgs, ClientActionArgs, ClientLoaderArgs,
    HeadersArgs, LegacyClientActionArgs, LegacyClientLoaderArgs, LegacyHeadersArgs,
    LegacyLinksArgs, LegacyMetaArgs, LegacyServerArgs, LinksArgs, LoaderArgs, MetaArgs,
};

/// Route params: name → decoded segment. Splats are stored under `*`.
pub type Params = BTreeMap<String, String>;

/// A meta tag descriptor, e.g. `{"title": "Home"}`.
pub type MetaDescriptor = BTreeMap<String, String>;

/// Which argument contract route functions receive.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ArgsMode {
    Legacy,
    Aligned,
}

impl ArgsMode {
    pub fn from_future(future: &FutureConfig) -> Self {
        if future.unstable_align_route_signatures {
            ArgsMode::Aligned
        } else {
            ArgsMode::Legacy
        }
    }
}

/// Reports the exact set of keys an argument object exposes.
pub trait ArgumentKeys {
    fn keys(&self) -> Vec<&'static str>;
}

/// The request as seen by route functions.
#[derive(Debug, Clone)]
pub struct RouteRequest {
    method: Method,
    url: Url,
    headers: HeaderMap,
    body: Bytes,
}

impl RouteRequest {
    pub fn new(method: Method, url: Url) -> Self {
        Self {
            method,
            url,
            headers: HeaderMap::new(),
            body: Bytes::new(),
        }
    }

    pub fn with_headers(mut self, headers: HeaderMap) -> Self {
        self.headers = headers;
        self
    }

    pub fn with_body(mut self, body: impl Into<Bytes>) -> Self {
        self.body = body.into();
        self
    }

    /// Same request, different URL.
    pub fn with_url(&self, url: Url) -> Self {
        Self {
            url,
            ..self.clone()
        }
    }

    pub fn method(&self) -> &Method {
        &self.method
    }

    pub fn url(&self) -> &Url {
        &self.url
    }

    pub fn headers(&self) -> &HeaderMap {
        &self.headers
    }

    pub fn body(&self) -> &Bytes {
        &self.body
    }

    pub fn pathname(&self) -> &str {
        self.url.path()
    }

    pub fn search_param(&self, name: &str) -> Option<String> {
        self.url
            .query_pairs()
            .find(|(k, _)| k == name)
            .map(|(_, v)| v.into_owned())
    }

    pub fn has_search_param(&self, name: &str) -> bool {
        self.url.query_pairs().any(|(k, _)| k == name)
    }

    /// Decode an `application/x-www-form-urlencoded` body.
    pub fn form_data(&self) -> Vec<(String, String)> {
        url::form_urlencoded::parse(&self.body)
            .map(|(k, v)| (k.into_owned(), v.into_owned()))
            .collect()
    }

    pub fn form_value(&self, name: &str) -> Option<String> {
        url::form_urlencoded::parse(&self.body)
            .find(|(k, _)| k == name)
            .map(|(_, v)| v.into_owned())
    }

    pub fn is_mutation(&self) -> bool {
        is_mutation_method(&self.method)
    }
}

pub(crate) fn is_mutation_method(method: &Method) -> bool {
    matches!(*method, Method::POST | Method::PUT | Method::PATCH | Method::DELETE)
}

/// Per-request context supplied by the server adapter.
#[derive(Debug, Clone, Default)]
pub struct LoadContext(Arc<Extensions>);

impl LoadContext {
    pub fn new(extensions: Extensions) -> Self {
        Self(Arc::new(extensions))
    }

    pub fn get<T: Send + Sync + 'static>(&self) -> Option<&T> {
        self.0.get::<T>()
    }
}

/// Browser-style location.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct Location {
    pub pathname: String,
    pub search: String,
    pub hash: String,
}

impl Location {
    pub fn from_url(url: &Url) -> Self {
        Self {
            pathname: url.path().to_string(),
            search: url.query().map(|q| format!("?{}", q)).unwrap_or_default(),
            hash: url.fragment().map(|f| format!("#{}", f)).unwrap_or_default(),
        }
    }
}

/// A matched route as exposed to server and client functions.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RouteMatchInfo {
    pub id: String,
    pub pathname: String,
    pub params: Params,
}

/// A matched route as exposed to meta and links, with its data.
#[derive(Debug, Clone)]
pub struct UiMatch {
    pub id: String,
    pub pathname: String,
    pub params: Params,
    pub data: Value,
    pub error: Option<Value>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct LinkDescriptor {
    pub rel: String,
    pub href: String,
    #[serde(flatten)]
    pub attrs: BTreeMap<String, String>,
}

impl LinkDescriptor {
    pub fn stylesheet(href: impl Into<String>) -> Self {
        Self {
            rel: "stylesheet".into(),
            href: href.into(),
            attrs: BTreeMap::new(),
        }
    }
}

/// Deferred call to the server half of a client loader/action.
#[derive(Clone)]
pub struct ServerCall(Arc<dyn Fn() -> BoxFuture<'static, HandlerResult> + Send + Sync>);

impl ServerCall {
    pub fn new<F, Fut>(f: F) -> Self
    where
        F: Fn() -> Fut + Send + Sync + 'static,
        Fut: Future<Output = HandlerResult> + Send + 'static,
    {
        Self(Arc::new(move || -> BoxFuture<'static, HandlerResult> { Box::pin(f()) }))
    }

    pub async fn call(&self) -> HandlerResult {
        (self.0)().await
    }
}

impl fmt::Debug for ServerCall {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("ServerCall")
    }
}

/// Request-wide inputs shared by every server function.
#[derive(Debug, Clone)]
pub struct ServerScope {
    pub request: Arc<RouteRequest>,
    pub context: LoadContext,
    pub matches: Arc<[RouteMatchInfo]>,
}

/// Render-time inputs shared by meta and links.
#[derive(Debug, Clone)]
pub struct UiScope {
    pub location: Location,
    pub matches: Arc<[UiMatch]>,
}

/// Navigation-wide inputs shared by client functions.
#[derive(Debug, Clone)]
pub struct ClientScope {
    pub request: Arc<RouteRequest>,
    pub location: Location,
    pub matches: Arc<[RouteMatchInfo]>,
}

/// The header sets a headers function can see.
#[derive(Debug, Clone, Default)]
pub struct HeaderInputs {
    pub loader: HeaderMap,
    pub parent: HeaderMap,
    pub action: HeaderMap,
    pub error: Option<HeaderMap>,
    /// The route's loader data, when it produced any.
    pub data: Option<Value>,
    /// The error shown at this route's boundary.
    pub error_value: Option<Value>,
}

/// Builds argument objects for the active mode.
#[derive(Debug, Clone, Copy)]
pub struct ArgumentBuilder {
    mode: ArgsMode,
}

impl ArgumentBuilder {
    pub fn new(mode: ArgsMode) -> Self {
        Self { mode }
    }

    pub fn for_future(future: &FutureConfig) -> Self {
        Self::new(ArgsMode::from_future(future))
    }

    pub fn mode(&self) -> ArgsMode {
        self.mode
    }

    pub fn loader(&self, scope: &ServerScope, params: &Params) -> LoaderArgs {
        match self.mode {
            ArgsMode::Legacy => LoaderArgs::Legacy(legacy_server(scope, params)),
            ArgsMode::Aligned => LoaderArgs::Aligned(aligned_server(scope, params)),
        }
    }

    pub fn action(&self, scope: &ServerScope, params: &Params) -> ActionArgs {
        match self.mode {
            ArgsMode::Legacy => ActionArgs::Legacy(legacy_server(scope, params)),
            ArgsMode::Aligned => ActionArgs::Aligned(aligned_server(scope, params)),
        }
    }

    pub fn headers(&self, scope: &ServerScope, params: &Params, inputs: HeaderInputs) -> HeadersArgs {
        match self.mode {
            ArgsMode::Legacy => HeadersArgs::Legacy(LegacyHeadersArgs {
                loader_headers: inputs.loader,
                parent_headers: inputs.parent,
                action_headers: inputs.action,
            }),
            ArgsMode::Aligned => HeadersArgs::Aligned(AlignedHeadersArgs {
                request: scope.request.clone(),
                params: params.clone(),
                context: scope.context.clone(),
                matches: scope.matches.clone(),
                loader_headers: inputs.loader,
                parent_headers: inputs.parent,
                action_headers: inputs.action,
                error_headers: inputs.error,
                loader_data: inputs.data.clone().unwrap_or(Value::Undefined),
                data: inputs.data.unwrap_or(Value::Undefined),
                error: inputs.error_value,
            }),
        }
    }

    /// Meta arguments for the match at `index`. `values` carries the
    /// descriptors already produced by ancestors.
    pub fn meta(&self, scope: &UiScope, index: usize, values: Vec<MetaDescriptor>) -> MetaArgs {
        let m = &scope.matches[index];
        match self.mode {
            ArgsMode::Legacy => MetaArgs::Legacy(LegacyMetaArgs {
                data: m.data.clone(),
                params: m.params.clone(),
                matches: scope.matches.clone(),
                location: scope.location.clone(),
            }),
            ArgsMode::Aligned => MetaArgs::Aligned(AlignedMetaArgs {
                data: m.data.clone(),
                error: m.error.clone(),
                loader_data: m.data.clone(),
                location: scope.location.clone(),
                matches: scope.matches.clone(),
                params: m.params.clone(),
                values,
            }),
        }
    }

    pub fn links(&self, scope: &UiScope, index: usize) -> LinksArgs {
        let m = &scope.matches[index];
        match self.mode {
            ArgsMode::Legacy => LinksArgs::Legacy(LegacyLinksArgs {
                data: m.data.clone(),
                params: m.params.clone(),
                matches: scope.matches.clone(),
                location: scope.location.clone(),
            }),
            ArgsMode::Aligned => LinksArgs::Aligned(AlignedLinksArgs {
                data: m.data.clone(),
                error: m.error.clone(),
                loader_data: m.data.clone(),
                location: scope.location.clone(),
                matches: scope.matches.clone(),
                params: m.params.clone(),
            }),
        }
    }

    pub fn client_loader(
        &self,
        scope: &ClientScope,
        params: &Params,
        server_loader: ServerCall,
    ) -> ClientLoaderArgs {
        match self.mode {
            ArgsMode::Legacy => ClientLoaderArgs::Legacy(LegacyClientLoaderArgs {
                request: scope.request.clone(),
                params: params.clone(),
                server_loader,
            }),
            ArgsMode::Aligned => ClientLoaderArgs::Aligned(AlignedClientLoaderArgs {
                request: scope.request.clone(),
                params: params.clone(),
                matches: scope.matches.clone(),
                location: scope.location.clone(),
                server_loader,
            }),
        }
    }

    pub fn client_action(
        &self,
        scope: &ClientScope,
        params: &Params,
        server_action: ServerCall,
    ) -> ClientActionArgs {
        match self.mode {
            ArgsMode::Legacy => ClientActionArgs::Legacy(LegacyClientActionArgs {
                request: scope.request.clone(),
                params: params.clone(),
                server_action,
            }),
            ArgsMode::Aligned => ClientActionArgs::Aligned(AlignedClientActionArgs {
                request: scope.request.clone(),
                params: params.clone(),
                matches: scope.matches.clone(),
                location: scope.location.clone(),
                server_action,
            }),
        }
    }
}

fn legacy_server(scope: &ServerScope, params: &Params) -> LegacyServerArgs {
    LegacyServerArgs {
        request: scope.request.clone(),
        params: params.clone(),
        context: scope.context.clone(),
    }
}

fn aligned_server(scope: &ServerScope, params: &Params) -> AlignedServerArgs {
    AlignedServerArgs {
        request: scope.request.clone(),
        params: params.clone(),
        context: scope.context.clone(),
        matches: scope.matches.clone(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::response::Returned;

    fn sorted(mut keys: Vec<&'static str>) -> Vec<&'static str> {
        keys.sort_unstable();
        keys
    }

    fn server_scope() -> ServerScope {
        let url = Url::parse("http://localhost/").unwrap();
        ServerScope {
            request: Arc::new(RouteRequest::new(Method::GET, url)),
            context: LoadContext::default(),
            matches: Arc::from(vec![RouteMatchInfo {
                id: "root".into(),
                pathname: "/".into(),
                params: Params::new(),
            }]),
        }
    }

    fn ui_scope() -> UiScope {
        UiScope {
            location: Location::default(),
            matches: Arc::from(vec![UiMatch {
                id: "root".into(),
                pathname: "/".into(),
                params: Params::new(),
                data: Value::Null,
                error: None,
            }]),
        }
    }

    fn client_scope() -> ClientScope {
        let scope = server_scope();
        ClientScope {
            request: scope.request,
            location: Location::default(),
            matches: scope.matches,
        }
    }

    fn noop_call() -> ServerCall {
        ServerCall::new(|| async { Ok(Returned::Data(Value::Null)) })
    }

    #[test]
    fn test_legacy_key_sets() {
        let builder = ArgumentBuilder::new(ArgsMode::Legacy);
        let scope = server_scope();
        let params = Params::new();

        assert_eq!(sorted(builder.loader(&scope, &params).keys()), ["context", "params", "request"]);
        assert_eq!(sorted(builder.action(&scope, &params).keys()), ["context", "params", "request"]);
        assert_eq!(
            sorted(builder.headers(&scope, &params, HeaderInputs::default()).keys()),
            ["actionHeaders", "loaderHeaders", "parentHeaders"]
        );
        assert_eq!(
            sorted(builder.meta(&ui_scope(), 0, Vec::new()).keys()),
            ["data", "location", "matches", "params"]
        );
        assert_eq!(
            sorted(builder.links(&ui_scope(), 0).keys()),
            ["data", "location", "matches", "params"]
        );
        assert_eq!(
            sorted(builder.client_loader(&client_scope(), &params, noop_call()).keys()),
            ["params", "request", "serverLoader"]
        );
        assert_eq!(
            sorted(builder.client_action(&client_scope(), &params, noop_call()).keys()),
            ["params", "request", "serverAction"]
        );
    }

    #[test]
    fn test_aligned_key_sets() {
        let builder = ArgumentBuilder::for_future(&FutureConfig {
            unstable_align_route_signatures: true,
            ..FutureConfig::default()
        });
        assert_eq!(builder.mode(), ArgsMode::Aligned);
        let scope = server_scope();
        let params = Params::new();

        let shared_server = ["context", "matches", "params", "request"];
        assert_eq!(sorted(builder.loader(&scope, &params).keys()), shared_server);
        assert_eq!(sorted(builder.action(&scope, &params).keys()), shared_server);
        assert_eq!(
            sorted(builder.headers(&scope, &params, HeaderInputs::default()).keys()),
            [
                "actionHeaders",
                "context",
                "data",
                "error",
                "errorHeaders",
                "loaderData",
                "loaderHeaders",
                "matches",
                "params",
                "parentHeaders",
                "request",
            ]
        );
        assert_eq!(
            sorted(builder.meta(&ui_scope(), 0, Vec::new()).keys()),
            ["data", "error", "loaderData", "location", "matches", "params", "values"]
        );
        assert_eq!(
            sorted(builder.links(&ui_scope(), 0).keys()),
            ["data", "error", "loaderData", "location", "matches", "params"]
        );
        assert_eq!(
            sorted(builder.client_loader(&client_scope(), &params, noop_call()).keys()),
            ["location", "matches", "params", "request", "serverLoader"]
        );
        assert_eq!(
            sorted(builder.client_action(&client_scope(), &params, noop_call()).keys()),
            ["location", "matches", "params", "request", "serverAction"]
        );
    }

    #[test]
    fn test_request_helpers() {
        let url = Url::parse("http://localhost/data?error=true#top").unwrap();
        let request = RouteRequest::new(Method::POST, url).with_body("key=value&other=1");
        assert!(request.is_mutation());
        assert!(request.has_search_param("error"));
        assert_eq!(request.form_value("key").as_deref(), Some("value"));
        assert_eq!(request.form_data().len(), 2);

        let location = Location::from_url(request.url());
        assert_eq!(location.search, "?error=true");
        assert_eq!(location.hash, "#top");
    }

    #[tokio::test]
    async fn test_server_call_invokes_closure() {
        let call = ServerCall::new(|| async { Ok(Returned::Data(Value::from("server"))) });
        match call.call().await {
            Ok(Returned::Data(v)) => assert_eq!(v.as_str(), Some("server")),
            _ => panic!("unexpected result"),
        }
    }
}
