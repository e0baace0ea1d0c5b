//! Server build: the artifact the request handler serves.
//!
//! # Data Flow
//! ```text
//! BuildSource::Static(build)            BuildSource::Factory(fn)
//!     │ first request                       │ every request
//!     ▼                                     ▼
//!  derive (RouteTree, mode, args)       build = fn().await → derive
//!     │                                     │
//!     ▼                                     ▼
//!  ArcSwapOption cache  ───────────▶   Arc<Derived> for this request
//! ```
//!
//! # Design Decisions
//! - A static build derives once; a factory build (dev reload) re-derives
//!   per request so edits are picked up without a restart
//! - The build is read-only once handed over

use std::fmt;
use std::future::Future;
use std::sync::Arc;

use arc_swap::ArcSwapOption;
use axum::body::Bytes;
use axum::http::{HeaderMap, StatusCode};
use futures_util::future::BoxFuture;
use futures_util::stream::BoxStream;
use url::Url;

use crate::args::{ArgumentBuilder, LinkDescriptor, LoadContext, MetaDescriptor, Params, RouteRequest, UiMatch};
use crate::codec::{ErrorValue, Value};
use crate::config::{FutureConfig, ServerConfig, ServerMode};
use crate::executor::Executor;
use crate::handler::errors::HandlerError;
use crate::handoff::HydrationState;
use crate::routing::{RouteRecord, RouteTree};

/// Everything the document renderer receives.
#[derive(Debug, Clone)]
pub struct DocumentContext {
    pub url: Url,
    pub status: StatusCode,
    pub headers: HeaderMap,
    /// Escaped hydration payload; `None` when server components are present.
    pub server_handoff: Option<String>,
    pub state: HydrationState,
    pub matches: Vec<UiMatch>,
    pub meta: Vec<MetaDescriptor>,
    pub links: Vec<LinkDescriptor>,
    pub future: FutureConfig,
    pub is_spa_mode: bool,
}

/// Inputs to `handle_error`.
#[derive(Debug, Clone)]
pub struct ErrorContext {
    pub request: Arc<RouteRequest>,
    pub params: Params,
    pub context: LoadContext,
}

pub type RenderFn =
    Arc<dyn Fn(DocumentContext) -> BoxFuture<'static, Result<String, ErrorValue>> + Send + Sync>;
pub type RenderToStreamFn =
    Arc<dyn Fn(Value) -> BoxStream<'static, Result<Bytes, std::io::Error>> + Send + Sync>;
pub type HandleErrorFn = Arc<dyn Fn(&ErrorValue, &ErrorContext) + Send + Sync>;

/// The server entry module.
#[derive(Clone, Default)]
pub struct EntryModule {
    pub render: Option<RenderFn>,
    pub render_to_stream: Option<RenderToStreamFn>,
    pub handle_error: Option<HandleErrorFn>,
}

impl EntryModule {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn render<F, Fut>(mut self, f: F) -> Self
    where
        F: Fn(DocumentContext) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = Result<String, ErrorValue>> + Send + 'static,
    {
        self.render = Some(Arc::new(
            move |cx: DocumentContext| -> BoxFuture<'static, Result<String, ErrorValue>> {
                Box::pin(f(cx))
            },
        ));
        self
    }

    pub fn render_to_stream<F>(mut self, f: F) -> Self
    where
        F: Fn(Value) -> BoxStream<'static, Result<Bytes, std::io::Error>> + Send + Sync + 'static,
    {
        self.render_to_stream = Some(Arc::new(f));
        self
    }

    pub fn handle_error<F>(mut self, f: F) -> Self
    where
        F: Fn(&ErrorValue, &ErrorContext) + Send + Sync + 'static,
    {
        self.handle_error = Some(Arc::new(f));
        self
    }
}

impl fmt::Debug for EntryModule {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("EntryModule")
            .field("render", &self.render.is_some())
            .field("render_to_stream", &self.render_to_stream.is_some())
            .field("handle_error", &self.handle_error.is_some())
            .finish()
    }
}

/// The build artifact.
#[derive(Debug, Clone)]
pub struct ServerBuild {
    pub mode: ServerMode,
    pub entry: EntryModule,
    pub routes: Vec<RouteRecord>,
    pub future: FutureConfig,
    pub is_spa_mode: bool,
    pub critical_css: Option<String>,
}

impl ServerBuild {
    pub fn new(routes: Vec<RouteRecord>, entry: EntryModule) -> Self {
        Self {
            mode: ServerMode::default(),
            entry,
            routes,
            future: FutureConfig::default(),
            is_spa_mode: false,
            critical_css: None,
        }
    }

    pub fn with_mode(mut self, mode: ServerMode) -> Self {
        self.mode = mode;
        self
    }

    pub fn with_future(mut self, future: FutureConfig) -> Self {
        self.future = future;
        self
    }

    /// Take mode, future flags, SPA mode and critical CSS from config.
    pub fn configured(mut self, config: &ServerConfig) -> Self {
        self.mode = config.mode;
        self.future = config.future.clone();
        self.is_spa_mode = config.spa_mode;
        self.critical_css = config.critical_css.clone();
        self
    }
}

pub type BuildFactory =
    Arc<dyn Fn() -> BoxFuture<'static, Result<Arc<ServerBuild>, ErrorValue>> + Send + Sync>;

/// Where the handler gets its build from.
#[derive(Clone)]
pub enum BuildSource {
    Static(Arc<ServerBuild>),
    Factory(BuildFactory),
}

impl BuildSource {
    pub fn factory<F, Fut>(f: F) -> Self
    where
        F: Fn() -> Fut + Send + Sync + 'static,
        Fut: Future<Output = Result<Arc<ServerBuild>, ErrorValue>> + Send + 'static,
    {
        BuildSource::Factory(Arc::new(
            move || -> BoxFuture<'static, Result<Arc<ServerBuild>, ErrorValue>> { Box::pin(f()) },
        ))
    }
}

impl From<ServerBuild> for BuildSource {
    fn from(build: ServerBuild) -> Self {
        BuildSource::Static(Arc::new(build))
    }
}

impl fmt::Debug for BuildSource {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            BuildSource::Static(_) => f.write_str("BuildSource::Static"),
            BuildSource::Factory(_) => f.write_str("BuildSource::Factory"),
        }
    }
}

/// State derived from a build: validated routes and resolved modes.
#[derive(Debug)]
pub struct Derived {
    pub build: Arc<ServerBuild>,
    pub routes: Arc<RouteTree>,
    pub mode: ServerMode,
    pub executor: Executor,
}

impl Derived {
    /// `mode` overrides the build's own mode when given.
    pub fn derive(build: Arc<ServerBuild>, mode: Option<ServerMode>) -> Result<Self, HandlerError> {
        let routes = RouteTree::new(build.routes.clone())?;
        let executor = Executor::new(ArgumentBuilder::for_future(&build.future));
        Ok(Self {
            mode: mode.unwrap_or(build.mode),
            routes: Arc::new(routes),
            executor,
            build,
        })
    }

    pub fn args(&self) -> &ArgumentBuilder {
        self.executor.args()
    }

    /// Report an error to the build's `handle_error`, or log it.
    pub fn handle_error(&self, error: &ErrorValue, cx: &ErrorContext) {
        match &self.build.entry.handle_error {
            Some(handle_error) => handle_error(error, cx),
            None => tracing::error!(
                error = %error,
                stack = error.stack().unwrap_or_default(),
                path = %cx.request.pathname(),
                "Unhandled route error"
            ),
        }
    }
}

/// Derivation cache in front of a [`BuildSource`].
pub struct DerivedCache {
    source: BuildSource,
    mode: Option<ServerMode>,
    cached: ArcSwapOption<Derived>,
}

impl DerivedCache {
    pub fn new(source: BuildSource, mode: Option<ServerMode>) -> Self {
        Self {
            source,
            mode,
            cached: ArcSwapOption::empty(),
        }
    }

    pub fn source(&self) -> &BuildSource {
        &self.source
    }

    pub async fn get(&self) -> Result<Arc<Derived>, HandlerError> {
        match &self.source {
            BuildSource::Static(build) => {
                if let Some(derived) = self.cached.load_full() {
                    return Ok(derived);
                }
                let derived = Arc::new(Derived::derive(build.clone(), self.mode)?);
                tracing::debug!(routes = derived.routes.len(), mode = derived.mode.as_str(), "Build derived");
                self.cached.store(Some(derived.clone()));
                Ok(derived)
            }
            BuildSource::Factory(factory) => {
                let build = factory().await.map_err(HandlerError::BuildLoad)?;
                Ok(Arc::new(Derived::derive(build, self.mode)?))
            }
        }
    }
}
