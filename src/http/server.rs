//! HTTP server setup and configuration.
//!
//! # Responsibilities
//! - Create the Axum router: one fallback handler for every path
//! - Wire up middleware (request id, tracing, timeout, body limit)
//! - Route `rsc.path_prefix` to the server-component handler when enabled
//! - Swap handlers when a reloaded config arrives
//! - Drain in-flight requests on shutdown, bounded by the grace period
//!
//! # Design Decisions
//! - Handlers live behind `ArcSwap`; a request keeps the set it started with
//! - Listener-level settings (timeout, body limit) apply at startup only

use std::future::IntoFuture;
use std::sync::Arc;
use std::time::{Duration, Instant};

use arc_swap::ArcSwap;
use axum::body::Body;
use axum::extract::State;
use axum::http::request::Parts;
use axum::http::{Request, StatusCode};
use axum::response::{IntoResponse, Response};
use axum::Router;
use tokio::net::TcpListener;
use tokio::sync::{broadcast, mpsc};
use tower::ServiceBuilder;
use tower_http::limit::RequestBodyLimitLayer;
use tower_http::timeout::TimeoutLayer;
use tower_http::trace::TraceLayer;

use crate::args::LoadContext;
use crate::build::BuildSource;
use crate::config::ServerConfig;
use crate::handler::{RequestHandler, RscRequestHandler};
use crate::http::request::{self, RequestIdExt};
use crate::lifecycle::shutdown;

/// Builds the per-request context handed to route functions.
pub type LoadContextFn = Arc<dyn Fn(&Parts) -> LoadContext + Send + Sync>;

/// The handlers for one config generation.
struct Handlers {
    document: RequestHandler,
    rsc: Option<(String, RscRequestHandler)>,
}

impl Handlers {
    fn new(config: &ServerConfig, source: &BuildSource) -> Self {
        let mode = Some(config.mode);
        let rsc = config.rsc.enabled.then(|| {
            (
                config.rsc.path_prefix.trim_end_matches('/').to_string(),
                RscRequestHandler::new(source.clone(), mode),
            )
        });
        Self {
            document: RequestHandler::new(source.clone(), mode),
            rsc,
        }
    }
}

/// Application state injected into the handler.
#[derive(Clone)]
struct AppState {
    handlers: Arc<ArcSwap<Handlers>>,
    load_context: Option<LoadContextFn>,
}

/// HTTP server for a server build.
pub struct HttpServer {
    config: ServerConfig,
    source: BuildSource,
    load_context: Option<LoadContextFn>,
}

impl HttpServer {
    pub fn new(config: ServerConfig, source: BuildSource) -> Self {
        Self {
            config,
            source,
            load_context: None,
        }
    }

    /// Derive the load context from the incoming request. Without this the
    /// context carries the request's extensions (including its request id).
    pub fn with_load_context<F>(mut self, f: F) -> Self
    where
        F: Fn(&Parts) -> LoadContext + Send + Sync + 'static,
    {
        self.load_context = Some(Arc::new(f));
        self
    }

    pub fn config(&self) -> &ServerConfig {
        &self.config
    }

    /// Build the Axum router with all middleware layers.
    #[allow(deprecated)]
    fn build_router(config: &ServerConfig, state: AppState) -> Router {
        let middleware = ServiceBuilder::new()
            .layer(request::set_request_id_layer())
            .layer(TraceLayer::new_for_http())
            .layer(request::propagate_request_id_layer())
            .layer(RequestBodyLimitLayer::new(config.listener.max_body_bytes))
            .layer(TimeoutLayer::new(Duration::from_secs(config.timeouts.request_secs)));

        Router::new()
            .fallback(handle)
            .with_state(state)
            .layer(middleware)
    }

    /// Serve on `listener` until `shutdown_rx` fires. Configs arriving on
    /// `config_updates` replace the handlers for subsequent requests.
    pub async fn run(
        self,
        listener: TcpListener,
        mut config_updates: mpsc::UnboundedReceiver<ServerConfig>,
        shutdown_rx: broadcast::Receiver<()>,
    ) -> Result<(), std::io::Error> {
        let addr = listener.local_addr()?;
        let handlers = Arc::new(ArcSwap::from_pointee(Handlers::new(&self.config, &self.source)));
        let state = AppState {
            handlers: handlers.clone(),
            load_context: self.load_context.clone(),
        };
        let router = Self::build_router(&self.config, state);

        let source = self.source.clone();
        let reload_task = tokio::spawn(async move {
            while let Some(config) = config_updates.recv().await {
                handlers.store(Arc::new(Handlers::new(&config, &source)));
                tracing::info!(
                    mode = config.mode.as_str(),
                    rsc = config.rsc.enabled,
                    "Handlers reloaded from config"
                );
            }
        });

        tracing::info!(address = %addr, mode = self.config.mode.as_str(), "HTTP server starting");

        let grace = Duration::from_secs(self.config.timeouts.shutdown_grace_secs);
        let drain_rx = shutdown_rx.resubscribe();
        let serve = axum::serve(listener, router)
            .with_graceful_shutdown(async move {
                shutdown::wait(shutdown_rx).await;
                tracing::info!("Shutdown requested, draining connections");
            })
            .into_future();

        let result = tokio::select! {
            result = serve => result,
            _ = async move {
                shutdown::wait(drain_rx).await;
                tokio::time::sleep(grace).await;
            } => {
                tracing::warn!(grace_secs = grace.as_secs(), "Grace period elapsed, closing remaining connections");
                Ok(())
            }
        };

        reload_task.abort();
        tracing::info!("HTTP server stopped");
        result
    }
}

async fn handle(State(state): State<AppState>, request: Request<Body>) -> Response {
    let start = Instant::now();
    let (parts, body) = request.into_parts();
    let request_id = parts.headers.request_id().to_string();

    let body = match axum::body::to_bytes(body, usize::MAX).await {
        Ok(bytes) => bytes,
        Err(e) => {
            tracing::warn!(request_id = %request_id, error = %e, "Failed to read request body");
            return (StatusCode::PAYLOAD_TOO_LARGE, "Request body too large").into_response();
        }
    };
    let mut route_request = match request::to_route_request(&parts, body) {
        Ok(r) => r,
        Err(e) => {
            tracing::warn!(request_id = %request_id, error = %e, "Invalid request URL");
            return (StatusCode::BAD_REQUEST, "Invalid request URL").into_response();
        }
    };
    let context = match &state.load_context {
        Some(f) => f(&parts),
        None => LoadContext::new(parts.extensions.clone()),
    };

    let handlers = state.handlers.load_full();
    let rsc = handlers.rsc.as_ref().and_then(|(prefix, handler)| {
        let rest = route_request.pathname().strip_prefix(prefix.as_str())?;
        (rest.is_empty() || rest.starts_with('/')).then(|| (rest.to_string(), handler))
    });

    let result = match rsc {
        Some((rest, handler)) => {
            let mut url = route_request.url().clone();
            url.set_path(if rest.is_empty() { "/" } else { &rest });
            route_request = route_request.with_url(url);
            handler.handle(route_request, context).await
        }
        None => handlers.document.handle(route_request, context).await,
    };

    let response = result.into_response();
    tracing::debug!(
        request_id = %request_id,
        status = %response.status(),
        elapsed_ms = start.elapsed().as_millis() as u64,
        "Request complete"
    );
    response
}
