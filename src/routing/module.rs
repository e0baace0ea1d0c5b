//! Route module: the functions a route may export.
//!
//! Every export is optional. A route without a loader simply has no data,
//! a route without an action rejects mutations with a 405.

use std::fmt;
use std::future::Future;
use std::sync::Arc;

use axum::http::{HeaderMap, Method};
use futures_util::future::BoxFuture;
use url::Url;

use crate::args::{
    ActionArgs, ClientActionArgs, ClientLoaderArgs, HeadersArgs, LinkDescriptor, LinksArgs,
    LoaderArgs, MetaArgs, MetaDescriptor, Params,
};
use crate::codec::Value;
use crate::response::HandlerResult;

pub type LoaderFn = Arc<dyn Fn(LoaderArgs) -> BoxFuture<'static, HandlerResult> + Send + Sync>;
pub type ActionFn = Arc<dyn Fn(ActionArgs) -> BoxFuture<'static, HandlerResult> + Send + Sync>;
pub type ClientLoaderFn =
    Arc<dyn Fn(ClientLoaderArgs) -> BoxFuture<'static, HandlerResult> + Send + Sync>;
pub type ClientActionFn =
    Arc<dyn Fn(ClientActionArgs) -> BoxFuture<'static, HandlerResult> + Send + Sync>;
pub type HeadersFn = Arc<dyn Fn(HeadersArgs) -> HeaderMap + Send + Sync>;
pub type MetaFn = Arc<dyn Fn(MetaArgs) -> Vec<MetaDescriptor> + Send + Sync>;
pub type LinksFn = Arc<dyn Fn(LinksArgs) -> Vec<LinkDescriptor> + Send + Sync>;
pub type ShouldRevalidateFn = Arc<dyn Fn(&ShouldRevalidateArgs) -> bool + Send + Sync>;

/// Inputs to a route's `shouldRevalidate` override.
#[derive(Debug, Clone)]
pub struct ShouldRevalidateArgs {
    pub current_url: Url,
    pub next_url: Url,
    pub current_params: Params,
    pub next_params: Params,
    pub form_method: Option<Method>,
    pub action_result: Option<Value>,
    pub action_status: Option<u16>,
    pub default_should_revalidate: bool,
}

/// Exports of a single route module.
#[derive(Clone, Default)]
pub struct RouteModule {
    pub loader: Option<LoaderFn>,
    pub action: Option<ActionFn>,
    pub client_loader: Option<ClientLoaderFn>,
    pub client_action: Option<ClientActionFn>,
    pub headers: Option<HeadersFn>,
    pub meta: Option<MetaFn>,
    pub links: Option<LinksFn>,
    pub should_revalidate: Option<ShouldRevalidateFn>,
    pub has_error_boundary: bool,
}

impl RouteModule {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn loader<F, Fut>(mut self, f: F) -> Self
    where
        F: Fn(LoaderArgs) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = HandlerResult> + Send + 'static,
    {
        self.loader = Some(Arc::new(move |args: LoaderArgs| -> BoxFuture<'static, HandlerResult> {
            Box::pin(f(args))
        }));
        self
    }

    pub fn action<F, Fut>(mut self, f: F) -> Self
    where
        F: Fn(ActionArgs) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = HandlerResult> + Send + 'static,
    {
        self.action = Some(Arc::new(move |args: ActionArgs| -> BoxFuture<'static, HandlerResult> {
            Box::pin(f(args))
        }));
        self
    }

    pub fn client_loader<F, Fut>(mut self, f: F) -> Self
    where
        F: Fn(ClientLoaderArgs) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = HandlerResult> + Send + 'static,
    {
        self.client_loader = Some(Arc::new(move |args: ClientLoaderArgs| -> BoxFuture<'static, HandlerResult> {
            Box::pin(f(args))
        }));
        self
    }

    pub fn client_action<F, Fut>(mut self, f: F) -> Self
    where
        F: Fn(ClientActionArgs) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = HandlerResult> + Send + 'static,
    {
        self.client_action = Some(Arc::new(move |args: ClientActionArgs| -> BoxFuture<'static, HandlerResult> {
            Box::pin(f(args))
        }));
        self
    }

    pub fn headers<F>(mut self, f: F) -> Self
    where
        F: Fn(HeadersArgs) -> HeaderMap + Send + Sync + 'static,
    {
        self.headers = Some(Arc::new(f));
        self
    }

    pub fn meta<F>(mut self, f: F) -> Self
    where
        F: Fn(MetaArgs) -> Vec<MetaDescriptor> + Send + Sync + 'static,
    {
        self.meta = Some(Arc::new(f));
        self
    }

    pub fn links<F>(mut self, f: F) -> Self
    where
        F: Fn(LinksArgs) -> Vec<LinkDescriptor> + Send + Sync + 'static,
    {
        self.links = Some(Arc::new(f));
        self
    }

    pub fn should_revalidate<F>(mut self, f: F) -> Self
    where
        F: Fn(&ShouldRevalidateArgs) -> bool + Send + Sync + 'static,
    {
        self.should_revalidate = Some(Arc::new(f));
        self
    }

    pub fn error_boundary(mut self) -> Self {
        self.has_error_boundary = true;
        self
    }
}

impl fmt::Debug for RouteModule {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RouteModule")
            .field("loader", &self.loader.is_some())
            .field("action", &self.action.is_some())
            .field("client_loader", &self.client_loader.is_some())
            .field("client_action", &self.client_action.is_some())
            .field("headers", &self.headers.is_some())
            .field("meta", &self.meta.is_some())
            .field("links", &self.links.is_some())
            .field("should_revalidate", &self.should_revalidate.is_some())
            .field("has_error_boundary", &self.has_error_boundary)
            .finish()
    }
}
