//! Argument structs, one per (function kind × mode).

use std::sync::Arc;

use axum::http::HeaderMap;

use super::{
    ArgumentKeys, LoadContext, Location, MetaDescriptor, Params, RouteMatchInfo, RouteRequest,
    ServerCall, UiMatch,
};
use crate::codec::Value;

/// `{request, params, context}`
#[derive(Debug, Clone)]
pub struct LegacyServerArgs {
    pub request: Arc<RouteRequest>,
    pub params: Params,
    pub context: LoadContext,
}

/// `{request, params, context, matches}`
#[derive(Debug, Clone)]
pub struct AlignedServerArgs {
    pub request: Arc<RouteRequest>,
    pub params: Params,
    pub context: LoadContext,
    pub matches: Arc<[RouteMatchInfo]>,
}

/// `{request, params, serverLoader}`
#[derive(Debug, Clone)]
pub struct LegacyClientLoaderArgs {
    pub request: Arc<RouteRequest>,
    pub params: Params,
    pub server_loader: ServerCall,
}

/// `{request, params, matches, location, serverLoader}`
#[derive(Debug, Clone)]
pub struct AlignedClientLoaderArgs {
    pub request: Arc<RouteRequest>,
    pub params: Params,
    pub matches: Arc<[RouteMatchInfo]>,
    pub location: Location,
    pub server_loader: ServerCall,
}

/// `{request, params, serverAction}`
#[derive(Debug, Clone)]
pub struct LegacyClientActionArgs {
    pub request: Arc<RouteRequest>,
    pub params: Params,
    pub server_action: ServerCall,
}

/// `{request, params, matches, location, serverAction}`
#[derive(Debug, Clone)]
pub struct AlignedClientActionArgs {
    pub request: Arc<RouteRequest>,
    pub params: Params,
    pub matches: Arc<[RouteMatchInfo]>,
    pub location: Location,
    pub server_action: ServerCall,
}

/// `{loaderHeaders, parentHeaders, actionHeaders}`
#[derive(Debug, Clone)]
pub struct LegacyHeadersArgs {
    pub loader_headers: HeaderMap,
    pub parent_headers: HeaderMap,
    pub action_headers: HeaderMap,
}

/// Server keys plus `{loaderHeaders, parentHeaders, actionHeaders,
/// errorHeaders, data, error, loaderData}`.
///
/// `data` and `loaderData` both carry the route's own loader data
/// (`undefined` when it has none); `error` is set on the boundary route.
#[derive(Debug, Clone)]
pub struct AlignedHeadersArgs {
    pub request: Arc<RouteRequest>,
    pub params: Params,
    pub context: LoadContext,
    pub matches: Arc<[RouteMatchInfo]>,
    pub loader_headers: HeaderMap,
    pub parent_headers: HeaderMap,
    pub action_headers: HeaderMap,
    pub error_headers: Option<HeaderMap>,
    pub data: Value,
    pub error: Option<Value>,
    pub loader_data: Value,
}

/// `{data, params, matches, location}`
#[derive(Debug, Clone)]
pub struct LegacyMetaArgs {
    pub data: Value,
    pub params: Params,
    pub matches: Arc<[UiMatch]>,
    pub location: Location,
}

/// `{data, error, loaderData, location, matches, params, values}`
#[derive(Debug, Clone)]
pub struct AlignedMetaArgs {
    pub data: Value,
    pub error: Option<Value>,
    pub loader_data: Value,
    pub location: Location,
    pub matches: Arc<[UiMatch]>,
    pub params: Params,
    pub values: Vec<MetaDescriptor>,
}

/// `{data, params, matches, location}`
#[derive(Debug, Clone)]
pub struct LegacyLinksArgs {
    pub data: Value,
    pub params: Params,
    pub matches: Arc<[UiMatch]>,
    pub location: Location,
}

/// `{data, error, loaderData, location, matches, params}`
#[derive(Debug, Clone)]
pub struct AlignedLinksArgs {
    pub data: Value,
    pub error: Option<Value>,
    pub loader_data: Value,
    pub location: Location,
    pub matches: Arc<[UiMatch]>,
    pub params: Params,
}

impl ArgumentKeys for LegacyServerArgs {
    fn keys(&self) -> Vec<&'static str> {
        let Self {
            request: _,
            params: _,
            context: _,
        } = self;
        vec!["request", "params", "context"]
    }
}

impl ArgumentKeys for AlignedServerArgs {
    fn keys(&self) -> Vec<&'static str> {
        let Self {
            request: _,
            params: _,
            context: _,
            matches: _,
        } = self;
        vec!["request", "params", "context", "matches"]
    }
}

impl ArgumentKeys for LegacyClientLoaderArgs {
    fn keys(&self) -> Vec<&'static str> {
        let Self {
            request: _,
            params: _,
            server_loader: _,
        } = self;
        vec!["request", "params", "serverLoader"]
    }
}

impl ArgumentKeys for AlignedClientLoaderArgs {
    fn keys(&self) -> Vec<&'static str> {
        let Self {
            request: _,
            params: _,
            matches: _,
            location: _,
            server_loader: _,
        } = self;
        vec!["request", "params", "matches", "location", "serverLoader"]
    }
}

impl ArgumentKeys for LegacyClientActionArgs {
    fn keys(&self) -> Vec<&'static str> {
        let Self {
            request: _,
            params: _,
            server_action: _,
        } = self;
        vec!["request", "params", "serverAction"]
    }
}

impl ArgumentKeys for AlignedClientActionArgs {
    fn keys(&self) -> Vec<&'static str> {
        let Self {
            request: _,
            params: _,
            matches: _,
            location: _,
            server_action: _,
        } = self;
        vec!["request", "params", "matches", "location", "serverAction"]
    }
}

impl ArgumentKeys for LegacyHeadersArgs {
    fn keys(&self) -> Vec<&'static str> {
        let Self {
            loader_headers: _,
            parent_headers: _,
            action_headers: _,
        } = self;
        vec!["loaderHeaders", "parentHeaders", "actionHeaders"]
    }
}

impl ArgumentKeys for AlignedHeadersArgs {
    fn keys(&self) -> Vec<&'static str> {
        let Self {
            request: _,
            params: _,
            context: _,
            matches: _,
            loader_headers: _,
            parent_headers: _,
            action_headers: _,
            error_headers: _,
            data: _,
            error: _,
            loader_data: _,
        } = self;
        vec![
            "request",
            "params",
            "context",
            "matches",
            "loaderHeaders",
            "parentHeaders",
            "actionHeaders",
            "errorHeaders",
            "data",
            "error",
            "loaderData",
        ]
    }
}

impl ArgumentKeys for LegacyMetaArgs {
    fn keys(&self) -> Vec<&'static str> {
        let Self {
            data: _,
            params: _,
            matches: _,
            location: _,
        } = self;
        vec!["data", "params", "matches", "location"]
    }
}

impl ArgumentKeys for AlignedMetaArgs {
    fn keys(&self) -> Vec<&'static str> {
        let Self {
            data: _,
            error: _,
            loader_data: _,
            location: _,
            matches: _,
            params: _,
            values: _,
        } = self;
        vec!["data", "error", "loaderData", "location", "matches", "params", "values"]
    }
}

impl ArgumentKeys for LegacyLinksArgs {
    fn keys(&self) -> Vec<&'static str> {
        let Self {
            data: _,
            params: _,
            matches: _,
            location: _,
        } = self;
        vec!["data", "params", "matches", "location"]
    }
}

impl ArgumentKeys for AlignedLinksArgs {
    fn keys(&self) -> Vec<&'static str> {
        let Self {
            data: _,
            error: _,
            loader_data: _,
            location: _,
            matches: _,
            params: _,
        } = self;
        vec!["data", "error", "loaderData", "location", "matches", "params"]
    }
}

/// Arguments for a server loader.
#[derive(Debug, Clone)]
pub enum LoaderArgs {
    Legacy(LegacyServerArgs),
    Aligned(AlignedServerArgs),
}

/// Arguments for a server action.
#[derive(Debug, Clone)]
pub enum ActionArgs {
    Legacy(LegacyServerArgs),
    Aligned(AlignedServerArgs),
}

macro_rules! server_accessors {
    ($ty:ident) => {
        impl $ty {
            pub fn request(&self) -> &RouteRequest {
                match self {
                    $ty::Legacy(a) => &a.request,
                    $ty::Aligned(a) => &a.request,
                }
            }

            pub fn params(&self) -> &Params {
                match self {
                    $ty::Legacy(a) => &a.params,
                    $ty::Aligned(a) => &a.params,
                }
            }

            pub fn context(&self) -> &LoadContext {
                match self {
                    $ty::Legacy(a) => &a.context,
                    $ty::Aligned(a) => &a.context,
                }
            }

            /// Only present with aligned signatures.
            pub fn matches(&self) -> Option<&[RouteMatchInfo]> {
                match self {
                    $ty::Legacy(_) => None,
                    $ty::Aligned(a) => Some(&a.matches),
                }
            }
        }

        impl ArgumentKeys for $ty {
            fn keys(&self) -> Vec<&'static str> {
                match self {
                    $ty::Legacy(a) => a.keys(),
                    $ty::Aligned(a) => a.keys(),
                }
            }
        }
    };
}

server_accessors!(LoaderArgs);
server_accessors!(ActionArgs);

/// Arguments for a client loader.
#[derive(Debug, Clone)]
pub enum ClientLoaderArgs {
    Legacy(LegacyClientLoaderArgs),
    Aligned(AlignedClientLoaderArgs),
}

impl ClientLoaderArgs {
    pub fn request(&self) -> &RouteRequest {
        match self {
            ClientLoaderArgs::Legacy(a) => &a.request,
            ClientLoaderArgs::Aligned(a) => &a.request,
        }
    }

    pub fn params(&self) -> &Params {
        match self {
            ClientLoaderArgs::Legacy(a) => &a.params,
            ClientLoaderArgs::Aligned(a) => &a.params,
        }
    }

    pub fn server_loader(&self) -> &ServerCall {
        match self {
            ClientLoaderArgs::Legacy(a) => &a.server_loader,
            ClientLoaderArgs::Aligned(a) => &a.server_loader,
        }
    }
}

impl ArgumentKeys for ClientLoaderArgs {
    fn keys(&self) -> Vec<&'static str> {
        match self {
            ClientLoaderArgs::Legacy(a) => a.keys(),
            ClientLoaderArgs::Aligned(a) => a.keys(),
        }
    }
}

/// Arguments for a client action.
#[derive(Debug, Clone)]
pub enum ClientActionArgs {
    Legacy(LegacyClientActionArgs),
    Aligned(AlignedClientActionArgs),
}

impl ClientActionArgs {
    pub fn request(&self) -> &RouteRequest {
        match self {
            ClientActionArgs::Legacy(a) => &a.request,
            ClientActionArgs::Aligned(a) => &a.request,
        }
    }

    pub fn params(&self) -> &Params {
        match self {
            ClientActionArgs::Legacy(a) => &a.params,
            ClientActionArgs::Aligned(a) => &a.params,
        }
    }

    pub fn server_action(&self) -> &ServerCall {
        match self {
            ClientActionArgs::Legacy(a) => &a.server_action,
            ClientActionArgs::Aligned(a) => &a.server_action,
        }
    }
}

impl ArgumentKeys for ClientActionArgs {
    fn keys(&self) -> Vec<&'static str> {
        match self {
            ClientActionArgs::Legacy(a) => a.keys(),
            ClientActionArgs::Aligned(a) => a.keys(),
        }
    }
}

/// Arguments for a route's `headers` function.
#[derive(Debug, Clone)]
pub enum HeadersArgs {
    Legacy(LegacyHeadersArgs),
    Aligned(AlignedHeadersArgs),
}

impl HeadersArgs {
    pub fn loader_headers(&self) -> &HeaderMap {
        match self {
            HeadersArgs::Legacy(a) => &a.loader_headers,
            HeadersArgs::Aligned(a) => &a.loader_headers,
        }
    }

    pub fn parent_headers(&self) -> &HeaderMap {
        match self {
            HeadersArgs::Legacy(a) => &a.parent_headers,
            HeadersArgs::Aligned(a) => &a.parent_headers,
        }
    }

    pub fn action_headers(&self) -> &HeaderMap {
        match self {
            HeadersArgs::Legacy(a) => &a.action_headers,
            HeadersArgs::Aligned(a) => &a.action_headers,
        }
    }

    /// Only present with aligned signatures, and only on the boundary route.
    pub fn error_headers(&self) -> Option<&HeaderMap> {
        match self {
            HeadersArgs::Legacy(_) => None,
            HeadersArgs::Aligned(a) => a.error_headers.as_ref(),
        }
    }

    /// The route's loader data. Only present with aligned signatures.
    pub fn data(&self) -> Option<&Value> {
        match self {
            HeadersArgs::Legacy(_) => None,
            HeadersArgs::Aligned(a) => Some(&a.data),
        }
    }

    /// The error rendered by this route's boundary, if any.
    pub fn error(&self) -> Option<&Value> {
        match self {
            HeadersArgs::Legacy(_) => None,
            HeadersArgs::Aligned(a) => a.error.as_ref(),
        }
    }
}

impl ArgumentKeys for HeadersArgs {
    fn keys(&self) -> Vec<&'static str> {
        match self {
            HeadersArgs::Legacy(a) => a.keys(),
            HeadersArgs::Aligned(a) => a.keys(),
        }
    }
}

/// Arguments for a route's `meta` function.
#[derive(Debug, Clone)]
pub enum MetaArgs {
    Legacy(LegacyMetaArgs),
    Aligned(AlignedMetaArgs),
}

impl MetaArgs {
    pub fn data(&self) -> &Value {
        match self {
            MetaArgs::Legacy(a) => &a.data,
            MetaArgs::Aligned(a) => &a.data,
        }
    }

    pub fn params(&self) -> &Params {
        match self {
            MetaArgs::Legacy(a) => &a.params,
            MetaArgs::Aligned(a) => &a.params,
        }
    }

    pub fn location(&self) -> &Location {
        match self {
            MetaArgs::Legacy(a) => &a.location,
            MetaArgs::Aligned(a) => &a.location,
        }
    }

    pub fn matches(&self) -> &[UiMatch] {
        match self {
            MetaArgs::Legacy(a) => &a.matches,
            MetaArgs::Aligned(a) => &a.matches,
        }
    }
}

impl ArgumentKeys for MetaArgs {
    fn keys(&self) -> Vec<&'static str> {
        match self {
            MetaArgs::Legacy(a) => a.keys(),
            MetaArgs::Aligned(a) => a.keys(),
        }
    }
}

/// Arguments for a route's `links` function.
#[derive(Debug, Clone)]
pub enum LinksArgs {
    Legacy(LegacyLinksArgs),
    Aligned(AlignedLinksArgs),
}

impl LinksArgs {
    pub fn data(&self) -> &Value {
        match self {
            LinksArgs::Legacy(a) => &a.data,
            LinksArgs::Aligned(a) => &a.data,
        }
    }

    pub fn params(&self) -> &Params {
        match self {
            LinksArgs::Legacy(a) => &a.params,
            LinksArgs::Aligned(a) => &a.params,
        }
    }
}

impl ArgumentKeys for LinksArgs {
    fn keys(&self) -> Vec<&'static str> {
        match self {
            LinksArgs::Legacy(a) => a.keys(),
            LinksArgs::Aligned(a) => a.keys(),
        }
    }
}
