//! Document requests: run the data pass, then hand everything to `render`.
//!
//! Errors are placed at the nearest error boundary here, and the UI matches
//! stop at the shallowest boundary that renders one. Redirects are real
//! 3xx responses.

use std::collections::BTreeMap;
use std::sync::Arc;

use axum::body::Bytes;
use axum::http::{header, HeaderValue};

use super::{Dispatch, HandlerError, HandlerResponse, ResponseBody};
use crate::aggregate::{sanitize_error, ErrorPlacement, RouteResult};
use crate::args::{LoadContext, Location, RouteRequest, UiMatch, UiScope};
use crate::build::DocumentContext;
use crate::codec::Value;
use crate::executor::{LoaderRun, Outcome, RouteFilter, SubmitRun};
use crate::handoff::{create_server_handoff_string, HydrationState, ServerHandoff};

pub(super) async fn handle(
    dispatch: &Dispatch<'_>,
    request: RouteRequest,
    context: LoadContext,
) -> Result<HandlerResponse, HandlerError> {
    let derived = dispatch.derived;
    let render = derived
        .build
        .entry
        .render
        .clone()
        .ok_or(HandlerError::MissingRender)?;

    let mutation = request.is_mutation();
    let (scope, unmatched) = dispatch.scope(request, context);
    let executor = &derived.executor;

    let (run, action) = match unmatched {
        Some(run) => (run, None),
        None if mutation => match executor.submit(&scope, &RouteFilter::All).await {
            Some(SubmitRun { action, loaders }) => (loaders.unwrap_or_default(), Some(action)),
            None => (LoaderRun::default(), None),
        },
        None => (executor.load(&scope, &RouteFilter::All).await, None),
    };
    dispatch.report(&scope, action.iter().chain(run.outcomes.iter()));

    let aggregated = dispatch
        .aggregator(&scope)
        .loaders(&run, action.as_ref(), ErrorPlacement::Boundary);

    if let Some(redirect) = aggregated.redirect() {
        tracing::debug!(location = %redirect.location, status = %redirect.status, "Document redirect");
        return Ok(HandlerResponse {
            status: redirect.status,
            headers: aggregated.headers().clone(),
            body: ResponseBody::empty(),
        });
    }

    let mut state = HydrationState::default();
    let mut errors = BTreeMap::new();
    for (id, result) in aggregated.results() {
        match result {
            RouteResult::Data(value) => {
                state.loader_data.insert(id.clone(), value.clone());
            }
            RouteResult::Error(value) => {
                errors.insert(id.clone(), value.clone());
            }
            RouteResult::Redirect(_) => {}
        }
    }
    state.action_data = action.as_ref().and_then(|a| match &a.outcome {
        Outcome::Data { value, .. } => Some(BTreeMap::from([(a.route_id.clone(), value.clone())])),
        _ => None,
    });

    let render_to = scope
        .matches
        .iter()
        .position(|m| errors.contains_key(m.id()))
        .unwrap_or(scope.matches.len().saturating_sub(1));
    let rendered = &scope.matches[..=render_to];

    let ui_matches: Vec<UiMatch> = rendered
        .iter()
        .map(|m| UiMatch {
            id: m.id().to_string(),
            pathname: m.pathname.clone(),
            params: m.params.clone(),
            data: state
                .loader_data
                .get(m.id())
                .cloned()
                .unwrap_or(Value::Undefined),
            error: errors.get(m.id()).cloned(),
        })
        .collect();
    state.errors = (!errors.is_empty()).then_some(errors);

    let ui = UiScope {
        location: Location::from_url(scope.request().url()),
        matches: Arc::from(ui_matches.clone()),
    };
    let mut meta = Vec::new();
    let mut links = Vec::new();
    for (i, m) in rendered.iter().enumerate() {
        if let Some(meta_fn) = &m.route.module.meta {
            meta = meta_fn(derived.args().meta(&ui, i, meta.clone()));
        }
        if let Some(links_fn) = &m.route.module.links {
            links.extend(links_fn(derived.args().links(&ui, i)));
        }
    }

    let url = scope.request().url().to_string();
    let server_handoff = create_server_handoff_string(&ServerHandoff {
        state: &state,
        critical_css: derived.build.critical_css.as_deref(),
        url: &url,
        future: &derived.build.future,
        is_spa_mode: derived.build.is_spa_mode,
    })?;

    let mut headers = aggregated.headers().clone();
    headers.insert(
        header::CONTENT_TYPE,
        HeaderValue::from_static("text/html; charset=utf-8"),
    );
    let status = aggregated.status();
    let cx = DocumentContext {
        url: scope.request().url().clone(),
        status,
        headers: headers.clone(),
        server_handoff,
        state,
        matches: ui_matches,
        meta,
        links,
        future: derived.build.future.clone(),
        is_spa_mode: derived.build.is_spa_mode,
    };

    match render(cx).await {
        Ok(html) => Ok(HandlerResponse {
            status,
            headers,
            body: ResponseBody::Full(Bytes::from(html)),
        }),
        Err(error) => {
            dispatch.report_error(&scope, &error);
            Err(HandlerError::Render(sanitize_error(&error, derived.mode)))
        }
    }
}
