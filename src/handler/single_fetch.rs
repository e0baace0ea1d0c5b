//! Single-fetch endpoint: `<path>.data[?_routes=a,b]`.
//!
//! GET runs the loaders (optionally scoped by `_routes`) and answers with a
//! route id → entry map. A mutation runs only the action; the client then
//! issues its own revalidation GET. Errors are keyed at the throwing route.

use url::Url;

use super::{without_search_param, Dispatch, HandlerError, HandlerResponse};
use crate::aggregate::ErrorPlacement;
use crate::args::{LoadContext, RouteRequest};
use crate::codec;
use crate::executor::RouteFilter;

/// `/_root.data` addresses `/`; any other `<path>.data` addresses `<path>`.
pub(crate) fn target_url(url: &Url) -> Url {
    let path = url.path();
    let stripped = if path == "/_root.data" {
        "/"
    } else {
        path.strip_suffix(".data").unwrap_or(path)
    };
    let mut out = without_search_param(url, "_routes");
    out.set_path(stripped);
    out
}

pub(super) async fn handle(
    dispatch: &Dispatch<'_>,
    request: RouteRequest,
    context: LoadContext,
) -> Result<HandlerResponse, HandlerError> {
    let filter = RouteFilter::from_param(request.search_param("_routes").as_deref());
    let request = request.with_url(target_url(request.url()));
    let mutation = request.is_mutation();
    let (scope, unmatched) = dispatch.scope(request, context);
    let aggregator = dispatch.aggregator(&scope);

    let aggregated = match unmatched {
        Some(run) => aggregator.loaders(&run, None, ErrorPlacement::Thrower),
        None if mutation => {
            let executor = &dispatch.derived.executor;
            match executor.act(&scope).await {
                Some(action) => {
                    dispatch.report(&scope, [&action]);
                    aggregator.action(&action)
                }
                None => aggregator.loaders(&Default::default(), None, ErrorPlacement::Thrower),
            }
        }
        None => {
            let run = dispatch.derived.executor.load(&scope, &filter).await;
            dispatch.report(&scope, run.outcomes.iter());
            aggregator.loaders(&run, None, ErrorPlacement::Thrower)
        }
    };

    tracing::debug!(
        path = %scope.request().pathname(),
        status = %aggregated.status(),
        redirect = aggregated.redirect().map(|r| r.location.as_str()),
        "Single fetch response"
    );
    Ok(codec::encode_response(&aggregated)?.into())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_target_url() {
        let url = Url::parse("http://x/_root.data?_routes=root").unwrap();
        assert_eq!(target_url(&url).as_str(), "http://x/");
        let url = Url::parse("http://x/users/1.data?tab=a&_routes=root").unwrap();
        assert_eq!(target_url(&url).as_str(), "http://x/users/1?tab=a");
    }
}
