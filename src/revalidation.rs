//! Revalidation policy: which loaders reload on a navigation.
//!
//! # Responsibilities
//! - Decide, per next-match route with a server loader, whether it loads
//! - Turn the decisions into the `_routes` filter of the data request
//!
//! # Design Decisions
//! - Pure function over an explicit [`Snapshot`]; no router state
//! - Routes new to the match set always load; that is not a choice
//! - A route's `shouldRevalidate` answer is authoritative over the default
//!
//! # `_routes`
//! ```text
//! nothing loads                        → no request at all
//! loading ids == every matched route   → no `_routes` param
//! otherwise                            → `_routes=a,b` (match order)
//! ```

use axum::http::Method;
use url::Url;

use crate::codec::Value;
use crate::routing::{MatchedRoute, ShouldRevalidateArgs};

/// The mutation that preceded a navigation.
#[derive(Debug, Clone)]
pub struct Submission {
    pub method: Method,
    pub action_route: String,
    pub action_status: Option<u16>,
    pub action_result: Option<Value>,
}

/// Everything a revalidation decision may look at.
#[derive(Debug, Clone, Copy)]
pub struct Snapshot<'a> {
    pub current_matches: &'a [MatchedRoute],
    pub next_matches: &'a [MatchedRoute],
    pub current_url: &'a Url,
    pub next_url: &'a Url,
    pub submission: Option<&'a Submission>,
    /// Set when the server answered with `X-Remix-Revalidate`.
    pub force: bool,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Reason {
    /// Route was not matched before.
    New,
    Default,
    ShouldRevalidate,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RevalidationDecision {
    pub route_id: String,
    pub load: bool,
    pub reason: Reason,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RevalidationPlan {
    /// One entry per next-match route with a server loader, in match order.
    pub decisions: Vec<RevalidationDecision>,
    /// Whether any data request is needed.
    pub fetch: bool,
    /// Comma-joined `_routes` value, absent when every route loads.
    pub routes_param: Option<String>,
}

impl RevalidationPlan {
    pub fn should_load(&self, route_id: &str) -> bool {
        self.decisions
            .iter()
            .any(|d| d.route_id == route_id && d.load)
    }

    pub fn loading(&self) -> impl Iterator<Item = &str> {
        self.decisions
            .iter()
            .filter(|d| d.load)
            .map(|d| d.route_id.as_str())
    }
}

/// Default answer for a route matched both before and after.
pub fn default_should_revalidate(
    snapshot: &Snapshot<'_>,
    current: &MatchedRoute,
    next: &MatchedRoute,
) -> bool {
    if let Some(submission) = snapshot.submission {
        return submission.action_status.map_or(true, |s| s < 400);
    }
    if snapshot.force {
        return true;
    }
    let same_url = snapshot.current_url.path() == snapshot.next_url.path()
        && snapshot.current_url.query() == snapshot.next_url.query();
    same_url
        || snapshot.current_url.query() != snapshot.next_url.query()
        || current.pathname != next.pathname
        || own_params_changed(current, next)
}

/// Every match carries the full param set; a route only cares about the
/// params its own pattern declares.
fn own_params_changed(current: &MatchedRoute, next: &MatchedRoute) -> bool {
    let pattern = next.route.path.as_deref().unwrap_or_default();
    pattern
        .split('/')
        .filter_map(|segment| match segment {
            "*" => Some("*"),
            s => s.strip_prefix(':').map(|name| name.trim_end_matches('?')),
        })
        .any(|name| current.params.get(name) != next.params.get(name))
}

pub fn plan(snapshot: &Snapshot<'_>) -> RevalidationPlan {
    let decisions: Vec<RevalidationDecision> = snapshot
        .next_matches
        .iter()
        .filter(|m| m.route.has_loader())
        .map(|next| decide(snapshot, next))
        .collect();

    let loading: Vec<&str> = decisions
        .iter()
        .filter(|d| d.load)
        .map(|d| d.route_id.as_str())
        .collect();
    let fetch = !loading.is_empty();
    let everything = loading.len() == snapshot.next_matches.len()
        && snapshot
            .next_matches
            .iter()
            .all(|m| loading.contains(&m.id()));
    let routes_param = (fetch && !everything).then(|| loading.join(","));

    tracing::debug!(
        next_url = %snapshot.next_url,
        loading = ?loading,
        routes = ?routes_param,
        "Revalidation planned"
    );

    RevalidationPlan {
        decisions,
        fetch,
        routes_param,
    }
}

fn decide(snapshot: &Snapshot<'_>, next: &MatchedRoute) -> RevalidationDecision {
    let route_id = next.id().to_string();
    let Some(current) = snapshot
        .current_matches
        .iter()
        .find(|m| m.id() == next.id())
    else {
        return RevalidationDecision {
            route_id,
            load: true,
            reason: Reason::New,
        };
    };

    let default = default_should_revalidate(snapshot, current, next);
    match &next.route.module.should_revalidate {
        Some(should_revalidate) => {
            let args = ShouldRevalidateArgs {
                current_url: snapshot.current_url.clone(),
                next_url: snapshot.next_url.clone(),
                current_params: current.params.clone(),
                next_params: next.params.clone(),
                form_method: snapshot.submission.map(|s| s.method.clone()),
                action_result: snapshot.submission.and_then(|s| s.action_result.clone()),
                action_status: snapshot.submission.and_then(|s| s.action_status),
                default_should_revalidate: default,
            };
            RevalidationDecision {
                route_id,
                load: should_revalidate(&args),
                reason: Reason::ShouldRevalidate,
            }
        }
        None => RevalidationDecision {
            route_id,
            load: default,
            reason: Reason::Default,
        },
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::codec::Value;
    use crate::response::{HandlerResult, Returned};
    use crate::routing::{RouteModule, RouteRecord, RouteTree};

    async fn ok() -> HandlerResult {
        Ok(Returned::Data(Value::Null))
    }

    fn tree() -> RouteTree {
        RouteTree::new(vec![
            RouteRecord::new("root")
                .path("")
                .module(RouteModule::new().loader(|_| ok())),
            RouteRecord::new("routes/a")
                .parent("root")
                .path("a")
                .module(RouteModule::new().loader(|_| ok()).action(|_| ok())),
            RouteRecord::new("routes/b").parent("root").path("b").module(
                RouteModule::new()
                    .loader(|_| ok())
                    .should_revalidate(|_| false),
            ),
            RouteRecord::new("routes/c").parent("root").path("c/:id").module(
                RouteModule::new().loader(|_| ok()),
            ),
            RouteRecord::new("routes/static").parent("root").path("static"),
        ])
        .unwrap()
    }

    fn url(path: &str) -> Url {
        Url::parse(&format!("http://localhost{}", path)).unwrap()
    }

    fn submission(status: u16) -> Submission {
        Submission {
            method: Method::POST,
            action_route: "routes/a".into(),
            action_status: Some(status),
            action_result: Some(Value::from("DATA")),
        }
    }

    #[test]
    fn test_successful_submission_revalidates_everything() {
        let t = tree();
        let m = t.matches("/a").unwrap();
        let (cur, next) = (url("/a"), url("/a"));
        let sub = submission(200);
        let p = plan(&Snapshot {
            current_matches: &m,
            next_matches: &m,
            current_url: &cur,
            next_url: &next,
            submission: Some(&sub),
            force: false,
        });
        assert!(p.fetch);
        assert_eq!(p.routes_param, None);
        assert_eq!(p.loading().collect::<Vec<_>>(), ["root", "routes/a"]);
    }

    #[test]
    fn test_error_status_suppresses_revalidation() {
        let t = tree();
        let m = t.matches("/a").unwrap();
        let (cur, next) = (url("/a"), url("/a"));
        for status in [400, 500] {
            let sub = submission(status);
            let p = plan(&Snapshot {
                current_matches: &m,
                next_matches: &m,
                current_url: &cur,
                next_url: &next,
                submission: Some(&sub),
                force: false,
            });
            assert!(!p.fetch);
            assert_eq!(p.routes_param, None);
        }
    }

    #[test]
    fn test_should_revalidate_opt_out_scopes_routes() {
        let t = tree();
        let m = t.matches("/b").unwrap();
        let (cur, next) = (url("/b"), url("/b"));
        let sub = submission(200);
        let p = plan(&Snapshot {
            current_matches: &m,
            next_matches: &m,
            current_url: &cur,
            next_url: &next,
            submission: Some(&sub),
            force: false,
        });
        assert!(p.fetch);
        assert_eq!(p.routes_param.as_deref(), Some("root"));
        assert!(!p.should_load("routes/b"));
        assert_eq!(p.decisions[1].reason, Reason::ShouldRevalidate);
    }

    #[test]
    fn test_navigation_loads_new_and_changed_routes_only() {
        let t = tree();
        let current = t.matches("/c/1").unwrap();
        let next = t.matches("/c/2").unwrap();
        let (cur, nxt) = (url("/c/1"), url("/c/2"));
        let p = plan(&Snapshot {
            current_matches: &current,
            next_matches: &next,
            current_url: &cur,
            next_url: &nxt,
            submission: None,
            force: false,
        });
        assert_eq!(p.routes_param.as_deref(), Some("routes/c"));

        let a = t.matches("/a").unwrap();
        let (cur, nxt) = (url("/c/1"), url("/a"));
        let p = plan(&Snapshot {
            current_matches: &current,
            next_matches: &a,
            current_url: &cur,
            next_url: &nxt,
            submission: None,
            force: false,
        });
        assert_eq!(p.routes_param.as_deref(), Some("routes/a"));
        assert_eq!(p.decisions[1].reason, Reason::New);
    }

    #[test]
    fn test_search_change_and_force_revalidate_root() {
        let t = tree();
        let m = t.matches("/a").unwrap();
        let (cur, nxt) = (url("/a"), url("/a?page=2"));
        let p = plan(&Snapshot {
            current_matches: &m,
            next_matches: &m,
            current_url: &cur,
            next_url: &nxt,
            submission: None,
            force: false,
        });
        assert_eq!(p.routes_param, None);

        let other = t.matches("/c/1").unwrap();
        let (cur, nxt) = (url("/a"), url("/c/1"));
        let p = plan(&Snapshot {
            current_matches: &m,
            next_matches: &other,
            current_url: &cur,
            next_url: &nxt,
            submission: None,
            force: true,
        });
        assert_eq!(p.routes_param, None);
    }

    #[test]
    fn test_loaderless_route_forces_routes_param() {
        let t = tree();
        let m = t.matches("/static").unwrap();
        let (cur, nxt) = (url("/static"), url("/static"));
        let p = plan(&Snapshot {
            current_matches: &m,
            next_matches: &m,
            current_url: &cur,
            next_url: &nxt,
            submission: None,
            force: false,
        });
        assert_eq!(p.routes_param.as_deref(), Some("root"));
    }
}
