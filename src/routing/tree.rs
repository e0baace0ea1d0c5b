//! Route tree: the immutable set of route records owned by a build.
//!
//! # Responsibilities
//! - Validate records (unique ids, existing parents, a single root)
//! - Flatten the tree into ranked branches once, at construction
//! - Resolve a pathname to its root-to-leaf matches
//!
//! # Design Decisions
//! - Pathless layouts never form a branch of their own
//! - Children are flattened before their parent so deeper branches win ties
//! - Every violation is reported at once, like config validation

use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;

use thiserror::Error;

use super::matcher::{self, Branch, BranchRoute};
use super::module::RouteModule;
use crate::args::{Params, RouteMatchInfo};

/// A single route as declared by the application.
#[derive(Debug, Clone)]
pub struct RouteRecord {
    pub id: String,
    pub parent_id: Option<String>,
    /// Pattern relative to the parent. `None` for pathless layouts.
    pub path: Option<String>,
    pub index: bool,
    pub case_sensitive: bool,
    pub module: RouteModule,
}

impl RouteRecord {
    pub fn new(id: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            parent_id: None,
            path: None,
            index: false,
            case_sensitive: false,
            module: RouteModule::default(),
        }
    }

    pub fn parent(mut self, parent_id: impl Into<String>) -> Self {
        self.parent_id = Some(parent_id.into());
        self
    }

    pub fn path(mut self, path: impl Into<String>) -> Self {
        self.path = Some(path.into());
        self
    }

    pub fn index(mut self) -> Self {
        self.index = true;
        self
    }

    pub fn case_sensitive(mut self) -> Self {
        self.case_sensitive = true;
        self
    }

    pub fn module(mut self, module: RouteModule) -> Self {
        self.module = module;
        self
    }

    pub fn has_loader(&self) -> bool {
        self.module.loader.is_some()
    }

    pub fn has_action(&self) -> bool {
        self.module.action.is_some()
    }
}

/// A route record matched against a concrete pathname.
#[derive(Debug, Clone)]
pub struct MatchedRoute {
    pub route: Arc<RouteRecord>,
    pub params: Params,
    pub pathname: String,
    pub pathname_base: String,
}

impl MatchedRoute {
    pub fn id(&self) -> &str {
        &self.route.id
    }

    pub fn info(&self) -> RouteMatchInfo {
        RouteMatchInfo {
            id: self.route.id.clone(),
            pathname: self.pathname.clone(),
            params: self.params.clone(),
        }
    }
}

/// A single structural problem in a route tree.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum RouteTreeError {
    #[error("duplicate route id `{0}`")]
    DuplicateId(String),

    #[error("route `{id}` references missing parent `{parent}`")]
    MissingParent { id: String, parent: String },

    #[error("route tree has no root route")]
    NoRoot,

    #[error("route tree has more than one root: {0:?}")]
    MultipleRoots(Vec<String>),

    #[error("index route `{0}` cannot have children")]
    IndexWithChildren(String),

    #[error("route `{0}` is not reachable from the root")]
    Unreachable(String),
}

/// Every problem found while building a route tree.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InvalidRouteTree(pub Vec<RouteTreeError>);

impl fmt::Display for InvalidRouteTree {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "invalid route tree:")?;
        for err in &self.0 {
            write!(f, "\n  - {}", err)?;
        }
        Ok(())
    }
}

impl std::error::Error for InvalidRouteTree {}

/// Validated, flattened route tree.
#[derive(Debug)]
pub struct RouteTree {
    routes: Vec<Arc<RouteRecord>>,
    by_id: HashMap<String, usize>,
    children: Vec<Vec<usize>>,
    root: usize,
    branches: Vec<Branch>,
}

impl RouteTree {
    pub fn new(records: Vec<RouteRecord>) -> Result<Self, InvalidRouteTree> {
        let mut errors = Vec::new();
        let mut by_id = HashMap::new();
        for (i, record) in records.iter().enumerate() {
            if by_id.insert(record.id.clone(), i).is_some() {
                errors.push(RouteTreeError::DuplicateId(record.id.clone()));
            }
        }

        let mut roots = Vec::new();
        let mut children = vec![Vec::new(); records.len()];
        for (i, record) in records.iter().enumerate() {
            match &record.parent_id {
                None => roots.push(i),
                Some(parent) => match by_id.get(parent) {
                    Some(&p) => children[p].push(i),
                    None => errors.push(RouteTreeError::MissingParent {
                        id: record.id.clone(),
                        parent: parent.clone(),
                    }),
                },
            }
        }

        for (i, record) in records.iter().enumerate() {
            if record.index && !children[i].is_empty() {
                errors.push(RouteTreeError::IndexWithChildren(record.id.clone()));
            }
        }

        let root = match roots.as_slice() {
            [] => {
                errors.push(RouteTreeError::NoRoot);
                None
            }
            [root] => Some(*root),
            many => {
                errors.push(RouteTreeError::MultipleRoots(
                    many.iter().map(|&i| records[i].id.clone()).collect(),
                ));
                None
            }
        };

        if let Some(root) = root {
            let mut reachable = vec![false; records.len()];
            let mut stack = vec![root];
            while let Some(i) = stack.pop() {
                if std::mem::replace(&mut reachable[i], true) {
                    continue;
                }
                stack.extend(children[i].iter().copied());
            }
            for (i, record) in records.iter().enumerate() {
                let parent_known = record
                    .parent_id
                    .as_ref()
                    .is_some_and(|p| by_id.contains_key(p));
                if !reachable[i] && parent_known {
                    errors.push(RouteTreeError::Unreachable(record.id.clone()));
                }
            }
        }

        let root = match root {
            Some(root) if errors.is_empty() => root,
            _ => return Err(InvalidRouteTree(errors)),
        };

        let routes: Vec<Arc<RouteRecord>> = records.into_iter().map(Arc::new).collect();
        let mut branches = Vec::new();
        flatten(&routes, &children, root, "", &[], &mut branches);
        matcher::rank_branches(&mut branches);

        tracing::debug!(routes = routes.len(), branches = branches.len(), "Route tree built");

        Ok(Self {
            routes,
            by_id,
            children,
            root,
            branches,
        })
    }

    pub fn get(&self, id: &str) -> Option<&Arc<RouteRecord>> {
        self.by_id.get(id).map(|&i| &self.routes[i])
    }

    pub fn root(&self) -> &Arc<RouteRecord> {
        &self.routes[self.root]
    }

    pub fn routes(&self) -> impl Iterator<Item = &Arc<RouteRecord>> {
        self.routes.iter()
    }

    pub fn len(&self) -> usize {
        self.routes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.routes.is_empty()
    }

    pub fn children(&self, id: &str) -> Vec<&Arc<RouteRecord>> {
        self.by_id
            .get(id)
            .map(|&i| self.children[i].iter().map(|&c| &self.routes[c]).collect())
            .unwrap_or_default()
    }

    /// Patterns of every branch in ranking order.
    pub fn patterns(&self) -> impl Iterator<Item = &str> {
        self.branches.iter().map(|b| b.pattern.as_str())
    }

    /// The root route standing in for a URL nothing matched, so the miss
    /// can be reported at the root boundary.
    pub fn root_match(&self) -> MatchedRoute {
        MatchedRoute {
            route: self.root().clone(),
            params: Params::new(),
            pathname: "/".into(),
            pathname_base: "/".into(),
        }
    }

    /// Resolve `pathname` to its matches, root first. A miss is `None`.
    pub fn matches(&self, pathname: &str) -> Option<Vec<MatchedRoute>> {
        self.branches.iter().find_map(|branch| {
            let found = matcher::match_branch(branch, pathname)?;
            Some(
                found
                    .slices
                    .into_iter()
                    .map(|slice| MatchedRoute {
                        route: self.routes[slice.route].clone(),
                        params: found.params.clone(),
                        pathname: slice.pathname,
                        pathname_base: slice.pathname_base,
                    })
                    .collect(),
            )
        })
    }

    /// Index of the closest match at or above `index` that renders an error
    /// boundary. The root always renders one.
    pub fn nearest_boundary(matches: &[MatchedRoute], index: usize) -> usize {
        matches[..=index.min(matches.len().saturating_sub(1))]
            .iter()
            .rposition(|m| m.route.module.has_error_boundary)
            .unwrap_or(0)
    }
}

fn flatten(
    routes: &[Arc<RouteRecord>],
    children: &[Vec<usize>],
    at: usize,
    parent_path: &str,
    parent_chain: &[BranchRoute],
    out: &mut Vec<Branch>,
) {
    let record = &routes[at];
    let variants = match &record.path {
        Some(path) => matcher::explode_optional(path),
        None => vec![String::new()],
    };

    for relative in variants {
        let pattern = matcher::join_paths(parent_path, &relative);
        let mut chain = parent_chain.to_vec();
        chain.push(BranchRoute {
            route: at,
            segments: matcher::parse_segments(&relative),
            case_sensitive: record.case_sensitive,
        });

        for &child in &children[at] {
            flatten(routes, children, child, &pattern, &chain, out);
        }

        if record.path.is_none() && !record.index {
            continue;
        }
        out.push(Branch {
            score: matcher::compute_score(&pattern, record.index),
            pattern,
            routes: chain,
        });
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn tree() -> RouteTree {
        RouteTree::new(vec![
            RouteRecord::new("root").path(""),
            RouteRecord::new("routes/_index").parent("root").index(),
            RouteRecord::new("routes/data").parent("root").path("data"),
            RouteRecord::new("routes/_layout").parent("root"),
            RouteRecord::new("routes/_layout.users.$id")
                .parent("routes/_layout")
                .path("users/:id"),
            RouteRecord::new("routes/users.new").parent("root").path("users/new"),
            RouteRecord::new("routes/$lang.docs").parent("root").path(":lang?/docs"),
            RouteRecord::new("routes/files.$").parent("root").path("files/*"),
        ])
        .unwrap()
    }

    fn ids(matches: &[MatchedRoute]) -> Vec<&str> {
        matches.iter().map(MatchedRoute::id).collect()
    }

    #[test]
    fn test_index_route_wins_at_root() {
        let t = tree();
        let m = t.matches("/").unwrap();
        assert_eq!(ids(&m), ["root", "routes/_index"]);
    }

    #[test]
    fn test_matches_are_root_to_leaf_and_stable() {
        let t = tree();
        let first = t.matches("/users/42").unwrap();
        assert_eq!(ids(&first), ["root", "routes/_layout", "routes/_layout.users.$id"]);
        assert_eq!(first[2].params.get("id").map(String::as_str), Some("42"));

        let second = t.matches("/users/42").unwrap();
        assert_eq!(ids(&first), ids(&second));
    }

    #[test]
    fn test_static_beats_dynamic() {
        let t = tree();
        assert_eq!(ids(&t.matches("/users/new").unwrap()), ["root", "routes/users.new"]);
    }

    #[test]
    fn test_optional_segments() {
        let t = tree();
        let with = t.matches("/en/docs").unwrap();
        assert_eq!(with[1].params.get("lang").map(String::as_str), Some("en"));
        let without = t.matches("/docs").unwrap();
        assert_eq!(ids(&without), ["root", "routes/$lang.docs"]);
        assert!(without[1].params.get("lang").is_none());
    }

    #[test]
    fn test_splat_and_miss() {
        let t = tree();
        let m = t.matches("/files/a/b").unwrap();
        assert_eq!(m[1].params.get("*").map(String::as_str), Some("a/b"));
        assert!(t.matches("/nope/really").is_none());
    }

    #[test]
    fn test_pathless_layout_does_not_match_alone() {
        let t = RouteTree::new(vec![
            RouteRecord::new("root").path(""),
            RouteRecord::new("layout").parent("root"),
        ])
        .unwrap();
        assert_eq!(ids(&t.matches("/").unwrap()), ["root"]);
    }

    #[test]
    fn test_nearest_boundary() {
        let t = RouteTree::new(vec![
            RouteRecord::new("root").path(""),
            RouteRecord::new("a")
                .parent("root")
                .path("a")
                .module(RouteModule::new().error_boundary()),
            RouteRecord::new("b").parent("a").path("b"),
        ])
        .unwrap();
        let m = t.matches("/a/b").unwrap();
        assert_eq!(RouteTree::nearest_boundary(&m, 2), 1);
        assert_eq!(RouteTree::nearest_boundary(&m, 0), 0);
    }

    #[test]
    fn test_validation_reports_every_error() {
        let err = RouteTree::new(vec![
            RouteRecord::new("root").path(""),
            RouteRecord::new("root").path("dup"),
            RouteRecord::new("orphan").parent("missing"),
        ])
        .unwrap_err();
        assert!(err.0.contains(&RouteTreeError::DuplicateId("root".into())));
        assert!(err.0.contains(&RouteTreeError::MissingParent {
            id: "orphan".into(),
            parent: "missing".into(),
        }));
        assert!(err.0.iter().any(|e| matches!(e, RouteTreeError::MultipleRoots(_))));
    }
}
