//! Path pattern matching.
//!
//! # Responsibilities
//! - Parse route path patterns into segments (static, `:param`, `*`)
//! - Explode optional segments (`:id?`, `static?`) into concrete variants
//! - Score branches by specificity and match a pathname against one branch
//!
//! # Design Decisions
//! - Static segments compare case-insensitively unless the route opts in
//! - Params are percent-decoded, the matched pathnames are not
//! - No regex; a branch is matched by walking its segments once

use percent_encoding::percent_decode_str;

use crate::args::Params;

const STATIC_SEGMENT_VALUE: i32 = 10;
const DYNAMIC_SEGMENT_VALUE: i32 = 3;
const EMPTY_SEGMENT_VALUE: i32 = 1;
const INDEX_ROUTE_VALUE: i32 = 2;
const SPLAT_PENALTY: i32 = -2;

/// Key under which a splat's remainder is stored.
pub const SPLAT_PARAM: &str = "*";

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Segment {
    Static(String),
    Dynamic(String),
    Splat,
}

/// Parse a relative path pattern with no optional markers left in it.
pub fn parse_segments(path: &str) -> Vec<Segment> {
    path.split('/')
        .filter(|s| !s.is_empty())
        .map(|s| {
            if s == "*" {
                Segment::Splat
            } else if let Some(name) = s.strip_prefix(':') {
                Segment::Dynamic(name.to_string())
            } else {
                Segment::Static(s.to_string())
            }
        })
        .collect()
}

/// Expand every optional segment into the variants with and without it.
/// Variants that keep a segment come before variants that drop it.
///
/// `a/:b?/c?` → `a/:b/c`, `a/:b`, `a/c`, `a`
pub fn explode_optional(path: &str) -> Vec<String> {
    let segments: Vec<&str> = path.split('/').filter(|s| !s.is_empty()).collect();
    explode(&segments)
        .into_iter()
        .map(|variant| variant.join("/"))
        .collect()
}

fn explode<'a>(segments: &[&'a str]) -> Vec<Vec<&'a str>> {
    let Some((first, rest)) = segments.split_first() else {
        return vec![Vec::new()];
    };
    let optional = first.ends_with('?');
    let required = first.trim_end_matches('?');
    let tails = explode(rest);

    let mut variants: Vec<Vec<&str>> = tails
        .iter()
        .map(|tail| {
            let mut v = Vec::with_capacity(tail.len() + 1);
            v.push(required);
            v.extend(tail.iter().copied());
            v
        })
        .collect();
    if optional {
        variants.extend(tails);
    }
    variants
}

/// Join a parent pattern and a relative pattern into an absolute one.
pub fn join_paths(parent: &str, relative: &str) -> String {
    let joined = format!("{}/{}", parent, relative);
    let mut out = String::with_capacity(joined.len());
    for c in joined.chars() {
        if c == '/' && out.ends_with('/') {
            continue;
        }
        out.push(c);
    }
    out
}

/// Specificity score of an absolute pattern. Higher ranks first.
pub fn compute_score(pattern: &str, index: bool) -> i32 {
    let segments: Vec<&str> = pattern.split('/').collect();
    let mut score = segments.len() as i32;
    if segments.contains(&"*") {
        score += SPLAT_PENALTY;
    }
    if index {
        score += INDEX_ROUTE_VALUE;
    }
    segments
        .iter()
        .filter(|s| **s != "*")
        .fold(score, |acc, s| {
            acc + if s.starts_with(':') {
                DYNAMIC_SEGMENT_VALUE
            } else if s.is_empty() {
                EMPTY_SEGMENT_VALUE
            } else {
                STATIC_SEGMENT_VALUE
            }
        })
}

/// One route's slice of a branch.
#[derive(Debug, Clone)]
pub struct BranchRoute {
    /// Position of the route in its tree.
    pub route: usize,
    pub segments: Vec<Segment>,
    pub case_sensitive: bool,
}

/// A root-to-leaf chain of routes that can match a pathname.
#[derive(Debug, Clone)]
pub struct Branch {
    pub pattern: String,
    pub score: i32,
    pub routes: Vec<BranchRoute>,
}

/// Order branches by descending score. The sort is stable so ties keep
/// declaration order.
pub fn rank_branches(branches: &mut [Branch]) {
    branches.sort_by(|a, b| b.score.cmp(&a.score));
}

/// Per-route result of a successful branch match.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RouteSlice {
    pub route: usize,
    pub pathname: String,
    pub pathname_base: String,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BranchMatch {
    pub slices: Vec<RouteSlice>,
    pub params: Params,
}

/// Match `pathname` against every segment of `branch`. Each route but the
/// last matches a prefix; the last must consume the whole pathname unless
/// it ends in a splat.
pub fn match_branch(branch: &Branch, pathname: &str) -> Option<BranchMatch> {
    let parts: Vec<&str> = pathname.split('/').filter(|s| !s.is_empty()).collect();
    let mut consumed = 0;
    let mut params = Params::new();
    let mut slices = Vec::with_capacity(branch.routes.len());

    for route in &branch.routes {
        let mut base = consumed;
        for segment in &route.segments {
            match segment {
                Segment::Splat => {
                    base = consumed;
                    params.insert(SPLAT_PARAM.to_string(), decode(&parts[consumed..].join("/")));
                    consumed = parts.len();
                }
                Segment::Dynamic(name) => {
                    let part = parts.get(consumed)?;
                    params.insert(name.clone(), decode(part));
                    consumed += 1;
                    base = consumed;
                }
                Segment::Static(expected) => {
                    let part = parts.get(consumed)?;
                    let equal = if route.case_sensitive {
                        part == expected
                    } else {
                        part.eq_ignore_ascii_case(expected)
                    };
                    if !equal {
                        return None;
                    }
                    consumed += 1;
                    base = consumed;
                }
            }
        }
        slices.push(RouteSlice {
            route: route.route,
            pathname: to_pathname(&parts[..consumed]),
            pathname_base: to_pathname(&parts[..base]),
        });
    }

    if consumed != parts.len() {
        return None;
    }
    Some(BranchMatch { slices, params })
}

fn to_pathname(parts: &[&str]) -> String {
    format!("/{}", parts.join("/"))
}

fn decode(value: &str) -> String {
    percent_decode_str(value).decode_utf8_lossy().into_owned()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn branch(pattern: &str, routes: Vec<(&str, bool)>) -> Branch {
        Branch {
            pattern: pattern.to_string(),
            score: compute_score(pattern, false),
            routes: routes
                .into_iter()
                .enumerate()
                .map(|(i, (path, case_sensitive))| BranchRoute {
                    route: i,
                    segments: parse_segments(path),
                    case_sensitive,
                })
                .collect(),
        }
    }

    #[test]
    fn test_explode_optional_segments() {
        assert_eq!(explode_optional("a/:b?/c?"), ["a/:b/c", "a/:b", "a/c", "a"]);
        assert_eq!(explode_optional(":lang?"), [":lang", ""]);
        assert_eq!(explode_optional("plain"), ["plain"]);
    }

    #[test]
    fn test_scores() {
        assert_eq!(compute_score("/", false), 4);
        assert_eq!(compute_score("/", true), 6);
        assert_eq!(compute_score("/data", false), 13);
        assert_eq!(compute_score("/users/:id", false), 17);
        assert_eq!(compute_score("/files/*", false), 12);
        assert!(compute_score("/users/new", false) > compute_score("/users/:id", false));
    }

    #[test]
    fn test_join_paths() {
        assert_eq!(join_paths("", ""), "/");
        assert_eq!(join_paths("/", "data"), "/data");
        assert_eq!(join_paths("/users", ":id"), "/users/:id");
    }

    #[test]
    fn test_match_dynamic_and_decode() {
        let b = branch("/users/:id", vec![("", false), ("users", false), (":id", false)]);
        let m = match_branch(&b, "/users/a%20b").unwrap();
        assert_eq!(m.params.get("id").map(String::as_str), Some("a b"));
        assert_eq!(m.slices[0].pathname, "/");
        assert_eq!(m.slices[1].pathname, "/users");
        assert_eq!(m.slices[2].pathname, "/users/a%20b");
        assert!(match_branch(&b, "/users").is_none());
        assert!(match_branch(&b, "/users/1/extra").is_none());
    }

    #[test]
    fn test_match_splat() {
        let b = branch("/files/*", vec![("files/*", false)]);
        let m = match_branch(&b, "/files/a/b.txt").unwrap();
        assert_eq!(m.params.get(SPLAT_PARAM).map(String::as_str), Some("a/b.txt"));
        assert_eq!(m.slices[0].pathname, "/files/a/b.txt");
        assert_eq!(m.slices[0].pathname_base, "/files");

        let empty = match_branch(&b, "/files").unwrap();
        assert_eq!(empty.params.get(SPLAT_PARAM).map(String::as_str), Some(""));
    }

    #[test]
    fn test_case_sensitivity() {
        let insensitive = branch("/About", vec![("About", false)]);
        assert!(match_branch(&insensitive, "/about").is_some());

        let sensitive = branch("/About", vec![("About", true)]);
        assert!(match_branch(&sensitive, "/about").is_none());
        assert!(match_branch(&sensitive, "/About").is_some());
    }

    #[test]
    fn test_trailing_slash_is_ignored() {
        let b = branch("/data", vec![("data", false)]);
        assert!(match_branch(&b, "/data/").is_some());
    }
}
