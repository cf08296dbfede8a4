// ABOUTME: Route pattern matching (":name", ":name?", "*") and specificity ranking of patterns.
// ABOUTME: Matching is segment-wise after trailing-slash normalization; ranking is a stable sort.

use std::cmp::Ordering;
use std::collections::BTreeMap;

use serde::Serialize;

/// Result of a successful [`match_route`].
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct PathMatch {
    pub params: BTreeMap<String, String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub wildcard: Option<String>,
}

fn segments(path: &str) -> Vec<&str> {
    path.split('/').filter(|s| !s.is_empty()).collect()
}

fn param_name(segment: &str) -> Option<&str> {
    segment.strip_prefix(':').map(|name| name.strip_suffix('?').unwrap_or(name))
}

fn is_optional(segment: &str) -> bool {
    segment.starts_with(':') && segment.ends_with('?')
}

/// Match `pathname` against `pattern`. Returns `None` when it does not match.
pub fn match_route(pattern: &str, pathname: &str) -> Option<PathMatch> {
    let pattern_segments = segments(pattern);
    let path_segments = segments(pathname);

    if let Some(star) = pattern_segments.iter().position(|s| *s == "*") {
        if path_segments.len() < star {
            return None;
        }
        let params = bind_exact(&pattern_segments[..star], &path_segments[..star])?;
        return Some(PathMatch {
            params,
            wildcard: Some(path_segments[star..].join("/")),
        });
    }

    let required = pattern_segments.iter().filter(|s| !is_optional(s)).count();
    if path_segments.len() < required || path_segments.len() > pattern_segments.len() {
        return None;
    }

    let mut params = BTreeMap::new();
    for (i, segment) in pattern_segments.iter().enumerate() {
        let actual = path_segments.get(i).copied();
        match (param_name(segment), actual) {
            (Some(name), Some(value)) => {
                params.insert(name.to_string(), value.to_string());
            }
            (Some(_), None) if is_optional(segment) => {}
            (None, Some(value)) if value == *segment => {}
            _ => return None,
        }
    }

    Some(PathMatch {
        params,
        wildcard: None,
    })
}

fn bind_exact(pattern: &[&str], path: &[&str]) -> Option<BTreeMap<String, String>> {
    let mut params = BTreeMap::new();
    for (segment, value) in pattern.iter().zip(path) {
        match param_name(segment) {
            Some(name) => {
                params.insert(name.to_string(), value.to_string());
            }
            None if segment == value => {}
            None => return None,
        }
    }
    Some(params)
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
enum SegmentKind {
    Literal,
    Param,
    Wildcard,
}

fn kind(segment: &str) -> SegmentKind {
    if segment == "*" {
        SegmentKind::Wildcard
    } else if segment.starts_with(':') {
        SegmentKind::Param
    } else {
        SegmentKind::Literal
    }
}

/// Ordering of two patterns by specificity: `Less` means `a` should be
/// tried first.
pub fn compare_specificity(a: &str, b: &str) -> Ordering {
    let a = segments(a);
    let b = segments(b);
    b.len().cmp(&a.len()).then_with(|| {
        a.iter()
            .zip(&b)
            .map(|(x, y)| kind(x).cmp(&kind(y)))
            .find(|o| o.is_ne())
            .unwrap_or(Ordering::Equal)
    })
}

/// Sort patterns most specific first; equally specific patterns keep
/// their input order.
pub fn rank_routes<S: AsRef<str> + Clone>(patterns: &[S]) -> Vec<S> {
    let mut ranked = patterns.to_vec();
    ranked.sort_by(|a, b| compare_specificity(a.as_ref(), b.as_ref()));
    ranked
}
