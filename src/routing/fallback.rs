//! Fallback/404 decision for paths without a pre-generated page.

use crate::routing::router::RouteTable;

/// Outcome of the fallback check.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FallbackDecision {
    /// Answer 404 without rendering.
    NotFound,
    /// Continue through the pipeline.
    PassThrough,
}

/// Decide whether `path` (locale-less) must 404.
///
/// A path is rejected only when all of these hold:
/// - it matches a dynamic route declared without fallback
/// - it was not pre-generated
/// - no static route and no fallback-enabled dynamic route matches it
pub fn resolve_fallback(table: &RouteTable, path: &str) -> FallbackDecision {
    if table.is_prerendered(path) || table.match_static(path).is_some() {
        return FallbackDecision::PassThrough;
    }

    let mut blocked = false;
    for route in table.dynamic_matches(path) {
        if route.fallback {
            return FallbackDecision::PassThrough;
        }
        blocked = true;
    }

    if blocked {
        FallbackDecision::NotFound
    } else {
        FallbackDecision::PassThrough
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{RouteConfig, RouteKindConfig};

    fn route(page: &str, fallback: bool, prerendered: &[&str]) -> RouteConfig {
        RouteConfig {
            page: page.into(),
            kind: RouteKindConfig::Dynamic,
            page_id: None,
            fallback,
            prerendered: prerendered.iter().map(|p| p.to_string()).collect(),
            revalidate: None,
        }
    }

    #[test]
    fn test_no_fallback_unknown_id_is_404() {
        let table =
            RouteTable::from_config(&[route("/products/[id]", false, &["/products/1"])], None)
                .unwrap();
        assert_eq!(resolve_fallback(&table, "/products/999"), FallbackDecision::NotFound);
        assert_eq!(resolve_fallback(&table, "/products/1"), FallbackDecision::PassThrough);
    }

    #[test]
    fn test_other_route_rescues_path() {
        let table = RouteTable::from_config(
            &[
                route("/products/[id]", false, &[]),
                route("/[...slug]", true, &[]),
            ],
            None,
        )
        .unwrap();
        assert_eq!(resolve_fallback(&table, "/products/999"), FallbackDecision::PassThrough);
    }

    #[test]
    fn test_unmatched_path_passes_through() {
        let table = RouteTable::from_config(&[route("/products/[id]", false, &[])], None).unwrap();
        assert_eq!(resolve_fallback(&table, "/about"), FallbackDecision::PassThrough);
    }
}
