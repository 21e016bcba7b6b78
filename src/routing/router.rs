//! Route table lookup.
//!
//! # Responsibilities
//! - Store compiled routes from the build manifest
//! - Resolve a path to a static route (exact or pre-generated) or a dynamic route
//! - Answer "is this path pre-generated" for the fallback resolver
//!
//! # Design Decisions
//! - Immutable after construction (thread-safe without locks)
//! - O(1) lookup for literal pages and pre-generated paths via HashMap
//! - O(n) scan of dynamic routes, most specific first
//! - Explicit `None` rather than a silent default

use std::collections::{HashMap, HashSet};
use std::time::Duration;

use crate::config::{ConfigError, RouteConfig, RouteKindConfig};
use crate::routing::matcher::{Params, PathPattern};

/// Kind of a route.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RouteKind {
    Static,
    Dynamic,
    Api,
}

impl From<RouteKindConfig> for RouteKind {
    fn from(kind: RouteKindConfig) -> Self {
        match kind {
            RouteKindConfig::Static => RouteKind::Static,
            RouteKindConfig::Dynamic => RouteKind::Dynamic,
            RouteKindConfig::Api => RouteKind::Api,
        }
    }
}

/// Revalidate window for a route's cache entries.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Revalidate {
    /// Immutable until explicitly invalidated.
    Never,
    After(Duration),
}

impl Revalidate {
    pub fn from_secs(secs: Option<u64>) -> Self {
        match secs {
            Some(secs) => Revalidate::After(Duration::from_secs(secs)),
            None => Revalidate::Never,
        }
    }
}

/// A compiled route definition.
#[derive(Debug, Clone)]
pub struct RouteDefinition {
    pub pattern: PathPattern,
    pub kind: RouteKind,
    pub page_id: String,
    /// Dynamic routes only: render paths that were not pre-generated.
    pub fallback: bool,
    pub prerendered: HashSet<String>,
    pub revalidate: Revalidate,
}

impl RouteDefinition {
    /// Pages are cacheable, API routes are not.
    pub fn is_cacheable(&self) -> bool {
        self.kind != RouteKind::Api
    }
}

/// A route resolved for a concrete path.
#[derive(Debug, Clone)]
pub struct RouteMatch<'a> {
    pub route: &'a RouteDefinition,
    pub params: Params,
}

/// Immutable table of all routes.
#[derive(Debug, Clone, Default)]
pub struct RouteTable {
    routes: Vec<RouteDefinition>,
    /// Literal page path → route index.
    literal: HashMap<String, usize>,
    /// Pre-generated concrete path → route index.
    prerendered: HashMap<String, usize>,
    /// Parameterized routes, most specific first.
    dynamic: Vec<usize>,
}

impl RouteTable {
    /// Compile the route manifest.
    pub fn from_config(
        configs: &[RouteConfig],
        default_revalidate: Option<u64>,
    ) -> Result<Self, ConfigError> {
        let mut table = Self::default();

        for config in configs {
            let pattern = PathPattern::page(&config.page)?;
            let index = table.routes.len();

            if pattern.is_literal() {
                table.literal.insert(trim_trailing(&config.page).to_string(), index);
            } else {
                table.dynamic.push(index);
            }
            for path in &config.prerendered {
                table.prerendered.insert(trim_trailing(path).to_string(), index);
            }

            table.routes.push(RouteDefinition {
                pattern,
                kind: config.kind.into(),
                page_id: config.page_id.clone().unwrap_or_else(|| config.page.clone()),
                fallback: config.fallback,
                prerendered: config
                    .prerendered
                    .iter()
                    .map(|p| trim_trailing(p).to_string())
                    .collect(),
                revalidate: Revalidate::from_secs(config.revalidate.or(default_revalidate)),
            });
        }

        // Fewer catch-alls, then fewer params, then manifest order.
        let routes = &table.routes;
        table.dynamic.sort_by_key(|&i| {
            let params = routes[i].pattern.params();
            (
                params.iter().filter(|p| p.catch_all).count(),
                params.len(),
                i,
            )
        });

        Ok(table)
    }

    /// Literal page or pre-generated path.
    pub fn match_static(&self, path: &str) -> Option<RouteMatch<'_>> {
        let path = trim_trailing(path);
        if let Some(&index) = self.literal.get(path) {
            return Some(RouteMatch {
                route: &self.routes[index],
                params: Params::new(),
            });
        }
        let &index = self.prerendered.get(path)?;
        let route = &self.routes[index];
        Some(RouteMatch {
            route,
            params: route.pattern.matches(path).unwrap_or_default(),
        })
    }

    /// First parameterized route matching `path`.
    pub fn match_dynamic(&self, path: &str) -> Option<RouteMatch<'_>> {
        self.dynamic.iter().find_map(|&i| {
            let route = &self.routes[i];
            route
                .pattern
                .matches(path)
                .map(|params| RouteMatch { route, params })
        })
    }

    /// Every parameterized route matching `path`, most specific first.
    pub fn dynamic_matches<'a>(&'a self, path: &'a str) -> impl Iterator<Item = &'a RouteDefinition> + 'a {
        self.dynamic
            .iter()
            .map(|&i| &self.routes[i])
            .filter(move |r| r.pattern.is_match(path))
    }

    /// Static match, else dynamic match.
    pub fn resolve(&self, path: &str) -> Option<RouteMatch<'_>> {
        self.match_static(path).or_else(|| self.match_dynamic(path))
    }

    pub fn is_prerendered(&self, path: &str) -> bool {
        self.prerendered.contains_key(trim_trailing(path))
    }

    /// Literal route registered for `page`, e.g. the `/404` or `/500` page.
    pub fn page(&self, page: &str) -> Option<&RouteDefinition> {
        self.literal.get(page).map(|&i| &self.routes[i])
    }

    pub fn routes(&self) -> &[RouteDefinition] {
        &self.routes
    }
}

fn trim_trailing(path: &str) -> &str {
    if path.len() > 1 {
        path.strip_suffix('/').unwrap_or(path)
    } else {
        path
    }
}
