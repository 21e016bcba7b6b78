//! Compiled, immutable routing manifest.
//!
//! Built once at startup from a validated `RouterConfig` and shared by every
//! request without locks.

use std::collections::HashSet;
use std::time::Duration;

use axum::http::HeaderName;

use crate::config::{ConfigError, HeaderPrecedence, RouterConfig, ValidationError};
use crate::rewrite::engine::RewriteEngine;
use crate::rewrite::rules::HeaderRules;
use crate::routing::locale::LocaleTable;
use crate::routing::normalize::UrlNormalizer;
use crate::routing::router::RouteTable;

#[derive(Debug, Clone)]
pub struct Manifest {
    pub normalizer: UrlNormalizer,
    pub routes: RouteTable,
    pub rewrites: RewriteEngine,
    pub headers: HeaderRules,
    pub asset_prefixes: Vec<String>,
    pub public_files: HashSet<String>,
    pub base_path: String,
    pub trailing_slash: bool,
    pub header_precedence: HeaderPrecedence,
    pub status_header: HeaderName,
    pub middleware_matchers: Vec<String>,
    pub upstream_timeout: Duration,
}

impl Manifest {
    pub fn compile(config: &RouterConfig) -> Result<Self, ConfigError> {
        let locales = config.i18n.as_ref().map(LocaleTable::new);
        let status_header = HeaderName::from_bytes(config.cache.status_header.as_bytes())
            .map_err(|_| {
                ConfigError::Validation(vec![ValidationError::StatusHeader(
                    config.cache.status_header.clone(),
                )])
            })?;

        Ok(Self {
            normalizer: UrlNormalizer::new(&config.routing.base_path, locales),
            routes: RouteTable::from_config(&config.routes, config.cache.default_revalidate)?,
            rewrites: RewriteEngine::from_config(config)?,
            headers: HeaderRules::compile(&config.headers)?,
            asset_prefixes: config.assets.prefixes.clone(),
            public_files: config.assets.public_files.iter().cloned().collect(),
            base_path: config.routing.base_path.clone(),
            trailing_slash: config.routing.trailing_slash,
            header_precedence: config.middleware.header_precedence,
            status_header,
            middleware_matchers: config.middleware.matchers.clone(),
            upstream_timeout: Duration::from_secs(config.timeouts.upstream_secs),
        })
    }

    pub fn i18n_enabled(&self) -> bool {
        self.normalizer.locales().is_some()
    }

    /// Build asset or public file, served without routing or caching.
    pub fn is_asset(&self, path: &str) -> bool {
        self.public_files.contains(path)
            || self
                .asset_prefixes
                .iter()
                .any(|prefix| path.starts_with(prefix.as_str()))
    }

    /// Cache key for a locale-less path: `/{locale}{path}` when i18n is on.
    pub fn cache_key(&self, locale: Option<&str>, path: &str) -> String {
        match locale.filter(|_| self.i18n_enabled()) {
            Some(locale) if path == "/" => format!("/{locale}"),
            Some(locale) => format!("/{locale}{path}"),
            None => path.to_string(),
        }
    }

    /// Client-visible URL path for a cache key, used to replay revalidations.
    pub fn public_path(&self, key: &str) -> String {
        let mut out = if key == "/" && !self.base_path.is_empty() {
            self.base_path.clone()
        } else {
            format!("{}{}", self.base_path, key)
        };
        let last_segment = out.rsplit('/').next().unwrap_or_default();
        if self.trailing_slash && !out.ends_with('/') && !last_segment.contains('.') {
            out.push('/');
        }
        out
    }
}
