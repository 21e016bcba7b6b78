//! Redirect pre-phase and phased rewrite application.
//!
//! # Responsibilities
//! - Emit normalization redirects (duplicate slashes, trailing slash, root locale)
//! - Emit configured redirects, or rewrite in place for internal redirect rules
//! - Apply `before_files`, `after_files` and `fallback` rewrites to the request
//!
//! # Design Decisions
//! - Each phase runs at most once per request and stops at the first matching rule
//! - Rules match the decoded pathname without base path or locale
//! - A rewrite that leaves path and query untouched reports `Unchanged`, so
//!   re-applying a phase to its own output is a fixed point

use axum::http::StatusCode;
use tracing::{debug, warn};
use url::Url;

use crate::config::{ConfigError, RouterConfig};
use crate::http::headers::Query;
use crate::http::request::InternalRequest;
use crate::http::response::EdgeResponse;
use crate::rewrite::destination::{instantiate, Destination};
use crate::rewrite::rules::{Rule, RuleSet};
use crate::routing::locale::{LocaleSource, LocaleTable};
use crate::routing::matcher::Params;
use crate::routing::normalize::NormalizedUrl;

/// Rewrite phase.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Phase {
    BeforeFiles,
    AfterFiles,
    Fallback,
}

impl Phase {
    pub fn as_str(&self) -> &'static str {
        match self {
            Phase::BeforeFiles => "before_files",
            Phase::AfterFiles => "after_files",
            Phase::Fallback => "fallback",
        }
    }
}

/// Result of applying one phase.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RewriteOutcome {
    Unchanged,
    /// Path and/or query of the request were replaced.
    Rewritten,
    /// Destination lives on another host; proxy it instead of rendering.
    External(Url),
}

/// Compiled redirect and rewrite rules plus URL policy.
#[derive(Debug, Clone)]
pub struct RewriteEngine {
    base_path: String,
    trailing_slash: bool,
    skip_trailing_slash_redirect: bool,
    api_prefix: String,
    locales: Option<LocaleTable>,
    redirects: RuleSet,
    before_files: RuleSet,
    after_files: RuleSet,
    fallback: RuleSet,
}

impl RewriteEngine {
    pub fn from_config(config: &RouterConfig) -> Result<Self, ConfigError> {
        Ok(Self {
            base_path: config.routing.base_path.clone(),
            trailing_slash: config.routing.trailing_slash,
            skip_trailing_slash_redirect: config.routing.skip_trailing_slash_redirect,
            api_prefix: config.routing.api_prefix.clone(),
            locales: config.i18n.as_ref().map(LocaleTable::new),
            redirects: RuleSet::compile(&config.redirects)?,
            before_files: RuleSet::compile(&config.rewrites.before_files)?,
            after_files: RuleSet::compile(&config.rewrites.after_files)?,
            fallback: RuleSet::compile(&config.rewrites.fallback)?,
        })
    }

    fn rules(&self, phase: Phase) -> &RuleSet {
        match phase {
            Phase::BeforeFiles => &self.before_files,
            Phase::AfterFiles => &self.after_files,
            Phase::Fallback => &self.fallback,
        }
    }

    /// True for paths served by API route handlers.
    pub fn is_api_path(&self, path: &str) -> bool {
        path == self.api_prefix
            || path
                .strip_prefix(self.api_prefix.as_str())
                .is_some_and(|rest| rest.starts_with('/'))
    }

    /// Redirect pre-phase. Returns the redirect to send, if any.
    ///
    /// Internal redirect rules never answer the client; they rewrite `req.path`.
    pub fn redirect_check(
        &self,
        req: &mut InternalRequest,
        url: &NormalizedUrl,
    ) -> Option<EdgeResponse> {
        if url.had_duplicate_slashes {
            let mut location = collapse_slashes(&req.raw_path);
            append_query(&mut location, &req.query);
            return Some(EdgeResponse::redirect(StatusCode::PERMANENT_REDIRECT, &location));
        }

        if let Some(response) = self.trailing_slash_redirect(req, url) {
            return Some(response);
        }

        if let Some(response) = self.locale_redirect(req, url) {
            return Some(response);
        }

        let (rule, params) = self.redirects.first_match(req, &url.pathname)?;
        if rule.is_internal() {
            self.rewrite_with(rule, params, req);
            return None;
        }
        Some(self.configured_redirect(rule, &params, req, url))
    }

    fn trailing_slash_redirect(
        &self,
        req: &InternalRequest,
        url: &NormalizedUrl,
    ) -> Option<EdgeResponse> {
        if self.skip_trailing_slash_redirect || self.is_api_path(&url.pathname) {
            return None;
        }
        let is_file = url
            .pathname
            .rsplit('/')
            .next()
            .is_some_and(|last| last.contains('.'));

        let target = if self.trailing_slash && !url.had_trailing_slash && !is_file {
            let public = self.public_path(url.path_locale.as_deref(), &url.pathname);
            if public == "/" {
                return None;
            }
            format!("{public}/")
        } else if !self.trailing_slash && url.had_trailing_slash {
            self.public_path(url.path_locale.as_deref(), &url.pathname)
        } else {
            return None;
        };

        let mut location = target;
        append_query(&mut location, &req.query);
        Some(EdgeResponse::redirect(StatusCode::PERMANENT_REDIRECT, &location))
    }

    /// `/` without a locale, with detection on, goes to the client's preferred locale.
    fn locale_redirect(&self, req: &InternalRequest, url: &NormalizedUrl) -> Option<EdgeResponse> {
        let locales = self.locales.as_ref()?;
        if !locales.detection_enabled() || url.path_locale.is_some() || url.pathname != "/" {
            return None;
        }
        let detected = url.detected_locale.as_deref()?;
        if matches!(url.locale_source, Some(LocaleSource::Default | LocaleSource::Domain)) {
            return None;
        }

        let host_default = locales.default_for_host(req.hostname());
        if detected.eq_ignore_ascii_case(host_default) {
            return None;
        }

        let mut location = match locales.domain_for_locale(detected) {
            Some(domain) if !domain.domain.eq_ignore_ascii_case(req.hostname()) => {
                let scheme = if domain.http { "http" } else { "https" };
                let path = if domain.default_locale.eq_ignore_ascii_case(detected) {
                    self.public_path(None, "/")
                } else {
                    self.public_path(Some(detected), "/")
                };
                format!("{scheme}://{}{path}", domain.domain)
            }
            _ => self.public_path(Some(detected), "/"),
        };
        if self.trailing_slash && !location.ends_with('/') {
            location.push('/');
        }
        append_query(&mut location, &req.query);
        debug!(locale = detected, location = %location, "locale redirect");
        Some(EdgeResponse::redirect(StatusCode::TEMPORARY_REDIRECT, &location))
    }

    fn configured_redirect(
        &self,
        rule: &Rule,
        params: &Params,
        req: &InternalRequest,
        url: &NormalizedUrl,
    ) -> EdgeResponse {
        let (destination, error) = instantiate(rule.destination(), params);
        if let Some(error) = error {
            warn!(rule = rule.source(), error = %error, "redirect destination fell back to literal");
        }

        let location = match destination.relative_to(req.hostname()) {
            Destination::Internal { path, query } => {
                let mut merged = req.query.clone();
                merged.merge(&query);
                let mut location = self.public_path(url.path_locale.as_deref(), &path);
                append_query(&mut location, &merged);
                location
            }
            Destination::External(mut target) => {
                if target.query().is_none() && !req.query.is_empty() {
                    target.set_query(Some(&req.query.to_query_string()));
                }
                target.to_string()
            }
        };
        debug!(rule = rule.source(), location = %location, "redirect rule matched");
        EdgeResponse::redirect(rule.status(), &location)
    }

    /// Apply one rewrite phase to `req.path`.
    pub fn apply(&self, phase: Phase, req: &mut InternalRequest) -> RewriteOutcome {
        let Some((rule, params)) = self.rules(phase).first_match(req, &req.path) else {
            return RewriteOutcome::Unchanged;
        };
        let outcome = self.rewrite_with(rule, params, req);
        if outcome != RewriteOutcome::Unchanged {
            debug!(phase = phase.as_str(), rule = rule.source(), path = %req.path, "rewrite applied");
        }
        outcome
    }

    fn rewrite_with(
        &self,
        rule: &Rule,
        params: Params,
        req: &mut InternalRequest,
    ) -> RewriteOutcome {
        let (destination, error) = instantiate(rule.destination(), &params);
        if let Some(error) = error {
            warn!(rule = rule.source(), error = %error, "rewrite destination fell back to literal");
        }

        match destination.relative_to(req.hostname()) {
            Destination::Internal { path, query } => {
                let mut merged = req.query.clone();
                merged.merge(&query);
                if path == req.path && merged == req.query {
                    return RewriteOutcome::Unchanged;
                }
                req.path = path;
                req.query = merged;
                RewriteOutcome::Rewritten
            }
            Destination::External(mut target) => {
                let mut merged = req.query.clone();
                merged.merge(&target.query().map(Query::parse).unwrap_or_default());
                if merged.is_empty() {
                    target.set_query(None);
                } else {
                    target.set_query(Some(&merged.to_query_string()));
                }
                RewriteOutcome::External(target)
            }
        }
    }

    /// Client-visible path: base path, optional locale, then `path`.
    fn public_path(&self, locale: Option<&str>, path: &str) -> String {
        let mut out = self.base_path.clone();
        if let Some(locale) = locale {
            out.push('/');
            out.push_str(locale);
        }
        if path != "/" || out.is_empty() {
            out.push_str(path);
        }
        out
    }
}

fn append_query(location: &mut String, query: &Query) {
    if !query.is_empty() {
        location.push('?');
        location.push_str(&query.to_query_string());
    }
}

fn collapse_slashes(path: &str) -> String {
    let mut out = String::with_capacity(path.len());
    for c in path.chars() {
        if c == '/' && out.ends_with('/') {
            continue;
        }
        out.push(c);
    }
    out
}
