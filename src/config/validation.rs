//! Configuration validation.
//!
//! # Responsibilities
//! - Semantic validation (serde handles syntactic)
//! - Detect ambiguous locale configuration
//! - Validate value ranges (shard count > 0, status codes are redirects)
//! - Check rule and route patterns are well formed
//!
//! # Design Decisions
//! - Returns all validation errors, not just first
//! - Validation is pure function: RouterConfig → Result<(), Vec<ValidationError>>
//! - Runs before config is compiled into a manifest

use std::collections::HashSet;

use thiserror::Error;

use crate::config::schema::{RouteKindConfig, RouterConfig, RuleConfig};

/// A single semantic problem in the configuration.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ValidationError {
    #[error("base_path `{0}` must start with `/` and must not end with `/`")]
    BasePath(String),

    #[error("i18n.locales must not be empty")]
    NoLocales,

    #[error("locale `{0}` is declared more than once (case-insensitive)")]
    DuplicateLocale(String),

    #[error("default locale `{0}` is not listed in i18n.locales")]
    UnknownDefaultLocale(String),

    #[error("domain `{domain}` references unknown locale `{locale}`")]
    UnknownDomainLocale { domain: String, locale: String },

    #[error("locale `{locale}` is the default of both `{first}` and `{second}`")]
    AmbiguousDomainLocale {
        locale: String,
        first: String,
        second: String,
    },

    #[error("route `{0}` is declared more than once")]
    DuplicateRoute(String),

    #[error("route `{page}`: {reason}")]
    Route { page: String, reason: String },

    #[error("rule `{rule}`: {reason}")]
    Rule { rule: String, reason: String },

    #[error("revalidation.shard_count must be greater than zero")]
    ZeroShards,

    #[error("cache.max_entries must be greater than zero")]
    ZeroCacheEntries,

    #[error("cache.status_header `{0}` is not a valid header name")]
    StatusHeader(String),
}

/// Validate a parsed configuration, collecting every problem found.
pub fn validate_config(config: &RouterConfig) -> Result<(), Vec<ValidationError>> {
    let mut errors = Vec::new();

    let base = &config.routing.base_path;
    if !base.is_empty() && (!base.starts_with('/') || base.ends_with('/')) {
        errors.push(ValidationError::BasePath(base.clone()));
    }

    if let Some(i18n) = &config.i18n {
        validate_locales(i18n, &mut errors);
    }

    let mut pages = HashSet::new();
    for route in &config.routes {
        if !pages.insert(route.page.as_str()) {
            errors.push(ValidationError::DuplicateRoute(route.page.clone()));
        }
        if !route.page.starts_with('/') {
            errors.push(ValidationError::Route {
                page: route.page.clone(),
                reason: "page must start with `/`".into(),
            });
        }
        if route.kind != RouteKindConfig::Dynamic && !route.fallback {
            errors.push(ValidationError::Route {
                page: route.page.clone(),
                reason: "only dynamic routes can disable fallback".into(),
            });
        }
        if route.revalidate == Some(0) {
            errors.push(ValidationError::Route {
                page: route.page.clone(),
                reason: "revalidate must be at least one second".into(),
            });
        }
    }

    for rule in &config.redirects {
        validate_rule(rule, true, &mut errors);
    }
    let rewrites = &config.rewrites;
    for rule in rewrites
        .before_files
        .iter()
        .chain(&rewrites.after_files)
        .chain(&rewrites.fallback)
    {
        validate_rule(rule, false, &mut errors);
    }

    if config.revalidation.shard_count == 0 {
        errors.push(ValidationError::ZeroShards);
    }

    if config.cache.max_entries == 0 {
        errors.push(ValidationError::ZeroCacheEntries);
    }

    if axum::http::HeaderName::from_bytes(config.cache.status_header.as_bytes()).is_err() {
        errors.push(ValidationError::StatusHeader(config.cache.status_header.clone()));
    }

    if errors.is_empty() {
        Ok(())
    } else {
        Err(errors)
    }
}

fn validate_locales(i18n: &crate::config::I18nConfig, errors: &mut Vec<ValidationError>) {
    if i18n.locales.is_empty() {
        errors.push(ValidationError::NoLocales);
        return;
    }

    let mut seen = HashSet::new();
    for locale in &i18n.locales {
        if !seen.insert(locale.to_lowercase()) {
            errors.push(ValidationError::DuplicateLocale(locale.clone()));
        }
    }

    let known = |locale: &str| seen.contains(&locale.to_lowercase());

    if !known(&i18n.default_locale) {
        errors.push(ValidationError::UnknownDefaultLocale(
            i18n.default_locale.clone(),
        ));
    }

    let mut owners: Vec<(String, &str)> = Vec::new();
    for domain in &i18n.domains {
        for locale in std::iter::once(&domain.default_locale).chain(&domain.locales) {
            if !known(locale) {
                errors.push(ValidationError::UnknownDomainLocale {
                    domain: domain.domain.clone(),
                    locale: locale.clone(),
                });
            }
        }

        let key = domain.default_locale.to_lowercase();
        if let Some((_, first)) = owners.iter().find(|(l, _)| *l == key) {
            errors.push(ValidationError::AmbiguousDomainLocale {
                locale: domain.default_locale.clone(),
                first: first.to_string(),
                second: domain.domain.clone(),
            });
        } else {
            owners.push((key, domain.domain.as_str()));
        }
    }
}

fn validate_rule(rule: &RuleConfig, is_redirect: bool, errors: &mut Vec<ValidationError>) {
    if !rule.source.starts_with('/') {
        errors.push(ValidationError::Rule {
            rule: rule.source.clone(),
            reason: "source must start with `/`".into(),
        });
    }
    if rule.destination.is_empty() {
        errors.push(ValidationError::Rule {
            rule: rule.source.clone(),
            reason: "destination must not be empty".into(),
        });
    }
    if let Some(code) = rule.status_code {
        if !is_redirect {
            errors.push(ValidationError::Rule {
                rule: rule.source.clone(),
                reason: "status_code is only valid on redirects".into(),
            });
        } else if !matches!(code, 301 | 302 | 303 | 307 | 308) {
            errors.push(ValidationError::Rule {
                rule: rule.source.clone(),
                reason: format!("status_code {code} is not a redirect status"),
            });
        }
    }
}
