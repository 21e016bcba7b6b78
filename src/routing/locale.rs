//! Locale detection.
//!
//! # Responsibilities
//! - Recognize a locale embedded as the first path segment
//! - Derive a locale from domain, cookie, then `Accept-Language`
//! - Find the domain that owns a locale for cross-domain redirects
//!
//! # Design Decisions
//! - Locale lookup is case-insensitive; the configured spelling is returned
//! - `Accept-Language` ties on `q` are broken by declaration order
//! - Built once from validated config; all lookups are pure

use std::collections::HashMap;

use crate::config::{DomainLocaleConfig, I18nConfig};
use crate::http::headers::HeaderMapExt;
use crate::http::request::InternalRequest;

/// Where the effective locale came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LocaleSource {
    Path,
    Domain,
    Cookie,
    AcceptLanguage,
    Default,
}

/// Compiled locale settings.
#[derive(Debug, Clone)]
pub struct LocaleTable {
    locales: Vec<String>,
    by_lower: HashMap<String, usize>,
    default_locale: String,
    detection: bool,
    cookie: String,
    domains: Vec<DomainLocaleConfig>,
}

impl LocaleTable {
    /// Build from validated config.
    pub fn new(config: &I18nConfig) -> Self {
        let by_lower = config
            .locales
            .iter()
            .enumerate()
            .map(|(i, l)| (l.to_lowercase(), i))
            .collect();
        Self {
            locales: config.locales.clone(),
            by_lower,
            default_locale: config.default_locale.clone(),
            detection: config.locale_detection,
            cookie: config.locale_cookie.clone(),
            domains: config.domains.clone(),
        }
    }

    pub fn locales(&self) -> &[String] {
        &self.locales
    }

    pub fn default_locale(&self) -> &str {
        &self.default_locale
    }

    pub fn detection_enabled(&self) -> bool {
        self.detection
    }

    /// Canonical spelling of `candidate`, if it is a configured locale.
    pub fn lookup(&self, candidate: &str) -> Option<&str> {
        self.by_lower
            .get(&candidate.to_lowercase())
            .map(|&i| self.locales[i].as_str())
    }

    /// Split a leading locale segment off `path`. `/fr/orders` → (`fr`, `/orders`).
    pub fn split_path_locale<'a>(&self, path: &'a str) -> Option<(&str, &'a str)> {
        let trimmed = path.strip_prefix('/')?;
        let (first, rest) = match trimmed.find('/') {
            Some(idx) => (&trimmed[..idx], &trimmed[idx..]),
            None => (trimmed, ""),
        };
        let locale = self.lookup(first)?;
        Some((locale, if rest.is_empty() { "/" } else { rest }))
    }

    /// Domain entry for a request host.
    pub fn domain_for_host(&self, hostname: &str) -> Option<&DomainLocaleConfig> {
        self.domains
            .iter()
            .find(|d| d.domain.eq_ignore_ascii_case(hostname))
    }

    /// Domain that serves `locale`, preferring the one where it is the default.
    pub fn domain_for_locale(&self, locale: &str) -> Option<&DomainLocaleConfig> {
        self.domains
            .iter()
            .find(|d| d.default_locale.eq_ignore_ascii_case(locale))
            .or_else(|| {
                self.domains
                    .iter()
                    .find(|d| d.locales.iter().any(|l| l.eq_ignore_ascii_case(locale)))
            })
    }

    /// Default locale for the request's host: the domain's, else the global one.
    pub fn default_for_host(&self, hostname: &str) -> &str {
        self.domain_for_host(hostname)
            .and_then(|d| self.lookup(&d.default_locale))
            .unwrap_or(&self.default_locale)
    }

    /// Locale preferred by the client, ignoring the path.
    pub fn detect(&self, req: &InternalRequest) -> (String, LocaleSource) {
        if let Some(locale) = self
            .domain_for_host(req.hostname())
            .and_then(|d| self.lookup(&d.default_locale))
        {
            return (locale.to_string(), LocaleSource::Domain);
        }

        self.preferred(req)
            .unwrap_or_else(|| (self.default_locale.clone(), LocaleSource::Default))
    }

    fn preferred(&self, req: &InternalRequest) -> Option<(String, LocaleSource)> {
        if let Some(locale) = req.cookies.get(&self.cookie).and_then(|c| self.lookup(c)) {
            return Some((locale.to_string(), LocaleSource::Cookie));
        }
        if !self.detection {
            return None;
        }
        req.headers
            .get_str("accept-language")
            .and_then(|header| negotiate(header, &self.locales))
            .map(|locale| (locale, LocaleSource::AcceptLanguage))
    }
}

/// One `Accept-Language` entry.
#[derive(Debug, Clone, PartialEq)]
pub struct LanguageRange {
    pub tag: String,
    pub quality: f32,
}

/// Parse an `Accept-Language` header, sorted by quality descending.
///
/// Entries with `q=0` or unparsable weights are dropped. The sort is stable, so
/// equal weights keep their declaration order.
pub fn parse_accept_language(header: &str) -> Vec<LanguageRange> {
    let mut ranges: Vec<LanguageRange> = header
        .split(',')
        .filter_map(|part| {
            let mut pieces = part.split(';');
            let tag = pieces.next()?.trim();
            if tag.is_empty() {
                return None;
            }
            let mut quality = 1.0f32;
            for param in pieces {
                if let Some(q) = param.trim().strip_prefix("q=") {
                    quality = q.trim().parse().ok()?;
                }
            }
            if !(quality > 0.0 && quality <= 1.0) {
                return None;
            }
            Some(LanguageRange {
                tag: tag.to_string(),
                quality,
            })
        })
        .collect();

    ranges.sort_by(|a, b| b.quality.total_cmp(&a.quality));
    ranges
}

/// Pick the best configured locale for an `Accept-Language` header.
///
/// Each range is tried in preference order: exact match first, then a
/// configured locale sharing its primary language subtag.
pub fn negotiate(header: &str, locales: &[String]) -> Option<String> {
    for range in parse_accept_language(header) {
        if range.tag == "*" {
            continue;
        }
        if let Some(exact) = locales.iter().find(|l| l.eq_ignore_ascii_case(&range.tag)) {
            return Some(exact.clone());
        }
        let primary = range.tag.split('-').next().unwrap_or(&range.tag);
        if let Some(partial) = locales.iter().find(|l| {
            l.split('-')
                .next()
                .is_some_and(|p| p.eq_ignore_ascii_case(primary))
        }) {
            return Some(partial.clone());
        }
    }
    None
}
