//! URL normalization.
//!
//! # Responsibilities
//! - Strip the configured base path
//! - Collapse duplicate slashes and percent-decode path segments
//! - Resolve a path-embedded locale, or detect one from the request
//!
//! # Design Decisions
//! - Pure function of request + config; nothing is written back
//! - `%2F` stays encoded so decoding never invents path segments
//! - The returned pathname has no trailing slash (except `/`)

use thiserror::Error;

use crate::http::request::InternalRequest;
use crate::routing::locale::{LocaleSource, LocaleTable};

/// Path outside the mandatory base path.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("path `{path}` is outside base path `{base_path}`")]
pub struct OutsideBasePath {
    pub path: String,
    pub base_path: String,
}

/// Result of normalizing a request URL.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NormalizedUrl {
    /// Decoded path without base path or locale prefix.
    pub pathname: String,
    /// Locale taken from the first path segment.
    pub path_locale: Option<String>,
    /// Effective locale: the path locale, else the detected one. `None` without i18n.
    pub detected_locale: Option<String>,
    pub locale_source: Option<LocaleSource>,
    pub base_path_stripped: bool,
    /// The raw path contained `//`.
    pub had_duplicate_slashes: bool,
    /// The raw path (after base path) ended with `/` and was not the root.
    pub had_trailing_slash: bool,
}

/// Normalizes inbound URLs against the base path and locale table.
#[derive(Debug, Clone)]
pub struct UrlNormalizer {
    base_path: String,
    locales: Option<LocaleTable>,
}

impl UrlNormalizer {
    pub fn new(base_path: &str, locales: Option<LocaleTable>) -> Self {
        Self {
            base_path: base_path.to_string(),
            locales,
        }
    }

    pub fn base_path(&self) -> &str {
        &self.base_path
    }

    pub fn locales(&self) -> Option<&LocaleTable> {
        self.locales.as_ref()
    }

    pub fn normalize(&self, req: &InternalRequest) -> Result<NormalizedUrl, OutsideBasePath> {
        let raw = req.raw_path.as_str();
        let (rest, base_path_stripped) = self.strip_base_path(raw).ok_or_else(|| OutsideBasePath {
            path: raw.to_string(),
            base_path: self.base_path.clone(),
        })?;

        let had_duplicate_slashes = raw.contains("//");
        let had_trailing_slash = rest.len() > 1 && rest.ends_with('/');
        let decoded = decode_path(rest);

        let Some(locales) = &self.locales else {
            return Ok(NormalizedUrl {
                pathname: decoded,
                path_locale: None,
                detected_locale: None,
                locale_source: None,
                base_path_stripped,
                had_duplicate_slashes,
                had_trailing_slash,
            });
        };

        if let Some((locale, remainder)) = locales.split_path_locale(&decoded) {
            return Ok(NormalizedUrl {
                pathname: remainder.to_string(),
                path_locale: Some(locale.to_string()),
                detected_locale: Some(locale.to_string()),
                locale_source: Some(LocaleSource::Path),
                base_path_stripped,
                had_duplicate_slashes,
                had_trailing_slash,
            });
        }

        let (locale, source) = locales.detect(req);
        Ok(NormalizedUrl {
            pathname: decoded,
            path_locale: None,
            detected_locale: Some(locale),
            locale_source: Some(source),
            base_path_stripped,
            had_duplicate_slashes,
            had_trailing_slash,
        })
    }

    fn strip_base_path<'a>(&self, path: &'a str) -> Option<(&'a str, bool)> {
        if self.base_path.is_empty() {
            return Some((path, false));
        }
        let rest = path.strip_prefix(self.base_path.as_str())?;
        if rest.is_empty() {
            Some(("/", true))
        } else if rest.starts_with('/') {
            Some((rest, true))
        } else {
            // `/posx` does not live under `/pos`
            None
        }
    }
}

/// Collapse slashes, percent-decode each segment and drop any trailing slash.
pub fn decode_path(path: &str) -> String {
    let segments: Vec<String> = path
        .split('/')
        .filter(|s| !s.is_empty())
        .map(|segment| match urlencoding::decode(segment) {
            Ok(decoded) if !decoded.contains('/') => decoded.into_owned(),
            _ => segment.to_string(),
        })
        .collect();

    if segments.is_empty() {
        "/".to_string()
    } else {
        format!("/{}", segments.join("/"))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::I18nConfig;
    use axum::http::Method;

    fn normalizer(base: &str) -> UrlNormalizer {
        let locales = LocaleTable::new(&I18nConfig {
            locales: vec!["en".into(), "fr".into()],
            default_locale: "en".into(),
            locale_detection: true,
            locale_cookie: "locale".into(),
            domains: Vec::new(),
        });
        UrlNormalizer::new(base, Some(locales))
    }

    #[test]
    fn test_decode_path() {
        assert_eq!(decode_path("//orders///42/"), "/orders/42");
        assert_eq!(decode_path("/caf%C3%A9"), "/café");
        assert_eq!(decode_path("/a%2Fb"), "/a%2Fb");
        assert_eq!(decode_path("/"), "/");
    }

    #[test]
    fn test_base_path_is_stripped() {
        let n = normalizer("/pos");
        let req = InternalRequest::new(Method::GET, "/pos/fr/orders/");
        let url = n.normalize(&req).unwrap();
        assert!(url.base_path_stripped);
        assert_eq!(url.pathname, "/orders");
        assert_eq!(url.path_locale.as_deref(), Some("fr"));
        assert!(url.had_trailing_slash);
    }

    #[test]
    fn test_outside_base_path() {
        let n = normalizer("/pos");
        assert!(n.normalize(&InternalRequest::new(Method::GET, "/posx")).is_err());
        assert!(n.normalize(&InternalRequest::new(Method::GET, "/other")).is_err());
        assert_eq!(
            n.normalize(&InternalRequest::new(Method::GET, "/pos")).unwrap().pathname,
            "/"
        );
    }

    #[test]
    fn test_detects_locale_when_path_has_none() {
        let n = normalizer("");
        let mut req = InternalRequest::new(Method::GET, "/").with_header("accept-language", "fr");
        req.raw_path = "//".into();
        let url = n.normalize(&req).unwrap();
        assert_eq!(url.pathname, "/");
        assert_eq!(url.path_locale, None);
        assert_eq!(url.detected_locale.as_deref(), Some("fr"));
        assert_eq!(url.locale_source, Some(LocaleSource::AcceptLanguage));
        assert!(url.had_duplicate_slashes);
    }
}
