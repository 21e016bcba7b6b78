//! Path pattern compilation and matching.
//!
//! # Responsibilities
//! - Compile page patterns (`/products/[id]`, `/docs/[...slug]`, `/[[...slug]]`)
//! - Compile rule patterns (`/old/:id`, `/blog/:rest*`, `/:id(\d+)`)
//! - Match a path and return the named captures
//!
//! # Design Decisions
//! - Patterns are compiled once at startup into anchored regexes
//! - Capture groups are named `p0..pN` internally so any param name is accepted
//! - A single trailing slash is tolerated; trailing-slash policy lives in the redirect pre-phase
//! - Page patterns are case-sensitive, rule patterns are not

use std::collections::BTreeMap;

use regex::{Regex, RegexBuilder};

use crate::config::ConfigError;

/// Captured parameters, keyed by param name. Catch-all values keep their `/`.
pub type Params = BTreeMap<String, String>;

/// A param declared by a pattern.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ParamSpec {
    pub name: String,
    /// Spans multiple segments.
    pub catch_all: bool,
    /// May be absent.
    pub optional: bool,
}

/// A compiled path pattern.
#[derive(Debug, Clone)]
pub struct PathPattern {
    source: String,
    regex: Regex,
    params: Vec<ParamSpec>,
}

impl PathPattern {
    /// Compile a page pattern from the route manifest.
    pub fn page(source: &str) -> Result<Self, ConfigError> {
        let mut body = String::new();
        let mut params = Vec::new();

        for segment in segments(source) {
            let group = format!("p{}", params.len());
            if let Some(name) = strip_wrapping(segment, "[[...", "]]") {
                params.push(param(source, name, true, true)?);
                body.push_str(&format!("(?:/(?P<{group}>.+?))?"));
            } else if let Some(name) = strip_wrapping(segment, "[...", "]") {
                params.push(param(source, name, true, false)?);
                body.push_str(&format!("/(?P<{group}>.+?)"));
            } else if let Some(name) = strip_wrapping(segment, "[", "]") {
                params.push(param(source, name, false, false)?);
                body.push_str(&format!("/(?P<{group}>[^/]+?)"));
            } else {
                body.push('/');
                body.push_str(&regex::escape(segment));
            }
        }

        Self::build(source, body, params, false)
    }

    /// Compile a redirect/rewrite/header rule source.
    pub fn rule(source: &str) -> Result<Self, ConfigError> {
        let mut body = String::new();
        let mut params = Vec::new();

        for segment in segments(source) {
            let Some(spec) = segment.strip_prefix(':') else {
                body.push('/');
                body.push_str(&regex::escape(segment));
                continue;
            };

            let name_len = spec
                .find(|c: char| !(c.is_ascii_alphanumeric() || c == '_'))
                .unwrap_or(spec.len());
            let (name, rest) = spec.split_at(name_len);
            let (custom, modifier) = match rest.strip_prefix('(') {
                Some(inner) => {
                    let close = inner.rfind(')').ok_or_else(|| ConfigError::Pattern {
                        pattern: source.to_string(),
                        reason: "unclosed `(` in param".into(),
                    })?;
                    (Some(&inner[..close]), &inner[close + 1..])
                }
                None => (None, rest),
            };

            let group = format!("p{}", params.len());
            let inner = custom.unwrap_or("[^/]+?");
            match modifier {
                "" => {
                    params.push(param(source, name, false, false)?);
                    body.push_str(&format!("/(?P<{group}>{inner})"));
                }
                "?" => {
                    params.push(param(source, name, false, true)?);
                    body.push_str(&format!("(?:/(?P<{group}>{inner}))?"));
                }
                "+" => {
                    params.push(param(source, name, true, false)?);
                    body.push_str(&format!("/(?P<{group}>.+?)"));
                }
                "*" => {
                    params.push(param(source, name, true, true)?);
                    body.push_str(&format!("(?:/(?P<{group}>.*?))?"));
                }
                other => {
                    return Err(ConfigError::Pattern {
                        pattern: source.to_string(),
                        reason: format!("unknown param modifier `{other}`"),
                    })
                }
            }
        }

        Self::build(source, body, params, true)
    }

    fn build(
        source: &str,
        body: String,
        params: Vec<ParamSpec>,
        case_insensitive: bool,
    ) -> Result<Self, ConfigError> {
        let expr = if body.is_empty() {
            "^/$".to_string()
        } else {
            format!("^{body}/?$")
        };
        let regex = RegexBuilder::new(&expr)
            .case_insensitive(case_insensitive)
            .build()
            .map_err(|e| ConfigError::Pattern {
                pattern: source.to_string(),
                reason: e.to_string(),
            })?;

        Ok(Self {
            source: source.to_string(),
            regex,
            params,
        })
    }

    /// Match `path`, returning captured params on success.
    pub fn matches(&self, path: &str) -> Option<Params> {
        let captures = self.regex.captures(path)?;
        let mut params = Params::new();
        for (index, spec) in self.params.iter().enumerate() {
            if let Some(value) = captures.name(&format!("p{index}")) {
                if !value.as_str().is_empty() {
                    params.insert(spec.name.clone(), value.as_str().to_string());
                }
            }
        }
        Some(params)
    }

    pub fn is_match(&self, path: &str) -> bool {
        self.regex.is_match(path)
    }

    pub fn source(&self) -> &str {
        &self.source
    }

    pub fn params(&self) -> &[ParamSpec] {
        &self.params
    }

    /// True when the pattern has no params at all.
    pub fn is_literal(&self) -> bool {
        self.params.is_empty()
    }
}

fn segments(source: &str) -> impl Iterator<Item = &str> {
    source.split('/').filter(|s| !s.is_empty())
}

fn strip_wrapping<'a>(segment: &'a str, open: &str, close: &str) -> Option<&'a str> {
    segment.strip_prefix(open)?.strip_suffix(close)
}

fn param(source: &str, name: &str, catch_all: bool, optional: bool) -> Result<ParamSpec, ConfigError> {
    if name.is_empty() {
        return Err(ConfigError::Pattern {
            pattern: source.to_string(),
            reason: "empty param name".into(),
        });
    }
    Ok(ParamSpec {
        name: name.to_string(),
        catch_all,
        optional,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_page_dynamic_segment() {
        let pattern = PathPattern::page("/products/[id]").unwrap();
        let params = pattern.matches("/products/42").unwrap();
        assert_eq!(params.get("id").map(String::as_str), Some("42"));
        assert!(pattern.matches("/products/42/reviews").is_none());
        assert!(pattern.matches("/Products/42").is_none());
    }

    #[test]
    fn test_page_catch_all() {
        let required = PathPattern::page("/docs/[...slug]").unwrap();
        assert_eq!(
            required.matches("/docs/a/b").unwrap().get("slug").map(String::as_str),
            Some("a/b")
        );
        assert!(required.matches("/docs").is_none());

        let optional = PathPattern::page("/shop/[[...slug]]").unwrap();
        assert!(optional.matches("/shop").unwrap().is_empty());
        assert!(optional.matches("/shop/x/y").is_some());
    }

    #[test]
    fn test_root_and_trailing_slash() {
        let root = PathPattern::page("/").unwrap();
        assert!(root.is_match("/"));
        assert!(!root.is_match("/a"));

        let about = PathPattern::page("/about").unwrap();
        assert!(about.is_match("/about/"));
        assert!(about.is_literal());
    }

    #[test]
    fn test_rule_params_and_modifiers() {
        let pattern = PathPattern::rule("/old/:id").unwrap();
        assert_eq!(
            pattern.matches("/OLD/42").unwrap().get("id").map(String::as_str),
            Some("42")
        );

        let star = PathPattern::rule("/blog/:rest*").unwrap();
        assert!(star.matches("/blog").unwrap().is_empty());
        assert_eq!(
            star.matches("/blog/2024/01").unwrap().get("rest").map(String::as_str),
            Some("2024/01")
        );

        let digits = PathPattern::rule(r"/orders/:id(\d+)").unwrap();
        assert!(digits.is_match("/orders/17"));
        assert!(!digits.is_match("/orders/abc"));

        let optional = PathPattern::rule("/:lang?/pricing").unwrap();
        assert!(optional.is_match("/pricing"));
        assert!(optional.is_match("/fr/pricing"));
    }

    #[test]
    fn test_invalid_patterns() {
        assert!(PathPattern::rule("/:id(").is_err());
        assert!(PathPattern::rule("/:id!").is_err());
        assert!(PathPattern::page("/[]").is_err());
        assert!(PathPattern::rule(r"/:id([)").is_err());
    }
}
