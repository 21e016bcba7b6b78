//! Compiled redirect, rewrite and header rules.

use axum::http::{HeaderMap, StatusCode};
use regex::Regex;

use crate::config::{
    ConditionConfig, ConditionSource, ConfigError, HeaderRuleConfig, RuleConfig,
};
use crate::http::headers::HeaderMapExt;
use crate::http::request::InternalRequest;
use crate::rewrite::destination::substitute;
use crate::routing::matcher::{Params, PathPattern};

/// A compiled `has`/`missing` predicate.
#[derive(Debug, Clone)]
pub struct Condition {
    source: ConditionSource,
    key: Option<String>,
    value: Option<Regex>,
}

impl Condition {
    pub fn compile(config: &ConditionConfig) -> Result<Self, ConfigError> {
        let value = config
            .value
            .as_deref()
            .map(|v| {
                Regex::new(&format!("^(?:{v})$")).map_err(|e| ConfigError::Pattern {
                    pattern: v.to_string(),
                    reason: e.to_string(),
                })
            })
            .transpose()?;
        Ok(Self {
            source: config.source,
            key: config.key.clone(),
            value,
        })
    }

    /// Evaluate against `req`. On success returns the params the predicate
    /// contributes: named regex groups, or the raw value under the key name
    /// when no regex was given.
    pub fn evaluate(&self, req: &InternalRequest) -> Option<Params> {
        let key = self.key.as_deref().unwrap_or_default();
        let actual = match self.source {
            ConditionSource::Header => req.headers.get_str(key),
            ConditionSource::Cookie => req.cookies.get(key).map(String::as_str),
            ConditionSource::Query => req.query.get(key),
            ConditionSource::Host => Some(req.hostname()),
        }?;

        let mut params = Params::new();
        match &self.value {
            Some(regex) => {
                let captures = regex.captures(actual)?;
                for name in regex.capture_names().flatten() {
                    if let Some(m) = captures.name(name) {
                        params.insert(name.to_string(), m.as_str().to_string());
                    }
                }
            }
            None if self.source != ConditionSource::Host => {
                let name: String = key
                    .chars()
                    .filter(|c| c.is_ascii_alphanumeric() || *c == '_')
                    .collect();
                if !name.is_empty() {
                    params.insert(name, actual.to_string());
                }
            }
            None => {}
        }
        Some(params)
    }
}

fn compile_conditions(configs: &[ConditionConfig]) -> Result<Vec<Condition>, ConfigError> {
    configs.iter().map(Condition::compile).collect()
}

/// Match `path` against a pattern and its predicates.
fn match_with_conditions(
    pattern: &PathPattern,
    has: &[Condition],
    missing: &[Condition],
    req: &InternalRequest,
    path: &str,
) -> Option<Params> {
    let mut params = pattern.matches(path)?;
    for condition in has {
        params.extend(condition.evaluate(req)?);
    }
    if missing.iter().any(|c| c.evaluate(req).is_some()) {
        return None;
    }
    Some(params)
}

/// A redirect or rewrite rule.
#[derive(Debug, Clone)]
pub struct Rule {
    pattern: PathPattern,
    destination: String,
    has: Vec<Condition>,
    missing: Vec<Condition>,
    status: StatusCode,
    internal: bool,
}

impl Rule {
    pub fn compile(config: &RuleConfig) -> Result<Self, ConfigError> {
        let status = match config.status_code {
            Some(code) => StatusCode::from_u16(code).map_err(|e| ConfigError::Pattern {
                pattern: config.source.clone(),
                reason: e.to_string(),
            })?,
            None if config.permanent => StatusCode::PERMANENT_REDIRECT,
            None => StatusCode::TEMPORARY_REDIRECT,
        };
        Ok(Self {
            pattern: PathPattern::rule(&config.source)?,
            destination: config.destination.clone(),
            has: compile_conditions(&config.has)?,
            missing: compile_conditions(&config.missing)?,
            status,
            internal: config.internal,
        })
    }

    /// Params captured when the rule applies to `path`.
    pub fn matches(&self, req: &InternalRequest, path: &str) -> Option<Params> {
        match_with_conditions(&self.pattern, &self.has, &self.missing, req, path)
    }

    pub fn source(&self) -> &str {
        self.pattern.source()
    }

    pub fn destination(&self) -> &str {
        &self.destination
    }

    /// Redirect status for redirect rules.
    pub fn status(&self) -> StatusCode {
        self.status
    }

    pub fn is_internal(&self) -> bool {
        self.internal
    }
}

/// Ordered rule list. First match wins.
#[derive(Debug, Clone, Default)]
pub struct RuleSet {
    rules: Vec<Rule>,
}

impl RuleSet {
    pub fn compile(configs: &[RuleConfig]) -> Result<Self, ConfigError> {
        Ok(Self {
            rules: configs.iter().map(Rule::compile).collect::<Result<_, _>>()?,
        })
    }

    pub fn first_match(&self, req: &InternalRequest, path: &str) -> Option<(&Rule, Params)> {
        self.rules
            .iter()
            .find_map(|rule| rule.matches(req, path).map(|params| (rule, params)))
    }

    pub fn len(&self) -> usize {
        self.rules.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rules.is_empty()
    }
}

/// Static response headers for matching paths.
#[derive(Debug, Clone)]
pub struct HeaderRule {
    pattern: PathPattern,
    headers: Vec<(String, String)>,
    has: Vec<Condition>,
    missing: Vec<Condition>,
}

impl HeaderRule {
    pub fn compile(config: &HeaderRuleConfig) -> Result<Self, ConfigError> {
        Ok(Self {
            pattern: PathPattern::rule(&config.source)?,
            headers: config
                .headers
                .iter()
                .map(|h| (h.key.to_ascii_lowercase(), h.value.clone()))
                .collect(),
            has: compile_conditions(&config.has)?,
            missing: compile_conditions(&config.missing)?,
        })
    }
}

/// All header rules. Every matching rule applies; later rules override earlier ones.
#[derive(Debug, Clone, Default)]
pub struct HeaderRules {
    rules: Vec<HeaderRule>,
}

impl HeaderRules {
    pub fn compile(configs: &[HeaderRuleConfig]) -> Result<Self, ConfigError> {
        Ok(Self {
            rules: configs
                .iter()
                .map(HeaderRule::compile)
                .collect::<Result<_, _>>()?,
        })
    }

    /// Headers configured for `path`, with params substituted into values.
    pub fn collect(&self, req: &InternalRequest, path: &str) -> HeaderMap {
        let mut out = HeaderMap::new();
        for rule in &self.rules {
            let Some(params) =
                match_with_conditions(&rule.pattern, &rule.has, &rule.missing, req, path)
            else {
                continue;
            };
            for (name, template) in &rule.headers {
                let value = substitute(template, &params).unwrap_or_else(|_| template.clone());
                if name == "set-cookie" {
                    out.append_str(name, &value);
                } else {
                    out.set_str(name, &value);
                }
            }
        }
        out
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::HeaderValueConfig;
    use axum::http::Method;

    fn rule(source: &str, destination: &str) -> RuleConfig {
        RuleConfig {
            source: source.into(),
            destination: destination.into(),
            has: Vec::new(),
            missing: Vec::new(),
            permanent: false,
            status_code: None,
            internal: false,
        }
    }

    fn condition(source: ConditionSource, key: &str, value: Option<&str>) -> ConditionConfig {
        ConditionConfig {
            source,
            key: Some(key.into()),
            value: value.map(str::to_string),
        }
    }

    #[test]
    fn test_has_captures_named_groups() {
        let mut config = rule("/dashboard", "/tenants/:tenant/dashboard");
        config.has = vec![condition(
            ConditionSource::Header,
            "x-tenant",
            Some("(?P<tenant>[a-z0-9-]+)"),
        )];
        let rule = Rule::compile(&config).unwrap();

        let req = InternalRequest::new(Method::GET, "/dashboard").with_header("x-tenant", "wash-7");
        let params = rule.matches(&req, "/dashboard").unwrap();
        assert_eq!(params.get("tenant").map(String::as_str), Some("wash-7"));

        let req = InternalRequest::new(Method::GET, "/dashboard").with_header("x-tenant", "BAD!");
        assert!(rule.matches(&req, "/dashboard").is_none());
    }

    #[test]
    fn test_missing_blocks_match() {
        let mut config = rule("/login", "/dashboard");
        config.missing = vec![condition(ConditionSource::Cookie, "session", None)];
        let rule = Rule::compile(&config).unwrap();

        let anonymous = InternalRequest::new(Method::GET, "/login");
        assert!(rule.matches(&anonymous, "/login").is_some());
        let signed_in = anonymous.with_header("cookie", "session=abc");
        assert!(rule.matches(&signed_in, "/login").is_none());
    }

    #[test]
    fn test_rule_status() {
        let mut config = rule("/a", "/b");
        assert_eq!(Rule::compile(&config).unwrap().status(), StatusCode::TEMPORARY_REDIRECT);
        config.permanent = true;
        assert_eq!(Rule::compile(&config).unwrap().status(), StatusCode::PERMANENT_REDIRECT);
        config.status_code = Some(301);
        assert_eq!(Rule::compile(&config).unwrap().status(), StatusCode::MOVED_PERMANENTLY);
    }

    #[test]
    fn test_first_match_wins() {
        let set = RuleSet::compile(&[rule("/old/:id", "/first/:id"), rule("/old/:id", "/second/:id")])
            .unwrap();
        let req = InternalRequest::new(Method::GET, "/old/1");
        let (rule, _) = set.first_match(&req, "/old/1").unwrap();
        assert_eq!(rule.destination(), "/first/:id");
    }

    #[test]
    fn test_header_rules_substitute_params() {
        let rules = HeaderRules::compile(&[HeaderRuleConfig {
            source: "/orders/:id".into(),
            headers: vec![HeaderValueConfig {
                key: "X-Order".into(),
                value: "order-:id".into(),
            }],
            has: Vec::new(),
            missing: Vec::new(),
        }])
        .unwrap();
        let req = InternalRequest::new(Method::GET, "/orders/42");
        let headers = rules.collect(&req, "/orders/42");
        assert_eq!(headers.get_str("x-order"), Some("order-42"));
        assert!(rules.collect(&req, "/other").is_empty());
    }
}
