//! Destination templates: `:param` substitution and target classification.

use url::Url;

use crate::error::RewriteDestinationError;
use crate::http::headers::Query;
use crate::routing::matcher::Params;

/// Where a rule sends the request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Destination {
    /// Same-application path plus query to merge into the request's.
    Internal { path: String, query: Query },
    /// Absolute URL.
    External(Url),
}

impl Destination {
    /// Build from an already-substituted destination string.
    pub fn parse(destination: &str) -> Result<Self, RewriteDestinationError> {
        if destination.starts_with('/') {
            let (path, query) = match destination.split_once('?') {
                Some((path, query)) => (path, Query::parse(query)),
                None => (destination, Query::default()),
            };
            return Ok(Destination::Internal {
                path: tidy_path(path),
                query,
            });
        }
        Url::parse(destination)
            .map(Destination::External)
            .map_err(|_| RewriteDestinationError::InvalidUrl(destination.to_string()))
    }

    /// Resolve against the request host: absolute URLs on the same host become internal.
    pub fn relative_to(self, hostname: &str) -> Self {
        match self {
            Destination::External(url)
                if url
                    .host_str()
                    .is_some_and(|h| h.eq_ignore_ascii_case(hostname)) =>
            {
                Destination::Internal {
                    path: tidy_path(url.path()),
                    query: url.query().map(Query::parse).unwrap_or_default(),
                }
            }
            other => other,
        }
    }
}

/// Substitute params into `template` and classify the result.
///
/// On substitution failure the literal template is returned alongside the error
/// so callers can fall back to it.
pub fn instantiate(
    template: &str,
    params: &Params,
) -> (Destination, Option<RewriteDestinationError>) {
    let (rendered, error) = match substitute(template, params) {
        Ok(rendered) => (rendered, None),
        Err(e) => (template.to_string(), Some(e)),
    };
    match Destination::parse(&rendered) {
        Ok(destination) => (destination, error),
        Err(e) => (
            Destination::Internal {
                path: tidy_path(template.split('?').next().unwrap_or(template)),
                query: Query::default(),
            },
            Some(error.unwrap_or(e)),
        ),
    }
}

/// Replace every `:name` token in `template` with its param value.
///
/// Tokens may carry the same modifiers as source patterns (`:id?`, `:rest*`,
/// `:slug+`, `:id(\d+)`). Optional tokens without a value expand to nothing.
pub fn substitute(template: &str, params: &Params) -> Result<String, RewriteDestinationError> {
    let mut out = String::with_capacity(template.len());
    let mut rest = template;

    while let Some(idx) = rest.find(':') {
        out.push_str(&rest[..idx]);
        let after = &rest[idx + 1..];
        let name_len = after
            .char_indices()
            .take_while(|(i, c)| {
                c.is_ascii_alphabetic() || *c == '_' || (*i > 0 && c.is_ascii_digit())
            })
            .count();
        if name_len == 0 {
            out.push(':');
            rest = after;
            continue;
        }

        let name = &after[..name_len];
        let mut tail = &after[name_len..];
        if let Some(inner) = tail.strip_prefix('(') {
            tail = inner.find(')').map(|i| &inner[i + 1..]).unwrap_or(inner);
        }
        // `?` followed by more text starts the query string instead.
        let optional_mark = tail
            .strip_prefix('?')
            .is_some_and(|after| after.is_empty() || after.starts_with('/'));
        let optional = optional_mark || tail.starts_with('*');
        if optional || tail.starts_with('+') {
            tail = &tail[1..];
        }

        match params.get(name) {
            Some(value) => out.push_str(value),
            None if optional => {}
            None => return Err(RewriteDestinationError::UnknownParam(name.to_string())),
        }
        rest = tail;
    }
    out.push_str(rest);
    Ok(out)
}

/// Collapse `//` left by empty optional params and drop the trailing slash.
fn tidy_path(path: &str) -> String {
    let joined: Vec<&str> = path.split('/').filter(|s| !s.is_empty()).collect();
    if joined.is_empty() {
        "/".to_string()
    } else {
        format!("/{}", joined.join("/"))
    }
}
