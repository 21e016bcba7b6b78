//! Header, cookie and query helpers.
//!
//! Headers are kept in `http::HeaderMap`, which already is a case-insensitive
//! ordered multimap. `HeaderMapExt` adds string-level get/set/append so pipeline
//! stages never deal with `HeaderValue` conversions directly.

use std::collections::BTreeMap;

use axum::http::{HeaderMap, HeaderName, HeaderValue};
use url::form_urlencoded;

/// String-level access to a `HeaderMap`.
pub trait HeaderMapExt {
    /// First value of `name`, if present and valid UTF-8.
    fn get_str(&self, name: &str) -> Option<&str>;

    /// All values of `name` that are valid UTF-8.
    fn get_all_str(&self, name: &str) -> Vec<&str>;

    /// Replace every value of `name` with `value`. Returns false if either is invalid.
    fn set_str(&mut self, name: &str, value: &str) -> bool;

    /// Add `value` to `name`, keeping existing values. Returns false if either is invalid.
    fn append_str(&mut self, name: &str, value: &str) -> bool;
}

impl HeaderMapExt for HeaderMap {
    fn get_str(&self, name: &str) -> Option<&str> {
        self.get(name).and_then(|v| v.to_str().ok())
    }

    fn get_all_str(&self, name: &str) -> Vec<&str> {
        self.get_all(name)
            .iter()
            .filter_map(|v| v.to_str().ok())
            .collect()
    }

    fn set_str(&mut self, name: &str, value: &str) -> bool {
        match (
            HeaderName::from_bytes(name.as_bytes()),
            HeaderValue::from_str(value),
        ) {
            (Ok(name), Ok(value)) => {
                self.insert(name, value);
                true
            }
            _ => false,
        }
    }

    fn append_str(&mut self, name: &str, value: &str) -> bool {
        match (
            HeaderName::from_bytes(name.as_bytes()),
            HeaderValue::from_str(value),
        ) {
            (Ok(name), Ok(value)) => {
                self.append(name, value);
                true
            }
            _ => false,
        }
    }
}

/// Parse every `cookie` header into a name → value map. Later duplicates win.
pub fn parse_cookies(headers: &HeaderMap) -> BTreeMap<String, String> {
    let mut cookies = BTreeMap::new();
    for header in headers.get_all_str("cookie") {
        for pair in header.split(';') {
            let Some((name, value)) = pair.split_once('=') else {
                continue;
            };
            let name = name.trim();
            if name.is_empty() {
                continue;
            }
            cookies.insert(name.to_string(), value.trim().trim_matches('"').to_string());
        }
    }
    cookies
}

/// Cookie name a `set-cookie` value assigns.
pub fn set_cookie_name(value: &str) -> Option<&str> {
    value
        .split(';')
        .next()
        .and_then(|pair| pair.split_once('='))
        .map(|(name, _)| name.trim())
        .filter(|name| !name.is_empty())
}

/// Ordered, multi-valued query string.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Query {
    pairs: Vec<(String, String)>,
}

impl Query {
    /// Parse a raw query string (without the leading `?`).
    pub fn parse(raw: &str) -> Self {
        Self {
            pairs: form_urlencoded::parse(raw.as_bytes())
                .map(|(k, v)| (k.into_owned(), v.into_owned()))
                .collect(),
        }
    }

    pub fn get(&self, key: &str) -> Option<&str> {
        self.pairs
            .iter()
            .find(|(k, _)| k == key)
            .map(|(_, v)| v.as_str())
    }

    pub fn get_all(&self, key: &str) -> Vec<&str> {
        self.pairs
            .iter()
            .filter(|(k, _)| k == key)
            .map(|(_, v)| v.as_str())
            .collect()
    }

    pub fn contains(&self, key: &str) -> bool {
        self.pairs.iter().any(|(k, _)| k == key)
    }

    /// Replace all values of `key`.
    pub fn set(&mut self, key: &str, value: &str) {
        self.pairs.retain(|(k, _)| k != key);
        self.pairs.push((key.to_string(), value.to_string()));
    }

    pub fn append(&mut self, key: &str, value: &str) {
        self.pairs.push((key.to_string(), value.to_string()));
    }

    pub fn remove(&mut self, key: &str) {
        self.pairs.retain(|(k, _)| k != key);
    }

    /// Overlay `other` onto `self`: keys present in `other` replace ours.
    pub fn merge(&mut self, other: &Query) {
        for key in other.keys() {
            self.remove(key);
        }
        self.pairs.extend(other.pairs.iter().cloned());
    }

    pub fn keys(&self) -> Vec<&str> {
        let mut keys: Vec<&str> = Vec::new();
        for (k, _) in &self.pairs {
            if !keys.contains(&k.as_str()) {
                keys.push(k);
            }
        }
        keys
    }

    pub fn is_empty(&self) -> bool {
        self.pairs.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &str)> {
        self.pairs.iter().map(|(k, v)| (k.as_str(), v.as_str()))
    }

    /// Serialize back to `a=1&b=2` form.
    pub fn to_query_string(&self) -> String {
        form_urlencoded::Serializer::new(String::new())
            .extend_pairs(self.pairs.iter())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_header_ext_is_case_insensitive() {
        let mut headers = HeaderMap::new();
        assert!(headers.set_str("X-Tenant", "wash-42"));
        assert_eq!(headers.get_str("x-tenant"), Some("wash-42"));

        assert!(headers.append_str("x-tenant", "wash-43"));
        assert_eq!(headers.get_all_str("X-TENANT"), vec!["wash-42", "wash-43"]);

        assert!(headers.set_str("x-tenant", "only"));
        assert_eq!(headers.get_all_str("x-tenant"), vec!["only"]);

        assert!(!headers.set_str("bad header", "v"));
    }

    #[test]
    fn test_parse_cookies() {
        let mut headers = HeaderMap::new();
        headers.append_str("cookie", "locale=fr; session=abc");
        headers.append_str("cookie", "theme=\"dark\"");

        let cookies = parse_cookies(&headers);
        assert_eq!(cookies.get("locale").map(String::as_str), Some("fr"));
        assert_eq!(cookies.get("session").map(String::as_str), Some("abc"));
        assert_eq!(cookies.get("theme").map(String::as_str), Some("dark"));
    }

    #[test]
    fn test_set_cookie_name() {
        assert_eq!(set_cookie_name("sid=1; Path=/; HttpOnly"), Some("sid"));
        assert_eq!(set_cookie_name("garbage"), None);
    }

    #[test]
    fn test_query_merge_overrides_keys() {
        let mut query = Query::parse("page=2&tag=a&tag=b");
        query.merge(&Query::parse("tag=c&sort=asc"));

        assert_eq!(query.get("page"), Some("2"));
        assert_eq!(query.get_all("tag"), vec!["c"]);
        assert_eq!(query.to_query_string(), "page=2&tag=c&sort=asc");
    }
}
