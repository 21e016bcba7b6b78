//! Configuration schema definitions.
//!
//! This module defines the complete configuration structure for the edge router.
//! All types derive Serde traits for deserialization from config files.

use serde::{Deserialize, Serialize};

/// Root configuration for the edge router.
#[derive(Debug, Clone, Deserialize, Serialize, Default)]
#[serde(default)]
pub struct RouterConfig {
    /// Listener configuration (bind address, connection limit).
    pub listener: ListenerConfig,

    /// Timeout configuration.
    pub timeouts: TimeoutConfig,

    /// Observability settings.
    pub observability: ObservabilityConfig,

    /// Base path, trailing slash policy, API prefix.
    pub routing: RoutingConfig,

    /// Locale configuration. Absent means i18n is disabled.
    pub i18n: Option<I18nConfig>,

    /// Route manifest produced by the build.
    pub routes: Vec<RouteConfig>,

    /// Redirect rules, evaluated in order.
    pub redirects: Vec<RuleConfig>,

    /// Rewrite rules per phase.
    pub rewrites: RewritesConfig,

    /// Static response header rules.
    pub headers: Vec<HeaderRuleConfig>,

    /// User middleware settings.
    pub middleware: MiddlewareConfig,

    /// Asset short-circuit settings.
    pub assets: AssetsConfig,

    /// Incremental cache settings.
    pub cache: CacheConfig,

    /// Revalidation queue settings.
    pub revalidation: RevalidationConfig,

    /// Upstream renderer.
    pub origin: OriginConfig,

    /// Admin API settings.
    pub admin: AdminConfig,
}

/// Listener configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct ListenerConfig {
    /// Bind address (e.g., "0.0.0.0:8080").
    pub bind_address: String,

    /// Maximum request body buffered for the pipeline, in bytes.
    pub max_body_bytes: usize,
}

impl Default for ListenerConfig {
    fn default() -> Self {
        Self {
            bind_address: "0.0.0.0:8080".to_string(),
            max_body_bytes: 2 * 1024 * 1024,
        }
    }
}

/// Timeout configuration for various operations.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct TimeoutConfig {
    /// Request timeout (total time for request/response) in seconds.
    pub request_secs: u64,

    /// Timeout for calls to the origin, middleware endpoint and external rewrites.
    pub upstream_secs: u64,
}

impl Default for TimeoutConfig {
    fn default() -> Self {
        Self {
            request_secs: 30,
            upstream_secs: 10,
        }
    }
}

/// Log output format.
#[derive(Debug, Clone, Copy, Deserialize, Serialize, PartialEq, Eq, Default)]
#[serde(rename_all = "lowercase")]
pub enum LogFormat {
    #[default]
    Pretty,
    Json,
}

/// Observability configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct ObservabilityConfig {
    /// Log level (trace, debug, info, warn, error).
    pub log_level: String,

    /// Log output format.
    pub log_format: LogFormat,

    /// Enable metrics endpoint.
    pub metrics_enabled: bool,

    /// Metrics endpoint bind address.
    pub metrics_address: String,
}

impl Default for ObservabilityConfig {
    fn default() -> Self {
        Self {
            log_level: "info".to_string(),
            log_format: LogFormat::Pretty,
            metrics_enabled: false,
            metrics_address: "0.0.0.0:9090".to_string(),
        }
    }
}

/// Path-level routing settings.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct RoutingConfig {
    /// Base path every request must live under (e.g. "/pos"). Empty disables it.
    pub base_path: String,

    /// `true` enforces a trailing slash, `false` strips it.
    pub trailing_slash: bool,

    /// Disable the trailing-slash redirect entirely.
    pub skip_trailing_slash_redirect: bool,

    /// Prefix identifying API paths, which are exempt from trailing-slash redirects.
    pub api_prefix: String,
}

impl Default for RoutingConfig {
    fn default() -> Self {
        Self {
            base_path: String::new(),
            trailing_slash: false,
            skip_trailing_slash_redirect: false,
            api_prefix: "/api".to_string(),
        }
    }
}

/// Locale configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct I18nConfig {
    /// Supported locales, in declaration order.
    pub locales: Vec<String>,

    /// Locale used when nothing else matches.
    pub default_locale: String,

    /// Redirect `/` to the detected locale.
    #[serde(default = "default_true")]
    pub locale_detection: bool,

    /// Cookie carrying the user's preferred locale.
    #[serde(default = "default_locale_cookie")]
    pub locale_cookie: String,

    /// Per-domain default locales.
    #[serde(default)]
    pub domains: Vec<DomainLocaleConfig>,
}

/// A domain that owns a default locale.
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct DomainLocaleConfig {
    /// Host name, without port.
    pub domain: String,

    /// Default locale for this domain.
    pub default_locale: String,

    /// Additional locales served from this domain.
    #[serde(default)]
    pub locales: Vec<String>,

    /// Serve over plain HTTP when redirecting to this domain.
    #[serde(default)]
    pub http: bool,
}

fn default_true() -> bool {
    true
}

fn default_locale_cookie() -> String {
    "locale".to_string()
}

/// Kind of route in the manifest.
#[derive(Debug, Clone, Copy, Deserialize, Serialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum RouteKindConfig {
    Static,
    Dynamic,
    Api,
}

/// A single route from the build manifest.
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct RouteConfig {
    /// Page pattern, e.g. "/products/[id]" or "/docs/[...slug]".
    pub page: String,

    /// Route kind.
    pub kind: RouteKindConfig,

    /// Identifier handed to the renderer. Defaults to `page`.
    #[serde(default)]
    pub page_id: Option<String>,

    /// Serve paths not in `prerendered` through the renderer (dynamic routes only).
    #[serde(default = "default_true")]
    pub fallback: bool,

    /// Paths generated at build time.
    #[serde(default)]
    pub prerendered: Vec<String>,

    /// Revalidate window in seconds. Absent means the entry never expires.
    #[serde(default)]
    pub revalidate: Option<u64>,
}

/// Predicate source for `has`/`missing` conditions.
#[derive(Debug, Clone, Copy, Deserialize, Serialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum ConditionSource {
    Header,
    Cookie,
    Query,
    Host,
}

/// A `has`/`missing` condition.
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct ConditionConfig {
    /// What part of the request to inspect.
    #[serde(rename = "type")]
    pub source: ConditionSource,

    /// Header/cookie/query name. Ignored for `host`.
    #[serde(default)]
    pub key: Option<String>,

    /// Regex the value must fully match. Absent means presence only.
    #[serde(default)]
    pub value: Option<String>,
}

/// A redirect or rewrite rule.
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct RuleConfig {
    /// Source pattern, e.g. "/old/:id".
    pub source: String,

    /// Destination template, e.g. "/new/:id" or "https://other.example/:path*".
    pub destination: String,

    #[serde(default)]
    pub has: Vec<ConditionConfig>,

    #[serde(default)]
    pub missing: Vec<ConditionConfig>,

    /// Redirects only: 308 when true, 307 otherwise.
    #[serde(default)]
    pub permanent: bool,

    /// Redirects only: explicit status, overrides `permanent`.
    #[serde(default)]
    pub status_code: Option<u16>,

    /// Internal rules are generated by the framework and never answer with a redirect.
    #[serde(default)]
    pub internal: bool,
}

/// Rewrite rules grouped by phase.
#[derive(Debug, Clone, Deserialize, Serialize, Default)]
#[serde(default)]
pub struct RewritesConfig {
    pub before_files: Vec<RuleConfig>,
    pub after_files: Vec<RuleConfig>,
    pub fallback: Vec<RuleConfig>,
}

/// A static header to apply.
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct HeaderValueConfig {
    pub key: String,
    pub value: String,
}

/// Static response headers for paths matching `source`.
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct HeaderRuleConfig {
    pub source: String,
    pub headers: Vec<HeaderValueConfig>,
    #[serde(default)]
    pub has: Vec<ConditionConfig>,
    #[serde(default)]
    pub missing: Vec<ConditionConfig>,
}

/// Which side wins when middleware and static config set the same response header.
#[derive(Debug, Clone, Copy, Deserialize, Serialize, PartialEq, Eq, Default)]
#[serde(rename_all = "lowercase")]
pub enum HeaderPrecedence {
    /// Static config headers override middleware headers.
    #[default]
    Config,
    /// Middleware headers override static config headers.
    Middleware,
}

/// User middleware configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct MiddlewareConfig {
    /// Path patterns the middleware runs on. Empty means every path.
    pub matchers: Vec<String>,

    /// Endpoint implementing the middleware over HTTP. Absent disables it.
    pub endpoint: Option<String>,

    /// Header reconciliation policy.
    pub header_precedence: HeaderPrecedence,
}

impl Default for MiddlewareConfig {
    fn default() -> Self {
        Self {
            matchers: Vec::new(),
            endpoint: None,
            header_precedence: HeaderPrecedence::Config,
        }
    }
}

/// Asset short-circuit configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct AssetsConfig {
    /// Path prefixes served as build assets.
    pub prefixes: Vec<String>,

    /// Individual public files (e.g. "/favicon.ico").
    pub public_files: Vec<String>,
}

impl Default for AssetsConfig {
    fn default() -> Self {
        Self {
            prefixes: vec!["/_next/static/".to_string()],
            public_files: Vec::new(),
        }
    }
}

/// Incremental cache configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct CacheConfig {
    /// Diagnostic header carrying HIT/STALE/MISS/ERROR.
    pub status_header: String,

    /// Revalidate window applied to routes without their own. Absent means immutable.
    pub default_revalidate: Option<u64>,

    /// Entry cap of the in-memory store; the oldest write is evicted beyond it.
    pub max_entries: usize,
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            status_header: "x-edge-cache".to_string(),
            default_revalidate: None,
            max_entries: 10_000,
        }
    }
}

/// Revalidation queue configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct RevalidationConfig {
    /// Number of queue partitions.
    pub shard_count: u32,

    /// How long a dedupe key suppresses duplicate jobs, in seconds.
    pub dedupe_window_secs: u64,

    /// Run in-process workers consuming the queue.
    pub workers_enabled: bool,
}

impl Default for RevalidationConfig {
    fn default() -> Self {
        Self {
            shard_count: 10,
            dedupe_window_secs: 300,
            workers_enabled: true,
        }
    }
}

/// Upstream renderer configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct OriginConfig {
    /// Base URL of the rendering server.
    pub url: String,
}

impl Default for OriginConfig {
    fn default() -> Self {
        Self {
            url: "http://127.0.0.1:3000".to_string(),
        }
    }
}

/// Admin API configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct AdminConfig {
    /// Enable admin API.
    pub enabled: bool,

    /// API key for authentication (Bearer token).
    pub api_key: String,

    /// Admin API bind address.
    pub bind_address: String,
}

impl Default for AdminConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            api_key: "CHANGE_ME_IN_PRODUCTION".to_string(),
            bind_address: "127.0.0.1:8081".to_string(),
        }
    }
}
