//! Configuration management subsystem.
//!
//! # Data Flow
//! ```text
//! config file (TOML)
//!     → loader.rs (parse & deserialize)
//!     → validation.rs (semantic checks)
//!     → RouterConfig (validated)
//!     → Manifest::compile (route table, rule sets, locale table)
//!     → shared via Arc with the pipeline
//! ```
//!
//! # Design Decisions
//! - Config is immutable once loaded; there is no hot reload
//! - All fields have defaults to allow minimal configs
//! - Validation separates syntactic (serde) from semantic checks
//! - Any error is fatal at startup, never per request

pub mod loader;
pub mod schema;
pub mod validation;

pub use loader::{load_config, parse_config, ConfigError};
pub use schema::{
    AdminConfig, AssetsConfig, CacheConfig, ConditionConfig, ConditionSource, DomainLocaleConfig,
    HeaderPrecedence, HeaderRuleConfig, HeaderValueConfig, I18nConfig, ListenerConfig, LogFormat,
    MiddlewareConfig, ObservabilityConfig, OriginConfig, RevalidationConfig, RewritesConfig,
    RouteConfig, RouteKindConfig, RouterConfig, RoutingConfig, RuleConfig, TimeoutConfig,
};
pub use validation::ValidationError;
