//! Routing subsystem.
//!
//! # Data Flow
//! ```text
//! Incoming Request (host, path, headers)
//!     → normalize.rs (base path, slashes, decoding, locale)
//!     → router.rs (static / pre-generated / dynamic lookup)
//!     → fallback.rs (404 vs pass-through for unmatched dynamic paths)
//!
//! Route Compilation (at startup):
//!     RouteConfig[]
//!     → matcher.rs (compile patterns into anchored regexes)
//!     → Sort dynamic routes by specificity
//!     → Freeze as immutable RouteTable
//! ```
//!
//! # Design Decisions
//! - Routes compiled at startup, immutable at runtime
//! - Literal pages and pre-generated paths are hash lookups
//! - Deterministic: same input always matches same route

pub mod fallback;
pub mod locale;
pub mod matcher;
pub mod normalize;
pub mod router;

pub use fallback::{resolve_fallback, FallbackDecision};
pub use locale::{LocaleSource, LocaleTable};
pub use matcher::{Params, PathPattern};
pub use normalize::{NormalizedUrl, OutsideBasePath, UrlNormalizer};
pub use router::{Revalidate, RouteDefinition, RouteKind, RouteMatch, RouteTable};
