//! Redirect and rewrite subsystem.
//!
//! # Data Flow
//! ```text
//! NormalizedUrl + InternalRequest
//!     → engine.rs redirect_check (slashes, locale, configured redirects)
//!     → engine.rs apply(phase) for before_files / after_files / fallback
//!         → rules.rs (pattern + has/missing predicates)
//!         → destination.rs (param substitution, internal vs external)
//! ```

pub mod destination;
pub mod engine;
pub mod rules;

pub use destination::Destination;
pub use engine::{Phase, RewriteEngine, RewriteOutcome};
pub use rules::{Condition, HeaderRules, Rule, RuleSet};
