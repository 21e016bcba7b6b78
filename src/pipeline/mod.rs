//! Request pipeline: compiled manifest plus the stage orchestrator.
//!
//! # Data Flow
//! ```text
//! RouterConfig (validated)
//!     → manifest.rs (compile once: routes, rules, locales, header rules)
//! InternalRequest
//!     → orchestrator.rs (forward-only stages, synthetic /500 on error)
//!     → (EdgeResponse, RequestScope)
//! ```

pub mod manifest;
pub mod orchestrator;

pub use manifest::Manifest;
pub use orchestrator::{Collaborators, Pipeline, Stage};
