//! Outbound traffic: origin renderer, middleware endpoint, external rewrites.
//!
//! # Data Flow
//! ```text
//! Orchestrator Dispatch
//!     → renderer.rs (origin render, cache write)
//!         → client.rs (hyper-util client, buffered responses)
//! Middleware stage
//!     → middleware.rs (HTTP middleware endpoint) → client.rs
//! External rewrite
//!     → proxy.rs (reqwest, https capable)
//! ```

pub mod client;
pub mod middleware;
pub mod proxy;
pub mod renderer;

pub use middleware::HttpMiddleware;
pub use proxy::{ExternalProxy, HttpExternalProxy};
pub use renderer::{DispatchKind, OriginRenderer, Renderer, ResolvedRoute};
