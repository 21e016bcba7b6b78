//! Edge request routing and incremental-cache interception.

pub mod admin;
pub mod cache;
pub mod clock;
pub mod config;
pub mod error;
pub mod http;
pub mod lifecycle;
pub mod middleware;
pub mod observability;
pub mod pipeline;
pub mod revalidation;
pub mod rewrite;
pub mod routing;
pub mod upstream;

pub use config::schema::RouterConfig;
pub use http::HttpServer;
pub use lifecycle::Shutdown;
pub use pipeline::{Collaborators, Manifest, Pipeline};
