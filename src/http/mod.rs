//! HTTP protocol handling subsystem.
//!
//! # Data Flow
//! ```text
//! TCP connection
//!     → server.rs (Axum setup, layers, body buffering)
//!     → request.rs (InternalRequest: host, path, query, cookies)
//!     → pipeline (routing, cache, dispatch)
//!     → response.rs (EdgeResponse → Axum response)
//!     → Send to client
//! ```

pub mod headers;
pub mod request;
pub mod response;
pub mod server;

pub use headers::{HeaderMapExt, Query};
pub use request::{InternalRequest, X_REQUEST_ID};
pub use response::EdgeResponse;
pub use server::{build_router, AppState, HttpServer};
