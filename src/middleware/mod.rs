//! User middleware subsystem.
//!
//! # Data Flow
//! ```text
//! InternalRequest (after redirect checks)
//!     → executor.rs (matcher check, invoke with timeout, reconcile headers)
//!         → Continue { rewrite, response_headers } | ShortCircuit(response)
//!     → merge.rs (response headers vs static config headers, at response time)
//!
//! Background work:
//!     → tasks.rs (RequestScope, joined after the response is sent)
//! ```

pub mod executor;
pub mod merge;
pub mod tasks;

pub use executor::{Geo, Middleware, MiddlewareExecutor, MiddlewareOutcome, MiddlewareRequest};
pub use merge::merge_response_headers;
pub use tasks::RequestScope;
