//! Observability subsystem.
//!
//! # Data Flow
//! ```text
//! All subsystems produce:
//!     → logging.rs (structured log events)
//!     → metrics.rs (counters, histograms)
//!
//! Consumers:
//!     → Log aggregation (stdout, pretty or JSON)
//!     → Metrics endpoint (Prometheus scrape)
//! ```
//!
//! # Design Decisions
//! - Structured logging (JSON) for machine parsing
//! - Request ID, path and pipeline stage are log fields, not message text
//! - Cache status and middleware outcome are metric labels with small, fixed value sets

pub mod logging;
pub mod metrics;

pub use logging::init_tracing;
pub use metrics::init_metrics;
