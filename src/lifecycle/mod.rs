//! Lifecycle management subsystem.
//!
//! # Data Flow
//! ```text
//! Startup (startup.rs):
//!     Validated config → Manifest → Pipeline + workers → Admin API → Public listener
//!
//! Shutdown (shutdown.rs):
//!     Trigger → Servers stop accepting and drain → Workers stop → Exit
//!
//! Signals (signals.rs):
//!     SIGTERM/SIGINT → Trigger graceful shutdown
//! ```

pub mod shutdown;
pub mod signals;
pub mod startup;

pub use shutdown::Shutdown;
pub use startup::{build_services, run, Services, StartupError};
