//! # surveyor-telemetry
//!
//! Structured logging for Surveyor runs.
//!
//! ## Usage
//!
//! ```rust
//! use surveyor_telemetry::{info, init_telemetry, run_span};
//!
//! init_telemetry("surveyor").expect("telemetry");
//! let span = run_span(4, 12);
//! let _enter = span.enter();
//! info!("run started");
//! ```

pub mod init;
pub mod spans;

// Re-export tracing macros for convenience
pub use tracing::{Instrument, Span, debug, error, info, instrument, trace, warn};

pub use init::{init_json_telemetry, init_telemetry};
pub use spans::*;
