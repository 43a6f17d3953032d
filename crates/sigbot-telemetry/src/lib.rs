//! Observability for sigbot.
//!
//! # Key Components
//!
//! - [`init_logging`]: Global `tracing` subscriber, pretty or JSON by `RUST_ENV`
//! - [`Metrics`]: Prometheus counters and gauges for signals, commands,
//!   order legs, compensation and exits

pub mod error;
pub mod logging;
pub mod metrics;

pub use error::{TelemetryError, TelemetryResult};
pub use logging::{init_logging, init_logging_with, LogFormat};
pub use metrics::Metrics;
