//! Position state and exit detection for sigbot.
//!
//! Exactly one position may be open at a time. The ledger owns it, and the
//! exit monitor reports when it closed, either by polling the reference
//! price against TP/SL or by classifying venue order updates.
//!
//! # Key Components
//!
//! - [`Position`]: The tracked open position
//! - [`PositionLedger`]: Guarded single-slot store; the first matching close wins
//! - [`ExitMonitor`]: Idle/Monitoring/Closed/Cancelled state machine with
//!   polling and streaming detection
//! - [`ExitEvent`]: Generation-tagged [`MonitorResult`] sent to the orchestrator

pub mod error;
pub mod ledger;
pub mod monitor;

pub use error::{PositionError, PositionResult};
pub use ledger::{Position, PositionLedger};
pub use monitor::{
    ExitEvent, ExitKind, ExitMonitor, ExitTarget, MonitorMode, MonitorResult, MonitorState,
};
