//! Take-profit / stop-loss calculation.
//!
//! Four mutually exclusive policies, selected per deployment:
//! - Percentage: levels at `entry * (1 ± percent)`
//! - Pips: levels at `entry ± pips * pip_size`
//! - Swing: stop at the recent swing extreme, target proportional to it
//! - Floating risk: caller-supplied stop, quantity sized to a fixed loss
//!
//! Computation never fails loudly: errors are logged and surfaced as
//! `RiskLevels { valid: false, .. }` so the caller aborts only that command.

pub mod calculator;
pub mod error;

pub use calculator::{
    floating_quantity, percentage_levels, pip_levels, swing_levels, RiskCalculator, RiskLevels,
};
pub use error::{RiskError, RiskResult};
