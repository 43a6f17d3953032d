//! Strategy commands produced from authenticated signals.
//!
//! A command carries its risk parameters already resolved for the
//! deployment's policy, so downstream components never inspect the
//! originating payload again.

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::fmt;

use crate::decimal::Price;
use crate::market::{CandleInterval, Symbol};
use crate::order::Side;

/// What a command asks the orchestrator to do.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum CommandAction {
    /// Open a position in the given direction.
    Open(Side),
    /// Close an open position in the given direction.
    Close(Side),
}

impl CommandAction {
    #[must_use]
    pub fn side(&self) -> Side {
        match self {
            Self::Open(side) | Self::Close(side) => *side,
        }
    }
}

impl fmt::Display for CommandAction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Open(side) => write!(f, "open {side}"),
            Self::Close(side) => write!(f, "close {side}"),
        }
    }
}

/// Where a command came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum CommandOrigin {
    /// Received from the external signal source.
    Signal,
    /// Generated internally after a cancel with reverse enabled.
    Reversal,
}

/// Risk parameters, one variant per TP/SL policy.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum RiskParams {
    /// Levels at `entry * (1 ± percent)`. Percents are fractions (0.02 = 2%).
    Percentage {
        take_percent: Decimal,
        loss_percent: Decimal,
    },
    /// Levels at `entry ± pips * pip_size`.
    Pips {
        take_pips: Decimal,
        loss_pips: Decimal,
        pip_size: Decimal,
    },
    /// Stop at the recent swing extreme, target at `take_ratio` times that distance.
    Swing {
        lookback: usize,
        interval: CandleInterval,
        take_ratio: Decimal,
    },
    /// Fixed quote-currency risk with an explicit stop; size derived from the stop distance.
    FloatingRisk {
        risk_amount: Decimal,
        stop_loss: Price,
        take_profit: Option<Price>,
    },
}

impl RiskParams {
    /// Policy name for logs and metrics.
    #[must_use]
    pub fn policy_name(&self) -> &'static str {
        match self {
            Self::Percentage { .. } => "percentage",
            Self::Pips { .. } => "pips",
            Self::Swing { .. } => "swing",
            Self::FloatingRisk { .. } => "floating_risk",
        }
    }

    #[must_use]
    pub fn is_floating_risk(&self) -> bool {
        matches!(self, Self::FloatingRisk { .. })
    }
}

/// Parsed, authenticated strategy command.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StrategyCommand {
    pub action: CommandAction,
    pub symbol: Symbol,
    pub risk: RiskParams,
    pub origin: CommandOrigin,
    pub received_at: DateTime<Utc>,
}

impl StrategyCommand {
    pub fn new(action: CommandAction, symbol: Symbol, risk: RiskParams) -> Self {
        Self {
            action,
            symbol,
            risk,
            origin: CommandOrigin::Signal,
            received_at: Utc::now(),
        }
    }

    /// Opposite-side open issued after a cancel with reverse enabled.
    #[must_use]
    pub fn reversal_of(&self, closed_side: Side) -> Self {
        Self {
            action: CommandAction::Open(closed_side.opposite()),
            symbol: self.symbol.clone(),
            risk: self.risk.clone(),
            origin: CommandOrigin::Reversal,
            received_at: Utc::now(),
        }
    }
}
