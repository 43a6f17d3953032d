//! Single-position ledger.
//!
//! Holds at most one [`Position`]. `close` only succeeds for the tracked
//! `(symbol, side)` while the slot is occupied, so when the polling path and
//! the order stream both report the same exit, only the first one gets the
//! position back.

use chrono::{DateTime, Duration, Utc};
use parking_lot::Mutex;
use serde::Serialize;
use sigbot_core::{OrderId, Price, Side, Size, Symbol};
use tracing::{debug, info};

use crate::error::{PositionError, PositionResult};

/// The open position.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Position {
    pub symbol: Symbol,
    pub side: Side,
    pub entry_price: Price,
    pub quantity: Size,
    pub order_id: OrderId,
    pub opened_at: DateTime<Utc>,
    pub take_profit: Option<Price>,
    pub stop_loss: Option<Price>,
    /// Resting stop order on the venue.
    pub stop_order_id: Option<OrderId>,
    /// Resting take-profit order. `None` with a `take_profit` level means
    /// the target is watched locally and must be closed by the bot.
    pub take_profit_order_id: Option<OrderId>,
}

impl Position {
    #[must_use]
    pub fn matches(&self, symbol: &Symbol, side: Side) -> bool {
        &self.symbol == symbol && self.side == side
    }

    /// Resting stop and take-profit orders, cancelled on a manual close.
    #[must_use]
    pub fn protective_orders(&self) -> Vec<OrderId> {
        self.stop_order_id
            .iter()
            .chain(self.take_profit_order_id.iter())
            .cloned()
            .collect()
    }

    /// Take-profit level with no venue order behind it.
    #[must_use]
    pub fn has_local_take_profit(&self) -> bool {
        self.take_profit.is_some() && self.take_profit_order_id.is_none()
    }

    /// Time since the position was opened.
    #[must_use]
    pub fn held_for(&self, now: DateTime<Utc>) -> Duration {
        now - self.opened_at
    }
}

#[derive(Debug, Default)]
pub struct PositionLedger {
    slot: Mutex<Option<Position>>,
}

impl PositionLedger {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Record a newly opened position. Fails if one is already open.
    pub fn open(&self, position: Position) -> PositionResult<()> {
        let mut slot = self.slot.lock();
        if let Some(existing) = slot.as_ref() {
            return Err(PositionError::AlreadyOpen(format!(
                "{} {}",
                existing.symbol, existing.side
            )));
        }
        info!(
            symbol = %position.symbol,
            side = %position.side,
            entry = %position.entry_price,
            qty = %position.quantity,
            order_id = %position.order_id,
            "Position opened"
        );
        *slot = Some(position);
        Ok(())
    }

    /// Close the tracked position if it matches `(symbol, side)`.
    ///
    /// Returns the closed position to exactly one caller; later or
    /// mismatched calls get `None`.
    pub fn close(&self, symbol: &Symbol, side: Side) -> Option<Position> {
        let mut slot = self.slot.lock();
        match slot.as_ref() {
            Some(p) if p.matches(symbol, side) => {
                let closed = slot.take();
                info!(%symbol, %side, "Position closed in ledger");
                closed
            }
            Some(p) => {
                debug!(
                    %symbol,
                    %side,
                    tracked_symbol = %p.symbol,
                    tracked_side = %p.side,
                    "Close does not match tracked position, ignored"
                );
                None
            }
            None => {
                debug!(%symbol, %side, "No open position, close ignored");
                None
            }
        }
    }

    #[must_use]
    pub fn current(&self) -> Option<Position> {
        self.slot.lock().clone()
    }

    #[must_use]
    pub fn is_open(&self) -> bool {
        self.slot.lock().is_some()
    }
}
