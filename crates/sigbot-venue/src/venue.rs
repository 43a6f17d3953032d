//! Venue trait for market data and order placement.
//!
//! Provides a trait-based abstraction over the exchange so that the
//! gateway, feed and monitor can run against a real venue or the paper
//! venue without change.

use std::pin::Pin;
use std::sync::Arc;

use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use sigbot_core::{
    Candle, CandleInterval, InstrumentSpec, OrderId, OrderSide, OrderUpdate, Price, Size, Symbol,
    TriggerKind,
};
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;

use crate::error::VenueResult;

/// Boxed future for dyn-compatible async trait methods.
pub type BoxFuture<'a, T> = Pin<Box<dyn std::future::Future<Output = T> + Send + 'a>>;

/// Market order, optionally carrying attached TP/SL prices.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MarketOrderRequest {
    pub symbol: Symbol,
    pub side: OrderSide,
    pub qty: Size,
    pub reduce_only: bool,
    pub take_profit: Option<Price>,
    pub stop_loss: Option<Price>,
}

impl MarketOrderRequest {
    /// Plain market order opening or adding to a position.
    pub fn entry(symbol: Symbol, side: OrderSide, qty: Size) -> Self {
        Self {
            symbol,
            side,
            qty,
            reduce_only: false,
            take_profit: None,
            stop_loss: None,
        }
    }

    /// Reduce-only market order flattening a position.
    pub fn close(symbol: Symbol, side: OrderSide, qty: Size) -> Self {
        Self {
            symbol,
            side,
            qty,
            reduce_only: true,
            take_profit: None,
            stop_loss: None,
        }
    }
}

/// Reduce-only trigger order (stop-loss or take-profit leg).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TriggerOrderRequest {
    pub symbol: Symbol,
    /// Side of the trigger order itself (opposite of the position).
    pub side: OrderSide,
    pub trigger_price: Price,
    pub qty: Size,
    pub kind: TriggerKind,
}

/// Lifecycle state of a venue order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum OrderState {
    /// Resting, may still fill.
    Open,
    /// Trigger order waiting for its trigger price.
    Untriggered,
    Filled,
    Cancelled,
    Rejected,
}

impl OrderState {
    /// Whether the order can still be cancelled.
    #[must_use]
    pub fn is_cancellable(&self) -> bool {
        matches!(self, Self::Open | Self::Untriggered)
    }
}

/// Snapshot of a venue order.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OrderStatus {
    pub order_id: OrderId,
    pub symbol: Symbol,
    pub side: OrderSide,
    pub state: OrderState,
    pub filled_qty: Size,
}

/// Trading venue capability.
///
/// All network calls are expected to carry their own bounded timeouts.
pub trait Venue: Send + Sync {
    /// Short venue name for logs.
    fn name(&self) -> &str;

    /// Whether [`Venue::subscribe_order_updates`] is available.
    fn supports_order_stream(&self) -> bool;

    /// Current reference (last traded) price.
    fn get_price<'a>(&'a self, symbol: &'a Symbol) -> BoxFuture<'a, VenueResult<Price>>;

    /// Tick size and lot step for a symbol.
    fn get_instrument<'a>(&'a self, symbol: &'a Symbol)
        -> BoxFuture<'a, VenueResult<InstrumentSpec>>;

    /// Available balance of `asset`.
    fn get_balance<'a>(&'a self, asset: &'a str) -> BoxFuture<'a, VenueResult<Decimal>>;

    /// Most recent `count` candles, oldest first.
    fn get_candles<'a>(
        &'a self,
        symbol: &'a Symbol,
        interval: CandleInterval,
        count: usize,
    ) -> BoxFuture<'a, VenueResult<Vec<Candle>>>;

    /// Set leverage for both sides of a symbol.
    fn set_leverage<'a>(&'a self, symbol: &'a Symbol, leverage: u32)
        -> BoxFuture<'a, VenueResult<()>>;

    fn place_market_order(&self, req: MarketOrderRequest) -> BoxFuture<'_, VenueResult<OrderId>>;

    fn place_reduce_only_order(
        &self,
        req: TriggerOrderRequest,
    ) -> BoxFuture<'_, VenueResult<OrderId>>;

    /// Look up an order; `Ok(None)` when the venue does not know it.
    fn get_order<'a>(
        &'a self,
        symbol: &'a Symbol,
        order_id: &'a OrderId,
    ) -> BoxFuture<'a, VenueResult<Option<OrderStatus>>>;

    fn cancel_order<'a>(
        &'a self,
        symbol: &'a Symbol,
        order_id: &'a OrderId,
    ) -> BoxFuture<'a, VenueResult<()>>;

    /// Subscribe to order updates until `shutdown` is cancelled.
    fn subscribe_order_updates(
        &self,
        shutdown: CancellationToken,
    ) -> BoxFuture<'_, VenueResult<mpsc::Receiver<OrderUpdate>>>;
}

/// Arc wrapper for Venue trait objects.
pub type DynVenue = Arc<dyn Venue>;
