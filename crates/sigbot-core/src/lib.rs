//! Core domain types for the sigbot signal trader.
//!
//! This crate provides fundamental types used throughout the trading system:
//! - `Symbol`: Venue instrument identifier (e.g. `BTCUSDT`)
//! - `Price`, `Size`: Precision-safe numeric types
//! - `InstrumentSpec`: Tick size and lot step of an instrument
//! - `Side`, `OrderSide`: Position direction and order direction
//! - `StrategyCommand`, `RiskParams`: Parsed strategy signals
//! - `OrderUpdate`, `CreateType`: Venue push notifications

pub mod command;
pub mod decimal;
pub mod error;
pub mod market;
pub mod order;

pub use command::{CommandAction, CommandOrigin, RiskParams, StrategyCommand};
pub use decimal::{digits_from_step, Price, Size};
pub use error::{CoreError, Result};
pub use market::{Candle, CandleInterval, InstrumentSpec, Symbol};
pub use order::{CreateType, OrderId, OrderSide, OrderUpdate, Side, TriggerKind};
