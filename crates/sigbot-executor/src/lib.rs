//! Order placement for sigbot.
//!
//! # Key Components
//!
//! - [`OrderGateway`]: Opens positions as entry + stop + optional take-profit
//!   legs, compensates when a protective leg fails, closes positions with a
//!   reduce-only market order
//! - [`GatewayConfig`]: Sizing, leverage and dry-run switch
//!
//! # Open protocol
//!
//! 1. Set leverage (failure is logged, not fatal)
//! 2. Size: `round(balance * size_percent * leverage / price, qty_digits)`
//!    or a caller-supplied quantity
//! 3. Market entry; failure aborts with nothing at risk
//! 4. Reduce-only stop; failure -> compensate -> error
//! 5. Reduce-only take-profit (if any); failure -> compensate -> error
//!
//! A failed compensation is a [`ExecutorError::CriticalInconsistency`]: the
//! venue may hold an unprotected position and nothing is retried.

pub mod error;
pub mod gateway;

pub use error::{ExecutorError, ExecutorResult};
pub use gateway::{ClosedOrder, GatewayConfig, OpenRequest, OrderGateway, PlacedOrder, Sizing};
