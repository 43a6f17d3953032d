//! Trading venue capability.
//!
//! The orchestrator talks to an exchange only through the [`Venue`] trait.
//!
//! # Key Components
//!
//! - [`Venue`]: Object-safe async capability (prices, precision, balance,
//!   candles, leverage, orders, order-update stream)
//! - [`PaperVenue`]: In-memory simulated exchange with failure injection,
//!   used for dry deployments and tests
//! - [`BybitVenue`]: Bybit v5 linear-perpetual REST client plus private
//!   order stream

pub mod bybit;
pub mod error;
pub mod paper;
pub mod venue;

pub use bybit::{BybitConfig, BybitVenue};
pub use error::{VenueError, VenueResult};
pub use paper::{PaperOp, PaperVenue};
pub use venue::{
    BoxFuture, DynVenue, MarketOrderRequest, OrderState, OrderStatus, TriggerOrderRequest, Venue,
};

use std::sync::Once;

static INIT_CRYPTO: Once = Once::new();

/// Initialize the TLS crypto provider.
/// Must be called before any WebSocket connections are made.
pub fn init_crypto() {
    INIT_CRYPTO.call_once(|| {
        let _ = rustls::crypto::ring::default_provider().install_default();
    });
}
