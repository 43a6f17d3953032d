//! Market data feed.
//!
//! Thin layer over the venue that the risk calculator, gateway and exit
//! monitor read prices and precision from.
//!
//! # Key Components
//!
//! - [`PriceFeed`]: Reference price, candle history and swing range
//! - [`SpecCache`]: Instrument precision cache, fetched once per symbol

pub mod error;
pub mod feed;
pub mod spec_cache;

pub use error::{FeedError, FeedResult};
pub use feed::{PriceFeed, SwingRange};
pub use spec_cache::{SpecCache, SpecCacheEntry};
