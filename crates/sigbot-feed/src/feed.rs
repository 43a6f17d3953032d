//! Price feed over a venue.

use sigbot_core::{Candle, CandleInterval, InstrumentSpec, Price, Symbol};
use sigbot_venue::DynVenue;
use tracing::debug;

use crate::error::{FeedError, FeedResult};
use crate::spec_cache::SpecCache;

/// Highest high and lowest low over a candle window.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SwingRange {
    pub high: Price,
    pub low: Price,
}

impl SwingRange {
    /// Range over a non-empty candle slice.
    pub fn from_candles(candles: &[Candle]) -> Option<Self> {
        let first = candles.first()?;
        Some(candles.iter().skip(1).fold(
            Self {
                high: first.high,
                low: first.low,
            },
            |acc, c| Self {
                high: acc.high.max(c.high),
                low: acc.low.min(c.low),
            },
        ))
    }
}

/// Reference price, candles and instrument precision for a symbol.
pub struct PriceFeed {
    venue: DynVenue,
    specs: SpecCache,
}

impl PriceFeed {
    pub fn new(venue: DynVenue) -> Self {
        Self {
            venue,
            specs: SpecCache::new(),
        }
    }

    #[must_use]
    pub fn venue(&self) -> &DynVenue {
        &self.venue
    }

    /// Current reference price. Non-positive prices are rejected.
    pub async fn price(&self, symbol: &Symbol) -> FeedResult<Price> {
        let price = self.venue.get_price(symbol).await?;
        if !price.is_positive() {
            return Err(FeedError::InvalidData(format!(
                "non-positive price {price} for {symbol}"
            )));
        }
        Ok(price)
    }

    /// Instrument precision, served from cache after the first fetch.
    pub async fn instrument(&self, symbol: &Symbol) -> FeedResult<InstrumentSpec> {
        if let Some(spec) = self.specs.get(symbol) {
            return Ok(spec);
        }
        let spec = self.venue.get_instrument(symbol).await?;
        if spec.tick_size.is_sign_negative() || spec.tick_size.is_zero() {
            return Err(FeedError::InvalidData(format!(
                "invalid tick size {} for {symbol}",
                spec.tick_size
            )));
        }
        debug!(
            %symbol,
            tick_size = %spec.tick_size,
            qty_step = %spec.qty_step,
            "Instrument spec cached"
        );
        self.specs.update(spec.clone());
        Ok(spec)
    }

    /// Most recent `count` candles, oldest first.
    pub async fn candles(
        &self,
        symbol: &Symbol,
        interval: CandleInterval,
        count: usize,
    ) -> FeedResult<Vec<Candle>> {
        Ok(self.venue.get_candles(symbol, interval, count).await?)
    }

    /// Swing high/low over the last `lookback` candles.
    pub async fn swing(
        &self,
        symbol: &Symbol,
        interval: CandleInterval,
        lookback: usize,
    ) -> FeedResult<SwingRange> {
        let candles = self.candles(symbol, interval, lookback).await?;
        SwingRange::from_candles(&candles).ok_or_else(|| FeedError::NoCandles(symbol.to_string()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;
    use rust_decimal_macros::dec;
    use sigbot_venue::{PaperOp, PaperVenue};
    use std::sync::Arc;

    fn candle(high: rust_decimal::Decimal, low: rust_decimal::Decimal) -> Candle {
        Candle {
            open_time: Utc::now(),
            open: Price::new(low),
            high: Price::new(high),
            low: Price::new(low),
            close: Price::new(high),
        }
    }

    #[test]
    fn test_swing_range() {
        let candles = vec![
            candle(dec!(105), dec!(99)),
            candle(dec!(110), dec!(101)),
            candle(dec!(103), dec!(97)),
        ];
        let range = SwingRange::from_candles(&candles).unwrap();
        assert_eq!(range.high, Price::new(dec!(110)));
        assert_eq!(range.low, Price::new(dec!(97)));
        assert!(SwingRange::from_candles(&[]).is_none());
    }

    #[tokio::test]
    async fn test_instrument_is_cached() {
        let venue = Arc::new(PaperVenue::new(dec!(100)));
        let feed = PriceFeed::new(venue.clone());
        let symbol = Symbol::new("BTCUSDT");

        feed.instrument(&symbol).await.unwrap();
        feed.instrument(&symbol).await.unwrap();
        assert_eq!(venue.calls(PaperOp::Instrument), 1);
    }

    #[tokio::test]
    async fn test_swing_uses_lookback_window() {
        let venue = Arc::new(PaperVenue::new(dec!(100)));
        let symbol = Symbol::new("BTCUSDT");
        venue.set_candles(
            &symbol,
            vec![
                candle(dec!(200), dec!(50)),
                candle(dec!(105), dec!(99)),
                candle(dec!(104), dec!(98)),
            ],
        );
        let feed = PriceFeed::new(venue);
        let range = feed
            .swing(&symbol, CandleInterval::FifteenMinutes, 2)
            .await
            .unwrap();
        assert_eq!(range.high, Price::new(dec!(105)));
        assert_eq!(range.low, Price::new(dec!(98)));
    }

    #[tokio::test]
    async fn test_price_propagates_venue_error() {
        let venue = Arc::new(PaperVenue::new(dec!(100)));
        let feed = PriceFeed::new(venue);
        let err = feed.price(&Symbol::new("BTCUSDT")).await.unwrap_err();
        assert!(matches!(err, FeedError::Venue(_)));
    }
}
