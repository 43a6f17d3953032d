//! Risk level calculator.

use std::sync::Arc;

use rust_decimal::Decimal;
use serde::Serialize;
use sigbot_core::{Price, RiskParams, Side, Size, Symbol};
use sigbot_feed::{PriceFeed, SwingRange};
use tracing::{debug, warn};

use crate::error::{RiskError, RiskResult};

// ============================================================================
// RiskLevels
// ============================================================================

/// Output of a risk computation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct RiskLevels {
    pub reference_price: Price,
    pub take_profit: Option<Price>,
    pub stop_loss: Option<Price>,
    /// Set only by the floating-risk policy.
    pub quantity: Option<Size>,
    pub valid: bool,
    /// Why the computation failed, when `valid` is false.
    pub reason: Option<String>,
}

impl RiskLevels {
    fn invalid(reference_price: Price, reason: String) -> Self {
        Self {
            reference_price,
            take_profit: None,
            stop_loss: None,
            quantity: None,
            valid: false,
            reason: Some(reason),
        }
    }
}

// ============================================================================
// Policy math
// ============================================================================

/// Percentage policy. Percents are fractions (0.02 = 2%).
pub fn percentage_levels(
    entry: Price,
    side: Side,
    take_percent: Decimal,
    loss_percent: Decimal,
) -> (Price, Price) {
    match side {
        Side::Long => (
            entry * (Decimal::ONE + take_percent),
            entry * (Decimal::ONE - loss_percent),
        ),
        Side::Short => (
            entry * (Decimal::ONE - take_percent),
            entry * (Decimal::ONE + loss_percent),
        ),
    }
}

/// Pip policy.
pub fn pip_levels(
    entry: Price,
    side: Side,
    take_pips: Decimal,
    loss_pips: Decimal,
    pip_size: Decimal,
) -> (Price, Price) {
    let take = take_pips * pip_size;
    let loss = loss_pips * pip_size;
    match side {
        Side::Long => (entry + take, entry - loss),
        Side::Short => (entry - take, entry + loss),
    }
}

/// Swing policy.
///
/// Long: stop at the swing low, which must not be above entry.
/// Short: stop at the swing high, which must not be below entry.
pub fn swing_levels(
    entry: Price,
    side: Side,
    range: SwingRange,
    take_ratio: Decimal,
) -> RiskResult<(Price, Price)> {
    match side {
        Side::Long => {
            if range.low > entry {
                return Err(RiskError::InvariantViolation(format!(
                    "swing low {} above entry {entry}",
                    range.low
                )));
            }
            Ok((entry + entry.distance(range.low) * take_ratio, range.low))
        }
        Side::Short => {
            if range.high < entry {
                return Err(RiskError::InvariantViolation(format!(
                    "swing high {} below entry {entry}",
                    range.high
                )));
            }
            Ok((entry - entry.distance(range.high) * take_ratio, range.high))
        }
    }
}

/// Floating-risk sizing: quantity that loses exactly `risk_amount` when
/// stopped out, floored to the lot step.
///
/// notional = risk / (|entry - stop| / entry), quantity = notional / entry.
pub fn floating_quantity(
    entry: Price,
    side: Side,
    stop_loss: Price,
    risk_amount: Decimal,
    qty_step: Decimal,
) -> RiskResult<Size> {
    let wrong_side = match side {
        Side::Long => stop_loss >= entry,
        Side::Short => stop_loss <= entry,
    };
    if wrong_side {
        return Err(RiskError::InvariantViolation(format!(
            "{side} stop {stop_loss} is not on the losing side of entry {entry}"
        )));
    }
    if risk_amount <= Decimal::ZERO {
        return Err(RiskError::InvalidParams(format!(
            "risk amount must be positive, got {risk_amount}"
        )));
    }

    let stop_fraction = entry.distance(stop_loss) / entry.inner();
    let notional = risk_amount / stop_fraction;
    let qty = Size::new(notional / entry.inner()).floor_to_step(qty_step);
    if !qty.is_positive() {
        return Err(RiskError::InvalidParams(format!(
            "risk {risk_amount} sizes below lot step {qty_step}"
        )));
    }
    Ok(qty)
}

// ============================================================================
// RiskCalculator
// ============================================================================

/// Computes [`RiskLevels`] for a command from live feed data.
pub struct RiskCalculator {
    feed: Arc<PriceFeed>,
}

impl RiskCalculator {
    pub fn new(feed: Arc<PriceFeed>) -> Self {
        Self { feed }
    }

    /// Compute levels for `side` on `symbol`. Failures come back as `valid = false`.
    pub async fn compute(&self, symbol: &Symbol, side: Side, params: &RiskParams) -> RiskLevels {
        match self.try_compute(symbol, side, params).await {
            Ok(levels) => {
                debug!(
                    %symbol,
                    %side,
                    policy = params.policy_name(),
                    entry = %levels.reference_price,
                    take_profit = ?levels.take_profit,
                    stop_loss = ?levels.stop_loss,
                    quantity = ?levels.quantity,
                    "Risk levels computed"
                );
                levels
            }
            Err(e) => {
                warn!(
                    %symbol,
                    %side,
                    policy = params.policy_name(),
                    error = %e,
                    "Risk computation failed"
                );
                RiskLevels::invalid(Price::ZERO, e.to_string())
            }
        }
    }

    async fn try_compute(
        &self,
        symbol: &Symbol,
        side: Side,
        params: &RiskParams,
    ) -> RiskResult<RiskLevels> {
        let entry = self.feed.price(symbol).await?;
        let spec = self.feed.instrument(symbol).await?;
        let digits = spec.price_digits();

        let (take_profit, stop_loss, quantity) = match params {
            RiskParams::Percentage {
                take_percent,
                loss_percent,
            } => {
                let (tp, sl) = percentage_levels(entry, side, *take_percent, *loss_percent);
                (Some(tp), sl, None)
            }
            RiskParams::Pips {
                take_pips,
                loss_pips,
                pip_size,
            } => {
                let (tp, sl) = pip_levels(entry, side, *take_pips, *loss_pips, *pip_size);
                (Some(tp), sl, None)
            }
            RiskParams::Swing {
                lookback,
                interval,
                take_ratio,
            } => {
                let range = self.feed.swing(symbol, *interval, *lookback).await?;
                let (tp, sl) = swing_levels(entry, side, range, *take_ratio)?;
                (Some(tp), sl, None)
            }
            RiskParams::FloatingRisk {
                risk_amount,
                stop_loss,
                take_profit,
            } => {
                let qty = floating_quantity(entry, side, *stop_loss, *risk_amount, spec.qty_step)?;
                (*take_profit, *stop_loss, Some(qty))
            }
        };

        Ok(RiskLevels {
            reference_price: entry,
            take_profit: take_profit.map(|p| p.round_dp(digits)),
            stop_loss: Some(stop_loss.round_dp(digits)),
            quantity,
            valid: true,
            reason: None,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;
    use rust_decimal_macros::dec;
    use sigbot_core::{Candle, CandleInterval, InstrumentSpec};
    use sigbot_venue::PaperVenue;

    fn p(d: Decimal) -> Price {
        Price::new(d)
    }

    #[test]
    fn test_percentage_long_and_short() {
        let (tp, sl) = percentage_levels(p(dec!(100)), Side::Long, dec!(0.02), dec!(0.01));
        assert_eq!((tp, sl), (p(dec!(102)), p(dec!(99))));

        let (tp, sl) = percentage_levels(p(dec!(100)), Side::Short, dec!(0.02), dec!(0.01));
        assert_eq!((tp, sl), (p(dec!(98)), p(dec!(101))));
    }

    #[test]
    fn test_pip_short() {
        let (tp, sl) = pip_levels(
            p(dec!(1.2345)),
            Side::Short,
            dec!(20),
            dec!(10),
            dec!(0.0001),
        );
        assert_eq!(tp, p(dec!(1.2325)));
        assert_eq!(sl, p(dec!(1.2355)));
    }

    #[test]
    fn test_swing_long_violation() {
        let range = SwingRange {
            high: p(dec!(110)),
            low: p(dec!(105)),
        };
        let err = swing_levels(p(dec!(100)), Side::Long, range, dec!(2)).unwrap_err();
        assert!(matches!(err, RiskError::InvariantViolation(_)));
    }

    #[test]
    fn test_swing_levels_both_sides() {
        let range = SwingRange {
            high: p(dec!(104)),
            low: p(dec!(97)),
        };
        let (tp, sl) = swing_levels(p(dec!(100)), Side::Long, range, dec!(2)).unwrap();
        assert_eq!((tp, sl), (p(dec!(106)), p(dec!(97))));

        let (tp, sl) = swing_levels(p(dec!(100)), Side::Short, range, dec!(1.5)).unwrap();
        assert_eq!((tp, sl), (p(dec!(94)), p(dec!(104))));

        let below = SwingRange {
            high: p(dec!(99)),
            low: p(dec!(90)),
        };
        assert!(swing_levels(p(dec!(100)), Side::Short, below, dec!(1)).is_err());
    }

    #[test]
    fn test_floating_quantity() {
        // 2% stop distance, $10 risk -> $500 notional -> 5 units at 100
        let qty = floating_quantity(p(dec!(100)), Side::Long, p(dec!(98)), dec!(10), dec!(0.001))
            .unwrap();
        assert_eq!(qty, Size::new(dec!(5)));

        // floors to the lot step
        let qty = floating_quantity(p(dec!(100)), Side::Short, p(dec!(103)), dec!(10), dec!(0.01))
            .unwrap();
        assert_eq!(qty, Size::new(dec!(3.33)));
    }

    #[test]
    fn test_floating_rejects_wrong_side_stop() {
        assert!(
            floating_quantity(p(dec!(100)), Side::Long, p(dec!(101)), dec!(10), dec!(0.001))
                .is_err()
        );
        assert!(
            floating_quantity(p(dec!(100)), Side::Short, p(dec!(100)), dec!(10), dec!(0.001))
                .is_err()
        );
    }

    fn calculator(venue: Arc<PaperVenue>) -> RiskCalculator {
        RiskCalculator::new(Arc::new(PriceFeed::new(venue)))
    }

    fn btc() -> Symbol {
        Symbol::new("BTCUSDT")
    }

    #[tokio::test]
    async fn test_compute_rounds_to_tick() {
        let venue = Arc::new(PaperVenue::new(dec!(1000)));
        venue.set_instrument(InstrumentSpec {
            symbol: btc(),
            tick_size: dec!(0.1),
            qty_step: dec!(0.001),
            min_qty: dec!(0.001),
        });
        venue.set_price(&btc(), p(dec!(123.45)));

        let levels = calculator(venue)
            .compute(
                &btc(),
                Side::Long,
                &RiskParams::Percentage {
                    take_percent: dec!(0.01),
                    loss_percent: dec!(0.01),
                },
            )
            .await;
        assert!(levels.valid);
        assert_eq!(levels.reference_price, p(dec!(123.45)));
        // 124.6845 -> 124.7, 122.2155 -> 122.2
        assert_eq!(levels.take_profit, Some(p(dec!(124.7))));
        assert_eq!(levels.stop_loss, Some(p(dec!(122.2))));
        assert_eq!(levels.quantity, None);
    }

    #[tokio::test]
    async fn test_compute_swing_violation_is_invalid() {
        let venue = Arc::new(PaperVenue::new(dec!(1000)));
        venue.set_price(&btc(), p(dec!(100)));
        venue.set_candles(
            &btc(),
            vec![Candle {
                open_time: Utc::now(),
                open: p(dec!(106)),
                high: p(dec!(108)),
                low: p(dec!(105)),
                close: p(dec!(107)),
            }],
        );
        let levels = calculator(venue)
            .compute(
                &btc(),
                Side::Long,
                &RiskParams::Swing {
                    lookback: 10,
                    interval: CandleInterval::FifteenMinutes,
                    take_ratio: dec!(2),
                },
            )
            .await;
        assert!(!levels.valid);
        assert!(levels.reason.is_some());
    }

    #[tokio::test]
    async fn test_compute_feed_failure_is_invalid() {
        let venue = Arc::new(PaperVenue::new(dec!(1000)));
        let levels = calculator(venue)
            .compute(
                &btc(),
                Side::Short,
                &RiskParams::Pips {
                    take_pips: dec!(20),
                    loss_pips: dec!(10),
                    pip_size: dec!(0.0001),
                },
            )
            .await;
        assert!(!levels.valid);
    }

    #[tokio::test]
    async fn test_compute_floating_keeps_optional_take_profit() {
        let venue = Arc::new(PaperVenue::new(dec!(1000)));
        venue.set_price(&btc(), p(dec!(100)));
        let levels = calculator(venue)
            .compute(
                &btc(),
                Side::Long,
                &RiskParams::FloatingRisk {
                    risk_amount: dec!(10),
                    stop_loss: p(dec!(95)),
                    take_profit: None,
                },
            )
            .await;
        assert!(levels.valid);
        assert_eq!(levels.take_profit, None);
        assert_eq!(levels.stop_loss, Some(p(dec!(95))));
        assert_eq!(levels.quantity, Some(Size::new(dec!(2))));
    }
}
