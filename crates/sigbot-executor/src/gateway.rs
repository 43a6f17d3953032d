//! Order gateway.

use std::sync::Arc;

use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use sigbot_core::{OrderId, Price, Side, Size, Symbol, TriggerKind};
use sigbot_feed::PriceFeed;
use sigbot_venue::{DynVenue, MarketOrderRequest, OrderState, TriggerOrderRequest, VenueError};
use tracing::{error, info, warn};

use crate::error::{ExecutorError, ExecutorResult};

// ============================================================================
// Config & requests
// ============================================================================

/// Gateway configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct GatewayConfig {
    /// Simulate: no account or trading calls reach the venue.
    pub dry_run: bool,
    /// Fraction of the quote balance committed per trade (0.1 = 10%).
    pub order_size_percent: Decimal,
    pub leverage: u32,
    pub quote_asset: String,
    /// Balance reported while `dry_run` is set.
    pub dry_balance: Decimal,
}

impl Default for GatewayConfig {
    fn default() -> Self {
        Self {
            dry_run: false,
            order_size_percent: Decimal::new(1, 1),
            leverage: 1,
            quote_asset: "USDT".to_string(),
            dry_balance: Decimal::from(1000),
        }
    }
}

/// How the entry quantity is chosen.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Sizing {
    /// `balance * order_size_percent * leverage / price`.
    BalanceFraction,
    /// Pre-computed quantity (floating-risk policy).
    Quantity(Size),
}

/// Request to open a protected position.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OpenRequest {
    pub symbol: Symbol,
    pub side: Side,
    /// Price used for sizing and reported as the entry price.
    pub reference_price: Price,
    pub sizing: Sizing,
    pub stop_loss: Price,
    pub take_profit: Option<Price>,
}

/// Result of a successful open.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PlacedOrder {
    pub order_id: OrderId,
    pub entry_price: Price,
    pub quantity: Size,
    pub stop_order_id: Option<OrderId>,
    pub take_profit_order_id: Option<OrderId>,
}

impl PlacedOrder {
    /// Number of venue orders this open placed.
    #[must_use]
    pub fn legs(&self) -> usize {
        1 + usize::from(self.stop_order_id.is_some())
            + usize::from(self.take_profit_order_id.is_some())
    }
}

/// Result of a successful close.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ClosedOrder {
    pub order_id: OrderId,
    pub exit_price: Price,
}

// ============================================================================
// OrderGateway
// ============================================================================

/// Places and unwinds orders on the venue.
pub struct OrderGateway {
    venue: DynVenue,
    feed: Arc<PriceFeed>,
    config: GatewayConfig,
}

impl OrderGateway {
    pub fn new(venue: DynVenue, feed: Arc<PriceFeed>, config: GatewayConfig) -> Self {
        Self {
            venue,
            feed,
            config,
        }
    }

    #[must_use]
    pub fn is_dry_run(&self) -> bool {
        self.config.dry_run
    }

    #[must_use]
    pub fn config(&self) -> &GatewayConfig {
        &self.config
    }

    /// Quote-asset balance (configured paper balance in dry mode).
    pub async fn balance(&self) -> ExecutorResult<Decimal> {
        if self.config.dry_run {
            return Ok(self.config.dry_balance);
        }
        Ok(self.venue.get_balance(&self.config.quote_asset).await?)
    }

    /// Open a position: entry, stop, and take-profit when supplied.
    pub async fn open(&self, req: OpenRequest) -> ExecutorResult<PlacedOrder> {
        let quantity = self.entry_quantity(&req).await?;

        info!(
            symbol = %req.symbol,
            side = %req.side,
            qty = %quantity,
            entry = %req.reference_price,
            stop_loss = %req.stop_loss,
            take_profit = ?req.take_profit,
            dry_run = self.config.dry_run,
            "Opening position"
        );

        if self.config.dry_run {
            return Ok(PlacedOrder {
                order_id: OrderId::synthetic(),
                entry_price: req.reference_price,
                quantity,
                stop_order_id: Some(OrderId::synthetic()),
                take_profit_order_id: req.take_profit.map(|_| OrderId::synthetic()),
            });
        }

        let entry_id = self
            .venue
            .place_market_order(MarketOrderRequest::entry(
                req.symbol.clone(),
                req.side.entry_order_side(),
                quantity,
            ))
            .await
            .map_err(|e| {
                warn!(symbol = %req.symbol, error = %e, "Entry order failed, nothing at risk");
                ExecutorError::EntryFailed(e)
            })?;
        info!(symbol = %req.symbol, order_id = %entry_id, "Entry order placed");

        let stop_id = match self
            .place_leg(&req, quantity, TriggerKind::StopLoss, req.stop_loss)
            .await
        {
            Ok(id) => id,
            Err(e) => {
                return Err(self
                    .unwind(&req, &entry_id, quantity, &[], TriggerKind::StopLoss, e)
                    .await)
            }
        };

        let take_profit_id = match req.take_profit {
            Some(tp) => match self
                .place_leg(&req, quantity, TriggerKind::TakeProfit, tp)
                .await
            {
                Ok(id) => Some(id),
                Err(e) => {
                    return Err(self
                        .unwind(
                            &req,
                            &entry_id,
                            quantity,
                            std::slice::from_ref(&stop_id),
                            TriggerKind::TakeProfit,
                            e,
                        )
                        .await)
                }
            },
            None => None,
        };

        Ok(PlacedOrder {
            order_id: entry_id,
            entry_price: req.reference_price,
            quantity,
            stop_order_id: Some(stop_id),
            take_profit_order_id: take_profit_id,
        })
    }

    /// Flatten a position with a reduce-only market order on the opposite side,
    /// then cancel its resting protective orders.
    ///
    /// `reference_price` is reported as the exit price. A leg that cannot be
    /// cancelled is logged; the reduce-only flag keeps it from reopening
    /// exposure.
    pub async fn close(
        &self,
        symbol: &Symbol,
        side: Side,
        quantity: Size,
        reference_price: Price,
        protective: &[OrderId],
    ) -> ExecutorResult<ClosedOrder> {
        info!(
            %symbol,
            %side,
            qty = %quantity,
            price = %reference_price,
            dry_run = self.config.dry_run,
            "Closing position"
        );
        if self.config.dry_run {
            return Ok(ClosedOrder {
                order_id: OrderId::synthetic(),
                exit_price: reference_price,
            });
        }
        let order_id = self
            .venue
            .place_market_order(MarketOrderRequest::close(
                symbol.clone(),
                side.exit_order_side(),
                quantity,
            ))
            .await
            .map_err(ExecutorError::CloseFailed)?;
        for leg_id in protective {
            if let Err(e) = self.venue.cancel_order(symbol, leg_id).await {
                warn!(%symbol, order_id = %leg_id, error = %e, "Protective order not cancelled after close");
            }
        }
        Ok(ClosedOrder {
            order_id,
            exit_price: reference_price,
        })
    }

    async fn entry_quantity(&self, req: &OpenRequest) -> ExecutorResult<Size> {
        if !self.config.dry_run {
            if let Err(e) = self
                .venue
                .set_leverage(&req.symbol, self.config.leverage)
                .await
            {
                warn!(
                    symbol = %req.symbol,
                    leverage = self.config.leverage,
                    error = %e,
                    "Failed to set leverage, continuing"
                );
            }
        }

        let spec = self.feed.instrument(&req.symbol).await?;
        let quantity = match req.sizing {
            Sizing::Quantity(qty) => qty.round_dp(spec.qty_digits()),
            Sizing::BalanceFraction => {
                let balance = self.balance().await?;
                let raw = balance
                    * self.config.order_size_percent
                    * Decimal::from(self.config.leverage)
                    / req.reference_price.inner();
                Size::new(raw).round_dp(spec.qty_digits())
            }
        };

        if !quantity.is_positive() || quantity.inner() < spec.min_qty {
            return Err(ExecutorError::ZeroQuantity {
                symbol: req.symbol.to_string(),
                qty: quantity.to_string(),
            });
        }
        Ok(quantity)
    }

    async fn place_leg(
        &self,
        req: &OpenRequest,
        quantity: Size,
        kind: TriggerKind,
        trigger_price: Price,
    ) -> Result<OrderId, VenueError> {
        let id = self
            .venue
            .place_reduce_only_order(TriggerOrderRequest {
                symbol: req.symbol.clone(),
                side: req.side.exit_order_side(),
                trigger_price,
                qty: quantity,
                kind,
            })
            .await?;
        info!(symbol = %req.symbol, %kind, price = %trigger_price, order_id = %id, "Protective leg placed");
        Ok(id)
    }

    /// Compensate a failed leg and build the error to surface.
    async fn unwind(
        &self,
        req: &OpenRequest,
        entry_id: &OrderId,
        quantity: Size,
        placed_legs: &[OrderId],
        leg: TriggerKind,
        source: VenueError,
    ) -> ExecutorError {
        warn!(
            symbol = %req.symbol,
            %leg,
            error = %source,
            entry_order = %entry_id,
            "Protective leg failed, compensating"
        );
        match self.compensate(req, entry_id, quantity, placed_legs).await {
            Ok(()) => {
                warn!(symbol = %req.symbol, %leg, "Compensation complete, no exposure left");
                ExecutorError::LegFailed { leg, source }
            }
            Err(detail) => {
                error!(
                    critical = true,
                    symbol = %req.symbol,
                    side = %req.side,
                    %leg,
                    entry_order = %entry_id,
                    qty = %quantity,
                    %detail,
                    "CRITICAL INCONSISTENCY: compensation failed, position may be unprotected. Manual intervention required"
                );
                ExecutorError::CriticalInconsistency {
                    leg,
                    source,
                    detail,
                }
            }
        }
    }

    /// Cancel the entry if still open, cancel placed legs, then flatten any fill.
    ///
    /// Returns the collected failure descriptions on error.
    async fn compensate(
        &self,
        req: &OpenRequest,
        entry_id: &OrderId,
        quantity: Size,
        placed_legs: &[OrderId],
    ) -> Result<(), String> {
        let mut failures = Vec::new();

        let flatten_qty = match self.venue.get_order(&req.symbol, entry_id).await {
            Ok(Some(status)) if status.state.is_cancellable() => {
                match self.venue.cancel_order(&req.symbol, entry_id).await {
                    Ok(()) => {
                        info!(symbol = %req.symbol, order_id = %entry_id, "Entry order cancelled");
                        Some(status.filled_qty).filter(|q| q.is_positive())
                    }
                    Err(e) => {
                        // Lost the race against the fill; flatten the full size.
                        warn!(order_id = %entry_id, error = %e, "Entry cancel failed");
                        Some(quantity)
                    }
                }
            }
            Ok(Some(status)) if status.state == OrderState::Filled => {
                Some(status.filled_qty).filter(|q| q.is_positive()).or(Some(quantity))
            }
            Ok(Some(status)) => {
                info!(order_id = %entry_id, state = ?status.state, "Entry order already inactive");
                None
            }
            Ok(None) => {
                warn!(order_id = %entry_id, "Entry order not found, assuming no fill");
                None
            }
            Err(e) => {
                warn!(order_id = %entry_id, error = %e, "Entry order query failed, flattening");
                Some(quantity)
            }
        };

        for leg_id in placed_legs {
            if let Err(e) = self.venue.cancel_order(&req.symbol, leg_id).await {
                failures.push(format!("cancel leg {leg_id}: {e}"));
            }
        }

        if let Some(qty) = flatten_qty {
            match self
                .venue
                .place_market_order(MarketOrderRequest::close(
                    req.symbol.clone(),
                    req.side.exit_order_side(),
                    qty,
                ))
                .await
            {
                Ok(id) => info!(symbol = %req.symbol, order_id = %id, %qty, "Entry flattened"),
                Err(e) => failures.push(format!("flatten {qty}: {e}")),
            }
        }

        if failures.is_empty() {
            Ok(())
        } else {
            Err(failures.join("; "))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;
    use sigbot_core::InstrumentSpec;
    use sigbot_venue::{PaperOp, PaperVenue};

    fn btc() -> Symbol {
        Symbol::new("BTCUSDT")
    }

    fn setup(config: GatewayConfig) -> (Arc<PaperVenue>, OrderGateway) {
        let venue = Arc::new(PaperVenue::new(dec!(1000)));
        venue.set_instrument(InstrumentSpec {
            symbol: btc(),
            tick_size: dec!(0.1),
            qty_step: dec!(0.001),
            min_qty: dec!(0.001),
        });
        venue.set_price(&btc(), Price::new(dec!(100)));
        let feed = Arc::new(PriceFeed::new(venue.clone()));
        let gateway = OrderGateway::new(venue.clone(), feed, config);
        (venue, gateway)
    }

    fn live() -> GatewayConfig {
        GatewayConfig {
            dry_run: false,
            order_size_percent: dec!(0.1),
            leverage: 5,
            quote_asset: "USDT".to_string(),
            dry_balance: dec!(0),
        }
    }

    fn long_request(take_profit: Option<Price>) -> OpenRequest {
        OpenRequest {
            symbol: btc(),
            side: Side::Long,
            reference_price: Price::new(dec!(100)),
            sizing: Sizing::BalanceFraction,
            stop_loss: Price::new(dec!(95)),
            take_profit,
        }
    }

    #[tokio::test]
    async fn test_open_places_three_legs() {
        let (venue, gateway) = setup(live());
        let placed = gateway
            .open(long_request(Some(Price::new(dec!(110)))))
            .await
            .unwrap();

        // 1000 * 0.1 * 5 / 100 = 5
        assert_eq!(placed.quantity, Size::new(dec!(5)));
        assert_eq!(placed.legs(), 3);
        assert_eq!(venue.leverage(&btc()), Some(5));
        assert_eq!(venue.position(&btc()), Some((Side::Long, Size::new(dec!(5)))));
        assert_eq!(venue.open_trigger_orders(&btc()), 2);
    }

    #[tokio::test]
    async fn test_leverage_failure_is_not_fatal() {
        let (venue, gateway) = setup(live());
        venue.fail_next(PaperOp::Leverage, 1);
        assert!(gateway.open(long_request(None)).await.is_ok());
    }

    #[tokio::test]
    async fn test_entry_failure_aborts() {
        let (venue, gateway) = setup(live());
        venue.fail_next(PaperOp::EntryOrder, 1);
        let err = gateway.open(long_request(None)).await.unwrap_err();
        assert!(matches!(err, ExecutorError::EntryFailed(_)));
        assert_eq!(venue.calls(PaperOp::StopOrder), 0);
        assert_eq!(venue.position(&btc()), None);
    }

    #[tokio::test]
    async fn test_stop_failure_compensates() {
        let (venue, gateway) = setup(live());
        venue.fail_next(PaperOp::StopOrder, 1);
        let err = gateway.open(long_request(None)).await.unwrap_err();

        assert!(matches!(
            err,
            ExecutorError::LegFailed {
                leg: TriggerKind::StopLoss,
                ..
            }
        ));
        assert_eq!(venue.calls(PaperOp::GetOrder), 1);
        assert_eq!(venue.calls(PaperOp::CloseOrder), 1);
        assert_eq!(venue.position(&btc()), None);
    }

    #[tokio::test]
    async fn test_take_profit_failure_cancels_stop_and_flattens() {
        let (venue, gateway) = setup(live());
        venue.fail_next(PaperOp::TakeProfitOrder, 1);
        let err = gateway
            .open(long_request(Some(Price::new(dec!(110)))))
            .await
            .unwrap_err();

        assert!(matches!(
            err,
            ExecutorError::LegFailed {
                leg: TriggerKind::TakeProfit,
                ..
            }
        ));
        assert_eq!(venue.calls(PaperOp::Cancel), 1);
        assert_eq!(venue.open_trigger_orders(&btc()), 0);
        assert_eq!(venue.position(&btc()), None);
    }

    #[tokio::test]
    async fn test_failed_compensation_is_critical() {
        let (venue, gateway) = setup(live());
        venue.fail_next(PaperOp::StopOrder, 1);
        venue.fail_next(PaperOp::CloseOrder, 1);
        let err = gateway.open(long_request(None)).await.unwrap_err();

        assert!(err.is_critical());
        // no retry of the flatten
        assert_eq!(venue.calls(PaperOp::CloseOrder), 1);
        assert!(venue.position(&btc()).is_some());
    }

    #[tokio::test]
    async fn test_query_failure_still_flattens() {
        let (venue, gateway) = setup(live());
        venue.fail_next(PaperOp::StopOrder, 1);
        venue.fail_next(PaperOp::GetOrder, 1);
        let err = gateway.open(long_request(None)).await.unwrap_err();
        assert!(!err.is_critical());
        assert_eq!(venue.position(&btc()), None);
    }

    #[tokio::test]
    async fn test_fixed_quantity_sizing() {
        let (_venue, gateway) = setup(live());
        let mut req = long_request(None);
        req.sizing = Sizing::Quantity(Size::new(dec!(0.5)));
        let placed = gateway.open(req).await.unwrap();
        assert_eq!(placed.quantity, Size::new(dec!(0.5)));
        assert_eq!(placed.take_profit_order_id, None);
        assert_eq!(placed.legs(), 2);
    }

    #[tokio::test]
    async fn test_zero_quantity_rejected() {
        let (venue, gateway) = setup(GatewayConfig {
            order_size_percent: dec!(0.0000001),
            ..live()
        });
        let err = gateway.open(long_request(None)).await.unwrap_err();
        assert!(matches!(err, ExecutorError::ZeroQuantity { .. }));
        assert_eq!(venue.calls(PaperOp::EntryOrder), 0);
    }

    #[tokio::test]
    async fn test_dry_run_makes_no_trading_calls() {
        let (venue, gateway) = setup(GatewayConfig {
            dry_run: true,
            dry_balance: dec!(500),
            ..live()
        });
        let placed = gateway
            .open(long_request(Some(Price::new(dec!(110)))))
            .await
            .unwrap();
        assert!(placed.order_id.is_synthetic());
        // 500 * 0.1 * 5 / 100
        assert_eq!(placed.quantity, Size::new(dec!(2.5)));

        let closed = gateway
            .close(&btc(), Side::Long, placed.quantity, Price::new(dec!(101)), &[])
            .await
            .unwrap();
        assert!(closed.order_id.is_synthetic());
        assert_eq!(gateway.balance().await.unwrap(), dec!(500));

        for op in [
            PaperOp::Leverage,
            PaperOp::Balance,
            PaperOp::EntryOrder,
            PaperOp::CloseOrder,
            PaperOp::StopOrder,
            PaperOp::TakeProfitOrder,
        ] {
            assert_eq!(venue.calls(op), 0, "{op:?}");
        }
    }

    #[tokio::test]
    async fn test_close_failure_surfaces() {
        let (venue, gateway) = setup(live());
        gateway.open(long_request(None)).await.unwrap();
        venue.fail_next(PaperOp::CloseOrder, 1);
        let err = gateway
            .close(&btc(), Side::Long, Size::new(dec!(5)), Price::new(dec!(100)), &[])
            .await
            .unwrap_err();
        assert!(matches!(err, ExecutorError::CloseFailed(_)));
        assert!(venue.position(&btc()).is_some());
    }

    #[tokio::test]
    async fn test_close_cancels_protective_orders() {
        let (venue, gateway) = setup(live());
        let placed = gateway
            .open(long_request(Some(Price::new(dec!(110)))))
            .await
            .unwrap();
        assert_eq!(venue.open_trigger_orders(&btc()), 2);

        let legs: Vec<OrderId> = placed
            .stop_order_id
            .iter()
            .chain(placed.take_profit_order_id.iter())
            .cloned()
            .collect();
        gateway
            .close(&btc(), Side::Long, placed.quantity, Price::new(dec!(100)), &legs)
            .await
            .unwrap();
        assert_eq!(venue.position(&btc()), None);
        assert_eq!(venue.open_trigger_orders(&btc()), 0);
    }
}
