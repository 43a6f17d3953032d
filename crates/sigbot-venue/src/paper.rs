//! In-memory paper venue.
//!
//! Simulates a linear-perpetual exchange closely enough to drive the whole
//! order lifecycle: market orders fill at the current price, reduce-only
//! trigger orders rest until [`PaperVenue::set_price`] crosses them, and
//! every fill is pushed to order-stream subscribers with the same
//! `CreateType` tags a real venue uses: TP/SL attached to an entry fill as
//! `CreateByTakeProfit`/`CreateByStopLoss`, standalone conditional orders as
//! `CreateByUser`.
//!
//! Failure injection ([`PaperVenue::fail_next`]) and call counting
//! ([`PaperVenue::calls`]) make it the test double for the gateway and
//! the orchestrator.

use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;

use chrono::Utc;
use parking_lot::Mutex;
use rust_decimal::Decimal;
use sigbot_core::{
    Candle, CandleInterval, CreateType, InstrumentSpec, OrderId, OrderSide, OrderUpdate, Price,
    Side, Size, Symbol, TriggerKind,
};
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info};

use crate::error::{VenueError, VenueResult};
use crate::venue::{
    BoxFuture, MarketOrderRequest, OrderState, OrderStatus, TriggerOrderRequest, Venue,
};

/// Order-update channel capacity per subscriber.
const UPDATE_CHANNEL_CAPACITY: usize = 256;

/// Venue operations that can be counted and failed on demand.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum PaperOp {
    Price,
    Instrument,
    Balance,
    Candles,
    Leverage,
    /// Non reduce-only market order.
    EntryOrder,
    /// Reduce-only market order.
    CloseOrder,
    StopOrder,
    TakeProfitOrder,
    GetOrder,
    Cancel,
}

#[derive(Debug, Clone)]
struct PaperPosition {
    side: Side,
    qty: Decimal,
    entry: Decimal,
}

#[derive(Debug, Clone)]
enum PaperOrderKind {
    Market,
    Trigger {
        kind: TriggerKind,
        price: Price,
        /// Attached to the entry order as position-level TP/SL.
        attached: bool,
    },
}

#[derive(Debug, Clone)]
struct PaperOrder {
    id: OrderId,
    symbol: Symbol,
    side: OrderSide,
    qty: Decimal,
    kind: PaperOrderKind,
    state: OrderState,
    filled_qty: Decimal,
    seq: u64,
}

#[derive(Debug, Default)]
struct PaperBook {
    prices: HashMap<Symbol, Price>,
    instruments: HashMap<Symbol, InstrumentSpec>,
    candles: HashMap<Symbol, Vec<Candle>>,
    positions: HashMap<Symbol, PaperPosition>,
    orders: HashMap<OrderId, PaperOrder>,
    leverage: HashMap<Symbol, u32>,
    balance: Decimal,
}

struct Subscriber {
    tx: mpsc::Sender<OrderUpdate>,
    shutdown: CancellationToken,
}

/// Simulated exchange.
pub struct PaperVenue {
    book: Mutex<PaperBook>,
    subscribers: Mutex<Vec<Subscriber>>,
    failures: Mutex<HashMap<PaperOp, u32>>,
    calls: Mutex<HashMap<PaperOp, u32>>,
    order_latency: Mutex<Duration>,
    next_seq: AtomicU64,
    stream_enabled: bool,
}

impl PaperVenue {
    /// Create a paper venue with a quote balance and order stream enabled.
    pub fn new(balance: Decimal) -> Self {
        Self {
            book: Mutex::new(PaperBook {
                balance,
                ..PaperBook::default()
            }),
            subscribers: Mutex::new(Vec::new()),
            failures: Mutex::new(HashMap::new()),
            calls: Mutex::new(HashMap::new()),
            order_latency: Mutex::new(Duration::ZERO),
            next_seq: AtomicU64::new(1),
            stream_enabled: true,
        }
    }

    /// Disable the order stream, forcing polling-based exit detection.
    #[must_use]
    pub fn without_order_stream(mut self) -> Self {
        self.stream_enabled = false;
        self
    }

    /// Register instrument precision.
    pub fn set_instrument(&self, spec: InstrumentSpec) {
        self.book.lock().instruments.insert(spec.symbol.clone(), spec);
    }

    /// Set candle history (oldest first).
    pub fn set_candles(&self, symbol: &Symbol, candles: Vec<Candle>) {
        self.book.lock().candles.insert(symbol.clone(), candles);
    }

    /// Delay applied to every order placement.
    pub fn set_order_latency(&self, latency: Duration) {
        *self.order_latency.lock() = latency;
    }

    /// Fail the next `n` calls of `op` with [`VenueError::Unavailable`].
    pub fn fail_next(&self, op: PaperOp, n: u32) {
        self.failures.lock().insert(op, n);
    }

    /// Number of calls made for `op`, failed ones included.
    #[must_use]
    pub fn calls(&self, op: PaperOp) -> u32 {
        self.calls.lock().get(&op).copied().unwrap_or(0)
    }

    #[must_use]
    pub fn balance(&self) -> Decimal {
        self.book.lock().balance
    }

    /// Open position on a symbol as `(side, qty)`.
    #[must_use]
    pub fn position(&self, symbol: &Symbol) -> Option<(Side, Size)> {
        self.book
            .lock()
            .positions
            .get(symbol)
            .map(|p| (p.side, Size::new(p.qty)))
    }

    #[must_use]
    pub fn leverage(&self, symbol: &Symbol) -> Option<u32> {
        self.book.lock().leverage.get(symbol).copied()
    }

    /// Current state of an order.
    #[must_use]
    pub fn order_state(&self, order_id: &OrderId) -> Option<OrderState> {
        self.book.lock().orders.get(order_id).map(|o| o.state)
    }

    /// Number of resting trigger orders on a symbol.
    #[must_use]
    pub fn open_trigger_orders(&self, symbol: &Symbol) -> usize {
        self.book
            .lock()
            .orders
            .values()
            .filter(|o| &o.symbol == symbol && o.state == OrderState::Untriggered)
            .count()
    }

    /// Move the market. Resting trigger orders crossed by the new price fill
    /// and are reported on the order stream.
    pub fn set_price(&self, symbol: &Symbol, price: Price) {
        let updates = {
            let mut book = self.book.lock();
            book.prices.insert(symbol.clone(), price);
            self.run_triggers(&mut book, symbol, price)
        };
        for update in updates {
            self.publish(update);
        }
    }

    fn check(&self, op: PaperOp) -> VenueResult<()> {
        *self.calls.lock().entry(op).or_insert(0) += 1;
        let mut failures = self.failures.lock();
        if let Some(remaining) = failures.get_mut(&op) {
            if *remaining > 0 {
                *remaining -= 1;
                return Err(VenueError::Unavailable(format!(
                    "injected paper failure: {op:?}"
                )));
            }
        }
        Ok(())
    }

    fn next_order_id(&self) -> (OrderId, u64) {
        let seq = self.next_seq.fetch_add(1, Ordering::Relaxed);
        (OrderId::new(format!("paper-{seq}")), seq)
    }

    fn publish(&self, update: OrderUpdate) {
        if !self.stream_enabled {
            return;
        }
        let mut subscribers = self.subscribers.lock();
        subscribers.retain(|s| !s.shutdown.is_cancelled() && !s.tx.is_closed());
        for sub in subscribers.iter() {
            if sub.tx.try_send(update.clone()).is_err() {
                debug!(symbol = %update.symbol, "Paper order update dropped");
            }
        }
    }

    async fn order_delay(&self) {
        let latency = *self.order_latency.lock();
        if !latency.is_zero() {
            tokio::time::sleep(latency).await;
        }
    }

    fn current_price(book: &PaperBook, symbol: &Symbol) -> VenueResult<Price> {
        book.prices
            .get(symbol)
            .copied()
            .ok_or_else(|| VenueError::NotFound(format!("no paper price for {symbol}")))
    }

    /// Apply a fill to the position book. Returns the quantity actually filled.
    fn apply_fill(
        book: &mut PaperBook,
        symbol: &Symbol,
        side: OrderSide,
        qty: Decimal,
        price: Price,
        reduce_only: bool,
    ) -> VenueResult<Decimal> {
        let mut remaining = qty;
        let mut filled = Decimal::ZERO;

        if let Some(pos) = book.positions.get_mut(symbol) {
            if pos.side.exit_order_side() == side {
                let reduce = remaining.min(pos.qty);
                let direction = if pos.side.is_long() {
                    Decimal::ONE
                } else {
                    Decimal::NEGATIVE_ONE
                };
                book.balance += (price.inner() - pos.entry) * reduce * direction;
                pos.qty -= reduce;
                remaining -= reduce;
                filled += reduce;
                if pos.qty.is_zero() {
                    book.positions.remove(symbol);
                    for order in book.orders.values_mut() {
                        if &order.symbol == symbol && order.state == OrderState::Untriggered {
                            order.state = OrderState::Cancelled;
                        }
                    }
                }
            }
        }

        if reduce_only {
            if filled.is_zero() {
                return Err(VenueError::Rejected(format!(
                    "reduce-only {side} on {symbol} has no position to reduce"
                )));
            }
            return Ok(filled);
        }

        if remaining > Decimal::ZERO {
            let opening = side.opening_side();
            match book.positions.get_mut(symbol) {
                Some(pos) => {
                    let total = pos.qty + remaining;
                    pos.entry = (pos.entry * pos.qty + price.inner() * remaining) / total;
                    pos.qty = total;
                }
                None => {
                    book.positions.insert(
                        symbol.clone(),
                        PaperPosition {
                            side: opening,
                            qty: remaining,
                            entry: price.inner(),
                        },
                    );
                }
            }
            filled += remaining;
        }
        Ok(filled)
    }

    fn run_triggers(&self, book: &mut PaperBook, symbol: &Symbol, price: Price) -> Vec<OrderUpdate> {
        let mut candidates: Vec<(u64, OrderId)> = book
            .orders
            .values()
            .filter(|o| &o.symbol == symbol && o.state == OrderState::Untriggered)
            .filter(|o| match &o.kind {
                PaperOrderKind::Trigger {
                    kind,
                    price: trigger,
                    ..
                } => {
                    is_triggered(o.side, *kind, *trigger, price)
                }
                PaperOrderKind::Market => false,
            })
            .map(|o| (o.seq, o.id.clone()))
            .collect();
        candidates.sort_by_key(|(seq, _)| *seq);

        let mut updates = Vec::new();
        for (_, id) in candidates {
            let Some(order) = book.orders.get(&id).cloned() else {
                continue;
            };
            if order.state != OrderState::Untriggered {
                continue;
            }
            let PaperOrderKind::Trigger { kind, attached, .. } = order.kind else {
                continue;
            };
            match Self::apply_fill(book, symbol, order.side, order.qty, price, true) {
                Ok(filled) => {
                    if let Some(o) = book.orders.get_mut(&id) {
                        o.state = OrderState::Filled;
                        o.filled_qty = filled;
                    }
                    info!(%symbol, order_id = %id, %kind, %price, "Paper trigger order filled");
                    updates.push(OrderUpdate {
                        symbol: symbol.clone(),
                        side: order.side,
                        create_type: match (attached, kind) {
                            (true, TriggerKind::TakeProfit) => CreateType::ByTakeProfit,
                            (true, TriggerKind::StopLoss) => CreateType::ByStopLoss,
                            (false, _) => CreateType::Other("CreateByUser".to_string()),
                        },
                        price,
                        order_id: id.clone(),
                    });
                }
                Err(_) => {
                    if let Some(o) = book.orders.get_mut(&id) {
                        o.state = OrderState::Cancelled;
                    }
                }
            }
        }
        updates
    }

    fn insert_trigger(
        &self,
        book: &mut PaperBook,
        symbol: &Symbol,
        side: OrderSide,
        qty: Decimal,
        kind: TriggerKind,
        price: Price,
        attached: bool,
    ) -> OrderId {
        let (id, seq) = self.next_order_id();
        book.orders.insert(
            id.clone(),
            PaperOrder {
                id: id.clone(),
                symbol: symbol.clone(),
                side,
                qty,
                kind: PaperOrderKind::Trigger {
                    kind,
                    price,
                    attached,
                },
                state: OrderState::Untriggered,
                filled_qty: Decimal::ZERO,
                seq,
            },
        );
        id
    }
}

/// Whether a reduce-only trigger order on `side` fires at `price`.
fn is_triggered(side: OrderSide, kind: TriggerKind, trigger: Price, price: Price) -> bool {
    match (side, kind) {
        // Closing a long
        (OrderSide::Sell, TriggerKind::StopLoss) => price <= trigger,
        (OrderSide::Sell, TriggerKind::TakeProfit) => price >= trigger,
        // Closing a short
        (OrderSide::Buy, TriggerKind::StopLoss) => price >= trigger,
        (OrderSide::Buy, TriggerKind::TakeProfit) => price <= trigger,
    }
}

impl Venue for PaperVenue {
    fn name(&self) -> &str {
        "paper"
    }

    fn supports_order_stream(&self) -> bool {
        self.stream_enabled
    }

    fn get_price<'a>(&'a self, symbol: &'a Symbol) -> BoxFuture<'a, VenueResult<Price>> {
        Box::pin(async move {
            self.check(PaperOp::Price)?;
            Self::current_price(&self.book.lock(), symbol)
        })
    }

    fn get_instrument<'a>(
        &'a self,
        symbol: &'a Symbol,
    ) -> BoxFuture<'a, VenueResult<InstrumentSpec>> {
        Box::pin(async move {
            self.check(PaperOp::Instrument)?;
            Ok(self
                .book
                .lock()
                .instruments
                .get(symbol)
                .cloned()
                .unwrap_or_else(|| InstrumentSpec {
                    symbol: symbol.clone(),
                    tick_size: Decimal::new(1, 2),
                    qty_step: Decimal::new(1, 3),
                    min_qty: Decimal::new(1, 3),
                }))
        })
    }

    fn get_balance<'a>(&'a self, _asset: &'a str) -> BoxFuture<'a, VenueResult<Decimal>> {
        Box::pin(async move {
            self.check(PaperOp::Balance)?;
            Ok(self.book.lock().balance)
        })
    }

    fn get_candles<'a>(
        &'a self,
        symbol: &'a Symbol,
        _interval: CandleInterval,
        count: usize,
    ) -> BoxFuture<'a, VenueResult<Vec<Candle>>> {
        Box::pin(async move {
            self.check(PaperOp::Candles)?;
            let book = self.book.lock();
            let candles = book
                .candles
                .get(symbol)
                .ok_or_else(|| VenueError::NotFound(format!("no paper candles for {symbol}")))?;
            let start = candles.len().saturating_sub(count);
            Ok(candles[start..].to_vec())
        })
    }

    fn set_leverage<'a>(
        &'a self,
        symbol: &'a Symbol,
        leverage: u32,
    ) -> BoxFuture<'a, VenueResult<()>> {
        Box::pin(async move {
            self.check(PaperOp::Leverage)?;
            self.book.lock().leverage.insert(symbol.clone(), leverage);
            Ok(())
        })
    }

    fn place_market_order(&self, req: MarketOrderRequest) -> BoxFuture<'_, VenueResult<OrderId>> {
        Box::pin(async move {
            self.order_delay().await;
            let op = if req.reduce_only {
                PaperOp::CloseOrder
            } else {
                PaperOp::EntryOrder
            };
            self.check(op)?;
            if !req.qty.is_positive() {
                return Err(VenueError::Rejected(format!("invalid qty {}", req.qty)));
            }

            let (id, update) = {
                let mut book = self.book.lock();
                let price = Self::current_price(&book, &req.symbol)?;
                let filled = Self::apply_fill(
                    &mut book,
                    &req.symbol,
                    req.side,
                    req.qty.inner(),
                    price,
                    req.reduce_only,
                )?;
                let (id, seq) = self.next_order_id();
                book.orders.insert(
                    id.clone(),
                    PaperOrder {
                        id: id.clone(),
                        symbol: req.symbol.clone(),
                        side: req.side,
                        qty: req.qty.inner(),
                        kind: PaperOrderKind::Market,
                        state: OrderState::Filled,
                        filled_qty: filled,
                        seq,
                    },
                );
                let exit_side = req.side.opposite();
                if let Some(tp) = req.take_profit {
                    self.insert_trigger(
                        &mut book,
                        &req.symbol,
                        exit_side,
                        filled,
                        TriggerKind::TakeProfit,
                        tp,
                        true,
                    );
                }
                if let Some(sl) = req.stop_loss {
                    self.insert_trigger(
                        &mut book,
                        &req.symbol,
                        exit_side,
                        filled,
                        TriggerKind::StopLoss,
                        sl,
                        true,
                    );
                }
                let create_type = if req.reduce_only {
                    CreateType::ByClosing
                } else {
                    CreateType::Other("CreateByUser".to_string())
                };
                let update = OrderUpdate {
                    symbol: req.symbol.clone(),
                    side: req.side,
                    create_type,
                    price,
                    order_id: id.clone(),
                };
                (id, update)
            };
            debug!(
                symbol = %req.symbol,
                side = %req.side,
                qty = %req.qty,
                reduce_only = req.reduce_only,
                order_id = %id,
                at = %Utc::now(),
                "Paper market order filled"
            );
            self.publish(update);
            Ok(id)
        })
    }

    fn place_reduce_only_order(
        &self,
        req: TriggerOrderRequest,
    ) -> BoxFuture<'_, VenueResult<OrderId>> {
        Box::pin(async move {
            self.order_delay().await;
            self.check(match req.kind {
                TriggerKind::StopLoss => PaperOp::StopOrder,
                TriggerKind::TakeProfit => PaperOp::TakeProfitOrder,
            })?;
            let mut book = self.book.lock();
            let has_position = book
                .positions
                .get(&req.symbol)
                .is_some_and(|p| p.side.exit_order_side() == req.side);
            if !has_position {
                return Err(VenueError::Rejected(format!(
                    "reduce-only {} on {} has no position to protect",
                    req.kind, req.symbol
                )));
            }
            Ok(self.insert_trigger(
                &mut book,
                &req.symbol,
                req.side,
                req.qty.inner(),
                req.kind,
                req.trigger_price,
                false,
            ))
        })
    }

    fn get_order<'a>(
        &'a self,
        symbol: &'a Symbol,
        order_id: &'a OrderId,
    ) -> BoxFuture<'a, VenueResult<Option<OrderStatus>>> {
        Box::pin(async move {
            self.check(PaperOp::GetOrder)?;
            Ok(self
                .book
                .lock()
                .orders
                .get(order_id)
                .filter(|o| &o.symbol == symbol)
                .map(|o| OrderStatus {
                    order_id: o.id.clone(),
                    symbol: o.symbol.clone(),
                    side: o.side,
                    state: o.state,
                    filled_qty: Size::new(o.filled_qty),
                }))
        })
    }

    fn cancel_order<'a>(
        &'a self,
        symbol: &'a Symbol,
        order_id: &'a OrderId,
    ) -> BoxFuture<'a, VenueResult<()>> {
        Box::pin(async move {
            self.check(PaperOp::Cancel)?;
            let mut book = self.book.lock();
            let order = book
                .orders
                .get_mut(order_id)
                .filter(|o| &o.symbol == symbol)
                .ok_or_else(|| VenueError::NotFound(format!("order {order_id}")))?;
            if !order.state.is_cancellable() {
                return Err(VenueError::Rejected(format!(
                    "order {order_id} is {:?}",
                    order.state
                )));
            }
            order.state = OrderState::Cancelled;
            Ok(())
        })
    }

    fn subscribe_order_updates(
        &self,
        shutdown: CancellationToken,
    ) -> BoxFuture<'_, VenueResult<mpsc::Receiver<OrderUpdate>>> {
        Box::pin(async move {
            if !self.stream_enabled {
                return Err(VenueError::Unsupported(
                    "paper order stream disabled".to_string(),
                ));
            }
            let (tx, rx) = mpsc::channel(UPDATE_CHANNEL_CAPACITY);
            self.subscribers.lock().push(Subscriber { tx, shutdown });
            Ok(rx)
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    fn btc() -> Symbol {
        Symbol::new("BTCUSDT")
    }

    fn venue() -> PaperVenue {
        let v = PaperVenue::new(dec!(1000));
        v.set_price(&btc(), Price::new(dec!(100)));
        v
    }

    #[tokio::test]
    async fn test_market_order_opens_position() {
        let v = venue();
        v.place_market_order(MarketOrderRequest::entry(
            btc(),
            OrderSide::Buy,
            Size::new(dec!(2)),
        ))
        .await
        .unwrap();
        assert_eq!(v.position(&btc()), Some((Side::Long, Size::new(dec!(2)))));
    }

    #[tokio::test]
    async fn test_stop_trigger_fills_and_publishes() {
        let v = venue();
        let mut rx = v
            .subscribe_order_updates(CancellationToken::new())
            .await
            .unwrap();
        v.place_market_order(MarketOrderRequest::entry(
            btc(),
            OrderSide::Buy,
            Size::new(dec!(1)),
        ))
        .await
        .unwrap();
        let stop = v
            .place_reduce_only_order(TriggerOrderRequest {
                symbol: btc(),
                side: OrderSide::Sell,
                trigger_price: Price::new(dec!(95)),
                qty: Size::new(dec!(1)),
                kind: TriggerKind::StopLoss,
            })
            .await
            .unwrap();

        // entry update first
        let entry = rx.recv().await.unwrap();
        assert!(matches!(entry.create_type, CreateType::Other(_)));

        v.set_price(&btc(), Price::new(dec!(96)));
        assert_eq!(v.order_state(&stop), Some(OrderState::Untriggered));

        v.set_price(&btc(), Price::new(dec!(94)));
        let update = rx.recv().await.unwrap();
        assert_eq!(update.order_id, stop);
        assert_eq!(update.create_type, CreateType::Other("CreateByUser".to_string()));
        assert_eq!(update.position_side(), Side::Long);
        assert_eq!(v.position(&btc()), None);
        assert_eq!(v.balance(), dec!(994));
    }

    #[tokio::test]
    async fn test_attached_take_profit_reports_position_tag() {
        let v = venue();
        let mut rx = v
            .subscribe_order_updates(CancellationToken::new())
            .await
            .unwrap();
        let mut req = MarketOrderRequest::entry(btc(), OrderSide::Buy, Size::new(dec!(1)));
        req.take_profit = Some(Price::new(dec!(105)));
        v.place_market_order(req).await.unwrap();
        rx.recv().await.unwrap();

        v.set_price(&btc(), Price::new(dec!(106)));
        let update = rx.recv().await.unwrap();
        assert_eq!(update.create_type, CreateType::ByTakeProfit);
        assert_eq!(v.position(&btc()), None);
    }

    #[tokio::test]
    async fn test_fill_cancels_sibling_trigger() {
        let v = venue();
        v.place_market_order(MarketOrderRequest::entry(
            btc(),
            OrderSide::Sell,
            Size::new(dec!(1)),
        ))
        .await
        .unwrap();
        for (kind, price) in [
            (TriggerKind::StopLoss, dec!(105)),
            (TriggerKind::TakeProfit, dec!(90)),
        ] {
            v.place_reduce_only_order(TriggerOrderRequest {
                symbol: btc(),
                side: OrderSide::Buy,
                trigger_price: Price::new(price),
                qty: Size::new(dec!(1)),
                kind,
            })
            .await
            .unwrap();
        }
        assert_eq!(v.open_trigger_orders(&btc()), 2);
        v.set_price(&btc(), Price::new(dec!(89)));
        assert_eq!(v.open_trigger_orders(&btc()), 0);
        assert_eq!(v.balance(), dec!(1011));
    }

    #[tokio::test]
    async fn test_injected_failure_is_counted() {
        let v = venue();
        v.fail_next(PaperOp::Balance, 1);
        assert!(v.get_balance("USDT").await.is_err());
        assert!(v.get_balance("USDT").await.is_ok());
        assert_eq!(v.calls(PaperOp::Balance), 2);
    }

    #[tokio::test]
    async fn test_reduce_only_without_position_rejected() {
        let v = venue();
        let err = v
            .place_market_order(MarketOrderRequest::close(
                btc(),
                OrderSide::Sell,
                Size::new(dec!(1)),
            ))
            .await
            .unwrap_err();
        assert!(matches!(err, VenueError::Rejected(_)));
    }

    #[tokio::test]
    async fn test_cancel_filled_order_rejected() {
        let v = venue();
        let id = v
            .place_market_order(MarketOrderRequest::entry(
                btc(),
                OrderSide::Buy,
                Size::new(dec!(1)),
            ))
            .await
            .unwrap();
        assert!(v.cancel_order(&btc(), &id).await.is_err());
        let status = v.get_order(&btc(), &id).await.unwrap().unwrap();
        assert_eq!(status.state, OrderState::Filled);
    }

    #[tokio::test]
    async fn test_stream_disabled() {
        let v = PaperVenue::new(dec!(1)).without_order_stream();
        assert!(!v.supports_order_stream());
        assert!(v
            .subscribe_order_updates(CancellationToken::new())
            .await
            .is_err());
    }
}
