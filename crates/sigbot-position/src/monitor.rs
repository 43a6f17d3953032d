//! Exit monitor.
//!
//! Reports when the tracked position closed. Two detection paths exist:
//!
//! - **Polling**: a background task reads the reference price every
//!   `poll_interval` and compares it against TP/SL.
//! - **Streaming**: the caller forwards venue order updates to
//!   [`ExitMonitor::on_order_update`]. A fill of the position's own stop or
//!   take-profit order is classified by order id; other fills fall back to
//!   the venue's create-type tag.
//!
//! A take-profit level with no venue order behind it is only visible to the
//! poller, so in streaming mode such a target is still polled for its
//! take-profit.
//!
//! Order updates are honored in either mode, so a venue that streams fills
//! can race the poller. Each arming gets a new generation and only the first
//! report for the current generation while `Monitoring` is emitted.
//!
//! ```text
//! Idle --start--> Monitoring --exit--> Closed
//!                     |
//!                     +----cancel----> Cancelled
//! ```

use std::fmt;
use std::sync::Arc;
use std::time::Duration;

use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use sigbot_core::{CreateType, OrderId, OrderUpdate, Price, Side, Symbol};
use sigbot_feed::PriceFeed;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

// ============================================================================
// Types
// ============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MonitorMode {
    Polling,
    Streaming,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MonitorState {
    Idle,
    Monitoring,
    Closed,
    Cancelled,
}

/// Why the position left the market.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ExitKind {
    TakeProfit,
    StopLoss,
    /// Closed by a plain reduce-only order, neither TP nor SL.
    Closed,
}

impl ExitKind {
    /// `Some(true)` for TP, `Some(false)` for SL, `None` for a plain close.
    #[must_use]
    pub fn hit_take_profit(&self) -> Option<bool> {
        match self {
            Self::TakeProfit => Some(true),
            Self::StopLoss => Some(false),
            Self::Closed => None,
        }
    }

    /// Map a venue create-type tag. Entries and unknown tags are not exits.
    #[must_use]
    pub fn from_create_type(create_type: &CreateType) -> Option<Self> {
        match create_type {
            CreateType::ByTakeProfit => Some(Self::TakeProfit),
            CreateType::ByStopLoss => Some(Self::StopLoss),
            CreateType::ByClosing => Some(Self::Closed),
            CreateType::Other(_) => None,
        }
    }
}

impl fmt::Display for ExitKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::TakeProfit => write!(f, "TP"),
            Self::StopLoss => write!(f, "SL"),
            Self::Closed => write!(f, "Closed"),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MonitorResult {
    pub symbol: Symbol,
    pub side: Side,
    pub exit_price: Price,
    pub kind: ExitKind,
}

/// Levels the monitor watches for.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ExitTarget {
    pub symbol: Symbol,
    pub side: Side,
    pub take_profit: Option<Price>,
    pub stop_loss: Option<Price>,
    pub stop_order_id: Option<OrderId>,
    pub take_profit_order_id: Option<OrderId>,
}

impl ExitTarget {
    /// Classify a venue fill against this target.
    #[must_use]
    pub fn classify(&self, update: &OrderUpdate) -> Option<ExitKind> {
        if update.symbol != self.symbol {
            return None;
        }
        if self.stop_order_id.as_ref() == Some(&update.order_id) {
            return Some(ExitKind::StopLoss);
        }
        if self.take_profit_order_id.as_ref() == Some(&update.order_id) {
            return Some(ExitKind::TakeProfit);
        }
        if update.position_side() != self.side {
            return None;
        }
        ExitKind::from_create_type(&update.create_type)
    }

    /// The part of this target the poller has to watch in `mode`.
    #[must_use]
    pub fn polled_in(&self, mode: MonitorMode) -> Option<ExitTarget> {
        match mode {
            MonitorMode::Polling => Some(self.clone()),
            MonitorMode::Streaming
                if self.take_profit.is_some() && self.take_profit_order_id.is_none() =>
            {
                Some(ExitTarget {
                    stop_loss: None,
                    ..self.clone()
                })
            }
            MonitorMode::Streaming => None,
        }
    }

    /// TP/SL crossing at `price`, TP checked first.
    #[must_use]
    pub fn check(&self, price: Price) -> Option<ExitKind> {
        let (tp_hit, sl_hit) = match self.side {
            Side::Long => (
                self.take_profit.is_some_and(|tp| price >= tp),
                self.stop_loss.is_some_and(|sl| price <= sl),
            ),
            Side::Short => (
                self.take_profit.is_some_and(|tp| price <= tp),
                self.stop_loss.is_some_and(|sl| price >= sl),
            ),
        };
        if tp_hit {
            Some(ExitKind::TakeProfit)
        } else if sl_hit {
            Some(ExitKind::StopLoss)
        } else {
            None
        }
    }
}

/// Exit report tagged with the arming generation it belongs to.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ExitEvent {
    pub generation: u64,
    pub result: MonitorResult,
}

// ============================================================================
// ExitMonitor
// ============================================================================

#[derive(Debug)]
struct Slot {
    state: MonitorState,
    generation: u64,
    target: Option<ExitTarget>,
    token: Option<CancellationToken>,
}

pub struct ExitMonitor {
    mode: MonitorMode,
    feed: Arc<PriceFeed>,
    poll_interval: Duration,
    slot: Arc<Mutex<Slot>>,
    events: mpsc::UnboundedSender<ExitEvent>,
    shutdown: CancellationToken,
}

impl ExitMonitor {
    /// Create a monitor. Polling tasks are children of `shutdown`.
    pub fn new(
        mode: MonitorMode,
        feed: Arc<PriceFeed>,
        poll_interval: Duration,
        events: mpsc::UnboundedSender<ExitEvent>,
        shutdown: CancellationToken,
    ) -> Self {
        info!(?mode, poll_interval_ms = poll_interval.as_millis(), "ExitMonitor initialized");
        Self {
            mode,
            feed,
            poll_interval,
            slot: Arc::new(Mutex::new(Slot {
                state: MonitorState::Idle,
                generation: 0,
                target: None,
                token: None,
            })),
            events,
            shutdown,
        }
    }

    #[must_use]
    pub fn mode(&self) -> MonitorMode {
        self.mode
    }

    #[must_use]
    pub fn state(&self) -> MonitorState {
        self.slot.lock().state
    }

    #[must_use]
    pub fn generation(&self) -> u64 {
        self.slot.lock().generation
    }

    #[must_use]
    pub fn target(&self) -> Option<ExitTarget> {
        self.slot.lock().target.clone()
    }

    /// Arm the monitor for a position. Any previous arming is cancelled.
    ///
    /// Returns the new generation.
    pub fn start(&self, target: ExitTarget) -> u64 {
        let token = self.shutdown.child_token();
        let generation = {
            let mut slot = self.slot.lock();
            if let Some(previous) = slot.token.take() {
                previous.cancel();
            }
            slot.generation += 1;
            slot.state = MonitorState::Monitoring;
            slot.target = Some(target.clone());
            slot.token = Some(token.clone());
            slot.generation
        };

        info!(
            symbol = %target.symbol,
            side = %target.side,
            take_profit = ?target.take_profit,
            stop_loss = ?target.stop_loss,
            mode = ?self.mode,
            generation,
            "Exit monitoring started"
        );

        if let Some(polled) = target.polled_in(self.mode) {
            tokio::spawn(poll_loop(
                self.feed.clone(),
                self.slot.clone(),
                self.events.clone(),
                polled,
                generation,
                token,
                self.poll_interval,
            ));
        }
        generation
    }

    /// Stop monitoring without reporting. Returns whether it was monitoring.
    pub fn cancel(&self) -> bool {
        let mut slot = self.slot.lock();
        if slot.state != MonitorState::Monitoring {
            return false;
        }
        slot.state = MonitorState::Cancelled;
        if let Some(token) = slot.token.take() {
            token.cancel();
        }
        info!(generation = slot.generation, "Exit monitoring cancelled");
        true
    }

    /// Classify a venue order update and report an exit if it closes the
    /// monitored position. Returns whether an exit was emitted.
    pub fn on_order_update(&self, update: &OrderUpdate) -> bool {
        let (generation, side, kind) = {
            let slot = self.slot.lock();
            if slot.state != MonitorState::Monitoring {
                debug!(symbol = %update.symbol, state = ?slot.state, "Order update while not monitoring, ignored");
                return false;
            }
            let Some(target) = slot.target.as_ref() else {
                return false;
            };
            match target.classify(update) {
                Some(kind) => (slot.generation, target.side, kind),
                None => {
                    debug!(
                        symbol = %update.symbol,
                        order_id = %update.order_id,
                        create_type = ?update.create_type,
                        "Order update is not an exit of the monitored position"
                    );
                    return false;
                }
            }
        };

        fire(
            &self.slot,
            &self.events,
            generation,
            MonitorResult {
                symbol: update.symbol.clone(),
                side,
                exit_price: update.price,
                kind,
            },
        )
    }
}

/// Transition `Monitoring -> Closed` for `generation` and emit the event.
fn fire(
    slot: &Mutex<Slot>,
    events: &mpsc::UnboundedSender<ExitEvent>,
    generation: u64,
    result: MonitorResult,
) -> bool {
    {
        let mut slot = slot.lock();
        if slot.generation != generation || slot.state != MonitorState::Monitoring {
            debug!(
                generation,
                current = slot.generation,
                state = ?slot.state,
                "Stale exit report dropped"
            );
            return false;
        }
        slot.state = MonitorState::Closed;
        if let Some(token) = slot.token.take() {
            token.cancel();
        }
    }

    info!(
        symbol = %result.symbol,
        side = %result.side,
        exit_price = %result.exit_price,
        kind = %result.kind,
        generation,
        "Exit detected"
    );
    if events.send(ExitEvent { generation, result }).is_err() {
        warn!(generation, "Exit event receiver dropped");
    }
    true
}

async fn poll_loop(
    feed: Arc<PriceFeed>,
    slot: Arc<Mutex<Slot>>,
    events: mpsc::UnboundedSender<ExitEvent>,
    target: ExitTarget,
    generation: u64,
    token: CancellationToken,
    interval: Duration,
) {
    loop {
        tokio::select! {
            biased;
            () = token.cancelled() => {
                debug!(generation, "Polling stopped");
                return;
            }
            () = tokio::time::sleep(interval) => {}
        }
        if token.is_cancelled() {
            return;
        }

        match feed.price(&target.symbol).await {
            Ok(price) => {
                if let Some(kind) = target.check(price) {
                    fire(
                        &slot,
                        &events,
                        generation,
                        MonitorResult {
                            symbol: target.symbol.clone(),
                            side: target.side,
                            exit_price: price,
                            kind,
                        },
                    );
                    return;
                }
            }
            Err(e) => {
                warn!(symbol = %target.symbol, error = %e, "Price poll failed");
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;
    use sigbot_core::OrderSide;
    use sigbot_venue::PaperVenue;
    use tokio::time::timeout;

    fn btc() -> Symbol {
        Symbol::new("BTCUSDT")
    }

    fn target(side: Side) -> ExitTarget {
        let (tp, sl) = match side {
            Side::Long => (dec!(102), dec!(99)),
            Side::Short => (dec!(98), dec!(101)),
        };
        ExitTarget {
            symbol: btc(),
            side,
            take_profit: Some(Price::new(tp)),
            stop_loss: Some(Price::new(sl)),
            stop_order_id: Some(OrderId::new("stop-1")),
            take_profit_order_id: Some(OrderId::new("tp-1")),
        }
    }

    fn update(side: OrderSide, create_type: CreateType) -> OrderUpdate {
        OrderUpdate {
            symbol: btc(),
            side,
            create_type,
            price: Price::new(dec!(101.5)),
            order_id: OrderId::new("x"),
        }
    }

    fn setup(
        mode: MonitorMode,
        interval_ms: u64,
    ) -> (
        Arc<PaperVenue>,
        ExitMonitor,
        mpsc::UnboundedReceiver<ExitEvent>,
    ) {
        let venue = Arc::new(PaperVenue::new(dec!(1000)).without_order_stream());
        venue.set_price(&btc(), Price::new(dec!(100)));
        let feed = Arc::new(PriceFeed::new(venue.clone()));
        let (tx, rx) = mpsc::unbounded_channel();
        let monitor = ExitMonitor::new(
            mode,
            feed,
            Duration::from_millis(interval_ms),
            tx,
            CancellationToken::new(),
        );
        (venue, monitor, rx)
    }

    #[test]
    fn test_target_check() {
        let long = target(Side::Long);
        assert_eq!(long.check(Price::new(dec!(102))), Some(ExitKind::TakeProfit));
        assert_eq!(long.check(Price::new(dec!(99))), Some(ExitKind::StopLoss));
        assert_eq!(long.check(Price::new(dec!(100))), None);

        let short = target(Side::Short);
        assert_eq!(short.check(Price::new(dec!(97))), Some(ExitKind::TakeProfit));
        assert_eq!(short.check(Price::new(dec!(101))), Some(ExitKind::StopLoss));
        assert_eq!(short.check(Price::new(dec!(100))), None);

        let stop_only = ExitTarget {
            take_profit: None,
            ..target(Side::Long)
        };
        assert_eq!(stop_only.check(Price::new(dec!(1000))), None);
    }

    #[test]
    fn test_exit_kind_from_create_type() {
        assert_eq!(
            ExitKind::from_create_type(&CreateType::ByTakeProfit),
            Some(ExitKind::TakeProfit)
        );
        assert_eq!(ExitKind::StopLoss.hit_take_profit(), Some(false));
        assert_eq!(ExitKind::Closed.hit_take_profit(), None);
        assert_eq!(
            ExitKind::from_create_type(&CreateType::Other("CreateByUser".into())),
            None
        );
    }

    #[tokio::test]
    async fn test_polling_detects_take_profit() {
        let (venue, monitor, mut rx) = setup(MonitorMode::Polling, 5);
        let generation = monitor.start(target(Side::Long));
        assert_eq!(monitor.state(), MonitorState::Monitoring);

        venue.set_price(&btc(), Price::new(dec!(103)));
        let event = timeout(Duration::from_secs(2), rx.recv())
            .await
            .unwrap()
            .unwrap();
        assert_eq!(event.generation, generation);
        assert_eq!(event.result.kind, ExitKind::TakeProfit);
        assert_eq!(event.result.exit_price, Price::new(dec!(103)));
        assert_eq!(monitor.state(), MonitorState::Closed);
    }

    #[tokio::test]
    async fn test_polling_detects_short_stop() {
        let (venue, monitor, mut rx) = setup(MonitorMode::Polling, 5);
        monitor.start(target(Side::Short));
        venue.set_price(&btc(), Price::new(dec!(101.2)));
        let event = timeout(Duration::from_secs(2), rx.recv())
            .await
            .unwrap()
            .unwrap();
        assert_eq!(event.result.kind, ExitKind::StopLoss);
        assert_eq!(event.result.side, Side::Short);
    }

    #[tokio::test]
    async fn test_cancel_suppresses_exit() {
        let (venue, monitor, mut rx) = setup(MonitorMode::Polling, 5);
        monitor.start(target(Side::Long));
        assert!(monitor.cancel());
        assert!(!monitor.cancel());

        venue.set_price(&btc(), Price::new(dec!(90)));
        tokio::time::sleep(Duration::from_millis(50)).await;
        assert!(rx.try_recv().is_err());
        assert_eq!(monitor.state(), MonitorState::Cancelled);
    }

    #[tokio::test]
    async fn test_stream_update_classification() {
        let (_venue, monitor, mut rx) = setup(MonitorMode::Streaming, 5);
        monitor.start(target(Side::Short));

        // Sell closes a long, not our short
        assert!(!monitor.on_order_update(&update(OrderSide::Sell, CreateType::ByStopLoss)));
        let mut other = update(OrderSide::Buy, CreateType::ByStopLoss);
        other.symbol = Symbol::new("ETHUSDT");
        assert!(!monitor.on_order_update(&other));
        assert!(!monitor.on_order_update(&update(
            OrderSide::Buy,
            CreateType::Other("CreateByUser".into())
        )));

        assert!(monitor.on_order_update(&update(OrderSide::Buy, CreateType::ByStopLoss)));
        assert!(!monitor.on_order_update(&update(OrderSide::Buy, CreateType::ByTakeProfit)));

        let event = rx.recv().await.unwrap();
        assert_eq!(event.result.kind, ExitKind::StopLoss);
        assert_eq!(event.result.exit_price, Price::new(dec!(101.5)));
        assert!(rx.try_recv().is_err());
    }

    #[test]
    fn test_polled_part_of_target() {
        let full = target(Side::Long);
        assert_eq!(full.polled_in(MonitorMode::Polling), Some(full.clone()));
        assert_eq!(full.polled_in(MonitorMode::Streaming), None);

        let local_tp = ExitTarget {
            take_profit_order_id: None,
            ..target(Side::Long)
        };
        let polled = local_tp.polled_in(MonitorMode::Streaming).unwrap();
        assert_eq!(polled.take_profit, Some(Price::new(dec!(102))));
        assert_eq!(polled.stop_loss, None);
    }

    #[tokio::test]
    async fn test_own_leg_fill_classified_by_order_id() {
        let (_venue, monitor, mut rx) = setup(MonitorMode::Streaming, 5);
        monitor.start(target(Side::Long));

        // Conditional orders report a plain user create type when they fill
        let mut fill = update(OrderSide::Sell, CreateType::Other("CreateByUser".into()));
        fill.order_id = OrderId::new("stop-1");
        assert!(monitor.on_order_update(&fill));

        let event = rx.recv().await.unwrap();
        assert_eq!(event.result.kind, ExitKind::StopLoss);
        assert_eq!(event.result.side, Side::Long);
    }

    #[tokio::test]
    async fn test_take_profit_leg_id_wins_over_tag() {
        let (_venue, monitor, mut rx) = setup(MonitorMode::Streaming, 5);
        monitor.start(target(Side::Short));
        let mut fill = update(OrderSide::Buy, CreateType::Other("CreateByUser".into()));
        fill.order_id = OrderId::new("tp-1");
        assert!(monitor.on_order_update(&fill));
        assert_eq!(rx.recv().await.unwrap().result.kind, ExitKind::TakeProfit);
    }

    #[tokio::test]
    async fn test_streaming_polls_local_take_profit() {
        let (venue, monitor, mut rx) = setup(MonitorMode::Streaming, 5);
        monitor.start(ExitTarget {
            take_profit_order_id: None,
            ..target(Side::Long)
        });

        // The stop rests on the venue, so the poller leaves it alone
        venue.set_price(&btc(), Price::new(dec!(98)));
        tokio::time::sleep(Duration::from_millis(40)).await;
        assert!(rx.try_recv().is_err());

        venue.set_price(&btc(), Price::new(dec!(102.4)));
        let event = timeout(Duration::from_secs(2), rx.recv())
            .await
            .unwrap()
            .unwrap();
        assert_eq!(event.result.kind, ExitKind::TakeProfit);
        assert_eq!(event.result.exit_price, Price::new(dec!(102.4)));
    }

    #[tokio::test]
    async fn test_manual_close_update_is_plain_close() {
        let (_venue, monitor, mut rx) = setup(MonitorMode::Streaming, 5);
        monitor.start(target(Side::Long));
        assert!(monitor.on_order_update(&update(OrderSide::Sell, CreateType::ByClosing)));
        assert_eq!(rx.recv().await.unwrap().result.kind, ExitKind::Closed);
    }

    #[tokio::test]
    async fn test_rearm_bumps_generation() {
        let (_venue, monitor, mut rx) = setup(MonitorMode::Streaming, 5);
        let first = monitor.start(target(Side::Long));
        monitor.cancel();
        let second = monitor.start(target(Side::Long));
        assert!(second > first);

        monitor.on_order_update(&update(OrderSide::Sell, CreateType::ByTakeProfit));
        assert_eq!(rx.recv().await.unwrap().generation, second);
    }

    #[tokio::test]
    async fn test_poll_and_stream_race_reports_once() {
        let (venue, monitor, mut rx) = setup(MonitorMode::Polling, 10);
        monitor.start(target(Side::Long));

        venue.set_price(&btc(), Price::new(dec!(103)));
        monitor.on_order_update(&update(OrderSide::Sell, CreateType::ByTakeProfit));
        tokio::time::sleep(Duration::from_millis(60)).await;

        assert!(rx.try_recv().is_ok());
        assert!(rx.try_recv().is_err());
    }

    #[tokio::test]
    async fn test_shutdown_stops_polling() {
        let venue = Arc::new(PaperVenue::new(dec!(1000)).without_order_stream());
        venue.set_price(&btc(), Price::new(dec!(100)));
        let feed = Arc::new(PriceFeed::new(venue.clone()));
        let (tx, mut rx) = mpsc::unbounded_channel();
        let shutdown = CancellationToken::new();
        let monitor = ExitMonitor::new(
            MonitorMode::Polling,
            feed,
            Duration::from_millis(5),
            tx,
            shutdown.clone(),
        );
        monitor.start(target(Side::Long));
        shutdown.cancel();

        venue.set_price(&btc(), Price::new(dec!(50)));
        tokio::time::sleep(Duration::from_millis(40)).await;
        assert!(rx.try_recv().is_err());
    }
}
