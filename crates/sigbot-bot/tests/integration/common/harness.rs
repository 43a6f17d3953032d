//! Orchestrator harness over [`PaperVenue`] with recording collaborators.

use std::sync::Arc;
use std::time::Duration;

use parking_lot::Mutex;
use rust_decimal_macros::dec;
use sigbot_bot::config::BotConfig;
use sigbot_bot::{AdmissionQueue, ClosedTrade, Notifier, OpenedTrade, Orchestrator};
use sigbot_core::{
    CommandAction, InstrumentSpec, Price, RiskParams, Side, StrategyCommand, Symbol,
};
use sigbot_executor::{GatewayConfig, OrderGateway};
use sigbot_feed::PriceFeed;
use sigbot_persistence::{PersistenceResult, TradeRecord, TradeSink};
use sigbot_position::{ExitMonitor, MonitorMode, PositionLedger};
use sigbot_venue::{BoxFuture, DynVenue, PaperVenue, Venue};
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

pub const POLL_INTERVAL: Duration = Duration::from_millis(10);

pub fn btc() -> Symbol {
    Symbol::new("BTCUSDT")
}

/// Open command with 2% take / 1% loss: a long at 100 targets 102 / 99.
pub fn open(side: Side) -> StrategyCommand {
    StrategyCommand::new(
        CommandAction::Open(side),
        btc(),
        RiskParams::Percentage {
            take_percent: dec!(0.02),
            loss_percent: dec!(0.01),
        },
    )
}

pub fn close(side: Side) -> StrategyCommand {
    let mut command = open(side);
    command.action = CommandAction::Close(side);
    command
}

#[derive(Default)]
pub struct RecordingSink {
    pub records: Mutex<Vec<TradeRecord>>,
}

impl TradeSink for RecordingSink {
    fn record(&self, record: TradeRecord) -> PersistenceResult<()> {
        self.records.lock().push(record);
        Ok(())
    }
}

#[derive(Default)]
pub struct RecordingNotifier {
    pub opened: Mutex<Vec<OpenedTrade>>,
    pub closed: Mutex<Vec<ClosedTrade>>,
}

impl Notifier for RecordingNotifier {
    fn opened<'a>(&'a self, trade: &'a OpenedTrade) -> BoxFuture<'a, ()> {
        Box::pin(async move { self.opened.lock().push(trade.clone()) })
    }

    fn closed<'a>(&'a self, trade: &'a ClosedTrade) -> BoxFuture<'a, ()> {
        Box::pin(async move { self.closed.lock().push(trade.clone()) })
    }
}

pub struct Harness {
    pub venue: Arc<PaperVenue>,
    pub admission: Arc<AdmissionQueue>,
    pub ledger: Arc<PositionLedger>,
    pub history: Arc<RecordingSink>,
    pub notifier: Arc<RecordingNotifier>,
    shutdown: CancellationToken,
    handle: JoinHandle<()>,
}

impl Harness {
    pub async fn start(bot: BotConfig, mode: MonitorMode) -> Self {
        Self::start_with(bot, mode, GatewayConfig::default()).await
    }

    /// BTCUSDT at 100 with a 0.1 tick, balance 1000. The order stream is
    /// always forwarded to the orchestrator.
    pub async fn start_with(bot: BotConfig, mode: MonitorMode, gateway: GatewayConfig) -> Self {
        let venue = Arc::new(PaperVenue::new(dec!(1000)));
        venue.set_instrument(InstrumentSpec {
            symbol: btc(),
            tick_size: dec!(0.1),
            qty_step: dec!(0.001),
            min_qty: dec!(0.001),
        });
        venue.set_price(&btc(), Price::new(dec!(100)));

        let shutdown = CancellationToken::new();
        let dyn_venue: DynVenue = venue.clone();
        let updates = dyn_venue
            .subscribe_order_updates(shutdown.child_token())
            .await
            .unwrap();

        let feed = Arc::new(PriceFeed::new(dyn_venue.clone()));
        let (exit_tx, exit_rx) = mpsc::unbounded_channel();
        let monitor = ExitMonitor::new(mode, feed.clone(), POLL_INTERVAL, exit_tx, shutdown.clone());
        let gateway = OrderGateway::new(dyn_venue, feed.clone(), gateway);
        let (admission, dispatch_rx) = AdmissionQueue::new();
        let admission = Arc::new(admission);
        let history = Arc::new(RecordingSink::default());
        let notifier = Arc::new(RecordingNotifier::default());

        let orchestrator = Orchestrator::new(
            bot,
            feed,
            gateway,
            monitor,
            admission.clone(),
            history.clone(),
            notifier.clone(),
        );
        let ledger = orchestrator.ledger();
        let handle = tokio::spawn(orchestrator.run(
            dispatch_rx,
            exit_rx,
            Some(updates),
            shutdown.clone(),
        ));

        Self {
            venue,
            admission,
            ledger,
            history,
            notifier,
            shutdown,
            handle,
        }
    }

    pub fn submit(&self, command: StrategyCommand) {
        self.admission.submit(command);
    }

    pub fn set_price(&self, price: Price) {
        self.venue.set_price(&btc(), price);
    }

    pub fn records(&self) -> Vec<TradeRecord> {
        self.history.records.lock().clone()
    }

    pub fn open_side(&self) -> Option<Side> {
        self.ledger.current().map(|p| p.side)
    }

    pub async fn stop(self) {
        self.shutdown.cancel();
        self.handle.await.unwrap();
    }
}

/// Wait up to two seconds for `cond`.
pub async fn wait_until(mut cond: impl FnMut() -> bool) {
    let waited = tokio::time::timeout(Duration::from_secs(2), async {
        while !cond() {
            tokio::time::sleep(Duration::from_millis(5)).await;
        }
    })
    .await;
    assert!(waited.is_ok(), "condition not reached within timeout");
}
