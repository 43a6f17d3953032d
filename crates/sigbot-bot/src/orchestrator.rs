//! Command orchestration.
//!
//! Runs one command at a time, in admission order:
//!
//! ```text
//! Dispatching --open ok--> AwaitingExit --exit event--> Finalizing --> Idle
//!      |                                                               ^
//!      +--rejected / failed / cancel-close-----------------------------+
//! ```
//!
//! Admission is released when a command finishes, except after a successful
//! open with the cancel policy disabled: then it is held until the exit is
//! finalized, so no other signal runs for the lifetime of the trade. With
//! the cancel policy enabled, admission is released at open time so that an
//! opposite signal can reach the open position.
//!
//! A take-profit with no venue order behind it (floating risk) is closed by
//! the orchestrator itself when the monitor reports it.
//!
//! In unwinding builds a panic inside a command is caught and logged, and
//! admission is released anyway. The release profile aborts on panic, so
//! there a panicking command ends the process.

use std::panic::AssertUnwindSafe;
use std::sync::Arc;

use chrono::Utc;
use futures_util::FutureExt;
use rust_decimal::Decimal;
use sigbot_core::{CommandAction, OrderUpdate, Price, Side, StrategyCommand, Symbol};
use sigbot_executor::{ExecutorError, OpenRequest, OrderGateway, Sizing};
use sigbot_feed::PriceFeed;
use sigbot_persistence::{TradeReason, TradeRecord, TradeSink};
use sigbot_position::{
    ExitEvent, ExitKind, ExitMonitor, ExitTarget, MonitorResult, Position, PositionLedger,
};
use sigbot_risk::RiskCalculator;
use sigbot_telemetry::Metrics;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

use crate::admission::AdmissionQueue;
use crate::config::BotConfig;
use crate::notify::{ClosedTrade, DynNotifier, OpenedTrade};

/// What to do with admission once a command returns.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Completion {
    Release,
    /// Keep admission until the position's exit is finalized.
    Hold,
}

pub struct Orchestrator {
    config: BotConfig,
    ledger: Arc<PositionLedger>,
    feed: Arc<PriceFeed>,
    risk: RiskCalculator,
    gateway: OrderGateway,
    monitor: ExitMonitor,
    admission: Arc<AdmissionQueue>,
    history: Arc<dyn TradeSink>,
    notifier: DynNotifier,
    /// Monitor generation armed for the ledger's position.
    active_generation: Option<u64>,
    holding_admission: bool,
}

impl Orchestrator {
    pub fn new(
        config: BotConfig,
        feed: Arc<PriceFeed>,
        gateway: OrderGateway,
        monitor: ExitMonitor,
        admission: Arc<AdmissionQueue>,
        history: Arc<dyn TradeSink>,
        notifier: DynNotifier,
    ) -> Self {
        info!(
            cancel = config.cancel,
            reverse = config.reverse,
            monitor_mode = ?monitor.mode(),
            dry_run = gateway.is_dry_run(),
            "Orchestrator initialized"
        );
        Self {
            config,
            ledger: Arc::new(PositionLedger::new()),
            risk: RiskCalculator::new(feed.clone()),
            feed,
            gateway,
            monitor,
            admission,
            history,
            notifier,
            active_generation: None,
            holding_admission: false,
        }
    }

    /// Shared handle to the position ledger, for read-only views.
    #[must_use]
    pub fn ledger(&self) -> Arc<PositionLedger> {
        self.ledger.clone()
    }

    /// Process dispatched commands, exit events and venue order updates
    /// until `shutdown` is cancelled or every input is closed.
    pub async fn run(
        mut self,
        mut commands: mpsc::UnboundedReceiver<StrategyCommand>,
        mut exits: mpsc::UnboundedReceiver<ExitEvent>,
        mut order_updates: Option<mpsc::Receiver<OrderUpdate>>,
        shutdown: CancellationToken,
    ) {
        info!("Orchestrator running");
        loop {
            tokio::select! {
                biased;

                _ = shutdown.cancelled() => {
                    info!("Orchestrator shutdown requested");
                    break;
                }

                Some(event) = exits.recv() => {
                    self.on_exit(event).await;
                }

                Some(update) = next_update(&mut order_updates) => {
                    self.monitor.on_order_update(&update);
                }

                Some(command) = commands.recv() => {
                    self.execute(command).await;
                }

                else => {
                    info!("All orchestrator inputs closed");
                    break;
                }
            }
        }

        self.monitor.cancel();
        if let Some(position) = self.ledger.current() {
            warn!(
                symbol = %position.symbol,
                side = %position.side,
                qty = %position.quantity,
                entry = %position.entry_price,
                "Position left open on the venue at shutdown"
            );
        }
    }

    /// Run one command and settle admission, even if the command panics.
    async fn execute(&mut self, command: StrategyCommand) {
        let action = command.action;
        let symbol = command.symbol.clone();
        let outcome = AssertUnwindSafe(self.handle(command)).catch_unwind().await;
        match outcome {
            Ok(Completion::Hold) => {
                self.holding_admission = true;
                debug!(%action, %symbol, "Admission held until exit");
            }
            Ok(Completion::Release) => self.admission.release(),
            Err(_) => {
                error!(%action, %symbol, "Command panicked, releasing admission");
                Metrics::command_executed(action_label(action), "panicked");
                self.holding_admission = false;
                self.admission.release();
            }
        }
    }

    async fn handle(&mut self, command: StrategyCommand) -> Completion {
        info!(
            action = %command.action,
            symbol = %command.symbol,
            origin = ?command.origin,
            policy = command.risk.policy_name(),
            "Executing command"
        );
        match command.action {
            CommandAction::Open(side) => self.handle_open(&command, side).await,
            CommandAction::Close(side) => {
                self.handle_close(&command, side).await;
                Completion::Release
            }
        }
    }

    // ========================================================================
    // Open
    // ========================================================================

    async fn handle_open(&mut self, command: &StrategyCommand, side: Side) -> Completion {
        if let Some(position) = self.ledger.current() {
            if self.config.cancel && position.symbol == command.symbol && position.side != side {
                info!(
                    symbol = %position.symbol,
                    held = %position.side,
                    signal = %side,
                    "Opposite signal for the open position, closing it"
                );
                if self.manual_close(&position).await && self.config.reverse {
                    let reversal = command.reversal_of(position.side);
                    info!(symbol = %reversal.symbol, action = %reversal.action, "Submitting reversal");
                    self.admission.submit(reversal);
                }
                Metrics::command_executed("open", "cancelled_opposite");
                return Completion::Release;
            }
            warn!(
                symbol = %command.symbol,
                %side,
                open_symbol = %position.symbol,
                open_side = %position.side,
                "Position already open, signal ignored"
            );
            Metrics::command_executed("open", "rejected_open");
            return Completion::Release;
        }

        match self.open_position(command, side).await {
            Some(()) => {
                Metrics::command_executed("open", "opened");
                if self.config.cancel {
                    Completion::Release
                } else {
                    Completion::Hold
                }
            }
            None => Completion::Release,
        }
    }

    /// Compute levels, place orders, record the position and arm the monitor.
    async fn open_position(&mut self, command: &StrategyCommand, side: Side) -> Option<()> {
        let symbol = &command.symbol;
        let levels = self.risk.compute(symbol, side, &command.risk).await;
        let stop_loss = match (levels.valid, levels.stop_loss) {
            (true, Some(stop_loss)) => stop_loss,
            _ => {
                warn!(
                    %symbol,
                    %side,
                    reason = levels.reason.as_deref().unwrap_or("no stop level"),
                    "Risk computation failed, command aborted"
                );
                Metrics::command_executed("open", "risk_invalid");
                return None;
            }
        };

        // Floating risk sizes the position from the stop distance; its target
        // is watched by the monitor only.
        let (sizing, venue_take_profit) = match levels.quantity {
            Some(qty) => (Sizing::Quantity(qty), None),
            None => (Sizing::BalanceFraction, levels.take_profit),
        };

        let placed = match self
            .gateway
            .open(OpenRequest {
                symbol: symbol.clone(),
                side,
                reference_price: levels.reference_price,
                sizing,
                stop_loss,
                take_profit: venue_take_profit,
            })
            .await
        {
            Ok(placed) => placed,
            Err(e) => {
                self.report_open_failure(symbol, side, &e);
                return None;
            }
        };

        Metrics::order_placed("entry");
        if placed.stop_order_id.is_some() {
            Metrics::order_placed("stop_loss");
        }
        if placed.take_profit_order_id.is_some() {
            Metrics::order_placed("take_profit");
        }

        let position = Position {
            symbol: symbol.clone(),
            side,
            entry_price: placed.entry_price,
            quantity: placed.quantity,
            order_id: placed.order_id.clone(),
            opened_at: Utc::now(),
            take_profit: levels.take_profit,
            stop_loss: Some(stop_loss),
            stop_order_id: placed.stop_order_id.clone(),
            take_profit_order_id: placed.take_profit_order_id.clone(),
        };
        if let Err(e) = self.ledger.open(position.clone()) {
            error!(%symbol, %side, error = %e, "Ledger refused the new position");
            return None;
        }
        Metrics::position_open(true);

        self.notifier
            .opened(&OpenedTrade {
                side,
                symbol: symbol.clone(),
                price: position.entry_price,
                take_profit: position.take_profit,
                stop_loss: position.stop_loss,
            })
            .await;

        self.arm_monitor(&position);
        Some(())
    }

    fn report_open_failure(&self, symbol: &Symbol, side: Side, err: &ExecutorError) {
        match err {
            ExecutorError::CriticalInconsistency { .. } => {
                Metrics::compensation(false);
                error!(
                    critical = true,
                    %symbol,
                    %side,
                    error = %err,
                    "Open failed and compensation failed, manual intervention required"
                );
                Metrics::command_executed("open", "critical");
            }
            ExecutorError::LegFailed { .. } => {
                Metrics::compensation(true);
                warn!(%symbol, %side, error = %err, "Open failed, entry compensated");
                Metrics::command_executed("open", "compensated");
            }
            _ => {
                warn!(%symbol, %side, error = %err, "Open failed, nothing placed");
                Metrics::command_executed("open", "failed");
            }
        }
    }

    fn arm_monitor(&mut self, position: &Position) {
        let generation = self.monitor.start(ExitTarget {
            symbol: position.symbol.clone(),
            side: position.side,
            take_profit: position.take_profit,
            stop_loss: position.stop_loss,
            stop_order_id: position.stop_order_id.clone(),
            take_profit_order_id: position.take_profit_order_id.clone(),
        });
        self.active_generation = Some(generation);
    }

    /// Reduce-only close of `position` plus cancellation of its resting legs.
    /// Returns the exit price.
    async fn flatten(&self, position: &Position, price: Price) -> Result<Price, ExecutorError> {
        let closed = self
            .gateway
            .close(
                &position.symbol,
                position.side,
                position.quantity,
                price,
                &position.protective_orders(),
            )
            .await?;
        Metrics::order_placed("close");
        Ok(closed.exit_price)
    }

    // ========================================================================
    // Close
    // ========================================================================

    async fn handle_close(&mut self, command: &StrategyCommand, side: Side) {
        if !self.config.cancel {
            debug!(symbol = %command.symbol, %side, "Cancel policy disabled, close ignored");
            Metrics::command_executed("close", "ignored");
            return;
        }
        let Some(position) = self.ledger.current().filter(|p| p.matches(&command.symbol, side))
        else {
            debug!(symbol = %command.symbol, %side, "No matching position, close ignored");
            Metrics::command_executed("close", "ignored");
            return;
        };

        if self.manual_close(&position).await {
            Metrics::command_executed("close", "closed");
            if self.config.reverse {
                let reversal = command.reversal_of(position.side);
                info!(symbol = %reversal.symbol, action = %reversal.action, "Submitting reversal");
                self.admission.submit(reversal);
            }
        } else {
            Metrics::command_executed("close", "failed");
        }
    }

    /// Close the position outside exit detection. Returns whether it closed.
    ///
    /// On failure the position stays in the ledger and the monitor is
    /// re-armed.
    async fn manual_close(&mut self, position: &Position) -> bool {
        if !self.monitor.cancel() && self.active_generation.is_some() {
            // The exit already fired; its queued event finalizes the trade.
            info!(symbol = %position.symbol, "Exit already reported, manual close skipped");
            return false;
        }
        self.active_generation = None;

        let price = match self.feed.price(&position.symbol).await {
            Ok(price) => price,
            Err(e) => {
                warn!(
                    symbol = %position.symbol,
                    error = %e,
                    "Price unavailable for close, reporting entry price"
                );
                position.entry_price
            }
        };

        match self.flatten(position, price).await {
            Ok(exit_price) => {
                self.finalize(
                    &position.symbol,
                    position.side,
                    TradeReason::Cancel,
                    ExitKind::Closed,
                    exit_price,
                )
                .await;
                true
            }
            Err(e) => {
                error!(
                    symbol = %position.symbol,
                    side = %position.side,
                    error = %e,
                    "Manual close failed, position stays open and monitored"
                );
                self.arm_monitor(position);
                false
            }
        }
    }

    // ========================================================================
    // Exit
    // ========================================================================

    async fn on_exit(&mut self, event: ExitEvent) {
        if self.active_generation != Some(event.generation) {
            debug!(
                generation = event.generation,
                active = ?self.active_generation,
                symbol = %event.result.symbol,
                "Stale exit event ignored"
            );
            return;
        }
        let MonitorResult {
            symbol,
            side,
            mut exit_price,
            kind,
        } = event.result;
        info!(%symbol, %side, %kind, price = %exit_price, "Exit detected");
        self.active_generation = None;

        let local_target = self
            .ledger
            .current()
            .filter(|p| p.matches(&symbol, side) && p.has_local_take_profit());
        if let (ExitKind::TakeProfit, Some(position)) = (kind, local_target) {
            match self.flatten(&position, exit_price).await {
                Ok(price) => exit_price = price,
                Err(e) => {
                    // Re-armed: the poller reports again while the price stays past the target.
                    error!(
                        %symbol,
                        %side,
                        error = %e,
                        "Take-profit close failed, position stays open and monitored"
                    );
                    self.arm_monitor(&position);
                    return;
                }
            }
        }

        let reason = match kind {
            ExitKind::TakeProfit => TradeReason::TakeProfit,
            ExitKind::StopLoss => TradeReason::StopLoss,
            ExitKind::Closed => TradeReason::Cancel,
        };
        self.finalize(&symbol, side, reason, kind, exit_price).await;
    }

    /// Remove the position, record the trade, notify, and hand back admission
    /// if it was held for this trade.
    async fn finalize(
        &mut self,
        symbol: &Symbol,
        side: Side,
        reason: TradeReason,
        kind: ExitKind,
        exit_price: Price,
    ) {
        let Some(position) = self.ledger.close(symbol, side) else {
            debug!(%symbol, %side, "Position already finalized");
            return;
        };
        Metrics::position_open(false);
        Metrics::exit(&kind.to_string());

        let balance = match self.gateway.balance().await {
            Ok(balance) => balance,
            Err(e) => {
                warn!(%symbol, error = %e, "Balance unavailable, recording zero");
                Decimal::ZERO
            }
        };

        let closed_at = Utc::now();
        let record = TradeRecord {
            closed_at,
            symbol: symbol.clone(),
            side,
            balance,
            reason,
            entry_price: position.entry_price,
            exit_price,
        };
        if let Err(e) = self.history.record(record) {
            error!(%symbol, error = %e, "Failed to record trade history");
        }

        self.notifier
            .closed(&ClosedTrade {
                side,
                symbol: symbol.clone(),
                kind: reason,
                held: position.held_for(closed_at),
                entry_price: position.entry_price,
                exit_price,
            })
            .await;

        info!(
            %symbol,
            %side,
            %reason,
            entry = %position.entry_price,
            exit = %exit_price,
            %balance,
            "Trade finalized"
        );

        if self.holding_admission {
            self.holding_admission = false;
            self.admission.release();
        }
    }
}

async fn next_update(rx: &mut Option<mpsc::Receiver<OrderUpdate>>) -> Option<OrderUpdate> {
    match rx {
        Some(rx) => rx.recv().await,
        None => std::future::pending().await,
    }
}

fn action_label(action: CommandAction) -> &'static str {
    match action {
        CommandAction::Open(_) => "open",
        CommandAction::Close(_) => "close",
    }
}
