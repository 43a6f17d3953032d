//! Main application wiring.
//!
//! Builds the venue, feed, gateway, exit monitor, admission queue and
//! orchestrator from [`AppConfig`], then runs the webhook server and the
//! orchestrator until ctrl-c. Position state is not persisted: a position
//! open at shutdown stays on the venue and is only logged.

use std::collections::HashMap;
use std::net::SocketAddr;
use std::sync::Arc;

use sigbot_core::{Price, Symbol};
use sigbot_executor::OrderGateway;
use sigbot_feed::PriceFeed;
use sigbot_persistence::{TradeLog, TradeSink};
use sigbot_position::{ExitMonitor, MonitorMode};
use sigbot_venue::{BybitVenue, DynVenue, PaperVenue};
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tracing::{error, info, warn};

use crate::admission::AdmissionQueue;
use crate::config::{AppConfig, ExitDetection, VenueKind};
use crate::error::{AppError, AppResult};
use crate::notify::{DynNotifier, LogNotifier, TelegramNotifier};
use crate::orchestrator::Orchestrator;
use crate::signal::SignalParser;
use crate::webhook::{run_server, WebhookState};

/// Pick the exit detection mode.
///
/// Dry runs place no venue orders, so no fills are ever streamed for them.
pub fn resolve_monitor_mode(
    detection: ExitDetection,
    venue_streams: bool,
    dry_run: bool,
) -> AppResult<MonitorMode> {
    match (detection, venue_streams && !dry_run) {
        (ExitDetection::Polling, _) | (ExitDetection::Auto, false) => Ok(MonitorMode::Polling),
        (ExitDetection::Streaming, true) | (ExitDetection::Auto, true) => {
            Ok(MonitorMode::Streaming)
        }
        (ExitDetection::Streaming, false) if dry_run => Err(AppError::Config(
            "bot.exit_detection = \"streaming\" cannot detect exits with gateway.dry_run"
                .to_string(),
        )),
        (ExitDetection::Streaming, false) => Err(AppError::Config(
            "bot.exit_detection = \"streaming\" but the venue has no order stream".to_string(),
        )),
    }
}

/// Main application.
pub struct Application {
    config: AppConfig,
}

impl Application {
    pub fn new(config: AppConfig) -> AppResult<Self> {
        config.validate()?;
        Ok(Self { config })
    }

    fn build_venue(&self) -> AppResult<DynVenue> {
        let venue: DynVenue = match self.config.venue.kind {
            VenueKind::Paper => {
                let paper = PaperVenue::new(self.config.venue.initial_balance);
                let prices: HashMap<Symbol, Price> = self
                    .config
                    .venue
                    .initial_prices
                    .iter()
                    .map(|(symbol, price)| (Symbol::new(symbol), Price::new(*price)))
                    .collect();
                for symbol in self.config.tradable_symbols()? {
                    match prices.get(&symbol) {
                        Some(price) => paper.set_price(&symbol, *price),
                        None => warn!(%symbol, "No initial paper price, signals for it will fail"),
                    }
                }
                Arc::new(paper)
            }
            VenueKind::Bybit => Arc::new(BybitVenue::new(self.config.venue.bybit())?),
        };
        info!(venue = venue.name(), streams = venue.supports_order_stream(), "Venue ready");
        Ok(venue)
    }

    fn build_notifier(&self) -> AppResult<DynNotifier> {
        let quote = self.config.gateway.quote_asset.clone();
        match &self.config.telegram {
            Some(telegram) => {
                let notifier = TelegramNotifier::new(telegram, quote).map_err(AppError::Config)?;
                info!(chat_id = %telegram.chat_id, "Telegram notifications enabled");
                Ok(Arc::new(notifier))
            }
            None => {
                info!("No telegram section, notifications are logged only");
                Ok(Arc::new(LogNotifier::new(quote)))
            }
        }
    }

    /// Run until ctrl-c or until the webhook server stops.
    pub async fn run(self) -> AppResult<()> {
        let shutdown = CancellationToken::new();
        let venue = self.build_venue()?;
        let feed = Arc::new(PriceFeed::new(venue.clone()));

        let mut mode = resolve_monitor_mode(
            self.config.bot.exit_detection,
            venue.supports_order_stream(),
            self.config.gateway.dry_run,
        )?;
        let order_updates = if mode == MonitorMode::Streaming {
            match venue.subscribe_order_updates(shutdown.child_token()).await {
                Ok(rx) => Some(rx),
                Err(e) if self.config.bot.exit_detection == ExitDetection::Auto => {
                    warn!(error = %e, "Order stream unavailable, falling back to polling");
                    mode = MonitorMode::Polling;
                    None
                }
                Err(e) => return Err(e.into()),
            }
        } else {
            None
        };

        let (exit_tx, exit_rx) = mpsc::unbounded_channel();
        let monitor = ExitMonitor::new(
            mode,
            feed.clone(),
            self.config.bot.poll_interval(),
            exit_tx,
            shutdown.clone(),
        );
        let gateway = OrderGateway::new(venue.clone(), feed.clone(), self.config.gateway.clone());
        let (admission, dispatch_rx) = AdmissionQueue::new();
        let admission = Arc::new(admission);
        let history: Arc<dyn TradeSink> = Arc::new(TradeLog::open(&self.config.history.dir)?);
        let notifier = self.build_notifier()?;

        let orchestrator = Orchestrator::new(
            self.config.bot.clone(),
            feed,
            gateway,
            monitor,
            admission.clone(),
            history,
            notifier,
        );
        let state = WebhookState::new(
            Arc::new(SignalParser::from_config(&self.config)?),
            admission,
            orchestrator.ledger(),
        );

        let addr: SocketAddr = self.config.webhook.listen_addr.parse().map_err(|e| {
            AppError::Config(format!(
                "invalid webhook.listen_addr {}: {e}",
                self.config.webhook.listen_addr
            ))
        })?;

        let orchestrator_handle = tokio::spawn(orchestrator.run(
            dispatch_rx,
            exit_rx,
            order_updates,
            shutdown.clone(),
        ));
        let mut server_handle = tokio::spawn(run_server(addr, state, shutdown.clone()));

        info!(%addr, ?mode, "Application started");

        let server_result = tokio::select! {
            _ = tokio::signal::ctrl_c() => {
                info!("Shutdown signal received");
                None
            }
            result = &mut server_handle => Some(result),
        };

        shutdown.cancel();
        let server_result = match server_result {
            Some(result) => result,
            None => server_handle.await,
        };
        if let Err(e) = orchestrator_handle.await {
            error!(error = %e, "Orchestrator task failed");
        }

        match server_result {
            Ok(result) => result,
            Err(e) => Err(AppError::Server(format!("server task failed: {e}"))),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_resolve_monitor_mode() {
        assert_eq!(
            resolve_monitor_mode(ExitDetection::Auto, true, false).unwrap(),
            MonitorMode::Streaming
        );
        assert_eq!(
            resolve_monitor_mode(ExitDetection::Auto, false, false).unwrap(),
            MonitorMode::Polling
        );
        assert_eq!(
            resolve_monitor_mode(ExitDetection::Polling, true, false).unwrap(),
            MonitorMode::Polling
        );
        assert!(resolve_monitor_mode(ExitDetection::Streaming, false, false).is_err());
    }

    #[test]
    fn test_dry_run_always_polls() {
        assert_eq!(
            resolve_monitor_mode(ExitDetection::Auto, true, true).unwrap(),
            MonitorMode::Polling
        );
        assert_eq!(
            resolve_monitor_mode(ExitDetection::Polling, true, true).unwrap(),
            MonitorMode::Polling
        );
        assert!(resolve_monitor_mode(ExitDetection::Streaming, true, true).is_err());
    }

    #[test]
    fn test_new_validates() {
        assert!(Application::new(AppConfig::default()).is_err());
    }
}
