//! Trade notifications.
//!
//! The orchestrator reports opened and closed trades through [`Notifier`].
//! Delivery failures are logged by the notifier and never fail a command.

use std::sync::Arc;
use std::time::Duration;

use chrono::Duration as ChronoDuration;
use rust_decimal::{Decimal, RoundingStrategy};
use sigbot_core::{Price, Side, Symbol};
use sigbot_persistence::TradeReason;
use sigbot_venue::BoxFuture;
use tracing::{info, warn};

use crate::config::TelegramConfig;

const TELEGRAM_TIMEOUT: Duration = Duration::from_secs(10);

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OpenedTrade {
    pub side: Side,
    pub symbol: Symbol,
    pub price: Price,
    pub take_profit: Option<Price>,
    pub stop_loss: Option<Price>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ClosedTrade {
    pub side: Side,
    pub symbol: Symbol,
    pub kind: TradeReason,
    pub held: ChronoDuration,
    pub entry_price: Price,
    pub exit_price: Price,
}

impl ClosedTrade {
    /// Signed return in percent, positive when the trade made money.
    #[must_use]
    pub fn return_pct(&self) -> Decimal {
        let move_pct = self
            .exit_price
            .pct_from(self.entry_price)
            .unwrap_or(Decimal::ZERO);
        let signed = match self.side {
            Side::Long => move_pct,
            Side::Short => -move_pct,
        };
        signed.round_dp_with_strategy(2, RoundingStrategy::MidpointAwayFromZero)
    }
}

pub trait Notifier: Send + Sync {
    fn opened<'a>(&'a self, trade: &'a OpenedTrade) -> BoxFuture<'a, ()>;
    fn closed<'a>(&'a self, trade: &'a ClosedTrade) -> BoxFuture<'a, ()>;
}

pub type DynNotifier = Arc<dyn Notifier>;

// ============================================================================
// Formatting
// ============================================================================

/// Emoji per message role.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EmojiSet {
    pub short: String,
    pub long: String,
    pub result: String,
    pub loss: String,
    pub enter: String,
    pub take_profit: String,
    pub stop_loss: String,
}

impl Default for EmojiSet {
    fn default() -> Self {
        Self::from_list(&[])
    }
}

impl EmojiSet {
    /// Roles by index: short, long, result, loss, enter, take-profit,
    /// stop-loss. Missing entries fall back to the defaults.
    #[must_use]
    pub fn from_list(list: &[String]) -> Self {
        const DEFAULTS: [&str; 7] = [
            "\u{1F534}",
            "\u{1F7E2}",
            "\u{1F4B0}",
            "\u{1F614}",
            "\u{27A1}\u{FE0F}",
            "\u{1F3AF}",
            "\u{1F6D1}",
        ];
        let pick = |i: usize| {
            list.get(i)
                .cloned()
                .unwrap_or_else(|| DEFAULTS[i].to_string())
        };
        Self {
            short: pick(0),
            long: pick(1),
            result: pick(2),
            loss: pick(3),
            enter: pick(4),
            take_profit: pick(5),
            stop_loss: pick(6),
        }
    }

    fn side(&self, side: Side) -> &str {
        match side {
            Side::Long => &self.long,
            Side::Short => &self.short,
        }
    }
}

/// `BTCUSDT` -> `#BTC/USDT`.
fn pair_tag(symbol: &Symbol, quote: &str) -> String {
    let base = symbol.base_asset(quote);
    if base.len() == symbol.as_str().len() {
        format!("#{symbol}")
    } else {
        format!("#{base}/{quote}")
    }
}

fn format_held(held: ChronoDuration) -> String {
    let secs = held.num_seconds().max(0);
    let (days, hours, minutes) = (secs / 86_400, (secs % 86_400) / 3600, (secs % 3600) / 60);
    if days > 0 {
        format!("{days}d {hours}h {minutes}m")
    } else if hours > 0 {
        format!("{hours}h {minutes}m")
    } else {
        format!("{minutes}m {}s", secs % 60)
    }
}

fn price_or_dash(price: Option<Price>) -> String {
    price.map_or_else(|| "-".to_string(), |p| p.to_string())
}

pub fn format_opened(trade: &OpenedTrade, emoji: &EmojiSet, quote: &str) -> String {
    format!(
        "{} {} {}\n{} Enter: {}\n{} TP: {}\n{} SL: {}",
        emoji.side(trade.side),
        pair_tag(&trade.symbol, quote),
        trade.side,
        emoji.enter,
        trade.price,
        emoji.take_profit,
        price_or_dash(trade.take_profit),
        emoji.stop_loss,
        price_or_dash(trade.stop_loss),
    )
}

pub fn format_closed(trade: &ClosedTrade, emoji: &EmojiSet, quote: &str) -> String {
    let kind = match trade.kind {
        TradeReason::TakeProfit => "TP",
        TradeReason::StopLoss => "SL",
        TradeReason::Cancel => "Cancel",
    };
    let pct = trade.return_pct();
    let (label, smile) = if pct < Decimal::ZERO {
        ("Loss", format!(" {}", emoji.loss))
    } else {
        ("Profit", String::new())
    };
    format!(
        "{} {} {} {}\n{} Enter: {}\n{} Exit: {}\nDuration: {}\n{} {}: {:.2}%{}",
        emoji.side(trade.side),
        pair_tag(&trade.symbol, quote),
        trade.side,
        kind,
        emoji.enter,
        trade.entry_price,
        emoji.stop_loss,
        trade.exit_price,
        format_held(trade.held),
        emoji.result,
        label,
        pct,
        smile,
    )
}

// ============================================================================
// Notifiers
// ============================================================================

/// Logs trades only.
pub struct LogNotifier {
    quote: String,
}

impl LogNotifier {
    pub fn new(quote: impl Into<String>) -> Self {
        Self {
            quote: quote.into(),
        }
    }
}

impl Notifier for LogNotifier {
    fn opened<'a>(&'a self, trade: &'a OpenedTrade) -> BoxFuture<'a, ()> {
        Box::pin(async move {
            info!(
                symbol = %trade.symbol,
                side = %trade.side,
                price = %trade.price,
                take_profit = ?trade.take_profit,
                stop_loss = ?trade.stop_loss,
                quote = %self.quote,
                "Trade opened"
            );
        })
    }

    fn closed<'a>(&'a self, trade: &'a ClosedTrade) -> BoxFuture<'a, ()> {
        Box::pin(async move {
            info!(
                symbol = %trade.symbol,
                side = %trade.side,
                kind = %trade.kind,
                entry = %trade.entry_price,
                exit = %trade.exit_price,
                return_pct = %trade.return_pct(),
                held_secs = trade.held.num_seconds(),
                "Trade closed"
            );
        })
    }
}

/// Sends formatted messages to a Telegram chat via the Bot API.
pub struct TelegramNotifier {
    client: reqwest::Client,
    url: String,
    chat_id: String,
    emoji: EmojiSet,
    quote: String,
}

impl TelegramNotifier {
    pub fn new(config: &TelegramConfig, quote: impl Into<String>) -> Result<Self, String> {
        let client = reqwest::Client::builder()
            .timeout(TELEGRAM_TIMEOUT)
            .build()
            .map_err(|e| format!("Failed to create HTTP client: {e}"))?;
        Ok(Self {
            client,
            url: format!(
                "{}/bot{}/sendMessage",
                config.api_url.trim_end_matches('/'),
                config.bot_token
            ),
            chat_id: config.chat_id.clone(),
            emoji: EmojiSet::from_list(&config.emoji),
            quote: quote.into(),
        })
    }

    async fn send(&self, text: String) {
        let body = serde_json::json!({ "chat_id": self.chat_id, "text": text });
        match self.client.post(&self.url).json(&body).send().await {
            Ok(resp) if resp.status().is_success() => {}
            Ok(resp) => warn!(status = %resp.status(), "Telegram rejected message"),
            Err(e) => warn!(error = %e, "Telegram send failed"),
        }
    }
}

impl Notifier for TelegramNotifier {
    fn opened<'a>(&'a self, trade: &'a OpenedTrade) -> BoxFuture<'a, ()> {
        Box::pin(self.send(format_opened(trade, &self.emoji, &self.quote)))
    }

    fn closed<'a>(&'a self, trade: &'a ClosedTrade) -> BoxFuture<'a, ()> {
        Box::pin(self.send(format_closed(trade, &self.emoji, &self.quote)))
    }
}
