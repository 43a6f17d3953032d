//! Application configuration.

use std::collections::HashMap;
use std::time::Duration;

use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use sigbot_core::{CandleInterval, Symbol};
use sigbot_executor::GatewayConfig;
use sigbot_venue::BybitConfig;

use crate::error::{AppError, AppResult};

/// Webhook listener.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WebhookConfig {
    #[serde(default = "default_listen_addr")]
    pub listen_addr: String,
    /// Shared secret every signal must carry in `key`.
    #[serde(default)]
    pub secret_key: String,
}

fn default_listen_addr() -> String {
    "0.0.0.0:8080".to_string()
}

impl Default for WebhookConfig {
    fn default() -> Self {
        Self {
            listen_addr: default_listen_addr(),
            secret_key: String::new(),
        }
    }
}

/// How the position exit is detected.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ExitDetection {
    Polling,
    Streaming,
    /// Streaming when the venue supports it, polling otherwise.
    #[default]
    Auto,
}

/// Orchestrator policy.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BotConfig {
    /// Opposite signals and cancel actions close the open position.
    #[serde(default)]
    pub cancel: bool,
    /// After a cancel, open the opposite side.
    #[serde(default)]
    pub reverse: bool,
    #[serde(default)]
    pub exit_detection: ExitDetection,
    #[serde(default = "default_poll_interval_ms")]
    pub poll_interval_ms: u64,
}

fn default_poll_interval_ms() -> u64 {
    50
}

impl Default for BotConfig {
    fn default() -> Self {
        Self {
            cancel: false,
            reverse: false,
            exit_detection: ExitDetection::default(),
            poll_interval_ms: default_poll_interval_ms(),
        }
    }
}

impl BotConfig {
    #[must_use]
    pub fn poll_interval(&self) -> Duration {
        Duration::from_millis(self.poll_interval_ms)
    }
}

/// TP/SL policy for the deployment.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum RiskPolicyConfig {
    /// Fractions, 0.02 = 2%.
    Percentage {
        take_percent: Decimal,
        loss_percent: Decimal,
    },
    /// Pip size comes from `pips_table`.
    Pips { take_pips: Decimal, loss_pips: Decimal },
    Swing {
        lookback: usize,
        interval: CandleInterval,
        take_ratio: Decimal,
    },
    /// Signals must carry `stop`.
    Floating { risk_amount: Decimal },
}

impl Default for RiskPolicyConfig {
    fn default() -> Self {
        Self::Percentage {
            take_percent: Decimal::new(2, 2),
            loss_percent: Decimal::new(1, 2),
        }
    }
}

/// Per-symbol pip settings.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PipEntry {
    pub symbol: String,
    pub pip_size: Decimal,
    #[serde(default)]
    pub take_pips: Option<Decimal>,
    #[serde(default)]
    pub loss_pips: Option<Decimal>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct RiskConfig {
    #[serde(default)]
    pub policy: RiskPolicyConfig,
    #[serde(default)]
    pub pips_table: Vec<PipEntry>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum VenueKind {
    #[default]
    Paper,
    Bybit,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct VenueConfig {
    #[serde(default)]
    pub kind: VenueKind,
    #[serde(default)]
    pub testnet: bool,
    /// Overrides the default REST endpoint.
    #[serde(default)]
    pub rest_url: Option<String>,
    /// Overrides the default private stream endpoint.
    #[serde(default)]
    pub ws_url: Option<String>,
    /// Overridden by `SIGBOT_API_KEY`.
    #[serde(default)]
    pub api_key: String,
    /// Overridden by `SIGBOT_API_SECRET`.
    #[serde(default)]
    pub api_secret: String,
    #[serde(default = "default_recv_window_ms")]
    pub recv_window_ms: u64,
    #[serde(default = "default_timeout_ms")]
    pub timeout_ms: u64,
    /// Paper venue starting balance.
    #[serde(default = "default_initial_balance")]
    pub initial_balance: Decimal,
    /// Paper venue starting prices by symbol.
    #[serde(default)]
    pub initial_prices: HashMap<String, Decimal>,
}

fn default_recv_window_ms() -> u64 {
    5000
}

fn default_timeout_ms() -> u64 {
    10_000
}

fn default_initial_balance() -> Decimal {
    Decimal::from(1000)
}

impl Default for VenueConfig {
    fn default() -> Self {
        Self {
            kind: VenueKind::default(),
            testnet: false,
            rest_url: None,
            ws_url: None,
            api_key: String::new(),
            api_secret: String::new(),
            recv_window_ms: default_recv_window_ms(),
            timeout_ms: default_timeout_ms(),
            initial_balance: default_initial_balance(),
            initial_prices: HashMap::new(),
        }
    }
}

impl VenueConfig {
    #[must_use]
    pub fn bybit(&self) -> BybitConfig {
        let mut config = BybitConfig::new(self.testnet, &self.api_key, &self.api_secret);
        if let Some(url) = &self.rest_url {
            config.rest_url = url.clone();
        }
        if let Some(url) = &self.ws_url {
            config.ws_url = url.clone();
        }
        config.recv_window_ms = self.recv_window_ms;
        config.timeout = Duration::from_millis(self.timeout_ms);
        config
    }
}

/// Telegram notifications. Emoji roles by index: short, long, result,
/// loss, enter, take-profit, stop-loss.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TelegramConfig {
    pub bot_token: String,
    pub chat_id: String,
    #[serde(default)]
    pub emoji: Vec<String>,
    #[serde(default = "default_telegram_api_url")]
    pub api_url: String,
}

fn default_telegram_api_url() -> String {
    "https://api.telegram.org".to_string()
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HistoryConfig {
    #[serde(default = "default_history_dir")]
    pub dir: String,
}

fn default_history_dir() -> String {
    "data/history".to_string()
}

impl Default for HistoryConfig {
    fn default() -> Self {
        Self {
            dir: default_history_dir(),
        }
    }
}

/// Main application configuration.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct AppConfig {
    #[serde(default)]
    pub webhook: WebhookConfig,
    #[serde(default)]
    pub bot: BotConfig,
    #[serde(default)]
    pub risk: RiskConfig,
    #[serde(default)]
    pub venue: VenueConfig,
    #[serde(default)]
    pub gateway: GatewayConfig,
    #[serde(default)]
    pub telegram: Option<TelegramConfig>,
    #[serde(default)]
    pub history: HistoryConfig,
    /// Tradable symbols.
    #[serde(default)]
    pub symbols: Vec<String>,
}

impl AppConfig {
    /// Load from a file and apply environment overrides.
    ///
    /// Validation is left to the caller: the history viewer needs no
    /// webhook secret.
    pub fn from_file(path: &str) -> AppResult<Self> {
        let content = std::fs::read_to_string(path)
            .map_err(|e| AppError::Config(format!("Failed to read config {path}: {e}")))?;
        let mut config = Self::from_toml(&content)?;
        config.apply_env_overrides();
        Ok(config)
    }

    pub fn from_toml(content: &str) -> AppResult<Self> {
        toml::from_str(content).map_err(|e| AppError::Config(format!("Failed to parse config: {e}")))
    }

    /// Secrets from `SIGBOT_API_KEY`, `SIGBOT_API_SECRET` and `SIGBOT_WEBHOOK_KEY`.
    pub fn apply_env_overrides(&mut self) {
        if let Ok(key) = std::env::var("SIGBOT_API_KEY") {
            self.venue.api_key = key;
        }
        if let Ok(secret) = std::env::var("SIGBOT_API_SECRET") {
            self.venue.api_secret = secret;
        }
        if let Ok(key) = std::env::var("SIGBOT_WEBHOOK_KEY") {
            self.webhook.secret_key = key;
        }
    }

    pub fn validate(&self) -> AppResult<()> {
        if self.symbols.is_empty() {
            return Err(AppError::Config("symbols must not be empty".to_string()));
        }
        if self.webhook.secret_key.is_empty() {
            return Err(AppError::Config("webhook.secret_key must be set".to_string()));
        }
        self.tradable_symbols()?;
        if self.gateway.leverage == 0 {
            return Err(AppError::Config("gateway.leverage must be at least 1".to_string()));
        }
        if self.gateway.order_size_percent <= Decimal::ZERO {
            return Err(AppError::Config(
                "gateway.order_size_percent must be positive".to_string(),
            ));
        }
        if self.bot.poll_interval_ms == 0 {
            return Err(AppError::Config("bot.poll_interval_ms must be positive".to_string()));
        }
        if self.gateway.dry_run && self.bot.exit_detection == ExitDetection::Streaming {
            return Err(AppError::Config(
                "gateway.dry_run needs bot.exit_detection = \"polling\" or \"auto\"".to_string(),
            ));
        }
        if self.bot.reverse && !self.bot.cancel {
            tracing::warn!("bot.reverse has no effect without bot.cancel");
        }
        if matches!(self.risk.policy, RiskPolicyConfig::Pips { .. }) {
            let tradable = self.tradable_symbols()?;
            for symbol in &tradable {
                if !self.risk.pips_table.iter().any(|e| Symbol::new(&e.symbol) == *symbol) {
                    tracing::warn!(%symbol, "No pip table entry, signals for it will be refused");
                }
            }
        }
        if self.venue.kind == VenueKind::Bybit
            && !self.gateway.dry_run
            && (self.venue.api_key.is_empty() || self.venue.api_secret.is_empty())
        {
            return Err(AppError::Config(
                "bybit venue needs api_key and api_secret unless gateway.dry_run is set"
                    .to_string(),
            ));
        }
        Ok(())
    }

    /// Parsed allow-list of symbols.
    pub fn tradable_symbols(&self) -> AppResult<Vec<Symbol>> {
        self.symbols
            .iter()
            .map(|s| {
                s.parse::<Symbol>()
                    .map_err(|e| AppError::Config(format!("invalid symbol {s:?}: {e}")))
            })
            .collect()
    }
}
