//! Signal parsing and authentication.
//!
//! Turns a webhook payload into a [`StrategyCommand`] with its risk
//! parameters resolved for the configured policy. Payload `take`/`stop`
//! override the configured defaults:
//!
//! | policy     | `take`           | `stop`                |
//! |------------|------------------|-----------------------|
//! | percentage | take percent     | loss percent          |
//! | pips       | take pips        | loss pips             |
//! | swing      | take ratio       | ignored               |
//! | floating   | take-profit price| stop-loss price (required) |

use std::collections::{HashMap, HashSet};

use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use sigbot_core::{CommandAction, Price, RiskParams, Side, StrategyCommand, Symbol};

use crate::config::{AppConfig, PipEntry, RiskPolicyConfig};
use crate::error::{AppResult, SignalError};

/// Webhook body.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SignalPayload {
    pub action: String,
    pub currency: String,
    pub key: String,
    #[serde(default)]
    pub take: Option<Decimal>,
    #[serde(default)]
    pub stop: Option<Decimal>,
}

/// Map a payload action to a command action.
pub fn parse_action(action: &str) -> Result<CommandAction, SignalError> {
    match action.trim().to_ascii_uppercase().as_str() {
        "BUY" => Ok(CommandAction::Open(Side::Long)),
        "SELL" => Ok(CommandAction::Open(Side::Short)),
        "BUY_CANCEL" => Ok(CommandAction::Close(Side::Long)),
        "SELL_CANCEL" => Ok(CommandAction::Close(Side::Short)),
        other => Err(SignalError::UnknownAction(other.to_string())),
    }
}

/// Validates signals against the shared key, the symbol allow-list and the
/// risk policy.
#[derive(Debug, Clone)]
pub struct SignalParser {
    secret: String,
    symbols: HashSet<Symbol>,
    policy: RiskPolicyConfig,
    pips: HashMap<Symbol, PipEntry>,
}

impl SignalParser {
    pub fn new(
        secret: impl Into<String>,
        symbols: impl IntoIterator<Item = Symbol>,
        policy: RiskPolicyConfig,
        pips_table: &[PipEntry],
    ) -> Self {
        Self {
            secret: secret.into(),
            symbols: symbols.into_iter().collect(),
            policy,
            pips: pips_table
                .iter()
                .map(|e| (Symbol::new(&e.symbol), e.clone()))
                .collect(),
        }
    }

    pub fn from_config(config: &AppConfig) -> AppResult<Self> {
        Ok(Self::new(
            config.webhook.secret_key.clone(),
            config.tradable_symbols()?,
            config.risk.policy.clone(),
            &config.risk.pips_table,
        ))
    }

    pub fn parse(&self, payload: &SignalPayload) -> Result<StrategyCommand, SignalError> {
        if !constant_time_eq(payload.key.as_bytes(), self.secret.as_bytes()) {
            return Err(SignalError::Unauthorized);
        }
        let action = parse_action(&payload.action)?;
        let symbol: Symbol = payload
            .currency
            .parse()
            .map_err(|e| SignalError::Malformed(format!("currency: {e}")))?;
        if !self.symbols.contains(&symbol) {
            return Err(SignalError::UnknownSymbol(symbol.to_string()));
        }
        let risk = self.risk_params(&symbol, payload)?;
        Ok(StrategyCommand::new(action, symbol, risk))
    }

    fn risk_params(
        &self,
        symbol: &Symbol,
        payload: &SignalPayload,
    ) -> Result<RiskParams, SignalError> {
        let risk = match &self.policy {
            RiskPolicyConfig::Percentage {
                take_percent,
                loss_percent,
            } => RiskParams::Percentage {
                take_percent: payload.take.unwrap_or(*take_percent),
                loss_percent: payload.stop.unwrap_or(*loss_percent),
            },
            RiskPolicyConfig::Pips {
                take_pips,
                loss_pips,
            } => {
                let entry = self
                    .pips
                    .get(symbol)
                    .ok_or_else(|| SignalError::MissingPipEntry(symbol.to_string()))?;
                RiskParams::Pips {
                    take_pips: payload.take.or(entry.take_pips).unwrap_or(*take_pips),
                    loss_pips: payload.stop.or(entry.loss_pips).unwrap_or(*loss_pips),
                    pip_size: entry.pip_size,
                }
            }
            RiskPolicyConfig::Swing {
                lookback,
                interval,
                take_ratio,
            } => RiskParams::Swing {
                lookback: *lookback,
                interval: *interval,
                take_ratio: payload.take.unwrap_or(*take_ratio),
            },
            RiskPolicyConfig::Floating { risk_amount } => {
                let stop = payload.stop.ok_or_else(|| {
                    SignalError::Malformed("floating risk signals need a stop price".to_string())
                })?;
                RiskParams::FloatingRisk {
                    risk_amount: *risk_amount,
                    stop_loss: Price::new(stop),
                    take_profit: payload.take.map(Price::new),
                }
            }
        };
        validate_risk(&risk)?;
        Ok(risk)
    }
}

fn validate_risk(risk: &RiskParams) -> Result<(), SignalError> {
    let positive = |name: &str, v: Decimal| {
        if v > Decimal::ZERO {
            Ok(())
        } else {
            Err(SignalError::Malformed(format!("{name} must be positive, got {v}")))
        }
    };
    match risk {
        RiskParams::Percentage {
            take_percent,
            loss_percent,
        } => {
            positive("take", *take_percent)?;
            positive("stop", *loss_percent)
        }
        RiskParams::Pips {
            take_pips,
            loss_pips,
            pip_size,
        } => {
            positive("take", *take_pips)?;
            positive("stop", *loss_pips)?;
            positive("pip_size", *pip_size)
        }
        RiskParams::Swing { take_ratio, .. } => positive("take", *take_ratio),
        RiskParams::FloatingRisk {
            stop_loss,
            take_profit,
            ..
        } => {
            positive("stop", stop_loss.inner())?;
            match take_profit {
                Some(tp) => positive("take", tp.inner()),
                None => Ok(()),
            }
        }
    }
}

fn constant_time_eq(a: &[u8], b: &[u8]) -> bool {
    if a.len() != b.len() {
        return false;
    }
    a.iter().zip(b).fold(0u8, |acc, (x, y)| acc | (x ^ y)) == 0
}
