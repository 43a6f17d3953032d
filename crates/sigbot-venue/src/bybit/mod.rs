//! Bybit v5 linear-perpetual venue.

pub mod rest;
pub mod stream;
pub mod types;

use std::time::Duration;

use chrono::{TimeZone, Utc};
use rust_decimal::Decimal;
use sigbot_core::{
    Candle, CandleInterval, InstrumentSpec, OrderId, OrderSide, OrderUpdate, Price, Size,
    Symbol, TriggerKind,
};
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use self::rest::RestClient;
use self::stream::{OrderStream, StreamConfig};
use self::types::{
    interval_param, parse_side, side_str, CancelOrderBody, CreateOrderBody, CreatedOrder,
    InstrumentInfo, KlineRow, ListResult, OrderRecord, SetLeverageBody, Ticker, WalletAccount,
};
use crate::error::{VenueError, VenueResult};
use crate::venue::{
    BoxFuture, MarketOrderRequest, OrderState, OrderStatus, TriggerOrderRequest, Venue,
};

const CATEGORY: &str = "linear";
/// `set-leverage` answer when the leverage is already at the requested value.
const LEVERAGE_NOT_MODIFIED: i64 = 110043;
const ORDER_CHANNEL_CAPACITY: usize = 256;

pub const MAINNET_REST_URL: &str = "https://api.bybit.com";
pub const MAINNET_WS_URL: &str = "wss://stream.bybit.com/v5/private";
pub const TESTNET_REST_URL: &str = "https://api-testnet.bybit.com";
pub const TESTNET_WS_URL: &str = "wss://stream-testnet.bybit.com/v5/private";

/// Bybit connection configuration.
#[derive(Debug, Clone)]
pub struct BybitConfig {
    pub rest_url: String,
    pub ws_url: String,
    pub api_key: String,
    pub api_secret: String,
    pub recv_window_ms: u64,
    pub timeout: Duration,
    pub ping_interval: Duration,
}

impl BybitConfig {
    /// Default endpoints for mainnet or testnet.
    pub fn new(testnet: bool, api_key: impl Into<String>, api_secret: impl Into<String>) -> Self {
        let (rest_url, ws_url) = if testnet {
            (TESTNET_REST_URL, TESTNET_WS_URL)
        } else {
            (MAINNET_REST_URL, MAINNET_WS_URL)
        };
        Self {
            rest_url: rest_url.to_string(),
            ws_url: ws_url.to_string(),
            api_key: api_key.into(),
            api_secret: api_secret.into(),
            recv_window_ms: 5000,
            timeout: Duration::from_secs(10),
            ping_interval: Duration::from_secs(20),
        }
    }
}

pub struct BybitVenue {
    rest: RestClient,
    config: BybitConfig,
}

impl BybitVenue {
    pub fn new(config: BybitConfig) -> VenueResult<Self> {
        let rest = RestClient::new(
            config.rest_url.clone(),
            config.api_key.clone(),
            config.api_secret.clone(),
            config.recv_window_ms,
            config.timeout,
        )?;
        Ok(Self { rest, config })
    }

    async fn create_order(&self, body: CreateOrderBody) -> VenueResult<OrderId> {
        let created: CreatedOrder = self.rest.post("/v5/order/create", &body).await?;
        Ok(OrderId::new(created.order_id))
    }
}

fn format_decimal(d: Decimal) -> String {
    d.normalize().to_string()
}

fn parse_kline(row: &KlineRow) -> VenueResult<Candle> {
    let field = |i: usize| -> VenueResult<&str> {
        row.get(i)
            .map(String::as_str)
            .ok_or_else(|| VenueError::Decode(format!("kline row too short: {row:?}")))
    };
    let decimal = |i: usize| -> VenueResult<Price> {
        field(i)?
            .parse::<Decimal>()
            .map(Price::new)
            .map_err(|e| VenueError::Decode(format!("kline field {i}: {e}")))
    };
    let start_ms: i64 = field(0)?
        .parse()
        .map_err(|e| VenueError::Decode(format!("kline start: {e}")))?;
    let open_time = Utc
        .timestamp_millis_opt(start_ms)
        .single()
        .ok_or_else(|| VenueError::Decode(format!("kline start out of range: {start_ms}")))?;
    Ok(Candle {
        open_time,
        open: decimal(1)?,
        high: decimal(2)?,
        low: decimal(3)?,
        close: decimal(4)?,
    })
}

fn order_state(status: &str) -> OrderState {
    match status {
        "New" | "PartiallyFilled" | "Triggered" => OrderState::Open,
        "Untriggered" => OrderState::Untriggered,
        "Filled" => OrderState::Filled,
        "Rejected" => OrderState::Rejected,
        _ => OrderState::Cancelled,
    }
}

/// Trigger direction: 1 fires when price rises to the trigger, 2 when it falls.
fn trigger_direction(side: OrderSide, kind: TriggerKind) -> u8 {
    match (side, kind) {
        (OrderSide::Sell, TriggerKind::StopLoss) | (OrderSide::Buy, TriggerKind::TakeProfit) => 2,
        (OrderSide::Sell, TriggerKind::TakeProfit) | (OrderSide::Buy, TriggerKind::StopLoss) => 1,
    }
}

impl Venue for BybitVenue {
    fn name(&self) -> &str {
        "bybit"
    }

    fn supports_order_stream(&self) -> bool {
        self.rest.has_credentials()
    }

    fn get_price<'a>(&'a self, symbol: &'a Symbol) -> BoxFuture<'a, VenueResult<Price>> {
        Box::pin(async move {
            let result: ListResult<Ticker> = self
                .rest
                .get(
                    "/v5/market/tickers",
                    &[("category", CATEGORY.to_string()), ("symbol", symbol.to_string())],
                    false,
                )
                .await?;
            result
                .list
                .into_iter()
                .find(|t| t.symbol == symbol.as_str())
                .map(|t| Price::new(t.last_price))
                .ok_or_else(|| VenueError::NotFound(format!("ticker {symbol}")))
        })
    }

    fn get_instrument<'a>(
        &'a self,
        symbol: &'a Symbol,
    ) -> BoxFuture<'a, VenueResult<InstrumentSpec>> {
        Box::pin(async move {
            let result: ListResult<InstrumentInfo> = self
                .rest
                .get(
                    "/v5/market/instruments-info",
                    &[("category", CATEGORY.to_string()), ("symbol", symbol.to_string())],
                    false,
                )
                .await?;
            let info = result
                .list
                .into_iter()
                .find(|i| i.symbol == symbol.as_str())
                .ok_or_else(|| VenueError::NotFound(format!("instrument {symbol}")))?;
            Ok(InstrumentSpec {
                symbol: symbol.clone(),
                tick_size: info.price_filter.tick_size,
                qty_step: info.lot_size_filter.qty_step,
                min_qty: info.lot_size_filter.min_order_qty,
            })
        })
    }

    fn get_balance<'a>(&'a self, asset: &'a str) -> BoxFuture<'a, VenueResult<Decimal>> {
        Box::pin(async move {
            let result: ListResult<WalletAccount> = self
                .rest
                .get(
                    "/v5/account/wallet-balance",
                    &[("accountType", "UNIFIED".to_string()), ("coin", asset.to_string())],
                    true,
                )
                .await?;
            result
                .list
                .iter()
                .flat_map(|account| account.coin.iter())
                .find(|c| c.coin.eq_ignore_ascii_case(asset))
                .map(|c| c.wallet_balance)
                .ok_or_else(|| VenueError::NotFound(format!("balance for {asset}")))
        })
    }

    fn get_candles<'a>(
        &'a self,
        symbol: &'a Symbol,
        interval: CandleInterval,
        count: usize,
    ) -> BoxFuture<'a, VenueResult<Vec<Candle>>> {
        Box::pin(async move {
            let result: ListResult<KlineRow> = self
                .rest
                .get(
                    "/v5/market/kline",
                    &[
                        ("category", CATEGORY.to_string()),
                        ("symbol", symbol.to_string()),
                        ("interval", interval_param(interval).to_string()),
                        ("limit", count.to_string()),
                    ],
                    false,
                )
                .await?;
            // Venue returns newest first.
            let mut candles = result
                .list
                .iter()
                .map(parse_kline)
                .collect::<VenueResult<Vec<_>>>()?;
            candles.reverse();
            Ok(candles)
        })
    }

    fn set_leverage<'a>(
        &'a self,
        symbol: &'a Symbol,
        leverage: u32,
    ) -> BoxFuture<'a, VenueResult<()>> {
        Box::pin(async move {
            let body = SetLeverageBody {
                category: CATEGORY,
                symbol: symbol.to_string(),
                buy_leverage: leverage.to_string(),
                sell_leverage: leverage.to_string(),
            };
            let envelope = self
                .rest
                .post_envelope::<_, serde_json::Value>("/v5/position/set-leverage", &body)
                .await?;
            match envelope.ret_code {
                0 => {
                    info!(%symbol, leverage, "Leverage set");
                    Ok(())
                }
                LEVERAGE_NOT_MODIFIED => {
                    debug!(%symbol, leverage, "Leverage unchanged");
                    Ok(())
                }
                code => Err(VenueError::Api {
                    code,
                    msg: envelope.ret_msg,
                }),
            }
        })
    }

    fn place_market_order(&self, req: MarketOrderRequest) -> BoxFuture<'_, VenueResult<OrderId>> {
        Box::pin(async move {
            self.create_order(CreateOrderBody {
                category: CATEGORY,
                symbol: req.symbol.to_string(),
                side: side_str(req.side),
                order_type: "Market",
                qty: format_decimal(req.qty.inner()),
                reduce_only: req.reduce_only,
                position_idx: 0,
                take_profit: req.take_profit.map(|p| format_decimal(p.inner())),
                stop_loss: req.stop_loss.map(|p| format_decimal(p.inner())),
                trigger_price: None,
                trigger_direction: None,
                close_on_trigger: None,
            })
            .await
        })
    }

    fn place_reduce_only_order(
        &self,
        req: TriggerOrderRequest,
    ) -> BoxFuture<'_, VenueResult<OrderId>> {
        Box::pin(async move {
            self.create_order(CreateOrderBody {
                category: CATEGORY,
                symbol: req.symbol.to_string(),
                side: side_str(req.side),
                order_type: "Market",
                qty: format_decimal(req.qty.inner()),
                reduce_only: true,
                position_idx: 0,
                take_profit: None,
                stop_loss: None,
                trigger_price: Some(format_decimal(req.trigger_price.inner())),
                trigger_direction: Some(trigger_direction(req.side, req.kind)),
                close_on_trigger: Some(req.kind == TriggerKind::StopLoss),
            })
            .await
        })
    }

    fn get_order<'a>(
        &'a self,
        symbol: &'a Symbol,
        order_id: &'a OrderId,
    ) -> BoxFuture<'a, VenueResult<Option<OrderStatus>>> {
        Box::pin(async move {
            let result: ListResult<OrderRecord> = self
                .rest
                .get(
                    "/v5/order/realtime",
                    &[
                        ("category", CATEGORY.to_string()),
                        ("symbol", symbol.to_string()),
                        ("orderId", order_id.to_string()),
                    ],
                    true,
                )
                .await?;
            let Some(record) = result.list.into_iter().find(|o| o.order_id == order_id.as_str())
            else {
                return Ok(None);
            };
            let side = parse_side(&record.side)
                .ok_or_else(|| VenueError::Decode(format!("order side {}", record.side)))?;
            Ok(Some(OrderStatus {
                order_id: OrderId::new(record.order_id),
                symbol: Symbol::new(&record.symbol),
                side,
                state: order_state(&record.order_status),
                filled_qty: Size::new(record.cum_exec_qty.parse::<Decimal>().unwrap_or_default()),
            }))
        })
    }

    fn cancel_order<'a>(
        &'a self,
        symbol: &'a Symbol,
        order_id: &'a OrderId,
    ) -> BoxFuture<'a, VenueResult<()>> {
        Box::pin(async move {
            let body = CancelOrderBody {
                category: CATEGORY,
                symbol: symbol.to_string(),
                order_id: order_id.to_string(),
            };
            let _: serde_json::Value = self.rest.post("/v5/order/cancel", &body).await?;
            info!(%symbol, %order_id, "Order cancelled");
            Ok(())
        })
    }

    fn subscribe_order_updates(
        &self,
        shutdown: CancellationToken,
    ) -> BoxFuture<'_, VenueResult<mpsc::Receiver<OrderUpdate>>> {
        Box::pin(async move {
            if !self.rest.has_credentials() {
                warn!("Order stream requested without api credentials");
                return Err(VenueError::Unsupported(
                    "order stream requires api credentials".to_string(),
                ));
            }
            crate::init_crypto();
            let (tx, rx) = mpsc::channel(ORDER_CHANNEL_CAPACITY);
            let stream = OrderStream::new(StreamConfig {
                url: self.config.ws_url.clone(),
                api_key: self.config.api_key.clone(),
                api_secret: self.config.api_secret.clone(),
                ping_interval: self.config.ping_interval,
                reconnect_base_delay_ms: 1000,
                reconnect_max_delay_ms: 60_000,
            });
            tokio::spawn(stream.run(tx, shutdown));
            Ok(rx)
        })
    }
}
