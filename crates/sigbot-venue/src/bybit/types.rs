//! Bybit v5 wire types.

use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use sigbot_core::{CandleInterval, OrderSide};

/// Common v5 response envelope.
#[derive(Debug, Deserialize)]
pub struct Envelope<T> {
    #[serde(rename = "retCode")]
    pub ret_code: i64,
    #[serde(rename = "retMsg", default)]
    pub ret_msg: String,
    pub result: Option<T>,
}

#[derive(Debug, Deserialize)]
pub struct ListResult<T> {
    #[serde(default = "Vec::new")]
    pub list: Vec<T>,
}

#[derive(Debug, Deserialize)]
pub struct Ticker {
    pub symbol: String,
    #[serde(rename = "lastPrice")]
    pub last_price: Decimal,
}

#[derive(Debug, Deserialize)]
pub struct InstrumentInfo {
    pub symbol: String,
    #[serde(rename = "priceFilter")]
    pub price_filter: PriceFilter,
    #[serde(rename = "lotSizeFilter")]
    pub lot_size_filter: LotSizeFilter,
}

#[derive(Debug, Deserialize)]
pub struct PriceFilter {
    #[serde(rename = "tickSize")]
    pub tick_size: Decimal,
}

#[derive(Debug, Deserialize)]
pub struct LotSizeFilter {
    #[serde(rename = "qtyStep")]
    pub qty_step: Decimal,
    #[serde(rename = "minOrderQty")]
    pub min_order_qty: Decimal,
}

#[derive(Debug, Deserialize)]
pub struct WalletAccount {
    #[serde(default)]
    pub coin: Vec<WalletCoin>,
}

#[derive(Debug, Deserialize)]
pub struct WalletCoin {
    pub coin: String,
    #[serde(rename = "walletBalance")]
    pub wallet_balance: Decimal,
}

/// Kline row: `[startTime, open, high, low, close, volume, turnover]`, all strings.
pub type KlineRow = Vec<String>;

#[derive(Debug, Deserialize)]
pub struct CreatedOrder {
    #[serde(rename = "orderId")]
    pub order_id: String,
}

#[derive(Debug, Deserialize)]
pub struct OrderRecord {
    #[serde(rename = "orderId")]
    pub order_id: String,
    pub symbol: String,
    pub side: String,
    #[serde(rename = "orderStatus")]
    pub order_status: String,
    #[serde(rename = "cumExecQty", default)]
    pub cum_exec_qty: String,
}

/// Body of `POST /v5/order/create`.
#[derive(Debug, Serialize)]
pub struct CreateOrderBody {
    pub category: &'static str,
    pub symbol: String,
    pub side: &'static str,
    #[serde(rename = "orderType")]
    pub order_type: &'static str,
    pub qty: String,
    #[serde(rename = "reduceOnly")]
    pub reduce_only: bool,
    #[serde(rename = "positionIdx")]
    pub position_idx: u8,
    #[serde(rename = "takeProfit", skip_serializing_if = "Option::is_none")]
    pub take_profit: Option<String>,
    #[serde(rename = "stopLoss", skip_serializing_if = "Option::is_none")]
    pub stop_loss: Option<String>,
    #[serde(rename = "triggerPrice", skip_serializing_if = "Option::is_none")]
    pub trigger_price: Option<String>,
    /// 1: triggered when price rises to `triggerPrice`, 2: when it falls to it.
    #[serde(rename = "triggerDirection", skip_serializing_if = "Option::is_none")]
    pub trigger_direction: Option<u8>,
    #[serde(rename = "closeOnTrigger", skip_serializing_if = "Option::is_none")]
    pub close_on_trigger: Option<bool>,
}

#[derive(Debug, Serialize)]
pub struct SetLeverageBody {
    pub category: &'static str,
    pub symbol: String,
    #[serde(rename = "buyLeverage")]
    pub buy_leverage: String,
    #[serde(rename = "sellLeverage")]
    pub sell_leverage: String,
}

#[derive(Debug, Serialize)]
pub struct CancelOrderBody {
    pub category: &'static str,
    pub symbol: String,
    #[serde(rename = "orderId")]
    pub order_id: String,
}

/// Private stream `order` topic entry.
#[derive(Debug, Deserialize)]
pub struct StreamOrder {
    pub symbol: String,
    pub side: String,
    #[serde(rename = "orderId")]
    pub order_id: String,
    #[serde(rename = "orderStatus")]
    pub order_status: String,
    #[serde(rename = "createType", default)]
    pub create_type: String,
    #[serde(rename = "avgPrice", default)]
    pub avg_price: String,
    #[serde(rename = "lastPriceOnCreated", default)]
    pub last_price_on_created: String,
}

#[derive(Debug, Deserialize)]
pub struct StreamFrame {
    pub topic: Option<String>,
    #[serde(default)]
    pub data: Vec<serde_json::Value>,
    pub op: Option<String>,
    pub success: Option<bool>,
    #[serde(rename = "ret_msg")]
    pub ret_msg: Option<String>,
}

pub fn side_str(side: OrderSide) -> &'static str {
    match side {
        OrderSide::Buy => "Buy",
        OrderSide::Sell => "Sell",
    }
}

pub fn parse_side(s: &str) -> Option<OrderSide> {
    match s {
        "Buy" => Some(OrderSide::Buy),
        "Sell" => Some(OrderSide::Sell),
        _ => None,
    }
}

/// Kline interval parameter.
pub fn interval_param(interval: CandleInterval) -> &'static str {
    match interval {
        CandleInterval::OneMinute => "1",
        CandleInterval::ThreeMinutes => "3",
        CandleInterval::FiveMinutes => "5",
        CandleInterval::FifteenMinutes => "15",
        CandleInterval::ThirtyMinutes => "30",
        CandleInterval::OneHour => "60",
        CandleInterval::TwoHours => "120",
        CandleInterval::FourHours => "240",
        CandleInterval::SixHours => "360",
        CandleInterval::TwelveHours => "720",
        CandleInterval::OneDay => "D",
    }
}
