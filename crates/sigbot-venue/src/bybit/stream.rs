//! Private order stream.
//!
//! Authenticates against the private WebSocket, subscribes to the `order`
//! topic and forwards filled orders as [`OrderUpdate`]s. Reconnects with
//! exponential backoff until the shutdown token is cancelled or the
//! receiver is dropped.

use chrono::Utc;
use futures_util::{SinkExt, StreamExt};
use rust_decimal::Decimal;
use sigbot_core::{CreateType, OrderId, OrderUpdate, Price, Symbol};
use std::time::Duration;
use tokio::sync::mpsc;
use tokio_tungstenite::{connect_async_tls_with_config, tungstenite::Message};
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

use super::rest::sign;
use super::types::{parse_side, StreamFrame, StreamOrder};
use crate::error::{VenueError, VenueResult};

/// Auth request validity window.
const AUTH_EXPIRY_MS: i64 = 10_000;

#[derive(Debug, Clone)]
pub struct StreamConfig {
    pub url: String,
    pub api_key: String,
    pub api_secret: String,
    pub ping_interval: Duration,
    pub reconnect_base_delay_ms: u64,
    pub reconnect_max_delay_ms: u64,
}

/// Build the `auth` operation for a given expiry timestamp.
pub fn auth_message(api_key: &str, api_secret: &str, expires: i64) -> VenueResult<String> {
    let signature = sign(api_secret, &format!("GET/realtime{expires}"))?;
    Ok(serde_json::json!({
        "op": "auth",
        "args": [api_key, expires, signature],
    })
    .to_string())
}

/// Extract filled orders from a stream frame. Non-order frames yield nothing.
pub fn parse_order_frame(text: &str) -> VenueResult<Vec<OrderUpdate>> {
    let frame: StreamFrame = serde_json::from_str(text)?;
    if frame.topic.as_deref() != Some("order") {
        return Ok(Vec::new());
    }

    let mut updates = Vec::new();
    for value in frame.data {
        let order: StreamOrder = match serde_json::from_value(value) {
            Ok(order) => order,
            Err(e) => {
                warn!(error = %e, "Skipping undecodable order entry");
                continue;
            }
        };
        if order.order_status != "Filled" {
            continue;
        }
        let Some(side) = parse_side(&order.side) else {
            warn!(side = %order.side, "Skipping order with unknown side");
            continue;
        };
        let Some(price) = exit_price(&order) else {
            warn!(order_id = %order.order_id, "Skipping order without price");
            continue;
        };
        updates.push(OrderUpdate {
            symbol: Symbol::new(&order.symbol),
            side,
            create_type: CreateType::from_tag(&order.create_type),
            price,
            order_id: OrderId::new(order.order_id),
        });
    }
    Ok(updates)
}

/// Average fill price, falling back to the last price when the order was created.
fn exit_price(order: &StreamOrder) -> Option<Price> {
    [&order.avg_price, &order.last_price_on_created]
        .into_iter()
        .filter_map(|s| s.parse::<Decimal>().ok())
        .find(|d| !d.is_zero())
        .map(Price::new)
}

pub struct OrderStream {
    config: StreamConfig,
}

impl OrderStream {
    pub fn new(config: StreamConfig) -> Self {
        Self { config }
    }

    /// Run until shutdown, reconnecting on failure.
    pub async fn run(self, tx: mpsc::Sender<OrderUpdate>, shutdown: CancellationToken) {
        let mut attempt = 0u32;

        loop {
            if shutdown.is_cancelled() || tx.is_closed() {
                info!("Order stream stopped");
                return;
            }

            match self.try_connect(&tx, &shutdown).await {
                Ok(()) => {
                    info!("Order stream connection closed");
                    attempt = 0;
                }
                Err(e) => {
                    error!(error = %e, "Order stream error");
                }
            }

            if shutdown.is_cancelled() || tx.is_closed() {
                info!("Order stream stopped");
                return;
            }

            attempt += 1;
            let delay = self.backoff_delay(attempt);
            warn!(attempt, delay_ms = delay.as_millis(), "Reconnecting order stream");

            tokio::select! {
                () = tokio::time::sleep(delay) => {}
                () = shutdown.cancelled() => {
                    info!("Shutdown requested during backoff");
                    return;
                }
            }
        }
    }

    async fn try_connect(
        &self,
        tx: &mpsc::Sender<OrderUpdate>,
        shutdown: &CancellationToken,
    ) -> VenueResult<()> {
        info!(url = %self.config.url, "Connecting order stream");
        let (ws_stream, _response) =
            connect_async_tls_with_config(&self.config.url, None, true, None).await?;
        let (mut write, mut read) = ws_stream.split();

        let expires = Utc::now().timestamp_millis() + AUTH_EXPIRY_MS;
        let auth = auth_message(&self.config.api_key, &self.config.api_secret, expires)?;
        write.send(Message::Text(auth)).await?;
        let subscribe = serde_json::json!({"op": "subscribe", "args": ["order"]}).to_string();
        write.send(Message::Text(subscribe)).await?;

        let mut ping = tokio::time::interval(self.config.ping_interval);
        ping.tick().await;

        loop {
            tokio::select! {
                () = shutdown.cancelled() => {
                    if let Err(e) = write.send(Message::Close(None)).await {
                        warn!(error = %e, "Failed to send Close frame during shutdown");
                    }
                    return Ok(());
                }

                msg = read.next() => {
                    match msg {
                        Some(Ok(Message::Text(text))) => {
                            self.handle_text(&text, tx).await?;
                        }
                        Some(Ok(Message::Ping(data))) => {
                            write.send(Message::Pong(data)).await?;
                        }
                        Some(Ok(Message::Close(frame))) => {
                            let reason = frame
                                .map(|f| f.reason.to_string())
                                .unwrap_or_else(|| "Normal close".to_string());
                            return Err(VenueError::WebSocket(format!("closed by server: {reason}")));
                        }
                        Some(Err(e)) => return Err(e.into()),
                        None => return Ok(()),
                        _ => {}
                    }
                }

                _ = ping.tick() => {
                    let msg = serde_json::json!({"op": "ping"}).to_string();
                    write.send(Message::Text(msg)).await?;
                    debug!("Sent order stream ping");
                }
            }
        }
    }

    async fn handle_text(&self, text: &str, tx: &mpsc::Sender<OrderUpdate>) -> VenueResult<()> {
        let frame: StreamFrame = serde_json::from_str(text)?;
        match frame.op.as_deref() {
            Some("auth") if frame.success != Some(true) => {
                return Err(VenueError::WebSocket(format!(
                    "auth rejected: {}",
                    frame.ret_msg.unwrap_or_default()
                )));
            }
            Some(op) => {
                debug!(%op, success = ?frame.success, "Order stream op response");
                return Ok(());
            }
            None => {}
        }

        for update in parse_order_frame(text)? {
            debug!(
                symbol = %update.symbol,
                side = %update.side,
                create_type = ?update.create_type,
                price = %update.price,
                "Order update received"
            );
            if tx.send(update).await.is_err() {
                return Err(VenueError::Unavailable("order update receiver dropped".to_string()));
            }
        }
        Ok(())
    }

    fn backoff_delay(&self, attempt: u32) -> Duration {
        let exponent = attempt.saturating_sub(1).min(10);
        let delay = self
            .config
            .reconnect_base_delay_ms
            .saturating_mul(1u64 << exponent)
            .min(self.config.reconnect_max_delay_ms);
        Duration::from_millis(delay)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;
    use sigbot_core::{OrderSide, Side};

    #[test]
    fn test_parse_take_profit_fill() {
        let text = r#"{
            "topic": "order",
            "data": [{
                "symbol": "BTCUSDT",
                "side": "Sell",
                "orderId": "abc",
                "orderStatus": "Filled",
                "createType": "CreateByTakeProfit",
                "avgPrice": "102.5",
                "lastPriceOnCreated": "102.4"
            }]
        }"#;
        let updates = parse_order_frame(text).unwrap();
        assert_eq!(updates.len(), 1);
        let u = &updates[0];
        assert_eq!(u.side, OrderSide::Sell);
        assert_eq!(u.position_side(), Side::Long);
        assert_eq!(u.create_type, CreateType::ByTakeProfit);
        assert_eq!(u.price, Price::new(dec!(102.5)));
    }

    #[test]
    fn test_parse_falls_back_to_last_price() {
        let text = r#"{"topic":"order","data":[{"symbol":"ETHUSDT","side":"Buy","orderId":"x",
            "orderStatus":"Filled","createType":"CreateByStopLoss","avgPrice":"","lastPriceOnCreated":"2000"}]}"#;
        let updates = parse_order_frame(text).unwrap();
        assert_eq!(updates[0].price, Price::new(dec!(2000)));
        assert_eq!(updates[0].create_type, CreateType::ByStopLoss);
    }

    #[test]
    fn test_parse_conditional_order_fill_keeps_order_id() {
        let text = r#"{"topic":"order","data":[{"symbol":"BTCUSDT","side":"Sell","orderId":"stop-77",
            "orderStatus":"Filled","createType":"CreateByUser","avgPrice":"98.9"}]}"#;
        let updates = parse_order_frame(text).unwrap();
        assert_eq!(updates[0].order_id, OrderId::new("stop-77"));
        assert_eq!(updates[0].create_type, CreateType::Other("CreateByUser".to_string()));
    }

    #[test]
    fn test_parse_skips_unfilled_and_other_topics() {
        let text = r#"{"topic":"order","data":[{"symbol":"BTCUSDT","side":"Sell","orderId":"a",
            "orderStatus":"Untriggered","createType":"CreateByStopLoss","avgPrice":"0"}]}"#;
        assert!(parse_order_frame(text).unwrap().is_empty());
        assert!(parse_order_frame(r#"{"op":"pong","success":true}"#)
            .unwrap()
            .is_empty());
    }

    #[test]
    fn test_auth_message_shape() {
        let msg = auth_message("key", "secret", 1_700_000_000_000).unwrap();
        let v: serde_json::Value = serde_json::from_str(&msg).unwrap();
        assert_eq!(v["op"], "auth");
        assert_eq!(v["args"][0], "key");
        assert_eq!(v["args"][1], 1_700_000_000_000i64);
        assert_eq!(v["args"][2].as_str().unwrap().len(), 64);
    }
}
