//! Order-related types and identifiers.
//!
//! A position has a [`Side`] (long or short); the orders that open or close
//! it carry an [`OrderSide`] (buy or sell). Venue push notifications arrive
//! as [`OrderUpdate`] tagged with the [`CreateType`] that caused them.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use uuid::Uuid;

use crate::decimal::Price;
use crate::error::CoreError;
use crate::market::Symbol;

/// Position direction.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Side {
    Long,
    Short,
}

impl Side {
    /// Returns the opposite direction.
    #[must_use]
    pub fn opposite(&self) -> Self {
        match self {
            Self::Long => Self::Short,
            Self::Short => Self::Long,
        }
    }

    /// Order side that opens a position in this direction.
    #[must_use]
    pub fn entry_order_side(&self) -> OrderSide {
        match self {
            Self::Long => OrderSide::Buy,
            Self::Short => OrderSide::Sell,
        }
    }

    /// Order side that reduces a position in this direction.
    #[must_use]
    pub fn exit_order_side(&self) -> OrderSide {
        self.entry_order_side().opposite()
    }

    #[must_use]
    pub fn is_long(&self) -> bool {
        matches!(self, Self::Long)
    }
}

impl fmt::Display for Side {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Long => write!(f, "Long"),
            Self::Short => write!(f, "Short"),
        }
    }
}

impl FromStr for Side {
    type Err = CoreError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "long" | "buy" => Ok(Self::Long),
            "short" | "sell" => Ok(Self::Short),
            other => Err(CoreError::InvalidSide(other.to_string())),
        }
    }
}

/// Order side: buy or sell.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum OrderSide {
    Buy,
    Sell,
}

impl OrderSide {
    /// Returns the opposite side.
    #[must_use]
    pub fn opposite(&self) -> Self {
        match self {
            Self::Buy => Self::Sell,
            Self::Sell => Self::Buy,
        }
    }

    /// Position direction this order side would open.
    #[must_use]
    pub fn opening_side(&self) -> Side {
        match self {
            Self::Buy => Side::Long,
            Self::Sell => Side::Short,
        }
    }

    /// Position direction this order side would close.
    #[must_use]
    pub fn closing_side(&self) -> Side {
        self.opening_side().opposite()
    }
}

impl fmt::Display for OrderSide {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Buy => write!(f, "Buy"),
            Self::Sell => write!(f, "Sell"),
        }
    }
}

/// Opaque venue order identifier.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct OrderId(String);

impl OrderId {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    /// Synthetic identifier returned when no venue call was made.
    pub fn synthetic() -> Self {
        Self(format!("dry-{}", Uuid::new_v4()))
    }

    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }

    #[must_use]
    pub fn is_synthetic(&self) -> bool {
        self.0.starts_with("dry-")
    }
}

impl fmt::Display for OrderId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Kind of a reduce-only trigger order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum TriggerKind {
    StopLoss,
    TakeProfit,
}

impl fmt::Display for TriggerKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::StopLoss => write!(f, "stop_loss"),
            Self::TakeProfit => write!(f, "take_profit"),
        }
    }
}

/// Why the venue created an order, as reported on the order stream.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum CreateType {
    ByTakeProfit,
    ByStopLoss,
    ByClosing,
    Other(String),
}

impl CreateType {
    /// Parse a venue tag such as `CreateByTakeProfit`.
    pub fn from_tag(tag: &str) -> Self {
        match tag {
            "CreateByTakeProfit" | "CreateByPartialTakeProfit" => Self::ByTakeProfit,
            "CreateByStopLoss" | "CreateByPartialStopLoss" | "CreateByTrailingStop" => {
                Self::ByStopLoss
            }
            "CreateByClosing" | "CreateByAdminClosing" => Self::ByClosing,
            other => Self::Other(other.to_string()),
        }
    }
}

/// Order update pushed by the venue.
///
/// `side` is the side of the order that was executed, so for exit orders
/// it is the opposite of the position side.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OrderUpdate {
    pub symbol: Symbol,
    pub side: OrderSide,
    pub create_type: CreateType,
    pub price: Price,
    pub order_id: OrderId,
}

impl OrderUpdate {
    /// Direction of the position this update would close.
    #[must_use]
    pub fn position_side(&self) -> Side {
        self.side.closing_side()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    #[test]
    fn test_side_order_mapping() {
        assert_eq!(Side::Long.entry_order_side(), OrderSide::Buy);
        assert_eq!(Side::Long.exit_order_side(), OrderSide::Sell);
        assert_eq!(Side::Short.entry_order_side(), OrderSide::Sell);
        assert_eq!(Side::Short.exit_order_side(), OrderSide::Buy);
    }

    #[test]
    fn test_side_from_str() {
        assert_eq!("BUY".parse::<Side>().unwrap(), Side::Long);
        assert_eq!("short".parse::<Side>().unwrap(), Side::Short);
        assert!("flat".parse::<Side>().is_err());
    }

    #[test]
    fn test_create_type_from_tag() {
        assert_eq!(
            CreateType::from_tag("CreateByTakeProfit"),
            CreateType::ByTakeProfit
        );
        assert_eq!(CreateType::from_tag("CreateByStopLoss"), CreateType::ByStopLoss);
        assert_eq!(CreateType::from_tag("CreateByClosing"), CreateType::ByClosing);
        assert_eq!(
            CreateType::from_tag("CreateByUser"),
            CreateType::Other("CreateByUser".to_string())
        );
    }

    #[test]
    fn test_update_position_side_is_inverted() {
        let update = OrderUpdate {
            symbol: Symbol::new("BTCUSDT"),
            side: OrderSide::Sell,
            create_type: CreateType::ByTakeProfit,
            price: Price::new(dec!(101)),
            order_id: OrderId::new("abc"),
        };
        assert_eq!(update.position_side(), Side::Long);
    }

    #[test]
    fn test_synthetic_order_id() {
        let id = OrderId::synthetic();
        assert!(id.is_synthetic());
        assert!(!OrderId::new("12345").is_synthetic());
    }
}
