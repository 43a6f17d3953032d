//! Error types for sigbot-core.

use thiserror::Error;

/// Parse failures for core domain values.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum CoreError {
    /// Empty or containing characters other than ASCII letters and digits.
    #[error("Invalid symbol: {0:?}")]
    InvalidSymbol(String),

    #[error("Invalid side: {0:?} (expected long/short or buy/sell)")]
    InvalidSide(String),

    #[error("Unknown candle interval: {0:?}")]
    InvalidInterval(String),
}

/// Result type alias for core operations.
pub type Result<T> = std::result::Result<T, CoreError>;
