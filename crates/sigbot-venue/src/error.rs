//! Venue error types.

use thiserror::Error;

#[derive(Debug, Error)]
pub enum VenueError {
    #[error("HTTP error: {0}")]
    Http(String),

    #[error("Venue API error: code={code}, msg={msg}")]
    Api { code: i64, msg: String },

    #[error("Decode error: {0}")]
    Decode(String),

    #[error("Not found: {0}")]
    NotFound(String),

    #[error("Order rejected: {0}")]
    Rejected(String),

    #[error("Venue unavailable: {0}")]
    Unavailable(String),

    #[error("WebSocket error: {0}")]
    WebSocket(String),

    #[error("Not supported: {0}")]
    Unsupported(String),
}

impl From<reqwest::Error> for VenueError {
    fn from(e: reqwest::Error) -> Self {
        if e.is_timeout() || e.is_connect() {
            Self::Unavailable(e.to_string())
        } else {
            Self::Http(e.to_string())
        }
    }
}

impl From<serde_json::Error> for VenueError {
    fn from(e: serde_json::Error) -> Self {
        Self::Decode(e.to_string())
    }
}

impl From<tokio_tungstenite::tungstenite::Error> for VenueError {
    fn from(e: tokio_tungstenite::tungstenite::Error) -> Self {
        Self::WebSocket(e.to_string())
    }
}

pub type VenueResult<T> = Result<T, VenueError>;
