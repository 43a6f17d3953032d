//! Risk error types.

use thiserror::Error;

#[derive(Debug, Error)]
pub enum RiskError {
    #[error("Feed error: {0}")]
    Feed(#[from] sigbot_feed::FeedError),

    #[error("Invariant violated: {0}")]
    InvariantViolation(String),

    #[error("Invalid parameters: {0}")]
    InvalidParams(String),
}

pub type RiskResult<T> = Result<T, RiskError>;
