//! Feed error types.

use thiserror::Error;

#[derive(Debug, Error)]
pub enum FeedError {
    #[error("Venue error: {0}")]
    Venue(#[from] sigbot_venue::VenueError),

    #[error("Invalid data: {0}")]
    InvalidData(String),

    #[error("No candles for {0}")]
    NoCandles(String),
}

pub type FeedResult<T> = Result<T, FeedError>;
