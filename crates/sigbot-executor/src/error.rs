//! Executor error types.

use sigbot_core::TriggerKind;
use sigbot_venue::VenueError;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum ExecutorError {
    #[error("Venue error: {0}")]
    Venue(#[from] VenueError),

    #[error("Feed error: {0}")]
    Feed(#[from] sigbot_feed::FeedError),

    #[error("Computed quantity {qty} is below the minimum for {symbol}")]
    ZeroQuantity { symbol: String, qty: String },

    #[error("Entry order failed: {0}")]
    EntryFailed(#[source] VenueError),

    /// A protective leg failed and the entry was unwound.
    #[error("{leg} leg failed, entry unwound: {source}")]
    LegFailed {
        leg: TriggerKind,
        #[source]
        source: VenueError,
    },

    /// A protective leg failed and unwinding failed too.
    #[error("CRITICAL: {leg} leg failed and compensation failed ({detail}): {source}")]
    CriticalInconsistency {
        leg: TriggerKind,
        #[source]
        source: VenueError,
        detail: String,
    },

    #[error("Close order failed: {0}")]
    CloseFailed(#[source] VenueError),
}

impl ExecutorError {
    /// Whether the venue may be left holding an unprotected position.
    #[must_use]
    pub fn is_critical(&self) -> bool {
        matches!(self, Self::CriticalInconsistency { .. })
    }
}

pub type ExecutorResult<T> = Result<T, ExecutorError>;
