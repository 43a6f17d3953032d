//! Trade history for sigbot.
//!
//! Completed trades are appended to a JSON Lines file and can be read back
//! for the `history` CLI and periodic summaries.

pub mod error;
pub mod history;

pub use error::{PersistenceError, PersistenceResult};
pub use history::{TradeLog, TradeReason, TradeRecord, TradeSink};
