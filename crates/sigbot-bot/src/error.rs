//! Application error types.

use thiserror::Error;

/// Why an incoming signal was refused before admission.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum SignalError {
    #[error("Signal key mismatch")]
    Unauthorized,

    #[error("Malformed signal: {0}")]
    Malformed(String),

    #[error("Unknown action: {0}")]
    UnknownAction(String),

    #[error("Symbol not tradable: {0}")]
    UnknownSymbol(String),

    #[error("No pip table entry for {0}")]
    MissingPipEntry(String),
}

impl SignalError {
    /// Metric label.
    #[must_use]
    pub fn reason(&self) -> &'static str {
        match self {
            Self::Unauthorized => "auth",
            Self::Malformed(_) => "malformed",
            Self::UnknownAction(_) => "unknown_action",
            Self::UnknownSymbol(_) => "unknown_symbol",
            Self::MissingPipEntry(_) => "pip_table",
        }
    }
}

#[derive(Debug, Error)]
pub enum AppError {
    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Signal error: {0}")]
    Signal(#[from] SignalError),

    #[error("Venue error: {0}")]
    Venue(#[from] sigbot_venue::VenueError),

    #[error("Executor error: {0}")]
    Executor(#[from] sigbot_executor::ExecutorError),

    #[error("Telemetry error: {0}")]
    Telemetry(#[from] sigbot_telemetry::TelemetryError),

    #[error("Persistence error: {0}")]
    Persistence(#[from] sigbot_persistence::PersistenceError),

    #[error("Server error: {0}")]
    Server(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

pub type AppResult<T> = Result<T, AppError>;
