//! Position error types.

use thiserror::Error;

#[derive(Debug, Error)]
pub enum PositionError {
    #[error("Position already open: {0}")]
    AlreadyOpen(String),
}

pub type PositionResult<T> = Result<T, PositionError>;
