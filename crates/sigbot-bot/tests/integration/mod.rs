//! Integration tests for sigbot-bot.
//!
//! These tests drive the orchestrator end to end against the paper venue:
//! - Admission held for the lifetime of a trade
//! - Exit detection by polling and by the order stream
//! - Cancel, reverse and compensation paths

pub mod common;
