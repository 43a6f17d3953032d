//! Webhook-driven single-position signal orchestrator.
//!
//! Authenticated signals arrive over HTTP, pass through a FIFO admission
//! queue and are executed one at a time by the orchestrator, which sizes
//! the trade, places the protected entry and watches for the exit.
//!
//! # Key Components
//!
//! - [`SignalParser`]: Payload authentication and risk-parameter resolution
//! - [`AdmissionQueue`]: One command in flight, FIFO for the rest
//! - [`Orchestrator`]: Open/close/exit handling over ledger, gateway and monitor
//! - [`Notifier`]: Trade open/close notifications (log or Telegram)
//! - [`Application`]: Wiring, HTTP server and shutdown

pub mod admission;
pub mod app;
pub mod config;
pub mod error;
pub mod notify;
pub mod orchestrator;
pub mod signal;
pub mod webhook;

pub use admission::{Admission, AdmissionQueue};
pub use app::Application;
pub use config::AppConfig;
pub use error::{AppError, AppResult, SignalError};
pub use notify::{ClosedTrade, DynNotifier, LogNotifier, Notifier, OpenedTrade, TelegramNotifier};
pub use orchestrator::Orchestrator;
pub use signal::{SignalParser, SignalPayload};
pub use webhook::{create_router, WebhookState};
