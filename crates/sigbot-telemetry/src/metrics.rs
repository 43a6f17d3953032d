//! Prometheus metrics for the sigbot orchestrator.
//!
//! Covers signal intake, command execution, order legs, compensation and
//! exits. Rendered in text exposition format by [`Metrics::render`].
//!
//! # Panics
//!
//! Metric registration uses `unwrap()`. A failed registration means a
//! duplicate metric name, which is a programming error surfaced on first use.

use once_cell::sync::Lazy;
use prometheus::{
    register_counter_vec, register_int_counter, register_int_gauge, CounterVec, Encoder,
    IntCounter, IntGauge, TextEncoder,
};

use crate::error::TelemetryResult;

/// Signals received by action.
pub static SIGNALS_RECEIVED_TOTAL: Lazy<CounterVec> = Lazy::new(|| {
    register_counter_vec!(
        "sigbot_signals_received_total",
        "Webhook signals received",
        &["action"]
    )
    .unwrap()
});

/// Signals rejected before admission.
/// Labels: reason (auth/malformed/unknown_symbol/pip_table)
pub static SIGNALS_REJECTED_TOTAL: Lazy<CounterVec> = Lazy::new(|| {
    register_counter_vec!(
        "sigbot_signals_rejected_total",
        "Webhook signals rejected before admission",
        &["reason"]
    )
    .unwrap()
});

/// Commands executed by the orchestrator.
pub static COMMANDS_TOTAL: Lazy<CounterVec> = Lazy::new(|| {
    register_counter_vec!(
        "sigbot_commands_total",
        "Strategy commands executed",
        &["action", "outcome"]
    )
    .unwrap()
});

/// Orders placed per leg (entry/stop_loss/take_profit/close).
pub static ORDERS_PLACED_TOTAL: Lazy<CounterVec> = Lazy::new(|| {
    register_counter_vec!(
        "sigbot_orders_placed_total",
        "Orders accepted by the venue",
        &["leg"]
    )
    .unwrap()
});

/// Compensation runs by outcome (compensated/critical).
pub static COMPENSATIONS_TOTAL: Lazy<CounterVec> = Lazy::new(|| {
    register_counter_vec!(
        "sigbot_compensations_total",
        "Compensations after a failed protective leg",
        &["outcome"]
    )
    .unwrap()
});

pub static CRITICAL_INCONSISTENCY_TOTAL: Lazy<IntCounter> = Lazy::new(|| {
    register_int_counter!(
        "sigbot_critical_inconsistency_total",
        "Failed compensations that may leave an unprotected position"
    )
    .unwrap()
});

/// Exits by kind (TP/SL/Closed/Cancel).
pub static EXITS_TOTAL: Lazy<CounterVec> = Lazy::new(|| {
    register_counter_vec!(
        "sigbot_exits_total",
        "Closed positions by exit kind",
        &["kind"]
    )
    .unwrap()
});

pub static ADMISSION_QUEUE_DEPTH: Lazy<IntGauge> = Lazy::new(|| {
    register_int_gauge!(
        "sigbot_admission_queue_depth",
        "Commands waiting for admission"
    )
    .unwrap()
});

/// 1 while a position is open.
pub static POSITION_OPEN: Lazy<IntGauge> = Lazy::new(|| {
    register_int_gauge!("sigbot_position_open", "Open position flag (1=open)").unwrap()
});

/// Metrics facade for easy access.
pub struct Metrics;

impl Metrics {
    pub fn signal_received(action: &str) {
        SIGNALS_RECEIVED_TOTAL.with_label_values(&[action]).inc();
    }

    pub fn signal_rejected(reason: &str) {
        SIGNALS_REJECTED_TOTAL.with_label_values(&[reason]).inc();
    }

    pub fn command_executed(action: &str, outcome: &str) {
        COMMANDS_TOTAL.with_label_values(&[action, outcome]).inc();
    }

    pub fn order_placed(leg: &str) {
        ORDERS_PLACED_TOTAL.with_label_values(&[leg]).inc();
    }

    /// Record a compensation. A failed one also bumps the critical counter.
    pub fn compensation(succeeded: bool) {
        if succeeded {
            COMPENSATIONS_TOTAL.with_label_values(&["compensated"]).inc();
        } else {
            COMPENSATIONS_TOTAL.with_label_values(&["critical"]).inc();
            CRITICAL_INCONSISTENCY_TOTAL.inc();
        }
    }

    pub fn exit(kind: &str) {
        EXITS_TOTAL.with_label_values(&[kind]).inc();
    }

    pub fn admission_queue_depth(depth: usize) {
        ADMISSION_QUEUE_DEPTH.set(i64::try_from(depth).unwrap_or(i64::MAX));
    }

    pub fn position_open(open: bool) {
        POSITION_OPEN.set(i64::from(open));
    }

    /// Encode every registered metric in Prometheus text format.
    pub fn render() -> TelemetryResult<String> {
        let mut buffer = Vec::new();
        TextEncoder::new().encode(&prometheus::gather(), &mut buffer)?;
        Ok(String::from_utf8(buffer)?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_render_includes_recorded_metrics() {
        Metrics::signal_received("BUY");
        Metrics::compensation(false);
        Metrics::admission_queue_depth(3);

        let text = Metrics::render().unwrap();
        assert!(text.contains("sigbot_signals_received_total"));
        assert!(text.contains("sigbot_critical_inconsistency_total"));
        assert!(text.contains("sigbot_admission_queue_depth"));
    }
}
