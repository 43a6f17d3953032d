//! Signal admission queue.
//!
//! Grants the right to execute to one command at a time. `submit` while
//! idle dispatches immediately; while busy it appends to a FIFO. `release`
//! hands admission to the head of the FIFO, or marks the queue idle.
//! Dispatch goes through an unbounded channel read by the orchestrator.

use std::collections::VecDeque;

use parking_lot::Mutex;
use sigbot_core::StrategyCommand;
use sigbot_telemetry::Metrics;
use tokio::sync::mpsc;
use tracing::{debug, warn};

/// What `submit` did with a command.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Admission {
    Dispatched,
    /// Queued behind `ahead` other commands.
    Queued { ahead: usize },
}

#[derive(Debug, Default)]
struct AdmissionState {
    busy: bool,
    pending: VecDeque<StrategyCommand>,
}

pub struct AdmissionQueue {
    state: Mutex<AdmissionState>,
    dispatch_tx: mpsc::UnboundedSender<StrategyCommand>,
}

impl AdmissionQueue {
    /// Create a queue and the receiver its dispatches go to.
    pub fn new() -> (Self, mpsc::UnboundedReceiver<StrategyCommand>) {
        let (dispatch_tx, dispatch_rx) = mpsc::unbounded_channel();
        (
            Self {
                state: Mutex::new(AdmissionState::default()),
                dispatch_tx,
            },
            dispatch_rx,
        )
    }

    pub fn submit(&self, command: StrategyCommand) -> Admission {
        let mut state = self.state.lock();
        if state.busy {
            let ahead = state.pending.len();
            debug!(action = %command.action, symbol = %command.symbol, ahead, "Command queued");
            state.pending.push_back(command);
            Metrics::admission_queue_depth(state.pending.len());
            return Admission::Queued { ahead };
        }
        state.busy = true;
        self.dispatch(command);
        Admission::Dispatched
    }

    /// Finish the current command and admit the next one, if any.
    pub fn release(&self) {
        let mut state = self.state.lock();
        match state.pending.pop_front() {
            Some(next) => {
                Metrics::admission_queue_depth(state.pending.len());
                self.dispatch(next);
            }
            None => {
                state.busy = false;
                debug!("Admission released, queue idle");
            }
        }
    }

    #[must_use]
    pub fn is_busy(&self) -> bool {
        self.state.lock().busy
    }

    #[must_use]
    pub fn depth(&self) -> usize {
        self.state.lock().pending.len()
    }

    // Called with the state lock held so dispatch order matches admission order.
    fn dispatch(&self, command: StrategyCommand) {
        debug!(action = %command.action, symbol = %command.symbol, "Command dispatched");
        if self.dispatch_tx.send(command).is_err() {
            warn!("Dispatch receiver dropped, command lost");
        }
    }
}
