use std::fmt;
use std::sync::Arc;

use crossbeam::queue::ArrayQueue;

/// Where the decision loop currently is.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LoopState {
    Idle,
    Starting,
    Scanning,
    Granted,
    Denied,
    Error,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Severity {
    Info,
    Granted,
    Denied,
    Error,
}

/// The single status line shown to the operator.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Status {
    pub state: LoopState,
    pub severity: Severity,
    pub text: String,
}

impl Status {
    pub fn new(state: LoopState, severity: Severity, text: impl Into<String>) -> Self {
        Self {
            state,
            severity,
            text: text.into(),
        }
    }

    pub fn waiting() -> Self {
        Self::new(LoopState::Idle, Severity::Info, "waiting...")
    }
}

impl fmt::Display for Status {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Status: {}", self.text)
    }
}

/// Single-slot, latest-value-wins status channel.
pub fn status_channel() -> (StatusPublisher, StatusReader) {
    let slot = Arc::new(ArrayQueue::new(1));
    (
        StatusPublisher { slot: slot.clone() },
        StatusReader {
            slot,
            current: Status::waiting(),
        },
    )
}

#[derive(Clone)]
pub struct StatusPublisher {
    slot: Arc<ArrayQueue<Status>>,
}

impl StatusPublisher {
    /// Replaces any status the reader has not picked up yet.
    pub fn publish(&self, status: Status) {
        let _stale = self.slot.force_push(status);
    }
}

pub struct StatusReader {
    slot: Arc<ArrayQueue<Status>>,
    current: Status,
}

impl StatusReader {
    /// Returns the new status if one arrived since the last poll.
    pub fn poll(&mut self) -> Option<&Status> {
        let fresh = self.slot.pop()?;
        self.current = fresh;
        Some(&self.current)
    }

    pub fn latest(&mut self) -> &Status {
        self.poll();
        &self.current
    }
}
