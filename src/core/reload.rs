//! # ReloadController: the hot-reload state machine.
//!
//! ```text
//!            start()                confirm()               finish_swap()
//! Stopped ───────────► Preparing ─────────────► WorkersDone ──────────────► Stopped
//!    ▲                     │                         │
//!    └──── abort() ────────┴─────────────────────────┘   (stop while in flight)
//! ```
//!
//! ## Rules
//! - Exactly one reload may be in flight; `start` outside `Stopped` is rejected.
//! - `confirm` is only meaningful while `Preparing`.
//! - Only the monitor tick calls `finish_swap`, so the pool swap is serialized with
//!   liveness checks.
//!
//! The controller holds no process records; the master's table owns the ready set.

use std::fmt;

/// Phase of the hot reload.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum ReloadState {
    /// No reload in flight; worker liveness is monitored.
    #[default]
    Stopped,
    /// Replacement workers are starting; waiting for the proxy to confirm.
    Preparing,
    /// The proxy stopped routing to the old workers; the next tick swaps.
    WorkersDone,
}

impl fmt::Display for ReloadState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            ReloadState::Stopped => "stopped",
            ReloadState::Preparing => "preparing",
            ReloadState::WorkersDone => "workers_done",
        })
    }
}

/// Guards the reload transitions.
#[derive(Debug, Default)]
pub struct ReloadController {
    state: ReloadState,
    completed: u64,
}

impl ReloadController {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn state(&self) -> ReloadState {
        self.state
    }

    /// True while worker liveness checks must be suppressed.
    pub fn in_flight(&self) -> bool {
        self.state != ReloadState::Stopped
    }

    /// Number of reloads that reached the swap.
    pub fn completed(&self) -> u64 {
        self.completed
    }

    /// `Stopped → Preparing`. Returns `false` (and changes nothing) otherwise.
    pub fn start(&mut self) -> bool {
        if self.state != ReloadState::Stopped {
            return false;
        }
        self.state = ReloadState::Preparing;
        true
    }

    /// `Preparing → WorkersDone`. Returns `false` (and changes nothing) otherwise.
    pub fn confirm(&mut self) -> bool {
        if self.state != ReloadState::Preparing {
            return false;
        }
        self.state = ReloadState::WorkersDone;
        true
    }

    /// `WorkersDone → Stopped`. Returns `true` when the caller must perform the swap now.
    pub fn finish_swap(&mut self) -> bool {
        if self.state != ReloadState::WorkersDone {
            return false;
        }
        self.state = ReloadState::Stopped;
        self.completed += 1;
        true
    }

    /// Abandons an in-flight reload. Returns `true` if one was in flight.
    pub fn abort(&mut self) -> bool {
        std::mem::take(&mut self.state) != ReloadState::Stopped
    }
}
