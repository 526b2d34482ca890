//! # LogWriter: renders runtime events through `tracing`.
//!
//! Installed by default by [`MasterBuilder`](crate::MasterBuilder). Output goes to whatever
//! `tracing` subscriber the binary installs.
//!
//! ## Example output (fmt layer)
//! ```text
//! INFO procvisor: child spawned role=worker(1) pid=4242
//! WARN procvisor: child exited role=worker(1) pid=4242 reason="signal: 9 (SIGKILL)"
//! INFO procvisor: reload started ready=2
//! INFO procvisor: workers swapped draining=2
//! ```

use async_trait::async_trait;
use tracing::{debug, error, info, warn};

use crate::events::{Event, EventKind};
use crate::subscribers::Subscribe;

/// Event writer subscriber.
#[derive(Default)]
pub struct LogWriter;

impl LogWriter {
    /// Construct a new [`LogWriter`].
    #[must_use]
    pub fn new() -> Self {
        Self
    }
}

#[async_trait]
impl Subscribe for LogWriter {
    async fn on_event(&self, e: &Event) {
        let role = e.role.map(|r| r.to_string());
        let role = role.as_deref().unwrap_or("-");
        let reason = e.reason.as_deref().unwrap_or("");

        match e.kind {
            EventKind::ChildSpawned => info!(target: "procvisor", role, pid = e.pid, "child spawned"),
            EventKind::SpawnFailed => error!(target: "procvisor", role, reason, "spawn failed"),
            EventKind::ChildExited => warn!(target: "procvisor", role, pid = e.pid, reason, "child exited"),
            EventKind::OldWorkerReaped => {
                debug!(target: "procvisor", role, pid = e.pid, "old worker reaped")
            }
            EventKind::TerminateSent => debug!(target: "procvisor", role, pid = e.pid, "sent SIGTERM"),
            EventKind::ForceKilled => warn!(target: "procvisor", role, pid = e.pid, reason, "sent SIGKILL"),
            EventKind::ReloadStarted => info!(target: "procvisor", ready = e.count, "reload started"),
            EventKind::ReloadRejected => debug!(target: "procvisor", state = reason, "reload rejected"),
            EventKind::ReloadConfirmed => info!(target: "procvisor", "proxy confirmed worker swap"),
            EventKind::ConfirmRejected => debug!(target: "procvisor", state = reason, "swap confirmation ignored"),
            EventKind::WorkersSwapped => info!(target: "procvisor", draining = e.count, "workers swapped"),
            EventKind::GroupChanged => {
                info!(target: "procvisor", group = e.group_id, count = e.count, "group resized")
            }
            EventKind::GroupChangeRejected => {
                warn!(target: "procvisor", group = e.group_id, count = e.count, reason, "group change rejected")
            }
            EventKind::ProxyReady => info!(target: "procvisor", "proxy is accepting admin connections"),
            EventKind::AdminConnected => debug!(target: "procvisor", "admin link connected"),
            EventKind::AdminConnectFailed => {
                debug!(target: "procvisor", reason, retry_ms = e.delay_ms, "admin connect failed")
            }
            EventKind::AdminDisconnected => warn!(target: "procvisor", reason, "admin link lost"),
            EventKind::AdminFrameRejected => warn!(target: "procvisor", reason, "bad admin frame"),
            EventKind::StopRequested => {
                info!(target: "procvisor", origin = reason, kill_after_ms = e.timeout_ms, "stop requested")
            }
            EventKind::ForceStopRequested => warn!(target: "procvisor", origin = reason, "forced stop"),
            EventKind::MasterExited => info!(target: "procvisor", "all children gone, master exiting"),
            EventKind::SubscriberOverflow => {
                warn!(target: "procvisor", subscriber = e.subscriber, reason, "subscriber dropped event")
            }
            EventKind::SubscriberPanicked => {
                error!(target: "procvisor", subscriber = e.subscriber, reason, "subscriber panicked")
            }
        }
    }

    fn name(&self) -> &'static str {
        "LogWriter"
    }
}
