//! # Master inbox and the public handle onto it.
//!
//! The master loop owns every process record. Everything else (signal forwarder,
//! startup gate, admin link, kill deadlines, embedders) talks to it by sending an
//! [`Inbox`] message; nothing outside the loop touches its tables.
//!
//! ```text
//! SignalHandler ──┐
//! Startup gate  ──┤
//! Admin link    ──┼──► mpsc<Inbox> ──► Master::run() loop
//! Kill deadline ──┤
//! MasterHandle  ──┘
//! ```

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use tokio::sync::{mpsc, oneshot};

use super::command::AdminCommand;
use super::launcher::RecordId;
use super::reload::ReloadState;
use super::role::Role;
use super::signals::MasterSignal;
use crate::error::{GroupChangeError, HandleError};

/// Reply to an admin command: `Ok(true)` applied, `Ok(false)` rejected as a no-op.
pub(crate) type CommandReply = oneshot::Sender<Result<bool, GroupChangeError>>;

/// Messages consumed by the master loop.
pub(crate) enum Inbox {
    /// An OS signal, already mapped to an action.
    Signal(MasterSignal),
    /// A decoded admin command, optionally with a reply channel.
    Admin(AdminCommand, Option<CommandReply>),
    /// The startup gate reached the proxy's admin endpoint.
    ProxyReady,
    /// A kill deadline expired for these records.
    Deadline(Vec<RecordId>),
    /// State inspection.
    Snapshot(oneshot::Sender<Snapshot>),
}

/// One supervised child as seen in a [`Snapshot`].
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct ChildInfo {
    pub id: RecordId,
    pub role: Role,
    pub pid: Option<u32>,
}

/// Point-in-time view of the master's tables.
#[derive(Clone, Debug)]
pub struct Snapshot {
    /// `false` once a stop began.
    pub enabled: bool,
    pub reload: ReloadState,
    /// True once the startup gate opened and worker slots exist.
    pub workers_started: bool,
    pub proxy: Option<ChildInfo>,
    /// Active worker slots in order; `None` is an empty slot awaiting respawn.
    pub workers: Vec<(u32, Option<ChildInfo>)>,
    /// Replacement workers of an in-flight reload.
    pub ready: Vec<(u32, Option<ChildInfo>)>,
    /// Workers displaced by a reload that have not been reaped yet.
    pub old: Vec<ChildInfo>,
    /// Worker count the configuration asks for; the next reload spawns this many.
    pub desired_workers: usize,
    /// Reloads that reached the swap since start.
    pub reloads: u64,
}

impl Snapshot {
    /// Pids of active workers, in slot order, skipping empty slots.
    pub fn worker_pids(&self) -> Vec<u32> {
        self.workers
            .iter()
            .filter_map(|(_, c)| c.and_then(|c| c.pid))
            .collect()
    }

    pub fn ready_pids(&self) -> Vec<u32> {
        self.ready
            .iter()
            .filter_map(|(_, c)| c.and_then(|c| c.pid))
            .collect()
    }

    pub fn old_pids(&self) -> Vec<u32> {
        self.old.iter().filter_map(|c| c.pid).collect()
    }

    /// Number of live processes the master currently tracks.
    pub fn process_count(&self) -> usize {
        usize::from(self.proxy.is_some())
            + self.workers.iter().filter(|(_, c)| c.is_some()).count()
            + self.ready.iter().filter(|(_, c)| c.is_some()).count()
            + self.old.len()
    }
}

/// Cloneable handle for driving a running [`Master`](crate::Master).
///
/// Every call goes through the master inbox, exactly like a signal or an admin frame.
#[derive(Clone)]
pub struct MasterHandle {
    tx: mpsc::Sender<Inbox>,
    enabled: Arc<AtomicBool>,
}

impl MasterHandle {
    pub(crate) fn new(tx: mpsc::Sender<Inbox>, enabled: Arc<AtomicBool>) -> Self {
        Self { tx, enabled }
    }

    /// Reads the enabled flag directly; `false` as soon as a stop has been applied.
    pub fn is_enabled(&self) -> bool {
        self.enabled.load(Ordering::SeqCst)
    }

    /// Requests a hot reload. Returns `false` if one is already in flight.
    pub async fn reload(&self) -> Result<bool, HandleError> {
        self.command(AdminCommand::Reload).await
    }

    /// Resizes a group and starts a reload.
    ///
    /// Returns whether the reload started; a refused change is an error and never reloads.
    pub async fn change_group(&self, group_id: u32, count: usize) -> Result<bool, HandleError> {
        self.command(AdminCommand::ChangeGroupConfig { group_id, count })
            .await
    }

    /// Confirms the proxy stopped routing to the old workers.
    pub async fn confirm_workers_swapped(&self) -> Result<bool, HandleError> {
        self.command(AdminCommand::ConfirmWorkersSwapped).await
    }

    /// Graceful stop. Returns `false` if a stop was already under way.
    pub async fn stop(&self) -> Result<bool, HandleError> {
        self.command(AdminCommand::Stop).await
    }

    /// Kills every child immediately.
    pub async fn force_stop(&self) -> Result<(), HandleError> {
        self.send(Inbox::Signal(MasterSignal::ForceStop)).await
    }

    /// Returns a view of the master's tables.
    pub async fn snapshot(&self) -> Result<Snapshot, HandleError> {
        let (tx, rx) = oneshot::channel();
        self.send(Inbox::Snapshot(tx)).await?;
        rx.await.map_err(|_| HandleError::Closed)
    }

    async fn command(&self, cmd: AdminCommand) -> Result<bool, HandleError> {
        let (tx, rx) = oneshot::channel();
        self.send(Inbox::Admin(cmd, Some(tx))).await?;
        let applied = rx.await.map_err(|_| HandleError::Closed)??;
        Ok(applied)
    }

    async fn send(&self, msg: Inbox) -> Result<(), HandleError> {
        self.tx.send(msg).await.map_err(|_| HandleError::Closed)
    }
}
