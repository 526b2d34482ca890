//! # Control: the process tables and every transition applied to them.
//!
//! [`Control`] is owned by the master loop task and is never shared. Inputs arrive as
//! [`Inbox`] messages or as monitor ticks (see `monitor.rs`); both are applied here, one
//! at a time, so signal delivery can never race the reload swap.
//!
//! ```text
//! Control
//! ├── proxy:   Option<ProcessRecord>
//! ├── workers: [Slot; N]  active pool, in group order
//! ├── ready:   [Slot; M]  next generation while a reload is in flight
//! ├── old:     [ProcessRecord]  displaced workers until reaped
//! ├── reload:  ReloadController
//! └── enabled: Arc<AtomicBool>  cleared once on stop, never set again
//! ```
//!
//! ## Rules
//! - No record is created once `enabled` is cleared ([`Spawner`] checks it on every launch).
//! - Stop terminates the proxy and the active pool; an in-flight ready set is abandoned
//!   (killed outright, it never served traffic).
//! - Every record moved to `old` has already been signaled and is reaped by a later tick.

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;

use super::admin::AdminLink;
use super::command::AdminCommand;
use super::config::MasterConfig;
use super::handle::{ChildInfo, Inbox, Snapshot};
use super::launcher::{Launch, ProcessRecord, RecordId};
use super::reload::ReloadController;
use super::role::Role;
use super::signals::MasterSignal;
use crate::error::{GroupChangeError, SpawnError};
use crate::events::{Bus, Event, EventKind};

/// One position of a worker pool. `record == None` means the slot awaits a spawn.
#[derive(Debug)]
pub(crate) struct Slot {
    pub(crate) group_id: u32,
    pub(crate) record: Option<ProcessRecord>,
}

impl Slot {
    pub(crate) fn is_empty(&self) -> bool {
        self.record.is_none()
    }

    fn info(&self) -> (u32, Option<ChildInfo>) {
        (self.group_id, self.record.as_ref().map(child_info))
    }
}

/// Launches children on behalf of [`Control`], refusing once the master is disabled.
pub(crate) struct Spawner {
    launcher: Arc<dyn Launch>,
    bus: Bus,
    enabled: Arc<AtomicBool>,
}

impl Spawner {
    /// Starts a child for `role`; failures are published and leave the slot empty.
    pub(crate) fn spawn(&self, role: Role) -> Option<ProcessRecord> {
        let launched = if self.enabled.load(Ordering::SeqCst) {
            self.launcher.launch(role)
        } else {
            Err(SpawnError::Disabled(role))
        };

        match launched {
            Ok(record) => {
                self.bus.publish(
                    Event::new(EventKind::ChildSpawned)
                        .with_role(role)
                        .with_pid(record.pid()),
                );
                Some(record)
            }
            Err(e) => {
                self.bus.publish(
                    Event::new(EventKind::SpawnFailed)
                        .with_role(role)
                        .with_reason(e.to_string()),
                );
                None
            }
        }
    }
}

pub(crate) struct Control {
    pub(crate) cfg: MasterConfig,
    pub(crate) bus: Bus,
    pub(crate) spawner: Spawner,
    pub(crate) enabled: Arc<AtomicBool>,
    /// Sender side of the master's own inbox, used by kill deadlines and the admin link.
    pub(crate) inbox: mpsc::Sender<Inbox>,
    /// Cancelled when the master is disabled (stops the admin link).
    pub(crate) link_token: CancellationToken,
    /// Cancelled when the master loop exits (stops every helper task).
    pub(crate) exit_token: CancellationToken,

    pub(crate) reload: ReloadController,
    pub(crate) proxy: Option<ProcessRecord>,
    pub(crate) workers: Vec<Slot>,
    pub(crate) ready: Vec<Slot>,
    pub(crate) old: Vec<ProcessRecord>,
    pub(crate) workers_started: bool,
}

impl Control {
    pub(crate) fn new(
        cfg: MasterConfig,
        launcher: Arc<dyn Launch>,
        bus: Bus,
        enabled: Arc<AtomicBool>,
        inbox: mpsc::Sender<Inbox>,
    ) -> Self {
        let exit_token = CancellationToken::new();
        Self {
            spawner: Spawner {
                launcher,
                bus: bus.clone(),
                enabled: Arc::clone(&enabled),
            },
            cfg,
            bus,
            enabled,
            inbox,
            link_token: exit_token.child_token(),
            exit_token,
            reload: ReloadController::new(),
            proxy: None,
            workers: Vec::new(),
            ready: Vec::new(),
            old: Vec::new(),
            workers_started: false,
        }
    }

    #[inline]
    pub(crate) fn is_enabled(&self) -> bool {
        self.enabled.load(Ordering::SeqCst)
    }

    /// Launches the proxy, then either opens the startup gate or starts the pool directly.
    pub(crate) fn start(&mut self) {
        self.proxy = self.spawner.spawn(Role::Proxy);

        match self.cfg.admin_addr {
            Some(addr) => {
                let link = AdminLink {
                    addr,
                    connect_retry: self.cfg.connect_retry,
                    reconnect: self.cfg.reconnect,
                };
                link.spawn(self.inbox.clone(), self.bus.clone(), self.link_token.clone());
            }
            None => self.start_workers(),
        }
    }

    /// Creates the worker slots. Runs once, when the proxy is known to accept connections.
    pub(crate) fn start_workers(&mut self) {
        if self.workers_started || !self.is_enabled() {
            return;
        }
        self.workers_started = true;
        self.workers = self.spawn_pool();
    }

    fn spawn_pool(&self) -> Vec<Slot> {
        self.cfg
            .slot_groups()
            .into_iter()
            .map(|group_id| Slot {
                group_id,
                record: self.spawner.spawn(Role::Worker { group_id }),
            })
            .collect()
    }

    pub(crate) fn handle(&mut self, msg: Inbox) {
        match msg {
            Inbox::Signal(sig) => self.on_signal(sig),
            Inbox::Admin(cmd, reply) => {
                let result = self.on_command(cmd);
                if let Some(reply) = reply {
                    let _ = reply.send(result);
                }
            }
            Inbox::ProxyReady => self.start_workers(),
            Inbox::Deadline(ids) => self.on_deadline(&ids),
            Inbox::Snapshot(reply) => {
                let _ = reply.send(self.snapshot());
            }
        }
    }

    fn on_signal(&mut self, sig: MasterSignal) {
        match sig {
            MasterSignal::Stop => {
                if !self.stop("signal") {
                    self.force_stop("repeated stop signal");
                }
            }
            MasterSignal::ForceStop => self.force_stop("signal"),
            MasterSignal::Reload => {
                self.start_reload("signal");
            }
        }
    }

    fn on_command(&mut self, cmd: AdminCommand) -> Result<bool, GroupChangeError> {
        match cmd {
            AdminCommand::ChangeGroupConfig { group_id, count } => {
                self.change_group(group_id, count)
            }
            AdminCommand::Reload => Ok(self.start_reload("admin")),
            AdminCommand::Stop => Ok(self.stop("admin")),
            AdminCommand::ConfirmWorkersSwapped => Ok(self.confirm_swap()),
        }
    }

    /// `Stopped → Preparing`: notifies the proxy and spawns the ready set.
    pub(crate) fn start_reload(&mut self, origin: &str) -> bool {
        let refusal = if !self.is_enabled() {
            Some("master is disabled".to_string())
        } else if !self.workers_started {
            Some("workers not started".to_string())
        } else if !self.reload.start() {
            Some(format!("reload already {}", self.reload.state()))
        } else {
            None
        };
        if let Some(reason) = refusal {
            self.bus
                .publish(Event::new(EventKind::ReloadRejected).with_reason(reason));
            return false;
        }

        #[cfg(unix)]
        if self.cfg.notify_proxy_on_reload {
            if let Some(proxy) = self.proxy.as_mut() {
                proxy.signal(nix::sys::signal::Signal::SIGUSR1);
            }
        }

        self.ready = self.spawn_pool();
        self.bus.publish(
            Event::new(EventKind::ReloadStarted)
                .with_count(self.ready.len())
                .with_reason(origin),
        );
        true
    }

    /// `Preparing → WorkersDone`; the next tick performs the swap.
    pub(crate) fn confirm_swap(&mut self) -> bool {
        if self.reload.confirm() {
            self.bus.publish(Event::new(EventKind::ReloadConfirmed));
            true
        } else {
            self.bus.publish(
                Event::new(EventKind::ConfirmRejected).with_reason(self.reload.state().to_string()),
            );
            false
        }
    }

    /// Resizes a group and starts a reload. A refused change never reloads.
    pub(crate) fn change_group(
        &mut self,
        group_id: u32,
        count: usize,
    ) -> Result<bool, GroupChangeError> {
        let applied = if !self.is_enabled() {
            Err(GroupChangeError::Disabled)
        } else {
            match self.cfg.group_mut(group_id) {
                Some(group) => {
                    group.count = count;
                    Ok(())
                }
                None => Err(GroupChangeError::UnknownGroup(group_id)),
            }
        };

        if let Err(e) = applied {
            self.bus.publish(
                Event::new(EventKind::GroupChangeRejected)
                    .with_group(group_id)
                    .with_count(count)
                    .with_reason(e.to_string()),
            );
            return Err(e);
        }

        self.bus.publish(
            Event::new(EventKind::GroupChanged)
                .with_group(group_id)
                .with_count(count),
        );
        Ok(self.start_reload("group change"))
    }

    /// Clears the enabled flag. Returns `false` if it was already cleared.
    fn disable(&mut self) -> bool {
        if !self.enabled.swap(false, Ordering::SeqCst) {
            return false;
        }
        self.link_token.cancel();
        self.abandon_ready();
        true
    }

    /// Kills the ready set of an in-flight reload and hands it to `old` for reaping.
    fn abandon_ready(&mut self) {
        if !self.reload.abort() {
            return;
        }
        for slot in std::mem::take(&mut self.ready) {
            if let Some(mut record) = slot.record {
                force_kill(&self.bus, &mut record, "reload abandoned");
                self.old.push(record);
            }
        }
    }

    /// Graceful stop. Returns `false` if a stop was already under way.
    pub(crate) fn stop(&mut self, origin: &str) -> bool {
        if !self.disable() {
            return false;
        }

        let mut ids = Vec::new();
        let bus = &self.bus;
        let live = self
            .proxy
            .iter_mut()
            .chain(self.workers.iter_mut().filter_map(|s| s.record.as_mut()));
        for record in live {
            terminate(bus, record);
            ids.push(record.id());
        }

        let mut ev = Event::new(EventKind::StopRequested).with_reason(origin);
        if let Some(timeout) = self.cfg.stop_timeout {
            ev = ev.with_timeout(timeout);
        }
        self.bus.publish(ev);
        self.schedule_kill(ids);
        true
    }

    /// Kills every remaining child right away.
    pub(crate) fn force_stop(&mut self, origin: &str) {
        self.disable();
        self.bus
            .publish(Event::new(EventKind::ForceStopRequested).with_reason(origin));

        let bus = &self.bus;
        let all = self
            .proxy
            .iter_mut()
            .chain(self.workers.iter_mut().filter_map(|s| s.record.as_mut()))
            .chain(self.ready.iter_mut().filter_map(|s| s.record.as_mut()))
            .chain(self.old.iter_mut());
        for record in all {
            force_kill(bus, record, "forced stop");
        }
    }

    /// Kill deadline expired: SIGKILL whichever of `ids` is still tracked.
    pub(crate) fn on_deadline(&mut self, ids: &[RecordId]) {
        let bus = &self.bus;
        let tracked = self
            .proxy
            .iter_mut()
            .chain(self.workers.iter_mut().filter_map(|s| s.record.as_mut()))
            .chain(self.old.iter_mut());
        for record in tracked.filter(|r| ids.contains(&r.id())) {
            force_kill(bus, record, "stop timeout");
        }
    }

    /// Arms a kill deadline for `ids` if a stop timeout is configured.
    pub(crate) fn schedule_kill(&self, ids: Vec<RecordId>) {
        let Some(timeout) = self.cfg.stop_timeout else {
            return;
        };
        if ids.is_empty() {
            return;
        }

        let inbox = self.inbox.clone();
        let token = self.exit_token.clone();
        tokio::spawn(async move {
            tokio::select! {
                _ = token.cancelled() => {}
                _ = tokio::time::sleep(timeout) => {
                    let _ = inbox.send(Inbox::Deadline(ids)).await;
                }
            }
        });
    }

    pub(crate) fn snapshot(&self) -> Snapshot {
        Snapshot {
            enabled: self.is_enabled(),
            reload: self.reload.state(),
            workers_started: self.workers_started,
            proxy: self.proxy.as_ref().map(child_info),
            workers: self.workers.iter().map(Slot::info).collect(),
            ready: self.ready.iter().map(Slot::info).collect(),
            old: self.old.iter().map(child_info).collect(),
            desired_workers: self.cfg.worker_count(),
            reloads: self.reload.completed(),
        }
    }
}

fn child_info(record: &ProcessRecord) -> ChildInfo {
    ChildInfo {
        id: record.id(),
        role: record.role(),
        pid: record.pid(),
    }
}

/// SIGTERM; a child that is already gone is not an error.
pub(crate) fn terminate(bus: &Bus, record: &mut ProcessRecord) {
    if record.terminate() {
        bus.publish(
            Event::new(EventKind::TerminateSent)
                .with_role(record.role())
                .with_pid(record.pid()),
        );
    }
}

fn force_kill(bus: &Bus, record: &mut ProcessRecord, cause: &'static str) {
    if record.kill() {
        bus.publish(
            Event::new(EventKind::ForceKilled)
                .with_role(record.role())
                .with_pid(record.pid())
                .with_reason(cause),
        );
    }
}

#[cfg(all(test, unix))]
mod tests {
    use std::time::Duration;

    use tokio::sync::broadcast;

    use super::*;
    use crate::core::config::WorkerGroup;
    use crate::core::launcher::ExecLauncher;
    use crate::core::reload::ReloadState;

    struct Fixture {
        control: Control,
        events: broadcast::Receiver<Event>,
        _inbox: mpsc::Receiver<Inbox>,
    }

    impl Drop for Fixture {
        fn drop(&mut self) {
            self.control.force_stop("test teardown");
        }
    }

    fn fixture(workers: usize) -> Fixture {
        let cfg = MasterConfig {
            groups: vec![WorkerGroup::new(1, workers)],
            notify_proxy_on_reload: false,
            ..MasterConfig::default()
        };
        let bus = Bus::new(256);
        let events = bus.subscribe();
        let (tx, rx) = mpsc::channel(16);
        let launcher = Arc::new(ExecLauncher::new("sleep").arg("30").quiet());
        let control = Control::new(cfg, launcher, bus, Arc::new(AtomicBool::new(true)), tx);
        Fixture {
            control,
            events,
            _inbox: rx,
        }
    }

    fn kinds(events: &mut broadcast::Receiver<Event>) -> Vec<EventKind> {
        let mut out = Vec::new();
        while let Ok(ev) = events.try_recv() {
            out.push(ev.kind);
        }
        out
    }

    async fn tick_until(control: &mut Control, mut done: impl FnMut(&Control) -> bool) -> bool {
        for _ in 0..100 {
            control.tick();
            if done(control) {
                return true;
            }
            tokio::time::sleep(Duration::from_millis(20)).await;
        }
        false
    }

    #[tokio::test]
    async fn start_without_admin_endpoint_launches_everything() {
        let mut f = fixture(2);
        f.control.start();

        let snap = f.control.snapshot();
        assert!(snap.enabled);
        assert!(snap.workers_started);
        assert!(snap.proxy.is_some());
        assert_eq!(snap.worker_pids().len(), 2);
        assert_eq!(
            kinds(&mut f.events),
            vec![EventKind::ChildSpawned, EventKind::ChildSpawned, EventKind::ChildSpawned]
        );
    }

    #[tokio::test]
    async fn reload_spawns_distinct_ready_set_and_swaps_on_tick() {
        let mut f = fixture(2);
        f.control.start();
        let active = f.control.snapshot().worker_pids();

        assert!(f.control.start_reload("test"));
        assert!(!f.control.start_reload("test"), "second start is a no-op");
        let ready = f.control.snapshot().ready_pids();
        assert_eq!(ready.len(), 2);
        assert!(ready.iter().all(|p| !active.contains(p)));

        assert!(f.control.confirm_swap());
        assert_eq!(f.control.reload.state(), ReloadState::WorkersDone);
        f.control.tick();

        let snap = f.control.snapshot();
        assert_eq!(snap.reload, ReloadState::Stopped);
        assert_eq!(snap.worker_pids(), ready);
        assert!(snap.ready.is_empty());
        assert_eq!(snap.old_pids(), active);
    }

    #[tokio::test]
    async fn confirm_without_reload_is_rejected() {
        let mut f = fixture(1);
        f.control.start();
        assert!(!f.control.confirm_swap());
        assert_eq!(f.control.reload.state(), ReloadState::Stopped);
    }

    #[tokio::test]
    async fn unknown_group_change_does_not_reload() {
        let mut f = fixture(1);
        f.control.start();

        assert_eq!(
            f.control.change_group(9, 4),
            Err(GroupChangeError::UnknownGroup(9))
        );
        let snap = f.control.snapshot();
        assert_eq!(snap.reload, ReloadState::Stopped);
        assert!(snap.ready.is_empty());
    }

    #[tokio::test]
    async fn group_change_sizes_the_next_generation() {
        let mut f = fixture(1);
        f.control.start();

        assert_eq!(f.control.change_group(1, 3), Ok(true));
        assert_eq!(f.control.snapshot().ready_pids().len(), 3);
        assert_eq!(f.control.snapshot().worker_pids().len(), 1);
    }

    #[tokio::test]
    async fn crashed_worker_is_replaced_on_next_tick() {
        let mut f = fixture(2);
        f.control.start();
        let before = f.control.snapshot().worker_pids();

        f.control.workers[0].record.as_mut().unwrap().kill();
        let replaced = tick_until(&mut f.control, |c| {
            let pids = c.snapshot().worker_pids();
            pids.len() == 2 && pids[0] != before[0]
        })
        .await;
        assert!(replaced);
        assert_eq!(f.control.snapshot().worker_pids()[1], before[1]);
    }

    #[tokio::test]
    async fn liveness_checks_pause_during_reload() {
        let mut f = fixture(1);
        f.control.start();
        let id = f.control.workers[0].record.as_ref().unwrap().id();

        assert!(f.control.start_reload("test"));
        f.control.workers[0].record.as_mut().unwrap().kill();
        tokio::time::sleep(Duration::from_millis(100)).await;
        f.control.tick();

        let slot = f.control.snapshot().workers[0];
        assert_eq!(slot.1.map(|c| c.id), Some(id));
    }

    #[tokio::test]
    async fn stop_terminates_and_winds_down_without_respawning() {
        let mut f = fixture(2);
        f.control.start();
        kinds(&mut f.events);

        assert!(f.control.stop("test"));
        assert!(!f.control.is_enabled());
        assert!(!f.control.stop("test"), "stop is idempotent");

        assert!(tick_until(&mut f.control, |c| c.snapshot().process_count() == 0).await);
        assert!(f.control.tick(), "nothing left to manage");

        let seen = kinds(&mut f.events);
        assert_eq!(seen.iter().filter(|k| **k == EventKind::TerminateSent).count(), 3);
        assert!(!seen.contains(&EventKind::ChildSpawned));
        assert!(!f.control.start_reload("test"));
    }

    #[tokio::test]
    async fn stop_abandons_the_ready_set() {
        let mut f = fixture(2);
        f.control.start();
        assert!(f.control.start_reload("test"));
        let ready = f.control.snapshot().ready_pids();

        kinds(&mut f.events);
        f.control.stop("test");
        let killed: Vec<_> = std::iter::from_fn(|| f.events.try_recv().ok())
            .filter(|ev| ev.kind == EventKind::ForceKilled)
            .map(|ev| ev.reason)
            .collect();
        assert_eq!(killed.len(), ready.len());
        assert!(killed.iter().all(|r| r.as_deref() == Some("reload abandoned")));

        let snap = f.control.snapshot();
        assert_eq!(snap.reload, ReloadState::Stopped);
        assert!(snap.ready.is_empty());
        assert_eq!(snap.old_pids(), ready);

        assert!(tick_until(&mut f.control, |c| c.old.is_empty()).await);
    }

    #[tokio::test]
    async fn deadline_kills_only_tracked_records() {
        let mut f = fixture(1);
        f.control.start();
        let proxy = f.control.proxy.as_ref().unwrap().id();
        kinds(&mut f.events);

        f.control.on_deadline(&[proxy]);
        let ev = f.events.try_recv().unwrap();
        assert_eq!(ev.kind, EventKind::ForceKilled);
        assert_eq!(ev.reason.as_deref(), Some("stop timeout"));
        assert!(kinds(&mut f.events).is_empty());
    }

    #[tokio::test]
    async fn disabled_spawner_refuses() {
        let f = fixture(1);
        f.control.enabled.store(false, Ordering::SeqCst);
        assert!(f.control.spawner.spawn(Role::Proxy).is_none());
    }
}
