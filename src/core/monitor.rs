//! # ChildMonitor: the fixed-tick liveness pass.
//!
//! ```text
//! tick()
//!   ├─► WorkersDone?  swap: active → old (SIGTERM + deadline), ready → active
//!   ├─► proxy exited? clear; respawn while enabled
//!   ├─► reload idle?  each worker slot: exited → clear; empty → respawn while enabled
//!   ├─► old set:      forget every record that has exited
//!   └─► disabled and nothing left → exit
//! ```
//!
//! Worker liveness is skipped while a reload is in flight so a slot can never be
//! refilled underneath the swap. The swap itself happens only here.

use super::control::{Control, Slot, terminate};
use super::role::Role;
use crate::events::{Event, EventKind};

impl Control {
    /// Runs one monitor iteration. Returns `true` once the master has nothing left to manage.
    pub(crate) fn tick(&mut self) -> bool {
        if self.reload.finish_swap() {
            self.swap_workers();
        }
        self.check_proxy();
        if !self.reload.in_flight() {
            self.check_workers();
        }
        self.drain_old();
        self.finished()
    }

    fn swap_workers(&mut self) {
        let ready = std::mem::take(&mut self.ready);
        let displaced = std::mem::replace(&mut self.workers, ready);

        let mut ids = Vec::with_capacity(displaced.len());
        for mut record in displaced.into_iter().filter_map(|s| s.record) {
            terminate(&self.bus, &mut record);
            ids.push(record.id());
            self.old.push(record);
        }

        self.bus
            .publish(Event::new(EventKind::WorkersSwapped).with_count(ids.len()));
        self.schedule_kill(ids);
    }

    fn check_proxy(&mut self) {
        if let Some(record) = self.proxy.as_mut() {
            if let Some(status) = record.poll_exit() {
                self.bus.publish(
                    Event::new(EventKind::ChildExited)
                        .with_role(Role::Proxy)
                        .with_pid(record.pid())
                        .with_reason(status),
                );
                self.proxy = None;
            }
        }
        if self.proxy.is_none() && self.is_enabled() {
            self.proxy = self.spawner.spawn(Role::Proxy);
        }
    }

    fn check_workers(&mut self) {
        let enabled = self.is_enabled();
        for slot in &mut self.workers {
            if let Some(record) = slot.record.as_mut() {
                let Some(status) = record.poll_exit() else {
                    continue;
                };
                self.bus.publish(
                    Event::new(EventKind::ChildExited)
                        .with_role(record.role())
                        .with_pid(record.pid())
                        .with_reason(status),
                );
                slot.record = None;
            }
            if enabled {
                slot.record = self.spawner.spawn(Role::Worker {
                    group_id: slot.group_id,
                });
            }
        }
    }

    fn drain_old(&mut self) {
        let bus = &self.bus;
        self.old.retain_mut(|record| {
            if record.poll_exit().is_none() {
                return true;
            }
            bus.publish(
                Event::new(EventKind::OldWorkerReaped)
                    .with_role(record.role())
                    .with_pid(record.pid()),
            );
            false
        });
    }

    fn finished(&self) -> bool {
        !self.is_enabled()
            && self.proxy.is_none()
            && self.workers.iter().all(Slot::is_empty)
            && self.ready.iter().all(Slot::is_empty)
            && self.old.is_empty()
    }
}
