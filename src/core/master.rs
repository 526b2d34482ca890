//! # Master: owns every child process and runs the control loop.
//!
//! The [`Master`] owns the event bus, the subscriber set and the process tables. It
//! installs OS signal handlers, launches the proxy, waits for the proxy to accept admin
//! connections, launches the worker pool, then runs one loop until it is disabled and
//! every child is gone.
//!
//! ## High-level architecture
//! ```text
//! Preparation (run):
//!   - SignalHandler::install()            (fails fast, before any child exists)
//!   - subscriber_listener(): Bus.subscribe() ─► SubscriberSet::emit(Event)
//!   - Control::start(): spawn proxy ─► AdminLink (gate + commands) or workers directly
//!
//! Control loop (single task, owns every ProcessRecord):
//!   loop {
//!     select! {
//!       interval.tick()  ─► Control::tick()   (swap, liveness, reap, exit check)
//!       inbox.recv()     ─► Control::handle() (signals, admin commands, deadlines, ...)
//!     }
//!   }
//!
//! Inbox producers (independent tasks):
//!   signal forwarder ─┐
//!   admin link       ─┼─► mpsc<Inbox>
//!   kill deadlines   ─┤
//!   MasterHandle     ─┘
//!
//! Exit path:
//!   tick() sees: disabled && no proxy && no workers && old set empty
//!     └─► Bus.publish(MasterExited)
//!     └─► exit_token.cancel()  → forwarder, deadlines, listener wind down
//!     └─► listener drains the bus and awaits every subscriber worker
//! ```
//!
//! ## Example
//! ```no_run
//! use procvisor::{Master, MasterConfig, Role, WorkerGroup};
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     match Role::from_env()? {
//!         Some(Role::Proxy) => { /* serve traffic, relay admin commands */ }
//!         Some(Role::Worker { group_id }) => { /* run the workload for group_id */ }
//!         None => {
//!             let cfg = MasterConfig {
//!                 groups: vec![WorkerGroup::new(1, 4)],
//!                 ..MasterConfig::default()
//!             };
//!             Master::builder(cfg).build().run().await?;
//!         }
//!     }
//!     Ok(())
//! }
//! ```

use std::sync::Arc;

use tokio::sync::{broadcast, mpsc};
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;
use tokio_util::sync::CancellationToken;

use super::builder::MasterBuilder;
use super::config::MasterConfig;
use super::control::Control;
use super::handle::{Inbox, MasterHandle};
use super::signals::SignalHandler;
use crate::error::RuntimeError;
use crate::events::{Bus, Event, EventKind};
use crate::subscribers::{Subscribe, SubscriberSet};

/// Single-host process supervisor: one proxy plus a pool of worker groups.
pub struct Master {
    pub(crate) control: Control,
    pub(crate) inbox: mpsc::Receiver<Inbox>,
    pub(crate) subscribers: Vec<Arc<dyn Subscribe>>,
    pub(crate) install_signals: bool,
}

impl Master {
    /// Starts building a master with the given configuration.
    pub fn builder(cfg: MasterConfig) -> MasterBuilder {
        MasterBuilder::new(cfg)
    }

    /// Returns a handle for driving the master once it runs.
    pub fn handle(&self) -> MasterHandle {
        MasterHandle::new(self.control.inbox.clone(), Arc::clone(&self.control.enabled))
    }

    /// Creates a receiver for the runtime events published after this call.
    pub fn subscribe(&self) -> broadcast::Receiver<Event> {
        self.control.bus.subscribe()
    }

    /// Runs the supervisor until it is disabled and every child has exited.
    ///
    /// Only signal handler registration can fail; child failures are always recovered.
    pub async fn run(self) -> Result<(), RuntimeError> {
        let Master {
            mut control,
            mut inbox,
            subscribers,
            install_signals,
        } = self;

        if install_signals {
            let handler = SignalHandler::install().map_err(RuntimeError::Signals)?;
            handler.spawn_forwarder(control.inbox.clone(), control.exit_token.clone());
        }
        let listener = subscriber_listener(
            subscribers,
            control.bus.clone(),
            control.exit_token.clone(),
        );

        control.start();

        let mut ticker = tokio::time::interval(control.cfg.tick_clamped());
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

        loop {
            tokio::select! {
                _ = ticker.tick() => {
                    if control.tick() {
                        break;
                    }
                }
                // `control` holds a sender, so the inbox stays open for the whole loop.
                Some(msg) = inbox.recv() => control.handle(msg),
            }
        }

        control.bus.publish(Event::new(EventKind::MasterExited));
        control.exit_token.cancel();
        let _ = listener.await;
        Ok(())
    }
}

/// Forwards bus events to the subscriber set until `token` is cancelled, then drains.
fn subscriber_listener(
    subscribers: Vec<Arc<dyn Subscribe>>,
    bus: Bus,
    token: CancellationToken,
) -> JoinHandle<()> {
    let mut rx = bus.subscribe();
    let set = SubscriberSet::new(subscribers, bus);

    tokio::spawn(async move {
        loop {
            tokio::select! {
                biased;
                ev = rx.recv() => match ev {
                    Ok(ev) => set.emit(ev),
                    Err(broadcast::error::RecvError::Lagged(_)) => continue,
                    Err(broadcast::error::RecvError::Closed) => break,
                },
                _ = token.cancelled() => break,
            }
        }
        loop {
            match rx.try_recv() {
                Ok(ev) => set.emit(ev),
                Err(broadcast::error::TryRecvError::Lagged(_)) => continue,
                Err(_) => break,
            }
        }
        set.shutdown().await;
    })
}

#[cfg(test)]
mod tests {
    use std::sync::Mutex;
    use std::time::Duration;

    use async_trait::async_trait;

    use super::*;
    use crate::core::config::WorkerGroup;
    use crate::error::SpawnError;
    use crate::{Launch, ProcessRecord, Role};

    #[derive(Default)]
    struct Recorder {
        kinds: Mutex<Vec<EventKind>>,
    }

    #[async_trait]
    impl Subscribe for Recorder {
        async fn on_event(&self, event: &Event) {
            self.kinds.lock().unwrap().push(event.kind);
        }

        fn name(&self) -> &'static str {
            "recorder"
        }
    }

    /// Launcher that always fails, so the master runs without real children.
    struct Refuse;

    impl Launch for Refuse {
        fn launch(&self, role: Role) -> Result<ProcessRecord, SpawnError> {
            Err(SpawnError::Exec {
                role,
                source: std::io::Error::from(std::io::ErrorKind::NotFound),
            })
        }
    }

    fn master(recorder: Arc<Recorder>) -> Master {
        with_tick(recorder, Duration::from_millis(10))
    }

    fn with_tick(recorder: Arc<Recorder>, tick: Duration) -> Master {
        let cfg = MasterConfig {
            groups: vec![WorkerGroup::new(1, 2)],
            tick,
            ..MasterConfig::default()
        };
        Master::builder(cfg)
            .with_launcher(Arc::new(Refuse))
            .with_subscribers(vec![recorder as Arc<dyn Subscribe>])
            .without_log_writer()
            .without_signals()
            .build()
    }

    #[tokio::test]
    async fn spawn_failures_are_retried_and_stop_exits_the_loop() {
        let recorder = Arc::new(Recorder::default());
        let m = master(recorder.clone());
        let handle = m.handle();
        let run = tokio::spawn(m.run());

        tokio::time::sleep(Duration::from_millis(60)).await;
        assert!(handle.is_enabled());
        assert_eq!(handle.stop().await, Ok(true));
        assert!(!handle.is_enabled());

        run.await.unwrap().unwrap();
        assert!(handle.snapshot().await.is_err(), "handle outlives the master");

        let kinds = recorder.kinds.lock().unwrap().clone();
        let failures = kinds.iter().filter(|k| **k == EventKind::SpawnFailed).count();
        assert!(failures > 3, "proxy and workers retried each tick, saw {failures}");
        assert!(kinds.contains(&EventKind::StopRequested));
        assert_eq!(kinds.last(), Some(&EventKind::MasterExited));
    }

    #[tokio::test]
    async fn snapshot_reflects_the_configured_slots() {
        let m = master(Arc::new(Recorder::default()));
        let handle = m.handle();
        let run = tokio::spawn(m.run());

        let snap = handle.snapshot().await.unwrap();
        assert!(snap.enabled);
        assert!(snap.workers_started);
        assert_eq!(snap.workers.len(), 2);
        assert_eq!(snap.process_count(), 0);

        handle.stop().await.unwrap();
        run.await.unwrap().unwrap();
    }

    #[tokio::test]
    async fn zero_tick_runs_at_the_minimum_interval() {
        let recorder = Arc::new(Recorder::default());
        let m = with_tick(recorder.clone(), Duration::ZERO);
        let handle = m.handle();
        let run = tokio::spawn(m.run());

        tokio::time::sleep(Duration::from_millis(30)).await;
        assert_eq!(handle.stop().await, Ok(true));
        run.await.expect("loop does not panic").unwrap();

        let kinds = recorder.kinds.lock().unwrap().clone();
        assert!(kinds.contains(&EventKind::SpawnFailed));
    }
}
