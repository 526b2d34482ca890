//! OS signal delivery to a running master.
//!
//! Kept in its own test binary: signals are process-wide, so exactly one master in this
//! process installs handlers.

#![cfg(unix)]

use std::sync::Arc;
use std::time::{Duration, Instant};

use nix::sys::signal::{Signal, raise};
use procvisor::{
    Event, EventKind, ExecLauncher, Master, MasterConfig, MasterHandle, ReloadState, Snapshot,
    WorkerGroup,
};
use tokio::sync::broadcast;

const WAIT: Duration = Duration::from_secs(5);

async fn eventually(handle: &MasterHandle, pred: impl Fn(&Snapshot) -> bool) -> Snapshot {
    let deadline = Instant::now() + WAIT;
    loop {
        let snap = handle.snapshot().await.expect("master is running");
        if pred(&snap) {
            return snap;
        }
        assert!(Instant::now() < deadline, "timed out: {snap:?}");
        tokio::time::sleep(Duration::from_millis(20)).await;
    }
}

fn collected(rx: &mut broadcast::Receiver<Event>) -> Vec<EventKind> {
    let mut kinds = Vec::new();
    loop {
        match rx.try_recv() {
            Ok(ev) => kinds.push(ev.kind),
            Err(broadcast::error::TryRecvError::Lagged(_)) => continue,
            Err(_) => return kinds,
        }
    }
}

fn count(kinds: &[EventKind], kind: EventKind) -> usize {
    kinds.iter().filter(|k| **k == kind).count()
}

#[tokio::test]
async fn hup_reloads_once_and_repeated_term_forces_the_stop() {
    // Children ignore SIGTERM, so only a forced stop can end them.
    let launcher = ExecLauncher::new("sh")
        .arg("-c")
        .arg("trap '' TERM; exec sleep 30")
        .quiet();
    let cfg = MasterConfig {
        groups: vec![WorkerGroup::new(1, 2)],
        stop_timeout: None,
        notify_proxy_on_reload: false,
        ..MasterConfig::default()
    };
    let master = Master::builder(cfg)
        .with_launcher(Arc::new(launcher))
        .build();
    let handle = master.handle();
    let mut events = master.subscribe();
    let task = tokio::spawn(master.run());

    eventually(&handle, |s| s.process_count() == 3).await;
    tokio::time::sleep(Duration::from_millis(200)).await;

    // Two hangups in a row: one reload cycle.
    raise(Signal::SIGHUP).unwrap();
    raise(Signal::SIGHUP).unwrap();
    tokio::time::sleep(Duration::from_millis(300)).await;
    let snap = handle.snapshot().await.unwrap();
    assert_eq!(snap.reload, ReloadState::Preparing);
    assert_eq!(snap.ready_pids().len(), 2);
    assert_eq!(count(&collected(&mut events), EventKind::ReloadStarted), 1);

    assert_eq!(handle.confirm_workers_swapped().await, Ok(true));
    let snap = eventually(&handle, |s| s.reload == ReloadState::Stopped).await;
    assert_eq!(snap.old.len(), 2, "displaced workers ignore SIGTERM and stay tracked");

    // First SIGTERM: graceful stop. Nobody exits, nothing is respawned.
    raise(Signal::SIGTERM).unwrap();
    eventually(&handle, |s| !s.enabled).await;
    tokio::time::sleep(Duration::from_millis(300)).await;
    assert_eq!(handle.snapshot().await.unwrap().process_count(), 5);
    assert!(!task.is_finished());

    // Second SIGTERM while stopping: forced stop.
    raise(Signal::SIGTERM).unwrap();
    tokio::time::timeout(WAIT, task)
        .await
        .expect("forced stop ends the master")
        .unwrap()
        .unwrap();

    let kinds = collected(&mut events);
    assert_eq!(count(&kinds, EventKind::StopRequested), 1);
    assert_eq!(count(&kinds, EventKind::ForceStopRequested), 1);
    assert_eq!(count(&kinds, EventKind::ForceKilled), 5);
    assert_eq!(kinds.last(), Some(&EventKind::MasterExited));
}
