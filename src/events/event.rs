//! # Runtime events emitted by the master and its helper tasks.
//!
//! The [`EventKind`] enum classifies event types across four categories:
//! - **Child events**: spawn, spawn failure, exit, signals sent to children
//! - **Reload events**: the hot-reload state machine transitions
//! - **Admin events**: connection state of the admin link and decoded commands
//! - **Stop events**: graceful and forced stop, final exit of the master loop
//!
//! The [`Event`] struct carries additional metadata such as timestamps, child role,
//! OS pid, reasons and delays.
//!
//! ## Ordering guarantees
//! Each event has a globally unique sequence number (`seq`) that increases monotonically.
//! Use `seq` to restore the exact order when events are delivered out of order.
//!
//! ## Example
//! ```rust
//! use procvisor::{Event, EventKind, Role};
//!
//! let ev = Event::new(EventKind::ChildExited)
//!     .with_role(Role::Worker { group_id: 1 })
//!     .with_pid(4242)
//!     .with_reason("signal: 9 (SIGKILL)");
//!
//! assert_eq!(ev.kind, EventKind::ChildExited);
//! assert_eq!(ev.group(), Some(1));
//! assert_eq!(ev.pid, Some(4242));
//! ```

use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering as AtomicOrdering};
use std::time::{Duration, SystemTime};

use crate::core::Role;

/// Global sequence counter for event ordering.
static EVENT_SEQ: AtomicU64 = AtomicU64::new(0);

/// Classification of runtime events.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EventKind {
    // === Subscriber events ===
    /// Subscriber panicked during event processing.
    ///
    /// Sets:
    /// - `subscriber`: subscriber name
    /// - `reason`: panic info/message
    SubscriberPanicked,

    /// Subscriber dropped an event (queue full or worker closed).
    ///
    /// Sets:
    /// - `subscriber`: subscriber name
    /// - `reason`: `"full"` or `"closed"`
    SubscriberOverflow,

    // === Child process events ===
    /// A child process was started.
    ///
    /// Sets:
    /// - `role`: proxy or worker (with group)
    /// - `pid`: OS pid of the new child
    ChildSpawned,

    /// Starting a child failed; the slot stays empty until the next tick.
    ///
    /// Sets:
    /// - `role`: requested role
    /// - `reason`: spawn error
    SpawnFailed,

    /// A supervised child exited and was reaped.
    ///
    /// Sets:
    /// - `role`, `pid`
    /// - `reason`: exit status
    ChildExited,

    /// A drained worker from a previous generation exited and was forgotten.
    ///
    /// Sets:
    /// - `role`, `pid`
    OldWorkerReaped,

    /// SIGTERM was delivered to a child.
    ///
    /// Sets:
    /// - `role`, `pid`
    TerminateSent,

    /// A child outlived its kill deadline and received SIGKILL.
    ///
    /// Sets:
    /// - `role`, `pid`
    ForceKilled,

    // === Reload events ===
    /// Reload accepted: state is now `Preparing` and ready workers are being spawned.
    ///
    /// Sets:
    /// - `count`: number of ready slots requested
    ReloadStarted,

    /// Reload request rejected because another reload is in flight or the master is stopping.
    ///
    /// Sets:
    /// - `reason`: current state
    ReloadRejected,

    /// Proxy confirmed it stopped routing to the old workers (`WorkersDone`).
    ReloadConfirmed,

    /// Swap confirmation arrived while no reload was preparing.
    ///
    /// Sets:
    /// - `reason`: current state
    ConfirmRejected,

    /// The active pool was replaced by the ready set; old workers are draining.
    ///
    /// Sets:
    /// - `count`: number of workers moved to the old set
    WorkersSwapped,

    // === Group configuration events ===
    /// A worker group's desired count was changed.
    ///
    /// Sets:
    /// - `group`, `count`
    GroupChanged,

    /// A group change could not be applied; no reload is triggered.
    ///
    /// Sets:
    /// - `group`, `count`, `reason`
    GroupChangeRejected,

    // === Admin link events ===
    /// The startup gate reached the proxy's admin endpoint; workers may start.
    ProxyReady,

    /// The admin listener established its connection to the proxy.
    AdminConnected,

    /// Connecting to the proxy's admin endpoint failed.
    ///
    /// Sets:
    /// - `reason`: connect error
    /// - `delay_ms`: wait before the next attempt
    AdminConnectFailed,

    /// The admin connection was closed or broke.
    ///
    /// Sets:
    /// - `reason`
    AdminDisconnected,

    /// An inbound admin frame could not be decoded and was skipped.
    ///
    /// Sets:
    /// - `reason`: decode error
    AdminFrameRejected,

    // === Stop events ===
    /// Graceful stop requested (signal or admin command). The master is now disabled.
    ///
    /// Sets:
    /// - `reason`: origin of the request
    /// - `timeout_ms`: kill deadline, if configured
    StopRequested,

    /// Forced stop requested: every remaining child is killed immediately.
    ///
    /// Sets:
    /// - `reason`: origin of the request
    ForceStopRequested,

    /// The monitor loop found nothing left to manage and exited.
    MasterExited,
}

/// Runtime event with optional metadata.
///
/// - `seq`: monotonic global sequence for ordering
/// - `at`: wall-clock timestamp (for logs)
/// - other optional fields are set depending on the [`EventKind`]
#[derive(Clone, Debug)]
pub struct Event {
    /// Globally unique, monotonically increasing sequence number.
    pub seq: u64,
    /// Wall-clock timestamp.
    pub at: SystemTime,
    /// Event classification.
    pub kind: EventKind,

    /// Role of the child the event is about.
    pub role: Option<Role>,
    /// OS pid of the child the event is about.
    pub pid: Option<u32>,
    /// Worker group id (group events only; child events carry it in `role`).
    pub group_id: Option<u32>,
    /// Worker count (group changes, reload sizes).
    pub count: Option<usize>,
    /// Kill deadline in milliseconds (compact).
    pub timeout_ms: Option<u32>,
    /// Delay before the next attempt in milliseconds (compact).
    pub delay_ms: Option<u32>,
    /// Human-readable reason (errors, exit statuses, etc.).
    pub reason: Option<Arc<str>>,
    /// Subscriber name (subscriber events only).
    pub subscriber: Option<&'static str>,
}

impl Event {
    /// Creates a new event of the given kind with current timestamp and next sequence number.
    pub fn new(kind: EventKind) -> Self {
        Self {
            seq: EVENT_SEQ.fetch_add(1, AtomicOrdering::Relaxed),
            at: SystemTime::now(),
            kind,
            role: None,
            pid: None,
            group_id: None,
            count: None,
            timeout_ms: None,
            delay_ms: None,
            reason: None,
            subscriber: None,
        }
    }

    /// Attaches a child role.
    #[inline]
    pub fn with_role(mut self, role: Role) -> Self {
        self.role = Some(role);
        self
    }

    /// Attaches an OS pid; `None` pids (already reaped children) are ignored.
    #[inline]
    pub fn with_pid(mut self, pid: impl Into<Option<u32>>) -> Self {
        self.pid = pid.into();
        self
    }

    /// Attaches a worker group id.
    #[inline]
    pub fn with_group(mut self, group_id: u32) -> Self {
        self.group_id = Some(group_id);
        self
    }

    /// Attaches a worker count.
    #[inline]
    pub fn with_count(mut self, count: usize) -> Self {
        self.count = Some(count);
        self
    }

    /// Attaches a human-readable reason.
    #[inline]
    pub fn with_reason(mut self, reason: impl Into<Arc<str>>) -> Self {
        self.reason = Some(reason.into());
        self
    }

    /// Attaches a kill deadline (stored as milliseconds).
    #[inline]
    pub fn with_timeout(mut self, d: Duration) -> Self {
        self.timeout_ms = Some(compact_ms(d));
        self
    }

    /// Attaches a retry delay (stored as milliseconds).
    #[inline]
    pub fn with_delay(mut self, d: Duration) -> Self {
        self.delay_ms = Some(compact_ms(d));
        self
    }

    /// Returns the worker group this event is about, from either `group_id` or `role`.
    pub fn group(&self) -> Option<u32> {
        self.group_id.or(match self.role {
            Some(Role::Worker { group_id }) => Some(group_id),
            _ => None,
        })
    }

    /// Creates a subscriber overflow event.
    #[inline]
    pub fn subscriber_overflow(subscriber: &'static str, reason: &'static str) -> Self {
        let mut ev = Event::new(EventKind::SubscriberOverflow).with_reason(reason);
        ev.subscriber = Some(subscriber);
        ev
    }

    /// Creates a subscriber panic event.
    #[inline]
    pub fn subscriber_panicked(subscriber: &'static str, info: String) -> Self {
        let mut ev = Event::new(EventKind::SubscriberPanicked).with_reason(info);
        ev.subscriber = Some(subscriber);
        ev
    }
}

fn compact_ms(d: Duration) -> u32 {
    d.as_millis().min(u128::from(u32::MAX)) as u32
}
