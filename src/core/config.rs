//! # Master configuration.
//!
//! [`MasterConfig`] centralizes every knob of the supervisor. Parsing it from a file is the
//! embedder's job; the struct derives `Deserialize` so any serde format works.
//!
//! ## Sentinel values
//! - `stop_timeout = None` → terminated children are never force-killed
//! - `admin_addr = None` → no startup gate and no admin link; workers start right away

use std::net::SocketAddr;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::policies::BackoffPolicy;

const MIN_TICK: Duration = Duration::from_millis(1);

/// A pool of workers sharing a desired count.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct WorkerGroup {
    /// Group id, passed to each worker through its role.
    pub id: u32,
    /// Number of workers the master keeps alive for this group.
    pub count: usize,
}

impl WorkerGroup {
    pub fn new(id: u32, count: usize) -> Self {
        Self { id, count }
    }
}

/// Global configuration for the master.
///
/// ## Field semantics
/// - `groups`: worker pools, in slot order
/// - `tick`: monitor interval (liveness checks, respawns, reload swap; min 1ms)
/// - `stop_timeout`: grace between SIGTERM and SIGKILL, for stop and for drained workers
/// - `admin_addr`: proxy admin endpoint used by the startup gate and the admin link
/// - `connect_retry`: sleep between startup gate attempts
/// - `reconnect`: admin link reconnect backoff
/// - `notify_proxy_on_reload`: send SIGUSR1 to the proxy when a reload starts
/// - `bus_capacity`: event bus ring buffer size (min 1)
/// - `inbox_capacity`: master inbox size (min 1)
#[derive(Clone, Debug, Deserialize)]
#[serde(default)]
pub struct MasterConfig {
    pub groups: Vec<WorkerGroup>,
    #[serde(with = "millis")]
    pub tick: Duration,
    #[serde(with = "opt_secs")]
    pub stop_timeout: Option<Duration>,
    pub admin_addr: Option<SocketAddr>,
    #[serde(with = "millis")]
    pub connect_retry: Duration,
    #[serde(skip)]
    pub reconnect: BackoffPolicy,
    pub notify_proxy_on_reload: bool,
    pub bus_capacity: usize,
    pub inbox_capacity: usize,
}

impl MasterConfig {
    /// Total number of worker slots the configuration asks for.
    pub fn worker_count(&self) -> usize {
        self.groups.iter().map(|g| g.count).sum()
    }

    /// Slot layout: one entry per worker, grouped in configuration order.
    pub fn slot_groups(&self) -> Vec<u32> {
        self.groups
            .iter()
            .flat_map(|g| std::iter::repeat(g.id).take(g.count))
            .collect()
    }

    /// Mutable access to a group by id.
    pub fn group_mut(&mut self, id: u32) -> Option<&mut WorkerGroup> {
        self.groups.iter_mut().find(|g| g.id == id)
    }

    /// Monitor interval, never below 1 ms.
    #[inline]
    pub fn tick_clamped(&self) -> Duration {
        self.tick.max(MIN_TICK)
    }

    #[inline]
    pub fn bus_capacity_clamped(&self) -> usize {
        self.bus_capacity.max(1)
    }

    #[inline]
    pub fn inbox_capacity_clamped(&self) -> usize {
        self.inbox_capacity.max(1)
    }
}

impl Default for MasterConfig {
    /// Default configuration:
    ///
    /// - one group `{id: 1, count: 1}`
    /// - `tick = 100ms`
    /// - `stop_timeout = 10s`
    /// - `admin_addr = None`
    /// - `connect_retry = 100ms`
    /// - `reconnect = BackoffPolicy::default()`
    /// - `notify_proxy_on_reload = true`
    /// - `bus_capacity = 1024`, `inbox_capacity = 256`
    fn default() -> Self {
        Self {
            groups: vec![WorkerGroup::new(1, 1)],
            tick: Duration::from_millis(100),
            stop_timeout: Some(Duration::from_secs(10)),
            admin_addr: None,
            connect_retry: Duration::from_millis(100),
            reconnect: BackoffPolicy::default(),
            notify_proxy_on_reload: true,
            bus_capacity: 1024,
            inbox_capacity: 256,
        }
    }
}

mod millis {
    use std::time::Duration;

    use serde::{Deserialize, Deserializer};

    pub fn deserialize<'de, D: Deserializer<'de>>(d: D) -> Result<Duration, D::Error> {
        u64::deserialize(d).map(Duration::from_millis)
    }
}

mod opt_secs {
    use std::time::Duration;

    use serde::{Deserialize, Deserializer, de::Error};

    pub fn deserialize<'de, D: Deserializer<'de>>(d: D) -> Result<Option<Duration>, D::Error> {
        Option::<f64>::deserialize(d)?
            .filter(|s| s.is_finite() && *s > 0.0)
            .map(|s| Duration::try_from_secs_f64(s).map_err(D::Error::custom))
            .transpose()
    }
}
