//! # procvisor
//!
//! **Procvisor** is a single-host process supervisor for Rust services built in the
//! prefork style: one master keeps a proxy process and pools of worker processes alive,
//! and replaces the workers without dropping traffic.
//!
//! Every child is the same executable as the master; its [`Role`] arrives through the
//! [`ROLE_ENV`] environment variable.
//!
//! ## Architecture
//! ### Overview
//! ```text
//!   OS signals          proxy admin endpoint (TCP)         MasterHandle
//!  (INT/TERM/HUP/QUIT)   │ newline JSON frames              (embedders, tests)
//!        │               ▼                                       │
//!        │        ┌──────────────┐                               │
//!        │        │  AdminLink   │ startup gate + command reader │
//!        │        └──────┬───────┘                               │
//!        ▼               ▼                                       ▼
//! ┌───────────────────────────────────────────────────────────────────┐
//! │                       mpsc<Inbox> (master inbox)                  │
//! └─────────────────────────────────┬─────────────────────────────────┘
//!                                   ▼
//! ┌───────────────────────────────────────────────────────────────────┐
//! │  Master (single task, owns every ProcessRecord)                   │
//! │  - monitor tick: swap, liveness, respawn, reap old workers        │
//! │  - ReloadController: Stopped → Preparing → WorkersDone → Stopped  │
//! │  - EnabledFlag (AtomicBool): cleared once on stop                 │
//! └──────┬──────────────────┬──────────────────┬───────────────┬──────┘
//!        ▼                  ▼                  ▼               │
//!     ┌──────────────┐   ┌──────────────┐   ┌──────────────┐   │
//!     │    proxy     │   │  worker(1)   │   │  worker(1)   │   │
//!     │  (process)   │   │  (process)   │   │  (process)   │   │
//!     └──────────────┘   └──────────────┘   └──────────────┘   │
//!                                                              ▼
//! ┌───────────────────────────────────────────────────────────────────┐
//! │                        Bus (broadcast channel)                    │
//! │              (capacity: MasterConfig::bus_capacity)               │
//! └─────────────────────────────────┬─────────────────────────────────┘
//!                                   ▼
//!                       ┌────────────────────────┐
//!                       │  subscriber_listener   │
//!                       └───────────┬────────────┘
//!                                   ▼
//!                             SubscriberSet
//!                          ┌────────┼─────────┐
//!                          ▼        ▼         ▼
//!                      LogWriter  sub2 ...  subN
//! ```
//!
//! ### Hot reload
//! ```text
//! SIGHUP / ADMIN_RELOAD / ADMIN_CHANGE
//!   └─► Stopped → Preparing: SIGUSR1 to proxy, spawn a fresh "ready" pool
//! MASTER_REPLACE_WORKERS (from the proxy)
//!   └─► Preparing → WorkersDone
//! next monitor tick
//!   └─► active pool → old set (SIGTERM, SIGKILL after stop_timeout)
//!       ready pool  → active pool
//!       WorkersDone → Stopped
//! ```
//!
//! ## Features
//! | Area              | Description                                                       | Key types / traits                       |
//! |-------------------|-------------------------------------------------------------------|------------------------------------------|
//! | **Supervision**   | Proxy + worker groups, crash respawn, graceful and forced stop.   | [`Master`], [`MasterBuilder`]            |
//! | **Hot reload**    | Two-phase worker replacement confirmed by the proxy.              | [`ReloadController`], [`ReloadState`]    |
//! | **Admin commands**| Commands relayed by the proxy over a persistent connection.       | [`AdminCommand`]                         |
//! | **Launching**     | Pluggable process launcher, role passed in the environment.       | [`Launch`], [`ExecLauncher`], [`Role`]   |
//! | **Subscriber API**| Hook into lifecycle events (logging, metrics, custom subscribers).| [`Subscribe`], [`LogWriter`]             |
//! | **Policies**      | Admin link reconnect backoff.                                     | [`BackoffPolicy`], [`JitterPolicy`]      |
//! | **Errors**        | Typed errors with stable labels.                                  | [`SpawnError`], [`RuntimeError`]         |
//! | **Configuration** | Centralized runtime settings.                                     | [`MasterConfig`], [`WorkerGroup`]        |
//!
//! ## Example
//! ```no_run
//! use procvisor::{Master, MasterConfig, Role, WorkerGroup};
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     if let Some(role) = Role::from_env()? {
//!         println!("running as {role}");
//!         return Ok(());
//!     }
//!
//!     let cfg = MasterConfig {
//!         groups: vec![WorkerGroup::new(1, 2)],
//!         admin_addr: Some("127.0.0.1:7070".parse()?),
//!         ..MasterConfig::default()
//!     };
//!     Master::builder(cfg).build().run().await?;
//!     Ok(())
//! }
//! ```
mod core;
mod error;
mod events;
mod policies;
mod subscribers;

// ---- Public re-exports ----

pub use crate::core::{
    AdminCommand, ChildInfo, ExecLauncher, Launch, Master, MasterBuilder, MasterConfig,
    MasterHandle, MasterSignal, ProcessRecord, ROLE_ENV, RecordId, ReloadController, ReloadState,
    Role, Snapshot, WorkerGroup,
};
pub use error::{DecodeError, GroupChangeError, HandleError, RuntimeError, SpawnError};
pub use events::{Event, EventKind};
pub use policies::{BackoffPolicy, JitterPolicy};
pub use subscribers::{LogWriter, Subscribe, SubscriberSet};
