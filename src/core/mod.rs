//! Runtime core: child processes, the control loop and its inputs.
//!
//! The public API from this module is [`Master`] (with [`MasterBuilder`] and
//! [`MasterHandle`]) plus the data types it exchanges with embedders and children.
//!
//! Internal modules:
//! - [`master`]: owns the control loop, wires signals, subscribers and the admin link;
//! - [`control`]: process tables and every transition (reload, group change, stop);
//! - [`monitor`]: the fixed-tick liveness pass and the reload swap;
//! - [`launcher`]: starting children with their role in the environment;
//! - [`reload`]: the hot-reload state machine;
//! - [`admin`]: startup gate and admin command link to the proxy;
//! - [`signals`]: OS signal mapping onto the master inbox;
//! - [`handle`]: the inbox and the public handle onto it.

mod admin;
mod builder;
mod command;
mod config;
mod control;
mod handle;
mod launcher;
mod master;
mod monitor;
mod reload;
mod role;
mod signals;

pub use builder::MasterBuilder;
pub use command::AdminCommand;
pub use config::{MasterConfig, WorkerGroup};
pub use handle::{ChildInfo, MasterHandle, Snapshot};
pub use launcher::{ExecLauncher, Launch, ProcessRecord, RecordId};
pub use master::Master;
pub use reload::{ReloadController, ReloadState};
pub use role::{ROLE_ENV, Role};
pub use signals::MasterSignal;
