use std::sync::Arc;
use std::sync::atomic::AtomicBool;

use tokio::sync::mpsc;

use super::{
    config::MasterConfig,
    control::Control,
    launcher::{ExecLauncher, Launch},
    master::Master,
};
use crate::{
    events::Bus,
    subscribers::{LogWriter, Subscribe},
};

/// Builder for constructing a [`Master`] with optional features.
pub struct MasterBuilder {
    cfg: MasterConfig,
    launcher: Option<Arc<dyn Launch>>,
    subscribers: Vec<Arc<dyn Subscribe>>,
    log_writer: bool,
    signals: bool,
}

impl MasterBuilder {
    /// Creates a new builder with the given configuration.
    pub fn new(cfg: MasterConfig) -> Self {
        Self {
            cfg,
            launcher: None,
            subscribers: Vec::new(),
            log_writer: true,
            signals: true,
        }
    }

    /// Replaces the default launcher ([`ExecLauncher::current_exe`]).
    pub fn with_launcher(mut self, launcher: Arc<dyn Launch>) -> Self {
        self.launcher = Some(launcher);
        self
    }

    /// Sets event subscribers for observability.
    ///
    /// Subscribers receive runtime events (spawns, exits, reload transitions, stop)
    /// through dedicated workers with bounded queues.
    pub fn with_subscribers(mut self, subscribers: Vec<Arc<dyn Subscribe>>) -> Self {
        self.subscribers = subscribers;
        self
    }

    /// Drops the built-in [`LogWriter`] subscriber.
    pub fn without_log_writer(mut self) -> Self {
        self.log_writer = false;
        self
    }

    /// Leaves OS signals alone; the master is then driven through its
    /// [`MasterHandle`](crate::MasterHandle) and admin link only.
    pub fn without_signals(mut self) -> Self {
        self.signals = false;
        self
    }

    /// Builds the master. No process is started before [`Master::run`].
    pub fn build(self) -> Master {
        let bus = Bus::new(self.cfg.bus_capacity_clamped());
        let (tx, rx) = mpsc::channel(self.cfg.inbox_capacity_clamped());
        let enabled = Arc::new(AtomicBool::new(true));

        let launcher: Arc<dyn Launch> = match self.launcher {
            Some(launcher) => launcher,
            None => Arc::new(ExecLauncher::current_exe()),
        };

        let mut subscribers = self.subscribers;
        if self.log_writer {
            subscribers.push(Arc::new(LogWriter::new()));
        }

        Master {
            control: Control::new(self.cfg, launcher, bus, enabled, tx),
            inbox: rx,
            subscribers,
            install_signals: self.signals,
        }
    }
}
