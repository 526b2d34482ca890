//! # OS signal handling.
//!
//! Signals never touch master state. The forwarder task maps each delivery to a
//! [`MasterSignal`] and enqueues it on the master inbox; the loop acts on it between ticks.
//!
//! ## Signals
//! **Unix platforms:**
//! - `SIGINT`, `SIGTERM` → [`MasterSignal::Stop`] (a repeat while stopping forces the stop)
//! - `SIGHUP` → [`MasterSignal::Reload`]
//! - `SIGQUIT` → [`MasterSignal::ForceStop`]
//!
//! **Windows platforms:**
//! - `Ctrl-C` via [`tokio::signal::ctrl_c`] → [`MasterSignal::Stop`]

use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

use super::handle::Inbox;

/// Supervisor action requested by an OS signal.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MasterSignal {
    /// Graceful stop: SIGTERM everything, SIGKILL after the deadline.
    Stop,
    /// Immediate SIGKILL of every child.
    ForceStop,
    /// Start a hot reload.
    Reload,
}

/// Registered signal streams.
///
/// Registration happens in [`SignalHandler::install`] so that a failure surfaces before any
/// child is started.
#[cfg(unix)]
pub struct SignalHandler {
    sigint: tokio::signal::unix::Signal,
    sigterm: tokio::signal::unix::Signal,
    sighup: tokio::signal::unix::Signal,
    sigquit: tokio::signal::unix::Signal,
}

#[cfg(unix)]
impl SignalHandler {
    pub fn install() -> std::io::Result<Self> {
        use tokio::signal::unix::{SignalKind, signal};

        Ok(Self {
            sigint: signal(SignalKind::interrupt())?,
            sigterm: signal(SignalKind::terminate())?,
            sighup: signal(SignalKind::hangup())?,
            sigquit: signal(SignalKind::quit())?,
        })
    }

    /// Waits for the next signal.
    pub async fn recv(&mut self) -> MasterSignal {
        tokio::select! {
            _ = self.sigint.recv()  => MasterSignal::Stop,
            _ = self.sigterm.recv() => MasterSignal::Stop,
            _ = self.sighup.recv()  => MasterSignal::Reload,
            _ = self.sigquit.recv() => MasterSignal::ForceStop,
        }
    }
}

#[cfg(not(unix))]
pub struct SignalHandler;

#[cfg(not(unix))]
impl SignalHandler {
    pub fn install() -> std::io::Result<Self> {
        Ok(Self)
    }

    pub async fn recv(&mut self) -> MasterSignal {
        match tokio::signal::ctrl_c().await {
            Ok(()) => MasterSignal::Stop,
            Err(_) => std::future::pending().await,
        }
    }
}

impl SignalHandler {
    /// Forwards signals into the master inbox until `token` is cancelled or the inbox closes.
    pub(crate) fn spawn_forwarder(
        mut self,
        inbox: mpsc::Sender<Inbox>,
        token: CancellationToken,
    ) -> JoinHandle<()> {
        tokio::spawn(async move {
            loop {
                let sig = tokio::select! {
                    _ = token.cancelled() => break,
                    sig = self.recv() => sig,
                };
                if inbox.send(Inbox::Signal(sig)).await.is_err() {
                    break;
                }
            }
        })
    }
}
