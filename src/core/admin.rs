//! # AdminLink: the master's connection to the proxy.
//!
//! One background task owns the TCP connection to the proxy's admin endpoint and
//! serves both duties:
//!
//! ```text
//! gate phase:   connect ─✗─► sleep(connect_retry) ─► connect ─✓─► Inbox::ProxyReady
//!                                                                    │
//! command phase:                     ┌───────────────────────────────┘
//!                                    ▼
//!               read line ─► AdminCommand::decode ─► Inbox::Admin(cmd)
//!                    │ (eof / io error)
//!                    ▼
//!               connect ─✗─► sleep(reconnect.next(failures)) ─► connect ...
//! ```
//!
//! ## Rules
//! - The gate uses a short fixed retry so workers start as soon as the proxy listens.
//! - Later reconnects back off per [`BackoffPolicy`].
//! - Undecodable frames are reported and skipped; the connection stays up.
//! - The task ends when the master is disabled (`token`) or the inbox closes.

use std::net::SocketAddr;
use std::time::Duration;

use futures::StreamExt;
use tokio::net::TcpStream;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio_util::codec::{FramedRead, LinesCodec, LinesCodecError};
use tokio_util::sync::CancellationToken;

use super::command::AdminCommand;
use super::handle::Inbox;
use crate::events::{Bus, Event, EventKind};
use crate::policies::BackoffPolicy;

/// Longest admin frame accepted.
const MAX_FRAME_LEN: usize = 64 * 1024;

/// Settings for the admin link task.
#[derive(Clone, Debug)]
pub(crate) struct AdminLink {
    pub addr: SocketAddr,
    pub connect_retry: Duration,
    pub reconnect: BackoffPolicy,
}

/// Why a connection's read loop ended.
enum Closed {
    /// The master is gone or disabled; stop the task.
    Shutdown,
    /// The proxy side went away; reconnect.
    Lost(String),
}

impl AdminLink {
    /// Spawns the link task.
    pub(crate) fn spawn(
        self,
        inbox: mpsc::Sender<Inbox>,
        bus: Bus,
        token: CancellationToken,
    ) -> JoinHandle<()> {
        tokio::spawn(async move { self.run(inbox, bus, token).await })
    }

    async fn run(self, inbox: mpsc::Sender<Inbox>, bus: Bus, token: CancellationToken) {
        let Some(stream) = self.open_gate(&bus, &token).await else {
            return;
        };
        bus.publish(Event::new(EventKind::ProxyReady));
        if inbox.send(Inbox::ProxyReady).await.is_err() {
            return;
        }

        let mut stream = stream;
        loop {
            match read_commands(stream, &inbox, &bus, &token).await {
                Closed::Shutdown => return,
                Closed::Lost(reason) => {
                    bus.publish(Event::new(EventKind::AdminDisconnected).with_reason(reason));
                }
            }
            stream = match self.reconnect(&bus, &token).await {
                Some(s) => s,
                None => return,
            };
        }
    }

    /// Startup gate: retries with a fixed short sleep until the proxy accepts.
    async fn open_gate(&self, bus: &Bus, token: &CancellationToken) -> Option<TcpStream> {
        self.connect_loop(bus, token, |_| self.connect_retry).await
    }

    async fn reconnect(&self, bus: &Bus, token: &CancellationToken) -> Option<TcpStream> {
        self.connect_loop(bus, token, |failures| self.reconnect.next(failures))
            .await
    }

    async fn connect_loop(
        &self,
        bus: &Bus,
        token: &CancellationToken,
        delay_for: impl Fn(u32) -> Duration,
    ) -> Option<TcpStream> {
        let mut failures: u32 = 0;
        loop {
            let attempt = tokio::select! {
                _ = token.cancelled() => return None,
                res = TcpStream::connect(self.addr) => res,
            };
            match attempt {
                Ok(stream) => {
                    bus.publish(Event::new(EventKind::AdminConnected));
                    return Some(stream);
                }
                Err(e) => {
                    let delay = delay_for(failures);
                    failures = failures.saturating_add(1);
                    bus.publish(
                        Event::new(EventKind::AdminConnectFailed)
                            .with_reason(e.to_string())
                            .with_delay(delay),
                    );
                    tokio::select! {
                        _ = token.cancelled() => return None,
                        _ = tokio::time::sleep(delay) => {}
                    }
                }
            }
        }
    }
}

async fn read_commands(
    stream: TcpStream,
    inbox: &mpsc::Sender<Inbox>,
    bus: &Bus,
    token: &CancellationToken,
) -> Closed {
    let mut frames = FramedRead::new(stream, LinesCodec::new_with_max_length(MAX_FRAME_LEN));
    loop {
        let frame = tokio::select! {
            _ = token.cancelled() => return Closed::Shutdown,
            frame = frames.next() => frame,
        };
        let line = match frame {
            Some(Ok(line)) => line,
            Some(Err(LinesCodecError::MaxLineLengthExceeded)) => {
                bus.publish(
                    Event::new(EventKind::AdminFrameRejected)
                        .with_reason(format!("frame longer than {MAX_FRAME_LEN} bytes")),
                );
                continue;
            }
            Some(Err(LinesCodecError::Io(e))) => return Closed::Lost(e.to_string()),
            None => return Closed::Lost("closed by proxy".to_string()),
        };

        let line = line.trim();
        if line.is_empty() {
            continue;
        }
        match AdminCommand::decode(line) {
            Ok(cmd) => {
                if inbox.send(Inbox::Admin(cmd, None)).await.is_err() {
                    return Closed::Shutdown;
                }
            }
            Err(e) => {
                bus.publish(Event::new(EventKind::AdminFrameRejected).with_reason(e.to_string()));
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use tokio::io::AsyncWriteExt;
    use tokio::net::TcpListener;

    use super::*;

    fn link(addr: SocketAddr) -> AdminLink {
        AdminLink {
            addr,
            connect_retry: Duration::from_millis(10),
            reconnect: BackoffPolicy::fixed(Duration::from_millis(10)),
        }
    }

    async fn next_admin(rx: &mut mpsc::Receiver<Inbox>) -> AdminCommand {
        loop {
            match rx.recv().await {
                Some(Inbox::Admin(cmd, _)) => return cmd,
                Some(_) => continue,
                None => panic!("inbox closed"),
            }
        }
    }

    #[tokio::test]
    async fn gate_waits_for_listener_then_relays_commands() {
        // Reserve a port, then free it so the first attempts fail.
        let addr = TcpListener::bind("127.0.0.1:0").await.unwrap().local_addr().unwrap();

        let (tx, mut rx) = mpsc::channel(16);
        let bus = Bus::new(64);
        let mut events = bus.subscribe();
        let token = CancellationToken::new();
        let task = link(addr).spawn(tx, bus, token.clone());

        loop {
            if events.recv().await.unwrap().kind == EventKind::AdminConnectFailed {
                break;
            }
        }

        let listener = TcpListener::bind(addr).await.unwrap();
        let (mut conn, _) = listener.accept().await.unwrap();
        assert!(matches!(rx.recv().await, Some(Inbox::ProxyReady)));

        conn.write_all(b"{\"cmd\":\"ADMIN_RELOAD\"}\n\ngarbage\n{\"cmd\":\"ADMIN_STOP\"}\n")
            .await
            .unwrap();
        assert_eq!(next_admin(&mut rx).await, AdminCommand::Reload);
        assert_eq!(next_admin(&mut rx).await, AdminCommand::Stop);

        token.cancel();
        task.await.unwrap();
    }

    #[tokio::test]
    async fn reconnects_after_proxy_drops_the_connection() {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();

        let (tx, mut rx) = mpsc::channel(16);
        let token = CancellationToken::new();
        let task = link(addr).spawn(tx, Bus::new(64), token.clone());

        let (first, _) = listener.accept().await.unwrap();
        assert!(matches!(rx.recv().await, Some(Inbox::ProxyReady)));
        drop(first);

        let (mut second, _) = listener.accept().await.unwrap();
        second
            .write_all(b"{\"cmd\":\"MASTER_REPLACE_WORKERS\"}\n")
            .await
            .unwrap();
        assert_eq!(next_admin(&mut rx).await, AdminCommand::ConfirmWorkersSwapped);

        token.cancel();
        task.await.unwrap();
    }

    #[tokio::test]
    async fn cancelled_gate_never_reports_ready() {
        let addr = TcpListener::bind("127.0.0.1:0").await.unwrap().local_addr().unwrap();
        let (tx, mut rx) = mpsc::channel(16);
        let token = CancellationToken::new();
        let task = link(addr).spawn(tx, Bus::new(8), token.clone());

        tokio::time::sleep(Duration::from_millis(30)).await;
        token.cancel();
        task.await.unwrap();
        assert!(rx.recv().await.is_none());
    }
}
