//! # Prefork Example
//!
//! One binary, three roles: the master re-executes itself as a proxy and a pool of
//! workers, picking the role from `PROCVISOR_ROLE`.
//!
//! Demonstrates:
//! - Startup gate: workers start only once the proxy listens on its admin port
//! - Crash respawn: `kill -9` any worker and watch it come back
//! - Hot reload: `kill -HUP <master>`; the proxy gets SIGUSR1, waits, then confirms the swap
//! - Graceful stop: `kill -TERM <master>` (a second one forces it)
//!
//! ## Run
//! ```bash
//! RUST_LOG=info cargo run --example prefork
//! ```

#[cfg(unix)]
mod demo {
    use std::net::SocketAddr;
    use std::time::Duration;

    use procvisor::{AdminCommand, Master, MasterConfig, Role, WorkerGroup};
    use tokio::io::AsyncWriteExt;
    use tokio::net::TcpListener;
    use tokio::signal::unix::{SignalKind, signal};
    use tracing::info;

    const ADMIN_ADDR: &str = "127.0.0.1:7070";

    pub async fn main() -> anyhow::Result<()> {
        tracing_subscriber::fmt()
            .with_env_filter(
                tracing_subscriber::EnvFilter::try_from_default_env()
                    .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
            )
            .init();

        let admin: SocketAddr = ADMIN_ADDR.parse()?;
        match Role::from_env()? {
            Some(Role::Proxy) => proxy(admin).await,
            Some(Role::Worker { group_id }) => worker(group_id).await,
            None => master(admin).await,
        }
    }

    async fn master(admin: SocketAddr) -> anyhow::Result<()> {
        let cfg = MasterConfig {
            groups: vec![WorkerGroup::new(1, 2), WorkerGroup::new(2, 1)],
            admin_addr: Some(admin),
            stop_timeout: Some(Duration::from_secs(5)),
            ..MasterConfig::default()
        };
        info!(pid = std::process::id(), "master starting");
        Master::builder(cfg).build().run().await?;
        info!("master exited");
        Ok(())
    }

    /// Accepts the master's admin connection and confirms every reload after a short drain.
    async fn proxy(admin: SocketAddr) -> anyhow::Result<()> {
        let mut reload = signal(SignalKind::user_defined1())?;
        let mut term = signal(SignalKind::terminate())?;
        let listener = TcpListener::bind(admin).await?;
        info!(%admin, "proxy listening");

        let (mut link, _) = listener.accept().await?;
        loop {
            tokio::select! {
                _ = reload.recv() => {
                    info!("reload notice, draining old workers");
                    tokio::time::sleep(Duration::from_secs(1)).await;
                    let frame = AdminCommand::ConfirmWorkersSwapped.encode() + "\n";
                    link.write_all(frame.as_bytes()).await?;
                }
                _ = term.recv() => break,
            }
        }
        info!("proxy stopping");
        Ok(())
    }

    async fn worker(group_id: u32) -> anyhow::Result<()> {
        let mut term = signal(SignalKind::terminate())?;
        let mut beat = tokio::time::interval(Duration::from_secs(2));
        loop {
            tokio::select! {
                _ = beat.tick() => info!(group_id, pid = std::process::id(), "worker alive"),
                _ = term.recv() => break,
            }
        }
        info!(group_id, "worker stopping");
        Ok(())
    }
}

#[cfg(unix)]
#[tokio::main]
async fn main() -> anyhow::Result<()> {
    demo::main().await
}

#[cfg(not(unix))]
fn main() {
    eprintln!("the prefork example needs a unix platform");
}
