//! # ProcessLauncher: starting child processes.
//!
//! [`Launch`] is the seam between the master and the OS. The default [`ExecLauncher`]
//! re-invokes the current executable with the child's [`Role`] encoded in
//! [`ROLE_ENV`](super::role::ROLE_ENV); embedders and tests can point it at any program.
//!
//! ```text
//! Master::spawn_child(role)
//!     └─► Launch::launch(role) ──► Command(program, args)
//!                                   + env PROCVISOR_ROLE=<json>
//!                                   └─► ProcessRecord { id, role, pid, child, launch_env }
//! ```
//!
//! A [`ProcessRecord`] is owned by exactly one table slot of the master and dropped once
//! its process has been reaped.

use std::ffi::OsString;
use std::path::PathBuf;
use std::process::Stdio;
use std::sync::atomic::{AtomicU64, Ordering};

use tokio::process::{Child, Command};

use super::role::{ROLE_ENV, Role};
use crate::error::SpawnError;

static RECORD_SEQ: AtomicU64 = AtomicU64::new(1);

/// Identifier of a [`ProcessRecord`], unique for the lifetime of the master.
///
/// Unlike OS pids, record ids are never reused, so delayed actions (kill deadlines)
/// can never hit an unrelated process.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct RecordId(u64);

impl RecordId {
    fn next() -> Self {
        Self(RECORD_SEQ.fetch_add(1, Ordering::Relaxed))
    }
}

/// A supervised child process.
#[derive(Debug)]
pub struct ProcessRecord {
    id: RecordId,
    role: Role,
    pid: Option<u32>,
    child: Child,
    launch_env: Vec<(String, String)>,
}

impl ProcessRecord {
    /// Wraps a freshly spawned child.
    pub fn new(role: Role, child: Child, launch_env: Vec<(String, String)>) -> Self {
        Self {
            id: RecordId::next(),
            role,
            pid: child.id(),
            child,
            launch_env,
        }
    }

    pub fn id(&self) -> RecordId {
        self.id
    }

    pub fn role(&self) -> Role {
        self.role
    }

    pub fn group_id(&self) -> Option<u32> {
        self.role.group_id()
    }

    /// OS pid captured at spawn time.
    pub fn pid(&self) -> Option<u32> {
        self.pid
    }

    /// Environment the child was launched with (on top of the inherited one).
    pub fn launch_env(&self) -> &[(String, String)] {
        &self.launch_env
    }

    /// Non-blocking exit check; reaps the child if it has exited.
    ///
    /// Returns the exit description once the process is gone. A failing wait counts as
    /// exited: the process can no longer be observed, so the slot must be freed.
    pub fn poll_exit(&mut self) -> Option<String> {
        match self.child.try_wait() {
            Ok(Some(status)) => Some(status.to_string()),
            Ok(None) => None,
            Err(e) => Some(format!("wait failed: {e}")),
        }
    }

    /// Asks the child to shut down gracefully (SIGTERM).
    ///
    /// Returns `false` if the process was already gone.
    #[cfg(unix)]
    pub fn terminate(&mut self) -> bool {
        use nix::sys::signal::Signal;
        self.signal(Signal::SIGTERM)
    }

    /// Asks the child to shut down; without POSIX signals this is a kill.
    #[cfg(not(unix))]
    pub fn terminate(&mut self) -> bool {
        self.kill()
    }

    /// Delivers an arbitrary signal to a child that has not been reaped yet.
    #[cfg(unix)]
    pub fn signal(&mut self, signal: nix::sys::signal::Signal) -> bool {
        use nix::sys::signal::kill;
        use nix::unistd::Pid;

        // A reaped child must not be signaled: its pid may belong to someone else now.
        if self.child.id().is_none() {
            return false;
        }
        match self.pid {
            Some(pid) => kill(Pid::from_raw(pid as i32), signal).is_ok(),
            None => false,
        }
    }

    /// Forcefully kills the child (SIGKILL). Best-effort.
    pub fn kill(&mut self) -> bool {
        self.child.start_kill().is_ok()
    }
}

/// Starts child processes for the master.
pub trait Launch: Send + Sync + 'static {
    /// Starts one child for `role`. Must not block.
    fn launch(&self, role: Role) -> Result<ProcessRecord, SpawnError>;
}

/// Default launcher: runs a program with the role in its environment.
#[derive(Clone, Debug, Default)]
pub struct ExecLauncher {
    program: Option<PathBuf>,
    args: Vec<OsString>,
    envs: Vec<(String, String)>,
    quiet: bool,
}

impl ExecLauncher {
    /// Re-invokes the current executable (resolved at each launch).
    pub fn current_exe() -> Self {
        Self::default()
    }

    /// Runs `program` instead of the current executable.
    pub fn new(program: impl Into<PathBuf>) -> Self {
        Self {
            program: Some(program.into()),
            ..Self::default()
        }
    }

    /// Appends an argument passed to every child.
    pub fn arg(mut self, arg: impl Into<OsString>) -> Self {
        self.args.push(arg.into());
        self
    }

    /// Adds an environment variable passed to every child.
    pub fn env(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.envs.push((key.into(), value.into()));
        self
    }

    /// Discards the children's stdout/stderr instead of inheriting them.
    pub fn quiet(mut self) -> Self {
        self.quiet = true;
        self
    }

    fn program(&self) -> Result<PathBuf, SpawnError> {
        match &self.program {
            Some(p) => Ok(p.clone()),
            None => std::env::current_exe().map_err(SpawnError::CurrentExe),
        }
    }
}

impl Launch for ExecLauncher {
    fn launch(&self, role: Role) -> Result<ProcessRecord, SpawnError> {
        let encoded = role
            .to_env_value()
            .map_err(|source| SpawnError::EncodeRole { role, source })?;

        let mut launch_env = self.envs.clone();
        launch_env.push((ROLE_ENV.to_string(), encoded));

        let mut cmd = Command::new(self.program()?);
        cmd.args(&self.args)
            .envs(launch_env.iter().map(|(k, v)| (k.as_str(), v.as_str())))
            .stdin(Stdio::null());
        if self.quiet {
            cmd.stdout(Stdio::null()).stderr(Stdio::null());
        }

        let child = cmd
            .spawn()
            .map_err(|source| SpawnError::Exec { role, source })?;
        Ok(ProcessRecord::new(role, child, launch_env))
    }
}

#[cfg(all(test, unix))]
mod tests {
    use std::time::Duration;

    use super::*;

    #[tokio::test]
    async fn role_is_passed_through_the_environment() {
        let launcher = ExecLauncher::new("sh")
            .arg("-c")
            .arg(format!("test \"${ROLE_ENV}\" = '{{\"type\":\"worker\",\"group_id\":4}}'"))
            .quiet();

        let mut record = launcher.launch(Role::Worker { group_id: 4 }).unwrap();
        assert_eq!(record.group_id(), Some(4));
        assert!(record.launch_env().iter().any(|(k, _)| k == ROLE_ENV));

        let status = record.child.wait().await.unwrap();
        assert!(status.success());
    }

    #[tokio::test]
    async fn missing_program_is_a_spawn_error() {
        let launcher = ExecLauncher::new("/nonexistent/procvisor-child");
        let err = launcher.launch(Role::Proxy).unwrap_err();
        assert_eq!(err.as_label(), "spawn_exec");
    }

    #[tokio::test]
    async fn terminate_then_poll_reports_exit() {
        let mut record = ExecLauncher::new("sleep").arg("30").launch(Role::Proxy).unwrap();
        assert!(record.poll_exit().is_none());
        assert!(record.terminate());

        let mut exited = None;
        for _ in 0..50 {
            exited = record.poll_exit();
            if exited.is_some() {
                break;
            }
            tokio::time::sleep(Duration::from_millis(20)).await;
        }
        assert!(exited.is_some());
        assert!(!record.terminate(), "reaped child must not be signaled");
    }

    #[test]
    fn record_ids_are_unique() {
        assert_ne!(RecordId::next(), RecordId::next());
    }
}
