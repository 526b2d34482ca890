//! Error types used by the procvisor runtime.
//!
//! - [`RuntimeError`]: failures of the master itself (the only fatal ones).
//! - [`SpawnError`]: a child could not be started; recovered by the next monitor tick.
//! - [`DecodeError`]: an admin frame could not be turned into an [`AdminCommand`](crate::AdminCommand).
//! - [`GroupChangeError`]: a group resize was refused; no reload follows.
//! - [`HandleError`]: a [`MasterHandle`](crate::MasterHandle) outlived its master.
//!
//! Each type provides `as_label` for stable snake_case labels in logs/metrics.

use thiserror::Error;

use crate::core::Role;

/// Errors produced by the master runtime.
#[non_exhaustive]
#[derive(Error, Debug)]
pub enum RuntimeError {
    /// OS signal handlers could not be installed.
    #[error("failed to install signal handlers: {0}")]
    Signals(#[source] std::io::Error),
}

impl RuntimeError {
    /// Returns a short stable label (snake_case) for use in logs/metrics.
    ///
    /// # Example
    /// ```
    /// use procvisor::RuntimeError;
    ///
    /// let err = RuntimeError::Signals(std::io::Error::other("no signal driver"));
    /// assert_eq!(err.as_label(), "runtime_signals");
    /// ```
    pub fn as_label(&self) -> &'static str {
        match self {
            RuntimeError::Signals(_) => "runtime_signals",
        }
    }
}

/// Errors produced while launching a child process.
#[non_exhaustive]
#[derive(Error, Debug)]
pub enum SpawnError {
    /// The program to re-invoke could not be determined.
    #[error("cannot resolve current executable: {0}")]
    CurrentExe(#[source] std::io::Error),

    /// The role descriptor could not be serialized into the environment.
    #[error("cannot encode role {role}: {source}")]
    EncodeRole {
        role: Role,
        #[source]
        source: serde_json::Error,
    },

    /// The OS refused to start the process.
    #[error("exec failed for {role}: {source}")]
    Exec {
        role: Role,
        #[source]
        source: std::io::Error,
    },

    /// The launcher refused because the master is disabled.
    #[error("master is disabled; refusing to spawn {0}")]
    Disabled(Role),
}

impl SpawnError {
    /// Returns a short stable label (snake_case) for use in logs/metrics.
    pub fn as_label(&self) -> &'static str {
        match self {
            SpawnError::CurrentExe(_) => "spawn_current_exe",
            SpawnError::EncodeRole { .. } => "spawn_encode_role",
            SpawnError::Exec { .. } => "spawn_exec",
            SpawnError::Disabled(_) => "spawn_disabled",
        }
    }
}

/// Errors produced while decoding an admin frame.
#[non_exhaustive]
#[derive(Error, Debug)]
pub enum DecodeError {
    /// The frame is not valid JSON or does not match the expected shape.
    #[error("malformed frame: {0}")]
    Json(#[from] serde_json::Error),

    /// The `cmd` discriminator is not one the master handles.
    #[error("unknown command {0:?}")]
    UnknownCommand(String),

    /// The command requires a body that is absent.
    #[error("command {0} requires a body")]
    MissingBody(&'static str),
}

impl DecodeError {
    /// Returns a short stable label (snake_case) for use in logs/metrics.
    pub fn as_label(&self) -> &'static str {
        match self {
            DecodeError::Json(_) => "decode_json",
            DecodeError::UnknownCommand(_) => "decode_unknown_command",
            DecodeError::MissingBody(_) => "decode_missing_body",
        }
    }
}

/// Errors produced while applying a worker group change.
#[non_exhaustive]
#[derive(Error, Debug, Clone, Copy, PartialEq, Eq)]
pub enum GroupChangeError {
    /// No group with this id is configured.
    #[error("unknown worker group {0}")]
    UnknownGroup(u32),

    /// The master is stopping; configuration is frozen.
    #[error("master is disabled")]
    Disabled,
}

impl GroupChangeError {
    /// Returns a short stable label (snake_case) for use in logs/metrics.
    pub fn as_label(&self) -> &'static str {
        match self {
            GroupChangeError::UnknownGroup(_) => "group_unknown",
            GroupChangeError::Disabled => "group_disabled",
        }
    }
}

/// Errors returned by [`MasterHandle`](crate::MasterHandle) calls.
#[non_exhaustive]
#[derive(Error, Debug, Clone, Copy, PartialEq, Eq)]
pub enum HandleError {
    /// The master loop has exited.
    #[error("master is gone")]
    Closed,

    /// The group change was refused.
    #[error(transparent)]
    GroupChange(#[from] GroupChangeError),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn labels_are_stable() {
        let err = SpawnError::Exec {
            role: Role::Proxy,
            source: std::io::Error::from(std::io::ErrorKind::NotFound),
        };
        assert_eq!(err.as_label(), "spawn_exec");
        assert_eq!(GroupChangeError::UnknownGroup(9).as_label(), "group_unknown");
        assert_eq!(DecodeError::MissingBody("ADMIN_CHANGE").as_label(), "decode_missing_body");
    }

    #[test]
    fn messages_name_the_role() {
        let err = SpawnError::Disabled(Role::Worker { group_id: 2 });
        assert_eq!(err.to_string(), "master is disabled; refusing to spawn worker(2)");
    }
}
