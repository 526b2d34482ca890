//! # Child role protocol.
//!
//! Every child is the same executable as the master. What it should become is passed in
//! the [`ROLE_ENV`] environment variable as JSON:
//!
//! ```text
//! PROCVISOR_ROLE={"type":"proxy"}
//! PROCVISOR_ROLE={"type":"worker","group_id":1}
//! ```
//!
//! The master only writes this variable; [`Role::from_env`] is the child side.

use std::fmt;

use serde::{Deserialize, Serialize};

/// Environment variable carrying the serialized [`Role`].
pub const ROLE_ENV: &str = "PROCVISOR_ROLE";

/// What a child process is launched as.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum Role {
    /// The single front-facing process routing requests to workers.
    Proxy,
    /// An application worker belonging to a group.
    Worker {
        /// Group the worker was launched for.
        group_id: u32,
    },
}

impl Role {
    /// Serializes the role into the value stored under [`ROLE_ENV`].
    pub fn to_env_value(&self) -> Result<String, serde_json::Error> {
        serde_json::to_string(self)
    }

    /// Parses a value previously produced by [`Role::to_env_value`].
    pub fn from_env_value(value: &str) -> Result<Self, serde_json::Error> {
        serde_json::from_str(value)
    }

    /// Reads the role of the current process.
    ///
    /// Returns `Ok(None)` when the variable is absent, meaning this process is the master.
    pub fn from_env() -> Result<Option<Self>, serde_json::Error> {
        match std::env::var(ROLE_ENV) {
            Ok(value) => Self::from_env_value(&value).map(Some),
            Err(_) => Ok(None),
        }
    }

    /// Group id for workers, `None` for the proxy.
    pub fn group_id(&self) -> Option<u32> {
        match self {
            Role::Proxy => None,
            Role::Worker { group_id } => Some(*group_id),
        }
    }
}

impl fmt::Display for Role {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Role::Proxy => f.write_str("proxy"),
            Role::Worker { group_id } => write!(f, "worker({group_id})"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn wire_shape_matches_child_protocol() {
        assert_eq!(Role::Proxy.to_env_value().unwrap(), r#"{"type":"proxy"}"#);
        assert_eq!(
            Role::Worker { group_id: 3 }.to_env_value().unwrap(),
            r#"{"type":"worker","group_id":3}"#
        );
    }

    #[test]
    fn parses_what_it_writes() {
        let role = Role::Worker { group_id: 12 };
        let value = role.to_env_value().unwrap();
        assert_eq!(Role::from_env_value(&value).unwrap(), role);
    }

    #[test]
    fn rejects_unknown_types() {
        assert!(Role::from_env_value(r#"{"type":"scheduler"}"#).is_err());
        assert!(Role::from_env_value(r#"{"type":"worker"}"#).is_err());
    }
}
