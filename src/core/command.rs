//! # Admin commands relayed by the proxy.
//!
//! The proxy forwards operator requests to the master as newline-delimited JSON frames:
//!
//! ```text
//! {"cmd":"ADMIN_CHANGE","body":{"group_id":1,"count":4}}   → ChangeGroupConfig
//! {"cmd":"ADMIN_RELOAD","body":{}}                         → Reload
//! {"cmd":"ADMIN_STOP"}                                     → Stop
//! {"cmd":"MASTER_REPLACE_WORKERS"}                         → ConfirmWorkersSwapped
//! ```
//!
//! The master consumes only [`AdminCommand`]; framing lives in the admin link.

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::error::DecodeError;

const CMD_CHANGE: &str = "ADMIN_CHANGE";
const CMD_RELOAD: &str = "ADMIN_RELOAD";
const CMD_STOP: &str = "ADMIN_STOP";
const CMD_REPLACE_WORKERS: &str = "MASTER_REPLACE_WORKERS";

/// A decoded admin request.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum AdminCommand {
    /// Resize a worker group, then reload so the new size takes effect.
    ChangeGroupConfig { group_id: u32, count: usize },
    /// Start a hot reload.
    Reload,
    /// Graceful stop of the whole supervisor.
    Stop,
    /// The proxy stopped routing to the old workers; the swap may proceed.
    ConfirmWorkersSwapped,
}

#[derive(Serialize, Deserialize)]
struct Frame<B = Value> {
    cmd: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    body: Option<B>,
}

#[derive(Serialize, Deserialize)]
struct ChangeBody {
    #[serde(alias = "id")]
    group_id: u32,
    count: usize,
}

impl AdminCommand {
    /// Decodes one frame (without the trailing newline).
    pub fn decode(line: &str) -> Result<Self, DecodeError> {
        let frame: Frame = serde_json::from_str(line)?;
        match frame.cmd.as_str() {
            CMD_CHANGE => {
                let body = frame
                    .body
                    .filter(|b| !b.is_null())
                    .ok_or(DecodeError::MissingBody(CMD_CHANGE))?;
                let ChangeBody { group_id, count } = serde_json::from_value(body)?;
                Ok(AdminCommand::ChangeGroupConfig { group_id, count })
            }
            CMD_RELOAD => Ok(AdminCommand::Reload),
            CMD_STOP => Ok(AdminCommand::Stop),
            CMD_REPLACE_WORKERS => Ok(AdminCommand::ConfirmWorkersSwapped),
            _ => Err(DecodeError::UnknownCommand(frame.cmd)),
        }
    }

    /// Encodes the command as one frame (without the trailing newline).
    pub fn encode(&self) -> String {
        let (cmd, body) = match *self {
            AdminCommand::ChangeGroupConfig { group_id, count } => {
                (CMD_CHANGE, Some(ChangeBody { group_id, count }))
            }
            AdminCommand::Reload => (CMD_RELOAD, None),
            AdminCommand::Stop => (CMD_STOP, None),
            AdminCommand::ConfirmWorkersSwapped => (CMD_REPLACE_WORKERS, None),
        };
        let frame = Frame {
            cmd: cmd.to_string(),
            body,
        };
        serde_json::to_string(&frame).unwrap_or_default()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn decodes_every_command() {
        assert_eq!(
            AdminCommand::decode(r#"{"cmd":"ADMIN_CHANGE","body":{"group_id":1,"count":4}}"#).unwrap(),
            AdminCommand::ChangeGroupConfig { group_id: 1, count: 4 }
        );
        assert_eq!(
            AdminCommand::decode(r#"{"cmd":"ADMIN_RELOAD","body":{}}"#).unwrap(),
            AdminCommand::Reload
        );
        assert_eq!(AdminCommand::decode(r#"{"cmd":"ADMIN_STOP"}"#).unwrap(), AdminCommand::Stop);
        assert_eq!(
            AdminCommand::decode(r#"{"cmd":"MASTER_REPLACE_WORKERS","body":null}"#).unwrap(),
            AdminCommand::ConfirmWorkersSwapped
        );
    }

    #[test]
    fn change_accepts_id_alias() {
        assert_eq!(
            AdminCommand::decode(r#"{"cmd":"ADMIN_CHANGE","body":{"id":2,"count":0}}"#).unwrap(),
            AdminCommand::ChangeGroupConfig { group_id: 2, count: 0 }
        );
    }

    #[test]
    fn change_without_body_is_rejected() {
        let err = AdminCommand::decode(r#"{"cmd":"ADMIN_CHANGE"}"#).unwrap_err();
        assert!(matches!(err, DecodeError::MissingBody("ADMIN_CHANGE")));
    }

    #[test]
    fn unknown_and_malformed_frames_are_rejected() {
        assert!(matches!(
            AdminCommand::decode(r#"{"cmd":"ADMIN_DANCE"}"#),
            Err(DecodeError::UnknownCommand(cmd)) if cmd == "ADMIN_DANCE"
        ));
        assert!(matches!(AdminCommand::decode("not json"), Err(DecodeError::Json(_))));
        assert!(matches!(
            AdminCommand::decode(r#"{"cmd":"ADMIN_CHANGE","body":{"group_id":-1,"count":2}}"#),
            Err(DecodeError::Json(_))
        ));
    }

    #[test]
    fn encode_produces_decodable_frames() {
        let cmd = AdminCommand::ChangeGroupConfig { group_id: 3, count: 5 };
        assert_eq!(
            cmd.encode(),
            r#"{"cmd":"ADMIN_CHANGE","body":{"group_id":3,"count":5}}"#
        );
        assert_eq!(AdminCommand::Stop.encode(), r#"{"cmd":"ADMIN_STOP"}"#);
    }

    #[test]
    fn encoded_frames_decode_back() {
        for cmd in [
            AdminCommand::ChangeGroupConfig { group_id: 9, count: 0 },
            AdminCommand::Reload,
            AdminCommand::Stop,
            AdminCommand::ConfirmWorkersSwapped,
        ] {
            assert_eq!(AdminCommand::decode(&cmd.encode()).unwrap(), cmd);
        }
    }
}
