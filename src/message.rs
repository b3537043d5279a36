//! Messages — one-shot commands dropped into the messages directory by
//! `wardctl` and drained by the supervisor's message monitor.
//!
//! Grounded on `original_source/ncolony/ctllib.py` (`_addMessage`, the
//! `%03dMessage.<pid>` filename convention) and
//! `original_source/ncolony/process_events.py` (the message JSON shape).

use std::path::Path;
use std::sync::atomic::{AtomicU32, Ordering};

use serde_json::Value;

use crate::error::MessageError;

/// The three message kinds the supervisor understands.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Message {
    Restart { name: String },
    RestartAll,
    RestartGroup { group: String },
}

impl Message {
    pub fn parse(raw: &[u8]) -> Result<Self, MessageError> {
        let value: Value =
            serde_json::from_slice(raw).map_err(|source| MessageError::MalformedJson { source })?;

        let type_ = value
            .get("type")
            .and_then(Value::as_str)
            .unwrap_or_default();

        match type_ {
            "RESTART" => {
                let name = value
                    .get("name")
                    .and_then(Value::as_str)
                    .ok_or(MessageError::MissingName)?;
                Ok(Message::Restart {
                    name: name.to_string(),
                })
            }
            "RESTART-ALL" => Ok(Message::RestartAll),
            "RESTART-GROUP" => {
                let group = value
                    .get("group")
                    .and_then(Value::as_str)
                    .ok_or(MessageError::MissingGroup)?;
                Ok(Message::RestartGroup {
                    group: group.to_string(),
                })
            }
            other => Err(MessageError::UnknownType {
                type_: other.to_string(),
            }),
        }
    }

    pub fn to_json(&self) -> Value {
        match self {
            Message::Restart { name } => serde_json::json!({"type": "RESTART", "name": name}),
            Message::RestartAll => serde_json::json!({"type": "RESTART-ALL"}),
            Message::RestartGroup { group } => {
                serde_json::json!({"type": "RESTART-GROUP", "group": group})
            }
        }
    }
}

/// Per-process monotonic counter used to build unique message filenames.
/// Restarting the process resets it, which is fine: uniqueness only needs
/// to hold within one producer's pid, per the `%03dMessage.<pid>` scheme.
static COUNTER: AtomicU32 = AtomicU32::new(0);

/// Build the filename for the next message from this process: a
/// three-digit zero-padded counter, then `Message.`, then this process's
/// pid. Matches the producer-side convention the message monitor expects
/// (and ignores anything not shaped like it).
pub fn next_filename() -> String {
    let seq = COUNTER.fetch_add(1, Ordering::Relaxed) % 1000;
    format!("{seq:03}Message.{}", std::process::id())
}

/// Atomically write `message` into `dir`: write to a temp file, then
/// rename into place, so the message monitor's poll never observes a
/// partially-written file.
pub async fn write_message(dir: &Path, message: &Message) -> std::io::Result<()> {
    let filename = next_filename();
    let final_path = dir.join(&filename);
    let tmp_path = dir.join(format!("{filename}.new"));

    let body = serde_json::to_vec(&message.to_json())?;
    tokio::fs::write(&tmp_path, body).await?;
    tokio::fs::rename(&tmp_path, &final_path).await?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_restart() {
        let raw = br#"{"type": "RESTART", "name": "db"}"#;
        assert_eq!(
            Message::parse(raw).unwrap(),
            Message::Restart {
                name: "db".to_string()
            }
        );
    }

    #[test]
    fn parses_restart_all() {
        let raw = br#"{"type": "RESTART-ALL"}"#;
        assert_eq!(Message::parse(raw).unwrap(), Message::RestartAll);
    }

    #[test]
    fn parses_restart_group() {
        let raw = br#"{"type": "RESTART-GROUP", "group": "web"}"#;
        assert_eq!(
            Message::parse(raw).unwrap(),
            Message::RestartGroup {
                group: "web".to_string()
            }
        );
    }

    #[test]
    fn restart_without_name_is_error() {
        let raw = br#"{"type": "RESTART"}"#;
        assert!(matches!(
            Message::parse(raw).unwrap_err(),
            MessageError::MissingName
        ));
    }

    #[test]
    fn unknown_type_is_error() {
        let raw = br#"{"type": "FROB"}"#;
        assert!(matches!(
            Message::parse(raw).unwrap_err(),
            MessageError::UnknownType { .. }
        ));
    }

    #[test]
    fn filenames_are_three_digit_padded_and_pid_suffixed() {
        let name = next_filename();
        assert!(name.ends_with(&format!(".{}", std::process::id())));
        assert!(name.starts_with(char::is_numeric));
    }

    #[tokio::test]
    async fn write_message_lands_as_final_name_not_new() {
        let dir = tempfile::tempdir().unwrap();
        write_message(dir.path(), &Message::RestartAll).await.unwrap();
        let mut entries = tokio::fs::read_dir(dir.path()).await.unwrap();
        let entry = entries.next_entry().await.unwrap().unwrap();
        let name = entry.file_name().into_string().unwrap();
        assert!(!name.ends_with(".new"));
        assert!(name.contains("Message."));
    }
}
