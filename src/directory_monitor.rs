//! Directory monitors: polling loops that diff a directory's contents
//! against what was seen on the previous tick and report the difference to
//! a sink. Polling, not a filesystem-notification API, is deliberate here —
//! see SPEC_FULL.md's redesign notes on portability over low latency.
//!
//! Grounded on `original_source/ncolony/directory_monitor.py`:
//! `checker()` diffs a config directory (added / removed / changed, where a
//! changed file is reported as a remove followed by an add) and
//! `messages()` drains a messages directory (read then delete, oldest
//! filename first).

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

use crate::error::DirectoryError;

/// Receives the result of diffing a config directory against its previous
/// contents. Implemented by the event receiver; a trait so the monitor
/// itself stays ignorant of group indexing and whitelist filtering.
pub trait DirSink: Send {
    fn add(&mut self, name: &str, raw: &[u8]);
    fn remove(&mut self, name: &str);
}

/// Receives drained message files, oldest (lowest filename) first.
pub trait MessageSink: Send {
    fn message(&mut self, raw: &[u8]);
}

fn is_hidden_or_tmp(file_name: &str) -> bool {
    file_name.starts_with('.') || file_name.ends_with(".new")
}

async fn list_visible_files(dir: &Path) -> Result<BTreeMap<String, PathBuf>, DirectoryError> {
    let mut out = BTreeMap::new();
    let mut entries =
        tokio::fs::read_dir(dir)
            .await
            .map_err(|source| DirectoryError::ReadFailed {
                path: dir.to_path_buf(),
                source,
            })?;

    loop {
        let entry = entries
            .next_entry()
            .await
            .map_err(|source| DirectoryError::ReadFailed {
                path: dir.to_path_buf(),
                source,
            })?;
        let Some(entry) = entry else { break };
        let file_name = entry.file_name();
        let Some(file_name) = file_name.to_str() else {
            continue;
        };
        if is_hidden_or_tmp(file_name) {
            continue;
        }
        out.insert(file_name.to_string(), entry.path());
    }
    Ok(out)
}

/// Polls a configuration directory, reporting the diff against the
/// previous tick to `sink`. A file's content hash (its raw bytes) is kept
/// alongside the path so an in-place edit is detected as a change, not
/// just an add/remove of the path.
pub struct ConfigMonitor {
    location: PathBuf,
    seen: BTreeMap<String, Vec<u8>>,
}

impl ConfigMonitor {
    pub fn new(location: impl Into<PathBuf>) -> Self {
        Self {
            location: location.into(),
            seen: BTreeMap::new(),
        }
    }

    /// Run one poll: read the directory, diff against what was seen last
    /// time, and report removed names before added/changed ones (a changed
    /// file is reported as both, in that order) so the receiver never
    /// briefly double-owns a name.
    pub async fn poll(&mut self, sink: &mut dyn DirSink) -> Result<(), DirectoryError> {
        let current = list_visible_files(&self.location).await?;

        let mut current_contents = BTreeMap::new();
        for (name, path) in &current {
            match tokio::fs::read(path).await {
                Ok(bytes) => {
                    current_contents.insert(name.clone(), bytes);
                }
                Err(_) => {
                    // file vanished between listing and reading; treat as absent this tick
                }
            }
        }

        let removed: Vec<String> = self
            .seen
            .keys()
            .filter(|name| !current_contents.contains_key(*name))
            .cloned()
            .collect();
        for name in &removed {
            sink.remove(name);
        }

        let mut added_or_changed: Vec<(String, Vec<u8>)> = Vec::new();
        for (name, bytes) in &current_contents {
            match self.seen.get(name) {
                Some(prev) if prev == bytes => {}
                Some(_) => {
                    sink.remove(name);
                    added_or_changed.push((name.clone(), bytes.clone()));
                }
                None => added_or_changed.push((name.clone(), bytes.clone())),
            }
        }
        for (name, bytes) in &added_or_changed {
            sink.add(name, bytes);
        }

        self.seen = current_contents;
        Ok(())
    }
}

/// Polls a messages directory: every visible file is drained (reported to
/// the sink, oldest filename first, then deleted) on each tick. Producers
/// write with a `.new` suffix and rename into place, so a file that's still
/// mid-write is simply invisible to `list_visible_files` until the rename
/// completes.
pub struct MessageMonitor {
    location: PathBuf,
}

impl MessageMonitor {
    pub fn new(location: impl Into<PathBuf>) -> Self {
        Self {
            location: location.into(),
        }
    }

    pub async fn poll(&mut self, sink: &mut dyn MessageSink) -> Result<(), DirectoryError> {
        let current = list_visible_files(&self.location).await?;
        for (_name, path) in current {
            let Ok(bytes) = tokio::fs::read(&path).await else {
                continue;
            };
            sink.message(&bytes);
            tokio::fs::remove_file(&path)
                .await
                .map_err(|source| DirectoryError::DeleteFailed { path, source })?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[derive(Default)]
    struct RecordingSink {
        added: Vec<(String, Vec<u8>)>,
        removed: Vec<String>,
    }

    impl DirSink for RecordingSink {
        fn add(&mut self, name: &str, raw: &[u8]) {
            self.added.push((name.to_string(), raw.to_vec()));
        }
        fn remove(&mut self, name: &str) {
            self.removed.push(name.to_string());
        }
    }

    #[derive(Default)]
    struct RecordingMessageSink {
        messages: Vec<Vec<u8>>,
    }

    impl MessageSink for RecordingMessageSink {
        fn message(&mut self, raw: &[u8]) {
            self.messages.push(raw.to_vec());
        }
    }

    #[tokio::test]
    async fn first_poll_reports_all_files_as_added() {
        let dir = tempfile::tempdir().unwrap();
        tokio::fs::write(dir.path().join("a"), b"1").await.unwrap();
        tokio::fs::write(dir.path().join("b"), b"2").await.unwrap();

        let mut monitor = ConfigMonitor::new(dir.path());
        let mut sink = RecordingSink::default();
        monitor.poll(&mut sink).await.unwrap();

        assert_eq!(sink.added.len(), 2);
        assert!(sink.removed.is_empty());
    }

    #[tokio::test]
    async fn unchanged_file_is_not_reported_again() {
        let dir = tempfile::tempdir().unwrap();
        tokio::fs::write(dir.path().join("a"), b"1").await.unwrap();

        let mut monitor = ConfigMonitor::new(dir.path());
        let mut sink = RecordingSink::default();
        monitor.poll(&mut sink).await.unwrap();
        monitor.poll(&mut sink).await.unwrap();

        assert_eq!(sink.added.len(), 1);
    }

    #[tokio::test]
    async fn removed_file_is_reported_as_remove() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("a");
        tokio::fs::write(&path, b"1").await.unwrap();

        let mut monitor = ConfigMonitor::new(dir.path());
        let mut sink = RecordingSink::default();
        monitor.poll(&mut sink).await.unwrap();

        tokio::fs::remove_file(&path).await.unwrap();
        monitor.poll(&mut sink).await.unwrap();

        assert_eq!(sink.removed, vec!["a".to_string()]);
    }

    #[tokio::test]
    async fn changed_file_is_reported_as_remove_then_add() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("a");
        tokio::fs::write(&path, b"1").await.unwrap();

        let mut monitor = ConfigMonitor::new(dir.path());
        let mut sink = RecordingSink::default();
        monitor.poll(&mut sink).await.unwrap();

        tokio::fs::write(&path, b"2").await.unwrap();
        monitor.poll(&mut sink).await.unwrap();

        assert_eq!(sink.removed, vec!["a".to_string()]);
        assert_eq!(sink.added.last().unwrap().1, b"2");
    }

    #[tokio::test]
    async fn dotfiles_and_new_suffix_are_ignored() {
        let dir = tempfile::tempdir().unwrap();
        tokio::fs::write(dir.path().join(".hidden"), b"x")
            .await
            .unwrap();
        tokio::fs::write(dir.path().join("partial.new"), b"x")
            .await
            .unwrap();

        let mut monitor = ConfigMonitor::new(dir.path());
        let mut sink = RecordingSink::default();
        monitor.poll(&mut sink).await.unwrap();

        assert!(sink.added.is_empty());
    }

    #[tokio::test]
    async fn message_monitor_drains_and_deletes() {
        let dir = tempfile::tempdir().unwrap();
        tokio::fs::write(dir.path().join("001Message.1"), b"hi")
            .await
            .unwrap();

        let mut monitor = MessageMonitor::new(dir.path());
        let mut sink = RecordingMessageSink::default();
        monitor.poll(&mut sink).await.unwrap();

        assert_eq!(sink.messages, vec![b"hi".to_vec()]);
        let mut entries = tokio::fs::read_dir(dir.path()).await.unwrap();
        assert!(entries.next_entry().await.unwrap().is_none());
    }
}
