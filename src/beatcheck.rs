//! Beat checker: periodically checks a child's status file mtime and
//! writes a RESTART message if it's gone stale.
//!
//! Grounded on `original_source/ncolony/beatcheck.py`'s `check()`/`_isbad()`:
//! the reference time is `max(spec-file mtime, checker start time)`; while
//! `now < reference + period*grace` the name is still in its startup grace
//! window and is skipped. Once a status file exists, the ongoing staleness
//! check is plain `statusMtime + period < now` — `grace` does not apply a
//! second time.

use std::path::{Path, PathBuf};
use std::time::Duration;

use serde_json::Value;
use tokio::time::Instant;

use crate::message::{self, Message};

#[derive(Debug, Clone)]
pub struct BeatCheckConfig {
    pub status_path: PathBuf,
    pub period: Duration,
    pub grace: f64,
}

impl BeatCheckConfig {
    /// Parse from a `beatcheck` extension object. A relative `status`
    /// resolves against `config_dir` — the directory holding the spec file
    /// itself, the same place `original_source`'s `child.clonePath` does it
    /// from — not the messages directory.
    pub fn from_json(value: &Value, config_dir: &Path) -> Option<Self> {
        let status = value.get("status")?.as_str()?;
        let period_secs = value.get("period")?.as_f64()?;
        let grace = value.get("grace")?.as_f64()?;
        let status_path = if Path::new(status).is_absolute() {
            PathBuf::from(status)
        } else {
            config_dir.join(status)
        };
        Some(Self {
            status_path,
            period: Duration::from_secs_f64(period_secs),
            grace,
        })
    }

    /// The file a child with this config is expected to touch: `status_path`
    /// itself, or `status_path/<name>` if `status_path` names a directory.
    pub async fn effective_status_path(&self, name: &str) -> PathBuf {
        match tokio::fs::metadata(&self.status_path).await {
            Ok(meta) if meta.is_dir() => self.status_path.join(name),
            _ => self.status_path.clone(),
        }
    }
}

/// One beat-check evaluation for a single name. `started_at` is the
/// checker process's own start time, shared across every name it watches —
/// it's the floor of the startup grace window for names whose spec file is
/// older than the checker itself.
pub struct BeatChecker {
    config: BeatCheckConfig,
    started_at: Instant,
}

impl BeatChecker {
    pub fn new(config: BeatCheckConfig, started_at: Instant) -> Self {
        Self { config, started_at }
    }

    pub fn config(&self) -> &BeatCheckConfig {
        &self.config
    }

    /// `spec_age` is how long ago the spec file was last modified.
    /// `status_mtime_age` is how long ago the status file was last
    /// modified, or `None` if it doesn't exist.
    pub fn is_stale(
        &self,
        now: Instant,
        spec_age: Duration,
        status_mtime_age: Option<Duration>,
    ) -> bool {
        let since_started = now.saturating_duration_since(self.started_at);
        let reference_age = spec_age.min(since_started);
        let grace_window = self.config.period.mul_f64(self.config.grace);
        if reference_age < grace_window {
            return false;
        }
        match status_mtime_age {
            None => true,
            Some(age) => age >= self.config.period,
        }
    }

    /// Run one check and, if stale, write a RESTART message for `name`
    /// into `messages_dir`.
    pub async fn check_and_restart(
        &self,
        name: &str,
        now: Instant,
        spec_age: Duration,
        status_mtime_age: Option<Duration>,
        messages_dir: &Path,
    ) -> std::io::Result<bool> {
        if !self.is_stale(now, spec_age, status_mtime_age) {
            return Ok(false);
        }
        message::write_message(messages_dir, &Message::Restart { name: name.to_string() }).await?;
        Ok(true)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn config() -> BeatCheckConfig {
        BeatCheckConfig {
            status_path: PathBuf::from("/tmp/status"),
            period: Duration::from_secs(10),
            grace: 2.0,
        }
    }

    #[test]
    fn still_in_grace_window_is_never_stale() {
        let checker = BeatChecker::new(config(), Instant::now());
        // reference age 5s < period*grace (20s)
        assert!(!checker.is_stale(Instant::now(), Duration::from_secs(5), None));
    }

    #[test]
    fn past_grace_with_no_status_file_is_stale() {
        let checker = BeatChecker::new(config(), Instant::now());
        assert!(checker.is_stale(Instant::now(), Duration::from_secs(25), None));
    }

    #[test]
    fn ongoing_check_uses_plain_period_not_period_times_grace() {
        let checker = BeatChecker::new(config(), Instant::now());
        // past grace (25s), status file exists and is 15s old: period is 10s,
        // so 15s stale by plain period even though period*grace (20s) would
        // call it fresh.
        assert!(checker.is_stale(
            Instant::now(),
            Duration::from_secs(25),
            Some(Duration::from_secs(15))
        ));
    }

    #[test]
    fn fresh_status_file_past_grace_is_not_stale() {
        let checker = BeatChecker::new(config(), Instant::now());
        assert!(!checker.is_stale(
            Instant::now(),
            Duration::from_secs(25),
            Some(Duration::from_secs(3))
        ));
    }

    #[test]
    fn from_json_resolves_bare_status_against_config_dir() {
        let dir = Path::new("/var/ward/config");
        let value = serde_json::json!({"status": "myproc", "period": 10, "grace": 3});
        let config = BeatCheckConfig::from_json(&value, dir).unwrap();
        assert_eq!(config.status_path, dir.join("myproc"));
        assert_eq!(config.grace, 3.0);
    }

    #[test]
    fn from_json_keeps_absolute_status_as_is() {
        let dir = Path::new("/var/ward/config");
        let value = serde_json::json!({"status": "/var/run/myproc.beat", "period": 10, "grace": 2});
        let config = BeatCheckConfig::from_json(&value, dir).unwrap();
        assert_eq!(config.status_path, PathBuf::from("/var/run/myproc.beat"));
    }

    #[tokio::test]
    async fn effective_status_path_appends_name_for_a_directory() {
        let dir = tempfile::tempdir().unwrap();
        let config = BeatCheckConfig {
            status_path: dir.path().to_path_buf(),
            period: Duration::from_secs(10),
            grace: 2.0,
        };
        assert_eq!(
            config.effective_status_path("svc").await,
            dir.path().join("svc")
        );
    }
}
