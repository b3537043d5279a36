//! Child-side heartbeat helper: a supervised process links this in (or its
//! `main.rs` calls `install()` once at startup) to touch the status path
//! the operator configured, at a fraction of the `beatcheck` period, so the
//! supervisor's `BeatChecker` sees it as alive.
//!
//! Grounded on `original_source/ncolony/heart.py` (`Heart.beat`, touching
//! every `period / 3`) and `original_source/ncolony/client/heart.py`
//! (`makeService`: read `NCOLONY_CONFIG`, pull the `ncolony.beatcheck`
//! section, resolve `status` against `NCOLONY_NAME` if it names a
//! directory).

use std::path::{Path, PathBuf};
use std::time::Duration;

use crate::process_spec::{NCOLONY_CONFIG, NCOLONY_NAME};

/// A running heartbeat task. Dropping this cancels it.
pub struct HeartbeatHandle {
    task: tokio::task::JoinHandle<()>,
}

impl HeartbeatHandle {
    pub fn abort(&self) {
        self.task.abort();
    }
}

impl Drop for HeartbeatHandle {
    fn drop(&mut self) {
        self.task.abort();
    }
}

/// Read `NCOLONY_CONFIG`/`NCOLONY_NAME` from the environment and, if a
/// `beatcheck` extension is present, spawn a task that touches the
/// configured status path every `period / 3`. Returns `None` if there's no
/// beatcheck extension to honor (not an error: most children don't have one).
pub fn install() -> Option<HeartbeatHandle> {
    let config_json = std::env::var(NCOLONY_CONFIG).ok()?;
    let value: serde_json::Value = serde_json::from_str(&config_json).ok()?;
    let params = value.as_object()?.get("beatcheck")?;
    let status = params.get("status")?.as_str()?;
    let period_secs = params.get("period")?.as_f64()?;
    let period = Duration::from_secs_f64(period_secs);

    let name = std::env::var(NCOLONY_NAME).ok();
    let status_path = PathBuf::from(status);

    let task = tokio::spawn(async move {
        let status_path = resolve_status_path(&status_path, name.as_deref()).await;
        if let Err(err) = run(status_path, period).await {
            error!("heartbeat: failed to touch status file: {err}");
        }
    });
    Some(HeartbeatHandle { task })
}

/// `status` resolved the way `client/heart.py` does: if it names a
/// directory, the file actually touched is `status/<NCOLONY_NAME>`.
async fn resolve_status_path(status: &Path, name: Option<&str>) -> PathBuf {
    match tokio::fs::metadata(status).await {
        Ok(meta) if meta.is_dir() => match name {
            Some(name) => status.join(name),
            None => status.to_path_buf(),
        },
        _ => status.to_path_buf(),
    }
}

/// Touches `status_path` every `period / 3` until cancelled by dropping the
/// returned `HeartbeatHandle`. A period of zero touches as fast as the loop
/// can run, which is never a sane config but is not this function's job to
/// reject.
pub async fn run(status_path: PathBuf, period: Duration) -> std::io::Result<()> {
    let interval = period.checked_div(3).unwrap_or(Duration::from_secs(1));
    loop {
        touch(&status_path).await?;
        tokio::time::sleep(interval).await;
    }
}

async fn touch(path: &Path) -> std::io::Result<()> {
    // filetime semantics aren't portable through tokio::fs; a rewrite bumps
    // mtime just as well and status files are tiny.
    tokio::fs::write(path, b"").await
}
