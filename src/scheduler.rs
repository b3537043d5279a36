//! Scheduler: runs a short-lived command on a fixed period, enforcing a
//! single timeout-then-kill pair instead of supervising it as a long-lived
//! child.
//!
//! Grounded on `original_source/ncolony/schedulelib.py`'s `runProcess()`
//! (spawn, a TERM timer, a KILL timer, cancel both on exit) and
//! `jdx-pitchfork/src/procs.rs` for the line-tagged stdout/stderr logging
//! convention.

use std::process::Stdio;
use std::time::Duration;

use tokio::io::{AsyncBufReadExt, BufReader};
use tokio::process::Command;

#[derive(Debug, Clone)]
pub struct ScheduleConfig {
    pub name: String,
    pub args: Vec<String>,
    pub period: Duration,
    pub term_timeout: Duration,
    pub kill_timeout: Duration,
}

/// Run `config.args` once, logging stdout/stderr lines tagged with the
/// job's name, and enforcing the term/kill timeout pair. Does not loop;
/// the caller (`ward-scheduler`) fires this on a fixed-cadence timer and
/// does not wait for one invocation to finish before starting the next —
/// a run still alive when the next tick fires keeps running until its own
/// TERM/KILL timers reap it.
pub async fn run_once(config: &ScheduleConfig) -> std::io::Result<Option<i32>> {
    let (exe, rest) = config
        .args
        .split_first()
        .expect("scheduled job must have at least one arg");

    let mut child = Command::new(exe)
        .args(rest)
        .stdin(Stdio::null())
        .stdout(Stdio::piped())
        .stderr(Stdio::piped())
        .spawn()?;

    let stdout = child.stdout.take();
    let stderr = child.stderr.take();
    let name = config.name.clone();
    if let Some(stdout) = stdout {
        let name = name.clone();
        tokio::spawn(async move { tee_lines(&name, "out", stdout).await });
    }
    if let Some(stderr) = stderr {
        tokio::spawn(async move { tee_lines(&name, "err", stderr).await });
    }

    let wait = child.wait();
    tokio::pin!(wait);

    let status = tokio::select! {
        status = &mut wait => status?,
        _ = tokio::time::sleep(config.term_timeout) => {
            signal_term(&child);
            tokio::select! {
                status = &mut wait => status?,
                _ = tokio::time::sleep(config.kill_timeout) => {
                    signal_kill(&child);
                    wait.await?
                }
            }
        }
    };

    Ok(status.code())
}

async fn tee_lines(name: &str, stream: &str, reader: impl tokio::io::AsyncRead + Unpin) {
    let mut lines = BufReader::new(reader).lines();
    while let Ok(Some(line)) = lines.next_line().await {
        info!("[{name}:{stream}] {line}");
    }
}

#[cfg(unix)]
fn signal_term(child: &tokio::process::Child) {
    if let Some(pid) = child.id() {
        let _ = nix::sys::signal::kill(
            nix::unistd::Pid::from_raw(pid as i32),
            nix::sys::signal::Signal::SIGTERM,
        );
    }
}

#[cfg(unix)]
fn signal_kill(child: &tokio::process::Child) {
    if let Some(pid) = child.id() {
        let _ = nix::sys::signal::kill(
            nix::unistd::Pid::from_raw(pid as i32),
            nix::sys::signal::Signal::SIGKILL,
        );
    }
}

#[cfg(not(unix))]
fn signal_term(_child: &tokio::process::Child) {}
#[cfg(not(unix))]
fn signal_kill(_child: &tokio::process::Child) {}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn run_once_reports_exit_code() {
        let config = ScheduleConfig {
            name: "echo-job".to_string(),
            args: vec!["true".to_string()],
            period: Duration::from_secs(60),
            term_timeout: Duration::from_secs(5),
            kill_timeout: Duration::from_secs(5),
        };
        let code = run_once(&config).await.unwrap();
        assert_eq!(code, Some(0));
    }

    #[tokio::test]
    async fn run_once_kills_a_process_that_ignores_term() {
        let config = ScheduleConfig {
            name: "sleeper".to_string(),
            args: vec!["sleep".to_string(), "30".to_string()],
            period: Duration::from_secs(60),
            term_timeout: Duration::from_millis(20),
            kill_timeout: Duration::from_millis(20),
        };
        let code = run_once(&config).await.unwrap();
        assert_ne!(code, Some(0));
    }
}
