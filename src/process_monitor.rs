//! The process monitor: owns the table of supervised children, spawns and
//! restarts them with exponential backoff, and escalates from SIGTERM to
//! SIGKILL when a child won't stop.
//!
//! A child is retried forever: there is no give-up cutoff, only a growing
//! and ultimately capped delay between attempts.
//!
//! Grounded on `original_source/ncolony/service.py` (the
//! threshold/killTime/minRestartDelay/maxRestartDelay wiring, carried here
//! as `ProcessMonitorConfig`) and `jdx-pitchfork/src/procs.rs` (the
//! SIGTERM-then-wait-then-SIGKILL escalation shape, reworked as an explicit
//! delayed command rather than a blocking wait loop). All process-table
//! mutation happens on a single task reading one command channel, the
//! "single mutex" concurrency model: no `Mutex<HashMap<..>>` is needed
//! because nothing outside this task touches `children` directly.

use std::collections::HashMap;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use tokio::process::Child;
use tokio::sync::mpsc;

use crate::child_record::{ChildRecord, ChildState};
use crate::clock::Clock;
use crate::error::ProcessError;
use crate::event_receiver::ProcessOps;
use crate::process_spec::ProcessSpec;
use crate::spawner::{Launch, Spawner};

#[derive(Debug, Clone, Copy)]
pub struct ProcessMonitorConfig {
    /// Elapsed running time past which a child is considered to have
    /// survived its start: its exit resets backoff instead of growing it.
    pub threshold: Duration,
    /// How long to wait after SIGTERM before escalating to SIGKILL.
    pub kill_time: Duration,
    /// Initial backoff delay after a rapid exit.
    pub min_restart_delay: Duration,
    /// Cap the backoff delay grows to on successive rapid exits. A child
    /// is retried forever; this only bounds how slow the retries get.
    pub max_restart_delay: Duration,
}

impl Default for ProcessMonitorConfig {
    fn default() -> Self {
        Self {
            threshold: Duration::from_secs(1),
            kill_time: Duration::from_secs(5),
            min_restart_delay: Duration::from_secs(1),
            max_restart_delay: Duration::from_secs(3600),
        }
    }
}

enum Command {
    Start(ProcessSpec),
    Stop(String),
    Restart(String),
    RestartAll,
    RestartGroup(Vec<String>),
    ChildExited(String, u32),
    ForceKill(String),
}

/// A cheaply cloneable handle used to drive the process monitor from
/// elsewhere (the event receiver, and message handling in the supervisor).
#[derive(Clone)]
pub struct ProcessMonitorHandle {
    tx: mpsc::UnboundedSender<Command>,
}

impl ProcessMonitorHandle {
    pub fn restart(&self, name: &str) {
        let _ = self.tx.send(Command::Restart(name.to_string()));
    }

    pub fn restart_all(&self) {
        let _ = self.tx.send(Command::RestartAll);
    }

    pub fn restart_group(&self, names: Vec<String>) {
        let _ = self.tx.send(Command::RestartGroup(names));
    }
}

impl ProcessOps for ProcessMonitorHandle {
    fn start(&mut self, spec: ProcessSpec) {
        let _ = self.tx.send(Command::Start(spec));
    }

    fn stop(&mut self, name: &str) {
        let _ = self.tx.send(Command::Stop(name.to_string()));
    }
}

pub struct ProcessMonitor {
    children: HashMap<String, ChildRecord>,
    spawner: Arc<dyn Spawner>,
    clock: Arc<dyn Clock>,
    config: ProcessMonitorConfig,
    pid_dir: PathBuf,
    tx: mpsc::UnboundedSender<Command>,
    rx: mpsc::UnboundedReceiver<Command>,
}

impl ProcessMonitor {
    pub fn new(
        spawner: Arc<dyn Spawner>,
        clock: Arc<dyn Clock>,
        config: ProcessMonitorConfig,
        pid_dir: impl Into<PathBuf>,
    ) -> Self {
        let (tx, rx) = mpsc::unbounded_channel();
        Self {
            children: HashMap::new(),
            spawner,
            clock,
            config,
            pid_dir: pid_dir.into(),
            tx,
            rx,
        }
    }

    pub fn handle(&self) -> ProcessMonitorHandle {
        ProcessMonitorHandle {
            tx: self.tx.clone(),
        }
    }

    /// Drain and apply commands until the channel closes (all handles
    /// dropped). Intended to be run as its own task by the supervisor.
    pub async fn run(&mut self) {
        while let Some(command) = self.rx.recv().await {
            self.apply(command).await;
        }
    }

    async fn apply(&mut self, command: Command) {
        match command {
            Command::Start(spec) => self.start(spec).await,
            Command::Stop(name) => self.stop(&name).await,
            Command::Restart(name) => self.restart(&name).await,
            Command::RestartAll => {
                let names: Vec<String> = self
                    .children
                    .iter()
                    .filter(|(_, record)| record.state == ChildState::Running)
                    .map(|(name, _)| name.clone())
                    .collect();
                for name in names {
                    self.restart(&name).await;
                }
            }
            Command::RestartGroup(names) => {
                for name in names {
                    self.restart(&name).await;
                }
            }
            Command::ChildExited(name, code) => self.on_child_exited(&name, code).await,
            Command::ForceKill(name) => self.force_kill(&name).await,
        }
    }

    async fn start(&mut self, spec: ProcessSpec) {
        let name = spec.name.clone();
        self.children
            .entry(name.clone())
            .or_insert_with(|| ChildRecord::new(spec.clone()));
        if let Some(record) = self.children.get_mut(&name) {
            record.spec = spec;
        }
        self.spawn_now(&name).await;
    }

    async fn spawn_now(&mut self, name: &str) {
        let Some(record) = self.children.get(name) else {
            return;
        };
        let launch = Launch::from_spec(&record.spec, |key| std::env::var(key).ok());

        match self.spawner.spawn(&launch) {
            Ok(child) => {
                let pid = child.id().unwrap_or_default();
                if let Some(record) = self.children.get_mut(name) {
                    record.mark_started(pid, self.clock.now());
                }
                self.write_pid_file(name, pid).await;
                self.watch_child(name.to_string(), child);
            }
            Err(err) => {
                error!("{err}");
            }
        }
    }

    fn watch_child(&self, name: String, mut child: Child) {
        let tx = self.tx.clone();
        tokio::spawn(async move {
            let code = match child.wait().await {
                Ok(status) => status.code().unwrap_or(-1) as u32,
                Err(_) => u32::MAX,
            };
            let _ = tx.send(Command::ChildExited(name, code));
        });
    }

    async fn on_child_exited(&mut self, name: &str, _code: u32) {
        self.remove_pid_file(name).await;

        let Some((was_stopping, survived)) = self.children.get_mut(name).map(|record| {
            let was_stopping = record.state == ChildState::Stopping;
            let survived = record.survived_minimum(self.clock.now(), self.config.threshold);
            record.mark_exited();
            (was_stopping, survived)
        }) else {
            return;
        };

        if was_stopping {
            // requested stop: only restart if the spec is still present
            // (i.e. this was a restart, not a removal's final exit)
            return;
        }

        if survived {
            if let Some(record) = self.children.get_mut(name) {
                record.restart_count = 0;
            }
            self.spawn_now(name).await;
            return;
        }

        let restart_count = match self.children.get_mut(name) {
            Some(record) => {
                record.restart_count += 1;
                record.restart_count
            }
            None => return,
        };

        let delay = self.backoff_delay(restart_count);
        let name = name.to_string();
        let clock = self.clock.clone();
        let tx = self.tx.clone();
        tokio::spawn(async move {
            clock.sleep(delay).await;
            let _ = tx.send(Command::Restart(name));
        });
    }

    /// `min_restart_delay` doubled once per rapid exit, capped at
    /// `max_restart_delay`. A child is never given up on; this only slows
    /// down how often it's retried.
    fn backoff_delay(&self, attempt: u32) -> Duration {
        let growth = 1u32.checked_shl(attempt.saturating_sub(1)).unwrap_or(u32::MAX);
        self.config
            .min_restart_delay
            .saturating_mul(growth)
            .min(self.config.max_restart_delay)
    }

    /// Restart a running or stopped child in place: if it's up, stop it
    /// and let the exit handler respawn it; if it's already down, spawn it
    /// directly.
    async fn restart(&mut self, name: &str) {
        let Some(record) = self.children.get(name) else {
            return;
        };
        match record.state {
            ChildState::None => self.spawn_now(name).await,
            ChildState::Running | ChildState::Starting => self.stop(name).await,
            ChildState::Stopping => {}
        }
    }

    async fn stop(&mut self, name: &str) {
        let Some(record) = self.children.get_mut(name) else {
            return;
        };
        let Some(pid) = record.pid else {
            self.children.remove(name);
            return;
        };
        record.mark_stopping();
        self.send_signal(name, pid, Signal::Term);

        let name_owned = name.to_string();
        let clock = self.clock.clone();
        let tx = self.tx.clone();
        let kill_time = self.config.kill_time;
        tokio::spawn(async move {
            clock.sleep(kill_time).await;
            let _ = tx.send(Command::ForceKill(name_owned));
        });
    }

    async fn force_kill(&mut self, name: &str) {
        let Some(record) = self.children.get(name) else {
            return;
        };
        if record.state != ChildState::Stopping {
            return;
        }
        if let Some(pid) = record.pid {
            self.send_signal(name, pid, Signal::Kill);
        }
    }

    fn send_signal(&self, name: &str, pid: u32, signal: Signal) {
        if let Err(err) = deliver_signal(pid, signal) {
            error!(
                "{}",
                ProcessError::SignalFailed {
                    name: name.to_string(),
                    pid,
                }
            );
            let _ = err;
        }
    }

    async fn write_pid_file(&self, name: &str, pid: u32) {
        let final_path = self.pid_dir.join(name);
        let tmp_path = self.pid_dir.join(format!("{name}.new"));
        if tokio::fs::create_dir_all(&self.pid_dir).await.is_err() {
            return;
        }
        if tokio::fs::write(&tmp_path, pid.to_string()).await.is_ok() {
            let _ = tokio::fs::rename(&tmp_path, &final_path).await;
        }
    }

    async fn remove_pid_file(&self, name: &str) {
        let _ = tokio::fs::remove_file(self.pid_dir.join(name)).await;
    }

    #[cfg(test)]
    fn state_of(&self, name: &str) -> Option<ChildState> {
        self.children.get(name).map(|record| record.state)
    }
}

#[derive(Debug, Clone, Copy)]
enum Signal {
    Term,
    Kill,
}

#[cfg(unix)]
fn deliver_signal(pid: u32, signal: Signal) -> Result<(), nix::errno::Errno> {
    use nix::sys::signal::{self, Signal as NixSignal};
    use nix::unistd::Pid;

    let nix_signal = match signal {
        Signal::Term => NixSignal::SIGTERM,
        Signal::Kill => NixSignal::SIGKILL,
    };
    signal::kill(Pid::from_raw(pid as i32), nix_signal)
}

#[cfg(not(unix))]
fn deliver_signal(_pid: u32, _signal: Signal) -> Result<(), std::io::Error> {
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::clock::FakeClock;

    struct NoopSpawner;
    impl Spawner for NoopSpawner {
        fn spawn(&self, launch: &Launch) -> Result<Child, ProcessError> {
            // spawn a real, near-instant process so Child::wait() behaves
            tokio::process::Command::new("true")
                .kill_on_drop(false)
                .spawn()
                .map_err(|source| ProcessError::SpawnFailed {
                    name: launch.name.clone(),
                    source,
                })
        }
    }

    #[tokio::test]
    async fn start_spawns_and_marks_starting() {
        let clock = Arc::new(FakeClock::new());
        let pid_dir = tempfile::tempdir().unwrap();
        let mut monitor = ProcessMonitor::new(
            Arc::new(NoopSpawner),
            clock,
            ProcessMonitorConfig::default(),
            pid_dir.path(),
        );
        let spec = ProcessSpec::parse("x", br#"{"args": ["true"]}"#).unwrap();
        monitor.start(spec).await;
        assert_eq!(monitor.state_of("x"), Some(ChildState::Starting));
        assert!(monitor.children.get("x").unwrap().pid.is_some());
    }

    #[tokio::test]
    async fn restart_of_unknown_name_is_noop() {
        let clock = Arc::new(FakeClock::new());
        let pid_dir = tempfile::tempdir().unwrap();
        let mut monitor = ProcessMonitor::new(
            Arc::new(NoopSpawner),
            clock,
            ProcessMonitorConfig::default(),
            pid_dir.path(),
        );
        monitor.restart("nope").await;
        assert!(monitor.children.is_empty());
    }

    #[test]
    fn backoff_delay_grows_and_is_capped() {
        let clock = Arc::new(FakeClock::new());
        let pid_dir = std::env::temp_dir();
        let monitor = ProcessMonitor::new(
            Arc::new(NoopSpawner),
            clock,
            ProcessMonitorConfig {
                min_restart_delay: Duration::from_secs(1),
                max_restart_delay: Duration::from_secs(30),
                ..Default::default()
            },
            pid_dir,
        );
        let first = monitor.backoff_delay(1);
        let later = monitor.backoff_delay(8);
        assert!(first <= later);
        assert!(later <= Duration::from_secs(30));
    }

    #[test]
    fn backoff_delay_never_gives_up_no_matter_how_many_attempts() {
        let clock = Arc::new(FakeClock::new());
        let pid_dir = std::env::temp_dir();
        let monitor = ProcessMonitor::new(
            Arc::new(NoopSpawner),
            clock,
            ProcessMonitorConfig::default(),
            pid_dir,
        );
        // far past any reasonable "give up" cutoff; still returns a capped delay
        let delay = monitor.backoff_delay(10_000);
        assert_eq!(delay, monitor.config.max_restart_delay);
    }

    #[tokio::test]
    async fn a_child_that_survives_threshold_resets_restart_count_and_respawns() {
        let clock = Arc::new(FakeClock::new());
        let pid_dir = tempfile::tempdir().unwrap();
        let mut monitor = ProcessMonitor::new(
            Arc::new(NoopSpawner),
            clock,
            ProcessMonitorConfig {
                threshold: Duration::ZERO,
                ..Default::default()
            },
            pid_dir.path(),
        );
        let spec = ProcessSpec::parse("x", br#"{"args": ["true"]}"#).unwrap();
        monitor.start(spec).await;
        monitor.children.get_mut("x").unwrap().restart_count = 3;
        monitor.on_child_exited("x", 0).await;
        assert_eq!(monitor.children.get("x").unwrap().restart_count, 0);
        assert_eq!(monitor.state_of("x"), Some(ChildState::Starting));
    }
}
