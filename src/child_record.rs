//! Bookkeeping the process monitor keeps per child: its current lifecycle
//! state, pid, and restart backoff.
//!
//! Grounded on `jdx-pitchfork/src/supervisor/retry.rs` (backoff bookkeeping
//! shape) and `original_source/ncolony/procmon.py` (the state names a
//! supervised process moves through: not running, starting, running,
//! stopping).

use std::time::Duration;

use strum::Display;
use tokio::time::Instant;

use crate::process_spec::ProcessSpec;

/// Lifecycle state of one supervised child. Named after
/// `twisted.runner.procmon`'s state machine, which `original_source`
/// inherits directly.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Display)]
pub enum ChildState {
    /// No process exists for this name (either never started, or its spec
    /// was removed and the last process has exited).
    None,
    /// Spawned, waiting to see if it stays up past the minimum restart
    /// delay (a crash-loop guard).
    Starting,
    /// Up and considered healthy.
    Running,
    /// Asked to terminate; waiting for it to exit or for the kill timer.
    Stopping,
}

/// Everything the process monitor tracks for one name.
pub struct ChildRecord {
    pub spec: ProcessSpec,
    pub state: ChildState,
    pub pid: Option<u32>,
    /// When the current process (if any) was last spawned.
    pub started_at: Option<Instant>,
    /// Consecutive restart attempts since the child last stayed up past
    /// the minimum restart delay; feeds the backoff delay.
    pub restart_count: u32,
}

impl ChildRecord {
    pub fn new(spec: ProcessSpec) -> Self {
        Self {
            spec,
            state: ChildState::None,
            pid: None,
            started_at: None,
            restart_count: 0,
        }
    }

    pub fn mark_started(&mut self, pid: u32, now: Instant) {
        self.state = ChildState::Starting;
        self.pid = Some(pid);
        self.started_at = Some(now);
    }

    pub fn mark_running(&mut self) {
        if self.state == ChildState::Starting {
            self.state = ChildState::Running;
        }
    }

    pub fn mark_stopping(&mut self) {
        self.state = ChildState::Stopping;
    }

    pub fn mark_exited(&mut self) {
        self.state = ChildState::None;
        self.pid = None;
        self.started_at = None;
    }

    /// Whether the child's elapsed running time reached `threshold`,
    /// meaning this exit resets the backoff counter instead of growing it.
    pub fn survived_minimum(&self, now: Instant, threshold: Duration) -> bool {
        self.started_at
            .map(|started| now.saturating_duration_since(started) >= threshold)
            .unwrap_or(false)
    }
}
