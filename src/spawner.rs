//! Process spawning, abstracted behind a trait so the process monitor can be
//! tested without forking real processes.
//!
//! Grounded on `jdx-pitchfork/src/procs.rs` (the teacher's wrapping of OS
//! process operations behind its own type) and
//! `original_source/ncolony/procmon.py` (spawn-with-uid/gid-drop semantics).

use std::collections::BTreeMap;
use std::process::Stdio;

use tokio::process::{Child, Command};

use crate::error::ProcessError;
use crate::process_spec::ProcessSpec;

/// A process ready to be spawned: argv, environment, and optional
/// uid/gid to drop to after fork.
#[derive(Debug, Clone)]
pub struct Launch {
    pub name: String,
    pub args: Vec<String>,
    pub env: BTreeMap<String, String>,
    pub uid: Option<u32>,
    pub gid: Option<u32>,
}

impl Launch {
    pub fn from_spec<F>(spec: &ProcessSpec, ambient_env: F) -> Self
    where
        F: FnMut(&str) -> Option<String>,
    {
        Self {
            name: spec.name.clone(),
            args: spec.args.clone(),
            env: spec.effective_env(ambient_env),
            uid: spec.uid,
            gid: spec.gid,
        }
    }
}

/// Spawns launches and returns a handle to the child process. A trait so
/// the process monitor can be driven by a fake in tests.
pub trait Spawner: Send + Sync {
    fn spawn(&self, launch: &Launch) -> Result<Child, ProcessError>;
}

/// Spawns real OS processes via `tokio::process::Command`.
#[derive(Debug, Default, Clone, Copy)]
pub struct RealSpawner;

impl Spawner for RealSpawner {
    fn spawn(&self, launch: &Launch) -> Result<Child, ProcessError> {
        let (exe, rest) = launch
            .args
            .split_first()
            .expect("ProcessSpec::parse rejects empty args");

        let mut cmd = Command::new(exe);
        cmd.args(rest);
        cmd.env_clear();
        cmd.envs(&launch.env);
        cmd.stdin(Stdio::null());
        cmd.stdout(Stdio::inherit());
        cmd.stderr(Stdio::inherit());
        cmd.kill_on_drop(false);

        apply_identity(&mut cmd, launch);

        cmd.spawn().map_err(|source| ProcessError::SpawnFailed {
            name: launch.name.clone(),
            source,
        })
    }
}

#[cfg(unix)]
fn apply_identity(cmd: &mut Command, launch: &Launch) {
    use std::os::unix::process::CommandExt;

    if let Some(gid) = launch.gid {
        cmd.gid(gid);
    }
    if let Some(uid) = launch.uid {
        cmd.uid(uid);
    }
}

#[cfg(not(unix))]
fn apply_identity(_cmd: &mut Command, _launch: &Launch) {}
