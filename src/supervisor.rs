//! The supervisor: wires the directory monitors, event receiver, and
//! process monitor together, and runs the poll loop until a termination
//! signal arrives.
//!
//! Grounded on `jdx-pitchfork/src/supervisor.rs` (signal handling via
//! `tokio::signal`, the `run()`/`close()` shape) and
//! `original_source/ncolony/reaperlib.py` (driving config, message, and
//! check polls from one loop rather than separate reactors).

use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use crate::clock::Clock;
use crate::directory_monitor::{ConfigMonitor, MessageMonitor, MessageSink};
use crate::event_receiver::EventReceiver;
use crate::message::Message;
use crate::process_monitor::{ProcessMonitor, ProcessMonitorConfig, ProcessMonitorHandle};
use crate::spawner::Spawner;

pub struct SupervisorConfig {
    pub config_dir: PathBuf,
    pub messages_dir: PathBuf,
    pub pid_dir: PathBuf,
    pub poll_interval: Duration,
    pub process: ProcessMonitorConfig,
}

/// Collects parsed messages off a poll without needing mutable access to
/// the event receiver (whose group index is only needed once the set of
/// messages for this tick is known), so RESTART-GROUP can be resolved
/// against a receiver borrowed sequentially right after.
#[derive(Default)]
struct MessageCollector {
    messages: Vec<Message>,
}

impl MessageSink for MessageCollector {
    fn message(&mut self, raw: &[u8]) {
        match Message::parse(raw) {
            Ok(message) => self.messages.push(message),
            Err(err) => warn!("dropping malformed message: {err}"),
        }
    }
}

/// Runs the full supervisor loop: polls the config directory into the
/// event receiver, polls the messages directory into process-monitor
/// commands, and drives the process monitor's own command queue, until
/// SIGTERM/SIGINT.
pub struct Supervisor {
    config: SupervisorConfig,
    spawner: Arc<dyn Spawner>,
    clock: Arc<dyn Clock>,
}

impl Supervisor {
    pub fn new(config: SupervisorConfig, spawner: Arc<dyn Spawner>, clock: Arc<dyn Clock>) -> Self {
        Self {
            config,
            spawner,
            clock,
        }
    }

    pub async fn run(self) -> std::io::Result<()> {
        let mut process_monitor = ProcessMonitor::new(
            self.spawner.clone(),
            self.clock.clone(),
            self.config.process,
            self.config.pid_dir.clone(),
        );
        let handle = process_monitor.handle();
        let monitor_task = tokio::spawn(async move { process_monitor.run().await });

        let mut event_receiver = EventReceiver::new(handle.clone());
        let mut config_monitor = ConfigMonitor::new(self.config.config_dir.clone());
        let mut message_monitor = MessageMonitor::new(self.config.messages_dir.clone());

        let mut shutdown = shutdown_signal();

        loop {
            tokio::select! {
                _ = &mut shutdown => {
                    info!("shutdown signal received, stopping poll loop");
                    break;
                }
                _ = self.clock.sleep(self.config.poll_interval) => {
                    if let Err(err) = config_monitor.poll(&mut event_receiver).await {
                        error!("config poll failed: {err}");
                    }

                    let mut collector = MessageCollector::default();
                    if let Err(err) = message_monitor.poll(&mut collector).await {
                        error!("message poll failed: {err}");
                    }
                    for message in collector.messages {
                        match message {
                            Message::Restart { name } => handle.restart(&name),
                            Message::RestartAll => handle.restart_all(),
                            Message::RestartGroup { group } => {
                                handle.restart_group(event_receiver.group_members(&group));
                            }
                        }
                    }
                }
            }
        }

        drop(handle);
        let _ = monitor_task.await;
        Ok(())
    }
}

#[cfg(unix)]
fn shutdown_signal() -> impl std::future::Future<Output = ()> {
    use tokio::signal::unix::{signal, SignalKind};
    async move {
        let mut term = signal(SignalKind::terminate()).expect("install SIGTERM handler");
        let mut int = signal(SignalKind::interrupt()).expect("install SIGINT handler");
        tokio::select! {
            _ = term.recv() => {}
            _ = int.recv() => {}
        }
    }
}

#[cfg(not(unix))]
fn shutdown_signal() -> impl std::future::Future<Output = ()> {
    async move {
        let _ = tokio::signal::ctrl_c().await;
    }
}
