#[macro_use]
extern crate log;

use std::sync::Arc;
use std::time::Duration;

use ward::clock::SystemClock;
use ward::spawner::RealSpawner;
use ward::supervisor::{Supervisor, SupervisorConfig};
use ward::{env, logging, process_monitor::ProcessMonitorConfig};

use clap::Parser;
use tokio::signal;
#[cfg(unix)]
use tokio::signal::unix::SignalKind;

/// The ward daemon: run the supervisor loop against a config/messages/pid
/// directory triple, until terminated.
#[derive(Parser, Debug)]
#[command(name = "ward", about = "File-driven process supervisor")]
struct Args {
    #[arg(long, env = "WARD_CONFIG_DIR")]
    config_dir: Option<std::path::PathBuf>,
    #[arg(long, env = "WARD_MESSAGES_DIR")]
    messages_dir: Option<std::path::PathBuf>,
    #[arg(long, env = "WARD_PID_DIR")]
    pid_dir: Option<std::path::PathBuf>,
    #[arg(long, env = "WARD_FREQ")]
    freq: Option<u64>,
    /// Elapsed running time (seconds) past which an exit resets backoff
    /// instead of growing it.
    #[arg(long, env = "WARD_THRESHOLD", default_value_t = 1)]
    threshold: u64,
    #[arg(long, env = "WARD_KILLTIME", default_value_t = 5)]
    kill_time: u64,
    #[arg(long, env = "WARD_MIN_RESTART_DELAY", default_value_t = 1)]
    min_restart_delay: u64,
    #[arg(long, env = "WARD_MAX_RESTART_DELAY", default_value_t = 3600)]
    max_restart_delay: u64,
}

#[tokio::main]
async fn main() -> miette::Result<()> {
    logging::init();
    #[cfg(unix)]
    handle_epipe();

    let args = Args::parse();
    let config = SupervisorConfig {
        config_dir: args.config_dir.unwrap_or_else(|| env::WARD_CONFIG_DIR.clone()),
        messages_dir: args
            .messages_dir
            .unwrap_or_else(|| env::WARD_MESSAGES_DIR.clone()),
        pid_dir: args.pid_dir.unwrap_or_else(|| env::WARD_PID_DIR.clone()),
        poll_interval: Duration::from_secs(args.freq.unwrap_or(*env::WARD_FREQ)),
        process: ProcessMonitorConfig {
            threshold: Duration::from_secs(args.threshold),
            kill_time: Duration::from_secs(args.kill_time),
            min_restart_delay: Duration::from_secs(args.min_restart_delay),
            max_restart_delay: Duration::from_secs(args.max_restart_delay),
        },
    };

    let supervisor = Supervisor::new(config, Arc::new(RealSpawner), Arc::new(SystemClock));
    supervisor.run().await.map_err(|err| miette::miette!("{err}"))
}

#[cfg(unix)]
fn handle_epipe() {
    match signal::unix::signal(SignalKind::pipe()) {
        Ok(mut pipe_stream) => {
            tokio::spawn(async move {
                pipe_stream.recv().await;
                debug!("received SIGPIPE");
            });
        }
        Err(e) => {
            warn!("Could not set up SIGPIPE handler: {e}");
        }
    }
}
