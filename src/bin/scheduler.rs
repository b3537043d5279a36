//! `ward-scheduler`: runs a short-lived command on a fixed period.
//! Grounded on `original_source/ncolony/schedulelib.py`: ticks fire on a
//! fixed cadence regardless of how long the previous run takes — a run
//! still live when the next tick fires is left to its own TERM/KILL timers
//! while the fresh instance launches alongside it.

#[macro_use]
extern crate log;

use std::time::Duration;

use clap::Parser;
use ward::logging;
use ward::scheduler::{self, ScheduleConfig};

#[derive(Parser, Debug)]
#[command(name = "ward-scheduler")]
struct Args {
    #[arg(long)]
    name: String,
    #[arg(long)]
    period: f64,
    #[arg(long, default_value_t = 5.0)]
    term_timeout: f64,
    #[arg(long, default_value_t = 5.0)]
    kill_timeout: f64,
    /// Command and arguments, e.g. `-- /usr/bin/backup-job --full`.
    #[arg(last = true, required = true)]
    args: Vec<String>,
}

#[tokio::main]
async fn main() -> std::io::Result<()> {
    logging::init();
    let args = Args::parse();

    let config = ScheduleConfig {
        name: args.name,
        args: args.args,
        period: Duration::from_secs_f64(args.period),
        term_timeout: Duration::from_secs_f64(args.term_timeout),
        kill_timeout: Duration::from_secs_f64(args.kill_timeout),
    };

    let mut ticks = tokio::time::interval(config.period);
    ticks.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);

    loop {
        ticks.tick().await;
        let config = config.clone();
        tokio::spawn(async move {
            match scheduler::run_once(&config).await {
                Ok(code) => info!("'{}' finished with code {:?}", config.name, code),
                Err(err) => error!("'{}' failed to run: {err}", config.name),
            }
        });
    }
}
