//! `ward-beatcheck`: watches the config directory for every name carrying a
//! `beatcheck` extension and restarts whichever ones go stale.
//!
//! Grounded on `original_source/ncolony/beatcheck.py`'s `makeService`
//! (`TimerService` at `opt['freq']` driving `check()` over every config
//! file) — reconciliation of the per-name map mirrors that function's
//! `gone`/`added` diff, expressed here via `ConfigMonitor`'s `DirSink`.

#[macro_use]
extern crate log;

use std::collections::HashMap;
use std::path::PathBuf;
use std::time::Duration;

use clap::Parser;
use tokio::time::Instant;
use ward::beatcheck::{BeatCheckConfig, BeatChecker};
use ward::directory_monitor::{ConfigMonitor, DirSink};
use ward::logging;
use ward::process_spec::ProcessSpec;

#[derive(Parser, Debug)]
#[command(name = "ward-beatcheck")]
struct Args {
    #[arg(long, env = "WARD_CONFIG_DIR")]
    config_dir: PathBuf,
    #[arg(long, env = "WARD_MESSAGES_DIR")]
    messages_dir: PathBuf,
    /// How often to re-scan the config directory and re-check every name.
    #[arg(long, default_value_t = 10.0)]
    freq: f64,
}

struct BeatCheckSink {
    config_dir: PathBuf,
    service_started: Instant,
    checkers: HashMap<String, BeatChecker>,
}

impl DirSink for BeatCheckSink {
    fn add(&mut self, name: &str, raw: &[u8]) {
        let spec = match ProcessSpec::parse(name, raw) {
            Ok(spec) => spec,
            Err(err) => {
                warn!("'{name}' has a malformed spec, skipping beatcheck: {err}");
                self.checkers.remove(name);
                return;
            }
        };
        match spec.extension("beatcheck") {
            Some(ext) => match BeatCheckConfig::from_json(&ext, &self.config_dir) {
                Some(config) => {
                    self.checkers
                        .insert(name.to_string(), BeatChecker::new(config, self.service_started));
                }
                None => {
                    warn!("'{name}' has a malformed beatcheck extension, ignoring");
                    self.checkers.remove(name);
                }
            },
            None => {
                self.checkers.remove(name);
            }
        }
    }

    fn remove(&mut self, name: &str) {
        self.checkers.remove(name);
    }
}

#[tokio::main]
async fn main() -> std::io::Result<()> {
    logging::init();
    let args = Args::parse();

    let mut config_monitor = ConfigMonitor::new(&args.config_dir);
    let mut sink = BeatCheckSink {
        config_dir: args.config_dir.clone(),
        service_started: Instant::now(),
        checkers: HashMap::new(),
    };
    let freq = Duration::from_secs_f64(args.freq);

    loop {
        if let Err(err) = config_monitor.poll(&mut sink).await {
            error!("beatcheck: failed to poll '{}': {err}", args.config_dir.display());
        }

        for (name, checker) in &sink.checkers {
            let spec_path = args.config_dir.join(name);
            let Some(spec_age) = mtime_age(&spec_path).await else {
                continue;
            };
            let status_path = checker.config().effective_status_path(name).await;
            let status_mtime_age = mtime_age(&status_path).await;

            match checker
                .check_and_restart(name, Instant::now(), spec_age, status_mtime_age, &args.messages_dir)
                .await
            {
                Ok(true) => info!("'{name}' looked stale, wrote a restart message"),
                Ok(false) => {}
                Err(err) => error!("'{name}': failed to write restart message: {err}"),
            }
        }

        tokio::time::sleep(freq).await;
    }
}

async fn mtime_age(path: &std::path::Path) -> Option<Duration> {
    tokio::fs::metadata(path)
        .await
        .ok()?
        .modified()
        .ok()?
        .elapsed()
        .ok()
}
