//! `ward-httpcheck`: watches the config directory for every name carrying
//! an `httpcheck` extension and restarts whichever ones fail their health
//! checks too many times in a row.
//!
//! Grounded on `original_source/ncolony/httpcheck.py`'s `check()` (diffs
//! `states` against the config directory's current children, closing and
//! dropping vanished names, adding fresh `State`s for new ones) — expressed
//! here via `ConfigMonitor`'s `DirSink`, same shape as `ward-beatcheck`.

#[macro_use]
extern crate log;

use std::collections::HashMap;
use std::path::PathBuf;
use std::time::Duration;

use clap::Parser;
use tokio::time::Instant;
use ward::directory_monitor::{ConfigMonitor, DirSink};
use ward::httpcheck::{HttpCheckConfig, HttpChecker};
use ward::logging;
use ward::process_spec::ProcessSpec;

#[derive(Parser, Debug)]
#[command(name = "ward-httpcheck")]
struct Args {
    #[arg(long, env = "WARD_CONFIG_DIR")]
    config_dir: PathBuf,
    #[arg(long, env = "WARD_MESSAGES_DIR")]
    messages_dir: PathBuf,
    /// How often to re-scan the config directory for added/removed/changed
    /// `httpcheck` extensions.
    #[arg(long, default_value_t = 10.0)]
    freq: f64,
}

struct HttpCheckSink {
    client: reqwest::Client,
    checkers: HashMap<String, HttpChecker>,
}

impl DirSink for HttpCheckSink {
    fn add(&mut self, name: &str, raw: &[u8]) {
        let spec = match ProcessSpec::parse(name, raw) {
            Ok(spec) => spec,
            Err(err) => {
                warn!("'{name}' has a malformed spec, skipping httpcheck: {err}");
                self.remove(name);
                return;
            }
        };
        match spec.extension("httpcheck") {
            Some(ext) => match HttpCheckConfig::from_json(&ext) {
                Some(config) => {
                    // content-changed: cancel whatever was pending and apply
                    // the fresh parameters, same as `_maybeReset`.
                    self.checkers.insert(
                        name.to_string(),
                        HttpChecker::new(config, self.client.clone(), Instant::now()),
                    );
                }
                None => {
                    warn!("'{name}' has a malformed httpcheck extension, ignoring");
                    self.remove(name);
                }
            },
            None => self.remove(name),
        }
    }

    fn remove(&mut self, name: &str) {
        if let Some(mut checker) = self.checkers.remove(name) {
            checker.close();
        }
    }
}

#[tokio::main]
async fn main() -> std::io::Result<()> {
    logging::init();
    let args = Args::parse();

    let mut config_monitor = ConfigMonitor::new(&args.config_dir);
    let mut sink = HttpCheckSink {
        client: reqwest::Client::new(),
        checkers: HashMap::new(),
    };
    let freq = Duration::from_secs_f64(args.freq);

    loop {
        if let Err(err) = config_monitor.poll(&mut sink).await {
            error!("httpcheck: failed to poll '{}': {err}", args.config_dir.display());
        }

        for (name, checker) in &mut sink.checkers {
            match checker.check_and_restart(name, Instant::now(), &args.messages_dir).await {
                Ok(true) => info!("'{name}' failed its health check, wrote a restart message"),
                Ok(false) => {}
                Err(err) => error!("'{name}': failed to write restart message: {err}"),
            }
        }

        tokio::time::sleep(freq).await;
    }
}
