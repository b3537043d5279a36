//! One-time `log`/`env_logger` setup shared by every ward binary.

use std::io::Write;

/// Initialize the global logger. Level is controlled by `WARD_LOG`
/// (default `info`), following the same env-var-driven convention as the
/// rest of ward's configuration (see `env::WARD_LOG`).
pub fn init() {
    let level = *crate::env::WARD_LOG;
    let _ = env_logger::Builder::new()
        .filter_level(level)
        .format(|buf, record| {
            let now = chrono::Local::now().format("%Y-%m-%d %H:%M:%S%.3f");
            writeln!(
                buf,
                "{now} {:<5} [{}] {}",
                record.level(),
                record.target(),
                record.args()
            )
        })
        .try_init();
}
