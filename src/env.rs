use once_cell::sync::Lazy;
pub use std::env::*;
use std::path::PathBuf;

pub static CWD: Lazy<PathBuf> = Lazy::new(|| current_dir().unwrap_or_default());
pub static HOME_DIR: Lazy<PathBuf> = Lazy::new(|| dirs::home_dir().unwrap_or_default());

pub static WARD_STATE_DIR: Lazy<PathBuf> = Lazy::new(|| {
    var_path("WARD_STATE_DIR").unwrap_or(
        dirs::state_dir()
            .unwrap_or(HOME_DIR.join(".local").join("state"))
            .join("ward"),
    )
});

pub static WARD_PID_DIR: Lazy<PathBuf> =
    Lazy::new(|| var_path("WARD_PID_DIR").unwrap_or(WARD_STATE_DIR.join("pids")));

pub static WARD_CONFIG_DIR: Lazy<PathBuf> =
    Lazy::new(|| var_path("WARD_CONFIG_DIR").unwrap_or(WARD_STATE_DIR.join("config")));

pub static WARD_MESSAGES_DIR: Lazy<PathBuf> =
    Lazy::new(|| var_path("WARD_MESSAGES_DIR").unwrap_or(WARD_STATE_DIR.join("messages")));

pub static WARD_LOG: Lazy<log::LevelFilter> =
    Lazy::new(|| var_log_level("WARD_LOG").unwrap_or(log::LevelFilter::Info));

/// Directory-monitor / message-monitor poll frequency, in seconds.
pub static WARD_FREQ: Lazy<u64> =
    Lazy::new(|| var("WARD_FREQ").ok().and_then(|v| v.parse().ok()).unwrap_or(10));

fn var_path(name: &str) -> Option<PathBuf> {
    var(name).map(PathBuf::from).ok()
}

fn var_log_level(name: &str) -> Option<log::LevelFilter> {
    var(name).ok().and_then(|level| level.parse().ok())
}
