use anyhow::{Context, Result};
use log::LevelFilter;
use std::fs::OpenOptions;
use std::io::Write;

use crate::config::ConfigManager;

const MAX_LOG_SIZE: u64 = 10 * 1024 * 1024; // 10MB

/// Initialize the logging system
///
/// Sets up logging to both console and a log file in the config directory.
///
/// **Console logging** is controlled via the `RUST_LOG` environment variable
/// (default `info`). `verbose` forces `debug` regardless of `RUST_LOG`.
///
/// **File logging** goes to `p4-workspace.log` in the config directory:
/// - Linux: ~/.config/p4-workspace/ or $XDG_CONFIG_HOME/p4-workspace/
/// - macOS: ~/Library/Application Support/p4-workspace/
/// - Windows: %APPDATA%\p4-workspace\
///
/// ```bash
/// # Trace resolver bucketing and overlap pruning
/// RUST_LOG=debug p4-workspace resolve
/// ```
pub fn init_logger(verbose: bool) -> Result<()> {
    ConfigManager::ensure_config_dir()?;
    rotate_log_if_needed()?;

    let default_level = if verbose {
        LevelFilter::Debug
    } else {
        std::env::var("RUST_LOG")
            .ok()
            .and_then(|s| s.parse::<LevelFilter>().ok())
            .unwrap_or(LevelFilter::Info)
    };

    env_logger::Builder::from_default_env()
        .format(|buf, record| {
            writeln!(
                buf,
                "{} [{:5}] {}",
                chrono::Local::now().format("%H:%M:%S"),
                record.level(),
                record.args()
            )
        })
        .filter_level(default_level)
        .target(env_logger::Target::Stderr)
        .try_init()
        .ok(); // already initialized

    log_to_file(&format!("Logger initialized with level: {default_level:?}"))?;

    Ok(())
}

/// Log to file only
pub fn log_to_file(message: &str) -> Result<()> {
    let log_path = ConfigManager::log_file_path()?;

    let mut file = OpenOptions::new()
        .create(true)
        .append(true)
        .open(&log_path)
        .with_context(|| format!("Failed to open log file: {}", log_path.display()))?;

    writeln!(
        file,
        "[{}] {}",
        chrono::Local::now().format("%Y-%m-%d %H:%M:%S"),
        message
    )?;

    Ok(())
}

/// Rotate log file if it exceeds the size limit (10MB)
pub fn rotate_log_if_needed() -> Result<()> {
    let log_path = ConfigManager::log_file_path()?;

    if log_path.exists() {
        let metadata = std::fs::metadata(&log_path)?;

        if metadata.len() > MAX_LOG_SIZE {
            let old_log_path = log_path.with_extension("log.old");

            if old_log_path.exists() {
                std::fs::remove_file(&old_log_path)?;
            }

            std::fs::rename(&log_path, &old_log_path)?;

            log::info!("Log file rotated to {}", old_log_path.display());
        }
    }

    Ok(())
}
