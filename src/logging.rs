//! File logging for devassist.
//!
//! Each run writes `~/.devassist/logs/devassist_<local timestamp>.log`.
//! Runs older than the retention window are removed at startup, judged by
//! the timestamp in the file name.

use std::fs::{self, File};
use std::io;
use std::path::{Path, PathBuf};

use chrono::{Local, NaiveDateTime, TimeDelta};
use tracing_subscriber::fmt::writer::MakeWriterExt;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::{EnvFilter, fmt};

/// Default log retention in hours.
pub const DEFAULT_LOG_RETENTION_HOURS: u32 = 24;

/// Default log level.
pub const DEFAULT_LOG_LEVEL: &str = "info";

const LOG_FILE_PREFIX: &str = "devassist_";
const LOG_FILE_SUFFIX: &str = ".log";
const LOG_TIMESTAMP: &str = "%Y-%m-%d_%H-%M-%S";

/// The `log_*` keys of the config file.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LogConfig {
    /// Hours a run's log file is kept.
    pub retention_hours: u32,
    /// `EnvFilter` directive: trace, debug, info, warn, error or off.
    pub level: String,
    /// Write a log file at all.
    pub enabled: bool,
}

impl Default for LogConfig {
    fn default() -> Self {
        Self {
            retention_hours: DEFAULT_LOG_RETENTION_HOURS,
            level: DEFAULT_LOG_LEVEL.to_string(),
            enabled: true,
        }
    }
}

impl LogConfig {
    /// Applies one config key. Returns false for keys that are not logging
    /// settings; bad values keep the current setting.
    pub fn apply(&mut self, key: &str, value: &str) -> bool {
        match key {
            "log_level" => {
                if let Some(level) = normalize_level(value) {
                    self.level = level.to_string();
                } else {
                    tracing::debug!("Ignoring unknown log level: {}", value);
                }
            }
            "log_retention" | "log_retention_hours" => {
                if let Ok(hours) = value.parse() {
                    self.retention_hours = hours;
                }
            }
            "log_enabled" | "logging" => {
                self.enabled = matches!(
                    value.to_lowercase().as_str(),
                    "true" | "yes" | "1" | "on"
                );
            }
            _ => return false,
        }
        true
    }

    /// Returns true when a log file should be written.
    #[must_use]
    pub fn writes_file(&self) -> bool {
        self.enabled && self.level != "off"
    }
}

fn normalize_level(value: &str) -> Option<&'static str> {
    match value.to_lowercase().as_str() {
        "trace" => Some("trace"),
        "debug" => Some("debug"),
        "info" => Some("info"),
        "warn" | "warning" => Some("warn"),
        "error" => Some("error"),
        "off" | "none" | "disabled" => Some("off"),
        _ => None,
    }
}

/// Returns the log directory path (~/.devassist/logs/).
#[must_use]
pub fn log_directory() -> PathBuf {
    dirs::home_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join(".devassist")
        .join("logs")
}

/// File name for a run started at `started`.
#[must_use]
pub fn log_file_name(started: NaiveDateTime) -> String {
    format!(
        "{}{}{}",
        LOG_FILE_PREFIX,
        started.format(LOG_TIMESTAMP),
        LOG_FILE_SUFFIX
    )
}

/// Start time encoded in a run's log file name; `None` for foreign files.
#[must_use]
pub fn log_file_started(name: &str) -> Option<NaiveDateTime> {
    let stamp = name
        .strip_prefix(LOG_FILE_PREFIX)?
        .strip_suffix(LOG_FILE_SUFFIX)?;
    NaiveDateTime::parse_from_str(stamp, LOG_TIMESTAMP).ok()
}

/// Removes run logs in `dir` that started more than `retention_hours` before
/// `now`. Files not named like a run log are left alone.
///
/// # Errors
/// Returns error if the directory cannot be read.
pub fn cleanup_old_logs(dir: &Path, retention_hours: u32, now: NaiveDateTime) -> io::Result<u32> {
    if !dir.exists() {
        return Ok(0);
    }

    let cutoff = now - TimeDelta::hours(i64::from(retention_hours));
    let mut deleted = 0;
    for entry in fs::read_dir(dir)? {
        let path = entry?.path();
        let started = path
            .file_name()
            .and_then(|name| name.to_str())
            .and_then(log_file_started);
        if started.is_some_and(|started| started < cutoff) && fs::remove_file(&path).is_ok() {
            deleted += 1;
        }
    }
    Ok(deleted)
}

/// Initializes the logging system.
///
/// Sets up file-based logging with the specified configuration and cleans up
/// old log files. With `verbose`, debug output is also mirrored to stderr.
/// Returns the path of the log file, if one was created.
///
/// # Errors
/// Returns error if the log directory or file cannot be created.
pub fn init(config: &LogConfig, verbose: bool) -> io::Result<Option<PathBuf>> {
    let file_enabled = config.writes_file();
    if !file_enabled && !verbose {
        return Ok(None);
    }

    let mut deleted = 0;
    let mut log_path = None;
    let mut file_layer = None;

    if file_enabled {
        let dir = log_directory();
        let now = Local::now().naive_local();
        fs::create_dir_all(&dir)?;
        deleted = cleanup_old_logs(&dir, config.retention_hours, now)?;

        let path = dir.join(log_file_name(now));
        let log_file = File::create(&path)?;
        file_layer = Some(
            fmt::layer()
                .with_writer(log_file.with_max_level(tracing::Level::TRACE))
                .with_ansi(false)
                .with_target(true)
                .with_thread_ids(false)
                .with_line_number(false),
        );
        log_path = Some(path);
    }

    let stderr_layer = verbose.then(|| fmt::layer().with_writer(io::stderr).with_target(false));

    // Build the filter from config level
    let filter = if verbose {
        EnvFilter::new("debug")
    } else {
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(&config.level))
    };

    tracing_subscriber::registry()
        .with(filter)
        .with(file_layer)
        .with(stderr_layer)
        .init();

    // Log startup info
    tracing::info!("devassist logging initialized");
    if let Some(path) = &log_path {
        tracing::info!("Log file: {}", path.display());
    }
    tracing::info!("Log level: {}", if verbose { "debug" } else { config.level.as_str() });
    tracing::info!("Log retention: {} hours", config.retention_hours);
    if deleted > 0 {
        tracing::info!("Cleaned up {} old log file(s)", deleted);
    }

    Ok(log_path)
}
