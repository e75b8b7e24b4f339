//! Configuration module for devassist.
//!
//! Handles loading and parsing the .devassistrc configuration file.

pub mod platform;

use std::collections::BTreeMap;
use std::fs;
use std::io::{self, Write};
use std::path::{Path, PathBuf};
use std::time::Duration;

use crate::backend::{BackendCommand, DEFAULT_ENTRY, KillMode};
use crate::logging::LogConfig;
use crate::relay::DEFAULT_HOST;

pub use platform::{default_backend_dir, resolve_python};

/// Environment variable overriding the backend directory.
pub const BACKEND_DIR_ENV: &str = "DEVASSIST_BACKEND_DIR";

/// Environment variable carrying the backend's API key.
pub const API_KEY_ENV: &str = "HF_API_KEY";

/// Default wait for the port handshake.
pub const DEFAULT_PORT_TIMEOUT_MS: u64 = 10_000;

/// Default HTTP timeout for a single question.
pub const DEFAULT_REQUEST_TIMEOUT_MS: u64 = 120_000;

/// Default .devassistrc file content with all settings documented.
const DEFAULT_RC: &str = r#"# devassist Configuration File
# ============================
# Lines starting with '#' are comments. Format: key = value
#
# Backend
# -------
# Directory containing the backend's main.py (and optionally venv/).
# Defaults to backend/ next to the devassist executable.
# DEVASSIST_BACKEND_DIR overrides this setting.
# backend_dir = /path/to/backend
#
# Interpreter. When unset: venv/Scripts/python.exe, venv/bin/python, python.
# python = /usr/bin/python3
#
# Entry script run by the interpreter.
# entry = main.py
#
# Run the backend through the platform shell (sh -c / cmd /C).
# use_shell = false
#
# Kill the backend's whole process tree (true) or only the backend (false).
# kill_tree = true

# Timeouts
# --------
# How long to wait for the backend to announce its port.
# port_timeout_ms = 10000
#
# How long a single question may take.
# request_timeout_ms = 120000

# Credentials
# -----------
# Passed to the backend as HF_API_KEY. The HF_API_KEY environment
# variable is used when this is unset.
# hf_api_key =
#
# Refuse to start the backend without an API key.
# require_api_key = false

# Logging Configuration
# ---------------------
# Logs are stored in ~/.devassist/logs/ with automatic cleanup.
#
# log_enabled = true       # Enable/disable file logging (true/false)
# log_level = info         # Log level: trace, debug, info, warn, error, off
# log_retention = 24       # Hours to keep log files (default: 24)
"#;

/// Application configuration.
#[derive(Debug, Clone)]
pub struct Config {
    /// Directory holding the backend.
    pub backend_dir: PathBuf,
    /// Explicit interpreter (skips venv resolution).
    pub python: Option<PathBuf>,
    /// Entry script.
    pub entry: String,
    /// Spawn through the platform shell.
    pub use_shell: bool,
    /// Kill the whole process tree.
    pub kill_tree: bool,
    /// Handshake wait.
    pub port_timeout: Duration,
    /// Per-question HTTP timeout.
    pub request_timeout: Duration,
    /// Host the backend listens on.
    pub host: String,
    /// API key passed to the backend.
    pub api_key: Option<String>,
    /// Refuse to start without an API key.
    pub require_api_key: bool,
    /// Logging configuration.
    pub log_config: LogConfig,
    /// Path to config file.
    pub config_path: PathBuf,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            backend_dir: default_backend_dir(),
            python: None,
            entry: DEFAULT_ENTRY.to_string(),
            use_shell: false,
            kill_tree: true,
            port_timeout: Duration::from_millis(DEFAULT_PORT_TIMEOUT_MS),
            request_timeout: Duration::from_millis(DEFAULT_REQUEST_TIMEOUT_MS),
            host: DEFAULT_HOST.to_string(),
            api_key: None,
            require_api_key: false,
            log_config: LogConfig::default(),
            config_path: Self::default_config_path(),
        }
    }
}

impl Config {
    /// Returns the default config file path (~/.devassistrc).
    #[must_use]
    pub fn default_config_path() -> PathBuf {
        dirs::home_dir()
            .unwrap_or_else(|| PathBuf::from("."))
            .join(".devassistrc")
    }

    /// Loads configuration from the default path, creating it if it doesn't exist.
    ///
    /// # Errors
    /// Returns error if config cannot be read.
    pub fn load() -> io::Result<Self> {
        Self::load_from(&Self::default_config_path())
    }

    /// Loads configuration from a specific path, then applies environment
    /// overrides.
    ///
    /// # Errors
    /// Returns error if config cannot be read or created.
    pub fn load_from(path: &Path) -> io::Result<Self> {
        if !path.exists() {
            Self::create_default_config(path)?;
        }

        let content = fs::read_to_string(path)?;
        let mut config = Self::from_content(&content);
        config.config_path = path.to_path_buf();
        config.apply_env(|key| std::env::var(key).ok());
        Ok(config)
    }

    /// Parses config file content on top of the defaults.
    #[must_use]
    pub fn from_content(content: &str) -> Self {
        let mut config = Self::default();
        config.parse(content);
        config
    }

    /// Creates the default config file.
    fn create_default_config(path: &Path) -> io::Result<()> {
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent)?;
        }
        let mut file = fs::File::create(path)?;
        file.write_all(DEFAULT_RC.as_bytes())?;
        Ok(())
    }

    /// Parses the config file content.
    fn parse(&mut self, content: &str) {
        for line in content.lines() {
            let line = line.trim();

            // Skip comments and empty lines
            if line.is_empty() || line.starts_with('#') {
                continue;
            }

            // Parse key = value
            if let Some((key, value)) = line.split_once('=') {
                let key = key.trim();
                let value = value.trim();

                // Remove inline comments
                let value = value.split('#').next().unwrap_or(value).trim();

                self.apply_setting(key, value);
            }
        }
    }

    /// Applies a single setting.
    fn apply_setting(&mut self, key: &str, value: &str) {
        match key {
            "backend_dir" if !value.is_empty() => {
                self.backend_dir = PathBuf::from(value);
            }
            "python" if !value.is_empty() => {
                self.python = Some(PathBuf::from(value));
            }
            "entry" if !value.is_empty() => {
                self.entry = value.to_string();
            }
            "use_shell" | "shell" => {
                self.use_shell = parse_bool(value);
            }
            "kill_tree" => {
                self.kill_tree = parse_bool(value);
            }
            "port_timeout_ms" => {
                if let Ok(ms) = value.parse() {
                    self.port_timeout = Duration::from_millis(ms);
                }
            }
            "request_timeout_ms" => {
                if let Ok(ms) = value.parse() {
                    self.request_timeout = Duration::from_millis(ms);
                }
            }
            "host" if !value.is_empty() => {
                self.host = value.to_string();
            }
            "hf_api_key" | "api_key" => {
                self.api_key = (!value.is_empty()).then(|| value.to_string());
            }
            "require_api_key" => {
                self.require_api_key = parse_bool(value);
            }
            _ if self.log_config.apply(key, value) => {}
            _ => {
                tracing::debug!("Ignoring unknown config key: {}", key);
            }
        }
    }

    /// Applies environment overrides via `lookup`.
    pub fn apply_env<F>(&mut self, lookup: F)
    where
        F: Fn(&str) -> Option<String>,
    {
        if let Some(dir) = lookup(BACKEND_DIR_ENV).filter(|d| !d.is_empty()) {
            self.backend_dir = PathBuf::from(dir);
        }
        if self.api_key.is_none() {
            self.api_key = lookup(API_KEY_ENV).filter(|k| !k.is_empty());
        }
    }

    /// Command that launches the backend.
    #[must_use]
    pub fn backend_command(&self) -> BackendCommand {
        let command = BackendCommand::python(&self.backend_dir, &self.entry).with_shell(self.use_shell);
        match &self.python {
            Some(python) => command.with_program(python, vec![self.entry.clone()]),
            None => command,
        }
    }

    /// Termination mode for the backend.
    #[must_use]
    pub fn kill_mode(&self) -> KillMode {
        KillMode::from_tree_flag(self.kill_tree)
    }

    /// Extra environment passed to the backend (credential).
    #[must_use]
    pub fn backend_env_overrides(&self) -> BTreeMap<String, String> {
        let mut env = BTreeMap::new();
        if let Some(key) = &self.api_key {
            env.insert(API_KEY_ENV.to_string(), key.clone());
        }
        env
    }
}

fn parse_bool(value: &str) -> bool {
    matches!(value.to_lowercase().as_str(), "true" | "yes" | "1" | "on")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let config = Config::default();
        assert_eq!(config.entry, "main.py");
        assert!(config.kill_tree);
        assert!(!config.use_shell);
        assert_eq!(config.port_timeout, Duration::from_secs(10));
        assert_eq!(config.host, "localhost");
        assert!(config.api_key.is_none());
    }

    #[test]
    fn test_parse_settings() {
        let config = Config::from_content(
            "# comment\n\
             backend_dir = /srv/backend\n\
             python = /usr/bin/python3   # inline\n\
             use_shell = yes\n\
             kill_tree = false\n\
             port_timeout_ms = 2500\n\
             hf_api_key = hf_secret\n\
             require_api_key = on\n\
             log_level = WARNING\n\
             bogus = 1\n",
        );

        assert_eq!(config.backend_dir, PathBuf::from("/srv/backend"));
        assert_eq!(config.python, Some(PathBuf::from("/usr/bin/python3")));
        assert!(config.use_shell);
        assert_eq!(config.kill_mode(), KillMode::Single);
        assert_eq!(config.port_timeout, Duration::from_millis(2500));
        assert_eq!(config.api_key.as_deref(), Some("hf_secret"));
        assert!(config.require_api_key);
        assert_eq!(config.log_config.level, "warn");
    }

    #[test]
    fn test_invalid_timeout_keeps_default() {
        let config = Config::from_content("port_timeout_ms = soon\n");
        assert_eq!(config.port_timeout, Duration::from_millis(DEFAULT_PORT_TIMEOUT_MS));
    }

    #[test]
    fn test_env_overrides() {
        let mut config = Config::from_content("");
        config.apply_env(|key| match key {
            BACKEND_DIR_ENV => Some("/env/backend".to_string()),
            API_KEY_ENV => Some("from-env".to_string()),
            _ => None,
        });
        assert_eq!(config.backend_dir, PathBuf::from("/env/backend"));
        assert_eq!(config.api_key.as_deref(), Some("from-env"));
    }

    #[test]
    fn test_file_key_beats_env_key() {
        let mut config = Config::from_content("hf_api_key = from-file\n");
        config.apply_env(|_| Some("from-env".to_string()));
        assert_eq!(config.api_key.as_deref(), Some("from-file"));
    }

    #[test]
    fn test_backend_command_from_config() {
        let config = Config::from_content("backend_dir = /b\npython = /py\nentry = app.py\n");
        let command = config.backend_command();
        assert_eq!(command.resolve_program(), PathBuf::from("/py"));
        assert_eq!(command.args, vec!["app.py"]);
        assert_eq!(command.backend_dir, PathBuf::from("/b"));
    }

    #[test]
    fn test_env_overrides_carry_key() {
        let config = Config::from_content("hf_api_key = k\n");
        assert_eq!(
            config.backend_env_overrides().get(API_KEY_ENV).map(String::as_str),
            Some("k")
        );
        assert!(Config::default().backend_env_overrides().is_empty());
    }

    #[test]
    fn test_load_creates_default_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join(".devassistrc");
        let config = Config::load_from(&path).unwrap();

        assert!(path.exists());
        assert_eq!(config.config_path, path);
        assert!(fs::read_to_string(&path).unwrap().contains("port_timeout_ms"));
    }
}
