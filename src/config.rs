//! Runtime configuration loading.
//!
//! Values come from built-in defaults, then an optional TOML file named by
//! `PREDICT_CORE_CONFIG`, then `PREDICT_CORE_*` environment variables.
//! Invalid environment values fall back to the previous layer without crashing.
//!
//! # Environment Variables
//!
//! | Variable | Default | Description |
//! |---|---|---|
//! | `PREDICT_CORE_MAX_VERSIONS` | 2 | Versions kept per model (0 = unlimited) |
//! | `PREDICT_CORE_AVAILABILITY_WAIT_MS` | 0 | Wait for a first version (0 = fail fast) |
//! | `PREDICT_CORE_DEFAULT_TIMEOUT_MS` | 0 | Default request deadline (0 = none) |
//! | `PREDICT_CORE_EVENT_CAPACITY` | 64 | Loader feed channel capacity |
//! | `PREDICT_CORE_SHUTDOWN_TIMEOUT` | 30 | Graceful shutdown timeout (secs) |
//! | `PREDICT_CORE_LOG_LEVEL` | info | Tracing filter directive |
//! | `PREDICT_CORE_LOG_FORMAT` | json | `json` or `pretty` |

use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::dispatch::DispatcherConfig;
use crate::models::RetentionPolicy;
use crate::telemetry::{LogConfig, LogFormat};

pub const CONFIG_FILE_VAR: &str = "PREDICT_CORE_CONFIG";

const MAX_WAIT_MS: u64 = 10 * 60 * 1000;
const MAX_EVENT_CAPACITY: usize = 65_536;

#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("failed to read config file {path}: {source}")]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("invalid config file {path}: {source}")]
    Parse {
        path: PathBuf,
        #[source]
        source: toml::de::Error,
    },

    #[error("failed to render config: {0}")]
    Render(#[from] serde_json::Error),
}

/// All runtime configuration.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct RuntimeConfig {
    /// Loaded versions kept per model; 0 keeps every version.
    pub max_versions: usize,
    pub availability_wait_ms: u64,
    pub default_timeout_ms: u64,
    pub event_capacity: usize,
    pub shutdown_timeout_secs: u64,
    pub require_model_loaded: bool,
    pub log: LogConfig,
}

impl Default for RuntimeConfig {
    fn default() -> Self {
        Self {
            max_versions: 2,
            availability_wait_ms: 0,
            default_timeout_ms: 0,
            event_capacity: 64,
            shutdown_timeout_secs: 30,
            require_model_loaded: false,
            log: LogConfig::default(),
        }
    }
}

impl RuntimeConfig {
    /// Parse a TOML document. Missing keys keep their defaults.
    pub fn from_toml(raw: &str) -> Result<Self, toml::de::Error> {
        toml::from_str::<Self>(raw).map(Self::clamped)
    }

    pub fn from_file(path: &Path) -> Result<Self, ConfigError> {
        let raw = std::fs::read_to_string(path).map_err(|source| ConfigError::Read {
            path: path.to_path_buf(),
            source,
        })?;
        Self::from_toml(&raw).map_err(|source| ConfigError::Parse {
            path: path.to_path_buf(),
            source,
        })
    }

    /// Apply `PREDICT_CORE_*` overrides on top of `self`.
    pub fn with_env_overrides(self) -> Self {
        Self {
            max_versions: parse_usize("PREDICT_CORE_MAX_VERSIONS", self.max_versions),
            availability_wait_ms: parse_u64(
                "PREDICT_CORE_AVAILABILITY_WAIT_MS",
                self.availability_wait_ms,
            ),
            default_timeout_ms: parse_u64("PREDICT_CORE_DEFAULT_TIMEOUT_MS", self.default_timeout_ms),
            event_capacity: parse_usize("PREDICT_CORE_EVENT_CAPACITY", self.event_capacity),
            shutdown_timeout_secs: parse_u64(
                "PREDICT_CORE_SHUTDOWN_TIMEOUT",
                self.shutdown_timeout_secs,
            ),
            require_model_loaded: self.require_model_loaded,
            log: LogConfig {
                level: parse_string("PREDICT_CORE_LOG_LEVEL", self.log.level),
                format: parse_format("PREDICT_CORE_LOG_FORMAT", self.log.format),
                output_path: self.log.output_path,
            },
        }
        .clamped()
    }

    fn clamped(mut self) -> Self {
        self.availability_wait_ms = self.availability_wait_ms.min(MAX_WAIT_MS);
        self.event_capacity = self.event_capacity.clamp(1, MAX_EVENT_CAPACITY);
        self.shutdown_timeout_secs = self.shutdown_timeout_secs.max(1);
        self
    }

    pub fn retention(&self) -> RetentionPolicy {
        match self.max_versions {
            0 => RetentionPolicy::unlimited(),
            n => RetentionPolicy::keep_latest(n),
        }
    }

    pub fn dispatcher(&self) -> DispatcherConfig {
        DispatcherConfig {
            availability_wait: non_zero_ms(self.availability_wait_ms),
            default_timeout: non_zero_ms(self.default_timeout_ms),
        }
    }

    pub fn shutdown_timeout(&self) -> Duration {
        Duration::from_secs(self.shutdown_timeout_secs)
    }

    /// Effective values as pretty JSON.
    pub fn effective_json(&self) -> Result<String, ConfigError> {
        Ok(serde_json::to_string_pretty(self)?)
    }
}

/// Load configuration: defaults, then the optional file, then the environment.
pub fn load() -> Result<RuntimeConfig, ConfigError> {
    let base = match std::env::var_os(CONFIG_FILE_VAR) {
        Some(path) if !path.is_empty() => RuntimeConfig::from_file(Path::new(&path))?,
        _ => RuntimeConfig::default(),
    };
    Ok(base.with_env_overrides())
}

fn non_zero_ms(ms: u64) -> Option<Duration> {
    (ms > 0).then(|| Duration::from_millis(ms))
}

/// Parse a `usize` env var, returning `default` on missing or invalid.
fn parse_usize(key: &str, default: usize) -> usize {
    match std::env::var(key) {
        Ok(val) => val.trim().parse::<usize>().unwrap_or(default),
        Err(_) => default,
    }
}

/// Parse a `u64` env var, returning `default` on missing or invalid.
fn parse_u64(key: &str, default: u64) -> u64 {
    match std::env::var(key) {
        Ok(val) => val.trim().parse::<u64>().unwrap_or(default),
        Err(_) => default,
    }
}

fn parse_string(key: &str, default: String) -> String {
    match std::env::var(key) {
        Ok(val) if !val.trim().is_empty() => val.trim().to_string(),
        _ => default,
    }
}

fn parse_format(key: &str, default: LogFormat) -> LogFormat {
    match std::env::var(key) {
        Ok(val) => val.parse().unwrap_or(default),
        Err(_) => default,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;
    use std::sync::Mutex;

    // Serialize env-mutating tests to avoid cross-test pollution.
    static ENV_LOCK: Mutex<()> = Mutex::new(());

    const ENV_KEYS: &[&str] = &[
        "PREDICT_CORE_MAX_VERSIONS",
        "PREDICT_CORE_AVAILABILITY_WAIT_MS",
        "PREDICT_CORE_DEFAULT_TIMEOUT_MS",
        "PREDICT_CORE_EVENT_CAPACITY",
        "PREDICT_CORE_SHUTDOWN_TIMEOUT",
        "PREDICT_CORE_LOG_LEVEL",
        "PREDICT_CORE_LOG_FORMAT",
        CONFIG_FILE_VAR,
    ];

    fn clear_env_vars() {
        for k in ENV_KEYS {
            std::env::remove_var(k);
        }
    }

    #[test]
    fn test_defaults_are_sensible() {
        let _lock = ENV_LOCK.lock().unwrap();
        clear_env_vars();
        let cfg = load().unwrap();
        assert_eq!(cfg, RuntimeConfig::default());
        assert_eq!(cfg.retention(), RetentionPolicy::keep_latest(2));
        assert_eq!(cfg.dispatcher(), DispatcherConfig::default());
        assert_eq!(cfg.shutdown_timeout(), Duration::from_secs(30));
        assert_eq!(cfg.log.format, LogFormat::Json);
    }

    #[test]
    fn test_env_vars_override_defaults() {
        let _lock = ENV_LOCK.lock().unwrap();
        clear_env_vars();
        std::env::set_var("PREDICT_CORE_MAX_VERSIONS", "0");
        std::env::set_var("PREDICT_CORE_AVAILABILITY_WAIT_MS", "250");
        std::env::set_var("PREDICT_CORE_DEFAULT_TIMEOUT_MS", "5000");
        std::env::set_var("PREDICT_CORE_LOG_FORMAT", "pretty");
        std::env::set_var("PREDICT_CORE_LOG_LEVEL", "predict_core=debug");
        let cfg = load().unwrap();
        assert_eq!(cfg.retention(), RetentionPolicy::unlimited());
        let dispatch = cfg.dispatcher();
        assert_eq!(dispatch.availability_wait, Some(Duration::from_millis(250)));
        assert_eq!(dispatch.default_timeout, Some(Duration::from_secs(5)));
        assert_eq!(cfg.log.format, LogFormat::Pretty);
        assert_eq!(cfg.log.level, "predict_core=debug");
        clear_env_vars();
    }

    #[test]
    fn test_invalid_env_falls_back_to_default() {
        let _lock = ENV_LOCK.lock().unwrap();
        clear_env_vars();
        std::env::set_var("PREDICT_CORE_MAX_VERSIONS", "many");
        std::env::set_var("PREDICT_CORE_EVENT_CAPACITY", "-3");
        std::env::set_var("PREDICT_CORE_LOG_FORMAT", "xml");
        let cfg = load().unwrap();
        assert_eq!(cfg.max_versions, 2);
        assert_eq!(cfg.event_capacity, 64);
        assert_eq!(cfg.log.format, LogFormat::Json);
        clear_env_vars();
    }

    #[test]
    fn test_values_are_clamped() {
        let _lock = ENV_LOCK.lock().unwrap();
        clear_env_vars();
        std::env::set_var("PREDICT_CORE_EVENT_CAPACITY", "0");
        std::env::set_var("PREDICT_CORE_SHUTDOWN_TIMEOUT", "0");
        std::env::set_var("PREDICT_CORE_AVAILABILITY_WAIT_MS", "999999999");
        let cfg = load().unwrap();
        assert_eq!(cfg.event_capacity, 1);
        assert_eq!(cfg.shutdown_timeout_secs, 1);
        assert_eq!(cfg.availability_wait_ms, MAX_WAIT_MS);
        clear_env_vars();
    }

    #[test]
    fn test_file_then_env_layering() {
        let _lock = ENV_LOCK.lock().unwrap();
        clear_env_vars();
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(
            file,
            "max_versions = 5\nevent_capacity = 8\n\n[log]\nformat = \"pretty\"\nlevel = \"warn\""
        )
        .unwrap();
        std::env::set_var(CONFIG_FILE_VAR, file.path());
        std::env::set_var("PREDICT_CORE_EVENT_CAPACITY", "16");
        let cfg = load().unwrap();
        assert_eq!(cfg.max_versions, 5);
        assert_eq!(cfg.event_capacity, 16);
        assert_eq!(cfg.log.format, LogFormat::Pretty);
        assert_eq!(cfg.log.level, "warn");
        assert_eq!(cfg.shutdown_timeout_secs, 30);
        clear_env_vars();
    }

    #[test]
    fn test_unreadable_or_invalid_file_is_an_error() {
        let _lock = ENV_LOCK.lock().unwrap();
        clear_env_vars();
        std::env::set_var(CONFIG_FILE_VAR, "/nonexistent/predict-core.toml");
        assert!(matches!(load(), Err(ConfigError::Read { .. })));

        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(file, "max_versions = \"two\"").unwrap();
        std::env::set_var(CONFIG_FILE_VAR, file.path());
        assert!(matches!(load(), Err(ConfigError::Parse { .. })));
        clear_env_vars();
    }

    #[test]
    fn test_effective_json_lists_every_field() {
        let json = RuntimeConfig::default().effective_json().unwrap();
        let value: serde_json::Value = serde_json::from_str(&json).unwrap();
        for key in [
            "max_versions",
            "availability_wait_ms",
            "default_timeout_ms",
            "event_capacity",
            "shutdown_timeout_secs",
            "log",
        ] {
            assert!(value.get(key).is_some(), "missing {key}");
        }
    }
}
