// src/config.rs

use std::{env, path::PathBuf, str::FromStr, time::Duration};

use crate::{
    bridge::Interpreter,
    constants::{
        APP_DIR_NAME, DEFAULT_AUTO_CLEAN_INTERVAL, DEFAULT_MAX_OUTPUT_BYTES,
        DEFAULT_SCRIPT_TIMEOUT, DEFAULT_STALE_AFTER, SCRATCH_DIR_NAME,
    },
    errors::ConfigError,
};

/// Settings for the script execution bridge.
#[derive(Debug, Clone)]
pub struct BridgeConfig {
    /// Directory holding scratch script files. Created on demand.
    pub scratch_dir: PathBuf,
    /// Interpreter every script is handed to.
    pub interpreter: Interpreter,
    /// Wall-clock budget applied when the caller does not pass one.
    pub default_timeout: Duration,
    /// Combined stdout + stderr cap applied when the caller does not pass one.
    pub max_output_bytes: usize,
    /// Scratch files older than this are deleted by the sweep.
    pub stale_after: Duration,
}

impl Default for BridgeConfig {
    fn default() -> Self {
        Self {
            scratch_dir: default_scratch_dir(),
            interpreter: Interpreter::platform_default(),
            default_timeout: DEFAULT_SCRIPT_TIMEOUT,
            max_output_bytes: DEFAULT_MAX_OUTPUT_BYTES,
            stale_after: DEFAULT_STALE_AFTER,
        }
    }
}

impl BridgeConfig {
    /// Bridge settings rooted at `scratch_dir`, everything else default.
    pub fn with_scratch_dir(scratch_dir: impl Into<PathBuf>) -> Self {
        Self {
            scratch_dir: scratch_dir.into(),
            ..Default::default()
        }
    }

    pub fn interpreter(mut self, interpreter: Interpreter) -> Self {
        self.interpreter = interpreter;
        self
    }
}

/// Top level application settings.
#[derive(Debug, Clone)]
pub struct AppConfig {
    pub bridge: BridgeConfig,
    pub auto_clean_interval: Duration,
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            bridge: BridgeConfig::default(),
            auto_clean_interval: DEFAULT_AUTO_CLEAN_INTERVAL,
        }
    }
}

impl AppConfig {
    /// Loads configuration from the environment (and `.env`, if present),
    /// falling back to defaults for anything unset.
    ///
    /// | Env Var                           | Default                      |
    /// |-----------------------------------|------------------------------|
    /// | `MAXIFY_SCRATCH_DIR`              | `<data dir>/maxify/scripts`  |
    /// | `MAXIFY_SCRIPT_TIMEOUT_MS`        | `30000`                      |
    /// | `MAXIFY_MAX_OUTPUT_BYTES`         | `10485760`                   |
    /// | `MAXIFY_STALE_AFTER_SECS`         | `300`                        |
    /// | `MAXIFY_INTERPRETER`              | platform default             |
    /// | `MAXIFY_AUTO_CLEAN_INTERVAL_SECS` | `3600`                       |
    pub fn from_env() -> Result<Self, ConfigError> {
        dotenvy::dotenv().ok();

        let mut config = Self::default();

        if let Ok(dir) = env::var("MAXIFY_SCRATCH_DIR") {
            if !dir.trim().is_empty() {
                config.bridge.scratch_dir = PathBuf::from(dir.trim());
            }
        }
        if let Some(ms) = read_positive::<u64>("MAXIFY_SCRIPT_TIMEOUT_MS")? {
            config.bridge.default_timeout = Duration::from_millis(ms);
        }
        if let Some(bytes) = read_positive::<usize>("MAXIFY_MAX_OUTPUT_BYTES")? {
            config.bridge.max_output_bytes = bytes;
        }
        if let Some(secs) = read_positive::<u64>("MAXIFY_STALE_AFTER_SECS")? {
            config.bridge.stale_after = Duration::from_secs(secs);
        }
        if let Ok(name) = env::var("MAXIFY_INTERPRETER") {
            config.bridge.interpreter = Interpreter::from_name(name.trim())?;
        }
        if let Some(secs) = read_positive::<u64>("MAXIFY_AUTO_CLEAN_INTERVAL_SECS")? {
            config.auto_clean_interval = Duration::from_secs(secs);
        }

        Ok(config)
    }
}

/// `<platform data dir>/maxify/scripts`, or the temp dir when the platform has
/// no data dir.
pub fn default_scratch_dir() -> PathBuf {
    dirs::data_dir()
        .unwrap_or_else(env::temp_dir)
        .join(APP_DIR_NAME)
        .join(SCRATCH_DIR_NAME)
}

fn read_positive<T>(var: &'static str) -> Result<Option<T>, ConfigError>
where
    T: FromStr + PartialOrd + Default,
{
    match env::var(var) {
        Ok(value) if !value.trim().is_empty() => {
            parse_positive(var, &value).map(Some)
        }
        _ => Ok(None),
    }
}

fn parse_positive<T>(var: &'static str, value: &str) -> Result<T, ConfigError>
where
    T: FromStr + PartialOrd + Default,
{
    match value.trim().parse::<T>() {
        Ok(parsed) if parsed > T::default() => Ok(parsed),
        _ => Err(ConfigError::InvalidNumber {
            var,
            value: value.to_string(),
        }),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_positive_accepts_numbers() {
        let parsed: u64 = parse_positive("MAXIFY_SCRIPT_TIMEOUT_MS", " 1500 ").unwrap();
        assert_eq!(parsed, 1500);
    }

    #[test]
    fn test_parse_positive_rejects_zero_and_garbage() {
        assert!(parse_positive::<u64>("MAXIFY_SCRIPT_TIMEOUT_MS", "0").is_err());
        assert!(parse_positive::<u64>("MAXIFY_SCRIPT_TIMEOUT_MS", "soon").is_err());
        assert!(parse_positive::<usize>("MAXIFY_MAX_OUTPUT_BYTES", "-5").is_err());
    }

    #[test]
    fn test_default_scratch_dir_is_namespaced() {
        let dir = default_scratch_dir();
        assert!(dir.ends_with(PathBuf::from(APP_DIR_NAME).join(SCRATCH_DIR_NAME)));
    }

    #[test]
    fn test_bridge_defaults() {
        let config = BridgeConfig::with_scratch_dir("/tmp/maxify-test");
        assert_eq!(config.default_timeout, Duration::from_millis(30_000));
        assert_eq!(config.max_output_bytes, 10 * 1024 * 1024);
        assert_eq!(config.stale_after, Duration::from_secs(300));
    }
}
