//! Application-level configuration loading: orchestrator tick, session expiry and code allocation.

use std::{env, fs, io::ErrorKind, path::PathBuf, time::Duration};

use serde::Deserialize;
use serde_with::{DurationMilliSeconds, DurationSeconds};
use tracing::{info, warn};

use crate::state::store::{DEFAULT_CODE_ATTEMPTS, DEFAULT_SESSION_TTL};

/// Default location on disk where the server looks for the JSON configuration.
const DEFAULT_CONFIG_PATH: &str = "config/app.json";
/// Environment variable that overrides [`DEFAULT_CONFIG_PATH`].
const CONFIG_PATH_ENV: &str = "QUICKWIZ_CONFIG_PATH";
const DEFAULT_TICK_INTERVAL: Duration = Duration::from_secs(1);
const DEFAULT_SWEEP_INTERVAL: Duration = Duration::from_secs(60 * 60);

#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(default, deny_unknown_fields)]
/// Immutable runtime configuration shared across the application.
///
/// Every key is optional in the JSON file; missing keys keep their default.
pub struct AppConfig {
    /// Period of the orchestrator countdown.
    #[serde(
        rename = "tick_interval_ms",
        with = "serde_with::As::<DurationMilliSeconds<u64>>"
    )]
    pub tick_interval: Duration,
    /// Age after which a session is removed by the sweeper.
    #[serde(
        rename = "session_ttl_secs",
        with = "serde_with::As::<DurationSeconds<u64>>"
    )]
    pub session_ttl: Duration,
    /// Period of the expiry sweep.
    #[serde(
        rename = "sweep_interval_secs",
        with = "serde_with::As::<DurationSeconds<u64>>"
    )]
    pub sweep_interval: Duration,
    /// Session codes drawn before giving up on a collision streak.
    pub code_attempts: usize,
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            tick_interval: DEFAULT_TICK_INTERVAL,
            session_ttl: DEFAULT_SESSION_TTL,
            sweep_interval: DEFAULT_SWEEP_INTERVAL,
            code_attempts: DEFAULT_CODE_ATTEMPTS,
        }
    }
}

impl AppConfig {
    /// Load the application configuration from disk, falling back to built-in defaults.
    pub fn load() -> Self {
        let path = resolve_config_path();
        match fs::read_to_string(&path) {
            Ok(contents) => match Self::from_json(&contents) {
                Ok(config) => {
                    info!(path = %path.display(), ?config, "loaded configuration");
                    config
                }
                Err(err) => {
                    warn!(
                        path = %path.display(),
                        error = %err,
                        "failed to parse config; falling back to defaults"
                    );
                    Self::default()
                }
            },
            Err(err) if err.kind() == ErrorKind::NotFound => {
                info!(
                    path = %path.display(),
                    "config file not found; using built-in defaults"
                );
                Self::default()
            }
            Err(err) => {
                warn!(
                    path = %path.display(),
                    error = %err,
                    "failed to read config; falling back to defaults"
                );
                Self::default()
            }
        }
    }

    /// Parse a configuration document.
    pub fn from_json(contents: &str) -> Result<Self, serde_json::Error> {
        let config: Self = serde_json::from_str(contents)?;
        Ok(config.sanitized())
    }

    /// Replace zero periods, which would stall or spin the background loops.
    fn sanitized(mut self) -> Self {
        if self.tick_interval.is_zero() {
            warn!("tick_interval_ms must be positive; using default");
            self.tick_interval = DEFAULT_TICK_INTERVAL;
        }
        if self.sweep_interval.is_zero() {
            warn!("sweep_interval_secs must be positive; using default");
            self.sweep_interval = DEFAULT_SWEEP_INTERVAL;
        }
        self.code_attempts = self.code_attempts.max(1);
        self
    }
}

/// Resolve the configuration path taking the environment override into account.
fn resolve_config_path() -> PathBuf {
    env::var_os(CONFIG_PATH_ENV)
        .map(PathBuf::from)
        .filter(|path| !path.as_os_str().is_empty())
        .unwrap_or_else(|| PathBuf::from(DEFAULT_CONFIG_PATH))
}
