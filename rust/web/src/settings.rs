use serde::{Deserialize, Serialize};
use std::fs;
use std::path::Path;
use std::time::Duration;
use thiserror::Error;

pub const ENV_SESSION_TTL: &str = "KAZHUTHA_SESSION_TTL_MINUTES";
pub const ENV_FINISHED_TTL: &str = "KAZHUTHA_FINISHED_TTL_MINUTES";
pub const ENV_SWEEP_INTERVAL: &str = "KAZHUTHA_SWEEP_INTERVAL_SECS";
pub const ENV_KEEP_ALIVE: &str = "KAZHUTHA_KEEP_ALIVE_SECS";

/// Server tuning knobs.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct AppSettings {
    /// Idle minutes before a lobby or running game is evicted
    pub session_ttl_minutes: u64,
    /// Idle minutes before a finished game is evicted
    pub finished_session_ttl_minutes: u64,
    /// Seconds between eviction sweeps
    pub sweep_interval_secs: u64,
    /// Seconds between keep-alive comments on event streams
    pub keep_alive_secs: u64,
}

impl Default for AppSettings {
    fn default() -> Self {
        Self {
            session_ttl_minutes: 120,
            finished_session_ttl_minutes: 30,
            sweep_interval_secs: 60,
            keep_alive_secs: 30,
        }
    }
}

#[derive(Debug, Default, Deserialize)]
#[serde(deny_unknown_fields)]
struct FileSettings {
    #[serde(default)]
    session_ttl_minutes: Option<u64>,
    #[serde(default)]
    finished_session_ttl_minutes: Option<u64>,
    #[serde(default)]
    sweep_interval_secs: Option<u64>,
    #[serde(default)]
    keep_alive_secs: Option<u64>,
}

impl AppSettings {
    /// Defaults, then the optional TOML file, then `KAZHUTHA_*` environment
    /// variables; the result is validated.
    pub fn load(path: Option<&Path>) -> Result<Self, SettingsError> {
        Self::load_with_env(path, |key| std::env::var(key).ok())
    }

    /// Same as [`AppSettings::load`] with a caller-supplied environment.
    pub fn load_with_env<E>(path: Option<&Path>, env: E) -> Result<Self, SettingsError>
    where
        E: Fn(&str) -> Option<String>,
    {
        let mut settings = Self::default();

        if let Some(path) = path {
            let raw = fs::read_to_string(path).map_err(|source| SettingsError::Io {
                path: path.display().to_string(),
                source,
            })?;
            let file: FileSettings = toml::from_str(&raw)?;
            if let Some(v) = file.session_ttl_minutes {
                settings.session_ttl_minutes = v;
            }
            if let Some(v) = file.finished_session_ttl_minutes {
                settings.finished_session_ttl_minutes = v;
            }
            if let Some(v) = file.sweep_interval_secs {
                settings.sweep_interval_secs = v;
            }
            if let Some(v) = file.keep_alive_secs {
                settings.keep_alive_secs = v;
            }
        }

        let overrides: [(&str, &mut u64); 4] = [
            (ENV_SESSION_TTL, &mut settings.session_ttl_minutes),
            (ENV_FINISHED_TTL, &mut settings.finished_session_ttl_minutes),
            (ENV_SWEEP_INTERVAL, &mut settings.sweep_interval_secs),
            (ENV_KEEP_ALIVE, &mut settings.keep_alive_secs),
        ];
        for (key, slot) in overrides {
            if let Some(raw) = env(key).filter(|v| !v.is_empty()) {
                *slot = raw
                    .trim()
                    .parse()
                    .map_err(|_| SettingsError::InvalidValue(format!("{key} must be a number")))?;
            }
        }

        settings.validate()?;
        Ok(settings)
    }

    /// Validate settings values
    pub fn validate(&self) -> Result<(), SettingsError> {
        let fields = [
            ("session_ttl_minutes", self.session_ttl_minutes),
            ("finished_session_ttl_minutes", self.finished_session_ttl_minutes),
            ("sweep_interval_secs", self.sweep_interval_secs),
            ("keep_alive_secs", self.keep_alive_secs),
        ];
        for (name, value) in fields {
            if value == 0 {
                return Err(SettingsError::InvalidValue(format!(
                    "{name} must be greater than 0"
                )));
            }
        }
        Ok(())
    }

    pub fn session_ttl(&self) -> Duration {
        Duration::from_secs(self.session_ttl_minutes.saturating_mul(60))
    }

    pub fn finished_session_ttl(&self) -> Duration {
        Duration::from_secs(self.finished_session_ttl_minutes.saturating_mul(60))
    }

    pub fn sweep_interval(&self) -> Duration {
        Duration::from_secs(self.sweep_interval_secs)
    }

    pub fn keep_alive(&self) -> Duration {
        Duration::from_secs(self.keep_alive_secs)
    }
}

#[derive(Debug, Error)]
pub enum SettingsError {
    #[error("Invalid settings value: {0}")]
    InvalidValue(String),
    #[error("Failed to read settings file {path}: {source}")]
    Io {
        path: String,
        #[source]
        source: std::io::Error,
    },
    #[error("Failed to parse settings file: {0}")]
    Parse(#[from] toml::de::Error),
}
