use crate::constants::{
    DEFAULT_HOST_IDENTIFIER, DEFAULT_SESSION_MINUTES, DEFAULT_SYSTEM_UI_IDENTIFIER,
    ENFORCEMENT_POLL_INTERVAL, HIDE_DEBOUNCE, MONITOR_TICK_INTERVAL, USAGE_WINDOW,
};
use crate::error::ConfigError;
use directories::ProjectDirs;
use log::info;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;

const CONFIG_FILE_NAME: &str = "config.toml";

/// Runtime configuration, read from `config.toml` in the project config directory.
///
/// Every field is optional in the file; missing fields take the defaults below.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct FocusConfig {
    /// Identifier of the application hosting the focus session. Never blocked.
    pub host_identifier: String,
    /// System UI (status bar, recents) identifier seeded into every allowlist.
    pub system_ui_identifier: String,
    pub monitor_interval_ms: u64,
    pub enforcement_interval_ms: u64,
    pub hide_debounce_ms: u64,
    pub usage_window_ms: u64,
    pub default_session_minutes: i64,
    /// Also spare system applications that are not on the allowlist.
    pub exempt_system_apps: bool,
}

impl Default for FocusConfig {
    fn default() -> Self {
        Self {
            host_identifier: DEFAULT_HOST_IDENTIFIER.to_string(),
            system_ui_identifier: DEFAULT_SYSTEM_UI_IDENTIFIER.to_string(),
            monitor_interval_ms: duration_ms(MONITOR_TICK_INTERVAL),
            enforcement_interval_ms: duration_ms(ENFORCEMENT_POLL_INTERVAL),
            hide_debounce_ms: duration_ms(HIDE_DEBOUNCE),
            usage_window_ms: duration_ms(USAGE_WINDOW),
            default_session_minutes: DEFAULT_SESSION_MINUTES,
            exempt_system_apps: false,
        }
    }
}

fn duration_ms(duration: Duration) -> u64 {
    u64::try_from(duration.as_millis()).unwrap_or(u64::MAX)
}

/// Location of the config file, `<config_dir>/config.toml`.
pub fn config_path() -> Result<PathBuf, ConfigError> {
    let proj_dirs =
        ProjectDirs::from("com", "focus-shield", "FocusShield").ok_or(ConfigError::NoProjectDirs)?;
    Ok(proj_dirs.config_dir().join(CONFIG_FILE_NAME))
}

impl FocusConfig {
    /// Load from the default location.
    pub fn load() -> Result<Self, ConfigError> {
        Self::load_from(&config_path()?)
    }

    /// Load from `path`. A missing file yields the defaults.
    pub fn load_from(path: &Path) -> Result<Self, ConfigError> {
        if !path.exists() {
            info!("No config at {}, using defaults", path.display());
            return Ok(Self::default());
        }

        let raw = std::fs::read_to_string(path).map_err(|source| ConfigError::Read {
            path: path.to_path_buf(),
            source,
        })?;
        let config: Self = toml::from_str(&raw).map_err(|source| ConfigError::Parse {
            path: path.to_path_buf(),
            source,
        })?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.host_identifier.trim().is_empty() {
            return Err(ConfigError::Invalid {
                field: "host_identifier",
                reason: "cannot be empty".into(),
            });
        }
        if self.system_ui_identifier.trim().is_empty() {
            return Err(ConfigError::Invalid {
                field: "system_ui_identifier",
                reason: "cannot be empty".into(),
            });
        }

        let intervals = [
            ("monitor_interval_ms", self.monitor_interval_ms),
            ("enforcement_interval_ms", self.enforcement_interval_ms),
            ("hide_debounce_ms", self.hide_debounce_ms),
            ("usage_window_ms", self.usage_window_ms),
        ];
        for (field, value) in intervals {
            if value == 0 {
                return Err(ConfigError::Invalid {
                    field,
                    reason: "must be positive".into(),
                });
            }
        }

        if self.default_session_minutes < 0 {
            return Err(ConfigError::Invalid {
                field: "default_session_minutes",
                reason: "cannot be negative".into(),
            });
        }
        Ok(())
    }

    pub fn monitor_interval(&self) -> Duration {
        Duration::from_millis(self.monitor_interval_ms)
    }

    pub fn enforcement_interval(&self) -> Duration {
        Duration::from_millis(self.enforcement_interval_ms)
    }

    pub fn hide_debounce(&self) -> Duration {
        Duration::from_millis(self.hide_debounce_ms)
    }

    pub fn usage_window(&self) -> Duration {
        Duration::from_millis(self.usage_window_ms)
    }
}
