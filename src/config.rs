use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::dashboard::DashboardTimers;
use crate::session::SessionTimers;

/// Portal connection and cadence settings, loaded from TOML.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PortalConfig {
    /// Base URL of the portal backend, e.g. `http://portal.internal:8000`.
    pub base_url: String,
    /// Bearer token for authenticated portals.
    pub token: Option<String>,
    /// Command used to open a service window (the URL is appended).
    #[serde(default = "default_viewer")]
    pub viewer: String,
    #[serde(default)]
    pub intervals: Intervals,
}

/// All cadences in one section. Defaults match the portal's production
/// values.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Intervals {
    /// Per-access and page-presence heartbeat cadence, seconds.
    #[serde(default = "default_heartbeat_secs")]
    pub heartbeat_secs: u64,
    /// Window close-watch poll, milliseconds.
    #[serde(default = "default_close_poll_ms")]
    pub close_poll_ms: u64,
    /// Dashboard status poll, seconds.
    #[serde(default = "default_status_secs")]
    pub status_secs: u64,
    /// User-monitoring view status poll, seconds.
    #[serde(default = "default_monitor_secs")]
    pub monitor_secs: u64,
    /// Per-request timeout, seconds.
    #[serde(default = "default_timeout_secs")]
    pub request_timeout_secs: u64,
}

fn default_viewer() -> String {
    "xdg-open".to_string()
}
fn default_heartbeat_secs() -> u64 {
    300
}
fn default_close_poll_ms() -> u64 {
    1000
}
fn default_status_secs() -> u64 {
    30
}
fn default_monitor_secs() -> u64 {
    60
}
fn default_timeout_secs() -> u64 {
    5
}

impl Default for Intervals {
    fn default() -> Self {
        Self {
            heartbeat_secs: default_heartbeat_secs(),
            close_poll_ms: default_close_poll_ms(),
            status_secs: default_status_secs(),
            monitor_secs: default_monitor_secs(),
            request_timeout_secs: default_timeout_secs(),
        }
    }
}

impl Intervals {
    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.request_timeout_secs)
    }

    /// Timer set for the dashboard view.
    pub fn dashboard_timers(&self) -> DashboardTimers {
        DashboardTimers {
            status_interval: Duration::from_secs(self.status_secs),
            presence_interval: Duration::from_secs(self.heartbeat_secs),
            session: SessionTimers {
                heartbeat_interval: Duration::from_secs(self.heartbeat_secs),
                close_poll: Duration::from_millis(self.close_poll_ms),
            },
        }
    }

    /// Timer set for the user-monitoring view (slower status cadence).
    pub fn monitor_timers(&self) -> DashboardTimers {
        DashboardTimers {
            status_interval: Duration::from_secs(self.monitor_secs),
            ..self.dashboard_timers()
        }
    }
}

impl PortalConfig {
    /// Load config from a TOML file path. Returns None if file doesn't exist.
    ///
    /// Checks file permissions and warns if world-readable.
    pub fn load(path: &std::path::Path) -> Result<Option<Self>, ConfigError> {
        if !path.exists() {
            return Ok(None);
        }

        // Warn if the config file is world-readable (may contain a token).
        check_config_permissions(path);

        let contents = std::fs::read_to_string(path)
            .map_err(|e| ConfigError::ReadFailed(path.to_path_buf(), e))?;
        let config: Self =
            toml::from_str(&contents).map_err(|e| ConfigError::ParseFailed(path.to_path_buf(), e))?;
        Ok(Some(config))
    }

    /// Save config to a TOML file path.
    pub fn save(&self, path: &std::path::Path) -> Result<(), ConfigError> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)
                .map_err(|e| ConfigError::WriteFailed(path.to_path_buf(), e))?;
        }
        let contents =
            toml::to_string_pretty(self).map_err(ConfigError::SerializeFailed)?;
        std::fs::write(path, contents)
            .map_err(|e| ConfigError::WriteFailed(path.to_path_buf(), e))?;
        Ok(())
    }

    /// Default on-disk location: `<config_dir>/svcwatch/config.toml`.
    pub fn default_path() -> std::path::PathBuf {
        dirs::config_dir()
            .unwrap_or_else(|| std::path::PathBuf::from("."))
            .join("svcwatch")
            .join("config.toml")
    }
}

/// Errors that can occur when loading or saving config.
#[derive(Debug)]
pub enum ConfigError {
    ReadFailed(std::path::PathBuf, std::io::Error),
    ParseFailed(std::path::PathBuf, toml::de::Error),
    WriteFailed(std::path::PathBuf, std::io::Error),
    SerializeFailed(toml::ser::Error),
}

impl std::fmt::Display for ConfigError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::ReadFailed(path, e) => {
                write!(f, "Failed to read config {}: {}", path.display(), e)
            }
            Self::ParseFailed(path, e) => {
                write!(f, "Failed to parse config {}: {}", path.display(), e)
            }
            Self::WriteFailed(path, e) => {
                write!(f, "Failed to write config {}: {}", path.display(), e)
            }
            Self::SerializeFailed(e) => write!(f, "Failed to serialize config: {}", e),
        }
    }
}

impl std::error::Error for ConfigError {}

/// Check file permissions on a config file and warn if world-readable.
///
/// On Unix, checks `st_mode & 0o004` (world-readable bit). If set, logs a
/// warning because the config file may contain an authentication token.
#[cfg(unix)]
pub fn check_config_permissions(path: &std::path::Path) {
    use std::os::unix::fs::PermissionsExt;

    let metadata = match std::fs::metadata(path) {
        Ok(m) => m,
        Err(_) => return, // File doesn't exist or can't be read; nothing to warn about.
    };

    let mode = metadata.permissions().mode();
    if mode & 0o004 != 0 {
        tracing::warn!(
            "Config file {} is world-readable (mode {:o}). \
             It may contain a token -- consider restricting permissions to 600.",
            path.display(),
            mode & 0o7777,
        );
    }
}

/// No-op on non-Unix platforms.
#[cfg(not(unix))]
pub fn check_config_permissions(_path: &std::path::Path) {}
