//! Client configuration persisted as TOML in the app directory.
//!
//! Config keys: `server_url`, `count_selector`, `menu_selector`,
//! `check_interval_ms`, `check_url`, `mark_read_url`, `delete_url`,
//! `mark_all_read_url`, `list_url`, `push_url`, `push_reconnect_ms`,
//! `notification_title`, `notification_icon`, `csrf_cookie_name`.
//! Every key is optional; a missing file yields the defaults.

use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::{Deserialize, Serialize};
use thiserror::Error;
use url::Url;

use crate::app_dirs;
use crate::NotificationId;

/// Default filename used to store the client configuration.
pub const CONFIG_FILE_NAME: &str = "config.toml";
/// Placeholder replaced by the notification id in endpoint templates.
pub const ID_PLACEHOLDER: &str = "{id}";

const MIN_CHECK_INTERVAL_MS: u64 = 1_000;
const MIN_PUSH_RECONNECT_MS: u64 = 100;

/// Errors that may occur while loading, saving or resolving configuration.
#[derive(Debug, Error)]
pub enum ConfigError {
    /// No usable config directory found.
    #[error("No suitable config directory found")]
    NoConfigDir,
    /// Failed to create the config directory.
    #[error("Unable to create config directory {path}: {source}")]
    CreateDir {
        path: PathBuf,
        source: std::io::Error,
    },
    /// Failed to read the config file.
    #[error("Failed to read {path}: {source}")]
    Read {
        path: PathBuf,
        source: std::io::Error,
    },
    /// Failed to write the config file.
    #[error("Failed to write {path}: {source}")]
    Write {
        path: PathBuf,
        source: std::io::Error,
    },
    /// Failed to parse TOML config.
    #[error("Invalid config at {path}: {source}")]
    ParseToml {
        path: PathBuf,
        source: toml::de::Error,
    },
    /// Failed to serialize config to TOML.
    #[error("Failed to serialize config to TOML at {path}: {source}")]
    SerializeToml {
        path: PathBuf,
        source: toml::ser::Error,
    },
    /// A configured URL could not be parsed or joined.
    #[error("Invalid URL '{url}': {source}")]
    InvalidUrl {
        url: String,
        source: url::ParseError,
    },
}

/// Settings for a [`crate::NotificationClient`] and the CLI around it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ClientConfig {
    /// Base URL every endpoint path is resolved against.
    #[serde(default = "default_server_url")]
    pub server_url: String,
    /// Selector of the numeric unread counter.
    #[serde(default = "default_count_selector")]
    pub count_selector: String,
    /// Selector of the badge container that holds the indicator dot.
    #[serde(default = "default_menu_selector")]
    pub menu_selector: String,
    /// Poll period in milliseconds.
    #[serde(default = "default_check_interval_ms")]
    pub check_interval_ms: u64,
    #[serde(default = "default_check_url")]
    pub check_url: String,
    /// Mark-read endpoint template containing `{id}`.
    #[serde(default = "default_mark_read_url")]
    pub mark_read_url: String,
    /// Delete endpoint template containing `{id}`.
    #[serde(default = "default_delete_url")]
    pub delete_url: String,
    #[serde(default = "default_mark_all_read_url")]
    pub mark_all_read_url: String,
    /// Notification list page, opened when a popup is activated.
    #[serde(default = "default_list_url")]
    pub list_url: String,
    /// Push channel used when the page does not advertise one.
    #[serde(default)]
    pub push_url: Option<String>,
    /// Fixed delay before reopening a closed push channel.
    #[serde(default = "default_push_reconnect_ms")]
    pub push_reconnect_ms: u64,
    #[serde(default = "default_notification_title")]
    pub notification_title: String,
    #[serde(default = "default_notification_icon")]
    pub notification_icon: String,
    /// Cookie holding the anti-forgery token.
    #[serde(default = "default_csrf_cookie_name")]
    pub csrf_cookie_name: String,
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            server_url: default_server_url(),
            count_selector: default_count_selector(),
            menu_selector: default_menu_selector(),
            check_interval_ms: default_check_interval_ms(),
            check_url: default_check_url(),
            mark_read_url: default_mark_read_url(),
            delete_url: default_delete_url(),
            mark_all_read_url: default_mark_all_read_url(),
            list_url: default_list_url(),
            push_url: None,
            push_reconnect_ms: default_push_reconnect_ms(),
            notification_title: default_notification_title(),
            notification_icon: default_notification_icon(),
            csrf_cookie_name: default_csrf_cookie_name(),
        }
    }
}

impl ClientConfig {
    /// Clamp timing values that would otherwise spin a thread.
    pub fn normalized(mut self) -> Self {
        self.check_interval_ms = self.check_interval_ms.max(MIN_CHECK_INTERVAL_MS);
        self.push_reconnect_ms = self.push_reconnect_ms.max(MIN_PUSH_RECONNECT_MS);
        self
    }

    pub fn check_interval(&self) -> Duration {
        Duration::from_millis(self.check_interval_ms)
    }

    pub fn push_reconnect_delay(&self) -> Duration {
        Duration::from_millis(self.push_reconnect_ms)
    }

    /// Resolve a path (or absolute URL) against `server_url`.
    pub fn resolve(&self, path: &str) -> Result<Url, ConfigError> {
        let base = Url::parse(&self.server_url).map_err(|source| ConfigError::InvalidUrl {
            url: self.server_url.clone(),
            source,
        })?;
        base.join(path).map_err(|source| ConfigError::InvalidUrl {
            url: path.to_string(),
            source,
        })
    }

    pub fn mark_read_path(&self, id: NotificationId) -> String {
        fill_id(&self.mark_read_url, id)
    }

    pub fn delete_path(&self, id: NotificationId) -> String {
        fill_id(&self.delete_url, id)
    }
}

fn fill_id(template: &str, id: NotificationId) -> String {
    template.replace(ID_PLACEHOLDER, &id.to_string())
}

/// Resolve the default configuration file path, creating its directory.
pub fn config_path() -> Result<PathBuf, ConfigError> {
    let dir = app_dirs::app_root_dir().map_err(map_app_dir_error)?;
    Ok(dir.join(CONFIG_FILE_NAME))
}

/// Load the default configuration file, returning defaults if it is missing.
pub fn load_or_default() -> Result<ClientConfig, ConfigError> {
    load_from(&config_path()?)
}

/// Load configuration from `path`, returning defaults if it is missing.
pub fn load_from(path: &Path) -> Result<ClientConfig, ConfigError> {
    if !path.exists() {
        return Ok(ClientConfig::default());
    }
    let text = std::fs::read_to_string(path).map_err(|source| ConfigError::Read {
        path: path.to_path_buf(),
        source,
    })?;
    toml::from_str::<ClientConfig>(&text)
        .map(ClientConfig::normalized)
        .map_err(|source| ConfigError::ParseToml {
            path: path.to_path_buf(),
            source,
        })
}

/// Save configuration to `path`, creating parent directories as needed.
pub fn save_to_path(config: &ClientConfig, path: &Path) -> Result<(), ConfigError> {
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent).map_err(|source| ConfigError::CreateDir {
            path: parent.to_path_buf(),
            source,
        })?;
    }
    let data = toml::to_string_pretty(config).map_err(|source| ConfigError::SerializeToml {
        path: path.to_path_buf(),
        source,
    })?;
    std::fs::write(path, data).map_err(|source| ConfigError::Write {
        path: path.to_path_buf(),
        source,
    })
}

fn map_app_dir_error(error: app_dirs::AppDirError) -> ConfigError {
    match error {
        app_dirs::AppDirError::NoBaseDir => ConfigError::NoConfigDir,
        app_dirs::AppDirError::CreateDir { path, source } => {
            ConfigError::CreateDir { path, source }
        }
    }
}

fn default_server_url() -> String {
    "http://127.0.0.1:8000/".to_string()
}

fn default_count_selector() -> String {
    "#notification-count".to_string()
}

fn default_menu_selector() -> String {
    "#notification-menu".to_string()
}

fn default_check_interval_ms() -> u64 {
    30_000
}

fn default_check_url() -> String {
    "/notifications/unread-count/".to_string()
}

fn default_mark_read_url() -> String {
    "/notifications/{id}/mark-read/".to_string()
}

fn default_delete_url() -> String {
    "/notifications/{id}/delete/".to_string()
}

fn default_mark_all_read_url() -> String {
    "/notifications/mark-all-read/".to_string()
}

fn default_list_url() -> String {
    "/notifications/".to_string()
}

fn default_push_reconnect_ms() -> u64 {
    5_000
}

fn default_notification_title() -> String {
    "SnapFlow".to_string()
}

fn default_notification_icon() -> String {
    "/static/img/logo.png".to_string()
}

fn default_csrf_cookie_name() -> String {
    "csrftoken".to_string()
}
