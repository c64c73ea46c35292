//! Daemon configuration loaded from TOML.

use std::net::{IpAddr, SocketAddr};
use std::path::{Path, PathBuf};

use remote_km_types::{ScreenGeometry, VK_SCROLL};
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::info;

/// Which side of the link this machine plays.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Mode {
    /// Capture local input and send it.
    #[default]
    Controller,
    /// Receive input and replay it locally.
    Receiver,
}

impl std::fmt::Display for Mode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Controller => write!(f, "controller"),
            Self::Receiver => write!(f, "receiver"),
        }
    }
}

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to read config {path}: {source}")]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to parse config: {0}")]
    Parse(#[from] toml::de::Error),

    #[error("failed to serialize config: {0}")]
    Serialize(#[from] toml::ser::Error),

    #[error("invalid bind address: {0}")]
    InvalidBind(String),
}

/// Top-level configuration.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Config {
    #[serde(default)]
    pub daemon: DaemonConfig,
    #[serde(default)]
    pub controller: ControllerConfig,
    #[serde(default)]
    pub input: InputConfig,
}

/// Daemon network and runtime settings.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DaemonConfig {
    #[serde(default)]
    pub mode: Mode,
    /// UDP port, used both to send and to listen.
    #[serde(default = "default_port")]
    pub port: u16,
    /// Address the receiver binds to.
    #[serde(default = "default_bind")]
    pub bind: String,
    #[serde(default = "default_log_level")]
    pub log_level: String,
}

impl Default for DaemonConfig {
    fn default() -> Self {
        Self {
            mode: Mode::default(),
            port: default_port(),
            bind: default_bind(),
            log_level: default_log_level(),
        }
    }
}

/// Controller-side settings.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ControllerConfig {
    /// IP address of the receiving machine. Empty means unset.
    #[serde(default = "default_target")]
    pub target: String,
}

impl ControllerConfig {
    /// The configured target, or `None` when left blank.
    pub fn target_host(&self) -> Option<&str> {
        let host = self.target.trim();
        (!host.is_empty()).then_some(host)
    }
}

impl Default for ControllerConfig {
    fn default() -> Self {
        Self {
            target: default_target(),
        }
    }
}

/// Input subsystem settings.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct InputConfig {
    /// Virtual-key code that toggles capture on key-up.
    #[serde(default = "default_toggle_key")]
    pub toggle_key: u8,
    /// Screen size used to bound the virtual pointer where the OS has no
    /// queryable cursor.
    #[serde(default = "default_screen_width")]
    pub screen_width: u32,
    #[serde(default = "default_screen_height")]
    pub screen_height: u32,
}

impl Default for InputConfig {
    fn default() -> Self {
        Self {
            toggle_key: default_toggle_key(),
            screen_width: default_screen_width(),
            screen_height: default_screen_height(),
        }
    }
}

fn default_port() -> u16 {
    9876
}

fn default_bind() -> String {
    "0.0.0.0".to_string()
}

fn default_log_level() -> String {
    "info".to_string()
}

fn default_target() -> String {
    "192.168.1.100".to_string()
}

fn default_toggle_key() -> u8 {
    VK_SCROLL
}

fn default_screen_width() -> u32 {
    1920
}

fn default_screen_height() -> u32 {
    1080
}

/// `<config dir>/remote-km/config.toml`.
pub fn default_config_path() -> Option<PathBuf> {
    dirs::config_dir().map(|d| d.join("remote-km").join("config.toml"))
}

impl Config {
    /// Load configuration from `path`, or the default location.
    ///
    /// A missing file means defaults.
    pub fn load(path: Option<&Path>) -> Result<Self, ConfigError> {
        let Some(path) = path.map(Path::to_path_buf).or_else(default_config_path) else {
            info!("no config directory, using defaults");
            return Ok(Self::default());
        };

        if !path.exists() {
            info!(path = %path.display(), "no config file found, using defaults");
            return Ok(Self::default());
        }

        let content = std::fs::read_to_string(&path).map_err(|source| ConfigError::Read {
            path: path.clone(),
            source,
        })?;
        let config: Self = toml::from_str(&content)?;
        info!(path = %path.display(), "loaded config");
        Ok(config)
    }

    /// Render as TOML.
    pub fn to_toml(&self) -> Result<String, ConfigError> {
        Ok(toml::to_string_pretty(self)?)
    }

    /// Local address the receiver binds to.
    pub fn bind_addr(&self) -> Result<SocketAddr, ConfigError> {
        let ip: IpAddr = self
            .daemon
            .bind
            .trim()
            .parse()
            .map_err(|_| ConfigError::InvalidBind(self.daemon.bind.clone()))?;
        Ok(SocketAddr::new(ip, self.daemon.port))
    }

    pub fn screen(&self) -> ScreenGeometry {
        ScreenGeometry::new(self.input.screen_width, self.input.screen_height)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_config_serializes() {
        let toml_str = Config::default().to_toml().unwrap();
        assert!(toml_str.contains("port = 9876"));
        assert!(toml_str.contains("mode = \"controller\""));
        assert!(toml_str.contains("target = \"192.168.1.100\""));
        assert!(toml_str.contains("toggle_key = 145"));
    }

    #[test]
    fn parse_example_config() {
        let toml_str = r#"
[daemon]
mode = "receiver"
port = 9000
bind = "127.0.0.1"
log_level = "debug"

[controller]
target = "10.0.0.7"

[input]
toggle_key = 0x7B
screen_width = 2560
screen_height = 1440
"#;
        let config: Config = toml::from_str(toml_str).unwrap();
        assert_eq!(config.daemon.mode, Mode::Receiver);
        assert_eq!(config.daemon.port, 9000);
        assert_eq!(config.controller.target, "10.0.0.7");
        assert_eq!(config.controller.target_host(), Some("10.0.0.7"));
        assert_eq!(config.input.toggle_key, 0x7B);
        assert_eq!(config.screen(), ScreenGeometry::new(2560, 1440));
        assert_eq!(
            config.bind_addr().unwrap(),
            "127.0.0.1:9000".parse::<SocketAddr>().unwrap()
        );
    }

    #[test]
    fn missing_sections_use_defaults() {
        let config: Config = toml::from_str("[daemon]\nport = 1234\n").unwrap();
        assert_eq!(config.daemon.port, 1234);
        assert_eq!(config.daemon.mode, Mode::Controller);
        assert_eq!(config.daemon.bind, "0.0.0.0");
        assert_eq!(config.input.toggle_key, VK_SCROLL);
        assert_eq!(config.controller, ControllerConfig::default());
    }

    #[test]
    fn invalid_bind_is_rejected() {
        let mut config = Config::default();
        config.daemon.bind = "nowhere".to_string();
        assert!(matches!(
            config.bind_addr(),
            Err(ConfigError::InvalidBind(_))
        ));
    }

    #[test]
    fn missing_file_means_defaults() {
        let path = std::env::temp_dir().join("remote-km-does-not-exist.toml");
        let config = Config::load(Some(&path)).unwrap();
        assert_eq!(config, Config::default());
    }

    #[test]
    fn blank_target_is_unset() {
        let config: Config = toml::from_str("[controller]\ntarget = \"  \"\n").unwrap();
        assert_eq!(config.controller.target_host(), None);
        assert_eq!(
            Config::default().controller.target_host(),
            Some("192.168.1.100")
        );
    }
}
