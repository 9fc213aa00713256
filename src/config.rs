//! Configuration for the task board server.
//!
//! Settings are read from `.taskboard/taskboard.toml` and layered
//! file → environment → CLI. A missing file yields the defaults.
//!
//! # Configuration File Format
//!
//! ```toml
//! [server]
//! host = "127.0.0.1"
//! port = 3141
//! db_path = ".taskboard/board.db"
//! dev_mode = false
//!
//! [limits]
//! max_boards_per_user = 10
//!
//! [events]
//! heartbeat_interval_secs = 30
//! idle_timeout_secs = 1800
//! subscriber_buffer = 64
//! ```

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;

use crate::board::server::ServerConfig;
use crate::board::service::BoardLimits;

/// Directory holding the config file and, by default, the database.
pub const CONFIG_DIR: &str = ".taskboard";
pub const CONFIG_FILE: &str = "taskboard.toml";

pub const ENV_PORT: &str = "TASKBOARD_PORT";
pub const ENV_DB_PATH: &str = "TASKBOARD_DB_PATH";
pub const ENV_MAX_BOARDS: &str = "TASKBOARD_MAX_BOARDS_PER_USER";

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ServerSection {
    #[serde(default = "default_host")]
    pub host: String,
    #[serde(default = "default_port")]
    pub port: u16,
    #[serde(default = "default_db_path")]
    pub db_path: PathBuf,
    /// Bind on all interfaces and allow any CORS origin
    #[serde(default)]
    pub dev_mode: bool,
}

fn default_host() -> String {
    "127.0.0.1".to_string()
}

fn default_port() -> u16 {
    3141
}

fn default_db_path() -> PathBuf {
    PathBuf::from(CONFIG_DIR).join("board.db")
}

impl Default for ServerSection {
    fn default() -> Self {
        Self {
            host: default_host(),
            port: default_port(),
            db_path: default_db_path(),
            dev_mode: false,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LimitsSection {
    /// Boards a single user may collaborate on
    #[serde(default = "default_max_boards_per_user")]
    pub max_boards_per_user: u32,
}

fn default_max_boards_per_user() -> u32 {
    10
}

impl Default for LimitsSection {
    fn default() -> Self {
        Self {
            max_boards_per_user: default_max_boards_per_user(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EventsSection {
    #[serde(default = "default_heartbeat_interval_secs")]
    pub heartbeat_interval_secs: u64,
    /// Close a subscriber connection after this long without a client frame
    #[serde(default = "default_idle_timeout_secs")]
    pub idle_timeout_secs: u64,
    /// Frames queued per subscriber before it is considered stalled
    #[serde(default = "default_subscriber_buffer")]
    pub subscriber_buffer: usize,
}

fn default_heartbeat_interval_secs() -> u64 {
    30
}

fn default_idle_timeout_secs() -> u64 {
    1800
}

fn default_subscriber_buffer() -> usize {
    64
}

impl Default for EventsSection {
    fn default() -> Self {
        Self {
            heartbeat_interval_secs: default_heartbeat_interval_secs(),
            idle_timeout_secs: default_idle_timeout_secs(),
            subscriber_buffer: default_subscriber_buffer(),
        }
    }
}

/// The complete taskboard.toml configuration structure.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Default)]
pub struct BoardToml {
    #[serde(default)]
    pub server: ServerSection,
    #[serde(default)]
    pub limits: LimitsSection,
    #[serde(default)]
    pub events: EventsSection,
}

impl BoardToml {
    /// Load configuration from a TOML file.
    pub fn load(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file: {}", path.display()))?;

        Self::parse(&content)
    }

    /// Parse configuration from a TOML string.
    pub fn parse(content: &str) -> Result<Self> {
        toml::from_str(content).context("Failed to parse taskboard.toml")
    }

    /// Load `taskboard.toml` from `config_dir`, or defaults if it is absent.
    pub fn load_or_default(config_dir: &Path) -> Result<Self> {
        let config_path = config_dir.join(CONFIG_FILE);
        if config_path.exists() {
            Self::load(&config_path)
        } else {
            Ok(Self::default())
        }
    }

    /// Save configuration to a TOML file.
    pub fn save(&self, path: &Path) -> Result<()> {
        let content = toml::to_string_pretty(self).context("Failed to serialize taskboard.toml")?;
        std::fs::write(path, content)
            .with_context(|| format!("Failed to write config file: {}", path.display()))?;
        Ok(())
    }

    /// Apply environment overrides from the process environment.
    pub fn apply_env(&mut self) -> Result<()> {
        self.apply_env_from(|key| std::env::var(key).ok())
    }

    /// Apply environment overrides using `lookup` to read variables.
    pub fn apply_env_from(&mut self, lookup: impl Fn(&str) -> Option<String>) -> Result<()> {
        if let Some(port) = lookup(ENV_PORT) {
            self.server.port = port
                .trim()
                .parse()
                .with_context(|| format!("Invalid {}: {}", ENV_PORT, port))?;
        }
        if let Some(path) = lookup(ENV_DB_PATH) {
            self.server.db_path = PathBuf::from(path);
        }
        if let Some(cap) = lookup(ENV_MAX_BOARDS) {
            self.limits.max_boards_per_user = cap
                .trim()
                .parse()
                .with_context(|| format!("Invalid {}: {}", ENV_MAX_BOARDS, cap))?;
        }
        Ok(())
    }

    /// Validate the configuration and return any problems found.
    pub fn validate(&self) -> Vec<String> {
        let mut errors = Vec::new();
        let events = &self.events;

        if events.heartbeat_interval_secs == 0 {
            errors.push("events.heartbeat_interval_secs must be greater than 0".to_string());
        }
        if events.heartbeat_interval_secs >= events.idle_timeout_secs {
            errors.push(format!(
                "events.heartbeat_interval_secs ({}) must be shorter than events.idle_timeout_secs ({})",
                events.heartbeat_interval_secs, events.idle_timeout_secs
            ));
        }
        if events.subscriber_buffer == 0 {
            errors.push("events.subscriber_buffer must be greater than 0".to_string());
        }
        if self.limits.max_boards_per_user == 0 {
            errors.push("limits.max_boards_per_user must be greater than 0".to_string());
        }

        errors
    }

    /// Resolve the settings the server runs with.
    pub fn server_config(&self) -> ServerConfig {
        ServerConfig {
            host: self.server.host.clone(),
            port: self.server.port,
            db_path: self.server.db_path.clone(),
            dev_mode: self.server.dev_mode,
            limits: BoardLimits {
                max_boards_per_user: self.limits.max_boards_per_user,
            },
            heartbeat_interval: Duration::from_secs(self.events.heartbeat_interval_secs),
            idle_timeout: Duration::from_secs(self.events.idle_timeout_secs),
            subscriber_buffer: self.events.subscriber_buffer,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;
    use tempfile::tempdir;

    #[test]
    fn test_defaults() {
        let config = BoardToml::default();
        assert_eq!(config.server.port, 3141);
        assert_eq!(config.server.db_path, PathBuf::from(".taskboard/board.db"));
        assert_eq!(config.limits.max_boards_per_user, 10);
        assert_eq!(config.events.heartbeat_interval_secs, 30);
        assert_eq!(config.events.idle_timeout_secs, 1800);
        assert!(config.validate().is_empty());
    }

    #[test]
    fn test_parse_partial_file_keeps_defaults() {
        let content = r#"
[server]
port = 8080

[events]
subscriber_buffer = 16
"#;
        let config = BoardToml::parse(content).unwrap();
        assert_eq!(config.server.port, 8080);
        assert_eq!(config.server.host, "127.0.0.1");
        assert_eq!(config.events.subscriber_buffer, 16);
        assert_eq!(config.events.heartbeat_interval_secs, 30);
    }

    #[test]
    fn test_parse_invalid_toml() {
        assert!(BoardToml::parse("[server\nport = ").is_err());
    }

    #[test]
    fn test_load_or_default_missing_file() {
        let dir = tempdir().unwrap();
        let config = BoardToml::load_or_default(dir.path()).unwrap();
        assert_eq!(config, BoardToml::default());
    }

    #[test]
    fn test_save_and_load_roundtrip() {
        let dir = tempdir().unwrap();
        let mut config = BoardToml::default();
        config.server.dev_mode = true;
        config.limits.max_boards_per_user = 3;
        config.save(&dir.path().join(CONFIG_FILE)).unwrap();

        let loaded = BoardToml::load_or_default(dir.path()).unwrap();
        assert_eq!(loaded, config);
    }

    #[test]
    fn test_env_overrides_file() {
        let mut config = BoardToml::parse("[server]\nport = 8080\n").unwrap();
        let env: HashMap<&str, &str> = [
            (ENV_PORT, "9000"),
            (ENV_DB_PATH, "/tmp/other.db"),
            (ENV_MAX_BOARDS, "25"),
        ]
        .into_iter()
        .collect();
        config
            .apply_env_from(|key| env.get(key).map(|v| v.to_string()))
            .unwrap();
        assert_eq!(config.server.port, 9000);
        assert_eq!(config.server.db_path, PathBuf::from("/tmp/other.db"));
        assert_eq!(config.limits.max_boards_per_user, 25);
    }

    #[test]
    fn test_env_invalid_port() {
        let mut config = BoardToml::default();
        let err = config
            .apply_env_from(|key| (key == ENV_PORT).then(|| "not-a-port".to_string()))
            .unwrap_err();
        assert!(err.to_string().contains(ENV_PORT));
    }

    #[test]
    fn test_validate_rejects_bad_events() {
        let content = r#"
[limits]
max_boards_per_user = 0

[events]
heartbeat_interval_secs = 0
subscriber_buffer = 0
"#;
        let errors = BoardToml::parse(content).unwrap().validate();
        assert_eq!(errors.len(), 3);
        assert!(errors.iter().any(|e| e.contains("max_boards_per_user")));
        assert!(errors.iter().any(|e| e.contains("subscriber_buffer")));
    }

    #[test]
    fn test_validate_heartbeat_must_be_shorter_than_idle() {
        let content = r#"
[events]
heartbeat_interval_secs = 60
idle_timeout_secs = 60
"#;
        let errors = BoardToml::parse(content).unwrap().validate();
        assert_eq!(errors.len(), 1);
        assert!(errors[0].contains("shorter than"));
    }

    #[test]
    fn test_server_config_conversion() {
        let config = BoardToml::parse("[events]\nidle_timeout_secs = 120\n").unwrap();
        let server = config.server_config();
        assert_eq!(server.idle_timeout, Duration::from_secs(120));
        assert_eq!(server.heartbeat_interval, Duration::from_secs(30));
        assert_eq!(server.limits.max_boards_per_user, 10);
    }
}
