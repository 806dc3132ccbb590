//! Configuration system for the chat client
//!
//! Supports multiple configuration sources with the following precedence (highest to lowest):
//! 1. CLI arguments
//! 2. Environment variables (CHAT_CLIENT_* prefix)
//! 3. Configuration file (TOML)
//! 4. Default values

use std::fs;
use std::path::PathBuf;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use tracing::{debug, info};

use crate::commands::validate_username;
use crate::error::{Error, Result};
use crate::supervisor::{HeartbeatSettings, ReconnectSettings};
use crate::transport::ServerEndpoint;

/// Main client configuration
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct ClientConfig {
    /// Identity and greeting
    pub client: ClientSettings,

    /// Server location
    pub server: ServerSettings,

    /// Keepalive timing
    pub heartbeat: HeartbeatTimings,

    /// Session establishment policy
    pub reconnect: ReconnectPolicy,

    /// Logging configuration
    pub logging: LoggingSettings,
}

/// Client identity settings
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ClientSettings {
    /// Username announced to the server
    pub username: String,

    /// Text sent to global chat right after connecting
    #[serde(skip_serializing_if = "Option::is_none")]
    pub greeting: Option<String>,
}

/// Server connection settings
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ServerSettings {
    pub host: String,

    pub port: u16,

    /// Websocket endpoint path
    pub path: String,

    /// Use wss:// instead of ws://
    pub secure: bool,

    /// Connection timeout in milliseconds
    pub connect_timeout_ms: u64,
}

/// Heartbeat and stats timer settings
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct HeartbeatTimings {
    /// Heartbeat interval in milliseconds
    pub interval_ms: u64,

    /// Server silence before a staleness warning, in milliseconds
    pub stale_threshold_ms: u64,

    /// Statistics log interval in milliseconds
    pub stats_interval_ms: u64,
}

/// Reconnection settings
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ReconnectPolicy {
    /// Connection attempts per reconnect
    pub max_attempts: u32,

    /// Delay between attempts in milliseconds
    pub delay_ms: u64,

    /// Time to wait for the server to confirm a session, in milliseconds
    pub settle_timeout_ms: u64,

    /// Exit instead of running disconnected when the startup connect fails
    pub exit_on_startup_failure: bool,
}

/// Logging settings
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LoggingSettings {
    /// Log level: trace, debug, info, warn, error
    pub level: String,

    /// Log file path (empty = no file logging)
    #[serde(skip_serializing_if = "Option::is_none")]
    pub file: Option<String>,

    /// Maximum log file size in MB before rotation
    pub max_file_size_mb: u64,

    /// Number of rotated log files to keep
    pub max_files: u32,

    /// Enable JSON formatted logging
    pub json_format: bool,
}

// Default implementations

impl Default for ClientSettings {
    fn default() -> Self {
        Self {
            username: "RustClient".to_string(),
            greeting: None,
        }
    }
}

impl Default for ServerSettings {
    fn default() -> Self {
        Self {
            host: "127.0.0.1".to_string(),
            port: 8000,
            path: "/socket.io/".to_string(),
            secure: false,
            connect_timeout_ms: 10000,
        }
    }
}

impl Default for HeartbeatTimings {
    fn default() -> Self {
        Self {
            interval_ms: 20000,
            stale_threshold_ms: 120000,
            stats_interval_ms: 60000,
        }
    }
}

impl Default for ReconnectPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            delay_ms: 2000,
            settle_timeout_ms: 3000,
            exit_on_startup_failure: false,
        }
    }
}

impl Default for LoggingSettings {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
            file: None,
            max_file_size_mb: 100,
            max_files: 5,
            json_format: false,
        }
    }
}

impl ClientConfig {
    /// Load configuration from file with environment variable overrides
    pub fn load(config_path: Option<&str>) -> Result<Self> {
        let mut config = Self::default();

        // 1. Load from config file if it exists
        if let Some(path) = Self::find_config_file(config_path)? {
            debug!(path = %path.display(), "Loading configuration file");
            let content = fs::read_to_string(&path).map_err(|e| Error::IoRead {
                path: path.clone(),
                source: e,
            })?;
            config = Self::from_toml(&content)?;
            info!(path = %path.display(), "Configuration loaded from file");
        }

        // 2. Apply environment variable overrides
        config.apply_env_overrides();

        // 3. Expand paths
        config.expand_paths();

        // 4. Validate
        config.validate()?;

        Ok(config)
    }

    /// Parse TOML content without applying overrides
    pub fn from_toml(content: &str) -> Result<Self> {
        toml::from_str(content).map_err(|e| Error::ConfigParse {
            message: e.to_string(),
            source: Some(e),
        })
    }

    /// Find the configuration file to use
    fn find_config_file(explicit_path: Option<&str>) -> Result<Option<PathBuf>> {
        // If explicit path provided, use it (error if not found)
        if let Some(path) = explicit_path {
            let path = PathBuf::from(expand_path(path));
            if path.exists() {
                return Ok(Some(path));
            }
            return Err(Error::config_not_found(path));
        }

        let search_paths = [
            // Current directory
            PathBuf::from("chat-client.toml"),
            // User config directory
            dirs::config_dir()
                .map(|p| p.join("chat-client").join("client.toml"))
                .unwrap_or_default(),
            // Home directory
            dirs::home_dir()
                .map(|p| p.join(".chat-client").join("client.toml"))
                .unwrap_or_default(),
        ];

        for path in &search_paths {
            if !path.as_os_str().is_empty() && path.exists() {
                debug!(path = %path.display(), "Found configuration file");
                return Ok(Some(path.clone()));
            }
        }

        debug!("No configuration file found, using defaults");
        Ok(None)
    }

    /// Apply environment variable overrides
    fn apply_env_overrides(&mut self) {
        // Client settings
        if let Ok(val) = std::env::var("CHAT_CLIENT_USERNAME") {
            self.client.username = val;
        }
        if let Ok(val) = std::env::var("CHAT_CLIENT_GREETING") {
            self.client.greeting = Some(val);
        }

        // Server settings
        if let Ok(val) = std::env::var("CHAT_CLIENT_HOST") {
            self.server.host = val;
        }
        if let Ok(val) = std::env::var("CHAT_CLIENT_PORT") {
            if let Ok(n) = val.parse() {
                self.server.port = n;
            }
        }
        if let Ok(val) = std::env::var("CHAT_CLIENT_PATH") {
            self.server.path = val;
        }
        if let Ok(val) = std::env::var("CHAT_CLIENT_SECURE") {
            self.server.secure = parse_flag(&val);
        }
        if let Ok(val) = std::env::var("CHAT_CLIENT_CONNECT_TIMEOUT_MS") {
            if let Ok(n) = val.parse() {
                self.server.connect_timeout_ms = n;
            }
        }

        // Heartbeat settings
        if let Ok(val) = std::env::var("CHAT_CLIENT_HEARTBEAT_INTERVAL_MS") {
            if let Ok(n) = val.parse() {
                self.heartbeat.interval_ms = n;
            }
        }
        if let Ok(val) = std::env::var("CHAT_CLIENT_STALE_THRESHOLD_MS") {
            if let Ok(n) = val.parse() {
                self.heartbeat.stale_threshold_ms = n;
            }
        }
        if let Ok(val) = std::env::var("CHAT_CLIENT_STATS_INTERVAL_MS") {
            if let Ok(n) = val.parse() {
                self.heartbeat.stats_interval_ms = n;
            }
        }

        // Reconnect settings
        if let Ok(val) = std::env::var("CHAT_CLIENT_MAX_RECONNECT_ATTEMPTS") {
            if let Ok(n) = val.parse() {
                self.reconnect.max_attempts = n;
            }
        }
        if let Ok(val) = std::env::var("CHAT_CLIENT_RECONNECT_DELAY_MS") {
            if let Ok(n) = val.parse() {
                self.reconnect.delay_ms = n;
            }
        }
        if let Ok(val) = std::env::var("CHAT_CLIENT_EXIT_ON_STARTUP_FAILURE") {
            self.reconnect.exit_on_startup_failure = parse_flag(&val);
        }

        // Logging settings
        if let Ok(val) = std::env::var("CHAT_CLIENT_LOG_LEVEL") {
            self.logging.level = val;
        }
        if let Ok(val) = std::env::var("CHAT_CLIENT_LOG_FILE") {
            self.logging.file = Some(val);
        }
        if let Ok(val) = std::env::var("CHAT_CLIENT_LOG_JSON") {
            self.logging.json_format = parse_flag(&val);
        }
    }

    /// Apply command-line overrides, then re-validate
    pub fn apply_cli_overrides(
        &mut self,
        username: Option<String>,
        host: Option<String>,
        port: Option<u16>,
    ) -> Result<()> {
        if let Some(username) = username {
            self.client.username = username;
        }
        if let Some(host) = host {
            self.server.host = host;
        }
        if let Some(port) = port {
            self.server.port = port;
        }
        self.validate()
    }

    /// Expand ~ and other path variables
    fn expand_paths(&mut self) {
        if let Some(ref file) = self.logging.file {
            self.logging.file = Some(expand_path(file));
        }
    }

    /// Validate the configuration
    pub fn validate(&self) -> Result<()> {
        if let Err(reason) = validate_username(&self.client.username) {
            return Err(Error::config_field_invalid("client.username", reason));
        }

        if self.server.host.trim().is_empty() {
            return Err(Error::config_field_invalid("server.host", "Server host cannot be empty"));
        }
        if self.server.port == 0 {
            return Err(Error::config_field_invalid("server.port", "Server port cannot be 0"));
        }
        if !self.server.path.starts_with('/') {
            return Err(Error::config_field_invalid(
                "server.path",
                format!("Server path must start with '/' (got '{}')", self.server.path),
            ));
        }

        let timers = [
            ("server.connect_timeout_ms", self.server.connect_timeout_ms),
            ("heartbeat.interval_ms", self.heartbeat.interval_ms),
            ("heartbeat.stale_threshold_ms", self.heartbeat.stale_threshold_ms),
            ("heartbeat.stats_interval_ms", self.heartbeat.stats_interval_ms),
            ("reconnect.settle_timeout_ms", self.reconnect.settle_timeout_ms),
        ];
        for (field, value) in timers {
            if value == 0 {
                return Err(Error::config_field_invalid(field, format!("{} must be greater than 0", field)));
            }
        }

        if self.reconnect.max_attempts == 0 {
            return Err(Error::config_field_invalid(
                "reconnect.max_attempts",
                "At least one connection attempt is required",
            ));
        }

        // Validate log level
        let valid_levels = ["trace", "debug", "info", "warn", "error"];
        if !valid_levels.contains(&self.logging.level.to_lowercase().as_str()) {
            return Err(Error::config_field_invalid(
                "logging.level",
                format!(
                    "Invalid log level '{}'. Must be one of: {}",
                    self.logging.level,
                    valid_levels.join(", ")
                ),
            ));
        }

        Ok(())
    }

    // ─── Runtime Views ──────────────────────────────────────────

    pub fn endpoint(&self) -> ServerEndpoint {
        ServerEndpoint {
            host: self.server.host.clone(),
            port: self.server.port,
            path: self.server.path.clone(),
            secure: self.server.secure,
        }
    }

    pub fn connect_timeout(&self) -> Duration {
        Duration::from_millis(self.server.connect_timeout_ms)
    }

    pub fn heartbeat_settings(&self) -> HeartbeatSettings {
        HeartbeatSettings {
            interval: Duration::from_millis(self.heartbeat.interval_ms),
            stale_threshold: Duration::from_millis(self.heartbeat.stale_threshold_ms),
        }
    }

    pub fn stats_interval(&self) -> Duration {
        Duration::from_millis(self.heartbeat.stats_interval_ms)
    }

    pub fn reconnect_settings(&self) -> ReconnectSettings {
        ReconnectSettings {
            max_attempts: self.reconnect.max_attempts,
            delay: Duration::from_millis(self.reconnect.delay_ms),
            settle_timeout: Duration::from_millis(self.reconnect.settle_timeout_ms),
        }
    }
}

fn parse_flag(val: &str) -> bool {
    val.eq_ignore_ascii_case("true") || val == "1"
}

/// Expand ~ and environment variables in paths
fn expand_path(path: &str) -> String {
    shellexpand::full(path)
        .unwrap_or_else(|_| std::borrow::Cow::Borrowed(path))
        .into_owned()
}

/// Initialize a new configuration file, returning where it was written
pub fn init_config(path: Option<&str>, force: bool) -> Result<PathBuf> {
    let config_path = path.map(|p| PathBuf::from(expand_path(p))).unwrap_or_else(|| {
        dirs::home_dir()
            .unwrap_or_else(|| PathBuf::from("."))
            .join(".chat-client")
            .join("client.toml")
    });

    // Check if file exists
    if config_path.exists() && !force {
        return Err(Error::Config(format!(
            "Configuration file already exists: {}. Use --force to overwrite.",
            config_path.display()
        )));
    }

    // Create parent directories
    if let Some(parent) = config_path.parent().filter(|p| !p.as_os_str().is_empty()) {
        fs::create_dir_all(parent).map_err(|e| Error::IoWrite {
            path: parent.to_path_buf(),
            source: e,
        })?;
    }

    fs::write(&config_path, generate_default_config()).map_err(|e| Error::IoWrite {
        path: config_path.clone(),
        source: e,
    })?;

    Ok(config_path)
}

/// Generate default configuration content with comments
pub fn generate_default_config() -> String {
    r#"# Chat Client Configuration

[client]
# Username announced to the server (3-20 characters: letters, digits, _ or -)
username = "RustClient"

# Message sent to global chat right after connecting (comment out to disable)
# greeting = "Hello from Rust client!"

[server]
# Server host and port
host = "127.0.0.1"
port = 8000

# Websocket endpoint path
path = "/socket.io/"

# Use wss:// instead of ws://
secure = false

# Connection timeout in milliseconds
connect_timeout_ms = 10000

[heartbeat]
# Heartbeat interval in milliseconds
interval_ms = 20000

# Server silence before a staleness warning, in milliseconds
stale_threshold_ms = 120000

# Statistics log interval in milliseconds
stats_interval_ms = 60000

[reconnect]
# Connection attempts per reconnect
max_attempts = 3

# Delay between attempts in milliseconds
delay_ms = 2000

# Time to wait for the server to confirm a new session, in milliseconds
settle_timeout_ms = 3000

# Exit instead of running disconnected when the startup connect fails
exit_on_startup_failure = false

[logging]
# Log level: trace, debug, info, warn, error
level = "info"

# Log file path (comment out to disable file logging)
# file = "~/.chat-client/logs/client.log"

# Maximum log file size in MB before rotation
max_file_size_mb = 100

# Number of rotated log files to keep
max_files = 5

# Enable JSON formatted logging
json_format = false
"#
    .to_string()
}
