//! Configuration management for the photomerge bot.
//!
//! Configuration lives in `~/.photomerge/config.json` and is read once at
//! startup. A missing file means defaults.
//!
//! # Configuration Priority
//!
//! 1. Environment variables
//! 2. Explicit config file values
//! 3. Default values
//!
//! # Environment Variable Mapping
//!
//! - `PHOTOMERGE_CONFIG` → path of the config file to read instead of the default
//! - `BOT_TOKEN` → bot.bot_token
//! - `SMTP_SOCKET` (or `YANDEX_SMTP_SSL`) → mail.smtp_socket
//! - `MAIL_ADDRESS` (or `YANDEX_MAIL_ADDRESS`) → mail.from_address
//! - `MAIL_LOGIN` (or `YANDEX_MAIL_LOGIN`) → mail.login
//! - `MAIL_PASSWORD` (or `YANDEX_MAIL_PASSWORD`) → mail.password
//! - `PHOTOMERGE_LOG_LEVEL` → observability.log_level
//! - `PHOTOMERGE_LOG_FORMAT` → observability.log_format

use crate::error::{Result, ResultExt};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

/// Default implicit-TLS SMTP port.
pub const DEFAULT_SMTPS_PORT: u16 = 465;

/// Get the configuration directory path.
pub fn config_dir() -> PathBuf {
    directories::UserDirs::new().map_or_else(
        || PathBuf::from(".photomerge"),
        |dirs| dirs.home_dir().join(".photomerge"),
    )
}

/// Get the configuration file path.
pub fn config_path() -> PathBuf {
    std::env::var("PHOTOMERGE_CONFIG").map_or_else(|_| config_dir().join("config.json"), PathBuf::from)
}

// ============================================================================
// Bot transport
// ============================================================================

/// Messaging transport configuration.
#[derive(Clone, Serialize, Deserialize)]
pub struct BotConfig {
    /// Bot authentication token. Required.
    #[serde(default)]
    pub bot_token: Option<String>,

    /// Base URL of the Bot API.
    #[serde(default = "default_api_base")]
    pub api_base: String,

    /// Long-poll timeout passed to `getUpdates`.
    #[serde(default = "default_poll_timeout")]
    pub poll_timeout_secs: u64,
}

impl Default for BotConfig {
    fn default() -> Self {
        Self {
            bot_token: None,
            api_base: default_api_base(),
            poll_timeout_secs: default_poll_timeout(),
        }
    }
}

impl std::fmt::Debug for BotConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("BotConfig")
            .field("bot_token", &self.bot_token.as_ref().map(|_| "[REDACTED]"))
            .field("api_base", &self.api_base)
            .field("poll_timeout_secs", &self.poll_timeout_secs)
            .finish()
    }
}

fn default_api_base() -> String {
    "https://api.telegram.org".into()
}

fn default_poll_timeout() -> u64 {
    30
}

// ============================================================================
// Mail relay
// ============================================================================

/// Outbound mail relay configuration.
///
/// Static for the lifetime of the process. When `smtp_socket` is unset the
/// relay counts as unconfigured and mail attempts fail at send time.
#[derive(Clone, Serialize, Deserialize)]
pub struct MailServerConfig {
    /// Relay socket address, `host:port` (port defaults to 465)
    #[serde(default)]
    pub smtp_socket: Option<String>,

    /// Authenticated sender address
    #[serde(default)]
    pub from_address: Option<String>,

    /// Login credential
    #[serde(default)]
    pub login: Option<String>,

    /// Password credential
    #[serde(default)]
    pub password: Option<String>,

    /// Fixed subject for outgoing documents
    #[serde(default = "default_mail_subject")]
    pub subject: String,

    /// Fixed body for outgoing documents
    #[serde(default = "default_mail_body")]
    pub body: String,

    /// Implicit TLS on connect. Off only for local relays.
    #[serde(default = "default_true")]
    pub smtp_tls: bool,
}

impl Default for MailServerConfig {
    fn default() -> Self {
        Self {
            smtp_socket: None,
            from_address: None,
            login: None,
            password: None,
            subject: default_mail_subject(),
            body: default_mail_body(),
            smtp_tls: true,
        }
    }
}

impl std::fmt::Debug for MailServerConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MailServerConfig")
            .field("smtp_socket", &self.smtp_socket)
            .field("from_address", &self.from_address)
            .field("login", &self.login)
            .field("password", &self.password.as_ref().map(|_| "[REDACTED]"))
            .field("subject", &self.subject)
            .field("smtp_tls", &self.smtp_tls)
            .finish()
    }
}

impl MailServerConfig {
    /// Whether every field needed for a send is present.
    pub fn is_configured(&self) -> bool {
        self.smtp_socket.is_some()
            && self.from_address.is_some()
            && self.login.is_some()
            && self.password.is_some()
    }

    /// Split the relay socket into host and port.
    ///
    /// Returns `None` when no relay is configured or the value is malformed.
    pub fn relay_host_port(&self) -> Option<(String, u16)> {
        parse_socket(self.smtp_socket.as_deref()?)
    }
}

/// Parse `host[:port]`, defaulting the port to 465.
pub fn parse_socket(socket: &str) -> Option<(String, u16)> {
    let socket = socket.trim();
    if socket.is_empty() {
        return None;
    }
    match socket.rsplit_once(':') {
        Some((host, port)) => {
            let port = port.parse().ok()?;
            if host.is_empty() || port == 0 {
                return None;
            }
            Some((host.to_string(), port))
        }
        None => Some((socket.to_string(), DEFAULT_SMTPS_PORT)),
    }
}

fn default_mail_subject() -> String {
    "Merged pdf".into()
}

fn default_mail_body() -> String {
    "Look for the pdf result file in the attachment.".into()
}

fn default_true() -> bool {
    true
}

// ============================================================================
// Document assembly
// ============================================================================

/// Document assembly configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DocumentConfig {
    /// Pixels per inch used to turn image dimensions into page dimensions
    #[serde(default = "default_resolution")]
    pub resolution_dpi: f32,

    /// JPEG quality for page images (1-100)
    #[serde(default = "default_jpeg_quality")]
    pub jpeg_quality: u8,

    /// Extension appended to the user-chosen file name
    #[serde(default = "default_extension")]
    pub extension: String,
}

impl Default for DocumentConfig {
    fn default() -> Self {
        Self {
            resolution_dpi: default_resolution(),
            jpeg_quality: default_jpeg_quality(),
            extension: default_extension(),
        }
    }
}

fn default_resolution() -> f32 {
    100.0
}

fn default_jpeg_quality() -> u8 {
    90
}

fn default_extension() -> String {
    "pdf".into()
}

// ============================================================================
// Network
// ============================================================================

/// Network call bounds.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NetworkConfig {
    /// Upper bound for a single asset download, document upload or SMTP session
    #[serde(default = "default_request_timeout")]
    pub request_timeout_secs: u64,
}

impl Default for NetworkConfig {
    fn default() -> Self {
        Self {
            request_timeout_secs: default_request_timeout(),
        }
    }
}

impl NetworkConfig {
    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.request_timeout_secs)
    }
}

fn default_request_timeout() -> u64 {
    45
}

// ============================================================================
// Observability
// ============================================================================

/// Observability configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ObservabilityConfig {
    /// Log level (trace, debug, info, warn, error)
    #[serde(default = "default_log_level", alias = "level")]
    pub log_level: String,

    /// Log format (json, pretty)
    #[serde(default = "default_log_format", alias = "format")]
    pub log_format: String,
}

impl Default for ObservabilityConfig {
    fn default() -> Self {
        Self {
            log_level: default_log_level(),
            log_format: default_log_format(),
        }
    }
}

fn default_log_level() -> String {
    "info".into()
}

fn default_log_format() -> String {
    "pretty".into()
}

// ============================================================================
// Root
// ============================================================================

/// Root configuration.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Config {
    #[serde(default)]
    pub bot: BotConfig,

    #[serde(default)]
    pub mail: MailServerConfig,

    #[serde(default)]
    pub document: DocumentConfig,

    #[serde(default)]
    pub network: NetworkConfig,

    #[serde(default)]
    pub observability: ObservabilityConfig,
}

impl Config {
    /// Load configuration from the default path.
    pub fn load() -> Result<Self> {
        let path = config_path();
        if !path.exists() {
            tracing::info!("Config file not found, using defaults");
            return Ok(Self::default());
        }
        Self::load_from(&path)
    }

    /// Load configuration from a specific path.
    pub fn load_from(path: &Path) -> Result<Self> {
        let content = fs::read_to_string(path)
            .context(format!("Failed to read config from {}", path.display()))?;

        serde_json::from_str(&content)
            .context(format!("Failed to parse config from {}", path.display()))
    }

    /// Load configuration with environment variable overrides.
    pub fn load_with_env() -> Result<Self> {
        let mut config = Self::load()?;
        config.apply_env_overrides();
        Ok(config)
    }

    /// Apply environment variable overrides to the configuration.
    pub fn apply_env_overrides(&mut self) {
        self.apply_overrides(|key| std::env::var(key).ok());
    }

    /// Apply overrides from an arbitrary lookup. Empty values are ignored.
    pub fn apply_overrides<F>(&mut self, lookup: F)
    where
        F: Fn(&str) -> Option<String>,
    {
        let first = |keys: &[&str]| {
            keys.iter()
                .filter_map(|k| lookup(k))
                .find(|v| !v.trim().is_empty())
        };

        if let Some(token) = first(&["BOT_TOKEN"]) {
            self.bot.bot_token = Some(token);
        }
        if let Some(socket) = first(&["SMTP_SOCKET", "YANDEX_SMTP_SSL"]) {
            self.mail.smtp_socket = Some(socket);
        }
        if let Some(addr) = first(&["MAIL_ADDRESS", "YANDEX_MAIL_ADDRESS"]) {
            self.mail.from_address = Some(addr);
        }
        if let Some(login) = first(&["MAIL_LOGIN", "YANDEX_MAIL_LOGIN"]) {
            self.mail.login = Some(login);
        }
        if let Some(password) = first(&["MAIL_PASSWORD", "YANDEX_MAIL_PASSWORD"]) {
            self.mail.password = Some(password);
        }
        if let Some(level) = first(&["PHOTOMERGE_LOG_LEVEL"]) {
            self.observability.log_level = level;
        }
        if let Some(format) = first(&["PHOTOMERGE_LOG_FORMAT"]) {
            self.observability.log_format = format;
        }
    }
}
