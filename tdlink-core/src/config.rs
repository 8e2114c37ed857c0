// ABOUTME: Configuration parsing from TOML file with environment variable overrides
// ABOUTME: Validates credentials and builds the client parameters sent during authorization
use crate::command::TdlibParameters;
use crate::paths;
use anyhow::{bail, Context, Result};
use serde::{Deserialize, Serialize};
use std::net::SocketAddr;
use std::path::{Path, PathBuf};
use std::time::Duration;
use tdlink_transport::TransportConfig;

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Config {
    #[serde(default)]
    pub telegram: TelegramConfig,
    #[serde(default)]
    pub client: ClientConfig,
    #[serde(default)]
    pub logging: LoggingConfig,
    #[serde(default)]
    pub transport: TransportConfig,
}

#[derive(Clone, Serialize, Deserialize)]
pub struct TelegramConfig {
    #[serde(default)]
    pub api_id: i32,
    #[serde(default)]
    pub api_hash: String,
    /// Answer the phone number prompt automatically
    #[serde(skip_serializing_if = "Option::is_none")]
    pub phone: Option<String>,
    #[serde(default)]
    pub database_encryption_key: String,
    #[serde(default)]
    pub use_test_dc: bool,
    #[serde(default)]
    pub use_file_database: bool,
    #[serde(default)]
    pub use_chat_info_database: bool,
    #[serde(default)]
    pub use_message_database: bool,
    #[serde(default)]
    pub use_secret_chats: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub database_dir: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub files_dir: Option<String>,
    #[serde(default = "default_language_code")]
    pub system_language_code: String,
    #[serde(default = "default_device_model")]
    pub device_model: String,
    #[serde(default = "default_system_version")]
    pub system_version: String,
    #[serde(default = "default_application_version")]
    pub application_version: String,
}

// Custom Debug impl to redact sensitive fields
impl std::fmt::Debug for TelegramConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TelegramConfig")
            .field("api_id", &self.api_id)
            .field("api_hash", &"[REDACTED]")
            .field("phone", &self.phone.as_ref().map(|_| "[REDACTED]"))
            .field("database_encryption_key", &"[REDACTED]")
            .field("use_test_dc", &self.use_test_dc)
            .field("use_file_database", &self.use_file_database)
            .field("use_chat_info_database", &self.use_chat_info_database)
            .field("use_message_database", &self.use_message_database)
            .field("use_secret_chats", &self.use_secret_chats)
            .field("database_dir", &self.database_dir)
            .field("files_dir", &self.files_dir)
            .field("system_language_code", &self.system_language_code)
            .field("device_model", &self.device_model)
            .field("system_version", &self.system_version)
            .field("application_version", &self.application_version)
            .finish()
    }
}

impl Default for TelegramConfig {
    fn default() -> Self {
        Self {
            api_id: 0,
            api_hash: String::new(),
            phone: None,
            database_encryption_key: String::new(),
            use_test_dc: false,
            use_file_database: false,
            use_chat_info_database: false,
            use_message_database: false,
            use_secret_chats: false,
            database_dir: None,
            files_dir: None,
            system_language_code: default_language_code(),
            device_model: default_device_model(),
            system_version: default_system_version(),
            application_version: default_application_version(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ClientConfig {
    /// Seconds a single transport receive may block
    #[serde(default = "default_wait_timeout")]
    pub wait_timeout: u64,
    /// Backend log verbosity, sent before authorization starts
    #[serde(default = "default_verbosity")]
    pub verbosity: i32,
    /// Page size of the chat load sent once authorized
    #[serde(default = "default_chat_load_limit")]
    pub chat_load_limit: i32,
    /// Read credentials from the terminal when the handshake asks for them
    #[serde(default = "default_true")]
    pub console_authentication: bool,
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            wait_timeout: default_wait_timeout(),
            verbosity: default_verbosity(),
            chat_load_limit: default_chat_load_limit(),
            console_authentication: default_true(),
        }
    }
}

impl ClientConfig {
    pub fn poll_timeout(&self) -> Duration {
        Duration::from_secs(self.wait_timeout)
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct LoggingConfig {
    /// Directory for daily rolling log files; console only when unset
    #[serde(skip_serializing_if = "Option::is_none")]
    pub log_dir: Option<String>,
    /// Serve Prometheus metrics on this address
    #[serde(skip_serializing_if = "Option::is_none")]
    pub metrics_addr: Option<SocketAddr>,
}

fn default_language_code() -> String {
    "en".to_string()
}

fn default_device_model() -> String {
    "Desktop".to_string()
}

fn default_system_version() -> String {
    std::env::consts::OS.to_string()
}

fn default_application_version() -> String {
    env!("CARGO_PKG_VERSION").to_string()
}

fn default_wait_timeout() -> u64 {
    1
}

fn default_verbosity() -> i32 {
    1
}

fn default_chat_load_limit() -> i32 {
    100
}

fn default_true() -> bool {
    true
}

/// Expand tilde (~) to home directory in paths
/// Logs a warning if expansion fails and falls back to the original path
pub fn expand_tilde(path: &str) -> String {
    if let Some(stripped) = path.strip_prefix("~/") {
        if let Some(base_dirs) = directories::BaseDirs::new() {
            return base_dirs
                .home_dir()
                .join(stripped)
                .to_string_lossy()
                .to_string();
        }
        tracing::warn!(path = %path, "Could not determine home directory for tilde expansion");
    } else if path == "~" {
        if let Some(base_dirs) = directories::BaseDirs::new() {
            return base_dirs.home_dir().to_string_lossy().to_string();
        }
        tracing::warn!("Could not determine home directory for tilde expansion");
    }
    path.to_string()
}

impl Config {
    /// Find the config file, checking multiple locations in order:
    /// 1. TDLINK_CONFIG_PATH env var (if set)
    /// 2. ./config.toml
    /// 3. ~/.config/tdlink/config.toml
    pub fn find_config_file() -> Option<PathBuf> {
        if let Ok(env_path) = std::env::var("TDLINK_CONFIG_PATH") {
            let path = PathBuf::from(&env_path);
            if path.exists() {
                return Some(path);
            }
        }

        let local_config = PathBuf::from("config.toml");
        if local_config.exists() {
            return Some(local_config);
        }

        let xdg_config = paths::config_file();
        if xdg_config.exists() {
            return Some(xdg_config);
        }

        None
    }

    /// Parse TOML without environment overrides or validation
    pub fn parse(content: &str) -> Result<Self> {
        toml::from_str(content).context("Invalid configuration")
    }

    /// Load from the standard search locations
    pub fn load() -> Result<Self> {
        Self::load_from(None)
    }

    /// Load from `path`, or search the standard locations when `None`, then
    /// apply environment overrides and validate.
    pub fn load_from(path: Option<&Path>) -> Result<Self> {
        let found = match path {
            Some(p) => Some(p.to_path_buf()),
            None => Self::find_config_file(),
        };
        let mut config = if let Some(config_path) = found {
            tracing::info!(path = %config_path.display(), "Loading configuration from file");
            let content = std::fs::read_to_string(&config_path)
                .with_context(|| format!("Failed to read {}", config_path.display()))?;
            Self::parse(&content)
                .with_context(|| format!("Failed to parse {}", config_path.display()))?
        } else {
            tracing::info!("No config file found, using environment variables and defaults");
            Config::default()
        };

        config.apply_env_overrides()?;
        config.expand_paths();
        config.validate()?;
        Ok(config)
    }

    fn apply_env_overrides(&mut self) -> Result<()> {
        if let Ok(val) = std::env::var("TDLINK_API_ID") {
            self.telegram.api_id = val
                .parse()
                .with_context(|| format!("TDLINK_API_ID must be a number, got: {}", val))?;
        }
        if let Ok(val) = std::env::var("TDLINK_API_HASH") {
            self.telegram.api_hash = val;
            // Clear from environment to prevent exposure via /proc or ps
            std::env::remove_var("TDLINK_API_HASH");
        }
        if let Ok(val) = std::env::var("TDLINK_PHONE") {
            self.telegram.phone = Some(val);
        }
        if let Ok(val) = std::env::var("TDLINK_LOG_DIR") {
            self.logging.log_dir = Some(val);
        }
        Ok(())
    }

    fn expand_paths(&mut self) {
        for dir in [
            &mut self.telegram.database_dir,
            &mut self.telegram.files_dir,
            &mut self.logging.log_dir,
        ]
        .into_iter()
        .flatten()
        {
            *dir = expand_tilde(dir);
        }
    }

    pub fn validate(&self) -> Result<()> {
        if self.telegram.api_id <= 0 {
            bail!("telegram.api_id is required (set in config.toml or TDLINK_API_ID env var)");
        }
        if self.telegram.api_hash.trim().is_empty() {
            bail!("telegram.api_hash is required (set in config.toml or TDLINK_API_HASH env var)");
        }
        if let Some(phone) = &self.telegram.phone {
            if phone.trim().is_empty() {
                bail!("telegram.phone must not be empty when set");
            }
        }
        if self.client.wait_timeout == 0 {
            bail!("client.wait_timeout must be at least 1 second");
        }
        if self.client.chat_load_limit <= 0 {
            bail!(
                "client.chat_load_limit must be positive, got {}",
                self.client.chat_load_limit
            );
        }
        if self.client.verbosity < 0 {
            bail!(
                "client.verbosity must not be negative, got {}",
                self.client.verbosity
            );
        }
        Ok(())
    }

    /// Database directory, defaulting under the XDG data dir
    pub fn database_dir(&self) -> PathBuf {
        self.telegram
            .database_dir
            .as_ref()
            .map(PathBuf::from)
            .unwrap_or_else(paths::database_dir)
    }

    pub fn files_dir(&self) -> PathBuf {
        self.telegram
            .files_dir
            .as_ref()
            .map(PathBuf::from)
            .unwrap_or_else(paths::files_dir)
    }

    pub fn log_dir(&self) -> Option<PathBuf> {
        self.logging.log_dir.as_ref().map(PathBuf::from)
    }

    /// Parameters announced when the backend asks for them
    pub fn tdlib_parameters(&self) -> TdlibParameters {
        let t = &self.telegram;
        TdlibParameters {
            use_test_dc: t.use_test_dc,
            database_directory: self.database_dir().to_string_lossy().to_string(),
            files_directory: self.files_dir().to_string_lossy().to_string(),
            database_encryption_key: t.database_encryption_key.clone(),
            use_file_database: t.use_file_database,
            use_chat_info_database: t.use_chat_info_database,
            use_message_database: t.use_message_database,
            use_secret_chats: t.use_secret_chats,
            api_id: t.api_id,
            api_hash: t.api_hash.clone(),
            system_language_code: t.system_language_code.clone(),
            device_model: t.device_model.clone(),
            system_version: t.system_version.clone(),
            application_version: t.application_version.clone(),
        }
    }
}
