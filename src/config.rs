use serde::Deserialize;
use std::fmt;
use std::path::{Path, PathBuf};
use std::time::Duration;
use teloxide::types::ChatId;

/// Errors that can occur when loading configuration.
#[derive(Debug)]
pub enum ConfigError {
    /// Failed to read the config file.
    ReadFile { path: PathBuf, source: std::io::Error },
    /// Failed to parse JSON.
    ParseJson { path: PathBuf, source: serde_json::Error },
    /// Validation error.
    Validation(String),
}

impl fmt::Display for ConfigError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::ReadFile { path, source } => {
                write!(f, "failed to read config file '{}': {}", path.display(), source)
            }
            Self::ParseJson { path, source } => {
                write!(f, "failed to parse config file '{}': {}", path.display(), source)
            }
            Self::Validation(msg) => write!(f, "config validation error: {}", msg),
        }
    }
}

impl std::error::Error for ConfigError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            Self::ReadFile { source, .. } => Some(source),
            Self::ParseJson { source, .. } => Some(source),
            Self::Validation(_) => None,
        }
    }
}

#[derive(Deserialize)]
struct ConfigFile {
    telegram_bot_token: String,
    /// Path to the persisted relay state document. Defaults to "db.json".
    db_path: Option<String>,
    /// Directory for logs. Defaults to current directory.
    data_dir: Option<String>,
    /// User ids merged into the persisted admin list at startup.
    #[serde(default)]
    bootstrap_admins: Vec<i64>,
    /// Delay between queue items, milliseconds.
    #[serde(default = "default_forward_delay_ms")]
    forward_delay_ms: u64,
    /// Attach a "view original" button to relayed messages.
    #[serde(default = "default_attach_origin_link")]
    attach_origin_link: bool,
    /// Chat that receives WARN/ERROR log events, if set.
    log_chat_id: Option<i64>,
}

fn default_forward_delay_ms() -> u64 {
    300
}

fn default_attach_origin_link() -> bool {
    true
}

pub struct Config {
    pub telegram_bot_token: String,
    pub db_path: PathBuf,
    pub data_dir: PathBuf,
    pub bootstrap_admins: Vec<i64>,
    pub forward_delay: Duration,
    pub attach_origin_link: bool,
    pub log_chat_id: Option<ChatId>,
}

impl Config {
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self, ConfigError> {
        let config_path = path.as_ref().to_path_buf();
        let content = std::fs::read_to_string(&config_path)
            .map_err(|e| ConfigError::ReadFile { path: config_path.clone(), source: e })?;
        let file: ConfigFile = serde_json::from_str(&content)
            .map_err(|e| ConfigError::ParseJson { path: config_path.clone(), source: e })?;

        if file.telegram_bot_token.is_empty() {
            return Err(ConfigError::Validation("telegram_bot_token is required".into()));
        }
        // Telegram tokens are formatted as {bot_id}:{secret} where bot_id is numeric
        let token_parts: Vec<&str> = file.telegram_bot_token.split(':').collect();
        if token_parts.len() != 2 || token_parts[0].parse::<u64>().is_err() || token_parts[1].is_empty() {
            return Err(ConfigError::Validation(
                "telegram_bot_token appears invalid (expected format: 123456789:ABCdefGHI...)".into()
            ));
        }
        if file.forward_delay_ms == 0 {
            return Err(ConfigError::Validation("forward_delay_ms must be positive".into()));
        }

        let db_path = file
            .db_path
            .map(PathBuf::from)
            .unwrap_or_else(|| PathBuf::from("db.json"));
        let data_dir = file
            .data_dir
            .map(PathBuf::from)
            .unwrap_or_else(|| PathBuf::from("."));

        Ok(Self {
            telegram_bot_token: file.telegram_bot_token,
            db_path,
            data_dir,
            bootstrap_admins: file.bootstrap_admins,
            forward_delay: Duration::from_millis(file.forward_delay_ms),
            attach_origin_link: file.attach_origin_link,
            log_chat_id: file.log_chat_id.map(ChatId),
        })
    }
}
