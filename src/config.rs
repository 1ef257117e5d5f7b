use std::path::PathBuf;
use std::time::Duration;
use thiserror::Error;

pub const DEFAULT_PORT: u16 = 5000;
pub const DEFAULT_API_BASE: &str = "https://api.telegram.org";
/// Profile photo lookups are cached per user for 30 minutes.
pub const DEFAULT_PHOTO_CACHE_TTL: Duration = Duration::from_secs(30 * 60);

/// The bot token issued by the platform. Also the application credential
/// every init-data signature is derived from, so it never leaves the process:
/// `Debug` is redacted and there is no `Display` or `Serialize`.
#[derive(Clone, PartialEq, Eq)]
pub struct BotToken(String);

impl BotToken {
    pub fn new(token: impl Into<String>) -> Self {
        Self(token.into())
    }

    pub fn expose(&self) -> &str {
        &self.0
    }

    pub fn is_blank(&self) -> bool {
        self.0.trim().is_empty()
    }
}

impl std::fmt::Debug for BotToken {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str("BotToken(<redacted>)")
    }
}

#[derive(Debug, Clone)]
pub struct AppConfig {
    pub bot_token: BotToken,
    pub port: u16,
    pub static_dir: PathBuf,
    pub template_dir: PathBuf,
    /// Reject verified payloads whose `auth_date` is older than this. `None` disables the check.
    pub max_auth_age: Option<Duration>,
    pub photo_cache_ttl: Duration,
    pub enrich_profile_photo: bool,
    pub telegram_api_base: String,
    pub rate_limit: bool,
}

#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("BOT_TOKEN not set. Set BOT_TOKEN environment variable.")] MissingBotToken,
    #[error("{var} must be a non-negative integer, got {value:?}")] InvalidNumber { var: &'static str, value: String },
    #[error("Telegram API base URL cannot be empty")] EmptyApiBase,
}

impl AppConfig {
    /// Config with every optional setting at its default.
    pub fn new(bot_token: BotToken) -> Self {
        Self {
            bot_token,
            port: DEFAULT_PORT,
            static_dir: PathBuf::from("static"),
            template_dir: PathBuf::from("templates"),
            max_auth_age: None,
            photo_cache_ttl: DEFAULT_PHOTO_CACHE_TTL,
            enrich_profile_photo: false,
            telegram_api_base: DEFAULT_API_BASE.to_string(),
            rate_limit: true,
        }
    }

    /// Load configuration from the process environment.
    ///
    /// # Configuration
    /// Environment variables:
    /// - `BOT_TOKEN`: bot token (required)
    /// - `PORT`: HTTP listen port (default: 5000)
    /// - `STATIC_DIR` / `TEMPLATE_DIR`: asset and landing page directories
    /// - `INIT_DATA_MAX_AGE`: seconds; enables the `auth_date` freshness check
    /// - `PROFILE_PHOTO_CACHE_TTL`: seconds (default: 1800)
    /// - `ENRICH_PROFILE_PHOTO`: `1` or `true` to attach a photo URL to verify responses
    /// - `TELEGRAM_API_BASE`: Bot API origin (default: https://api.telegram.org)
    /// - `DISABLE_RATE_LIMIT`: set to any value to turn rate limiting off
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Same as [`AppConfig::from_env`] but reads variables through `lookup`.
    pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let token = lookup("BOT_TOKEN")
            .map(BotToken::new)
            .filter(|t| !t.is_blank())
            .ok_or(ConfigError::MissingBotToken)?;

        let mut cfg = Self::new(token);

        if let Some(port) = lookup("PORT") {
            cfg.port = port.trim().parse().map_err(|_| ConfigError::InvalidNumber { var: "PORT", value: port })?;
        }
        if let Some(dir) = lookup("STATIC_DIR") { cfg.static_dir = PathBuf::from(dir); }
        if let Some(dir) = lookup("TEMPLATE_DIR") { cfg.template_dir = PathBuf::from(dir); }
        if let Some(age) = lookup("INIT_DATA_MAX_AGE") {
            cfg.max_auth_age = Some(Duration::from_secs(parse_secs("INIT_DATA_MAX_AGE", age)?));
        }
        if let Some(ttl) = lookup("PROFILE_PHOTO_CACHE_TTL") {
            cfg.photo_cache_ttl = Duration::from_secs(parse_secs("PROFILE_PHOTO_CACHE_TTL", ttl)?);
        }
        if let Some(flag) = lookup("ENRICH_PROFILE_PHOTO") {
            cfg.enrich_profile_photo = matches!(flag.trim().to_ascii_lowercase().as_str(), "1" | "true" | "yes");
        }
        if let Some(base) = lookup("TELEGRAM_API_BASE") {
            cfg.telegram_api_base = base.trim_end_matches('/').to_string();
        }
        cfg.rate_limit = lookup("DISABLE_RATE_LIMIT").is_none();

        Ok(cfg)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.bot_token.is_blank() { return Err(ConfigError::MissingBotToken); }
        if self.telegram_api_base.trim().is_empty() { return Err(ConfigError::EmptyApiBase); }
        Ok(())
    }
}

fn parse_secs(var: &'static str, value: String) -> Result<u64, ConfigError> {
    value.trim().parse().map_err(|_| ConfigError::InvalidNumber { var, value })
}
