//! Configuration loading and validation.
//!
//! Loads settings from `./mailwizard.toml` (or `$MAILWIZARD_CONFIG`).
//! Environment variables override file values; file values override defaults.
//! A `.env` file in the working directory is read first.
//!
//! Precedence: env vars > config file > defaults.

use std::path::PathBuf;

use chrono::FixedOffset;
use serde::Deserialize;

/// Errors raised while loading or validating configuration.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    /// The config file exists but could not be read.
    #[error("failed to read config at {path}: {source}")]
    Read {
        /// Path that was read.
        path: PathBuf,
        /// Underlying I/O error.
        source: std::io::Error,
    },

    /// The config file is not valid TOML for [`Config`].
    #[error("failed to parse config: {0}")]
    Parse(#[from] toml::de::Error),

    /// A credential required at startup is absent.
    #[error("missing required credential: {0}")]
    MissingCredential(&'static str),

    /// A value is present but unusable.
    #[error("invalid {field}: {reason}")]
    Invalid {
        /// Offending field.
        field: &'static str,
        /// Why it was rejected.
        reason: String,
    },
}

// ── Top-level config ────────────────────────────────────────────

/// Top-level configuration.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Telegram bot settings.
    pub telegram: TelegramConfig,
    /// Outbound SMTP settings.
    pub smtp: SmtpConfig,
    /// Scheduled delivery settings.
    pub schedule: ScheduleConfig,
    /// Filesystem locations.
    pub paths: PathsConfig,
}

impl Config {
    /// Load configuration with precedence env vars > TOML file > defaults.
    ///
    /// # Errors
    ///
    /// Returns an error if the config file exists but cannot be read or parsed.
    pub fn load() -> Result<Self, ConfigError> {
        dotenvy::dotenv().ok();
        let path = config_path_with(|key| std::env::var(key).ok());
        let mut config = Self::load_from_file(path)?;
        config.apply_overrides(|key| std::env::var(key).ok());
        Ok(config)
    }

    /// Load from a TOML file only, without env overrides.
    ///
    /// A missing file yields the defaults.
    ///
    /// # Errors
    ///
    /// Returns an error if the file exists but cannot be read or parsed.
    pub fn load_from_file(path: PathBuf) -> Result<Self, ConfigError> {
        match std::fs::read_to_string(&path) {
            Ok(contents) => {
                tracing::info!(path = %path.display(), "loading config from file");
                Self::from_toml(&contents)
            }
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                tracing::info!("no config file found, using defaults");
                Ok(Self::default())
            }
            Err(source) => Err(ConfigError::Read { path, source }),
        }
    }

    /// Parse a TOML string into config.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::Parse`] on malformed TOML.
    pub fn from_toml(toml_str: &str) -> Result<Self, ConfigError> {
        Ok(toml::from_str(toml_str)?)
    }

    /// Apply environment variable overrides (env > config > defaults).
    ///
    /// Takes a resolver function so tests never mutate the process environment.
    pub fn apply_overrides(&mut self, env: impl Fn(&str) -> Option<String>) {
        // Telegram.
        if let Some(v) = env("TELEGRAM_BOT_TOKEN") {
            self.telegram.bot_token = Some(v);
        }
        if let Some(v) = env("MAILWIZARD_ALLOWED_USERS") {
            let mut ids = Vec::new();
            for part in v.split(',').map(str::trim).filter(|p| !p.is_empty()) {
                match part.parse() {
                    Ok(id) => ids.push(id),
                    Err(_) => tracing::warn!(
                        var = "MAILWIZARD_ALLOWED_USERS",
                        value = %part,
                        "ignoring invalid chat id"
                    ),
                }
            }
            self.telegram.allowed_users = ids;
        }

        // SMTP. The GMAIL_* names are accepted as fallbacks.
        if let Some(v) = env("SMTP_HOST") {
            self.smtp.host = v;
        }
        if let Some(v) = env("SMTP_PORT") {
            match v.parse() {
                Ok(port) => self.smtp.port = port,
                Err(_) => {
                    tracing::warn!(var = "SMTP_PORT", value = %v, "ignoring invalid env override");
                }
            }
        }
        if let Some(v) = env("SMTP_USERNAME").or_else(|| env("GMAIL_USERNAME")) {
            self.smtp.username = Some(v);
        }
        if let Some(v) = env("SMTP_PASSWORD").or_else(|| env("GMAIL_PASSWORD")) {
            self.smtp.password = Some(v);
        }
        if let Some(v) = env("SMTP_FROM") {
            self.smtp.from = Some(v);
        }
        if let Some(v) = env("SMTP_TLS") {
            match v.parse() {
                Ok(mode) => self.smtp.tls = mode,
                Err(_) => {
                    tracing::warn!(var = "SMTP_TLS", value = %v, "ignoring invalid env override");
                }
            }
        }

        // Schedule.
        if let Some(v) = env("MAILWIZARD_POLL_INTERVAL_SECS") {
            match v.parse() {
                Ok(n) => self.schedule.poll_interval_secs = n,
                Err(_) => tracing::warn!(
                    var = "MAILWIZARD_POLL_INTERVAL_SECS",
                    value = %v,
                    "ignoring invalid env override"
                ),
            }
        }
        if let Some(v) = env("MAILWIZARD_UTC_OFFSET_MINUTES") {
            match v.parse() {
                Ok(n) => self.schedule.utc_offset_minutes = n,
                Err(_) => tracing::warn!(
                    var = "MAILWIZARD_UTC_OFFSET_MINUTES",
                    value = %v,
                    "ignoring invalid env override"
                ),
            }
        }

        // Paths.
        if let Some(v) = env("MAILWIZARD_DATABASE") {
            self.paths.database = PathBuf::from(v);
        }
        if let Some(v) = env("MAILWIZARD_ATTACHMENTS_DIR") {
            self.paths.attachments_dir = PathBuf::from(v);
        }
        if let Some(v) = env("MAILWIZARD_LOGS_DIR") {
            self.paths.logs_dir = PathBuf::from(v);
        }
    }

    /// Check that everything needed to run the bot is present.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::MissingCredential`] when the bot token or SMTP
    /// login is absent, and [`ConfigError::Invalid`] for unusable values.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if is_blank(self.telegram.bot_token.as_deref()) {
            return Err(ConfigError::MissingCredential("TELEGRAM_BOT_TOKEN"));
        }
        if is_blank(self.smtp.username.as_deref()) {
            return Err(ConfigError::MissingCredential("SMTP_USERNAME"));
        }
        if is_blank(self.smtp.password.as_deref()) {
            return Err(ConfigError::MissingCredential("SMTP_PASSWORD"));
        }
        if self.schedule.poll_interval_secs == 0 {
            return Err(ConfigError::Invalid {
                field: "schedule.poll_interval_secs",
                reason: "must be at least 1".to_owned(),
            });
        }
        self.schedule.utc_offset()?;
        Ok(())
    }
}

fn is_blank(value: Option<&str>) -> bool {
    !matches!(value, Some(v) if !v.trim().is_empty())
}

/// Resolve the config file path using a custom env resolver.
///
/// Checks `$MAILWIZARD_CONFIG` first, then `./mailwizard.toml`.
pub fn config_path_with(env: impl Fn(&str) -> Option<String>) -> PathBuf {
    env("MAILWIZARD_CONFIG")
        .map(PathBuf::from)
        .unwrap_or_else(|| PathBuf::from("mailwizard.toml"))
}

// ── Telegram ────────────────────────────────────────────────────

/// Telegram-specific configuration.
#[derive(Clone, Default, Deserialize)]
#[serde(default)]
pub struct TelegramConfig {
    /// Bot API token.
    pub bot_token: Option<String>,
    /// Chat ids allowed to use the bot. Empty means everyone.
    pub allowed_users: Vec<i64>,
}

impl std::fmt::Debug for TelegramConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TelegramConfig")
            .field("bot_token", &self.bot_token.as_ref().map(|_| "[REDACTED]"))
            .field("allowed_users", &self.allowed_users)
            .finish()
    }
}

// ── SMTP ────────────────────────────────────────────────────────

/// Outbound mail server settings.
#[derive(Clone, Deserialize)]
#[serde(default)]
pub struct SmtpConfig {
    /// Server hostname.
    pub host: String,
    /// Server port.
    pub port: u16,
    /// Login name.
    pub username: Option<String>,
    /// Login password.
    pub password: Option<String>,
    /// Sender address; falls back to `username`.
    pub from: Option<String>,
    /// How the connection is secured.
    pub tls: TlsMode,
    /// Per-connection timeout in seconds.
    pub timeout_secs: u64,
}

impl SmtpConfig {
    /// Address used in `From:` and as the envelope sender.
    pub fn sender(&self) -> String {
        self.from
            .clone()
            .or_else(|| self.username.clone())
            .unwrap_or_default()
    }
}

impl Default for SmtpConfig {
    fn default() -> Self {
        Self {
            host: "smtp.gmail.com".to_owned(),
            port: 587,
            username: None,
            password: None,
            from: None,
            tls: TlsMode::Starttls,
            timeout_secs: 30,
        }
    }
}

impl std::fmt::Debug for SmtpConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SmtpConfig")
            .field("host", &self.host)
            .field("port", &self.port)
            .field("username", &self.username)
            .field("password", &self.password.as_ref().map(|_| "[REDACTED]"))
            .field("from", &self.from)
            .field("tls", &self.tls)
            .field("timeout_secs", &self.timeout_secs)
            .finish()
    }
}

/// Connection security for SMTP. Unknown values are rejected when parsing.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TlsMode {
    /// Plain connection upgraded with STARTTLS.
    #[default]
    Starttls,
    /// Implicit TLS from the first byte.
    Tls,
    /// No encryption.
    None,
}

impl std::str::FromStr for TlsMode {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "starttls" => Ok(Self::Starttls),
            "tls" => Ok(Self::Tls),
            "none" => Ok(Self::None),
            other => Err(format!("unknown SMTP TLS mode: {other}")),
        }
    }
}

// ── Schedule ────────────────────────────────────────────────────

/// Scheduled delivery settings.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct ScheduleConfig {
    /// Seconds between worker ticks.
    pub poll_interval_secs: u64,
    /// Offset from UTC, in minutes, for `YYYY-MM-DD HH:MM` times.
    pub utc_offset_minutes: i32,
    /// Maximum rows returned by `/scheduled`.
    pub list_limit: u32,
}

impl ScheduleConfig {
    /// The fixed offset naive schedule times are interpreted in.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::Invalid`] if the offset is outside ±24h.
    pub fn utc_offset(&self) -> Result<FixedOffset, ConfigError> {
        self.utc_offset_minutes
            .checked_mul(60)
            .and_then(FixedOffset::east_opt)
            .ok_or_else(|| ConfigError::Invalid {
                field: "schedule.utc_offset_minutes",
                reason: format!("{} is out of range", self.utc_offset_minutes),
            })
    }
}

impl Default for ScheduleConfig {
    fn default() -> Self {
        Self {
            poll_interval_secs: 60,
            utc_offset_minutes: 0,
            list_limit: 20,
        }
    }
}

// ── Paths ───────────────────────────────────────────────────────

/// Filesystem locations for persistent state.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct PathsConfig {
    /// SQLite database file.
    pub database: PathBuf,
    /// Directory uploaded attachments are saved into.
    pub attachments_dir: PathBuf,
    /// Directory for rotated JSON logs.
    pub logs_dir: PathBuf,
}

impl Default for PathsConfig {
    fn default() -> Self {
        Self {
            database: PathBuf::from("botdata.db"),
            attachments_dir: PathBuf::from("attachments"),
            logs_dir: PathBuf::from("logs"),
        }
    }
}
