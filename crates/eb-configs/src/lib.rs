//! # eb-configs
//!
//! Layered settings for echo-board. Later sources win:
//!
//! 1. built-in defaults
//! 2. `echo-board.toml` in the working directory, or the file passed explicitly
//! 3. `ECHOBOARD_*` environment variables (a `.env` file is loaded first)

use std::path::{Path, PathBuf};
use std::time::Duration;

use config::{Config, Environment, File};
use secrecy::SecretString;
use serde::{Deserialize, Deserializer};
use thiserror::Error;
use tracing::debug;

pub const DEFAULT_CONFIG_FILE: &str = "echo-board.toml";
pub const ENV_PREFIX: &str = "ECHOBOARD";

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to load configuration: {0}")]
    Load(#[from] config::ConfigError),

    #[error("invalid configuration: {0}")]
    Invalid(String),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LogFormat {
    Compact,
    Json,
}

#[derive(Debug, Deserialize)]
pub struct Settings {
    /// Service used for login when no session names one
    pub service_url: String,
    #[serde(default)]
    pub identifier: Option<String>,
    #[serde(default, deserialize_with = "deserialize_secret")]
    pub app_password: Option<SecretString>,
    /// Directory holding the persisted session
    pub session_dir: PathBuf,

    pub log_level: String,
    pub log_format: LogFormat,

    /// Default aggregation scope of listing commands
    pub include_follows: bool,
    pub fanout_batch_size: usize,
    pub follow_limit: u32,
    pub page_limit: u32,
    pub max_pages: usize,
    pub follow_timeout_ms: u64,

    pub retry_max_attempts: u32,
    pub retry_base_delay_ms: u64,
    pub retry_max_delay_ms: u64,
    pub http_timeout_ms: u64,
}

/// Blank secrets count as absent.
fn deserialize_secret<'de, D>(deserializer: D) -> Result<Option<SecretString>, D::Error>
where
    D: Deserializer<'de>,
{
    let raw = Option::<String>::deserialize(deserializer)?;
    Ok(raw.filter(|s| !s.trim().is_empty()).map(SecretString::from))
}

impl Settings {
    /// Loads `.env`, then every layer, and validates the result.
    pub fn load(path: Option<&Path>) -> Result<Self, ConfigError> {
        if let Ok(env_file) = dotenvy::dotenv() {
            debug!(path = %env_file.display(), "loaded .env");
        }
        Self::load_from(path, Environment::with_prefix(ENV_PREFIX))
    }

    /// Same layering with an explicit environment source.
    pub fn load_from(path: Option<&Path>, env: Environment) -> Result<Self, ConfigError> {
        let builder = Config::builder()
            .set_default("service_url", "https://bsky.social")?
            .set_default("session_dir", ".echo-board")?
            .set_default("log_level", "info")?
            .set_default("log_format", "compact")?
            .set_default("include_follows", false)?
            .set_default("fanout_batch_size", 5)?
            .set_default("follow_limit", 100)?
            .set_default("page_limit", 100)?
            .set_default("max_pages", 10)?
            .set_default("follow_timeout_ms", 10_000)?
            .set_default("retry_max_attempts", 3)?
            .set_default("retry_base_delay_ms", 250)?
            .set_default("retry_max_delay_ms", 4_000)?
            .set_default("http_timeout_ms", 15_000)?;

        let builder = match path {
            Some(path) => builder.add_source(File::from(path).required(true)),
            None => builder.add_source(File::with_name(DEFAULT_CONFIG_FILE).required(false)),
        };

        let settings: Settings = builder
            .add_source(env.prefix_separator("_").separator("__"))
            .build()?
            .try_deserialize()?;
        settings.validate()?;
        Ok(settings)
    }

    fn validate(&self) -> Result<(), ConfigError> {
        if !(self.service_url.starts_with("https://") || self.service_url.starts_with("http://")) {
            return Err(ConfigError::Invalid(format!(
                "service_url must be an http(s) URL, got '{}'",
                self.service_url
            )));
        }
        if self.fanout_batch_size == 0 {
            return Err(ConfigError::Invalid("fanout_batch_size must be at least 1".into()));
        }
        if self.retry_max_attempts == 0 {
            return Err(ConfigError::Invalid("retry_max_attempts must be at least 1".into()));
        }
        if !(1..=100).contains(&self.page_limit) {
            return Err(ConfigError::Invalid("page_limit must be between 1 and 100".into()));
        }
        if self.retry_base_delay_ms > self.retry_max_delay_ms {
            return Err(ConfigError::Invalid(
                "retry_base_delay_ms must not exceed retry_max_delay_ms".into(),
            ));
        }
        Ok(())
    }

    pub fn follow_timeout(&self) -> Duration {
        Duration::from_millis(self.follow_timeout_ms)
    }

    pub fn retry_base_delay(&self) -> Duration {
        Duration::from_millis(self.retry_base_delay_ms)
    }

    pub fn retry_max_delay(&self) -> Duration {
        Duration::from_millis(self.retry_max_delay_ms)
    }

    pub fn http_timeout(&self) -> Duration {
        Duration::from_millis(self.http_timeout_ms)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use secrecy::ExposeSecret;
    use std::io::Write;

    fn env(vars: &[(&str, &str)]) -> Environment {
        let map = vars
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect::<config::Map<String, String>>();
        Environment::with_prefix(ENV_PREFIX).source(Some(map))
    }

    #[test]
    fn defaults_apply_without_sources() {
        let settings = Settings::load_from(None, env(&[])).unwrap();
        assert_eq!(settings.service_url, "https://bsky.social");
        assert_eq!(settings.log_format, LogFormat::Compact);
        assert_eq!(settings.fanout_batch_size, 5);
        assert_eq!(settings.follow_timeout(), Duration::from_secs(10));
        assert!(!settings.include_follows);
        assert!(settings.app_password.is_none());
    }

    #[test]
    fn environment_overrides_file() {
        let mut file = tempfile::Builder::new().suffix(".toml").tempfile().unwrap();
        writeln!(
            file,
            "service_url = \"https://pds.example.com\"\nidentifier = \"alice.test\"\nfanout_batch_size = 3"
        )
        .unwrap();

        let settings = Settings::load_from(
            Some(file.path()),
            env(&[
                ("ECHOBOARD_FANOUT_BATCH_SIZE", "8"),
                ("ECHOBOARD_LOG_FORMAT", "json"),
                ("ECHOBOARD_APP_PASSWORD", "abcd-efgh"),
                ("ECHOBOARD_INCLUDE_FOLLOWS", "true"),
            ]),
        )
        .unwrap();
        assert_eq!(settings.service_url, "https://pds.example.com");
        assert_eq!(settings.identifier.as_deref(), Some("alice.test"));
        assert_eq!(settings.fanout_batch_size, 8);
        assert_eq!(settings.log_format, LogFormat::Json);
        assert!(settings.include_follows);
        assert_eq!(
            settings.app_password.as_ref().map(|p| p.expose_secret()),
            Some("abcd-efgh")
        );
    }

    #[test]
    fn password_never_shows_in_debug_output() {
        let settings = Settings::load_from(None, env(&[("ECHOBOARD_APP_PASSWORD", "hunter2")])).unwrap();
        assert!(!format!("{settings:?}").contains("hunter2"));
    }

    #[test]
    fn blank_password_is_absent() {
        let settings = Settings::load_from(None, env(&[("ECHOBOARD_APP_PASSWORD", "  ")])).unwrap();
        assert!(settings.app_password.is_none());
    }

    #[test]
    fn invalid_values_are_rejected() {
        let zero_batch = Settings::load_from(None, env(&[("ECHOBOARD_FANOUT_BATCH_SIZE", "0")]));
        assert!(matches!(zero_batch, Err(ConfigError::Invalid(_))));

        let bad_url = Settings::load_from(None, env(&[("ECHOBOARD_SERVICE_URL", "ftp://x")]));
        assert!(matches!(bad_url, Err(ConfigError::Invalid(_))));

        let bad_format = Settings::load_from(None, env(&[("ECHOBOARD_LOG_FORMAT", "xml")]));
        assert!(matches!(bad_format, Err(ConfigError::Load(_))));
    }

    #[test]
    fn missing_explicit_file_is_an_error() {
        let result = Settings::load_from(Some(Path::new("/definitely/not/here.toml")), env(&[]));
        assert!(matches!(result, Err(ConfigError::Load(_))));
    }
}
