use std::env;
use std::path::PathBuf;

use once_cell::sync::Lazy;
use thiserror::Error;

#[derive(Debug, Error, PartialEq, Eq)]
pub enum ConfigError {
    #[error("Missing required credential {0}. Please check your .env file.")]
    MissingCredential(&'static str),
}

#[derive(Debug, Clone)]
pub struct Config {
    pub bot_token: String,
    pub log_level: String,
    /// Raw LOG_LEVEL value that was not recognised; reported once logging is up.
    pub unknown_log_level: Option<String>,
    pub log_dir: PathBuf,
    pub openai_api_key: String,
    pub openai_base_url: String,
    pub openai_model: String,
    pub openai_max_tokens: u32,
    pub http_timeout_seconds: u64,
    pub telegram_max_length: usize,
}

pub static CONFIG: Lazy<Config> = Lazy::new(Config::load);

fn env_string(name: &str, default: &str) -> String {
    env::var(name).unwrap_or_else(|_| default.to_string())
}

fn env_u32(name: &str, default: u32) -> u32 {
    env::var(name)
        .ok()
        .and_then(|value| value.trim().parse::<u32>().ok())
        .unwrap_or(default)
}

fn env_u64(name: &str, default: u64) -> u64 {
    env::var(name)
        .ok()
        .and_then(|value| value.trim().parse::<u64>().ok())
        .unwrap_or(default)
}

fn env_usize(name: &str, default: usize) -> usize {
    env::var(name)
        .ok()
        .and_then(|value| value.trim().parse::<usize>().ok())
        .unwrap_or(default)
}

/// Returns the level to use and, for unrecognised input, the raw value.
fn normalize_log_level(value: &str) -> (String, Option<String>) {
    let lowered = value.trim().to_lowercase();
    match lowered.as_str() {
        "trace" | "debug" | "info" | "warn" | "warning" | "error" | "off" => (lowered, None),
        "" => ("info".to_string(), None),
        _ => ("info".to_string(), Some(value.to_string())),
    }
}

fn require_credential(name: &'static str, value: &str) -> Result<(), ConfigError> {
    if value.trim().is_empty() {
        return Err(ConfigError::MissingCredential(name));
    }
    Ok(())
}

impl Config {
    pub fn load() -> Self {
        let (log_level, unknown_log_level) = normalize_log_level(&env_string("LOG_LEVEL", "info"));
        Config {
            bot_token: env_string("BOT_TOKEN", ""),
            log_level,
            unknown_log_level,
            log_dir: PathBuf::from(env_string("LOG_DIR", "logs")),
            openai_api_key: env_string("OPENAI_API_KEY", ""),
            openai_base_url: env_string("OPENAI_BASE_URL", "https://api.openai.com/v1"),
            openai_model: env_string("OPENAI_MODEL", "gpt-4o"),
            openai_max_tokens: env_u32("OPENAI_MAX_TOKENS", 1000).max(1),
            http_timeout_seconds: env_u64("HTTP_TIMEOUT_SECONDS", 120).max(1),
            telegram_max_length: env_usize("TELEGRAM_MAX_LENGTH", 4000).clamp(1000, 4096),
        }
    }

    /// The analysis surfaces refuse to start without this key.
    pub fn require_openai_api_key(&self) -> Result<&str, ConfigError> {
        require_credential("OPENAI_API_KEY", &self.openai_api_key)?;
        Ok(self.openai_api_key.trim())
    }

    pub fn require_bot_token(&self) -> Result<&str, ConfigError> {
        require_credential("BOT_TOKEN", &self.bot_token)?;
        Ok(self.bot_token.trim())
    }
}

pub const STYLE_ANALYSIS_PROMPT: &str = "
You are a professional fashion stylist. Analyze this outfit and provide:

1. A detailed analysis of the outfit's style and aesthetic
2. Identify the style genre (e.g., streetwear, classic, minimalist)
3. Give 2–3 specific suggestions to elevate the look
4. Recommend 3 shoppable items that would complement this style

Be specific about colors, patterns, and style elements you observe in the image.
";

#[cfg(test)]
mod tests {
    use super::*;

    fn config_with_keys(bot_token: &str, openai_api_key: &str) -> Config {
        Config {
            bot_token: bot_token.to_string(),
            log_level: "info".to_string(),
            unknown_log_level: None,
            log_dir: PathBuf::from("logs"),
            openai_api_key: openai_api_key.to_string(),
            openai_base_url: "https://api.openai.com/v1".to_string(),
            openai_model: "gpt-4o".to_string(),
            openai_max_tokens: 1000,
            http_timeout_seconds: 120,
            telegram_max_length: 4000,
        }
    }

    #[test]
    fn blank_api_key_is_a_missing_credential() {
        let config = config_with_keys("token", "   ");
        assert_eq!(
            config.require_openai_api_key(),
            Err(ConfigError::MissingCredential("OPENAI_API_KEY"))
        );
    }

    #[test]
    fn present_credentials_are_returned_trimmed() {
        let config = config_with_keys(" 123:abc ", "sk-test\n");
        assert_eq!(config.require_openai_api_key(), Ok("sk-test"));
        assert_eq!(config.require_bot_token(), Ok("123:abc"));
    }

    #[test]
    fn missing_bot_token_names_the_variable() {
        let err = config_with_keys("", "sk-test")
            .require_bot_token()
            .unwrap_err();
        assert!(err.to_string().contains("BOT_TOKEN"));
    }

    #[test]
    fn unknown_log_level_falls_back_to_info() {
        assert_eq!(
            normalize_log_level("verbose"),
            ("info".to_string(), Some("verbose".to_string()))
        );
        assert_eq!(normalize_log_level(" DEBUG "), ("debug".to_string(), None));
        assert_eq!(normalize_log_level(""), ("info".to_string(), None));
    }

    #[test]
    fn prompt_covers_every_requested_section() {
        assert!(STYLE_ANALYSIS_PROMPT.contains("style genre"));
        assert!(STYLE_ANALYSIS_PROMPT.contains("2–3 specific suggestions"));
        assert!(STYLE_ANALYSIS_PROMPT.contains("3 shoppable items"));
    }
}
