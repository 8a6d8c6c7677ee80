//! Service configuration.
//!
//! Settings come from environment variables (a `.env` file is loaded first when
//! present) and end up in one `Config` that the binary hands to the adapters
//! and the session.

use std::env;
use std::path::PathBuf;
use std::time::Duration;
use tracing::Level;

pub const DEFAULT_TEXT_MODEL: &str = gemini_realtime::consts::DEFAULT_TEXT_MODEL;
pub const DEFAULT_LIVE_MODEL: &str = gemini_realtime::consts::DEFAULT_LIVE_MODEL;
pub const DEFAULT_VOICE_NAME: &str = "Kore";
pub const DEFAULT_PROMPTS_DIR: &str = "prompts";
pub const DEFAULT_REQUESTS_OUT: &str = "requests.jsonl";
pub const DEFAULT_FINALIZE_DELAY_MS: u64 = 1500;
pub const DEFAULT_UPLINK_BLOCK_SIZE: usize = 1024;

/// Holds all configuration loaded from the environment.
#[derive(Debug, Clone)]
pub struct Config {
    /// `None` when unset, blank or the literal `undefined`. The service still
    /// starts; every model call then answers with the missing-key notice.
    pub gemini_api_key: Option<String>,
    pub text_model: String,
    pub live_model: String,
    pub voice_name: String,
    pub prompts_dir: PathBuf,
    pub finalize_delay: Duration,
    pub uplink_block_size: usize,
    pub requests_out: PathBuf,
    pub log_level: Level,
}

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Invalid log level provided for RUST_LOG: {0}")]
    InvalidLogLevel(String),
    #[error("Invalid number for {var}: {value}")]
    InvalidNumber { var: String, value: String },
}

impl Config {
    /// Loads configuration from environment variables.
    ///
    // *   `GEMINI_API_KEY`: (Optional) Key for both the text and the live model.
    // *   `TEXT_MODEL`, `LIVE_MODEL`: (Optional) Gemini model names.
    // *   `VOICE_NAME`: (Optional) Prebuilt voice for spoken replies. Defaults to "Kore".
    // *   `PROMPTS_DIR`: (Optional) Directory with instruction and message overrides.
    // *   `FINALIZE_DELAY_MS`: (Optional) Pause before a finalized session is handed off.
    // *   `UPLINK_BLOCK_SIZE`: (Optional) Samples per microphone frame.
    // *   `REQUESTS_OUT`: (Optional) JSON-lines file that receives finalized requests.
    // *   `RUST_LOG`: (Optional) The logging level. Defaults to "INFO".
    pub fn from_env() -> Result<Self, ConfigError> {
        // Load .env file. This is useful for local development and is ignored if not present.
        dotenvy::dotenv().ok();
        Self::from_lookup(|key| env::var(key).ok())
    }

    /// Builds a configuration from any key lookup.
    pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let or_default = |key: &str, default: &str| {
            lookup(key)
                .filter(|v| !v.trim().is_empty())
                .unwrap_or_else(|| default.to_string())
        };

        let gemini_api_key = lookup(gemini_realtime::consts::GEMINI_API_KEY)
            .map(|k| k.trim().to_string())
            .filter(|k| !k.is_empty() && k != "undefined");

        let finalize_delay_ms: u64 = parse_number(
            "FINALIZE_DELAY_MS",
            lookup("FINALIZE_DELAY_MS"),
            DEFAULT_FINALIZE_DELAY_MS,
        )?;
        let uplink_block_size: usize = parse_number(
            "UPLINK_BLOCK_SIZE",
            lookup("UPLINK_BLOCK_SIZE"),
            DEFAULT_UPLINK_BLOCK_SIZE,
        )?;
        if uplink_block_size == 0 {
            return Err(ConfigError::InvalidNumber {
                var: "UPLINK_BLOCK_SIZE".to_string(),
                value: "0".to_string(),
            });
        }

        // Configure logging level from RUST_LOG, with a sensible default.
        let log_level_str = or_default("RUST_LOG", "INFO");
        let log_level = log_level_str
            .parse::<Level>()
            .map_err(|_| ConfigError::InvalidLogLevel(log_level_str))?;

        Ok(Self {
            gemini_api_key,
            text_model: or_default("TEXT_MODEL", DEFAULT_TEXT_MODEL),
            live_model: or_default("LIVE_MODEL", DEFAULT_LIVE_MODEL),
            voice_name: or_default("VOICE_NAME", DEFAULT_VOICE_NAME),
            prompts_dir: PathBuf::from(or_default("PROMPTS_DIR", DEFAULT_PROMPTS_DIR)),
            finalize_delay: Duration::from_millis(finalize_delay_ms),
            uplink_block_size,
            requests_out: PathBuf::from(or_default("REQUESTS_OUT", DEFAULT_REQUESTS_OUT)),
            log_level,
        })
    }

    /// The Gemini client configuration for these settings.
    pub fn gemini(&self) -> gemini_realtime::Config {
        let builder = gemini_realtime::Config::builder()
            .with_text_model(&self.text_model)
            .with_live_model(&self.live_model);
        let builder = match &self.gemini_api_key {
            Some(key) => builder.with_api_key(key),
            None => builder.without_api_key(),
        };
        builder.build()
    }
}

fn parse_number<T: std::str::FromStr>(
    var: &str,
    value: Option<String>,
    default: T,
) -> Result<T, ConfigError> {
    match value.map(|v| v.trim().to_string()).filter(|v| !v.is_empty()) {
        None => Ok(default),
        Some(v) => v.parse().map_err(|_| ConfigError::InvalidNumber {
            var: var.to_string(),
            value: v,
        }),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn lookup_from(pairs: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let map: HashMap<String, String> = pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        move |key| map.get(key).cloned()
    }

    #[test]
    fn test_defaults_without_any_variable() {
        let config = Config::from_lookup(lookup_from(&[])).unwrap();
        assert!(config.gemini_api_key.is_none());
        assert_eq!(config.text_model, "gemini-2.5-flash");
        assert_eq!(
            config.live_model,
            "gemini-2.5-flash-native-audio-preview-12-2025"
        );
        assert_eq!(config.voice_name, "Kore");
        assert_eq!(config.prompts_dir, PathBuf::from("prompts"));
        assert_eq!(config.finalize_delay, Duration::from_millis(1500));
        assert_eq!(config.uplink_block_size, 1024);
        assert_eq!(config.requests_out, PathBuf::from("requests.jsonl"));
        assert_eq!(config.log_level, Level::INFO);
    }

    #[test]
    fn test_placeholder_keys_count_as_missing() {
        for key in ["", "   ", "undefined"] {
            let config =
                Config::from_lookup(lookup_from(&[("GEMINI_API_KEY", key)])).unwrap();
            assert!(config.gemini_api_key.is_none(), "{key:?} should be missing");
            assert!(config.gemini().api_key().is_none());
        }
        let config = Config::from_lookup(lookup_from(&[("GEMINI_API_KEY", "abc")])).unwrap();
        assert_eq!(config.gemini_api_key.as_deref(), Some("abc"));
        assert!(config.gemini().api_key().is_some());
    }

    #[test]
    fn test_overrides_are_applied() {
        let config = Config::from_lookup(lookup_from(&[
            ("TEXT_MODEL", "gemini-2.5-pro"),
            ("VOICE_NAME", "Puck"),
            ("FINALIZE_DELAY_MS", "200"),
            ("UPLINK_BLOCK_SIZE", "2048"),
            ("RUST_LOG", "debug"),
        ]))
        .unwrap();
        assert_eq!(config.text_model, "gemini-2.5-pro");
        assert_eq!(config.gemini().text_model(), "gemini-2.5-pro");
        assert_eq!(config.voice_name, "Puck");
        assert_eq!(config.finalize_delay, Duration::from_millis(200));
        assert_eq!(config.uplink_block_size, 2048);
        assert_eq!(config.log_level, Level::DEBUG);
    }

    #[test]
    fn test_invalid_values_are_rejected() {
        assert!(matches!(
            Config::from_lookup(lookup_from(&[("RUST_LOG", "loud")])),
            Err(ConfigError::InvalidLogLevel(level)) if level == "loud"
        ));
        assert!(matches!(
            Config::from_lookup(lookup_from(&[("FINALIZE_DELAY_MS", "soon")])),
            Err(ConfigError::InvalidNumber { var, .. }) if var == "FINALIZE_DELAY_MS"
        ));
        assert!(matches!(
            Config::from_lookup(lookup_from(&[("UPLINK_BLOCK_SIZE", "0")])),
            Err(ConfigError::InvalidNumber { .. })
        ));
    }
}
