use std::net::SocketAddr;
use std::path::PathBuf;
use tracing::Level;

/// A custom error type for configuration loading failures.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Invalid value for environment variable {0}: {1}")]
    InvalidValue(String, String),
}

/// Where persona replies come from.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ResponseMode {
    /// Replies come from the chat backend.
    Live,
    /// Replies cycle through canned lines; no network is used.
    Scripted,
}

/// Holds all configuration loaded from the environment at startup.
///
/// API keys are optional: a missing key only shows up as fallback replies
/// (chat) or silent text-only replies (speech) once the trainer is used.
#[derive(Clone, Debug)]
pub struct Config {
    pub bind_address: SocketAddr,
    pub navigator_api_key: Option<String>,
    pub navigator_base_url: String,
    pub model_name: String,
    pub elevenlabs_api_key: Option<String>,
    pub elevenlabs_base_url: String,
    pub response_mode: ResponseMode,
    pub log_level: Level,
    pub prompts_path: PathBuf,
}

fn var_or(name: &str, default: &str) -> String {
    std::env::var(name).unwrap_or_else(|_| default.to_string())
}

/// Reads a variable, treating an empty value as unset.
fn optional_var(name: &str) -> Option<String> {
    std::env::var(name).ok().filter(|v| !v.trim().is_empty())
}

impl Config {
    /// Loads configuration from environment variables.
    pub fn from_env() -> Result<Self, ConfigError> {
        // Only load from .env in non-test mode to avoid contamination
        if !cfg!(test) {
            dotenvy::dotenv().ok();
        }

        let bind_address_str = var_or("BIND_ADDRESS", "0.0.0.0:3000");
        let bind_address = bind_address_str
            .parse::<SocketAddr>()
            .map_err(|e| ConfigError::InvalidValue("BIND_ADDRESS".to_string(), e.to_string()))?;

        let mode_str = var_or("RESPONSE_MODE", "live");
        let response_mode = match mode_str.to_lowercase().as_str() {
            "live" => ResponseMode::Live,
            "scripted" => ResponseMode::Scripted,
            other => {
                return Err(ConfigError::InvalidValue(
                    "RESPONSE_MODE".to_string(),
                    format!("'{}' is not one of 'live' or 'scripted'", other),
                ));
            }
        };

        let log_level_str = var_or("RUST_LOG", "INFO");
        let log_level = log_level_str.parse::<Level>().map_err(|_| {
            ConfigError::InvalidValue(
                "RUST_LOG".to_string(),
                format!("'{}' is not a valid log level", log_level_str),
            )
        })?;

        let prompts_path = std::env::var("PROMPTS_PATH")
            .map(PathBuf::from)
            .unwrap_or_else(|_| PathBuf::from("./prompts"));

        Ok(Self {
            bind_address,
            navigator_api_key: optional_var("NAVIGATOR_API_KEY"),
            navigator_base_url: var_or("NAVIGATOR_BASE_URL", "https://api.openai.com/v1"),
            model_name: var_or("MODEL_NAME", "gpt-oss-120b"),
            elevenlabs_api_key: optional_var("ELEVENLABS_API_KEY"),
            elevenlabs_base_url: var_or("ELEVENLABS_BASE_URL", "https://api.elevenlabs.io"),
            response_mode,
            log_level,
            prompts_path,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serial_test::serial;
    use std::env;
    use tracing::Level;

    fn clear_env_vars() {
        unsafe {
            env::remove_var("BIND_ADDRESS");
            env::remove_var("NAVIGATOR_API_KEY");
            env::remove_var("NAVIGATOR_BASE_URL");
            env::remove_var("MODEL_NAME");
            env::remove_var("ELEVENLABS_API_KEY");
            env::remove_var("ELEVENLABS_BASE_URL");
            env::remove_var("RESPONSE_MODE");
            env::remove_var("RUST_LOG");
            env::remove_var("PROMPTS_PATH");
        }
    }

    #[test]
    fn test_config_error_display() {
        let invalid_value =
            ConfigError::InvalidValue("TEST_VAR".to_string(), "bad_value".to_string());
        assert_eq!(
            format!("{}", invalid_value),
            "Invalid value for environment variable TEST_VAR: bad_value"
        );
    }

    #[test]
    #[serial]
    fn test_config_defaults_without_keys() {
        clear_env_vars();

        let config = Config::from_env().expect("Config should load without any keys");

        assert_eq!(config.bind_address.to_string(), "0.0.0.0:3000");
        assert_eq!(config.navigator_api_key, None);
        assert_eq!(config.navigator_base_url, "https://api.openai.com/v1");
        assert_eq!(config.model_name, "gpt-oss-120b");
        assert_eq!(config.elevenlabs_api_key, None);
        assert_eq!(config.elevenlabs_base_url, "https://api.elevenlabs.io");
        assert_eq!(config.response_mode, ResponseMode::Live);
        assert_eq!(config.log_level, Level::INFO);
        assert_eq!(config.prompts_path, PathBuf::from("./prompts"));
    }

    #[test]
    #[serial]
    fn test_config_from_env_custom_values() {
        clear_env_vars();
        unsafe {
            env::set_var("BIND_ADDRESS", "127.0.0.1:8080");
            env::set_var("NAVIGATOR_API_KEY", "sk-navigator");
            env::set_var("NAVIGATOR_BASE_URL", "https://api.ai.it.ufl.edu/v1");
            env::set_var("MODEL_NAME", "llama-3.3-70b-instruct");
            env::set_var("ELEVENLABS_API_KEY", "xi-key");
            env::set_var("RESPONSE_MODE", "Scripted");
            env::set_var("RUST_LOG", "debug");
            env::set_var("PROMPTS_PATH", "/custom/prompts");
        }

        let config = Config::from_env().expect("Config should load successfully");

        assert_eq!(config.bind_address.to_string(), "127.0.0.1:8080");
        assert_eq!(config.navigator_api_key.as_deref(), Some("sk-navigator"));
        assert_eq!(config.navigator_base_url, "https://api.ai.it.ufl.edu/v1");
        assert_eq!(config.model_name, "llama-3.3-70b-instruct");
        assert_eq!(config.elevenlabs_api_key.as_deref(), Some("xi-key"));
        assert_eq!(config.response_mode, ResponseMode::Scripted);
        assert_eq!(config.log_level, Level::DEBUG);
        assert_eq!(config.prompts_path, PathBuf::from("/custom/prompts"));
    }

    #[test]
    #[serial]
    fn test_blank_keys_count_as_missing() {
        clear_env_vars();
        unsafe {
            env::set_var("NAVIGATOR_API_KEY", "  ");
        }

        let config = Config::from_env().unwrap();
        assert_eq!(config.navigator_api_key, None);
    }

    #[test]
    #[serial]
    fn test_config_invalid_bind_address() {
        clear_env_vars();
        unsafe {
            env::set_var("BIND_ADDRESS", "not-a-valid-address");
        }

        let err = Config::from_env().unwrap_err();
        let ConfigError::InvalidValue(var, _) = err;
        assert_eq!(var, "BIND_ADDRESS");
    }

    #[test]
    #[serial]
    fn test_config_invalid_log_level() {
        clear_env_vars();
        unsafe {
            env::set_var("RUST_LOG", "not-a-level");
        }

        let err = Config::from_env().unwrap_err();
        let ConfigError::InvalidValue(var, _) = err;
        assert_eq!(var, "RUST_LOG");
    }

    #[test]
    #[serial]
    fn test_config_invalid_response_mode() {
        clear_env_vars();
        unsafe {
            env::set_var("RESPONSE_MODE", "simulated");
        }

        let err = Config::from_env().unwrap_err();
        assert!(err.to_string().contains("RESPONSE_MODE"));
        assert!(err.to_string().contains("simulated"));
    }
}
