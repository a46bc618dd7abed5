use std::net::SocketAddr;
use std::path::PathBuf;
use std::str::FromStr;
use std::time::Duration;
use tracing::Level;
use tutor_core::{poller::PollerConfig, poller::OPENING_LINE, typing::DEFAULT_TICK};

/// A custom error type for configuration loading failures.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Missing environment variable: {0}")]
    MissingVar(String),
    #[error("Invalid value for environment variable {0}: {1}")]
    InvalidValue(String, String),
}

/// Holds all configuration loaded from the environment at startup.
#[derive(Clone, Debug)]
pub struct Config {
    pub bind_address: SocketAddr,
    pub openai_api_key: String,
    pub openai_api_base: String,
    pub assistant_id: String,
    pub chat_model: String,
    pub log_level: Level,
    pub prompts_path: PathBuf,
    pub poll_interval: Duration,
    pub max_polls: u32,
    pub typing_tick: Duration,
    pub opening_line: String,
}

fn required_var(name: &str) -> Result<String, ConfigError> {
    std::env::var(name)
        .ok()
        .filter(|v| !v.is_empty())
        .ok_or_else(|| ConfigError::MissingVar(name.to_string()))
}

fn parsed_var<T: FromStr>(name: &str, default: T) -> Result<T, ConfigError>
where
    T::Err: std::fmt::Display,
{
    match std::env::var(name) {
        Ok(raw) => raw
            .parse::<T>()
            .map_err(|e| ConfigError::InvalidValue(name.to_string(), e.to_string())),
        Err(_) => Ok(default),
    }
}

impl Config {
    /// Loads configuration from environment variables.
    pub fn from_env() -> Result<Self, ConfigError> {
        // Tests control the environment themselves.
        if !cfg!(test) {
            dotenvy::dotenv().ok();
        }

        let bind_address = parsed_var("BIND_ADDRESS", SocketAddr::from(([0, 0, 0, 0], 3000)))?;

        let openai_api_key = required_var("OPENAI_API_KEY")?;
        let assistant_id = required_var("ASSISTANT_ID")?;
        let openai_api_base = std::env::var("OPENAI_API_BASE")
            .unwrap_or_else(|_| "https://api.openai.com/v1".to_string());

        let chat_model = std::env::var("CHAT_MODEL").unwrap_or_else(|_| "gpt-4o".to_string());

        let log_level = parsed_var("RUST_LOG", Level::INFO)?;

        let prompts_path = std::env::var("PROMPTS_PATH")
            .map(PathBuf::from)
            .unwrap_or_else(|_| PathBuf::from("./prompts"));

        let poll_interval = Duration::from_millis(parsed_var("POLL_INTERVAL_MS", 1000u64)?);
        let max_polls = parsed_var("MAX_POLLS", 120u32)?;
        if max_polls == 0 {
            return Err(ConfigError::InvalidValue(
                "MAX_POLLS".to_string(),
                "must be at least 1".to_string(),
            ));
        }
        let typing_tick = Duration::from_millis(parsed_var(
            "TYPING_TICK_MS",
            DEFAULT_TICK.as_millis() as u64,
        )?);
        let opening_line =
            std::env::var("OPENING_LINE").unwrap_or_else(|_| OPENING_LINE.to_string());

        Ok(Self {
            bind_address,
            openai_api_key,
            openai_api_base,
            assistant_id,
            chat_model,
            log_level,
            prompts_path,
            poll_interval,
            max_polls,
            typing_tick,
            opening_line,
        })
    }

    /// Polling settings for one conversation.
    pub fn poller_config(&self) -> PollerConfig {
        PollerConfig {
            assistant_id: self.assistant_id.clone(),
            opening_line: self.opening_line.clone(),
            interval: self.poll_interval,
            max_polls: self.max_polls,
        }
    }
}
