use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::time::Duration;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Failed to read config file: {0}")]
    ReadError(#[from] std::io::Error),
    #[error("Failed to parse config: {0}")]
    ParseError(#[from] toml::de::Error),
    #[error("Failed to serialize config: {0}")]
    SerializeError(#[from] toml::ser::Error),
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Config {
    pub api: ApiConfig,
    pub session: SessionConfig,
    pub chat: ChatConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ApiConfig {
    pub base_url: String,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct SessionConfig {
    pub path: PathBuf,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ChatConfig {
    pub poll_interval_seconds: u64,
    #[serde(default)]
    pub team_id: String,
}

impl ChatConfig {
    pub fn poll_interval(&self) -> Duration {
        Duration::from_secs(self.poll_interval_seconds.max(1))
    }

    pub fn team(&self) -> Option<&str> {
        (!self.team_id.is_empty()).then_some(self.team_id.as_str())
    }
}

impl Config {
    pub fn from_toml(content: &str) -> Result<Self, ConfigError> {
        toml::from_str(content).map_err(ConfigError::from)
    }

    pub fn load_or_create() -> Result<Self, ConfigError> {
        let config_path = Self::config_path();

        if config_path.exists() {
            let content = std::fs::read_to_string(&config_path)?;
            Self::from_toml(&content)
        } else {
            let config = Self::default();
            config.save()?;
            Ok(config)
        }
    }

    pub fn config_dir() -> PathBuf {
        dirs::config_dir()
            .unwrap_or_else(|| PathBuf::from("."))
            .join("teamcal")
    }

    pub fn config_path() -> PathBuf {
        Self::config_dir().join("config.toml")
    }

    pub fn save(&self) -> Result<(), ConfigError> {
        let config_path = Self::config_path();

        if let Some(parent) = config_path.parent() {
            std::fs::create_dir_all(parent)?;
        }

        let content = toml::to_string_pretty(self)?;
        std::fs::write(&config_path, content)?;

        Ok(())
    }
}

impl Default for Config {
    fn default() -> Self {
        Self {
            api: ApiConfig {
                base_url: "http://localhost:8000/api".to_string(),
            },
            session: SessionConfig {
                path: Self::config_dir().join("session.json"),
            },
            chat: ChatConfig {
                poll_interval_seconds: 3,
                team_id: String::new(),
            },
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_config_polls_chat_every_3_seconds() {
        let config = Config::default();
        assert_eq!(config.chat.poll_interval(), Duration::from_secs(3));
    }

    #[test]
    fn default_config_keeps_session_next_to_config() {
        let config = Config::default();
        assert_eq!(config.session.path, Config::config_dir().join("session.json"));
    }

    #[test]
    fn zero_poll_interval_is_clamped() {
        let chat = ChatConfig {
            poll_interval_seconds: 0,
            team_id: String::new(),
        };
        assert_eq!(chat.poll_interval(), Duration::from_secs(1));
        assert_eq!(chat.team(), None);
    }

    #[test]
    fn parse_valid_toml_config() {
        let toml_content = r#"
            [api]
            base_url = "https://calendar.example.com/api"

            [session]
            path = "/tmp/teamcal-session.json"

            [chat]
            poll_interval_seconds = 10
            team_id = "design"
        "#;

        let config = Config::from_toml(toml_content).unwrap();

        assert_eq!(config.api.base_url, "https://calendar.example.com/api");
        assert_eq!(config.session.path, PathBuf::from("/tmp/teamcal-session.json"));
        assert_eq!(config.chat.poll_interval_seconds, 10);
        assert_eq!(config.chat.team(), Some("design"));
    }

    #[test]
    fn parse_invalid_toml_returns_error() {
        let invalid_toml = "this is not valid toml";
        let result = Config::from_toml(invalid_toml);
        assert!(result.is_err());
    }
}
