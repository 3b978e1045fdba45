use std::path::Path;

use serde::{Deserialize, Serialize};
use tracing::{info, warn};

use crate::error::{FdsError, Result};

/// Top-level configuration for the FDS analytics agent.
///
/// Loaded from `~/.fds-agent/config.toml` by default. Each section
/// corresponds to one collaborator: the model endpoint, the external tool
/// server, and the conversation engine itself.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FdsConfig {
    #[serde(default)]
    pub general: GeneralConfig,
    #[serde(default)]
    pub model: ModelConfig,
    #[serde(default)]
    pub tools: ToolServerConfig,
    #[serde(default)]
    pub chat: ChatConfig,
}

impl Default for FdsConfig {
    fn default() -> Self {
        Self {
            general: GeneralConfig::default(),
            model: ModelConfig::default(),
            tools: ToolServerConfig::default(),
            chat: ChatConfig::default(),
        }
    }
}

impl FdsConfig {
    /// Load configuration from a TOML file.
    ///
    /// Returns an error if the file cannot be read or parsed.
    pub fn load(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)?;
        let config: FdsConfig = toml::from_str(&content)?;
        info!("Configuration loaded from {}", path.display());
        Ok(config)
    }

    /// Load configuration from a TOML file, falling back to defaults if the
    /// file does not exist or cannot be parsed.
    pub fn load_or_default(path: &Path) -> Self {
        match Self::load(path) {
            Ok(config) => config,
            Err(e) => {
                warn!(
                    "Failed to load config from {}: {}. Using defaults.",
                    path.display(),
                    e
                );
                Self::default()
            }
        }
    }

    /// Save the current configuration to a TOML file.
    pub fn save(&self, path: &Path) -> Result<()> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let content = toml::to_string_pretty(self).map_err(|e| FdsError::Config(e.to_string()))?;
        std::fs::write(path, content)?;
        info!("Configuration saved to {}", path.display());
        Ok(())
    }
}

/// General application settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct GeneralConfig {
    /// Log level: trace, debug, info, warn, error.
    pub log_level: String,
    /// API server port.
    pub port: u16,
}

impl Default for GeneralConfig {
    fn default() -> Self {
        Self {
            log_level: "info".to_string(),
            port: 3030,
        }
    }
}

/// Language model endpoint settings (OpenAI-compatible chat completions).
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ModelConfig {
    /// Base URL of the chat completions API (without the trailing path).
    pub base_url: String,
    /// Model identifier sent with each request.
    pub model: String,
    /// Optional bearer token for the model endpoint.
    pub api_key: Option<String>,
    /// Sampling temperature.
    pub temperature: f64,
    /// Per-request timeout in seconds.
    pub request_timeout_secs: u64,
}

impl Default for ModelConfig {
    fn default() -> Self {
        Self {
            base_url: "http://localhost:11434/v1".to_string(),
            model: "gemini-2.5-flash".to_string(),
            api_key: None,
            temperature: 1.0,
            request_timeout_secs: 60,
        }
    }
}

/// External analytics tool server settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ToolServerConfig {
    /// Base URL of the tool server.
    pub base_url: String,
    /// Optional bearer token sent with every tool request.
    pub auth_token: Option<String>,
    /// Per-request timeout in seconds. The invoker never blocks past this.
    pub request_timeout_secs: u64,
}

impl Default for ToolServerConfig {
    fn default() -> Self {
        Self {
            base_url: "http://localhost:8080".to_string(),
            auth_token: None,
            request_timeout_secs: 30,
        }
    }
}

/// Conversation engine settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ChatConfig {
    /// Whether the chat engine accepts messages.
    pub enabled: bool,
    /// Tenant identifier injected into every tool call. The model cannot
    /// override this value.
    pub tenant_id: String,
    /// Number of prior turns rendered into the model context.
    pub context_turns: usize,
    /// Session timeout in minutes; expired sessions are replaced.
    pub session_timeout_minutes: u32,
    /// Maximum validation-correction rounds per turn before giving up.
    pub max_correction_rounds: u32,
    /// Maximum tool calls the model may chain within one turn.
    pub max_tool_calls: u32,
    /// Maximum consecutive tool failures before a plain-language apology.
    pub max_tool_failures: u32,
}

impl Default for ChatConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            tenant_id: "senso-sushi".to_string(),
            context_turns: 5,
            session_timeout_minutes: 30,
            max_correction_rounds: 3,
            max_tool_calls: 8,
            max_tool_failures: 3,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config() {
        let config = FdsConfig::default();
        assert_eq!(config.general.port, 3030);
        assert_eq!(config.general.log_level, "info");
        assert_eq!(config.chat.tenant_id, "senso-sushi");
        assert_eq!(config.chat.max_correction_rounds, 3);
        assert!(config.chat.enabled);
        assert_eq!(config.tools.request_timeout_secs, 30);
    }

    #[test]
    fn test_save_and_load_roundtrip() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.toml");

        let mut config = FdsConfig::default();
        config.general.port = 4040;
        config.chat.tenant_id = "test-tenant".to_string();
        config.tools.base_url = "http://tools.internal:9000".to_string();
        config.save(&path).unwrap();

        let loaded = FdsConfig::load(&path).unwrap();
        assert_eq!(loaded.general.port, 4040);
        assert_eq!(loaded.chat.tenant_id, "test-tenant");
        assert_eq!(loaded.tools.base_url, "http://tools.internal:9000");
    }

    #[test]
    fn test_load_missing_file_errors() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("does-not-exist.toml");
        assert!(FdsConfig::load(&path).is_err());
    }

    #[test]
    fn test_load_or_default_missing_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("does-not-exist.toml");
        let config = FdsConfig::load_or_default(&path);
        assert_eq!(config.general.port, 3030);
    }

    #[test]
    fn test_load_or_default_malformed_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.toml");
        std::fs::write(&path, "not [ valid toml").unwrap();
        let config = FdsConfig::load_or_default(&path);
        assert_eq!(config.chat.tenant_id, "senso-sushi");
    }

    #[test]
    fn test_partial_config_fills_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.toml");
        std::fs::write(&path, "[general]\nport = 5050\n").unwrap();
        let config = FdsConfig::load(&path).unwrap();
        assert_eq!(config.general.port, 5050);
        // Untouched sections keep defaults.
        assert_eq!(config.chat.tenant_id, "senso-sushi");
        assert_eq!(config.model.temperature, 1.0);
    }

    #[test]
    fn test_save_creates_parent_dirs() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("nested").join("deep").join("config.toml");
        FdsConfig::default().save(&path).unwrap();
        assert!(path.exists());
    }
}
