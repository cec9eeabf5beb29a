//! Configuration system for the devgrid SDK
//!
//! Client configuration is loaded from TOML. Secrets are never stored in the
//! file itself; fields ending in `_env` name the environment variable that
//! holds the value and are resolved at runtime.

use serde::{Deserialize, Serialize};
use std::path::Path;
use thiserror::Error;

/// Main client configuration structure
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ClientConfig {
    pub app: AppSection,
    pub network: NetworkSection,
    pub auth: AuthSection,
    #[serde(default)]
    pub dispatch: DispatchSection,
}

/// Application section
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct AppSection {
    /// Application identifier (must match [a-zA-Z0-9._-]+); used as the tenant
    /// segment of publish topics and as the broker username
    pub id: String,
    /// Description of what this application does
    #[serde(default)]
    pub description: String,
}

/// Network section - broker connection parameters
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct NetworkSection {
    /// Broker URL with protocol and port (mqtt:// or mqtts://)
    pub broker_url: String,
    /// Keep-alive interval in seconds (default: 60)
    #[serde(default = "default_keep_alive_secs")]
    pub keep_alive_secs: u64,
    /// Maximum inbound packet size in bytes (default: 256KB)
    #[serde(default = "default_max_packet_size")]
    pub max_packet_size: usize,
}

/// Auth section - token endpoints and grant material
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct AuthSection {
    /// Token exchange endpoint
    pub token_url: String,
    /// Token restriction endpoint
    pub restrict_url: String,
    /// OAuth client identifier
    pub client_id: String,
    /// Environment variable containing the OAuth client secret
    pub client_secret_env: String,
    /// Environment variable containing a static access key (key grant)
    pub key_env: Option<String>,
    /// Username for the password grant
    pub username: Option<String>,
    /// Environment variable containing the password for the password grant
    pub password_env: Option<String>,
}

/// Dispatch section - worker pool sizing and shutdown behavior
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct DispatchSection {
    /// Maximum number of handler invocations in flight (default: 32)
    #[serde(default = "default_max_concurrency")]
    pub max_concurrency: usize,
    /// How long a graceful shutdown waits for in-flight handlers, in seconds
    /// (default: 10)
    #[serde(default = "default_drain_timeout_secs")]
    pub drain_timeout_secs: u64,
}

impl Default for DispatchSection {
    fn default() -> Self {
        Self {
            max_concurrency: default_max_concurrency(),
            drain_timeout_secs: default_drain_timeout_secs(),
        }
    }
}

fn default_keep_alive_secs() -> u64 {
    60
}

fn default_max_packet_size() -> usize {
    256 * 1024
}

fn default_max_concurrency() -> usize {
    32
}

fn default_drain_timeout_secs() -> u64 {
    10
}

/// Configuration loading errors
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Failed to read config file: {0}")]
    FileRead(#[from] std::io::Error),
    #[error("Failed to parse TOML: {0}")]
    TomlParse(#[from] toml::de::Error),
    #[error("Environment variable not found: {0}")]
    EnvVarNotFound(String),
    #[error("Invalid application ID format: {0}")]
    InvalidAppId(String),
    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),
}

impl ClientConfig {
    /// Load configuration from a TOML file
    pub fn load_from_file(path: &Path) -> Result<Self, ConfigError> {
        let content = std::fs::read_to_string(path)?;
        Self::load_from_str(&content)
    }

    /// Load configuration from a TOML string
    pub fn load_from_str(content: &str) -> Result<Self, ConfigError> {
        let config: ClientConfig = toml::from_str(content)?;
        validate_app_id(&config.app.id)?;
        config.auth.validate()?;
        Ok(config)
    }

    /// Get the static access key from its environment variable
    pub fn access_key(&self) -> Option<String> {
        self.auth
            .key_env
            .as_ref()
            .and_then(|name| std::env::var(name).ok())
    }

    /// Get the OAuth client secret from its environment variable
    pub fn client_secret(&self) -> Result<String, ConfigError> {
        get_env_var_required(&self.auth.client_secret_env)
    }

    /// Get the password-grant password from its environment variable
    pub fn password(&self) -> Result<String, ConfigError> {
        match &self.auth.password_env {
            Some(name) => get_env_var_required(name),
            None => Err(ConfigError::InvalidConfig(
                "password grant requires auth.password_env".to_string(),
            )),
        }
    }
}

impl AuthSection {
    /// Ensure exactly one grant mechanism is configured
    pub fn validate(&self) -> Result<(), ConfigError> {
        let key = self.key_env.is_some();
        let password = self.username.is_some() || self.password_env.is_some();

        if key && password {
            return Err(ConfigError::InvalidConfig(
                "auth.key_env and auth.username/password_env are mutually exclusive".to_string(),
            ));
        }
        if self.username.is_some() != self.password_env.is_some() {
            return Err(ConfigError::InvalidConfig(
                "password grant requires both auth.username and auth.password_env".to_string(),
            ));
        }
        Ok(())
    }
}

fn get_env_var_required(env_var_name: &str) -> Result<String, ConfigError> {
    std::env::var(env_var_name).map_err(|_| ConfigError::EnvVarNotFound(env_var_name.to_string()))
}

fn validate_app_id(app_id: &str) -> Result<(), ConfigError> {
    if app_id.is_empty() {
        return Err(ConfigError::InvalidAppId("empty".to_string()));
    }
    for ch in app_id.chars() {
        if !ch.is_ascii_alphanumeric() && ch != '.' && ch != '_' && ch != '-' {
            return Err(ConfigError::InvalidAppId(format!(
                "invalid character '{ch}' in '{app_id}'"
            )));
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    const MINIMAL: &str = r#"
        [app]
        id = "test-app"

        [network]
        broker_url = "mqtt://localhost:1883"

        [auth]
        token_url = "https://account.example.com/token"
        restrict_url = "https://account.example.com/restrict"
        client_id = "test-client"
        client_secret_env = "DEVGRID_CLIENT_SECRET"
        key_env = "DEVGRID_ACCESS_KEY"
    "#;

    #[test]
    fn test_minimal_config_with_defaults() {
        let config = ClientConfig::load_from_str(MINIMAL).unwrap();
        assert_eq!(config.app.id, "test-app");
        assert_eq!(config.network.keep_alive_secs, 60);
        assert_eq!(config.network.max_packet_size, 256 * 1024);
        assert_eq!(config.dispatch.max_concurrency, 32);
        assert_eq!(config.dispatch.drain_timeout_secs, 10);
    }

    #[test]
    fn test_invalid_app_id_rejected() {
        let content = MINIMAL.replace("test-app", "bad app");
        let err = ClientConfig::load_from_str(&content).unwrap_err();
        assert!(matches!(err, ConfigError::InvalidAppId(_)));
    }

    #[test]
    fn test_conflicting_grants_rejected() {
        let content = format!(
            "{MINIMAL}\nusername = \"alice\"\npassword_env = \"DEVGRID_PASSWORD\"\n"
        );
        let err = ClientConfig::load_from_str(&content).unwrap_err();
        assert!(matches!(err, ConfigError::InvalidConfig(_)));
    }

    #[test]
    fn test_password_grant_requires_both_fields() {
        let content = MINIMAL
            .replace("key_env = \"DEVGRID_ACCESS_KEY\"", "username = \"alice\"");
        let err = ClientConfig::load_from_str(&content).unwrap_err();
        assert!(matches!(err, ConfigError::InvalidConfig(_)));
    }

    #[test]
    fn test_missing_section_is_parse_error() {
        let err = ClientConfig::load_from_str("[app]\nid = \"a\"").unwrap_err();
        assert!(matches!(err, ConfigError::TomlParse(_)));
    }

    #[test]
    fn test_missing_env_var_error() {
        let config = ClientConfig::load_from_str(MINIMAL).unwrap();
        let mut auth = config.auth.clone();
        auth.client_secret_env = "DEVGRID_TEST_UNSET_SECRET".to_string();
        let config = ClientConfig { auth, ..config };
        assert!(matches!(
            config.client_secret(),
            Err(ConfigError::EnvVarNotFound(_))
        ));
    }
}
