//! Application configuration structs
//!
//! Loads configuration from environment variables (and an optional `.env` file).

use serde::Deserialize;
use std::env;
use std::time::Duration;

/// Main application configuration
#[derive(Debug, Clone, Deserialize)]
pub struct AppConfig {
    pub app: AppSettings,
    pub gateway: ServerConfig,
    pub dispatcher: DispatcherSettings,
    pub router: RouterSettings,
    pub auth: AuthConfig,
}

/// General application settings
#[derive(Debug, Clone, Deserialize)]
pub struct AppSettings {
    #[serde(default = "default_app_name")]
    pub name: String,
    #[serde(default = "default_env")]
    pub env: Environment,
}

/// Environment type
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum Environment {
    #[default]
    Development,
    Staging,
    Production,
}

impl Environment {
    #[must_use]
    pub fn is_production(&self) -> bool {
        matches!(self, Self::Production)
    }

    #[must_use]
    pub fn is_development(&self) -> bool {
        matches!(self, Self::Development)
    }

    fn parse(value: &str) -> Option<Self> {
        match value.to_lowercase().as_str() {
            "production" => Some(Self::Production),
            "staging" => Some(Self::Staging),
            "development" => Some(Self::Development),
            _ => None,
        }
    }
}

/// Gateway listener configuration
#[derive(Debug, Clone, Deserialize)]
pub struct ServerConfig {
    #[serde(default = "default_host")]
    pub host: String,
    pub port: u16,
}

impl ServerConfig {
    #[must_use]
    pub fn address(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }
}

/// Event dispatcher limits
#[derive(Debug, Clone, Deserialize)]
pub struct DispatcherSettings {
    /// Instance-wide listener cap
    #[serde(default = "default_max_listeners")]
    pub max_listeners: usize,
    /// Default timeout for acknowledgements and `wait_for`, in seconds
    #[serde(default = "default_timeout_secs")]
    pub default_timeout_secs: u64,
}

impl DispatcherSettings {
    #[must_use]
    pub fn default_timeout(&self) -> Duration {
        Duration::from_secs(self.default_timeout_secs)
    }
}

impl Default for DispatcherSettings {
    fn default() -> Self {
        Self {
            max_listeners: default_max_listeners(),
            default_timeout_secs: default_timeout_secs(),
        }
    }
}

/// Message router behaviour
#[derive(Debug, Clone, Deserialize)]
pub struct RouterSettings {
    /// Reply with an error envelope when no handler is registered for an event
    #[serde(default)]
    pub respond_to_unknown_events: bool,
    /// Name of the codec used for inbound and outbound frames
    #[serde(default = "default_message_format")]
    pub message_format: String,
    /// Per-connection outbound queue size
    #[serde(default = "default_outbound_buffer")]
    pub outbound_buffer: usize,
}

impl Default for RouterSettings {
    fn default() -> Self {
        Self {
            respond_to_unknown_events: false,
            message_format: default_message_format(),
            outbound_buffer: default_outbound_buffer(),
        }
    }
}

/// Token authentication configuration
#[derive(Debug, Clone, Default, Deserialize)]
pub struct AuthConfig {
    /// HS256 secret; authentication is refused for everyone when absent
    pub jwt_secret: Option<String>,
    #[serde(default = "default_token_expiry")]
    pub token_expiry: i64,
}

// Default value functions
fn default_app_name() -> String {
    "relay".to_string()
}

fn default_env() -> Environment {
    Environment::Development
}

fn default_host() -> String {
    "127.0.0.1".to_string()
}

fn default_max_listeners() -> usize {
    50
}

fn default_timeout_secs() -> u64 {
    30
}

fn default_message_format() -> String {
    "json".to_string()
}

fn default_outbound_buffer() -> usize {
    100
}

fn default_token_expiry() -> i64 {
    3600 // 1 hour
}

fn parse_var<T: std::str::FromStr>(name: &'static str) -> Result<Option<T>, ConfigError> {
    match env::var(name) {
        Ok(raw) => raw
            .trim()
            .parse()
            .map(Some)
            .map_err(|_| ConfigError::InvalidValue(name, raw)),
        Err(_) => Ok(None),
    }
}

impl AppConfig {
    /// Load configuration from environment variables
    ///
    /// # Errors
    /// Returns an error if required environment variables are missing or malformed
    pub fn from_env() -> Result<Self, ConfigError> {
        // Load .env file if present (ignore errors if not found)
        let _ = dotenvy::dotenv();

        Ok(Self {
            app: AppSettings {
                name: env::var("APP_NAME").unwrap_or_else(|_| default_app_name()),
                env: env::var("APP_ENV")
                    .ok()
                    .and_then(|s| Environment::parse(&s))
                    .unwrap_or_default(),
            },
            gateway: ServerConfig {
                host: env::var("GATEWAY_HOST").unwrap_or_else(|_| default_host()),
                port: parse_var("GATEWAY_PORT")?.ok_or(ConfigError::MissingVar("GATEWAY_PORT"))?,
            },
            dispatcher: DispatcherSettings {
                max_listeners: parse_var("DISPATCHER_MAX_LISTENERS")?
                    .unwrap_or_else(default_max_listeners),
                default_timeout_secs: parse_var("DISPATCHER_DEFAULT_TIMEOUT_SECS")?
                    .unwrap_or_else(default_timeout_secs),
            },
            router: RouterSettings {
                respond_to_unknown_events: parse_var("ROUTER_RESPOND_UNKNOWN_EVENTS")?
                    .unwrap_or(false),
                message_format: env::var("ROUTER_MESSAGE_FORMAT")
                    .unwrap_or_else(|_| default_message_format()),
                outbound_buffer: parse_var("ROUTER_OUTBOUND_BUFFER")?
                    .unwrap_or_else(default_outbound_buffer),
            },
            auth: AuthConfig {
                jwt_secret: env::var("JWT_SECRET").ok().filter(|s| !s.is_empty()),
                token_expiry: parse_var("JWT_TOKEN_EXPIRY")?.unwrap_or_else(default_token_expiry),
            },
        })
    }
}

/// Configuration errors
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Missing required environment variable: {0}")]
    MissingVar(&'static str),

    #[error("Invalid value for {0}: {1}")]
    InvalidValue(&'static str, String),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_environment_is_production() {
        assert!(!Environment::Development.is_production());
        assert!(!Environment::Staging.is_production());
        assert!(Environment::Production.is_production());
    }

    #[test]
    fn test_environment_parse() {
        assert_eq!(Environment::parse("PRODUCTION"), Some(Environment::Production));
        assert_eq!(Environment::parse("staging"), Some(Environment::Staging));
        assert_eq!(Environment::parse("qa"), None);
    }

    #[test]
    fn test_server_address() {
        let config = ServerConfig {
            host: "0.0.0.0".to_string(),
            port: 8080,
        };
        assert_eq!(config.address(), "0.0.0.0:8080");
    }

    #[test]
    fn test_dispatcher_defaults() {
        let settings = DispatcherSettings::default();
        assert_eq!(settings.max_listeners, 50);
        assert_eq!(settings.default_timeout(), Duration::from_secs(30));
    }

    #[test]
    fn test_router_defaults() {
        let settings = RouterSettings::default();
        assert!(!settings.respond_to_unknown_events);
        assert_eq!(settings.message_format, "json");
        assert_eq!(settings.outbound_buffer, 100);
    }

    #[test]
    fn test_default_values() {
        assert_eq!(default_app_name(), "relay");
        assert_eq!(default_host(), "127.0.0.1");
        assert_eq!(default_token_expiry(), 3600);
    }
}
