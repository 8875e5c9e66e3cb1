//! Application error types
//!
//! Errors raised while bootstrapping and serving the gateway.

use crate::config::ConfigError;

/// Application-wide error type
#[derive(Debug, thiserror::Error)]
pub enum AppError {
    // Token errors
    #[error("Invalid token")]
    InvalidToken,

    #[error("Token expired")]
    TokenExpired,

    #[error(transparent)]
    Config(#[from] ConfigError),

    // Server errors
    #[error("Failed to bind {addr}: {reason}")]
    Bind { addr: String, reason: String },

    #[error("Server error: {0}")]
    Server(String),

    #[error("Internal error")]
    Internal(#[source] anyhow::Error),
}

impl AppError {
    /// Stable code for structured logs
    #[must_use]
    pub fn error_code(&self) -> &'static str {
        match self {
            Self::InvalidToken => "INVALID_TOKEN",
            Self::TokenExpired => "TOKEN_EXPIRED",
            Self::Config(_) => "CONFIG_ERROR",
            Self::Bind { .. } => "BIND_ERROR",
            Self::Server(_) => "SERVER_ERROR",
            Self::Internal(_) => "INTERNAL_ERROR",
        }
    }

    /// Check if the error means the presented token cannot be used
    #[must_use]
    pub fn is_token_error(&self) -> bool {
        matches!(self, Self::InvalidToken | Self::TokenExpired)
    }
}

/// Result type alias for application operations
pub type AppResult<T> = Result<T, AppError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_codes() {
        assert_eq!(AppError::InvalidToken.error_code(), "INVALID_TOKEN");
        assert_eq!(
            AppError::Config(ConfigError::MissingVar("GATEWAY_PORT")).error_code(),
            "CONFIG_ERROR"
        );
        assert_eq!(AppError::Server("boom".to_string()).error_code(), "SERVER_ERROR");
    }

    #[test]
    fn test_is_token_error() {
        assert!(AppError::TokenExpired.is_token_error());
        assert!(!AppError::Server("test".to_string()).is_token_error());
    }

    #[test]
    fn test_config_error_is_transparent() {
        let err = AppError::from(ConfigError::MissingVar("GATEWAY_PORT"));
        assert_eq!(
            err.to_string(),
            "Missing required environment variable: GATEWAY_PORT"
        );
    }

    #[test]
    fn test_bind_error_message() {
        let err = AppError::Bind {
            addr: "0.0.0.0:1".to_string(),
            reason: "denied".to_string(),
        };

        assert_eq!(err.error_code(), "BIND_ERROR");
        assert_eq!(err.to_string(), "Failed to bind 0.0.0.0:1: denied");
    }
}
