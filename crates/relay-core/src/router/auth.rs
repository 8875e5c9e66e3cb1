//! Authentication hook
//!
//! The router answers `authenticate` events by delegating to an [`Authenticator`].
//! Credential checks themselves live outside the core.

use serde_json::{Map, Value};
use thiserror::Error;

/// Authentication failure
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum AuthError {
    #[error("Missing credentials")]
    MissingCredentials,

    #[error("Invalid credentials")]
    InvalidCredentials,

    #[error("Credentials expired")]
    Expired,
}

/// Checks the payload of an `authenticate` event
pub trait Authenticator: Send + Sync {
    /// Validate the credentials and return the user info attached to the session
    fn authenticate(&self, credentials: &Map<String, Value>) -> Result<Value, AuthError>;
}

/// Authenticator that refuses everyone
///
/// Installed until a real one is configured.
#[derive(Debug, Clone, Copy, Default)]
pub struct RejectAllAuthenticator;

impl Authenticator for RejectAllAuthenticator {
    fn authenticate(&self, credentials: &Map<String, Value>) -> Result<Value, AuthError> {
        if credentials.contains_key("token") || credentials.contains_key("credentials") {
            Err(AuthError::InvalidCredentials)
        } else {
            Err(AuthError::MissingCredentials)
        }
    }
}

impl<F> Authenticator for F
where
    F: Fn(&Map<String, Value>) -> Result<Value, AuthError> + Send + Sync,
{
    fn authenticate(&self, credentials: &Map<String, Value>) -> Result<Value, AuthError> {
        self(credentials)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_reject_all() {
        let mut credentials = Map::new();
        assert_eq!(
            RejectAllAuthenticator.authenticate(&credentials),
            Err(AuthError::MissingCredentials)
        );

        credentials.insert("token".to_string(), json!("abc"));
        assert_eq!(
            RejectAllAuthenticator.authenticate(&credentials),
            Err(AuthError::InvalidCredentials)
        );
    }

    #[test]
    fn test_closure_authenticator() {
        let check = |credentials: &Map<String, Value>| match credentials.get("token") {
            Some(Value::String(token)) if token == "letmein" => Ok(json!({"id": "u1"})),
            _ => Err(AuthError::InvalidCredentials),
        };

        let mut credentials = Map::new();
        credentials.insert("token".to_string(), json!("letmein"));
        assert_eq!(check.authenticate(&credentials), Ok(json!({"id": "u1"})));
    }
}
