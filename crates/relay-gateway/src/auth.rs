//! JWT authentication for `authenticate` events
//!
//! Expects `{"event": "authenticate", "data": {"token": "<jwt>"}}` and attaches
//! `{"id": <sub>, "name"?: <name>}` to the session on success.

use relay_common::{AppError, JwtService};
use relay_core::{AuthError, Authenticator};
use serde_json::{json, Map, Value};

/// Authenticator backed by HS256 access tokens
#[derive(Debug, Clone)]
pub struct JwtAuthenticator {
    jwt: JwtService,
}

impl JwtAuthenticator {
    #[must_use]
    pub fn new(jwt: JwtService) -> Self {
        Self { jwt }
    }
}

impl Authenticator for JwtAuthenticator {
    fn authenticate(&self, credentials: &Map<String, Value>) -> Result<Value, AuthError> {
        let token = credentials
            .get("token")
            .and_then(Value::as_str)
            .ok_or(AuthError::MissingCredentials)?;

        let claims = self.jwt.validate_token(token).map_err(|e| match e {
            AppError::TokenExpired => AuthError::Expired,
            _ => AuthError::InvalidCredentials,
        })?;

        let mut user = json!({ "id": claims.sub });
        if let Some(name) = claims.name {
            user["name"] = Value::String(name);
        }
        Ok(user)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const SECRET: &str = "gateway-test-secret-with-enough-length";

    fn credentials(token: &str) -> Map<String, Value> {
        let mut map = Map::new();
        map.insert("token".to_string(), Value::String(token.to_string()));
        map
    }

    #[test]
    fn test_valid_token() {
        let jwt = JwtService::new(SECRET, 60);
        let token = jwt.issue_token("user-1", Some("Ada".to_string())).unwrap();
        let auth = JwtAuthenticator::new(jwt);

        assert_eq!(
            auth.authenticate(&credentials(&token)),
            Ok(json!({"id": "user-1", "name": "Ada"}))
        );
    }

    #[test]
    fn test_rejections() {
        let jwt = JwtService::new(SECRET, -3600);
        let expired = jwt.issue_token("user-1", None).unwrap();
        let auth = JwtAuthenticator::new(jwt);

        assert_eq!(auth.authenticate(&Map::new()), Err(AuthError::MissingCredentials));
        assert_eq!(auth.authenticate(&credentials("garbage")), Err(AuthError::InvalidCredentials));
        assert_eq!(auth.authenticate(&credentials(&expired)), Err(AuthError::Expired));
    }
}
