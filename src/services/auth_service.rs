use std::fmt;

use axum::http::{self, HeaderMap};
use jsonwebtoken::{decode, Algorithm, DecodingKey, TokenData, Validation};
use tracing::{debug, info};

use crate::models::UserId;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AuthError {
    MissingToken,
    Unauthorized(String),
    NotConfigured,
}

impl fmt::Display for AuthError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            AuthError::MissingToken => write!(f, "Missing Authorization header, auth_token cookie or token parameter"),
            AuthError::Unauthorized(reason) => write!(f, "Unauthorized: {}", reason),
            AuthError::NotConfigured => write!(f, "Authentication is not configured"),
        }
    }
}

impl std::error::Error for AuthError {}

/// Turns a credential token into a trusted user id
pub trait Authenticator: Send + Sync {
    fn authenticate(&self, token: &str) -> Result<UserId, AuthError>;
}

/// Validates HS256 user tokens; the `sub` claim is the user id
pub struct JwtAuthenticator {
    secret: Option<String>,
}

impl JwtAuthenticator {
    pub fn new(secret: Option<String>) -> Self {
        Self { secret }
    }
}

impl Authenticator for JwtAuthenticator {
    fn authenticate(&self, token: &str) -> Result<UserId, AuthError> {
        let secret = self.secret.as_deref().ok_or(AuthError::NotConfigured)?;
        let token_data = validate_jwt(token, secret).map_err(|e| AuthError::Unauthorized(format!("JWT validation failed: {}", e)))?;

        // Service tokens are for service-to-service calls, never for editing sessions
        if let Some(token_type) = token_data.claims.get("type").and_then(|v| v.as_str()) {
            if token_type != "user" {
                return Err(AuthError::Unauthorized(format!("Invalid token type: {}", token_type)));
            }
        }

        let uid = token_data
            .claims
            .get("sub")
            .and_then(|v| v.as_str())
            .filter(|s| !s.is_empty())
            .ok_or_else(|| AuthError::Unauthorized("JWT token does not contain 'sub' claim".to_string()))?;

        debug!("JWT token validated for user: {}", uid);
        Ok(UserId::from(uid))
    }
}

// Get the auth token from request headers
pub fn get_auth_token(headers: &HeaderMap) -> Result<String, AuthError> {
    // 1. Try to get token from Authorization header
    if let Some(auth_header) = headers.get(http::header::AUTHORIZATION) {
        let auth_str = auth_header
            .to_str()
            .map_err(|_| AuthError::Unauthorized("Invalid Authorization header".to_string()))?;
        return Ok(auth_str.strip_prefix("Bearer ").unwrap_or(auth_str).trim().to_string());
    }

    // 2. Try to get token from cookies
    let cookie_header = headers
        .get(http::header::COOKIE)
        .ok_or(AuthError::MissingToken)?
        .to_str()
        .map_err(|_| AuthError::Unauthorized("Invalid Cookie header".to_string()))?;

    for cookie in cookie::Cookie::split_parse(cookie_header).flatten() {
        if cookie.name() == "auth_token" {
            return Ok(cookie.value().to_string());
        }
    }
    Err(AuthError::MissingToken)
}

/// Like [`get_auth_token`], falling back to a `?token=` query value.
/// Browsers cannot set headers on a WebSocket handshake.
pub fn get_auth_token_or_query(headers: &HeaderMap, query_token: Option<&str>) -> Result<String, AuthError> {
    match get_auth_token(headers) {
        Ok(token) => Ok(token),
        Err(AuthError::MissingToken) => match query_token.filter(|t| !t.is_empty()) {
            Some(token) => {
                info!("Using token from query parameter");
                Ok(token.to_string())
            }
            None => Err(AuthError::MissingToken),
        },
        Err(e) => Err(e),
    }
}

// Validate a JWT token and return the token data
pub fn validate_jwt(token: &str, secret: &str) -> Result<TokenData<serde_json::Value>, jsonwebtoken::errors::Error> {
    let validation = Validation::new(Algorithm::HS256);
    let decoding_key = DecodingKey::from_secret(secret.as_bytes());
    decode::<serde_json::Value>(token, &decoding_key, &validation)
}
