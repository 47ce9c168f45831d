use std::sync::Arc;

use axum::{
    extract::{Request, State},
    http::StatusCode,
    middleware::Next,
    response::{IntoResponse, Response},
};
use tracing::{debug, error};

use crate::models::ErrorResponse;
use crate::services::auth_service::get_auth_token;
use crate::services::AuthError;
use crate::state::AppState;

/// Resolve the caller from the request credential and put its `UserId`
/// into the request extensions for downstream handlers
pub async fn auth_middleware(
    State(app_state): State<Arc<AppState>>,
    mut req: Request,
    next: Next,
) -> Response {
    // 1. Get the auth token from the request
    let token = match get_auth_token(req.headers()) {
        Ok(token) => token,
        Err(e) => return ErrorResponse::reply(StatusCode::UNAUTHORIZED, e.to_string()).into_response(),
    };

    // 2. Validate it
    let user_id = match app_state.gateway.authenticate(&token) {
        Ok(user_id) => user_id,
        Err(AuthError::NotConfigured) => {
            error!("Auth JWT secret not configured");
            return ErrorResponse::reply(StatusCode::INTERNAL_SERVER_ERROR, AuthError::NotConfigured.to_string())
                .into_response();
        }
        Err(e) => {
            error!("JWT validation failed: {}", e);
            return ErrorResponse::reply(StatusCode::UNAUTHORIZED, e.to_string()).into_response();
        }
    };
    debug!("Request authenticated for user {}", user_id);

    // 3. Hand the user to the handlers
    req.extensions_mut().insert(user_id);
    next.run(req).await
}
