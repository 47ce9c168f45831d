pub mod api;
pub mod auth_middleware;

use std::sync::Arc;

use axum::{http::HeaderValue, routing::get, Router};
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;
use tracing::warn;
use utoipa::OpenApi;
use utoipa_swagger_ui::SwaggerUi;

use crate::docs::ApiDoc;
use crate::handlers::{health_check, ready_check};
use crate::state::AppState;
use crate::websocket::websocket_handler;

pub use api::create_api_routes;

/// The full application router
pub fn build_router(state: Arc<AppState>) -> Router {
    let public_routes = Router::<Arc<AppState>>::new()
        .route("/health", get(health_check))
        .route("/ready", get(ready_check))
        .with_state(state.clone());

    let ws_routes = Router::<Arc<AppState>>::new()
        .route("/ws", get(websocket_handler))
        .with_state(state.clone());

    let cors = cors_layer(&state.config.cors_origin_list());

    Router::new()
        .nest("/api", public_routes.merge(create_api_routes(state)))
        .merge(ws_routes)
        // Mount Swagger UI
        .merge(SwaggerUi::new("/swagger").url("/api-docs/openapi.json", ApiDoc::openapi()))
        .layer(cors)
        .layer(TraceLayer::new_for_http())
}

fn cors_layer(origins: &[String]) -> CorsLayer {
    if origins.is_empty() {
        return CorsLayer::new().allow_origin(Any).allow_methods(Any).allow_headers(Any);
    }
    let allowed: Vec<HeaderValue> = origins
        .iter()
        .filter_map(|o| match HeaderValue::from_str(o) {
            Ok(value) => Some(value),
            Err(_) => {
                warn!("Ignoring invalid CORS origin '{}'", o);
                None
            }
        })
        .collect();
    CorsLayer::new().allow_origin(allowed).allow_methods(Any).allow_headers(Any)
}
