use std::sync::Arc;

use axum::{
    middleware,
    routing::{get, post, put},
    Router,
};

use crate::handlers::{
    add_comment, create_document, diagnostics, list_comments, list_documents, list_versions, load_document,
    save_scene, set_collaborators,
};
use crate::routes::auth_middleware::auth_middleware;
use crate::state::AppState;

/// Create the authenticated API routes
pub fn create_api_routes(state: Arc<AppState>) -> Router {
    Router::<Arc<AppState>>::new()
        .route("/v1/diagnostics", get(diagnostics))
        .route("/v1/documents", get(list_documents).post(create_document))
        .route("/v1/documents/:doc_id", get(load_document))
        .route("/v1/documents/:doc_id/versions", get(list_versions))
        .route("/v1/documents/:doc_id/scene", post(save_scene))
        .route("/v1/documents/:doc_id/collaborators", put(set_collaborators))
        .route("/v1/documents/:doc_id/comments", get(list_comments).post(add_comment))
        .route_layer(middleware::from_fn_with_state(state.clone(), auth_middleware)) // Applies to all routes added above
        .with_state(state)
}
