use utoipa::openapi::security::{HttpAuthScheme, HttpBuilder, SecurityScheme};
use utoipa::{Modify, OpenApi};
use crate::models::*;

/// Health check endpoint
#[utoipa::path(
    get,
    path = "/api/health",
    responses(
        (status = 200, description = "Service is healthy", body = HealthResponse)
    )
)]
#[allow(dead_code)]
pub async fn health_check_doc() {}

/// Readiness check, probes the document store
#[utoipa::path(
    get,
    path = "/api/ready",
    responses(
        (status = 200, description = "Service is ready", body = ReadyResponse),
        (status = 503, description = "Document store unavailable", body = ReadyResponse)
    )
)]
#[allow(dead_code)]
pub async fn ready_check_doc() {}

/// Live session counters and host stats, for admins
#[utoipa::path(
    get,
    path = "/api/v1/diagnostics",
    responses(
        (status = 200, description = "Diagnostics", body = DiagnosticsResponse),
        (status = 401, description = "Unauthorized", body = ErrorResponse),
        (status = 403, description = "Caller is not an admin", body = ErrorResponse)
    ),
    security(("bearer" = []))
)]
#[allow(dead_code)]
pub async fn diagnostics_doc() {}

/// Documents visible to the caller
#[utoipa::path(
    get,
    path = "/api/v1/documents",
    responses(
        (status = 200, description = "Documents the caller owns or collaborates on", body = DocumentListResponse),
        (status = 401, description = "Unauthorized", body = ErrorResponse)
    ),
    security(("bearer" = []))
)]
#[allow(dead_code)]
pub async fn list_documents_doc() {}

/// Create a document owned by the caller
#[utoipa::path(
    post,
    path = "/api/v1/documents",
    request_body = CreateDocumentRequest,
    responses(
        (status = 201, description = "Document created", body = DocumentResponse),
        (status = 400, description = "Invalid request or id already taken", body = ErrorResponse)
    ),
    security(("bearer" = []))
)]
#[allow(dead_code)]
pub async fn create_document_doc() {}

/// Latest scene plus a window of history
#[utoipa::path(
    get,
    path = "/api/v1/documents/{doc_id}",
    params(("doc_id" = String, Path, description = "Document id"), HistoryQuery),
    responses(
        (status = 200, description = "Document loaded", body = DocumentResponse),
        (status = 404, description = "Document not found", body = ErrorResponse),
        (status = 503, description = "Persistence unavailable", body = ErrorResponse)
    ),
    security(("bearer" = []))
)]
#[allow(dead_code)]
pub async fn load_document_doc() {}

/// Version history, oldest first
#[utoipa::path(
    get,
    path = "/api/v1/documents/{doc_id}/versions",
    params(("doc_id" = String, Path, description = "Document id"), HistoryQuery),
    responses(
        (status = 200, description = "Versions", body = VersionListResponse),
        (status = 404, description = "Document not found", body = ErrorResponse)
    ),
    security(("bearer" = []))
)]
#[allow(dead_code)]
pub async fn list_versions_doc() {}

/// Save a new scene version and relay it to live members
#[utoipa::path(
    post,
    path = "/api/v1/documents/{doc_id}/scene",
    params(("doc_id" = String, Path, description = "Document id")),
    request_body = SaveSceneRequest,
    responses(
        (status = 201, description = "Version recorded", body = SceneSavedResponse),
        (status = 403, description = "Role cannot edit", body = ErrorResponse),
        (status = 404, description = "Document not found", body = ErrorResponse)
    ),
    security(("bearer" = []))
)]
#[allow(dead_code)]
pub async fn save_scene_doc() {}

/// Replace the collaborator list (owner only)
#[utoipa::path(
    put,
    path = "/api/v1/documents/{doc_id}/collaborators",
    params(("doc_id" = String, Path, description = "Document id")),
    request_body = SetCollaboratorsRequest,
    responses(
        (status = 200, description = "Collaborators replaced", body = DocumentResponse),
        (status = 403, description = "Caller is not the owner", body = ErrorResponse)
    ),
    security(("bearer" = []))
)]
#[allow(dead_code)]
pub async fn set_collaborators_doc() {}

/// Comments on a document
#[utoipa::path(
    get,
    path = "/api/v1/documents/{doc_id}/comments",
    params(("doc_id" = String, Path, description = "Document id")),
    responses(
        (status = 200, description = "Comments, oldest first", body = CommentListResponse),
        (status = 404, description = "Document not found", body = ErrorResponse)
    ),
    security(("bearer" = []))
)]
#[allow(dead_code)]
pub async fn list_comments_doc() {}

/// Post a comment and relay it to live members
#[utoipa::path(
    post,
    path = "/api/v1/documents/{doc_id}/comments",
    params(("doc_id" = String, Path, description = "Document id")),
    request_body = AddCommentRequest,
    responses(
        (status = 201, description = "Comment recorded", body = CommentDto),
        (status = 400, description = "Empty or too long", body = ErrorResponse)
    ),
    security(("bearer" = []))
)]
#[allow(dead_code)]
pub async fn add_comment_doc() {}

#[derive(OpenApi)]
#[openapi(
    paths(
        health_check_doc,
        ready_check_doc,
        diagnostics_doc,
        list_documents_doc,
        create_document_doc,
        load_document_doc,
        list_versions_doc,
        save_scene_doc,
        set_collaborators_doc,
        list_comments_doc,
        add_comment_doc,
    ),
    components(
        schemas(
            HealthResponse, ReadyResponse, DiagnosticsResponse, ErrorResponse,
            CollaboratorDto, DocumentSummary, DocumentListResponse, DocumentResponse,
            VersionDto, VersionListResponse, CreateDocumentRequest, SaveSceneRequest,
            SceneSavedResponse, SetCollaboratorsRequest, AddCommentRequest, CommentDto,
            CommentListResponse,
        )
    ),
    modifiers(&BearerAuth),
    tags(
        (name = "api", description = "Document and comment endpoints")
    )
)]
pub struct ApiDoc;

struct BearerAuth;

impl Modify for BearerAuth {
    fn modify(&self, openapi: &mut utoipa::openapi::OpenApi) {
        if let Some(components) = openapi.components.as_mut() {
            components.add_security_scheme(
                "bearer",
                SecurityScheme::Http(HttpBuilder::new().scheme(HttpAuthScheme::Bearer).bearer_format("JWT").build()),
            );
        }
    }
}
