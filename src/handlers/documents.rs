use std::sync::Arc;

use axum::{
    extract::{Extension, Path, Query, State},
    http::StatusCode,
    Json,
};
use tracing::info;

use crate::auth::auth;
use crate::models::{
    Collaborator, CreateDocumentRequest, DocumentId, DocumentListResponse, DocumentResponse, DocumentSummary,
    ErrorResponse, HistoryQuery, LoadedDocument, NewDocument, SaveSceneRequest, ScenePayload, SceneSavedResponse,
    SetCollaboratorsRequest, SyncError, UserId, VersionDto, VersionListResponse, VersionRange,
};
use crate::state::AppState;

type ApiError = (StatusCode, Json<ErrorResponse>);

fn history_range(query: &HistoryQuery, page_limit: usize) -> VersionRange {
    VersionRange {
        from: query.from,
        limit: Some(query.limit.unwrap_or(page_limit).clamp(1, page_limit.max(1))),
    }
}

fn parse_collaborators(list: &[crate::models::CollaboratorDto]) -> Result<Vec<Collaborator>, ApiError> {
    list.iter()
        .map(|c| c.to_collaborator())
        .collect::<Result<Vec<_>, _>>()
        .map_err(|e| ErrorResponse::reply(StatusCode::BAD_REQUEST, e))
}

fn document_response(loaded: LoadedDocument) -> DocumentResponse {
    let doc = loaded.document;
    DocumentResponse {
        id: doc.id.to_string(),
        owner: doc.owner.to_string(),
        collaborators: doc.collaborators.iter().map(Into::into).collect(),
        scene: doc.scene.into_json(),
        head_seq: doc.head_seq,
        versions: loaded.versions.into_iter().map(VersionDto::from).collect(),
        created_at: doc.created_at,
        updated_at: doc.updated_at,
    }
}

/// Documents the caller owns or collaborates on
pub async fn list_documents(
    State(app_state): State<Arc<AppState>>,
    Extension(user): Extension<UserId>,
) -> Result<Json<DocumentListResponse>, ApiError> {
    let docs = app_state.versions.list_documents_for(&user).await.map_err(SyncError::into_reply)?;
    let documents = docs
        .iter()
        .filter_map(|doc| doc.role_of(&user).map(|role| DocumentSummary::new(doc, role)))
        .collect();
    Ok(Json(DocumentListResponse { documents }))
}

/// Create a document owned by the caller. No version is recorded until the
/// first scene is saved.
pub async fn create_document(
    State(app_state): State<Arc<AppState>>,
    Extension(user): Extension<UserId>,
    Json(req): Json<CreateDocumentRequest>,
) -> Result<(StatusCode, Json<DocumentResponse>), ApiError> {
    let collaborators = parse_collaborators(&req.collaborators)?;
    let doc = app_state
        .versions
        .create_document(NewDocument {
            id: req.id.map(DocumentId::from),
            owner: user,
            scene: req.scene.map(ScenePayload::new).unwrap_or_else(ScenePayload::empty),
            collaborators,
        })
        .await
        .map_err(SyncError::into_reply)?;

    Ok((
        StatusCode::CREATED,
        Json(document_response(LoadedDocument { document: doc, versions: Vec::new() })),
    ))
}

/// Latest scene with a window of history
pub async fn load_document(
    State(app_state): State<Arc<AppState>>,
    Extension(user): Extension<UserId>,
    Path(doc_id): Path<String>,
    Query(query): Query<HistoryQuery>,
) -> Result<Json<DocumentResponse>, ApiError> {
    let range = history_range(&query, app_state.config.history_page_limit);
    let loaded = app_state
        .versions
        .load_document(&DocumentId::from(doc_id), range)
        .await
        .map_err(SyncError::into_reply)?;
    auth::ensure_visible(&loaded.document, &user)?;
    Ok(Json(document_response(loaded)))
}

pub async fn list_versions(
    State(app_state): State<Arc<AppState>>,
    Extension(user): Extension<UserId>,
    Path(doc_id): Path<String>,
    Query(query): Query<HistoryQuery>,
) -> Result<Json<VersionListResponse>, ApiError> {
    let doc_id = DocumentId::from(doc_id);
    let doc = app_state.versions.get_document(&doc_id).await.map_err(SyncError::into_reply)?;
    auth::ensure_visible(&doc, &user)?;

    let range = history_range(&query, app_state.config.history_page_limit);
    let versions = app_state.versions.list_versions(&doc_id, range).await.map_err(SyncError::into_reply)?;
    Ok(Json(VersionListResponse { versions: versions.into_iter().map(VersionDto::from).collect() }))
}

/// Save a scene over HTTP; live members of the room receive it as well
pub async fn save_scene(
    State(app_state): State<Arc<AppState>>,
    Extension(user): Extension<UserId>,
    Path(doc_id): Path<String>,
    Json(req): Json<SaveSceneRequest>,
) -> Result<(StatusCode, Json<SceneSavedResponse>), ApiError> {
    let doc_id = DocumentId::from(doc_id);
    let doc = app_state.versions.get_document(&doc_id).await.map_err(SyncError::into_reply)?;
    auth::ensure_editor(&doc, &user)?;

    let version = app_state
        .relay
        .apply_scene_from_user(&doc_id, &user, ScenePayload::new(req.scene))
        .await
        .map_err(SyncError::into_reply)?;
    Ok((
        StatusCode::CREATED,
        Json(SceneSavedResponse { seq: version.seq, created_at: version.created_at }),
    ))
}

/// Replace the collaborator list (owner only)
pub async fn set_collaborators(
    State(app_state): State<Arc<AppState>>,
    Extension(user): Extension<UserId>,
    Path(doc_id): Path<String>,
    Json(req): Json<SetCollaboratorsRequest>,
) -> Result<Json<DocumentResponse>, ApiError> {
    let doc_id = DocumentId::from(doc_id);
    let doc = app_state.versions.get_document(&doc_id).await.map_err(SyncError::into_reply)?;
    auth::ensure_owner(&doc, &user)?;

    let collaborators = parse_collaborators(&req.collaborators)?;
    let doc = app_state
        .versions
        .set_collaborators(&doc_id, collaborators)
        .await
        .map_err(SyncError::into_reply)?;
    info!("Collaborators of {} updated by {}", doc.id, user);
    Ok(Json(document_response(LoadedDocument { document: doc, versions: Vec::new() })))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn history_range_defaults_and_caps_the_limit() {
        let range = history_range(&HistoryQuery::default(), 100);
        assert_eq!(range, VersionRange { from: None, limit: Some(100) });

        let range = history_range(&HistoryQuery { from: Some(3), limit: Some(5000) }, 100);
        assert_eq!(range, VersionRange { from: Some(3), limit: Some(100) });

        let range = history_range(&HistoryQuery { from: None, limit: Some(0) }, 100);
        assert_eq!(range.limit, Some(1));
    }
}
