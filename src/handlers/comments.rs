use std::sync::Arc;

use axum::{
    extract::{Extension, Path, State},
    http::StatusCode,
    Json,
};

use crate::auth::auth;
use crate::models::{
    AddCommentRequest, CommentDto, CommentListResponse, DocumentId, ErrorResponse, ResolvedComment, SyncError, UserId,
};
use crate::state::AppState;

/// Comments of a document, oldest first, with author names where known
pub async fn list_comments(
    State(app_state): State<Arc<AppState>>,
    Extension(user): Extension<UserId>,
    Path(doc_id): Path<String>,
) -> Result<Json<CommentListResponse>, (StatusCode, Json<ErrorResponse>)> {
    let doc_id = DocumentId::from(doc_id);
    let doc = app_state.versions.get_document(&doc_id).await.map_err(SyncError::into_reply)?;
    auth::ensure_visible(&doc, &user)?;

    let comments = app_state.comments.list_comments(&doc_id).await.map_err(SyncError::into_reply)?;
    Ok(Json(CommentListResponse { comments: comments.into_iter().map(CommentDto::from).collect() }))
}

/// Post a comment; live members of the room receive it as well
pub async fn add_comment(
    State(app_state): State<Arc<AppState>>,
    Extension(user): Extension<UserId>,
    Path(doc_id): Path<String>,
    Json(req): Json<AddCommentRequest>,
) -> Result<(StatusCode, Json<CommentDto>), (StatusCode, Json<ErrorResponse>)> {
    let doc_id = DocumentId::from(doc_id);
    let doc = app_state.versions.get_document(&doc_id).await.map_err(SyncError::into_reply)?;
    auth::ensure_visible(&doc, &user)?;

    let comment = app_state
        .relay
        .apply_comment_from_user(&doc_id, &user, &req.text)
        .await
        .map_err(SyncError::into_reply)?;
    Ok((
        StatusCode::CREATED,
        Json(CommentDto::from(ResolvedComment { comment, author_name: None })),
    ))
}
