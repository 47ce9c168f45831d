use std::sync::Arc;

use tracing::{info, warn};

use super::fanout::{Envelope, FanOut};
use super::registry::RoomRegistry;
use super::session::{SessionHandle, SessionId};
use crate::models::{
    Comment, CommentReceivedMessage, DocumentId, RelayedSceneMessage, Role, ScenePayload,
    ServerEvent, SyncError, UserId, Version,
};
use crate::services::{CommentLog, VersionStore};

/// Turns accepted events into a durable record first, then a fan-out.
///
/// Nothing is relayed unless the write succeeded. Failed writes are handed
/// back to the caller untouched; there is no retry here because resending a
/// stale scene could overwrite a newer one.
pub struct BroadcastRelay {
    registry: Arc<RoomRegistry>,
    versions: Arc<VersionStore>,
    comments: Arc<CommentLog>,
    fanout: Arc<dyn FanOut>,
}

impl BroadcastRelay {
    pub fn new(
        registry: Arc<RoomRegistry>,
        versions: Arc<VersionStore>,
        comments: Arc<CommentLog>,
        fanout: Arc<dyn FanOut>,
    ) -> Self {
        Self { registry, versions, comments, fanout }
    }

    fn ensure_joined(&self, document_id: &DocumentId, session: &SessionHandle) -> Result<(), SyncError> {
        if self.registry.is_member(document_id, session.id) {
            Ok(())
        } else {
            warn!("Session {} sent an event for {} without joining it", session.id, document_id);
            Err(SyncError::NotJoined)
        }
    }

    /// Role looked up from the stored collaborator list on every call,
    /// so a role change takes effect on the very next event.
    async fn current_role(&self, document_id: &DocumentId, user: &UserId) -> Result<Role, SyncError> {
        let document = self.versions.get_document(document_id).await?;
        document.role_of(user).ok_or(SyncError::Forbidden)
    }

    /// Scene from a joined session; relayed to every member but the sender
    pub async fn apply_scene_update(
        &self,
        document_id: &DocumentId,
        session: &SessionHandle,
        scene: ScenePayload,
    ) -> Result<Version, SyncError> {
        self.ensure_joined(document_id, session)?;
        self.publish_scene(document_id, &session.user_id, Some(session.id), scene).await
    }

    /// Scene saved outside a live session (REST); relayed to every member
    pub async fn apply_scene_from_user(
        &self,
        document_id: &DocumentId,
        user: &UserId,
        scene: ScenePayload,
    ) -> Result<Version, SyncError> {
        self.publish_scene(document_id, user, None, scene).await
    }

    async fn publish_scene(
        &self,
        document_id: &DocumentId,
        author: &UserId,
        exclude: Option<SessionId>,
        scene: ScenePayload,
    ) -> Result<Version, SyncError> {
        let role = self.current_role(document_id, author).await?;
        if !role.can_edit() {
            warn!("User {} with role {} tried to edit {}", author, role, document_id);
            return Err(SyncError::Forbidden);
        }

        let version = self.versions.append_version(document_id, scene).await?;

        let report = self
            .fanout
            .publish(Envelope {
                document_id: document_id.clone(),
                exclude,
                scene_seq: Some(version.seq),
                event: ServerEvent::SceneUpdate(RelayedSceneMessage {
                    document_id: document_id.clone(),
                    scene: version.scene.clone(),
                    seq: version.seq,
                    author_user_id: author.clone(),
                }),
            })
            .await;
        info!(
            "Document {} version {} by {} relayed to {} member(s)",
            document_id, version.seq, author, report.delivered
        );
        Ok(version)
    }

    /// Comment from a joined session; relayed to every member, sender included
    pub async fn apply_comment(&self, document_id: &DocumentId, session: &SessionHandle, text: &str) -> Result<Comment, SyncError> {
        self.ensure_joined(document_id, session)?;
        self.publish_comment(document_id, &session.user_id, text).await
    }

    /// Comment posted outside a live session (REST)
    pub async fn apply_comment_from_user(&self, document_id: &DocumentId, user: &UserId, text: &str) -> Result<Comment, SyncError> {
        self.publish_comment(document_id, user, text).await
    }

    async fn publish_comment(&self, document_id: &DocumentId, author: &UserId, text: &str) -> Result<Comment, SyncError> {
        // Any role may comment, viewers included
        self.current_role(document_id, author).await?;

        let comment = self.comments.append_comment(document_id, author, text).await?;

        let report = self
            .fanout
            .publish(Envelope {
                document_id: document_id.clone(),
                exclude: None,
                scene_seq: None,
                event: ServerEvent::CommentReceived(CommentReceivedMessage {
                    document_id: document_id.clone(),
                    author_user_id: comment.author.clone(),
                    text: comment.text.clone(),
                    timestamp: comment.created_at,
                    seq: comment.seq,
                }),
            })
            .await;
        info!(
            "Comment {} on {} by {} relayed to {} member(s)",
            comment.seq, document_id, author, report.delivered
        );
        Ok(comment)
    }
}
