use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::document::{Role, ScenePayload};
use super::ids::{DocumentId, UserId};

#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct JoinDocumentMessage {
    pub document_id: DocumentId,
}

#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct LeaveDocumentMessage {
    pub document_id: DocumentId,
}

#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct SceneUpdateMessage {
    pub document_id: DocumentId,
    pub scene: ScenePayload,
}

#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct NewCommentMessage {
    pub document_id: DocumentId,
    pub text: String,
}

#[derive(Serialize, Deserialize, Debug, Clone, PartialEq, Default)]
pub struct PingMessage {}

/// Frames a client may send
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
#[serde(tag = "type")]
pub enum ClientEvent {
    #[serde(rename = "join-document")]
    JoinDocument(JoinDocumentMessage),
    #[serde(rename = "leave-document")]
    LeaveDocument(LeaveDocumentMessage),
    #[serde(rename = "scene-update")]
    SceneUpdate(SceneUpdateMessage),
    #[serde(rename = "new-comment")]
    NewComment(NewCommentMessage),
    #[serde(rename = "ping")]
    Ping(PingMessage),
}

impl ClientEvent {
    pub fn document_id(&self) -> Option<&DocumentId> {
        match self {
            ClientEvent::JoinDocument(m) => Some(&m.document_id),
            ClientEvent::LeaveDocument(m) => Some(&m.document_id),
            ClientEvent::SceneUpdate(m) => Some(&m.document_id),
            ClientEvent::NewComment(m) => Some(&m.document_id),
            ClientEvent::Ping(_) => None,
        }
    }
}

#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct JoinedMessage {
    pub document_id: DocumentId,
    pub scene: ScenePayload,
    pub seq: u64,
    pub role: Role,
}

#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct LeftMessage {
    pub document_id: DocumentId,
}

#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct RelayedSceneMessage {
    pub document_id: DocumentId,
    pub scene: ScenePayload,
    pub seq: u64,
    pub author_user_id: UserId,
}

#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct SceneAckMessage {
    pub document_id: DocumentId,
    pub seq: u64,
}

#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct CommentReceivedMessage {
    pub document_id: DocumentId,
    pub author_user_id: UserId,
    pub text: String,
    pub timestamp: DateTime<Utc>,
    pub seq: u64,
}

#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct ErrorMessage {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub document_id: Option<DocumentId>,
    pub code: String,
    pub message: String,
}

#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct PongMessage {
    pub date: String,
}

/// Frames the server sends
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
#[serde(tag = "type")]
pub enum ServerEvent {
    #[serde(rename = "joined")]
    Joined(JoinedMessage),
    #[serde(rename = "left")]
    Left(LeftMessage),
    #[serde(rename = "scene-update")]
    SceneUpdate(RelayedSceneMessage),
    #[serde(rename = "scene-ack")]
    SceneAck(SceneAckMessage),
    #[serde(rename = "comment-received")]
    CommentReceived(CommentReceivedMessage),
    #[serde(rename = "error")]
    Error(ErrorMessage),
    #[serde(rename = "pong")]
    Pong(PongMessage),
}
