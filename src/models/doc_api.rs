use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use utoipa::{IntoParams, ToSchema};

use super::comment::ResolvedComment;
use super::document::{Collaborator, Document, Role, Version};

#[derive(Serialize, Deserialize, ToSchema, Clone, Debug)]
#[serde(rename_all = "camelCase")]
pub struct CollaboratorDto {
    pub user_id: String,
    /// One of "owner", "editor", "viewer"
    pub role: String,
}

impl From<&Collaborator> for CollaboratorDto {
    fn from(c: &Collaborator) -> Self {
        Self { user_id: c.user_id.to_string(), role: c.role.to_string() }
    }
}

impl CollaboratorDto {
    pub fn to_collaborator(&self) -> Result<Collaborator, String> {
        let role: Role = self.role.parse()?;
        if self.user_id.trim().is_empty() {
            return Err("Collaborator userId cannot be empty".to_string());
        }
        Ok(Collaborator { user_id: self.user_id.clone().into(), role })
    }
}

/// Document listing entry, without the scene
#[derive(Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct DocumentSummary {
    pub id: String,
    pub owner: String,
    pub role: String,
    pub head_seq: u64,
    pub updated_at: DateTime<Utc>,
}

impl DocumentSummary {
    pub fn new(doc: &Document, role: Role) -> Self {
        Self {
            id: doc.id.to_string(),
            owner: doc.owner.to_string(),
            role: role.to_string(),
            head_seq: doc.head_seq,
            updated_at: doc.updated_at,
        }
    }
}

#[derive(Serialize, Deserialize, ToSchema)]
pub struct DocumentListResponse {
    pub documents: Vec<DocumentSummary>,
}

#[derive(Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct VersionDto {
    pub seq: u64,
    #[schema(value_type = Object)]
    pub scene: serde_json::Value,
    pub created_at: DateTime<Utc>,
}

impl From<Version> for VersionDto {
    fn from(v: Version) -> Self {
        Self { seq: v.seq, scene: v.scene.into_json(), created_at: v.created_at }
    }
}

#[derive(Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct DocumentResponse {
    pub id: String,
    pub owner: String,
    #[schema(value_type = Object)]
    pub scene: serde_json::Value,
    pub head_seq: u64,
    pub collaborators: Vec<CollaboratorDto>,
    pub versions: Vec<VersionDto>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[derive(Serialize, Deserialize, ToSchema)]
pub struct VersionListResponse {
    pub versions: Vec<VersionDto>,
}

#[derive(Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct CreateDocumentRequest {
    /// Optional caller-chosen id, generated when absent
    pub id: Option<String>,
    #[schema(value_type = Option<Object>)]
    pub scene: Option<serde_json::Value>,
    #[serde(default)]
    pub collaborators: Vec<CollaboratorDto>,
}

#[derive(Serialize, Deserialize, ToSchema)]
pub struct SaveSceneRequest {
    #[schema(value_type = Object)]
    pub scene: serde_json::Value,
}

#[derive(Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct SceneSavedResponse {
    pub seq: u64,
    pub created_at: DateTime<Utc>,
}

#[derive(Serialize, Deserialize, ToSchema)]
pub struct SetCollaboratorsRequest {
    pub collaborators: Vec<CollaboratorDto>,
}

#[derive(Serialize, Deserialize, ToSchema)]
pub struct AddCommentRequest {
    pub text: String,
}

#[derive(Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct CommentDto {
    pub seq: u64,
    pub author_user_id: String,
    pub author_name: Option<String>,
    pub text: String,
    pub created_at: DateTime<Utc>,
}

impl From<ResolvedComment> for CommentDto {
    fn from(r: ResolvedComment) -> Self {
        Self {
            seq: r.comment.seq,
            author_user_id: r.comment.author.to_string(),
            author_name: r.author_name,
            text: r.comment.text,
            created_at: r.comment.created_at,
        }
    }
}

#[derive(Serialize, Deserialize, ToSchema)]
pub struct CommentListResponse {
    pub comments: Vec<CommentDto>,
}

/// History window query (`?from=&limit=`)
#[derive(Deserialize, IntoParams, Debug, Default)]
#[into_params(parameter_in = Query)]
pub struct HistoryQuery {
    /// First sequence number to return (inclusive)
    pub from: Option<u64>,
    /// Maximum number of versions to return
    pub limit: Option<usize>,
}
