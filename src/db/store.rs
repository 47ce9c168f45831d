use std::fmt;

use chrono::{DateTime, Utc};
use futures_util::future::BoxFuture;

use crate::models::{
    Collaborator, Comment, Document, DocumentId, NewComment, NewDocument, ScenePayload, UserId,
    Version, VersionRange,
};

pub type StoreResult<T> = Result<T, StoreError>;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StoreError {
    NotFound,
    Conflict(String),
    Backend(String),
}

impl fmt::Display for StoreError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            StoreError::NotFound => write!(f, "Record not found"),
            StoreError::Conflict(reason) => write!(f, "Conflict: {}", reason),
            StoreError::Backend(reason) => write!(f, "Storage backend error: {}", reason),
        }
    }
}

impl std::error::Error for StoreError {}

impl From<sqlx::Error> for StoreError {
    fn from(e: sqlx::Error) -> Self {
        match e {
            sqlx::Error::RowNotFound => StoreError::NotFound,
            other => StoreError::Backend(other.to_string()),
        }
    }
}

/// Durable storage for documents, their history and their comments.
///
/// `append_version` and `append_comment` must be atomic per document: the
/// backend reads the current counter, writes `counter + 1` and the new row
/// in one step, so concurrent callers never see duplicate or skipped
/// sequence numbers. Different documents must not serialize on each other.
pub trait DocStore: Send + Sync {
    /// Short backend name for diagnostics
    fn backend(&self) -> &'static str;

    fn get_document<'a>(&'a self, id: &'a DocumentId) -> BoxFuture<'a, StoreResult<Option<Document>>>;

    /// Create a document. No version is written; `head_seq` starts at 0.
    fn create_document(&self, doc: NewDocument, at: DateTime<Utc>) -> BoxFuture<'_, StoreResult<Document>>;

    /// Replace the collaborator list
    fn set_collaborators<'a>(
        &'a self,
        id: &'a DocumentId,
        collaborators: Vec<Collaborator>,
        at: DateTime<Utc>,
    ) -> BoxFuture<'a, StoreResult<Document>>;

    /// Append `scene` as version `head_seq + 1` and make it current
    fn append_version<'a>(
        &'a self,
        id: &'a DocumentId,
        scene: ScenePayload,
        at: DateTime<Utc>,
    ) -> BoxFuture<'a, StoreResult<Version>>;

    fn list_versions<'a>(&'a self, id: &'a DocumentId, range: VersionRange) -> BoxFuture<'a, StoreResult<Vec<Version>>>;

    /// Documents owned by `user` or listing `user` as collaborator
    fn list_documents_for<'a>(&'a self, user: &'a UserId) -> BoxFuture<'a, StoreResult<Vec<Document>>>;

    /// Append a comment with the next per-document comment sequence number
    fn append_comment(&self, comment: NewComment) -> BoxFuture<'_, StoreResult<Comment>>;

    /// Comments ordered by ascending sequence number
    fn list_comments<'a>(&'a self, id: &'a DocumentId) -> BoxFuture<'a, StoreResult<Vec<Comment>>>;
}
