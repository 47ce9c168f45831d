use std::fmt;

use axum::{http::StatusCode, Json};
use serde::{Deserialize, Serialize};
use utoipa::ToSchema;

use crate::db::store::StoreError;

/// Response for an error
#[derive(Debug, Serialize, Deserialize, ToSchema)]
pub struct ErrorResponse {
    pub code: u16,
    pub status: String,
    pub error: String,
}

impl ErrorResponse {
    pub fn reply(status: StatusCode, error: impl Into<String>) -> (StatusCode, Json<ErrorResponse>) {
        (status, Json(ErrorResponse {
            code: status.as_u16(),
            status: status.to_string(),
            error: error.into(),
        }))
    }
}

/// Why an inbound event was rejected
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SyncError {
    /// The session has not joined the document's room
    NotJoined,
    /// The user's role does not allow the action
    Forbidden,
    NotFound,
    InvalidPayload(String),
    /// Storage did not answer in time
    PersistenceUnavailable,
    Storage(String),
    /// The session is already disconnected
    SessionClosed,
}

impl SyncError {
    /// Stable code sent to clients
    pub fn code(&self) -> &'static str {
        match self {
            SyncError::NotJoined => "not-joined",
            SyncError::Forbidden => "forbidden",
            SyncError::NotFound => "not-found",
            SyncError::InvalidPayload(_) => "invalid-payload",
            SyncError::PersistenceUnavailable => "persistence-unavailable",
            SyncError::Storage(_) => "storage-error",
            SyncError::SessionClosed => "session-closed",
        }
    }

    pub fn status_code(&self) -> StatusCode {
        match self {
            SyncError::NotJoined => StatusCode::CONFLICT,
            SyncError::Forbidden => StatusCode::FORBIDDEN,
            SyncError::NotFound => StatusCode::NOT_FOUND,
            SyncError::InvalidPayload(_) => StatusCode::BAD_REQUEST,
            SyncError::PersistenceUnavailable => StatusCode::SERVICE_UNAVAILABLE,
            SyncError::Storage(_) => StatusCode::INTERNAL_SERVER_ERROR,
            SyncError::SessionClosed => StatusCode::GONE,
        }
    }

    /// Convert into the REST error tuple
    pub fn into_reply(self) -> (StatusCode, Json<ErrorResponse>) {
        ErrorResponse::reply(self.status_code(), self.to_string())
    }
}

impl fmt::Display for SyncError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SyncError::NotJoined => write!(f, "Session has not joined this document"),
            SyncError::Forbidden => write!(f, "Not allowed for your role on this document"),
            SyncError::NotFound => write!(f, "Document not found"),
            SyncError::InvalidPayload(reason) => write!(f, "Invalid payload: {}", reason),
            SyncError::PersistenceUnavailable => write!(f, "Persistence unavailable, try again"),
            SyncError::Storage(reason) => write!(f, "Storage error: {}", reason),
            SyncError::SessionClosed => write!(f, "Session is closed"),
        }
    }
}

impl std::error::Error for SyncError {}

impl From<StoreError> for SyncError {
    fn from(e: StoreError) -> Self {
        match e {
            StoreError::NotFound => SyncError::NotFound,
            StoreError::Conflict(reason) => SyncError::InvalidPayload(reason),
            StoreError::Backend(reason) => SyncError::Storage(reason),
        }
    }
}
