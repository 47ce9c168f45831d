use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::ids::{DocumentId, UserId};

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Comment {
    pub document_id: DocumentId,
    pub seq: u64,
    pub author: UserId,
    pub text: String,
    pub created_at: DateTime<Utc>,
}

#[derive(Clone, Debug)]
pub struct NewComment {
    pub document_id: DocumentId,
    pub author: UserId,
    pub text: String,
    pub created_at: DateTime<Utc>,
}

/// Comment with the author's display name looked up
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ResolvedComment {
    pub comment: Comment,
    pub author_name: Option<String>,
}
