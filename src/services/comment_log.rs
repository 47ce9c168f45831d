use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use futures_util::future::join_all;
use tracing::{debug, warn};

use super::deadline::with_deadline;
use super::user_directory::UserDirectory;
use crate::db::DocStore;
use crate::models::{Comment, DocumentId, NewComment, ResolvedComment, SyncError, UserId};

/// Ordered, append-only comments per document.
///
/// Comment sequence numbers are independent from version sequence numbers.
pub struct CommentLog {
    store: Arc<dyn DocStore>,
    directory: Arc<dyn UserDirectory>,
    timeout: Duration,
    max_chars: usize,
}

impl CommentLog {
    pub fn new(store: Arc<dyn DocStore>, directory: Arc<dyn UserDirectory>, timeout: Duration, max_chars: usize) -> Self {
        Self { store, directory, timeout, max_chars }
    }

    pub async fn append_comment(&self, document_id: &DocumentId, author: &UserId, text: &str) -> Result<Comment, SyncError> {
        let text = text.trim();
        if text.is_empty() {
            return Err(SyncError::InvalidPayload("Comment text cannot be empty".to_string()));
        }
        let n_chars = text.chars().count();
        if n_chars > self.max_chars {
            return Err(SyncError::InvalidPayload(format!(
                "Comment is {} characters, limit is {}",
                n_chars, self.max_chars
            )));
        }

        let new_comment = NewComment {
            document_id: document_id.clone(),
            author: author.clone(),
            text: text.to_string(),
            created_at: Utc::now(),
        };
        let comment = with_deadline(self.timeout, "Appending comment", self.store.append_comment(new_comment)).await?;
        debug!("Comment {} stored on document {}", comment.seq, document_id);
        Ok(comment)
    }

    /// Comments in ascending sequence order with author names resolved
    pub async fn list_comments(&self, document_id: &DocumentId) -> Result<Vec<ResolvedComment>, SyncError> {
        let comments = with_deadline(self.timeout, "Listing comments", self.store.list_comments(document_id)).await?;

        let mut authors: Vec<&UserId> = comments.iter().map(|c| &c.author).collect();
        authors.sort();
        authors.dedup();

        let lookups = authors.iter().map(|author| async move {
            let name = match self.directory.display_name(author).await {
                Ok(name) => name,
                Err(e) => {
                    warn!("Could not resolve user {}: {}", author, e);
                    None
                }
            };
            ((*author).clone(), name)
        });
        let names: HashMap<UserId, Option<String>> = join_all(lookups).await.into_iter().collect();

        Ok(comments
            .into_iter()
            .map(|comment| {
                let author_name = names.get(&comment.author).cloned().flatten();
                ResolvedComment { comment, author_name }
            })
            .collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::MemStore;
    use crate::models::{NewDocument, ScenePayload};
    use crate::services::user_directory::StaticDirectory;

    async fn log_with_doc() -> CommentLog {
        let store = Arc::new(MemStore::new());
        store
            .create_document(
                NewDocument {
                    id: Some(DocumentId::from("d1")),
                    owner: UserId::from("alice"),
                    scene: ScenePayload::empty(),
                    collaborators: vec![],
                },
                Utc::now(),
            )
            .await
            .unwrap();
        let directory = StaticDirectory::new([(UserId::from("alice"), "Alice".to_string())]);
        CommentLog::new(store, Arc::new(directory), Duration::from_secs(1), 10)
    }

    #[tokio::test]
    async fn comments_listed_in_order_with_names() {
        let log = log_with_doc().await;
        let doc = DocumentId::from("d1");
        log.append_comment(&doc, &UserId::from("alice"), "first").await.unwrap();
        log.append_comment(&doc, &UserId::from("bob"), " second ").await.unwrap();

        let listed = log.list_comments(&doc).await.unwrap();
        assert_eq!(listed.len(), 2);
        assert_eq!(listed[0].comment.seq, 1);
        assert_eq!(listed[0].author_name.as_deref(), Some("Alice"));
        assert_eq!(listed[1].comment.text, "second");
        assert_eq!(listed[1].author_name, None);
    }

    #[tokio::test]
    async fn blank_and_oversized_comments_are_rejected() {
        let log = log_with_doc().await;
        let doc = DocumentId::from("d1");
        let author = UserId::from("alice");
        assert!(matches!(log.append_comment(&doc, &author, "   ").await, Err(SyncError::InvalidPayload(_))));
        assert!(matches!(log.append_comment(&doc, &author, "way more than ten").await, Err(SyncError::InvalidPayload(_))));
        assert!(log.list_comments(&doc).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn comment_on_unknown_document_is_not_found() {
        let log = log_with_doc().await;
        let err = log.append_comment(&DocumentId::from("nope"), &UserId::from("alice"), "hi").await.unwrap_err();
        assert_eq!(err, SyncError::NotFound);
    }
}
