use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use tracing::{debug, info};

use super::deadline::with_deadline;
use crate::db::DocStore;
use crate::models::{
    Collaborator, Document, DocumentId, LoadedDocument, NewDocument, ScenePayload, SyncError,
    UserId, Version, VersionRange,
};

/// Append-only scene history on top of a [`DocStore`].
///
/// Sequence numbers are assigned by the store's atomic append; this layer
/// bounds payload size and puts a deadline on every storage call.
pub struct VersionStore {
    store: Arc<dyn DocStore>,
    timeout: Duration,
    max_scene_bytes: usize,
}

impl VersionStore {
    pub fn new(store: Arc<dyn DocStore>, timeout: Duration, max_scene_bytes: usize) -> Self {
        Self { store, timeout, max_scene_bytes }
    }

    pub fn backend(&self) -> &'static str {
        self.store.backend()
    }

    fn check_scene(&self, scene: &ScenePayload) -> Result<(), SyncError> {
        let size = scene.encoded_len();
        if size > self.max_scene_bytes {
            return Err(SyncError::InvalidPayload(format!(
                "Scene is {} bytes, limit is {}",
                size, self.max_scene_bytes
            )));
        }
        Ok(())
    }

    pub async fn get_document(&self, id: &DocumentId) -> Result<Document, SyncError> {
        with_deadline(self.timeout, "Loading document", self.store.get_document(id))
            .await?
            .ok_or(SyncError::NotFound)
    }

    pub async fn create_document(&self, new_doc: NewDocument) -> Result<Document, SyncError> {
        if new_doc.id.as_ref().is_some_and(|id| id.is_empty()) {
            return Err(SyncError::InvalidPayload("Document id cannot be empty".to_string()));
        }
        self.check_scene(&new_doc.scene)?;
        let doc = with_deadline(self.timeout, "Creating document", self.store.create_document(new_doc, Utc::now())).await?;
        info!("Document {} created by {}", doc.id, doc.owner);
        Ok(doc)
    }

    pub async fn set_collaborators(&self, id: &DocumentId, collaborators: Vec<Collaborator>) -> Result<Document, SyncError> {
        with_deadline(self.timeout, "Updating collaborators", self.store.set_collaborators(id, collaborators, Utc::now())).await
    }

    /// Replace the current scene and record it as the next version
    pub async fn append_version(&self, id: &DocumentId, scene: ScenePayload) -> Result<Version, SyncError> {
        self.check_scene(&scene)?;
        let version = with_deadline(self.timeout, "Appending version", self.store.append_version(id, scene, Utc::now())).await?;
        debug!("Document {} now at version {}", id, version.seq);
        Ok(version)
    }

    pub async fn list_versions(&self, id: &DocumentId, range: VersionRange) -> Result<Vec<Version>, SyncError> {
        with_deadline(self.timeout, "Listing versions", self.store.list_versions(id, range)).await
    }

    /// Current state, collaborators and a window of history
    pub async fn load_document(&self, id: &DocumentId, range: VersionRange) -> Result<LoadedDocument, SyncError> {
        let document = self.get_document(id).await?;
        let versions = self.list_versions(id, range).await?;
        Ok(LoadedDocument { document, versions })
    }

    pub async fn list_documents_for(&self, user: &UserId) -> Result<Vec<Document>, SyncError> {
        with_deadline(self.timeout, "Listing documents", self.store.list_documents_for(user)).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::{MemStore, StoreResult};
    use crate::models::{Comment, NewComment};
    use chrono::{DateTime, Utc};
    use futures_util::future::{BoxFuture, FutureExt};
    use serde_json::json;

    /// Store whose appends never complete
    struct StalledStore(MemStore);

    impl DocStore for StalledStore {
        fn backend(&self) -> &'static str {
            "stalled"
        }
        fn get_document<'a>(&'a self, id: &'a DocumentId) -> BoxFuture<'a, StoreResult<Option<Document>>> {
            self.0.get_document(id)
        }
        fn create_document(&self, doc: NewDocument, at: DateTime<Utc>) -> BoxFuture<'_, StoreResult<Document>> {
            self.0.create_document(doc, at)
        }
        fn set_collaborators<'a>(&'a self, id: &'a DocumentId, c: Vec<Collaborator>, at: DateTime<Utc>) -> BoxFuture<'a, StoreResult<Document>> {
            self.0.set_collaborators(id, c, at)
        }
        fn append_version<'a>(&'a self, _id: &'a DocumentId, _scene: ScenePayload, _at: DateTime<Utc>) -> BoxFuture<'a, StoreResult<Version>> {
            futures_util::future::pending().boxed()
        }
        fn list_versions<'a>(&'a self, id: &'a DocumentId, range: VersionRange) -> BoxFuture<'a, StoreResult<Vec<Version>>> {
            self.0.list_versions(id, range)
        }
        fn list_documents_for<'a>(&'a self, user: &'a UserId) -> BoxFuture<'a, StoreResult<Vec<Document>>> {
            self.0.list_documents_for(user)
        }
        fn append_comment(&self, comment: NewComment) -> BoxFuture<'_, StoreResult<Comment>> {
            self.0.append_comment(comment)
        }
        fn list_comments<'a>(&'a self, id: &'a DocumentId) -> BoxFuture<'a, StoreResult<Vec<Comment>>> {
            self.0.list_comments(id)
        }
    }

    fn new_doc(id: &str) -> NewDocument {
        NewDocument {
            id: Some(DocumentId::from(id)),
            owner: UserId::from("alice"),
            scene: ScenePayload::empty(),
            collaborators: vec![],
        }
    }

    #[tokio::test]
    async fn stalled_append_times_out() {
        let versions = VersionStore::new(Arc::new(StalledStore(MemStore::new())), Duration::from_millis(200), 1024);
        versions.create_document(new_doc("d1")).await.unwrap();

        let err = versions
            .append_version(&DocumentId::from("d1"), ScenePayload::new(json!({"a": 1})))
            .await
            .unwrap_err();
        assert_eq!(err, SyncError::PersistenceUnavailable);

        let doc = versions.get_document(&DocumentId::from("d1")).await.unwrap();
        assert_eq!(doc.head_seq, 0);
    }

    #[tokio::test]
    async fn oversized_scene_is_rejected_before_storage() {
        let versions = VersionStore::new(Arc::new(MemStore::new()), Duration::from_secs(1), 16);
        versions.create_document(new_doc("d1")).await.unwrap();

        let big = ScenePayload::new(json!({"shapes": ["a long enough string to pass the limit"]}));
        let err = versions.append_version(&DocumentId::from("d1"), big).await.unwrap_err();
        assert!(matches!(err, SyncError::InvalidPayload(_)));
        assert!(versions.list_versions(&DocumentId::from("d1"), VersionRange::all()).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn load_document_truncates_history() {
        let versions = VersionStore::new(Arc::new(MemStore::new()), Duration::from_secs(1), 1024);
        let id = DocumentId::from("d1");
        versions.create_document(new_doc("d1")).await.unwrap();
        for n in 1..=5 {
            versions.append_version(&id, ScenePayload::new(json!({ "n": n }))).await.unwrap();
        }

        let loaded = versions.load_document(&id, VersionRange::latest(2)).await.unwrap();
        assert_eq!(loaded.document.head_seq, 5);
        assert_eq!(loaded.document.scene, ScenePayload::new(json!({"n": 5})));
        assert_eq!(loaded.versions.iter().map(|v| v.seq).collect::<Vec<_>>(), vec![4, 5]);
    }

    #[tokio::test]
    async fn missing_document_is_not_found() {
        let versions = VersionStore::new(Arc::new(MemStore::new()), Duration::from_secs(1), 1024);
        let err = versions.load_document(&DocumentId::from("nope"), VersionRange::all()).await.unwrap_err();
        assert_eq!(err, SyncError::NotFound);
    }
}
