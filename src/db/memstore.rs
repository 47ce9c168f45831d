use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard, RwLock};

use chrono::{DateTime, Utc};
use futures_util::future::{BoxFuture, FutureExt};
use tracing::debug;

use super::store::{DocStore, StoreError, StoreResult};
use crate::models::{
    normalize_collaborators, Collaborator, Comment, Document, DocumentId, NewComment, NewDocument,
    ScenePayload, UserId, Version, VersionRange,
};

struct DocRecord {
    doc: Document,
    versions: Vec<Version>,
    comments: Vec<Comment>,
}

/// Process-local store. Each document has its own mutex, so appends on one
/// document serialize without touching the others. No lock is held across
/// an `.await`.
#[derive(Default)]
pub struct MemStore {
    docs: RwLock<HashMap<DocumentId, Arc<Mutex<DocRecord>>>>,
}

fn lock(record: &Mutex<DocRecord>) -> MutexGuard<'_, DocRecord> {
    record.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
}

impl MemStore {
    pub fn new() -> Self {
        Self::default()
    }

    fn record(&self, id: &DocumentId) -> StoreResult<Arc<Mutex<DocRecord>>> {
        let docs = self.docs.read().unwrap_or_else(|poisoned| poisoned.into_inner());
        docs.get(id).cloned().ok_or(StoreError::NotFound)
    }

    fn all_records(&self) -> Vec<Arc<Mutex<DocRecord>>> {
        let docs = self.docs.read().unwrap_or_else(|poisoned| poisoned.into_inner());
        docs.values().cloned().collect()
    }
}

impl DocStore for MemStore {
    fn backend(&self) -> &'static str {
        "memory"
    }

    fn get_document<'a>(&'a self, id: &'a DocumentId) -> BoxFuture<'a, StoreResult<Option<Document>>> {
        async move {
            match self.record(id) {
                Ok(record) => Ok(Some(lock(&record).doc.clone())),
                Err(StoreError::NotFound) => Ok(None),
                Err(e) => Err(e),
            }
        }
        .boxed()
    }

    fn create_document(&self, new_doc: NewDocument, at: DateTime<Utc>) -> BoxFuture<'_, StoreResult<Document>> {
        async move {
            let id = new_doc.id.unwrap_or_else(DocumentId::generate);
            let doc = Document {
                collaborators: normalize_collaborators(&new_doc.owner, new_doc.collaborators),
                id: id.clone(),
                owner: new_doc.owner,
                scene: new_doc.scene,
                head_seq: 0,
                created_at: at,
                updated_at: at,
            };

            let mut docs = self.docs.write().unwrap_or_else(|poisoned| poisoned.into_inner());
            if docs.contains_key(&id) {
                return Err(StoreError::Conflict(format!("Document '{}' already exists", id)));
            }
            docs.insert(
                id.clone(),
                Arc::new(Mutex::new(DocRecord { doc: doc.clone(), versions: Vec::new(), comments: Vec::new() })),
            );
            debug!("Created in-memory document {}", id);
            Ok(doc)
        }
        .boxed()
    }

    fn set_collaborators<'a>(
        &'a self,
        id: &'a DocumentId,
        collaborators: Vec<Collaborator>,
        at: DateTime<Utc>,
    ) -> BoxFuture<'a, StoreResult<Document>> {
        async move {
            let record = self.record(id)?;
            let mut rec = lock(&record);
            rec.doc.collaborators = normalize_collaborators(&rec.doc.owner, collaborators);
            rec.doc.updated_at = at;
            Ok(rec.doc.clone())
        }
        .boxed()
    }

    fn append_version<'a>(
        &'a self,
        id: &'a DocumentId,
        scene: ScenePayload,
        at: DateTime<Utc>,
    ) -> BoxFuture<'a, StoreResult<Version>> {
        async move {
            let record = self.record(id)?;
            let mut rec = lock(&record);
            let version = Version { seq: rec.doc.head_seq + 1, scene: scene.clone(), created_at: at };
            rec.versions.push(version.clone());
            rec.doc.head_seq = version.seq;
            rec.doc.scene = scene;
            rec.doc.updated_at = at;
            Ok(version)
        }
        .boxed()
    }

    fn list_versions<'a>(&'a self, id: &'a DocumentId, range: VersionRange) -> BoxFuture<'a, StoreResult<Vec<Version>>> {
        async move {
            let record = self.record(id)?;
            let rec = lock(&record);
            Ok(range.select(&rec.versions).to_vec())
        }
        .boxed()
    }

    fn list_documents_for<'a>(&'a self, user: &'a UserId) -> BoxFuture<'a, StoreResult<Vec<Document>>> {
        async move {
            let mut docs: Vec<Document> = self
                .all_records()
                .iter()
                .filter_map(|record| {
                    let rec = lock(record);
                    rec.doc.is_visible_to(user).then(|| rec.doc.clone())
                })
                .collect();
            docs.sort_by(|a, b| b.updated_at.cmp(&a.updated_at).then_with(|| a.id.cmp(&b.id)));
            Ok(docs)
        }
        .boxed()
    }

    fn append_comment(&self, new_comment: NewComment) -> BoxFuture<'_, StoreResult<Comment>> {
        async move {
            let record = self.record(&new_comment.document_id)?;
            let mut rec = lock(&record);
            let seq = rec.comments.last().map_or(0, |c| c.seq) + 1;
            let comment = Comment {
                document_id: new_comment.document_id,
                seq,
                author: new_comment.author,
                text: new_comment.text,
                created_at: new_comment.created_at,
            };
            rec.comments.push(comment.clone());
            Ok(comment)
        }
        .boxed()
    }

    fn list_comments<'a>(&'a self, id: &'a DocumentId) -> BoxFuture<'a, StoreResult<Vec<Comment>>> {
        async move {
            let record = self.record(id)?;
            let rec = lock(&record);
            Ok(rec.comments.clone())
        }
        .boxed()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::Role;
    use serde_json::json;

    fn new_doc(id: &str, owner: &str) -> NewDocument {
        NewDocument {
            id: Some(DocumentId::from(id)),
            owner: UserId::from(owner),
            scene: ScenePayload::empty(),
            collaborators: vec![Collaborator { user_id: UserId::from("bob"), role: Role::Viewer }],
        }
    }

    #[tokio::test]
    async fn create_rejects_duplicate_ids() {
        let store = MemStore::new();
        store.create_document(new_doc("d1", "alice"), Utc::now()).await.unwrap();
        let err = store.create_document(new_doc("d1", "carol"), Utc::now()).await.unwrap_err();
        assert!(matches!(err, StoreError::Conflict(_)));
    }

    #[tokio::test]
    async fn created_document_has_no_history() {
        let store = MemStore::new();
        let doc = store.create_document(new_doc("d1", "alice"), Utc::now()).await.unwrap();
        assert_eq!(doc.head_seq, 0);
        let versions = store.list_versions(&doc.id, VersionRange::all()).await.unwrap();
        assert!(versions.is_empty());
    }

    #[tokio::test]
    async fn append_version_moves_current_scene() {
        let store = MemStore::new();
        let id = DocumentId::from("d1");
        store.create_document(new_doc("d1", "alice"), Utc::now()).await.unwrap();

        let v1 = store.append_version(&id, ScenePayload::new(json!({"n": 1})), Utc::now()).await.unwrap();
        let v2 = store.append_version(&id, ScenePayload::new(json!({"n": 2})), Utc::now()).await.unwrap();
        assert_eq!((v1.seq, v2.seq), (1, 2));

        let doc = store.get_document(&id).await.unwrap().unwrap();
        assert_eq!(doc.head_seq, 2);
        assert_eq!(doc.scene, ScenePayload::new(json!({"n": 2})));

        let history = store.list_versions(&id, VersionRange::all()).await.unwrap();
        assert_eq!(history[0].scene, ScenePayload::new(json!({"n": 1})));
    }

    #[tokio::test]
    async fn append_to_missing_document_is_not_found() {
        let store = MemStore::new();
        let err = store
            .append_version(&DocumentId::from("ghost"), ScenePayload::empty(), Utc::now())
            .await
            .unwrap_err();
        assert_eq!(err, StoreError::NotFound);
        assert!(store.get_document(&DocumentId::from("ghost")).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn comments_and_versions_use_separate_sequences() {
        let store = MemStore::new();
        let id = DocumentId::from("d1");
        store.create_document(new_doc("d1", "alice"), Utc::now()).await.unwrap();
        store.append_version(&id, ScenePayload::empty(), Utc::now()).await.unwrap();
        store.append_version(&id, ScenePayload::empty(), Utc::now()).await.unwrap();

        let comment = store
            .append_comment(NewComment {
                document_id: id.clone(),
                author: UserId::from("bob"),
                text: "hi".to_string(),
                created_at: Utc::now(),
            })
            .await
            .unwrap();
        assert_eq!(comment.seq, 1);
    }

    #[tokio::test]
    async fn documents_listed_for_owner_and_collaborators_only() {
        let store = MemStore::new();
        store.create_document(new_doc("d1", "alice"), Utc::now()).await.unwrap();
        store
            .create_document(
                NewDocument { collaborators: vec![], ..new_doc("d2", "carol") },
                Utc::now(),
            )
            .await
            .unwrap();

        let ids = |docs: Vec<Document>| docs.into_iter().map(|d| d.id.to_string()).collect::<Vec<_>>();
        assert_eq!(ids(store.list_documents_for(&UserId::from("alice")).await.unwrap()), vec!["d1"]);
        assert_eq!(ids(store.list_documents_for(&UserId::from("bob")).await.unwrap()), vec!["d1"]);
        assert_eq!(ids(store.list_documents_for(&UserId::from("carol")).await.unwrap()), vec!["d2"]);
        assert!(store.list_documents_for(&UserId::from("dave")).await.unwrap().is_empty());
    }
}
