//! Shared fixtures for the integration tests: an in-memory application
//! state, token minting and outbox helpers.

#![allow(dead_code)]

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use canvas_sync::db::{DocStore, MemStore, StoreResult};
use canvas_sync::models::{
    Collaborator, Comment, Document, DocumentId, NewComment, NewDocument, Role, ScenePayload, ServerEvent, UserId,
    Version, VersionRange,
};
use canvas_sync::services::{JwtAuthenticator, StaticDirectory};
use canvas_sync::{AppState, Config};
use chrono::{DateTime, Utc};
use futures_util::future::{BoxFuture, FutureExt};
use jsonwebtoken::{encode, EncodingKey, Header};
use serde_json::json;
use tokio::sync::mpsc;

pub const SECRET: &str = "integration-test-secret";

pub fn test_config() -> Config {
    Config {
        auth_jwt_secret: Some(SECRET.to_string()),
        persistence_timeout_ms: 2_000,
        session_idle_timeout_secs: 30,
        ..Config::default()
    }
}

pub fn build_state() -> Arc<AppState> {
    build_state_with(test_config())
}

pub fn build_state_with(config: Config) -> Arc<AppState> {
    let directory = StaticDirectory::new([
        (UserId::from("alice"), "Alice".to_string()),
        (UserId::from("bob"), "Bob".to_string()),
    ]);
    Arc::new(AppState::new(
        config,
        Arc::new(MemStore::new()),
        Arc::new(JwtAuthenticator::new(Some(SECRET.to_string()))),
        Arc::new(directory),
    ))
}

/// HS256 user token for `sub`
pub fn token_for(sub: &str) -> String {
    let claims = json!({
        "sub": sub,
        "type": "user",
        "exp": chrono::Utc::now().timestamp() + 3600,
    });
    encode(&Header::default(), &claims, &EncodingKey::from_secret(SECRET.as_bytes())).unwrap()
}

/// Creates "doc1" owned by alice, bob editor, carol viewer
pub async fn seed_doc1(state: &AppState) -> DocumentId {
    let doc = state
        .versions
        .create_document(NewDocument {
            id: Some(DocumentId::from("doc1")),
            owner: UserId::from("alice"),
            scene: ScenePayload::new(json!({"elements": []})),
            collaborators: vec![
                Collaborator { user_id: UserId::from("bob"), role: Role::Editor },
                Collaborator { user_id: UserId::from("carol"), role: Role::Viewer },
            ],
        })
        .await
        .unwrap();
    doc.id
}

pub fn scene(n: u64) -> ScenePayload {
    ScenePayload::new(json!({"elements": [{"id": format!("shape-{}", n), "x": n}]}))
}

/// Next event from an outbox, failing the test after a second
pub async fn next_event(rx: &mut mpsc::Receiver<Arc<ServerEvent>>) -> ServerEvent {
    match tokio::time::timeout(Duration::from_secs(1), rx.recv()).await {
        Ok(Some(event)) => event.as_ref().clone(),
        Ok(None) => panic!("outbox closed"),
        Err(_) => panic!("no event within a second"),
    }
}

/// Everything queued right now
pub fn drain(rx: &mut mpsc::Receiver<Arc<ServerEvent>>) -> Vec<ServerEvent> {
    let mut events = Vec::new();
    while let Ok(event) = rx.try_recv() {
        events.push(event.as_ref().clone());
    }
    events
}

/// In-memory store whose appends hang forever once `stall` is set, the way a
/// wedged database connection behaves. Reads keep working.
#[derive(Default)]
pub struct StallingStore {
    inner: MemStore,
    stall: AtomicBool,
}

impl StallingStore {
    pub fn stall(&self) {
        self.stall.store(true, Ordering::SeqCst);
    }

    fn stalled(&self) -> bool {
        self.stall.load(Ordering::SeqCst)
    }
}

impl DocStore for StallingStore {
    fn backend(&self) -> &'static str {
        "stalling"
    }

    fn get_document<'a>(&'a self, id: &'a DocumentId) -> BoxFuture<'a, StoreResult<Option<Document>>> {
        self.inner.get_document(id)
    }

    fn create_document(&self, new_doc: NewDocument, at: DateTime<Utc>) -> BoxFuture<'_, StoreResult<Document>> {
        self.inner.create_document(new_doc, at)
    }

    fn set_collaborators<'a>(
        &'a self,
        id: &'a DocumentId,
        collaborators: Vec<Collaborator>,
        at: DateTime<Utc>,
    ) -> BoxFuture<'a, StoreResult<Document>> {
        self.inner.set_collaborators(id, collaborators, at)
    }

    fn append_version<'a>(
        &'a self,
        id: &'a DocumentId,
        scene: ScenePayload,
        at: DateTime<Utc>,
    ) -> BoxFuture<'a, StoreResult<Version>> {
        if self.stalled() {
            return std::future::pending().boxed();
        }
        self.inner.append_version(id, scene, at)
    }

    fn list_versions<'a>(&'a self, id: &'a DocumentId, range: VersionRange) -> BoxFuture<'a, StoreResult<Vec<Version>>> {
        self.inner.list_versions(id, range)
    }

    fn list_documents_for<'a>(&'a self, user: &'a UserId) -> BoxFuture<'a, StoreResult<Vec<Document>>> {
        self.inner.list_documents_for(user)
    }

    fn append_comment(&self, new_comment: NewComment) -> BoxFuture<'_, StoreResult<Comment>> {
        if self.stalled() {
            return std::future::pending().boxed();
        }
        self.inner.append_comment(new_comment)
    }

    fn list_comments<'a>(&'a self, id: &'a DocumentId) -> BoxFuture<'a, StoreResult<Vec<Comment>>> {
        self.inner.list_comments(id)
    }
}

/// State over a [`StallingStore`] with a short persistence timeout
pub fn build_stalling_state() -> (Arc<AppState>, Arc<StallingStore>) {
    let store = Arc::new(StallingStore::default());
    let config = Config { persistence_timeout_ms: 200, ..test_config() };
    let state = Arc::new(AppState::new(
        config,
        store.clone(),
        Arc::new(JwtAuthenticator::new(Some(SECRET.to_string()))),
        Arc::new(StaticDirectory::new(Vec::new())),
    ));
    (state, store)
}
