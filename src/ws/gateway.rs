use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use chrono::Utc;
use tokio::sync::mpsc;
use tracing::{info, warn};

use super::registry::RoomRegistry;
use super::relay::BroadcastRelay;
use super::session::{Delivery, SessionHandle};
use crate::models::{
    ClientEvent, DocumentId, ErrorMessage, JoinedMessage, LeftMessage, PongMessage, SceneAckMessage,
    ServerEvent, SyncError, UserId,
};
use crate::services::{AuthError, Authenticator, VersionStore};

/// Entry point for live sessions: authenticates, dispatches inbound events
/// and guarantees room cleanup on disconnect.
pub struct SessionGateway {
    registry: Arc<RoomRegistry>,
    relay: Arc<BroadcastRelay>,
    versions: Arc<VersionStore>,
    authenticator: Arc<dyn Authenticator>,
    outbox_capacity: usize,
    active_sessions: AtomicUsize,
}

impl SessionGateway {
    pub fn new(
        registry: Arc<RoomRegistry>,
        relay: Arc<BroadcastRelay>,
        versions: Arc<VersionStore>,
        authenticator: Arc<dyn Authenticator>,
        outbox_capacity: usize,
    ) -> Self {
        Self {
            registry,
            relay,
            versions,
            authenticator,
            outbox_capacity,
            active_sessions: AtomicUsize::new(0),
        }
    }

    pub fn authenticate(&self, token: &str) -> Result<UserId, AuthError> {
        self.authenticator.authenticate(token)
    }

    /// Create the session for an already authenticated user
    pub fn open_session(&self, user_id: UserId) -> (Arc<SessionHandle>, mpsc::Receiver<Arc<ServerEvent>>) {
        let (session, outbox) = SessionHandle::new(user_id, self.outbox_capacity);
        self.active_sessions.fetch_add(1, Ordering::Relaxed);
        info!("Session {} opened for user {}", session.id, session.user_id);
        (session, outbox)
    }

    /// Authenticate and open a session in one step
    pub fn connect(&self, token: &str) -> Result<(Arc<SessionHandle>, mpsc::Receiver<Arc<ServerEvent>>), AuthError> {
        let user_id = self.authenticate(token).map_err(|e| {
            warn!("Connection refused: {}", e);
            e
        })?;
        Ok(self.open_session(user_id))
    }

    /// Remove the session from every room. Safe to call more than once;
    /// only the first call has an effect.
    pub fn disconnect(&self, session: &SessionHandle) {
        // An evicted session already left its rooms but is still counted
        let left = self.registry.leave_all(session);
        if session.release() {
            self.active_sessions.fetch_sub(1, Ordering::Relaxed);
            info!(
                "Session {} (user {}) disconnected, left {} room(s)",
                session.id,
                session.user_id,
                left.map_or(0, |rooms| rooms.len())
            );
        }
    }

    pub fn active_sessions(&self) -> usize {
        self.active_sessions.load(Ordering::Relaxed)
    }

    /// Parse and handle one text frame
    pub async fn handle_text(&self, session: &Arc<SessionHandle>, text: &str) -> Result<(), SyncError> {
        match serde_json::from_str::<ClientEvent>(text) {
            Ok(event) => self.handle_event(session, event).await,
            Err(e) => {
                warn!("Unparseable frame from session {}: {}", session.id, e);
                self.reject_frame(session, SyncError::InvalidPayload(format!("Malformed event: {}", e)))
            }
        }
    }

    /// Report a frame that never became an event (malformed or binary)
    pub fn reject_frame(&self, session: &SessionHandle, error: SyncError) -> Result<(), SyncError> {
        self.reply(
            session,
            ServerEvent::Error(ErrorMessage {
                document_id: None,
                code: error.code().to_string(),
                message: error.to_string(),
            }),
        );
        Err(error)
    }

    /// Queue a reply for this session only. A session whose outbox is full
    /// is evicted, the same as when it falls behind on room events.
    pub fn reply(&self, session: &SessionHandle, event: ServerEvent) {
        if session.reply(event) == Delivery::Lagging {
            self.registry.evict(session);
        }
    }

    /// Handle one event; a rejection is always reported back to the session
    pub async fn handle_event(&self, session: &Arc<SessionHandle>, event: ClientEvent) -> Result<(), SyncError> {
        let document_id = event.document_id().cloned();
        let result = self.dispatch(session, event).await;
        if let Err(e) = &result {
            warn!(
                "Rejected event from session {} on {:?}: {}",
                session.id,
                document_id.as_ref().map(DocumentId::as_str),
                e
            );
            self.reply(
                session,
                ServerEvent::Error(ErrorMessage {
                    document_id,
                    code: e.code().to_string(),
                    message: e.to_string(),
                }),
            );
        }
        result
    }

    async fn dispatch(&self, session: &Arc<SessionHandle>, event: ClientEvent) -> Result<(), SyncError> {
        if session.is_closed() {
            return Err(SyncError::SessionClosed);
        }
        match event {
            ClientEvent::JoinDocument(msg) => self.join(session, msg.document_id).await,
            ClientEvent::LeaveDocument(msg) => {
                self.registry.leave(&msg.document_id, session);
                self.reply(session, ServerEvent::Left(LeftMessage { document_id: msg.document_id }));
                Ok(())
            }
            ClientEvent::SceneUpdate(msg) => {
                let version = self.relay.apply_scene_update(&msg.document_id, session, msg.scene).await?;
                self.reply(session, ServerEvent::SceneAck(SceneAckMessage {
                    document_id: msg.document_id,
                    seq: version.seq,
                }));
                Ok(())
            }
            ClientEvent::NewComment(msg) => {
                // The sender gets its own comment back through the room
                self.relay.apply_comment(&msg.document_id, session, &msg.text).await?;
                Ok(())
            }
            ClientEvent::Ping(_) => {
                self.reply(session, ServerEvent::Pong(PongMessage { date: Utc::now().to_rfc3339() }));
                Ok(())
            }
        }
    }

    async fn join(&self, session: &Arc<SessionHandle>, document_id: DocumentId) -> Result<(), SyncError> {
        if document_id.is_empty() {
            return Err(SyncError::InvalidPayload("documentId cannot be empty".to_string()));
        }

        // Access is checked before entering the room...
        let document = self.versions.get_document(&document_id).await?;
        document.role_of(&session.user_id).ok_or(SyncError::Forbidden)?;
        self.registry.join(&document_id, session)?;

        // ...and the snapshot is read after, so any scene missing from it is
        // still relayed to this session
        let document = match self.versions.get_document(&document_id).await {
            Ok(document) => document,
            Err(e) => {
                self.registry.leave(&document_id, session);
                return Err(e);
            }
        };
        let Some(role) = document.role_of(&session.user_id) else {
            self.registry.leave(&document_id, session);
            return Err(SyncError::Forbidden);
        };

        self.reply(session, ServerEvent::Joined(JoinedMessage {
            document_id,
            scene: document.scene,
            seq: document.head_seq,
            role,
        }));
        Ok(())
    }
}

/// Disconnects the session when dropped, whichever way the connection ends
pub struct SessionGuard {
    gateway: Arc<SessionGateway>,
    session: Arc<SessionHandle>,
}

impl SessionGuard {
    pub fn new(gateway: Arc<SessionGateway>, session: Arc<SessionHandle>) -> Self {
        Self { gateway, session }
    }
}

impl Drop for SessionGuard {
    fn drop(&mut self) {
        self.gateway.disconnect(&self.session);
    }
}
