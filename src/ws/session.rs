use std::collections::HashSet;
use std::fmt;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, MutexGuard};

use chrono::{DateTime, Utc};
use tokio::sync::mpsc::{self, error::TrySendError};
use tokio::sync::Notify;
use tracing::warn;
use uuid::Uuid;

use crate::models::{DocumentId, ServerEvent, UserId};

#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash)]
pub struct SessionId(Uuid);

impl SessionId {
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }
}

impl Default for SessionId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for SessionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.0.fmt(f)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Delivery {
    Queued,
    /// Outbox full; the event was not queued and the session must be evicted
    Lagging,
    /// The connection's writer is gone
    Closed,
}

#[derive(Default)]
struct Membership {
    rooms: HashSet<DocumentId>,
    closed: bool,
}

/// One live, authenticated connection.
///
/// Outbound events go through a bounded queue drained by the connection's
/// writer task, so delivering never waits on the network. A session that
/// cannot keep up is evicted rather than silently missing events.
pub struct SessionHandle {
    pub id: SessionId,
    pub user_id: UserId,
    pub connected_at: DateTime<Utc>,
    outbox: mpsc::Sender<Arc<ServerEvent>>,
    membership: Mutex<Membership>,
    evicted: AtomicBool,
    evicted_signal: Notify,
    released: AtomicBool,
}

impl SessionHandle {
    pub fn new(user_id: UserId, outbox_capacity: usize) -> (Arc<Self>, mpsc::Receiver<Arc<ServerEvent>>) {
        let (tx, rx) = mpsc::channel(outbox_capacity.max(1));
        let session = Arc::new(Self {
            id: SessionId::new(),
            user_id,
            connected_at: Utc::now(),
            outbox: tx,
            membership: Mutex::new(Membership::default()),
            evicted: AtomicBool::new(false),
            evicted_signal: Notify::new(),
            released: AtomicBool::new(false),
        });
        (session, rx)
    }

    fn membership(&self) -> MutexGuard<'_, Membership> {
        self.membership.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    pub fn deliver(&self, event: Arc<ServerEvent>) -> Delivery {
        match self.outbox.try_send(event) {
            Ok(()) => Delivery::Queued,
            Err(TrySendError::Full(_)) => {
                warn!("Outbox full for session {} (user {})", self.id, self.user_id);
                Delivery::Lagging
            }
            Err(TrySendError::Closed(_)) => Delivery::Closed,
        }
    }

    /// Queue an event addressed to this session only
    pub fn reply(&self, event: ServerEvent) -> Delivery {
        self.deliver(Arc::new(event))
    }

    pub fn joined_rooms(&self) -> Vec<DocumentId> {
        let mut rooms: Vec<DocumentId> = self.membership().rooms.iter().cloned().collect();
        rooms.sort();
        rooms
    }

    pub fn is_closed(&self) -> bool {
        self.membership().closed
    }

    pub fn is_evicted(&self) -> bool {
        self.evicted.load(Ordering::Acquire)
    }

    /// Resolves once the session has been evicted for falling behind
    pub async fn evicted(&self) {
        let notified = self.evicted_signal.notified();
        if self.is_evicted() {
            return;
        }
        notified.await;
    }

    pub(crate) fn mark_evicted(&self) {
        if !self.evicted.swap(true, Ordering::AcqRel) {
            self.evicted_signal.notify_waiters();
        }
    }

    /// True only on the first call; used to count each session out once
    pub(crate) fn release(&self) -> bool {
        !self.released.swap(true, Ordering::AcqRel)
    }

    /// Record a room membership. Fails once the session is closed.
    pub(crate) fn track_room(&self, document_id: &DocumentId) -> bool {
        let mut membership = self.membership();
        if membership.closed {
            return false;
        }
        membership.rooms.insert(document_id.clone());
        true
    }

    pub(crate) fn untrack_room(&self, document_id: &DocumentId) {
        self.membership().rooms.remove(document_id);
    }

    /// Close the session and hand back its rooms.
    ///
    /// Only the first call returns `Some`, which is what makes room cleanup
    /// run exactly once per session.
    pub(crate) fn close(&self) -> Option<HashSet<DocumentId>> {
        let mut membership = self.membership();
        if membership.closed {
            return None;
        }
        membership.closed = true;
        Some(std::mem::take(&mut membership.rooms))
    }
}

impl fmt::Debug for SessionHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SessionHandle")
            .field("id", &self.id)
            .field("user_id", &self.user_id)
            .finish()
    }
}
