use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard, RwLock};

use tracing::{debug, info, warn};

use super::session::{SessionHandle, SessionId};
use crate::models::{DocumentId, SyncError};

/// Live members of one document's room
#[derive(Default)]
pub struct Room {
    members: HashMap<SessionId, Arc<SessionHandle>>,
    /// Highest scene version relayed to this room so far
    pub(crate) last_scene_seq: u64,
    /// Set when the last member left; a retired room is never reused
    retired: bool,
}

impl Room {
    pub(crate) fn recipients(&self, exclude: Option<SessionId>) -> impl Iterator<Item = &Arc<SessionHandle>> {
        self.members
            .iter()
            .filter(move |(id, _)| Some(**id) != exclude)
            .map(|(_, session)| session)
    }
}

fn lock_room(room: &Mutex<Room>) -> MutexGuard<'_, Room> {
    room.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
}

/// Document id → live sessions.
///
/// Each room has its own mutex; the outer map lock is only taken to find,
/// create or drop a room, never while touching members. Lock order is
/// map, then room, then the session's own membership set.
#[derive(Default)]
pub struct RoomRegistry {
    rooms: RwLock<HashMap<DocumentId, Arc<Mutex<Room>>>>,
}

impl RoomRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    fn room(&self, document_id: &DocumentId) -> Option<Arc<Mutex<Room>>> {
        let rooms = self.rooms.read().unwrap_or_else(|poisoned| poisoned.into_inner());
        rooms.get(document_id).cloned()
    }

    fn room_entry(&self, document_id: &DocumentId) -> Arc<Mutex<Room>> {
        if let Some(room) = self.room(document_id) {
            if !lock_room(&room).retired {
                return room;
            }
        }

        let mut rooms = self.rooms.write().unwrap_or_else(|poisoned| poisoned.into_inner());
        let reusable = rooms
            .get(document_id)
            .filter(|room| !lock_room(room).retired)
            .cloned();
        if let Some(room) = reusable {
            return room;
        }

        debug!("Opening room for document {}", document_id);
        let room = Arc::new(Mutex::new(Room::default()));
        rooms.insert(document_id.clone(), room.clone());
        room
    }

    fn drop_retired(&self, document_id: &DocumentId, room: &Arc<Mutex<Room>>) {
        let mut rooms = self.rooms.write().unwrap_or_else(|poisoned| poisoned.into_inner());
        if rooms.get(document_id).is_some_and(|current| Arc::ptr_eq(current, room)) {
            rooms.remove(document_id);
            debug!("Closed room for document {}", document_id);
        }
    }

    /// Add `session` to the room, creating the room if needed.
    ///
    /// Returns `Ok(false)` when the session was already a member.
    pub fn join(&self, document_id: &DocumentId, session: &Arc<SessionHandle>) -> Result<bool, SyncError> {
        loop {
            let room = self.room_entry(document_id);
            let mut guard = lock_room(&room);
            if guard.retired {
                // Emptied and dropped between lookup and lock
                continue;
            }

            if !session.track_room(document_id) {
                let emptied = guard.members.is_empty();
                if emptied {
                    guard.retired = true;
                }
                drop(guard);
                if emptied {
                    self.drop_retired(document_id, &room);
                }
                return Err(SyncError::SessionClosed);
            }

            let added = guard.members.insert(session.id, session.clone()).is_none();
            if added {
                info!("Session {} (user {}) joined document {}", session.id, session.user_id, document_id);
            }
            return Ok(added);
        }
    }

    fn remove_member(&self, document_id: &DocumentId, session_id: SessionId) -> bool {
        let Some(room) = self.room(document_id) else {
            return false;
        };
        let mut guard = lock_room(&room);
        let removed = guard.members.remove(&session_id).is_some();
        let emptied = !guard.retired && guard.members.is_empty();
        if emptied {
            guard.retired = true;
        }
        drop(guard);
        if emptied {
            self.drop_retired(document_id, &room);
        }
        removed
    }

    /// Remove `session` from the room; an emptied room is dropped
    pub fn leave(&self, document_id: &DocumentId, session: &SessionHandle) -> bool {
        let removed = self.remove_member(document_id, session.id);
        session.untrack_room(document_id);
        if removed {
            info!("Session {} left document {}", session.id, document_id);
        }
        removed
    }

    /// Close `session` and remove it from every room it joined.
    ///
    /// Only the first call for a session does anything and returns the rooms
    /// it left; later calls return `None`.
    pub fn leave_all(&self, session: &SessionHandle) -> Option<Vec<DocumentId>> {
        let rooms = session.close()?;
        let mut left: Vec<DocumentId> = rooms
            .into_iter()
            .filter(|document_id| self.remove_member(document_id, session.id))
            .collect();
        left.sort();
        Some(left)
    }

    /// Drop a session that fell behind: it leaves every room and its writer
    /// is told to close the connection. The client resyncs on reconnect.
    pub fn evict(&self, session: &SessionHandle) -> Option<Vec<DocumentId>> {
        let left = self.leave_all(session);
        session.mark_evicted();
        if let Some(rooms) = &left {
            warn!(
                "Evicted lagging session {} (user {}) from {} room(s)",
                session.id,
                session.user_id,
                rooms.len()
            );
        }
        left
    }

    /// Members minus `exclude`; empty for unknown documents
    pub fn members_except(&self, document_id: &DocumentId, exclude: SessionId) -> Vec<Arc<SessionHandle>> {
        self.with_room(document_id, |room| room.recipients(Some(exclude)).cloned().collect())
            .unwrap_or_default()
    }

    pub fn members(&self, document_id: &DocumentId) -> Vec<Arc<SessionHandle>> {
        self.with_room(document_id, |room| room.recipients(None).cloned().collect())
            .unwrap_or_default()
    }

    pub fn is_member(&self, document_id: &DocumentId, session_id: SessionId) -> bool {
        self.with_room(document_id, |room| room.members.contains_key(&session_id))
            .unwrap_or(false)
    }

    /// Run `f` under the room's lock. `f` must not block.
    pub(crate) fn with_room<R>(&self, document_id: &DocumentId, f: impl FnOnce(&mut Room) -> R) -> Option<R> {
        let room = self.room(document_id)?;
        let mut guard = lock_room(&room);
        if guard.retired {
            return None;
        }
        Some(f(&mut guard))
    }

    pub fn room_count(&self) -> usize {
        self.rooms.read().unwrap_or_else(|poisoned| poisoned.into_inner()).len()
    }

    /// Sum of room sizes (a session in two rooms counts twice)
    pub fn membership_count(&self) -> usize {
        let rooms: Vec<Arc<Mutex<Room>>> = {
            let map = self.rooms.read().unwrap_or_else(|poisoned| poisoned.into_inner());
            map.values().cloned().collect()
        };
        rooms.iter().map(|room| lock_room(room).members.len()).sum()
    }
}
