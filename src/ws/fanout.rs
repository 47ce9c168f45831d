use std::sync::Arc;

use futures_util::future::{BoxFuture, FutureExt};
use tracing::debug;

use super::registry::RoomRegistry;
use super::session::{Delivery, SessionId};
use crate::models::{DocumentId, ServerEvent};

/// One event addressed to a room
#[derive(Debug, Clone)]
pub struct Envelope {
    pub document_id: DocumentId,
    /// Member that should not receive the event (the sender of a scene)
    pub exclude: Option<SessionId>,
    /// Version number when the event carries a scene
    pub scene_seq: Option<u64>,
    pub event: ServerEvent,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct FanOutReport {
    pub delivered: usize,
    pub lagging: usize,
    pub closed: usize,
    /// A newer scene had already been relayed; nothing was sent
    pub stale: bool,
}

/// Delivers room events to members.
///
/// The in-process implementation talks to the local [`RoomRegistry`]. A
/// deployment with several instances would publish envelopes on a shared
/// bus and have every instance deliver to its own members.
pub trait FanOut: Send + Sync {
    fn publish(&self, envelope: Envelope) -> BoxFuture<'_, FanOutReport>;
}

pub struct LocalFanOut {
    registry: Arc<RoomRegistry>,
}

impl LocalFanOut {
    pub fn new(registry: Arc<RoomRegistry>) -> Self {
        Self { registry }
    }
}

impl FanOut for LocalFanOut {
    fn publish(&self, envelope: Envelope) -> BoxFuture<'_, FanOutReport> {
        async move {
            let Envelope { document_id, exclude, scene_seq, event } = envelope;
            let event = Arc::new(event);

            // Delivery only enqueues, so it is done under the room lock; that
            // keeps per-room order identical for every member.
            let (report, lagging) = self
                .registry
                .with_room(&document_id, |room| {
                    let mut report = FanOutReport::default();
                    let mut lagging = Vec::new();
                    if let Some(seq) = scene_seq {
                        if seq <= room.last_scene_seq {
                            report.stale = true;
                            return (report, lagging);
                        }
                        room.last_scene_seq = seq;
                    }
                    for session in room.recipients(exclude) {
                        match session.deliver(event.clone()) {
                            Delivery::Queued => report.delivered += 1,
                            Delivery::Lagging => {
                                report.lagging += 1;
                                lagging.push(session.clone());
                            }
                            Delivery::Closed => report.closed += 1,
                        }
                    }
                    (report, lagging)
                })
                .unwrap_or_default();

            // A member that missed an event cannot stay in the room
            for session in &lagging {
                self.registry.evict(session);
            }

            debug!(
                "Fan-out on {}: {} delivered, {} lagging, {} closed{}",
                document_id,
                report.delivered,
                report.lagging,
                report.closed,
                if report.stale { " (stale scene skipped)" } else { "" }
            );
            report
        }
        .boxed()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{RelayedSceneMessage, ScenePayload, UserId};
    use crate::ws::session::SessionHandle;

    fn scene_envelope(doc: &DocumentId, seq: u64, exclude: Option<SessionId>) -> Envelope {
        Envelope {
            document_id: doc.clone(),
            exclude,
            scene_seq: Some(seq),
            event: ServerEvent::SceneUpdate(RelayedSceneMessage {
                document_id: doc.clone(),
                scene: ScenePayload::empty(),
                seq,
                author_user_id: UserId::from("alice"),
            }),
        }
    }

    #[tokio::test]
    async fn older_scene_is_not_relayed_after_newer_one() {
        let registry = Arc::new(RoomRegistry::new());
        let fanout = LocalFanOut::new(registry.clone());
        let doc = DocumentId::from("d1");
        let (b, mut rx) = SessionHandle::new(UserId::from("bob"), 8);
        registry.join(&doc, &b).unwrap();

        assert_eq!(fanout.publish(scene_envelope(&doc, 2, None)).await.delivered, 1);
        let report = fanout.publish(scene_envelope(&doc, 1, None)).await;
        assert!(report.stale);
        assert_eq!(report.delivered, 0);

        let first = rx.recv().await.unwrap();
        assert!(matches!(&*first, ServerEvent::SceneUpdate(m) if m.seq == 2));
        assert!(rx.try_recv().is_err());
    }

    #[tokio::test]
    async fn publish_to_unknown_room_delivers_nothing() {
        let fanout = LocalFanOut::new(Arc::new(RoomRegistry::new()));
        let report = fanout.publish(scene_envelope(&DocumentId::from("nobody"), 1, None)).await;
        assert_eq!(report, FanOutReport::default());
    }

    #[tokio::test]
    async fn excluded_member_is_skipped() {
        let registry = Arc::new(RoomRegistry::new());
        let fanout = LocalFanOut::new(registry.clone());
        let doc = DocumentId::from("d1");
        let (a, mut rx_a) = SessionHandle::new(UserId::from("alice"), 8);
        let (b, mut rx_b) = SessionHandle::new(UserId::from("bob"), 8);
        registry.join(&doc, &a).unwrap();
        registry.join(&doc, &b).unwrap();

        let report = fanout.publish(scene_envelope(&doc, 1, Some(a.id))).await;
        assert_eq!(report.delivered, 1);
        assert!(rx_a.try_recv().is_err());
        assert!(rx_b.try_recv().is_ok());
    }

    #[tokio::test]
    async fn lagging_member_is_evicted_instead_of_skipped() {
        let registry = Arc::new(RoomRegistry::new());
        let fanout = LocalFanOut::new(registry.clone());
        let doc = DocumentId::from("d1");
        let (a, mut rx_a) = SessionHandle::new(UserId::from("alice"), 8);
        let (b, _rx_b) = SessionHandle::new(UserId::from("bob"), 1);
        registry.join(&doc, &a).unwrap();
        registry.join(&doc, &b).unwrap();

        assert_eq!(fanout.publish(scene_envelope(&doc, 1, None)).await.delivered, 2);
        let report = fanout.publish(scene_envelope(&doc, 2, None)).await;
        assert_eq!((report.delivered, report.lagging), (1, 1));

        assert!(b.is_evicted());
        assert!(b.is_closed());
        assert!(!registry.is_member(&doc, b.id));
        assert!(registry.is_member(&doc, a.id));

        // Later events only go to members that kept up
        let report = fanout.publish(scene_envelope(&doc, 3, None)).await;
        assert_eq!((report.delivered, report.lagging), (1, 0));
        assert_eq!(std::iter::from_fn(|| rx_a.try_recv().ok()).count(), 3);
    }
}
