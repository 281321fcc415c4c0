//! Outbound collaborators. All of them are best-effort: the lifecycle
//! manager logs their failures and never propagates them.

use async_trait::async_trait;
use coachline_shared::models::events::{AuditMirrorEvent, SeatStateChangedEvent};
use tokio::sync::broadcast;
use uuid::Uuid;

use crate::models::{AuditEntry, SeatState};

pub type CollaboratorError = Box<dyn std::error::Error + Send + Sync>;

#[async_trait]
pub trait Notifier: Send + Sync {
    async fn notify(
        &self,
        user_id: Uuid,
        title: &str,
        body: &str,
        context: serde_json::Value,
    ) -> Result<(), CollaboratorError>;
}

/// Informed after seat-state changes so live seat maps can refresh.
#[async_trait]
pub trait SeatBroadcaster: Send + Sync {
    async fn broadcast(
        &self,
        trip_id: Uuid,
        seat_ids: &[Uuid],
        new_state: SeatState,
        booking_id: Option<Uuid>,
    ) -> Result<(), CollaboratorError>;
}

/// External observability mirror for committed audit entries.
#[async_trait]
pub trait AuditSink: Send + Sync {
    async fn mirror(&self, entry: &AuditEntry) -> Result<(), CollaboratorError>;
}

pub struct NoopNotifier;

#[async_trait]
impl Notifier for NoopNotifier {
    async fn notify(
        &self,
        user_id: Uuid,
        title: &str,
        _body: &str,
        _context: serde_json::Value,
    ) -> Result<(), CollaboratorError> {
        tracing::debug!(%user_id, title, "Notification dropped (no notifier configured)");
        Ok(())
    }
}

pub struct NoopBroadcaster;

#[async_trait]
impl SeatBroadcaster for NoopBroadcaster {
    async fn broadcast(
        &self,
        _trip_id: Uuid,
        _seat_ids: &[Uuid],
        _new_state: SeatState,
        _booking_id: Option<Uuid>,
    ) -> Result<(), CollaboratorError> {
        Ok(())
    }
}

/// In-process fan-out to subscribers of a `tokio::sync::broadcast` channel.
#[derive(Clone)]
pub struct ChannelBroadcaster {
    tx: broadcast::Sender<SeatStateChangedEvent>,
}

impl ChannelBroadcaster {
    pub fn new(capacity: usize) -> Self {
        let (tx, _) = broadcast::channel(capacity);
        Self { tx }
    }

    pub fn subscribe(&self) -> broadcast::Receiver<SeatStateChangedEvent> {
        self.tx.subscribe()
    }
}

#[async_trait]
impl SeatBroadcaster for ChannelBroadcaster {
    async fn broadcast(
        &self,
        trip_id: Uuid,
        seat_ids: &[Uuid],
        new_state: SeatState,
        booking_id: Option<Uuid>,
    ) -> Result<(), CollaboratorError> {
        let event = SeatStateChangedEvent {
            trip_id,
            seat_ids: seat_ids.to_vec(),
            new_state: new_state.to_string(),
            booking_id,
            timestamp: chrono::Utc::now().timestamp(),
        };
        // No subscribers is not a failure.
        let _ = self.tx.send(event);
        Ok(())
    }
}

pub fn mirror_event(entry: &AuditEntry) -> AuditMirrorEvent {
    AuditMirrorEvent {
        entry_id: entry.id,
        action: entry.action.clone(),
        detail: entry.detail.clone(),
        actor_id: entry.actor_id,
        affected_user_id: entry.affected_user_id,
        entity_id: entry.entity_id,
        metadata: entry.metadata.clone(),
        timestamp: entry.created_at.timestamp(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_channel_broadcaster_delivers_to_subscribers() {
        let broadcaster = ChannelBroadcaster::new(16);
        let mut rx = broadcaster.subscribe();
        let trip_id = Uuid::new_v4();
        let seat_id = Uuid::new_v4();

        broadcaster
            .broadcast(trip_id, &[seat_id], SeatState::Booked, None)
            .await
            .unwrap();

        let event = rx.recv().await.unwrap();
        assert_eq!(event.trip_id, trip_id);
        assert_eq!(event.seat_ids, vec![seat_id]);
        assert_eq!(event.new_state, "BOOKED");
    }

    #[tokio::test]
    async fn test_channel_broadcaster_without_subscribers_is_ok() {
        let broadcaster = ChannelBroadcaster::new(4);
        let result = broadcaster
            .broadcast(Uuid::new_v4(), &[], SeatState::Available, None)
            .await;
        assert!(result.is_ok());
    }
}
