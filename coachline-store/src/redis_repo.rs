use async_trait::async_trait;
use chrono::Utc;
use coachline_core::models::SeatState;
use coachline_core::notify::{CollaboratorError, SeatBroadcaster};
use coachline_shared::models::events::SeatStateChangedEvent;
use redis::{AsyncCommands, RedisResult};
use tracing::debug;
use uuid::Uuid;

#[derive(Clone)]
pub struct RedisClient {
    client: redis::Client,
}

impl RedisClient {
    pub async fn new(connection_string: &str) -> Result<Self, redis::RedisError> {
        let client = redis::Client::open(connection_string)?;
        Ok(Self { client })
    }

    /// Returns the number of subscribers that received the message.
    pub async fn publish(&self, channel: &str, payload: &str) -> RedisResult<i64> {
        let mut conn = self.client.get_multiplexed_async_connection().await?;
        conn.publish(channel, payload).await
    }
}

/// Pushes seat-state changes to `trip:{id}:seats` for live seat maps.
#[derive(Clone)]
pub struct RedisSeatBroadcaster {
    client: RedisClient,
}

impl RedisSeatBroadcaster {
    pub fn new(client: RedisClient) -> Self {
        Self { client }
    }
}

#[async_trait]
impl SeatBroadcaster for RedisSeatBroadcaster {
    async fn broadcast(
        &self,
        trip_id: Uuid,
        seat_ids: &[Uuid],
        state: SeatState,
        booking_id: Option<Uuid>,
    ) -> Result<(), CollaboratorError> {
        let event = SeatStateChangedEvent {
            trip_id,
            seat_ids: seat_ids.to_vec(),
            new_state: state.as_str().to_string(),
            booking_id,
            timestamp: Utc::now().timestamp(),
        };
        let payload = serde_json::to_string(&event)?;
        let receivers = self.client.publish(&event.channel(), &payload).await?;
        debug!("Seat update for trip {} reached {} subscribers", trip_id, receivers);
        Ok(())
    }
}
