use uuid::Uuid;

/// Pushed to live seat-map viewers after a ledger change commits.
#[derive(Debug, serde::Serialize, serde::Deserialize, Clone, PartialEq)]
pub struct SeatStateChangedEvent {
    pub trip_id: Uuid,
    pub seat_ids: Vec<Uuid>,
    pub new_state: String,
    pub booking_id: Option<Uuid>,
    pub timestamp: i64,
}

impl SeatStateChangedEvent {
    /// Channel name used by pub/sub transports, one channel per trip.
    pub fn channel(&self) -> String {
        format!("trip:{}:seats", self.trip_id)
    }
}

/// Copy of a committed audit entry, shipped to an external observability sink.
#[derive(Debug, serde::Serialize, serde::Deserialize, Clone)]
pub struct AuditMirrorEvent {
    pub entry_id: Uuid,
    pub action: String,
    pub detail: String,
    pub actor_id: Option<Uuid>,
    pub affected_user_id: Option<Uuid>,
    pub entity_id: Option<Uuid>,
    pub metadata: serde_json::Value,
    pub timestamp: i64,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_seat_event_channel_is_per_trip() {
        let trip_id = Uuid::new_v4();
        let event = SeatStateChangedEvent {
            trip_id,
            seat_ids: vec![Uuid::new_v4()],
            new_state: "BOOKED".to_string(),
            booking_id: None,
            timestamp: 0,
        };
        assert_eq!(event.channel(), format!("trip:{}:seats", trip_id));

        let json = serde_json::to_value(&event).unwrap();
        assert_eq!(json["new_state"], "BOOKED");
    }
}
