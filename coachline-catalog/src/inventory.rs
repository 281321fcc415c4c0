use chrono::{DateTime, Duration, Utc};
use coachline_core::seat_code::normalize_seat_code;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::sync::Mutex;
use tracing::debug;
use uuid::Uuid;

/// A live viewer's short hold on a seat while they fill in the checkout form.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct SeatHold {
    pub trip_id: Uuid,
    pub seat_code: String,
    pub session_id: String,
    pub expires_at: DateTime<Utc>,
}

/// Per-process seat-hold map for realtime seat-map UX.
///
/// This is not the seat ledger. It cannot be correct across server
/// instances, so nothing on the booking path reads it; a successful claim
/// only clears the entries for the seats it took. Lapsed holds stay in the
/// map until `purge_expired` runs; the expiration sweeper calls it on every
/// tick for the cache its manager was built with.
#[derive(Default)]
pub struct SeatHoldCache {
    holds: Mutex<HashMap<(Uuid, String), SeatHold>>,
}

impl SeatHoldCache {
    pub fn new() -> Self {
        Self::default()
    }

    /// Hold a seat for a session. Re-holding by the same session extends it.
    pub fn hold(
        &self,
        trip_id: Uuid,
        seat_code: &str,
        session_id: &str,
        ttl: Duration,
        now: DateTime<Utc>,
    ) -> Result<SeatHold, HoldError> {
        let code = normalize_seat_code(seat_code).ok_or_else(|| HoldError::InvalidSeat(seat_code.to_string()))?;
        let mut holds = self.lock();
        let key = (trip_id, code.clone());

        if let Some(existing) = holds.get(&key) {
            if existing.expires_at > now && existing.session_id != session_id {
                return Err(HoldError::HeldByOther {
                    seat_code: code,
                    until: existing.expires_at,
                });
            }
        }

        let hold = SeatHold {
            trip_id,
            seat_code: code,
            session_id: session_id.to_string(),
            expires_at: now + ttl,
        };
        holds.insert(key, hold.clone());
        Ok(hold)
    }

    /// Release a hold if this session owns it.
    pub fn release(&self, trip_id: Uuid, seat_code: &str, session_id: &str) -> bool {
        let Some(code) = normalize_seat_code(seat_code) else {
            return false;
        };
        let mut holds = self.lock();
        let key = (trip_id, code);
        match holds.get(&key) {
            Some(hold) if hold.session_id == session_id => {
                holds.remove(&key);
                true
            }
            _ => false,
        }
    }

    /// Drop holds on seats that a booking has just claimed in the ledger.
    pub fn clear_seats(&self, trip_id: Uuid, seat_codes: &[String]) -> usize {
        let mut holds = self.lock();
        seat_codes
            .iter()
            .filter_map(|c| normalize_seat_code(c))
            .filter(|code| holds.remove(&(trip_id, code.clone())).is_some())
            .count()
    }

    /// Seat codes currently held on a trip, sorted.
    pub fn held_seats(&self, trip_id: Uuid, now: DateTime<Utc>) -> Vec<String> {
        let holds = self.lock();
        let mut codes: Vec<String> = holds
            .values()
            .filter(|h| h.trip_id == trip_id && h.expires_at > now)
            .map(|h| h.seat_code.clone())
            .collect();
        codes.sort();
        codes
    }

    /// Entries in the map, lapsed or not.
    pub fn len(&self) -> usize {
        self.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn purge_expired(&self, now: DateTime<Utc>) -> usize {
        let mut holds = self.lock();
        let before = holds.len();
        holds.retain(|_, h| h.expires_at > now);
        let purged = before - holds.len();
        if purged > 0 {
            debug!(purged, "Dropped expired seat holds");
        }
        purged
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, HashMap<(Uuid, String), SeatHold>> {
        self.holds.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}

#[derive(Debug, thiserror::Error)]
pub enum HoldError {
    #[error("Invalid seat code: {0}")]
    InvalidSeat(String),

    #[error("Seat {seat_code} is held until {until}")]
    HeldByOther {
        seat_code: String,
        until: DateTime<Utc>,
    },
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_hold_lifecycle() {
        let cache = SeatHoldCache::new();
        let trip_id = Uuid::new_v4();
        let now = Utc::now();

        cache.hold(trip_id, "A1", "session-1", Duration::minutes(2), now).unwrap();
        assert_eq!(cache.held_seats(trip_id, now), vec!["1A".to_string()]);

        // Same seat in the other notation, other session
        let err = cache.hold(trip_id, "1a", "session-2", Duration::minutes(2), now).unwrap_err();
        assert!(matches!(err, HoldError::HeldByOther { .. }));

        // Owner may extend
        cache.hold(trip_id, "1A", "session-1", Duration::minutes(5), now).unwrap();

        assert!(!cache.release(trip_id, "1A", "session-2"));
        assert!(cache.release(trip_id, "1A", "session-1"));
        assert!(cache.held_seats(trip_id, now).is_empty());
    }

    #[test]
    fn test_expired_holds_can_be_taken_and_purged() {
        let cache = SeatHoldCache::new();
        let trip_id = Uuid::new_v4();
        let now = Utc::now();

        cache.hold(trip_id, "2B", "session-1", Duration::minutes(1), now).unwrap();
        let later = now + Duration::minutes(2);
        assert!(cache.held_seats(trip_id, later).is_empty());

        cache.hold(trip_id, "2B", "session-2", Duration::minutes(1), later).unwrap();
        assert_eq!(cache.purge_expired(later + Duration::minutes(5)), 1);
    }

    #[test]
    fn test_clear_seats_after_claim() {
        let cache = SeatHoldCache::new();
        let trip_id = Uuid::new_v4();
        let now = Utc::now();

        cache.hold(trip_id, "1A", "s", Duration::minutes(2), now).unwrap();
        cache.hold(trip_id, "1B", "s", Duration::minutes(2), now).unwrap();

        let cleared = cache.clear_seats(trip_id, &["A1".to_string(), "3C".to_string()]);
        assert_eq!(cleared, 1);
        assert_eq!(cache.held_seats(trip_id, now), vec!["1B".to_string()]);
    }
}
