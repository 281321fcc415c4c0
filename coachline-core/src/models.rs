use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use uuid::Uuid;

#[derive(Debug, thiserror::Error)]
#[error("Unknown {kind} value: {value}")]
pub struct ParseEnumError {
    pub kind: &'static str,
    pub value: String,
}

/// Booking status in the lifecycle
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum BookingStatus {
    Pending,
    Paid,
    Completed,
    Cancelled,
    Expired,
}

impl BookingStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Pending => "PENDING",
            Self::Paid => "PAID",
            Self::Completed => "COMPLETED",
            Self::Cancelled => "CANCELLED",
            Self::Expired => "EXPIRED",
        }
    }

    /// No transition leaves a terminal status.
    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Completed | Self::Cancelled | Self::Expired)
    }

    pub fn can_transition_to(&self, next: BookingStatus) -> bool {
        use BookingStatus::*;
        matches!(
            (self, next),
            (Pending, Paid) | (Pending, Cancelled) | (Pending, Expired) | (Paid, Completed) | (Paid, Cancelled)
        )
    }
}

impl fmt::Display for BookingStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for BookingStatus {
    type Err = ParseEnumError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "PENDING" => Ok(Self::Pending),
            "PAID" => Ok(Self::Paid),
            "COMPLETED" => Ok(Self::Completed),
            "CANCELLED" => Ok(Self::Cancelled),
            "EXPIRED" => Ok(Self::Expired),
            other => Err(ParseEnumError {
                kind: "booking status",
                value: other.to_string(),
            }),
        }
    }
}

/// Occupancy state of one seat on one trip
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum SeatState {
    Available,
    Locked,
    Booked,
}

impl SeatState {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Available => "AVAILABLE",
            Self::Locked => "LOCKED",
            Self::Booked => "BOOKED",
        }
    }
}

impl fmt::Display for SeatState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for SeatState {
    type Err = ParseEnumError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "AVAILABLE" => Ok(Self::Available),
            "LOCKED" => Ok(Self::Locked),
            "BOOKED" => Ok(Self::Booked),
            other => Err(ParseEnumError {
                kind: "seat state",
                value: other.to_string(),
            }),
        }
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum SeatClass {
    Standard,
    Premium,
    Sleeper,
}

impl SeatClass {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Standard => "STANDARD",
            Self::Premium => "PREMIUM",
            Self::Sleeper => "SLEEPER",
        }
    }
}

impl fmt::Display for SeatClass {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for SeatClass {
    type Err = ParseEnumError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "STANDARD" => Ok(Self::Standard),
            "PREMIUM" => Ok(Self::Premium),
            "SLEEPER" => Ok(Self::Sleeper),
            other => Err(ParseEnumError {
                kind: "seat class",
                value: other.to_string(),
            }),
        }
    }
}

/// A scheduled departure. Owned by the scheduling side; read-only here.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Trip {
    pub id: Uuid,
    pub bus_id: Uuid,
    pub departure_at: DateTime<Utc>,
    pub arrival_at: DateTime<Utc>,
    pub base_fare: i64,
}

/// A physical seat slot on a bus
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Seat {
    pub id: Uuid,
    pub bus_id: Uuid,
    pub code: String,
    pub seat_class: SeatClass,
    pub is_active: bool,
}

/// Ledger row keyed by (trip_id, seat_id). Never deleted, only reset.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct SeatOccupancy {
    pub trip_id: Uuid,
    pub seat_id: Uuid,
    pub state: SeatState,
    pub booking_id: Option<Uuid>,
    pub lock_expires_at: Option<DateTime<Utc>>,
    pub updated_at: DateTime<Utc>,
}

impl SeatOccupancy {
    pub fn available(trip_id: Uuid, seat_id: Uuid, now: DateTime<Utc>) -> Self {
        Self {
            trip_id,
            seat_id,
            state: SeatState::Available,
            booking_id: None,
            lock_expires_at: None,
            updated_at: now,
        }
    }

    pub fn is_free(&self) -> bool {
        self.state == SeatState::Available
    }

    pub fn is_owned_by(&self, booking_id: Uuid) -> bool {
        self.state != SeatState::Available && self.booking_id == Some(booking_id)
    }

    pub fn claim(&mut self, booking_id: Uuid, hold_until: Option<DateTime<Utc>>, now: DateTime<Utc>) {
        self.state = SeatState::Booked;
        self.booking_id = Some(booking_id);
        self.lock_expires_at = hold_until;
        self.updated_at = now;
    }

    pub fn release(&mut self, now: DateTime<Utc>) {
        self.state = SeatState::Available;
        self.booking_id = None;
        self.lock_expires_at = None;
        self.updated_at = now;
    }
}

/// The central aggregate
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Booking {
    pub id: Uuid,
    pub reference: String,
    pub trip_id: Uuid,
    pub owner_id: Option<Uuid>,
    pub contact_email: Option<String>,
    pub contact_phone: Option<String>,
    pub total_amount: i64,
    pub currency: String,
    pub status: BookingStatus,
    pub created_at: DateTime<Utc>,
    pub last_modified_at: DateTime<Utc>,
    pub cancelled_at: Option<DateTime<Utc>>,
    pub cancel_reason: Option<String>,
    /// Set only while PENDING.
    pub expires_at: Option<DateTime<Utc>>,
    pub payment_url: Option<String>,
}

impl Booking {
    pub fn new_pending(
        trip_id: Uuid,
        owner_id: Option<Uuid>,
        total_amount: i64,
        currency: &str,
        now: DateTime<Utc>,
        expires_at: DateTime<Utc>,
    ) -> Self {
        let id = Uuid::new_v4();
        Self {
            id,
            reference: Self::generate_reference(id, now),
            trip_id,
            owner_id,
            contact_email: None,
            contact_phone: None,
            total_amount,
            currency: currency.to_string(),
            status: BookingStatus::Pending,
            created_at: now,
            last_modified_at: now,
            cancelled_at: None,
            cancel_reason: None,
            expires_at: Some(expires_at),
            payment_url: None,
        }
    }

    /// Format: CL-{yymmdd}-{first eight hex digits of the id}. Not unique on
    /// its own; the store rejects duplicates and creation retries.
    pub fn generate_reference(id: Uuid, now: DateTime<Utc>) -> String {
        let short = &id.simple().to_string()[..8];
        format!("CL-{}-{}", now.format("%y%m%d"), short.to_uppercase())
    }

    /// True when the booking is PENDING and its hold deadline has passed.
    pub fn is_overdue(&self, now: DateTime<Utc>) -> bool {
        self.status == BookingStatus::Pending && self.expires_at.is_some_and(|at| at <= now)
    }

    pub fn is_guest(&self) -> bool {
        self.owner_id.is_none()
    }
}

/// One traveller, one seat
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct PassengerDetail {
    pub id: Uuid,
    pub booking_id: Uuid,
    pub full_name: String,
    pub document_id: Option<String>,
    pub seat_id: Uuid,
    pub seat_code: String,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "kebab-case")]
pub enum ModificationType {
    PassengerInfo,
    SeatChange,
    ContactInfo,
}

impl ModificationType {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::PassengerInfo => "passenger-info",
            Self::SeatChange => "seat-change",
            Self::ContactInfo => "contact-info",
        }
    }
}

impl FromStr for ModificationType {
    type Err = ParseEnumError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "passenger-info" => Ok(Self::PassengerInfo),
            "seat-change" => Ok(Self::SeatChange),
            "contact-info" => Ok(Self::ContactInfo),
            other => Err(ParseEnumError {
                kind: "modification type",
                value: other.to_string(),
            }),
        }
    }
}

/// Append-only record of a single applied change
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ModificationRecord {
    pub id: Uuid,
    pub booking_id: Uuid,
    pub modification_type: ModificationType,
    pub description: String,
    pub previous_value: serde_json::Value,
    pub new_value: serde_json::Value,
    pub actor_id: Option<Uuid>,
    pub created_at: DateTime<Utc>,
}

impl ModificationRecord {
    pub fn new(
        booking_id: Uuid,
        modification_type: ModificationType,
        description: String,
        previous_value: serde_json::Value,
        new_value: serde_json::Value,
        actor_id: Option<Uuid>,
        now: DateTime<Utc>,
    ) -> Self {
        Self {
            id: Uuid::new_v4(),
            booking_id,
            modification_type,
            description,
            previous_value,
            new_value,
            actor_id,
            created_at: now,
        }
    }
}

/// System-wide append-only log line
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct AuditEntry {
    pub id: Uuid,
    pub action: String,
    pub detail: String,
    /// None for system actions (sweeper, webhooks).
    pub actor_id: Option<Uuid>,
    pub affected_user_id: Option<Uuid>,
    pub entity_id: Option<Uuid>,
    pub metadata: serde_json::Value,
    pub created_at: DateTime<Utc>,
}

impl AuditEntry {
    pub fn new(action: &str, detail: impl Into<String>, now: DateTime<Utc>) -> Self {
        Self {
            id: Uuid::new_v4(),
            action: action.to_string(),
            detail: detail.into(),
            actor_id: None,
            affected_user_id: None,
            entity_id: None,
            metadata: serde_json::json!({}),
            created_at: now,
        }
    }

    pub fn actor(mut self, actor_id: Option<Uuid>) -> Self {
        self.actor_id = actor_id;
        self
    }

    pub fn affected_user(mut self, user_id: Option<Uuid>) -> Self {
        self.affected_user_id = user_id;
        self
    }

    pub fn entity(mut self, entity_id: Uuid) -> Self {
        self.entity_id = Some(entity_id);
        self
    }

    pub fn metadata(mut self, metadata: serde_json::Value) -> Self {
        self.metadata = metadata;
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;

    #[test]
    fn test_status_transitions() {
        use BookingStatus::*;
        assert!(Pending.can_transition_to(Paid));
        assert!(Pending.can_transition_to(Expired));
        assert!(Paid.can_transition_to(Completed));
        assert!(!Paid.can_transition_to(Expired));
        assert!(!Expired.can_transition_to(Pending));
        assert!(!Cancelled.can_transition_to(Paid));

        assert!(Completed.is_terminal());
        assert!(!Paid.is_terminal());
    }

    #[test]
    fn test_status_round_trips_through_text_column() {
        for status in [
            BookingStatus::Pending,
            BookingStatus::Paid,
            BookingStatus::Completed,
            BookingStatus::Cancelled,
            BookingStatus::Expired,
        ] {
            assert_eq!(status.as_str().parse::<BookingStatus>().unwrap(), status);
        }
        assert!("REFUNDED".parse::<BookingStatus>().is_err());
    }

    #[test]
    fn test_reference_format() {
        let now = Utc::now();
        let booking = Booking::new_pending(Uuid::new_v4(), None, 1000, "VND", now, now + Duration::minutes(15));
        assert!(booking.reference.starts_with("CL-"));
        assert_eq!(booking.reference.len(), "CL-260101-ABCDEF12".len());
        assert_eq!(booking.reference, booking.reference.to_uppercase());
    }

    #[test]
    fn test_overdue_only_while_pending() {
        let now = Utc::now();
        let mut booking = Booking::new_pending(Uuid::new_v4(), None, 0, "VND", now, now + Duration::minutes(15));
        assert!(!booking.is_overdue(now));
        assert!(booking.is_overdue(now + Duration::minutes(15)));

        booking.status = BookingStatus::Paid;
        assert!(!booking.is_overdue(now + Duration::hours(1)));
    }

    #[test]
    fn test_occupancy_claim_and_release() {
        let now = Utc::now();
        let booking_id = Uuid::new_v4();
        let mut row = SeatOccupancy::available(Uuid::new_v4(), Uuid::new_v4(), now);
        assert!(row.is_free());

        row.claim(booking_id, Some(now + Duration::minutes(15)), now);
        assert!(row.is_owned_by(booking_id));
        assert_eq!(row.state, SeatState::Booked);

        row.release(now);
        assert!(row.is_free());
        assert_eq!(row.booking_id, None);
        assert_eq!(row.lock_expires_at, None);
    }
}
