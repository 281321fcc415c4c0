use async_trait::async_trait;
use chrono::{DateTime, Utc};
use uuid::Uuid;

use crate::models::{
    AuditEntry, Booking, BookingStatus, ModificationRecord, PassengerDetail, Seat, SeatOccupancy,
    Trip,
};

#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    /// Lock-wait timeout, serialization failure, deadlock, lost connection.
    #[error("Transient store error: {0}")]
    Transient(String),

    #[error("Unique constraint violated: {0}")]
    Conflict(String),

    #[error("Corrupt row: {0}")]
    Corrupt(String),

    #[error("Store backend error: {0}")]
    Backend(String),
}

pub type StoreResult<T> = Result<T, StoreError>;

/// Read-only view of bookings.
///
/// Notification and reporting components depend on this instead of the
/// lifecycle manager.
#[async_trait]
pub trait BookingQuery: Send + Sync {
    async fn find_booking(&self, id: Uuid) -> StoreResult<Option<Booking>>;

    async fn find_booking_by_reference(&self, reference: &str) -> StoreResult<Option<Booking>>;

    async fn list_owner_bookings(&self, owner_id: Uuid) -> StoreResult<Vec<Booking>>;

    async fn list_passengers(&self, booking_id: Uuid) -> StoreResult<Vec<PassengerDetail>>;

    async fn list_modifications(&self, booking_id: Uuid) -> StoreResult<Vec<ModificationRecord>>;
}

/// Transactional store for the booking engine.
#[async_trait]
pub trait BookingStore: BookingQuery {
    /// Open a transaction. Dropping it without `commit` rolls back.
    async fn begin(&self) -> StoreResult<Box<dyn StoreTx>>;

    /// Plain read, no locking: PENDING bookings whose hold ended before `now`.
    async fn find_overdue_pending(&self, now: DateTime<Utc>, limit: i64) -> StoreResult<Vec<Uuid>>;

    /// Best-effort write outside any lifecycle transaction.
    async fn set_payment_url(&self, booking_id: Uuid, url: &str) -> StoreResult<()>;

    async fn list_audit_entries(&self, entity_id: Uuid) -> StoreResult<Vec<AuditEntry>>;
}

/// Operations available inside one store transaction.
///
/// The `lock_*` methods take row locks that are held until commit or rollback.
#[async_trait]
pub trait StoreTx: Send {
    async fn find_trip(&mut self, trip_id: Uuid) -> StoreResult<Option<Trip>>;

    async fn list_bus_seats(&mut self, bus_id: Uuid) -> StoreResult<Vec<Seat>>;

    /// Ledger rows for the given seats, created as AVAILABLE (stamped `now`)
    /// if missing, locked in `seat_id` order.
    async fn lock_seat_rows(
        &mut self,
        trip_id: Uuid,
        seat_ids: &[Uuid],
        now: DateTime<Utc>,
    ) -> StoreResult<Vec<SeatOccupancy>>;

    /// Ledger rows currently owned by a booking, locked.
    async fn lock_booking_seat_rows(&mut self, booking_id: Uuid) -> StoreResult<Vec<SeatOccupancy>>;

    async fn list_trip_seat_rows(&mut self, trip_id: Uuid) -> StoreResult<Vec<SeatOccupancy>>;

    async fn save_seat_row(&mut self, row: &SeatOccupancy) -> StoreResult<()>;

    async fn find_bookings(&mut self, ids: &[Uuid]) -> StoreResult<Vec<Booking>>;

    async fn lock_booking(&mut self, id: Uuid) -> StoreResult<Option<Booking>>;

    /// `WHERE id = $1 AND status = 'PENDING'`, locked.
    async fn lock_pending_booking(&mut self, id: Uuid) -> StoreResult<Option<Booking>>;

    async fn insert_booking(&mut self, booking: &Booking) -> StoreResult<()>;

    async fn update_booking(&mut self, booking: &Booking) -> StoreResult<()>;

    /// Conditional update guarded on the expected prior status.
    ///
    /// Sets `cancelled_at` when moving to CANCELLED or EXPIRED, clears
    /// `expires_at` when leaving PENDING. Returns the number of rows affected.
    async fn transition_booking(
        &mut self,
        id: Uuid,
        from: BookingStatus,
        to: BookingStatus,
        at: DateTime<Utc>,
        reason: Option<&str>,
    ) -> StoreResult<u64>;

    async fn insert_passengers(&mut self, passengers: &[PassengerDetail]) -> StoreResult<()>;

    async fn list_passengers(&mut self, booking_id: Uuid) -> StoreResult<Vec<PassengerDetail>>;

    async fn update_passenger(&mut self, passenger: &PassengerDetail) -> StoreResult<()>;

    async fn insert_modification(&mut self, record: &ModificationRecord) -> StoreResult<()>;

    async fn insert_audit(&mut self, entry: &AuditEntry) -> StoreResult<()>;

    async fn commit(self: Box<Self>) -> StoreResult<()>;

    async fn rollback(self: Box<Self>) -> StoreResult<()>;
}
