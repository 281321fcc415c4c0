use async_trait::async_trait;
use chrono::{DateTime, Utc};
use coachline_core::models::{
    AuditEntry, Booking, BookingStatus, ModificationRecord, PassengerDetail, Seat, SeatOccupancy,
    Trip,
};
use coachline_core::repository::{BookingQuery, BookingStore, StoreError, StoreResult, StoreTx};
use std::collections::HashMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use tokio::sync::{Mutex, OwnedMutexGuard};
use tracing::debug;
use uuid::Uuid;

#[derive(Debug, Default, Clone)]
struct MemoryState {
    trips: HashMap<Uuid, Trip>,
    seats: HashMap<Uuid, Seat>,
    occupancy: HashMap<(Uuid, Uuid), SeatOccupancy>,
    bookings: HashMap<Uuid, Booking>,
    passengers: Vec<PassengerDetail>,
    modifications: Vec<ModificationRecord>,
    audit: Vec<AuditEntry>,
}

/// In-process store for tests and local runs.
///
/// Transactions are fully serialized: `begin` takes the single state lock
/// and works on a copy that replaces the shared state on commit.
#[derive(Clone, Default)]
pub struct MemoryStore {
    state: Arc<Mutex<MemoryState>>,
    faults: Arc<Faults>,
}

/// Counters of injected failures still to be served.
#[derive(Default)]
struct Faults {
    begins: AtomicUsize,
    reference_clashes: AtomicUsize,
    lost_transitions: AtomicUsize,
}

fn take(counter: &AtomicUsize) -> bool {
    counter
        .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1))
        .is_ok()
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn add_trip(&self, trip: Trip) {
        self.state.lock().await.trips.insert(trip.id, trip);
    }

    pub async fn add_seats(&self, seats: impl IntoIterator<Item = Seat>) {
        let mut state = self.state.lock().await;
        for seat in seats {
            state.seats.insert(seat.id, seat);
        }
    }

    /// Make the next `count` calls to `begin` fail as transient errors.
    pub fn fail_next_begins(&self, count: usize) {
        self.faults.begins.store(count, Ordering::SeqCst);
    }

    /// Make the next `count` booking inserts collide on their reference.
    pub fn clash_next_references(&self, count: usize) {
        self.faults.reference_clashes.store(count, Ordering::SeqCst);
    }

    /// Make the next `count` status transitions match no row, as if another
    /// transaction had moved the booking first.
    pub fn lose_next_transitions(&self, count: usize) {
        self.faults.lost_transitions.store(count, Ordering::SeqCst);
    }

    pub async fn seat_row(&self, trip_id: Uuid, seat_id: Uuid) -> Option<SeatOccupancy> {
        self.state.lock().await.occupancy.get(&(trip_id, seat_id)).cloned()
    }

    pub async fn audit_log(&self) -> Vec<AuditEntry> {
        self.state.lock().await.audit.clone()
    }
}

#[async_trait]
impl BookingQuery for MemoryStore {
    async fn find_booking(&self, id: Uuid) -> StoreResult<Option<Booking>> {
        Ok(self.state.lock().await.bookings.get(&id).cloned())
    }

    async fn find_booking_by_reference(&self, reference: &str) -> StoreResult<Option<Booking>> {
        let state = self.state.lock().await;
        Ok(state.bookings.values().find(|b| b.reference == reference).cloned())
    }

    async fn list_owner_bookings(&self, owner_id: Uuid) -> StoreResult<Vec<Booking>> {
        let state = self.state.lock().await;
        let mut rows: Vec<Booking> = state
            .bookings
            .values()
            .filter(|b| b.owner_id == Some(owner_id))
            .cloned()
            .collect();
        rows.sort_by(|a, b| b.created_at.cmp(&a.created_at));
        Ok(rows)
    }

    async fn list_passengers(&self, booking_id: Uuid) -> StoreResult<Vec<PassengerDetail>> {
        let state = self.state.lock().await;
        Ok(state.passengers.iter().filter(|p| p.booking_id == booking_id).cloned().collect())
    }

    async fn list_modifications(&self, booking_id: Uuid) -> StoreResult<Vec<ModificationRecord>> {
        let state = self.state.lock().await;
        Ok(state.modifications.iter().filter(|m| m.booking_id == booking_id).cloned().collect())
    }
}

#[async_trait]
impl BookingStore for MemoryStore {
    async fn begin(&self) -> StoreResult<Box<dyn StoreTx>> {
        if take(&self.faults.begins) {
            debug!("Injected transient failure on begin");
            return Err(StoreError::Transient("injected lock timeout".to_string()));
        }
        let guard = self.state.clone().lock_owned().await;
        let working = guard.clone();
        Ok(Box::new(MemoryTx {
            guard,
            working,
            faults: self.faults.clone(),
        }))
    }

    async fn find_overdue_pending(&self, now: DateTime<Utc>, limit: i64) -> StoreResult<Vec<Uuid>> {
        let state = self.state.lock().await;
        let mut overdue: Vec<&Booking> = state.bookings.values().filter(|b| b.is_overdue(now)).collect();
        overdue.sort_by_key(|b| b.expires_at);
        Ok(overdue
            .into_iter()
            .take(usize::try_from(limit).unwrap_or(0))
            .map(|b| b.id)
            .collect())
    }

    async fn set_payment_url(&self, booking_id: Uuid, url: &str) -> StoreResult<()> {
        if let Some(booking) = self.state.lock().await.bookings.get_mut(&booking_id) {
            booking.payment_url = Some(url.to_string());
        }
        Ok(())
    }

    async fn list_audit_entries(&self, entity_id: Uuid) -> StoreResult<Vec<AuditEntry>> {
        let state = self.state.lock().await;
        Ok(state.audit.iter().filter(|e| e.entity_id == Some(entity_id)).cloned().collect())
    }
}

pub struct MemoryTx {
    guard: OwnedMutexGuard<MemoryState>,
    working: MemoryState,
    faults: Arc<Faults>,
}

#[async_trait]
impl StoreTx for MemoryTx {
    async fn find_trip(&mut self, trip_id: Uuid) -> StoreResult<Option<Trip>> {
        Ok(self.working.trips.get(&trip_id).cloned())
    }

    async fn list_bus_seats(&mut self, bus_id: Uuid) -> StoreResult<Vec<Seat>> {
        let mut seats: Vec<Seat> = self.working.seats.values().filter(|s| s.bus_id == bus_id).cloned().collect();
        seats.sort_by(|a, b| a.code.cmp(&b.code));
        Ok(seats)
    }

    async fn lock_seat_rows(
        &mut self,
        trip_id: Uuid,
        seat_ids: &[Uuid],
        now: DateTime<Utc>,
    ) -> StoreResult<Vec<SeatOccupancy>> {
        let mut ids = seat_ids.to_vec();
        ids.sort();
        ids.dedup();
        Ok(ids
            .into_iter()
            .map(|seat_id| {
                self.working
                    .occupancy
                    .entry((trip_id, seat_id))
                    .or_insert_with(|| SeatOccupancy::available(trip_id, seat_id, now))
                    .clone()
            })
            .collect())
    }

    async fn lock_booking_seat_rows(&mut self, booking_id: Uuid) -> StoreResult<Vec<SeatOccupancy>> {
        let mut rows: Vec<SeatOccupancy> = self
            .working
            .occupancy
            .values()
            .filter(|r| r.is_owned_by(booking_id))
            .cloned()
            .collect();
        rows.sort_by_key(|r| r.seat_id);
        Ok(rows)
    }

    async fn list_trip_seat_rows(&mut self, trip_id: Uuid) -> StoreResult<Vec<SeatOccupancy>> {
        let mut rows: Vec<SeatOccupancy> =
            self.working.occupancy.values().filter(|r| r.trip_id == trip_id).cloned().collect();
        rows.sort_by_key(|r| r.seat_id);
        Ok(rows)
    }

    async fn save_seat_row(&mut self, row: &SeatOccupancy) -> StoreResult<()> {
        self.working.occupancy.insert((row.trip_id, row.seat_id), row.clone());
        Ok(())
    }

    async fn find_bookings(&mut self, ids: &[Uuid]) -> StoreResult<Vec<Booking>> {
        Ok(ids.iter().filter_map(|id| self.working.bookings.get(id).cloned()).collect())
    }

    async fn lock_booking(&mut self, id: Uuid) -> StoreResult<Option<Booking>> {
        Ok(self.working.bookings.get(&id).cloned())
    }

    async fn lock_pending_booking(&mut self, id: Uuid) -> StoreResult<Option<Booking>> {
        Ok(self
            .working
            .bookings
            .get(&id)
            .filter(|b| b.status == BookingStatus::Pending)
            .cloned())
    }

    async fn insert_booking(&mut self, booking: &Booking) -> StoreResult<()> {
        if take(&self.faults.reference_clashes)
            || self.working.bookings.values().any(|b| b.reference == booking.reference)
        {
            return Err(StoreError::Conflict(format!("duplicate reference {}", booking.reference)));
        }
        if !self.working.trips.contains_key(&booking.trip_id) {
            return Err(StoreError::Backend(format!("unknown trip {}", booking.trip_id)));
        }
        self.working.bookings.insert(booking.id, booking.clone());
        Ok(())
    }

    async fn update_booking(&mut self, booking: &Booking) -> StoreResult<()> {
        self.working.bookings.insert(booking.id, booking.clone());
        Ok(())
    }

    async fn transition_booking(
        &mut self,
        id: Uuid,
        from: BookingStatus,
        to: BookingStatus,
        at: DateTime<Utc>,
        reason: Option<&str>,
    ) -> StoreResult<u64> {
        if take(&self.faults.lost_transitions) {
            return Ok(0);
        }
        let Some(booking) = self.working.bookings.get_mut(&id).filter(|b| b.status == from) else {
            return Ok(0);
        };

        booking.status = to;
        booking.last_modified_at = at;
        if matches!(to, BookingStatus::Cancelled | BookingStatus::Expired) {
            booking.cancelled_at = Some(at);
        }
        if let Some(reason) = reason {
            booking.cancel_reason = Some(reason.to_string());
        }
        if from == BookingStatus::Pending {
            booking.expires_at = None;
        }
        Ok(1)
    }

    async fn insert_passengers(&mut self, passengers: &[PassengerDetail]) -> StoreResult<()> {
        self.working.passengers.extend_from_slice(passengers);
        Ok(())
    }

    async fn list_passengers(&mut self, booking_id: Uuid) -> StoreResult<Vec<PassengerDetail>> {
        Ok(self
            .working
            .passengers
            .iter()
            .filter(|p| p.booking_id == booking_id)
            .cloned()
            .collect())
    }

    async fn update_passenger(&mut self, passenger: &PassengerDetail) -> StoreResult<()> {
        if let Some(existing) = self.working.passengers.iter_mut().find(|p| p.id == passenger.id) {
            *existing = passenger.clone();
        }
        Ok(())
    }

    async fn insert_modification(&mut self, record: &ModificationRecord) -> StoreResult<()> {
        self.working.modifications.push(record.clone());
        Ok(())
    }

    async fn insert_audit(&mut self, entry: &AuditEntry) -> StoreResult<()> {
        self.working.audit.push(entry.clone());
        Ok(())
    }

    async fn commit(self: Box<Self>) -> StoreResult<()> {
        let MemoryTx { mut guard, working, .. } = *self;
        *guard = working;
        Ok(())
    }

    async fn rollback(self: Box<Self>) -> StoreResult<()> {
        Ok(())
    }
}
