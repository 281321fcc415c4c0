//! Seat ledger: per (trip, seat) occupancy, mutated only inside the
//! caller's store transaction.
//!
//! Every function here works on rows locked through the transaction, so two
//! claimants of the same seat are ordered by the store's lock manager, even
//! across processes.

use chrono::{DateTime, Utc};
use coachline_core::models::{Booking, Seat, SeatOccupancy, SeatState, Trip};
use coachline_core::repository::{StoreResult, StoreTx};
use std::collections::{HashMap, HashSet};
use uuid::Uuid;

use crate::models::SeatMapEntry;

#[derive(Debug, Clone, PartialEq)]
pub enum ClaimOutcome {
    Claimed(Vec<Uuid>),
    Conflict(ClaimConflict),
}

/// Why a claim was refused. Nothing was written.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct ClaimConflict {
    pub seat_ids: Vec<Uuid>,
    /// PENDING owners of blocked seats whose hold deadline has passed.
    pub overdue_owners: Vec<Uuid>,
    /// Every blocked seat belongs to one of `overdue_owners`.
    pub only_overdue: bool,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReassignOutcome {
    Reassigned,
    /// Target seat already belonged to the booking.
    Unchanged,
    Conflict,
}

enum RowOwner {
    Free,
    Mine,
    Stale,
    Overdue(Uuid),
    Held,
}

pub struct SeatLedger;

impl SeatLedger {
    /// All-or-nothing claim of `seat_ids` for `booking_id`.
    ///
    /// Rows already owned by the booking count as claimed; their hold
    /// deadline is refreshed to `hold_until`.
    pub async fn claim_seats(
        tx: &mut dyn StoreTx,
        trip_id: Uuid,
        seat_ids: &[Uuid],
        booking_id: Uuid,
        hold_until: Option<DateTime<Utc>>,
        now: DateTime<Utc>,
    ) -> StoreResult<ClaimOutcome> {
        let mut rows = tx.lock_seat_rows(trip_id, seat_ids, now).await?;
        let owners = Self::load_owners(tx, &rows, booking_id).await?;

        let mut conflict = ClaimConflict {
            only_overdue: true,
            ..ClaimConflict::default()
        };
        for row in &rows {
            match classify(row, booking_id, &owners, now) {
                RowOwner::Free | RowOwner::Mine | RowOwner::Stale => {}
                RowOwner::Overdue(owner) => {
                    conflict.seat_ids.push(row.seat_id);
                    if !conflict.overdue_owners.contains(&owner) {
                        conflict.overdue_owners.push(owner);
                    }
                }
                RowOwner::Held => {
                    conflict.seat_ids.push(row.seat_id);
                    conflict.only_overdue = false;
                }
            }
        }

        if !conflict.seat_ids.is_empty() {
            return Ok(ClaimOutcome::Conflict(conflict));
        }

        for row in rows.iter_mut() {
            row.claim(booking_id, hold_until, now);
            tx.save_seat_row(row).await?;
        }
        Ok(ClaimOutcome::Claimed(rows.iter().map(|r| r.seat_id).collect()))
    }

    /// Frees every seat the booking holds. Returns the freed seat ids;
    /// empty when the booking held nothing.
    pub async fn release_seats(tx: &mut dyn StoreTx, booking_id: Uuid, now: DateTime<Utc>) -> StoreResult<Vec<Uuid>> {
        Self::release_unused(tx, booking_id, &[], now).await
    }

    /// Frees the booking's seats that are not in `keep`.
    pub async fn release_unused(
        tx: &mut dyn StoreTx,
        booking_id: Uuid,
        keep: &[Uuid],
        now: DateTime<Utc>,
    ) -> StoreResult<Vec<Uuid>> {
        let rows = tx.lock_booking_seat_rows(booking_id).await?;
        let mut released = Vec::new();
        for mut row in rows.into_iter().filter(|r| !keep.contains(&r.seat_id)) {
            row.release(now);
            tx.save_seat_row(&row).await?;
            released.push(row.seat_id);
        }
        Ok(released)
    }

    /// Moves a booking from one seat to another in a single step.
    pub async fn reassign_seat(
        tx: &mut dyn StoreTx,
        trip_id: Uuid,
        from_seat_id: Uuid,
        to_seat_id: Uuid,
        booking_id: Uuid,
        hold_until: Option<DateTime<Utc>>,
        now: DateTime<Utc>,
    ) -> StoreResult<ReassignOutcome> {
        let rows = tx.lock_seat_rows(trip_id, &[from_seat_id, to_seat_id], now).await?;
        let owners = Self::load_owners(tx, &rows, booking_id).await?;

        let Some(mut target) = rows.iter().find(|r| r.seat_id == to_seat_id).cloned() else {
            return Ok(ReassignOutcome::Conflict);
        };
        match classify(&target, booking_id, &owners, now) {
            RowOwner::Mine => return Ok(ReassignOutcome::Unchanged),
            RowOwner::Overdue(_) | RowOwner::Held => return Ok(ReassignOutcome::Conflict),
            RowOwner::Free | RowOwner::Stale => {}
        }

        target.claim(booking_id, hold_until, now);
        tx.save_seat_row(&target).await?;

        if let Some(mut source) = rows.into_iter().find(|r| r.seat_id == from_seat_id && r.is_owned_by(booking_id)) {
            source.release(now);
            tx.save_seat_row(&source).await?;
        }
        Ok(ReassignOutcome::Reassigned)
    }

    /// Marks the booking's seats as sold: the hold deadline no longer applies.
    pub async fn settle(tx: &mut dyn StoreTx, booking_id: Uuid, now: DateTime<Utc>) -> StoreResult<Vec<Uuid>> {
        Self::set_hold_deadline(tx, booking_id, None, now).await
    }

    pub async fn set_hold_deadline(
        tx: &mut dyn StoreTx,
        booking_id: Uuid,
        hold_until: Option<DateTime<Utc>>,
        now: DateTime<Utc>,
    ) -> StoreResult<Vec<Uuid>> {
        let rows = tx.lock_booking_seat_rows(booking_id).await?;
        let mut touched = Vec::with_capacity(rows.len());
        for mut row in rows {
            row.claim(booking_id, hold_until, now);
            tx.save_seat_row(&row).await?;
            touched.push(row.seat_id);
        }
        Ok(touched)
    }

    /// Ledger view of every seat on the trip's bus, ordered by seat code.
    /// Seats never referenced yet show as AVAILABLE.
    pub async fn seat_map(tx: &mut dyn StoreTx, trip: &Trip) -> StoreResult<Vec<SeatMapEntry>> {
        let seats: Vec<Seat> = tx.list_bus_seats(trip.bus_id).await?;
        let rows: HashMap<Uuid, SeatOccupancy> = tx
            .list_trip_seat_rows(trip.id)
            .await?
            .into_iter()
            .map(|r| (r.seat_id, r))
            .collect();

        Ok(seats
            .into_iter()
            .filter(|s| s.is_active)
            .map(|seat| {
                let row = rows.get(&seat.id);
                SeatMapEntry {
                    seat_id: seat.id,
                    code: seat.code,
                    seat_class: seat.seat_class,
                    state: row.map(|r| r.state).unwrap_or(SeatState::Available),
                    booking_id: row.and_then(|r| r.booking_id),
                }
            })
            .collect())
    }

    async fn load_owners(
        tx: &mut dyn StoreTx,
        rows: &[SeatOccupancy],
        booking_id: Uuid,
    ) -> StoreResult<HashMap<Uuid, Booking>> {
        let owner_ids: Vec<Uuid> = rows
            .iter()
            .filter(|r| !r.is_free())
            .filter_map(|r| r.booking_id)
            .filter(|id| *id != booking_id)
            .collect::<HashSet<_>>()
            .into_iter()
            .collect();

        if owner_ids.is_empty() {
            return Ok(HashMap::new());
        }
        Ok(tx
            .find_bookings(&owner_ids)
            .await?
            .into_iter()
            .map(|b| (b.id, b))
            .collect())
    }
}

/// A non-free row is reclaimable only if its owner is gone or terminal, or
/// it is a LOCKED row whose lock ran out. A PENDING owner past its deadline
/// still blocks until it has been expired.
fn classify(row: &SeatOccupancy, booking_id: Uuid, owners: &HashMap<Uuid, Booking>, now: DateTime<Utc>) -> RowOwner {
    if row.is_free() {
        return RowOwner::Free;
    }
    if row.is_owned_by(booking_id) {
        return RowOwner::Mine;
    }
    if row.state == SeatState::Locked && row.lock_expires_at.is_some_and(|at| at <= now) {
        return RowOwner::Stale;
    }

    match row.booking_id.and_then(|id| owners.get(&id)) {
        None => RowOwner::Stale,
        Some(owner) if owner.status.is_terminal() => RowOwner::Stale,
        Some(owner) if owner.is_overdue(now) => RowOwner::Overdue(owner.id),
        Some(_) => RowOwner::Held,
    }
}
