use chrono::{DateTime, Utc};
use coachline_core::models::{
    AuditEntry, Booking, ModificationRecord, ModificationType, PassengerDetail, Seat, SeatState, Trip,
};
use coachline_core::repository::StoreTx;
use coachline_core::seat_code::normalize_seat_code;
use coachline_core::{BookingError, BookingResult, ModificationPermissions, PermissionPolicy};
use serde_json::json;
use std::collections::{HashMap, HashSet};
use std::sync::Arc;
use tracing::info;
use uuid::Uuid;

use crate::audit::actions;
use crate::ledger::{ClaimOutcome, ReassignOutcome, SeatLedger};
use crate::manager::{lock_booking, BookingLifecycleManager};
use crate::models::{ContactChange, ModificationResult, PassengerChange, SeatChange};

#[derive(Clone, Copy)]
enum Area {
    Passengers,
    Seats,
    Contact,
}

impl Area {
    fn allowed(self, perms: &ModificationPermissions) -> bool {
        match self {
            Self::Passengers => perms.can_modify_passengers,
            Self::Seats => perms.can_modify_seats,
            Self::Contact => perms.can_modify_contact,
        }
    }
}

/// Applies passenger, seat and contact changes to an existing booking.
///
/// Each call is one transaction: either every requested change lands or
/// none does.
pub struct ModificationEngine {
    manager: Arc<BookingLifecycleManager>,
    policy: PermissionPolicy,
}

impl ModificationEngine {
    pub fn new(manager: Arc<BookingLifecycleManager>, policy: PermissionPolicy) -> Self {
        Self { manager, policy }
    }

    pub fn permissions_for(&self, booking: &Booking, trip: &Trip) -> ModificationPermissions {
        self.policy.evaluate(booking.status, trip.departure_at, self.manager.now())
    }

    pub async fn check_permissions(&self, booking_id: Uuid) -> BookingResult<ModificationPermissions> {
        let mut tx = self.manager.store().begin().await?;
        let booking = tx
            .find_bookings(&[booking_id])
            .await?
            .pop()
            .ok_or_else(|| BookingError::not_found("Booking", booking_id))?;
        let trip = find_trip(tx.as_mut(), &booking).await?;
        tx.rollback().await?;
        Ok(self.permissions_for(&booking, &trip))
    }

    pub async fn modify_passenger_info(
        &self,
        booking_id: Uuid,
        changes: Vec<PassengerChange>,
        actor_id: Option<Uuid>,
    ) -> BookingResult<ModificationResult> {
        let (mut tx, booking, _trip) = self.start(booking_id, Area::Passengers).await?;
        let now = self.manager.now();

        let mut passengers = tx.list_passengers(booking.id).await?;
        let mut records = Vec::new();
        let mut touched = HashSet::new();

        for change in &changes {
            let passenger = find_passenger(&mut passengers, change.passenger_id)?;

            if let Some(name) = &change.full_name {
                let name = name.trim();
                if name.is_empty() {
                    return Err(BookingError::Validation("Passenger name cannot be empty".to_string()));
                }
                if name != passenger.full_name {
                    records.push(ModificationRecord::new(
                        booking.id,
                        ModificationType::PassengerInfo,
                        format!("Passenger name changed from '{}' to '{}'", passenger.full_name, name),
                        json!({ "passenger_id": passenger.id, "full_name": passenger.full_name }),
                        json!({ "passenger_id": passenger.id, "full_name": name }),
                        actor_id,
                        now,
                    ));
                    passenger.full_name = name.to_string();
                    touched.insert(passenger.id);
                }
            }

            if let Some(document) = &change.document_id {
                let document = document.trim();
                let new_value = (!document.is_empty()).then(|| document.to_string());
                if new_value != passenger.document_id {
                    records.push(ModificationRecord::new(
                        booking.id,
                        ModificationType::PassengerInfo,
                        format!("Travel document updated for {}", passenger.full_name),
                        json!({ "passenger_id": passenger.id, "document_id": passenger.document_id }),
                        json!({ "passenger_id": passenger.id, "document_id": new_value }),
                        actor_id,
                        now,
                    ));
                    passenger.document_id = new_value;
                    touched.insert(passenger.id);
                }
            }
        }

        if records.is_empty() {
            tx.rollback().await?;
            return Ok(noop(booking));
        }

        for passenger in passengers.iter().filter(|p| touched.contains(&p.id)) {
            tx.update_passenger(passenger).await?;
        }
        self.finish(tx, booking, records, 0, "passenger details").await
    }

    pub async fn change_seats(
        &self,
        booking_id: Uuid,
        changes: Vec<SeatChange>,
        actor_id: Option<Uuid>,
    ) -> BookingResult<ModificationResult> {
        let (mut tx, mut booking, trip) = self.start(booking_id, Area::Seats).await?;
        let now = self.manager.now();

        let bus_seats = tx.list_bus_seats(trip.bus_id).await?;
        let seats_by_id: HashMap<Uuid, &Seat> = bus_seats.iter().map(|s| (s.id, s)).collect();
        let seats_by_code: HashMap<String, &Seat> = bus_seats
            .iter()
            .filter(|s| s.is_active)
            .filter_map(|s| normalize_seat_code(&s.code).map(|c| (c, s)))
            .collect();

        let mut passengers = tx.list_passengers(booking.id).await?;
        let original: HashSet<Uuid> = passengers.iter().map(|p| p.seat_id).collect();
        let mut records = Vec::new();
        let mut touched = HashSet::new();
        let mut delta = 0i64;

        for change in &changes {
            let target = normalize_seat_code(&change.new_seat_code)
                .and_then(|code| seats_by_code.get(&code).copied())
                .ok_or_else(|| BookingError::not_found("Seat", &change.new_seat_code))?;
            let passenger = find_passenger(&mut passengers, change.passenger_id)?;
            if passenger.seat_id == target.id {
                continue;
            }

            let outcome = SeatLedger::reassign_seat(
                tx.as_mut(),
                trip.id,
                passenger.seat_id,
                target.id,
                booking.id,
                booking.expires_at,
                now,
            )
            .await?;
            if outcome == ReassignOutcome::Conflict {
                return Err(BookingError::SeatsUnavailable {
                    seat_codes: vec![target.code.clone()],
                });
            }

            let current = seats_by_id
                .get(&passenger.seat_id)
                .ok_or_else(|| BookingError::not_found("Seat", passenger.seat_id))?;
            let fare_delta = self.manager.pricing().seat_change_delta(current.seat_class, target.seat_class);
            delta += fare_delta;

            records.push(ModificationRecord::new(
                booking.id,
                ModificationType::SeatChange,
                format!("{} moved from seat {} to {}", passenger.full_name, passenger.seat_code, target.code),
                json!({ "passenger_id": passenger.id, "seat_code": passenger.seat_code, "seat_class": current.seat_class }),
                json!({
                    "passenger_id": passenger.id,
                    "seat_code": target.code,
                    "seat_class": target.seat_class,
                    "fare_delta": fare_delta,
                }),
                actor_id,
                now,
            ));
            passenger.seat_id = target.id;
            passenger.seat_code = target.code.clone();
            touched.insert(passenger.id);
        }

        if records.is_empty() {
            tx.rollback().await?;
            return Ok(noop(booking));
        }

        let mut final_seats = Vec::with_capacity(passengers.len());
        for passenger in &passengers {
            if final_seats.contains(&passenger.seat_id) {
                return Err(BookingError::Conflict(format!(
                    "Seat {} is assigned to more than one passenger",
                    passenger.seat_code
                )));
            }
            final_seats.push(passenger.seat_id);
        }

        // Swaps within the booking can leave a final seat released by an
        // earlier step; reclaim everything the passengers now sit on.
        let claim = SeatLedger::claim_seats(tx.as_mut(), trip.id, &final_seats, booking.id, booking.expires_at, now).await?;
        if let ClaimOutcome::Conflict(conflict) = claim {
            let seat_codes = passengers
                .iter()
                .filter(|p| conflict.seat_ids.contains(&p.seat_id))
                .map(|p| p.seat_code.clone())
                .collect();
            return Err(BookingError::SeatsUnavailable { seat_codes });
        }
        let freed = SeatLedger::release_unused(tx.as_mut(), booking.id, &final_seats, now).await?;

        for passenger in passengers.iter().filter(|p| touched.contains(&p.id)) {
            tx.update_passenger(passenger).await?;
        }
        booking.total_amount = (booking.total_amount + delta).max(0);

        let taken: Vec<Uuid> = final_seats.iter().copied().filter(|id| !original.contains(id)).collect();
        let trip_id = trip.id;
        let result = self.finish(tx, booking, records, delta, "seats").await?;

        self.manager.broadcast(trip_id, &freed, SeatState::Available, None).await;
        self.manager
            .broadcast(trip_id, &taken, SeatState::Booked, Some(result.booking.id))
            .await;
        Ok(result)
    }

    pub async fn modify_contact_info(
        &self,
        booking_id: Uuid,
        change: ContactChange,
        actor_id: Option<Uuid>,
    ) -> BookingResult<ModificationResult> {
        let (tx, mut booking, _trip) = self.start(booking_id, Area::Contact).await?;
        let now = self.manager.now();
        let mut records = Vec::new();

        if let Some(email) = &change.email {
            let email = email.expose().trim();
            if !email.contains('@') {
                return Err(BookingError::Validation("Contact email is not valid".to_string()));
            }
            if booking.contact_email.as_deref() != Some(email) {
                records.push(contact_record(&booking, "contact_email", &booking.contact_email, email, actor_id, now));
                booking.contact_email = Some(email.to_string());
            }
        }

        if let Some(phone) = &change.phone {
            let phone = phone.expose().trim();
            if phone.is_empty() {
                return Err(BookingError::Validation("Contact phone cannot be empty".to_string()));
            }
            if booking.contact_phone.as_deref() != Some(phone) {
                records.push(contact_record(&booking, "contact_phone", &booking.contact_phone, phone, actor_id, now));
                booking.contact_phone = Some(phone.to_string());
            }
        }

        if records.is_empty() {
            tx.rollback().await?;
            return Ok(noop(booking));
        }
        self.finish(tx, booking, records, 0, "contact details").await
    }

    /// Opens the transaction for a change. An overdue hold is expired on the
    /// way out instead of being modified.
    async fn start(&self, booking_id: Uuid, area: Area) -> BookingResult<(Box<dyn StoreTx>, Booking, Trip)> {
        let mut tx = self.manager.store().begin().await?;
        match self.open(tx.as_mut(), booking_id, area).await {
            Ok((booking, trip)) => Ok((tx, booking, trip)),
            Err(BookingError::HoldExpired { reference }) => {
                tx.rollback().await?;
                self.manager.expire_if_due(booking_id).await?;
                Err(BookingError::HoldExpired { reference })
            }
            Err(e) => Err(e),
        }
    }

    /// Locks the booking and re-checks permissions inside the transaction.
    async fn open(&self, tx: &mut dyn StoreTx, booking_id: Uuid, area: Area) -> BookingResult<(Booking, Trip)> {
        let booking = lock_booking(tx, booking_id).await?;
        let trip = find_trip(tx, &booking).await?;

        if booking.is_overdue(self.manager.now()) {
            return Err(BookingError::HoldExpired {
                reference: booking.reference,
            });
        }

        let perms = self.permissions_for(&booking, &trip);
        if !area.allowed(&perms) {
            let reason = perms
                .reason
                .unwrap_or_else(|| "Modification not allowed".to_string());
            return Err(BookingError::policy(&booking, reason));
        }
        Ok((booking, trip))
    }

    async fn finish(
        &self,
        mut tx: Box<dyn StoreTx>,
        mut booking: Booking,
        records: Vec<ModificationRecord>,
        price_delta: i64,
        area: &str,
    ) -> BookingResult<ModificationResult> {
        let now = self.manager.now();
        booking.last_modified_at = now;
        tx.update_booking(&booking).await?;
        for record in &records {
            tx.insert_modification(record).await?;
        }

        let entry = self
            .manager
            .audit()
            .record(
                tx.as_mut(),
                AuditEntry::new(
                    actions::BOOKING_MODIFIED,
                    format!("Booking {}: {} change(s) to {}", booking.reference, records.len(), area),
                    now,
                )
                .actor(records.first().and_then(|r| r.actor_id))
                .affected_user(booking.owner_id)
                .entity(booking.id)
                .metadata(json!({
                    "reference": booking.reference,
                    "changes": records.iter().map(|r| r.modification_type.as_str()).collect::<Vec<_>>(),
                    "price_delta": price_delta,
                    "total_amount": booking.total_amount,
                })),
            )
            .await?;
        tx.commit().await?;

        info!(booking_id = %booking.id, changes = records.len(), price_delta, "Booking modified");
        self.manager.audit().mirror(&entry).await;

        Ok(ModificationResult {
            booking,
            records,
            price_delta,
        })
    }
}

async fn find_trip(tx: &mut dyn StoreTx, booking: &Booking) -> BookingResult<Trip> {
    tx.find_trip(booking.trip_id)
        .await?
        .ok_or_else(|| BookingError::not_found("Trip", booking.trip_id))
}

fn find_passenger(passengers: &mut [PassengerDetail], passenger_id: Uuid) -> BookingResult<&mut PassengerDetail> {
    passengers
        .iter_mut()
        .find(|p| p.id == passenger_id)
        .ok_or_else(|| BookingError::not_found("Passenger", passenger_id))
}

fn contact_record(
    booking: &Booking,
    field: &str,
    previous: &Option<String>,
    new_value: &str,
    actor_id: Option<Uuid>,
    now: DateTime<Utc>,
) -> ModificationRecord {
    ModificationRecord::new(
        booking.id,
        ModificationType::ContactInfo,
        format!("Contact {} updated", field.trim_start_matches("contact_")),
        json!({ field: previous }),
        json!({ field: new_value }),
        actor_id,
        now,
    )
}

fn noop(booking: Booking) -> ModificationResult {
    ModificationResult {
        booking,
        records: Vec::new(),
        price_delta: 0,
    }
}
