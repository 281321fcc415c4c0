use chrono::{DateTime, Duration, Utc};
use coachline_catalog::{PricingEngine, SeatHoldCache};
use coachline_core::models::{AuditEntry, Booking, BookingStatus, PassengerDetail, Seat, SeatState};
use coachline_core::notify::{AuditSink, NoopBroadcaster, NoopNotifier, Notifier, SeatBroadcaster};
use coachline_core::payment::PaymentCollaborator;
use coachline_core::repository::{BookingStore, StoreError, StoreTx};
use coachline_core::seat_code::normalize_seat_code;
use coachline_core::{BookingError, BookingResult, Clock};
use serde_json::json;
use std::collections::{HashMap, HashSet};
use std::sync::Arc;
use tracing::{debug, info, warn};
use uuid::Uuid;

use crate::audit::{actions, AuditTrail};
use crate::ledger::{ClaimOutcome, SeatLedger};
use crate::models::{CancelOutcome, CreateBookingRequest, SeatMapEntry};

const MAX_REFERENCE_ATTEMPTS: u32 = 5;

#[derive(Debug, Clone)]
pub struct LifecycleRules {
    pub hold_duration: Duration,
    /// Owners may not cancel once departure is closer than this.
    pub owner_cancel_lead: Duration,
    pub currency: String,
}

impl Default for LifecycleRules {
    fn default() -> Self {
        Self {
            hold_duration: Duration::minutes(15),
            owner_cancel_lead: Duration::hours(6),
            currency: "VND".to_string(),
        }
    }
}

/// Booking state machine: claim, confirm, cancel, expire.
///
/// Every transition runs in one store transaction. Collaborators are called
/// after commit and their failures are only logged.
pub struct BookingLifecycleManager {
    store: Arc<dyn BookingStore>,
    clock: Arc<dyn Clock>,
    pricing: PricingEngine,
    rules: LifecycleRules,
    audit: AuditTrail,
    notifier: Arc<dyn Notifier>,
    broadcaster: Arc<dyn SeatBroadcaster>,
    payments: Option<Arc<dyn PaymentCollaborator>>,
    holds: Option<Arc<SeatHoldCache>>,
}

impl BookingLifecycleManager {
    pub fn new(store: Arc<dyn BookingStore>, clock: Arc<dyn Clock>) -> Self {
        Self {
            store,
            clock,
            pricing: PricingEngine::default(),
            rules: LifecycleRules::default(),
            audit: AuditTrail::new(),
            notifier: Arc::new(NoopNotifier),
            broadcaster: Arc::new(NoopBroadcaster),
            payments: None,
            holds: None,
        }
    }

    pub fn with_pricing(mut self, pricing: PricingEngine) -> Self {
        self.pricing = pricing;
        self
    }

    pub fn with_rules(mut self, rules: LifecycleRules) -> Self {
        self.rules = rules;
        self
    }

    pub fn with_notifier(mut self, notifier: Arc<dyn Notifier>) -> Self {
        self.notifier = notifier;
        self
    }

    pub fn with_broadcaster(mut self, broadcaster: Arc<dyn SeatBroadcaster>) -> Self {
        self.broadcaster = broadcaster;
        self
    }

    pub fn with_audit_sink(mut self, sink: Arc<dyn AuditSink>) -> Self {
        self.audit = AuditTrail::with_sink(sink);
        self
    }

    pub fn with_payments(mut self, payments: Arc<dyn PaymentCollaborator>) -> Self {
        self.payments = Some(payments);
        self
    }

    pub fn with_hold_cache(mut self, holds: Arc<SeatHoldCache>) -> Self {
        self.holds = Some(holds);
        self
    }

    pub fn store(&self) -> &Arc<dyn BookingStore> {
        &self.store
    }

    pub fn now(&self) -> DateTime<Utc> {
        self.clock.now()
    }

    pub fn pricing(&self) -> &PricingEngine {
        &self.pricing
    }

    pub fn rules(&self) -> &LifecycleRules {
        &self.rules
    }

    /// Drops lapsed viewer holds from the configured cache, if any.
    pub fn purge_stale_holds(&self, now: DateTime<Utc>) -> usize {
        self.holds.as_ref().map_or(0, |holds| holds.purge_expired(now))
    }

    pub(crate) fn audit(&self) -> &AuditTrail {
        &self.audit
    }

    // ------------------------------------------------------------------
    // Create
    // ------------------------------------------------------------------

    pub async fn create_booking(&self, request: CreateBookingRequest) -> BookingResult<Booking> {
        let seat_codes = validate_request(&request)?;
        let mut reclaimed = false;
        let mut reference_attempts = 0;

        loop {
            let mut tx = self.store.begin().await?;
            let trip = tx
                .find_trip(request.trip_id)
                .await?
                .ok_or_else(|| BookingError::not_found("Trip", request.trip_id))?;

            let seats = resolve_seats(tx.list_bus_seats(trip.bus_id).await?, &seat_codes)?;
            let total = self.pricing.resolve_total(request.declared_total, trip.base_fare, &seats);

            let now = self.clock.now();
            let mut booking = Booking::new_pending(
                trip.id,
                request.owner_id,
                total,
                &self.rules.currency,
                now,
                now + self.rules.hold_duration,
            );
            if let Some(contact) = &request.guest_contact {
                booking.contact_email = Some(contact.email.expose().trim().to_string());
                booking.contact_phone = Some(contact.phone.expose().trim().to_string());
            }
            match tx.insert_booking(&booking).await {
                Ok(()) => {}
                Err(StoreError::Conflict(e)) if reference_attempts + 1 < MAX_REFERENCE_ATTEMPTS => {
                    reference_attempts += 1;
                    debug!(reference = %booking.reference, attempt = reference_attempts, "Booking reference taken, retrying: {}", e);
                    tx.rollback().await?;
                    continue;
                }
                Err(e) => return Err(e.into()),
            }

            let seat_ids: Vec<Uuid> = seats.iter().map(|s| s.id).collect();
            let claimed = SeatLedger::claim_seats(tx.as_mut(), trip.id, &seat_ids, booking.id, booking.expires_at, now).await?;

            let conflict = match claimed {
                ClaimOutcome::Claimed(_) => None,
                ClaimOutcome::Conflict(conflict) => Some(conflict),
            };
            if let Some(conflict) = conflict {
                tx.rollback().await?;

                if conflict.only_overdue && !reclaimed {
                    debug!(trip_id = %trip.id, owners = ?conflict.overdue_owners, "Reclaiming seats held by overdue bookings");
                    for owner in &conflict.overdue_owners {
                        self.expire_if_due(*owner).await?;
                    }
                    reclaimed = true;
                    continue;
                }

                let blocked: Vec<String> = seats
                    .iter()
                    .filter(|s| conflict.seat_ids.contains(&s.id))
                    .map(|s| s.code.clone())
                    .collect();
                info!(trip_id = %trip.id, seat_codes = ?blocked, "Seat claim refused");
                return Err(BookingError::SeatsUnavailable { seat_codes: blocked });
            }

            let by_code: HashMap<String, &Seat> = seats
                .iter()
                .filter_map(|s| normalize_seat_code(&s.code).map(|c| (c, s)))
                .collect();
            let mut passengers = Vec::with_capacity(request.passengers.len());
            for input in &request.passengers {
                let seat = normalize_seat_code(&input.seat_code)
                    .and_then(|c| by_code.get(&c).copied())
                    .ok_or_else(|| BookingError::Validation(format!("Unknown seat code {}", input.seat_code)))?;
                passengers.push(PassengerDetail {
                    id: Uuid::new_v4(),
                    booking_id: booking.id,
                    full_name: input.full_name.trim().to_string(),
                    document_id: input.document_id.clone(),
                    seat_id: seat.id,
                    seat_code: seat.code.clone(),
                });
            }
            tx.insert_passengers(&passengers).await?;

            let codes: Vec<&str> = seats.iter().map(|s| s.code.as_str()).collect();
            let entry = self
                .audit
                .record(
                    tx.as_mut(),
                    AuditEntry::new(
                        actions::BOOKING_CREATED,
                        format!("Booking {} created for seats {}", booking.reference, codes.join(", ")),
                        now,
                    )
                    .actor(booking.owner_id)
                    .affected_user(booking.owner_id)
                    .entity(booking.id)
                    .metadata(json!({
                        "reference": booking.reference,
                        "trip_id": trip.id,
                        "seats": codes,
                        "total_amount": booking.total_amount,
                        "expires_at": booking.expires_at,
                    })),
                )
                .await?;
            tx.commit().await?;

            info!(booking_id = %booking.id, reference = %booking.reference, trip_id = %trip.id, total = booking.total_amount, "Booking created");

            self.audit.mirror(&entry).await;
            if let Some(holds) = &self.holds {
                let owned: Vec<String> = seats.iter().map(|s| s.code.clone()).collect();
                holds.clear_seats(trip.id, &owned);
            }
            self.broadcast(trip.id, &seat_ids, SeatState::Booked, Some(booking.id)).await;
            self.attach_payment_link(&mut booking).await;

            return Ok(booking);
        }
    }

    async fn attach_payment_link(&self, booking: &mut Booking) {
        let Some(payments) = &self.payments else {
            return;
        };

        let link = match payments
            .request_payment_link(booking.id, &booking.reference, booking.total_amount, &booking.currency)
            .await
        {
            Ok(link) => link,
            Err(e) => {
                warn!(booking_id = %booking.id, "Payment link request failed: {}", e);
                return;
            }
        };

        match self.store.set_payment_url(booking.id, &link.url).await {
            Ok(()) => booking.payment_url = Some(link.url),
            Err(e) => warn!(booking_id = %booking.id, "Could not store payment link: {}", e),
        }
    }

    // ------------------------------------------------------------------
    // Transitions
    // ------------------------------------------------------------------

    /// PENDING -> PAID. Replays on a PAID (or COMPLETED) booking return it
    /// unchanged without side effects.
    pub async fn confirm_payment(&self, booking_id: Uuid) -> BookingResult<Booking> {
        let mut tx = self.store.begin().await?;
        let booking = lock_booking(tx.as_mut(), booking_id).await?;
        let now = self.clock.now();
        let status = booking.status;

        match status {
            BookingStatus::Paid | BookingStatus::Completed => {
                tx.rollback().await?;
                debug!(booking_id = %booking.id, "Duplicate payment confirmation ignored");
                return Ok(booking);
            }
            BookingStatus::Cancelled | BookingStatus::Expired => {
                return Err(BookingError::policy(
                    &booking,
                    format!("Payment cannot be confirmed for a {} booking", booking.status),
                ));
            }
            BookingStatus::Pending if booking.is_overdue(now) => {
                tx.rollback().await?;
                self.expire_if_due(booking.id).await?;
                return Err(BookingError::HoldExpired {
                    reference: booking.reference,
                });
            }
            BookingStatus::Pending => {}
        }

        let updated = tx
            .transition_booking(booking.id, BookingStatus::Pending, BookingStatus::Paid, now, None)
            .await?;
        if updated == 0 {
            return Err(BookingError::Conflict(format!(
                "Booking {} changed while confirming payment",
                booking.reference
            )));
        }
        let seat_ids = SeatLedger::settle(tx.as_mut(), booking.id, now).await?;
        let entry = self
            .audit
            .record(
                tx.as_mut(),
                AuditEntry::new(
                    actions::PAYMENT_CONFIRMED,
                    format!("Payment confirmed for booking {}", booking.reference),
                    now,
                )
                .affected_user(booking.owner_id)
                .entity(booking.id)
                .metadata(json!({ "reference": booking.reference, "total_amount": booking.total_amount })),
            )
            .await?;
        let paid = lock_booking(tx.as_mut(), booking.id).await?;
        tx.commit().await?;

        info!(booking_id = %paid.id, reference = %paid.reference, "Payment confirmed");

        self.audit.mirror(&entry).await;
        self.broadcast(paid.trip_id, &seat_ids, SeatState::Booked, Some(paid.id)).await;
        self.notify_owner(
            &paid,
            "Payment received",
            &format!("Your booking {} is confirmed.", paid.reference),
        )
        .await;

        Ok(paid)
    }

    pub async fn cancel_booking(&self, booking_id: Uuid, reason: Option<&str>) -> BookingResult<CancelOutcome> {
        self.cancel(booking_id, reason, None).await
    }

    /// Owner-initiated cancellation: ownership and departure lead time apply.
    pub async fn cancel_booking_by_owner(&self, booking_id: Uuid, owner_id: Uuid) -> BookingResult<CancelOutcome> {
        self.cancel(booking_id, Some("cancelled by owner"), Some(owner_id)).await
    }

    async fn cancel(&self, booking_id: Uuid, reason: Option<&str>, owner: Option<Uuid>) -> BookingResult<CancelOutcome> {
        let mut tx = self.store.begin().await?;
        let booking = lock_booking(tx.as_mut(), booking_id).await?;
        let now = self.clock.now();

        if let Some(owner_id) = owner {
            if booking.owner_id != Some(owner_id) {
                return Err(BookingError::policy(&booking, "Booking belongs to another user"));
            }
        }

        match booking.status {
            BookingStatus::Cancelled => {
                tx.rollback().await?;
                return Ok(CancelOutcome::AlreadyCancelled(booking));
            }
            BookingStatus::Paid => {
                return Err(BookingError::policy(
                    &booking,
                    "Paid bookings must go through the refund process",
                ));
            }
            BookingStatus::Expired | BookingStatus::Completed => {
                return Err(BookingError::policy(
                    &booking,
                    format!("A {} booking cannot be cancelled", booking.status),
                ));
            }
            BookingStatus::Pending => {}
        }

        if owner.is_some() {
            let trip = tx
                .find_trip(booking.trip_id)
                .await?
                .ok_or_else(|| BookingError::not_found("Trip", booking.trip_id))?;
            if trip.departure_at - now < self.rules.owner_cancel_lead {
                return Err(BookingError::policy(
                    &booking,
                    format!(
                        "Cancellations close {} hours before departure",
                        self.rules.owner_cancel_lead.num_hours()
                    ),
                ));
            }
        }

        let updated = tx
            .transition_booking(booking.id, BookingStatus::Pending, BookingStatus::Cancelled, now, reason)
            .await?;
        if updated == 0 {
            return Err(BookingError::Conflict(format!(
                "Booking {} changed while cancelling",
                booking.reference
            )));
        }
        let released = SeatLedger::release_seats(tx.as_mut(), booking.id, now).await?;
        let entry = self
            .audit
            .record(
                tx.as_mut(),
                AuditEntry::new(
                    actions::BOOKING_CANCELLED,
                    format!(
                        "Booking {} cancelled: {}",
                        booking.reference,
                        reason.unwrap_or("no reason given")
                    ),
                    now,
                )
                .actor(owner)
                .affected_user(booking.owner_id)
                .entity(booking.id)
                .metadata(json!({ "reference": booking.reference, "released_seats": released })),
            )
            .await?;
        let cancelled = lock_booking(tx.as_mut(), booking.id).await?;
        tx.commit().await?;

        info!(booking_id = %cancelled.id, reference = %cancelled.reference, "Booking cancelled");

        self.audit.mirror(&entry).await;
        self.broadcast(cancelled.trip_id, &released, SeatState::Available, None).await;
        self.notify_owner(
            &cancelled,
            "Booking cancelled",
            &format!("Your booking {} was cancelled.", cancelled.reference),
        )
        .await;

        Ok(CancelOutcome::Cancelled(cancelled))
    }

    /// Expires a PENDING booking whose hold has run out.
    ///
    /// Safe to call from any number of processes at once: the status change
    /// is a conditional update and only the caller that wins it releases
    /// seats. Everyone else gets `false`.
    pub async fn expire_if_due(&self, booking_id: Uuid) -> BookingResult<bool> {
        let mut tx = self.store.begin().await?;
        let now = self.clock.now();

        let Some(booking) = tx.lock_pending_booking(booking_id).await? else {
            tx.rollback().await?;
            return Ok(false);
        };
        if !booking.is_overdue(now) {
            // Extended since it was picked as a candidate
            tx.rollback().await?;
            return Ok(false);
        }

        let updated = tx
            .transition_booking(booking.id, BookingStatus::Pending, BookingStatus::Expired, now, Some("hold expired"))
            .await?;
        if updated != 1 {
            tx.rollback().await?;
            return Ok(false);
        }

        let released = SeatLedger::release_seats(tx.as_mut(), booking.id, now).await?;
        let entry = self
            .audit
            .record(
                tx.as_mut(),
                AuditEntry::new(
                    actions::BOOKING_EXPIRED,
                    format!("Hold on booking {} expired", booking.reference),
                    now,
                )
                .affected_user(booking.owner_id)
                .entity(booking.id)
                .metadata(json!({
                    "reference": booking.reference,
                    "expires_at": booking.expires_at,
                    "released_seats": released,
                })),
            )
            .await?;
        tx.commit().await?;

        info!(booking_id = %booking.id, reference = %booking.reference, seats = released.len(), "Booking expired");

        self.audit.mirror(&entry).await;
        self.broadcast(booking.trip_id, &released, SeatState::Available, None).await;
        self.notify_owner(
            &booking,
            "Booking expired",
            &format!("The hold on booking {} ran out before payment.", booking.reference),
        )
        .await;

        Ok(true)
    }

    /// PAID -> COMPLETED once the trip has departed. Seats are released since
    /// the ledger only tracks live bookings.
    pub async fn complete_booking(&self, booking_id: Uuid) -> BookingResult<Booking> {
        let mut tx = self.store.begin().await?;
        let booking = lock_booking(tx.as_mut(), booking_id).await?;
        let now = self.clock.now();

        match booking.status {
            BookingStatus::Completed => {
                tx.rollback().await?;
                return Ok(booking);
            }
            BookingStatus::Paid => {}
            _ => {
                return Err(BookingError::policy(&booking, "Only paid bookings can be completed"));
            }
        }

        let trip = tx
            .find_trip(booking.trip_id)
            .await?
            .ok_or_else(|| BookingError::not_found("Trip", booking.trip_id))?;
        if trip.departure_at > now {
            return Err(BookingError::policy(&booking, "Trip has not departed yet"));
        }

        let updated = tx
            .transition_booking(booking.id, BookingStatus::Paid, BookingStatus::Completed, now, None)
            .await?;
        if updated == 0 {
            return Err(BookingError::Conflict(format!(
                "Booking {} changed while completing",
                booking.reference
            )));
        }
        let released = SeatLedger::release_seats(tx.as_mut(), booking.id, now).await?;
        let entry = self
            .audit
            .record(
                tx.as_mut(),
                AuditEntry::new(
                    actions::BOOKING_COMPLETED,
                    format!("Booking {} completed", booking.reference),
                    now,
                )
                .affected_user(booking.owner_id)
                .entity(booking.id)
                .metadata(json!({ "reference": booking.reference, "released_seats": released })),
            )
            .await?;
        let completed = lock_booking(tx.as_mut(), booking.id).await?;
        tx.commit().await?;

        self.audit.mirror(&entry).await;
        Ok(completed)
    }

    /// Pushes the hold deadline of a live PENDING booking forward.
    pub async fn extend_hold(&self, booking_id: Uuid, extra: Duration) -> BookingResult<Booking> {
        if extra <= Duration::zero() {
            return Err(BookingError::Validation("Hold extension must be positive".to_string()));
        }

        let mut tx = self.store.begin().await?;
        let mut booking = lock_booking(tx.as_mut(), booking_id).await?;
        let now = self.clock.now();

        if booking.status != BookingStatus::Pending {
            return Err(BookingError::policy(&booking, "Only pending bookings hold seats"));
        }
        if booking.is_overdue(now) {
            tx.rollback().await?;
            self.expire_if_due(booking.id).await?;
            return Err(BookingError::HoldExpired {
                reference: booking.reference,
            });
        }

        let previous = booking.expires_at;
        let new_deadline = previous.unwrap_or(now) + extra;
        booking.expires_at = Some(new_deadline);
        booking.last_modified_at = now;
        tx.update_booking(&booking).await?;
        SeatLedger::set_hold_deadline(tx.as_mut(), booking.id, Some(new_deadline), now).await?;
        let entry = self
            .audit
            .record(
                tx.as_mut(),
                AuditEntry::new(
                    actions::HOLD_EXTENDED,
                    format!("Hold on booking {} extended to {}", booking.reference, new_deadline),
                    now,
                )
                .affected_user(booking.owner_id)
                .entity(booking.id)
                .metadata(json!({ "previous": previous, "expires_at": new_deadline })),
            )
            .await?;
        tx.commit().await?;

        debug!(booking_id = %booking.id, expires_at = %new_deadline, "Hold extended");
        self.audit.mirror(&entry).await;
        Ok(booking)
    }

    // ------------------------------------------------------------------
    // Reads
    // ------------------------------------------------------------------

    /// Status read that drives expiry of an overdue hold before answering.
    pub async fn get_booking(&self, booking_id: Uuid) -> BookingResult<Booking> {
        let booking = self
            .store
            .find_booking(booking_id)
            .await?
            .ok_or_else(|| BookingError::not_found("Booking", booking_id))?;
        self.refresh(booking).await
    }

    pub async fn get_booking_by_reference(&self, reference: &str) -> BookingResult<Booking> {
        let booking = self
            .store
            .find_booking_by_reference(reference)
            .await?
            .ok_or_else(|| BookingError::not_found("Booking", reference))?;
        self.refresh(booking).await
    }

    async fn refresh(&self, booking: Booking) -> BookingResult<Booking> {
        if !booking.is_overdue(self.clock.now()) {
            return Ok(booking);
        }
        self.expire_if_due(booking.id).await?;
        self.store
            .find_booking(booking.id)
            .await?
            .ok_or_else(|| BookingError::not_found("Booking", booking.id))
    }

    pub async fn seat_map(&self, trip_id: Uuid) -> BookingResult<Vec<SeatMapEntry>> {
        let mut tx = self.store.begin().await?;
        let trip = tx
            .find_trip(trip_id)
            .await?
            .ok_or_else(|| BookingError::not_found("Trip", trip_id))?;
        let map = SeatLedger::seat_map(tx.as_mut(), &trip).await?;
        tx.rollback().await?;
        Ok(map)
    }

    // ------------------------------------------------------------------
    // Collaborators
    // ------------------------------------------------------------------

    pub(crate) async fn broadcast(&self, trip_id: Uuid, seat_ids: &[Uuid], state: SeatState, booking_id: Option<Uuid>) {
        if seat_ids.is_empty() {
            return;
        }
        if let Err(e) = self.broadcaster.broadcast(trip_id, seat_ids, state, booking_id).await {
            warn!(trip_id = %trip_id, "Seat broadcast failed: {}", e);
        }
    }

    async fn notify_owner(&self, booking: &Booking, title: &str, body: &str) {
        let Some(user_id) = booking.owner_id else {
            debug!(booking_id = %booking.id, "Guest booking, no user to notify");
            return;
        };
        let context = json!({
            "booking_id": booking.id,
            "reference": booking.reference,
            "status": booking.status,
        });
        if let Err(e) = self.notifier.notify(user_id, title, body, context).await {
            warn!(booking_id = %booking.id, "Notification failed: {}", e);
        }
    }
}

pub(crate) async fn lock_booking(tx: &mut dyn StoreTx, booking_id: Uuid) -> BookingResult<Booking> {
    tx.lock_booking(booking_id)
        .await?
        .ok_or_else(|| BookingError::not_found("Booking", booking_id))
}

/// Input checks that need no store access. Returns the normalized seat
/// codes in request order.
pub fn validate_request(request: &CreateBookingRequest) -> BookingResult<Vec<String>> {
    if request.seat_codes.is_empty() {
        return Err(BookingError::Validation("At least one seat is required".to_string()));
    }
    if request.seat_codes.len() != request.passengers.len() {
        return Err(BookingError::Validation(format!(
            "{} seats requested for {} passengers",
            request.seat_codes.len(),
            request.passengers.len()
        )));
    }

    let mut seats = Vec::with_capacity(request.seat_codes.len());
    let mut seen = HashSet::new();
    for raw in &request.seat_codes {
        let code = normalize_seat_code(raw).ok_or_else(|| BookingError::Validation(format!("Invalid seat code '{}'", raw)))?;
        if !seen.insert(code.clone()) {
            return Err(BookingError::Validation(format!("Seat {} requested twice", code)));
        }
        seats.push(code);
    }

    let mut passenger_seats = HashSet::new();
    for passenger in &request.passengers {
        if passenger.full_name.trim().is_empty() {
            return Err(BookingError::Validation("Passenger name is required".to_string()));
        }
        let code = normalize_seat_code(&passenger.seat_code)
            .ok_or_else(|| BookingError::Validation(format!("Invalid seat code '{}'", passenger.seat_code)))?;
        passenger_seats.insert(code);
    }
    if passenger_seats != seen {
        return Err(BookingError::Validation(
            "Passenger seats do not match the requested seats".to_string(),
        ));
    }

    if request.owner_id.is_none() {
        let contact_ok = request.guest_contact.as_ref().is_some_and(|c| {
            !c.email.expose().trim().is_empty() && !c.phone.expose().trim().is_empty()
        });
        if !contact_ok {
            return Err(BookingError::Validation(
                "Guest bookings need a contact email and phone".to_string(),
            ));
        }
    }

    Ok(seats)
}

/// Maps normalized codes to active seats of the bus, in request order.
fn resolve_seats(bus_seats: Vec<Seat>, codes: &[String]) -> BookingResult<Vec<Seat>> {
    let mut by_code: HashMap<String, Seat> = bus_seats
        .into_iter()
        .filter(|s| s.is_active)
        .filter_map(|s| normalize_seat_code(&s.code).map(|c| (c, s)))
        .collect();

    codes
        .iter()
        .map(|code| {
            by_code
                .remove(code)
                .ok_or_else(|| BookingError::Validation(format!("Unknown seat code {}", code)))
        })
        .collect()
}
