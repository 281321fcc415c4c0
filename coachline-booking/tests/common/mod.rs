#![allow(dead_code)]

use async_trait::async_trait;
use chrono::{Duration, Utc};
use coachline_booking::{
    BookingLifecycleManager, CreateBookingRequest, ExpirationSweeper, GuestContact, PassengerInput,
    SweeperConfig,
};
use coachline_catalog::{FareTable, PricingConfig, PricingEngine};
use coachline_core::models::{AuditEntry, Seat, SeatClass, Trip};
use coachline_core::notify::{AuditSink, CollaboratorError, Notifier};
use coachline_core::payment::{PaymentCollaborator, PaymentLink};
use coachline_core::ManualClock;
use coachline_shared::Masked;
use coachline_store::MemoryStore;
use std::sync::{Arc, Mutex};
use uuid::Uuid;

pub const BASE_FARE: i64 = 100_000;

#[derive(Default)]
pub struct RecordingNotifier {
    pub sent: Mutex<Vec<(Uuid, String)>>,
}

impl RecordingNotifier {
    pub fn titles(&self) -> Vec<String> {
        self.sent.lock().unwrap().iter().map(|(_, t)| t.clone()).collect()
    }
}

#[async_trait]
impl Notifier for RecordingNotifier {
    async fn notify(
        &self,
        user_id: Uuid,
        title: &str,
        _body: &str,
        _context: serde_json::Value,
    ) -> Result<(), CollaboratorError> {
        self.sent.lock().unwrap().push((user_id, title.to_string()));
        Ok(())
    }
}

#[derive(Default)]
pub struct RecordingAuditSink {
    pub mirrored: Mutex<Vec<String>>,
}

#[async_trait]
impl AuditSink for RecordingAuditSink {
    async fn mirror(&self, entry: &AuditEntry) -> Result<(), CollaboratorError> {
        self.mirrored.lock().unwrap().push(entry.action.clone());
        Ok(())
    }
}

pub struct StubPayments {
    pub fail: bool,
}

#[async_trait]
impl PaymentCollaborator for StubPayments {
    async fn request_payment_link(
        &self,
        booking_id: Uuid,
        reference: &str,
        amount: i64,
        currency: &str,
    ) -> Result<PaymentLink, Box<dyn std::error::Error + Send + Sync>> {
        if self.fail {
            return Err("gateway unreachable".into());
        }
        Ok(PaymentLink {
            booking_id,
            url: format!("https://pay.example.com/checkout/{}", reference),
            amount,
            currency: currency.to_string(),
            created_at: Utc::now(),
        })
    }
}

pub struct Fixture {
    pub store: MemoryStore,
    pub clock: Arc<ManualClock>,
    pub notifier: Arc<RecordingNotifier>,
    pub audit_sink: Arc<RecordingAuditSink>,
    pub manager: Arc<BookingLifecycleManager>,
    pub trip: Trip,
    pub seats: Vec<Seat>,
}

impl Fixture {
    pub async fn new() -> Self {
        Self::build(|m| m).await
    }

    pub async fn with_payments(fail: bool) -> Self {
        Self::build(move |m| m.with_payments(Arc::new(StubPayments { fail }))).await
    }

    pub async fn build(customize: impl FnOnce(BookingLifecycleManager) -> BookingLifecycleManager) -> Self {
        let store = MemoryStore::new();
        let clock = Arc::new(ManualClock::new(Utc::now()));
        let start = Utc::now();

        let trip = Trip {
            id: Uuid::new_v4(),
            bus_id: Uuid::new_v4(),
            departure_at: start + Duration::days(3),
            arrival_at: start + Duration::days(3) + Duration::hours(8),
            base_fare: BASE_FARE,
        };
        let seat = |code: &str, seat_class: SeatClass| Seat {
            id: Uuid::new_v4(),
            bus_id: trip.bus_id,
            code: code.to_string(),
            seat_class,
            is_active: true,
        };
        let seats = vec![
            seat("1A", SeatClass::Standard),
            seat("1B", SeatClass::Standard),
            seat("2A", SeatClass::Premium),
            seat("2B", SeatClass::Sleeper),
        ];
        store.add_trip(trip.clone()).await;
        store.add_seats(seats.clone()).await;

        let notifier = Arc::new(RecordingNotifier::default());
        let audit_sink = Arc::new(RecordingAuditSink::default());
        let pricing = PricingEngine::new(PricingConfig {
            fares: FareTable {
                standard: 0,
                premium: 50_000,
                sleeper: 120_000,
            },
            multiplier: 1.0,
            adjustment: 0,
        });

        let manager = BookingLifecycleManager::new(Arc::new(store.clone()), clock.clone())
            .with_pricing(pricing)
            .with_notifier(notifier.clone())
            .with_audit_sink(audit_sink.clone());

        Self {
            store,
            clock,
            notifier,
            audit_sink,
            manager: Arc::new(customize(manager)),
            trip,
            seats,
        }
    }

    pub fn seat(&self, code: &str) -> &Seat {
        self.seats.iter().find(|s| s.code == code).unwrap()
    }

    pub fn sweeper(&self, retry_attempts: u32) -> ExpirationSweeper {
        ExpirationSweeper::new(
            self.manager.clone(),
            SweeperConfig {
                interval: std::time::Duration::from_millis(10),
                batch_limit: 100,
                retry_attempts,
                retry_backoff: std::time::Duration::from_millis(1),
            },
        )
    }
}

pub fn request(owner: Option<Uuid>, trip_id: Uuid, seats: &[&str]) -> CreateBookingRequest {
    CreateBookingRequest {
        owner_id: owner,
        trip_id,
        seat_codes: seats.iter().map(|s| s.to_string()).collect(),
        passengers: seats
            .iter()
            .enumerate()
            .map(|(i, seat)| PassengerInput {
                full_name: format!("Passenger {}", i + 1),
                document_id: None,
                seat_code: seat.to_string(),
            })
            .collect(),
        declared_total: None,
        guest_contact: None,
    }
}

pub fn guest_contact() -> GuestContact {
    GuestContact {
        email: Masked::new("guest@example.com".to_string()),
        phone: Masked::new("+84901234567".to_string()),
    }
}
