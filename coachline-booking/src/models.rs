use coachline_core::models::{Booking, ModificationRecord, SeatClass, SeatState};
use coachline_shared::Masked;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// One traveller on a new booking, seated by code.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PassengerInput {
    pub full_name: String,
    pub document_id: Option<String>,
    pub seat_code: String,
}

/// Required instead of an owner for guest checkout.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GuestContact {
    pub email: Masked<String>,
    pub phone: Masked<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CreateBookingRequest {
    pub owner_id: Option<Uuid>,
    pub trip_id: Uuid,
    pub seat_codes: Vec<String>,
    pub passengers: Vec<PassengerInput>,
    /// Overrides the computed total when present.
    pub declared_total: Option<i64>,
    pub guest_contact: Option<GuestContact>,
}

#[derive(Debug, Clone, PartialEq)]
pub enum CancelOutcome {
    Cancelled(Booking),
    /// The booking was cancelled before; nothing changed.
    AlreadyCancelled(Booking),
}

impl CancelOutcome {
    pub fn booking(&self) -> &Booking {
        match self {
            Self::Cancelled(b) | Self::AlreadyCancelled(b) => b,
        }
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct PassengerChange {
    pub passenger_id: Uuid,
    pub full_name: Option<String>,
    pub document_id: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SeatChange {
    pub passenger_id: Uuid,
    pub new_seat_code: String,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ContactChange {
    pub email: Option<Masked<String>>,
    pub phone: Option<Masked<String>>,
}

#[derive(Debug, Clone)]
pub struct ModificationResult {
    pub booking: Booking,
    /// Empty when every requested change was a no-op.
    pub records: Vec<ModificationRecord>,
    pub price_delta: i64,
}

impl ModificationResult {
    pub fn is_noop(&self) -> bool {
        self.records.is_empty()
    }
}

/// One seat of a trip as the ledger currently sees it.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SeatMapEntry {
    pub seat_id: Uuid,
    pub code: String,
    pub seat_class: SeatClass,
    pub state: SeatState,
    pub booking_id: Option<Uuid>,
}
