pub mod clock;
pub mod models;
pub mod notify;
pub mod payment;
pub mod policy;
pub mod repository;
pub mod seat_code;

pub use clock::{Clock, ManualClock, SystemClock};
pub use models::{
    AuditEntry, Booking, BookingStatus, ModificationRecord, ModificationType, PassengerDetail,
    Seat, SeatClass, SeatOccupancy, SeatState, Trip,
};
pub use policy::{ModificationPermissions, PermissionPolicy};
pub use repository::{BookingQuery, BookingStore, StoreError, StoreResult, StoreTx};

/// Coarse classification of a [`BookingError`], used by callers to pick a response.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    Validation,
    NotFound,
    Conflict,
    PolicyViolation,
    Transient,
    Internal,
}

#[derive(Debug, thiserror::Error)]
pub enum BookingError {
    #[error("Validation failed: {0}")]
    Validation(String),

    #[error("{entity} not found: {id}")]
    NotFound { entity: &'static str, id: String },

    #[error("Seats unavailable: {}", seat_codes.join(", "))]
    SeatsUnavailable { seat_codes: Vec<String> },

    #[error("Conflict: {0}")]
    Conflict(String),

    #[error("Booking {reference} is {status}: {reason}")]
    PolicyViolation {
        reference: String,
        status: BookingStatus,
        reason: String,
    },

    #[error("Hold on booking {reference} expired; payment cannot be confirmed")]
    HoldExpired { reference: String },

    #[error("Storage unavailable")]
    Store(#[from] StoreError),
}

impl BookingError {
    pub fn not_found(entity: &'static str, id: impl ToString) -> Self {
        Self::NotFound {
            entity,
            id: id.to_string(),
        }
    }

    pub fn policy(booking: &Booking, reason: impl Into<String>) -> Self {
        Self::PolicyViolation {
            reference: booking.reference.clone(),
            status: booking.status,
            reason: reason.into(),
        }
    }

    pub fn kind(&self) -> ErrorKind {
        match self {
            Self::Validation(_) => ErrorKind::Validation,
            Self::NotFound { .. } => ErrorKind::NotFound,
            Self::SeatsUnavailable { .. } | Self::Conflict(_) => ErrorKind::Conflict,
            Self::PolicyViolation { .. } | Self::HoldExpired { .. } => ErrorKind::PolicyViolation,
            Self::Store(StoreError::Transient(_)) => ErrorKind::Transient,
            Self::Store(StoreError::Conflict(_)) => ErrorKind::Conflict,
            Self::Store(_) => ErrorKind::Internal,
        }
    }

    pub fn is_transient(&self) -> bool {
        self.kind() == ErrorKind::Transient
    }
}

pub type BookingResult<T> = Result<T, BookingError>;
