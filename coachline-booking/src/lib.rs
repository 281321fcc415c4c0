pub mod audit;
pub mod changes;
pub mod ledger;
pub mod manager;
pub mod models;
pub mod orchestrator;
pub mod sweeper;

pub use audit::AuditTrail;
pub use changes::ModificationEngine;
pub use ledger::{ClaimConflict, ClaimOutcome, ReassignOutcome, SeatLedger};
pub use manager::{BookingLifecycleManager, LifecycleRules};
pub use models::{
    CancelOutcome, ContactChange, CreateBookingRequest, GuestContact, ModificationResult,
    PassengerChange, PassengerInput, SeatChange, SeatMapEntry,
};
pub use orchestrator::{PaymentOrchestrator, WebhookOutcome};
pub use sweeper::{ExpirationSweeper, SweepReport, SweeperConfig};
