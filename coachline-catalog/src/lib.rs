pub mod pricing;
pub mod inventory;

pub use pricing::{FareTable, PricingConfig, PricingEngine};
pub use inventory::{HoldError, SeatHold, SeatHoldCache};
