use coachline_core::models::{Seat, SeatClass};
use serde::{Deserialize, Serialize};

/// Per-class surcharge on top of the trip's base fare, in minor currency units.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct FareTable {
    pub standard: i64,
    pub premium: i64,
    pub sleeper: i64,
}

impl FareTable {
    pub fn fare(&self, class: SeatClass) -> i64 {
        match class {
            SeatClass::Standard => self.standard,
            SeatClass::Premium => self.premium,
            SeatClass::Sleeper => self.sleeper,
        }
    }
}

impl Default for FareTable {
    fn default() -> Self {
        Self {
            standard: 0,
            premium: 50_000,
            sleeper: 120_000,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PricingConfig {
    pub fares: FareTable,

    /// Applied to the summed seat prices before the adjustment.
    pub multiplier: f64,

    /// Flat amount added after the multiplier (may be negative).
    pub adjustment: i64,
}

impl Default for PricingConfig {
    fn default() -> Self {
        Self {
            fares: FareTable::default(),
            multiplier: 1.0,
            adjustment: 0,
        }
    }
}

/// Booking price computation
#[derive(Debug, Clone)]
pub struct PricingEngine {
    config: PricingConfig,
}

impl PricingEngine {
    pub fn new(config: PricingConfig) -> Self {
        Self { config }
    }

    pub fn fares(&self) -> &FareTable {
        &self.config.fares
    }

    /// Price of one seat on a trip: base fare plus the class surcharge.
    pub fn seat_price(&self, base_fare: i64, seat: &Seat) -> i64 {
        base_fare + self.config.fares.fare(seat.seat_class)
    }

    /// Total for a set of seats, rounded to the minor unit and floored at zero.
    pub fn quote(&self, base_fare: i64, seats: &[Seat]) -> i64 {
        let subtotal: i64 = seats.iter().map(|s| self.seat_price(base_fare, s)).sum();
        let adjusted = (subtotal as f64 * self.config.multiplier).round() as i64 + self.config.adjustment;
        adjusted.max(0)
    }

    /// Caller-declared totals win over the computed one, still floored at zero.
    pub fn resolve_total(&self, declared: Option<i64>, base_fare: i64, seats: &[Seat]) -> i64 {
        match declared {
            Some(total) => total.max(0),
            None => self.quote(base_fare, seats),
        }
    }

    /// New seat's fare minus old seat's fare. Negative when downgrading.
    pub fn seat_change_delta(&self, from: SeatClass, to: SeatClass) -> i64 {
        self.config.fares.fare(to) - self.config.fares.fare(from)
    }
}

impl Default for PricingEngine {
    fn default() -> Self {
        Self::new(PricingConfig::default())
    }
}
