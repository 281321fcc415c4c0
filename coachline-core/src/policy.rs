use chrono::{DateTime, Duration, Utc};
use serde::Serialize;

use crate::models::BookingStatus;

#[derive(Debug, Clone, Serialize, PartialEq, Eq)]
pub struct ModificationPermissions {
    pub can_modify_passengers: bool,
    pub can_modify_seats: bool,
    pub can_modify_contact: bool,
    pub reason: Option<String>,
}

impl ModificationPermissions {
    fn allowed() -> Self {
        Self {
            can_modify_passengers: true,
            can_modify_seats: true,
            can_modify_contact: true,
            reason: None,
        }
    }

    fn denied(reason: String) -> Self {
        Self {
            can_modify_passengers: false,
            can_modify_seats: false,
            can_modify_contact: false,
            reason: Some(reason),
        }
    }

    pub fn any(&self) -> bool {
        self.can_modify_passengers || self.can_modify_seats || self.can_modify_contact
    }
}

/// Decides whether a booking may still be changed. Stateless.
#[derive(Debug, Clone)]
pub struct PermissionPolicy {
    window: Duration,
}

impl PermissionPolicy {
    pub fn new(window: Duration) -> Self {
        Self { window }
    }

    pub fn window(&self) -> Duration {
        self.window
    }

    pub fn evaluate(
        &self,
        status: BookingStatus,
        departure_at: DateTime<Utc>,
        now: DateTime<Utc>,
    ) -> ModificationPermissions {
        if !matches!(status, BookingStatus::Pending | BookingStatus::Paid) {
            return ModificationPermissions::denied(format!(
                "Booking is {} and can no longer be modified",
                status
            ));
        }

        if departure_at - now < self.window {
            return ModificationPermissions::denied(format!(
                "Modifications close {} hours before departure",
                self.window.num_hours()
            ));
        }

        ModificationPermissions::allowed()
    }
}

impl Default for PermissionPolicy {
    fn default() -> Self {
        Self::new(Duration::hours(24))
    }
}
