use coachline_core::models::AuditEntry;
use coachline_core::notify::AuditSink;
use coachline_core::repository::{StoreResult, StoreTx};
use std::sync::Arc;
use tracing::warn;

/// Audit action names.
pub mod actions {
    pub const BOOKING_CREATED: &str = "booking.created";
    pub const PAYMENT_CONFIRMED: &str = "booking.payment_confirmed";
    pub const BOOKING_CANCELLED: &str = "booking.cancelled";
    pub const BOOKING_EXPIRED: &str = "booking.expired";
    pub const BOOKING_COMPLETED: &str = "booking.completed";
    pub const HOLD_EXTENDED: &str = "booking.hold_extended";
    pub const BOOKING_MODIFIED: &str = "booking.modified";
}

/// Append-only lifecycle log.
///
/// Entries are written through the open transaction so they commit or roll
/// back with the change they describe. The optional sink only ever sees
/// committed entries.
#[derive(Clone, Default)]
pub struct AuditTrail {
    sink: Option<Arc<dyn AuditSink>>,
}

impl AuditTrail {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_sink(sink: Arc<dyn AuditSink>) -> Self {
        Self { sink: Some(sink) }
    }

    pub async fn record(&self, tx: &mut dyn StoreTx, entry: AuditEntry) -> StoreResult<AuditEntry> {
        tx.insert_audit(&entry).await?;
        Ok(entry)
    }

    /// Call after commit.
    pub async fn mirror(&self, entry: &AuditEntry) {
        let Some(sink) = &self.sink else {
            return;
        };
        if let Err(e) = sink.mirror(entry).await {
            warn!(action = %entry.action, entry_id = %entry.id, "Audit mirror failed: {}", e);
        }
    }
}
