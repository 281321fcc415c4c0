use coachline_core::models::Booking;
use coachline_core::payment::PaymentWebhook;
use coachline_core::{BookingError, BookingResult};
use std::sync::Arc;
use tracing::{debug, info};

use crate::manager::BookingLifecycleManager;

#[derive(Debug, Clone, PartialEq)]
pub enum WebhookOutcome {
    Confirmed(Booking),
    Cancelled(Booking),
    /// Non-final status; nothing to do yet.
    Ignored,
}

/// Maps payment-provider callbacks onto lifecycle transitions.
pub struct PaymentOrchestrator {
    manager: Arc<BookingLifecycleManager>,
}

impl PaymentOrchestrator {
    pub fn new(manager: Arc<BookingLifecycleManager>) -> Self {
        Self { manager }
    }

    /// `order_ref` is the booking reference handed to the provider.
    /// Replays are harmless: both transitions are idempotent.
    pub async fn on_payment_webhook(&self, webhook: &PaymentWebhook) -> BookingResult<WebhookOutcome> {
        if !webhook.is_final() {
            debug!(order_ref = %webhook.order_ref, "Payment still processing");
            return Ok(WebhookOutcome::Ignored);
        }

        let booking = self
            .manager
            .store()
            .find_booking_by_reference(&webhook.order_ref)
            .await?
            .ok_or_else(|| BookingError::not_found("Booking", &webhook.order_ref))?;

        if webhook.succeeded() {
            let paid = self.manager.confirm_payment(booking.id).await?;
            Ok(WebhookOutcome::Confirmed(paid))
        } else {
            info!(reference = %booking.reference, status = ?webhook.status, "Payment failed, cancelling booking");
            let outcome = self.manager.cancel_booking(booking.id, Some("payment failed")).await?;
            Ok(WebhookOutcome::Cancelled(outcome.booking().clone()))
        }
    }
}
