use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum PaymentStatus {
    Processing,
    Succeeded,
    Canceled,
    Failed,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PaymentLink {
    pub booking_id: Uuid,
    pub url: String,
    pub amount: i64,
    pub currency: String,
    pub created_at: DateTime<Utc>,
}

/// Inbound notification from the payment provider, already authenticated.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PaymentWebhook {
    /// The booking reference we handed the provider as order reference.
    pub order_ref: String,
    pub status: PaymentStatus,
}

impl PaymentWebhook {
    pub fn succeeded(&self) -> bool {
        self.status == PaymentStatus::Succeeded
    }

    /// `Processing` carries no decision yet.
    pub fn is_final(&self) -> bool {
        self.status != PaymentStatus::Processing
    }
}

#[async_trait]
pub trait PaymentCollaborator: Send + Sync {
    /// Ask the provider for a checkout link. Best-effort from the caller's side.
    async fn request_payment_link(
        &self,
        booking_id: Uuid,
        reference: &str,
        amount: i64,
        currency: &str,
    ) -> Result<PaymentLink, Box<dyn std::error::Error + Send + Sync>>;
}
