use async_trait::async_trait;
use chrono::Duration;
use coachline_booking::{BookingLifecycleManager, ExpirationSweeper, LifecycleRules, SweeperConfig};
use coachline_catalog::PricingEngine;
use coachline_core::notify::{CollaboratorError, Notifier, SeatBroadcaster};
use coachline_core::{BookingStore, Clock, PermissionPolicy};
use coachline_store::app_config::{BusinessRules, SweeperSettings};
use std::sync::Arc;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::info;
use uuid::Uuid;

/// Writes owner notifications to the log. Stands in until a delivery
/// channel (mail, push) is wired up.
pub struct LogNotifier;

#[async_trait]
impl Notifier for LogNotifier {
    async fn notify(
        &self,
        user_id: Uuid,
        title: &str,
        body: &str,
        context: serde_json::Value,
    ) -> Result<(), CollaboratorError> {
        info!(%user_id, title, %context, "Notification: {}", body);
        Ok(())
    }
}

pub fn lifecycle_rules(rules: &BusinessRules) -> LifecycleRules {
    LifecycleRules {
        hold_duration: Duration::seconds(rules.hold_duration_seconds.min(u64::from(u32::MAX)) as i64),
        owner_cancel_lead: Duration::hours(rules.owner_cancel_lead_hours),
        currency: rules.currency.clone(),
    }
}

pub fn permission_policy(rules: &BusinessRules) -> PermissionPolicy {
    PermissionPolicy::new(Duration::hours(rules.modification_window_hours))
}

pub fn sweeper_config(settings: &SweeperSettings) -> SweeperConfig {
    SweeperConfig {
        interval: std::time::Duration::from_secs(settings.interval_seconds),
        batch_limit: settings.batch_limit,
        retry_attempts: settings.retry_attempts,
        retry_backoff: std::time::Duration::from_millis(settings.retry_backoff_ms),
    }
}

/// Lifecycle manager wired from business rules. Optional collaborators are
/// added by the caller.
pub fn build_manager(
    store: Arc<dyn BookingStore>,
    clock: Arc<dyn Clock>,
    rules: &BusinessRules,
    broadcaster: Option<Arc<dyn SeatBroadcaster>>,
) -> BookingLifecycleManager {
    let manager = BookingLifecycleManager::new(store, clock)
        .with_rules(lifecycle_rules(rules))
        .with_pricing(PricingEngine::new(rules.pricing()))
        .with_notifier(Arc::new(LogNotifier));

    match broadcaster {
        Some(broadcaster) => manager.with_broadcaster(broadcaster),
        None => manager,
    }
}

pub fn start_expiration_sweeper(
    manager: Arc<BookingLifecycleManager>,
    settings: &SweeperSettings,
    shutdown: CancellationToken,
) -> JoinHandle<()> {
    let sweeper = ExpirationSweeper::new(manager, sweeper_config(settings));
    tokio::spawn(async move { sweeper.run(shutdown).await })
}
