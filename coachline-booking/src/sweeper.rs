use coachline_core::BookingResult;
use std::sync::Arc;
use std::time::Duration;
use tokio::time::MissedTickBehavior;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};
use uuid::Uuid;

use crate::manager::BookingLifecycleManager;

#[derive(Debug, Clone)]
pub struct SweeperConfig {
    pub interval: Duration,
    /// Most candidates looked at per tick.
    pub batch_limit: i64,
    /// Extra attempts after a transient failure.
    pub retry_attempts: u32,
    /// Doubled after each failed attempt.
    pub retry_backoff: Duration,
}

impl Default for SweeperConfig {
    fn default() -> Self {
        Self {
            interval: Duration::from_secs(120),
            batch_limit: 500,
            retry_attempts: 3,
            retry_backoff: Duration::from_millis(200),
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SweepReport {
    pub candidates: usize,
    pub expired: Vec<Uuid>,
    /// Already handled elsewhere, or extended since selection.
    pub skipped: usize,
    pub failed: Vec<Uuid>,
    /// Lapsed viewer holds dropped from the seat-hold cache.
    pub purged_holds: usize,
}

/// Periodically expires overdue holds.
///
/// Holds no lock of its own: any number of sweepers may run against the same
/// store, `expire_if_due` decides which one wins each booking.
pub struct ExpirationSweeper {
    manager: Arc<BookingLifecycleManager>,
    config: SweeperConfig,
}

impl ExpirationSweeper {
    pub fn new(manager: Arc<BookingLifecycleManager>, config: SweeperConfig) -> Self {
        Self { manager, config }
    }

    /// One pass over the current candidates. Fails only if the candidate
    /// query itself fails; per-booking failures land in the report.
    pub async fn sweep_once(&self) -> BookingResult<SweepReport> {
        let now = self.manager.now();
        let purged_holds = self.manager.purge_stale_holds(now);
        let candidates = self
            .manager
            .store()
            .find_overdue_pending(now, self.config.batch_limit)
            .await?;

        let mut report = SweepReport {
            candidates: candidates.len(),
            purged_holds,
            ..SweepReport::default()
        };

        for booking_id in candidates {
            match self.expire_with_retry(booking_id).await {
                Ok(true) => report.expired.push(booking_id),
                Ok(false) => report.skipped += 1,
                Err(e) => {
                    error!(booking_id = %booking_id, "Giving up on expiring booking: {}", e);
                    report.failed.push(booking_id);
                }
            }
        }

        Ok(report)
    }

    async fn expire_with_retry(&self, booking_id: Uuid) -> BookingResult<bool> {
        let mut attempt = 0;
        loop {
            match self.manager.expire_if_due(booking_id).await {
                Err(e) if e.is_transient() && attempt < self.config.retry_attempts => {
                    let backoff = self.config.retry_backoff * 2u32.saturating_pow(attempt);
                    attempt += 1;
                    warn!(booking_id = %booking_id, attempt, "Transient failure expiring booking, retrying in {:?}: {}", backoff, e);
                    tokio::time::sleep(backoff).await;
                }
                result => return result,
            }
        }
    }

    /// Sweeps every `interval` until `shutdown` is cancelled. The first sweep
    /// runs immediately.
    pub async fn run(&self, shutdown: CancellationToken) {
        let mut ticker = tokio::time::interval(self.config.interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
        info!(interval = ?self.config.interval, "Expiration sweeper started");

        loop {
            tokio::select! {
                _ = shutdown.cancelled() => {
                    info!("Expiration sweeper stopped");
                    return;
                }
                _ = ticker.tick() => {
                    match self.sweep_once().await {
                        Ok(report) if !report.expired.is_empty() || !report.failed.is_empty() => {
                            info!(
                                candidates = report.candidates,
                                expired = report.expired.len(),
                                skipped = report.skipped,
                                failed = report.failed.len(),
                                "Sweep finished"
                            );
                        }
                        Ok(report) => debug!(candidates = report.candidates, "Sweep finished, nothing expired"),
                        Err(e) => error!("Sweep failed: {}", e),
                    }
                }
            }
        }
    }
}
