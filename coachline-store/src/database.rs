use serde_json::Value;
use sqlx::postgres::PgPoolOptions;
use sqlx::{Pool, Postgres};
use std::time::Duration;
use tracing::{info, warn};

use crate::app_config::BusinessRules;
use crate::postgres::PgBookingStore;

#[derive(Clone)]
pub struct DbClient {
    pub pool: Pool<Postgres>,
}

impl DbClient {
    pub async fn new(connection_string: &str, max_connections: u32) -> Result<Self, sqlx::Error> {
        let pool = PgPoolOptions::new()
            .max_connections(max_connections)
            .acquire_timeout(Duration::from_secs(3))
            .connect(connection_string)
            .await?;

        Ok(Self { pool })
    }

    pub async fn migrate(&self) -> Result<(), sqlx::migrate::MigrateError> {
        info!("Running database migrations...");
        sqlx::migrate!("./migrations").run(&self.pool).await?;
        info!("Migrations completed successfully.");
        Ok(())
    }

    pub fn booking_store(&self) -> PgBookingStore {
        PgBookingStore::new(self.pool.clone())
    }

    /// Overlay operator overrides from the `business_rules` table onto the
    /// configured defaults. Rows are `{"value": ...}`.
    pub async fn fetch_business_rules(&self, defaults: BusinessRules) -> Result<BusinessRules, sqlx::Error> {
        let rows: Vec<(String, Value)> = sqlx::query_as("SELECT rule_key, rule_value FROM business_rules")
            .fetch_all(&self.pool)
            .await?;

        let mut rules = defaults;
        for (key, value) in rows {
            if !apply_rule(&mut rules, &key, &value) {
                warn!("Ignoring business rule {} = {}", key, value);
            }
        }
        Ok(rules)
    }
}

/// Returns false when the key is unknown or the value has the wrong shape.
pub(crate) fn apply_rule(rules: &mut BusinessRules, key: &str, value: &Value) -> bool {
    let Some(v) = value.get("value") else {
        return false;
    };

    match key {
        "hold_duration_seconds" => v.as_u64().map(|u| rules.hold_duration_seconds = u).is_some(),
        "owner_cancel_lead_hours" => v.as_i64().map(|h| rules.owner_cancel_lead_hours = h).is_some(),
        "modification_window_hours" => v.as_i64().map(|h| rules.modification_window_hours = h).is_some(),
        "pricing_multiplier" => v.as_f64().map(|f| rules.pricing_multiplier = f).is_some(),
        "pricing_adjustment" => v.as_i64().map(|a| rules.pricing_adjustment = a).is_some(),
        "currency" => v.as_str().map(|s| rules.currency = s.to_string()).is_some(),
        _ => false,
    }
}
