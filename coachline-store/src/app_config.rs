use coachline_catalog::{FareTable, PricingConfig};
use serde::Deserialize;
use std::env;

#[derive(Debug, Deserialize, Clone)]
pub struct Config {
    pub database: DatabaseConfig,
    #[serde(default)]
    pub redis: Option<RedisConfig>,
    #[serde(default)]
    pub kafka: Option<KafkaConfig>,
    #[serde(default)]
    pub business_rules: BusinessRules,
    #[serde(default)]
    pub sweeper: SweeperSettings,
}

#[derive(Debug, Deserialize, Clone)]
pub struct BusinessRules {
    #[serde(default = "default_hold_seconds")]
    pub hold_duration_seconds: u64,
    #[serde(default = "default_cancel_lead_hours")]
    pub owner_cancel_lead_hours: i64,
    #[serde(default = "default_modification_window_hours")]
    pub modification_window_hours: i64,
    #[serde(default = "default_currency")]
    pub currency: String,
    #[serde(default = "default_multiplier")]
    pub pricing_multiplier: f64,
    #[serde(default)]
    pub pricing_adjustment: i64,
    #[serde(default)]
    pub fares: FareTable,
}

fn default_hold_seconds() -> u64 { 900 }
fn default_cancel_lead_hours() -> i64 { 6 }
fn default_modification_window_hours() -> i64 { 24 }
fn default_currency() -> String { "VND".to_string() }
fn default_multiplier() -> f64 { 1.0 }

impl Default for BusinessRules {
    fn default() -> Self {
        Self {
            hold_duration_seconds: default_hold_seconds(),
            owner_cancel_lead_hours: default_cancel_lead_hours(),
            modification_window_hours: default_modification_window_hours(),
            currency: default_currency(),
            pricing_multiplier: default_multiplier(),
            pricing_adjustment: 0,
            fares: FareTable::default(),
        }
    }
}

impl BusinessRules {
    pub fn pricing(&self) -> PricingConfig {
        PricingConfig {
            fares: self.fares.clone(),
            multiplier: self.pricing_multiplier,
            adjustment: self.pricing_adjustment,
        }
    }
}

#[derive(Debug, Deserialize, Clone)]
pub struct SweeperSettings {
    #[serde(default = "default_interval_seconds")]
    pub interval_seconds: u64,
    #[serde(default = "default_batch_limit")]
    pub batch_limit: i64,
    #[serde(default = "default_retry_attempts")]
    pub retry_attempts: u32,
    #[serde(default = "default_retry_backoff_ms")]
    pub retry_backoff_ms: u64,
}

fn default_interval_seconds() -> u64 { 120 }
fn default_batch_limit() -> i64 { 500 }
fn default_retry_attempts() -> u32 { 3 }
fn default_retry_backoff_ms() -> u64 { 200 }

impl Default for SweeperSettings {
    fn default() -> Self {
        Self {
            interval_seconds: default_interval_seconds(),
            batch_limit: default_batch_limit(),
            retry_attempts: default_retry_attempts(),
            retry_backoff_ms: default_retry_backoff_ms(),
        }
    }
}

#[derive(Debug, Deserialize, Clone)]
pub struct DatabaseConfig {
    pub url: String,
    #[serde(default = "default_max_connections")]
    pub max_connections: u32,
}

fn default_max_connections() -> u32 { 5 }

#[derive(Debug, Deserialize, Clone)]
pub struct RedisConfig {
    pub url: String,
}

#[derive(Debug, Deserialize, Clone)]
pub struct KafkaConfig {
    pub brokers: String,
    #[serde(default = "default_audit_topic")]
    pub audit_topic: String,
}

fn default_audit_topic() -> String { "coachline.audit".to_string() }

impl Config {
    pub fn load() -> Result<Self, config::ConfigError> {
        let run_mode = env::var("RUN_MODE").unwrap_or_else(|_| "development".into());

        let s = config::Config::builder()
            .add_source(config::File::with_name("config/default"))
            .add_source(config::File::with_name(&format!("config/{}", run_mode)).required(false))
            // Not checked in
            .add_source(config::File::with_name("config/local").required(false))
            // e.g. COACHLINE__DATABASE__URL
            .add_source(config::Environment::with_prefix("COACHLINE").separator("__"))
            .build()?;

        s.try_deserialize()
    }

    /// Parse a single TOML document, without environment overrides.
    pub fn from_toml(source: &str) -> Result<Self, config::ConfigError> {
        config::Config::builder()
            .add_source(config::File::from_str(source, config::FileFormat::Toml))
            .build()?
            .try_deserialize()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_minimal_config_gets_defaults() {
        let config = Config::from_toml(
            r#"
            [database]
            url = "postgres://localhost/coachline"
            "#,
        )
        .expect("Failed to parse config");

        assert_eq!(config.database.max_connections, 5);
        assert!(config.redis.is_none());
        assert_eq!(config.business_rules.hold_duration_seconds, 900);
        assert_eq!(config.business_rules.owner_cancel_lead_hours, 6);
        assert_eq!(config.business_rules.modification_window_hours, 24);
        assert_eq!(config.sweeper.interval_seconds, 120);
        assert_eq!(config.sweeper.retry_attempts, 3);
    }

    #[test]
    fn test_business_rules_override() {
        let config = Config::from_toml(
            r#"
            [database]
            url = "postgres://localhost/coachline"

            [business_rules]
            hold_duration_seconds = 600
            pricing_multiplier = 1.1

            [business_rules.fares]
            standard = 0
            premium = 20000
            sleeper = 90000
            "#,
        )
        .expect("Failed to parse config");

        let rules = &config.business_rules;
        assert_eq!(rules.hold_duration_seconds, 600);
        assert_eq!(rules.currency, "VND");
        let pricing = rules.pricing();
        assert_eq!(pricing.fares.premium, 20_000);
        assert!((pricing.multiplier - 1.1).abs() < f64::EPSILON);
    }
}
