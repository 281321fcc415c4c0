pub mod app_config;
pub mod database;
#[cfg(feature = "kafka")]
pub mod events;
pub mod memory;
pub mod postgres;
pub mod redis_repo;

pub use app_config::Config;
pub use database::DbClient;
#[cfg(feature = "kafka")]
pub use events::{EventProducer, KafkaAuditSink};
pub use memory::MemoryStore;
pub use postgres::{map_sqlx_error, PgBookingStore};
pub use redis_repo::{RedisClient, RedisSeatBroadcaster};
