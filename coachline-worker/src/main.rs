use anyhow::Context;
use coachline_core::notify::SeatBroadcaster;
use coachline_core::SystemClock;
use coachline_store::app_config::Config;
use coachline_store::{DbClient, RedisClient, RedisSeatBroadcaster};
use coachline_worker::{build_manager, start_expiration_sweeper};
use std::sync::Arc;
use tokio_util::sync::CancellationToken;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "coachline_worker=debug,coachline_booking=debug".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    let config = Config::load().context("Failed to load config")?;
    tracing::info!("Starting Coachline worker");

    let db = DbClient::new(&config.database.url, config.database.max_connections)
        .await
        .context("Failed to connect to Postgres")?;
    db.migrate().await.context("Failed to run migrations")?;

    // Rules stored in the database override the file
    let rules = db
        .fetch_business_rules(config.business_rules.clone())
        .await
        .context("Failed to load business rules")?;
    tracing::info!(
        hold_seconds = rules.hold_duration_seconds,
        currency = %rules.currency,
        "Business rules loaded"
    );

    let broadcaster: Option<Arc<dyn SeatBroadcaster>> = match &config.redis {
        Some(redis) => {
            let client = RedisClient::new(&redis.url)
                .await
                .context("Failed to connect to Redis")?;
            Some(Arc::new(RedisSeatBroadcaster::new(client)))
        }
        None => None,
    };

    #[allow(unused_mut)]
    let mut manager = build_manager(
        Arc::new(db.booking_store()),
        Arc::new(SystemClock),
        &rules,
        broadcaster,
    );

    #[cfg(feature = "kafka")]
    if let Some(kafka) = &config.kafka {
        let producer = coachline_store::EventProducer::new(&kafka.brokers)
            .context("Failed to create Kafka producer")?;
        manager = manager.with_audit_sink(Arc::new(coachline_store::KafkaAuditSink::new(
            producer,
            kafka.audit_topic.clone(),
        )));
        tracing::info!(topic = %kafka.audit_topic, "Mirroring audit log to Kafka");
    }

    let shutdown = CancellationToken::new();
    let sweeper = start_expiration_sweeper(Arc::new(manager), &config.sweeper, shutdown.clone());

    tokio::signal::ctrl_c()
        .await
        .context("Failed to listen for shutdown signal")?;
    tracing::info!("Shutting down");
    shutdown.cancel();
    sweeper.await.context("Sweeper task failed")?;

    Ok(())
}
