#![cfg_attr(test, allow(clippy::unwrap_used))]
#![cfg_attr(test, allow(clippy::expect_used))]

//! Recurbill Background Worker
//!
//! Runs the recurring invoice pass on a cron schedule in the configured timezone
//! (daily at 03:00 Asia/Kolkata by default).

mod config;

use std::sync::Arc;

use recurbill_billing::{
    BillingScheduler, BillingService, ChannelTicker, JobLock, LocalJobLock, RedisJobLock,
    SystemClock,
};
use recurbill_shared::{create_pool, run_migrations};
use tokio::sync::mpsc::{error::TrySendError, Sender};
use tokio_cron_scheduler::{Job, JobScheduler};
use tracing::{error, info, warn};

use crate::config::WorkerConfig;

/// Queue a billing pass, dropping the tick if one is already waiting
fn request_pass(tx: &Sender<()>, source: &str) {
    match tx.try_send(()) {
        Ok(()) => info!(source = source, "Recurring invoice pass requested"),
        Err(TrySendError::Full(())) => {
            warn!(source = source, "A recurring invoice pass is already queued - tick dropped");
        }
        Err(TrySendError::Closed(())) => {
            error!(source = source, "Billing scheduler has stopped - tick dropped");
        }
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Initialize logging
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .init();

    // Load environment
    dotenvy::dotenv().ok();

    info!("Starting Recurbill Worker");

    let config = WorkerConfig::from_env()?;

    // Create database pool
    let pool = create_pool(&config.database_url, config.database_max_connections).await?;
    run_migrations(&pool).await?;
    info!("Database pool created and migrations applied");

    // Create billing service
    let billing = BillingService::from_env(pool)?;

    // Job lock: shared through Redis when available
    let lock: Arc<dyn JobLock> = match &config.redis_url {
        Some(url) => {
            let lock = RedisJobLock::connect(url, config.billing.lock_ttl).await?;
            info!(ttl_secs = config.billing.lock_ttl.as_secs(), "Using Redis job lock");
            Arc::new(lock)
        }
        None => {
            warn!("REDIS_URL not set - job lock only guards this process");
            Arc::new(LocalJobLock::new())
        }
    };

    let billing_scheduler = BillingScheduler::new(
        billing.invoice_generator(config.billing.failure_policy),
        Arc::new(SystemClock),
        lock,
    );
    let (tick_tx, ticker) = ChannelTicker::channel();

    // Create scheduler
    let mut scheduler = JobScheduler::new().await?;

    let cron_tx = tick_tx.clone();
    let job = Job::new_async_tz(
        config.billing_cron.as_str(),
        config.billing_timezone,
        move |_uuid, _l| {
            let tx = cron_tx.clone();
            Box::pin(async move {
                request_pass(&tx, "cron");
            })
        },
    )?;
    let job_id = scheduler.add(job).await?;
    info!(
        cron = %config.billing_cron,
        timezone = %config.billing_timezone,
        "Scheduled: Recurring invoice generation"
    );

    scheduler.start().await?;

    let next_run: Option<chrono::DateTime<chrono::Utc>> =
        scheduler.next_tick_for_job(job_id).await?;
    if let Some(next_run) = next_run {
        info!(
            next_run = %next_run.with_timezone(&config.billing_timezone),
            "Next recurring invoice pass"
        );
    }

    if config.run_on_startup {
        request_pass(&tick_tx, "startup");
    }
    drop(tick_tx);

    info!("Worker started successfully");

    tokio::select! {
        _ = billing_scheduler.run(ticker) => {
            warn!("Billing scheduler exited");
        }
        result = tokio::signal::ctrl_c() => {
            if let Err(e) = result {
                error!(error = %e, "Failed to listen for shutdown signal");
            }
            info!("Shutdown signal received");
        }
    }

    scheduler.shutdown().await?;
    info!("Worker stopped");

    Ok(())
}
