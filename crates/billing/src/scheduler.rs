//! Scheduled execution of the recurring invoice pass
//!
//! [`BillingScheduler::run`] waits on a [`Ticker`] and runs one guarded pass per
//! tick. A pass that cannot take the job lock is skipped. A pass that fails is
//! logged and the scheduler keeps waiting for the next tick.

use std::sync::Arc;

use async_trait::async_trait;
use tokio::sync::mpsc;
use tracing::{error, info, warn};

use crate::clock::Clock;
use crate::generator::{GenerationReport, InvoiceGenerator};
use crate::lock::{JobLock, RECURRING_INVOICES_JOB};

/// Source of "run now" signals
#[async_trait]
pub trait Ticker: Send {
    /// Wait for the next tick. `None` means no more ticks will come.
    async fn tick(&mut self) -> Option<()>;
}

/// Ticker fed through a channel, e.g. by a cron job
pub struct ChannelTicker {
    rx: mpsc::Receiver<()>,
}

impl ChannelTicker {
    /// Create a ticker and its sender.
    ///
    /// The channel holds one pending tick. Senders should use `try_send` so ticks
    /// that arrive while a pass is running collapse into a single follow-up run.
    pub fn channel() -> (mpsc::Sender<()>, Self) {
        let (tx, rx) = mpsc::channel(1);
        (tx, Self { rx })
    }
}

#[async_trait]
impl Ticker for ChannelTicker {
    async fn tick(&mut self) -> Option<()> {
        self.rx.recv().await
    }
}

/// Result of one scheduled pass
#[derive(Debug, Clone, PartialEq)]
pub enum PassOutcome {
    Completed(GenerationReport),
    /// Another pass held the job lock
    Skipped,
    Failed(String),
}

pub struct BillingScheduler {
    generator: InvoiceGenerator,
    clock: Arc<dyn Clock>,
    lock: Arc<dyn JobLock>,
}

impl BillingScheduler {
    pub fn new(generator: InvoiceGenerator, clock: Arc<dyn Clock>, lock: Arc<dyn JobLock>) -> Self {
        Self {
            generator,
            clock,
            lock,
        }
    }

    /// Run passes until the ticker is exhausted
    pub async fn run<T: Ticker>(&self, mut ticker: T) {
        info!(policy = ?self.generator.policy(), "Billing scheduler started");

        while ticker.tick().await.is_some() {
            self.run_once().await;
        }

        info!("Billing scheduler stopped: tick source closed");
    }

    /// Run a single pass under the job lock
    pub async fn run_once(&self) -> PassOutcome {
        match self.lock.try_acquire(RECURRING_INVOICES_JOB).await {
            Ok(true) => {}
            Ok(false) => {
                warn!("Recurring invoice pass still in progress, skipping this run");
                return PassOutcome::Skipped;
            }
            Err(e) => {
                error!(error = %e, "Could not acquire recurring invoice job lock");
                return PassOutcome::Failed(e.to_string());
            }
        }

        let now = self.clock.now();
        let outcome = match self.generator.run_pass(now).await {
            Ok(report) => {
                log_pass_results(&report);
                PassOutcome::Completed(report)
            }
            Err(e) => {
                error!(error = %e, "Recurring invoice pass failed");
                PassOutcome::Failed(e.to_string())
            }
        };

        if let Err(e) = self.lock.release(RECURRING_INVOICES_JOB).await {
            error!(error = %e, "Failed to release recurring invoice job lock");
        }

        outcome
    }
}

fn log_pass_results(report: &GenerationReport) {
    if report.due_count() == 0 {
        return;
    }

    if report.failed.is_empty() && report.skipped_missing_client.is_empty() {
        info!(
            generated = report.generated.len(),
            "Recurring invoice pass completed"
        );
    } else {
        warn!(
            generated = report.generated.len(),
            skipped = report.skipped_missing_client.len(),
            failed = report.failed.len(),
            aborted = report.aborted,
            "Recurring invoice pass completed with problems"
        );
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::clock::ManualClock;
    use crate::config::FailurePolicy;
    use crate::lock::LocalJobLock;
    use crate::store::{BillingStore, InMemoryStore};
    use recurbill_shared::{Client, Frequency, Subscription};
    use std::collections::VecDeque;
    use time::macros::datetime;
    use time::Duration;
    use uuid::Uuid;

    /// Ticker that advances a manual clock by one day before each tick
    struct DailyTicker {
        clock: Arc<ManualClock>,
        remaining: usize,
    }

    #[async_trait]
    impl Ticker for DailyTicker {
        async fn tick(&mut self) -> Option<()> {
            if self.remaining == 0 {
                return None;
            }
            self.remaining -= 1;
            self.clock.advance(Duration::days(1));
            Some(())
        }
    }

    struct ScriptedTicker(VecDeque<()>);

    #[async_trait]
    impl Ticker for ScriptedTicker {
        async fn tick(&mut self) -> Option<()> {
            self.0.pop_front()
        }
    }

    async fn seed(store: &InMemoryStore, due: time::OffsetDateTime) -> Subscription {
        let client = Client {
            id: Uuid::new_v4(),
            user_id: Uuid::new_v4(),
            name: "Globex".to_string(),
            email: "ap@globex.test".to_string(),
            phone: None,
            created_at: datetime!(2024-01-01 00:00 UTC),
        };
        store.insert_client(&client).await.unwrap();
        let subscription = Subscription {
            id: Uuid::new_v4(),
            user_id: client.user_id,
            client_id: client.id,
            amount_minor: 250_000,
            description: "Support plan".to_string(),
            frequency: Frequency::Monthly,
            next_due_date: due,
            created_at: datetime!(2024-01-01 00:00 UTC),
        };
        store.insert_subscription(&subscription).await.unwrap();
        subscription
    }

    fn scheduler(
        store: Arc<InMemoryStore>,
        clock: Arc<ManualClock>,
        lock: Arc<LocalJobLock>,
    ) -> BillingScheduler {
        BillingScheduler::new(
            InvoiceGenerator::new(store, FailurePolicy::Isolate),
            clock,
            lock,
        )
    }

    #[tokio::test]
    async fn test_run_once_skips_when_lock_is_held() {
        let store = Arc::new(InMemoryStore::new());
        seed(&store, datetime!(2024-02-01 00:00 UTC)).await;
        let clock = Arc::new(ManualClock::new(datetime!(2024-02-01 03:00 UTC)));
        let lock = Arc::new(LocalJobLock::new());
        let scheduler = scheduler(store.clone(), clock, lock.clone());

        assert!(lock.try_acquire(RECURRING_INVOICES_JOB).await.unwrap());
        assert_eq!(scheduler.run_once().await, PassOutcome::Skipped);
        assert!(store.invoices().is_empty());

        lock.release(RECURRING_INVOICES_JOB).await.unwrap();
        assert!(matches!(scheduler.run_once().await, PassOutcome::Completed(_)));
        assert_eq!(store.invoices().len(), 1);
    }

    #[tokio::test]
    async fn test_failed_pass_releases_lock_and_scheduler_keeps_going() {
        let store = Arc::new(InMemoryStore::new());
        seed(&store, datetime!(2024-02-01 00:00 UTC)).await;
        let clock = Arc::new(ManualClock::new(datetime!(2024-02-01 03:00 UTC)));
        let lock = Arc::new(LocalJobLock::new());
        let scheduler = scheduler(store.clone(), clock, lock.clone());

        store.set_fail_scans(true);
        assert!(matches!(scheduler.run_once().await, PassOutcome::Failed(_)));
        assert!(!lock.is_held(RECURRING_INVOICES_JOB));

        store.set_fail_scans(false);
        scheduler
            .run(ScriptedTicker(VecDeque::from(vec![(), ()])))
            .await;
        assert_eq!(store.invoices().len(), 1);
    }

    #[tokio::test]
    async fn test_daily_ticks_bill_each_period_once() {
        let store = Arc::new(InMemoryStore::new());
        let subscription = seed(&store, datetime!(2024-01-31 00:00 UTC)).await;
        let clock = Arc::new(ManualClock::new(datetime!(2024-01-30 03:00 UTC)));
        let lock = Arc::new(LocalJobLock::new());
        let scheduler = scheduler(store.clone(), clock.clone(), lock);

        // Jan 31 through Apr 9
        scheduler
            .run(DailyTicker {
                clock: clock.clone(),
                remaining: 70,
            })
            .await;

        // Billed on Jan 31, Mar 2 and Apr 2
        assert_eq!(store.invoices().len(), 3);
        let next = store
            .find_subscription(subscription.id)
            .await
            .unwrap()
            .unwrap()
            .next_due_date;
        assert_eq!(next, datetime!(2024-05-02 00:00 UTC));
    }

    #[tokio::test]
    async fn test_channel_ticker_coalesces_pending_ticks() {
        let (tx, mut ticker) = ChannelTicker::channel();

        assert!(tx.try_send(()).is_ok());
        assert!(tx.try_send(()).is_err());
        assert_eq!(ticker.tick().await, Some(()));

        drop(tx);
        assert_eq!(ticker.tick().await, None);
    }
}
