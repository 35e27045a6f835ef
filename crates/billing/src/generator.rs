//! Recurring invoice generation
//!
//! One pass bills every due subscription once: it inserts a pending invoice built
//! from the subscription and a snapshot of its client, then moves `next_due_date`
//! forward by one period. A subscription that is several periods behind catches up
//! one period per pass.
//!
//! Invoice insert and due-date update are separate writes. If the update fails after
//! the insert succeeded, the next pass bills the same period again.

use std::sync::Arc;

use recurbill_shared::{Invoice, Subscription};
use serde::Serialize;
use time::OffsetDateTime;
use tracing::{debug, error, info, warn};
use uuid::Uuid;

use crate::config::FailurePolicy;
use crate::error::BillingResult;
use crate::scanner::{ClientLookup, DueSubscription, DueSubscriptionScanner};
use crate::store::BillingStore;

/// An invoice produced by a pass
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct GeneratedInvoice {
    pub invoice_id: Uuid,
    pub subscription_id: Uuid,
    pub next_due_date: OffsetDateTime,
}

/// A subscription the pass could not bill
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct FailedSubscription {
    pub subscription_id: Uuid,
    pub error: String,
}

/// Summary of one generation pass
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct GenerationReport {
    pub generated: Vec<GeneratedInvoice>,
    /// Due subscriptions whose client no longer exists. Their due date is left alone.
    pub skipped_missing_client: Vec<Uuid>,
    pub failed: Vec<FailedSubscription>,
    /// Set when the abort policy stopped the pass early
    pub aborted: bool,
}

impl GenerationReport {
    pub fn due_count(&self) -> usize {
        self.generated.len() + self.skipped_missing_client.len() + self.failed.len()
    }
}

pub struct InvoiceGenerator {
    store: Arc<dyn BillingStore>,
    scanner: DueSubscriptionScanner,
    policy: FailurePolicy,
}

impl InvoiceGenerator {
    pub fn new(store: Arc<dyn BillingStore>, policy: FailurePolicy) -> Self {
        let scanner = DueSubscriptionScanner::new(store.clone());
        Self {
            store,
            scanner,
            policy,
        }
    }

    pub fn policy(&self) -> FailurePolicy {
        self.policy
    }

    /// Bill every subscription due at `now`.
    ///
    /// Fails only when the due subscriptions cannot be read. Per-subscription failures
    /// are recorded in the report.
    pub async fn run_pass(&self, now: OffsetDateTime) -> BillingResult<GenerationReport> {
        let due = self.scanner.scan(now).await?;
        let mut report = GenerationReport::default();

        if due.is_empty() {
            debug!(now = %now, "No subscriptions due");
            return Ok(report);
        }

        info!(count = due.len(), now = %now, "Generating recurring invoices");

        for DueSubscription {
            subscription,
            client,
        } in due
        {
            let client = match client {
                ClientLookup::Found(client) => client,
                ClientLookup::Missing => {
                    warn!(
                        subscription_id = %subscription.id,
                        client_id = %subscription.client_id,
                        "Skipping subscription whose client no longer exists"
                    );
                    report.skipped_missing_client.push(subscription.id);
                    continue;
                }
                ClientLookup::Failed(error) => {
                    if self.record_failure(&mut report, subscription.id, error) {
                        break;
                    }
                    continue;
                }
            };

            let invoice = Invoice::from_subscription(&subscription, &client, now);
            match self.bill(&subscription, &invoice).await {
                Ok(next_due_date) => {
                    info!(
                        invoice_id = %invoice.id,
                        subscription_id = %subscription.id,
                        amount_minor = invoice.amount_minor,
                        next_due_date = %next_due_date,
                        "Generated recurring invoice"
                    );
                    report.generated.push(GeneratedInvoice {
                        invoice_id: invoice.id,
                        subscription_id: subscription.id,
                        next_due_date,
                    });
                }
                Err(e) => {
                    if self.record_failure(&mut report, subscription.id, e.to_string()) {
                        break;
                    }
                }
            }
        }

        Ok(report)
    }

    /// Record a subscription that could not be billed. Returns true when the pass
    /// must stop.
    fn record_failure(
        &self,
        report: &mut GenerationReport,
        subscription_id: Uuid,
        error: String,
    ) -> bool {
        error!(
            subscription_id = %subscription_id,
            error = %error,
            "Failed to generate recurring invoice"
        );
        report.failed.push(FailedSubscription {
            subscription_id,
            error,
        });

        if self.policy == FailurePolicy::AbortRemaining {
            warn!("Aborting pass; remaining subscriptions wait for the next run");
            report.aborted = true;
            return true;
        }
        false
    }

    /// Insert the invoice and advance the subscription. Returns the new due date.
    async fn bill(
        &self,
        subscription: &Subscription,
        invoice: &Invoice,
    ) -> BillingResult<OffsetDateTime> {
        let next_due_date = subscription.frequency.advance(subscription.next_due_date)?;

        self.store.insert_invoice(invoice).await?;

        let updated = self
            .store
            .update_subscription_due_date(subscription.id, next_due_date)
            .await?;
        if !updated {
            warn!(
                subscription_id = %subscription.id,
                "Subscription was deleted while its invoice was being generated"
            );
        }

        Ok(next_due_date)
    }
}
