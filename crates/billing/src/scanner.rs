//! Due-subscription scan

use std::sync::Arc;

use recurbill_shared::{Client, Subscription};
use time::OffsetDateTime;
use tracing::{debug, warn};

use crate::error::BillingResult;
use crate::store::BillingStore;

/// Outcome of looking up the client of a due subscription
#[derive(Debug, Clone, PartialEq)]
pub enum ClientLookup {
    Found(Client),
    /// The client was deleted
    Missing,
    /// The store could not answer; only this subscription is affected
    Failed(String),
}

/// A subscription due for billing, with the result of its client lookup
#[derive(Debug, Clone, PartialEq)]
pub struct DueSubscription {
    pub subscription: Subscription,
    pub client: ClientLookup,
}

/// Finds subscriptions whose next charge date has arrived.
///
/// Uses `next_due_date <= now`, so anything missed while the scheduler was down is
/// picked up by the next scan. Only the due-subscription query can fail the scan;
/// client lookup errors are reported per subscription.
#[derive(Clone)]
pub struct DueSubscriptionScanner {
    store: Arc<dyn BillingStore>,
}

impl DueSubscriptionScanner {
    pub fn new(store: Arc<dyn BillingStore>) -> Self {
        Self { store }
    }

    pub async fn scan(&self, now: OffsetDateTime) -> BillingResult<Vec<DueSubscription>> {
        let subscriptions = self.store.due_subscriptions(now).await?;

        let mut due = Vec::with_capacity(subscriptions.len());
        for subscription in subscriptions {
            let client = match self.store.find_client(subscription.client_id).await {
                Ok(Some(client)) => ClientLookup::Found(client),
                Ok(None) => {
                    debug!(
                        subscription_id = %subscription.id,
                        client_id = %subscription.client_id,
                        "Due subscription references a missing client"
                    );
                    ClientLookup::Missing
                }
                Err(e) => {
                    warn!(
                        subscription_id = %subscription.id,
                        client_id = %subscription.client_id,
                        error = %e,
                        "Client lookup failed for due subscription"
                    );
                    ClientLookup::Failed(e.to_string())
                }
            };
            due.push(DueSubscription {
                subscription,
                client,
            });
        }

        Ok(due)
    }
}
