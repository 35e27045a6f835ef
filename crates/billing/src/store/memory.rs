//! In-memory billing store
//!
//! Keeps records in process-local maps. Used by tests and local runs without a
//! database. Individual operations can be made to fail to exercise the generator's
//! failure policies.

use std::collections::{HashMap, HashSet};
use std::sync::{Mutex, MutexGuard};

use async_trait::async_trait;
use recurbill_shared::{Client, Invoice, Subscription};
use time::OffsetDateTime;
use uuid::Uuid;

use super::{BillingStore, PaidInvoice};
use crate::error::{BillingError, BillingResult};

#[derive(Default)]
struct State {
    clients: HashMap<Uuid, Client>,
    subscriptions: HashMap<Uuid, Subscription>,
    invoices: HashMap<Uuid, Invoice>,
    /// Insertion order of invoices, for `invoices()`
    invoice_order: Vec<Uuid>,
    failing_invoice_descriptions: HashSet<String>,
    failing_due_date_updates: HashSet<Uuid>,
    failing_client_lookups: HashSet<Uuid>,
    fail_scans: bool,
}

#[derive(Default)]
pub struct InMemoryStore {
    state: Mutex<State>,
}

impl InMemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    fn state(&self) -> MutexGuard<'_, State> {
        self.state.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    /// Delete a client, leaving any subscriptions that reference it in place
    pub fn remove_client(&self, id: Uuid) -> Option<Client> {
        self.state().clients.remove(&id)
    }

    /// All invoices in insertion order
    pub fn invoices(&self) -> Vec<Invoice> {
        let state = self.state();
        state
            .invoice_order
            .iter()
            .filter_map(|id| state.invoices.get(id).cloned())
            .collect()
    }

    /// Make `insert_invoice` fail for invoices with this description
    pub fn fail_invoice_inserts_for(&self, description: &str) {
        self.state()
            .failing_invoice_descriptions
            .insert(description.to_string());
    }

    /// Make `update_subscription_due_date` fail for this subscription
    pub fn fail_due_date_updates_for(&self, subscription_id: Uuid) {
        self.state().failing_due_date_updates.insert(subscription_id);
    }

    /// Make `find_client` fail for this client
    pub fn fail_client_lookups_for(&self, client_id: Uuid) {
        self.state().failing_client_lookups.insert(client_id);
    }

    /// Make `due_subscriptions` fail until reset
    pub fn set_fail_scans(&self, fail: bool) {
        self.state().fail_scans = fail;
    }
}

#[async_trait]
impl BillingStore for InMemoryStore {
    async fn due_subscriptions(&self, now: OffsetDateTime) -> BillingResult<Vec<Subscription>> {
        let state = self.state();
        if state.fail_scans {
            return Err(BillingError::Database("injected scan failure".to_string()));
        }

        let mut due: Vec<Subscription> = state
            .subscriptions
            .values()
            .filter(|s| s.is_due(now))
            .cloned()
            .collect();
        due.sort_by(|a, b| {
            a.next_due_date
                .cmp(&b.next_due_date)
                .then_with(|| a.id.cmp(&b.id))
        });

        Ok(due)
    }

    async fn find_client(&self, id: Uuid) -> BillingResult<Option<Client>> {
        let state = self.state();
        if state.failing_client_lookups.contains(&id) {
            return Err(BillingError::Database(format!(
                "injected lookup failure for client {}",
                id
            )));
        }
        Ok(state.clients.get(&id).cloned())
    }

    async fn find_subscription(&self, id: Uuid) -> BillingResult<Option<Subscription>> {
        Ok(self.state().subscriptions.get(&id).cloned())
    }

    async fn find_invoice(&self, id: Uuid) -> BillingResult<Option<Invoice>> {
        Ok(self.state().invoices.get(&id).cloned())
    }

    async fn insert_client(&self, client: &Client) -> BillingResult<()> {
        self.state().clients.insert(client.id, client.clone());
        Ok(())
    }

    async fn insert_subscription(&self, subscription: &Subscription) -> BillingResult<()> {
        self.state()
            .subscriptions
            .insert(subscription.id, subscription.clone());
        Ok(())
    }

    async fn insert_invoice(&self, invoice: &Invoice) -> BillingResult<()> {
        let mut state = self.state();
        if state
            .failing_invoice_descriptions
            .contains(&invoice.description)
        {
            return Err(BillingError::Database(format!(
                "injected insert failure for invoice {}",
                invoice.id
            )));
        }

        if state.invoices.insert(invoice.id, invoice.clone()).is_none() {
            state.invoice_order.push(invoice.id);
        }
        Ok(())
    }

    async fn update_subscription_due_date(
        &self,
        id: Uuid,
        next_due_date: OffsetDateTime,
    ) -> BillingResult<bool> {
        let mut state = self.state();
        if state.failing_due_date_updates.contains(&id) {
            return Err(BillingError::Database(format!(
                "injected update failure for subscription {}",
                id
            )));
        }

        match state.subscriptions.get_mut(&id) {
            Some(subscription) => {
                subscription.next_due_date = next_due_date;
                Ok(true)
            }
            None => Ok(false),
        }
    }

    async fn mark_invoice_paid(&self, id: Uuid) -> BillingResult<Option<PaidInvoice>> {
        let mut state = self.state();
        Ok(state.invoices.get_mut(&id).map(|invoice| {
            let transition = invoice.status.transition_to_paid();
            PaidInvoice {
                invoice: invoice.clone(),
                transition,
            }
        }))
    }
}
