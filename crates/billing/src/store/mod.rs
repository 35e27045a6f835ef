//! Persistence contract for clients, subscriptions and invoices
//!
//! The billing engine only needs a handful of operations from its database:
//! a due-date filter, lookups by id, inserts, and two targeted updates.
//!
//! ## Implementations
//!
//! - [`PgBillingStore`]: Postgres via sqlx
//! - [`InMemoryStore`]: process-local maps, with failure injection for tests

mod memory;
mod postgres;

pub use memory::InMemoryStore;
pub use postgres::PgBillingStore;

use async_trait::async_trait;
use recurbill_shared::{Client, Invoice, Subscription, Transition};
use time::OffsetDateTime;
use uuid::Uuid;

use crate::error::BillingResult;

/// An invoice after the paid transition was applied, with what the transition did
#[derive(Debug, Clone, PartialEq)]
pub struct PaidInvoice {
    pub invoice: Invoice,
    pub transition: Transition,
}

#[async_trait]
pub trait BillingStore: Send + Sync {
    /// Subscriptions with `next_due_date <= now`, oldest due date first
    async fn due_subscriptions(&self, now: OffsetDateTime) -> BillingResult<Vec<Subscription>>;

    async fn find_client(&self, id: Uuid) -> BillingResult<Option<Client>>;

    async fn find_subscription(&self, id: Uuid) -> BillingResult<Option<Subscription>>;

    async fn find_invoice(&self, id: Uuid) -> BillingResult<Option<Invoice>>;

    async fn insert_client(&self, client: &Client) -> BillingResult<()>;

    async fn insert_subscription(&self, subscription: &Subscription) -> BillingResult<()>;

    async fn insert_invoice(&self, invoice: &Invoice) -> BillingResult<()>;

    /// Returns `false` when the subscription no longer exists
    async fn update_subscription_due_date(
        &self,
        id: Uuid,
        next_due_date: OffsetDateTime,
    ) -> BillingResult<bool>;

    /// Apply pending -> paid. Succeeds on an already paid invoice without changing it.
    /// Returns `None` when no invoice has this id.
    async fn mark_invoice_paid(&self, id: Uuid) -> BillingResult<Option<PaidInvoice>>;
}
