// Test code patterns (expected in test files):
#![cfg_attr(test, allow(clippy::unwrap_used))]
#![cfg_attr(test, allow(clippy::expect_used))]

//! Recurbill Billing Engine
//!
//! Turns standing subscriptions into invoices on a schedule and reconciles invoice
//! payment state from gateway callbacks.
//!
//! ## Features
//!
//! - **Recurring Invoices**: Scan due subscriptions, bill them, advance their due dates
//! - **Scheduling**: Tick-driven passes guarded by an in-process or Redis job lock
//! - **Checkout**: Open Razorpay orders for pending invoices
//! - **Payment Verification**: HMAC-checked callbacks mark invoices paid
//! - **Records**: Clients, subscriptions and manual invoices

pub mod client;
pub mod clients;
pub mod clock;
pub mod config;
pub mod error;
pub mod gateway;
pub mod generator;
pub mod invoices;
pub mod lock;
pub mod payments;
pub mod scanner;
pub mod scheduler;
pub mod signature;
pub mod store;
pub mod subscriptions;

// Client
pub use client::{RazorpayClient, RazorpayConfig};

// Clock
pub use clock::{Clock, ManualClock, SystemClock};

// Config
pub use config::{BillingConfig, FailurePolicy};

// Error
pub use error::{BillingError, BillingResult};

// Gateway
pub use gateway::{Order, OrderRequest, PaymentGateway};

// Generator
pub use generator::{FailedSubscription, GeneratedInvoice, GenerationReport, InvoiceGenerator};

// Lock
pub use lock::{JobLock, LocalJobLock, RedisJobLock, RECURRING_INVOICES_JOB};

// Payments
pub use payments::{PaymentCallback, PaymentService, VerificationResult};

// Scanner
pub use scanner::{ClientLookup, DueSubscription, DueSubscriptionScanner};

// Scheduler
pub use scheduler::{BillingScheduler, ChannelTicker, PassOutcome, Ticker};

// Services
pub use clients::ClientService;
pub use invoices::InvoiceService;
pub use subscriptions::SubscriptionService;

// Store
pub use store::{BillingStore, InMemoryStore, PaidInvoice, PgBillingStore};

use std::sync::Arc;

use sqlx::PgPool;

/// Main billing service that combines the record and payment services
pub struct BillingService {
    pub clients: ClientService,
    pub subscriptions: SubscriptionService,
    pub invoices: InvoiceService,
    pub payments: PaymentService,
    store: Arc<dyn BillingStore>,
}

impl BillingService {
    /// Create a billing service backed by Postgres and the Razorpay gateway from
    /// environment variables
    pub fn from_env(pool: PgPool) -> BillingResult<Self> {
        let gateway = RazorpayClient::from_env()?;
        Ok(Self::new(
            Arc::new(PgBillingStore::new(pool)),
            Arc::new(gateway),
        ))
    }

    /// Create a billing service over explicit store and gateway implementations
    pub fn new(store: Arc<dyn BillingStore>, gateway: Arc<dyn PaymentGateway>) -> Self {
        Self {
            clients: ClientService::new(store.clone()),
            subscriptions: SubscriptionService::new(store.clone()),
            invoices: InvoiceService::new(store.clone()),
            payments: PaymentService::new(store.clone(), gateway),
            store,
        }
    }

    /// Invoice generator over the same store
    pub fn invoice_generator(&self, policy: FailurePolicy) -> InvoiceGenerator {
        InvoiceGenerator::new(self.store.clone(), policy)
    }
}
