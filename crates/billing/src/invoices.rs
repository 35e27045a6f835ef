//! Invoice entry and the manual paid transition

use std::sync::Arc;

use recurbill_shared::{require_text, to_minor_units, Invoice, NewInvoice, Transition};
use time::OffsetDateTime;
use uuid::Uuid;

use crate::error::{BillingError, BillingResult};
use crate::store::{BillingStore, PaidInvoice};

/// Invoice service for manual entry and status changes
pub struct InvoiceService {
    store: Arc<dyn BillingStore>,
}

impl InvoiceService {
    pub fn new(store: Arc<dyn BillingStore>) -> Self {
        Self { store }
    }

    /// Record an invoice entered by hand.
    ///
    /// A manual invoice may be created already paid; that is its initial state, not a
    /// transition.
    pub async fn create_manual(&self, user_id: Uuid, input: NewInvoice) -> BillingResult<Invoice> {
        let invoice = Invoice {
            id: Uuid::new_v4(),
            user_id,
            client_name: require_text(&input.client_name, "client_name")?,
            client_email: input
                .client_email
                .map(|e| e.trim().to_string())
                .unwrap_or_default(),
            description: require_text(&input.description, "description")?,
            amount_minor: to_minor_units(input.amount)?,
            status: input.status.unwrap_or_default(),
            created_at: OffsetDateTime::now_utc(),
        };

        self.store.insert_invoice(&invoice).await?;

        tracing::info!(
            invoice_id = %invoice.id,
            user_id = %user_id,
            status = %invoice.status,
            "Created manual invoice"
        );

        Ok(invoice)
    }

    /// Fetch an invoice owned by `user_id`
    pub async fn get(&self, invoice_id: Uuid, user_id: Uuid) -> BillingResult<Invoice> {
        self.store
            .find_invoice(invoice_id)
            .await?
            .filter(|i| i.user_id == user_id)
            .ok_or_else(|| BillingError::InvoiceNotFound(invoice_id.to_string()))
    }

    /// Mark one of the user's invoices as paid. Idempotent on paid invoices.
    pub async fn mark_paid(&self, invoice_id: Uuid, user_id: Uuid) -> BillingResult<PaidInvoice> {
        self.get(invoice_id, user_id).await?;

        let paid = self
            .store
            .mark_invoice_paid(invoice_id)
            .await?
            .ok_or_else(|| BillingError::InvoiceNotFound(invoice_id.to_string()))?;

        match paid.transition {
            Transition::Paid => {
                tracing::info!(invoice_id = %invoice_id, "Invoice marked as paid");
            }
            Transition::AlreadyPaid => {
                tracing::debug!(invoice_id = %invoice_id, "Invoice was already paid");
            }
        }

        Ok(paid)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::InMemoryStore;
    use recurbill_shared::InvoiceStatus;

    fn request() -> NewInvoice {
        NewInvoice {
            client_name: "Stark Industries".to_string(),
            client_email: None,
            description: "Consulting, March".to_string(),
            amount: 1200.5,
            status: None,
        }
    }

    #[tokio::test]
    async fn test_create_manual_applies_defaults() {
        let service = InvoiceService::new(Arc::new(InMemoryStore::new()));
        let user_id = Uuid::new_v4();

        let invoice = service.create_manual(user_id, request()).await.unwrap();
        assert_eq!(invoice.client_email, "");
        assert_eq!(invoice.status, InvoiceStatus::Pending);
        assert_eq!(invoice.amount_minor, 120_050);
        assert_eq!(invoice.user_id, user_id);
    }

    #[tokio::test]
    async fn test_create_manual_can_start_paid() {
        let service = InvoiceService::new(Arc::new(InMemoryStore::new()));
        let mut input = request();
        input.status = Some(InvoiceStatus::Paid);

        let invoice = service.create_manual(Uuid::new_v4(), input).await.unwrap();
        assert_eq!(invoice.status, InvoiceStatus::Paid);
    }

    #[tokio::test]
    async fn test_create_manual_validates() {
        let service = InvoiceService::new(Arc::new(InMemoryStore::new()));

        let mut input = request();
        input.client_name = String::new();
        assert!(matches!(
            service.create_manual(Uuid::new_v4(), input).await,
            Err(BillingError::InvalidInput(_))
        ));

        let mut input = request();
        input.amount = f64::NAN;
        assert!(matches!(
            service.create_manual(Uuid::new_v4(), input).await,
            Err(BillingError::InvalidInput(_))
        ));
    }

    #[tokio::test]
    async fn test_mark_paid_is_idempotent() {
        let service = InvoiceService::new(Arc::new(InMemoryStore::new()));
        let user_id = Uuid::new_v4();
        let invoice = service.create_manual(user_id, request()).await.unwrap();

        let first = service.mark_paid(invoice.id, user_id).await.unwrap();
        assert_eq!(first.transition, Transition::Paid);
        assert_eq!(first.invoice.status, InvoiceStatus::Paid);

        let second = service.mark_paid(invoice.id, user_id).await.unwrap();
        assert_eq!(second.transition, Transition::AlreadyPaid);
        assert_eq!(second.invoice.status, InvoiceStatus::Paid);
    }

    #[tokio::test]
    async fn test_mark_paid_checks_ownership() {
        let store = Arc::new(InMemoryStore::new());
        let service = InvoiceService::new(store.clone());
        let invoice = service.create_manual(Uuid::new_v4(), request()).await.unwrap();

        let err = service.mark_paid(invoice.id, Uuid::new_v4()).await.unwrap_err();
        assert!(matches!(err, BillingError::InvoiceNotFound(_)));
        assert_eq!(
            store.find_invoice(invoice.id).await.unwrap().unwrap().status,
            InvoiceStatus::Pending
        );

        let err = service.mark_paid(Uuid::new_v4(), Uuid::new_v4()).await.unwrap_err();
        assert!(matches!(err, BillingError::InvoiceNotFound(_)));
    }
}
