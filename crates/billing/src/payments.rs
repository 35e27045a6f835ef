//! Gateway checkout and payment verification
//!
//! Checkout flow:
//! 1. `create_order` opens a gateway order for a pending invoice, with the invoice id
//!    as the order receipt
//! 2. The client-side checkout collects the payment and receives a signed callback
//! 3. `verify_payment` checks the signature, reads the order back from the gateway
//!    and marks the invoice in its receipt as paid

use std::sync::Arc;

use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::error::{BillingError, BillingResult};
use crate::gateway::{Order, OrderRequest, PaymentGateway};
use crate::signature::verify_signature;
use crate::store::BillingStore;

pub const VERIFICATION_SUCCEEDED: &str = "Payment verified and invoice updated.";
pub const VERIFICATION_FAILED: &str = "Payment verification failed.";

/// Ids and signature handed back by the gateway checkout
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PaymentCallback {
    pub order_id: String,
    pub payment_id: String,
    pub signature: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct VerificationResult {
    pub success: bool,
    pub message: String,
}

impl VerificationResult {
    fn verified() -> Self {
        Self {
            success: true,
            message: VERIFICATION_SUCCEEDED.to_string(),
        }
    }

    fn rejected() -> Self {
        Self {
            success: false,
            message: VERIFICATION_FAILED.to_string(),
        }
    }
}

/// Payment service for gateway orders and callbacks
pub struct PaymentService {
    store: Arc<dyn BillingStore>,
    gateway: Arc<dyn PaymentGateway>,
}

impl PaymentService {
    pub fn new(store: Arc<dyn BillingStore>, gateway: Arc<dyn PaymentGateway>) -> Self {
        Self { store, gateway }
    }

    /// Publishable key id for the client-side checkout
    pub fn public_key_id(&self) -> &str {
        self.gateway.key_id()
    }

    /// Open a gateway order for one of the user's unpaid invoices
    pub async fn create_order(&self, invoice_id: Uuid, user_id: Uuid) -> BillingResult<Order> {
        let invoice = self
            .store
            .find_invoice(invoice_id)
            .await?
            .filter(|i| i.user_id == user_id)
            .ok_or_else(|| BillingError::InvoiceNotFound(invoice_id.to_string()))?;

        if invoice.status.is_paid() {
            return Err(BillingError::AlreadyPaid(invoice_id.to_string()));
        }

        let request = OrderRequest {
            amount: invoice.amount_minor,
            currency: self.gateway.currency().to_string(),
            receipt: invoice.id.to_string(),
        };
        let order = self.gateway.create_order(&request).await?;

        tracing::info!(
            invoice_id = %invoice.id,
            order_id = %order.id,
            amount_minor = order.amount,
            "Created payment order"
        );

        Ok(order)
    }

    /// Verify a checkout callback and mark the paid invoice.
    ///
    /// A bad signature is a normal negative result, not an error. Errors mean the
    /// callback was authentic but could not be applied; no state has changed.
    pub async fn verify_payment(
        &self,
        callback: &PaymentCallback,
    ) -> BillingResult<VerificationResult> {
        let authentic = verify_signature(
            self.gateway.key_secret(),
            &callback.order_id,
            &callback.payment_id,
            &callback.signature,
        )?;

        if !authentic {
            tracing::warn!(
                order_id = %callback.order_id,
                payment_id = %callback.payment_id,
                "Payment signature mismatch"
            );
            return Ok(VerificationResult::rejected());
        }

        let order = self.gateway.fetch_order(&callback.order_id).await?;

        let receipt = order
            .receipt
            .as_deref()
            .filter(|r| !r.is_empty())
            .ok_or_else(|| BillingError::MissingReceipt(order.id.clone()))?;

        let invoice_id = Uuid::parse_str(receipt)
            .map_err(|_| BillingError::InvoiceNotFound(receipt.to_string()))?;

        let paid = self
            .store
            .mark_invoice_paid(invoice_id)
            .await?
            .ok_or_else(|| BillingError::InvoiceNotFound(invoice_id.to_string()))?;

        tracing::info!(
            invoice_id = %invoice_id,
            order_id = %callback.order_id,
            payment_id = %callback.payment_id,
            transition = ?paid.transition,
            "Payment verified"
        );

        Ok(VerificationResult::verified())
    }
}
