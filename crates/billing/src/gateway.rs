//! Payment gateway contract
//!
//! The billing engine needs three things from a gateway: create an order for an
//! amount, fetch an order back by id, and the shared secret that signs payment
//! callbacks.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::error::BillingResult;

/// Request body for creating a gateway order
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OrderRequest {
    /// Amount in minor units (paise/cents)
    pub amount: i64,
    pub currency: String,
    /// Opaque reference carried through the gateway; holds our invoice id
    pub receipt: String,
}

/// A gateway order as returned by the gateway.
///
/// Fields the engine does not read are kept in `extra` so the order can be handed
/// back to callers exactly as received.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Order {
    pub id: String,
    pub amount: i64,
    pub currency: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub receipt: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub status: Option<String>,
    #[serde(flatten)]
    pub extra: serde_json::Map<String, serde_json::Value>,
}

#[async_trait]
pub trait PaymentGateway: Send + Sync {
    async fn create_order(&self, request: &OrderRequest) -> BillingResult<Order>;

    async fn fetch_order(&self, order_id: &str) -> BillingResult<Order>;

    /// Publishable key id handed to the client-side checkout
    fn key_id(&self) -> &str;

    /// Shared secret used to sign payment callbacks
    fn key_secret(&self) -> &str;

    /// Currency used for new orders
    fn currency(&self) -> &str;
}
