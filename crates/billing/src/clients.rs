//! Client records

use std::sync::Arc;

use recurbill_shared::{require_text, Client, NewClient};
use time::OffsetDateTime;
use uuid::Uuid;

use crate::error::{BillingError, BillingResult};
use crate::store::BillingStore;

/// Service for the parties that subscriptions bill
pub struct ClientService {
    store: Arc<dyn BillingStore>,
}

impl ClientService {
    pub fn new(store: Arc<dyn BillingStore>) -> Self {
        Self { store }
    }

    /// Create a client owned by `user_id`
    pub async fn create(&self, user_id: Uuid, input: NewClient) -> BillingResult<Client> {
        let client = Client {
            id: Uuid::new_v4(),
            user_id,
            name: require_text(&input.name, "name")?,
            email: require_text(&input.email, "email")?,
            phone: input
                .phone
                .map(|p| p.trim().to_string())
                .filter(|p| !p.is_empty()),
            created_at: OffsetDateTime::now_utc(),
        };

        self.store.insert_client(&client).await?;

        tracing::info!(client_id = %client.id, user_id = %user_id, "Created client");

        Ok(client)
    }

    /// Fetch a client owned by `user_id`
    pub async fn get(&self, client_id: Uuid, user_id: Uuid) -> BillingResult<Client> {
        self.store
            .find_client(client_id)
            .await?
            .filter(|c| c.user_id == user_id)
            .ok_or_else(|| BillingError::ClientNotFound(client_id.to_string()))
    }
}
