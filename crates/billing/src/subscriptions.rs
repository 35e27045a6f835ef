//! Subscription records

use std::sync::Arc;

use recurbill_shared::{require_text, to_minor_units, DomainError, NewSubscription, Subscription};
use time::OffsetDateTime;
use uuid::Uuid;

use crate::error::{BillingError, BillingResult};
use crate::store::BillingStore;

/// Service for standing billing agreements
pub struct SubscriptionService {
    store: Arc<dyn BillingStore>,
}

impl SubscriptionService {
    pub fn new(store: Arc<dyn BillingStore>) -> Self {
        Self { store }
    }

    /// Create a subscription for one of the user's clients.
    ///
    /// The first invoice is generated by the first scheduled pass at or after
    /// `next_due_date`.
    pub async fn create(
        &self,
        user_id: Uuid,
        input: NewSubscription,
    ) -> BillingResult<Subscription> {
        let description = require_text(&input.description, "description")?;

        let amount_minor = to_minor_units(input.amount)?;
        if amount_minor <= 0 {
            return Err(DomainError::InvalidAmount(format!(
                "subscription amount must be positive, got {}",
                input.amount
            ))
            .into());
        }

        // Client must exist and belong to the same user
        let client_owned = self
            .store
            .find_client(input.client_id)
            .await?
            .is_some_and(|c| c.user_id == user_id);
        if !client_owned {
            return Err(BillingError::ClientNotFound(input.client_id.to_string()));
        }

        let subscription = Subscription {
            id: Uuid::new_v4(),
            user_id,
            client_id: input.client_id,
            amount_minor,
            description,
            frequency: input.frequency,
            next_due_date: input.next_due_date,
            created_at: OffsetDateTime::now_utc(),
        };

        self.store.insert_subscription(&subscription).await?;

        tracing::info!(
            subscription_id = %subscription.id,
            client_id = %subscription.client_id,
            frequency = %subscription.frequency,
            next_due_date = %subscription.next_due_date,
            "Created subscription"
        );

        Ok(subscription)
    }

    /// Fetch a subscription owned by `user_id`
    pub async fn get(&self, subscription_id: Uuid, user_id: Uuid) -> BillingResult<Subscription> {
        self.store
            .find_subscription(subscription_id)
            .await?
            .filter(|s| s.user_id == user_id)
            .ok_or_else(|| BillingError::SubscriptionNotFound(subscription_id.to_string()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::InMemoryStore;
    use recurbill_shared::{Client, Frequency};
    use time::macros::datetime;

    async fn setup() -> (SubscriptionService, Client) {
        let store = Arc::new(InMemoryStore::new());
        let client = Client {
            id: Uuid::new_v4(),
            user_id: Uuid::new_v4(),
            name: "Hooli".to_string(),
            email: "finance@hooli.test".to_string(),
            phone: None,
            created_at: datetime!(2024-01-01 00:00 UTC),
        };
        store.insert_client(&client).await.unwrap();
        (SubscriptionService::new(store), client)
    }

    fn request(client_id: Uuid, amount: f64) -> NewSubscription {
        NewSubscription {
            client_id,
            amount,
            description: "Managed hosting".to_string(),
            frequency: Frequency::Monthly,
            next_due_date: datetime!(2024-02-01 00:00 UTC),
        }
    }

    #[tokio::test]
    async fn test_create_converts_amount_to_minor_units() {
        let (service, client) = setup().await;

        let subscription = service
            .create(client.user_id, request(client.id, 499.99))
            .await
            .unwrap();
        assert_eq!(subscription.amount_minor, 49_999);
        assert_eq!(subscription.next_due_date, datetime!(2024-02-01 00:00 UTC));

        let fetched = service.get(subscription.id, client.user_id).await.unwrap();
        assert_eq!(fetched, subscription);
        assert!(matches!(
            service.get(subscription.id, Uuid::new_v4()).await,
            Err(BillingError::SubscriptionNotFound(_))
        ));
    }

    #[tokio::test]
    async fn test_create_rejects_bad_amounts() {
        let (service, client) = setup().await;

        for amount in [0.0, -10.0, 0.001, f64::NAN, f64::INFINITY] {
            let err = service
                .create(client.user_id, request(client.id, amount))
                .await
                .unwrap_err();
            assert!(matches!(err, BillingError::InvalidInput(_)), "amount {}", amount);
        }
    }

    #[tokio::test]
    async fn test_create_requires_owned_client() {
        let (service, client) = setup().await;

        let err = service
            .create(Uuid::new_v4(), request(client.id, 10.0))
            .await
            .unwrap_err();
        assert!(matches!(err, BillingError::ClientNotFound(_)));

        let err = service
            .create(client.user_id, request(Uuid::new_v4(), 10.0))
            .await
            .unwrap_err();
        assert!(matches!(err, BillingError::ClientNotFound(_)));
    }

    #[tokio::test]
    async fn test_create_requires_description() {
        let (service, client) = setup().await;
        let mut input = request(client.id, 10.0);
        input.description = "\t".to_string();

        let err = service.create(client.user_id, input).await.unwrap_err();
        assert!(matches!(err, BillingError::InvalidInput(_)));
    }
}
