//! Postgres-backed billing store

use async_trait::async_trait;
use recurbill_shared::{Client, Invoice, InvoiceStatus, Subscription, Transition};
use sqlx::{FromRow, PgPool};
use time::OffsetDateTime;
use uuid::Uuid;

use super::{BillingStore, PaidInvoice};
use crate::error::BillingResult;

#[derive(Clone)]
pub struct PgBillingStore {
    pool: PgPool,
}

impl PgBillingStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[derive(FromRow)]
struct PaidInvoiceRow {
    #[sqlx(flatten)]
    invoice: Invoice,
    previous_status: InvoiceStatus,
}

#[async_trait]
impl BillingStore for PgBillingStore {
    async fn due_subscriptions(&self, now: OffsetDateTime) -> BillingResult<Vec<Subscription>> {
        let subscriptions: Vec<Subscription> = sqlx::query_as(
            r#"
            SELECT id, user_id, client_id, amount_minor, description, frequency,
                   next_due_date, created_at
            FROM subscriptions
            WHERE next_due_date <= $1
            ORDER BY next_due_date ASC, id ASC
            "#,
        )
        .bind(now)
        .fetch_all(&self.pool)
        .await?;

        Ok(subscriptions)
    }

    async fn find_client(&self, id: Uuid) -> BillingResult<Option<Client>> {
        let client: Option<Client> = sqlx::query_as(
            r#"
            SELECT id, user_id, name, email, phone, created_at
            FROM clients
            WHERE id = $1
            "#,
        )
        .bind(id)
        .fetch_optional(&self.pool)
        .await?;

        Ok(client)
    }

    async fn find_subscription(&self, id: Uuid) -> BillingResult<Option<Subscription>> {
        let subscription: Option<Subscription> = sqlx::query_as(
            r#"
            SELECT id, user_id, client_id, amount_minor, description, frequency,
                   next_due_date, created_at
            FROM subscriptions
            WHERE id = $1
            "#,
        )
        .bind(id)
        .fetch_optional(&self.pool)
        .await?;

        Ok(subscription)
    }

    async fn find_invoice(&self, id: Uuid) -> BillingResult<Option<Invoice>> {
        let invoice: Option<Invoice> = sqlx::query_as(
            r#"
            SELECT id, user_id, client_name, client_email, description, amount_minor,
                   status, created_at
            FROM invoices
            WHERE id = $1
            "#,
        )
        .bind(id)
        .fetch_optional(&self.pool)
        .await?;

        Ok(invoice)
    }

    async fn insert_client(&self, client: &Client) -> BillingResult<()> {
        sqlx::query(
            r#"
            INSERT INTO clients (id, user_id, name, email, phone, created_at)
            VALUES ($1, $2, $3, $4, $5, $6)
            "#,
        )
        .bind(client.id)
        .bind(client.user_id)
        .bind(&client.name)
        .bind(&client.email)
        .bind(&client.phone)
        .bind(client.created_at)
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    async fn insert_subscription(&self, subscription: &Subscription) -> BillingResult<()> {
        sqlx::query(
            r#"
            INSERT INTO subscriptions
                (id, user_id, client_id, amount_minor, description, frequency,
                 next_due_date, created_at)
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8)
            "#,
        )
        .bind(subscription.id)
        .bind(subscription.user_id)
        .bind(subscription.client_id)
        .bind(subscription.amount_minor)
        .bind(&subscription.description)
        .bind(subscription.frequency)
        .bind(subscription.next_due_date)
        .bind(subscription.created_at)
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    async fn insert_invoice(&self, invoice: &Invoice) -> BillingResult<()> {
        sqlx::query(
            r#"
            INSERT INTO invoices
                (id, user_id, client_name, client_email, description, amount_minor,
                 status, created_at)
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8)
            "#,
        )
        .bind(invoice.id)
        .bind(invoice.user_id)
        .bind(&invoice.client_name)
        .bind(&invoice.client_email)
        .bind(&invoice.description)
        .bind(invoice.amount_minor)
        .bind(invoice.status)
        .bind(invoice.created_at)
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    async fn update_subscription_due_date(
        &self,
        id: Uuid,
        next_due_date: OffsetDateTime,
    ) -> BillingResult<bool> {
        let result = sqlx::query("UPDATE subscriptions SET next_due_date = $2 WHERE id = $1")
            .bind(id)
            .bind(next_due_date)
            .execute(&self.pool)
            .await?;

        Ok(result.rows_affected() > 0)
    }

    async fn mark_invoice_paid(&self, id: Uuid) -> BillingResult<Option<PaidInvoice>> {
        // Row lock on the previous state so concurrent callbacks for the same invoice
        // agree on which one performed the transition.
        let row: Option<PaidInvoiceRow> = sqlx::query_as(
            r#"
            WITH previous AS (
                SELECT id, status FROM invoices WHERE id = $1 FOR UPDATE
            )
            UPDATE invoices i
            SET status = 'paid'
            FROM previous
            WHERE i.id = previous.id
            RETURNING i.id, i.user_id, i.client_name, i.client_email, i.description,
                      i.amount_minor, i.status, i.created_at,
                      previous.status AS previous_status
            "#,
        )
        .bind(id)
        .fetch_optional(&self.pool)
        .await?;

        Ok(row.map(|row| {
            let transition = match row.previous_status {
                InvoiceStatus::Pending => Transition::Paid,
                InvoiceStatus::Paid => Transition::AlreadyPaid,
            };
            PaidInvoice {
                invoice: row.invoice,
                transition,
            }
        }))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use recurbill_shared::Frequency;

    async fn setup() -> PgBillingStore {
        let url = std::env::var("DATABASE_URL").expect("DATABASE_URL required");
        let pool = recurbill_shared::create_pool(&url, 2)
            .await
            .expect("Failed to create pool");
        recurbill_shared::run_migrations(&pool)
            .await
            .expect("Failed to run migrations");
        PgBillingStore::new(pool)
    }

    #[tokio::test]
    #[ignore] // Requires database
    async fn test_due_subscription_round_trip() {
        let store = setup().await;
        let now = OffsetDateTime::now_utc();
        let client = Client {
            id: Uuid::new_v4(),
            user_id: Uuid::new_v4(),
            name: "Acme".to_string(),
            email: "acme@example.com".to_string(),
            phone: None,
            created_at: now,
        };
        store.insert_client(&client).await.unwrap();

        let subscription = Subscription {
            id: Uuid::new_v4(),
            user_id: client.user_id,
            client_id: client.id,
            amount_minor: 9900,
            description: "Hosting".to_string(),
            frequency: Frequency::Monthly,
            next_due_date: now - time::Duration::days(1),
            created_at: now,
        };
        store.insert_subscription(&subscription).await.unwrap();

        let due = store.due_subscriptions(now).await.unwrap();
        assert!(due.iter().any(|s| s.id == subscription.id));

        let next = Frequency::Monthly.advance(subscription.next_due_date).unwrap();
        assert!(store
            .update_subscription_due_date(subscription.id, next)
            .await
            .unwrap());
        let due = store.due_subscriptions(now).await.unwrap();
        assert!(!due.iter().any(|s| s.id == subscription.id));
    }

    #[tokio::test]
    #[ignore] // Requires database
    async fn test_mark_invoice_paid_is_idempotent() {
        let store = setup().await;
        let invoice = Invoice {
            id: Uuid::new_v4(),
            user_id: Uuid::new_v4(),
            client_name: "Acme".to_string(),
            client_email: String::new(),
            description: "One-off".to_string(),
            amount_minor: 500,
            status: InvoiceStatus::Pending,
            created_at: OffsetDateTime::now_utc(),
        };
        store.insert_invoice(&invoice).await.unwrap();

        let first = store.mark_invoice_paid(invoice.id).await.unwrap().unwrap();
        assert_eq!(first.transition, Transition::Paid);
        assert_eq!(first.invoice.status, InvoiceStatus::Paid);

        let second = store.mark_invoice_paid(invoice.id).await.unwrap().unwrap();
        assert_eq!(second.transition, Transition::AlreadyPaid);

        assert!(store.mark_invoice_paid(Uuid::new_v4()).await.unwrap().is_none());
    }
}
