//! Billing data model shared across Recurbill

use std::str::FromStr;

use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use time::{Date, Duration, Month, OffsetDateTime};
use uuid::Uuid;

use crate::error::{DomainError, DomainResult};

// =============================================================================
// Enums
// =============================================================================

/// Billing cadence of a subscription
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, sqlx::Type)]
#[sqlx(type_name = "VARCHAR", rename_all = "lowercase")]
#[serde(rename_all = "lowercase")]
pub enum Frequency {
    Monthly,
    Yearly,
}

impl Frequency {
    /// Calendar months covered by one period
    pub fn months(&self) -> i32 {
        match self {
            Self::Monthly => 1,
            Self::Yearly => 12,
        }
    }

    /// Advance a due date by one billing period.
    ///
    /// Month arithmetic works on the year/month fields and lets an overflowing day
    /// roll into the following month: January 31 + 1 month is March 2 in a leap year
    /// and March 3 otherwise, and February 29 + 1 year is March 1. Time of day and
    /// offset are kept.
    pub fn advance(&self, due: OffsetDateTime) -> DomainResult<OffsetDateTime> {
        add_months_with_rollover(due, self.months())
    }
}

impl std::fmt::Display for Frequency {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Monthly => write!(f, "monthly"),
            Self::Yearly => write!(f, "yearly"),
        }
    }
}

impl FromStr for Frequency {
    type Err = DomainError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "monthly" => Ok(Self::Monthly),
            "yearly" => Ok(Self::Yearly),
            other => Err(DomainError::InvalidFrequency(other.to_string())),
        }
    }
}

fn add_months_with_rollover(at: OffsetDateTime, months: i32) -> DomainResult<OffsetDateTime> {
    let date = at.date();
    let out_of_range = || DomainError::DateOutOfRange(format!("{} + {} months", date, months));

    let month_index = date.year() * 12 + (u8::from(date.month()) as i32 - 1) + months;
    let year = month_index.div_euclid(12);
    let month =
        Month::try_from((month_index.rem_euclid(12) + 1) as u8).map_err(|_| out_of_range())?;

    // Day 1 of the target month always exists; the source day is added as an offset
    // so that e.g. day 31 of a 29-day month spills over into the next month.
    let first = Date::from_calendar_date(year, month, 1).map_err(|_| out_of_range())?;
    let rolled = first
        .checked_add(Duration::days(date.day() as i64 - 1))
        .ok_or_else(out_of_range)?;

    Ok(at.replace_date(rolled))
}

/// Payment status of an invoice.
///
/// `Pending` is initial, `Paid` is terminal. There is no way back to pending.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, sqlx::Type, Default)]
#[sqlx(type_name = "VARCHAR", rename_all = "lowercase")]
#[serde(rename_all = "lowercase")]
pub enum InvoiceStatus {
    #[default]
    Pending,
    Paid,
}

/// Result of applying the paid transition to an invoice status
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Transition {
    /// pending -> paid
    Paid,
    /// Already paid, nothing changed
    AlreadyPaid,
}

impl InvoiceStatus {
    pub fn is_paid(&self) -> bool {
        matches!(self, Self::Paid)
    }

    /// The only transition in the lifecycle. Applying it to a paid invoice is a no-op.
    pub fn transition_to_paid(&mut self) -> Transition {
        match self {
            Self::Pending => {
                *self = Self::Paid;
                Transition::Paid
            }
            Self::Paid => Transition::AlreadyPaid,
        }
    }
}

impl std::fmt::Display for InvoiceStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Pending => write!(f, "pending"),
            Self::Paid => write!(f, "paid"),
        }
    }
}

impl FromStr for InvoiceStatus {
    type Err = DomainError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "pending" => Ok(Self::Pending),
            "paid" => Ok(Self::Paid),
            other => Err(DomainError::InvalidStatus(other.to_string())),
        }
    }
}

// =============================================================================
// Database Models
// =============================================================================

/// A billed party. Subscriptions reference it; invoices only copy its name and email.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, FromRow)]
pub struct Client {
    pub id: Uuid,
    pub user_id: Uuid,
    pub name: String,
    pub email: String,
    pub phone: Option<String>,
    pub created_at: OffsetDateTime,
}

/// A standing agreement to bill a client at a fixed cadence
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, FromRow)]
pub struct Subscription {
    pub id: Uuid,
    pub user_id: Uuid,
    pub client_id: Uuid,
    pub amount_minor: i64,
    pub description: String,
    pub frequency: Frequency,
    pub next_due_date: OffsetDateTime,
    pub created_at: OffsetDateTime,
}

impl Subscription {
    /// Whether the subscription should be billed at `now`
    pub fn is_due(&self, now: OffsetDateTime) -> bool {
        self.next_due_date <= now
    }
}

/// A bill with a snapshot of the client details taken when it was created
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, FromRow)]
pub struct Invoice {
    pub id: Uuid,
    pub user_id: Uuid,
    pub client_name: String,
    pub client_email: String,
    pub description: String,
    pub amount_minor: i64,
    pub status: InvoiceStatus,
    pub created_at: OffsetDateTime,
}

impl Invoice {
    /// Build a pending invoice for a due subscription, copying the client's current
    /// name and email. `created_at` is the time of the billing pass.
    pub fn from_subscription(
        subscription: &Subscription,
        client: &Client,
        created_at: OffsetDateTime,
    ) -> Self {
        Self {
            id: Uuid::new_v4(),
            user_id: subscription.user_id,
            client_name: client.name.clone(),
            client_email: client.email.clone(),
            description: subscription.description.clone(),
            amount_minor: subscription.amount_minor,
            status: InvoiceStatus::Pending,
            created_at,
        }
    }
}

// =============================================================================
// Creation Requests
// =============================================================================

/// Input for creating a client
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NewClient {
    pub name: String,
    pub email: String,
    #[serde(default)]
    pub phone: Option<String>,
}

/// Input for creating a subscription. `amount` is in major currency units.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NewSubscription {
    pub client_id: Uuid,
    pub amount: f64,
    pub description: String,
    pub frequency: Frequency,
    pub next_due_date: OffsetDateTime,
}

/// Input for a manually entered invoice. `amount` is in major currency units.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NewInvoice {
    pub client_name: String,
    #[serde(default)]
    pub client_email: Option<String>,
    pub description: String,
    pub amount: f64,
    #[serde(default)]
    pub status: Option<InvoiceStatus>,
}

/// Reject empty or whitespace-only required text fields
pub fn require_text(value: &str, field: &'static str) -> DomainResult<String> {
    let trimmed = value.trim();
    if trimmed.is_empty() {
        return Err(DomainError::MissingField(field));
    }
    Ok(trimmed.to_string())
}
