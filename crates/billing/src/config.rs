//! Billing engine configuration

use std::str::FromStr;
use std::time::Duration;

use crate::error::{BillingError, BillingResult};

/// What a generation pass does when persisting one subscription fails
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum FailurePolicy {
    /// Record the failure and carry on with the next subscription
    #[default]
    Isolate,
    /// Stop the pass at the first failure, leaving later subscriptions for the next run
    AbortRemaining,
}

impl FromStr for FailurePolicy {
    type Err = BillingError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "isolate" => Ok(Self::Isolate),
            "abort" | "abort_remaining" => Ok(Self::AbortRemaining),
            other => Err(BillingError::Config(format!(
                "Unknown BILLING_FAILURE_POLICY '{}' (expected 'isolate' or 'abort')",
                other
            ))),
        }
    }
}

/// Configuration for the recurring invoice pass
#[derive(Debug, Clone)]
pub struct BillingConfig {
    pub failure_policy: FailurePolicy,
    /// Lease length for the cross-instance job lock
    pub lock_ttl: Duration,
}

impl Default for BillingConfig {
    fn default() -> Self {
        Self {
            failure_policy: FailurePolicy::Isolate,
            lock_ttl: Duration::from_secs(3600),
        }
    }
}

impl BillingConfig {
    /// Create config from environment variables
    pub fn from_env() -> BillingResult<Self> {
        let defaults = Self::default();

        let failure_policy = match std::env::var("BILLING_FAILURE_POLICY") {
            Ok(value) => value.parse()?,
            Err(_) => defaults.failure_policy,
        };

        let lock_ttl = match std::env::var("BILLING_LOCK_TTL_SECS") {
            Ok(value) => {
                let secs: u64 = value.parse().map_err(|_| {
                    BillingError::Config(format!("BILLING_LOCK_TTL_SECS must be a number, got '{}'", value))
                })?;
                if secs == 0 {
                    return Err(BillingError::Config(
                        "BILLING_LOCK_TTL_SECS must be greater than zero".to_string(),
                    ));
                }
                Duration::from_secs(secs)
            }
            Err(_) => defaults.lock_ttl,
        };

        Ok(Self {
            failure_policy,
            lock_ttl,
        })
    }
}
