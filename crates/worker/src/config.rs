//! Worker configuration

use std::env;

use chrono_tz::Tz;
use recurbill_billing::{BillingConfig, BillingError};

/// Worker configuration loaded from environment variables
#[derive(Debug, Clone)]
pub struct WorkerConfig {
    // Database
    pub database_url: String,
    pub database_max_connections: u32,

    // Redis (optional; enables the cross-instance job lock)
    pub redis_url: Option<String>,

    // Schedule
    pub billing_cron: String,
    pub billing_timezone: Tz,
    pub run_on_startup: bool,

    // Billing pass
    pub billing: BillingConfig,
}

impl WorkerConfig {
    /// Load configuration from environment variables
    pub fn from_env() -> Result<Self, ConfigError> {
        Ok(Self {
            // Database
            database_url: env::var("DATABASE_URL")
                .map_err(|_| ConfigError::Missing("DATABASE_URL"))?,
            database_max_connections: env::var("DATABASE_MAX_CONNECTIONS")
                .unwrap_or_else(|_| "5".to_string())
                .parse()
                .unwrap_or(5),

            // Redis
            redis_url: env::var("REDIS_URL").ok().filter(|url| !url.trim().is_empty()),

            // Schedule: seconds-first cron, daily at 03:00 by default
            billing_cron: {
                let cron = env::var("BILLING_CRON").unwrap_or_else(|_| "0 0 3 * * *".to_string());
                if cron.split_whitespace().count() < 6 {
                    return Err(ConfigError::InvalidCron(cron));
                }
                cron
            },
            billing_timezone: {
                let tz = env::var("BILLING_TIMEZONE").unwrap_or_else(|_| "Asia/Kolkata".to_string());
                tz.parse::<Tz>()
                    .map_err(|_| ConfigError::InvalidTimezone(tz.clone()))?
            },
            run_on_startup: env::var("RUN_ON_STARTUP")
                .map(|v| matches!(v.trim().to_lowercase().as_str(), "1" | "true" | "yes"))
                .unwrap_or(false),

            // Billing pass
            billing: BillingConfig::from_env()?,
        })
    }
}

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Missing required environment variable: {0}")]
    Missing(&'static str),
    #[error("Invalid BILLING_CRON '{0}': expected a six-field expression starting with seconds")]
    InvalidCron(String),
    #[error("Invalid BILLING_TIMEZONE '{0}': expected an IANA zone name")]
    InvalidTimezone(String),
    #[error(transparent)]
    Billing(#[from] BillingError),
}
