//! Error types for Recurbill domain values

use thiserror::Error;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum DomainError {
    #[error("Missing required field: {0}")]
    MissingField(&'static str),

    #[error("Invalid amount: {0}")]
    InvalidAmount(String),

    #[error("Invalid frequency: {0}")]
    InvalidFrequency(String),

    #[error("Invalid invoice status: {0}")]
    InvalidStatus(String),

    #[error("Date out of range: {0}")]
    DateOutOfRange(String),
}

pub type DomainResult<T> = Result<T, DomainError>;
