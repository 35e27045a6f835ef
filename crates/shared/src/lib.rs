#![cfg_attr(test, allow(clippy::unwrap_used))]
#![cfg_attr(test, allow(clippy::expect_used))]

//! Recurbill Shared Types and Utilities
//!
//! This crate contains the billing data model, domain errors and database helpers
//! shared by the billing engine and the worker.

pub mod db;
pub mod error;
pub mod money;
pub mod types;

pub use db::*;
pub use error::*;
pub use money::*;
pub use types::*;
