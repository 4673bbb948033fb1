//! Core business logic for tally.
//!
//! [`ledger`] holds the storage-free rules for polls and surveys.
//! [`services`] drives them against the database.

pub mod ledger;
pub mod services;

pub use services::*;
