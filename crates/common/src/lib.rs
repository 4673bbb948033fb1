//! Common utilities and shared types for tally.
//!
//! This crate provides foundational components used across all tally crates:
//!
//! - **Configuration**: Application settings via [`Config`]
//! - **Error handling**: Unified error types via [`AppError`] and [`AppResult`]
//! - **ID Generation**: public ids, ULIDs and response codes via [`IdGenerator`]
//! - **Clock**: injectable time source via [`Clock`]
//! - **Identity**: salted participant hashing via [`ParticipantIdentifier`]
//!
//! # Example
//!
//! ```no_run
//! use tally_common::{AppResult, Config, IdGenerator, ParticipantIdentifier, SaltedAddressHasher};
//!
//! fn example() -> AppResult<()> {
//!     let config = Config::load()?;
//!     config.validate()?;
//!     let hasher = SaltedAddressHasher::new(&config.identity.salt);
//!     let participant = hasher.identify(Some("203.0.113.7"));
//!     println!("participant {participant}, poll {}", IdGenerator::new().generate_public_id());
//!     Ok(())
//! }
//! ```

pub mod clock;
pub mod config;
pub mod error;
pub mod id;
pub mod identity;

pub use clock::{Clock, FixedClock, SystemClock};
pub use config::Config;
pub use error::{AppError, AppResult};
pub use id::IdGenerator;
pub use identity::{ParticipantHash, ParticipantIdentifier, SaltedAddressHasher, UNKNOWN_ADDRESS};
