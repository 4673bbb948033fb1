//! ID generation utilities.

use ulid::Ulid;
use uuid::Uuid;

/// Length of the random part of a response code.
const RESPONSE_CODE_LEN: usize = 8;

/// ID generator for entities.
#[derive(Debug, Clone, Default)]
pub struct IdGenerator {
    _private: (),
}

impl IdGenerator {
    /// Create a new ID generator.
    #[must_use]
    pub const fn new() -> Self {
        Self { _private: () }
    }

    /// Generate a new ULID-based ID.
    ///
    /// Used for storage keys, option ids and opinion ids.
    #[must_use]
    pub fn generate(&self) -> String {
        Ulid::new().to_string().to_lowercase()
    }

    /// Generate an opaque public id for a poll or survey.
    ///
    /// 128 random bits rendered as 32 lowercase hex characters. Shares nothing
    /// with the storage key, so links never reveal creation order.
    #[must_use]
    pub fn generate_public_id(&self) -> String {
        Uuid::new_v4().simple().to_string()
    }

    /// Generate a human-readable response code such as `R-7KQ2M9XD`.
    #[must_use]
    pub fn generate_response_code(&self) -> String {
        response_code_for(&Ulid::new())
    }
}

/// Derive the response code from the random tail of a ULID.
fn response_code_for(ulid: &Ulid) -> String {
    let encoded = ulid.to_string();
    let tail = &encoded[encoded.len() - RESPONSE_CODE_LEN..];
    format!("R-{tail}")
}
