//! Admin capability service.
//!
//! A poll or survey is administered by whoever knows its admin password.
//! Logging in exchanges the password for a short-lived token scoped to that
//! one target.

use std::sync::Arc;

use argon2::{
    Argon2,
    password_hash::{PasswordHash, PasswordHasher, PasswordVerifier, SaltString, rand_core::OsRng},
};
use chrono::{DateTime, Duration, Utc};
use jsonwebtoken::{Algorithm, DecodingKey, EncodingKey, Header, Validation};
use serde::{Deserialize, Serialize};
use tally_common::{AppError, AppResult, Clock, config::AuthConfig};

/// Minimum admin password length in characters.
pub const MIN_PASSWORD_LEN: usize = 4;
/// Maximum admin password length in characters.
pub const MAX_PASSWORD_LEN: usize = 128;

/// What an admin token is scoped to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TargetKind {
    Poll,
    Survey,
}

#[derive(Debug, Serialize, Deserialize)]
struct Claims {
    sub: String,
    kind: TargetKind,
    iat: i64,
    exp: i64,
}

/// Issued admin token.
#[derive(Debug, Clone, Serialize)]
pub struct AdminToken {
    pub token: String,
    pub expires_at: DateTime<Utc>,
}

/// Admin password and token service.
#[derive(Clone)]
pub struct AdminAuthService {
    encoding: EncodingKey,
    decoding: DecodingKey,
    ttl: Duration,
    clock: Arc<dyn Clock>,
}

impl AdminAuthService {
    /// Create the service from the auth configuration.
    #[must_use]
    pub fn new(config: &AuthConfig, clock: Arc<dyn Clock>) -> Self {
        let secret = config.token_secret.as_bytes();
        Self {
            encoding: EncodingKey::from_secret(secret),
            decoding: DecodingKey::from_secret(secret),
            ttl: Duration::seconds(config.token_ttl_secs),
            clock,
        }
    }

    /// Issue a token for one target.
    pub fn issue(&self, kind: TargetKind, public_id: &str) -> AppResult<AdminToken> {
        let now = self.clock.now();
        let expires_at = now + self.ttl;
        let claims = Claims {
            sub: public_id.to_string(),
            kind,
            iat: now.timestamp(),
            exp: expires_at.timestamp(),
        };
        let token = jsonwebtoken::encode(&Header::new(Algorithm::HS256), &claims, &self.encoding)
            .map_err(|e| AppError::Internal(format!("Failed to sign token: {e}")))?;
        Ok(AdminToken { token, expires_at })
    }

    /// Check that `token` grants admin rights on exactly this target.
    pub fn verify(&self, token: &str, kind: TargetKind, public_id: &str) -> AppResult<()> {
        let mut validation = Validation::new(Algorithm::HS256);
        // Expiry is checked against the injected clock below.
        validation.validate_exp = false;

        let claims = jsonwebtoken::decode::<Claims>(token, &self.decoding, &validation)
            .map_err(|_| AppError::Unauthorized)?
            .claims;

        if claims.kind != kind || claims.sub != public_id {
            return Err(AppError::Unauthorized);
        }
        if claims.exp <= self.clock.now().timestamp() {
            return Err(AppError::Unauthorized);
        }
        Ok(())
    }

    /// Whether an optional token grants admin rights. A present but invalid
    /// token is an error, not an anonymous caller.
    pub fn is_admin(&self, token: Option<&str>, kind: TargetKind, public_id: &str) -> AppResult<bool> {
        match token {
            Some(token) => self.verify(token, kind, public_id).map(|()| true),
            None => Ok(false),
        }
    }

    /// Verify an admin password against the stored hash and issue a token.
    pub fn login(
        &self,
        kind: TargetKind,
        public_id: &str,
        password: &str,
        password_hash: &str,
    ) -> AppResult<AdminToken> {
        if !verify_password(password, password_hash)? {
            tracing::info!(target_id = %public_id, "Admin login rejected");
            return Err(AppError::Unauthorized);
        }
        self.issue(kind, public_id)
    }
}

/// Check admin password length.
pub fn validate_password(password: &str) -> AppResult<()> {
    let len = password.chars().count();
    if !(MIN_PASSWORD_LEN..=MAX_PASSWORD_LEN).contains(&len) {
        return Err(AppError::Validation(format!(
            "Admin password must be {MIN_PASSWORD_LEN} to {MAX_PASSWORD_LEN} characters"
        )));
    }
    Ok(())
}

/// Hash a password using Argon2.
pub fn hash_password(password: &str) -> AppResult<String> {
    let salt = SaltString::generate(&mut OsRng);
    let argon2 = Argon2::default();

    argon2
        .hash_password(password.as_bytes(), &salt)
        .map(|h| h.to_string())
        .map_err(|e| AppError::Internal(format!("Failed to hash password: {e}")))
}

/// Verify a password against an Argon2 hash.
pub fn verify_password(password: &str, hash: &str) -> AppResult<bool> {
    let parsed_hash =
        PasswordHash::new(hash).map_err(|e| AppError::Internal(format!("Invalid hash: {e}")))?;

    Ok(Argon2::default()
        .verify_password(password.as_bytes(), &parsed_hash)
        .is_ok())
}
