//! Request extractors.

use axum::{
    extract::{FromRef, FromRequestParts},
    http::request::Parts,
};
use axum_extra::headers::{Authorization, HeaderMapExt, authorization::Bearer};
use tally_common::{AppError, ParticipantHash};

use crate::middleware::AppState;

/// Pseudonymous participant behind the request.
///
/// Set by [`crate::middleware::participant_middleware`]; without it every
/// request falls into the shared unknown bucket.
#[derive(Debug, Clone)]
pub struct Participant(pub ParticipantHash);

impl<S> FromRequestParts<S> for Participant
where
    AppState: FromRef<S>,
    S: Send + Sync,
{
    type Rejection = AppError;

    async fn from_request_parts(parts: &mut Parts, state: &S) -> Result<Self, Self::Rejection> {
        if let Some(hash) = parts.extensions.get::<ParticipantHash>() {
            return Ok(Self(hash.clone()));
        }
        Ok(Self(AppState::from_ref(state).identity.identify(None)))
    }
}

/// Optional admin bearer token. Whether it is valid is decided by the service.
#[derive(Debug, Clone, Default)]
pub struct MaybeAdminToken(pub Option<String>);

impl MaybeAdminToken {
    /// Borrow the token, if any.
    #[must_use]
    pub fn as_deref(&self) -> Option<&str> {
        self.0.as_deref()
    }
}

impl<S> FromRequestParts<S> for MaybeAdminToken
where
    S: Send + Sync,
{
    type Rejection = AppError;

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self, Self::Rejection> {
        Ok(Self(bearer(parts)))
    }
}

/// Required admin bearer token.
#[derive(Debug, Clone)]
pub struct AdminToken(pub String);

impl<S> FromRequestParts<S> for AdminToken
where
    S: Send + Sync,
{
    type Rejection = AppError;

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self, Self::Rejection> {
        bearer(parts).map(Self).ok_or(AppError::Unauthorized)
    }
}

fn bearer(parts: &Parts) -> Option<String> {
    parts
        .headers
        .typed_get::<Authorization<Bearer>>()
        .map(|auth| auth.token().to_string())
        .filter(|token| !token.is_empty())
}
