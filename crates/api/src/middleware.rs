//! API middleware.

use std::{net::SocketAddr, sync::Arc};

use axum::{
    body::Body,
    extract::{ConnectInfo, State},
    http::{HeaderMap, Request},
    middleware::Next,
    response::Response,
};
use tally_common::ParticipantIdentifier;
use tally_core::{PollService, SurveyService};

/// Application state.
#[derive(Clone)]
pub struct AppState {
    pub poll_service: PollService,
    pub survey_service: SurveyService,
    pub identity: Arc<dyn ParticipantIdentifier>,
}

/// Hash the client address into a participant key for the handlers.
///
/// The raw address never leaves this function. See [`client_address`] for
/// which headers must be set by a trusted proxy.
pub async fn participant_middleware(
    State(state): State<AppState>,
    mut req: Request<Body>,
    next: Next,
) -> Response {
    let peer = req
        .extensions()
        .get::<ConnectInfo<SocketAddr>>()
        .map(|ConnectInfo(addr)| *addr);
    let raw = client_address(req.headers(), peer);
    let participant = state.identity.identify(raw.as_deref());
    req.extensions_mut().insert(participant);

    next.run(req).await
}

/// Client address: first `X-Forwarded-For` hop, then `X-Real-IP`, then the
/// socket peer.
///
/// The forwarding headers are taken as given. Deploy behind a proxy that
/// overwrites `X-Forwarded-For` and `X-Real-IP`; otherwise any client can
/// pick its own participant bucket.
#[must_use]
pub fn client_address(headers: &HeaderMap, peer: Option<SocketAddr>) -> Option<String> {
    let forwarded = headers
        .get("x-forwarded-for")
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.split(',').next())
        .map(str::trim)
        .filter(|v| !v.is_empty());
    if let Some(addr) = forwarded {
        return Some(addr.to_string());
    }

    let real_ip = headers
        .get("x-real-ip")
        .and_then(|v| v.to_str().ok())
        .map(str::trim)
        .filter(|v| !v.is_empty());
    if let Some(addr) = real_ip {
        return Some(addr.to_string());
    }

    peer.map(|addr| addr.ip().to_string())
}
