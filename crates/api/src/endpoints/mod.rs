//! API endpoints.

mod health;
mod polls;
mod surveys;

use axum::Router;

use crate::middleware::AppState;

/// Create the API router.
pub fn router() -> Router<AppState> {
    Router::new()
        .nest("/health", health::router())
        .nest("/polls", polls::router())
        .nest("/surveys", surveys::router())
}
