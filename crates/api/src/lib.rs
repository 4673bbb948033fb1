//! HTTP API layer for tally.
//!
//! - **Endpoints**: polls, surveys and their admin routes
//! - **Extractors**: participant identity and admin bearer tokens
//! - **Middleware**: participant hashing from the client address
//!
//! Built on Axum 0.8 with Tower middleware stack.

pub mod endpoints;
pub mod extractors;
pub mod middleware;
pub mod response;

pub use endpoints::router;
pub use middleware::AppState;
