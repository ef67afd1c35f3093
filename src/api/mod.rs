/// API routes and handlers
pub mod accounts;
pub mod auth;
pub mod keys;
pub mod middleware;

use crate::context::AppContext;
use axum::Router;

/// Path prefix of the versioned API
pub const API_PREFIX: &str = "/api/v1";

/// Build API routes
pub fn routes() -> Router<AppContext> {
    Router::new().nest(
        API_PREFIX,
        Router::new()
            .merge(accounts::routes())
            .merge(keys::routes())
            .merge(auth::routes()),
    )
}
