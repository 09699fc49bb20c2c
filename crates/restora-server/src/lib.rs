//! Restora server: authenticated, quota-limited image restoration over HTTP.

pub mod auth;
pub mod routes;
pub mod state;

pub use auth::{HeaderIdentityResolver, IdentityResolver};
pub use routes::build_router;
pub use state::AppState;
