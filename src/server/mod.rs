//! HTTP surface: request and response types plus the axum router.

pub mod requests;
pub mod responses;
pub mod routes;

pub use routes::{build_router, AppState};
