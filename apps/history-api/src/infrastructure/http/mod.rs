//! HTTP/REST API adapter.
//!
//! Read-only endpoints over the configured history backend, plus the health
//! and metrics routes.

mod controller;
mod response;

pub use controller::{AppState, create_router};
pub use response::{ApiError, ErrorResponse};
