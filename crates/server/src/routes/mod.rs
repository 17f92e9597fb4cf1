//! API route handlers
//!
//! - `health`: liveness and Prometheus metrics
//! - `postback`: partner postback intake

pub mod health;
pub mod postback;

use crate::error::ServerError;

/// Fallback for undefined routes.
pub async fn not_found() -> ServerError {
    ServerError::NotFound
}
