//! Postback Server - HTTP intake for partner conversion postbacks
//!
//! Partners call `/postback` when a conversion happens. The server decodes
//! the query string and body, hands the event to [`postback::Pipeline`] and
//! maps the outcome onto a status code.
//!
//! # Quick Start
//!
//! ```rust,no_run
//! use server::ServerConfig;
//!
//! #[tokio::main]
//! async fn main() -> anyhow::Result<()> {
//!     let config = ServerConfig::load()?;
//!     server::start_server(config).await?;
//!     Ok(())
//! }
//! ```
//!
//! # API Endpoints
//!
//! - `GET|POST /postback` - record a postback
//! - `GET /health` - liveness probe
//! - `GET /metrics` - Prometheus metrics (when `metrics_enabled`)
//!
//! | Status | Body |
//! |---|---|
//! | 200 | `{ok, key, idempotent, subsUpdated, mirrors}` |
//! | 400 | `{error: "empty payload" \| "missing required fields" \| "invalid identifier" \| "malformed body"}` |
//! | 404 | `{error: "invalid_user_model"}` |
//! | 405 | `{error: "method not allowed"}` |
//! | 409 | `{error: "transaction_exists", message}` |
//! | 413 | `{error: "payload too large"}` |
//! | 500 | `{error: "internal server error"}` |

pub mod config;
pub mod error;
pub mod middleware;
pub mod routes;
pub mod server;
pub mod state;
pub mod telemetry;

pub use config::ServerConfig;
pub use error::{ServerError, ServerResult};
pub use server::{build_router, start_server};
pub use state::ServerState;
