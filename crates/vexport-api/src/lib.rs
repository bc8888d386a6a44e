//! Axum HTTP API server.
//!
//! This crate provides:
//! - Export submission, lifecycle operations and artifact download
//! - Operator settings management
//! - Health and readiness probes

pub mod config;
pub mod error;
pub mod handlers;
pub mod routes;
pub mod state;

pub use config::ApiConfig;
pub use error::{ApiError, ApiResult};
pub use routes::create_router;
pub use state::AppState;
