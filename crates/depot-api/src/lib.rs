//! Depot HTTP surface
//!
//! Thin axum layer over the [`FileGateway`](services::FileGateway): routing,
//! password checks, error rendering and process setup.

pub mod auth;
pub mod error;
pub mod handlers;
pub mod middleware;
pub mod services;
pub mod setup;
pub mod state;
pub mod telemetry;

pub use error::{ErrorResponse, HttpAppError};
pub use services::FileGateway;
pub use state::AppState;
