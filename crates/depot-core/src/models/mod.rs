//! Data models for the gateway
//!
//! The metadata record and its satellite types live here.

mod record;

// Re-export all models for convenient imports
pub use record::*;
