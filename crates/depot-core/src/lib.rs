//! Depot Core Library
//!
//! This crate provides the domain model, error types, configuration, and filename
//! validation shared by every Depot component.

pub mod config;
pub mod error;
pub mod models;
pub mod storage_types;
pub mod validation;

// Re-export commonly used types
pub use config::{
    Config, CustomStorageConfig, LocalStorageConfig, ProxyStorageConfig, ServerConfig,
};
pub use error::{AppError, ErrorMetadata, LogLevel};
pub use models::{Pointers, Record, RecordSummary, UploadStatus};
pub use storage_types::StorageBackend;
// Note: StorageHandler, StorageError, StorageResult live in depot-storage
