//! Depot Storage Library
//!
//! This crate provides the storage handler contract and its implementations:
//! the local filesystem handler, the remote proxy relay, and a registry for
//! externally supplied handlers.
//!
//! # Local layout
//!
//! Every upload gets its own directory under the storage root:
//! `{root}/{id}/{name}`, or `{root}/{id}/{id}` when the upload carried no name.
//! Deleting an object removes the per-id directory once it is empty; the root
//! itself is never removed.

pub mod custom;
pub mod factory;
pub mod ingest;
pub mod local;
pub mod proxy;
pub mod traits;

// Re-export commonly used types
pub use custom::{CustomHandlerFactory, CustomHandlerRegistry};
pub use factory::{create_handlers, HandlerRegistry};
pub use local::LocalHandler;
pub use proxy::ProxyHandler;
pub use traits::{
    BoxReader, ByteStream, DownloadResponse, ErrorClass, FilePart, StorageError, StorageHandler,
    StorageResult, UploadBody, UploadOutcome, UploadRequest,
};
