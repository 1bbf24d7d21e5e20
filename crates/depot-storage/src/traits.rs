//! Storage handler contract
//!
//! This module defines the [`StorageHandler`] trait that every backend implements,
//! together with the request and response types passed through it. Handlers never
//! see an HTTP server: the caller hands them an [`UploadRequest`] and receives a
//! [`DownloadResponse`] to write out.

use async_trait::async_trait;
use bytes::Bytes;
use depot_core::{AppError, Pointers, Record, StorageBackend};
use futures::Stream;
use http::{HeaderMap, Method};
use std::pin::Pin;
use thiserror::Error;
use tokio::io::AsyncRead;
use uuid::Uuid;

/// Inbound byte source for an upload
pub type BoxReader = Pin<Box<dyn AsyncRead + Send>>;

/// Outbound byte stream for a download
pub type ByteStream = Pin<Box<dyn Stream<Item = Result<Bytes, StorageError>> + Send>>;

/// Storage operation errors
#[derive(Debug, Error)]
pub enum StorageError {
    #[error("Method not allowed: {0}")]
    MethodNotAllowed(String),

    #[error("Multiple files not allowed")]
    MultipleFiles,

    #[error("No file provided")]
    NoFile,

    #[error("Invalid filename: {0}")]
    InvalidFilename(String),

    #[error("Invalid id: {0}")]
    InvalidId(String),

    #[error("File size exceeds maximum limit of {limit} bytes")]
    SizeExceeded { limit: u64 },

    #[error("Storage is full: at most {limit} more bytes can be stored")]
    StorageFull { limit: u64 },

    #[error("Upload failed: {0}")]
    UploadFailed(String),

    #[error("Remote storage error: {0}")]
    Remote(String),

    #[error("File not found: {0}")]
    NotFound(String),

    #[error("Download failed: {0}")]
    DownloadFailed(String),

    #[error("Delete failed: {0}")]
    DeleteFailed(String),

    #[error("Record has no {0} pointer")]
    MissingPointer(&'static str),

    #[error("IO error: {0}")]
    IoError(#[from] std::io::Error),

    #[error("Configuration error: {0}")]
    ConfigError(String),
}

/// Which side of the upload/serve boundary a failure belongs to.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorClass {
    /// Bad upload input. Nothing was stored.
    Client,
    /// The upload could not be completed. Partial artifacts are already removed.
    Upload,
    /// Serving or removing stored bytes failed. Nothing was mutated.
    Server,
}

impl StorageError {
    pub fn class(&self) -> ErrorClass {
        match self {
            StorageError::MethodNotAllowed(_)
            | StorageError::MultipleFiles
            | StorageError::NoFile
            | StorageError::InvalidFilename(_)
            | StorageError::InvalidId(_) => ErrorClass::Client,
            StorageError::SizeExceeded { .. }
            | StorageError::StorageFull { .. }
            | StorageError::UploadFailed(_)
            | StorageError::Remote(_)
            | StorageError::IoError(_) => ErrorClass::Upload,
            StorageError::NotFound(_)
            | StorageError::DownloadFailed(_)
            | StorageError::DeleteFailed(_)
            | StorageError::MissingPointer(_)
            | StorageError::ConfigError(_) => ErrorClass::Server,
        }
    }
}

impl From<StorageError> for AppError {
    fn from(err: StorageError) -> Self {
        match err {
            StorageError::NotFound(msg) => AppError::NotFound(msg),
            StorageError::SizeExceeded { .. } | StorageError::StorageFull { .. } => {
                AppError::PayloadTooLarge(err.to_string())
            }
            other => match other.class() {
                ErrorClass::Client => AppError::Client(other.to_string()),
                ErrorClass::Upload => AppError::Upload(other.to_string()),
                ErrorClass::Server => AppError::Server(other.to_string()),
            },
        }
    }
}

/// Result type for storage operations
pub type StorageResult<T> = Result<T, StorageError>;

/// One file field of a multipart upload
pub struct FilePart {
    pub field_name: Option<String>,
    /// File name supplied by the client for this part
    pub file_name: Option<String>,
    pub reader: BoxReader,
}

/// Inbound body of an upload request
pub enum UploadBody {
    /// Raw request body; the name comes from headers
    Raw(BoxReader),
    /// File fields of a multipart form, in arrival order
    Multipart(Vec<FilePart>),
}

/// Everything a handler may inspect about an upload
pub struct UploadRequest {
    pub method: Method,
    pub headers: HeaderMap,
    pub body: UploadBody,
}

impl UploadRequest {
    pub fn raw(method: Method, headers: HeaderMap, reader: BoxReader) -> Self {
        Self {
            method,
            headers,
            body: UploadBody::Raw(reader),
        }
    }

    pub fn multipart(method: Method, headers: HeaderMap, parts: Vec<FilePart>) -> Self {
        Self {
            method,
            headers,
            body: UploadBody::Multipart(parts),
        }
    }
}

/// What a handler reports after persisting an upload
#[derive(Debug, Clone, PartialEq)]
pub struct UploadOutcome {
    /// Sanitized file name, if the client supplied one
    pub name: Option<String>,
    pub size: u64,
    /// Hex-encoded SHA-256 of the ingested bytes
    pub sha256: String,
    pub pointers: Pointers,
}

/// Headers and body stream for serving a stored object
pub struct DownloadResponse {
    pub headers: HeaderMap,
    pub body: ByteStream,
}

/// Storage handler trait
///
/// Every backend (local filesystem, remote proxy, custom) implements this trait.
/// Failure semantics are shared:
/// - upload errors are classified client / upload via [`StorageError::class`], and
///   the handler removes its own partial artifacts before returning them
/// - download and delete errors leave the stored object untouched
#[async_trait]
pub trait StorageHandler: Send + Sync {
    /// Backend type this handler serves
    fn backend_type(&self) -> StorageBackend;

    /// Consume the upload body for record `id` and persist it.
    async fn handle_upload(&self, id: Uuid, request: UploadRequest) -> StorageResult<UploadOutcome>;

    /// Open the stored bytes of `record` for streaming.
    async fn handle_download(&self, record: &Record) -> StorageResult<DownloadResponse>;

    /// Remove the stored bytes of `record`.
    async fn handle_delete(&self, record: &Record) -> StorageResult<()>;
}
