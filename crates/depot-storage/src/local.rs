use crate::ingest::{
    attachment_disposition, ensure_upload_method, resolve_source, validate_file_name,
    IngestMeter, CHUNK_SIZE,
};
use crate::traits::{
    BoxReader, DownloadResponse, StorageError, StorageHandler, StorageResult, UploadOutcome,
    UploadRequest,
};
use async_trait::async_trait;
use depot_core::validation::FilenamePolicy;
use depot_core::{LocalStorageConfig, Pointers, Record, StorageBackend};
use futures::StreamExt;
use http::header::{CONTENT_DISPOSITION, CONTENT_LENGTH, CONTENT_TYPE};
use http::{HeaderMap, HeaderValue};
use std::io::ErrorKind;
use std::path::{Component, Path, PathBuf};
use tokio::fs;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use uuid::Uuid;

/// Local filesystem storage handler
#[derive(Clone)]
pub struct LocalHandler {
    root: PathBuf,
    config: LocalStorageConfig,
}

impl LocalHandler {
    /// Create a handler rooted at `config.storage_directory`, creating it if needed.
    pub async fn new(config: LocalStorageConfig) -> StorageResult<Self> {
        let root = config.storage_directory.clone();

        fs::create_dir_all(&root).await.map_err(|e| {
            StorageError::ConfigError(format!(
                "Failed to create storage directory {}: {}",
                root.display(),
                e
            ))
        })?;

        Ok(LocalHandler { root, config })
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    /// `{root}/{id}/{name or id}`
    fn object_path(&self, id: Uuid, name: Option<&str>) -> PathBuf {
        let id = id.to_string();
        let file_name = name.unwrap_or(&id);
        self.root.join(&id).join(file_name)
    }

    /// Resolve the stored path of `record`, refusing anything outside the root.
    fn record_path(&self, record: &Record) -> StorageResult<PathBuf> {
        let path = PathBuf::from(
            record
                .pointer("filepath")
                .ok_or(StorageError::MissingPointer("filepath"))?,
        );

        let escapes = path
            .components()
            .any(|c| matches!(c, Component::ParentDir));
        if escapes || !path.starts_with(&self.root) {
            return Err(StorageError::NotFound(format!(
                "{} is outside the storage directory",
                path.display()
            )));
        }

        Ok(path)
    }

    /// Bytes currently stored under the root.
    async fn used_bytes(&self) -> StorageResult<u64> {
        let mut total = 0u64;
        let mut pending = vec![self.root.clone()];

        while let Some(dir) = pending.pop() {
            let mut entries = fs::read_dir(&dir).await?;
            while let Some(entry) = entries.next_entry().await? {
                let file_type = entry.file_type().await?;
                if file_type.is_dir() {
                    pending.push(entry.path());
                } else if file_type.is_file() {
                    total += entry.metadata().await?.len();
                }
            }
        }

        Ok(total)
    }

    /// Copy `reader` into `path` chunk by chunk, checking each chunk before it is written.
    async fn write_stream(
        &self,
        mut reader: BoxReader,
        path: &Path,
        mut meter: IngestMeter,
    ) -> StorageResult<IngestMeter> {
        let mut file = fs::File::create(path).await.map_err(|e| {
            StorageError::UploadFailed(format!("Failed to create file {}: {}", path.display(), e))
        })?;

        let mut buf = vec![0u8; CHUNK_SIZE];
        loop {
            let n = reader.read(&mut buf).await.map_err(|e| {
                StorageError::UploadFailed(format!("Failed to read upload stream: {}", e))
            })?;
            if n == 0 {
                break;
            }

            meter.admit(&buf[..n])?;

            file.write_all(&buf[..n]).await.map_err(|e| {
                StorageError::UploadFailed(format!(
                    "Failed to write file {}: {}",
                    path.display(),
                    e
                ))
            })?;
        }

        file.sync_all().await.map_err(|e| {
            StorageError::UploadFailed(format!("Failed to sync file {}: {}", path.display(), e))
        })?;

        Ok(meter)
    }

    /// Remove `dir` if it is an empty per-id directory. The root is kept.
    async fn remove_dir_if_empty(&self, dir: &Path) -> StorageResult<()> {
        if dir == self.root || !dir.starts_with(&self.root) {
            return Ok(());
        }

        let mut entries = match fs::read_dir(dir).await {
            Ok(entries) => entries,
            Err(e) if e.kind() == ErrorKind::NotFound => return Ok(()),
            Err(e) => return Err(e.into()),
        };
        if entries.next_entry().await?.is_none() {
            fs::remove_dir(dir).await?;
        }
        Ok(())
    }

    async fn discard_partial(&self, path: &Path) {
        if let Err(e) = fs::remove_file(path).await {
            if e.kind() != ErrorKind::NotFound {
                tracing::warn!(path = %path.display(), error = %e, "Failed to remove partial upload");
            }
        }
        if let Some(dir) = path.parent() {
            if let Err(e) = self.remove_dir_if_empty(dir).await {
                tracing::warn!(path = %dir.display(), error = %e, "Failed to remove upload directory");
            }
        }
    }
}

#[async_trait]
impl StorageHandler for LocalHandler {
    fn backend_type(&self) -> StorageBackend {
        StorageBackend::Local
    }

    async fn handle_upload(&self, id: Uuid, request: UploadRequest) -> StorageResult<UploadOutcome> {
        ensure_upload_method(&request.method)?;

        let source = resolve_source(request.body, &request.headers)?;
        let name = validate_file_name(source.file_name, FilenamePolicy::AllowSpaces)?;

        let mut meter = IngestMeter::new(self.config.max_file_size);
        if self.config.max_storage_size > 0 {
            let used = self.used_bytes().await?;
            meter = meter.with_storage_remaining(self.config.max_storage_size.saturating_sub(used));
        }

        let path = self.object_path(id, name.as_deref());
        if let Some(dir) = path.parent() {
            fs::create_dir_all(dir).await.map_err(|e| {
                StorageError::UploadFailed(format!(
                    "Failed to create directory {}: {}",
                    dir.display(),
                    e
                ))
            })?;
        }

        let start = std::time::Instant::now();

        let meter = match self.write_stream(source.reader, &path, meter).await {
            Ok(meter) => meter,
            Err(e) => {
                self.discard_partial(&path).await;
                tracing::warn!(
                    path = %path.display(),
                    record_id = %id,
                    error = %e,
                    "Local storage upload rejected"
                );
                return Err(e);
            }
        };
        let (size, sha256) = meter.finish();

        tracing::info!(
            path = %path.display(),
            record_id = %id,
            multipart = source.multipart,
            size_bytes = size,
            duration_ms = start.elapsed().as_secs_f64() * 1000.0,
            "Local storage upload successful"
        );

        let pointers = Pointers::new()
            .with("filename", name.as_deref())
            .with("filepath", Some(path.display().to_string()))
            .with("size", Some(size.to_string()))
            .with("sha256", Some(sha256.as_str()));

        Ok(UploadOutcome {
            name,
            size,
            sha256,
            pointers,
        })
    }

    async fn handle_download(&self, record: &Record) -> StorageResult<DownloadResponse> {
        let path = self.record_path(record)?;

        let file = match fs::File::open(&path).await {
            Ok(file) => file,
            Err(e) if e.kind() == ErrorKind::NotFound => {
                return Err(StorageError::NotFound(path.display().to_string()));
            }
            Err(e) => {
                return Err(StorageError::DownloadFailed(format!(
                    "Failed to open file {}: {}",
                    path.display(),
                    e
                )));
            }
        };

        let mut headers = HeaderMap::new();
        headers.insert(
            CONTENT_TYPE,
            HeaderValue::from_static("application/octet-stream"),
        );
        if self.config.return_content_size {
            headers.insert(CONTENT_LENGTH, HeaderValue::from(record.size));
        }
        headers.insert(
            CONTENT_DISPOSITION,
            attachment_disposition(&record.display_name())?,
        );

        let path_display = path.display().to_string();
        let stream = tokio_util::io::ReaderStream::with_capacity(file, CHUNK_SIZE).map(
            move |result| {
                result.map_err(|e| {
                    tracing::error!(path = %path_display, error = %e, "Local storage stream download error");
                    StorageError::DownloadFailed(format!("Failed to read chunk: {}", e))
                })
            },
        );

        tracing::info!(
            path = %path.display(),
            record_id = %record.id,
            size_bytes = record.size,
            "Local storage download started"
        );

        Ok(DownloadResponse {
            headers,
            body: Box::pin(stream),
        })
    }

    async fn handle_delete(&self, record: &Record) -> StorageResult<()> {
        let path = self.record_path(record)?;
        let start = std::time::Instant::now();

        match fs::remove_file(&path).await {
            Ok(()) => {}
            Err(e) if e.kind() == ErrorKind::NotFound => {
                tracing::debug!(path = %path.display(), "Local file already absent");
            }
            Err(e) => {
                return Err(StorageError::DeleteFailed(format!(
                    "Failed to delete file {}: {}",
                    path.display(),
                    e
                )));
            }
        }

        if let Some(dir) = path.parent() {
            self.remove_dir_if_empty(dir).await.map_err(|e| {
                StorageError::DeleteFailed(format!(
                    "Failed to remove directory {}: {}",
                    dir.display(),
                    e
                ))
            })?;
        }

        tracing::info!(
            path = %path.display(),
            record_id = %record.id,
            duration_ms = start.elapsed().as_secs_f64() * 1000.0,
            "Local storage delete successful"
        );

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use bytes::Bytes;
    use chrono::Utc;
    use depot_core::UploadStatus;
    use futures::TryStreamExt;
    use http::Method;
    use tempfile::{tempdir, TempDir};

    async fn handler_with(max_file_size: u64, max_storage_size: u64) -> (LocalHandler, TempDir) {
        let dir = tempdir().unwrap();
        let handler = LocalHandler::new(LocalStorageConfig {
            storage_directory: dir.path().join("store"),
            max_file_size,
            max_storage_size,
            return_content_size: true,
        })
        .await
        .unwrap();
        (handler, dir)
    }

    fn raw_request(data: Vec<u8>, filename: Option<&str>) -> UploadRequest {
        let mut headers = HeaderMap::new();
        if let Some(name) = filename {
            headers.insert("x-filename", HeaderValue::from_str(name).unwrap());
        }
        UploadRequest::raw(
            Method::POST,
            headers,
            Box::pin(std::io::Cursor::new(data)),
        )
    }

    fn record_for(id: Uuid, outcome: &UploadOutcome) -> Record {
        Record {
            id,
            status: UploadStatus::Available,
            name: outcome.name.clone(),
            size: outcome.size,
            backend: StorageBackend::Local,
            pointers: Some(outcome.pointers.clone()),
            created: Utc::now(),
        }
    }

    async fn collect(response: DownloadResponse) -> Vec<u8> {
        let chunks: Vec<Bytes> = response.body.try_collect().await.unwrap();
        chunks.concat()
    }

    #[tokio::test]
    async fn test_upload_download_roundtrip() {
        let (handler, _dir) = handler_with(1024 * 1024, 0).await;
        let id = Uuid::new_v4();
        let data: Vec<u8> = (0..20_000u32).map(|i| (i % 251) as u8).collect();

        let outcome = handler
            .handle_upload(id, raw_request(data.clone(), Some("report.bin")))
            .await
            .unwrap();
        assert_eq!(outcome.size, data.len() as u64);
        assert_eq!(outcome.name.as_deref(), Some("report.bin"));
        assert_eq!(outcome.sha256.len(), 64);
        assert_eq!(outcome.pointers.get("sha256"), Some(outcome.sha256.as_str()));

        let expected_path = handler.root().join(id.to_string()).join("report.bin");
        assert_eq!(
            outcome.pointers.get("filepath"),
            Some(expected_path.display().to_string().as_str())
        );

        let record = record_for(id, &outcome);
        let response = handler.handle_download(&record).await.unwrap();
        assert_eq!(response.headers[CONTENT_TYPE], "application/octet-stream");
        assert_eq!(response.headers[CONTENT_LENGTH], "20000");
        assert_eq!(
            response.headers[CONTENT_DISPOSITION],
            "attachment; filename=\"report.bin\""
        );
        assert_eq!(collect(response).await, data);
    }

    #[tokio::test]
    async fn test_upload_without_name_uses_id() {
        let (handler, _dir) = handler_with(1024, 0).await;
        let id = Uuid::new_v4();

        let outcome = handler
            .handle_upload(id, raw_request(b"abc".to_vec(), None))
            .await
            .unwrap();
        assert_eq!(outcome.name, None);
        assert_eq!(outcome.pointers.get("filename"), None);
        assert!(handler
            .root()
            .join(id.to_string())
            .join(id.to_string())
            .exists());

        let record = record_for(id, &outcome);
        let response = handler.handle_download(&record).await.unwrap();
        assert_eq!(
            response.headers[CONTENT_DISPOSITION],
            format!("attachment; filename=\"{}\"", id).as_str()
        );
    }

    #[tokio::test]
    async fn test_exact_limit_succeeds_and_one_more_fails() {
        let (handler, _dir) = handler_with(10_000, 0).await;

        let ok = handler
            .handle_upload(Uuid::new_v4(), raw_request(vec![7u8; 10_000], Some("a.bin")))
            .await
            .unwrap();
        assert_eq!(ok.size, 10_000);

        let id = Uuid::new_v4();
        let err = handler
            .handle_upload(id, raw_request(vec![7u8; 10_001], Some("b.bin")))
            .await
            .unwrap_err();
        assert!(matches!(err, StorageError::SizeExceeded { limit: 10_000 }));
        assert!(!handler.root().join(id.to_string()).exists());
    }

    #[tokio::test]
    async fn test_storage_quota() {
        let (handler, _dir) = handler_with(1024, 1500).await;

        handler
            .handle_upload(Uuid::new_v4(), raw_request(vec![1u8; 1000], None))
            .await
            .unwrap();

        let id = Uuid::new_v4();
        let err = handler
            .handle_upload(id, raw_request(vec![1u8; 600], None))
            .await
            .unwrap_err();
        assert!(matches!(err, StorageError::StorageFull { limit: 500 }));
        assert!(!handler.root().join(id.to_string()).exists());
    }

    #[tokio::test]
    async fn test_rejects_bad_input() {
        let (handler, _dir) = handler_with(1024, 0).await;

        let err = handler
            .handle_upload(Uuid::new_v4(), raw_request(b"x".to_vec(), Some("a%3Cb.txt")))
            .await
            .unwrap_err();
        assert!(matches!(err, StorageError::InvalidFilename(_)));

        let request = UploadRequest::raw(
            Method::GET,
            HeaderMap::new(),
            Box::pin(std::io::Cursor::new(Vec::new())),
        );
        let err = handler
            .handle_upload(Uuid::new_v4(), request)
            .await
            .unwrap_err();
        assert!(matches!(err, StorageError::MethodNotAllowed(_)));

        let mut entries = fs::read_dir(handler.root()).await.unwrap();
        assert!(entries.next_entry().await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_traversal_name_is_reduced_to_basename() {
        let (handler, _dir) = handler_with(1024, 0).await;
        let id = Uuid::new_v4();

        let outcome = handler
            .handle_upload(id, raw_request(b"x".to_vec(), Some("..%2F..%2Fetc%2Fpasswd")))
            .await
            .unwrap();
        assert_eq!(outcome.name.as_deref(), Some("passwd"));
        assert!(handler.root().join(id.to_string()).join("passwd").exists());
    }

    #[tokio::test]
    async fn test_download_of_externally_removed_file_is_not_found() {
        let (handler, _dir) = handler_with(1024, 0).await;
        let id = Uuid::new_v4();
        let outcome = handler
            .handle_upload(id, raw_request(b"data".to_vec(), Some("a.txt")))
            .await
            .unwrap();
        let record = record_for(id, &outcome);

        std::fs::remove_file(record.pointer("filepath").unwrap()).unwrap();

        let err = handler.handle_download(&record).await.err().unwrap();
        assert!(matches!(err, StorageError::NotFound(_)));
    }

    #[tokio::test]
    async fn test_delete_removes_file_and_directory_but_not_root() {
        let (handler, _dir) = handler_with(1024, 0).await;
        let id = Uuid::new_v4();
        let outcome = handler
            .handle_upload(id, raw_request(b"data".to_vec(), Some("a.txt")))
            .await
            .unwrap();
        let record = record_for(id, &outcome);

        handler.handle_delete(&record).await.unwrap();

        assert!(!handler.root().join(id.to_string()).exists());
        assert!(handler.root().exists());

        // Deleting again is harmless.
        handler.handle_delete(&record).await.unwrap();
    }

    #[tokio::test]
    async fn test_rejects_pointer_outside_root() {
        let (handler, dir) = handler_with(1024, 0).await;
        let outside = dir.path().join("secret.txt");
        std::fs::write(&outside, b"secret").unwrap();

        let record = Record {
            id: Uuid::new_v4(),
            status: UploadStatus::Available,
            name: None,
            size: 6,
            backend: StorageBackend::Local,
            pointers: Some(Pointers::new().with("filepath", Some(outside.display().to_string()))),
            created: Utc::now(),
        };

        assert!(handler.handle_download(&record).await.is_err());
        assert!(handler.handle_delete(&record).await.is_err());
        assert!(outside.exists());
    }
}
