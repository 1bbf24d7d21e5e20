//! Upload / download / delete orchestration
//!
//! The gateway owns the ordering between the metadata index and the storage
//! handlers. A failed ingestion never leaves a record behind: the placeholder is
//! removed whenever the handler or the final index update fails.

use chrono::Utc;
use depot_core::{AppError, Record, RecordSummary, StorageBackend, UploadStatus};
use depot_db::{MetadataIndex, RecordKey};
use depot_storage::{DownloadResponse, HandlerRegistry, StorageHandler, UploadOutcome, UploadRequest};
use uuid::Uuid;

#[derive(Clone)]
pub struct FileGateway {
    index: MetadataIndex,
    handlers: HandlerRegistry,
    backend: StorageBackend,
}

impl FileGateway {
    /// New uploads go to `backend`; existing records are served by the handler of
    /// their own backend type.
    pub fn new(index: MetadataIndex, handlers: HandlerRegistry, backend: StorageBackend) -> Self {
        Self {
            index,
            handlers,
            backend,
        }
    }

    pub fn index(&self) -> &MetadataIndex {
        &self.index
    }

    /// Ingest one file and return the id of its `AVAILABLE` record.
    #[tracing::instrument(skip(self, request), fields(backend = %self.backend, record_id = tracing::field::Empty))]
    pub async fn upload(&self, request: UploadRequest) -> Result<Uuid, AppError> {
        let handler = self.handlers.resolve(self.backend).await?;

        let id = self.index.create(self.backend, None, 0).await?;
        tracing::Span::current().record("record_id", tracing::field::display(id));

        let outcome = match handler.handle_upload(id, request).await {
            Ok(outcome) => outcome,
            Err(err) => {
                tracing::warn!(record_id = %id, error = %err, class = ?err.class(), "Upload rejected");
                self.discard_record(id).await;
                return Err(err.into());
            }
        };

        let finalized = self
            .index
            .finalize_upload(id, outcome.name.as_deref(), outcome.size, &outcome.pointers)
            .await;
        if let Err(err) = finalized {
            tracing::error!(record_id = %id, error = %err, "Failed to finalize upload");
            self.discard_stored(handler.as_ref(), id, outcome).await;
            self.discard_record(id).await;
            return Err(err);
        }

        tracing::info!(record_id = %id, size_bytes = outcome.size, sha256 = %outcome.sha256, "Upload stored");
        Ok(id)
    }

    /// Open an available record for streaming and count the download.
    #[tracing::instrument(skip(self, key))]
    pub async fn download(
        &self,
        key: impl RecordKey,
    ) -> Result<(Record, DownloadResponse), AppError> {
        let record = self.available_record(&key).await?;
        let handler = self.handlers.resolve(record.backend).await?;

        let response = handler.handle_download(&record).await?;
        self.index.increment_download(&record).await?;

        Ok((record, response))
    }

    /// Remove the stored bytes, then the record. A storage failure leaves the
    /// record untouched.
    #[tracing::instrument(skip(self, key))]
    pub async fn delete(&self, key: impl RecordKey) -> Result<(), AppError> {
        let id = key.record_id()?;
        let record = self
            .index
            .get(id)
            .await?
            .ok_or_else(|| AppError::NotFound(format!("File {} not found", id)))?;
        let handler = self.handlers.resolve(record.backend).await?;

        handler.handle_delete(&record).await?;
        self.index.delete(&record).await?;

        tracing::info!(record_id = %id, backend = %record.backend, "File deleted");
        Ok(())
    }

    pub async fn list(&self, page: i64, limit: i64) -> Result<Vec<RecordSummary>, AppError> {
        self.index.list_summaries(page, limit).await
    }

    async fn available_record(&self, key: &impl RecordKey) -> Result<Record, AppError> {
        let id = key.record_id()?;
        match self.index.get(id).await? {
            Some(record) if record.is_available() => Ok(record),
            Some(record) => Err(AppError::NotFound(format!(
                "File {} is not available ({})",
                id, record.status
            ))),
            None => Err(AppError::NotFound(format!("File {} not found", id))),
        }
    }

    async fn discard_record(&self, id: Uuid) {
        if let Err(err) = self.index.delete(id).await {
            tracing::error!(record_id = %id, error = %err, "Failed to remove placeholder record");
        }
    }

    /// Remove bytes a handler already persisted for an upload that could not be
    /// finalized.
    async fn discard_stored(&self, handler: &dyn StorageHandler, id: Uuid, outcome: UploadOutcome) {
        let record = Record {
            id,
            status: UploadStatus::Uploading,
            name: outcome.name,
            size: outcome.size,
            backend: self.backend,
            pointers: Some(outcome.pointers),
            created: Utc::now(),
        };
        if let Err(err) = handler.handle_delete(&record).await {
            tracing::error!(record_id = %id, error = %err, "Failed to remove orphaned upload");
        }
    }
}
