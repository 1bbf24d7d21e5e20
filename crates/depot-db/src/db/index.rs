//! Metadata index: CRUD and lifecycle transitions over upload records.
//!
//! Every upload owns one row in `uploads` and one row in `statistics`. Both are
//! created and deleted together inside a single transaction so listings can
//! always join them.

use chrono::{DateTime, Utc};
use depot_core::models::RecordRow;
use depot_core::validation::{sanitize_filename, FilenamePolicy};
use depot_core::{AppError, Pointers, Record, RecordSummary, StorageBackend, UploadStatus};
use sqlx::SqlitePool;
use uuid::Uuid;

use super::key::RecordKey;

const RECORD_COLUMNS: &str = "id, storage_type, name, size, status, pointers, created";

/// Row type for the joined uploads/statistics listing.
#[derive(Debug, sqlx::FromRow)]
struct SummaryRow {
    id: String,
    name: Option<String>,
    size: i64,
    status: UploadStatus,
    created: DateTime<Utc>,
    downloads: Option<i64>,
    last_download: Option<DateTime<Utc>>,
}

impl SummaryRow {
    fn to_summary(self) -> Result<RecordSummary, AppError> {
        let uuid = Uuid::parse_str(&self.id)
            .map_err(|_| AppError::NotFound(format!("Record {} is malformed: invalid id", self.id)))?;
        Ok(RecordSummary {
            uuid,
            name: self.name.unwrap_or_else(|| uuid.to_string()),
            size: u64::try_from(self.size).unwrap_or(0),
            status: self.status,
            created: self.created,
            last_download: self.last_download,
            downloads: self.downloads.unwrap_or(0),
        })
    }
}

/// Names stored in the index must already be a clean basename.
fn validate_name(name: &str) -> Result<(), AppError> {
    let sanitized = sanitize_filename(name, FilenamePolicy::AllowSpaces)
        .map_err(|e| AppError::Validation(format!("Invalid name {:?}: {}", name, e)))?;
    if sanitized != name {
        return Err(AppError::Validation(format!(
            "Invalid name {:?}: directory components are not allowed",
            name
        )));
    }
    Ok(())
}

fn validate_size(size: i64) -> Result<(), AppError> {
    if size < 0 {
        return Err(AppError::Validation(format!(
            "Size must be non-negative, got {}",
            size
        )));
    }
    Ok(())
}

fn page_offset(page: i64, limit: i64) -> Result<i64, AppError> {
    if page < 1 {
        return Err(AppError::Validation(format!("Page must be >= 1, got {}", page)));
    }
    if limit < 1 {
        return Err(AppError::Validation(format!("Limit must be >= 1, got {}", limit)));
    }
    (page - 1)
        .checked_mul(limit)
        .ok_or_else(|| AppError::Validation("Page is out of range".to_string()))
}

fn not_found(id: Uuid) -> AppError {
    AppError::NotFound(format!("Record {} not found", id))
}

fn record_span(id: Uuid) {
    tracing::Span::current().record("db.record_id", tracing::field::display(id));
}

/// Repository over the `uploads` and `statistics` tables
#[derive(Clone)]
pub struct MetadataIndex {
    pool: SqlitePool,
}

impl MetadataIndex {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }

    pub fn pool(&self) -> &SqlitePool {
        &self.pool
    }

    /// Create a placeholder record in `UPLOADING` together with its statistics row.
    #[tracing::instrument(
        skip(self),
        fields(db.table = "uploads", db.operation = "insert", db.record_id = tracing::field::Empty)
    )]
    pub async fn create(
        &self,
        backend: StorageBackend,
        name: Option<&str>,
        size: i64,
    ) -> Result<Uuid, AppError> {
        if let Some(name) = name {
            validate_name(name)?;
        }
        validate_size(size)?;

        let id = Uuid::new_v4();
        record_span(id);
        let created = Utc::now();

        let mut tx = self.pool.begin().await?;

        sqlx::query(
            r#"
            INSERT INTO uploads (id, storage_type, name, size, status, pointers, created)
            VALUES (?, ?, ?, ?, ?, NULL, ?)
            "#,
        )
        .bind(id.to_string())
        .bind(backend)
        .bind(name)
        .bind(size)
        .bind(UploadStatus::Uploading)
        .bind(created)
        .execute(&mut *tx)
        .await?;

        sqlx::query("INSERT INTO statistics (id, downloads, last_download) VALUES (?, 0, NULL)")
            .bind(id.to_string())
            .execute(&mut *tx)
            .await?;

        tx.commit().await?;

        tracing::debug!(record_id = %id, backend = %backend, "Record created");
        Ok(id)
    }

    #[tracing::instrument(
        skip(self, key),
        fields(db.table = "uploads", db.operation = "select", db.record_id = tracing::field::Empty)
    )]
    pub async fn get(&self, key: impl RecordKey) -> Result<Option<Record>, AppError> {
        let id = key.record_id()?;
        record_span(id);

        let row: Option<RecordRow> = sqlx::query_as::<_, RecordRow>(&format!(
            "SELECT {} FROM uploads WHERE id = ?",
            RECORD_COLUMNS
        ))
        .bind(id.to_string())
        .fetch_optional(&self.pool)
        .await?;

        row.map(RecordRow::into_record).transpose()
    }

    #[tracing::instrument(
        skip(self, key),
        fields(db.table = "uploads", db.operation = "select", db.record_id = tracing::field::Empty)
    )]
    pub async fn exists(&self, key: impl RecordKey) -> Result<bool, AppError> {
        let id = key.record_id()?;
        record_span(id);

        let found: Option<i64> = sqlx::query_scalar("SELECT 1 FROM uploads WHERE id = ?")
            .bind(id.to_string())
            .fetch_optional(&self.pool)
            .await?;
        Ok(found.is_some())
    }

    /// Remove a record and its statistics row.
    #[tracing::instrument(
        skip(self, key),
        fields(db.table = "uploads", db.operation = "delete", db.record_id = tracing::field::Empty)
    )]
    pub async fn delete(&self, key: impl RecordKey) -> Result<(), AppError> {
        let id = key.record_id()?;
        record_span(id);

        let mut tx = self.pool.begin().await?;

        sqlx::query("DELETE FROM statistics WHERE id = ?")
            .bind(id.to_string())
            .execute(&mut *tx)
            .await?;

        let result = sqlx::query("DELETE FROM uploads WHERE id = ?")
            .bind(id.to_string())
            .execute(&mut *tx)
            .await?;

        if result.rows_affected() == 0 {
            tx.rollback().await?;
            return Err(not_found(id));
        }

        tx.commit().await?;
        tracing::debug!(record_id = %id, "Record deleted");
        Ok(())
    }

    /// Records ordered by creation time, oldest first.
    #[tracing::instrument(skip(self), fields(db.table = "uploads", db.operation = "select"))]
    pub async fn list(&self, page: i64, limit: i64) -> Result<Vec<Record>, AppError> {
        let offset = page_offset(page, limit)?;

        let rows: Vec<RecordRow> = sqlx::query_as::<_, RecordRow>(&format!(
            "SELECT {} FROM uploads ORDER BY created ASC, rowid ASC LIMIT ? OFFSET ?",
            RECORD_COLUMNS
        ))
        .bind(limit)
        .bind(offset)
        .fetch_all(&self.pool)
        .await?;

        rows.into_iter().map(RecordRow::into_record).collect()
    }

    /// Same ordering and paging as [`list`](Self::list), joined with download statistics.
    #[tracing::instrument(skip(self), fields(db.table = "uploads", db.operation = "select"))]
    pub async fn list_summaries(
        &self,
        page: i64,
        limit: i64,
    ) -> Result<Vec<RecordSummary>, AppError> {
        let offset = page_offset(page, limit)?;

        let rows: Vec<SummaryRow> = sqlx::query_as::<_, SummaryRow>(
            r#"
            SELECT u.id, u.name, u.size, u.status, u.created, s.downloads, s.last_download
            FROM uploads u
            LEFT JOIN statistics s ON s.id = u.id
            ORDER BY u.created ASC, u.rowid ASC
            LIMIT ? OFFSET ?
            "#,
        )
        .bind(limit)
        .bind(offset)
        .fetch_all(&self.pool)
        .await?;

        rows.into_iter().map(SummaryRow::to_summary).collect()
    }

    #[tracing::instrument(
        skip(self, key),
        fields(db.table = "uploads", db.operation = "update", db.record_id = tracing::field::Empty)
    )]
    pub async fn update_name(&self, key: impl RecordKey, name: &str) -> Result<(), AppError> {
        let id = key.record_id()?;
        record_span(id);
        validate_name(name)?;

        let result = sqlx::query("UPDATE uploads SET name = ? WHERE id = ?")
            .bind(name)
            .bind(id.to_string())
            .execute(&self.pool)
            .await?;
        if result.rows_affected() == 0 {
            return Err(not_found(id));
        }
        Ok(())
    }

    #[tracing::instrument(
        skip(self, key),
        fields(db.table = "uploads", db.operation = "update", db.record_id = tracing::field::Empty)
    )]
    pub async fn update_size(&self, key: impl RecordKey, size: i64) -> Result<(), AppError> {
        let id = key.record_id()?;
        record_span(id);
        validate_size(size)?;

        let result = sqlx::query("UPDATE uploads SET size = ? WHERE id = ?")
            .bind(size)
            .bind(id.to_string())
            .execute(&self.pool)
            .await?;
        if result.rows_affected() == 0 {
            return Err(not_found(id));
        }
        Ok(())
    }

    #[tracing::instrument(
        skip(self, key),
        fields(db.table = "uploads", db.operation = "update", db.record_id = tracing::field::Empty)
    )]
    pub async fn update_status(
        &self,
        key: impl RecordKey,
        status: UploadStatus,
    ) -> Result<(), AppError> {
        let id = key.record_id()?;
        record_span(id);

        let result = sqlx::query("UPDATE uploads SET status = ? WHERE id = ?")
            .bind(status)
            .bind(id.to_string())
            .execute(&self.pool)
            .await?;
        if result.rows_affected() == 0 {
            return Err(not_found(id));
        }
        Ok(())
    }

    #[tracing::instrument(
        skip(self, key, pointers),
        fields(db.table = "uploads", db.operation = "update", db.record_id = tracing::field::Empty)
    )]
    pub async fn update_pointers(
        &self,
        key: impl RecordKey,
        pointers: &Pointers,
    ) -> Result<(), AppError> {
        let id = key.record_id()?;
        record_span(id);
        let encoded = pointers.to_json()?;

        let result = sqlx::query("UPDATE uploads SET pointers = ? WHERE id = ?")
            .bind(encoded)
            .bind(id.to_string())
            .execute(&self.pool)
            .await?;
        if result.rows_affected() == 0 {
            return Err(not_found(id));
        }
        Ok(())
    }

    /// Mark an upload `AVAILABLE` with its final name, size and pointers.
    ///
    /// Only records still in `UPLOADING` can be finalized. A `None` name keeps
    /// the stored one.
    #[tracing::instrument(
        skip(self, key, pointers),
        fields(db.table = "uploads", db.operation = "update", db.record_id = tracing::field::Empty)
    )]
    pub async fn finalize_upload(
        &self,
        key: impl RecordKey,
        name: Option<&str>,
        size: u64,
        pointers: &Pointers,
    ) -> Result<(), AppError> {
        let id = key.record_id()?;
        record_span(id);
        if let Some(name) = name {
            validate_name(name)?;
        }
        let size = i64::try_from(size)
            .map_err(|_| AppError::Validation(format!("Size {} is out of range", size)))?;
        let encoded = pointers.to_json()?;

        let mut tx = self.pool.begin().await?;

        let result = sqlx::query(
            r#"
            UPDATE uploads
            SET name = COALESCE(?, name), size = ?, pointers = ?, status = ?
            WHERE id = ? AND status = ?
            "#,
        )
        .bind(name)
        .bind(size)
        .bind(encoded)
        .bind(UploadStatus::Available)
        .bind(id.to_string())
        .bind(UploadStatus::Uploading)
        .execute(&mut *tx)
        .await?;

        if result.rows_affected() == 0 {
            tx.rollback().await?;
            return Err(AppError::NotFound(format!(
                "Record {} not found or not awaiting upload",
                id
            )));
        }

        tx.commit().await?;
        tracing::debug!(record_id = %id, size_bytes = size, "Upload finalized");
        Ok(())
    }

    /// Bump the download counter and stamp the last download time.
    #[tracing::instrument(
        skip(self, key),
        fields(db.table = "statistics", db.operation = "update", db.record_id = tracing::field::Empty)
    )]
    pub async fn increment_download(&self, key: impl RecordKey) -> Result<(), AppError> {
        let id = key.record_id()?;
        record_span(id);

        let result = sqlx::query(
            "UPDATE statistics SET downloads = downloads + 1, last_download = ? WHERE id = ?",
        )
        .bind(Utc::now())
        .bind(id.to_string())
        .execute(&self.pool)
        .await?;
        if result.rows_affected() == 0 {
            return Err(not_found(id));
        }
        Ok(())
    }

    #[tracing::instrument(
        skip(self, key),
        fields(db.table = "statistics", db.operation = "select", db.record_id = tracing::field::Empty)
    )]
    pub async fn download_count(&self, key: impl RecordKey) -> Result<i64, AppError> {
        let id = key.record_id()?;
        record_span(id);

        sqlx::query_scalar::<_, i64>("SELECT downloads FROM statistics WHERE id = ?")
            .bind(id.to_string())
            .fetch_optional(&self.pool)
            .await?
            .ok_or_else(|| not_found(id))
    }

    #[tracing::instrument(
        skip(self, key),
        fields(db.table = "statistics", db.operation = "select", db.record_id = tracing::field::Empty)
    )]
    pub async fn last_download(
        &self,
        key: impl RecordKey,
    ) -> Result<Option<DateTime<Utc>>, AppError> {
        let id = key.record_id()?;
        record_span(id);

        let row: Option<(Option<DateTime<Utc>>,)> =
            sqlx::query_as("SELECT last_download FROM statistics WHERE id = ?")
                .bind(id.to_string())
                .fetch_optional(&self.pool)
                .await?;
        row.map(|(last,)| last).ok_or_else(|| not_found(id))
    }
}
