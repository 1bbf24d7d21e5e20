use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt::{Display, Formatter, Result as FmtResult};
use std::str::FromStr;
use uuid::Uuid;

#[cfg(feature = "sqlx")]
use sqlx::FromRow;

use crate::error::AppError;
use crate::storage_types::StorageBackend;

/// Lifecycle status of a stored object.
///
/// Records start in `Uploading` and move to `Available` once the handler has
/// persisted the bytes. `Deleted` and `Missing` are reserved for a future
/// reconciliation job and are never set by the gateway itself.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[cfg_attr(feature = "sqlx", derive(sqlx::Type))]
#[cfg_attr(feature = "sqlx", sqlx(rename_all = "UPPERCASE"))]
#[serde(rename_all = "UPPERCASE")]
pub enum UploadStatus {
    Uploading,
    Available,
    Deleted,
    Missing,
}

impl FromStr for UploadStatus {
    type Err = AppError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_uppercase().as_str() {
            "UPLOADING" => Ok(UploadStatus::Uploading),
            "AVAILABLE" => Ok(UploadStatus::Available),
            "DELETED" => Ok(UploadStatus::Deleted),
            "MISSING" => Ok(UploadStatus::Missing),
            _ => Err(AppError::Validation(format!("Invalid upload status: {}", s))),
        }
    }
}

impl Display for UploadStatus {
    fn fmt(&self, f: &mut Formatter<'_>) -> FmtResult {
        match self {
            UploadStatus::Uploading => write!(f, "UPLOADING"),
            UploadStatus::Available => write!(f, "AVAILABLE"),
            UploadStatus::Deleted => write!(f, "DELETED"),
            UploadStatus::Missing => write!(f, "MISSING"),
        }
    }
}

/// Backend-specific locator data for a stored object.
///
/// Opaque to the metadata index: only the handler that produced the pointers
/// interprets them (a local file path, or a remote URL plus remote id).
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Pointers(BTreeMap<String, String>);

impl Pointers {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&mut self, key: impl Into<String>, value: impl Into<String>) {
        self.0.insert(key.into(), value.into());
    }

    /// Builder-style insert that skips absent values.
    pub fn with(mut self, key: &str, value: Option<impl Into<String>>) -> Self {
        if let Some(value) = value {
            self.insert(key, value);
        }
        self
    }

    pub fn get(&self, key: &str) -> Option<&str> {
        self.0.get(key).map(String::as_str)
    }

    pub fn to_json(&self) -> Result<String, AppError> {
        Ok(serde_json::to_string(&self.0)?)
    }

    pub fn from_json(raw: &str) -> Result<Self, AppError> {
        Ok(Pointers(serde_json::from_str(raw)?))
    }
}

/// Persisted description of one uploaded object.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Record {
    pub id: Uuid,
    pub status: UploadStatus,
    pub name: Option<String>,
    pub size: u64,
    pub backend: StorageBackend,
    pub pointers: Option<Pointers>,
    pub created: DateTime<Utc>,
}

impl Record {
    /// Name shown to clients; falls back to the id when no name was given.
    pub fn display_name(&self) -> String {
        match &self.name {
            Some(name) => name.clone(),
            None => self.id.to_string(),
        }
    }

    /// Fetch a pointer entry, if the record has pointers at all.
    pub fn pointer(&self, key: &str) -> Option<&str> {
        self.pointers.as_ref().and_then(|p| p.get(key))
    }

    pub fn is_available(&self) -> bool {
        self.status == UploadStatus::Available
    }
}

/// Row type for the `uploads` table.
#[derive(Debug, Clone)]
#[cfg_attr(feature = "sqlx", derive(FromRow))]
pub struct RecordRow {
    pub id: String,
    pub storage_type: StorageBackend,
    pub name: Option<String>,
    pub size: i64,
    pub status: UploadStatus,
    pub pointers: Option<String>,
    pub created: DateTime<Utc>,
}

impl RecordRow {
    pub fn from_record(record: &Record) -> Result<Self, AppError> {
        let pointers = match &record.pointers {
            Some(p) => Some(p.to_json()?),
            None => None,
        };
        let size = i64::try_from(record.size)
            .map_err(|_| AppError::Validation(format!("Size {} is out of range", record.size)))?;

        Ok(RecordRow {
            id: record.id.to_string(),
            storage_type: record.backend,
            name: record.name.clone(),
            size,
            status: record.status,
            pointers,
            created: record.created,
        })
    }

    /// Convert a row into a record. A row that cannot be interpreted is reported
    /// as not found, the same as a missing row.
    pub fn into_record(self) -> Result<Record, AppError> {
        let malformed =
            |what: &str| AppError::NotFound(format!("Record {} is malformed: {}", self.id, what));

        let id = Uuid::parse_str(&self.id).map_err(|_| malformed("invalid id"))?;
        let size = u64::try_from(self.size).map_err(|_| malformed("negative size"))?;
        let pointers = match self.pointers.as_deref() {
            None | Some("") | Some("null") => None,
            Some(raw) => Some(Pointers::from_json(raw).map_err(|_| malformed("invalid pointers"))?),
        };

        Ok(Record {
            id,
            status: self.status,
            name: self.name,
            size,
            backend: self.storage_type,
            pointers,
            created: self.created,
        })
    }
}

/// Listing entry combining a record with its download statistics.
#[derive(Debug, Clone, Serialize)]
pub struct RecordSummary {
    pub uuid: Uuid,
    pub name: String,
    pub size: u64,
    pub status: UploadStatus,
    #[serde(with = "chrono::serde::ts_seconds")]
    pub created: DateTime<Utc>,
    #[serde(with = "chrono::serde::ts_seconds_option")]
    pub last_download: Option<DateTime<Utc>>,
    pub downloads: i64,
}
