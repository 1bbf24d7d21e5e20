//! Shared ingestion helpers
//!
//! Every handler follows the same steps for an upload: check the method, pick the
//! single file source and its candidate name, validate the name, then read the
//! body in fixed-size chunks through an [`IngestMeter`] that hashes the bytes and
//! rejects a chunk before it is stored when it would push the total over a limit.

use std::sync::LazyLock;

use depot_core::validation::{sanitize_filename, FilenamePolicy};
use http::header::{CONTENT_DISPOSITION, CONTENT_LENGTH};
use http::{HeaderMap, HeaderValue, Method};
use regex::Regex;
use sha2::{Digest, Sha256};

use crate::traits::{BoxReader, StorageError, StorageResult, UploadBody};

/// Chunk size for reading uploads and streaming downloads
pub const CHUNK_SIZE: usize = 8192;

pub const X_FILENAME: &str = "x-filename";

static DISPOSITION_FILENAME: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r#"filename="?([^"\r\n]+)"?"#).expect("valid content-disposition regex")
});

/// Uploads are accepted on POST and PUT only.
pub fn ensure_upload_method(method: &Method) -> StorageResult<()> {
    if *method == Method::POST || *method == Method::PUT {
        Ok(())
    } else {
        Err(StorageError::MethodNotAllowed(method.to_string()))
    }
}

/// The single byte source of an upload and what the client called it.
pub struct UploadSource {
    pub file_name: Option<String>,
    /// `Content-Length` of a raw body, when declared
    pub declared_length: Option<u64>,
    pub reader: BoxReader,
    pub multipart: bool,
}

/// Pick the upload source and its candidate name.
///
/// Multipart uploads must carry exactly one file part and take the part's file
/// name. Raw uploads take the name from `X-Filename` (percent-decoded), falling
/// back to the `filename` parameter of `Content-Disposition`.
pub fn resolve_source(body: UploadBody, headers: &HeaderMap) -> StorageResult<UploadSource> {
    match body {
        UploadBody::Multipart(mut parts) => {
            if parts.len() > 1 {
                return Err(StorageError::MultipleFiles);
            }
            let part = parts.pop().ok_or(StorageError::NoFile)?;
            Ok(UploadSource {
                file_name: part.file_name.filter(|n| !n.is_empty()),
                declared_length: None,
                reader: part.reader,
                multipart: true,
            })
        }
        UploadBody::Raw(reader) => {
            let declared_length = headers
                .get(CONTENT_LENGTH)
                .and_then(|v| v.to_str().ok())
                .and_then(|v| v.trim().parse::<u64>().ok());
            Ok(UploadSource {
                file_name: header_file_name(headers)?,
                declared_length,
                reader,
                multipart: false,
            })
        }
    }
}

fn header_file_name(headers: &HeaderMap) -> StorageResult<Option<String>> {
    if let Some(value) = headers.get(X_FILENAME) {
        let raw = value
            .to_str()
            .map_err(|_| StorageError::InvalidFilename("X-Filename is not ASCII".to_string()))?;
        if !raw.is_empty() {
            let decoded = urlencoding::decode(raw).map_err(|_| {
                StorageError::InvalidFilename("X-Filename is not valid UTF-8".to_string())
            })?;
            return Ok(Some(decoded.into_owned()));
        }
    }

    let name = headers
        .get(CONTENT_DISPOSITION)
        .and_then(|v| v.to_str().ok())
        .and_then(|v| DISPOSITION_FILENAME.captures(v))
        .and_then(|c| c.get(1))
        .map(|m| m.as_str().to_string());
    Ok(name)
}

/// Validate an optional candidate name against `policy`.
pub fn validate_file_name(
    name: Option<String>,
    policy: FilenamePolicy,
) -> StorageResult<Option<String>> {
    name.map(|raw| {
        sanitize_filename(&raw, policy)
            .map_err(|e| StorageError::InvalidFilename(format!("{:?}: {}", raw, e)))
    })
    .transpose()
}

/// Build `attachment; filename="<percent-encoded name>"`.
pub fn attachment_disposition(name: &str) -> StorageResult<HeaderValue> {
    HeaderValue::from_str(&format!(
        "attachment; filename=\"{}\"",
        urlencoding::encode(name)
    ))
    .map_err(|e| StorageError::DownloadFailed(format!("Invalid Content-Disposition: {}", e)))
}

/// Running size and SHA-256 of an ingested stream.
pub struct IngestMeter {
    size: u64,
    hasher: Sha256,
    file_limit: u64,
    storage_remaining: Option<u64>,
}

impl IngestMeter {
    pub fn new(file_limit: u64) -> Self {
        Self {
            size: 0,
            hasher: Sha256::new(),
            file_limit,
            storage_remaining: None,
        }
    }

    /// Additionally cap the stream at the free space left under a storage quota.
    pub fn with_storage_remaining(mut self, remaining: u64) -> Self {
        self.storage_remaining = Some(remaining);
        self
    }

    /// Account for `chunk`. Fails without consuming it when it would exceed a limit.
    pub fn admit(&mut self, chunk: &[u8]) -> StorageResult<()> {
        let next = self.size.saturating_add(chunk.len() as u64);
        if next > self.file_limit {
            return Err(StorageError::SizeExceeded {
                limit: self.file_limit,
            });
        }
        if let Some(remaining) = self.storage_remaining {
            if next > remaining {
                return Err(StorageError::StorageFull { limit: remaining });
            }
        }
        self.hasher.update(chunk);
        self.size = next;
        Ok(())
    }

    pub fn size(&self) -> u64 {
        self.size
    }

    /// Final size and hex digest
    pub fn finish(self) -> (u64, String) {
        (self.size, hex::encode(self.hasher.finalize()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::traits::FilePart;

    fn empty_reader() -> BoxReader {
        Box::pin(tokio::io::empty())
    }

    fn part(name: Option<&str>) -> FilePart {
        FilePart {
            field_name: Some("file".to_string()),
            file_name: name.map(String::from),
            reader: empty_reader(),
        }
    }

    #[test]
    fn test_upload_methods() {
        assert!(ensure_upload_method(&Method::POST).is_ok());
        assert!(ensure_upload_method(&Method::PUT).is_ok());
        assert!(matches!(
            ensure_upload_method(&Method::GET),
            Err(StorageError::MethodNotAllowed(_))
        ));
    }

    #[test]
    fn test_multipart_requires_exactly_one_file() {
        let headers = HeaderMap::new();
        assert!(matches!(
            resolve_source(UploadBody::Multipart(vec![]), &headers),
            Err(StorageError::NoFile)
        ));
        assert!(matches!(
            resolve_source(
                UploadBody::Multipart(vec![part(Some("a")), part(Some("b"))]),
                &headers
            ),
            Err(StorageError::MultipleFiles)
        ));

        let source =
            resolve_source(UploadBody::Multipart(vec![part(Some("a.txt"))]), &headers).unwrap();
        assert_eq!(source.file_name.as_deref(), Some("a.txt"));
        assert!(source.multipart);

        let source = resolve_source(UploadBody::Multipart(vec![part(Some(""))]), &headers).unwrap();
        assert_eq!(source.file_name, None);
    }

    #[test]
    fn test_raw_name_prefers_x_filename() {
        let mut headers = HeaderMap::new();
        headers.insert(X_FILENAME, HeaderValue::from_static("my%20report.pdf"));
        headers.insert(
            CONTENT_DISPOSITION,
            HeaderValue::from_static("attachment; filename=\"other.pdf\""),
        );
        headers.insert(CONTENT_LENGTH, HeaderValue::from_static("42"));

        let source = resolve_source(UploadBody::Raw(empty_reader()), &headers).unwrap();
        assert_eq!(source.file_name.as_deref(), Some("my report.pdf"));
        assert_eq!(source.declared_length, Some(42));
        assert!(!source.multipart);
    }

    #[test]
    fn test_raw_name_from_content_disposition() {
        let mut headers = HeaderMap::new();
        headers.insert(
            CONTENT_DISPOSITION,
            HeaderValue::from_static("attachment; filename=data.csv"),
        );
        let source = resolve_source(UploadBody::Raw(empty_reader()), &headers).unwrap();
        assert_eq!(source.file_name.as_deref(), Some("data.csv"));

        let source = resolve_source(UploadBody::Raw(empty_reader()), &HeaderMap::new()).unwrap();
        assert_eq!(source.file_name, None);
        assert_eq!(source.declared_length, None);
    }

    #[test]
    fn test_validate_file_name() {
        assert_eq!(
            validate_file_name(Some("../x/a b.txt".into()), FilenamePolicy::AllowSpaces).unwrap(),
            Some("a b.txt".to_string())
        );
        assert!(matches!(
            validate_file_name(Some("a b.txt".into()), FilenamePolicy::Strict),
            Err(StorageError::InvalidFilename(_))
        ));
        assert_eq!(validate_file_name(None, FilenamePolicy::Strict).unwrap(), None);
    }

    #[test]
    fn test_meter_allows_exactly_the_limit() {
        let mut meter = IngestMeter::new(10);
        meter.admit(&[0u8; 6]).unwrap();
        meter.admit(&[0u8; 4]).unwrap();
        assert!(matches!(
            meter.admit(&[0u8; 1]),
            Err(StorageError::SizeExceeded { limit: 10 })
        ));
        assert_eq!(meter.size(), 10);
    }

    #[test]
    fn test_meter_storage_quota() {
        let mut meter = IngestMeter::new(100).with_storage_remaining(5);
        assert!(matches!(
            meter.admit(&[0u8; 6]),
            Err(StorageError::StorageFull { limit: 5 })
        ));
    }

    #[test]
    fn test_meter_digest() {
        let mut meter = IngestMeter::new(100);
        meter.admit(b"hello ").unwrap();
        meter.admit(b"world").unwrap();
        let (size, digest) = meter.finish();
        assert_eq!(size, 11);
        assert_eq!(
            digest,
            "b94d27b9934d3e08a52e52d7da7dabfac484efe37a5380ee9088f7ace2efcde9"
        );
    }

    #[test]
    fn test_attachment_disposition_encodes_name() {
        let value = attachment_disposition("my report.pdf").unwrap();
        assert_eq!(value, "attachment; filename=\"my%20report.pdf\"");
    }
}
