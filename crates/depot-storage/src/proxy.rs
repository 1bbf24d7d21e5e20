//! Remote relay handler
//!
//! Uploads are streamed straight into an outbound `PUT` to the configured endpoint
//! while being hashed and size-checked chunk by chunk; nothing is buffered beyond
//! one chunk. Downloads re-issue a `GET` to the locator returned by the remote and
//! stream its body back. Deletes issue `DELETE {endpoint}?uuid={remote id}`.

use crate::ingest::{
    attachment_disposition, ensure_upload_method, resolve_source, validate_file_name,
    IngestMeter, CHUNK_SIZE,
};
use crate::traits::{
    DownloadResponse, StorageError, StorageHandler, StorageResult, UploadOutcome, UploadRequest,
};
use async_trait::async_trait;
use depot_core::validation::FilenamePolicy;
use depot_core::{Pointers, ProxyStorageConfig, Record, StorageBackend};
use futures::{StreamExt, TryStreamExt};
use http::header::{CACHE_CONTROL, CONTENT_DISPOSITION, CONTENT_LENGTH, CONTENT_TYPE, EXPIRES, PRAGMA};
use http::{HeaderMap, HeaderValue};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use tokio_util::io::ReaderStream;
use uuid::Uuid;

/// Response header carrying the remote-side object id
const X_UUID: &str = "x-uuid";

/// Remote object id from a response, ignoring blank values.
fn remote_object_id(headers: &reqwest::header::HeaderMap) -> Option<String> {
    headers
        .get(X_UUID)
        .and_then(|v| v.to_str().ok())
        .map(str::trim)
        .filter(|v| !v.is_empty())
        .map(String::from)
}

/// Proxy storage handler
#[derive(Clone)]
pub struct ProxyHandler {
    client: reqwest::Client,
    endpoint: String,
    config: ProxyStorageConfig,
}

impl ProxyHandler {
    pub fn new(config: ProxyStorageConfig) -> StorageResult<Self> {
        let endpoint = config
            .endpoint
            .clone()
            .ok_or_else(|| StorageError::ConfigError("PROXY_ENDPOINT not configured".to_string()))?;

        // Certificate and hostname verification stay at reqwest's defaults (enabled).
        let client = reqwest::Client::builder()
            .timeout(config.timeout)
            .build()
            .map_err(|e| StorageError::ConfigError(format!("Failed to build HTTP client: {}", e)))?;

        Ok(ProxyHandler {
            client,
            endpoint,
            config,
        })
    }

    fn is_random_uuid(id: &Uuid) -> bool {
        id.get_version() == Some(uuid::Version::Random)
            && id.get_variant() == uuid::Variant::RFC4122
    }

    /// Best-effort removal of a remote object that must not stay referenced.
    async fn discard_remote(&self, remote_id: &str) {
        if let Err(e) = self.delete_remote(remote_id).await {
            tracing::warn!(remote_id = %remote_id, error = %e, "Failed to discard remote object");
        }
    }

    async fn delete_remote(&self, remote_id: &str) -> StorageResult<()> {
        let url = self.endpoint.trim_end_matches('/');
        let mut request = self.client.delete(url).query(&[("uuid", remote_id)]);
        if let Some(password) = &self.config.admin_password {
            request = request.bearer_auth(password);
        }

        let response = request
            .send()
            .await
            .map_err(|e| StorageError::DeleteFailed(format!("Remote deletion failed: {}", e)))?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(StorageError::DeleteFailed(format!(
                "Remote deletion failed with code {}: {}",
                status.as_u16(),
                if body.is_empty() { "No response body" } else { body.as_str() }
            )));
        }
        Ok(())
    }
}

#[async_trait]
impl StorageHandler for ProxyHandler {
    fn backend_type(&self) -> StorageBackend {
        StorageBackend::Proxy
    }

    async fn handle_upload(&self, id: Uuid, request: UploadRequest) -> StorageResult<UploadOutcome> {
        if !Self::is_random_uuid(&id) {
            return Err(StorageError::InvalidId(id.to_string()));
        }
        ensure_upload_method(&request.method)?;

        let source = resolve_source(request.body, &request.headers)?;
        let max_size = self.config.max_file_size;
        if let Some(declared) = source.declared_length {
            if declared > max_size {
                return Err(StorageError::SizeExceeded { limit: max_size });
            }
        }
        let name = validate_file_name(source.file_name, FilenamePolicy::Strict)?;

        let meter = Arc::new(Mutex::new(IngestMeter::new(max_size)));
        let exceeded = Arc::new(AtomicBool::new(false));

        let body_stream = {
            let meter = Arc::clone(&meter);
            let exceeded = Arc::clone(&exceeded);
            ReaderStream::with_capacity(source.reader, CHUNK_SIZE).map(move |chunk| {
                let chunk = chunk?;
                let admitted = match meter.lock() {
                    Ok(mut meter) => meter.admit(&chunk),
                    Err(_) => Err(StorageError::UploadFailed("ingest meter poisoned".to_string())),
                };
                match admitted {
                    Ok(()) => Ok(chunk),
                    Err(e) => {
                        exceeded.store(true, Ordering::SeqCst);
                        Err(std::io::Error::other(e.to_string()))
                    }
                }
            })
        };

        let mut outbound = self
            .client
            .put(&self.endpoint)
            .header(CONTENT_TYPE, "application/octet-stream")
            .body(reqwest::Body::wrap_stream(body_stream));
        if let Some(name) = &name {
            outbound = outbound.header("X-Filename", urlencoding::encode(name).into_owned());
        }
        if let Some(password) = &self.config.upload_password {
            outbound = outbound.bearer_auth(password);
        }

        let start = std::time::Instant::now();
        let result = outbound.send().await;

        if exceeded.load(Ordering::SeqCst) {
            // The remote may still have answered; never leave that object behind.
            let stray = result
                .ok()
                .and_then(|response| remote_object_id(response.headers()));
            if let Some(remote_id) = stray {
                self.discard_remote(&remote_id).await;
            }
            tracing::warn!(record_id = %id, limit = max_size, "Proxy upload exceeded size limit");
            return Err(StorageError::SizeExceeded { limit: max_size });
        }

        let response = result
            .map_err(|e| StorageError::Remote(format!("Error during upload relay: {}", e)))?;

        let status = response.status();
        let remote_id = remote_object_id(response.headers());
        let body = match response.text().await {
            Ok(body) => body,
            Err(e) => {
                if let (true, Some(remote_id)) = (status.is_success(), &remote_id) {
                    self.discard_remote(remote_id).await;
                }
                return Err(StorageError::Remote(format!(
                    "Failed to read remote response: {}",
                    e
                )));
            }
        };

        if !status.is_success() {
            return Err(StorageError::Remote(format!(
                "Remote upload failed with code {}: {}",
                status.as_u16(),
                if body.is_empty() { "No response body" } else { body.as_str() }
            )));
        }

        // Without a remote id the object could never be deleted again.
        let Some(remote_id) = remote_id else {
            return Err(StorageError::Remote(
                "Remote upload returned no X-UUID header".to_string(),
            ));
        };

        let download_url = body.trim().to_string();
        if download_url.is_empty() {
            self.discard_remote(&remote_id).await;
            return Err(StorageError::Remote(
                "Remote upload returned an empty locator".to_string(),
            ));
        }

        let finished = match meter.lock() {
            Ok(mut guard) => Some(std::mem::replace(&mut *guard, IngestMeter::new(max_size)).finish()),
            Err(_) => None,
        };
        let Some((size, sha256)) = finished else {
            self.discard_remote(&remote_id).await;
            return Err(StorageError::UploadFailed(
                "ingest meter poisoned".to_string(),
            ));
        };

        tracing::info!(
            endpoint = %self.endpoint,
            record_id = %id,
            remote_id = %remote_id,
            size_bytes = size,
            duration_ms = start.elapsed().as_secs_f64() * 1000.0,
            "Proxy upload successful"
        );

        let pointers = Pointers::new()
            .with("filename", name.as_deref())
            .with("download_url", Some(download_url))
            .with("response_uuid", Some(remote_id))
            .with("sha256", Some(sha256.as_str()));

        Ok(UploadOutcome {
            name,
            size,
            sha256,
            pointers,
        })
    }

    async fn handle_download(&self, record: &Record) -> StorageResult<DownloadResponse> {
        let url = record
            .pointer("download_url")
            .filter(|u| !u.is_empty())
            .ok_or(StorageError::MissingPointer("download_url"))?;

        let mut request = self.client.get(url);
        if let Some(password) = &self.config.upload_password {
            request = request.bearer_auth(password);
        }

        let response = request
            .send()
            .await
            .map_err(|e| StorageError::DownloadFailed(format!("Remote download failed: {}", e)))?;

        let status = response.status();
        if !status.is_success() {
            return Err(StorageError::DownloadFailed(format!(
                "Remote download failed: HTTP {}",
                status.as_u16()
            )));
        }

        let mut headers = HeaderMap::new();
        headers.insert(
            CONTENT_TYPE,
            HeaderValue::from_static("application/octet-stream"),
        );
        headers.insert(
            CONTENT_DISPOSITION,
            attachment_disposition(&record.display_name())?,
        );
        if self.config.return_content_size && record.size > 0 {
            headers.insert(CONTENT_LENGTH, HeaderValue::from(record.size));
        }
        headers.insert(
            CACHE_CONTROL,
            HeaderValue::from_static("no-cache, must-revalidate"),
        );
        headers.insert(PRAGMA, HeaderValue::from_static("no-cache"));
        headers.insert(EXPIRES, HeaderValue::from_static("0"));

        tracing::info!(
            url = %url,
            record_id = %record.id,
            size_bytes = record.size,
            "Proxy download started"
        );

        let stream = response
            .bytes_stream()
            .map_err(|e| StorageError::DownloadFailed(format!("Failed to read remote chunk: {}", e)));

        Ok(DownloadResponse {
            headers,
            body: Box::pin(stream),
        })
    }

    async fn handle_delete(&self, record: &Record) -> StorageResult<()> {
        let remote_id = record
            .pointer("response_uuid")
            .filter(|u| !u.is_empty())
            .ok_or(StorageError::MissingPointer("response_uuid"))?;
        let start = std::time::Instant::now();

        self.delete_remote(remote_id).await?;

        tracing::info!(
            endpoint = %self.endpoint,
            record_id = %record.id,
            remote_id = %remote_id,
            duration_ms = start.elapsed().as_secs_f64() * 1000.0,
            "Proxy delete successful"
        );
        Ok(())
    }
}
