//! Upload endpoint
//!
//! Raw bodies are handed to the storage handler as a stream. Multipart bodies are
//! spooled to anonymous temp files first, since the handler has to see every
//! file part before it can reject an upload carrying more than one.

use crate::error::HttpAppError;
use crate::state::AppState;
use axum::{
    body::Body,
    extract::{multipart::Field, FromRequest, Multipart, Request, State},
    http::{header, HeaderMap, HeaderName, HeaderValue, StatusCode},
    response::Response,
};
use depot_core::{AppError, ServerConfig};
use depot_storage::{BoxReader, FilePart, UploadRequest};
use futures::TryStreamExt;
use std::io;
use std::sync::Arc;
use tokio::io::{AsyncSeekExt, AsyncWriteExt};
use tokio_util::io::StreamReader;

pub const X_UUID: HeaderName = HeaderName::from_static("x-uuid");

#[tracing::instrument(skip(state, request), fields(operation = "upload"))]
pub async fn upload_file(
    State(state): State<Arc<AppState>>,
    request: Request,
) -> Result<Response, HttpAppError> {
    let base = locator_base(&state.config.server, request.headers());
    let upload = into_upload_request(request).await?;

    let id = state.gateway.upload(upload).await?;

    let locator = format!("{}/download?uuid={}", base, id);
    let id_header = HeaderValue::from_str(&id.to_string())
        .map_err(|e| AppError::Internal(format!("Invalid id header: {}", e)))?;

    let response = Response::builder()
        .status(StatusCode::OK)
        .header(header::CONTENT_TYPE, "text/plain; charset=utf-8")
        .header(X_UUID, id_header)
        .body(Body::from(locator))
        .map_err(|e| AppError::Internal(format!("Failed to build response: {}", e)))?;

    Ok(response)
}

/// Base URL of the locator returned after an upload.
fn locator_base(server: &ServerConfig, headers: &HeaderMap) -> String {
    if let Some(base) = &server.public_base_url {
        return base.clone();
    }

    let host = headers
        .get(header::HOST)
        .and_then(|v| v.to_str().ok())
        .unwrap_or("localhost");
    let scheme = headers
        .get("x-forwarded-proto")
        .and_then(|v| v.to_str().ok())
        .unwrap_or("http");
    format!("{}://{}", scheme, host)
}

fn is_multipart(headers: &HeaderMap) -> bool {
    headers
        .get(header::CONTENT_TYPE)
        .and_then(|v| v.to_str().ok())
        .map(|v| v.to_ascii_lowercase().starts_with("multipart/form-data"))
        .unwrap_or(false)
}

async fn into_upload_request(request: Request) -> Result<UploadRequest, HttpAppError> {
    let method = request.method().clone();
    let headers = request.headers().clone();

    if !is_multipart(&headers) {
        let stream = request.into_body().into_data_stream().map_err(io::Error::other);
        let reader: BoxReader = Box::pin(StreamReader::new(stream));
        return Ok(UploadRequest::raw(method, headers, reader));
    }

    let mut multipart = Multipart::from_request(request, &()).await?;
    let mut parts = Vec::new();

    while let Some(field) = multipart.next_field().await? {
        // Plain form values are not files
        if field.file_name().is_none() && field.name() != Some("file") {
            continue;
        }

        let field_name = field.name().map(String::from);
        let file_name = field.file_name().map(String::from);
        // Only the first file is spooled; a second one fails the upload anyway.
        let reader: BoxReader = if parts.is_empty() {
            spool_field(field).await?
        } else {
            Box::pin(tokio::io::empty())
        };

        parts.push(FilePart {
            field_name,
            file_name,
            reader,
        });
    }

    Ok(UploadRequest::multipart(method, headers, parts))
}

async fn spool_field(mut field: Field<'_>) -> Result<BoxReader, HttpAppError> {
    let file = tempfile::tempfile().map_err(AppError::from)?;
    let mut file = tokio::fs::File::from_std(file);

    while let Some(chunk) = field.chunk().await? {
        file.write_all(&chunk).await.map_err(AppError::from)?;
    }
    file.flush().await.map_err(AppError::from)?;
    file.rewind().await.map_err(AppError::from)?;

    Ok(Box::pin(file))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_locator_base_prefers_configured_url() {
        let server = ServerConfig {
            public_base_url: Some("https://files.example.com".to_string()),
            ..ServerConfig::default()
        };
        let mut headers = HeaderMap::new();
        headers.insert(header::HOST, HeaderValue::from_static("internal:8080"));
        assert_eq!(locator_base(&server, &headers), "https://files.example.com");
    }

    #[test]
    fn test_locator_base_from_host() {
        let server = ServerConfig::default();
        let mut headers = HeaderMap::new();
        headers.insert(header::HOST, HeaderValue::from_static("depot.local:8080"));
        assert_eq!(locator_base(&server, &headers), "http://depot.local:8080");

        headers.insert("x-forwarded-proto", HeaderValue::from_static("https"));
        assert_eq!(locator_base(&server, &headers), "https://depot.local:8080");
    }

    #[test]
    fn test_is_multipart() {
        let mut headers = HeaderMap::new();
        assert!(!is_multipart(&headers));
        headers.insert(
            header::CONTENT_TYPE,
            HeaderValue::from_static("multipart/form-data; boundary=xyz"),
        );
        assert!(is_multipart(&headers));
        headers.insert(
            header::CONTENT_TYPE,
            HeaderValue::from_static("application/octet-stream"),
        );
        assert!(!is_multipart(&headers));
    }
}
